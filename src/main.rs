use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, level_filters::LevelFilter};

use oligostore::criteria::CriteriaRegistry;
use oligostore::formats::{read_path, write_lines};
use oligostore::l0::{L0Builder, L0Codec};
use oligostore::l1::L1CodecBuilder;
use oligostore::l2::{L2Codec, PoolConfig};

mod cli;

use cli::{Cli, CodecArgs, Commands};

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

/// Loads the table file and stacks the frame and pool codecs on top
fn load_codec(args: &CodecArgs) -> Result<L2Codec> {
    let registry = CriteriaRegistry::with_builtins();
    let l0 = Arc::new(L0Codec::from_path(&args.table, &registry)?);
    let config = PoolConfig::builder()
        .dseqnum(args.dseqnum)
        .rseqnum(args.rseqnum)
        .block_num(args.block_num)
        .block_size(args.block_size)
        .randomize(args.randomize)
        .compat(args.compat)
        .max_difficulty(args.max_difficulty)
        .threads(args.threads)
        .build()?;
    let l1 = L1CodecBuilder::default()
        .primers(args.p5.parse()?, args.p3.parse()?)
        .data_len(config.row_size())
        .metadata_len(args.metadata_len)
        .checksum(args.checksum())
        .max_time(Duration::from_millis(args.max_time_ms))
        .build(l0)?;
    Ok(L2Codec::new(Arc::new(l1), config)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::BuildTable {
            output,
            oligo_len,
            min_dist,
            criterion,
            prefix_len,
            max_val,
            no_shuffle,
            threads,
        } => {
            let registry = CriteriaRegistry::with_builtins();
            let mut builder = L0Builder::default()
                .oligo_len(oligo_len)
                .min_dist(min_dist)
                .criterion(registry.by_name(&criterion)?)
                .shuffle(!no_shuffle)
                .threads(threads);
            if let Some(plen) = prefix_len {
                builder = builder.prefix_len(plen);
            }
            if let Some(max) = max_val {
                builder = builder.max_val(max);
            }
            let codec = builder.build()?;
            codec.save(&output)?;
            info!(
                path = %output.display(),
                max_val = codec.max_val(),
                bits = codec.bits(),
                "Table written"
            );
        }

        Commands::Encode {
            input,
            output,
            codec,
        } => {
            let pool = load_codec(&codec)?;
            let data = std::fs::read(&input)?;
            let oligos = pool.encode(codec.start, &data)?;
            match output {
                Some(path) => {
                    let mut writer = BufWriter::new(File::create(path)?);
                    write_lines(&mut writer, &oligos)?;
                    writer.flush()?;
                }
                None => {
                    let mut writer = BufWriter::new(io::stdout().lock());
                    write_lines(&mut writer, &oligos)?;
                    writer.flush()?;
                }
            }
            info!(bytes = data.len(), oligos = oligos.len(), "Encoded");
        }

        Commands::Decode {
            input,
            output,
            format,
            policy,
            codec,
        } => {
            let pool = load_codec(&codec)?;
            let oligos = read_path(&input, format.into(), policy.into())?;
            let decoded = pool.decode_window(&oligos, codec.start..pool.l1().max_addr())?;
            std::fs::write(&output, decoded.to_bytes())?;
            for (kind, bytes) in decoded.summary() {
                println!("{kind}\t{bytes}");
            }
        }
    }
    Ok(())
}
