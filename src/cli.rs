use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use oligostore::formats::Format;
use oligostore::l1::MetadataChecksum;
use oligostore::Policy;

#[derive(Parser)]
#[command(version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Construct the L0 word tables and write them to a table file
    BuildTable {
        /// Output table file
        #[arg(short, long)]
        output: PathBuf,

        /// Word length in nucleotides
        #[arg(short = 'l', long, default_value_t = 17)]
        oligo_len: usize,

        /// Minimum edit distance between words of a prefix
        #[arg(short = 'd', long, default_value_t = 3)]
        min_dist: usize,

        /// Sequence constraint (h4, h4g1, h4g2, h4-2, h4/2)
        #[arg(short, long, default_value = "h4g2")]
        criterion: String,

        /// Prefix length (defaults to the criterion's feature length)
        #[arg(short, long)]
        prefix_len: Option<usize>,

        /// Stop collecting words per prefix at this count
        #[arg(long)]
        max_val: Option<u64>,

        /// Enumerate candidate words in numeric instead of shuffled order
        #[arg(long)]
        no_shuffle: bool,

        /// Worker threads (0: one per core)
        #[arg(short = 'T', long, default_value_t = 0)]
        threads: usize,
    },

    /// Encode a file into an oligo list
    Encode {
        /// Input file
        input: PathBuf,

        /// Output oligo list (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        codec: CodecArgs,
    },

    /// Decode an oligo list back into a file
    Decode {
        /// Input oligo list, optionally compressed
        input: PathBuf,

        /// Output file
        output: PathBuf,

        /// Input format
        #[arg(short, long, value_enum, default_value_t = FormatArg::Lines)]
        format: FormatArg,

        /// Handling of reads with characters outside ACGT
        #[arg(long, value_enum, default_value_t = PolicyArg::Ignore)]
        policy: PolicyArg,

        #[command(flatten)]
        codec: CodecArgs,
    },
}

/// Parameters shared by the encoder and the decoder
#[derive(Args)]
pub struct CodecArgs {
    /// L0 table file
    #[arg(short, long)]
    pub table: PathBuf,

    /// 5' primer
    #[arg(long, default_value = "CGACATCTCGATGGCAGCAT")]
    pub p5: String,

    /// 3' primer
    #[arg(long, default_value = "CAGTGAGCTGGCAACTTCCA")]
    pub p3: String,

    /// Data oligos per erasure group
    #[arg(long, default_value_t = oligostore::l2::DEFAULT_DSEQNUM)]
    pub dseqnum: usize,

    /// Parity oligos per erasure group
    #[arg(long, default_value_t = oligostore::l2::DEFAULT_RSEQNUM)]
    pub rseqnum: usize,

    /// Blocks per row
    #[arg(long, default_value_t = oligostore::l2::DEFAULT_BLOCK_NUM)]
    pub block_num: usize,

    /// Bytes per block
    #[arg(long, default_value_t = oligostore::l2::DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Metadata bytes per frame
    #[arg(long, default_value_t = oligostore::l1::DEFAULT_METADATA_LEN)]
    pub metadata_len: usize,

    /// Metadata checksum
    #[arg(long, value_enum, default_value_t = ChecksumArg::Crc16)]
    pub checksum: ChecksumArg,

    /// Reed-Solomon checksum bytes (with --checksum rs)
    #[arg(long, default_value_t = 2)]
    pub rsnum: usize,

    /// Per-oligo decode deadline in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub max_time_ms: u64,

    /// Highest decoder difficulty
    #[arg(long, default_value_t = oligostore::l2::DEFAULT_MAX_DIFFICULTY)]
    pub max_difficulty: usize,

    /// XOR the payload with a pseudo-random stream
    #[arg(long)]
    pub randomize: bool,

    /// Use the size-only footer instead of super-blocks
    #[arg(long)]
    pub compat: bool,

    /// Address of the first oligo
    #[arg(short, long, default_value_t = 0)]
    pub start: u64,

    /// Worker threads (0: one per core)
    #[arg(short = 'T', long, default_value_t = 0)]
    pub threads: usize,
}
impl CodecArgs {
    pub fn checksum(&self) -> MetadataChecksum {
        match self.checksum {
            ChecksumArg::Crc8 => MetadataChecksum::Crc8,
            ChecksumArg::Crc16 => MetadataChecksum::Crc16,
            ChecksumArg::Rs => MetadataChecksum::ReedSolomon { rsnum: self.rsnum },
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ChecksumArg {
    Crc8,
    Crc16,
    Rs,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Lines,
    Fastq,
}
impl From<FormatArg> for Format {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Lines => Self::Lines,
            FormatArg::Fastq => Self::Fastq,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    Ignore,
    Break,
    Random,
    SetA,
    SetC,
    SetG,
    SetT,
}
impl From<PolicyArg> for Policy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Ignore => Self::IgnoreSequence,
            PolicyArg::Break => Self::BreakOnInvalid,
            PolicyArg::Random => Self::RandomDraw,
            PolicyArg::SetA => Self::SetToA,
            PolicyArg::SetC => Self::SetToC,
            PolicyArg::SetG => Self::SetToG,
            PolicyArg::SetT => Self::SetToT,
        }
    }
}
