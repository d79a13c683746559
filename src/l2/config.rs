use crate::error::{ConfigError, Result};

/// Default number of data rows per erasure group
pub const DEFAULT_DSEQNUM: usize = 3;
/// Default number of parity rows per erasure group
pub const DEFAULT_RSEQNUM: usize = 2;
/// Default number of blocks per row
pub const DEFAULT_BLOCK_NUM: usize = 5;
/// Default number of bytes per block
pub const DEFAULT_BLOCK_SIZE: usize = 1;
/// Default highest decode difficulty of the retry passes
pub const DEFAULT_MAX_DIFFICULTY: usize = 2;

/// Galois field limit on the number of shards in a codeword
const MAX_SHARDS: usize = 256;

/// Geometry and behaviour of an erasure-coded pool
///
/// A row is the data of one frame: `block_num` blocks of `block_size` bytes.
/// An erasure group holds `dseqnum` data rows and `rseqnum` parity rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub dseqnum: usize,
    pub rseqnum: usize,
    pub block_num: usize,
    pub block_size: usize,
    /// XOR the payload with a pseudo-random stream
    pub randomize: bool,
    /// Payload followed by its length, without super-blocks
    pub compat: bool,
    /// Send rows of identical bytes bit-inverted
    pub scramble: bool,
    pub max_difficulty: usize,
    /// Worker threads (0: one per core)
    pub threads: usize,
}
impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            dseqnum: DEFAULT_DSEQNUM,
            rseqnum: DEFAULT_RSEQNUM,
            block_num: DEFAULT_BLOCK_NUM,
            block_size: DEFAULT_BLOCK_SIZE,
            randomize: false,
            compat: false,
            scramble: true,
            max_difficulty: DEFAULT_MAX_DIFFICULTY,
            threads: 0,
        }
    }
}
impl PoolConfig {
    #[must_use]
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Bytes per row (the data of one frame)
    #[must_use]
    pub fn row_size(&self) -> usize {
        self.block_num * self.block_size
    }

    /// Data bytes per erasure group
    #[must_use]
    pub fn group_size(&self) -> usize {
        self.dseqnum * self.row_size()
    }

    /// Oligos per erasure group
    #[must_use]
    pub fn rows(&self) -> usize {
        self.dseqnum + self.rseqnum
    }

    /// Worker thread count with `0` resolved to the number of cores
    #[must_use]
    pub fn thread_count(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

/// Builder for [`PoolConfig`]
#[derive(Debug, Default, Clone)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}
impl PoolConfigBuilder {
    #[must_use]
    pub fn dseqnum(mut self, dseqnum: usize) -> Self {
        self.config.dseqnum = dseqnum;
        self
    }

    #[must_use]
    pub fn rseqnum(mut self, rseqnum: usize) -> Self {
        self.config.rseqnum = rseqnum;
        self
    }

    #[must_use]
    pub fn block_num(mut self, block_num: usize) -> Self {
        self.config.block_num = block_num;
        self
    }

    #[must_use]
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.config.block_size = block_size;
        self
    }

    #[must_use]
    pub fn randomize(mut self, randomize: bool) -> Self {
        self.config.randomize = randomize;
        self
    }

    #[must_use]
    pub fn compat(mut self, compat: bool) -> Self {
        self.config.compat = compat;
        self
    }

    #[must_use]
    pub fn scramble(mut self, scramble: bool) -> Self {
        self.config.scramble = scramble;
        self
    }

    #[must_use]
    pub fn max_difficulty(mut self, max_difficulty: usize) -> Self {
        self.config.max_difficulty = max_difficulty;
        self
    }

    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    pub fn build(self) -> Result<PoolConfig> {
        let config = self.config;
        for (name, value) in [
            ("dseqnum", config.dseqnum),
            ("rseqnum", config.rseqnum),
            ("block_num", config.block_num),
            ("block_size", config.block_size),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidParameter {
                    name,
                    reason: "must be positive".to_string(),
                }
                .into());
            }
        }
        if config.rseqnum > config.dseqnum {
            return Err(ConfigError::InvalidParameter {
                name: "rseqnum",
                reason: format!(
                    "{} parity rows exceed the {} data rows of a group",
                    config.rseqnum, config.dseqnum
                ),
            }
            .into());
        }
        if config.rows() > MAX_SHARDS {
            return Err(ConfigError::InvalidParameter {
                name: "dseqnum",
                reason: format!("{} rows exceed {MAX_SHARDS} shards", config.rows()),
            }
            .into());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_defaults() -> anyhow::Result<()> {
        let config = PoolConfig::builder().build()?;
        assert_eq!(config, PoolConfig::default());
        assert_eq!(config.row_size(), 5);
        assert_eq!(config.group_size(), 15);
        assert_eq!(config.rows(), 5);
        assert!(config.thread_count() >= 1);
        Ok(())
    }

    #[test]
    fn test_rejects_invalid() {
        for builder in [
            PoolConfig::builder().dseqnum(0),
            PoolConfig::builder().rseqnum(0),
            PoolConfig::builder().block_size(0),
            PoolConfig::builder().dseqnum(2).rseqnum(3),
            PoolConfig::builder().dseqnum(200).rseqnum(100),
        ] {
            assert!(matches!(builder.build(), Err(Error::ConfigError(_))));
        }
    }
}
