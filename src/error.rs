/// Custom Result type for oligostore operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the oligostore library, encompassing all possible error cases
/// that can occur while building tables, encoding and decoding oligo pools.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Errors related to nucleotide sequences
    SequenceError(#[from] SequenceError),
    /// Errors related to L0 tables (construction, lookup, persistence)
    TableError(#[from] TableError),
    /// Errors raised while configuring a codec
    ConfigError(#[from] ConfigError),
    /// Errors raised while decoding a single oligo
    DecodeError(#[from] DecodeError),
    /// Errors raised by the erasure-coded pool
    PoolError(#[from] PoolError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
    /// FASTQ parsing errors
    FastqError(#[from] seq_io::fastq::Error),
    /// Errors opening a (possibly compressed) input file
    CompressionError(#[from] niffler::Error),
    /// Generic errors that can occur in any part of the system
    AnyhowError(#[from] anyhow::Error),
}

/// Errors specific to nucleotide sequences and their representations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// A character that is not one of `A`, `T`, `C`, `G`
    #[error("Invalid nucleotide: {0:?}")]
    InvalidNucleotide(char),

    /// The sequence does not fit a packed short oligo
    ///
    /// # Fields
    /// * `len` - The requested length
    /// * `max` - The maximum length the representation supports
    #[error("Sequence of length {len} does not fit (maximum {max})")]
    TooLong { len: usize, max: usize },
}

/// Errors raised by L0 tables
#[derive(thiserror::Error, Debug)]
pub enum TableError {
    /// The magic number in the table file header does not match
    ///
    /// # Arguments
    /// * `u64` - The header word that was found
    #[error("Invalid table magic number: {0:#018x}")]
    InvalidMagicNumber(u64),

    /// The criterion stored in the table file is not the one requested
    #[error("Criterion mismatch: expected {expected:#014x}, found {found:#014x}")]
    CriterionMismatch { expected: u64, found: u64 },

    /// The criterion stored in the table file is not registered
    #[error("Unknown criterion identifier: {0:#014x}")]
    UnknownCriterion(u64),

    /// The named criterion is not registered
    #[error("Unknown criterion name: {0}")]
    UnknownCriterionName(String),

    /// The table file ends before all declared records were read
    ///
    /// # Arguments
    /// * `usize` - The byte position where the truncation was detected
    #[error("Table file is truncated at byte pos {0}")]
    Truncated(usize),

    /// A per-prefix record disagrees with the file header
    #[error("Table record for prefix {prefix} is inconsistent with the header")]
    InconsistentRecord { prefix: u64 },

    /// The value does not fit the table
    #[error("Value {value} is out of range (table holds {max} values)")]
    ValueOutOfRange { value: u64, max: u64 },

    /// There is no table for the requested prefix
    #[error("No table for prefix {0}")]
    NoTable(String),

    /// The table holds no values at all
    #[error("Table is empty: no word satisfies the constraints")]
    Empty,

    /// Insertion into a concatenated trie
    #[error("Trie is read-only")]
    ReadOnlyTrie,
}

/// Errors raised while configuring a codec
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A primer is shorter than the codec prefix length
    #[error("Primer of length {len} is shorter than the prefix length {prefix_len}")]
    PrimerTooShort { len: usize, prefix_len: usize },

    /// A primer was not provided
    #[error("Missing primers in codec builder")]
    MissingPrimers,

    /// A builder parameter is zero or otherwise unusable
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The L1 frame cannot carry the L2 row
    #[error("L1 frame carries {frame} data bytes but a pool row needs {row}")]
    RowSizeMismatch { frame: usize, row: usize },
}

/// Errors raised while decoding a single oligo
///
/// These never propagate past the per-oligo decode call of the pool decoder;
/// they are turned into statistics there.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The 5' or 3' primer could not be located within tolerance
    #[error("Primer mismatch")]
    PrimerMismatch,

    /// No variant combination yielded a valid metadata checksum
    #[error("Metadata unrecoverable")]
    MetadataUnrecoverable,

    /// The search deadline elapsed before a valid frame was found
    #[error("Decode timed out")]
    Timeout,

    /// The metadata validated but the frame body cannot hold the data
    #[error("Internal inconsistency: metadata validated but frame body is unusable")]
    InternalInconsistency,

    /// The decoded address is outside the addressable window
    #[error("Address {0} is out of range")]
    AddressOutOfRange(u64),
}

/// Errors raised by the erasure-coded pool
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    /// The Reed-Solomon library rejected an operation
    #[error("Reed-Solomon error: {0:?}")]
    ReedSolomon(reed_solomon_erasure::Error),

    /// A worker thread panicked
    #[error("Worker thread panicked")]
    WorkerPanicked,

    /// The file assembler was already closed
    #[error("File assembler is closed")]
    Closed,
}
impl From<reed_solomon_erasure::Error> for PoolError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        Self::ReedSolomon(err)
    }
}
impl From<reed_solomon_erasure::Error> for Error {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        Self::PoolError(PoolError::ReedSolomon(err))
    }
}
