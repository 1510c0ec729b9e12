//! Custom error types for the mdict-engine crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum MdictError {
    /// An error originating from I/O operations, including short reads.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file uses record-level encryption, which requires a user key
    /// this engine does not handle.
    #[error("record-encrypted files are not supported")]
    UnsupportedEncryption,

    /// A block carries a compression tag this engine refuses to decode
    /// (0 = stored, 1 = LZO).
    #[error("unsupported block compression type: {0}")]
    UnsupportedCompression(u8),

    /// A checksum validation failed, indicating data corruption.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// A decompression pass failed outright (truncated or garbled stream).
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// A buffer or data block has an unexpected size after an operation.
    #[error("size mismatch for {context}: expected {expected} bytes, found {found}")]
    SizeMismatch {
        context: &'static str,
        expected: u64,
        found: u64,
    },

    /// A declared count of items does not match the number actually found.
    #[error("count mismatch for {item_type}: expected {expected}, found {found}")]
    CountMismatch {
        item_type: &'static str,
        expected: u64,
        found: u64,
    },

    /// The header XML could not be decoded or parsed.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The file is structurally invalid outside the header.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// The file lock was poisoned by a panic in another thread.
    #[error("file lock poisoned by a panic in another thread")]
    LockPoisoned,
}

/// A convenience `Result` type alias using the crate's `MdictError` type.
pub type Result<T> = std::result::Result<T, MdictError>;
