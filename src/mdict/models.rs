//! Data structures describing the parsed MDict container.

use std::path::Path;

use encoding_rs::{Encoding, UTF_16LE};

use super::error::MdictError;

/// Container layout generation, derived from `GeneratedByEngineVersion`.
///
/// Everything below 2.0 uses the narrow (`V1`) layout; 2.x uses `V2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdictVersion {
    V1,
    V2,
}

impl MdictVersion {
    /// Width (in bytes) of size and count fields in this layout.
    pub fn number_width(&self) -> usize {
        match self {
            MdictVersion::V1 => 4,
            MdictVersion::V2 => 8,
        }
    }

    /// Width (in bytes) of key-length prefixes in the key-block directory.
    pub fn text_len_width(&self) -> usize {
        match self {
            MdictVersion::V1 => 1,
            MdictVersion::V2 => 2,
        }
    }

    /// Number of NUL characters terminating a key in the key-block
    /// directory. Each NUL occupies one text unit (two bytes under UTF-16).
    pub fn info_terminator_count(&self) -> usize {
        match self {
            MdictVersion::V1 => 1,
            MdictVersion::V2 => 2,
        }
    }
}

/// Encryption mode declared by the `Encrypted` header attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    None,
    /// Record blocks are encrypted with a user key. Detected and rejected.
    RecordEncrypted,
    /// The key-block directory is scrambled with the fast XOR/rotate cipher.
    KeyInfoScrambled,
}

/// Whether the file is a text dictionary (.mdx) or a resource archive (.mdd).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Mdx,
    Mdd,
}

impl FileKind {
    /// Infers the kind from the file-name suffix. Anything that is not
    /// `.mdd` is treated as a text dictionary.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("mdd") => FileKind::Mdd,
            _ => FileKind::Mdx,
        }
    }
}

/// Parsed MDict file header.
#[derive(Debug)]
pub struct MdictHeader {
    /// Raw `GeneratedByEngineVersion` attribute value.
    pub engine_version: String,
    pub version: MdictVersion,
    pub encoding: &'static Encoding,
    pub encryption: EncryptionMode,
    pub kind: FileKind,
}

impl MdictHeader {
    /// Width in bytes of one text unit (2 for UTF-16, 1 otherwise).
    pub fn unit_width(&self) -> usize {
        if self.encoding == UTF_16LE {
            2
        } else {
            1
        }
    }
}

/// Directory entry describing one key block.
///
/// Offsets are prefix sums over the preceding blocks, starting at zero,
/// in the order the blocks appear on disk.
#[derive(Debug)]
pub struct KeyBlockInfo {
    pub first_key: String,
    pub last_key: String,
    pub compressed_size: u64,
    pub decompressed_size: u64,
    pub compressed_offset: u64,
    pub decompressed_offset: u64,
}

/// A dictionary key and the offset of its value in the virtual
/// concatenated decompressed record stream.
#[derive(Debug)]
pub struct KeyEntry {
    pub record_start: u64,
    pub text: String,
}

/// Directory entry describing one record block.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeaderEntry {
    pub compressed_size: u64,
    pub decompressed_size: u64,
    pub compressed_offset: u64,
    pub decompressed_offset: u64,
}

/// Compression tag carried in byte 0 of every block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    Stored,
    Lzo,
    Zlib,
}

impl TryFrom<u8> for CompressionType {
    type Error = MdictError;

    fn try_from(value: u8) -> Result<Self, MdictError> {
        match value {
            0 => Ok(Self::Stored),
            1 => Ok(Self::Lzo),
            2 => Ok(Self::Zlib),
            _ => Err(MdictError::InvalidFormat(format!(
                "unknown compression type: {value}"
            ))),
        }
    }
}

/// Output encoding for resource values crossing the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEncoding {
    Hex,
    Base64,
}
