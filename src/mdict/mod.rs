//! Core MDict engine module.

pub mod error;
pub mod models;
pub mod text;

mod compression;
mod crypto;
mod decoder;
mod header;
mod key_blocks;
mod query;
mod record_blocks;
mod utils;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use log::{info, warn};

pub use error::{MdictError, Result};
pub use models::{FileKind, KeyBlockInfo, KeyEntry, MdictHeader, ResourceEncoding};

use models::EncryptionMode;
use record_blocks::RecordDirectory;

/// Default ceiling on candidates examined by [`Mdict::regex_suggest`].
pub const DEFAULT_REGEX_SCAN_LIMIT: usize = 20_000;

/// Cap on suggestion and search result lists.
pub(crate) const MAX_SUGGESTIONS: usize = 50;

/// A parsed, queryable MDict file.
///
/// Construction parses the header and both directories and indexes every
/// key up front; record bodies stay on disk and are decoded per query.
/// Nothing mutates after construction. The file handle is owned
/// exclusively and closed on drop.
///
/// # Thread safety
/// Reads go through a single shared file cursor, so concurrent queries
/// serialize on an internal lock.
#[derive(Debug)]
pub struct Mdict {
    file: Mutex<File>,
    header: MdictHeader,
    key_block_infos: Vec<KeyBlockInfo>,
    key_entries: Vec<KeyEntry>,
    record_directory: RecordDirectory,
    record_block_start: u64,
    regex_scan_limit: usize,
}

impl Mdict {
    /// Opens and parses an MDict file. The file kind is inferred from the
    /// `.mdd` suffix.
    ///
    /// # Errors
    /// Returns [`MdictError`] if the file cannot be read, is structurally
    /// invalid, fails checksum verification, or uses record-level
    /// encryption or a non-zlib block compression.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let kind = FileKind::from_path(path);
        info!("opening {:?} file: {}", kind, path.display());
        Self::init(File::open(path)?, kind)
    }

    /// Builds the engine from an already-open handle, taking ownership of
    /// it. The caller states the file kind, since no file name is
    /// available to infer it from.
    pub fn from_file(file: File, kind: FileKind) -> Result<Self> {
        info!("opening {:?} file from pre-opened handle", kind);
        Self::init(file, kind)
    }

    fn init(mut file: File, kind: FileKind) -> Result<Self> {
        let header = header::parse(&mut file, kind)?;
        if header.encryption == EncryptionMode::RecordEncrypted {
            return Err(MdictError::UnsupportedEncryption);
        }

        let info = key_blocks::parse_info_header(&mut file, &header)?;
        let key_block_infos = key_blocks::parse_block_directory(&mut file, &info, &header)?;
        let key_block_start = file.stream_position()?;

        // Eager key index: every key block is decoded up front.
        let mut key_entries = Vec::with_capacity(info.entries_num as usize);
        for block_info in &key_block_infos {
            file.seek(SeekFrom::Start(key_block_start + block_info.compressed_offset))?;
            let mut raw = vec![0u8; block_info.compressed_size as usize];
            file.read_exact(&mut raw)?;
            let block = decoder::decode_block(&raw, block_info.decompressed_size)?;
            key_entries.extend(key_blocks::parse_entries(&block, &header)?);
        }
        if key_entries.len() as u64 != info.entries_num {
            warn!(
                "indexed {} keys, header declares {}",
                key_entries.len(),
                info.entries_num
            );
        }

        file.seek(SeekFrom::Start(key_block_start + info.key_block_size))?;
        let record_directory = record_blocks::parse_directory(&mut file, &header, info.entries_num)?;
        let record_block_start = file.stream_position()?;

        info!(
            "indexed {} entries across {} key blocks and {} record blocks ({} bytes of record data)",
            key_entries.len(),
            key_block_infos.len(),
            record_directory.entries.len(),
            record_directory.total_decompressed_size
        );

        Ok(Self {
            file: Mutex::new(file),
            header,
            key_block_infos,
            key_entries,
            record_directory,
            record_block_start,
            regex_scan_limit: DEFAULT_REGEX_SCAN_LIMIT,
        })
    }

    /// The parsed file header.
    pub fn header(&self) -> &MdictHeader {
        &self.header
    }

    /// Number of indexed entries.
    pub fn num_entries(&self) -> usize {
        self.key_entries.len()
    }

    pub fn num_key_blocks(&self) -> usize {
        self.key_block_infos.len()
    }

    pub fn num_record_blocks(&self) -> usize {
        self.record_directory.entries.len()
    }

    /// All key entries, in file order (sorted by `record_start`).
    pub fn keys(&self) -> &[KeyEntry] {
        &self.key_entries
    }

    /// The key-block directory, in file order.
    pub fn key_block_infos(&self) -> &[KeyBlockInfo] {
        &self.key_block_infos
    }

    /// Adjusts the candidate ceiling used by [`Mdict::regex_suggest`].
    pub fn set_regex_scan_limit(&mut self, limit: usize) {
        self.regex_scan_limit = limit;
    }

    /// Reads and decodes record block `rid`.
    pub(crate) fn read_record_block(&self, rid: usize) -> Result<Vec<u8>> {
        let meta = self.record_directory.entries.get(rid).ok_or_else(|| {
            MdictError::InvalidFormat(format!("record block index {rid} out of range"))
        })?;

        let mut raw = vec![0u8; meta.compressed_size as usize];
        {
            let mut file = self.file.lock().map_err(|_| MdictError::LockPoisoned)?;
            file.seek(SeekFrom::Start(self.record_block_start + meta.compressed_offset))?;
            file.read_exact(&mut raw)?;
        }

        decoder::decode_block(&raw, meta.decompressed_size)
    }
}
