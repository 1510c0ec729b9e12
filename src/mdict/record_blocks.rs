//! Record section parsing: the record directory read at open time and the
//! value extraction applied to decoded blocks.

use std::io::Read;

use log::debug;

use super::error::{MdictError, Result};
use super::models::{KeyEntry, MdictHeader, RecordHeaderEntry};
use super::utils;

/// The record-block directory.
#[derive(Debug)]
pub struct RecordDirectory {
    pub entries: Vec<RecordHeaderEntry>,
    /// Total compressed size of all record blocks, as declared.
    pub total_compressed_size: u64,
    /// Total decompressed size, summed over the per-block sizes.
    pub total_decompressed_size: u64,
}

/// Parse the record directory.
///
/// Layout: four numbers (block count, entry count, header size, total
/// block size), followed by `header size` bytes of per-block
/// (compressed, decompressed) size pairs.
pub fn parse_directory<R: Read>(
    file: &mut R,
    header: &MdictHeader,
    entries_num: u64,
) -> Result<RecordDirectory> {
    let record_block_num = utils::read_number(file, header.version)?;
    let record_entries_num = utils::read_number(file, header.version)?;
    let record_header_size = utils::read_number(file, header.version)?;
    let record_block_size = utils::read_number(file, header.version)?;

    if record_entries_num != entries_num {
        return Err(MdictError::CountMismatch {
            item_type: "record entries",
            expected: entries_num,
            found: record_entries_num,
        });
    }

    let mut header_bytes = vec![0u8; record_header_size as usize];
    file.read_exact(&mut header_bytes)?;

    let mut reader = header_bytes.as_slice();
    let mut entries = Vec::with_capacity(record_block_num as usize);
    let mut compressed_offset = 0u64;
    let mut decompressed_offset = 0u64;

    while !reader.is_empty() {
        let compressed_size = utils::read_number(&mut reader, header.version)?;
        let decompressed_size = utils::read_number(&mut reader, header.version)?;
        entries.push(RecordHeaderEntry {
            compressed_size,
            decompressed_size,
            compressed_offset,
            decompressed_offset,
        });
        compressed_offset += compressed_size;
        decompressed_offset += decompressed_size;
    }

    if entries.len() as u64 != record_block_num {
        return Err(MdictError::CountMismatch {
            item_type: "record blocks in directory",
            expected: record_block_num,
            found: entries.len() as u64,
        });
    }
    if compressed_offset != record_block_size {
        return Err(MdictError::SizeMismatch {
            context: "record blocks",
            expected: record_block_size,
            found: compressed_offset,
        });
    }

    debug!(
        "record directory: {} blocks, {} bytes compressed, {} bytes decompressed",
        entries.len(),
        compressed_offset,
        decompressed_offset
    );

    Ok(RecordDirectory {
        entries,
        total_compressed_size: record_block_size,
        total_decompressed_size: decompressed_offset,
    })
}

/// Index of the record block whose decompressed span contains
/// `record_start`, found by binary search over the running offsets.
pub fn block_index_for(entries: &[RecordHeaderEntry], record_start: u64) -> Option<usize> {
    let index = entries
        .partition_point(|e| e.decompressed_offset <= record_start)
        .checked_sub(1)?;
    let entry = &entries[index];
    (record_start < entry.decompressed_offset + entry.decompressed_size).then_some(index)
}

/// Extract the value bytes for the key at `key_index` from its decoded
/// record block.
///
/// The value runs from the key's `record_start` to the next key's, or for
/// the final key to the tail of the record section; either way it is
/// clamped to the containing block.
pub fn value_slice<'a>(
    block: &'a [u8],
    directory: &RecordDirectory,
    keys: &[KeyEntry],
    key_index: usize,
    block_index: usize,
) -> Result<&'a [u8]> {
    let meta = &directory.entries[block_index];
    let key = &keys[key_index];
    let start = key.record_start - meta.decompressed_offset;

    let length = match keys.get(key_index + 1) {
        Some(next) => next.record_start - key.record_start,
        None => {
            let previous_end = match block_index.checked_sub(1) {
                Some(prev) => {
                    let prev = &directory.entries[prev];
                    prev.decompressed_offset + prev.decompressed_size
                }
                None => 0,
            };
            directory.total_compressed_size.saturating_sub(previous_end)
        }
    };
    let length = length.min(meta.decompressed_size.saturating_sub(start));

    let start = start as usize;
    let end = start + length as usize;
    if end > block.len() {
        return Err(MdictError::InvalidFormat(format!(
            "record span [{start}..{end}] out of bounds for block of {} bytes",
            block.len()
        )));
    }
    Ok(&block[start..end])
}
