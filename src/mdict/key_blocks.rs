//! Key section parsing: the key-block directory and the key blocks
//! themselves. All keys are indexed eagerly when the file is opened.

use std::io::Read;

use adler2::adler32_slice;
use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use log::{debug, warn};

use super::error::{MdictError, Result};
use super::models::{
    CompressionType, EncryptionMode, KeyBlockInfo, KeyEntry, MdictHeader, MdictVersion,
};
use super::{compression, crypto, text, utils};

/// Leading numbers of the key section.
///
/// Layout (v2.x, 5 fields of 8 bytes followed by a 4-byte checksum):
/// - number of key blocks
/// - number of entries
/// - key-block-info decompressed size
/// - key-block-info size
/// - key blocks total size
///
/// v1.x drops the decompressed-size field and the checksum and uses
/// 4-byte fields throughout.
#[derive(Debug)]
pub struct KeyInfoHeader {
    pub key_block_num: u64,
    pub entries_num: u64,
    pub key_info_decompressed_size: Option<u64>,
    pub key_info_size: u64,
    pub key_block_size: u64,
}

pub fn parse_info_header<R: Read>(file: &mut R, header: &MdictHeader) -> Result<KeyInfoHeader> {
    let info_len = match header.version {
        MdictVersion::V1 => 16,
        MdictVersion::V2 => 40,
    };
    let mut info_bytes = vec![0u8; info_len];
    file.read_exact(&mut info_bytes)?;

    if header.version == MdictVersion::V2 {
        let checksum_expected = file.read_u32::<BigEndian>()?;
        let checksum_actual = adler32_slice(&info_bytes);
        if checksum_actual != checksum_expected {
            return Err(MdictError::ChecksumMismatch {
                expected: checksum_expected,
                actual: checksum_actual,
            });
        }
    }

    let mut reader = info_bytes.as_slice();
    let key_block_num = utils::read_number(&mut reader, header.version)?;
    let entries_num = utils::read_number(&mut reader, header.version)?;
    let key_info_decompressed_size = match header.version {
        MdictVersion::V1 => None,
        MdictVersion::V2 => Some(utils::read_number(&mut reader, header.version)?),
    };
    let key_info_size = utils::read_number(&mut reader, header.version)?;
    let key_block_size = utils::read_number(&mut reader, header.version)?;

    debug!(
        "key section: {} blocks, {} entries, directory {} bytes, blocks {} bytes",
        key_block_num, entries_num, key_info_size, key_block_size
    );

    Ok(KeyInfoHeader {
        key_block_num,
        entries_num,
        key_info_decompressed_size,
        key_info_size,
        key_block_size,
    })
}

/// Read and decode the key-block directory into one entry per key block,
/// with running compressed/decompressed offsets.
pub fn parse_block_directory<R: Read>(
    file: &mut R,
    info: &KeyInfoHeader,
    header: &MdictHeader,
) -> Result<Vec<KeyBlockInfo>> {
    let mut payload = vec![0u8; info.key_info_size as usize];
    file.read_exact(&mut payload)?;

    let table = decode_info_payload(&mut payload, info, header)?;
    walk_descriptors(&table, info, header)
}

/// Unwrap the directory payload: v2.x is tagged, optionally scrambled, and
/// zlib-compressed; v1.x stores the descriptor table raw.
fn decode_info_payload(
    payload: &mut [u8],
    info: &KeyInfoHeader,
    header: &MdictHeader,
) -> Result<Vec<u8>> {
    let Some(decompressed_size) = info.key_info_decompressed_size else {
        return Ok(payload.to_vec());
    };

    if payload.len() < 8 {
        return Err(MdictError::InvalidFormat(
            "key-block directory shorter than its 8-byte header".to_string(),
        ));
    }
    if payload[0..4] != [0x02, 0x00, 0x00, 0x00] {
        return Err(MdictError::InvalidFormat(format!(
            "unexpected key-block directory tag: {:02x?}",
            &payload[0..4]
        )));
    }

    if header.encryption == EncryptionMode::KeyInfoScrambled {
        debug!("descrambling key-block directory");
        let key = crypto::key_info_key(payload);
        crypto::fast_decrypt(&mut payload[8..], &key);
    }

    let decompressed =
        compression::decompress_payload(&payload[8..], CompressionType::Zlib, decompressed_size)?;

    let checksum_expected = BigEndian::read_u32(&payload[4..8]);
    let checksum_actual = adler32_slice(&decompressed);
    if checksum_actual != checksum_expected {
        return Err(MdictError::ChecksumMismatch {
            expected: checksum_expected,
            actual: checksum_actual,
        });
    }

    Ok(decompressed)
}

/// Walk the decompressed descriptor table.
///
/// Each descriptor holds the entry count, the first and last key, and the
/// compressed/decompressed sizes of one key block.
fn walk_descriptors(
    table: &[u8],
    info: &KeyInfoHeader,
    header: &MdictHeader,
) -> Result<Vec<KeyBlockInfo>> {
    let mut blocks = Vec::with_capacity(info.key_block_num as usize);
    let mut reader = table;
    let mut entries_total = 0u64;
    let mut compressed_offset = 0u64;
    let mut decompressed_offset = 0u64;

    while !reader.is_empty() {
        let entries_in_block = utils::read_number(&mut reader, header.version)?;
        entries_total += entries_in_block;

        let first_key = read_directory_key(&mut reader, header)?;
        let last_key = read_directory_key(&mut reader, header)?;

        let compressed_size = utils::read_number(&mut reader, header.version)?;
        let decompressed_size = utils::read_number(&mut reader, header.version)?;

        blocks.push(KeyBlockInfo {
            first_key,
            last_key,
            compressed_size,
            decompressed_size,
            compressed_offset,
            decompressed_offset,
        });
        compressed_offset += compressed_size;
        decompressed_offset += decompressed_size;
    }

    if blocks.len() as u64 != info.key_block_num {
        return Err(MdictError::CountMismatch {
            item_type: "key blocks in directory",
            expected: info.key_block_num,
            found: blocks.len() as u64,
        });
    }
    if entries_total != info.entries_num {
        // Seen in the wild on malformed files; the key blocks themselves
        // remain readable, so this is not fatal.
        warn!(
            "key-block directory declares {} entries, header says {}",
            entries_total, info.entries_num
        );
    }

    debug!("key-block directory: {} blocks", blocks.len());
    Ok(blocks)
}

/// Read one length-prefixed key from the directory. The length counts text
/// units (characters), not bytes; the terminator NUL count depends on the
/// layout version and each unit doubles under UTF-16.
fn read_directory_key(reader: &mut &[u8], header: &MdictHeader) -> Result<String> {
    let key_len = utils::read_text_len(reader, header.version)? as usize;
    let unit = header.unit_width();
    let text_bytes = key_len * unit;
    let total = text_bytes + header.version.info_terminator_count() * unit;

    if reader.len() < total {
        return Err(MdictError::InvalidFormat(
            "truncated key text in key-block directory".to_string(),
        ));
    }

    let key = text::decode_text(&reader[..text_bytes], header.encoding);
    *reader = &reader[total..];
    Ok(key)
}

/// Split a decompressed key block into its `(record_start, key_text)`
/// entries.
pub fn parse_entries(block: &[u8], header: &MdictHeader) -> Result<Vec<KeyEntry>> {
    let mut entries = Vec::new();
    let mut reader = block;

    while !reader.is_empty() {
        let record_start = utils::read_number(&mut reader, header.version)?;
        let text = read_block_key(&mut reader, header)?;
        entries.push(KeyEntry { record_start, text });
    }

    Ok(entries)
}

/// Read a NUL-terminated key from a key block and advance the slice.
/// UTF-16 keys end on a two-byte NUL aligned to a character boundary.
fn read_block_key(reader: &mut &[u8], header: &MdictHeader) -> Result<String> {
    let width = header.unit_width();
    let end = if width == 2 {
        reader
            .chunks_exact(2)
            .position(|chunk| chunk == [0, 0])
            .map(|chunk_index| chunk_index * 2)
    } else {
        reader.iter().position(|&b| b == 0)
    }
    .ok_or_else(|| MdictError::InvalidFormat("unterminated key text in key block".to_string()))?;

    let key = text::decode_text(&reader[..end], header.encoding);
    *reader = &reader[end + width..];
    Ok(key)
}
