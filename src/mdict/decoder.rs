//! Block decoding: tag parsing, decompression, checksum verification.

use adler2::adler32_slice;
use byteorder::{BigEndian, ByteOrder};
use log::trace;

use super::compression;
use super::error::{MdictError, Result};
use super::models::CompressionType;

/// Decode one compressed block (key or record).
///
/// Block layout:
/// - Byte 0:    compression tag (0 = stored, 1 = LZO, 2 = zlib)
/// - Bytes 4-7: big-endian Adler-32 of the decompressed body
/// - Bytes 8+:  payload
pub fn decode_block(raw_block: &[u8], expected_decompressed_size: u64) -> Result<Vec<u8>> {
    if raw_block.len() < 8 {
        return Err(MdictError::InvalidFormat(
            "block shorter than its 8-byte header".to_string(),
        ));
    }

    let compression = CompressionType::try_from(raw_block[0])?;
    let checksum_expected = BigEndian::read_u32(&raw_block[4..8]);
    trace!(
        "decoding block: compression={:?}, expected {} bytes",
        compression,
        expected_decompressed_size
    );

    let decompressed =
        compression::decompress_payload(&raw_block[8..], compression, expected_decompressed_size)?;

    let checksum_actual = adler32_slice(&decompressed);
    if checksum_actual != checksum_expected {
        return Err(MdictError::ChecksumMismatch {
            expected: checksum_expected,
            actual: checksum_actual,
        });
    }

    Ok(decompressed)
}
