//! Block decompression.
//!
//! Only zlib payloads are decoded. Stored (type 0) and LZO (type 1) blocks
//! are legal in the container but rejected by this engine.

use std::io::Read;

use flate2::read::ZlibDecoder;
use log::trace;

use super::error::{MdictError, Result};
use super::models::CompressionType;

/// Decompress a block payload into an owned buffer and verify the declared
/// decompressed size. The caller verifies the Adler-32 checksum against the
/// tag embedded in the containing block.
pub fn decompress_payload(
    payload: &[u8],
    compression: CompressionType,
    expected_size: u64,
) -> Result<Vec<u8>> {
    match compression {
        CompressionType::Stored => Err(MdictError::UnsupportedCompression(0)),
        CompressionType::Lzo => Err(MdictError::UnsupportedCompression(1)),
        CompressionType::Zlib => {
            trace!(
                "inflating {} bytes -> {} bytes expected",
                payload.len(),
                expected_size
            );
            let mut output = Vec::with_capacity(expected_size as usize);
            let mut decoder = ZlibDecoder::new(payload);
            decoder
                .read_to_end(&mut output)
                .map_err(|e| MdictError::Decompression(format!("zlib inflate failed: {e}")))?;

            if output.len() as u64 != expected_size {
                return Err(MdictError::SizeMismatch {
                    context: "decompressed block",
                    expected: expected_size,
                    found: output.len() as u64,
                });
            }
            Ok(output)
        }
    }
}
