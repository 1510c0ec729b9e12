//! Key-block-directory descrambling for `Encrypted=2` files.

use log::trace;
use ripemd::{Digest, Ripemd128};

/// Derives the 16-byte descramble key for a scrambled key-block-info
/// payload.
///
/// The key is `Ripemd128(payload[4..8] || 0x3695)`: the payload's own
/// checksum bytes followed by the fixed magic constant.
pub fn key_info_key(payload: &[u8]) -> [u8; 16] {
    let mut hasher = Ripemd128::new();
    hasher.update(&payload[4..8]);
    hasher.update(0x3695u32.to_le_bytes());
    hasher.finalize().into()
}

/// Descrambles data in place using the fast XOR/rotate cipher.
///
/// Each byte is nibble-rotated, then XORed with the previous *pre-transform*
/// byte (seeded `0x36`), its index, and the rolling key byte.
pub fn fast_decrypt(data: &mut [u8], key: &[u8; 16]) {
    trace!("descrambling {} bytes", data.len());

    let mut prev = 0x36u8;
    for (i, byte) in data.iter_mut().enumerate() {
        let current = *byte;
        *byte = current.rotate_left(4) ^ prev ^ (i as u8) ^ key[i % key.len()];
        prev = current;
    }
}
