//! Low-level byte reading utilities.

use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};

use super::error::Result;
use super::models::MdictVersion;

/// Read a size or count field, 4 or 8 bytes big-endian per the layout
/// version. Widths are never assumed; they always come from the parsed
/// header.
pub fn read_number(reader: &mut impl Read, version: MdictVersion) -> Result<u64> {
    Ok(match version.number_width() {
        8 => reader.read_u64::<BigEndian>()?,
        _ => reader.read_u32::<BigEndian>()? as u64,
    })
}

/// Read a key-length prefix, 1 or 2 bytes big-endian per the layout version.
pub fn read_text_len(reader: &mut impl Read, version: MdictVersion) -> Result<u64> {
    Ok(match version.text_len_width() {
        2 => reader.read_u16::<BigEndian>()? as u64,
        _ => reader.read_u8()? as u64,
    })
}
