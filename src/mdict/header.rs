//! File header parsing: the UTF-16LE XML blob and the flags derived from it.

use std::collections::HashMap;
use std::io::Read;

use byteorder::{BigEndian, ReadBytesExt};
use encoding_rs::{Encoding, UTF_16LE};
use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;

use super::error::{MdictError, Result};
use super::models::{EncryptionMode, FileKind, MdictHeader, MdictVersion};

/// Parse the file header.
///
/// Header structure:
/// - 4 bytes: header length (big-endian)
/// - N bytes: UTF-16LE XML content
/// - 4 bytes: Adler-32 of the XML bytes (present in every file, ignored)
pub fn parse<R: Read>(file: &mut R, kind: FileKind) -> Result<MdictHeader> {
    let header_len = file.read_u32::<BigEndian>()?;
    let mut header_bytes = vec![0u8; header_len as usize];
    file.read_exact(&mut header_bytes)?;

    let mut checksum = [0u8; 4];
    file.read_exact(&mut checksum)?;

    let (decoded, _, _) = UTF_16LE.decode(&header_bytes);

    // Some circulating files carry stray control characters in the XML.
    let sanitized: String = decoded
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();

    let attrs = parse_xml_attributes(&sanitized)?;

    let engine_version = attrs
        .get("GeneratedByEngineVersion")
        .cloned()
        .unwrap_or_default();
    let version = if parse_version(&engine_version) >= 2.0 {
        MdictVersion::V2
    } else {
        MdictVersion::V1
    };
    let encryption = parse_encryption(attrs.get("Encrypted").map(String::as_str));

    // Resource archives key and store text as UTF-16LE whatever the header
    // claims.
    let encoding = match kind {
        FileKind::Mdd => UTF_16LE,
        FileKind::Mdx => parse_encoding(attrs.get("Encoding").map(String::as_str)),
    };

    debug!(
        "header: version={:?} ({:?}), encoding={}, encryption={:?}",
        engine_version,
        version,
        encoding.name(),
        encryption
    );

    Ok(MdictHeader {
        engine_version,
        version,
        encoding,
        encryption,
        kind,
    })
}

/// Extract the attributes of the XML root element as a map.
fn parse_xml_attributes(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return e
                    .attributes()
                    .map(|attr_result| {
                        let attr =
                            attr_result.map_err(|e| MdictError::MalformedHeader(e.to_string()))?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = attr
                            .unescape_value()
                            .map_err(|e| MdictError::MalformedHeader(e.to_string()))?
                            .into_owned();
                        Ok((key, value))
                    })
                    .collect();
            }
            Ok(Event::Eof) => {
                return Err(MdictError::MalformedHeader(
                    "no root element found in header XML".to_string(),
                ))
            }
            Err(e) => return Err(MdictError::MalformedHeader(e.to_string())),
            _ => {}
        }
    }
}

/// Parse the leading `digits[.digits]` prefix of the version attribute.
/// Trailing garbage is tolerated; no digits at all counts as 0.0, which
/// selects the legacy layout.
fn parse_version(s: &str) -> f32 {
    let mut chars = s.trim_start().chars().peekable();

    let mut int_part = 0.0f32;
    let mut saw_digit = false;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        int_part = int_part * 10.0 + d as f32;
        saw_digit = true;
        chars.next();
    }
    if !saw_digit {
        return 0.0;
    }

    let mut value = int_part;
    if chars.peek() == Some(&'.') {
        chars.next();
        let mut divisor = 10.0f32;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            value += d as f32 / divisor;
            divisor *= 10.0;
            chars.next();
        }
    }
    value
}

fn parse_encryption(attr: Option<&str>) -> EncryptionMode {
    match attr {
        None | Some("") | Some("No") => EncryptionMode::None,
        Some("Yes") => EncryptionMode::RecordEncrypted,
        Some(s) => match s.as_bytes().first() {
            Some(b'2') => EncryptionMode::KeyInfoScrambled,
            Some(b'1') => EncryptionMode::RecordEncrypted,
            _ => EncryptionMode::None,
        },
    }
}

fn parse_encoding(attr: Option<&str>) -> &'static Encoding {
    match attr {
        None | Some("") | Some("UTF-8") => encoding_rs::UTF_8,
        // Normalize non-standard labels seen in the wild.
        Some("GBK") | Some("GB2312") => encoding_rs::GB18030,
        Some("Big5") | Some("BIG5") => encoding_rs::BIG5,
        Some("utf16") | Some("UTF-16") => UTF_16LE,
        Some(other) => Encoding::for_label(other.as_bytes()).unwrap_or(encoding_rs::UTF_8),
    }
}
