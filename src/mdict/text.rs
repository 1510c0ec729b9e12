//! Text decoding and key normalization.

use encoding_rs::Encoding;

/// ASCII characters dropped by [`normalize_key`].
const IGNORED_ASCII: &[char] = &[
    ' ', ':', '.', ',', '-', '_', '\'', '(', ')', '#', '<', '>', '!', '/', '\\', '[', ']', '{',
    '}', '@',
];

/// Decode a byte range to UTF-8 using the file's declared encoding.
/// Invalid sequences are replaced rather than rejected; circulating files
/// contain occasional mojibake in key text.
pub fn decode_text(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Fold a key for tolerant comparison: ASCII letters are lowercased and a
/// fixed set of ASCII punctuation is dropped. Everything else, including
/// multi-byte sequences, passes through untouched.
///
/// This deliberately avoids locale-aware case folding; keys are
/// mixed-script and a locale fold would corrupt them.
pub fn normalize_key(word: &str) -> String {
    let mut folded = String::with_capacity(word.len());
    for c in word.chars() {
        if c.is_ascii_uppercase() {
            folded.push(c.to_ascii_lowercase());
        } else if !IGNORED_ASCII.contains(&c) {
            folded.push(c);
        }
    }
    folded
}

/// Canonical form of a resource-archive key: lowercased, `/` unified to
/// `\`, with a leading `\` ensured.
pub fn normalize_resource_name(name: &str) -> String {
    let mut res = name.to_lowercase().replace('/', "\\");
    if !res.is_empty() && !res.starts_with('\\') {
        res.insert(0, '\\');
    }
    res
}
