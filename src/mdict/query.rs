//! Query operations over the indexed dictionary.

use std::collections::BTreeSet;
use std::ops::Range;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, warn};
use regex::RegexBuilder;

use super::error::Result;
use super::models::{FileKind, ResourceEncoding};
use super::{record_blocks, text, Mdict, MAX_SUGGESTIONS};

impl Mdict {
    /// Returns all values whose key matches `word` exactly, or matches
    /// after key normalization, in record-block order. A missing key
    /// yields an empty list, not an error.
    ///
    /// On resource archives this behaves like [`Mdict::locate`] with hex
    /// output, wrapped in a one-element list.
    pub fn lookup(&self, word: &str) -> Result<Vec<String>> {
        if self.header().kind == FileKind::Mdd {
            // Resource archives carry at most one value per key.
            let value = self.locate(word, ResourceEncoding::Hex)?;
            return Ok(if value.is_empty() { Vec::new() } else { vec![value] });
        }

        let folded = text::normalize_key(word);

        // Group matching keys by record block so each block is decoded once.
        let mut matched_blocks = BTreeSet::new();
        for entry in self.keys() {
            if entry.text == word || text::normalize_key(&entry.text) == folded {
                if let Some(rid) =
                    record_blocks::block_index_for(&self.record_directory.entries, entry.record_start)
                {
                    matched_blocks.insert(rid);
                }
            }
        }

        let mut results = Vec::new();
        for rid in matched_blocks {
            let block = self.read_record_block(rid)?;
            let pairs = self.block_pairs(&block, rid)?;

            // Raw matches first, then normalized matches not already taken.
            let mut taken = vec![false; pairs.len()];
            for (i, (key, value)) in pairs.iter().enumerate() {
                if *key == word {
                    results.push(decode_value_text(value));
                    taken[i] = true;
                }
            }
            for (i, (key, value)) in pairs.iter().enumerate() {
                if !taken[i] && text::normalize_key(key) == folded {
                    results.push(decode_value_text(value));
                }
            }
        }
        Ok(results)
    }

    /// Number of entries whose key equals `word` exactly, with no
    /// normalization. Duplicate keys are assumed adjacent in the file's
    /// native order; files that break that ordering will undercount.
    pub fn match_count(&self, word: &str) -> usize {
        let start = self.keys().partition_point(|k| k.text.as_str() < word);
        self.keys()[start..]
            .iter()
            .take_while(|k| k.text == word)
            .count()
    }

    /// Up to 50 keys whose lowercase form starts with the lowercase
    /// prefix, in file order. An empty prefix suggests nothing.
    pub fn suggest(&self, prefix: &str) -> Vec<String> {
        if prefix.is_empty() {
            return Vec::new();
        }
        let prefix = prefix.to_lowercase();
        let start = self.keys().partition_point(|k| k.text.to_lowercase() < prefix);

        let mut suggestions = Vec::new();
        for entry in &self.keys()[start..] {
            let lower = entry.text.to_lowercase();
            if lower.starts_with(&prefix) {
                suggestions.push(entry.text.clone());
                if suggestions.len() >= MAX_SUGGESTIONS {
                    break;
                }
            } else if lower.as_str() > prefix.as_str() {
                break;
            }
        }
        suggestions
    }

    /// Up to 50 keys matched by the case-insensitive pattern.
    ///
    /// Two shortcuts run before the regex engine: a `^literal` anchor
    /// binary-searches the starting key and bounds the scan, and the
    /// longest literal run anywhere in the pattern is required as a
    /// substring first. At most `regex_scan_limit` candidates reach the
    /// regex engine. An invalid pattern suggests nothing.
    pub fn regex_suggest(&self, pattern: &str) -> Vec<String> {
        if pattern.is_empty() {
            return Vec::new();
        }
        let re = match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re,
            Err(e) => {
                warn!("invalid pattern {pattern:?}: {e}");
                return Vec::new();
            }
        };

        let anchor = anchored_literal_prefix(pattern).to_lowercase();
        let required = longest_literal_run(pattern).to_lowercase();
        debug!("regex scan: anchor={anchor:?}, required substring={required:?}");

        let start = if anchor.is_empty() {
            0
        } else {
            self.keys().partition_point(|k| k.text.to_lowercase() < anchor)
        };

        let mut suggestions = Vec::new();
        let mut examined = 0usize;
        for entry in &self.keys()[start..] {
            let lower = entry.text.to_lowercase();
            if !anchor.is_empty() && !lower.starts_with(&anchor) {
                if lower.as_str() > anchor.as_str() {
                    break;
                }
                continue;
            }
            if !required.is_empty() && !lower.contains(&required) {
                continue;
            }

            if re.is_match(&entry.text) {
                suggestions.push(entry.text.clone());
                if suggestions.len() >= MAX_SUGGESTIONS {
                    break;
                }
            }
            examined += 1;
            if examined >= self.regex_scan_limit {
                debug!("regex scan ceiling reached after {examined} candidates");
                break;
            }
        }
        suggestions
    }

    /// Up to 50 keys whose value contains `query` case-insensitively.
    ///
    /// Every record block is decoded once, in order. A block that fails to
    /// decode is skipped with a warning rather than aborting the search.
    /// `progress` is invoked every five blocks with `current / total`.
    pub fn fulltext_search(
        &self,
        query: &str,
        mut progress: Option<&mut dyn FnMut(f32)>,
    ) -> Vec<String> {
        let query = query.to_lowercase();
        let total = self.num_record_blocks();
        let mut hits = Vec::new();

        for rid in 0..total {
            if rid % 5 == 0 {
                if let Some(report) = progress.as_mut() {
                    report(rid as f32 / total as f32);
                }
            }

            let block = match self.read_record_block(rid) {
                Ok(block) => block,
                Err(e) => {
                    warn!("full-text search: skipping record block {rid}: {e}");
                    continue;
                }
            };
            let pairs = match self.block_pairs(&block, rid) {
                Ok(pairs) => pairs,
                Err(e) => {
                    warn!("full-text search: skipping record block {rid}: {e}");
                    continue;
                }
            };

            for (key, value) in pairs {
                if decode_value_text(value).to_lowercase().contains(&query) {
                    hits.push(key.to_string());
                    if hits.len() >= MAX_SUGGESTIONS {
                        return hits;
                    }
                }
            }
        }
        hits
    }

    /// Resource-archive accessor returning the single value stored under
    /// `resource_name`, hex- or base64-encoded. The name is normalized to
    /// the archive convention (lowercase, backslash-separated, leading
    /// backslash) before matching. A missing resource yields an empty
    /// string.
    pub fn locate(&self, resource_name: &str, encoding: ResourceEncoding) -> Result<String> {
        let name = text::normalize_resource_name(resource_name);

        let Some(index) = self.keys().iter().position(|k| k.text == name) else {
            return Ok(String::new());
        };
        let record_start = self.keys()[index].record_start;
        let Some(rid) = record_blocks::block_index_for(&self.record_directory.entries, record_start)
        else {
            return Ok(String::new());
        };

        let block = self.read_record_block(rid)?;
        let value =
            record_blocks::value_slice(&block, &self.record_directory, self.keys(), index, rid)?;

        Ok(match encoding {
            ResourceEncoding::Hex => hex::encode_upper(value),
            ResourceEncoding::Base64 => STANDARD.encode(value),
        })
    }

    /// Indexes of the keys whose records live in record block `rid`.
    fn block_key_range(&self, rid: usize) -> Range<usize> {
        let meta = &self.record_directory.entries[rid];
        let start = self
            .keys()
            .partition_point(|k| k.record_start < meta.decompressed_offset);
        let end = self
            .keys()
            .partition_point(|k| k.record_start < meta.decompressed_offset + meta.decompressed_size);
        start..end
    }

    /// Every `(key, value bytes)` pair stored in record block `rid`, given
    /// the already-decoded block data.
    fn block_pairs<'a>(&self, block: &'a [u8], rid: usize) -> Result<Vec<(&str, &'a [u8])>> {
        let range = self.block_key_range(rid);
        let mut pairs = Vec::with_capacity(range.len());
        for index in range {
            let value =
                record_blocks::value_slice(block, &self.record_directory, self.keys(), index, rid)?;
            pairs.push((self.keys()[index].text.as_str(), value));
        }
        Ok(pairs)
    }
}

/// Text values are decoded as UTF-8 whatever the header declares; declared
/// encodings are unreliable for record bodies in circulating files.
/// Trailing NULs are stripped.
fn decode_value_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

/// Regex metacharacters that end a literal run.
const META: &[char] = &[
    '^', '$', '.', '*', '+', '?', '(', ')', '[', ']', '{', '}', '|', '\\',
];

/// The literal run immediately following a leading `^` anchor, if any.
fn anchored_literal_prefix(pattern: &str) -> &str {
    match pattern.strip_prefix('^') {
        Some(rest) => {
            let end = rest.find(|c| META.contains(&c)).unwrap_or(rest.len());
            &rest[..end]
        }
        None => "",
    }
}

/// The longest run of non-metacharacter text anywhere in the pattern.
fn longest_literal_run(pattern: &str) -> &str {
    let mut best = "";
    for run in pattern.split(|c| META.contains(&c)) {
        if run.len() > best.len() {
            best = run;
        }
    }
    best
}
