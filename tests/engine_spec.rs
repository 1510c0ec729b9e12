//! End-to-end tests over synthesized dictionary files.
//!
//! The fixture builder writes complete files bit-exactly in the container
//! layout the engine parses, so every test exercises the real open path:
//! header XML, key-block directory, key blocks, record directory, record
//! blocks.

use std::fs::File;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use mdict_engine::{
    normalize_key, FileKind, Mdict, MdictError, MdictVersion, ResourceEncoding,
};

mod fixture {
    use adler2::adler32_slice;
    use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use ripemd::{Digest, Ripemd128};
    use std::io::Write;

    #[derive(Clone, Copy, PartialEq)]
    pub enum Layout {
        V1,
        V2,
    }

    /// Description of a dictionary file to synthesize.
    pub struct DictSpec {
        pub layout: Layout,
        pub engine_version: &'static str,
        pub encoding_label: &'static str,
        pub encrypted: &'static str,
        /// Encode keys (and the directory's first/last keys) as UTF-16LE.
        pub utf16_keys: bool,
        pub entries: Vec<(String, Vec<u8>)>,
        pub keys_per_block: usize,
        pub entries_per_record_block: usize,
        /// Declared entry count override (None = the actual count).
        pub declared_entries: Option<u64>,
        /// Compression tag stamped on key blocks (2 = zlib).
        pub key_block_tag: u8,
        pub corrupt_key_block_checksum: bool,
    }

    impl DictSpec {
        pub fn v2(entries: Vec<(String, Vec<u8>)>) -> Self {
            DictSpec {
                layout: Layout::V2,
                engine_version: "2.0",
                encoding_label: "UTF-8",
                encrypted: "No",
                utf16_keys: false,
                entries,
                keys_per_block: 2,
                entries_per_record_block: 2,
                declared_entries: None,
                key_block_tag: 2,
                corrupt_key_block_checksum: false,
            }
        }
    }

    fn write_number(out: &mut Vec<u8>, value: u64, width: usize) {
        if width == 8 {
            out.write_u64::<BigEndian>(value).unwrap();
        } else {
            out.write_u32::<BigEndian>(value as u32).unwrap();
        }
    }

    fn encode_key(key: &str, utf16: bool) -> Vec<u8> {
        if utf16 {
            key.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
        } else {
            key.as_bytes().to_vec()
        }
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// One tagged block: compression tag, big-endian Adler-32 of the body,
    /// then the (compressed) body.
    fn tagged_block(body: &[u8], tag: u8, corrupt_checksum: bool) -> Vec<u8> {
        let mut block = vec![tag, 0, 0, 0];
        let mut checksum = adler32_slice(body);
        if corrupt_checksum {
            checksum ^= 0xFFFF_FFFF;
        }
        block.extend(checksum.to_be_bytes());
        if tag == 2 {
            block.extend(zlib(body));
        } else {
            block.extend(body);
        }
        block
    }

    /// Inverse of the engine's descrambler, applied from byte 8 onward.
    fn scramble(payload: &mut [u8]) {
        let mut hasher = Ripemd128::new();
        hasher.update(&payload[4..8]);
        hasher.update([0x95, 0x36, 0x00, 0x00]);
        let key: [u8; 16] = hasher.finalize().into();

        let mut prev = 0x36u8;
        for i in 8..payload.len() {
            let j = i - 8;
            let cipher = (payload[i] ^ prev ^ (j as u8) ^ key[j % 16]).rotate_left(4);
            payload[i] = cipher;
            prev = cipher;
        }
    }

    pub fn build(spec: &DictSpec) -> Vec<u8> {
        let number_width = match spec.layout {
            Layout::V1 => 4,
            Layout::V2 => 8,
        };
        let unit = if spec.utf16_keys { 2 } else { 1 };
        let terminator_count = match spec.layout {
            Layout::V1 => 1,
            Layout::V2 => 2,
        };

        // Record offsets in the virtual concatenated decompressed stream.
        let mut record_starts = Vec::new();
        let mut acc = 0u64;
        for (_, value) in &spec.entries {
            record_starts.push(acc);
            acc += value.len() as u64;
        }

        // Key blocks and their directory descriptors.
        let mut key_blocks: Vec<Vec<u8>> = Vec::new();
        let mut descriptors = Vec::new();
        for (chunk_index, chunk) in spec.entries.chunks(spec.keys_per_block).enumerate() {
            let mut body = Vec::new();
            for (i, (key, _)) in chunk.iter().enumerate() {
                let global = chunk_index * spec.keys_per_block + i;
                write_number(&mut body, record_starts[global], number_width);
                body.extend(encode_key(key, spec.utf16_keys));
                body.extend(std::iter::repeat(0u8).take(unit));
            }
            let block = tagged_block(&body, spec.key_block_tag, spec.corrupt_key_block_checksum);

            write_number(&mut descriptors, chunk.len() as u64, number_width);
            for key in [&chunk[0].0, &chunk[chunk.len() - 1].0] {
                let encoded = encode_key(key, spec.utf16_keys);
                let chars = (encoded.len() / unit) as u64;
                match spec.layout {
                    Layout::V1 => descriptors.push(chars as u8),
                    Layout::V2 => descriptors.write_u16::<BigEndian>(chars as u16).unwrap(),
                }
                descriptors.extend(&encoded);
                descriptors.extend(std::iter::repeat(0u8).take(terminator_count * unit));
            }
            write_number(&mut descriptors, block.len() as u64, number_width);
            write_number(&mut descriptors, body.len() as u64, number_width);
            key_blocks.push(block);
        }

        // Key-block directory payload.
        let key_info_payload = match spec.layout {
            Layout::V1 => descriptors.clone(),
            Layout::V2 => {
                let mut payload = vec![0x02, 0x00, 0x00, 0x00];
                payload
                    .write_u32::<BigEndian>(adler32_slice(&descriptors))
                    .unwrap();
                payload.extend(zlib(&descriptors));
                if spec.encrypted.starts_with('2') {
                    scramble(&mut payload);
                }
                payload
            }
        };

        // Record blocks and their size pairs.
        let mut record_blocks: Vec<Vec<u8>> = Vec::new();
        let mut record_pairs = Vec::new();
        for chunk in spec.entries.chunks(spec.entries_per_record_block) {
            let mut body = Vec::new();
            for (_, value) in chunk {
                body.extend(value);
            }
            let block = tagged_block(&body, 2, false);
            record_pairs.push((block.len() as u64, body.len() as u64));
            record_blocks.push(block);
        }

        let declared_entries = spec
            .declared_entries
            .unwrap_or(spec.entries.len() as u64);

        // Assemble the file.
        let mut out = Vec::new();

        let xml = format!(
            r#"<Dictionary GeneratedByEngineVersion="{}" Encrypted="{}" Encoding="{}"/>"#,
            spec.engine_version, spec.encrypted, spec.encoding_label
        );
        let xml_bytes: Vec<u8> = xml.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        out.write_u32::<BigEndian>(xml_bytes.len() as u32).unwrap();
        out.extend(&xml_bytes);
        out.write_u32::<LittleEndian>(adler32_slice(&xml_bytes))
            .unwrap();

        let total_key_block_size: u64 = key_blocks.iter().map(|b| b.len() as u64).sum();
        let mut info = Vec::new();
        write_number(&mut info, key_blocks.len() as u64, number_width);
        write_number(&mut info, declared_entries, number_width);
        if spec.layout == Layout::V2 {
            write_number(&mut info, descriptors.len() as u64, number_width);
        }
        write_number(&mut info, key_info_payload.len() as u64, number_width);
        write_number(&mut info, total_key_block_size, number_width);
        out.extend(&info);
        if spec.layout == Layout::V2 {
            out.write_u32::<BigEndian>(adler32_slice(&info)).unwrap();
        }

        out.extend(&key_info_payload);
        for block in &key_blocks {
            out.extend(block);
        }

        let total_record_block_size: u64 = record_blocks.iter().map(|b| b.len() as u64).sum();
        write_number(&mut out, record_blocks.len() as u64, number_width);
        write_number(&mut out, declared_entries, number_width);
        write_number(
            &mut out,
            (record_pairs.len() * 2 * number_width) as u64,
            number_width,
        );
        write_number(&mut out, total_record_block_size, number_width);
        for (compressed, decompressed) in &record_pairs {
            write_number(&mut out, *compressed, number_width);
            write_number(&mut out, *decompressed, number_width);
        }
        for block in &record_blocks {
            out.extend(block);
        }

        out
    }
}

fn write_fixture(name: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "mdict-engine-test-{}-{}",
        std::process::id(),
        name
    ));
    std::fs::write(&path, bytes).expect("write fixture");
    path
}

/// Three fruit entries with HTML definitions, each NUL-terminated as text
/// dictionaries store them.
fn fruit_entries() -> Vec<(String, Vec<u8>)> {
    ["apple", "banana", "cherry"]
        .iter()
        .map(|word| {
            (
                word.to_string(),
                format!("<b>{word} def</b>\0").into_bytes(),
            )
        })
        .collect()
}

fn open_fruit_dict(name: &str) -> Mdict {
    let spec = fixture::DictSpec::v2(fruit_entries());
    let path = write_fixture(name, &fixture::build(&spec));
    Mdict::open(&path).expect("open fixture")
}

#[test]
fn lookup_matches_exact_and_folded_keys() {
    let dict = open_fruit_dict("lookup.mdx");

    assert_eq!(dict.num_entries(), 3);
    assert_eq!(dict.num_key_blocks(), 2);
    assert_eq!(dict.header().version, MdictVersion::V2);

    assert_eq!(dict.lookup("banana").unwrap(), vec!["<b>banana def</b>"]);
    // Folded match: normalization lowercases ASCII.
    assert_eq!(dict.lookup("BANANA").unwrap(), vec!["<b>banana def</b>"]);
    assert_eq!(dict.lookup("grape").unwrap(), Vec::<String>::new());

    // Round trip every entry through the full decode path.
    for word in ["apple", "banana", "cherry"] {
        assert_eq!(dict.lookup(word).unwrap(), vec![format!("<b>{word} def</b>")]);
    }
}

#[test]
fn key_index_is_ordered_and_directory_is_decoded() {
    let dict = open_fruit_dict("index.mdx");

    let keys = dict.keys();
    assert!(keys
        .windows(2)
        .all(|pair| pair[0].record_start < pair[1].record_start));

    let infos = dict.key_block_infos();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].first_key, "apple");
    assert_eq!(infos[0].last_key, "banana");
    assert_eq!(infos[1].first_key, "cherry");
    assert_eq!(infos[0].compressed_offset, 0);
    assert_eq!(infos[1].compressed_offset, infos[0].compressed_size);
}

#[test]
fn suggest_returns_prefix_matches_in_order() {
    let dict = open_fruit_dict("suggest.mdx");

    assert_eq!(dict.suggest("ba"), vec!["banana"]);
    assert_eq!(dict.suggest(""), Vec::<String>::new());
    assert_eq!(dict.suggest("a"), vec!["apple"]);
    assert_eq!(dict.suggest("APP"), vec!["apple"]);
    assert_eq!(dict.suggest("zz"), Vec::<String>::new());
}

#[test]
fn legacy_layout_uses_narrow_fields() {
    let mut spec = fixture::DictSpec::v2(fruit_entries());
    spec.layout = fixture::Layout::V1;
    spec.engine_version = "1.2";
    let path = write_fixture("legacy.mdx", &fixture::build(&spec));

    let dict = Mdict::open(&path).expect("open v1.2 fixture");
    assert_eq!(dict.header().version, MdictVersion::V1);
    assert_eq!(dict.num_entries(), 3);
    assert_eq!(dict.lookup("cherry").unwrap(), vec!["<b>cherry def</b>"]);
    assert_eq!(dict.suggest("ch"), vec!["cherry"]);
}

#[test]
fn utf16_dictionary_decodes_keys() {
    let mut spec = fixture::DictSpec::v2(fruit_entries());
    spec.encoding_label = "UTF-16";
    spec.utf16_keys = true;
    let path = write_fixture("utf16.mdx", &fixture::build(&spec));

    let dict = Mdict::open(&path).expect("open utf16 fixture");
    assert_eq!(dict.num_entries(), 3);
    assert_eq!(dict.lookup("banana").unwrap(), vec!["<b>banana def</b>"]);
    assert_eq!(dict.key_block_infos()[1].first_key, "cherry");
}

#[test]
fn resource_archive_locates_values_as_hex_and_base64() {
    let png_stub: Vec<u8> = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x01];
    let mut spec = fixture::DictSpec::v2(vec![
        ("\\images\\a.png".to_string(), png_stub.clone()),
        ("\\style.css".to_string(), b"body{}".to_vec()),
    ]);
    spec.utf16_keys = true;
    let path = write_fixture("res.mdd", &fixture::build(&spec));

    let dict = Mdict::open(&path).expect("open mdd fixture");
    assert_eq!(dict.header().kind, FileKind::Mdd);

    let hex_value = dict
        .locate("/images/a.png", ResourceEncoding::Hex)
        .unwrap();
    assert_eq!(hex_value.len(), 20);
    assert_eq!(hex_value, hex::encode_upper(&png_stub));

    let b64_value = dict
        .locate("/images/a.png", ResourceEncoding::Base64)
        .unwrap();
    assert_eq!(b64_value, STANDARD.encode(&png_stub));

    // lookup on a resource archive behaves like hex locate.
    assert_eq!(dict.lookup("/images/a.png").unwrap(), vec![hex_value]);
    assert_eq!(
        dict.locate("/missing.png", ResourceEncoding::Hex).unwrap(),
        ""
    );
}

#[test]
fn from_file_takes_ownership_of_the_handle() {
    let spec = fixture::DictSpec::v2(fruit_entries());
    let path = write_fixture("handle.mdx", &fixture::build(&spec));

    let file = File::open(&path).expect("open handle");
    let dict = Mdict::from_file(file, FileKind::Mdx).expect("engine from handle");
    assert_eq!(dict.lookup("apple").unwrap(), vec!["<b>apple def</b>"]);
}

#[test]
fn scrambled_key_directory_is_descrambled() {
    let mut spec = fixture::DictSpec::v2(fruit_entries());
    spec.encrypted = "2";
    let path = write_fixture("scrambled.mdx", &fixture::build(&spec));

    let dict = Mdict::open(&path).expect("open scrambled fixture");
    assert_eq!(dict.num_entries(), 3);
    assert_eq!(dict.lookup("banana").unwrap(), vec!["<b>banana def</b>"]);
}

#[test]
fn record_encryption_is_rejected() {
    for flag in ["Yes", "1"] {
        let mut spec = fixture::DictSpec::v2(fruit_entries());
        spec.encrypted = flag;
        let path = write_fixture(&format!("encrypted-{flag}.mdx"), &fixture::build(&spec));

        let err = Mdict::open(&path).expect_err("record encryption must be rejected");
        assert!(matches!(err, MdictError::UnsupportedEncryption));
    }
}

#[test]
fn stored_and_lzo_blocks_are_rejected() {
    for tag in [0u8, 1u8] {
        let mut spec = fixture::DictSpec::v2(fruit_entries());
        spec.key_block_tag = tag;
        let path = write_fixture(&format!("tag-{tag}.mdx"), &fixture::build(&spec));

        let err = Mdict::open(&path).expect_err("non-zlib blocks must be rejected");
        assert!(matches!(err, MdictError::UnsupportedCompression(t) if t == tag));
    }
}

#[test]
fn corrupted_block_checksum_is_detected() {
    let mut spec = fixture::DictSpec::v2(fruit_entries());
    spec.corrupt_key_block_checksum = true;
    let path = write_fixture("corrupt.mdx", &fixture::build(&spec));

    let err = Mdict::open(&path).expect_err("corrupted checksum must be detected");
    assert!(matches!(err, MdictError::ChecksumMismatch { .. }));
}

#[test]
fn declared_entry_count_mismatch_is_tolerated() {
    let mut spec = fixture::DictSpec::v2(fruit_entries());
    spec.declared_entries = Some(4);
    let path = write_fixture("miscount.mdx", &fixture::build(&spec));

    // The mismatch is only a warning; the file still opens and queries.
    let dict = Mdict::open(&path).expect("open despite declared miscount");
    assert_eq!(dict.num_entries(), 3);
    assert_eq!(dict.lookup("apple").unwrap(), vec!["<b>apple def</b>"]);
}

#[test]
fn match_count_counts_adjacent_duplicates() {
    let entries = vec![
        ("duplicate".to_string(), b"first sense\0".to_vec()),
        ("duplicate".to_string(), b"second sense\0".to_vec()),
        ("zebra".to_string(), b"stripes\0".to_vec()),
    ];
    let spec = fixture::DictSpec::v2(entries);
    let path = write_fixture("dups.mdx", &fixture::build(&spec));

    let dict = Mdict::open(&path).expect("open duplicate fixture");
    assert_eq!(dict.match_count("duplicate"), 2);
    assert_eq!(dict.match_count("DUPLICATE"), 0);
    assert_eq!(dict.match_count("missing"), 0);

    // Both senses come back, in file order.
    assert_eq!(
        dict.lookup("duplicate").unwrap(),
        vec!["first sense", "second sense"]
    );
}

#[test]
fn regex_suggest_filters_and_bounds_the_scan() {
    let mut dict = open_fruit_dict("regex.mdx");

    assert_eq!(dict.regex_suggest("^ba.*"), vec!["banana"]);
    assert_eq!(dict.regex_suggest("^BA"), vec!["banana"]);
    assert_eq!(dict.regex_suggest("err"), vec!["cherry"]);
    assert_eq!(dict.regex_suggest("n.n"), vec!["banana"]);
    assert_eq!(dict.regex_suggest("("), Vec::<String>::new());
    assert_eq!(dict.regex_suggest(""), Vec::<String>::new());

    // The candidate ceiling stops the scan after one examined key.
    dict.set_regex_scan_limit(1);
    assert_eq!(dict.regex_suggest(".*"), vec!["apple"]);
}

#[test]
fn fulltext_search_scans_blocks_and_reports_progress() {
    let mut entries: Vec<(String, Vec<u8>)> = (0..200)
        .map(|i| {
            (
                format!("word{i:03}"),
                format!("plain filler definition {i:03}\0").into_bytes(),
            )
        })
        .collect();
    entries[123].1 = b"hidden xyzzy token\0".to_vec();

    let mut spec = fixture::DictSpec::v2(entries);
    spec.keys_per_block = 50;
    spec.entries_per_record_block = 1;
    let path = write_fixture("fulltext.mdx", &fixture::build(&spec));

    let dict = Mdict::open(&path).expect("open fulltext fixture");
    assert_eq!(dict.num_record_blocks(), 200);

    let mut reports = Vec::new();
    let mut progress = |ratio: f32| reports.push(ratio);
    let hits = dict.fulltext_search("XYZZY", Some(&mut progress));

    assert_eq!(hits, vec!["word123"]);
    assert!(reports.len() >= 200 / 5);
    assert!(reports.iter().all(|r| (0.0..=1.0).contains(r)));
    assert!(reports.windows(2).all(|pair| pair[0] < pair[1]));

    // Case-insensitive over the value body, and capped hits still return.
    let hits = dict.fulltext_search("definition", None);
    assert_eq!(hits.len(), 50);
}

#[test]
fn normalize_key_folds_ascii_and_keeps_everything_else() {
    assert_eq!(normalize_key("Hello, World!"), "helloworld");
    assert_eq!(normalize_key("off-the_record (v2)"), "offtherecordv2");
    // Non-ASCII passes through untouched.
    assert_eq!(normalize_key("日本語-テスト"), "日本語テスト");
    assert_eq!(normalize_key("Déjà Vu"), "déjàvu");

    // Idempotence.
    for sample in ["Hello, World!", "a:b.c", "ALPHA", "日本語"] {
        let once = normalize_key(sample);
        assert_eq!(normalize_key(&once), once);
    }
}
