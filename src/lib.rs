//! Read-only engine for MDict dictionary containers.
//!
//! Opens an `.mdx` (text dictionary) or `.mdd` (resource archive) file,
//! parses the versioned binary layout, indexes every key eagerly, and
//! decodes record blocks on demand to answer four query families: exact
//! lookup, prefix suggestion, regex suggestion, and full-text search.
//!
//! ```no_run
//! use mdict_engine::Mdict;
//!
//! # fn main() -> mdict_engine::Result<()> {
//! let dict = Mdict::open("example.mdx")?;
//! for definition in dict.lookup("banana")? {
//!     println!("{definition}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod mdict;

pub use mdict::error::{MdictError, Result};
pub use mdict::models::{
    EncryptionMode, FileKind, KeyBlockInfo, KeyEntry, MdictHeader, MdictVersion,
    RecordHeaderEntry, ResourceEncoding,
};
pub use mdict::text::{normalize_key, normalize_resource_name};
pub use mdict::{Mdict, DEFAULT_REGEX_SCAN_LIMIT};
