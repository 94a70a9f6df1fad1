//! File-backed page storage.
//!
//! Pages are stored as one pretty-printed JSON record per file
//! (`{"metadata": {...}, "content": ..., "urls": [...]}`), optionally with a
//! `.txt` sibling holding just the content.
//!
//! - [`load_page`] / [`load_pages_dir`] read records back, failing with
//!   `NotFound` or `SchemaInvalid`.
//! - [`persist_page`] writes a record, optionally through [`obfuscate_record`].

mod obfuscate;
mod page;

pub use obfuscate::{obfuscate_record, random_hex};
pub use page::{PersistOptions, load_page, load_pages_dir, persist_page};
