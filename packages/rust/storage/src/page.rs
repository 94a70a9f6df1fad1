//! Loading and persisting page records.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use seedcrawl_shared::{Page, Result, SeedcrawlError};

use crate::obfuscate::obfuscate_record;

/// Options for [`persist_page`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistOptions {
    /// Replace the page id (and its occurrences in the URL) with a random one.
    pub obfuscate: bool,
    /// Also write `<name>.txt` next to the record, holding only the content.
    pub also_write_text: bool,
}

/// Read a page record from `path`.
///
/// Fails with `NotFound` if the file does not exist and `SchemaInvalid` if it
/// is not UTF-8 JSON of the page shape.
pub fn load_page(path: &Path) -> Result<Page> {
    let bytes = std::fs::read(path).map_err(|e| SeedcrawlError::io(path, e))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| SeedcrawlError::schema(format!("{}: {e}", path.display())))
}

/// Load every `*.json` page directly under `dir`, in file name order.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn load_pages_dir(dir: &Path) -> Result<Vec<Page>> {
    let entries = std::fs::read_dir(dir).map_err(|e| SeedcrawlError::io(dir, e))?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| SeedcrawlError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let pages = paths
        .iter()
        .map(|p| load_page(p))
        .collect::<Result<Vec<_>>>()?;

    debug!(count = pages.len(), "loaded pages");
    Ok(pages)
}

/// Write `page` to `path`, overwriting any existing file.
///
/// Obfuscation is applied to the serialized record, never to `page` itself.
pub fn persist_page(page: &Page, path: &Path, options: &PersistOptions) -> Result<()> {
    let mut record = serde_json::to_value(page)
        .map_err(|e| SeedcrawlError::schema(format!("failed to serialize page: {e}")))?;

    if options.obfuscate {
        record = obfuscate_record(&record)?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SeedcrawlError::io(parent, e))?;
    }

    std::fs::write(path, to_pretty_json(&record)?).map_err(|e| SeedcrawlError::io(path, e))?;

    if options.also_write_text {
        let txt_path = path.with_extension("txt");
        std::fs::write(&txt_path, &page.content).map_err(|e| SeedcrawlError::io(&txt_path, e))?;
    }

    debug!(path = %path.display(), obfuscated = options.obfuscate, "persisted page");
    Ok(())
}

/// Pretty-print with 4-space indentation. Non-ASCII text is written as-is.
fn to_pretty_json(record: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    record
        .serialize(&mut ser)
        .map_err(|e| SeedcrawlError::schema(format!("failed to encode page: {e}")))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use seedcrawl_shared::{PageMetadata, Properties};
    use uuid::Uuid;

    use super::*;

    const PAGE_ID: &str = "9f86d081884c7d659a2feaa0c55ad015";

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("seedcrawl-{label}-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_page() -> Page {
        let mut properties = Properties::new();
        properties.insert("status".into(), serde_json::json!("draft"));
        properties.insert("rank".into(), serde_json::json!(3));
        Page {
            metadata: PageMetadata {
                id: PAGE_ID.into(),
                url: format!("https://www.notion.so/Ideas-{PAGE_ID}"),
                title: "Idées".into(),
                properties,
            },
            content: "Première ligne\nsecond line".into(),
            urls: vec![
                "https://example.com/a".into(),
                "https://example.com/b".into(),
            ],
        }
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let dir = temp_dir("roundtrip");
        let path = dir.join("page.json");
        let page = sample_page();

        persist_page(&page, &path, &PersistOptions::default()).unwrap();
        let loaded = load_page(&path).unwrap();
        assert_eq!(loaded, page);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn persisted_json_uses_four_space_indent_and_raw_utf8() {
        let dir = temp_dir("format");
        let path = dir.join("page.json");
        persist_page(&sample_page(), &path, &PersistOptions::default()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n    \"metadata\": {\n        \"id\""));
        assert!(text.contains("\"title\": \"Idées\""));
        assert!(!text.contains("\\u00e9"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn obfuscated_persist_leaves_caller_page_untouched() {
        let dir = temp_dir("obfuscate");
        let path = dir.join("page.json");
        let page = sample_page();
        let options = PersistOptions {
            obfuscate: true,
            also_write_text: false,
        };

        persist_page(&page, &path, &options).unwrap();
        assert_eq!(page.metadata.id, PAGE_ID);

        let stored = load_page(&path).unwrap();
        assert_ne!(stored.metadata.id, PAGE_ID);
        assert_eq!(
            stored.metadata.url,
            format!("https://www.notion.so/Ideas-{}", stored.metadata.id)
        );
        assert_eq!(stored.content, page.content);
        assert_eq!(stored.urls, page.urls);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn text_sibling_holds_content_only() {
        let dir = temp_dir("txt");
        let path = dir.join("nested").join("page.json");
        let options = PersistOptions {
            obfuscate: false,
            also_write_text: true,
        };

        persist_page(&sample_page(), &path, &options).unwrap();
        let txt = std::fs::read_to_string(dir.join("nested").join("page.txt")).unwrap();
        assert_eq!(txt, "Première ligne\nsecond line");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn persist_overwrites_existing_file() {
        let dir = temp_dir("overwrite");
        let path = dir.join("page.json");
        std::fs::write(&path, "stale").unwrap();

        persist_page(&sample_page(), &path, &PersistOptions::default()).unwrap();
        assert_eq!(load_page(&path).unwrap().metadata.id, PAGE_ID);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = temp_dir("missing");
        let err = load_page(&dir.join("nope.json")).unwrap_err();
        assert!(matches!(err, SeedcrawlError::NotFound { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_rejects_wrong_shape() {
        let dir = temp_dir("schema");

        let missing_urls = dir.join("missing_urls.json");
        std::fs::write(
            &missing_urls,
            r#"{"metadata": {"id": "a", "url": "u", "title": "t", "properties": {}},
                "content": "c"}"#,
        )
        .unwrap();
        assert!(matches!(
            load_page(&missing_urls),
            Err(SeedcrawlError::SchemaInvalid { .. })
        ));

        let wrong_type = dir.join("wrong_type.json");
        std::fs::write(
            &wrong_type,
            r#"{"metadata": {"id": 1, "url": "u", "title": "t", "properties": {}},
                "content": "c", "urls": []}"#,
        )
        .unwrap();
        assert!(matches!(
            load_page(&wrong_type),
            Err(SeedcrawlError::SchemaInvalid { .. })
        ));

        let garbage = dir.join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(matches!(
            load_page(&garbage),
            Err(SeedcrawlError::SchemaInvalid { .. })
        ));

        let latin1 = dir.join("latin1.json");
        std::fs::write(&latin1, b"{\xff\xfe}").unwrap();
        assert!(matches!(
            load_page(&latin1),
            Err(SeedcrawlError::SchemaInvalid { .. })
        ));

        let latin1_title = dir.join("latin1_title.json");
        let mut bytes = br#"{"metadata": {"id": "a", "url": "u", "title": ""#.to_vec();
        bytes.push(0xe9);
        bytes.extend_from_slice(br#"", "properties": {}}, "content": "c", "urls": []}"#);
        std::fs::write(&latin1_title, bytes).unwrap();
        assert!(matches!(
            load_page(&latin1_title),
            Err(SeedcrawlError::SchemaInvalid { .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_pages_dir_reads_json_files_in_order() {
        let dir = temp_dir("dir");
        let mut first = sample_page();
        first.metadata.id = "00000000000000000000000000000001".into();
        let mut second = sample_page();
        second.metadata.id = "00000000000000000000000000000002".into();

        let options = PersistOptions {
            obfuscate: false,
            also_write_text: true,
        };
        persist_page(&second, &dir.join("b.json"), &options).unwrap();
        persist_page(&first, &dir.join("a.json"), &options).unwrap();

        let pages = load_pages_dir(&dir).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].metadata.id, first.metadata.id);
        assert_eq!(pages[1].metadata.id, second.metadata.id);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_pages_dir_missing_dir_is_not_found() {
        let err = load_pages_dir(Path::new("/definitely/not/a/seedcrawl/dir")).unwrap_err();
        assert!(matches!(err, SeedcrawlError::NotFound { .. }));
    }
}
