//! Page id anonymization.

use rand::Rng;
use serde_json::Value;

use seedcrawl_shared::{Result, SeedcrawlError};

/// Length of a page id in hex characters.
const PAGE_ID_LEN: usize = 32;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Generate a random lowercase hex string of `len` characters.
///
/// Not cryptographically secure; only meant to scrub ids from shareable data.
pub fn random_hex(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| HEX_DIGITS[rng.random_range(0..HEX_DIGITS.len())] as char)
        .collect()
}

/// Return a copy of `record` with `metadata.id` replaced by a random surrogate.
///
/// Every occurrence of the original id (dashes removed) inside `metadata.url`
/// is replaced by the same surrogate. `content`, `urls` and the remaining
/// metadata fields are left as they are. The input is never modified.
pub fn obfuscate_record(record: &Value) -> Result<Value> {
    let mut obfuscated = record.clone();

    let metadata = obfuscated
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| SeedcrawlError::schema("record has no `metadata` object"))?;

    let original_id = metadata
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| SeedcrawlError::schema("`metadata.id` is missing or not a string"))?
        .to_owned();
    let url = metadata
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| SeedcrawlError::schema("`metadata.url` is missing or not a string"))?
        .to_owned();

    let fake_id = random_hex(PAGE_ID_LEN);
    let flattened_original_id = original_id.replace('-', "");

    // An empty pattern would match between every character.
    let new_url = if flattened_original_id.is_empty() {
        url
    } else {
        url.replace(&flattened_original_id, &fake_id)
    };

    metadata.insert("id".into(), Value::String(fake_id));
    metadata.insert("url".into(), Value::String(new_url));

    Ok(obfuscated)
}
