//! Text normalization and lexical scoring helpers shared by retrieval and
//! ingestion.
//!
//! Character coverage works per Unicode scalar value (`char`) on the
//! normalized text. Grapheme clusters are not merged, so a CJK query with no
//! word boundaries is scored character by character.

use std::collections::HashSet;

/// Ellipsis marker appended to truncated previews.
pub const ELLIPSIS: &str = "...";

/// Canonical form used for lexical matching: trimmed, lower-cased, with
/// newlines and tabs replaced by spaces and whitespace runs collapsed.
pub fn normalize(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_space = false;
    for ch in lowered.chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out.trim_end().to_string()
}

/// Distinct characters of `normalized`, excluding spaces.
pub fn unique_chars(normalized: &str) -> HashSet<char> {
    normalized.chars().filter(|c| *c != ' ').collect()
}

/// Fraction of the distinct query characters present anywhere in `haystack`.
/// Zero when the query has no non-space characters.
pub fn char_coverage(query_chars: &HashSet<char>, haystack: &str) -> f64 {
    if query_chars.is_empty() {
        return 0.0;
    }
    let hits = query_chars
        .iter()
        .filter(|c| haystack.contains(**c))
        .count();
    hits as f64 / query_chars.len() as f64
}

/// Truncate to at most `max_chars` characters on a char boundary, appending
/// [`ELLIPSIS`] when anything was cut.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Last path segment of an object key, e.g. `"a/b/photo.jpg"` → `"photo.jpg"`.
pub fn file_name_from_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Lower-cased extension of `filename` including the dot, or `".bin"`.
pub fn extension_or_default(filename: &str) -> String {
    let name = file_name_from_key(filename);
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => name[idx..].to_lowercase(),
        _ => ".bin".to_string(),
    }
}

/// Storage key for a freshly ingested asset: `"{id}/{id}{ext}"`.
pub fn storage_key(id: &str, filename: &str) -> String {
    format!("{}/{}{}", id, id, extension_or_default(filename))
}

/// Best guess at a MIME type from a file extension, for uploads that do
/// not declare one.
pub fn guess_mime_type(filename: &str) -> &'static str {
    match extension_or_default(filename).as_str() {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".pdf" => "application/pdf",
        ".txt" => "text/plain",
        ".md" | ".markdown" => "text/markdown",
        ".json" => "application/json",
        _ => "application/octet-stream",
    }
}
