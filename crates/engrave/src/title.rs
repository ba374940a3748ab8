//! Title extraction and output naming.
//!
//! Matching is deliberately shallow: the first `\header { ... }` block, cut
//! at its first closing brace, and the first `title = "..."` inside it.

use regex::Regex;
use std::sync::OnceLock;

/// Characters that cannot appear in a filename on at least one platform.
const RESERVED: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

pub(crate) fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\header\s*\{([^}]*)\}").expect("header regex is valid"))
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"title\s*=\s*"([^"]*)""#).expect("title regex is valid"))
}

/// Pull the display title out of LilyPond source, sanitized for use as a filename.
pub fn extract_title(source: &str) -> Option<String> {
    let header = header_re().captures(source)?.get(1)?.as_str();
    let title = title_re().captures(header)?.get(1)?.as_str();
    Some(sanitize_filename(title))
}

/// Replace each of `\ / : * ? " < > |` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .collect()
}

/// Output name for a conversion: the source's title, else `fallback`.
pub fn suggest_base_name(source: &str, fallback: &str) -> String {
    extract_title(source)
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| sanitize_filename(fallback))
}
