use crate::constants::FALLBACK_NAME_PREFIX;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

fn disallowed_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Anything that is not a word character, whitespace, dot or hyphen
    PATTERN.get_or_init(|| Regex::new(r"[^\w\s.-]").expect("valid sanitization pattern"))
}

/// Strips every character that would trip up the chat attachment name.
///
/// Word characters (Unicode letters, digits, underscore), whitespace, `.` and
/// `-` survive; everything else is removed. Applying it twice is the same as
/// applying it once.
pub fn sanitize_file_name(name: &str) -> String {
    disallowed_chars().replace_all(name, "").into_owned()
}

/// Sanitizes `original`, falling back to a generated name when nothing usable
/// is left of the stem.
pub fn sanitized_name_or_fallback(original: &str) -> String {
    let sanitized = sanitize_file_name(original);
    if !stem_is_empty(&sanitized) {
        return sanitized;
    }

    let extension = original
        .rsplit_once('.')
        .map(|(_, ext)| sanitize_file_name(ext))
        .filter(|ext| !ext.is_empty());

    let generated = format!("{}{}", FALLBACK_NAME_PREFIX, Uuid::new_v4().simple());
    let fallback = match extension {
        Some(ext) => format!("{}.{}", generated, ext),
        None => generated,
    };

    tracing::warn!(
        "File name {:?} has no usable characters, using {:?}",
        original,
        fallback
    );
    fallback
}

fn stem_is_empty(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, _)) => stem.trim_matches('.').trim().is_empty(),
        None => name.trim().is_empty(),
    }
}
