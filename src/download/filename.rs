//! Filesystem-safe names derived from media titles.

/// Characters rejected in file names on at least one supported platform.
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const FALLBACK_NAME: &str = "download";

/// Longest stem in bytes. Leaves room for the extension and the fetcher's
/// `.part`/`.temp` suffixes under the common 255-byte name limit.
pub const MAX_STEM_BYTES: usize = 200;

pub fn is_reserved(c: char) -> bool {
    c.is_control() || RESERVED_CHARS.contains(&c)
}

/// Replaces every reserved character with `_`. Idempotent.
pub fn sanitize_file_name(title: &str) -> String {
    let sanitized: String = title
        .trim()
        .chars()
        .map(|c| if is_reserved(c) { '_' } else { c })
        .collect();

    if sanitized.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        sanitized
    }
}

/// Cuts `stem` to at most `max_bytes` on a character boundary.
pub fn truncate_stem(stem: &str, max_bytes: usize) -> &str {
    if stem.len() <= max_bytes {
        return stem;
    }
    let mut end = max_bytes;
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    stem[..end].trim_end()
}

/// Stem for the fetcher's `-o` template. `%` is doubled so a title can't
/// expand into template fields.
pub fn template_stem(title: &str) -> String {
    let sanitized = sanitize_file_name(title);
    truncate_stem(&sanitized, MAX_STEM_BYTES).replace('%', "%%")
}
