//! Filename and folder derivation for archive entries.
//!
//! Everything written into the archive goes through this module so that one
//! unit's three files (raw attachment, combined PDF, combined JSON) always
//! share a single base-name stem — including the collision suffix.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

/// Fallback for an empty entity folder name.
pub const ENTITY_FALLBACK: &str = "Unknown";
/// Fallback for an empty subject slug.
pub const SUBJECT_FALLBACK: &str = "No_Subject";
/// Sentinel used when a `Date:` header cannot be parsed.
pub const DATE_FALLBACK: &str = "Unknown_Date";

/// Characters stripped from path segments outright.
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Sanitize a string into a filesystem-safe, human-legible path segment.
///
/// Strips `<>:"/\|?*`, collapses whitespace/underscore runs to a single `_`,
/// trims leading and trailing underscores and truncates to `max_len`
/// characters. An empty result falls back to `fallback`.
///
/// Idempotent: `sanitize_segment(sanitize_segment(x)) == sanitize_segment(x)`.
pub fn sanitize_segment(raw: &str, max_len: usize, fallback: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.chars() {
        if FORBIDDEN.contains(&ch) {
            continue;
        }
        if ch.is_whitespace() || ch == '_' {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('_');
        }
        pending_sep = false;
        out.push(ch);
    }

    let truncated: String = out.chars().take(max_len).collect();
    let trimmed = truncated.trim_matches('_');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a `Date:` header value.
///
/// Tries RFC 2822 first (the normal header form), then RFC 3339, then a few
/// common naive formats. Returns `None` rather than erroring — one bad date
/// must never abort an archive build.
pub fn parse_mail_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S %z", "%d %b %Y %H:%M:%S %z"] {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().fixed_offset());
    }
    None
}

/// `YYYY-MM-DD` prefix for archive file names.
///
/// Unparsable dates yield the [`DATE_FALLBACK`] sentinel instead of an error.
pub fn date_prefix(raw: &str) -> String {
    match parse_mail_date(raw) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => DATE_FALLBACK.to_string(),
    }
}

/// Split a filename into `(stem, extension)`.
///
/// The extension excludes the dot. Leading-dot names (`.hidden`) and names
/// without a dot have no extension.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => {
            (&name[..idx], Some(&name[idx + 1..]))
        }
        _ => (name, None),
    }
}

/// True when `rest` is empty or an optional separator followed by digits.
fn optional_digits(rest: &str) -> bool {
    let rest = rest
        .strip_prefix(['_', '-', ' '])
        .unwrap_or(rest);
    rest.is_empty() || rest.chars().all(|c| c.is_ascii_digit())
}

/// True when `rest` is a non-empty digit run (optional separator allowed).
fn required_digits(rest: &str) -> bool {
    let rest = rest
        .strip_prefix(['_', '-', ' '])
        .unwrap_or(rest);
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// Whether a filename is a vendor-assigned placeholder carrying no meaning.
///
/// The closed set (stem compared case-folded, extension ignored):
/// `inline`, `attachment`, `noname` — optionally followed by digits;
/// `att`, `image`, `file` — followed by digits; and anything starting with
/// `unnamed`. Empty names count as generic too.
pub fn is_generic_filename(name: &str) -> bool {
    let (stem, _) = split_extension(name.trim());
    let stem = stem.to_lowercase();

    if stem.is_empty() {
        return true;
    }
    if stem.starts_with("unnamed") {
        return true;
    }
    for word in ["inline", "attachment", "noname"] {
        if let Some(rest) = stem.strip_prefix(word) {
            if optional_digits(rest) {
                return true;
            }
        }
    }
    for word in ["att", "image", "file"] {
        if let Some(rest) = stem.strip_prefix(word) {
            if required_digits(rest) {
                return true;
            }
        }
    }
    false
}

/// Replace a generic attachment name with a subject-derived one.
///
/// `inline_1.pdf` + subject `"March Invoice"` → `March_Invoice.pdf`.
/// Non-generic names, and generic names without a usable subject, are
/// returned unchanged.
pub fn clean_attachment_name(original: &str, subject: Option<&str>) -> String {
    if !is_generic_filename(original) {
        return original.to_string();
    }
    let Some(subject) = subject.map(str::trim).filter(|s| !s.is_empty()) else {
        return original.to_string();
    };
    let slug = sanitize_segment(subject, 80, SUBJECT_FALLBACK);
    match split_extension(original).1 {
        Some(ext) => format!("{slug}.{ext}"),
        None => slug,
    }
}

/// Per-archive collision table for base-name stems.
///
/// Counters are scoped per `(entity folder, stem)` key. The allocator is the
/// single derivation path for every stem in a build — the raw file, combined
/// PDF and combined JSON of one unit are named from ONE allocation, so their
/// suffixes can never drift apart.
#[derive(Debug, Default)]
pub struct NameAllocator {
    counters: HashMap<(String, String), u32>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a stem within an entity folder.
    ///
    /// The first use of a stem returns it unchanged; repeats return
    /// `stem_2`, `stem_3`, … A suffixed candidate can itself collide with a
    /// naturally derived stem (a subject that already ends in `_2`), so each
    /// candidate is re-checked and reserved before it is handed out. Call
    /// once per unit, not once per file.
    pub fn allocate(&mut self, entity_folder: &str, stem: &str) -> String {
        let key = (entity_folder.to_string(), stem.to_string());
        let count = self.counters.entry(key).or_insert(0);
        *count += 1;
        if *count == 1 {
            return stem.to_string();
        }
        let mut n = *count;
        loop {
            let candidate = format!("{stem}_{n}");
            let key = (entity_folder.to_string(), candidate.clone());
            let used = self.counters.entry(key).or_insert(0);
            if *used == 0 {
                *used = 1;
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_and_collapses() {
        assert_eq!(sanitize_segment("March Invoice", 80, "x"), "March_Invoice");
        assert_eq!(sanitize_segment("a/b\\c:d*e?f", 80, "x"), "abcdef");
        assert_eq!(sanitize_segment("  lots   of\t space ", 80, "x"), "lots_of_space");
        assert_eq!(sanitize_segment("__already__done__", 80, "x"), "already_done");
    }

    #[test]
    fn test_sanitize_fallbacks() {
        assert_eq!(sanitize_segment("", 80, ENTITY_FALLBACK), "Unknown");
        assert_eq!(sanitize_segment("???***", 80, SUBJECT_FALLBACK), "No_Subject");
    }

    #[test]
    fn test_sanitize_truncates_to_char_len() {
        let out = sanitize_segment("abcdefghij", 4, "x");
        assert_eq!(out, "abcd");
        // Truncation must not leave a trailing underscore.
        let out = sanitize_segment("abc defghij", 4, "x");
        assert_eq!(out, "abc");
    }

    #[test]
    fn test_sanitize_idempotent() {
        for raw in [
            "March Invoice",
            "  a  b  ",
            "weird<>:\"/\\|?*chars",
            "___",
            "trailing_underscore_",
            "Ünïcode — subject",
        ] {
            let once = sanitize_segment(raw, 40, "Unknown");
            let twice = sanitize_segment(&once, 40, "Unknown");
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_date_prefix_formats() {
        assert_eq!(date_prefix("Fri, 15 Mar 2024 09:30:00 +0100"), "2024-03-15");
        assert_eq!(date_prefix("2024-03-15T09:30:00Z"), "2024-03-15");
        assert_eq!(date_prefix("2024-03-15"), "2024-03-15");
    }

    #[test]
    fn test_date_prefix_sentinel() {
        assert_eq!(date_prefix("not a date"), DATE_FALLBACK);
        assert_eq!(date_prefix(""), DATE_FALLBACK);
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("invoice.pdf"), ("invoice", Some("pdf")));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", Some("gz")));
        assert_eq!(split_extension("README"), ("README", None));
        assert_eq!(split_extension(".hidden"), (".hidden", None));
        assert_eq!(split_extension("dot."), ("dot.", None));
    }

    #[test]
    fn test_generic_filenames() {
        for name in [
            "inline",
            "inline_1.pdf",
            "attachment.pdf",
            "attachment2",
            "noname.jpg",
            "att001.dat",
            "image003.png",
            "file1",
            "unnamed",
            "unnamed-attachment.bin",
            "ATT00042.htm",
            "",
        ] {
            assert!(is_generic_filename(name), "{name:?} should be generic");
        }
    }

    #[test]
    fn test_non_generic_filenames() {
        for name in [
            "invoice-march.pdf",
            "attention.pdf", // "att" prefix but no digit run
            "imagery.png",
            "filesystem.txt",
            "profile.jpg",
            "inline-styles.css",
        ] {
            assert!(!is_generic_filename(name), "{name:?} should not be generic");
        }
    }

    #[test]
    fn test_clean_attachment_name() {
        assert_eq!(
            clean_attachment_name("inline_1.pdf", Some("March Invoice")),
            "March_Invoice.pdf"
        );
        assert_eq!(
            clean_attachment_name("noname.jpg", Some("March Invoice")),
            "March_Invoice.jpg"
        );
        assert_eq!(
            clean_attachment_name("invoice-march.pdf", Some("March Invoice")),
            "invoice-march.pdf"
        );
        // No subject available — keep the original, generic or not.
        assert_eq!(clean_attachment_name("inline_1.pdf", None), "inline_1.pdf");
        assert_eq!(clean_attachment_name("inline_1.pdf", Some("  ")), "inline_1.pdf");
    }

    #[test]
    fn test_allocator_suffixes() {
        let mut alloc = NameAllocator::new();
        assert_eq!(alloc.allocate("Acme", "2024-03-15_Invoice"), "2024-03-15_Invoice");
        assert_eq!(alloc.allocate("Acme", "2024-03-15_Invoice"), "2024-03-15_Invoice_2");
        assert_eq!(alloc.allocate("Acme", "2024-03-15_Invoice"), "2024-03-15_Invoice_3");
    }

    #[test]
    fn test_allocator_suffix_avoids_natural_stem() {
        let mut alloc = NameAllocator::new();
        assert_eq!(alloc.allocate("Acme", "Invoice"), "Invoice");
        assert_eq!(alloc.allocate("Acme", "Invoice"), "Invoice_2");
        // A subject legitimately deriving "Invoice_2" must not reuse it.
        assert_eq!(alloc.allocate("Acme", "Invoice_2"), "Invoice_2_2");
        assert_eq!(alloc.allocate("Acme", "Invoice"), "Invoice_3");
    }

    #[test]
    fn test_allocator_skips_preexisting_suffixed_stem() {
        let mut alloc = NameAllocator::new();
        assert_eq!(alloc.allocate("Acme", "Report_2"), "Report_2");
        assert_eq!(alloc.allocate("Acme", "Report"), "Report");
        // "Report_2" is taken, so the repeat probes past it.
        assert_eq!(alloc.allocate("Acme", "Report"), "Report_3");
    }

    #[test]
    fn test_allocator_scoped_per_folder() {
        let mut alloc = NameAllocator::new();
        assert_eq!(alloc.allocate("Acme", "stem"), "stem");
        assert_eq!(alloc.allocate("Other", "stem"), "stem");
        assert_eq!(alloc.allocate("Acme", "stem"), "stem_2");
    }
}
