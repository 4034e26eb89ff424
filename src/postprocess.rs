//! Text post-processing: cleanup and keyword categorisation of OCR output.
//!
//! ## Rule Order
//!
//! [`clean`] filters characters *before* collapsing whitespace. Removing a
//! character can leave two spaces side by side (`"a @ b"` → `"a  b"`), and
//! the collapse pass is what folds them back together.
//!
//! Engine replies go through [`normalize_reply`] first, which removes the
//! wrapping that vision models add around plain text.

use crate::config::CategoryTable;
use crate::output::RecognizedTextRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static RE_DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\s.,/]").unwrap());

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*?)\n?```$").unwrap());

/// Strip everything outside the whitelist, collapse whitespace runs to one
/// space, trim.
///
/// The whitelist is ASCII letters and digits, whitespace, `.`, `,` and `/`.
/// Idempotent: `clean(clean(t)) == clean(t)`.
pub fn clean(raw: &str) -> String {
    let filtered = RE_DISALLOWED.replace_all(raw, "");
    RE_WHITESPACE
        .replace_all(&filtered, " ")
        .trim()
        .to_string()
}

/// Map each category to the first of its keywords found in `text`.
///
/// Matching is a case-insensitive substring test. Categories with no match
/// are absent, so the result only ever holds keywords from `table`.
pub fn categorize(text: &str, table: &CategoryTable) -> BTreeMap<String, String> {
    let haystack = text.to_lowercase();
    let mut found = BTreeMap::new();
    if haystack.is_empty() {
        return found;
    }

    for (category, keywords) in table.entries() {
        if let Some(kw) = keywords.iter().find(|kw| haystack.contains(kw.as_str())) {
            found.insert(category.to_string(), kw.clone());
        }
    }
    found
}

/// Clean `raw` and categorise the cleaned text.
pub fn build_record(raw: &str, table: &CategoryTable) -> RecognizedTextRecord {
    let cleaned_text = clean(raw);
    let categories = categorize(&cleaned_text, table);
    RecognizedTextRecord {
        raw_text: raw.to_string(),
        cleaned_text,
        categories,
    }
}

/// Undo vision-model packaging around a plain-text reply: outer code fences,
/// CRLF line endings, zero-width characters and surrounding whitespace.
pub fn normalize_reply(reply: &str) -> String {
    let s = strip_code_fences(reply);
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s: String = s.chars().filter(|c| !is_invisible(*c)).collect();
    s.trim().to_string()
}

/// Contents of a single outer ```` ``` ```` block, or the input unchanged.
pub(crate) fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_example() {
        assert_eq!(clean("R@ting: 8.5/10!!"), "Rting 8.5/10");
    }

    #[test]
    fn clean_filters_before_collapsing() {
        assert_eq!(clean("  a @ b\n\n\tc  "), "a b c");
        assert_eq!(clean("¡Hola, señor!"), "Hola, seor");
        assert_eq!(clean(""), "");
        assert_eq!(clean("@#$%"), "");
    }

    #[test]
    fn clean_is_idempotent() {
        for t in [
            "R@ting: 8.5/10!!",
            "  Title:\tThe  Movie (2001) ",
            "naïve — café ☕ 3,5",
            "\n\n",
        ] {
            let once = clean(t);
            assert_eq!(clean(&once), once, "{t:?}");
        }
    }

    #[test]
    fn categorize_example() {
        let got = categorize("Directed by J. Smith, Genre: Action", &CategoryTable::default());
        let want: BTreeMap<String, String> = [("director", "directed by"), ("genre", "action")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn categorize_first_keyword_wins() {
        let got = categorize("Released this year", &CategoryTable::default());
        // "release" precedes "year" in the table and is a substring of "released".
        assert_eq!(got.get("release_year").map(String::as_str), Some("release"));
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn categorize_empty_text_is_empty() {
        assert!(categorize("", &CategoryTable::default()).is_empty());
    }

    #[test]
    fn categorize_only_returns_table_keywords() {
        let table = CategoryTable::new([("vendor", vec!["Acme"]), ("total", vec!["total", "sum"])]);
        let got = categorize("ACME corp - TOTAL 12.00", &table);
        assert_eq!(got.get("vendor").map(String::as_str), Some("acme"));
        assert_eq!(got.get("total").map(String::as_str), Some("total"));
        for (cat, kw) in &got {
            assert!(table.contains(cat, kw));
        }
    }

    #[test]
    fn record_for_blank_text() {
        let r = build_record("", &CategoryTable::default());
        assert_eq!(r.cleaned_text, "");
        assert!(r.categories.is_empty());
    }

    #[test]
    fn record_keeps_raw() {
        let r = build_record("Rated: PG!", &CategoryTable::default());
        assert_eq!(r.raw_text, "Rated: PG!");
        assert_eq!(r.cleaned_text, "Rated PG");
        assert_eq!(r.categories.get("rating").map(String::as_str), Some("rated"));
    }

    #[test]
    fn normalize_strips_fences_and_invisibles() {
        assert_eq!(normalize_reply("```text\nTOTAL 4.50\r\n```"), "TOTAL 4.50");
        assert_eq!(normalize_reply("\u{FEFF}hello\u{200B}"), "hello");
        assert_eq!(normalize_reply("   "), "");
    }

    #[test]
    fn strip_fences_passthrough() {
        assert_eq!(strip_code_fences("[1, 2]"), "[1, 2]");
        assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
    }
}
