//! Text normalization shared by display exports and fingerprinting.
//!
//! [`normalize_with`] applies, in order:
//!
//! 1. markup tag removal (repeated until no tag remains),
//! 2. optional URL removal,
//! 3. `…` → `...`,
//! 4. single-quote variants → `'`,
//! 5. double-quote variants (and `''` / `,,`) → `"`,
//! 6. whitespace runs → one space, trimmed,
//! 7. optional lower-casing.
//!
//! Every step is idempotent and no later step can re-create input for an
//! earlier one, so `normalize(normalize(x)) == normalize(x)`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<>]*>").expect("MARKUP_TAG: invalid pattern"));

// Case-insensitive so that lower-casing can never expose a new match.
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("URL: invalid pattern"));

static DOUBLE_QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[„“”‟]|''|,,"#).expect("DOUBLE_QUOTE: invalid pattern"));

const SINGLE_QUOTES: &[char] = &[
    '`', '\u{2018}', '\u{2019}', '\u{201B}', '\u{2E02}', '\u{2E03}', '\u{2E0C}', '\u{2E0D}',
    '\u{2E1C}', '\u{2E1D}',
];

/// Optional steps of the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Lower-case the result.
    #[serde(default)]
    pub lowercase: bool,
    /// Drop `http(s)://` links.
    #[serde(default)]
    pub strip_urls: bool,
}

impl NormalizeOptions {
    /// Display normalization: structure cleanup only, case preserved.
    #[must_use]
    pub const fn display() -> Self {
        Self {
            lowercase: false,
            strip_urls: false,
        }
    }

    /// Case-folded normalization used for content fingerprints.
    #[must_use]
    pub const fn folded() -> Self {
        Self {
            lowercase: true,
            strip_urls: false,
        }
    }
}

/// Normalize with display options (no case folding).
#[must_use]
pub fn normalize(text: &str) -> String {
    normalize_with(text, NormalizeOptions::display())
}

/// Normalize `text` with the given options. Total: never fails.
#[must_use]
pub fn normalize_with(text: &str, options: NormalizeOptions) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut out = strip_markup(text);
    if options.strip_urls {
        out = URL.replace_all(&out, "").into_owned();
    }
    out = out.replace('\u{2026}', "...");
    out = out.replace(SINGLE_QUOTES, "'");
    out = DOUBLE_QUOTE.replace_all(&out, "\"").into_owned();
    out = collapse_whitespace(&out);
    if options.lowercase {
        out = out.to_lowercase();
    }
    out
}

/// Normalize an optional value, passing `None` through.
#[must_use]
pub fn normalize_opt(text: Option<&str>, options: NormalizeOptions) -> Option<String> {
    text.map(|t| normalize_with(t, options))
}

fn strip_markup(text: &str) -> String {
    // Removing an inner tag can expose an outer one (`<<b>i>`), so run to a fixpoint.
    let mut current = text.to_string();
    loop {
        let next = MARKUP_TAG.replace_all(&current, "");
        if next.len() == current.len() {
            return current;
        }
        current = next.into_owned();
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_markup_and_collapses_whitespace() {
        let raw = "<p>Firefox  crashes</p>\r\n<br/>on   startup\n";
        assert_eq!(normalize(raw), "Firefox crashes on startup");
    }

    #[test]
    fn nested_markup_is_removed_completely() {
        assert_eq!(normalize("a<<b>i>b"), "ab");
    }

    #[test]
    fn unifies_ellipsis_and_quotes() {
        let raw = "It\u{2019}s \u{201C}broken\u{201D}\u{2026} ``really''";
        assert_eq!(normalize(raw), "It's \"broken\"... \"really\"");
    }

    #[test]
    fn lowercase_is_optional() {
        assert_eq!(normalize("Sync Fails"), "Sync Fails");
        assert_eq!(
            normalize_with("Sync Fails", NormalizeOptions::folded()),
            "sync fails"
        );
    }

    #[test]
    fn url_stripping_is_optional() {
        let raw = "see HTTPS://support.example.org/kb/1 for details";
        assert_eq!(normalize(raw), raw);
        let opts = NormalizeOptions {
            lowercase: false,
            strip_urls: true,
        };
        assert_eq!(normalize_with(raw, opts), "see for details");
    }

    #[test]
    fn empty_input_is_returned_unchanged() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize_opt(None, NormalizeOptions::folded()), None);
        assert_eq!(
            normalize_opt(Some(""), NormalizeOptions::folded()).as_deref(),
            Some("")
        );
    }

    #[test]
    fn whitespace_only_input_becomes_empty() {
        assert_eq!(normalize(" \r\n\t "), "");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in ".{0,80}", lowercase in any::<bool>(), strip_urls in any::<bool>()) {
            let opts = NormalizeOptions { lowercase, strip_urls };
            let once = normalize_with(&raw, opts);
            let twice = normalize_with(&once, opts);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn normalize_is_idempotent_on_markup_heavy_text(raw in "[<>a-c '`,\u{2018}\u{201C}\u{2026}\n]{0,40}") {
            let once = normalize_with(&raw, NormalizeOptions::folded());
            prop_assert_eq!(normalize_with(&once, NormalizeOptions::folded()), once.clone());
            prop_assert!(!once.contains('\n'));
        }
    }
}
