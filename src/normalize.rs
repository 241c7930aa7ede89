//! Text normalization for artist/title lookups and comparisons.
//! Used by the Last.fm resolver (query strings, candidate matching) and by
//! the rating run for log-friendly titles.
//!
//! All functions are pure: same input, same output, no I/O.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Any run of whitespace (including NBSP and tabs) collapses to one space.
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Featured artists in brackets: "(feat. Artist)", "[ft. Someone]", "(Featuring X)".
/// The dot is required, so "(Feat of Clay)" is a title.
pub static FEAT_BRACKETED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*[\(\[](?:feat\.|ft\.|featuring)\s+[^)\]]*[\)\]]").unwrap()
});

/// Feat without brackets: "Song feat. Artist", "Song - ft Someone".
/// A bare "feat"/"ft" only counts after a dash ("A Feat of Engineering" stays).
pub static FEAT_TRAILING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(?:-\s+(?:feat\.?|ft\.?|featuring)|feat\.|ft\.|featuring)\s+.+$").unwrap()
});

/// Edition vocabulary shared by the dash and bracket forms below.
const EDITION_MARKER: &str = r"remaster(?:ed)?(?:\s+\d{4})?|\d{4}\s+remaster(?:ed)?|remix|radio\s+edit|album\s+version|single\s+version|clean|dirty|explicit|instrumental";

/// Trailing dash form: "Song - Remastered 2009", "Song - Radio Edit"
pub static EDITION_DASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\s+-\s+(?:{})\s*$", EDITION_MARKER)).unwrap()
});

/// Trailing bracket form: "Song (Explicit)", "Song [Album Version]"
pub static EDITION_BRACKET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\s*[\(\[](?:{})[\)\]]\s*$", EDITION_MARKER)).unwrap()
});

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lowercase ASCII by applying NFKD decomposition and removing combining marks.
/// e.g., "Beyoncé" → "beyonce", "Motörhead" → "motorhead"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Map typographic quotes and dashes to their ASCII equivalents.
pub fn normalize_punctuation(s: &str) -> String {
    s.replace(['\u{2018}', '\u{2019}', '\u{201A}', '\u{2032}'], "'")
        .replace(['\u{201C}', '\u{201D}', '\u{201E}', '\u{2033}'], "\"")
        .replace(['\u{00B4}', '\u{0060}'], "'")
        .replace(['\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{2015}', '\u{2212}'], "-")
        .replace('\u{2026}', "...")
}

fn collapse_whitespace(s: &str) -> String {
    MULTI_SPACE.replace_all(s.trim(), " ").into_owned()
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Canonicalize an artist or title: NFC composition, ASCII quotes/dashes,
/// whitespace collapsed and trimmed. Case is preserved.
pub fn normalize(text: &str) -> String {
    let composed: String = text.nfc().collect();
    collapse_whitespace(&normalize_punctuation(&composed))
}

/// Remove a bracketed or trailing "feat./ft./featuring" clause.
/// e.g., "Song (feat. X)" → "Song", "Song ft. Y" → "Song"
pub fn strip_featuring(text: &str) -> String {
    let result = FEAT_BRACKETED.replace_all(text, "");
    let result = FEAT_TRAILING.replace(&result, "");
    collapse_whitespace(&result)
}

/// Strip trailing edition markers ("- Remastered 2009", "(Explicit)") until none remain.
pub fn strip_edition(text: &str) -> String {
    let mut result = text.trim().to_string();
    loop {
        let next = EDITION_BRACKET.replace(&result, "");
        let next = EDITION_DASH.replace(&next, "").trim().to_string();
        if next == result || next.is_empty() {
            return result;
        }
        result = next;
    }
}

/// Comparison key for titles: normalized, lowercased, feat-stripped, edition-stripped.
pub fn title_key(title: &str) -> String {
    strip_edition(&strip_featuring(&normalize(title).to_lowercase()))
}

/// True when two titles name the same song once spelling variants are removed.
pub fn same_title(a: &str, b: &str) -> bool {
    title_key(a) == title_key(b)
}

/// Comparison key for artists: feat-stripped, ASCII-folded, "the " prefix dropped.
/// e.g., "The Beatles" → "beatles", "Björk feat. X" → "bjork"
pub fn artist_key(artist: &str) -> String {
    let folded = fold_to_ascii(&strip_featuring(&normalize(artist)));
    match folded.strip_prefix("the ") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => folded,
    }
}

// ============================================================================
// TESTS
// ============================================================================
