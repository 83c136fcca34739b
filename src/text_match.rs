//! Case-insensitive phrase matching used by scoring and routing.
//!
//! Text is split into lowercase alphanumeric words. A phrase matches when its
//! words appear contiguously in the other text, so `"AI"` matches
//! `"AI innovation"` but not `"Retail"`, and `"U.S."` matches
//! `"Redmond, Washington, U.S."`.

use std::collections::BTreeMap;

/// How closely two terms matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchQuality {
    Partial,
    Exact,
}

/// A table entry selected for a lead attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableMatch<'a> {
    pub term: &'a str,
    pub points: u32,
    pub quality: MatchQuality,
}

/// Lowercase alphanumeric words of `text`.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// True when every word of `needle` appears, in order and adjacent, in `haystack`.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    let needle = words(needle);
    if needle.is_empty() {
        return false;
    }
    let haystack = words(haystack);
    haystack.windows(needle.len()).any(|window| window == needle.as_slice())
}

/// Exact when both sides have the same words, partial when either contains the
/// other as a phrase.
pub fn match_quality(a: &str, b: &str) -> Option<MatchQuality> {
    let (wa, wb) = (words(a), words(b));
    if wa.is_empty() || wb.is_empty() {
        return None;
    }
    if wa == wb {
        Some(MatchQuality::Exact)
    } else if contains_phrase(a, b) || contains_phrase(b, a) {
        Some(MatchQuality::Partial)
    } else {
        None
    }
}

/// Best table entry for `value`: an exact match wins, otherwise the partial
/// match worth the most points. Ties keep table order.
pub fn best_match<'a>(value: &str, table: &'a BTreeMap<String, u32>) -> Option<TableMatch<'a>> {
    let mut best: Option<TableMatch<'a>> = None;

    for (term, &points) in table {
        let Some(quality) = match_quality(value, term) else {
            continue;
        };
        let candidate = TableMatch {
            term: term.as_str(),
            points,
            quality,
        };
        best = match best {
            None => Some(candidate),
            Some(current) if (quality, points) > (current.quality, current.points) => {
                Some(candidate)
            }
            keep => keep,
        };
    }

    best
}
