//! Name normalization and fuzzy comparison for player identity resolution.
//!
//! Scraped player names arrive in wildly inconsistent shapes across sources:
//! "Nadal, Rafael", "R. Nadal", "RAFAEL NADAL", with or without diacritics.
//! This module turns those into a single comparable form and scores how
//! likely two renderings refer to the same person.

use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

const NAME_SUFFIXES: &[&str] = &[" jr.", " jr", " sr.", " sr", " iii", " ii", " iv"];
const NAME_PARTICLES: &[&str] = &["de", "del", "van", "von", "da", "di", "la", "le"];

/// Lowercases, strips diacritics, undoes a "Last, First" comma swap, drops
/// generational suffixes, and collapses whitespace. Two names that refer to
/// the same player after scraping from different sources should normalize to
/// the same string whenever the underlying name really is written the same
/// way modulo case/accents/ordering.
pub fn normalize_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();

    let decomposed: String = lower
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let swapped = if let Some((last, first)) = decomposed.split_once(',') {
        format!("{} {}", first.trim(), last.trim())
    } else {
        decomposed
    };

    let mut stripped = swapped;
    for suffix in NAME_SUFFIXES {
        if stripped.ends_with(suffix) {
            stripped.truncate(stripped.len() - suffix.len());
            break;
        }
    }

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

/// Concatenates the first letter of each whitespace-separated token, e.g.
/// `"rafael nadal"` -> `"rn"`.
pub fn extract_initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|token| token.chars().next())
        .collect()
}

/// The family-name portion of a normalized name, recognizing a short list of
/// name particles (`"van der berg"` -> `"van berg"`... in practice only the
/// token directly before the last one is checked, matching common European
/// naming patterns).
pub fn extract_last_name(normalized: &str) -> String {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    if tokens.is_empty() {
        return String::new();
    }
    if tokens.len() >= 3 {
        let particle = tokens[tokens.len() - 2];
        if NAME_PARTICLES.contains(&particle) {
            return format!("{} {}", particle, tokens[tokens.len() - 1]);
        }
    }
    tokens[tokens.len() - 1].to_string()
}

/// A handful of alternate renderings worth trying as aliases or search keys:
/// the full normalized name, "initial + last", the bare last name, and
/// "last first"/"last, firstrest" reversals.
pub fn generate_search_variants(name: &str) -> Vec<String> {
    let normalized = normalize_name(name);
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let mut variants = HashSet::new();
    variants.insert(normalized.clone());

    if let (Some(first), Some(last)) = (tokens.first(), tokens.last()) {
        variants.insert(last.to_string());
        if let Some(initial) = first.chars().next() {
            variants.insert(format!("{initial} {last}"));
        }
        variants.insert(format!("{last} {first}"));
        if tokens.len() > 2 {
            let middle = tokens[1..tokens.len() - 1].join(" ");
            variants.insert(format!("{last}, {first} {middle}").trim().to_string());
        }
    }

    variants.into_iter().collect()
}

/// Similarity score in `[0, 1]` between two raw (not pre-normalized) names.
/// Combines Jaro-Winkler, a token-sort ratio, and a partial-substring ratio,
/// taking the best of the three, then adds a bonus when one name is an
/// abbreviated form of the other ("R. Nadal" vs "Rafael Nadal") and the
/// surnames match exactly.
pub fn compare_names(name1: &str, name2: &str) -> f64 {
    let n1 = normalize_name(name1);
    let n2 = normalize_name(name2);

    if n1 == n2 {
        return 1.0;
    }
    if n1.is_empty() || n2.is_empty() {
        return 0.0;
    }

    let jw = strsim::jaro_winkler(&n1, &n2);
    let token_sort = token_sort_ratio(&n1, &n2);
    let partial = partial_ratio(&n1, &n2);

    let base = jw.max(token_sort).max(partial);
    let bonus = abbreviation_bonus(&n1, &n2);

    (base + bonus).min(1.0)
}

pub fn is_likely_same_player(name1: &str, name2: &str, threshold: f64) -> bool {
    compare_names(name1, name2) >= threshold
}

fn token_sort_ratio(n1: &str, n2: &str) -> f64 {
    let sort_tokens = |s: &str| {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    strsim::normalized_levenshtein(&sort_tokens(n1), &sort_tokens(n2))
}

/// Approximates fuzzywuzzy's partial ratio: slides the shorter string as a
/// window over the longer one and keeps the best normalized-Levenshtein
/// match, so "R Nadal" scores well against "Rafael Nadal".
fn partial_ratio(n1: &str, n2: &str) -> f64 {
    let (shorter, longer) = if n1.len() <= n2.len() { (n1, n2) } else { (n2, n1) };
    if shorter.is_empty() {
        return 0.0;
    }
    if longer.contains(shorter) {
        return 1.0;
    }

    let shorter_chars: Vec<char> = shorter.chars().collect();
    let longer_chars: Vec<char> = longer.chars().collect();
    let window = shorter_chars.len();

    if longer_chars.len() <= window {
        return strsim::normalized_levenshtein(shorter, longer);
    }

    (0..=longer_chars.len() - window)
        .map(|start| {
            let slice: String = longer_chars[start..start + window].iter().collect();
            strsim::normalized_levenshtein(shorter, &slice)
        })
        .fold(0.0_f64, f64::max)
}

/// `0.15` if both names have at least two tokens, their last tokens match
/// exactly, and one side's first token is a single initial (optionally
/// followed by a period) that the other side's first token starts with.
fn abbreviation_bonus(n1: &str, n2: &str) -> f64 {
    let t1: Vec<&str> = n1.split_whitespace().collect();
    let t2: Vec<&str> = n2.split_whitespace().collect();

    if t1.len() < 2 || t2.len() < 2 {
        return 0.0;
    }
    if t1.last() != t2.last() {
        return 0.0;
    }

    let is_abbreviated_match = |a: &str, b: &str| {
        let a = a.trim_end_matches('.');
        a.chars().count() == 1 && b.starts_with(a)
    };

    let first1 = t1[0];
    let first2 = t2[0];
    if is_abbreviated_match(first1, first2) || is_abbreviated_match(first2, first1) {
        0.15
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_comma_swap() {
        assert_eq!(normalize_name("Nadal, Rafael"), "rafael nadal");
    }

    #[test]
    fn strips_diacritics() {
        assert_eq!(normalize_name("Félix Auger-Aliassime"), "félix auger-aliassime".replace('é', "e"));
    }

    #[test]
    fn strips_generational_suffix_in_order() {
        assert_eq!(normalize_name("John Smith III"), "john smith");
        assert_eq!(normalize_name("John Smith II"), "john smith");
    }

    #[test]
    fn exact_match_scores_one() {
        assert_eq!(compare_names("Rafael Nadal", "rafael nadal"), 1.0);
    }

    #[test]
    fn abbreviated_first_name_scores_high() {
        let score = compare_names("R. Nadal", "Rafael Nadal");
        assert!(score >= 0.90, "expected high score, got {score}");
    }

    #[test]
    fn unrelated_names_score_low() {
        let score = compare_names("Rafael Nadal", "Roger Federer");
        assert!(score < 0.6, "expected low score, got {score}");
    }

    #[test]
    fn extracts_last_name_with_particle() {
        assert_eq!(extract_last_name("juan martin del potro"), "del potro");
        assert_eq!(extract_last_name("rafael nadal"), "nadal");
    }
}
