// src/matcher.rs
//! Keyword relevance scoring and deterministic ranking.
//!
//! Matching is lexical: case-insensitive, accent-insensitive, word-boundary
//! aware. No regex here: term lookups must stay predictable for operators
//! editing the vocabulary.

use std::cmp::Ordering;

use crate::model::{Keyword, Listing};

/// Lowercase + strip the Spanish accents portals use inconsistently, so
/// "balística" and "balistica" are the same term.
pub fn fold(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'Á' => 'a',
            'é' | 'É' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'Ó' => 'o',
            'ú' | 'Ú' | 'ü' | 'Ü' => 'u',
            'ñ' | 'Ñ' => 'n',
            c => c,
        })
        .flat_map(char::to_lowercase)
        .collect()
}

/// True iff `term` occurs in `text` with non-alphanumeric (or string-edge)
/// neighbours on both sides. Both inputs must already be folded.
fn contains_term(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    for (idx, _) in text.match_indices(term) {
        let before_ok = text[..idx]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = text[idx + term.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
    }
    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub score: i64,
    /// Matched terms in vocabulary order, one entry per field hit (a term
    /// hitting title and body appears twice).
    pub matched: Vec<String>,
}

/// Scores listings against a vocabulary snapshot. Vocabulary order is the
/// store's stable order, so matched-term order is reproducible across runs.
pub struct KeywordMatcher {
    // (original term, folded term, priority)
    vocab: Vec<(String, String, i64)>,
}

impl KeywordMatcher {
    pub fn new(vocabulary: &[Keyword]) -> Self {
        let vocab = vocabulary
            .iter()
            .filter(|kw| kw.priority > 0 && !kw.term.trim().is_empty())
            .map(|kw| (kw.term.clone(), fold(kw.term.trim()), kw.priority))
            .collect();
        Self { vocab }
    }

    /// Score a listing's text fields. A hit in the title counts once, a hit
    /// in the body counts once; a keyword present in both contributes twice.
    pub fn score(&self, title: &str, body: &str) -> MatchOutcome {
        let title_folded = fold(title);
        let body_folded = fold(body);

        let mut score = 0;
        let mut matched = Vec::new();
        for (term, folded, priority) in &self.vocab {
            if contains_term(&title_folded, folded) {
                score += priority;
                matched.push(term.clone());
            }
            if contains_term(&body_folded, folded) {
                score += priority;
                matched.push(term.clone());
            }
        }
        MatchOutcome { score, matched }
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.is_empty()
    }
}

/// Display/alert ordering: relevance desc, then published_at desc (missing
/// dates last), then external id / content hash asc as the final
/// deterministic tie-break.
pub fn rank(listings: &mut [Listing]) {
    listings.sort_by(compare);
}

fn compare(a: &Listing, b: &Listing) -> Ordering {
    b.relevance_score
        .cmp(&a.relevance_score)
        .then_with(|| match (&a.published_at, &b.published_at) {
            (Some(x), Some(y)) => y.cmp(x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.external_id.cmp(&b.external_id))
        .then_with(|| a.content_hash.cmp(&b.content_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ListingStatus;
    use chrono::{TimeZone, Utc};

    fn kw(term: &str, priority: i64) -> Keyword {
        Keyword {
            term: term.into(),
            category: String::new(),
            priority,
        }
    }

    fn listing(score: i64, published: Option<i64>, hash: &str) -> Listing {
        let now = Utc.with_ymd_and_hms(2026, 8, 20, 12, 0, 0).unwrap();
        Listing {
            external_id: None,
            portal_id: 1,
            title: "t".into(),
            body: String::new(),
            published_at: published.map(|ts| Utc.timestamp_opt(ts, 0).unwrap()),
            url: "https://x".into(),
            content_hash: hash.into(),
            relevance_score: score,
            matched_keywords: vec![],
            status: ListingStatus::New,
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    #[test]
    fn title_hit_scores_keyword_priority() {
        let m = KeywordMatcher::new(&[kw("ADN", 5), kw("balística", 3)]);
        let out = m.score("Compra de kits de ADN", "");
        assert_eq!(out.score, 5);
        assert_eq!(out.matched, vec!["ADN"]);
    }

    #[test]
    fn hit_in_both_fields_counts_twice() {
        let m = KeywordMatcher::new(&[kw("ADN", 5)]);
        let out = m.score("Kits de ADN", "Se adquieren kits de adn.");
        assert_eq!(out.score, 10);
        assert_eq!(out.matched, vec!["ADN", "ADN"]);
    }

    #[test]
    fn matching_is_accent_and_case_insensitive() {
        let m = KeywordMatcher::new(&[kw("balística", 3)]);
        assert_eq!(m.score("Peritajes de BALISTICA forense", "").score, 3);
        assert_eq!(m.score("Estudios balisticos", "").score, 0); // different word
    }

    #[test]
    fn word_boundaries_are_respected() {
        let m = KeywordMatcher::new(&[kw("lab", 2)]);
        assert_eq!(m.score("Equipo para el lab central", "").score, 2);
        assert_eq!(m.score("Nueva labor administrativa", "").score, 0);
    }

    #[test]
    fn matched_terms_follow_vocabulary_order() {
        let m = KeywordMatcher::new(&[kw("ADN", 5), kw("laboratorio", 2)]);
        let out = m.score("laboratorio de ADN", "");
        assert_eq!(out.matched, vec!["ADN", "laboratorio"]);
    }

    #[test]
    fn zero_or_negative_priority_terms_are_ignored() {
        let m = KeywordMatcher::new(&[kw("ADN", 0), kw("  ", 4)]);
        assert!(m.is_empty());
    }

    #[test]
    fn ranking_is_fully_deterministic() {
        let t = 1_766_000_000;
        let mut ls = vec![
            listing(5, Some(t), "cc"),
            listing(10, Some(t), "bb"),
            listing(10, Some(t), "aa"),
            listing(10, None, "zz"),
        ];
        rank(&mut ls);
        let hashes: Vec<&str> = ls.iter().map(|l| l.content_hash.as_str()).collect();
        // ties at 10: dated ones first (hash asc), undated last, then score 5
        assert_eq!(hashes, vec!["aa", "bb", "zz", "cc"]);
    }
}
