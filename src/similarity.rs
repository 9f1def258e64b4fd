//! Pairwise text similarity: stemmed bag-of-words weighted by TF-IDF over the
//! two texts being compared, scored with cosine similarity.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rust_stemmers::{Algorithm, Stemmer};

pub struct SimilarityScorer {
    stemmer: Stemmer,
}

impl fmt::Debug for SimilarityScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimilarityScorer")
            .field("stemmer", &"english")
            .finish()
    }
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityScorer {
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    /// Lowercased, alphabetic, stop-word-free stems of `text`, in order.
    pub fn terms(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty() && token.chars().all(char::is_alphabetic))
            .filter(|token| !is_stop_word(token))
            .map(|token| self.stemmer.stem(token).into_owned())
            .filter(|stem| stem.chars().count() >= 2)
            .collect()
    }

    /// Score in `[0, 1]`. Texts with no meaningful terms score 0.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let terms_a = self.terms(a);
        let terms_b = self.terms(b);
        let a = term_counts(&terms_a);
        let b = term_counts(&terms_b);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let vocabulary: BTreeSet<&str> = a.keys().chain(b.keys()).copied().collect();
        let n_docs = 2.0_f64;

        let mut dot = 0.0;
        let mut norm_a = 0.0;
        let mut norm_b = 0.0;
        for term in vocabulary {
            let tf_a = a.get(term).copied().unwrap_or(0) as f64;
            let tf_b = b.get(term).copied().unwrap_or(0) as f64;
            let df = f64::from(u8::from(tf_a > 0.0) + u8::from(tf_b > 0.0));
            let idf = ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0;

            let wa = tf_a * idf;
            let wb = tf_b * idf;
            dot += wa * wb;
            norm_a += wa * wa;
            norm_b += wb * wb;
        }

        cosine(dot, norm_a.sqrt(), norm_b.sqrt())
    }
}

fn term_counts(terms: &[String]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for term in terms {
        *counts.entry(term.as_str()).or_insert(0) += 1;
    }
    counts
}

fn cosine(dot: f64, mag_a: f64, mag_b: f64) -> f64 {
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(0.0, 1.0)
}

fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "i" | "me"
            | "my"
            | "myself"
            | "we"
            | "our"
            | "ours"
            | "ourselves"
            | "you"
            | "your"
            | "yours"
            | "yourself"
            | "yourselves"
            | "he"
            | "him"
            | "his"
            | "himself"
            | "she"
            | "her"
            | "hers"
            | "herself"
            | "it"
            | "its"
            | "itself"
            | "they"
            | "them"
            | "their"
            | "theirs"
            | "themselves"
            | "what"
            | "which"
            | "who"
            | "whom"
            | "this"
            | "that"
            | "these"
            | "those"
            | "am"
            | "is"
            | "are"
            | "was"
            | "were"
            | "be"
            | "been"
            | "being"
            | "have"
            | "has"
            | "had"
            | "having"
            | "do"
            | "does"
            | "did"
            | "doing"
            | "a"
            | "an"
            | "the"
            | "and"
            | "but"
            | "if"
            | "or"
            | "because"
            | "as"
            | "until"
            | "while"
            | "of"
            | "at"
            | "by"
            | "for"
            | "with"
            | "about"
            | "against"
            | "between"
            | "into"
            | "through"
            | "during"
            | "before"
            | "after"
            | "above"
            | "below"
            | "to"
            | "from"
            | "up"
            | "down"
            | "in"
            | "out"
            | "on"
            | "off"
            | "over"
            | "under"
            | "again"
            | "further"
            | "then"
            | "once"
            | "here"
            | "there"
            | "when"
            | "where"
            | "why"
            | "how"
            | "all"
            | "any"
            | "both"
            | "each"
            | "few"
            | "more"
            | "most"
            | "other"
            | "some"
            | "such"
            | "no"
            | "nor"
            | "not"
            | "only"
            | "own"
            | "same"
            | "so"
            | "than"
            | "too"
            | "very"
            | "s"
            | "t"
            | "can"
            | "will"
            | "just"
            | "don"
            | "should"
            | "now"
            | "d"
            | "ll"
            | "m"
            | "o"
            | "re"
            | "ve"
            | "y"
            | "ain"
            | "aren"
            | "couldn"
            | "didn"
            | "doesn"
            | "hadn"
            | "hasn"
            | "haven"
            | "isn"
            | "ma"
            | "mightn"
            | "mustn"
            | "needn"
            | "shan"
            | "shouldn"
            | "wasn"
            | "weren"
            | "won"
            | "wouldn"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_score_one() {
        let scorer = SimilarityScorer::new();
        let text = "Mara steals the ledger from the harbor master.";
        assert!((scorer.similarity(text, text) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn inflections_collapse_to_the_same_stems() {
        let scorer = SimilarityScorer::new();
        let score = scorer.similarity(
            "The dragons attacked the castle",
            "A dragon attacks castles",
        );
        assert!((score - 1.0).abs() < 1e-9, "score was {score}");
    }

    #[test]
    fn disjoint_texts_score_zero() {
        let scorer = SimilarityScorer::new();
        assert_eq!(
            scorer.similarity("Storm over the harbor", "Quiet library reading"),
            0.0
        );
    }

    #[test]
    fn empty_or_stop_word_only_texts_score_zero() {
        let scorer = SimilarityScorer::new();
        assert_eq!(scorer.similarity("", "anything at all"), 0.0);
        assert_eq!(scorer.similarity("the and of", "the and of"), 0.0);
    }

    #[test]
    fn score_is_symmetric_and_partial_overlap_is_between_bounds() {
        let scorer = SimilarityScorer::new();
        let a = "The knight rode north";
        let b = "The knight sailed south";
        let ab = scorer.similarity(a, b);
        let ba = scorer.similarity(b, a);
        assert!((ab - ba).abs() < 1e-12);
        assert!(ab > 0.0 && ab < 1.0, "score was {ab}");
    }

    #[test]
    fn terms_drop_numbers_and_stop_words() {
        let scorer = SimilarityScorer::new();
        assert_eq!(
            scorer.terms("Chapter 12: The Running Dogs"),
            ["chapter", "run", "dog"]
        );
    }
}
