use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::similarity::SimilarityScorer;

static TITLE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"Title:\**\s*["“]([^"”\n]+)["”]"#,
        r"Title:\**\s*(.+)",
        r"Chapter\s+\d+:\s*(.+)",
        r"(?m)^#+\s*(.+)",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("title pattern must compile"))
    .collect()
});

/// First title found by the ordered pattern list, most specific first.
pub fn extract_title(outline: &str) -> Option<String> {
    TITLE_PATTERNS.iter().find_map(|pattern| {
        let captured = pattern.captures(outline)?.get(1)?.as_str();
        let title = captured
            .trim()
            .trim_matches(|c| matches!(c, '*' | '"' | '“' | '”'))
            .trim();
        (!title.is_empty()).then(|| title.to_owned())
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarOutline {
    pub chapter: u32,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineReview {
    pub is_valid: bool,
    pub title_unique: bool,
    pub outline_unique: bool,
    pub issues: Vec<String>,
    pub title: Option<String>,
    /// Most similar accepted outline from another chapter, if any exist.
    pub closest: Option<SimilarOutline>,
}

/// Tracks accepted outlines and titles per chapter and rejects duplicates.
#[derive(Debug)]
pub struct OutlineValidator {
    scorer: SimilarityScorer,
    threshold: f64,
    outlines: BTreeMap<u32, String>,
    titles: BTreeMap<u32, String>,
}

impl OutlineValidator {
    pub fn new(threshold: f64) -> Self {
        Self {
            scorer: SimilarityScorer::new(),
            threshold,
            outlines: BTreeMap::new(),
            titles: BTreeMap::new(),
        }
    }

    /// Registers a persisted outline without validating it.
    pub fn add_existing(&mut self, outline: &str, chapter: u32) {
        self.commit(outline, chapter, extract_title(outline));
    }

    pub fn outlines(&self) -> &BTreeMap<u32, String> {
        &self.outlines
    }

    pub fn outline(&self, chapter: u32) -> Option<&str> {
        self.outlines.get(&chapter).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.outlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outlines.is_empty()
    }

    /// Checks `outline` against every other chapter's accepted outline and
    /// title. Commits it for `chapter` only when no issue is found.
    pub fn review(&mut self, outline: &str, chapter: u32, premise: &str) -> OutlineReview {
        let title = extract_title(outline);
        let mut issues = Vec::new();

        let title_unique = match title.as_deref() {
            Some(title) => {
                let lowered = title.to_lowercase();
                !self
                    .titles
                    .iter()
                    .any(|(&other, existing)| other != chapter && existing.to_lowercase() == lowered)
            }
            None => true,
        };
        if !title_unique && let Some(title) = title.as_deref() {
            issues.push(format!(
                "Chapter title '{title}' is too similar to an existing title"
            ));
        }

        let closest = self
            .outlines
            .iter()
            .filter(|&(&other, _)| other != chapter)
            .map(|(&other, previous)| SimilarOutline {
                chapter: other,
                similarity: self.scorer.similarity(outline, previous),
            })
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity));
        let outline_unique = closest
            .as_ref()
            .is_none_or(|closest| closest.similarity <= self.threshold);
        if !outline_unique {
            issues.push("Outline is too similar to a previous chapter".to_owned());
        }

        let is_valid = issues.is_empty();
        if is_valid {
            self.commit(outline, chapter, title.clone());
        }

        tracing::debug!(
            chapter,
            premise_chars = premise.len(),
            title = title.as_deref().unwrap_or(""),
            closest_chapter = closest.as_ref().map(|c| c.chapter),
            closest_similarity = closest.as_ref().map(|c| c.similarity),
            is_valid,
            "outline reviewed"
        );

        OutlineReview {
            is_valid,
            title_unique,
            outline_unique,
            issues,
            title,
            closest,
        }
    }

    fn commit(&mut self, outline: &str, chapter: u32, title: Option<String>) {
        self.outlines.insert(chapter, outline.to_owned());
        match title {
            Some(title) => {
                self.titles.insert(chapter, title);
            }
            None => {
                self.titles.remove(&chapter);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREMISE: &str = "A smuggler discovers a map to a drowned city.";

    #[test]
    fn extract_title_prefers_quoted_title() {
        assert_eq!(
            extract_title("Title: \"The Storm\"\n\nPlot: rain.").as_deref(),
            Some("The Storm")
        );
        assert_eq!(
            extract_title("**Title:** \"Low Tide\"").as_deref(),
            Some("Low Tide")
        );
    }

    #[test]
    fn extract_title_falls_back_through_patterns() {
        assert_eq!(
            extract_title("Title: Broken Compass\nPlot").as_deref(),
            Some("Broken Compass")
        );
        assert_eq!(
            extract_title("Chapter 4: The Reef\n- beats").as_deref(),
            Some("The Reef")
        );
        assert_eq!(
            extract_title("Intro line\n## Salt and Iron\n").as_deref(),
            Some("Salt and Iron")
        );
        assert_eq!(extract_title("no title markers here"), None);
    }

    #[test]
    fn identical_outline_for_another_chapter_is_rejected() {
        let mut validator = OutlineValidator::new(0.70);
        let outline = "Title: \"The Storm\"\nMara sails into the storm and loses the map.";

        let first = validator.review(outline, 1, PREMISE);
        assert!(first.is_valid);

        let second = validator.review(outline, 2, PREMISE);
        assert!(!second.is_valid);
        assert!(!second.outline_unique);
        assert!(!second.title_unique);
        assert_eq!(second.issues.len(), 2);
        assert_eq!(second.closest.map(|c| c.chapter), Some(1));
        assert_eq!(validator.outline(2), None);
    }

    #[test]
    fn title_collision_is_case_insensitive() {
        let mut validator = OutlineValidator::new(0.70);
        validator.add_existing("Title: \"The Storm\"\nMara sails north.", 1);

        let review = validator.review(
            "Title: \"the storm\"\nA banker audits the lighthouse accounts.",
            2,
            PREMISE,
        );
        assert!(!review.title_unique);
        assert!(review.outline_unique);
        assert_eq!(
            review.issues,
            ["Chapter title 'the storm' is too similar to an existing title"]
        );
    }

    #[test]
    fn rerunning_the_same_chapter_overwrites_its_slot() {
        let mut validator = OutlineValidator::new(0.70);
        let outline = "Title: \"Harbor\"\nThe crew argues over the stolen ledger.";
        assert!(validator.review(outline, 3, PREMISE).is_valid);
        assert!(validator.review(outline, 3, PREMISE).is_valid);
        assert_eq!(validator.len(), 1);
    }

    #[test]
    fn distinct_outlines_are_accepted() {
        let mut validator = OutlineValidator::new(0.70);
        assert!(
            validator
                .review("Title: \"Harbor\"\nThe crew argues over the ledger.", 1, PREMISE)
                .is_valid
        );
        let review = validator.review(
            "Title: \"Depths\"\nDivers explore collapsed temples beneath glowing coral.",
            2,
            PREMISE,
        );
        assert!(review.is_valid);
        assert!(review.issues.is_empty());
        assert_eq!(validator.len(), 2);
    }
}
