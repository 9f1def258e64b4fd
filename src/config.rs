use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Run-level knobs. Every field has a default so a partial YAML file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NovelSettings {
    pub num_chapters: u32,
    pub words_per_chapter: u32,
    /// Draft/review rounds per chapter.
    pub max_revisions: usize,
    /// Outline generation attempts per chapter.
    pub outline_attempts: usize,
    /// Outlines scoring strictly above this against another chapter are duplicates.
    pub similarity_threshold: f64,
    /// Characters last seen within this many chapters count as active.
    pub recency_window: u32,
    pub outline_only: bool,
    /// Ask the editor and the character manager to review each outline attempt.
    pub agent_outline_review: bool,
    /// Reviewer phrases that end the revision loop.
    pub quality_markers: Vec<String>,
    pub sampling: Sampling,
}

impl NovelSettings {
    pub fn default_num_chapters() -> u32 {
        15
    }
    pub fn default_words_per_chapter() -> u32 {
        3000
    }
    pub fn default_max_revisions() -> usize {
        3
    }
    pub fn default_outline_attempts() -> usize {
        3
    }
    pub fn default_similarity_threshold() -> f64 {
        0.70
    }
    pub fn default_recency_window() -> u32 {
        2
    }
    pub fn default_quality_markers() -> Vec<String> {
        vec!["excellent".to_owned(), "outstanding".to_owned()]
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read settings: {}", path.display()))?;
        let settings: Self = serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse settings: {}", path.display()))?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_chapters == 0 {
            anyhow::bail!("num_chapters must be at least 1");
        }
        if self.words_per_chapter == 0 {
            anyhow::bail!("words_per_chapter must be at least 1");
        }
        if self.max_revisions == 0 {
            anyhow::bail!("max_revisions must be at least 1");
        }
        if self.outline_attempts == 0 {
            anyhow::bail!("outline_attempts must be at least 1");
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            anyhow::bail!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            );
        }
        if self.quality_markers.iter().all(|m| m.trim().is_empty()) {
            anyhow::bail!("quality_markers must contain at least one non-empty phrase");
        }
        Ok(())
    }
}

impl Default for NovelSettings {
    fn default() -> Self {
        Self {
            num_chapters: Self::default_num_chapters(),
            words_per_chapter: Self::default_words_per_chapter(),
            max_revisions: Self::default_max_revisions(),
            outline_attempts: Self::default_outline_attempts(),
            similarity_threshold: Self::default_similarity_threshold(),
            recency_window: Self::default_recency_window(),
            outline_only: false,
            agent_outline_review: true,
            quality_markers: Self::default_quality_markers(),
            sampling: Sampling::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sampling {
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub seed: Option<u64>,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            top_p: 0.95,
            frequency_penalty: 0.3,
            presence_penalty: 0.2,
            seed: Some(42),
        }
    }
}
