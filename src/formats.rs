use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::character::CharacterRegistry;
use crate::revision::RevisionStatus;

/// Progress document (`novel_progress.json`), rewritten after every chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Novel {
    pub metadata: NovelMetadata,
    pub characters: CharacterRegistry,
    #[serde(default)]
    pub chapters: BTreeMap<u32, ChapterRecord>,
}

impl Novel {
    pub fn new(premise: &str, num_chapters: u32) -> Self {
        Self {
            metadata: NovelMetadata {
                premise: premise.to_owned(),
                created_at: Utc::now(),
                num_chapters,
            },
            characters: CharacterRegistry::default(),
            chapters: BTreeMap::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        (1..=self.metadata.num_chapters).all(|chapter| self.chapters.contains_key(&chapter))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NovelMetadata {
    pub premise: String,
    pub created_at: DateTime<Utc>,
    pub num_chapters: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub outline: String,
    pub revisions: Vec<ChapterRevision>,
    pub final_text: String,
    pub status: RevisionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRevision {
    /// 1-based.
    pub revision: usize,
    pub content: String,
    pub feedback: String,
}
