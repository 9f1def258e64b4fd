use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::character::CharacterRegistry;
use crate::formats::Novel;

pub const CHARACTERS_FILE: &str = "characters.json";
pub const PROGRESS_FILE: &str = "novel_progress.json";
pub const FINAL_JSON_FILE: &str = "final_novel.json";
pub const FINAL_TEXT_FILE: &str = "final_novel.txt";

/// The output directory of a run. Presence of a file is what marks a step as done.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create output dir: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn characters_path(&self) -> PathBuf {
        self.root.join(CHARACTERS_FILE)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.root.join(PROGRESS_FILE)
    }

    pub fn outline_path(&self, chapter: u32) -> PathBuf {
        self.root.join(format!("outline_chapter_{chapter}.txt"))
    }

    pub fn final_json_path(&self) -> PathBuf {
        self.root.join(FINAL_JSON_FILE)
    }

    pub fn final_text_path(&self) -> PathBuf {
        self.root.join(FINAL_TEXT_FILE)
    }

    pub fn load_characters(&self) -> anyhow::Result<Option<CharacterRegistry>> {
        let path = self.characters_path();
        read_json(&path).with_context(|| format!("load characters: {}", path.display()))
    }

    pub fn save_characters(&self, registry: &CharacterRegistry) -> anyhow::Result<()> {
        write_json_atomic(&self.characters_path(), registry)
    }

    pub fn load_progress(&self) -> anyhow::Result<Option<Novel>> {
        let path = self.progress_path();
        read_json(&path).with_context(|| format!("load progress: {}", path.display()))
    }

    pub fn save_progress(&self, novel: &Novel) -> anyhow::Result<()> {
        write_json_atomic(&self.progress_path(), novel)
    }

    pub fn load_outline(&self, chapter: u32) -> anyhow::Result<Option<String>> {
        read_text(&self.outline_path(chapter))
    }

    pub fn save_outline(&self, chapter: u32, outline: &str) -> anyhow::Result<()> {
        write_text_atomic(&self.outline_path(chapter), outline)
    }

    /// Persisted outlines for chapters `1..=num_chapters`, by chapter.
    pub fn load_outlines(&self, num_chapters: u32) -> anyhow::Result<BTreeMap<u32, String>> {
        let mut outlines = BTreeMap::new();
        for chapter in 1..=num_chapters {
            if let Some(outline) = self.load_outline(chapter)? {
                outlines.insert(chapter, outline);
            }
        }
        Ok(outlines)
    }
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    write_atomic(path, &data)
}

fn read_text(path: &Path) -> anyhow::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read: {}", path.display())),
    }
}

pub fn write_text_atomic(path: &Path, text: &str) -> anyhow::Result<()> {
    write_atomic(path, text.as_bytes())
}

fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp_path, data).with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_read_as_none() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let workspace = Workspace::open(dir.path())?;
        assert!(workspace.load_characters()?.is_none());
        assert!(workspace.load_progress()?.is_none());
        assert!(workspace.load_outline(1)?.is_none());
        Ok(())
    }

    #[test]
    fn outlines_round_trip_without_leftover_tmp_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let workspace = Workspace::open(dir.path().join("run"))?;
        workspace.save_outline(2, "Title: \"Ash\"")?;
        workspace.save_outline(2, "Title: \"Embers\"")?;

        let outlines = workspace.load_outlines(3)?;
        assert_eq!(outlines.len(), 1);
        assert_eq!(outlines.get(&2).map(String::as_str), Some("Title: \"Embers\""));

        let names: Vec<String> = fs::read_dir(workspace.root())?
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["outline_chapter_2.txt"]);
        Ok(())
    }

    #[test]
    fn corrupt_progress_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let workspace = Workspace::open(dir.path())?;
        fs::write(workspace.progress_path(), "{not json")?;
        assert!(workspace.load_progress().is_err());
        Ok(())
    }
}
