use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use serde::ser::{Serialize, Serializer};

use crate::cli::{ExportArgs, ExportFormat};
use crate::formats::{ChapterRecord, Novel};
use crate::workspace::{Workspace, write_json_atomic, write_text_atomic};

const RULE_WIDTH: usize = 50;

pub fn run(args: ExportArgs) -> anyhow::Result<()> {
    if Path::new(&args.out).exists() && !args.force {
        anyhow::bail!("export output already exists: {}", args.out);
    }
    if let Some(parent) = Path::new(&args.out).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export output dir: {}", parent.display()))?;
    }

    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("read input: {}", args.input))?;
    let novel: Novel =
        serde_json::from_str(&raw).with_context(|| format!("parse novel: {}", args.input))?;
    if novel.chapters.is_empty() {
        anyhow::bail!("no finished chapters in {}", args.input);
    }

    let contents = match args.format {
        ExportFormat::Json => {
            let mut json = serde_json::to_string_pretty(&FinalVersions(&novel.chapters))
                .context("serialize final versions")?;
            json.push('\n');
            json
        }
        ExportFormat::Txt => render_chapters_text(&novel),
    };

    tracing::info!(
        format = ?args.format,
        chapters = novel.chapters.len(),
        out = %args.out,
        "export final versions"
    );
    write_output(&args.out, &contents, args.force)
}

fn write_output(out: &str, contents: &str, force: bool) -> anyhow::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = options
        .open(out)
        .with_context(|| format!("open output: {out}"))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write output: {out}"))?;
    file.flush()
        .with_context(|| format!("flush output: {out}"))?;
    Ok(())
}

/// Writes `final_novel.json` and `final_novel.txt` into the run directory.
pub fn write_final_outputs(workspace: &Workspace, novel: &Novel) -> anyhow::Result<()> {
    let json_path = workspace.final_json_path();
    write_json_atomic(&json_path, novel)
        .with_context(|| format!("write final novel: {}", json_path.display()))?;

    let text_path = workspace.final_text_path();
    write_text_atomic(&text_path, &render_novel_text(novel))
        .with_context(|| format!("write final novel text: {}", text_path.display()))?;

    tracing::info!(
        json = %json_path.display(),
        text = %text_path.display(),
        chapters = novel.chapters.len(),
        "final novel written"
    );
    Ok(())
}

/// `{"Chapter_1": "...", "Chapter_2": "..."}` in chapter order.
struct FinalVersions<'a>(&'a BTreeMap<u32, ChapterRecord>);

impl Serialize for FinalVersions<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.0
                .iter()
                .map(|(chapter, record)| (format!("Chapter_{chapter}"), &record.final_text)),
        )
    }
}

/// Premise, character list, then every chapter.
pub fn render_novel_text(novel: &Novel) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    out.push_str("Novel Premise:\n");
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&novel.metadata.premise);
    out.push_str("\n\n");

    out.push_str("Characters:\n");
    out.push_str(&rule);
    out.push('\n');
    for character in novel.characters.characters.values() {
        out.push_str(&format!(
            "\n{}:\nRole: {}\nDescription: {}\nKey Traits: {}\n\n",
            character.name,
            character.role,
            character.description,
            character.key_traits.join(", ")
        ));
    }

    for (chapter, record) in &novel.chapters {
        // Drafts often open with their own "Chapter N" heading.
        if !record.final_text.contains("Chapter") {
            out.push_str(&format!("\nChapter {chapter}\n"));
        }
        push_chapter_body(&mut out, &rule, &record.final_text);
    }
    out
}

/// Chapters only, each under a `Chapter N` header.
pub fn render_chapters_text(novel: &Novel) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    for (chapter, record) in &novel.chapters {
        out.push_str(&format!("\nChapter {chapter}\n"));
        push_chapter_body(&mut out, &rule, &record.final_text);
    }
    out
}

fn push_chapter_body(out: &mut String, rule: &str, text: &str) {
    out.push_str(rule);
    out.push_str("\n\n");
    out.push_str(text);
    out.push_str("\n\n");
}
