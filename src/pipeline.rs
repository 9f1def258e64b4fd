use anyhow::Context as _;

use crate::character::{CharacterStore, parse_character_list};
use crate::config::NovelSettings;
use crate::formats::{ChapterRecord, ChapterRevision, Novel};
use crate::llm::{Agent, ChatMessage, ChatModel, ChatRequest, converse};
use crate::outline::{OutlineReview, OutlineValidator, extract_title};
use crate::prompts;
use crate::revision::{QualityGate, RevisionController, RevisionStatus, Round};
use crate::workspace::Workspace;

/// Critique of one outline attempt: agent notes plus the automated check.
#[derive(Debug, Clone)]
struct OutlineCritique {
    agent_feedback: Option<String>,
    review: OutlineReview,
}

/// Sequential premise-to-novel driver. Every step is skipped when its
/// persisted artifact already exists in the workspace.
pub struct NovelPipeline<'a> {
    model: &'a dyn ChatModel,
    workspace: Workspace,
    settings: NovelSettings,
    characters: CharacterStore,
    outlines: OutlineValidator,
    quality: QualityGate,
}

impl<'a> NovelPipeline<'a> {
    pub fn new(model: &'a dyn ChatModel, workspace: Workspace, settings: NovelSettings) -> Self {
        let outlines = OutlineValidator::new(settings.similarity_threshold);
        let quality = QualityGate::new(&settings.quality_markers);
        Self {
            model,
            workspace,
            settings,
            characters: CharacterStore::new(),
            outlines,
            quality,
        }
    }

    pub fn characters(&self) -> &CharacterStore {
        &self.characters
    }

    pub fn outlines(&self) -> &OutlineValidator {
        &self.outlines
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn run(&mut self, premise: &str) -> anyhow::Result<Novel> {
        let premise = premise.trim();
        if premise.is_empty() {
            anyhow::bail!("premise is empty");
        }
        self.settings.validate().context("validate settings")?;

        self.initialize_characters(premise)
            .context("initialize characters")?;
        let mut novel = self.load_or_start_novel(premise)?;
        novel.characters = self.characters.to_registry();
        self.workspace.save_progress(&novel).context("save progress")?;

        let total = self.settings.num_chapters;
        for chapter in 1..=total {
            let outline = self
                .chapter_outline(premise, chapter)
                .with_context(|| format!("outline chapter {chapter}"))?;

            if self.settings.outline_only {
                continue;
            }
            if novel.chapters.contains_key(&chapter) {
                tracing::info!(chapter, "chapter already written; skipping");
                continue;
            }

            tracing::info!(chapter, total, "writing chapter");
            let record = self
                .write_chapter(&outline, chapter)
                .with_context(|| format!("write chapter {chapter}"))?;

            let appeared = self.characters.scan_chapter_text(&record.final_text, chapter);
            tracing::info!(
                chapter,
                status = ?record.status,
                revisions = record.revisions.len(),
                characters = appeared.len(),
                "chapter complete"
            );

            novel.chapters.insert(chapter, record);
            novel.characters = self.characters.to_registry();
            self.workspace
                .save_characters(&novel.characters)
                .context("save characters")?;
            self.workspace.save_progress(&novel).context("save progress")?;
        }

        Ok(novel)
    }

    /// Loads the persisted registry, or extracts characters from the premise once.
    fn initialize_characters(&mut self, premise: &str) -> anyhow::Result<()> {
        if let Some(registry) = self.workspace.load_characters()? {
            self.characters.restore(registry);
            tracing::info!(
                characters = self.characters.len(),
                "loaded characters from existing file"
            );
            return Ok(());
        }

        tracing::info!("extracting characters from premise");
        let request = ChatRequest::new(
            Agent::CharacterManager,
            prompts::character_extraction(premise),
        );
        let response = converse(self.model, &request)?;
        let entries = parse_character_list(&response).context("parse character list")?;

        for entry in entries {
            match entry {
                Ok(profile) => {
                    tracing::info!(name = %profile.name, role = %profile.role, "added character");
                    self.characters.add(profile);
                }
                Err(err) => tracing::warn!(error = %err, "skipping malformed character"),
            }
        }
        if self.characters.is_empty() {
            tracing::warn!("no characters extracted; continuing without character context");
        }

        self.workspace
            .save_characters(&self.characters.to_registry())
            .context("save characters")
    }

    fn load_or_start_novel(&mut self, premise: &str) -> anyhow::Result<Novel> {
        let Some(mut novel) = self.workspace.load_progress()? else {
            return Ok(Novel::new(premise, self.settings.num_chapters));
        };

        if novel.metadata.premise.trim() != premise {
            anyhow::bail!(
                "{} belongs to a different premise; use another output directory",
                self.workspace.progress_path().display()
            );
        }
        // The snapshot matches the last recorded chapter; characters.json may
        // already hold the scan of a chapter that was never recorded.
        if !novel.characters.characters.is_empty() {
            self.characters.restore(novel.characters.clone());
        }
        novel.metadata.num_chapters = self.settings.num_chapters;

        tracing::info!(
            completed = novel.chapters.len(),
            total = self.settings.num_chapters,
            "resuming novel"
        );
        Ok(novel)
    }

    fn chapter_outline(&mut self, premise: &str, chapter: u32) -> anyhow::Result<String> {
        if let Some(outline) = self.workspace.load_outline(chapter)? {
            tracing::info!(chapter, "using existing outline");
            self.outlines.add_existing(&outline, chapter);
            return Ok(outline);
        }

        let total = self.settings.num_chapters;
        let context = self
            .characters
            .context_for_chapter(chapter, self.settings.recency_window);
        let request_text = prompts::outline_request(premise, chapter, total, &context);
        let agent_review = self.settings.agent_outline_review;
        let model = self.model;
        let validator = &mut self.outlines;

        let controller = RevisionController::new("outline", self.settings.outline_attempts);
        let outcome = controller.revise(
            |previous: Option<&Round<OutlineCritique>>| {
                let request = match previous {
                    None => ChatRequest::new(Agent::Editor, request_text.as_str()),
                    Some(previous) => {
                        tracing::info!(
                            chapter,
                            attempt = previous.round + 1,
                            issues = ?previous.feedback.review.issues,
                            "regenerating outline"
                        );
                        ChatRequest::new(
                            Agent::Editor,
                            prompts::outline_retry(
                                &previous.feedback.review.issues,
                                previous.feedback.agent_feedback.as_deref(),
                            ),
                        )
                        .with_history(vec![
                            ChatMessage::user(request_text.as_str()),
                            ChatMessage::assistant(previous.content.as_str()),
                        ])
                    }
                };
                converse(model, &request)
            },
            |outline, _round| {
                let agent_feedback = if agent_review {
                    let mut notes = Vec::with_capacity(2);
                    for (agent, focus) in [
                        (Agent::Editor, prompts::OUTLINE_REVIEW_PLOT),
                        (Agent::CharacterManager, prompts::OUTLINE_REVIEW_CHARACTERS),
                    ] {
                        let request = ChatRequest::new(
                            agent,
                            prompts::outline_review(outline, chapter, premise, &context, focus),
                        );
                        let note = converse(model, &request)?;
                        notes.push(format!("{}:\n{note}", agent.name()));
                    }
                    Some(notes.join("\n\n"))
                } else {
                    None
                };
                let review = validator.review(outline, chapter, premise);
                Ok(OutlineCritique {
                    agent_feedback,
                    review,
                })
            },
            |critique| critique.review.is_valid,
        )?;

        if outcome.status == RevisionStatus::Exhausted {
            tracing::warn!(
                chapter,
                attempts = outcome.rounds,
                issues = ?outcome.feedback.review.issues,
                "outline attempts exhausted; using the last version"
            );
            self.outlines.add_existing(&outcome.content, chapter);
        }

        self.workspace
            .save_outline(chapter, &outcome.content)
            .with_context(|| format!("save outline {chapter}"))?;
        Ok(outcome.content)
    }

    fn write_chapter(&self, outline: &str, chapter: u32) -> anyhow::Result<ChapterRecord> {
        let total = self.settings.num_chapters;
        let words = self.settings.words_per_chapter;
        let context = self
            .characters
            .context_for_chapter(chapter, self.settings.recency_window);
        let model = self.model;
        let quality = &self.quality;

        let controller = RevisionController::new("chapter", self.settings.max_revisions);
        let outcome = controller.revise(
            |previous: Option<&Round<String>>| {
                let feedback = previous.map(|previous| previous.feedback.as_str());
                let request = ChatRequest::new(
                    Agent::Writer,
                    prompts::chapter_draft(outline, chapter, total, &context, feedback, words),
                );
                converse(model, &request)
            },
            |draft, round| {
                let request = ChatRequest::new(
                    Agent::Reviewer,
                    prompts::chapter_review(draft, chapter, round, &context, words),
                );
                converse(model, &request)
            },
            |feedback| quality.accepts(feedback),
        )?;

        let revisions = outcome
            .history
            .iter()
            .map(|round| ChapterRevision {
                revision: round.round,
                content: round.content.clone(),
                feedback: round.feedback.clone(),
            })
            .collect();

        Ok(ChapterRecord {
            title: extract_title(outline),
            outline: outline.to_owned(),
            revisions,
            final_text: outcome.content,
            status: outcome.status,
        })
    }
}
