use std::path::Path;

use anyhow::Context as _;

use crate::cli::WriteArgs;
use crate::config::NovelSettings;
use crate::export;
use crate::llm;
use crate::pipeline::NovelPipeline;
use crate::workspace::Workspace;

pub fn run(args: WriteArgs) -> anyhow::Result<()> {
    let settings = resolve_settings(&args)?;
    let premise = read_premise(&args)?;

    let model = llm::build_model(&args, &settings.sampling)?;
    let workspace = Workspace::open(&args.out)?;
    tracing::info!(
        out = %workspace.root().display(),
        chapters = settings.num_chapters,
        max_revisions = settings.max_revisions,
        outline_only = settings.outline_only,
        "write novel"
    );

    let outline_only = settings.outline_only;
    let mut pipeline = NovelPipeline::new(model.as_ref(), workspace, settings);
    let novel = pipeline.run(&premise)?;

    if outline_only {
        tracing::info!(
            outlines = pipeline.outlines().len(),
            "outline-only run complete"
        );
        return Ok(());
    }
    export::write_final_outputs(pipeline.workspace(), &novel)
}

fn resolve_settings(args: &WriteArgs) -> anyhow::Result<NovelSettings> {
    let mut settings = NovelSettings::load(args.settings.as_deref().map(Path::new))?;
    if let Some(chapters) = args.chapters {
        settings.num_chapters = chapters;
    }
    if let Some(words) = args.words_per_chapter {
        settings.words_per_chapter = words;
    }
    if let Some(max_revisions) = args.max_revisions {
        settings.max_revisions = max_revisions;
    }
    if args.outline_only {
        settings.outline_only = true;
    }
    settings.validate().context("validate settings")?;
    Ok(settings)
}

fn read_premise(args: &WriteArgs) -> anyhow::Result<String> {
    let premise = match (args.premise_file.as_deref(), args.premise.as_deref()) {
        (Some(path), _) => {
            std::fs::read_to_string(path).with_context(|| format!("read premise: {path}"))?
        }
        (None, Some(premise)) => premise.to_owned(),
        (None, None) => anyhow::bail!("missing premise (use --premise-file or --premise)"),
    };
    let premise = premise.trim().to_owned();
    if premise.is_empty() {
        anyhow::bail!("premise is empty");
    }
    Ok(premise)
}
