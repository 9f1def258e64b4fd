use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate (or resume) a novel from a premise.
    Write(WriteArgs),
    /// Export the final chapters of a finished run.
    Export(ExportArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LlmEngine {
    /// OpenAI-compatible `/chat/completions` endpoint.
    Openai,
    /// External program: request JSON on stdin, reply on stdout.
    Command,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    /// Path to a text file containing the premise.
    #[arg(long, conflicts_with = "premise")]
    pub premise_file: Option<String>,

    /// Premise text.
    #[arg(long)]
    pub premise: Option<String>,

    /// Output directory for the run (outlines, characters, progress).
    #[arg(long, default_value = "novel_output")]
    pub out: String,

    /// YAML settings file.
    #[arg(long)]
    pub settings: Option<String>,

    /// Number of chapters to write.
    #[arg(long)]
    pub chapters: Option<u32>,

    /// Target word count per chapter.
    #[arg(long)]
    pub words_per_chapter: Option<u32>,

    /// Maximum draft/review rounds per chapter.
    #[arg(long)]
    pub max_revisions: Option<usize>,

    /// Stop after producing chapter outlines.
    #[arg(long, default_value_t = false)]
    pub outline_only: bool,

    #[arg(long, value_enum, default_value_t = LlmEngine::Openai)]
    pub engine: LlmEngine,

    /// Base URL for the OpenAI-compatible API (overrides the environment).
    #[arg(long)]
    pub openai_base_url: Option<String>,

    /// Model name for the OpenAI-compatible API (overrides the environment).
    #[arg(long)]
    pub openai_model: Option<String>,

    /// Program to run when `--engine=command`.
    #[arg(long)]
    pub command: Option<String>,

    /// Arguments passed to `--command` (after `--`).
    #[arg(last = true)]
    pub command_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Txt,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Input path to `novel_progress.json`.
    #[arg(long)]
    pub input: String,

    /// Output file path.
    #[arg(long)]
    pub out: String,

    #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
    pub format: ExportFormat,

    /// Overwrite the output file if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}
