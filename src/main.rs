use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    let cli = chapterwright::cli::Cli::parse();
    chapterwright::logging::init(&cli.log_level).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        chapterwright::cli::Command::Write(args) => {
            chapterwright::write::run(args).context("write")?;
        }
        chapterwright::cli::Command::Export(args) => {
            chapterwright::export::run(args).context("export")?;
        }
    }

    Ok(())
}
