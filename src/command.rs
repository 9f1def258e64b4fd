use std::io::Write as _;
use std::process::{Command, Stdio};

use anyhow::Context as _;

use crate::llm::{ChatModel, ChatRequest};

#[derive(Debug, Clone)]
pub struct CommandConfig {
    pub program: String,
    pub args: Vec<String>,
}

/// Runs an external program per request: the request is written to stdin as
/// JSON and stdout is the reply.
#[derive(Debug, Clone)]
pub struct CommandModel {
    config: CommandConfig,
}

impl CommandModel {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

impl ChatModel for CommandModel {
    fn send(&self, request: &ChatRequest) -> anyhow::Result<String> {
        let program = &self.config.program;
        let payload = serde_json::to_vec(request).context("serialize chat request")?;

        let mut child = Command::new(program)
            .args(&self.config.args)
            .env("CHAPTERWRIGHT_AGENT", request.agent.name())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn model command: {program}"))?;

        {
            let mut stdin = child.stdin.take().context("open model command stdin")?;
            stdin
                .write_all(&payload)
                .context("write model command stdin")?;
        }

        let output = child
            .wait_with_output()
            .context("wait model command")?;
        if !output.status.success() {
            anyhow::bail!("model command failed: {program} ({})", output.status);
        }

        String::from_utf8(output.stdout).context("model command stdout is not valid UTF-8")
    }
}
