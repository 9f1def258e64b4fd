use serde::{Deserialize, Serialize};

use crate::cli::{LlmEngine, WriteArgs};
use crate::command::{CommandConfig, CommandModel};
use crate::config::Sampling;
use crate::openai::{ChatCompletions, OpenAiConfig};
use crate::prompts;

/// Sentinel the agents are asked to end their replies with.
pub const TERMINATOR: &str = "TERMINATE";

/// The agent personas taking part in a novel run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agent {
    CharacterManager,
    Editor,
    Writer,
    Reviewer,
}

impl Agent {
    pub fn name(self) -> &'static str {
        match self {
            Agent::CharacterManager => "character_manager",
            Agent::Editor => "editor",
            Agent::Writer => "writer",
            Agent::Reviewer => "reviewer",
        }
    }

    pub fn system_prompt(self) -> &'static str {
        match self {
            Agent::CharacterManager => prompts::CHARACTER_MANAGER_SYSTEM,
            Agent::Editor => prompts::EDITOR_SYSTEM,
            Agent::Writer => prompts::WRITER_SYSTEM,
            Agent::Reviewer => prompts::REVIEWER_SYSTEM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// One single-shot exchange: a persona, prior turns, and the next user message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub agent: Agent,
    pub system: String,
    pub history: Vec<ChatMessage>,
    pub message: String,
}

impl ChatRequest {
    pub fn new(agent: Agent, message: impl Into<String>) -> Self {
        Self {
            agent,
            system: agent.system_prompt().to_owned(),
            history: Vec::new(),
            message: message.into(),
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

/// The generation capability the pipeline drives. Calls are blocking and
/// issued one at a time.
pub trait ChatModel {
    fn send(&self, request: &ChatRequest) -> anyhow::Result<String>;
}

/// Sends `request` and returns the reply with the termination sentinel removed.
pub fn converse(model: &dyn ChatModel, request: &ChatRequest) -> anyhow::Result<String> {
    tracing::debug!(
        agent = request.agent.name(),
        history = request.history.len(),
        message_chars = request.message.len(),
        "chat request"
    );

    let raw = model.send(request)?;
    if !has_terminator(&raw) {
        tracing::debug!(
            agent = request.agent.name(),
            "reply has no termination marker; using it as-is"
        );
    }

    let reply = strip_terminator(&raw);
    if reply.is_empty() {
        anyhow::bail!("{} returned an empty message", request.agent.name());
    }
    Ok(reply)
}

pub fn has_terminator(text: &str) -> bool {
    text.contains(TERMINATOR)
}

pub fn strip_terminator(text: &str) -> String {
    text.replace(TERMINATOR, "").trim().to_owned()
}

pub fn build_model(args: &WriteArgs, sampling: &Sampling) -> anyhow::Result<Box<dyn ChatModel>> {
    match args.engine {
        LlmEngine::Openai => {
            let mut config = OpenAiConfig::from_env();
            if let Some(base_url) = args.openai_base_url.as_deref() {
                config.base_url = base_url.to_owned();
            }
            if let Some(model) = args.openai_model.as_deref() {
                config.model = model.to_owned();
            }
            tracing::info!(
                engine = "openai",
                base_url = %config.base_url,
                model = %config.model,
                "llm engine"
            );
            Ok(Box::new(ChatCompletions::new(config, sampling.clone())?))
        }
        LlmEngine::Command => {
            let Some(program) = args.command.as_deref() else {
                anyhow::bail!("missing --command (required when --engine=command)");
            };
            tracing::info!(engine = "command", command = program, "llm engine");
            Ok(Box::new(CommandModel::new(CommandConfig {
                program: program.to_owned(),
                args: args.command_args.clone(),
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct Echo {
        reply: &'static str,
        seen: RefCell<Vec<String>>,
    }

    impl ChatModel for Echo {
        fn send(&self, request: &ChatRequest) -> anyhow::Result<String> {
            self.seen.borrow_mut().push(request.system.clone());
            Ok(self.reply.to_owned())
        }
    }

    #[test]
    fn strip_terminator_removes_marker_and_whitespace() {
        assert_eq!(strip_terminator("The end.\n\nTERMINATE\n"), "The end.");
        assert_eq!(strip_terminator("no marker"), "no marker");
    }

    #[test]
    fn converse_uses_agent_system_prompt() -> anyhow::Result<()> {
        let model = Echo {
            reply: "Outline body TERMINATE",
            seen: RefCell::new(Vec::new()),
        };
        let reply = converse(&model, &ChatRequest::new(Agent::Editor, "outline please"))?;

        assert_eq!(reply, "Outline body");
        assert_eq!(model.seen.borrow()[0], prompts::EDITOR_SYSTEM);
        Ok(())
    }

    #[test]
    fn converse_rejects_marker_only_reply() {
        let model = Echo {
            reply: "  TERMINATE ",
            seen: RefCell::new(Vec::new()),
        };
        let err = converse(&model, &ChatRequest::new(Agent::Writer, "write")).unwrap_err();
        assert!(format!("{err:#}").contains("writer returned an empty message"));
    }
}
