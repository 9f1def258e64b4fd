use std::time::Duration;

use anyhow::Context as _;

use crate::config::Sampling;
use crate::llm::{ChatModel, ChatRequest, MessageRole};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("CHAPTERWRIGHT_OPENAI_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:1234/v1".to_owned());
        let model =
            std::env::var("CHAPTERWRIGHT_OPENAI_MODEL").unwrap_or_else(|_| "local-model".to_owned());
        // Local OpenAI-compatible servers usually ignore the key.
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        Self {
            base_url,
            model,
            api_key,
            timeout: Duration::from_secs(600),
        }
    }
}

pub fn chat_completions_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/chat/completions")
}

/// Blocking client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletions {
    client: reqwest::blocking::Client,
    endpoint: String,
    config: OpenAiConfig,
    sampling: Sampling,
}

impl ChatCompletions {
    pub fn new(config: OpenAiConfig, sampling: Sampling) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: chat_completions_endpoint(&config.base_url),
            config,
            sampling,
        })
    }
}

impl ChatModel for ChatCompletions {
    fn send(&self, request: &ChatRequest) -> anyhow::Result<String> {
        let body = request_body(&self.config.model, &self.sampling, request);

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = self.config.api_key.as_deref() {
            builder = builder.bearer_auth(api_key);
        }
        let response = builder
            .send()
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().context("read chat completion body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("chat completion API error ({status}): {message}");
        }

        let value: serde_json::Value =
            serde_json::from_str(&raw).context("parse chat completion response")?;
        extract_message_text(&value).context("extract message text")
    }
}

fn request_body(model: &str, sampling: &Sampling, request: &ChatRequest) -> serde_json::Value {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(serde_json::json!({ "role": "system", "content": request.system }));
    for message in &request.history {
        let role = match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        messages.push(serde_json::json!({ "role": role, "content": message.content }));
    }
    messages.push(serde_json::json!({ "role": "user", "content": request.message }));

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "temperature": sampling.temperature,
        "top_p": sampling.top_p,
        "frequency_penalty": sampling.frequency_penalty,
        "presence_penalty": sampling.presence_penalty,
    });
    if let Some(seed) = sampling.seed
        && let Some(obj) = body.as_object_mut()
    {
        obj.insert("seed".to_owned(), serde_json::json!(seed));
    }
    body
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_message_text(value: &serde_json::Value) -> anyhow::Result<String> {
    let choices = value
        .get("choices")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("missing `choices` array in response"))?;

    let text = choices
        .iter()
        .filter_map(|choice| choice.pointer("/message/content").and_then(|v| v.as_str()))
        .next()
        .unwrap_or_default();

    if text.trim().is_empty() {
        anyhow::bail!("chat completion text is empty");
    }
    Ok(text.to_owned())
}
