use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value;

const OUTLINES: [&str; 3] = [
    "Title: \"Harbor Lights\"\nMara smuggles lanterns past customs inspectors at midnight.",
    "Title: \"Desert Bargain\"\nTobin trades camels for maps with nomad caravans beneath dunes.",
    "Title: \"Frozen Archive\"\nScholars decipher glacier runes inside abandoned monastery vaults.",
];

/// OpenAI-compatible `/v1/chat/completions` server that answers by prompt
/// markers and counts requests per kind.
pub struct OpenAiStub {
    pub base_url: String,
    counts: Arc<Mutex<BTreeMap<String, usize>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OpenAiStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");

        let counts = Arc::new(Mutex::new(BTreeMap::new()));
        let thread_counts = Arc::clone(&counts);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/v1/chat/completions" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };

                let Some(message) = parsed
                    .get("messages")
                    .and_then(|v| v.as_array())
                    .and_then(|messages| messages.last())
                    .and_then(|m| m.get("content"))
                    .and_then(|v| v.as_str())
                else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("missing messages").with_status_code(400),
                    );
                    continue;
                };

                let Some((kind, content)) = scripted_reply(message) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("unknown prompt mode")
                            .with_status_code(400),
                    );
                    continue;
                };
                if let Ok(mut counts) = thread_counts.lock() {
                    *counts.entry(kind.to_owned()).or_insert(0) += 1;
                }

                let response_body = serde_json::json!({
                    "id": "chatcmpl_stub",
                    "object": "chat.completion",
                    "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                    "choices": [
                        {
                            "index": 0,
                            "message": { "role": "assistant", "content": content },
                            "finish_reason": "stop"
                        }
                    ]
                });

                let mut response = tiny_http::Response::from_string(response_body.to_string())
                    .with_status_code(200);
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                response = response.with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            counts,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[allow(dead_code)]
    pub fn count(&self, kind: &str) -> usize {
        self.counts
            .lock()
            .map(|counts| counts.get(kind).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts
            .lock()
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn number_after(text: &str, prefix: &str) -> Option<usize> {
    let start = text.find(prefix)? + prefix.len();
    let digits: String = text[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn scripted_reply(message: &str) -> Option<(&'static str, String)> {
    if message.contains("Create detailed character profiles") {
        return Some((
            "characters",
            "```json\n[{\"name\": \"Mara\", \"role\": \"Pilot\", \"description\": \"Harbor pilot\", \
             \"personality\": \"Stubborn\", \"key_traits\": [\"brave\"], \"first_appearance\": \"1\", \
             \"story_arc\": \"Learns trust\"}]\n```\nTERMINATE"
                .to_owned(),
        ));
    }
    if let Some(chapter) = number_after(message, "Create a detailed outline for Chapter ") {
        let outline = OUTLINES[chapter.saturating_sub(1) % OUTLINES.len()];
        return Some(("outline", format!("{outline}\nTERMINATE")));
    }
    if message.starts_with("Review this outline") {
        return Some(("outline_review", "Coherent and fresh. TERMINATE".to_owned()));
    }
    if let Some(chapter) = number_after(message, "Using this outline for Chapter ") {
        return Some((
            "draft",
            format!("Mara steers through the fog in chapter {chapter}.\n\nTERMINATE"),
        ));
    }
    if message.starts_with("Review this draft") {
        return Some(("chapter_review", "Outstanding chapter. TERMINATE".to_owned()));
    }
    None
}
