/*!
Reply generation through an Ollama compatible chat API.
*/

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    http,
    model::{LlmMessage, Role},
    Error, Result,
};

const SERVICE: &str = "LLM";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub host: String,
    pub model_name: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:11434".to_string(),
            model_name: "llama2:7b".to_string(),
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 30.0,
        }
    }
}

impl LlmConfig {
    /// Clamp the temperature into `0.0-2.0`.
    pub fn clamped(mut self) -> Self {
        self.temperature = if self.temperature.is_nan() {
            Self::default().temperature
        } else {
            self.temperature.clamp(0.0, 2.0)
        };

        self
    }
}

/// Anything that can turn viewer text into a reply.
#[async_trait]
pub trait LanguageModel: Send {
    async fn generate(&mut self, input: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<LlmMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Default, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug)]
pub struct OllamaClient {
    config: LlmConfig,
    client: reqwest::Client,
    history: Vec<LlmMessage>,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let config = config.clamped();
        let client = http::client(SERVICE, config.timeout_secs)?;

        Ok(Self {
            config,
            client,
            history: vec![],
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
        self.history.push(LlmMessage::new(role, content));
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &[LlmMessage] {
        &self.history
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.host.trim_end_matches('/'))
    }

    /// The system prompt, the conversation so far and then `input`.
    fn request(&self, input: &str, stream: bool) -> ChatRequest<'_> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if let Some(prompt) = self.config.system_prompt.as_ref().filter(|v| !v.is_empty()) {
            messages.push(LlmMessage::new(Role::System, prompt.clone()));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(LlmMessage::new(Role::User, input));

        ChatRequest {
            model: &self.config.model_name,
            messages,
            stream,
            options: ChatOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        }
    }

    async fn post_chat(&self, input: &str, stream: bool) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&self.request(input, stream))
            .send()
            .await
            .map_err(http::map_err(SERVICE, self.config.timeout_secs))?;

        http::check(SERVICE, response).await
    }

    /// Send `input` and wait for the whole reply.
    ///
    /// The history only changes once a reply arrives, so a failed or dropped call
    /// leaves it as it was.
    pub async fn generate_response(&mut self, input: &str) -> Result<String> {
        let result = async {
            let chunk = self
                .post_chat(input, false)
                .await?
                .json::<ChatChunk>()
                .await
                .map_err(http::map_err(SERVICE, self.config.timeout_secs))?;

            chunk.message.map(|v| v.content).ok_or_else(|| Error::Service {
                service: SERVICE,
                reason: "response has no message".to_string(),
            })
        }
        .await;

        self.finish(input, result)
    }

    /// Like [OllamaClient::generate_response] but `on_chunk` sees each piece as it arrives.
    pub async fn generate_streamed<F>(&mut self, input: &str, mut on_chunk: F) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let result = async {
            let mut response = self.post_chat(input, true).await?;
            let mut pending = vec![];
            let mut reply = String::new();

            while let Some(bytes) = response
                .chunk()
                .await
                .map_err(http::map_err(SERVICE, self.config.timeout_secs))?
            {
                pending.extend_from_slice(&bytes);
                if drain_lines(&mut pending, &mut reply, &mut on_chunk) {
                    return Ok(reply);
                }
            }

            // The last line may lack a trailing newline
            pending.push(b'\n');
            drain_lines(&mut pending, &mut reply, &mut on_chunk);

            Ok::<_, Error>(reply)
        }
        .await;

        self.finish(input, result)
    }

    /// Record a successful exchange. User and assistant turns are only ever added in pairs.
    fn finish(&mut self, input: &str, result: Result<String>) -> Result<String> {
        let reply = result?;
        debug!("Generated {} characters", reply.len());

        self.add_message(Role::User, input);
        self.add_message(Role::Assistant, reply.clone());

        Ok(reply)
    }

    /// Model details from `/api/show`.
    pub async fn model_info(&self) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(self.url("/api/show"))
            .json(&serde_json::json!({ "name": self.config.model_name }))
            .send()
            .await
            .map_err(http::map_err(SERVICE, self.config.timeout_secs))?;

        http::check(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(http::map_err(SERVICE, self.config.timeout_secs))
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&mut self, input: &str) -> Result<String> {
        self.generate_response(input).await
    }
}

/// Consume every complete line in `pending`. Returns `true` once the final chunk is seen.
fn drain_lines(
    pending: &mut Vec<u8>,
    reply: &mut String,
    on_chunk: &mut impl FnMut(&str),
) -> bool {
    while let Some(idx) = pending.iter().position(|v| *v == b'\n') {
        let line = pending.drain(..=idx).collect::<Vec<_>>();
        let line = String::from_utf8_lossy(&line);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let chunk = match serde_json::from_str::<ChatChunk>(line) {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping unparseable stream line: {e}");
                continue;
            }
        };

        if let Some(message) = chunk.message.filter(|v| !v.content.is_empty()) {
            on_chunk(&message.content);
            reply.push_str(&message.content);
        }

        if chunk.done {
            return true;
        }
    }

    false
}
