//! Chat-completion client.
//!
//! [`LanguageModel`] is the seam the classifier talks to. [`OpenAiChat`]
//! speaks the OpenAI-compatible `/chat/completions` protocol, which most
//! hosted and self-hosted model servers also accept.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ClassificationError;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    /// Model that actually answered, as reported by the server.
    pub model: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Configured model name.
    fn model(&self) -> &str;

    /// Send a conversation and return the assistant's reply.
    async fn complete(&self, messages: &[Message]) -> Result<Completion, ClassificationError>;
}

// ── OpenAI-compatible client ──

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// [`LanguageModel`] over an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct OpenAiChat {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiChat {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, ClassificationError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<Completion, ClassificationError> {
        let start = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.0,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "LLM API error");
            return Err(ClassificationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let raw: ChatResponse = response.json().await?;
        // Missing or null content is passed on as an empty reply for validation.
        let content = raw
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let model = raw
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.model.clone());

        debug!(
            model = %model,
            duration_ms = start.elapsed().as_millis() as u64,
            "chat completion"
        );
        Ok(Completion { content, model })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iscr_core::Transient;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenAiChat {
        OpenAiChat::new(
            format!("{}/v1/chat/completions", server.uri()),
            "sk-test",
            "gpt-4o-mini",
            256,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn reply(content: &str, model: Option<&str>) -> serde_json::Value {
        let mut body = json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        });
        if let Some(model) = model {
            body["model"] = json!(model);
        }
        body
    }

    #[tokio::test]
    async fn sends_deterministic_json_mode_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "temperature": 0.0,
                "max_tokens": 256,
                "response_format": {"type": "json_object"},
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(reply("{}", Some("gpt-4o-mini-2024-07-18"))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let completion = client(&server)
            .complete(&[Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(completion.content, "{}");
        assert_eq!(completion.model, "gpt-4o-mini-2024-07-18");
    }

    #[tokio::test]
    async fn model_falls_back_to_configured_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("{}", None)))
            .mount(&server)
            .await;

        let completion = client(&server)
            .complete(&[Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(completion.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn rate_limit_is_transient_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client(&server)
            .complete(&[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationError::Api { status: 429, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn empty_choices_yield_empty_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let completion = client(&server)
            .complete(&[Message::user("hi")])
            .await
            .unwrap();
        assert!(completion.content.is_empty());
    }
}
