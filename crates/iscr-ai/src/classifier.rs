//! The classification stage: one case's text in, one validated result out.
//!
//! Each call is independent of every other case. Calls share only the
//! requests-per-minute limiter, so any number may run concurrently.

use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use iscr_core::{ClassificationResult, RetryPolicy};
use tracing::{debug, info, warn};

use crate::ClassificationError;
use crate::llm::{Completion, LanguageModel, Message};
use crate::prompt;
use crate::response::{self, SchemaViolation};
use crate::taxonomy::Taxonomy;

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Input budget for the case text, in estimated tokens.
    pub max_input_tokens: usize,
    /// Corrective follow-ups allowed after a schema-violating reply.
    pub schema_retries: u32,
    pub requests_per_minute: NonZeroU32,
    /// Transport retry for throttling, server errors and network failures.
    pub retry: RetryPolicy,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: 3000,
            schema_retries: 2,
            requests_per_minute: NonZeroU32::new(30).unwrap_or(NonZeroU32::MIN),
            retry: RetryPolicy {
                max_attempts: 6,
                initial_backoff: std::time::Duration::from_secs(2),
                ..RetryPolicy::default()
            },
        }
    }
}

pub struct Classifier {
    model: Arc<dyn LanguageModel>,
    taxonomy: Taxonomy,
    system_prompt: String,
    limiter: DefaultDirectRateLimiter,
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(model: Arc<dyn LanguageModel>, taxonomy: Taxonomy, config: ClassifierConfig) -> Self {
        let limiter = RateLimiter::direct(Quota::per_minute(config.requests_per_minute));
        let system_prompt = prompt::system_prompt(&taxonomy);
        Self {
            model,
            taxonomy,
            system_prompt,
            limiter,
            config,
        }
    }

    /// Classify one case.
    ///
    /// A reply that fails validation gets a corrective follow-up in the same
    /// conversation, up to `schema_retries` times; after that the case fails
    /// with [`ClassificationError::Schema`] rather than storing a guess.
    pub async fn classify(
        &self,
        case_id: &str,
        text: &str,
    ) -> Result<ClassificationResult, ClassificationError> {
        if text.trim().is_empty() {
            return Err(ClassificationError::EmptyInput {
                case_id: case_id.to_string(),
            });
        }

        let input = prompt::truncate_to_budget(text, self.config.max_input_tokens);
        if input.len() < text.len() {
            debug!(case_id, from = text.len(), to = input.len(), "truncated case text");
        }

        let mut messages = vec![
            Message::system(self.system_prompt.as_str()),
            Message::user(prompt::user_prompt(case_id, &input)),
        ];

        let attempts = self.config.schema_retries + 1;
        let mut last = SchemaViolation(String::new());
        for attempt in 1..=attempts {
            let completion = self.request(&messages).await?;
            match response::parse_reply(&completion.content, &self.taxonomy) {
                Ok(reply) => {
                    info!(
                        case_id,
                        outcome = %reply.outcome,
                        flags = reply.guideline_flags.len(),
                        attempt,
                        "classified"
                    );
                    return Ok(ClassificationResult {
                        case_id: case_id.to_string(),
                        outcome: reply.outcome,
                        guideline_flags: reply.guideline_flags,
                        rationale_summary: reply.rationale_summary,
                        model_version: completion.model,
                        classified_at: Utc::now(),
                    });
                }
                Err(violation) => {
                    warn!(case_id, attempt, error = %violation, "reply failed validation");
                    messages.push(Message::assistant(completion.content));
                    messages.push(Message::user(prompt::corrective_prompt(&violation.0)));
                    last = violation;
                }
            }
        }

        Err(ClassificationError::Schema {
            attempts,
            detail: last.0,
        })
    }

    /// One model call under the rate limit, retried on transient failures.
    async fn request(&self, messages: &[Message]) -> Result<Completion, ClassificationError> {
        let model = &self.model;
        let limiter = &self.limiter;
        self.config
            .retry
            .run("llm request", move |_| async move {
                limiter.until_ready().await;
                model.complete(messages).await
            })
            .await
    }
}
