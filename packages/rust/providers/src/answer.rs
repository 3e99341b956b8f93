//! Answer generation against retrieved context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use askdocs_shared::{AskDocsError, OpenRouterConfig, Result, TextSegment};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Produces an answer from the retrieved segments and the question.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, segments: &[TextSegment], question: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Chat protocol types (OpenAI-compatible)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

// ---------------------------------------------------------------------------
// OpenRouterAnswerer
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You answer questions using only the provided context. \
If the context does not contain the answer, say so plainly.";

/// Answerer calling an OpenRouter-style chat completions endpoint.
#[derive(Debug)]
pub struct OpenRouterAnswerer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenRouterAnswerer {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Build an answerer from the `[openrouter]` config section, reading the
    /// API key from its configured environment variable.
    pub fn from_config(config: &OpenRouterConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                AskDocsError::provider(format!(
                    "invalid or missing API key: set the {} environment variable",
                    config.api_key_env
                ))
            })?;

        Ok(Self::new(
            config.endpoint.clone(),
            config.default_model.clone(),
            api_key,
        ))
    }

    fn build_prompt(segments: &[TextSegment], question: &str) -> String {
        let mut prompt = String::from("Context:\n");
        for segment in segments {
            prompt.push_str("---\n");
            prompt.push_str(&segment.text);
            prompt.push('\n');
        }
        prompt.push_str("---\n\nQuestion: ");
        prompt.push_str(question);
        prompt
    }
}

#[async_trait]
impl Answerer for OpenRouterAnswerer {
    #[instrument(skip_all, fields(model = %self.model, segments = segments.len()))]
    async fn answer(&self, segments: &[TextSegment], question: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: Self::build_prompt(segments, question),
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AskDocsError::provider(format!("answer request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(AskDocsError::provider(
                "invalid or missing API key: the model endpoint rejected the credential",
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AskDocsError::provider(format!(
                "model endpoint returned {status}: {}",
                &body[..body.len().min(200)]
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AskDocsError::provider(format!("invalid model response: {e}")))?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AskDocsError::provider("model response contained no choices"))?;

        debug!(answer_len = answer.len(), "answer received");
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments() -> Vec<TextSegment> {
        vec![
            TextSegment::new(0, "The launch is scheduled for March."),
            TextSegment::new(1, "Budget approval happened in January."),
        ]
    }

    #[test]
    fn prompt_includes_context_and_question() {
        let prompt = OpenRouterAnswerer::build_prompt(&segments(), "When is the launch?");
        assert!(prompt.contains("The launch is scheduled for March."));
        assert!(prompt.contains("Question: When is the launch?"));
    }

    #[test]
    fn from_config_requires_api_key() {
        let mut config = OpenRouterConfig::default();
        config.api_key_env = "ASKDOCS_TEST_MISSING_ANSWER_KEY".into();
        let err = OpenRouterAnswerer::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("invalid or missing API key"));
    }

    #[tokio::test]
    async fn answer_parses_chat_response() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({
                    "choices": [
                        {"message": {"role": "assistant", "content": "The launch is in March."}}
                    ]
                }),
            ))
            .mount(&server)
            .await;

        let answerer = OpenRouterAnswerer::new(
            format!("{}/chat/completions", server.uri()),
            "test-model",
            "test-key",
        );
        let answer = answerer
            .answer(&segments(), "When is the launch?")
            .await
            .unwrap();
        assert_eq!(answer, "The launch is in March.");
    }

    #[tokio::test]
    async fn answer_maps_auth_failure_to_credential_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let answerer = OpenRouterAnswerer::new(
            format!("{}/chat/completions", server.uri()),
            "test-model",
            "bad-key",
        );
        let err = answerer
            .answer(&segments(), "anything")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid or missing API key"));
    }

    #[tokio::test]
    async fn answer_rejects_empty_choices() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let answerer =
            OpenRouterAnswerer::new(format!("{}/x", server.uri()), "test-model", "key");
        let err = answerer.answer(&segments(), "anything").await.unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }
}
