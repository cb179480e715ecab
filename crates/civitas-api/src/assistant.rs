//! Response-generation collaborator behind the chat, eco-tip and policy
//! features. The core only sees `generate(prompt, context) -> text`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use civitas_types::models::ChatSender;

/// One prior turn handed to the generator as context.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub sender: ChatSender,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("response generator is not configured")]
    Disabled,

    #[error("response generator unreachable: {0}")]
    Transport(String),

    #[error("response generator returned {0}")]
    Status(u16),

    #[error("response generator returned an empty answer")]
    Empty,
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, context: &[ChatTurn]) -> Result<String, GenerationError>;
}

/// Used when no endpoint is configured. Every call fails as upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGenerator;

#[async_trait]
impl ResponseGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &str, _context: &[ChatTurn]) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    context: &'a [ChatTurn],
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(alias = "text")]
    response: String,
}

/// JSON-over-HTTP generator: POSTs `{prompt, context}` and reads `{response}`.
pub struct HttpGenerator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpGenerator {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        Ok(Self { client, url, api_key })
    }
}

#[async_trait]
impl ResponseGenerator for HttpGenerator {
    async fn generate(&self, prompt: &str, context: &[ChatTurn]) -> Result<String, GenerationError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&GenerateRequest { prompt, context });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            warn!("Generator request failed: {}", e);
            GenerationError::Transport(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(GenerationError::Status(response.status().as_u16()));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let text = body.response.trim();
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }
        debug!("Generator answered with {} bytes", text.len());
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/generate", addr)
    }

    #[tokio::test]
    async fn posts_prompt_and_context() {
        let app = Router::new().route(
            "/generate",
            post(|Json(body): Json<Value>| async move {
                let turns = body["context"].as_array().map_or(0, |c| c.len());
                Json(json!({ "response": format!("{} ({} turns)", body["prompt"].as_str().unwrap_or(""), turns) }))
            }),
        );
        let url = serve(app).await;
        let generator = HttpGenerator::new(url, Some("key".into()), Duration::from_secs(5)).unwrap();

        let context = vec![ChatTurn {
            sender: ChatSender::User,
            message: "earlier".into(),
        }];
        let answer = generator.generate("hello", &context).await.unwrap();
        assert_eq!(answer, "hello (1 turns)");
    }

    #[tokio::test]
    async fn upstream_failure_is_an_error() {
        let app = Router::new().route("/generate", post(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let url = serve(app).await;
        let generator = HttpGenerator::new(url, None, Duration::from_secs(5)).unwrap();

        let err = generator.generate("hello", &[]).await.unwrap_err();
        assert!(matches!(err, GenerationError::Status(503)));
    }

    #[tokio::test]
    async fn disabled_generator_always_fails() {
        let err = DisabledGenerator.generate("hello", &[]).await.unwrap_err();
        assert!(matches!(err, GenerationError::Disabled));
    }
}
