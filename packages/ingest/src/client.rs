//! Generative-service boundary.
//!
//! Every extraction, bias-scan, and curation call goes through
//! [`CompletionClient`], so tests can substitute a stub and the rest of the
//! system never sees HTTP. [`OllamaClient`] is the production implementation,
//! talking to a local Ollama server's `/api/chat` endpoint.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use vidlore_shared::{OllamaConfig, Result, VidloreError};

/// A single-turn completion boundary.
///
/// `json_mode` asks the backend to constrain output to JSON; callers still
/// treat the response as untrusted text.
pub trait CompletionClient: Send + Sync {
    fn complete(
        &self,
        system: &str,
        user: &str,
        json_mode: bool,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// HTTP client for a local Ollama server.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("vidlore/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| completion_error(format!("client build: {e}"), None, None))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

impl CompletionClient for OllamaClient {
    fn complete(
        &self,
        system: &str,
        user: &str,
        json_mode: bool,
    ) -> impl Future<Output = Result<String>> + Send {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "stream": false,
            "options": { "temperature": 0.2 },
        });
        if json_mode {
            body["format"] = serde_json::Value::String("json".into());
        }
        let request = self.http.post(format!("{}/api/chat", self.base_url)).json(&body);

        async move {
            let response = request.send().await.map_err(|e| {
                completion_error(format!("request failed: {e}"), e.status().map(|s| s.as_u16()), None)
            })?;

            let status = response.status();
            if !status.is_success() {
                let retry_after = parse_retry_after(response.headers());
                let body = response.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                return Err(completion_error(
                    format!("HTTP {status}: {snippet}"),
                    Some(status.as_u16()),
                    retry_after,
                ));
            }

            let parsed: ChatResponse = response.json().await.map_err(|e| {
                completion_error(format!("invalid response body: {e}"), None, None)
            })?;
            Ok(parsed.message.content)
        }
    }
}

fn completion_error(
    message: String,
    status: Option<u16>,
    retry_after_secs: Option<u64>,
) -> VidloreError {
    VidloreError::Completion {
        message,
        status,
        retry_after_secs,
    }
}

/// Read a `Retry-After` seconds hint. Fractional values round up.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs >= 0.0)
        .map(|secs| secs.ceil() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::with_backoff;
    use vidlore_shared::{ErrorKind, RetryConfig};

    fn test_client(server_url: &str) -> OllamaClient {
        let config = OllamaConfig {
            url: server_url.to_string(),
            model: "test-model".into(),
            request_timeout_secs: 5,
            ..OllamaConfig::default()
        };
        OllamaClient::new(&config).expect("build client")
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_secs: 0.01,
            max_delay_secs: 0.05,
        }
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({ "message": { "role": "assistant", "content": content } })
    }

    #[tokio::test]
    async fn successful_completion_returns_content() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/api/chat"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(chat_body("hello")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let text = client.complete("system", "user", false).await.expect("complete");
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn server_error_then_success_is_retried() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/api/chat"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/api/chat"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(chat_body("ok")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let text = with_backoff(&fast_retry(), "test", || {
            client.complete("system", "user", true)
        })
        .await
        .expect("eventual success");
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(429).insert_header("retry-after", "1.5"),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client.complete("s", "u", false).await.expect_err("429");
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(err.retry_after_secs(), Some(2));
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = with_backoff(&fast_retry(), "test", || client.complete("s", "u", false))
            .await
            .expect_err("400 fails fast");
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }
}
