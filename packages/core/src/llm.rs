//! The completion collaborator. The pipeline only needs "text in, text
//! out", so the model sits behind a trait and the HTTP implementation
//! targets any OpenAI-compatible `/chat/completions` endpoint. Timeout and
//! retry live here, at the call site.

use std::time::Duration;

use rowforge_types::{Result, anyhow, async_trait};
use serde_json::json;

use crate::reply::FIELDS;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("LLM_ENDPOINT")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| anyhow!("LLM_API_KEY is not set"))?;
        let model =
            std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let timeout_secs: u64 = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(120);
        let max_retries: u32 = std::env::var("LLM_MAX_RETRIES")
            .ok()
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(2);

        Ok(LlmConfig {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model,
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
        })
    }
}

/// The opaque network collaborator: a text prompt in, a text completion
/// out. A trait so the pipeline can run against a scripted stub in tests.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

pub struct HttpCompletionModel {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpCompletionModel {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow!("failed to build http client: {}", e))?;
        Ok(Self { client, config })
    }

    async fn send_once(&self, system: &str, user: &str) -> std::result::Result<String, CallError> {
        let url = format!("{}/chat/completions", self.config.endpoint);
        let body = json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Retryable(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(300).collect();
            let err = anyhow!("completion request failed {}: {}", status, snippet);
            return Err(if retry_after_status(status) {
                CallError::Retryable(err)
            } else {
                CallError::Fatal(err)
            });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CallError::Retryable(e.into()))?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                CallError::Fatal(anyhow!("completion response carried no message content"))
            })
    }
}

/// Transport errors and 429/5xx are retried; everything else surfaces
/// immediately.
enum CallError {
    Retryable(rowforge_types::Error),
    Fatal(rowforge_types::Error),
}

/// Rate limiting and server-side failures are transient; any other
/// non-success status means the request itself is wrong.
fn retry_after_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

#[async_trait]
impl CompletionModel for HttpCompletionModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let mut backoff = Duration::from_millis(500);
        let attempts = self.config.max_retries + 1;
        let mut last_err = None;

        for attempt in 1..=attempts {
            match self.send_once(system, user).await {
                Ok(text) => return Ok(text),
                Err(CallError::Fatal(e)) => return Err(e),
                Err(CallError::Retryable(e)) => {
                    tracing::warn!(
                        "completion attempt {}/{} failed: {:#}",
                        attempt,
                        attempts,
                        e
                    );
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("completion failed with no attempts")))
    }
}

/// System + user prompt for one sheet window. The system half pins the
/// output contract (JSON array of objects keyed by the schema fields); the
/// user half carries the rendered window.
pub fn build_prompt(sheet: &str, region: &str, product: &str, preview: &str) -> (String, String) {
    let mut system = String::from(
        "You map raw spreadsheet windows of sales-performance data onto a fixed record schema.\n\
         For every data row in the window emit one object. Skip title rows, header rows, \
         subtotal and total rows.\n\nOutput fields, in this exact spelling:\n",
    );
    for field in FIELDS {
        system.push_str("- ");
        system.push_str(field);
        system.push('\n');
    }
    system.push_str(
        "\nReply with a JSON array of objects using exactly these keys and nothing else: \
         no prose, no markdown fence. Keep values as they appear in the sheet; use \"\" for \
         anything the window does not provide.",
    );

    let mut user = String::new();
    if !region.is_empty() {
        user.push_str(&format!("Default region when the sheet has none: {}\n", region));
    }
    if !product.is_empty() {
        user.push_str(&format!("Default product when the sheet has none: {}\n", product));
    }
    user.push_str(&format!("Window of sheet '{}':\n\n{}", sheet, preview));

    (system, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_field_and_carries_the_preview() {
        let (system, user) = build_prompt("North", "Banner", "P1", "Row 2: A | 10");
        for field in FIELDS {
            assert!(system.contains(field), "missing field {}", field);
        }
        assert!(user.contains("Row 2: A | 10"));
        assert!(user.contains("Banner"));
        assert!(user.contains("'North'"));
    }

    #[test]
    fn empty_metadata_adds_no_default_lines() {
        let (_, user) = build_prompt("S", "", "", "x");
        assert!(!user.contains("Default region"));
        assert!(!user.contains("Default product"));
    }

    #[test]
    fn only_rate_limits_and_server_errors_are_retried() {
        use reqwest::StatusCode;

        assert!(retry_after_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(retry_after_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(retry_after_status(StatusCode::BAD_GATEWAY));
        assert!(retry_after_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!retry_after_status(StatusCode::BAD_REQUEST));
        assert!(!retry_after_status(StatusCode::UNAUTHORIZED));
        assert!(!retry_after_status(StatusCode::NOT_FOUND));
    }

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::{Json, Router, http::StatusCode, routing::post};

    async fn serve_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn model_against(endpoint: String) -> HttpCompletionModel {
        HttpCompletionModel::new(LlmConfig {
            endpoint,
            api_key: "test-key".to_string(),
            model: "stub".to_string(),
            timeout: Duration::from_secs(5),
            max_retries: 2,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                let hits = Arc::clone(&counter);
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" })))
                    } else {
                        (
                            StatusCode::OK,
                            Json(json!({ "choices": [{ "message": { "content": "[]" } }] })),
                        )
                    }
                }
            }),
        );

        let model = model_against(serve_stub(app).await);
        let text = model.complete("s", "u").await.unwrap();
        assert_eq!(text, "[]");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_fail_on_the_first_attempt() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                let hits = Arc::clone(&counter);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad model" })))
                }
            }),
        );

        let model = model_against(serve_stub(app).await);
        let err = model.complete("s", "u").await.unwrap_err();
        assert!(err.to_string().contains("400"), "unexpected error: {:#}", err);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
