use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use screener_core::{PromptPayload, ReasoningService, ServiceFailure};

#[derive(Debug, Clone, Serialize)]
struct AnalyzeRequest<'a> {
    system: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct AnalyzeResponse {
    text: String,
}

/// HTTP-backed reasoning service client.
#[derive(Clone)]
pub struct HttpReasoningService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReasoningService {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, base_url }
    }

    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("REASONING_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:8010".to_string());
        let timeout_secs = std::env::var("REASONING_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90);
        Self::new(base_url, Duration::from_secs(timeout_secs))
    }
}

#[async_trait]
impl ReasoningService for HttpReasoningService {
    async fn submit(&self, prompt: &PromptPayload) -> Result<String, ServiceFailure> {
        let request = AnalyzeRequest {
            system: &prompt.system,
            prompt: &prompt.user,
        };

        let response = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceFailure::Timeout
                } else {
                    ServiceFailure::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceFailure::RateLimited(body));
        }
        if !status.is_success() {
            return Err(ServiceFailure::Transport(format!("HTTP {status}")));
        }

        let reply = response
            .json::<AnalyzeResponse>()
            .await
            .map_err(|e| ServiceFailure::Transport(format!("invalid reply body: {e}")))?;
        Ok(reply.text)
    }
}
