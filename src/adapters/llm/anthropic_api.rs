//! Anthropic Messages API gateway.
//!
//! Requests are paced by a `governor` rate limiter and retried with
//! exponential backoff on 429, 5xx and transport errors. Other 4xx
//! responses fail immediately.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::LlmConfig;
use crate::domain::ports::{LlmGateway, LlmRequest};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Whether a failed status is worth retrying.
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// [`LlmGateway`] over the Anthropic Messages API.
pub struct AnthropicGateway {
    client: Client,
    config: LlmConfig,
    api_key: String,
    limiter: Arc<DefaultDirectRateLimiter>,
    initial_backoff: Duration,
}

impl AnthropicGateway {
    /// Build a gateway. Fails when no API key is configured or in
    /// `ANTHROPIC_API_KEY`.
    pub fn new(config: LlmConfig) -> DomainResult<Self> {
        let api_key = config
            .resolved_api_key()
            .ok_or_else(|| DomainError::ValidationFailed("ANTHROPIC_API_KEY not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DomainError::Llm(format!("failed to create HTTP client: {e}")))?;

        let rps = NonZeroU32::new(config.requests_per_second)
            .ok_or_else(|| DomainError::ValidationFailed("requests_per_second must be > 0".to_string()))?;

        Ok(Self {
            client,
            api_key,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
            initial_backoff: Duration::from_millis(500),
            config,
        })
    }

    /// First retry delay; later delays grow exponentially.
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    async fn send_once(
        &self,
        body: &MessagesRequest<'_>,
        attempt: u32,
    ) -> Result<String, backoff::Error<DomainError>> {
        let retries_left = attempt <= self.config.max_http_retries;
        let classify = |err: DomainError, transient: bool| {
            if transient && retries_left {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            }
        };

        self.limiter.until_ready().await;
        debug!(attempt, model = %self.config.model, "sending messages request");

        let response = match self
            .client
            .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(attempt, error = %e, "messages request failed");
                return Err(classify(DomainError::Llm(format!("request failed: {e}")), true));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(attempt, %status, "messages API returned an error");
            return Err(classify(
                DomainError::Llm(format!("API error {status}: {text}")),
                is_transient(status),
            ));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(DomainError::Llm(format!("failed to parse response: {e}")))
        })?;
        debug!(stop_reason = ?parsed.stop_reason, "messages response received");

        Ok(parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl LlmGateway for AnthropicGateway {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, request: LlmRequest) -> DomainResult<String> {
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            system: request.system.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
        };

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_elapsed_time(None)
            .build();

        let body = &body;
        let mut attempt = 0u32;
        backoff::future::retry(policy, || {
            attempt += 1;
            let current = attempt;
            async move { self.send_once(body, current).await }
        })
        .await
    }
}
