use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::chat::prompt::AnalysisRequest;
use crate::errors::AnalysisError;
use crate::models::analysis::{AnalysisResult, validate};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(String);

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// One POST of a JSON body to the analysis endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        api_key: &str,
        body: &Value,
    ) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn post_json(
        &self,
        url: &str,
        api_key: &str,
        body: &Value,
    ) -> Result<TransportResponse, TransportError> {
        (**self).post_json(url, api_key, body).await
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        api_key: &str,
        body: &Value,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(TransportResponse { status, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below one are raised to one.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delays to wait before attempts 2..=max_attempts, doubling and capped.
    pub fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_attempts as usize - 1)
            .build()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(8))
    }
}

/// What a single attempt produced. Lives only inside one `submit` call.
#[derive(Debug)]
enum AttemptOutcome {
    /// The service answered with a text payload for the validator.
    Payload(String),
    /// Transient failure, worth another attempt.
    Retry(String),
    /// Retrying the same request cannot help.
    Fatal(AnalysisError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

pub struct AnalysisClient<T = HttpTransport> {
    transport: T,
    api_key: Option<String>,
    model: String,
    endpoint: String,
    policy: RetryPolicy,
}

impl<T: Transport> AnalysisClient<T> {
    pub fn new(
        transport: T,
        api_key: Option<String>,
        model: String,
        endpoint: String,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            api_key,
            model,
            endpoint,
            policy,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }

    /// Runs the request through the retry loop and validates the payload.
    pub async fn submit(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let api_key = match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => {
                return Err(AnalysisError::Configuration(
                    "no API key configured; set GEMINI_API_KEY or llm.api_key".to_string(),
                ));
            }
        };

        info!(
            "requesting analysis (model: {}, max attempts: {})",
            self.model, self.policy.max_attempts
        );

        let url = self.url();
        let body = request.to_body();
        let mut delays = self.policy.backoff();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.attempt(&url, api_key, &body, attempt).await {
                AttemptOutcome::Payload(raw) => {
                    debug!("attempt {} returned {} chars of payload", attempt, raw.len());
                    let result = validate(&raw);
                    if let Err(ref e) = result {
                        warn!("analysis payload rejected: {}", e);
                    }
                    return result;
                }
                AttemptOutcome::Fatal(err) => return Err(err),
                AttemptOutcome::Retry(reason) => match delays.next() {
                    Some(delay) => {
                        warn!(
                            "analysis attempt {}/{} failed: {}; retrying in {}ms",
                            attempt,
                            self.policy.max_attempts,
                            reason,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        warn!("analysis attempt {} failed: {}; giving up", attempt, reason);
                        return Err(AnalysisError::ServiceUnavailable {
                            attempts: attempt,
                            last_error: reason,
                        });
                    }
                },
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        api_key: &str,
        body: &Value,
        attempt: u32,
    ) -> AttemptOutcome {
        debug!("analysis attempt {}/{}", attempt, self.policy.max_attempts);

        let response = match self.transport.post_json(url, api_key, body).await {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::Retry(e.to_string()),
        };

        match response.status {
            200..=299 => match extract_text(&response.body) {
                Ok(text) => AttemptOutcome::Payload(text),
                Err(reason) => AttemptOutcome::Retry(reason),
            },
            401 | 403 => AttemptOutcome::Fatal(AnalysisError::Configuration(format!(
                "the API key was rejected (HTTP {}): {}",
                response.status,
                api_error_message(&response.body)
            ))),
            status => AttemptOutcome::Retry(format!(
                "HTTP {}: {}",
                status,
                api_error_message(&response.body)
            )),
        }
    }
}

/// Pulls the generated text out of a `generateContent` envelope.
fn extract_text(body: &str) -> Result<String, String> {
    let envelope: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| format!("unreadable response envelope: {}", e))?;

    let Some(candidate) = envelope.candidates.into_iter().next() else {
        let reason = envelope
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(format!("empty response ({})", reason));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(format!(
            "empty response (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ));
    }

    Ok(text)
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}
