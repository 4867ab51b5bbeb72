// Submission of captured pose sequences to the remote scoring endpoint

use crate::core::config::TrackerConfig;
use crate::core::session_store::SessionStore;
use crate::models::scoring::{ScoreRequest, ScoringError, ScoringResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sends one captured attempt for scoring. `Ok(None)` means the backend
/// answered successfully but without a usable score.
#[async_trait]
pub trait ScoreSubmitter: Send + Sync {
    async fn submit(&self, request: &ScoreRequest) -> ScoringResult<Option<f32>>;
}

pub struct HttpScoringClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
    session_store: Option<SessionStore>,
}

impl HttpScoringClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> ScoringResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScoringError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
            session_store: None,
        })
    }

    pub fn from_config(config: &TrackerConfig) -> ScoringResult<Self> {
        Ok(Self::new(config.backend_url.clone(), config.request_timeout())?
            .with_session_store(SessionStore::new(config.session_store_path.clone())))
    }

    /// Attach `Authorization: Bearer` from this store when it holds a token
    pub fn with_session_store(mut self, store: SessionStore) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn describe_transport_error(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            format!("Scoring request timed out after {}s", self.timeout.as_secs_f32())
        } else {
            err.to_string()
        }
    }
}

#[async_trait]
impl ScoreSubmitter for HttpScoringClient {
    async fn submit(&self, request: &ScoreRequest) -> ScoringResult<Option<f32>> {
        let mut builder = self.client.post(&self.endpoint).json(request);

        let token = self.session_store.as_ref().and_then(|s| s.access_token());
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        } else {
            debug!("No stored access token; submitting without credentials");
        }

        info!(
            "Submitting {} frames for task {} to {}",
            request.user_pose_sequence.len(),
            request.task_id,
            self.endpoint
        );

        let response = builder.send().await.map_err(|e| {
            warn!("Scoring request failed: {}", e);
            ScoringError::Network(self.describe_transport_error(&e))
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ScoringError::Network(self.describe_transport_error(&e)))?;

        interpret_response(status, &body)
    }
}

/// Map a scoring response to a score or a user-facing failure
pub fn interpret_response(status: u16, body: &[u8]) -> ScoringResult<Option<f32>> {
    let parsed: Result<Value, _> = serde_json::from_slice(body);

    if (200..300).contains(&status) {
        let value = parsed.map_err(|e| ScoringError::MalformedResponse(e.to_string()))?;
        let score = extract_score(&value);

        // Success without a numeric score means no score, never an error
        if score.is_none() {
            warn!("Scoring response had no usable score: {}", value);
        }
        return Ok(score);
    }

    let message = match parsed {
        Ok(value) => error_field(&value).unwrap_or_else(|| value.to_string()),
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                format!("HTTP {}", status)
            } else {
                text
            }
        }
    };

    Err(ScoringError::Rejected { status, message })
}

fn extract_score(value: &Value) -> Option<f32> {
    value
        .get("score")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite() && (0.0..=1.0).contains(s))
        .map(|s| s as f32)
}

fn error_field(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}
