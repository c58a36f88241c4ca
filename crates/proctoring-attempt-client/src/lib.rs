use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MIN_TIMEOUT_MS: u64 = 250;
const CSRF_HEADER: &str = "x-csrftoken";

#[derive(Debug, Clone, Default)]
pub struct AttemptClientConfig {
    /// Origin that relative action URLs resolve against.
    pub base_url: Option<String>,
    pub timeout_ms: u64,
    pub csrf_token: Option<String>,
}

impl AttemptClientConfig {
    #[must_use]
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            csrf_token: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttemptStatusClient {
    base_url: Option<String>,
    timeout: Duration,
    csrf_token: Option<String>,
    http: reqwest::Client,
}

#[derive(Debug, Error)]
pub enum AttemptClientError {
    #[error("attempt_client_invalid_url:{url}")]
    InvalidUrl { url: String },
    #[error("attempt_request_failed:{message}")]
    Request { message: String },
    #[error("attempt_read_failed:{message}")]
    Read { message: String },
    #[error("attempt_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("attempt_json_decode_failed:{message}")]
    Decode { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Submit,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Submit => "submit",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "submit" => Ok(Self::Submit),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AttemptStatusUpdateRequest {
    pub action: Action,
}

/// Learner's current attempt as reported by the exam status endpoint.
/// The endpoint answers `{}` when no attempt is in progress.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActiveExamAttempt {
    #[serde(default)]
    pub attempt_id: Option<u64>,
    #[serde(default)]
    pub attempt_status: Option<String>,
    #[serde(default)]
    pub in_timed_exam: bool,
    #[serde(default)]
    pub taking_as_proctored: bool,
    #[serde(default)]
    pub time_remaining_seconds: i64,
    #[serde(default)]
    pub exam_display_name: Option<String>,
    #[serde(default)]
    pub exam_url_path: Option<String>,
    #[serde(default)]
    pub accessibility_time_string: Option<String>,
}

impl ActiveExamAttempt {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.attempt_id.is_some() && self.in_timed_exam
    }
}

impl AttemptStatusClient {
    pub fn new(config: AttemptClientConfig) -> Result<Self, AttemptClientError> {
        let base_url = match config.base_url.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(normalize_base_url(raw)?),
            _ => None,
        };
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms.max(MIN_TIMEOUT_MS)),
            csrf_token: config
                .csrf_token
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            http: reqwest::Client::new(),
        })
    }

    /// Resolves an action URL: absolute URLs pass through, paths join the base URL.
    pub fn resolve_url(&self, url: &str) -> Result<String, AttemptClientError> {
        let trimmed = url.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Ok(trimmed.to_string());
        }
        match (&self.base_url, trimmed.strip_prefix('/')) {
            (Some(base_url), Some(path)) => Ok(format!("{base_url}/{path}")),
            _ => Err(AttemptClientError::InvalidUrl {
                url: url.to_string(),
            }),
        }
    }

    /// `PUT <action_url>` with `{"action": ...}`. The response body is ignored.
    pub async fn update_attempt_status(
        &self,
        action_url: &str,
        action: Action,
    ) -> Result<(), AttemptClientError> {
        let url = self.resolve_url(action_url)?;
        let request = self
            .with_headers(self.http.put(url.as_str()))
            .json(&AttemptStatusUpdateRequest { action });

        let response = request
            .send()
            .await
            .map_err(|error| AttemptClientError::Request {
                message: error.to_string(),
            })?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| AttemptClientError::Read {
                message: error.to_string(),
            })?;
        if !status.is_success() {
            return Err(format_http_error(status, &bytes));
        }

        tracing::info!(%action, url = %url, status = status.as_u16(), "attempt status updated");
        Ok(())
    }

    pub async fn fetch_active_attempt(
        &self,
        status_url: &str,
    ) -> Result<ActiveExamAttempt, AttemptClientError> {
        let url = self.resolve_url(status_url)?;
        let response = self
            .with_headers(self.http.get(url.as_str()))
            .send()
            .await
            .map_err(|error| AttemptClientError::Request {
                message: error.to_string(),
            })?;
        decode_json_response(response).await
    }

    fn with_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
            .timeout(self.timeout);
        match &self.csrf_token {
            Some(token) => request.header(CSRF_HEADER, token.as_str()),
            None => request,
        }
    }
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> AttemptClientError {
    let body = String::from_utf8_lossy(body).trim().to_string();
    let body = if body.is_empty() {
        "<empty>".to_string()
    } else {
        body
    };
    AttemptClientError::Http { status, body }
}

fn normalize_base_url(base_url: &str) -> Result<String, AttemptClientError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Err(AttemptClientError::InvalidUrl {
            url: base_url.to_string(),
        })
    }
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, AttemptClientError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|error| AttemptClientError::Read {
            message: error.to_string(),
        })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| AttemptClientError::Decode {
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode as AxumStatusCode},
        response::IntoResponse,
        routing::{get, put},
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use tokio::sync::{Mutex, oneshot};

    use super::*;

    #[derive(Clone)]
    struct StubState {
        fail: bool,
        calls: Arc<Mutex<Vec<(Value, Option<String>)>>>,
    }

    struct AttemptStub {
        base_url: String,
        calls: Arc<Mutex<Vec<(Value, Option<String>)>>>,
        shutdown: Option<oneshot::Sender<()>>,
    }

    impl AttemptStub {
        fn stop(mut self) {
            if let Some(shutdown) = self.shutdown.take() {
                let _ = shutdown.send(());
            }
        }
    }

    async fn spawn_attempt_stub(fail: bool) -> Result<AttemptStub> {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            fail,
            calls: calls.clone(),
        };
        let app = Router::new()
            .route("/api/edx_proctoring/v1/proctored_exam/attempt/7", put(update_attempt))
            .route("/api/edx_proctoring/v1/proctored_exam/attempt", get(active_attempt))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            let _ = server.await;
        });

        Ok(AttemptStub {
            base_url: format!("http://{addr}"),
            calls,
            shutdown: Some(shutdown_tx),
        })
    }

    async fn update_attempt(
        State(state): State<StubState>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        let csrf = headers
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        state.calls.lock().await.push((body, csrf));
        if state.fail {
            (AxumStatusCode::INTERNAL_SERVER_ERROR, "attempt update failed").into_response()
        } else {
            Json(json!({"exam_attempt_id": 7})).into_response()
        }
    }

    async fn active_attempt() -> impl IntoResponse {
        Json(json!({
            "attempt_id": 7,
            "attempt_status": "started",
            "in_timed_exam": true,
            "taking_as_proctored": true,
            "time_remaining_seconds": 1740,
            "exam_display_name": "Midterm",
            "exam_url_path": "/courses/course-v1:edX+DemoX+Demo/jump_to/block-v1:midterm",
            "low_threshold_sec": 360
        }))
    }

    fn client_for(base_url: &str, csrf_token: Option<&str>) -> Result<AttemptStatusClient> {
        let mut config = AttemptClientConfig::new(Some(base_url.to_string()));
        config.csrf_token = csrf_token.map(str::to_string);
        Ok(AttemptStatusClient::new(config)?)
    }

    #[test]
    fn resolve_url_joins_paths_and_keeps_absolute_urls() -> Result<()> {
        let client = client_for("https://lms.example.com/", None)?;
        assert_eq!(
            client.resolve_url("/api/edx_proctoring/v1/proctored_exam/attempt/7")?,
            "https://lms.example.com/api/edx_proctoring/v1/proctored_exam/attempt/7"
        );
        assert_eq!(
            client.resolve_url("https://other.example.com/attempt/1")?,
            "https://other.example.com/attempt/1"
        );
        assert!(matches!(
            client.resolve_url("attempt/7"),
            Err(AttemptClientError::InvalidUrl { .. })
        ));

        let no_base = AttemptStatusClient::new(AttemptClientConfig::new(None))?;
        assert!(matches!(
            no_base.resolve_url("/attempt/7"),
            Err(AttemptClientError::InvalidUrl { .. })
        ));
        Ok(())
    }

    #[test]
    fn base_url_without_scheme_is_rejected() {
        let result = AttemptStatusClient::new(AttemptClientConfig::new(Some(
            "lms.example.com".to_string(),
        )));
        assert!(matches!(result, Err(AttemptClientError::InvalidUrl { .. })));
    }

    #[test]
    fn http_error_mapping_preserves_shape() {
        let error = format_http_error(StatusCode::INTERNAL_SERVER_ERROR, b" boom ");
        assert_eq!(
            error.to_string(),
            "attempt_http_500 Internal Server Error:boom"
        );
        let empty = format_http_error(StatusCode::BAD_GATEWAY, b"");
        assert_eq!(empty.to_string(), "attempt_http_502 Bad Gateway:<empty>");
    }

    #[test]
    fn action_parses_wire_names() {
        assert_eq!("start".parse::<Action>(), Ok(Action::Start));
        assert_eq!(" SUBMIT ".parse::<Action>(), Ok(Action::Submit));
        assert_eq!("decline".parse::<Action>(), Err("decline".to_string()));
    }

    #[tokio::test]
    async fn update_sends_action_body_and_csrf_header() -> Result<()> {
        let stub = spawn_attempt_stub(false).await?;
        let client = client_for(&stub.base_url, Some("csrf-abc"))?;

        client
            .update_attempt_status("/api/edx_proctoring/v1/proctored_exam/attempt/7", Action::Submit)
            .await?;

        let calls = stub.calls.lock().await.clone();
        assert_eq!(
            calls,
            vec![(json!({"action": "submit"}), Some("csrf-abc".to_string()))]
        );
        stub.stop();
        Ok(())
    }

    #[tokio::test]
    async fn server_error_maps_to_http_error() -> Result<()> {
        let stub = spawn_attempt_stub(true).await?;
        let client = client_for(&stub.base_url, None)?;

        let result = client
            .update_attempt_status("/api/edx_proctoring/v1/proctored_exam/attempt/7", Action::Start)
            .await;

        match result {
            Err(AttemptClientError::Http { status, body }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "attempt update failed");
            }
            other => return Err(anyhow::anyhow!("unexpected result: {other:?}")),
        }
        stub.stop();
        Ok(())
    }

    #[tokio::test]
    async fn active_attempt_decodes_status_payload() -> Result<()> {
        let stub = spawn_attempt_stub(false).await?;
        let client = client_for(&stub.base_url, None)?;

        let attempt = client
            .fetch_active_attempt("/api/edx_proctoring/v1/proctored_exam/attempt")
            .await?;

        assert!(attempt.is_active());
        assert!(attempt.taking_as_proctored);
        assert_eq!(attempt.time_remaining_seconds, 1740);
        assert_eq!(attempt.exam_display_name.as_deref(), Some("Midterm"));
        stub.stop();
        Ok(())
    }

    #[test]
    fn empty_status_payload_means_no_attempt() -> Result<()> {
        let attempt: ActiveExamAttempt = serde_json::from_value(json!({}))?;
        assert_eq!(attempt, ActiveExamAttempt::default());
        assert!(!attempt.is_active());
        Ok(())
    }
}
