//! Minimal AWS Lambda custom-runtime client.
//!
//! The function runs as a `provided.al2023` custom runtime: the binary polls
//! the Runtime API for the next event, hands it to the [`Handler`] and posts
//! back either the response or an error document.
//!
//! ```text
//! GET  /2018-06-01/runtime/invocation/next          → event + request id
//! POST /2018-06-01/runtime/invocation/{id}/response ← {"status":"ok"}
//! POST /2018-06-01/runtime/invocation/{id}/error    ← {errorMessage, errorType}
//! POST /2018-06-01/runtime/init/error               ← startup failure
//! ```

use crate::error::OcrLambdaError;
use crate::handler::Handler;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

/// Runtime API version segment.
pub const RUNTIME_API_VERSION: &str = "2018-06-01";

const HEADER_REQUEST_ID: &str = "Lambda-Runtime-Aws-Request-Id";
const HEADER_DEADLINE_MS: &str = "Lambda-Runtime-Deadline-Ms";
const HEADER_TRACE_ID: &str = "Lambda-Runtime-Trace-Id";
const HEADER_ERROR_TYPE: &str = "Lambda-Runtime-Function-Error-Type";

/// One event pulled from the Runtime API.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub request_id: String,
    /// Epoch milliseconds after which Lambda kills the function.
    pub deadline_ms: Option<u64>,
    pub trace_id: Option<String>,
    pub payload: Vec<u8>,
}

impl Invocation {
    /// Time left before the deadline at `now_ms` (epoch milliseconds).
    pub fn remaining_at(&self, now_ms: i64) -> Option<Duration> {
        let deadline = i64::try_from(self.deadline_ms?).ok()?;
        Some(Duration::from_millis(deadline.saturating_sub(now_ms).max(0) as u64))
    }

    /// Time left before Lambda stops the function.
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining_at(Utc::now().timestamp_millis())
    }
}

/// Error document understood by the Runtime API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error_message: String,
    pub error_type: String,
}

impl From<&OcrLambdaError> for ErrorReport {
    fn from(e: &OcrLambdaError) -> Self {
        Self {
            error_message: e.to_string(),
            error_type: e.kind().to_string(),
        }
    }
}

/// HTTP client for the Lambda Runtime API.
#[derive(Debug, Clone)]
pub struct RuntimeClient {
    http: reqwest::Client,
    base: String,
}

impl RuntimeClient {
    /// `endpoint` is `host:port` as found in `AWS_LAMBDA_RUNTIME_API`, or a
    /// full `http://` URL.
    pub fn new(endpoint: &str) -> Self {
        let endpoint = endpoint.trim_end_matches('/');
        let base = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            format!("{endpoint}/{RUNTIME_API_VERSION}")
        } else {
            format!("http://{endpoint}/{RUNTIME_API_VERSION}")
        };
        // No request timeout: `next` is a long poll that blocks until an event arrives.
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    /// Client for the endpoint in `AWS_LAMBDA_RUNTIME_API`.
    pub fn from_env() -> Result<Self, OcrLambdaError> {
        match std::env::var("AWS_LAMBDA_RUNTIME_API") {
            Ok(v) if !v.trim().is_empty() => Ok(Self::new(v.trim())),
            _ => Err(OcrLambdaError::MissingEnv {
                var: "AWS_LAMBDA_RUNTIME_API",
                hint: "The runtime loop only works inside Lambda; use `ocr-lambda invoke` locally.",
            }),
        }
    }

    /// Block until Lambda delivers the next event.
    pub async fn next_invocation(&self) -> Result<Invocation, OcrLambdaError> {
        let url = format!("{}/runtime/invocation/next", self.base);
        let response = self.http.get(&url).send().await.map_err(api_err)?;
        if !response.status().is_success() {
            return Err(OcrLambdaError::RuntimeApi(format!(
                "GET {url} returned HTTP {}",
                response.status()
            )));
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let request_id = header(HEADER_REQUEST_ID).ok_or_else(|| {
            OcrLambdaError::RuntimeApi(format!("missing {HEADER_REQUEST_ID} header"))
        })?;
        let deadline_ms = header(HEADER_DEADLINE_MS).and_then(|v| v.parse().ok());
        let trace_id = header(HEADER_TRACE_ID);

        let payload = response.bytes().await.map_err(api_err)?.to_vec();
        Ok(Invocation {
            request_id,
            deadline_ms,
            trace_id,
            payload,
        })
    }

    /// Report a successful invocation.
    pub async fn send_response<T: Serialize + ?Sized>(
        &self,
        request_id: &str,
        body: &T,
    ) -> Result<(), OcrLambdaError> {
        let url = format!("{}/runtime/invocation/{request_id}/response", self.base);
        self.post(&url, body, None).await
    }

    /// Report a failed invocation.
    pub async fn send_error(&self, request_id: &str, report: &ErrorReport) -> Result<(), OcrLambdaError> {
        let url = format!("{}/runtime/invocation/{request_id}/error", self.base);
        self.post(&url, report, Some(report.error_type.as_str())).await
    }

    /// Report a failure before the first invocation (bad configuration).
    pub async fn send_init_error(&self, report: &ErrorReport) -> Result<(), OcrLambdaError> {
        let url = format!("{}/runtime/init/error", self.base);
        self.post(&url, report, Some(report.error_type.as_str())).await
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        error_type: Option<&str>,
    ) -> Result<(), OcrLambdaError> {
        let mut request = self.http.post(url).json(body);
        if let Some(kind) = error_type {
            request = request.header(HEADER_ERROR_TYPE, format!("Runtime.{kind}"));
        }
        let response = request.send().await.map_err(api_err)?;
        if !response.status().is_success() {
            return Err(OcrLambdaError::RuntimeApi(format!(
                "POST {url} returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

fn api_err(e: reqwest::Error) -> OcrLambdaError {
    OcrLambdaError::RuntimeApi(e.to_string())
}

/// Fetch one event, handle it and report the outcome.
///
/// Handler failures are reported to Lambda and are not an error here;
/// only Runtime API failures are.
pub async fn serve_one(client: &RuntimeClient, handler: &Handler) -> Result<(), OcrLambdaError> {
    let invocation = client.next_invocation().await?;

    // X-Ray trace id goes on the span, not into the process environment.
    let span = info_span!(
        "invocation",
        request_id = %invocation.request_id,
        trace_id = invocation.trace_id.as_deref().unwrap_or("-")
    );
    async {
        match invocation.remaining() {
            Some(left) if left.as_millis() < 1000 => {
                warn!("Invocation starts with {}ms left before the deadline", left.as_millis())
            }
            Some(left) => info!("Invocation started, {}s before the deadline", left.as_secs()),
            None => info!("Invocation started"),
        }
        match handler.handle_payload(&invocation.payload).await {
            Ok(response) => {
                info!("Invocation succeeded");
                client.send_response(&invocation.request_id, &response).await
            }
            Err(e) => {
                error!("Invocation failed: {}", e);
                client
                    .send_error(&invocation.request_id, &ErrorReport::from(&e))
                    .await
            }
        }
    }
    .instrument(span)
    .await
}

/// Serve invocations until the Runtime API becomes unreachable.
pub async fn run(client: &RuntimeClient, handler: &Handler) -> Result<(), OcrLambdaError> {
    info!("Lambda runtime loop started ({})", client.base);
    loop {
        serve_one(client, handler).await?;
    }
}
