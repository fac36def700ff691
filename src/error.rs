//! Error types for the edgequake-ocr-lambda library.
//!
//! A single fatal error type, [`OcrLambdaError`], covers every way an
//! invocation can fail. There is no partial-success path: a record that cannot
//! be downloaded, converted or uploaded aborts the whole invocation and the
//! error is reported back to the Lambda runtime, which owns retry policy for
//! asynchronous S3 notifications.
//!
//! Records whose key is not a PDF are *not* errors; they are skipped before
//! any I/O happens.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-ocr-lambda library.
#[derive(Debug, Error)]
pub enum OcrLambdaError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// A required environment variable is unset or empty.
    #[error("Environment variable {var} is not set\n{hint}")]
    MissingEnv { var: &'static str, hint: &'static str },

    /// `ENABLE_OCR` holds something other than auto / always / never.
    #[error("Invalid OCR mode '{value}': expected one of auto, always, never")]
    InvalidOcrMode { value: String },

    /// `DOCLING_BACKEND` holds an unknown backend name.
    #[error("Invalid converter backend '{value}': expected python or serve")]
    InvalidBackend { value: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Event errors ──────────────────────────────────────────────────────
    /// The invocation payload is not an S3 notification.
    #[error("Invalid S3 event payload: {0}")]
    InvalidEvent(#[source] serde_json::Error),

    // ── Storage errors ────────────────────────────────────────────────────
    /// A store handle for the bucket could not be created.
    #[error("Cannot open bucket '{bucket}': {detail}")]
    BucketUnavailable { bucket: String, detail: String },

    /// The object key cannot be addressed through the store without being
    /// rewritten (empty segments, a leading or trailing `/`, `.` or `..`
    /// segments, control characters).
    #[error("Unsupported object key '{key}': {detail}")]
    UnsupportedKey { key: String, detail: String },

    /// Reading the source object failed.
    #[error("Failed to download '{uri}': {source}")]
    DownloadFailed {
        uri: String,
        #[source]
        source: object_store::Error,
    },

    /// Writing the Markdown object failed.
    #[error("Failed to upload '{uri}': {source}")]
    UploadFailed {
        uri: String,
        #[source]
        source: object_store::Error,
    },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The converter backend could not be started or reached.
    #[error("Docling backend '{backend}' is unavailable: {detail}\nCheck DOCLING_PYTHON / DOCLING_SERVE_URL.")]
    ConverterUnavailable { backend: String, detail: String },

    /// Docling ran but reported a failure for this document.
    #[error("Conversion failed for '{path}': {detail}")]
    ConversionFailed { path: PathBuf, detail: String },

    /// Docling did not finish within the configured timeout.
    #[error("Conversion of '{path}' timed out after {secs}s\nIncrease DOCLING_TIMEOUT_SECS.")]
    ConversionTimeout { path: PathBuf, secs: u64 },

    // ── Runtime API errors ────────────────────────────────────────────────
    /// The Lambda Runtime API rejected a request or was unreachable.
    #[error("Lambda Runtime API error: {0}")]
    RuntimeApi(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Local scratch-space I/O failed.
    #[error("I/O error while {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrLambdaError {
    /// Short, stable name of the variant.
    ///
    /// Reported as `errorType` to the Lambda Runtime API so failures can be
    /// grouped in CloudWatch without parsing messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingEnv { .. } => "MissingEnv",
            Self::InvalidOcrMode { .. } => "InvalidOcrMode",
            Self::InvalidBackend { .. } => "InvalidBackend",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::InvalidEvent(_) => "InvalidEvent",
            Self::BucketUnavailable { .. } => "BucketUnavailable",
            Self::UnsupportedKey { .. } => "UnsupportedKey",
            Self::DownloadFailed { .. } => "DownloadFailed",
            Self::UploadFailed { .. } => "UploadFailed",
            Self::ConverterUnavailable { .. } => "ConverterUnavailable",
            Self::ConversionFailed { .. } => "ConversionFailed",
            Self::ConversionTimeout { .. } => "ConversionTimeout",
            Self::RuntimeApi(_) => "RuntimeApi",
            Self::Io { .. } => "Io",
            Self::Internal(_) => "Internal",
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
