//! S3 object-created notifications.
//!
//! Only the fields the pipeline reads are modelled; everything else in the
//! notification (`eventName`, `awsRegion`, `eTag`, …) is ignored by serde.
//! Object keys arrive form-url-encoded (`my+report%281%29.pdf`), so
//! [`S3EventRecord::key`] decodes them before use.

use crate::error::OcrLambdaError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// A batch of S3 notification records, as delivered to the function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Event {
    /// Missing `Records` means an empty batch, e.g. the `s3:TestEvent`
    /// sent when a notification is first configured.
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

impl S3Event {
    /// Parse a raw invocation payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, OcrLambdaError> {
        serde_json::from_slice(payload).map_err(OcrLambdaError::InvalidEvent)
    }

    /// Build an event for a single object.
    pub fn single(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            records: vec![S3EventRecord::new(bucket, key)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3EventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Object {
    /// Key exactly as sent by S3 (form-url-encoded).
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl S3EventRecord {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            event_name: Some("ObjectCreated:Put".to_string()),
            s3: S3Entity {
                bucket: S3Bucket {
                    name: bucket.into(),
                },
                object: S3Object {
                    key: key.into(),
                    size: None,
                },
            },
        }
    }

    pub fn bucket(&self) -> &str {
        &self.s3.bucket.name
    }

    /// Decoded object key.
    ///
    /// Falls back to the raw key when the encoding is not valid UTF-8.
    pub fn key(&self) -> Cow<'_, str> {
        decode_key(&self.s3.object.key)
    }
}

/// Decode an S3 notification key (`+` is a space, `%XX` an escaped byte).
pub fn decode_key(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['+', '%']) {
        return Cow::Borrowed(raw);
    }
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => Cow::Owned(decoded.into_owned()),
        Err(_) => Cow::Borrowed(raw),
    }
}

static RE_PDF_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.pdf$").unwrap());

/// Whether the pipeline handles this key: `.pdf`, any case.
pub fn is_pdf_key(key: &str) -> bool {
    RE_PDF_SUFFIX.is_match(key)
}

/// Key of the Markdown object written for `key`.
///
/// Only a trailing `.pdf` is rewritten: `reports/pdf/a.PDF` becomes
/// `reports/pdf/a.md`.
pub fn markdown_key(key: &str) -> String {
    format!("{}.md", RE_PDF_SUFFIX.replace(key, ""))
}

/// `s3://bucket/key` URI used in logs and front matter.
pub fn s3_uri(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{key}")
}
