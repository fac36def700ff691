//! Invocation entry point: S3 notification in, Markdown objects out.
//!
//! Records are handled one after another. Non-PDF keys are skipped before
//! any I/O. Every record shares one scratch directory for the invocation
//! (one sub-directory per record), removed when [`Handler::handle`] returns.
//! The first failure aborts the invocation; records already uploaded stay.

use crate::config::PipelineConfig;
use crate::error::OcrLambdaError;
use crate::event::{is_pdf_key, markdown_key, s3_uri, S3Event};
use crate::pipeline::convert::{self, DocumentConverter};
use crate::pipeline::{base_name, convert_document, fetch, upload, DocumentTarget};
use crate::storage::{BucketResolver, S3Buckets};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info};

/// The acknowledgment returned to the invoker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerResponse {
    pub status: String,
}

impl HandlerResponse {
    /// `{"status": "ok"}`
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// One object written during an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedObject {
    pub source: String,
    pub output: String,
    pub sha256: String,
    pub pages: usize,
    pub ocr: bool,
}

/// What an invocation did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationReport {
    pub processed: Vec<ProcessedObject>,
    /// Source URIs ignored because they are not PDFs.
    pub skipped: Vec<String>,
}

/// Converts the PDFs named by S3 notifications.
pub struct Handler {
    config: PipelineConfig,
    output_bucket: String,
    buckets: Arc<dyn BucketResolver>,
    converter: Arc<dyn DocumentConverter>,
}

impl Handler {
    /// Assemble a handler from explicit parts.
    ///
    /// # Errors
    /// [`OcrLambdaError::MissingEnv`] when `config.output_bucket` is unset.
    pub fn new(
        config: PipelineConfig,
        buckets: Arc<dyn BucketResolver>,
        converter: Arc<dyn DocumentConverter>,
    ) -> Result<Self, OcrLambdaError> {
        let output_bucket = config
            .output_bucket
            .clone()
            .ok_or(OcrLambdaError::MissingEnv {
                var: "OUT_BUCKET",
                hint: "Set it to the bucket that receives the Markdown files.",
            })?;
        Ok(Self {
            config,
            output_bucket,
            buckets,
            converter,
        })
    }

    /// Production wiring: S3 buckets and the configured Docling backend.
    pub fn from_config(config: PipelineConfig) -> Result<Self, OcrLambdaError> {
        let converter = convert::from_config(&config)?;
        Self::new(config, Arc::new(S3Buckets::new()), converter)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parse a raw payload, handle it and return the acknowledgment.
    pub async fn handle_payload(&self, payload: &[u8]) -> Result<HandlerResponse, OcrLambdaError> {
        let event = S3Event::from_slice(payload)?;
        self.handle(&event).await?;
        Ok(HandlerResponse::ok())
    }

    /// Process every record of `event` in order.
    pub async fn handle(&self, event: &S3Event) -> Result<InvocationReport, OcrLambdaError> {
        let start = Instant::now();
        let scratch = TempDir::new()
            .map_err(|e| OcrLambdaError::io("creating", std::env::temp_dir(), e))?;
        let mut report = InvocationReport::default();

        for (idx, record) in event.records.iter().enumerate() {
            let bucket = record.bucket();
            let key = record.key();
            if !is_pdf_key(&key) {
                debug!("Skipping non-PDF object {}", s3_uri(bucket, &key));
                report.skipped.push(s3_uri(bucket, &key));
                continue;
            }
            let work_dir = scratch.path().join(format!("record-{idx}"));
            let processed = self.process_object(bucket, &key, &work_dir).await?;
            report.processed.push(processed);
        }

        info!(
            "Invocation done: {} converted, {} skipped in {}ms",
            report.processed.len(),
            report.skipped.len(),
            start.elapsed().as_millis()
        );
        Ok(report)
    }

    async fn process_object(
        &self,
        bucket: &str,
        key: &str,
        work_dir: &Path,
    ) -> Result<ProcessedObject, OcrLambdaError> {
        let source_uri = s3_uri(bucket, key);
        let out_key = markdown_key(key);
        let output_uri = s3_uri(&self.output_bucket, &out_key);
        info!("Processing {} → {}", source_uri, output_uri);

        let source = self.buckets.bucket(bucket)?;
        let object = fetch::download(source.as_ref(), key, &source_uri).await?;

        let target = DocumentTarget {
            source_uri: source_uri.clone(),
            output_uri: output_uri.clone(),
            fallback_title: base_name(key).to_string(),
        };
        let doc = convert_document(
            self.converter.as_ref(),
            &self.config,
            work_dir,
            &object,
            &target,
        )
        .await?;

        let output = self.buckets.bucket(&self.output_bucket)?;
        upload::put_markdown(
            output.as_ref(),
            &out_key,
            &output_uri,
            doc.render(),
            self.buckets.supports_content_type(),
        )
        .await?;

        Ok(ProcessedObject {
            source: source_uri,
            output: output_uri,
            sha256: object.sha256,
            pages: doc.front_matter.pages,
            ocr: doc.front_matter.ocr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBuckets;
    use async_trait::async_trait;
    use crate::pipeline::convert::{ConvertRequest, ConvertedDocument};

    struct Unreachable;

    #[async_trait]
    impl DocumentConverter for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }

        async fn convert(&self, _: &ConvertRequest) -> Result<ConvertedDocument, OcrLambdaError> {
            Err(OcrLambdaError::Internal("converter must not be called".into()))
        }
    }

    #[test]
    fn requires_output_bucket() {
        let err = Handler::new(
            PipelineConfig::default(),
            Arc::new(MemoryBuckets::new()),
            Arc::new(Unreachable),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), "MissingEnv");
    }

    #[test]
    fn response_is_fixed_ack() {
        let json = serde_json::to_string(&HandlerResponse::ok()).unwrap();
        assert_eq!(json, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn non_pdf_batch_touches_nothing() {
        let config = PipelineConfig::builder().output_bucket("out").build().unwrap();
        let handler =
            Handler::new(config, Arc::new(MemoryBuckets::new()), Arc::new(Unreachable)).unwrap();
        let event = S3Event {
            records: vec![
                crate::event::S3EventRecord::new("in", "notes.txt"),
                crate::event::S3EventRecord::new("in", "image.png"),
            ],
        };
        let report = handler.handle(&event).await.unwrap();
        assert!(report.processed.is_empty());
        assert_eq!(report.skipped, vec!["s3://in/notes.txt", "s3://in/image.png"]);
    }
}
