//! # edgequake-ocr-lambda
//!
//! Convert PDFs uploaded to S3 into Markdown with [Docling], as an AWS Lambda
//! function, a CLI, or a library.
//!
//! An S3 `ObjectCreated` notification names one or more objects. Every key
//! ending in `.pdf` (any case) is downloaded, converted by Docling with
//! optional RapidOCR, and written to the output bucket under the same key
//! with a `.md` extension, prefixed by a front-matter block:
//!
//! ```text
//! ---
//! title: Attention Is All You Need
//! source_s3: s3://incoming/papers/attention.pdf
//! output_s3_md: s3://converted/papers/attention.md
//! sha256: 4b0e…
//! pages: 15
//! converted_at: 2024-05-01T09:30:00.123456Z
//! docling_version: 2.31.0
//! ocr: true
//! ---
//! ```
//!
//! ## Pipeline Overview
//!
//! ```text
//! S3 event
//!  │
//!  ├─ 1. Event    decode records, drop non-PDF keys
//!  ├─ 2. Fetch    download bytes, SHA-256
//!  ├─ 3. Convert  Docling (python bridge or docling-serve)
//!  ├─ 4. Header   front matter: source, output, hash, pages, ocr
//!  └─ 5. Upload   text/markdown; charset=utf-8
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr_lambda::{Handler, PipelineConfig, S3Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OUT_BUCKET, ENABLE_OCR, OCR_MODELS_DIR, DOCLING_* from the environment
//!     let handler = Handler::from_config(PipelineConfig::from_env()?)?;
//!     let report = handler.handle(&S3Event::single("incoming", "papers/attention.pdf")).await?;
//!     eprintln!("converted {} objects", report.processed.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-lambda` binary (clap + anyhow + tracing-subscriber) |
//!
//! [Docling]: https://github.com/docling-project/docling

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod pipeline;
pub mod runtime;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConverterBackend, OcrMode, OcrModelPaths, PipelineConfig, PipelineConfigBuilder};
pub use error::OcrLambdaError;
pub use event::{is_pdf_key, markdown_key, S3Event, S3EventRecord};
pub use handler::{Handler, HandlerResponse, InvocationReport, ProcessedObject};
pub use pipeline::convert::{
    ConvertRequest, ConvertedDocument, DocumentConverter, DoclingPython, DoclingServe,
};
pub use pipeline::front_matter::FrontMatter;
pub use storage::{BucketResolver, LocalBuckets, MemoryBuckets, S3Buckets};
