//! Pipeline stages for one source document.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ convert ──▶ front_matter ──▶ upload
//! (bytes,    (Docling)    (metadata        (text/markdown
//!  sha256)                 header)          object)
//! ```
//!
//! 1. [`fetch`]   — download the object and compute its SHA-256
//! 2. [`convert`] — hand the PDF to Docling through a [`convert::DocumentConverter`]
//! 3. [`front_matter`] — assemble and render the metadata header
//! 4. [`upload`]  — put the Markdown next to its siblings in the output bucket
//!
//! [`convert_document`] runs stages 2–3 on bytes already in memory, so the
//! S3 handler and the local `convert` command share them.

pub mod convert;
pub mod fetch;
pub mod front_matter;
pub mod upload;

use crate::config::PipelineConfig;
use crate::error::OcrLambdaError;
use chrono::Utc;
use convert::{ConvertRequest, DocumentConverter};
use fetch::FetchedObject;
use front_matter::{FrontMatter, UNKNOWN_DOCLING_VERSION};
use std::path::Path;
use tracing::{info, warn};

/// Where a document came from and where its Markdown goes.
#[derive(Debug, Clone)]
pub struct DocumentTarget {
    pub source_uri: String,
    pub output_uri: String,
    /// Used as `title` when Docling finds none (the source file name).
    pub fallback_title: String,
}

/// A converted document ready for upload.
#[derive(Debug, Clone)]
pub struct MarkdownDocument {
    pub front_matter: FrontMatter,
    pub body: String,
}

impl MarkdownDocument {
    /// Header followed by body.
    pub fn render(&self) -> String {
        self.front_matter.prepend_to(&self.body)
    }
}

/// Write `object` into `work_dir`, convert it and build its front matter.
pub async fn convert_document(
    converter: &dyn DocumentConverter,
    config: &PipelineConfig,
    work_dir: &Path,
    object: &FetchedObject,
    target: &DocumentTarget,
) -> Result<MarkdownDocument, OcrLambdaError> {
    tokio::fs::create_dir_all(work_dir)
        .await
        .map_err(|e| OcrLambdaError::io("creating work directory", work_dir, e))?;
    let pdf_path = work_dir.join("input.pdf");
    tokio::fs::write(&pdf_path, &object.bytes)
        .await
        .map_err(|e| OcrLambdaError::io("writing", &pdf_path, e))?;

    let do_ocr = config.ocr_mode.should_ocr();
    let request = ConvertRequest {
        pdf_path,
        work_dir: work_dir.to_path_buf(),
        do_ocr,
        ocr_models: bundled_models(config),
        image_placeholders: config.image_placeholders,
    };

    info!(
        "Converting {} with docling/{} (ocr={})",
        target.source_uri,
        converter.name(),
        config.ocr_mode
    );
    let converted = converter.convert(&request).await?;

    let front_matter = FrontMatter {
        title: converted
            .title
            .unwrap_or_else(|| target.fallback_title.clone()),
        source_s3: target.source_uri.clone(),
        output_s3_md: target.output_uri.clone(),
        sha256: object.sha256.clone(),
        pages: converted.page_count,
        converted_at: Utc::now(),
        docling_version: converted
            .engine_version
            .unwrap_or_else(|| UNKNOWN_DOCLING_VERSION.to_string()),
        ocr: do_ocr,
    };

    Ok(MarkdownDocument {
        front_matter,
        body: converted.markdown,
    })
}

/// RapidOCR model paths, or `None` when the bundle is incomplete.
fn bundled_models(config: &PipelineConfig) -> Option<crate::config::OcrModelPaths> {
    let models = config.ocr_models();
    let missing = models.missing();
    if missing.is_empty() {
        Some(models)
    } else {
        warn!(
            "RapidOCR models missing ({:?}); falling back to the models packaged with rapidocr",
            missing
        );
        None
    }
}

/// Last path segment of an object key or file path.
pub fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrMode;
    use async_trait::async_trait;
    use convert::ConvertedDocument;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Option<ConvertRequest>>);

    #[async_trait]
    impl DocumentConverter for Capture {
        fn name(&self) -> &str {
            "capture"
        }

        async fn convert(&self, request: &ConvertRequest) -> Result<ConvertedDocument, OcrLambdaError> {
            *self.0.lock().unwrap() = Some(request.clone());
            Ok(ConvertedDocument {
                markdown: "body\n".into(),
                page_count: 1,
                ..Default::default()
            })
        }
    }

    fn target() -> DocumentTarget {
        DocumentTarget {
            source_uri: "s3://in/a.pdf".into(),
            output_uri: "s3://out/a.md".into(),
            fallback_title: "a.pdf".into(),
        }
    }

    #[tokio::test]
    async fn incomplete_bundle_still_requests_ocr() {
        let scratch = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .ocr_mode(OcrMode::Always)
            .ocr_models_dir(scratch.path().join("no-models"))
            .build()
            .unwrap();
        let converter = Capture::default();
        let object = FetchedObject::new(b"%PDF-1.7".to_vec());

        let doc = convert_document(&converter, &config, &scratch.path().join("w"), &object, &target())
            .await
            .unwrap();

        let request = converter.0.lock().unwrap().clone().unwrap();
        assert!(request.do_ocr);
        assert!(request.ocr_models.is_none());
        assert!(doc.front_matter.ocr);
        assert_eq!(doc.front_matter.docling_version, UNKNOWN_DOCLING_VERSION);
    }

    #[tokio::test]
    async fn complete_bundle_is_passed_by_path() {
        let scratch = tempfile::tempdir().unwrap();
        let models_dir = scratch.path().join("models");
        let models = crate::config::OcrModelPaths::in_dir(&models_dir);
        for file in [&models.det, &models.rec, &models.cls] {
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, b"onnx").unwrap();
        }
        let config = PipelineConfig::builder()
            .ocr_models_dir(&models_dir)
            .build()
            .unwrap();
        let converter = Capture::default();
        let object = FetchedObject::new(b"%PDF-1.7".to_vec());

        convert_document(&converter, &config, &scratch.path().join("w"), &object, &target())
            .await
            .unwrap();

        let request = converter.0.lock().unwrap().clone().unwrap();
        assert_eq!(request.ocr_models, Some(models));
    }

    #[test]
    fn base_name_of_keys() {
        assert_eq!(base_name("a/b/c.pdf"), "c.pdf");
        assert_eq!(base_name("c.pdf"), "c.pdf");
        assert_eq!(base_name("dir/"), "");
    }
}
