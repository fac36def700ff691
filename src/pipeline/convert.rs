//! The Docling seam: turn a PDF on disk into Markdown.
//!
//! Layout analysis, text extraction and OCR all happen inside Docling. This
//! module only decides *how Docling is reached*:
//!
//! * [`DoclingPython`] runs the bridge script in `assets/docling_bridge.py`
//!   under a Python interpreter that has `docling` installed. This is what
//!   the Lambda container image uses; the RapidOCR models are passed by path.
//! * [`DoclingServe`] posts the PDF to a docling-serve instance. Useful when
//!   Docling runs as a sidecar or shared service; OCR models are whatever
//!   the server ships.
//!
//! Both return the same [`ConvertedDocument`]. Errors are never retried here.

use crate::config::{ConverterBackend, OcrModelPaths, PipelineConfig};
use crate::error::OcrLambdaError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Python source of the bridge, embedded at compile time.
pub const BRIDGE_SCRIPT: &str = include_str!("../../assets/docling_bridge.py");

/// One conversion job.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    /// PDF on local disk.
    pub pdf_path: PathBuf,
    /// Scratch directory owned by this job.
    pub work_dir: PathBuf,
    pub do_ocr: bool,
    /// Bundled RapidOCR models; `None` keeps RapidOCR on the models shipped
    /// with its Python package.
    pub ocr_models: Option<OcrModelPaths>,
    pub image_placeholders: bool,
}

/// What Docling produced for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedDocument {
    pub markdown: String,
    /// Text of the first item Docling labelled `title`, if any.
    pub title: Option<String>,
    pub page_count: usize,
    /// Installed Docling version, when the backend can tell.
    pub engine_version: Option<String>,
}

/// Anything that can convert a PDF file into Markdown.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    async fn convert(&self, request: &ConvertRequest) -> Result<ConvertedDocument, OcrLambdaError>;
}

/// Build the converter selected by `config.backend`.
pub fn from_config(config: &PipelineConfig) -> Result<Arc<dyn DocumentConverter>, OcrLambdaError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    Ok(match config.backend {
        ConverterBackend::Python => Arc::new(DoclingPython::new(&config.python, timeout)),
        ConverterBackend::Serve => Arc::new(DoclingServe::new(&config.serve_url, timeout)?),
    })
}

// ── Python bridge ────────────────────────────────────────────────────────

/// Runs Docling in a child Python process.
#[derive(Debug, Clone)]
pub struct DoclingPython {
    python: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    pdf_path: &'a Path,
    work_dir: &'a Path,
    result_path: &'a Path,
    do_ocr: bool,
    ocr_models: Option<&'a OcrModelPaths>,
    image_placeholders: bool,
}

#[derive(Debug, Deserialize)]
struct BridgeResult {
    markdown: String,
    #[serde(default)]
    title: Option<String>,
    pages: usize,
    #[serde(default)]
    version: Option<String>,
}

impl DoclingPython {
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }

    fn unavailable(&self, detail: impl Into<String>) -> OcrLambdaError {
        OcrLambdaError::ConverterUnavailable {
            backend: format!("python ({})", self.python),
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl DocumentConverter for DoclingPython {
    fn name(&self) -> &str {
        "python"
    }

    async fn convert(&self, request: &ConvertRequest) -> Result<ConvertedDocument, OcrLambdaError> {
        let start = Instant::now();
        let result_path = request.work_dir.join("result.json");
        let payload = serde_json::to_vec(&BridgeRequest {
            pdf_path: &request.pdf_path,
            work_dir: &request.work_dir,
            result_path: &result_path,
            do_ocr: request.do_ocr,
            ocr_models: request.ocr_models.as_ref(),
            image_placeholders: request.image_placeholders,
        })
        .map_err(|e| OcrLambdaError::Internal(format!("bridge request: {e}")))?;

        let mut child = Command::new(&self.python)
            .arg("-c")
            .arg(BRIDGE_SCRIPT)
            .current_dir(&request.work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.unavailable(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| self.unavailable(format!("writing request: {e}")))?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| OcrLambdaError::ConversionTimeout {
                path: request.pdf_path.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| self.unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrLambdaError::ConversionFailed {
                path: request.pdf_path.clone(),
                detail: format!("bridge exited with {}: {}", output.status, tail(&stderr, 20)),
            });
        }

        let raw = tokio::fs::read(&result_path)
            .await
            .map_err(|e| OcrLambdaError::io("reading bridge result", &result_path, e))?;
        let result: BridgeResult =
            serde_json::from_slice(&raw).map_err(|e| OcrLambdaError::ConversionFailed {
                path: request.pdf_path.clone(),
                detail: format!("unreadable bridge result: {e}"),
            })?;

        debug!(
            "Docling (python) converted {} pages in {}ms",
            result.pages,
            start.elapsed().as_millis()
        );

        Ok(ConvertedDocument {
            markdown: result.markdown,
            title: result.title.filter(|t| !t.trim().is_empty()),
            page_count: result.pages,
            engine_version: result.version,
        })
    }
}

/// Last `n` lines of a process log.
fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

// ── docling-serve ────────────────────────────────────────────────────────

/// Sends PDFs to a docling-serve `/v1/convert/file` endpoint.
#[derive(Debug, Clone)]
pub struct DoclingServe {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ServeResponse {
    document: ServeDocument,
    status: String,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ServeDocument {
    #[serde(default)]
    md_content: Option<String>,
    #[serde(default)]
    json_content: Option<serde_json::Value>,
}

impl DoclingServe {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OcrLambdaError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OcrLambdaError::ConverterUnavailable {
                backend: format!("serve ({base_url})"),
                detail: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/convert/file", self.base_url)
    }
}

#[async_trait]
impl DocumentConverter for DoclingServe {
    fn name(&self) -> &str {
        "serve"
    }

    async fn convert(&self, request: &ConvertRequest) -> Result<ConvertedDocument, OcrLambdaError> {
        let path = &request.pdf_path;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| OcrLambdaError::io("reading", path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.pdf".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")
            .map_err(|e| OcrLambdaError::Internal(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("files", part)
            .text("from_formats", "pdf")
            .text("to_formats", "md")
            .text("to_formats", "json")
            .text("do_ocr", request.do_ocr.to_string())
            .text("ocr_engine", "rapidocr")
            .text("include_images", "false");
        if request.image_placeholders {
            form = form.text("image_export_mode", "placeholder");
        }

        info!("Posting {} to {}", path.display(), self.endpoint());
        let response = self
            .client
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OcrLambdaError::ConversionTimeout {
                        path: path.clone(),
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    OcrLambdaError::ConverterUnavailable {
                        backend: format!("serve ({})", self.base_url),
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OcrLambdaError::ConversionFailed {
                path: path.clone(),
                detail: format!("docling-serve returned HTTP {status}: {}", tail(&body, 5)),
            });
        }

        let body: ServeResponse =
            response
                .json()
                .await
                .map_err(|e| OcrLambdaError::ConversionFailed {
                    path: path.clone(),
                    detail: format!("unreadable docling-serve response: {e}"),
                })?;

        match body.status.as_str() {
            "success" => {}
            "partial_success" => warn!(
                "docling-serve partially converted {}: {:?}",
                path.display(),
                body.errors
            ),
            other => {
                return Err(OcrLambdaError::ConversionFailed {
                    path: path.clone(),
                    detail: format!("docling-serve status '{other}': {:?}", body.errors),
                })
            }
        }

        let (title, page_count) = body
            .document
            .json_content
            .as_ref()
            .map(summarise_docling_json)
            .unwrap_or((None, 0));

        Ok(ConvertedDocument {
            markdown: body.document.md_content.unwrap_or_default(),
            title,
            page_count,
            engine_version: None,
        })
    }
}

/// Title and page count from a serialised `DoclingDocument`.
///
/// `pages` is a map keyed by page number; the title is the first entry of
/// `texts` labelled `title`.
pub fn summarise_docling_json(doc: &serde_json::Value) -> (Option<String>, usize) {
    let pages = match doc.get("pages") {
        Some(serde_json::Value::Object(map)) => map.len(),
        Some(serde_json::Value::Array(list)) => list.len(),
        _ => 0,
    };
    let title = doc
        .get("texts")
        .and_then(|t| t.as_array())
        .and_then(|texts| {
            texts
                .iter()
                .find(|item| item.get("label").and_then(|l| l.as_str()) == Some("title"))
        })
        .and_then(|item| item.get("text"))
        .and_then(|t| t.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    (title, pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summarise_reads_pages_and_title() {
        let doc = json!({
            "name": "input",
            "texts": [
                { "label": "page_header", "text": "ACME Corp" },
                { "label": "title", "text": "  Annual Report  " },
                { "label": "title", "text": "Second" }
            ],
            "pages": { "1": {}, "2": {}, "3": {} }
        });
        assert_eq!(
            summarise_docling_json(&doc),
            (Some("Annual Report".to_string()), 3)
        );
    }

    #[test]
    fn summarise_tolerates_missing_fields() {
        assert_eq!(summarise_docling_json(&json!({})), (None, 0));
        assert_eq!(
            summarise_docling_json(&json!({ "texts": [{ "label": "title", "text": " " }] })),
            (None, 0)
        );
    }

    #[test]
    fn bridge_request_shape() {
        let models = OcrModelPaths::in_dir(Path::new("/m"));
        let req = BridgeRequest {
            pdf_path: Path::new("/tmp/w/input.pdf"),
            work_dir: Path::new("/tmp/w"),
            result_path: Path::new("/tmp/w/result.json"),
            do_ocr: false,
            ocr_models: Some(&models),
            image_placeholders: true,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["pdf_path"], "/tmp/w/input.pdf");
        assert_eq!(v["do_ocr"], false);
        assert_eq!(v["ocr_models"]["det"], "/m/PP-OCRv4/en_PP-OCRv3_det_infer.onnx");
        assert_eq!(v["image_placeholders"], true);
    }

    #[test]
    fn bridge_result_parses_nulls() {
        let r: BridgeResult =
            serde_json::from_str(r##"{"markdown":"# A\n","title":null,"pages":2,"version":null}"##)
                .unwrap();
        assert_eq!(r.pages, 2);
        assert!(r.title.is_none());
        assert!(r.version.is_none());
    }

    #[test]
    fn bridge_request_without_bundle() {
        let req = BridgeRequest {
            pdf_path: Path::new("/tmp/w/input.pdf"),
            work_dir: Path::new("/tmp/w"),
            result_path: Path::new("/tmp/w/result.json"),
            do_ocr: true,
            ocr_models: None,
            image_placeholders: true,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v["ocr_models"].is_null());
        assert_eq!(v["do_ocr"], true);
    }

    #[test]
    fn bridge_script_is_embedded() {
        assert!(BRIDGE_SCRIPT.contains("result_path"));
        // RapidOCR is selected unconditionally, bundle or not.
        assert!(BRIDGE_SCRIPT.contains("\nopts.ocr_options = RapidOcrOptions("));
        assert!(BRIDGE_SCRIPT.contains("req.get(\"ocr_models\") or {}"));
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("only", 5), "only");
        assert_eq!(tail("", 3), "");
    }

    #[tokio::test]
    async fn missing_interpreter_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let converter =
            DoclingPython::new("/definitely/not/python3", Duration::from_secs(5));
        let err = converter
            .convert(&ConvertRequest {
                pdf_path: dir.path().join("input.pdf"),
                work_dir: dir.path().to_path_buf(),
                do_ocr: true,
                ocr_models: None,
                image_placeholders: true,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ConverterUnavailable");
    }
}
