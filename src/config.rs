//! Configuration for the conversion pipeline.
//!
//! Everything the handler needs to know about its environment lives in
//! [`PipelineConfig`]. In Lambda the values come from the function's
//! environment via [`PipelineConfig::from_env`]; library users and the CLI
//! go through [`PipelineConfigBuilder`] instead.
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `OUT_BUCKET` | [`PipelineConfig::output_bucket`] | none |
//! | `ENABLE_OCR` | [`PipelineConfig::ocr_mode`] | `auto` |
//! | `OCR_MODELS_DIR` | [`PipelineConfig::ocr_models_dir`] | `/opt/models/rapidocr` |
//! | `DOCLING_BACKEND` | [`PipelineConfig::backend`] | `python` |
//! | `DOCLING_PYTHON` | [`PipelineConfig::python`] | `python3` |
//! | `DOCLING_SERVE_URL` | [`PipelineConfig::serve_url`] | `http://localhost:5001` |
//! | `DOCLING_TIMEOUT_SECS` | [`PipelineConfig::timeout_secs`] | `600` |

use crate::error::OcrLambdaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default location of the RapidOCR models baked into the Lambda image.
pub const DEFAULT_OCR_MODELS_DIR: &str = "/opt/models/rapidocr";

/// Default docling-serve endpoint.
pub const DEFAULT_SERVE_URL: &str = "http://localhost:5001";

/// Content type of every uploaded Markdown object.
pub const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";

/// Configuration for the conversion pipeline.
///
/// # Example
/// ```rust
/// use edgequake_ocr_lambda::{OcrMode, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .output_bucket("converted-docs")
///     .ocr_mode(OcrMode::Never)
///     .build()
///     .unwrap();
/// assert!(!config.ocr_mode.should_ocr());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bucket receiving the Markdown objects. Required by the handler, not by
    /// local single-file conversion.
    pub output_bucket: Option<String>,

    /// When to run OCR. Default: [`OcrMode::Auto`].
    pub ocr_mode: OcrMode,

    /// Directory holding the pre-bundled RapidOCR ONNX models.
    pub ocr_models_dir: PathBuf,

    /// Which Docling integration performs the conversion.
    pub backend: ConverterBackend,

    /// Python interpreter with `docling` installed (python backend).
    pub python: String,

    /// Base URL of a docling-serve instance (serve backend).
    pub serve_url: String,

    /// Per-document conversion timeout in seconds. Default: 600.
    ///
    /// Scanned documents with OCR are slow on Lambda CPUs; keep this below
    /// the function timeout so the runtime gets a proper error report.
    pub timeout_secs: u64,

    /// Ask Docling to emit `<!-- image -->` placeholders for pictures.
    /// Default: true. Versions without placeholder support fall back to
    /// their default image handling.
    pub image_placeholders: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_bucket: None,
            ocr_mode: OcrMode::default(),
            ocr_models_dir: PathBuf::from(DEFAULT_OCR_MODELS_DIR),
            backend: ConverterBackend::default(),
            python: "python3".to_string(),
            serve_url: DEFAULT_SERVE_URL.to_string(),
            timeout_secs: 600,
            image_placeholders: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Builder seeded with this configuration, for layering overrides.
    pub fn into_builder(self) -> PipelineConfigBuilder {
        PipelineConfigBuilder { config: self }
    }

    /// Load the configuration from the process environment.
    ///
    /// Unset variables keep their defaults; `OUT_BUCKET` is optional here
    /// and enforced by [`crate::Handler::new`].
    pub fn from_env() -> Result<Self, OcrLambdaError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OcrLambdaError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut builder = Self::builder();
        if let Some(bucket) = get("OUT_BUCKET") {
            builder = builder.output_bucket(bucket);
        }
        if let Some(mode) = get("ENABLE_OCR") {
            builder = builder.ocr_mode(mode.parse()?);
        }
        if let Some(dir) = get("OCR_MODELS_DIR") {
            builder = builder.ocr_models_dir(dir);
        }
        if let Some(backend) = get("DOCLING_BACKEND") {
            builder = builder.backend(backend.parse()?);
        }
        if let Some(python) = get("DOCLING_PYTHON") {
            builder = builder.python(python);
        }
        if let Some(url) = get("DOCLING_SERVE_URL") {
            builder = builder.serve_url(url);
        }
        if let Some(secs) = get("DOCLING_TIMEOUT_SECS") {
            let secs = secs.trim().parse::<u64>().map_err(|e| {
                OcrLambdaError::InvalidConfig(format!("DOCLING_TIMEOUT_SECS '{secs}': {e}"))
            })?;
            builder = builder.timeout_secs(secs);
        }
        builder.build()
    }

    /// Resolved RapidOCR model files under [`Self::ocr_models_dir`].
    pub fn ocr_models(&self) -> OcrModelPaths {
        OcrModelPaths::in_dir(&self.ocr_models_dir)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn output_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.output_bucket = Some(bucket.into());
        self
    }

    pub fn ocr_mode(mut self, mode: OcrMode) -> Self {
        self.config.ocr_mode = mode;
        self
    }

    pub fn ocr_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.ocr_models_dir = dir.into();
        self
    }

    pub fn backend(mut self, backend: ConverterBackend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn python(mut self, python: impl Into<String>) -> Self {
        self.config.python = python.into();
        self
    }

    pub fn serve_url(mut self, url: impl Into<String>) -> Self {
        self.config.serve_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn image_placeholders(mut self, v: bool) -> Self {
        self.config.image_placeholders = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, OcrLambdaError> {
        let c = &self.config;
        if let Some(bucket) = &c.output_bucket {
            if bucket.trim().is_empty() || bucket.contains('/') {
                return Err(OcrLambdaError::InvalidConfig(format!(
                    "output bucket must be a bare bucket name, got '{bucket}'"
                )));
            }
        }
        if c.timeout_secs == 0 {
            return Err(OcrLambdaError::InvalidConfig(
                "conversion timeout must be ≥ 1 second".into(),
            ));
        }
        if c.backend == ConverterBackend::Serve
            && !(c.serve_url.starts_with("http://") || c.serve_url.starts_with("https://"))
        {
            return Err(OcrLambdaError::InvalidConfig(format!(
                "docling-serve URL must be http(s), got '{}'",
                c.serve_url
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// OCR policy, set through `ENABLE_OCR`.
///
/// | Mode | OCR requested |
/// |------|---------------|
/// | `auto` | yes; Docling only OCRs regions without a text layer |
/// | `always` | yes |
/// | `never` | no; scanned pages come out empty |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl OcrMode {
    /// Whether the converter should be asked to run OCR.
    pub fn should_ocr(self) -> bool {
        match self {
            OcrMode::Always | OcrMode::Auto => true,
            OcrMode::Never => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OcrMode::Auto => "auto",
            OcrMode::Always => "always",
            OcrMode::Never => "never",
        }
    }
}

impl FromStr for OcrMode {
    type Err = OcrLambdaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(OcrMode::Auto),
            "always" => Ok(OcrMode::Always),
            "never" => Ok(OcrMode::Never),
            _ => Err(OcrLambdaError::InvalidOcrMode {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OcrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How Docling is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterBackend {
    /// In-image Python interpreter running the bundled bridge script. (default)
    #[default]
    Python,
    /// A docling-serve HTTP endpoint.
    Serve,
}

impl FromStr for ConverterBackend {
    type Err = OcrLambdaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" => Ok(ConverterBackend::Python),
            "serve" | "docling-serve" => Ok(ConverterBackend::Serve),
            _ => Err(OcrLambdaError::InvalidBackend {
                value: s.to_string(),
            }),
        }
    }
}

/// The three RapidOCR ONNX models shipped in the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrModelPaths {
    /// Text detection model.
    pub det: PathBuf,
    /// Text recognition model.
    pub rec: PathBuf,
    /// Text direction classifier.
    pub cls: PathBuf,
}

impl OcrModelPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            det: dir.join("PP-OCRv4").join("en_PP-OCRv3_det_infer.onnx"),
            rec: dir.join("PP-OCRv4").join("ch_PP-OCRv4_rec_server_infer.onnx"),
            cls: dir.join("PP-OCRv3").join("ch_ppocr_mobile_v2.0_cls_train.onnx"),
        }
    }

    /// Model files that do not exist on disk.
    pub fn missing(&self) -> Vec<&Path> {
        [&self.det, &self.rec, &self.cls]
            .into_iter()
            .map(PathBuf::as_path)
            .filter(|p| !p.exists())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn ocr_mode_parsing() {
        assert_eq!("auto".parse::<OcrMode>().unwrap(), OcrMode::Auto);
        assert_eq!("ALWAYS".parse::<OcrMode>().unwrap(), OcrMode::Always);
        assert_eq!(" never ".parse::<OcrMode>().unwrap(), OcrMode::Never);
        assert!("sometimes".parse::<OcrMode>().is_err());
    }

    #[test]
    fn ocr_mode_decision() {
        assert!(OcrMode::Always.should_ocr());
        assert!(OcrMode::Auto.should_ocr());
        assert!(!OcrMode::Never.should_ocr());
    }

    #[test]
    fn defaults_without_env() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.output_bucket, None);
        assert_eq!(config.ocr_mode, OcrMode::Auto);
        assert_eq!(config.ocr_models_dir, PathBuf::from(DEFAULT_OCR_MODELS_DIR));
        assert_eq!(config.backend, ConverterBackend::Python);
        assert_eq!(config.timeout_secs, 600);
    }

    #[test]
    fn env_values_are_applied() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("OUT_BUCKET", "md-out"),
            ("ENABLE_OCR", "never"),
            ("OCR_MODELS_DIR", "/models"),
            ("DOCLING_BACKEND", "serve"),
            ("DOCLING_SERVE_URL", "http://docling:5001/"),
            ("DOCLING_TIMEOUT_SECS", "120"),
        ]))
        .unwrap();
        assert_eq!(config.output_bucket.as_deref(), Some("md-out"));
        assert_eq!(config.ocr_mode, OcrMode::Never);
        assert_eq!(config.ocr_models_dir, PathBuf::from("/models"));
        assert_eq!(config.backend, ConverterBackend::Serve);
        assert_eq!(config.serve_url, "http://docling:5001");
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let config =
            PipelineConfig::from_lookup(lookup(&[("OUT_BUCKET", ""), ("ENABLE_OCR", " ")]))
                .unwrap();
        assert_eq!(config.output_bucket, None);
        assert_eq!(config.ocr_mode, OcrMode::Auto);
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        assert!(PipelineConfig::from_lookup(lookup(&[("ENABLE_OCR", "maybe")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("DOCLING_BACKEND", "java")])).is_err());
        assert!(PipelineConfig::from_lookup(lookup(&[("DOCLING_TIMEOUT_SECS", "soon")])).is_err());
    }

    #[test]
    fn into_builder_keeps_existing_values() {
        let base = PipelineConfig::from_lookup(lookup(&[
            ("OUT_BUCKET", "md-out"),
            ("DOCLING_PYTHON", "/usr/bin/python3.12"),
        ]))
        .unwrap();
        let config = base.into_builder().timeout_secs(45).build().unwrap();
        assert_eq!(config.output_bucket.as_deref(), Some("md-out"));
        assert_eq!(config.python, "/usr/bin/python3.12");
        assert_eq!(config.timeout_secs, 45);
    }

    #[test]
    fn debug_lists_every_field() {
        let dbg = format!("{:?}", PipelineConfig::default());
        for field in ["python", "serve_url", "image_placeholders", "timeout_secs"] {
            assert!(dbg.contains(field), "missing {field} in {dbg}");
        }
    }

    #[test]
    fn builder_rejects_bucket_paths() {
        let err = PipelineConfig::builder()
            .output_bucket("bucket/prefix")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("bucket/prefix"));
    }

    #[test]
    fn model_paths_follow_bundle_layout() {
        let models = OcrModelPaths::in_dir(Path::new("/opt/models/rapidocr"));
        assert_eq!(
            models.det,
            PathBuf::from("/opt/models/rapidocr/PP-OCRv4/en_PP-OCRv3_det_infer.onnx")
        );
        assert_eq!(
            models.rec,
            PathBuf::from("/opt/models/rapidocr/PP-OCRv4/ch_PP-OCRv4_rec_server_infer.onnx")
        );
        assert_eq!(
            models.cls,
            PathBuf::from("/opt/models/rapidocr/PP-OCRv3/ch_ppocr_mobile_v2.0_cls_train.onnx")
        );
        assert_eq!(models.missing().len(), 3);
    }
}
