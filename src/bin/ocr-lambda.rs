//! CLI binary for edgequake-ocr-lambda.
//!
//! In the Lambda image this binary is installed as `bootstrap` and runs the
//! runtime loop. Locally it can replay an S3 event or convert a single file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_ocr_lambda::pipeline::fetch::FetchedObject;
use edgequake_ocr_lambda::pipeline::{base_name, convert, convert_document, DocumentTarget};
use edgequake_ocr_lambda::runtime::{self, ErrorReport, RuntimeClient};
use edgequake_ocr_lambda::{
    ConverterBackend, Handler, LocalBuckets, OcrLambdaError, OcrMode, PipelineConfig, S3Buckets,
    S3Event,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Lambda entry point (AWS_LAMBDA_RUNTIME_API is set by Lambda)
  ocr-lambda serve

  # Replay a notification against real S3
  OUT_BUCKET=converted-docs ocr-lambda invoke event.json

  # Replay against local directories: ./buckets/<bucket>/<key>
  ocr-lambda --out-bucket out invoke event.json --local-root ./buckets

  # Convert one file, no S3 involved
  ocr-lambda --enable-ocr never convert report.pdf -o report.md

ENVIRONMENT VARIABLES:
  OUT_BUCKET             Bucket receiving Markdown files (required for serve/invoke)
  ENABLE_OCR             auto | always | never (default: auto)
  OCR_MODELS_DIR         RapidOCR model bundle (default: /opt/models/rapidocr)
  DOCLING_BACKEND        python | serve (default: python)
  DOCLING_PYTHON         Interpreter with docling installed (default: python3)
  DOCLING_SERVE_URL      docling-serve base URL (default: http://localhost:5001)
  DOCLING_TIMEOUT_SECS   Per-document conversion timeout (default: 600)
  AWS_REGION, AWS_ACCESS_KEY_ID, …  Standard AWS credentials for S3
"#;

/// Convert PDFs uploaded to S3 into Markdown with Docling.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-lambda",
    version,
    about = "Convert PDFs uploaded to S3 into Markdown with Docling",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Bucket receiving the Markdown objects [env: OUT_BUCKET].
    #[arg(long, global = true)]
    out_bucket: Option<String>,

    /// OCR policy: auto, always, never [env: ENABLE_OCR].
    #[arg(long, global = true, value_enum, ignore_case = true)]
    enable_ocr: Option<OcrArg>,

    /// Directory holding the bundled RapidOCR models [env: OCR_MODELS_DIR].
    #[arg(long, global = true)]
    ocr_models_dir: Option<PathBuf>,

    /// Docling integration: python, serve [env: DOCLING_BACKEND].
    #[arg(long, global = true, value_enum, ignore_case = true)]
    backend: Option<BackendArg>,

    /// Python interpreter with docling installed [env: DOCLING_PYTHON].
    #[arg(long, global = true)]
    python: Option<String>,

    /// docling-serve base URL [env: DOCLING_SERVE_URL].
    #[arg(long, global = true)]
    serve_url: Option<String>,

    /// Per-document conversion timeout in seconds [env: DOCLING_TIMEOUT_SECS].
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the Lambda Runtime API loop (default when no command is given).
    Serve,

    /// Handle one S3 notification read from a JSON file ("-" for stdin).
    Invoke {
        event: PathBuf,

        /// Serve buckets from <DIR>/<bucket>/ instead of S3.
        #[arg(long)]
        local_root: Option<PathBuf>,

        /// Print the per-object report instead of the bare acknowledgment.
        #[arg(long)]
        report: bool,
    },

    /// Convert a local PDF and print (or write) the Markdown.
    Convert {
        input: PathBuf,

        /// Write Markdown to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrArg {
    Auto,
    Always,
    Never,
}

impl From<OcrArg> for OcrMode {
    fn from(v: OcrArg) -> Self {
        match v {
            OcrArg::Auto => OcrMode::Auto,
            OcrArg::Always => OcrMode::Always,
            OcrArg::Never => OcrMode::Never,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Python,
    Serve,
}

impl From<BackendArg> for ConverterBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Python => ConverterBackend::Python,
            BackendArg::Serve => ConverterBackend::Serve,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Lambda ships stderr to CloudWatch; no ANSI colours there.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_ansi(std::env::var_os("AWS_LAMBDA_RUNTIME_API").is_none())
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli, |name| std::env::var(name).ok());

    match cli.command {
        None | Some(Command::Serve) => serve(config).await,
        Some(Command::Invoke {
            ref event,
            ref local_root,
            report,
        }) => invoke(config?, event, local_root.as_ref(), report).await,
        Some(Command::Convert {
            ref input,
            ref output,
        }) => convert_file(config?, input, output.as_ref()).await,
    }
}

/// Environment first, then explicit flags on top.
///
/// Environment values go through [`PipelineConfig::from_lookup`] so the
/// binary and the library accept exactly the same spellings, and a bad value
/// surfaces as an `OcrLambdaError` that `serve` can report to Lambda.
fn build_config<F>(cli: &Cli, lookup: F) -> Result<PipelineConfig, OcrLambdaError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = PipelineConfig::from_lookup(lookup)?.into_builder();
    if let Some(ref bucket) = cli.out_bucket {
        builder = builder.output_bucket(bucket);
    }
    if let Some(mode) = cli.enable_ocr {
        builder = builder.ocr_mode(mode.into());
    }
    if let Some(ref dir) = cli.ocr_models_dir {
        builder = builder.ocr_models_dir(dir);
    }
    if let Some(backend) = cli.backend {
        builder = builder.backend(backend.into());
    }
    if let Some(ref python) = cli.python {
        builder = builder.python(python);
    }
    if let Some(ref url) = cli.serve_url {
        builder = builder.serve_url(url);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.timeout_secs(secs);
    }
    builder.build()
}

/// Runtime loop. Startup failures are reported to `/runtime/init/error`
/// so Lambda surfaces them instead of timing out.
async fn serve(config: Result<PipelineConfig, OcrLambdaError>) -> Result<()> {
    let client = RuntimeClient::from_env()?;
    let handler = match config.and_then(Handler::from_config) {
        Ok(h) => h,
        Err(e) => {
            client.send_init_error(&ErrorReport::from(&e)).await.ok();
            return Err(e).context("Failed to initialise handler");
        }
    };
    runtime::run(&client, &handler)
        .await
        .context("Lambda runtime loop stopped")
}

async fn invoke(
    config: PipelineConfig,
    event_path: &PathBuf,
    local_root: Option<&PathBuf>,
    report: bool,
) -> Result<()> {
    let payload = if event_path.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::Read::read_to_end(&mut io::stdin(), &mut buf).context("Failed to read stdin")?;
        buf
    } else {
        tokio::fs::read(event_path)
            .await
            .with_context(|| format!("Failed to read event from {:?}", event_path))?
    };
    let event = S3Event::from_slice(&payload)?;

    let converter = convert::from_config(&config)?;
    let handler = match local_root {
        Some(root) => Handler::new(config, Arc::new(LocalBuckets::new(root)), converter)?,
        None => Handler::new(config, Arc::new(S3Buckets::new()), converter)?,
    };

    let result = handler.handle(&event).await.context("Invocation failed")?;
    let json = if report {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&edgequake_ocr_lambda::HandlerResponse::ok())
    }
    .context("Failed to serialise response")?;
    println!("{json}");
    Ok(())
}

async fn convert_file(
    config: PipelineConfig,
    input: &PathBuf,
    output: Option<&PathBuf>,
) -> Result<()> {
    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {:?}", input))?;
    let object = FetchedObject::new(bytes);

    let source_path = std::fs::canonicalize(input).unwrap_or_else(|_| input.clone());
    let output_uri = match output {
        Some(path) => format!("file://{}", path.display()),
        None => "stdout".to_string(),
    };
    let source_name = source_path.to_string_lossy().into_owned();
    let target = DocumentTarget {
        source_uri: format!("file://{}", source_path.display()),
        output_uri,
        fallback_title: base_name(&source_name).to_string(),
    };

    let converter = convert::from_config(&config)?;
    let scratch = tempfile::TempDir::new().context("Failed to create scratch directory")?;
    let doc = convert_document(converter.as_ref(), &config, scratch.path(), &object, &target)
        .await
        .context("Conversion failed")?;
    let markdown = doc.render();

    match output {
        Some(path) => {
            tokio::fs::write(path, &markdown)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
            eprintln!(
                "✔ {} pages → {}",
                doc.front_matter.pages,
                path.display()
            );
        }
        None => {
            io::stdout()
                .lock()
                .write_all(markdown.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn env_values_are_case_insensitive() {
        let cli = Cli::try_parse_from(["ocr-lambda", "serve"]).unwrap();
        let config = build_config(
            &cli,
            env(&[
                ("OUT_BUCKET", "md-out"),
                ("ENABLE_OCR", "ALWAYS"),
                ("DOCLING_BACKEND", "Python"),
            ]),
        )
        .unwrap();
        assert_eq!(config.ocr_mode, OcrMode::Always);
        assert_eq!(config.backend, ConverterBackend::Python);
        assert_eq!(config.output_bucket.as_deref(), Some("md-out"));
    }

    #[test]
    fn bad_env_value_is_a_config_error_not_a_parse_exit() {
        let cli = Cli::try_parse_from(["ocr-lambda", "serve"]).unwrap();
        let err = build_config(&cli, env(&[("ENABLE_OCR", "sometimes")])).unwrap_err();
        assert_eq!(err.kind(), "InvalidOcrMode");

        let err = build_config(&cli, env(&[("DOCLING_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert_eq!(err.kind(), "InvalidConfig");
    }

    #[test]
    fn flags_override_environment() {
        let cli = Cli::try_parse_from([
            "ocr-lambda",
            "--enable-ocr",
            "NEVER",
            "--timeout",
            "30",
            "--out-bucket",
            "flag-bucket",
            "serve",
        ])
        .unwrap();
        let config = build_config(
            &cli,
            env(&[("ENABLE_OCR", "always"), ("OUT_BUCKET", "env-bucket")]),
        )
        .unwrap();
        assert_eq!(config.ocr_mode, OcrMode::Never);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.output_bucket.as_deref(), Some("flag-bucket"));
    }

    #[test]
    fn defaults_without_env_or_flags() {
        let cli = Cli::try_parse_from(["ocr-lambda"]).unwrap();
        let config = build_config(&cli, env(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }
}
