//! Metadata header prepended to every Markdown output.
//!
//! The block is YAML-style `key: value` lines between `---` fences, in a
//! fixed field order so downstream indexers can rely on it:
//!
//! ```text
//! ---
//! title: Quarterly report
//! source_s3: s3://incoming/reports/q3.pdf
//! output_s3_md: s3://converted/reports/q3.md
//! sha256: 9f86d081…
//! pages: 12
//! converted_at: 2024-05-01T09:30:00.123456Z
//! docling_version: 2.31.0
//! ocr: true
//! ---
//! ```
//!
//! Values are written bare. A string that YAML would read as something else
//! (a `key: value` pair, a comment, a boolean, an empty value…) is written as
//! a JSON string instead, which every YAML parser accepts.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Reported when the converter cannot tell its own version.
pub const UNKNOWN_DOCLING_VERSION: &str = "runtime";

/// Metadata describing one converted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontMatter {
    pub title: String,
    pub source_s3: String,
    pub output_s3_md: String,
    pub sha256: String,
    pub pages: usize,
    pub converted_at: DateTime<Utc>,
    pub docling_version: String,
    pub ocr: bool,
}

impl FrontMatter {
    /// `converted_at` as ISO-8601 UTC with microseconds and a `Z` suffix.
    pub fn converted_at_iso(&self) -> String {
        self.converted_at
            .format("%Y-%m-%dT%H:%M:%S%.6fZ")
            .to_string()
    }

    /// Render the fenced header block, ending with a newline.
    pub fn render(&self) -> String {
        let fields: [(&str, String); 8] = [
            ("title", scalar(&self.title)),
            ("source_s3", scalar(&self.source_s3)),
            ("output_s3_md", scalar(&self.output_s3_md)),
            ("sha256", scalar(&self.sha256)),
            ("pages", self.pages.to_string()),
            ("converted_at", self.converted_at_iso()),
            ("docling_version", scalar(&self.docling_version)),
            ("ocr", self.ocr.to_string()),
        ];

        let mut out = String::from("---\n");
        for (key, value) in fields {
            let _ = writeln!(out, "{key}: {value}");
        }
        out.push_str("---\n");
        out
    }

    /// Front matter followed by the Markdown body.
    pub fn prepend_to(&self, body: &str) -> String {
        let mut doc = self.render();
        doc.reserve(body.len());
        doc.push_str(body);
        doc
    }
}

static RE_PLAIN_SCALAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_./(][^\n\r#]*$").unwrap());

static RE_YAML_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(true|false|yes|no|on|off|null|~|[-+]?(\d[\d_]*)?\.?\d+([eE][-+]?\d+)?)$")
        .unwrap()
});

/// YAML 1.1 implicit types beyond plain numbers: timestamps, sexagesimal
/// numbers, hex/octal/binary integers, `.inf`/`.nan` and the `y`/`n` booleans.
static RE_YAML_IMPLICIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(\d{4}-\d\d?-\d\d?([Tt ].*)?|[-+]?[\d_]*\d(:[0-5]?\d)+(\.[\d_]*)?|[-+]?0(x[0-9a-f_]+|o?[0-7_]+|b[01_]+)|[-+]?\.(inf|nan)|y|n)$",
    )
    .unwrap()
});

/// Write a string value bare when YAML reads it back unchanged, JSON-quoted otherwise.
fn scalar(value: &str) -> String {
    let plain = RE_PLAIN_SCALAR.is_match(value)
        && !value.contains(": ")
        && !value.ends_with(':')
        && value.trim() == value
        && !RE_YAML_KEYWORD.is_match(value)
        && !RE_YAML_IMPLICIT.is_match(value);
    if plain {
        value.to_string()
    } else {
        serde_json::Value::String(value.to_string()).to_string()
    }
}
