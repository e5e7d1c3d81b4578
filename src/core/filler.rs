//! Filling document templates with form data

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Deserialize;
use thiserror::Error;

use super::document::{Document, TemplateError};

/// Separator joining the elements of a multi-value field.
pub const LIST_SEPARATOR: &str = ", ";
/// Sortable timestamp prefixed to every output filename.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Errors fatal to one document's fill. In batch mode they are caught
/// per document and never abort the siblings.
#[derive(Debug, Error)]
pub enum FillError {
    #[error("invalid template {}: {}", .path.display(), .source)]
    InvalidTemplate {
        path: PathBuf,
        #[source]
        source: TemplateError,
    },

    #[error("cannot write {}: {}", .path.display(), .source)]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One field's submitted value. The filler renders whatever it is
/// given; whether a field should carry one value or a list is the
/// caller's contract with the schema, not enforced here.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Single(String),
    Many(Vec<String>),
    /// JSON `null`; renders as the empty string.
    Empty,
}

impl FillValue {
    pub fn render(&self) -> String {
        match self {
            FillValue::Single(value) => value.clone(),
            FillValue::Many(values) => values.join(LIST_SEPARATOR),
            FillValue::Empty => String::new(),
        }
    }
}

/// Mapping of field key to submitted value.
pub type FillRequest = HashMap<String, FillValue>;

/// Per-document outcome of a batch fill.
#[derive(Debug)]
pub struct FillResult {
    /// Template document name, as passed in.
    pub document: String,
    /// Output path, present on success.
    pub output: Option<PathBuf>,
    pub error: Option<FillError>,
}

impl FillResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Results of a batch fill, in input order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<FillResult>,
}

impl BatchOutcome {
    /// True only when every document succeeded.
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.succeeded())
    }
}

/// Fill one template and write the result to `output`.
///
/// The filled container is assembled in memory before anything touches
/// the filesystem, so the output is either written whole or not at all.
pub fn fill_document(
    template: &Path,
    output: &Path,
    values: &FillRequest,
) -> Result<(), FillError> {
    let mut document = Document::open(template).map_err(|source| FillError::InvalidTemplate {
        path: template.to_path_buf(),
        source,
    })?;

    document.substitute(&rendered_values(values));

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|source| FillError::WriteFailed {
            path: output.to_path_buf(),
            source,
        })?;
    }
    document.save(output).map_err(|source| FillError::WriteFailed {
        path: output.to_path_buf(),
        source,
    })?;

    tracing::info!("Filled {} -> {}", template.display(), output.display());
    Ok(())
}

/// Fill every named document in `template_dir`, writing timestamped
/// copies into `output_dir`.
///
/// Documents are processed sequentially and independently: one failure
/// is recorded in its result and the loop moves on. Office lock files
/// (`~$` prefix) are skipped. One timestamp is taken for the whole
/// batch so its artifacts sort together by filename.
pub fn fill_batch(
    template_dir: &Path,
    output_dir: &Path,
    documents: &[String],
    values: &FillRequest,
) -> BatchOutcome {
    let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let mut outcome = BatchOutcome::default();

    for name in documents {
        if name.starts_with("~$") {
            tracing::debug!("Skipping lock file: {name}");
            continue;
        }

        let template = template_dir.join(name);
        let output = output_dir.join(output_name(name, &timestamp));
        match fill_document(&template, &output, values) {
            Ok(()) => outcome.results.push(FillResult {
                document: name.clone(),
                output: Some(output),
                error: None,
            }),
            Err(error) => {
                tracing::warn!("Failed to fill {name}: {error}");
                outcome.results.push(FillResult {
                    document: name.clone(),
                    output: None,
                    error: Some(error),
                });
            }
        }
    }

    outcome
}

/// Output filename for a filled copy: the template's name prefixed with
/// the batch timestamp, chronologically sortable and collision-free
/// across repeated fills.
pub fn output_name(original: &str, timestamp: &str) -> String {
    format!("{timestamp}_{original}")
}

fn rendered_values(values: &FillRequest) -> HashMap<String, String> {
    values
        .iter()
        .map(|(key, value)| (key.clone(), value.render()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{Docx, Paragraph, Run};
    use tempfile::TempDir;

    fn write_template(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let mut docx = Docx::new();
        for line in lines {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*line)));
        }
        let path = dir.join(name);
        let file = fs::File::create(&path).unwrap();
        docx.build().pack(file).unwrap();
        path
    }

    fn request(json: &str) -> FillRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_render_scalar_list_and_null() {
        let values = request(r#"{"a": "X", "b": ["Y", "Z"], "c": null, "d": []}"#);
        assert_eq!(values["a"].render(), "X");
        assert_eq!(values["b"].render(), "Y, Z");
        assert_eq!(values["c"].render(), "");
        assert_eq!(values["d"].render(), "");
    }

    #[test]
    fn test_fill_document_round_trip() {
        let dir = TempDir::new().unwrap();
        let template = write_template(
            dir.path(),
            "letter.docx",
            &["To {a}", "From {b}", "Unchanged line"],
        );
        let output = dir.path().join("out").join("letter.docx");

        let values = request(r#"{"a": "X", "b": ["Y", "Z"]}"#);
        fill_document(&template, &output, &values).unwrap();

        let filled = Document::open(&output).unwrap();
        let text = filled.text();
        assert!(text.contains("To X"));
        assert!(text.contains("From Y, Z"));
        assert!(text.contains("Unchanged line"));
    }

    #[test]
    fn test_fill_is_deterministic_for_identical_values() {
        let dir = TempDir::new().unwrap();
        let template = write_template(dir.path(), "t.docx", &["Hello {name}"]);
        let values = request(r#"{"name": "World"}"#);

        let first = dir.path().join("first.docx");
        let second = dir.path().join("second.docx");
        fill_document(&template, &first, &values).unwrap();
        fill_document(&template, &second, &values).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_fill_missing_template_is_invalid_template() {
        let dir = TempDir::new().unwrap();
        let result = fill_document(
            &dir.path().join("absent.docx"),
            &dir.path().join("out.docx"),
            &FillRequest::new(),
        );
        assert!(matches!(result, Err(FillError::InvalidTemplate { .. })));
    }

    #[test]
    fn test_output_name_is_timestamp_prefixed() {
        assert_eq!(
            output_name("report.docx", "2025-03-01_09-30-00"),
            "2025-03-01_09-30-00_report.docx"
        );
    }

    #[test]
    fn test_batch_isolates_failures() {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        let out = dir.path().join("output");
        fs::create_dir_all(&templates).unwrap();

        write_template(&templates, "first.docx", &["{x}"]);
        fs::write(templates.join("second.docx"), b"corrupted").unwrap();
        write_template(&templates, "third.docx", &["{x}"]);

        let documents: Vec<String> = ["first.docx", "second.docx", "third.docx"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let outcome = fill_batch(&templates, &out, &documents, &request(r#"{"x": "1"}"#));

        assert_eq!(outcome.results.len(), 3);
        assert!(!outcome.success());

        assert!(outcome.results[0].succeeded());
        assert!(outcome.results[2].succeeded());
        for result in [&outcome.results[0], &outcome.results[2]] {
            let output = result.output.as_ref().unwrap();
            assert!(output.exists(), "output missing: {}", output.display());
        }

        let failed = &outcome.results[1];
        assert_eq!(failed.document, "second.docx");
        assert!(failed.output.is_none());
        assert!(matches!(
            failed.error,
            Some(FillError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_batch_skips_lock_files() {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        fs::create_dir_all(&templates).unwrap();
        write_template(&templates, "real.docx", &["{x}"]);

        let documents: Vec<String> = ["~$real.docx", "real.docx"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let outcome = fill_batch(
            &templates,
            &dir.path().join("out"),
            &documents,
            &request(r#"{"x": "1"}"#),
        );

        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.success());
    }

    #[test]
    fn test_batch_success_requires_every_document() {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        fs::create_dir_all(&templates).unwrap();
        write_template(&templates, "ok.docx", &["{x}"]);

        let documents: Vec<String> =
            vec!["ok.docx".to_string(), "missing.docx".to_string()];
        let outcome = fill_batch(
            &templates,
            &dir.path().join("out"),
            &documents,
            &request(r#"{"x": "1"}"#),
        );

        assert!(!outcome.success());
        assert_eq!(outcome.results.iter().filter(|r| r.succeeded()).count(), 1);
    }
}
