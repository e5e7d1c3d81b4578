//! Field schema loading and validation for template configurations

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use csv::{ReaderBuilder, StringRecord, Trim};
use regex_lite::Regex;
use thiserror::Error;

/// Canonical column holding the display name shown on the form.
pub const LABEL_COLUMN: &str = "label";
/// Canonical column holding the placeholder key used in documents.
pub const KEY_COLUMN: &str = "key";
/// Accepted names for the multiplicity flag column, in preference order.
pub const MULTIPLE_COLUMNS: [&str; 2] = ["multiple", "type"];
/// Optional column holding help text for the field.
pub const NOTE_COLUMN: &str = "note";
/// Token marking a field as multi-value, compared case-insensitively.
pub const TRUE_TOKEN: &str = "TRUE";
/// Default configuration filename inside a template directory.
pub const DEFAULT_CONFIG_FILENAME: &str = "config.csv";

/// Errors that abort loading a configuration. The caller never receives
/// a partial schema.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read configuration: {0}")]
    Unreadable(#[from] csv::Error),

    #[error("missing required columns: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("invalid field key '{0}': use only letters, numbers, and underscores")]
    InvalidKey(String),

    #[error("duplicate field key '{0}'")]
    DuplicateKey(String),
}

/// One validated row of the configuration table.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Display name shown to the user. May be empty (warned, not fatal).
    pub label: String,
    /// Placeholder identifier matched as `{key}` inside documents.
    pub key: String,
    /// Whether the field accepts an ordered list of values at fill time.
    pub multiple: bool,
    /// Optional help text for the form.
    pub note: Option<String>,
}

/// The validated, ordered field list of one configuration file.
///
/// Rebuilt from scratch on every [`ConfigReader::load`]; there is no
/// process-wide cache, so callers decide when to refresh.
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    fields: Vec<FieldDescriptor>,
}

impl FieldSchema {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    /// All placeholder keys, in row order.
    pub fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.key.as_str()).collect()
    }

    /// Look up a descriptor by key.
    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Fields that accept an ordered list of values.
    pub fn multi_value_fields(&self) -> Vec<&FieldDescriptor> {
        self.fields.iter().filter(|f| f.multiple).collect()
    }

    /// Fields that accept exactly one value.
    pub fn single_value_fields(&self) -> Vec<&FieldDescriptor> {
        self.fields.iter().filter(|f| !f.multiple).collect()
    }
}

/// Outcome of [`ConfigReader::validate`]: every problem found, not just
/// the first.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Reads a tabular field-definition file into a [`FieldSchema`].
pub struct ConfigReader {
    path: PathBuf,
}

impl ConfigReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the configuration.
    ///
    /// Rows with a blank key cell are skipped; the schema covers exactly
    /// the rows with non-empty keys. Any structural violation aborts the
    /// load with a [`ConfigError`].
    pub fn load(&self) -> Result<FieldSchema, ConfigError> {
        if !self.path.exists() {
            return Err(ConfigError::NotFound(self.path.clone()));
        }

        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        let columns = Columns::resolve(&headers)?;

        let mut fields: Vec<FieldDescriptor> = Vec::new();
        for record in reader.records() {
            let record = record?;
            let Some(field) = columns.descriptor(&record) else {
                continue;
            };
            if !is_valid_key(&field.key) {
                return Err(ConfigError::InvalidKey(field.key));
            }
            if fields.iter().any(|f| f.key == field.key) {
                return Err(ConfigError::DuplicateKey(field.key));
            }
            fields.push(field);
        }

        tracing::debug!(
            "Loaded {} field definitions from {}",
            fields.len(),
            self.path.display()
        );
        Ok(FieldSchema { fields })
    }

    /// Check the configuration without failing, collecting every error
    /// and warning so a caller can report them all at once.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !self.path.exists() {
            report
                .errors
                .push(format!("configuration file not found: {}", self.path.display()));
            return report;
        }

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_path(&self.path);
        let mut reader = match reader {
            Ok(reader) => reader,
            Err(e) => {
                report.errors.push(format!("cannot read configuration: {e}"));
                return report;
            }
        };
        let headers = match reader.headers() {
            Ok(headers) => headers.clone(),
            Err(e) => {
                report.errors.push(format!("cannot read configuration: {e}"));
                return report;
            }
        };
        let columns = match Columns::resolve(&headers) {
            Ok(columns) => columns,
            Err(e) => {
                // Rows cannot be interpreted without the mandatory columns.
                report.errors.push(e.to_string());
                return report;
            }
        };

        let mut keys: Vec<String> = Vec::new();
        let mut empty_labels: Vec<String> = Vec::new();

        for (index, record) in reader.records().enumerate() {
            // Spreadsheet-style row number: header is row 1.
            let row = index + 2;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    report.errors.push(format!("row {row}: {e}"));
                    continue;
                }
            };

            let key = columns.cell(&record, Some(columns.key));
            if key.is_empty() {
                report.errors.push(format!("row {row}: empty field key"));
                continue;
            }
            if !is_valid_key(key) {
                report.errors.push(format!(
                    "row {row}: invalid field key '{key}': use only letters, numbers, and underscores"
                ));
            }

            if let Some(cell) = columns.multiple.map(|i| columns.cell(&record, Some(i))) {
                if !cell.is_empty()
                    && !cell.eq_ignore_ascii_case(TRUE_TOKEN)
                    && !cell.eq_ignore_ascii_case("FALSE")
                {
                    report.errors.push(format!(
                        "row {row}: invalid multiple value '{cell}', must be TRUE or FALSE"
                    ));
                }
            }

            if columns.cell(&record, Some(columns.label)).is_empty() {
                empty_labels.push(key.to_string());
            }
            keys.push(key.to_string());
        }

        if keys.is_empty() {
            report
                .errors
                .push("no valid fields found in configuration".to_string());
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for key in &keys {
            *counts.entry(key.as_str()).or_default() += 1;
        }
        let mut duplicates: Vec<&str> = Vec::new();
        for key in &keys {
            if counts[key.as_str()] > 1 && !duplicates.contains(&key.as_str()) {
                duplicates.push(key);
            }
        }
        if !duplicates.is_empty() {
            report
                .errors
                .push(format!("duplicate field keys: {}", duplicates.join(", ")));
        }

        if !empty_labels.is_empty() {
            report
                .warnings
                .push(format!("fields with empty labels: {}", empty_labels.join(", ")));
        }

        report
    }
}

/// Column indices resolved once per load from the header row.
struct Columns {
    label: usize,
    key: usize,
    multiple: Option<usize>,
    note: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self, ConfigError> {
        let position = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

        let label = position(LABEL_COLUMN);
        let key = position(KEY_COLUMN);

        // First accepted multiplicity column name wins; the chosen name is
        // not carried past this point.
        let multiple = MULTIPLE_COLUMNS.iter().find_map(|name| position(name));

        match (label, key) {
            (Some(label), Some(key)) => Ok(Self {
                label,
                key,
                multiple,
                note: position(NOTE_COLUMN),
            }),
            _ => {
                let missing = [(LABEL_COLUMN, label), (KEY_COLUMN, key)]
                    .iter()
                    .filter(|(_, index)| index.is_none())
                    .map(|(name, _)| name.to_string())
                    .collect();
                Err(ConfigError::MissingColumns { missing })
            }
        }
    }

    fn cell<'a>(&self, record: &'a StringRecord, index: Option<usize>) -> &'a str {
        index.and_then(|i| record.get(i)).unwrap_or("").trim()
    }

    /// Build a descriptor from one row, or `None` when the key cell is
    /// blank and the row carries no field.
    fn descriptor(&self, record: &StringRecord) -> Option<FieldDescriptor> {
        let key = self.cell(record, Some(self.key));
        if key.is_empty() {
            return None;
        }

        let multiple = self
            .multiple
            .map(|i| self.cell(record, Some(i)).eq_ignore_ascii_case(TRUE_TOKEN))
            .unwrap_or(false);
        let note = self.cell(record, self.note);

        Some(FieldDescriptor {
            label: self.cell(record, Some(self.label)).to_string(),
            key: key.to_string(),
            multiple,
            note: (!note.is_empty()).then(|| note.to_string()),
        })
    }
}

/// Keys drive substitution, so they are restricted to characters that
/// are unambiguous inside a `{key}` token.
fn is_valid_key(key: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new("^[A-Za-z0-9_]+$").unwrap()
    });
    pattern.is_match(key)
}
