//! Application commands and template discovery
//!
//! Stand-in for the desktop front end: discovers template sets on disk,
//! drives the config reader and document filler, and reports results.
//! The core components never scan directories themselves; every path
//! they see is resolved here.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

use crate::core::schema::DEFAULT_CONFIG_FILENAME;
use crate::core::{fill_batch, ConfigReader, Document, FillRequest};

/// One template set on disk: a directory holding a configuration file
/// and the documents it applies to.
#[derive(Debug)]
pub struct TemplateSet {
    pub name: String,
    pub path: PathBuf,
    pub config: Option<PathBuf>,
    pub documents: Vec<String>,
}

/// Discover template sets one level below `root`. Hidden directories
/// are skipped.
pub fn discover_templates(root: &Path) -> Result<Vec<TemplateSet>> {
    if !root.is_dir() {
        bail!("templates directory not found: {}", root.display());
    }

    let mut sets = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path().to_path_buf();
        sets.push(TemplateSet {
            config: find_config_file(&path),
            documents: document_files(&path),
            name,
            path,
        });
    }

    sets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sets)
}

/// Locate the configuration file in a template directory: the default
/// name wins, otherwise the first `.csv` file found.
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    let default = dir.join(DEFAULT_CONFIG_FILENAME);
    if default.exists() {
        return Some(default);
    }

    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().map(|ext| ext == "csv").unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Document filenames in a template directory, sorted, with Office
/// lock files left out.
fn document_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().map(|ext| ext == "docx").unwrap_or(false)
        })
        .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().to_string()))
        .filter(|name| !name.starts_with("~$"))
        .collect();
    names.sort();
    names
}

/// Print every template set under the templates directory.
pub fn list_templates(root: &Path) -> Result<()> {
    let sets = discover_templates(root)?;
    if sets.is_empty() {
        println!("No templates found in {}", root.display());
        return Ok(());
    }

    for set in sets {
        let config = match &set.config {
            Some(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            None => "missing config".to_string(),
        };
        println!("{}  [{}]  {} document(s)", set.name, config, set.documents.len());
    }
    Ok(())
}

/// Validate a template directory: configuration structure first, then a
/// cross-check of document placeholders against the schema. Returns
/// whether the template is usable.
pub fn validate_template(dir: &Path) -> Result<bool> {
    let Some(config) = find_config_file(dir) else {
        println!("error: no configuration file found in {}", dir.display());
        return Ok(false);
    };

    let reader = ConfigReader::new(&config);
    let report = reader.validate();
    for error in &report.errors {
        println!("error: {error}");
    }
    for warning in &report.warnings {
        println!("warning: {warning}");
    }

    let documents = document_files(dir);
    let mut valid = report.is_valid();
    if documents.is_empty() {
        println!("error: no .docx documents found in {}", dir.display());
        valid = false;
    }

    // Cross-check only makes sense against a loadable schema.
    if report.is_valid() {
        let schema = reader.load().context("configuration failed to load")?;
        let mut seen: HashSet<String> = HashSet::new();

        for name in &documents {
            match Document::open(&dir.join(name)) {
                Ok(document) => {
                    for key in document.placeholders() {
                        if schema.field(&key).is_none() {
                            println!("warning: {name} uses {{{key}}} which is not in the configuration");
                        }
                        seen.insert(key);
                    }
                }
                Err(e) => {
                    println!("error: {name}: {e}");
                    valid = false;
                }
            }
        }

        for key in schema.keys() {
            if !seen.contains(key) {
                println!("warning: field '{key}' is not used by any document");
            }
        }
    }

    if valid {
        println!("OK");
    }
    Ok(valid)
}

/// Print the ordered field list of a template's configuration.
pub fn show_fields(dir: &Path) -> Result<()> {
    let config = find_config_file(dir)
        .with_context(|| format!("no configuration file found in {}", dir.display()))?;
    let schema = ConfigReader::new(config).load()?;

    for field in schema.iter() {
        let kind = if field.multiple { "multiple" } else { "single" };
        match &field.note {
            Some(note) => println!("{{{}}}  {}  ({kind})  - {note}", field.key, field.label),
            None => println!("{{{}}}  {}  ({kind})", field.key, field.label),
        }
    }
    println!(
        "{} field(s), {} multi-value",
        schema.len(),
        schema.multi_value_fields().len()
    );
    Ok(())
}

/// Fill a template's documents with the form data in `values_path`.
/// Returns whether every document succeeded.
pub fn fill_template(
    dir: &Path,
    values_path: &Path,
    output_dir: &Path,
    documents: &[String],
) -> Result<bool> {
    let config = find_config_file(dir)
        .with_context(|| format!("no configuration file found in {}", dir.display()))?;
    let schema = ConfigReader::new(config)
        .load()
        .context("configuration invalid, nothing filled")?;

    let raw = fs::read_to_string(values_path)
        .with_context(|| format!("cannot read form data: {}", values_path.display()))?;
    let values: FillRequest = serde_json::from_str(&raw)
        .with_context(|| format!("malformed form data: {}", values_path.display()))?;

    // The filler renders whatever it is given; mismatches with the
    // schema are only worth a warning here.
    for key in values.keys() {
        if schema.field(key).is_none() {
            tracing::warn!("Form data key '{key}' is not in the configuration");
        }
    }
    for field in schema.iter() {
        if !values.contains_key(&field.key) {
            tracing::warn!("Field '{}' has no value; its placeholders stay as-is", field.key);
        }
    }

    let documents = if documents.is_empty() {
        document_files(dir)
    } else {
        documents.to_vec()
    };
    if documents.is_empty() {
        bail!("no .docx documents found in {}", dir.display());
    }

    let outcome = fill_batch(dir, output_dir, &documents, &values);
    for result in &outcome.results {
        match (&result.output, &result.error) {
            (Some(output), _) => println!("filled: {}", output.display()),
            (None, Some(error)) => println!("failed: {}: {error}", result.document),
            (None, None) => {}
        }
    }

    let filled = outcome.results.iter().filter(|r| r.succeeded()).count();
    println!("{filled} of {} document(s) filled", outcome.results.len());
    Ok(outcome.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_find_config_file_prefers_default_name() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("alpha.csv"));
        touch(&dir.path().join("config.csv"));

        let found = find_config_file(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "config.csv");
    }

    #[test]
    fn test_find_config_file_falls_back_to_any_csv() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("fields.csv"));

        let found = find_config_file(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "fields.csv");
        assert!(find_config_file(&dir.path().join("nope")).is_none());
    }

    #[test]
    fn test_discover_templates() {
        let root = TempDir::new().unwrap();

        let contracts = root.path().join("contracts");
        fs::create_dir(&contracts).unwrap();
        touch(&contracts.join("config.csv"));
        touch(&contracts.join("letter.docx"));
        touch(&contracts.join("~$letter.docx"));
        touch(&contracts.join("notes.txt"));

        let invoices = root.path().join("invoices");
        fs::create_dir(&invoices).unwrap();
        touch(&invoices.join("invoice.docx"));

        fs::create_dir(root.path().join(".hidden")).unwrap();
        touch(&root.path().join("loose.docx"));

        let sets = discover_templates(root.path()).unwrap();
        assert_eq!(sets.len(), 2);

        assert_eq!(sets[0].name, "contracts");
        assert!(sets[0].config.is_some());
        assert_eq!(sets[0].documents, vec!["letter.docx"]);

        assert_eq!(sets[1].name, "invoices");
        assert!(sets[1].config.is_none());
        assert_eq!(sets[1].documents, vec!["invoice.docx"]);
    }

    #[test]
    fn test_discover_templates_missing_root() {
        let dir = TempDir::new().unwrap();
        assert!(discover_templates(&dir.path().join("absent")).is_err());
    }
}
