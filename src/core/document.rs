//! In-memory representation of a Word document template
//!
//! A `.docx` file is a zip container of XML parts. Substitution touches
//! the main body part plus every header and footer part; everything else
//! (styles, relationships, media) is carried through byte-for-byte.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use std::sync::OnceLock;

use regex_lite::Regex;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// The main body part of a document container.
const MAIN_PART: &str = "word/document.xml";

/// Reasons a file cannot be used as a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("cannot read template: {0}")]
    Read(#[from] io::Error),

    #[error("not a document container: {0}")]
    Container(#[from] zip::result::ZipError),

    #[error("missing document part: {0}")]
    MissingPart(&'static str),

    #[error("document part {0} is not valid UTF-8")]
    Encoding(String),
}

/// One zip entry of the container. Parts subject to substitution are
/// decoded up front so a malformed template fails before any output is
/// written.
enum Part {
    Text { name: String, xml: String },
    Raw { name: String, bytes: Vec<u8> },
}

impl Part {
    fn name(&self) -> &str {
        match self {
            Part::Text { name, .. } => name,
            Part::Raw { name, .. } => name,
        }
    }
}

/// A Word document template loaded into memory
pub struct Document {
    parts: Vec<Part>,
}

impl Document {
    /// Load a template from disk, verifying that it is a zip container
    /// with a main body part.
    pub fn open(path: &Path) -> Result<Self, TemplateError> {
        let bytes = fs::read(path)?;
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let mut parts = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;

            if is_substitution_part(&name) {
                let xml =
                    String::from_utf8(bytes).map_err(|_| TemplateError::Encoding(name.clone()))?;
                parts.push(Part::Text { name, xml });
            } else {
                parts.push(Part::Raw { name, bytes });
            }
        }

        if !parts.iter().any(|p| p.name() == MAIN_PART) {
            return Err(TemplateError::MissingPart(MAIN_PART));
        }

        Ok(Self { parts })
    }

    /// Replace every `{key}` token with its rendered value, across the
    /// body, all tables (nested included), and every header and footer.
    ///
    /// Word splits visible text across formatting runs, so matching works
    /// on each paragraph's concatenated text. A changed paragraph has the
    /// whole result assigned to its first text run and the remaining runs
    /// emptied; formatting inside a replaced span collapses to the first
    /// run's style. Keys absent from `replacements` are left as literal
    /// tokens.
    pub fn substitute(&mut self, replacements: &HashMap<String, String>) {
        if replacements.is_empty() {
            return;
        }
        for part in &mut self.parts {
            if let Part::Text { xml, .. } = part {
                *xml = substitute_part(xml, replacements);
            }
        }
    }

    /// Every distinct placeholder token present in the document, in
    /// order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for part in &self.parts {
            let Part::Text { xml, .. } = part else {
                continue;
            };
            for paragraph in paragraph_pattern().find_iter(xml) {
                let text = paragraph_text(paragraph.as_str());
                for capture in token_pattern().captures_iter(&text) {
                    let key = &capture[1];
                    if !found.iter().any(|k| k == key) {
                        found.push(key.to_string());
                    }
                }
            }
        }
        found
    }

    /// Full visible text of the document: one line per paragraph, in
    /// container part order.
    pub fn text(&self) -> String {
        let mut lines = Vec::new();
        for part in &self.parts {
            if let Part::Text { xml, .. } = part {
                for paragraph in paragraph_pattern().find_iter(xml) {
                    lines.push(paragraph_text(paragraph.as_str()));
                }
            }
        }
        lines.join("\n")
    }

    /// Write the container to disk. The output is assembled fully in
    /// memory first, so the file is either written whole or not at all.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let buffer = self.to_bytes().map_err(io::Error::other)?;
        fs::write(path, buffer)
    }

    fn to_bytes(&self) -> zip::result::ZipResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        // Fixed entry mtimes keep repeated fills of the same template
        // byte-identical.
        let options = SimpleFileOptions::default().last_modified_time(zip::DateTime::default());
        for part in &self.parts {
            writer.start_file(part.name(), options)?;
            match part {
                Part::Text { xml, .. } => writer.write_all(xml.as_bytes())?,
                Part::Raw { bytes, .. } => writer.write_all(bytes)?,
            }
        }
        Ok(writer.finish()?.into_inner())
    }
}

/// Body, headers, and footers are the parts substitution must reach.
/// Table cells live inside the body part.
fn is_substitution_part(name: &str) -> bool {
    name == MAIN_PART
        || ((name.starts_with("word/header") || name.starts_with("word/footer"))
            && name.ends_with(".xml"))
}

/// `<w:p>` elements never nest, so a non-greedy scan pairs each opening
/// tag with its own close.
fn paragraph_pattern() -> &'static Regex {
    static PARAGRAPH: OnceLock<Regex> = OnceLock::new();
    PARAGRAPH.get_or_init(|| {
        Regex::new(r"(?s)<w:p[ >].*?</w:p>").unwrap()
    })
}

/// Matches `<w:t>` elements (with or without attributes, self-closing
/// included) without touching `<w:tc>`, `<w:tab/>` and friends.
fn text_pattern() -> &'static Regex {
    static TEXT: OnceLock<Regex> = OnceLock::new();
    TEXT.get_or_init(|| {
        Regex::new(r"(?s)<w:t(?: [^>]*)?>(.*?)</w:t>|<w:t(?: [^>]*)?/>")
            .unwrap()
    })
}

/// A placeholder token: `{key}` with a well-formed key.
fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap()
    })
}

/// Concatenated text content of one paragraph's runs.
fn paragraph_text(paragraph: &str) -> String {
    let mut text = String::new();
    for capture in text_pattern().captures_iter(paragraph) {
        if let Some(content) = capture.get(1) {
            text.push_str(&unescape(content.as_str()));
        }
    }
    text
}

fn substitute_part(xml: &str, replacements: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut last = 0;
    for paragraph in paragraph_pattern().find_iter(xml) {
        out.push_str(&xml[last..paragraph.start()]);
        match substitute_paragraph(paragraph.as_str(), replacements) {
            Some(replaced) => out.push_str(&replaced),
            None => out.push_str(paragraph.as_str()),
        }
        last = paragraph.end();
    }
    out.push_str(&xml[last..]);
    out
}

/// Returns the rewritten paragraph, or `None` when nothing matched and
/// the paragraph (with all its run formatting) should stay untouched.
fn substitute_paragraph(paragraph: &str, replacements: &HashMap<String, String>) -> Option<String> {
    let text = paragraph_text(paragraph);
    if !text.contains('{') {
        return None;
    }

    // Single pass over the concatenated text: rendered values are never
    // re-scanned, so no placeholder can influence another's replacement.
    // Tokens without a value pass through as literal text.
    let replaced = token_pattern()
        .replace_all(&text, |capture: &regex_lite::Captures<'_>| {
            match replacements.get(&capture[1]) {
                Some(value) => value.clone(),
                None => capture[0].to_string(),
            }
        })
        .into_owned();
    if replaced == text {
        return None;
    }

    let mut first = true;
    let rewritten = text_pattern().replace_all(paragraph, |_: &regex_lite::Captures<'_>| {
        if first {
            first = false;
            format!("<w:t xml:space=\"preserve\">{}</w:t>", escape(&replaced))
        } else {
            "<w:t/>".to_string()
        }
    });
    Some(rewritten.into_owned())
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    // `&amp;` last, so "&amp;lt;" decodes to the literal "&lt;".
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
