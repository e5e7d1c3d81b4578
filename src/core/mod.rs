//! Core functionality: field schema loading and document filling

pub mod document;
pub mod filler;
pub mod schema;

pub use document::{Document, TemplateError};
pub use filler::{fill_batch, fill_document, BatchOutcome, FillError, FillRequest, FillResult, FillValue};
pub use schema::{ConfigError, ConfigReader, FieldDescriptor, FieldSchema, ValidationReport};
