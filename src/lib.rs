//! DocuFill - fills placeholder fields in Word document templates
//!
//! Field definitions come from a tabular configuration file; values come
//! from form data collected by a front end. The core substitutes `{key}`
//! tokens across every structural region of each template and writes
//! timestamped output copies.

pub mod app;
pub mod core;
