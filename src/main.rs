//! DocuFill - fills placeholder fields in Word document templates
//!
//! Thin command-line front end over the core config reader and document
//! filler.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docufill::app;

#[derive(Parser)]
#[command(name = "docufill", version, about = "Fill Word document templates from tabular configuration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List template sets under a templates directory
    List {
        /// Directory holding one subdirectory per template set
        templates_dir: PathBuf,
    },
    /// Validate a template's configuration and documents
    Validate {
        /// Template directory (configuration file + .docx documents)
        template_dir: PathBuf,
    },
    /// Show the field definitions of a template
    Fields {
        template_dir: PathBuf,
    },
    /// Fill a template's documents with form data
    Fill {
        template_dir: PathBuf,
        /// JSON file mapping field keys to a string or a list of strings
        #[arg(long)]
        values: PathBuf,
        /// Directory receiving the filled, timestamp-prefixed copies
        #[arg(long)]
        output: PathBuf,
        /// Fill only this document (repeatable; default: every .docx)
        #[arg(long = "document")]
        documents: Vec<String>,
    },
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Command::List { templates_dir } => {
            app::list_templates(&templates_dir)?;
            Ok(true)
        }
        Command::Validate { template_dir } => app::validate_template(&template_dir),
        Command::Fields { template_dir } => {
            app::show_fields(&template_dir)?;
            Ok(true)
        }
        Command::Fill {
            template_dir,
            values,
            output,
            documents,
        } => app::fill_template(&template_dir, &values, &output, &documents),
    }
}
