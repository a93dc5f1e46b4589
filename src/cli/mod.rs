//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{CompileCommand, ValidateCommand};
use std::ffi::OsString;

/// Compile annotated Jupyter notebooks into Kubeflow pipelines
#[derive(Debug, Parser, Clone)]
#[command(name = "nbflow")]
#[command(version)]
#[command(about = "Compile annotated Jupyter notebooks into Kubeflow pipelines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the nbflow configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Compile a notebook into a pipeline script, optionally uploading and running it
    Compile(CompileCommand),

    /// Check a notebook and show the inferred step graph
    Validate(ValidateCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
