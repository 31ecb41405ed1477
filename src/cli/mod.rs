//! Command-line parsing for the plate kinetic analysis tool.
//!
//! The goal of this module is to keep **argument parsing** and **command
//! dispatch** separate from the parsing/fitting code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{PlateMapFormat, SignalSource};
use crate::fit::aggregate::DEFAULT_TIME_CUTOFF;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "wellkin", version, about = "Plate-reader kinetic assay analysis")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse an export, apply blanking, fit every well, and print the summary.
    Analyze(AnalyzeArgs),
    /// Parse an export and write the long-form measurement table (no fitting).
    Parse(ParseArgs),
}

/// Common input options shared by all commands.
#[derive(Debug, Parser, Clone)]
pub struct InputArgs {
    /// Plate-reader export file (latin-1 text).
    #[arg(short = 'd', long = "data", value_name = "FILE")]
    pub data: PathBuf,

    /// Plate map file (tab-separated; tall or grid layout).
    #[arg(short = 'p', long = "platemap", value_name = "FILE")]
    pub platemap: PathBuf,

    /// Plate map layout.
    #[arg(long, value_enum, default_value_t = PlateMapFormat::Auto)]
    pub platemap_format: PlateMapFormat,

    /// Experiment name (defaults to the data file stem).
    #[arg(long)]
    pub experiment: Option<String>,

    /// Plate-map label that marks blank wells.
    #[arg(long, default_value = "Blank")]
    pub blank_label: String,
}

/// Options for the full analysis pipeline.
#[derive(Debug, Parser, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Signal column fed to the fitter.
    #[arg(long, value_enum, default_value_t = SignalSource::Auto)]
    pub signal: SignalSource,

    /// Exclude timepoints at or beyond this many seconds.
    #[arg(long, default_value_t = DEFAULT_TIME_CUTOFF)]
    pub time_cutoff: f64,

    /// Comma-separated label order for the summary (reconciliation, not a
    /// filter: absent labels produce empty rows, extras are dropped).
    #[arg(long, value_delimiter = ',')]
    pub label_order: Option<Vec<String>>,

    /// Export the per-well summary to CSV.
    #[arg(long = "export-summary", value_name = "CSV")]
    pub export_summary: Option<PathBuf>,

    /// Export full fit output (params + fitted series + scalars) to JSON.
    #[arg(long = "export-fits", value_name = "JSON")]
    pub export_fits: Option<PathBuf>,
}

/// Options for export parsing only.
#[derive(Debug, Parser, Clone)]
pub struct ParseArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Write the long-form measurement table to CSV (prints row counts when
    /// omitted).
    #[arg(short = 'o', long = "out", value_name = "CSV")]
    pub out: Option<PathBuf>,
}
