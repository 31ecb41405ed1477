//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads the plate map and reader export
//! - runs blanking + per-well fitting
//! - prints reports
//! - writes optional exports

use clap::Parser;

use crate::cli::{AnalyzeArgs, Command, InputArgs, ParseArgs};
use crate::domain::AnalysisConfig;
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `wellkin` binary.
pub fn run() -> Result<(), AppError> {
    env_logger::init();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Parse(args) => handle_parse(args),
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(&args);
    let run = pipeline::run_analysis(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&run.dataset, &run.batch)
    );
    println!("{}", crate::report::format_summary_table(&run.summary));

    if let Some(path) = &config.export_summary {
        crate::io::export::write_summary_csv(path, &run.summary)?;
    }
    if let Some(path) = &config.export_fits {
        crate::io::export::write_fits_json(path, &run.batch.fits)?;
    }

    Ok(())
}

fn handle_parse(args: ParseArgs) -> Result<(), AppError> {
    let dataset = pipeline::load_dataset(
        &args.input.data,
        &args.input.platemap,
        args.input.platemap_format,
        experiment_name(&args.input),
    )?;

    match &args.out {
        Some(path) => crate::io::export::write_long_csv(path, &dataset)?,
        None => {
            println!(
                "{} rows parsed from '{}'",
                dataset.rows.len(),
                args.input.data.display()
            );
        }
    }
    Ok(())
}

pub fn analysis_config_from_args(args: &AnalyzeArgs) -> AnalysisConfig {
    AnalysisConfig {
        data_path: args.input.data.clone(),
        platemap_path: args.input.platemap.clone(),
        platemap_format: args.input.platemap_format,
        experiment: args.input.experiment.clone(),
        blank_label: args.input.blank_label.clone(),
        signal: args.signal,
        time_cutoff: args.time_cutoff,
        label_order: args.label_order.clone(),
        export_summary: args.export_summary.clone(),
        export_fits: args.export_fits.clone(),
    }
}

fn experiment_name(input: &InputArgs) -> String {
    input.experiment.clone().unwrap_or_else(|| {
        input
            .data
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "experiment".to_string())
    })
}
