//! Shared analysis pipeline used by the CLI front-end.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! plate map -> export parse -> blanking -> per-well fits -> summary
//!
//! Front-ends then focus on presentation (printing vs exports).

use std::path::Path;

use crate::domain::{AnalysisConfig, Dataset, PlateMapFormat, SummaryRow};
use crate::error::AppError;
use crate::fit::aggregate::{FitBatch, fit_dataset, summarize};
use crate::transform::apply_blanking;

/// All computed outputs of a single `wellkin analyze` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub dataset: Dataset,
    pub batch: FitBatch,
    pub summary: Vec<SummaryRow>,
}

/// Load the plate map and export, join them, and tag blank wells.
pub fn load_dataset(
    data_path: &Path,
    platemap_path: &Path,
    platemap_format: PlateMapFormat,
    experiment: String,
) -> Result<Dataset, AppError> {
    let platemap = crate::io::platemap::load_platemap(platemap_path, platemap_format)?;
    crate::io::reader::load_export(data_path, &platemap, &experiment)
}

/// Execute the full analysis pipeline and return the computed outputs.
pub fn run_analysis(config: &AnalysisConfig) -> Result<RunOutput, AppError> {
    let experiment = config.experiment.clone().unwrap_or_else(|| {
        config
            .data_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "experiment".to_string())
    });

    let mut dataset = load_dataset(
        &config.data_path,
        &config.platemap_path,
        config.platemap_format,
        experiment,
    )?;

    // Wells labeled with the blank-label name are blank wells even when the
    // plate map has no explicit Blank column.
    if !config.blank_label.is_empty() {
        for row in &mut dataset.rows {
            if row.blank.is_none() && row.label.as_deref() == Some(config.blank_label.as_str()) {
                row.blank = Some(config.blank_label.clone());
            }
        }
    }

    apply_blanking(&mut dataset);

    let batch = fit_dataset(&dataset, config.signal, config.time_cutoff);
    for (well, cause) in &batch.failures {
        log::warn!("well {well}: fit failed: {cause}");
    }
    log::info!(
        "fit {} wells ({} failures) in experiment '{}'",
        batch.fits.len(),
        batch.failures.len(),
        dataset.experiment
    );

    let summary = summarize(&batch.fits, config.label_order.as_deref());

    Ok(RunOutput {
        dataset,
        batch,
        summary,
    })
}
