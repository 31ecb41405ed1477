//! Result exports.
//!
//! Three surfaces, all meant to be easy to consume in spreadsheets or
//! downstream scripts:
//!
//! - summary CSV: one row per well, scalar landmarks only
//! - long-table CSV: one row per (well, channel, timepoint) measurement
//! - fits JSON: full per-well fit output (params + fitted series + scalars),
//!   the stable surface an external plot renderer binds to

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{Dataset, SummaryRow, WellFit};
use crate::error::AppError;

/// Write the per-well summary to a CSV file.
pub fn write_summary_csv(path: &Path, summary: &[SummaryRow]) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::input(format!(
            "Failed to create summary CSV '{}': {e}",
            path.display()
        ))
    })?;
    let mut writer = csv::Writer::from_writer(file);

    writer
        .write_record([
            "well",
            "label",
            "max_v",
            "max_v_time",
            "max_v_signal",
            "lag_time",
            "growth_time",
            "steady_state_time",
            "steady_state_signal",
            "low_decile",
            "high_decile",
        ])
        .map_err(|e| AppError::input(format!("Failed to write summary CSV header: {e}")))?;

    for row in summary {
        let well = row.well.as_ref().map(|w| w.to_string()).unwrap_or_default();
        let label = row.label.clone().unwrap_or_default();
        let scalars = match &row.scalars {
            Some(s) => vec![
                fmt_f64(s.max_v),
                fmt_f64(s.max_v_time),
                fmt_f64(s.max_v_signal),
                fmt_f64(s.lag_time),
                fmt_f64(s.growth_time),
                fmt_f64(s.steady_state_time),
                fmt_f64(s.steady_state_signal),
                fmt_f64(s.low_decile),
                fmt_f64(s.high_decile),
            ],
            // Placeholder row from label-order reconciliation.
            None => vec![String::new(); 9],
        };

        let mut record = vec![well, label];
        record.extend(scalars);
        writer
            .write_record(&record)
            .map_err(|e| AppError::input(format!("Failed to write summary CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush summary CSV: {e}")))?;
    Ok(())
}

/// Write the long-form measurement table to a CSV file.
pub fn write_long_csv(path: &Path, dataset: &Dataset) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::input(format!(
            "Failed to create long-table CSV '{}': {e}",
            path.display()
        ))
    })?;
    let mut writer = csv::Writer::from_writer(file);

    writer
        .write_record([
            "experiment",
            "well",
            "row",
            "column",
            "label",
            "blank",
            "ex",
            "em",
            "read",
            "seconds",
            "temperature",
            "value",
            "blank_mean",
            "blanked",
        ])
        .map_err(|e| AppError::input(format!("Failed to write long-table CSV header: {e}")))?;

    for m in &dataset.rows {
        writer
            .write_record([
                dataset.experiment.clone(),
                m.well.to_string(),
                m.well.row.clone(),
                m.well.column.to_string(),
                m.label.clone().unwrap_or_default(),
                m.blank.clone().unwrap_or_default(),
                m.channel.ex.to_string(),
                m.channel.em.to_string(),
                m.read.to_string(),
                fmt_f64(m.seconds),
                m.temperature.map(fmt_f64).unwrap_or_default(),
                m.value.map(fmt_f64).unwrap_or_default(),
                m.blank_mean.map(fmt_f64).unwrap_or_default(),
                m.blanked.map(fmt_f64).unwrap_or_default(),
            ])
            .map_err(|e| AppError::input(format!("Failed to write long-table CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush long-table CSV: {e}")))?;
    Ok(())
}

/// Write the full per-well fit output to a JSON file.
pub fn write_fits_json(path: &Path, fits: &[WellFit]) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::input(format!(
            "Failed to create fits JSON '{}': {e}",
            path.display()
        ))
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, fits)
        .map_err(|e| AppError::input(format!("Failed to serialize fits JSON: {e}")))?;
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush fits JSON: {e}")))?;
    Ok(())
}

fn fmt_f64(v: f64) -> String {
    format!("{v:.6}")
}
