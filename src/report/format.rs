//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the parsing/fitting code stays clean and testable
//! - output changes are localized (important for future snapshot tests)

use crate::domain::{Dataset, SummaryRow};
use crate::fit::aggregate::FitBatch;

/// Format the run header: experiment, metadata, dataset shape.
pub fn format_run_summary(dataset: &Dataset, batch: &FitBatch) -> String {
    let mut out = String::new();

    out.push_str("=== wellkin - plate kinetic analysis ===\n");
    out.push_str(&format!("Experiment: {}\n", dataset.experiment));
    if let Some(date) = dataset.meta.date {
        out.push_str(&format!("Read date: {date}"));
        if let Some(time) = dataset.meta.time {
            out.push_str(&format!(" {time}"));
        }
        out.push('\n');
    }

    let n_wells = {
        let mut wells: Vec<_> = dataset.rows.iter().map(|r| &r.well).collect();
        wells.sort();
        wells.dedup();
        wells.len()
    };
    let channels = {
        let mut chans: Vec<_> = dataset.rows.iter().map(|r| r.channel).collect();
        chans.sort();
        chans.dedup();
        chans
    };
    out.push_str(&format!(
        "Measurements: {} rows | {} wells | channels: {}\n",
        dataset.rows.len(),
        n_wells,
        channels
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    ));

    out.push_str(&format!(
        "Signal: {:?} | fits: {} ok, {} failed\n",
        batch.signal_used,
        batch.fits.len(),
        batch.failures.len()
    ));
    for (well, cause) in &batch.failures {
        out.push_str(&format!("  (no fit for {well}) {cause}\n"));
    }
    out.push('\n');

    out
}

/// Format the per-well summary table.
pub fn format_summary_table(summary: &[SummaryRow]) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "{:<6} {:<20} {:>10} {:>10} {:>10} {:>10} {:>12} {:>12}\n",
        "Well", "Label", "maxV", "maxV_t", "lag_t", "growth_t", "ss_t", "ss_signal"
    ));

    for row in summary {
        let well = row
            .well
            .as_ref()
            .map(|w| w.to_string())
            .unwrap_or_else(|| "-".to_string());
        let label = row.label.as_deref().unwrap_or("-");

        match &row.scalars {
            Some(s) => {
                out.push_str(&format!(
                    "{:<6} {:<20} {:>10.4} {:>10.0} {:>10.0} {:>10.0} {:>12.0} {:>12.2}\n",
                    well,
                    label,
                    s.max_v,
                    s.max_v_time,
                    s.lag_time,
                    s.growth_time,
                    s.steady_state_time,
                    s.steady_state_signal
                ));
            }
            None => {
                out.push_str(&format!(
                    "{well:<6} {label:<20} {:>10} {:>10} {:>10} {:>10} {:>12} {:>12}\n",
                    "-", "-", "-", "-", "-", "-"
                ));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{KineticScalars, Well};

    #[test]
    fn summary_table_marks_placeholder_rows() {
        let rows = vec![
            SummaryRow {
                label: Some("x".to_string()),
                well: Some(Well::new("A", 1)),
                scalars: Some(KineticScalars {
                    max_v: 0.1,
                    max_v_time: 100.0,
                    max_v_signal: 5.0,
                    lag_time: 50.0,
                    growth_time: 150.0,
                    steady_state_time: 300.0,
                    steady_state_signal: 9.0,
                    low_decile: 0.5,
                    high_decile: 8.5,
                }),
            },
            SummaryRow {
                label: Some("gone".to_string()),
                well: None,
                scalars: None,
            },
        ];

        let table = format_summary_table(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("A1"));
        assert!(lines[2].contains("gone"));
        assert!(lines[2].contains('-'));
    }
}
