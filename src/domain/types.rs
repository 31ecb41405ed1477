//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later for plotting or comparisons

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One assay position on a plate, identified by row letter(s) + column number.
///
/// Two textual forms are accepted everywhere a well token is parsed:
///
/// - compact: `A1`, `H12` (letter run followed by digit run)
/// - separated: `A:1`, `H:12` (the form grid plate maps synthesize)
///
/// `Ord` is derived so grouped output is deterministically ordered by
/// (row, column) regardless of completion order during parallel fitting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Well {
    pub row: String,
    pub column: u32,
}

impl Well {
    pub fn new(row: impl Into<String>, column: u32) -> Self {
        Self {
            row: row.into(),
            column,
        }
    }

    /// Parse a well token in either accepted form.
    ///
    /// Fails with a structural error for anything else (e.g. `1A`, `A`, `A:B`),
    /// since a mistyped well silently dropped from a join is much worse than a
    /// loud abort.
    pub fn parse(token: &str) -> Result<Self, AppError> {
        let token = token.trim();

        if let Some((row, col)) = token.split_once(':') {
            let row = row.trim();
            let col = col.trim();
            if !row.is_empty() && row.chars().all(|c| c.is_ascii_alphabetic()) {
                if let Ok(column) = col.parse::<u32>() {
                    return Ok(Self::new(row.to_ascii_uppercase(), column));
                }
            }
            return Err(AppError::input(format!(
                "Invalid well token '{token}': expected '<row>:<column>' (e.g. 'A:1')."
            )));
        }

        let letters: String = token.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        let digits = &token[letters.len()..];
        if letters.is_empty() || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::input(format!(
                "Invalid well token '{token}': expected '<letters><digits>' (e.g. 'A1')."
            )));
        }
        let column = digits.parse::<u32>().map_err(|_| {
            AppError::input(format!("Invalid well column in token '{token}'."))
        })?;
        Ok(Self::new(letters.to_ascii_uppercase(), column))
    }
}

impl std::fmt::Display for Well {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.row, self.column)
    }
}

/// One excitation/emission wavelength pair measured across time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub ex: u32,
    pub em: u32,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.ex, self.em)
    }
}

/// One plate-map assignment: a well, its construct label, and an optional
/// blank marker (any non-empty value in the `Blank` column).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateEntry {
    pub well: Well,
    pub label: String,
    pub blank: Option<String>,
}

/// Well → label mapping. Built once by a loader, read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlateMap {
    pub entries: Vec<PlateEntry>,
}

impl PlateMap {
    pub fn get(&self, well: &Well) -> Option<&PlateEntry> {
        self.entries.iter().find(|e| &e.well == well)
    }

    /// Whether any entry carries a blank marker.
    ///
    /// The blanking transform is a no-op when this is false.
    pub fn has_blanks(&self) -> bool {
        self.entries.iter().any(|e| e.blank.is_some())
    }
}

/// One long-format measurement row: (well, channel, timepoint).
///
/// `value: None` encodes the vendor overflow sentinel (`OVRFLW`) or an empty
/// cell; it never collapses to 0. `blank_mean`/`blanked` are filled by the
/// blanking transform and stay `None` until it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    pub well: Well,
    pub channel: Channel,
    /// 1-based read index, disambiguating repeated reads of the same
    /// channel (`485,528` vs `485,528[2]`).
    pub read: u32,
    /// Elapsed time since the start of the read, in seconds.
    pub seconds: f64,
    pub temperature: Option<f64>,
    pub value: Option<f64>,

    /// Construct label from the plate map (`None` for unmapped wells).
    pub label: Option<String>,
    /// Blank marker from the plate map (`Some` means this is a blank well).
    pub blank: Option<String>,

    pub blank_mean: Option<f64>,
    pub blanked: Option<f64>,
}

/// Metadata captured from the free-form header region of a reader export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportMeta {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    /// All `key<TAB>value` header lines, in file order.
    pub fields: Vec<(String, String)>,
}

/// A parsed reader export joined against its plate map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub experiment: String,
    pub meta: ExportMeta,
    /// Plate layout embedded in the export itself (informational; the
    /// user-supplied plate map is authoritative).
    pub layout: Option<PlateMap>,
    pub rows: Vec<Measurement>,
}

/// Which signal column the fitter consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    /// Prefer blanked values when the blanking transform produced them,
    /// else raw.
    Auto,
    Raw,
    Blanked,
}

/// Plate-map file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlateMapFormat {
    /// Detect from the first header cell (`Well` → tall, otherwise grid).
    Auto,
    /// Tab-separated file with explicit `Well`/`Label` columns.
    Tall,
    /// Rows × columns matrix of labels, melted into long form.
    Grid,
}

/// Fitted three-parameter logistic: `f(t) = L / (1 + exp(-k (t - x0)))`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SigmoidParams {
    /// Saturation level.
    pub l: f64,
    /// Growth rate.
    pub k: f64,
    /// Midpoint time (seconds).
    pub x0: f64,
}

/// Derived kinetic landmarks for one well.
///
/// All of these are computed from the *observed* series (not the fitted
/// curve) for robustness to mediocre fits. Field names are the contract
/// surface downstream tooling (plot renderers, spreadsheets) binds to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KineticScalars {
    /// Maximum local velocity (signal units per second).
    pub max_v: f64,
    /// Time at which the maximum velocity occurs.
    pub max_v_time: f64,
    /// Observed signal at the maximum-velocity timepoint.
    pub max_v_signal: f64,
    /// x-intercept of the max-velocity tangent line.
    pub lag_time: f64,
    /// Time at which the tangent line crosses the 95th percentile.
    pub growth_time: f64,
    /// First time the signal exceeds the 95th percentile.
    pub steady_state_time: f64,
    /// Mean signal from the steady-state crossing to the end of the series.
    pub steady_state_signal: f64,
    /// 5th percentile of observed signal.
    pub low_decile: f64,
    /// 95th percentile of observed signal.
    pub high_decile: f64,
}

/// Complete fit output for one well: the input series, the fitted curve
/// aligned to it, and the derived scalar set.
///
/// Either fully populated or absent; a failed fit contributes no `WellFit`
/// at all, never a partial one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellFit {
    pub well: Well,
    pub label: Option<String>,
    /// Channel and read index of the series this fit came from; one well
    /// contributes one fit per (channel, read) it was measured on.
    pub channel: Channel,
    pub read: u32,
    pub seconds: Vec<f64>,
    pub signal: Vec<f64>,
    pub fitted: Vec<f64>,
    pub params: SigmoidParams,
    pub scalars: KineticScalars,
}

/// One summary row per well, collapsing the per-timepoint fit output to its
/// scalar set.
///
/// `well`/`scalars` are `None` only for placeholder rows introduced by
/// label-order reconciliation (an ordered label absent from the data).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRow {
    pub label: Option<String>,
    pub well: Option<Well>,
    pub scalars: Option<KineticScalars>,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub data_path: PathBuf,
    pub platemap_path: PathBuf,
    pub platemap_format: PlateMapFormat,

    /// Experiment name attached to the dataset (defaults to the data file stem).
    pub experiment: Option<String>,

    /// Plate-map column marking blank wells.
    pub blank_label: String,
    pub signal: SignalSource,

    /// Exclude timepoints at or beyond this many seconds (late-time artifacts).
    pub time_cutoff: f64,

    /// Optional explicit label ordering for the summary.
    pub label_order: Option<Vec<String>>,

    pub export_summary: Option<PathBuf>,
    pub export_fits: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_parses_compact_form() {
        let w = Well::parse("B12").unwrap();
        assert_eq!(w, Well::new("B", 12));
    }

    #[test]
    fn well_parses_separated_form() {
        let w = Well::parse("b:7").unwrap();
        assert_eq!(w, Well::new("B", 7));
        assert_eq!(w.to_string(), "B7");
    }

    #[test]
    fn well_rejects_malformed_tokens() {
        for bad in ["1A", "A", "12", "A:B", ":3", "A1B"] {
            assert!(Well::parse(bad).is_err(), "should reject '{bad}'");
        }
    }

    #[test]
    fn well_ordering_is_row_then_column() {
        let mut wells = vec![
            Well::new("B", 1),
            Well::new("A", 10),
            Well::new("A", 2),
        ];
        wells.sort();
        assert_eq!(wells[0], Well::new("A", 2));
        assert_eq!(wells[1], Well::new("A", 10));
        assert_eq!(wells[2], Well::new("B", 1));
    }
}
