//! Per-well fan-out / fan-in over a dataset.
//!
//! The aggregator is an explicit map-then-reduce: a pure
//! `fit_well(series) -> Result<WellFit, FitFailure>` applied independently to
//! every well group (parallel via rayon), with results collected back in
//! well-key order. Output ordering never depends on completion order, and no
//! state is shared between well fits.
//!
//! Per-well failures are soft: they are reported alongside the successful
//! fits and logged by the caller, never aborting the batch.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::domain::{Channel, Dataset, KineticScalars, SignalSource, SummaryRow, Well, WellFit};
use crate::fit::fitter::{FitFailure, fit_sigmoid};
use crate::fit::kinetics::derive_scalars;

/// Default late-time cutoff (seconds); excludes end-of-run artifacts.
pub const DEFAULT_TIME_CUTOFF: f64 = 12000.0;

/// Result of fitting every well in a dataset.
#[derive(Debug, Clone)]
pub struct FitBatch {
    /// Successful fits, ordered by well key.
    pub fits: Vec<WellFit>,
    /// Wells excluded by a soft fit failure, with the cause.
    pub failures: Vec<(Well, FitFailure)>,
    /// Signal source actually used after resolving `SignalSource::Auto`.
    pub signal_used: SignalSource,
}

/// One extracted series, ready to fit: a well on one (channel, read).
#[derive(Debug, Clone)]
struct WellSeries {
    well: Well,
    label: Option<String>,
    channel: Channel,
    read: u32,
    seconds: Vec<f64>,
    signal: Vec<f64>,
}

/// Fit a single well's time-ordered series.
pub fn fit_well(
    well: Well,
    label: Option<String>,
    channel: Channel,
    read: u32,
    seconds: Vec<f64>,
    signal: Vec<f64>,
) -> Result<WellFit, FitFailure> {
    let fit = fit_sigmoid(&seconds, &signal)?;
    let scalars = derive_scalars(&seconds, &signal)?;

    Ok(WellFit {
        well,
        label,
        channel,
        read,
        seconds,
        signal,
        fitted: fit.fitted,
        params: fit.params,
        scalars,
    })
}

/// Fit every non-blank well in the dataset.
///
/// Rows at or beyond `time_cutoff` seconds, blank wells, and missing values
/// are excluded before grouping. Wells whose fit fails contribute to
/// `failures` instead of `fits`.
pub fn fit_dataset(dataset: &Dataset, signal: SignalSource, time_cutoff: f64) -> FitBatch {
    let signal_used = resolve_signal(dataset, signal);
    let groups = group_by_well(dataset, signal_used, time_cutoff);

    // Each group is independent; fan out across threads, then partition by
    // outcome. `groups` is already in well-key order and `collect` preserves it.
    let outcomes: Vec<Result<WellFit, (Well, FitFailure)>> = groups
        .into_par_iter()
        .map(|series| {
            let well = series.well.clone();
            fit_well(
                series.well,
                series.label,
                series.channel,
                series.read,
                series.seconds,
                series.signal,
            )
            .map_err(|e| (well, e))
        })
        .collect();

    let mut fits = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(fit) => fits.push(fit),
            Err(pair) => failures.push(pair),
        }
    }

    FitBatch {
        fits,
        failures,
        signal_used,
    }
}

/// Collapse each fit to its scalar set, one summary row per well.
///
/// With `label_order` supplied, the summary is reconciled against that order:
/// each ordered label yields its matching row (or an all-missing placeholder
/// when absent from the data) and unordered extras are dropped.
pub fn summarize(fits: &[WellFit], label_order: Option<&[String]>) -> Vec<SummaryRow> {
    let rows: Vec<SummaryRow> = fits
        .iter()
        .map(|f| SummaryRow {
            label: f.label.clone(),
            well: Some(f.well.clone()),
            scalars: Some(project_scalars(&f.scalars)),
        })
        .collect();

    let Some(order) = label_order else {
        return rows;
    };

    order
        .iter()
        .map(|label| {
            rows.iter()
                .find(|r| r.label.as_deref() == Some(label.as_str()))
                .cloned()
                .unwrap_or_else(|| SummaryRow {
                    label: Some(label.clone()),
                    well: None,
                    scalars: None,
                })
        })
        .collect()
}

/// Named-field projection of the scalar set.
///
/// Listing every field here (rather than copying the struct wholesale) keeps
/// the summary surface explicit: adding a per-fit diagnostic to
/// `KineticScalars` forces a decision about whether summaries carry it.
fn project_scalars(s: &KineticScalars) -> KineticScalars {
    KineticScalars {
        max_v: s.max_v,
        max_v_time: s.max_v_time,
        max_v_signal: s.max_v_signal,
        lag_time: s.lag_time,
        growth_time: s.growth_time,
        steady_state_time: s.steady_state_time,
        steady_state_signal: s.steady_state_signal,
        low_decile: s.low_decile,
        high_decile: s.high_decile,
    }
}

fn resolve_signal(dataset: &Dataset, signal: SignalSource) -> SignalSource {
    match signal {
        SignalSource::Auto => {
            if dataset.rows.iter().any(|r| r.blanked.is_some()) {
                SignalSource::Blanked
            } else {
                SignalSource::Raw
            }
        }
        other => other,
    }
}

/// Group rows into fit series keyed by (well, channel, read).
///
/// One well measured on two channels, or twice on the same channel, yields
/// separate series; merging them would interleave unrelated signals under
/// duplicated timepoints.
fn group_by_well(dataset: &Dataset, signal: SignalSource, time_cutoff: f64) -> Vec<WellSeries> {
    let mut groups: BTreeMap<(Well, Channel, u32), WellSeries> = BTreeMap::new();

    for row in &dataset.rows {
        if row.blank.is_some() || row.seconds >= time_cutoff {
            continue;
        }
        let value = match signal {
            SignalSource::Blanked => row.blanked,
            SignalSource::Raw | SignalSource::Auto => row.value,
        };
        let Some(value) = value else { continue };

        let entry = groups
            .entry((row.well.clone(), row.channel, row.read))
            .or_insert_with(|| WellSeries {
                well: row.well.clone(),
                label: row.label.clone(),
                channel: row.channel,
                read: row.read,
                seconds: Vec::new(),
                signal: Vec::new(),
            });
        entry.seconds.push(row.seconds);
        entry.signal.push(value);
    }

    let mut out: Vec<WellSeries> = groups.into_values().collect();
    for series in &mut out {
        sort_series(series);
    }
    out
}

/// Sort one series by time. Parser output is time-ordered per read block,
/// but callers may assemble datasets from other sources.
fn sort_series(series: &mut WellSeries) {
    let mut idx: Vec<usize> = (0..series.seconds.len()).collect();
    idx.sort_by(|&a, &b| {
        series.seconds[a]
            .partial_cmp(&series.seconds[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    series.seconds = idx.iter().map(|&i| series.seconds[i]).collect();
    series.signal = idx.iter().map(|&i| series.signal[i]).collect();
}
