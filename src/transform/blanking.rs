//! Background subtraction using designated blank wells.
//!
//! For each (channel, read, timepoint) group the transform takes the mean
//! raw signal across blank-flagged wells, joins it back onto every row of
//! the group, and computes `blanked = value - blank_mean`.
//!
//! Contract details that matter downstream:
//!
//! - the transform is a no-op (dataset returned unchanged) when no row
//!   carries a blank flag, so callers need not special-case blankless plates
//! - rows whose group has no blank observation get `blank_mean = None`,
//!   which propagates to `blanked = None`; missing background is never
//!   silently treated as zero

use std::collections::HashMap;

use crate::domain::{Channel, Dataset};
use crate::math::mean;

/// Group key for the blank aggregate: channel + read index + timepoint.
///
/// Seconds are bit-keyed; all rows in a group come from the same parsed
/// read block, so their times are bit-identical. Repeated reads of the same
/// channel are separate blocks and must not share a background.
#[derive(PartialEq, Eq, Hash)]
struct GroupKey {
    channel: Channel,
    read: u32,
    seconds_bits: u64,
}

impl GroupKey {
    fn of(channel: Channel, read: u32, seconds: f64) -> Self {
        Self {
            channel,
            read,
            seconds_bits: seconds.to_bits(),
        }
    }
}

/// Apply background subtraction in place.
pub fn apply_blanking(dataset: &mut Dataset) {
    if !dataset.rows.iter().any(|r| r.blank.is_some()) {
        return;
    }

    // Mean raw signal over blank wells per (channel, read, time).
    let mut sums: HashMap<GroupKey, Vec<f64>> = HashMap::new();
    for row in &dataset.rows {
        if row.blank.is_none() {
            continue;
        }
        if let Some(value) = row.value {
            sums.entry(GroupKey::of(row.channel, row.read, row.seconds))
                .or_default()
                .push(value);
        }
    }
    let means: HashMap<GroupKey, f64> = sums
        .into_iter()
        .filter_map(|(key, values)| mean(&values).map(|m| (key, m)))
        .collect();

    for row in &mut dataset.rows {
        row.blank_mean = means
            .get(&GroupKey::of(row.channel, row.read, row.seconds))
            .copied();
        row.blanked = match (row.value, row.blank_mean) {
            (Some(v), Some(b)) => Some(v - b),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExportMeta, Measurement, Well};

    fn row(well: Well, seconds: f64, value: Option<f64>, blank: Option<&str>) -> Measurement {
        Measurement {
            well,
            channel: Channel { ex: 485, em: 528 },
            read: 1,
            seconds,
            temperature: None,
            value,
            label: Some("x".to_string()),
            blank: blank.map(str::to_string),
            blank_mean: None,
            blanked: None,
        }
    }

    fn dataset(rows: Vec<Measurement>) -> Dataset {
        Dataset {
            experiment: "t".to_string(),
            meta: ExportMeta::default(),
            layout: None,
            rows,
        }
    }

    #[test]
    fn noop_without_blank_wells() {
        let rows = vec![
            row(Well::new("A", 1), 0.0, Some(10.0), None),
            row(Well::new("A", 2), 0.0, Some(20.0), None),
        ];
        let mut ds = dataset(rows.clone());
        apply_blanking(&mut ds);

        for (before, after) in rows.iter().zip(ds.rows.iter()) {
            assert_eq!(before.value, after.value);
            assert_eq!(after.blank_mean, None);
            assert_eq!(after.blanked, None);
        }
    }

    #[test]
    fn subtracts_constant_blank_exactly() {
        let mut ds = dataset(vec![
            row(Well::new("A", 1), 0.0, Some(12.0), None),
            row(Well::new("A", 2), 0.0, Some(30.0), None),
            row(Well::new("H", 12), 0.0, Some(2.0), Some("BLK")),
            row(Well::new("A", 1), 60.0, Some(15.0), None),
            row(Well::new("H", 12), 60.0, Some(3.0), Some("BLK")),
        ]);
        apply_blanking(&mut ds);

        assert_eq!(ds.rows[0].blanked, Some(10.0));
        assert_eq!(ds.rows[1].blanked, Some(28.0));
        // Blank rows are blanked against their own group mean as well.
        assert_eq!(ds.rows[2].blanked, Some(0.0));
        assert_eq!(ds.rows[3].blanked, Some(12.0));
    }

    #[test]
    fn averages_multiple_blank_wells_per_group() {
        let mut ds = dataset(vec![
            row(Well::new("A", 1), 0.0, Some(10.0), None),
            row(Well::new("H", 11), 0.0, Some(1.0), Some("BLK")),
            row(Well::new("H", 12), 0.0, Some(3.0), Some("BLK")),
        ]);
        apply_blanking(&mut ds);
        assert_eq!(ds.rows[0].blank_mean, Some(2.0));
        assert_eq!(ds.rows[0].blanked, Some(8.0));
    }

    #[test]
    fn missing_group_mean_propagates_none() {
        // Blank exists at t=0 but not t=60: the t=60 row must stay None,
        // not fall back to zero.
        let mut ds = dataset(vec![
            row(Well::new("H", 12), 0.0, Some(2.0), Some("BLK")),
            row(Well::new("A", 1), 0.0, Some(12.0), None),
            row(Well::new("A", 1), 60.0, Some(15.0), None),
        ]);
        apply_blanking(&mut ds);
        assert_eq!(ds.rows[1].blanked, Some(10.0));
        assert_eq!(ds.rows[2].blank_mean, None);
        assert_eq!(ds.rows[2].blanked, None);
    }

    #[test]
    fn repeated_reads_keep_separate_backgrounds() {
        // Same channel and timepoint, different read index: the second
        // read has no blank observation, so it must not borrow the first
        // read's background.
        let mut second = row(Well::new("A", 1), 0.0, Some(12.0), None);
        second.read = 2;
        let mut ds = dataset(vec![
            row(Well::new("H", 12), 0.0, Some(2.0), Some("BLK")),
            row(Well::new("A", 1), 0.0, Some(12.0), None),
            second,
        ]);
        apply_blanking(&mut ds);

        assert_eq!(ds.rows[1].blanked, Some(10.0));
        assert_eq!(ds.rows[2].blank_mean, None);
        assert_eq!(ds.rows[2].blanked, None);
    }

    #[test]
    fn overflow_values_stay_missing_after_blanking() {
        let mut ds = dataset(vec![
            row(Well::new("H", 12), 0.0, Some(2.0), Some("BLK")),
            row(Well::new("A", 1), 0.0, None, None),
        ]);
        apply_blanking(&mut ds);
        assert_eq!(ds.rows[1].blank_mean, Some(2.0));
        assert_eq!(ds.rows[1].blanked, None);
    }
}
