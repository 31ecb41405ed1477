//! Plate-map loading and normalization.
//!
//! Two layouts are supported:
//!
//! - **tall**: explicit `Well` and `Label` columns (optional `Blank`); well
//!   tokens may be `A1`-style or `A:1`-style
//! - **grid**: a rows × columns matrix of labels (header row = column
//!   numbers, first cell of each data row = row letter), melted into long
//!   form with empty cells dropped
//!
//! Either layout can arrive as a tab-separated text file or as a spreadsheet
//! workbook (`.xlsx`/`.xls`/`.ods`, first sheet); the container is chosen by
//! file extension, and both feed the same layout detection and parsers.
//!
//! Design goals (shared with the rest of `io`):
//! - **Strict schema** for required fields (clear errors + exit code 2)
//! - **Deterministic behavior** (no hidden inference beyond documented
//!   format auto-detection)

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use csv::StringRecord;

use crate::domain::{PlateEntry, PlateMap, PlateMapFormat, Well};
use crate::error::AppError;

/// Load a plate map, auto-detecting the layout unless one is forced.
pub fn load_platemap(path: &Path, format: PlateMapFormat) -> Result<PlateMap, AppError> {
    let records = if is_workbook_path(path) {
        read_workbook_records(path)?
    } else {
        read_text_records(path)?
    };

    if records.is_empty() {
        return Err(AppError::no_data(format!(
            "Plate map '{}' is empty.",
            path.display()
        )));
    }

    let format = match format {
        PlateMapFormat::Auto => detect_format(&records[0]),
        other => other,
    };

    match format {
        PlateMapFormat::Tall => parse_tall(&records),
        PlateMapFormat::Grid => parse_grid(&records),
        PlateMapFormat::Auto => unreachable!("auto resolved above"),
    }
}

fn is_workbook_path(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref(),
        Some("xlsx" | "xlsm" | "xls" | "xlsb" | "ods")
    )
}

fn read_text_records(path: &Path) -> Result<Vec<StringRecord>, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::input(format!("Failed to open plate map '{}': {e}", path.display()))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .trim(csv::Trim::All)
        .has_headers(false)
        .from_reader(file);

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            AppError::input(format!(
                "Failed to read plate map '{}' line {}: {e}",
                path.display(),
                idx + 1
            ))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Read the first sheet of a spreadsheet workbook as string records.
fn read_workbook_records(path: &Path) -> Result<Vec<StringRecord>, AppError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        AppError::input(format!("Failed to open plate map '{}': {e}", path.display()))
    })?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            AppError::no_data(format!("Plate map '{}' has no sheets.", path.display()))
        })?
        .map_err(|e| {
            AppError::input(format!("Failed to read plate map '{}': {e}", path.display()))
        })?;

    let records = range
        .rows()
        .map(|row| StringRecord::from(row.iter().map(workbook_cell_text).collect::<Vec<_>>()))
        .collect();
    Ok(records)
}

/// Render one workbook cell the way its text-file counterpart would read.
///
/// Spreadsheets store grid column headers as floats; whole numbers are
/// rendered without the trailing `.0` so they parse as column numbers.
fn workbook_cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.is_finite() && f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// A first header cell of `Well` selects the tall layout; anything else is
/// treated as the grid corner cell.
fn detect_format(header: &StringRecord) -> PlateMapFormat {
    match header.get(0) {
        Some(cell) if cell.eq_ignore_ascii_case("well") => PlateMapFormat::Tall,
        _ => PlateMapFormat::Grid,
    }
}

/// Parse the tall layout: header row naming columns, one well per data row.
pub fn parse_tall(records: &[StringRecord]) -> Result<PlateMap, AppError> {
    let header = &records[0];
    let header_map: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect();

    let well_idx = *header_map
        .get("well")
        .ok_or_else(|| AppError::input("Plate map is missing required column: `Well`"))?;
    let label_idx = *header_map
        .get("label")
        .ok_or_else(|| AppError::input("Plate map is missing required column: `Label`"))?;
    let blank_idx = header_map.get("blank").copied();

    let mut entries = Vec::new();
    for (idx, record) in records.iter().enumerate().skip(1) {
        let line = idx + 1;
        let token = record
            .get(well_idx)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::input(format!("Plate map line {line}: missing `Well` value."))
            })?;
        let well = Well::parse(token)
            .map_err(|e| AppError::input(format!("Plate map line {line}: {e}")))?;

        let label = record
            .get(label_idx)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::input(format!("Plate map line {line}: missing `Label` value."))
            })?
            .to_string();

        let blank = blank_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        entries.push(PlateEntry { well, label, blank });
    }

    ensure_unique_wells(&entries)?;
    Ok(PlateMap { entries })
}

/// Parse the grid layout and melt it to long form.
///
/// Wells are synthesized as `{row}:{column}` and run through the same token
/// parser as the tall layout, so both paths normalize identically.
pub fn parse_grid(records: &[StringRecord]) -> Result<PlateMap, AppError> {
    let header = &records[0];
    if header.len() < 2 {
        return Err(AppError::input(
            "Grid plate map header must name at least one column.",
        ));
    }

    // Header cells after the corner are the plate column numbers.
    let mut columns = Vec::with_capacity(header.len() - 1);
    for cell in header.iter().skip(1) {
        let column = cell.trim().parse::<u32>().map_err(|_| {
            AppError::input(format!(
                "Grid plate map header cell '{cell}' is not a column number."
            ))
        })?;
        columns.push(column);
    }

    let mut entries = Vec::new();
    for (idx, record) in records.iter().enumerate().skip(1) {
        let line = idx + 1;
        let row_letter = record
            .get(0)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::input(format!("Grid plate map line {line}: missing row letter."))
            })?;

        for (col_pos, &column) in columns.iter().enumerate() {
            let label = record.get(col_pos + 1).map(str::trim).unwrap_or("");
            if label.is_empty() {
                // Empty cells are unassigned wells, dropped from the melt.
                continue;
            }
            let well = Well::parse(&format!("{row_letter}:{column}"))
                .map_err(|e| AppError::input(format!("Grid plate map line {line}: {e}")))?;
            entries.push(PlateEntry {
                well,
                label: label.to_string(),
                blank: None,
            });
        }
    }

    ensure_unique_wells(&entries)?;
    Ok(PlateMap { entries })
}

fn ensure_unique_wells(entries: &[PlateEntry]) -> Result<(), AppError> {
    let mut seen = std::collections::HashSet::new();
    for entry in entries {
        if !seen.insert(&entry.well) {
            return Err(AppError::input(format!(
                "Plate map assigns well {} more than once.",
                entry.well
            )));
        }
    }
    Ok(())
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes emit a BOM prefix on the first header
    // cell. If we don't strip it, schema validation incorrectly reports the
    // `Well` column missing.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(lines: &[&str]) -> Vec<StringRecord> {
        lines
            .iter()
            .map(|l| StringRecord::from(l.split('\t').collect::<Vec<_>>()))
            .collect()
    }

    #[test]
    fn tall_parses_wells_and_labels() {
        let recs = records(&[
            "Well\tLabel\tBlank",
            "A1\tpT7-deGFP\t",
            "A2\tpT7-tetR\t",
            "H12\tBlank\tBLK",
        ]);
        let map = parse_tall(&recs).unwrap();
        assert_eq!(map.entries.len(), 3);
        assert_eq!(map.entries[0].well, Well::new("A", 1));
        assert_eq!(map.entries[0].label, "pT7-deGFP");
        assert!(map.entries[0].blank.is_none());
        assert_eq!(map.entries[2].blank.as_deref(), Some("BLK"));
        assert!(map.has_blanks());
    }

    #[test]
    fn tall_accepts_row_colon_column_tokens() {
        let recs = records(&["Well\tLabel", "A:1\tx", "B:10\ty"]);
        let map = parse_tall(&recs).unwrap();
        assert_eq!(map.entries[1].well, Well::new("B", 10));
    }

    #[test]
    fn tall_rejects_malformed_token_with_line_number() {
        let recs = records(&["Well\tLabel", "A1\tx", "1A\ty"]);
        let err = parse_tall(&recs).unwrap_err();
        assert!(err.to_string().contains("line 3"), "{err}");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn tall_rejects_duplicate_wells() {
        let recs = records(&["Well\tLabel", "A1\tx", "A:1\ty"]);
        let err = parse_tall(&recs).unwrap_err();
        assert!(err.to_string().contains("A1"), "{err}");
    }

    #[test]
    fn grid_melt_round_trips_rows_and_columns() {
        let recs = records(&[
            "\t1\t2\t3",
            "A\ta1\ta2\ta3",
            "B\tb1\t\tb3",
        ]);
        let map = parse_grid(&recs).unwrap();

        // Empty B2 cell dropped; every other (row, column) pair reproduced.
        let mut pairs: Vec<(String, u32)> = map
            .entries
            .iter()
            .map(|e| (e.well.row.clone(), e.well.column))
            .collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("A".to_string(), 1),
                ("A".to_string(), 2),
                ("A".to_string(), 3),
                ("B".to_string(), 1),
                ("B".to_string(), 3),
            ]
        );
        assert_eq!(map.get(&Well::new("B", 3)).unwrap().label, "b3");
    }

    #[test]
    fn grid_rejects_non_numeric_column_header() {
        let recs = records(&["\t1\ttwo", "A\ta1\ta2"]);
        assert!(parse_grid(&recs).is_err());
    }

    #[test]
    fn xlsx_platemap_loads_through_the_tall_path() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/platemap.xlsx");
        let map = load_platemap(&path, PlateMapFormat::Auto).unwrap();

        assert_eq!(map.entries.len(), 3);
        assert_eq!(map.entries[0].well, Well::new("A", 1));
        assert_eq!(map.entries[0].label, "pT7-deGFP");
        assert_eq!(map.entries[2].well, Well::new("H", 12));
        assert_eq!(map.entries[2].blank.as_deref(), Some("BLK"));
        assert!(map.has_blanks());
    }

    #[test]
    fn workbook_cells_render_like_text_cells() {
        assert_eq!(workbook_cell_text(&Data::Empty), "");
        assert_eq!(workbook_cell_text(&Data::String(" A:1 ".to_string())), "A:1");
        // Grid column headers come back as floats from the workbook reader.
        assert_eq!(workbook_cell_text(&Data::Float(12.0)), "12");
        assert_eq!(workbook_cell_text(&Data::Float(1.5)), "1.5");
        assert_eq!(workbook_cell_text(&Data::Int(7)), "7");
    }

    #[test]
    fn workbook_extension_selects_the_workbook_reader() {
        assert!(is_workbook_path(Path::new("plate.xlsx")));
        assert!(is_workbook_path(Path::new("plate.XLSX")));
        assert!(!is_workbook_path(Path::new("plate.tsv")));
        assert!(!is_workbook_path(Path::new("plate")));
    }

    #[test]
    fn detect_format_by_first_header_cell() {
        assert_eq!(
            detect_format(&StringRecord::from(vec!["Well", "Label"])),
            PlateMapFormat::Tall
        );
        assert_eq!(
            detect_format(&StringRecord::from(vec!["", "1", "2"])),
            PlateMapFormat::Grid
        );
    }
}
