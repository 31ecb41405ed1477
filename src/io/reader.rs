//! Vendor plate-reader export parsing.
//!
//! The export is one large latin-1 text blob with four regions:
//!
//! 1. free-form header lines (`key<TAB>value`)
//! 2. a procedure-description block introduced by `Procedure Details`
//! 3. a layout block introduced by `Layout` (grid of well assignments)
//! 4. one or more timed read blocks, each introduced by a header line of the
//!    form `<ex>,<em>` (optionally prefixed `Read N:`, optionally suffixed
//!    `[n]`)
//!
//! Rather than slicing the blob by regex search offsets, parsing is an
//! explicit state machine over lines (Header → Procedure → Layout → Reads),
//! so a malformed export fails with a named missing anchor instead of a
//! generic "no match" error. Missing anchors are hard failures: the caller
//! cannot do anything useful with a partially-parsed export.
//!
//! Within a read block the first line is the column header
//! (`Time`, temperature, well tokens) and each data row must start with an
//! `H:MM:SS`-style time token. Rows that do not (the vendor's appended
//! kinetic-parameter summaries) are discarded. A block ends at the next
//! read header, a `Blank Read`/`Results`/`Max V` line, or end of input.

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};

use crate::domain::{Channel, Dataset, ExportMeta, Measurement, PlateMap, Well};
use crate::error::AppError;

/// Raw-value sentinel the reader emits for an over-range measurement.
const OVERFLOW_SENTINEL: &str = "OVRFLW";

/// Lines that terminate a read block without starting a new one.
const BLOCK_TERMINATORS: [&str; 3] = ["Blank Read", "Results", "Max V"];

/// Load and parse a reader export file, joining rows against the plate map.
pub fn load_export(
    path: &Path,
    platemap: &PlateMap,
    experiment: &str,
) -> Result<Dataset, AppError> {
    let bytes = fs::read(path).map_err(|e| {
        AppError::input(format!("Failed to read export '{}': {e}", path.display()))
    })?;
    let text = decode_latin1(&bytes);
    parse_export(&text, platemap, experiment)
}

/// Parse an already-decoded export blob.
pub fn parse_export(
    text: &str,
    platemap: &PlateMap,
    experiment: &str,
) -> Result<Dataset, AppError> {
    #[derive(Clone, Copy)]
    enum State {
        Header,
        Procedure,
        Layout,
        Reads,
    }

    let mut state = State::Header;
    let mut meta = ExportMeta::default();
    let mut layout_lines: Vec<&str> = Vec::new();
    let mut rows: Vec<Measurement> = Vec::new();
    let mut block: Option<ReadBlock> = None;
    let mut saw_read_header = false;

    for line in text.lines() {
        let trimmed = line.trim_end();

        match state {
            State::Header => {
                if is_procedure_anchor(trimmed) {
                    state = State::Procedure;
                } else if let Some((key, value)) = trimmed.split_once('\t') {
                    record_meta(&mut meta, key.trim(), value.trim());
                }
            }
            State::Procedure => {
                if is_layout_anchor(trimmed) {
                    state = State::Layout;
                }
            }
            State::Layout => {
                if let Some(header) = parse_read_header(trimmed) {
                    saw_read_header = true;
                    block = Some(ReadBlock::new(header));
                    state = State::Reads;
                } else if !trimmed.trim().is_empty() {
                    layout_lines.push(trimmed);
                }
            }
            State::Reads => {
                if let Some(header) = parse_read_header(trimmed) {
                    if let Some(done) = block.take() {
                        done.finish(&mut rows);
                    }
                    block = Some(ReadBlock::new(header));
                } else if is_block_terminator(trimmed) {
                    if let Some(done) = block.take() {
                        done.finish(&mut rows);
                    }
                } else if let Some(b) = block.as_mut() {
                    b.feed(trimmed);
                }
            }
        }
    }
    if let Some(done) = block.take() {
        done.finish(&mut rows);
    }

    // Anchor diagnostics: name the first region that never appeared.
    match state {
        State::Header => {
            return Err(AppError::input(
                "Malformed export: 'Procedure Details' section marker not found.",
            ));
        }
        State::Procedure => {
            return Err(AppError::input(
                "Malformed export: 'Layout' section marker not found.",
            ));
        }
        State::Layout | State::Reads => {}
    }
    if !saw_read_header {
        return Err(AppError::input(
            "Malformed export: no read block header ('<ex>,<em>') found.",
        ));
    }
    if rows.is_empty() {
        return Err(AppError::no_data(
            "Export contained read blocks but no parseable timepoint rows.",
        ));
    }

    // Outer join against the plate map: unmapped wells keep label = None.
    for row in &mut rows {
        if let Some(entry) = platemap.get(&row.well) {
            row.label = Some(entry.label.clone());
            row.blank = entry.blank.clone();
        }
    }

    let layout = parse_layout(&layout_lines);

    log::info!(
        "parsed export '{experiment}': {} rows across {} wells",
        rows.len(),
        count_wells(&rows)
    );

    Ok(Dataset {
        experiment: experiment.to_string(),
        meta,
        layout,
        rows,
    })
}

/// latin-1: every byte maps to the Unicode scalar of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn is_procedure_anchor(line: &str) -> bool {
    line.trim_start().starts_with("Procedure Details")
}

fn is_layout_anchor(line: &str) -> bool {
    let t = line.trim();
    t == "Layout" || t.starts_with("Layout\t")
}

fn is_block_terminator(line: &str) -> bool {
    let t = line.trim_start();
    BLOCK_TERMINATORS.iter().any(|term| t.starts_with(term))
}

/// A parsed read-block header: the channel pair plus the 1-based read index
/// that distinguishes repeated reads of the same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadHeader {
    channel: Channel,
    read: u32,
}

/// Parse a read-block header line.
///
/// Accepted forms: `485,528`, `Read 2:485,528`, `485,528[2]`. The read index
/// comes from the `[n]` suffix when present, else the `Read N:` prefix,
/// else 1. Dropping it would merge repeated reads of the same channel into
/// one series with duplicated timepoints.
fn parse_read_header(line: &str) -> Option<ReadHeader> {
    let mut rest = line.trim();
    let mut prefix_num = None;

    if let Some(stripped) = rest.strip_prefix("Read ") {
        let (num, tail) = stripped.split_once(':')?;
        prefix_num = Some(num.trim().parse::<u32>().ok()?);
        rest = tail.trim();
    }

    let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 || !rest[digits_end..].starts_with(',') {
        return None;
    }
    let ex = rest[..digits_end].parse::<u32>().ok()?;

    let rest = &rest[digits_end + 1..];
    let em_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if em_end == 0 {
        return None;
    }
    let em = rest[..em_end].parse::<u32>().ok()?;

    // Optional `[n]` suffix (repeated-read disambiguator); anything else
    // trailing means this is a data line, not a header.
    let tail = rest[em_end..].trim();
    let suffix_num = if tail.is_empty() {
        None
    } else if tail.starts_with('[') && tail.ends_with(']') {
        Some(tail[1..tail.len() - 1].parse::<u32>().ok()?)
    } else {
        return None;
    };

    Some(ReadHeader {
        channel: Channel { ex, em },
        read: suffix_num.or(prefix_num).unwrap_or(1),
    })
}

/// Convert an `H:MM:SS` time token to elapsed seconds.
///
/// Exactly three colon-separated parts: this doubles as the filter that
/// separates timepoint rows from vendor trailer rows, so a looser form
/// would admit rows that are not timepoints.
fn parse_time_token(token: &str) -> Option<f64> {
    let parts: Vec<&str> = token.trim().split(':').collect();
    let [h, m, s] = parts.as_slice() else {
        return None;
    };
    let (h, m, s) = (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, s.parse::<u64>().ok()?);
    if m >= 60 || s >= 60 {
        return None;
    }
    Some((h * 3600 + m * 60 + s) as f64)
}

fn record_meta(meta: &mut ExportMeta, key: &str, value: &str) {
    if key.is_empty() || value.is_empty() {
        return;
    }
    match key {
        "Date" => meta.date = parse_meta_date(value),
        "Time" => meta.time = parse_meta_time(value),
        _ => {}
    }
    meta.fields.push((key.to_string(), value.to_string()));
}

fn parse_meta_date(s: &str) -> Option<NaiveDate> {
    const FMTS: [&str; 3] = ["%m/%d/%Y", "%Y-%m-%d", "%d/%m/%Y"];
    FMTS.iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn parse_meta_time(s: &str) -> Option<NaiveTime> {
    const FMTS: [&str; 3] = ["%I:%M %p", "%H:%M:%S", "%H:%M"];
    FMTS.iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/// Best-effort parse of the embedded layout grid.
///
/// The export's own layout is informational (the user-supplied plate map is
/// authoritative), so a layout region we cannot interpret downgrades to a
/// debug log rather than failing the load.
fn parse_layout(lines: &[&str]) -> Option<PlateMap> {
    if lines.is_empty() {
        return None;
    }
    let records: Vec<csv::StringRecord> = lines
        .iter()
        .map(|l| csv::StringRecord::from(l.split('\t').map(str::trim).collect::<Vec<_>>()))
        .collect();
    match crate::io::platemap::parse_grid(&records) {
        Ok(map) if !map.entries.is_empty() => Some(map),
        Ok(_) => None,
        Err(e) => {
            log::debug!("export layout region not parseable as a grid: {e}");
            None
        }
    }
}

fn count_wells(rows: &[Measurement]) -> usize {
    let mut wells: Vec<&Well> = rows.iter().map(|r| &r.well).collect();
    wells.sort();
    wells.dedup();
    wells.len()
}

/// One read block being accumulated: its header, resolved columns, and rows.
struct ReadBlock {
    header: ReadHeader,
    /// `None` until the column-header line has been seen.
    columns: Option<Vec<ColumnKind>>,
    rows: Vec<Measurement>,
}

enum ColumnKind {
    Time,
    Temperature,
    Well(Well),
    /// Header cell we could not interpret; its values are ignored.
    Skipped,
}

impl ReadBlock {
    fn new(header: ReadHeader) -> Self {
        Self {
            header,
            columns: None,
            rows: Vec::new(),
        }
    }

    fn feed(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        if self.columns.is_none() {
            let columns = self.parse_columns(line);
            self.columns = Some(columns);
        } else {
            self.parse_data_row(line);
        }
    }

    /// Resolve the block's column-header line.
    ///
    /// First cell must be `Time`; a following `T°`-prefixed cell (the
    /// temperature column, typically `T°` with a channel suffix) is
    /// temperature; remaining cells are well tokens, possibly decorated with
    /// the channel pair (`A1 485,528`), of which we keep the leading token.
    /// A bare `T` prefix is not enough: large plate formats have row-`T`
    /// wells, whose header cells also start with `T`.
    fn parse_columns(&self, line: &str) -> Vec<ColumnKind> {
        line.split('\t')
            .enumerate()
            .map(|(idx, cell)| {
                let cell = cell.trim();
                if idx == 0 {
                    return ColumnKind::Time;
                }
                if idx == 1 && cell.starts_with("T\u{b0}") {
                    return ColumnKind::Temperature;
                }
                let token = cell.split_whitespace().next().unwrap_or("");
                match Well::parse(token) {
                    Ok(well) => ColumnKind::Well(well),
                    Err(_) => {
                        log::warn!(
                            "read {} column header '{cell}' is not a well token; ignoring column",
                            self.header.channel
                        );
                        ColumnKind::Skipped
                    }
                }
            })
            .collect()
    }

    fn parse_data_row(&mut self, line: &str) {
        let Some(columns) = &self.columns else { return };
        let cells: Vec<&str> = line.split('\t').collect();

        // Rows not led by a time token are vendor kinetic-parameter
        // summaries, not raw timepoints.
        let Some(seconds) = cells.first().and_then(|c| parse_time_token(c)) else {
            return;
        };

        let mut temperature = None;
        let mut row_values: Vec<(Well, Option<f64>)> = Vec::new();

        for (cell, kind) in cells.iter().zip(columns.iter()) {
            let cell = cell.trim();
            match kind {
                ColumnKind::Time | ColumnKind::Skipped => {}
                ColumnKind::Temperature => temperature = cell.parse::<f64>().ok(),
                ColumnKind::Well(well) => {
                    row_values.push((well.clone(), parse_value(cell)));
                }
            }
        }

        for (well, value) in row_values {
            self.rows.push(Measurement {
                well,
                channel: self.header.channel,
                read: self.header.read,
                seconds,
                temperature,
                value,
                label: None,
                blank: None,
                blank_mean: None,
                blanked: None,
            });
        }
    }

    fn finish(self, out: &mut Vec<Measurement>) {
        out.extend(self.rows);
    }
}

/// Parse a signal cell. Empty cells and the overflow sentinel map to
/// missing, never zero.
fn parse_value(cell: &str) -> Option<f64> {
    if cell.is_empty() || cell == OVERFLOW_SENTINEL {
        return None;
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            log::warn!("unparseable signal value '{cell}' treated as missing");
            None
        }
    }
}
