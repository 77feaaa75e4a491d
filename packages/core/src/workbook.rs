//! Spreadsheet I/O: calamine for reading the uploaded workbooks from bytes,
//! umya-spreadsheet for writing the output workbook. Nothing here touches
//! the network; blocking callers are expected to wrap these in
//! `spawn_blocking`.

use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Range, Reader, open_workbook_auto_from_rs};
use rowforge_types::{Result, anyhow};

use crate::range::{RangeSpec, SheetWindow};
use crate::reply::{FIELDS, Record};

/// Cells longer than this are ellipsized in the prompt preview.
const MAX_CELL_PREVIEW_LEN: usize = 50;

/// A resolved window of a report sheet, rendered to strings.
#[derive(Debug, Clone)]
pub struct Grid {
    pub rows: Vec<Vec<String>>,
    pub window: SheetWindow,
}

impl Grid {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Ordered worksheet names of an xlsx/xls workbook held in memory.
pub fn sheet_names(bytes: &[u8]) -> Result<Vec<String>> {
    let wb = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| anyhow!("failed to open workbook: {}", e))?;
    Ok(wb.sheet_names().to_vec())
}

/// Load one sheet range; errors carry the sheet name since calamine's own
/// message does not.
pub fn worksheet_range(bytes: &[u8], sheet: &str) -> Result<Range<Data>> {
    let mut wb = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| anyhow!("failed to open workbook: {}", e))?;
    wb.worksheet_range(sheet)
        .map_err(|e| anyhow!("sheet '{}' not readable: {}", sheet, e))
}

/// Resolve `spec` against the sheet's used extent and render the window to
/// strings. Trailing all-empty rows inside the window are dropped. `None`
/// means the window missed the data entirely.
pub fn read_window(bytes: &[u8], sheet: &str, spec: &RangeSpec) -> Result<Option<Grid>> {
    let range = worksheet_range(bytes, sheet)?;

    // `end()` is the absolute inclusive bottom-right of the used range.
    let (sheet_rows, sheet_cols) = match range.end() {
        Some((r, c)) => (r + 1, c + 1),
        None => (0, 0),
    };

    let Some(window) = spec.resolve(sheet_rows, sheet_cols) else {
        return Ok(None);
    };

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(window.rows() as usize);
    for r in window.start_row..window.end_row {
        let mut cells = Vec::with_capacity(window.cols() as usize);
        for c in window.start_col..window.end_col {
            // get_value takes absolute coordinates.
            cells.push(
                range
                    .get_value((r, c))
                    .map(data_to_string)
                    .unwrap_or_default(),
            );
        }
        rows.push(cells);
    }

    while rows
        .last()
        .is_some_and(|r| r.iter().all(|c| c.trim().is_empty()))
    {
        rows.pop();
    }

    if rows.is_empty() {
        return Ok(None);
    }

    Ok(Some(Grid { rows, window }))
}

/// Single absolute cell as a trimmed string, empty when missing. Row/col are
/// 1-based.
pub fn read_cell(range: &Range<Data>, row: u32, col: u32) -> String {
    range
        .get_value((row - 1, col - 1))
        .map(data_to_string)
        .unwrap_or_default()
}

pub fn data_to_string(v: &Data) -> String {
    match v {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 && *f >= -9_007_199_254_740_992.0 && *f <= 9_007_199_254_740_992.0 {
                format!("{:.0}", f)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERROR:{:?}", e),
    }
}

fn ellipsize(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", cut)
}

/// Dimensioned, row-numbered block fed to the completion prompt. Row numbers
/// are the absolute 1-based sheet rows so the model can reason about
/// position.
pub fn preview_text(grid: &Grid, sheet_name: &str) -> String {
    let mut out = String::with_capacity(grid.rows.len() * 64);
    out.push_str(&format!(
        "Sheet '{}', window of {} rows × {} columns:\n",
        sheet_name,
        grid.rows.len(),
        grid.window.cols()
    ));
    for (i, row) in grid.rows.iter().enumerate() {
        out.push_str(&format!("Row {:>4}: ", grid.window.start_row + 1 + i as u32));
        for (j, cell) in row.iter().enumerate() {
            if j > 0 {
                out.push_str(" | ");
            }
            out.push_str(&ellipsize(cell, MAX_CELL_PREVIEW_LEN));
        }
        out.push('\n');
    }
    out
}

/// Write the assembled records to `out_path` as a single-sheet workbook:
/// a header row with the field names, one row per record.
pub fn write_records(records: &[Record], out_path: &Path) -> Result<()> {
    let mut book = umya_spreadsheet::new_file();
    let ws = book
        .get_sheet_mut(&0)
        .ok_or_else(|| anyhow!("fresh workbook has no sheet"))?;
    ws.set_name("Result");

    for (c, field) in FIELDS.iter().enumerate() {
        ws.get_cell_mut((c as u32 + 1, 1)).set_value(*field);
    }
    for (r, record) in records.iter().enumerate() {
        for (c, value) in record.values().iter().enumerate() {
            ws.get_cell_mut((c as u32 + 1, r as u32 + 2))
                .set_value(*value);
        }
    }

    umya_spreadsheet::writer::xlsx::write(&book, out_path)
        .map_err(|e| anyhow!("failed to write output workbook: {}", e))?;
    Ok(())
}
