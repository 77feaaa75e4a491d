//! Resolution of human-entered cell-range strings into sheet windows.
//!
//! Parameter tables are hand-typed, so the grammar is forgiving: `A2:F20`,
//! `A2:F` (open row end), `A2` (open both ends), `2:20` (row band), `B:F`
//! (column band), empty (whole sheet). Full-width colons and `~`/`-` are
//! accepted as separators, whitespace is ignored and reversed bounds are
//! swapped. Everything is clamped to the sheet extent at resolution time.

use rowforge_types::{Result, bail};

/// Largest addressable column, `XFD` in A1 notation.
pub const MAX_COL: u32 = 16_384;

/// A single cell position, 1-based on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

/// A resolved data window: 0-based, end-exclusive, normalized and clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetWindow {
    pub start_row: u32,
    pub end_row: u32,
    pub start_col: u32,
    pub end_col: u32,
}

impl SheetWindow {
    pub fn rows(&self) -> u32 {
        self.end_row - self.start_row
    }

    pub fn cols(&self) -> u32 {
        self.end_col - self.start_col
    }
}

/// Parsed form of a range string, before clamping against a sheet extent.
/// Bounds stay 1-based and inclusive here, mirroring what the user typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// Empty input: the whole used range.
    Whole,
    /// `A2`: from a cell to the sheet extent.
    From(CellRef),
    /// `A2:F20` and the open-ended forms (`A2:F`, `A2:20`).
    Rect(CellRef, CellRef),
    /// `2:20`: a band of rows across all columns.
    Rows(u32, u32),
    /// `B:F`: a band of columns across all rows.
    Cols(u32, u32),
}

/// One side of a range expression: either axis may be absent (`F`, `20`).
#[derive(Debug, Clone, Copy)]
struct Anchor {
    row: Option<u32>,
    col: Option<u32>,
}

/// Column letters (`A`, `aa`, ... up to `XFD`) or a 1-based number.
pub fn parse_col(s: &str) -> Result<u32> {
    let t = s.trim();
    if t.is_empty() {
        bail!("empty column reference");
    }
    if t.chars().all(|c| c.is_ascii_digit()) {
        let n: u32 = t.parse()?;
        if n == 0 || n > MAX_COL {
            bail!("column {} out of range 1..={}", n, MAX_COL);
        }
        return Ok(n);
    }
    let mut acc: u32 = 0;
    for c in t.chars() {
        if !c.is_ascii_alphabetic() {
            bail!("invalid column reference '{}'", s);
        }
        acc = acc * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        if acc > MAX_COL {
            bail!("column '{}' beyond XFD", s);
        }
    }
    Ok(acc)
}

/// 1-based row number; rejects zero.
pub fn parse_row(s: &str) -> Result<u32> {
    let t = s.trim();
    let n: u32 = t
        .parse()
        .map_err(|_| rowforge_types::anyhow!("invalid row reference '{}'", s))?;
    if n == 0 {
        bail!("row numbers are 1-based");
    }
    Ok(n)
}

/// `B3` style single-cell reference.
pub fn parse_cell_ref(s: &str) -> Result<CellRef> {
    let anchor = parse_anchor(s)?;
    match (anchor.row, anchor.col) {
        (Some(row), Some(col)) => Ok(CellRef { row, col }),
        _ => bail!("'{}' is not a cell reference", s),
    }
}

fn parse_anchor(s: &str) -> Result<Anchor> {
    if s.is_empty() {
        bail!("empty range side");
    }
    let letters: String = s.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let rest = &s[letters.len()..];

    if letters.is_empty() {
        return Ok(Anchor {
            row: Some(parse_row(rest)?),
            col: None,
        });
    }
    if rest.is_empty() {
        return Ok(Anchor {
            row: None,
            col: Some(parse_col(&letters)?),
        });
    }
    Ok(Anchor {
        row: Some(parse_row(rest)?),
        col: Some(parse_col(&letters)?),
    })
}

impl RangeSpec {
    /// Parse a range string. Whitespace anywhere is discarded; `：`, `~` and
    /// `-` are treated as `:`.
    pub fn parse(input: &str) -> Result<RangeSpec> {
        let cleaned: String = input
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '：' | '~' | '-' => ':',
                _ => c,
            })
            .collect();

        if cleaned.is_empty() {
            return Ok(RangeSpec::Whole);
        }

        let Some((lhs, rhs)) = cleaned.split_once(':') else {
            let a = parse_anchor(&cleaned)?;
            return Ok(match (a.row, a.col) {
                (Some(row), Some(col)) => RangeSpec::From(CellRef { row, col }),
                (Some(row), None) => RangeSpec::Rows(row, row),
                (None, Some(col)) => RangeSpec::Cols(col, col),
                (None, None) => unreachable!("anchor always carries one axis"),
            });
        };

        let a = parse_anchor(lhs)?;
        let b = parse_anchor(rhs)?;

        Ok(match ((a.row, a.col), (b.row, b.col)) {
            ((Some(r0), None), (Some(r1), None)) => RangeSpec::Rows(r0, r1),
            ((None, Some(c0)), (None, Some(c1))) => RangeSpec::Cols(c0, c1),
            _ => {
                // Open sides saturate toward the sheet edge: a missing start
                // axis means "from the first row/column", a missing end axis
                // means "to the last".
                let start = CellRef {
                    row: a.row.unwrap_or(1),
                    col: a.col.unwrap_or(1),
                };
                let end = CellRef {
                    row: b.row.unwrap_or(u32::MAX),
                    col: b.col.unwrap_or(u32::MAX),
                };
                RangeSpec::Rect(start, end)
            }
        })
    }

    /// Clamp against the sheet extent. Returns `None` when nothing of the
    /// window survives (range entirely below or right of the data, or an
    /// empty sheet).
    pub fn resolve(&self, sheet_rows: u32, sheet_cols: u32) -> Option<SheetWindow> {
        let (r0, r1, c0, c1) = match *self {
            RangeSpec::Whole => (1, u32::MAX, 1, u32::MAX),
            RangeSpec::From(start) => (start.row, u32::MAX, start.col, u32::MAX),
            RangeSpec::Rect(start, end) => (start.row, end.row, start.col, end.col),
            RangeSpec::Rows(a, b) => (a, b, 1, u32::MAX),
            RangeSpec::Cols(a, b) => (1, u32::MAX, a, b),
        };

        let (r0, r1) = (r0.min(r1), r0.max(r1));
        let (c0, c1) = (c0.min(c1), c0.max(c1));

        let start_row = r0 - 1;
        let end_row = r1.min(sheet_rows);
        let start_col = c0 - 1;
        let end_col = c1.min(sheet_cols);

        if start_row >= end_row || start_col >= end_col {
            return None;
        }

        Some(SheetWindow {
            start_row,
            end_row,
            start_col,
            end_col,
        })
    }
}
