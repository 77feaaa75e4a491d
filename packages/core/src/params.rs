//! Parameter-table decoding.
//!
//! Layout of the first sheet of the uploaded parameter workbook:
//! row 1 holds the mode flag in B1 (`simple` selects Simple, anything else
//! is Full), row 2 is a header, rows 3.. are directives:
//! `sheet | range | region | product`. Rows without a sheet name are
//! skipped; when a sheet is listed twice the last directive wins.

use rowforge_types::{Result, anyhow, bail};

use crate::range::RangeSpec;
use crate::workbook::{read_cell, sheet_names, worksheet_range};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Process only the sheets the parameter table names.
    Simple,
    /// Process every report sheet; directives contribute overrides.
    Full,
}

#[derive(Debug, Clone)]
pub struct SheetDirective {
    pub sheet: String,
    pub range: RangeSpec,
    pub region: String,
    pub product: String,
}

#[derive(Debug, Clone)]
pub struct ParamTable {
    pub mode: RunMode,
    pub directives: Vec<SheetDirective>,
}

/// One unit of pipeline work: a report sheet plus the window and metadata
/// to process it with.
#[derive(Debug, Clone)]
pub struct SheetJob {
    pub sheet: String,
    pub range: RangeSpec,
    pub region: String,
    pub product: String,
}

/// The per-sheet work derived from a parameter table and the report's
/// actual sheet list.
#[derive(Debug, Clone)]
pub struct Plan {
    pub jobs: Vec<SheetJob>,
    /// Simple-mode directives whose sheet does not exist in the report.
    pub missing: Vec<String>,
}

impl ParamTable {
    pub fn decode(bytes: &[u8]) -> Result<ParamTable> {
        let names = sheet_names(bytes)?;
        let first = names
            .first()
            .ok_or_else(|| anyhow!("parameter workbook has no sheets"))?;
        let range = worksheet_range(bytes, first)?;

        let flag = read_cell(&range, 1, 2);
        let mode = if flag.trim().eq_ignore_ascii_case("simple") {
            RunMode::Simple
        } else {
            RunMode::Full
        };

        let total_rows = match range.end() {
            Some((r, _)) => r + 1,
            None => 0,
        };

        let mut directives = Vec::new();
        for row in 3..=total_rows {
            let sheet = read_cell(&range, row, 1).trim().to_string();
            if sheet.is_empty() {
                continue;
            }
            let range_text = read_cell(&range, row, 2);
            let parsed = RangeSpec::parse(&range_text).map_err(|e| {
                anyhow!("parameter row {}: bad range '{}': {}", row, range_text.trim(), e)
            })?;
            directives.push(SheetDirective {
                sheet,
                range: parsed,
                region: read_cell(&range, row, 3).trim().to_string(),
                product: read_cell(&range, row, 4).trim().to_string(),
            });
        }

        if mode == RunMode::Simple && directives.is_empty() {
            bail!("simple mode selected but the parameter table lists no sheets");
        }

        Ok(ParamTable { mode, directives })
    }

    /// Last directive for a sheet, if any.
    fn directive_for(&self, sheet: &str) -> Option<&SheetDirective> {
        self.directives.iter().rev().find(|d| d.sheet == sheet)
    }

    pub fn plan(&self, report_sheets: &[String]) -> Plan {
        match self.mode {
            RunMode::Simple => {
                let mut jobs = Vec::new();
                let mut missing = Vec::new();
                let mut seen = std::collections::HashSet::new();
                for directive in &self.directives {
                    if !seen.insert(directive.sheet.as_str()) {
                        continue;
                    }
                    // Last directive wins even though order follows first
                    // appearance.
                    let d = self
                        .directive_for(&directive.sheet)
                        .unwrap_or(directive);
                    if report_sheets.iter().any(|s| s == &d.sheet) {
                        jobs.push(SheetJob {
                            sheet: d.sheet.clone(),
                            range: d.range,
                            region: d.region.clone(),
                            product: d.product.clone(),
                        });
                    } else {
                        missing.push(d.sheet.clone());
                    }
                }
                Plan { jobs, missing }
            }
            RunMode::Full => {
                let jobs = report_sheets
                    .iter()
                    .map(|sheet| match self.directive_for(sheet) {
                        Some(d) => SheetJob {
                            sheet: sheet.clone(),
                            range: d.range,
                            region: d.region.clone(),
                            product: d.product.clone(),
                        },
                        None => SheetJob {
                            sheet: sheet.clone(),
                            range: RangeSpec::Whole,
                            region: String::new(),
                            product: String::new(),
                        },
                    })
                    .collect();
                Plan {
                    jobs,
                    missing: Vec::new(),
                }
            }
        }
    }
}
