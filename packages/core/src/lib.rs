//! rowforge — normalizes messy performance-report workbooks.
//!
//! The pipeline: decode the uploaded parameter table (mode flag + per-sheet
//! directives), resolve a data window per report sheet, feed a textual
//! preview of each window to a completion model, coerce the reply into the
//! fixed record schema, and assemble everything into one output workbook.

pub mod llm;
pub mod params;
pub mod pipeline;
pub mod range;
pub mod reply;
pub mod workbook;

#[cfg(test)]
pub(crate) mod test_util;
