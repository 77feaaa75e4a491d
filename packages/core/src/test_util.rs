//! In-memory xlsx fixtures for tests; no binary files are checked in.

use std::io::Cursor;

/// Build workbook bytes from `(sheet name, rows)` pairs. Empty strings are
/// left as untouched cells so calamine sees them as `Data::Empty`.
pub fn workbook_bytes(sheets: &[(&str, Vec<Vec<&str>>)]) -> Vec<u8> {
    let mut book = umya_spreadsheet::new_file();

    for (i, (name, rows)) in sheets.iter().enumerate() {
        if i == 0 {
            book.get_sheet_mut(&0)
                .expect("fresh workbook has a sheet")
                .set_name(*name);
        } else {
            book.new_sheet(*name).expect("duplicate sheet name");
        }
        let ws = book.get_sheet_by_name_mut(name).expect("sheet just added");
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if !value.is_empty() {
                    ws.get_cell_mut((c as u32 + 1, r as u32 + 1)).set_value(*value);
                }
            }
        }
    }

    let mut cursor = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut cursor)
        .expect("workbook serialization");
    cursor.into_inner()
}
