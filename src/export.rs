use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Error;
use crate::reconcile::{self, RecordKind, SubmissionDoc};

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[derive(Debug, Clone)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
}

fn cell_to_csv(cell: &Cell) -> String {
    match cell {
        Cell::Text(s) => csv_quote(s),
        Cell::Number(n) => format!("{n}"),
    }
}

/// Flat CSV with a header line; used for report downloads.
pub fn rows_to_csv(header: &[&str], rows: &[Vec<Cell>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(header.join(","));
    for row in rows {
        lines.push(
            row.iter()
                .map(cell_to_csv)
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

fn record_value_text(doc_kind: RecordKind, record: &reconcile::RecordRow) -> String {
    match doc_kind {
        RecordKind::Attendance => record
            .status
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        RecordKind::Marks => record.mark.map(|m| format!("{m}")).unwrap_or_default(),
    }
}

/// Block-per-submission CSV: optional description line, column header, one
/// row per record, blank line after each block. Orphaned records keep their
/// studentId and render an empty name.
pub fn submissions_csv(docs: &[SubmissionDoc], kind: RecordKind) -> String {
    let mut lines: Vec<String> = Vec::new();
    for doc in docs {
        if let Some(desc) = &doc.description {
            lines.push(csv_quote(&format!("Description: {desc}")));
        }
        lines.push(format!("StudentID,Name,{}", kind.value_label()));
        for record in &doc.records {
            lines.push(format!(
                "{},{},{}",
                csv_quote(&record.student_id),
                csv_quote(record.name.as_deref().unwrap_or("")),
                csv_quote(&record_value_text(kind, record)),
            ));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Same blocks as [`submissions_csv`], as a single-worksheet workbook.
pub fn submissions_xlsx(docs: &[SubmissionDoc], kind: RecordKind) -> Result<Vec<u8>, Error> {
    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for doc in docs {
        if let Some(desc) = &doc.description {
            rows.push(vec![Cell::text(format!("Description: {desc}"))]);
        }
        rows.push(vec![
            Cell::text("StudentID"),
            Cell::text("Name"),
            Cell::text(kind.value_label()),
        ]);
        for record in &doc.records {
            let value = match kind {
                RecordKind::Attendance => Cell::text(record_value_text(kind, record)),
                RecordKind::Marks => match record.mark {
                    Some(mark) => Cell::Number(mark),
                    None => Cell::text(""),
                },
            };
            rows.push(vec![
                Cell::text(record.student_id.clone()),
                Cell::text(record.name.clone().unwrap_or_default()),
                value,
            ]);
        }
        rows.push(Vec::new());
    }
    write_workbook(kind.sheet_name(), &rows)
}

/// Minimal single-sheet SpreadsheetML package. Text goes in as inline
/// strings so no shared-string table is needed.
pub fn write_workbook(sheet: &str, rows: &[Vec<Cell>]) -> Result<Vec<u8>, Error> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options).map_err(zip_err)?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())?;

    zip.start_file("_rels/.rels", options).map_err(zip_err)?;
    zip.write_all(ROOT_RELS_XML.as_bytes())?;

    zip.start_file("xl/workbook.xml", options).map_err(zip_err)?;
    zip.write_all(workbook_xml(sheet).as_bytes())?;

    zip.start_file("xl/_rels/workbook.xml.rels", options)
        .map_err(zip_err)?;
    zip.write_all(WORKBOOK_RELS_XML.as_bytes())?;

    zip.start_file("xl/worksheets/sheet1.xml", options)
        .map_err(zip_err)?;
    zip.write_all(sheet_xml(rows).as_bytes())?;

    let cursor = zip.finish().map_err(zip_err)?;
    Ok(cursor.into_inner())
}

fn zip_err(e: zip::result::ZipError) -> Error {
    Error::internal(format!("workbook write failed: {e}"))
}

const CONTENT_TYPES_XML: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
    "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
    "<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>",
    "<Default Extension=\"xml\" ContentType=\"application/xml\"/>",
    "<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
    "<Override PartName=\"/xl/worksheets/sheet1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
    "</Types>"
);

const ROOT_RELS_XML: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
    "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    "<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>",
    "</Relationships>"
);

const WORKBOOK_RELS_XML: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
    "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    "<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet1.xml\"/>",
    "</Relationships>"
);

fn workbook_xml(sheet: &str) -> String {
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
            "<workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" ",
            "xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
            "<sheets><sheet name=\"{}\" sheetId=\"1\" r:id=\"rId1\"/></sheets>",
            "</workbook>"
        ),
        xml_escape(sheet)
    )
}

fn sheet_xml(rows: &[Vec<Cell>]) -> String {
    let mut out = String::from(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
        "<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
        "<sheetData>"
    ));
    for (i, row) in rows.iter().enumerate() {
        let row_ref = i + 1;
        if row.is_empty() {
            out.push_str(&format!("<row r=\"{row_ref}\"/>"));
            continue;
        }
        out.push_str(&format!("<row r=\"{row_ref}\">"));
        for (j, cell) in row.iter().enumerate() {
            let cell_ref = format!("{}{}", col_name(j), row_ref);
            match cell {
                Cell::Text(s) => out.push_str(&format!(
                    "<c r=\"{cell_ref}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                    xml_escape(s)
                )),
                Cell::Number(n) => out.push_str(&format!("<c r=\"{cell_ref}\"><v>{n}</v></c>")),
            }
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData></worksheet>");
    out
}

fn col_name(idx: usize) -> String {
    let mut idx = idx + 1;
    let mut name = String::new();
    while idx > 0 {
        let rem = (idx - 1) % 26;
        name.insert(0, (b'A' + rem as u8) as char);
        idx = (idx - 1) / 26;
    }
    name
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn artifact_path(exports_dir: &Path, kind: RecordKind, date: NaiveDate) -> PathBuf {
    exports_dir.join(format!("{}-{}.csv", kind.as_str(), date))
}

/// Rewrite the cached per-date CSV from current store state. Called on every
/// mutating path touching that date so downloads never go stale.
pub fn regenerate_artifact(
    conn: &Connection,
    exports_dir: &Path,
    kind: RecordKind,
    date: NaiveDate,
) -> Result<PathBuf, Error> {
    let docs = reconcile::list_submissions(conn, kind, date, None, None)?;
    let csv = submissions_csv(&docs, kind);
    std::fs::create_dir_all(exports_dir)?;
    let path = artifact_path(exports_dir, kind, date);
    std::fs::write(&path, csv)?;
    debug!("rewrote export artifact {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_matches_csv_rules() {
        assert_eq!(csv_quote("plain"), "plain");
        assert_eq!(csv_quote("a,b"), "\"a,b\"");
        assert_eq!(csv_quote("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_quote("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn column_names_roll_over_past_z() {
        assert_eq!(col_name(0), "A");
        assert_eq!(col_name(25), "Z");
        assert_eq!(col_name(26), "AA");
        assert_eq!(col_name(27), "AB");
    }

    #[test]
    fn xml_escaping_covers_markup_characters() {
        assert_eq!(xml_escape("a<b&c>\"d\""), "a&lt;b&amp;c&gt;&quot;d&quot;");
    }
}
