//! Export of extracted records as CSV, an XLSX workbook, or a ZIP bundle.

use crate::error::IngestError;
use crate::fields::{ColumnSource, FieldValue, COLUMN_SOURCES, EXPORT_COLUMNS};
use crate::safety::UniqueNames;
use crate::types::{DocumentUnit, ExtractedRecord, UnitStatus};
use chrono::NaiveDate;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name of the workbook inside a ZIP bundle.
pub const BUNDLE_WORKBOOK_NAME: &str = "invoice_data.xlsx";

/// Worksheet holding the records.
pub const SHEET_NAME: &str = "Invoices";

/// Export artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Zip,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [ExportFormat::Csv, ExportFormat::Xlsx, ExportFormat::Zip];

    /// Download name, e.g. `invoice_insights_export_2024-05-01.csv`.
    pub fn file_name(&self, prefix: &str, date: NaiveDate) -> String {
        let date = date.format("%Y-%m-%d");
        match self {
            ExportFormat::Csv => format!("{}_export_{}.csv", prefix, date),
            ExportFormat::Xlsx => format!("{}_export_{}.xlsx", prefix, date),
            ExportFormat::Zip => format!("{}_archive_{}.zip", prefix, date),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Xlsx => write!(f, "xlsx"),
            ExportFormat::Zip => write!(f, "zip"),
        }
    }
}

/// Build one export artifact.
///
/// `units` is only read for [`ExportFormat::Zip`], which bundles the
/// original bytes of every `done` unit.
pub fn render(
    format: ExportFormat,
    records: &[ExtractedRecord],
    units: &[DocumentUnit],
) -> Result<Vec<u8>, IngestError> {
    match format {
        ExportFormat::Csv => Ok(to_csv(records).into_bytes()),
        ExportFormat::Xlsx => to_xlsx(records),
        ExportFormat::Zip => to_zip_bundle(records, units),
    }
}

static ABSENT: FieldValue = FieldValue::Absent;

/// A cell before formatting.
enum Cell<'a> {
    Serial(usize),
    Value(&'a FieldValue),
    Text(&'a str),
}

fn row_cells(index: usize, record: &ExtractedRecord) -> impl Iterator<Item = Cell<'_>> {
    COLUMN_SOURCES.iter().map(move |source| match source {
        ColumnSource::SerialNumber => Cell::Serial(index + 1),
        ColumnSource::Field(key) => Cell::Value(record.fields.get(*key).unwrap_or(&ABSENT)),
        ColumnSource::FileName => Cell::Text(&record.source_file_name),
    })
}

/// Render records as CSV.
///
/// The header is unquoted. In data rows the serial number is bare and every
/// other value is quoted with embedded quotes doubled; absent values are
/// empty quoted strings. Rows end with `\n`, with none after the last.
pub fn to_csv(records: &[ExtractedRecord]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(EXPORT_COLUMNS.join(","));

    for (index, record) in records.iter().enumerate() {
        let values: Vec<String> = row_cells(index, record)
            .map(|cell| match cell {
                Cell::Serial(n) => n.to_string(),
                Cell::Value(value) => quote(&value.to_string()),
                Cell::Text(text) => quote(text),
            })
            .collect();
        lines.push(values.join(","));
    }

    lines.join("\n")
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const RELATIONSHIPS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Render records as a single-sheet XLSX workbook.
///
/// Serial numbers and numeric fields become numeric cells, everything else
/// inline strings. Absent values leave the cell out.
pub fn to_xlsx(records: &[ExtractedRecord]) -> Result<Vec<u8>, IngestError> {
    let parts: [(&str, Vec<u8>); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.as_bytes().to_vec()),
        ("_rels/.rels", ROOT_RELS_XML.as_bytes().to_vec()),
        ("xl/workbook.xml", workbook_xml()?),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML.as_bytes().to_vec()),
        ("xl/worksheets/sheet1.xml", sheet_xml(records)?),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in parts {
        write_zip_file(&mut zip, name, &data)?;
    }
    finish_zip(zip)
}

fn workbook_xml() -> Result<Vec<u8>, IngestError> {
    let mut writer = xml_writer()?;
    write_xml(
        &mut writer,
        Event::Start(
            BytesStart::new("workbook")
                .with_attributes([("xmlns", SPREADSHEET_NS), ("xmlns:r", RELATIONSHIPS_NS)]),
        ),
    )?;
    write_xml(&mut writer, Event::Start(BytesStart::new("sheets")))?;
    write_xml(
        &mut writer,
        Event::Empty(BytesStart::new("sheet").with_attributes([
            ("name", SHEET_NAME),
            ("sheetId", "1"),
            ("r:id", "rId1"),
        ])),
    )?;
    write_xml(&mut writer, Event::End(BytesEnd::new("sheets")))?;
    write_xml(&mut writer, Event::End(BytesEnd::new("workbook")))?;
    Ok(writer.into_inner().into_inner())
}

fn sheet_xml(records: &[ExtractedRecord]) -> Result<Vec<u8>, IngestError> {
    let mut writer = xml_writer()?;
    write_xml(
        &mut writer,
        Event::Start(BytesStart::new("worksheet").with_attributes([("xmlns", SPREADSHEET_NS)])),
    )?;
    write_xml(&mut writer, Event::Start(BytesStart::new("sheetData")))?;

    let header = EXPORT_COLUMNS.iter().map(|c| Cell::Text(c));
    write_row(&mut writer, 1, header)?;
    for (index, record) in records.iter().enumerate() {
        write_row(&mut writer, index + 2, row_cells(index, record))?;
    }

    write_xml(&mut writer, Event::End(BytesEnd::new("sheetData")))?;
    write_xml(&mut writer, Event::End(BytesEnd::new("worksheet")))?;
    Ok(writer.into_inner().into_inner())
}

fn write_row<'a>(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    row: usize,
    cells: impl Iterator<Item = Cell<'a>>,
) -> Result<(), IngestError> {
    let row_ref = row.to_string();
    write_xml(
        writer,
        Event::Start(BytesStart::new("row").with_attributes([("r", row_ref.as_str())])),
    )?;

    for (col, cell) in cells.enumerate() {
        let cell_ref = format!("{}{}", column_letter(col), row);
        match cell {
            Cell::Serial(n) => write_number(writer, &cell_ref, n as f64)?,
            Cell::Value(FieldValue::Number(n)) => write_number(writer, &cell_ref, *n)?,
            Cell::Value(FieldValue::Text(s)) => write_inline_string(writer, &cell_ref, s)?,
            Cell::Value(FieldValue::Absent) => {}
            Cell::Text(s) => write_inline_string(writer, &cell_ref, s)?,
        }
    }

    write_xml(writer, Event::End(BytesEnd::new("row")))
}

fn write_number(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    cell_ref: &str,
    value: f64,
) -> Result<(), IngestError> {
    write_xml(
        writer,
        Event::Start(BytesStart::new("c").with_attributes([("r", cell_ref)])),
    )?;
    write_xml(writer, Event::Start(BytesStart::new("v")))?;
    write_xml(writer, Event::Text(BytesText::new(&value.to_string())))?;
    write_xml(writer, Event::End(BytesEnd::new("v")))?;
    write_xml(writer, Event::End(BytesEnd::new("c")))
}

fn write_inline_string(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    cell_ref: &str,
    value: &str,
) -> Result<(), IngestError> {
    write_xml(
        writer,
        Event::Start(
            BytesStart::new("c").with_attributes([("r", cell_ref), ("t", "inlineStr")]),
        ),
    )?;
    write_xml(writer, Event::Start(BytesStart::new("is")))?;
    write_xml(
        writer,
        Event::Start(BytesStart::new("t").with_attributes([("xml:space", "preserve")])),
    )?;
    write_xml(writer, Event::Text(BytesText::new(value)))?;
    write_xml(writer, Event::End(BytesEnd::new("t")))?;
    write_xml(writer, Event::End(BytesEnd::new("is")))?;
    write_xml(writer, Event::End(BytesEnd::new("c")))
}

/// Spreadsheet column letter for a 0-based index (A, B, ..., Z, AA, ...).
fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).to_string()
}

fn xml_writer() -> Result<Writer<Cursor<Vec<u8>>>, IngestError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_xml(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))),
    )?;
    Ok(writer)
}

fn write_xml(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), IngestError> {
    writer
        .write_event(event)
        .map_err(|e| IngestError::Export(format!("Failed to write workbook XML: {}", e)))
}

/// Bundle the workbook with the original bytes of every `done` unit.
///
/// Documents keep their names where safe; unsafe or clashing names are
/// rewritten so every document gets its own entry.
pub fn to_zip_bundle(
    records: &[ExtractedRecord],
    units: &[DocumentUnit],
) -> Result<Vec<u8>, IngestError> {
    let mut names = UniqueNames::new();
    names.assign(BUNDLE_WORKBOOK_NAME);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    write_zip_file(&mut zip, BUNDLE_WORKBOOK_NAME, &to_xlsx(records)?)?;

    for unit in units.iter().filter(|u| u.status == UnitStatus::Done) {
        let (bytes, _) = unit.content.decode().map_err(|e| {
            IngestError::Export(format!("Cannot bundle {}: {}", unit.name, e))
        })?;
        let name = names.assign(&unit.name);
        debug!(unit = %unit.name, entry = %name, bytes = bytes.len(), "bundling document");
        write_zip_file(&mut zip, &name, &bytes)?;
    }

    finish_zip(zip)
}

fn write_zip_file(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    data: &[u8],
) -> Result<(), IngestError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name, options)
        .map_err(|e| IngestError::Export(format!("Failed to add {}: {}", name, e)))?;
    zip.write_all(data)
        .map_err(|e| IngestError::Export(format!("Failed to write {}: {}", name, e)))
}

fn finish_zip(zip: ZipWriter<Cursor<Vec<u8>>>) -> Result<Vec<u8>, IngestError> {
    zip.finish()
        .map(Cursor::into_inner)
        .map_err(|e| IngestError::Export(format!("Failed to finish archive: {}", e)))
}
