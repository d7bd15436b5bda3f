//! Spreadsheet store: CSV (UTF-8 or CP949) and Excel input, CSV output.

use crate::domain::model::{ColumnMapping, ContactResult, InputSheet, InstitutionRow, OwnerMatch};
use crate::domain::services::phone::is_blank;
use crate::domain::services::reference::ReferenceEntry;
use crate::utils::error::{EtlError, Result};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use std::borrow::Cow;
use std::io::Cursor;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

pub const RESULT_COLUMNS: &[&str] = &[
    "추출_전화번호",
    "추출_팩스번호",
    "전화_출처",
    "팩스_출처",
    "전화_분류",
    "팩스_검증",
    "기존팩스_검증",
    "참조_라벨",
    "발견_홈페이지",
    "전화_기관명",
    "팩스_기관명",
    "신뢰도",
    "오류",
    "처리_시간",
];

/// Header row plus records, whatever file format they came from.
struct Table {
    headers: Vec<String>,
    records: Vec<Vec<String>>,
}

impl Table {
    fn column(&self, candidates: &[String]) -> Option<usize> {
        find_column(&self.headers, candidates)
    }
}

fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase()
}

fn find_column(headers: &[String], candidates: &[String]) -> Option<usize> {
    let squashed: Vec<String> = headers.iter().map(|h| squash(h)).collect();
    candidates
        .iter()
        .find_map(|c| squashed.iter().position(|h| *h == squash(c)))
}

fn cell(record: &[String], column: Option<usize>) -> String {
    column
        .and_then(|i| record.get(i))
        .map(|v| v.trim())
        .filter(|v| !is_blank(v))
        .unwrap_or_default()
        .to_string()
}

/// UTF-8 text without its BOM; anything else is read as CP949 (EUC-KR superset).
fn decode_text(data: &[u8]) -> Cow<'_, str> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    if let Ok(text) = std::str::from_utf8(data) {
        return Cow::Borrowed(text);
    }
    let (text, _, had_errors) = encoding_rs::EUC_KR.decode(data);
    if had_errors {
        tracing::warn!("⚠️ input is neither UTF-8 nor clean CP949; some characters were replaced");
    } else {
        tracing::debug!("Decoded input as CP949");
    }
    text
}

fn read_csv(data: &[u8]) -> Result<Table> {
    let text = decode_text(data);
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    for record in rdr.records() {
        records.push(record?.iter().map(str::to_string).collect());
    }
    Ok(Table { headers, records })
}

/// Text of an Excel cell; whole numbers lose their `.0`.
fn cell_text(value: &Data) -> String {
    match value {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn read_xlsx(data: &[u8]) -> Result<Table> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(data))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EtlError::ValidationError {
            message: "workbook has no sheets".to_string(),
        })??;

    let mut rows = range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    let headers: Vec<String> = rows
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    let records = rows
        .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
        .collect();
    Ok(Table { headers, records })
}

/// Excel workbooks are zip archives; everything else is treated as CSV.
fn read_table(data: &[u8]) -> Result<Table> {
    if data.starts_with(ZIP_MAGIC) {
        tracing::debug!("Reading input as an Excel workbook");
        read_xlsx(data)
    } else {
        read_csv(data)
    }
}

/// Parse an input sheet (CSV or xlsx) into rows, keeping every original cell.
pub fn read_sheet(data: &[u8], mapping: &ColumnMapping) -> Result<InputSheet> {
    let table = read_table(data)?;

    let name_col = table.column(&mapping.name);
    if name_col.is_none() {
        return Err(EtlError::ValidationError {
            message: format!(
                "no institution name column; expected one of: {}",
                mapping.name.join(", ")
            ),
        });
    }
    let address_col = table.column(&mapping.address);
    let phone_col = table.column(&mapping.phone);
    let fax_col = table.column(&mapping.fax);
    let homepage_col = table.column(&mapping.homepage);
    let phone_owner_col = table.column(&mapping.phone_owner);
    let fax_owner_col = table.column(&mapping.fax_owner);

    tracing::debug!(
        "Column mapping: name={:?} address={:?} phone={:?} fax={:?} homepage={:?}",
        name_col,
        address_col,
        phone_col,
        fax_col,
        homepage_col
    );

    let width = table.headers.len();
    let rows = table
        .records
        .into_iter()
        .enumerate()
        .map(|(index, mut cells)| {
            cells.resize(width, String::new());
            InstitutionRow {
                index,
                name: cell(&cells, name_col),
                address: cell(&cells, address_col),
                phone: cell(&cells, phone_col),
                fax: cell(&cells, fax_col),
                homepage: cell(&cells, homepage_col),
                phone_owner: cell(&cells, phone_owner_col),
                fax_owner: cell(&cells, fax_owner_col),
                cells,
            }
        })
        .collect();

    Ok(InputSheet {
        headers: table.headers,
        rows,
    })
}

/// Parse a reference dataset (name/phone/fax with optional sido/gugun).
pub fn read_reference(data: &[u8]) -> Result<Vec<ReferenceEntry>> {
    let table = read_table(data)?;
    let col = |names: &[&str]| {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        table.column(&names)
    };
    let name_col = col(&["center_name", "기관명", "name", "교회명"]);
    let phone_col = col(&["phone", "전화번호"]);
    let fax_col = col(&["fax", "팩스번호"]);
    let sido_col = col(&["sido", "시도"]);
    let gugun_col = col(&["gugun", "시군구", "구군"]);

    Ok(table
        .records
        .iter()
        .map(|cells| ReferenceEntry {
            sido: cell(cells, sido_col),
            gugun: cell(cells, gugun_col),
            name: cell(cells, name_col),
            phone: cell(cells, phone_col),
            fax: cell(cells, fax_col),
        })
        .collect())
}

fn result_cells(result: &ContactResult) -> Vec<String> {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    let owner = |v: &Option<OwnerMatch>| v.as_ref().map(|m| m.name.clone()).unwrap_or_default();
    vec![
        opt(&result.extracted_phone),
        opt(&result.extracted_fax),
        result.phone_source.map(|s| s.to_string()).unwrap_or_default(),
        result.fax_source.map(|s| s.to_string()).unwrap_or_default(),
        result.phone_class.map(|c| c.to_string()).unwrap_or_default(),
        result.fax_verdict.as_ref().map(ToString::to_string).unwrap_or_default(),
        result
            .existing_fax_verdict
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        opt(&result.reference_label),
        opt(&result.discovered_homepage),
        owner(&result.phone_owner),
        owner(&result.fax_owner),
        format!("{:.0}", result.confidence),
        opt(&result.error),
        result.processed_at.clone(),
    ]
}

/// Render results as a BOM-prefixed CSV: original columns then result columns.
pub fn write_results(headers: &[String], results: &[ContactResult]) -> Result<Vec<u8>> {
    let mut buf = UTF8_BOM.to_vec();
    {
        let mut wtr = csv::Writer::from_writer(&mut buf);
        let header_row: Vec<&str> = headers
            .iter()
            .map(String::as_str)
            .chain(RESULT_COLUMNS.iter().copied())
            .collect();
        wtr.write_record(&header_row)?;

        for result in results {
            let mut row = result.row.cells.clone();
            row.resize(headers.len(), String::new());
            row.extend(result_cells(result));
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
    }
    Ok(buf)
}
