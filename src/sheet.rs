use std::io::Read;
use std::path::Path;

use anyhow::Context;
use csv::StringRecord;

use crate::models::RawGuestRow;

// Column positions in the guest spreadsheet (Nombre, Apellido, Correo electrónico, ...).
const FIRST_NAME: usize = 0;
const LAST_NAME: usize = 1;
const EMAIL: usize = 2;
const PHONE: usize = 3;
const CITY: usize = 6;
const COUNTRY: usize = 7;
const POSTAL_CODE: usize = 9;
const NIGHTS: usize = 11;
const LAST_STAY: usize = 13;

/// Reads a spreadsheet saved as CSV. The header row is skipped and row numbers
/// match the spreadsheet's, so the first guest is row 2.
pub fn read_rows(path: &Path) -> anyhow::Result<Vec<RawGuestRow>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open spreadsheet export {}", path.display()))?;
    read_from(file).with_context(|| format!("failed to read {}", path.display()))
}

pub fn read_from<R: Read>(input: R) -> anyhow::Result<Vec<RawGuestRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let mut rows = Vec::new();
    for (offset, result) in reader.records().enumerate() {
        let record = result?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(to_row(offset + 2, &record));
    }
    Ok(rows)
}

fn to_row(row_number: usize, record: &StringRecord) -> RawGuestRow {
    let cell = |index: usize| {
        record
            .get(index)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    RawGuestRow {
        row_number,
        first_name: cell(FIRST_NAME),
        last_name: cell(LAST_NAME),
        email: cell(EMAIL),
        phone: cell(PHONE),
        city: cell(CITY),
        country: cell(COUNTRY),
        postal_code: cell(POSTAL_CODE),
        nights: cell(NIGHTS),
        last_stay: cell(LAST_STAY),
    }
}
