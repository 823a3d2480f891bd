//! Device record CSV format
//!
//! Records travel as one line of three double-quoted fields:
//! `"esp32-01","1.2.0","fw_1.2.0.bin"`. Quotes inside a field are doubled.

use super::error::{FotaError, Result};
use super::registry::DeviceRecord;

const FIELD_COUNT: usize = 3;

/// Parse the first record of `body`. Later lines are ignored.
pub fn parse_record(body: &str) -> Result<DeviceRecord> {
    let fields = first_row(body)?;

    if fields.len() != FIELD_COUNT {
        return Err(FotaError::malformed(format!(
            "expected {} fields, found {}",
            FIELD_COUNT,
            fields.len()
        )));
    }

    let mut fields = fields.into_iter();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(device_id), Some(desired_version), Some(firmware_ref)) => Ok(DeviceRecord {
            device_id,
            desired_version,
            firmware_ref,
        }),
        _ => Err(FotaError::malformed("incomplete record")),
    }
}

fn first_row(body: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => break,
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(FotaError::malformed("unterminated quoted field"));
    }
    if fields.is_empty() && field.is_empty() {
        return Err(FotaError::malformed("empty record"));
    }
    fields.push(field);
    Ok(fields)
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

pub fn format_record(record: &DeviceRecord) -> String {
    format!(
        "{},{},{}\n",
        quote(&record.device_id),
        quote(&record.desired_version),
        quote(&record.firmware_ref)
    )
}

pub fn format_records(records: &[DeviceRecord]) -> String {
    records.iter().map(format_record).collect()
}
