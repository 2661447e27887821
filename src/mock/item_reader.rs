//! Item loading for `itemReader` mocks.
//!
//! Supports the four data formats DistributedMap item sources use locally:
//! a JSON array, JSON Lines, CSV (rows become objects keyed by header), and
//! a YAML sequence. Any failure to produce items is a
//! `States.ItemReaderFailed` fault.

use std::path::Path;

use serde_json::{Map, Value};

use super::config::DataFormat;
use crate::errors::StatesError;

/// Load the item list from `path`, inferring the format from the file
/// extension when `format` is not set.
pub fn load_items(path: &Path, format: Option<DataFormat>) -> Result<Vec<Value>, StatesError> {
    let format = match format {
        Some(format) => format,
        None => infer_format(path)?,
    };

    let text = std::fs::read_to_string(path).map_err(|err| {
        StatesError::item_reader_failed(format!("cannot read '{}': {err}", path.display()))
    })?;

    match format {
        DataFormat::Json => {
            let value: Value = serde_json::from_str(&text).map_err(|err| {
                StatesError::item_reader_failed(format!(
                    "invalid JSON in '{}': {err}",
                    path.display()
                ))
            })?;
            as_item_array(value, path)
        }
        DataFormat::Jsonl => {
            let mut items = Vec::new();
            for (number, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let item: Value = serde_json::from_str(line).map_err(|err| {
                    StatesError::item_reader_failed(format!(
                        "invalid JSON on line {} of '{}': {err}",
                        number + 1,
                        path.display()
                    ))
                })?;
                items.push(item);
            }
            Ok(items)
        }
        DataFormat::Csv => {
            let mut reader = csv::Reader::from_reader(text.as_bytes());
            let headers = reader
                .headers()
                .map_err(|err| {
                    StatesError::item_reader_failed(format!(
                        "invalid CSV header in '{}': {err}",
                        path.display()
                    ))
                })?
                .clone();
            let mut items = Vec::new();
            for record in reader.records() {
                let record = record.map_err(|err| {
                    StatesError::item_reader_failed(format!(
                        "invalid CSV record in '{}': {err}",
                        path.display()
                    ))
                })?;
                let mut row = Map::new();
                for (header, field) in headers.iter().zip(record.iter()) {
                    row.insert(header.to_string(), Value::String(field.to_string()));
                }
                items.push(Value::Object(row));
            }
            Ok(items)
        }
        DataFormat::Yaml => {
            let value: Value = serde_yaml::from_str(&text).map_err(|err| {
                StatesError::item_reader_failed(format!(
                    "invalid YAML in '{}': {err}",
                    path.display()
                ))
            })?;
            as_item_array(value, path)
        }
    }
}

fn as_item_array(value: Value, path: &Path) -> Result<Vec<Value>, StatesError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(StatesError::item_reader_failed(format!(
            "'{}' must contain an array of items, found {}",
            path.display(),
            type_label(&other)
        ))),
    }
}

fn infer_format(path: &Path) -> Result<DataFormat, StatesError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("json") => Ok(DataFormat::Json),
        Some("jsonl" | "ndjson") => Ok(DataFormat::Jsonl),
        Some("csv") => Ok(DataFormat::Csv),
        Some("yaml" | "yml") => Ok(DataFormat::Yaml),
        _ => Err(StatesError::item_reader_failed(format!(
            "cannot infer data format of '{}'; set dataFormat explicitly",
            path.display()
        ))),
    }
}

fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
