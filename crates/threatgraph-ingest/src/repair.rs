//! Repair for exports that concatenate JSON objects without separators

use crate::error::{IngestError, IngestResult};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Serializer, Value};
use std::path::Path;
use tracing::info;

/// Join newline-adjacent objects into one array and validate it.
///
/// Only a `}` immediately followed by a newline and `{` is treated as an
/// object boundary.
pub fn repair_concatenated(raw: &str) -> IngestResult<Value> {
    let fixed = format!("[\n{}\n]", raw.replace("}\n{", "},\n{"));
    Ok(serde_json::from_str(&fixed)?)
}

/// Render with four-space indentation
pub fn to_pretty_json(value: &Value) -> IngestResult<String> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(|e| IngestError::Format(e.to_string()))
}

/// Repair `input` into `output`. Nothing is written when the repaired text
/// is not valid JSON. Returns the number of records.
pub async fn repair_file(input: &Path, output: &Path) -> IngestResult<usize> {
    let raw = tokio::fs::read_to_string(input)
        .await
        .map_err(|e| IngestError::io(input, e))?;

    let repaired = repair_concatenated(&raw)?;
    let records = repaired.as_array().map_or(0, Vec::len);
    let pretty = to_pretty_json(&repaired)?;

    tokio::fs::write(output, pretty)
        .await
        .map_err(|e| IngestError::io(output, e))?;

    info!(
        input = %input.display(),
        output = %output.display(),
        records,
        "Repaired JSON export"
    );
    Ok(records)
}
