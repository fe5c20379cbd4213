use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use melodex_core::RawRow;
use serde_json::Value;

/// Reads catalog rows from a JSON array of objects or from JSON Lines.
///
/// Blank lines are skipped; any non-object record is an error so a truncated
/// export is not silently half-loaded.
pub fn load_rows(path: &Path) -> Result<Vec<RawRow>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read catalog file `{}`", path.display()))?;
    parse_rows(&raw).with_context(|| format!("could not parse catalog file `{}`", path.display()))
}

pub fn parse_rows(raw: &str) -> Result<Vec<RawRow>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        let values: Vec<Value> =
            serde_json::from_str(trimmed).context("catalog is not a valid JSON array")?;
        return values
            .into_iter()
            .enumerate()
            .map(|(position, value)| into_row(value, position + 1, "element"))
            .collect();
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(position, line)| {
            let value: Value = serde_json::from_str(line)
                .with_context(|| format!("line {} is not valid JSON", position + 1))?;
            into_row(value, position + 1, "line")
        })
        .collect()
}

fn into_row(value: Value, position: usize, unit: &str) -> Result<RawRow> {
    match value {
        Value::Object(row) => Ok(row),
        other => bail!("{unit} {position} is not a JSON object (found {})", kind(&other)),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
