//! JSON serialization for summaries and comparisons.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::result::{Comparison, Summary};

/// Serialize a record to a compact JSON string.
pub fn to_json<T: Serialize>(record: &T) -> Result<String> {
    Ok(serde_json::to_string(record)?)
}

/// Serialize a record to a pretty-printed JSON string.
pub fn to_json_pretty<T: Serialize>(record: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(record)?)
}

fn write_pretty<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let json = to_json_pretty(record)?;
    fs::write(path, json).map_err(|e| Error::io(path, e))
}

fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(serde_json::from_str(&text)?)
}

/// Write a summary record.
pub fn write_summary(path: &Path, summary: &Summary) -> Result<()> {
    write_pretty(path, summary)
}

/// Read a summary record written by [`write_summary`].
pub fn read_summary(path: &Path) -> Result<Summary> {
    read(path)
}

/// Write a comparison record.
pub fn write_comparison(path: &Path, comparison: &Comparison) -> Result<()> {
    write_pretty(path, comparison)
}
