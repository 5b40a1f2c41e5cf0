//! Output formatting and artifacts.
//!
//! - [`json`]: summary and comparison records
//! - [`maps`]: staged publication of the summary and per-voxel maps
//! - [`terminal`]: human-readable reports

pub mod json;
pub mod maps;
pub mod terminal;

pub use json::{read_summary, to_json, to_json_pretty, write_comparison, write_summary};
pub use maps::{write_artifacts, COMPARISON_FILE, SUMMARY_FILE};
pub use terminal::{format_comparison, format_summary};
