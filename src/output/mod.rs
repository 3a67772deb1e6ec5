//! Job results output
//!
//! - `text`: the tab-separated report, one line per plate
//! - `json`: optional machine-readable summary

pub mod json;
pub mod text;

pub use json::{build_job_summary, write_json_output};
pub use text::{report_path, write_report};
