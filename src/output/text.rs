//! Tab-separated job report
//!
//! One line per plate, in job order, no header:
//!
//! ```text
//! name      \ttime_step\tdiffusiv\tspacin\tepsilo\tstates\tYYYY/MM/DD\thh:mm:ss<padding>
//! ```
//!
//! Column widths and number rendering follow C's `printf` with
//! `%-10s %9lu %8.6g %6.6g %6.6g %6lu %-48s`, so existing report consumers
//! can compare files byte for byte.

use crate::error::HeatError;
use crate::job::{Job, Plate, PlateOutcome};
use crate::util::time::format_simulated_time;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Report location for `job`: `<report_dir>/<job_stem>.tsv`
pub fn report_path(report_dir: &Path, job: &Job) -> PathBuf {
    report_dir.join(format!("{}.tsv", job.stem()))
}

/// Report line for one plate, newline included
///
/// Plates without a state count (skipped or never processed) show `-` and
/// an empty time column.
pub fn report_line(plate: &Plate) -> String {
    let (states, elapsed) = match &plate.outcome {
        Some(PlateOutcome::Equilibrated { states }) => (
            states.to_string(),
            format_simulated_time(plate.simulated_seconds(*states)),
        ),
        _ => ("-".to_string(), String::new()),
    };

    format!(
        "{:<10}\t{:>9}\t{:>8}\t{:>6}\t{:>6}\t{:>6}\t{:<48}\n",
        plate.file_name,
        plate.time_step,
        format_g(plate.diffusivity, 6),
        format_g(plate.spacing, 6),
        format_g(plate.epsilon, 6),
        states,
        elapsed
    )
}

/// Write the report for every plate of `job` to `path`
pub fn write_report(path: &Path, job: &Job) -> Result<(), HeatError> {
    let file = File::create(path).map_err(|e| HeatError::io("Could not open results file", path, e))?;
    let mut writer = BufWriter::new(file);

    for plate in &job.plates {
        writer
            .write_all(report_line(plate).as_bytes())
            .map_err(|e| HeatError::io("Could not write results file", path, e))?;
    }
    writer
        .flush()
        .map_err(|e| HeatError::io("Could not write results file", path, e))
}

/// `value` as C's `%.{precision}g` renders it
///
/// Scientific notation when the decimal exponent is below -4 or at least
/// the precision, fixed notation otherwise; trailing zeros are removed
/// either way.
pub fn format_g(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return if value.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }

    let precision = precision.max(1);

    // The exponent after rounding to `precision` significant digits
    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.unsigned_abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

/// Drop trailing fractional zeros and a dangling decimal point
fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}
