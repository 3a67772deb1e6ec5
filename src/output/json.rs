//! JSON job summary
//!
//! Same per-plate data as the TSV report, plus the run layout and wall-clock
//! timings, for consumption by scripts.

use crate::config::Config;
use crate::job::{Job, PlateOutcome};
use crate::util::time::{format_duration, format_simulated_time};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Duration with both microseconds and human-readable format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDuration {
    pub micros: u64,
    pub human: String,
}

impl JsonDuration {
    pub fn from_duration(d: Duration) -> Self {
        Self {
            micros: d.as_micros() as u64,
            human: format_duration(d),
        }
    }
}

/// One plate's line of the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPlate {
    pub file_name: String,
    pub time_step: u64,
    pub diffusivity: f64,
    pub spacing: f64,
    pub epsilon: f64,
    /// `equilibrated`, `skipped` or `pending`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub states: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulated_seconds: Option<u64>,
    /// Same rendering as the TSV report
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulated_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

/// Run layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRunInfo {
    pub started_at: DateTime<Utc>,
    pub wall_time: JsonDuration,
    pub processes: usize,
    pub threads: usize,
    pub strategy: String,
}

/// Complete summary file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonJobSummary {
    pub job_file: PathBuf,
    pub report_file: PathBuf,
    pub output_dir: PathBuf,
    pub run: JsonRunInfo,
    pub plates: Vec<JsonPlate>,
}

/// Summary of a finished job
pub fn build_job_summary(
    config: &Config,
    job: &Job,
    processes: usize,
    report_file: &Path,
    started_at: DateTime<Utc>,
    wall_time: Duration,
) -> JsonJobSummary {
    let plates = job
        .plates
        .iter()
        .map(|plate| {
            let mut entry = JsonPlate {
                file_name: plate.file_name.clone(),
                time_step: plate.time_step,
                diffusivity: plate.diffusivity,
                spacing: plate.spacing,
                epsilon: plate.epsilon,
                status: "pending".to_string(),
                states: None,
                simulated_seconds: None,
                simulated_time: None,
                skip_reason: None,
            };
            match &plate.outcome {
                Some(PlateOutcome::Equilibrated { states }) => {
                    let seconds = plate.simulated_seconds(*states);
                    entry.status = "equilibrated".to_string();
                    entry.states = Some(*states);
                    entry.simulated_seconds = Some(seconds);
                    entry.simulated_time = Some(format_simulated_time(seconds));
                }
                Some(PlateOutcome::Skipped { reason }) => {
                    entry.status = "skipped".to_string();
                    entry.skip_reason = Some(reason.clone());
                }
                None => {}
            }
            entry
        })
        .collect();

    JsonJobSummary {
        job_file: job.path.clone(),
        report_file: report_file.to_path_buf(),
        output_dir: config.output_dir(),
        run: JsonRunInfo {
            started_at,
            wall_time: JsonDuration::from_duration(wall_time),
            processes,
            threads: config.workers.threads,
            strategy: config.workers.strategy.to_string(),
        },
        plates,
    }
}

/// Write JSON output to file
pub fn write_json_output(output_path: &Path, summary: &JsonJobSummary) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create JSON output: {}", output_path.display()))?;

    serde_json::to_writer_pretty(BufWriter::new(file), summary)
        .with_context(|| format!("Failed to write JSON output: {}", output_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn finished_job() -> Job {
        let mut job = Job::parse(Path::new("jobs/job.txt"), "a.bin 60 1 1 1\nb.bin 1 1 1 1\n").unwrap();
        job.record(0, PlateOutcome::Equilibrated { states: 10 });
        job.record(
            1,
            PlateOutcome::Skipped {
                reason: "unreadable".to_string(),
            },
        );
        job
    }

    #[test]
    fn test_summary_reflects_outcomes() {
        let summary = build_job_summary(
            &Config::default(),
            &finished_job(),
            2,
            Path::new("reports/job.tsv"),
            Utc::now(),
            Duration::from_millis(1500),
        );

        assert_eq!(summary.run.processes, 2);
        assert_eq!(summary.run.wall_time.micros, 1_500_000);
        assert_eq!(summary.plates[0].status, "equilibrated");
        assert_eq!(summary.plates[0].simulated_seconds, Some(600));
        assert_eq!(summary.plates[0].simulated_time.as_deref(), Some("0000/00/00\t00:10:00"));
        assert_eq!(summary.plates[1].status, "skipped");
        assert_eq!(summary.plates[1].states, None);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.json");
        let summary = build_job_summary(
            &Config::default(),
            &finished_job(),
            1,
            Path::new("job.tsv"),
            Utc::now(),
            Duration::from_secs(1),
        );

        write_json_output(&path, &summary).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: JsonJobSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, summary);
        // Skipped plates carry no state fields
        assert!(!text.contains("\"states\": null"));
    }
}
