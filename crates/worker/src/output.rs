// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use ax_core::{JobId, JobStatus};
use clap::ValueEnum;
use serde::Serialize;

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// What happened to one requested job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub job_id: JobId,
    /// Terminal (or handed-off) status; `None` when the job never started.
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn finished(job_id: JobId, status: JobStatus) -> Self {
        Self { job_id, status: Some(status), error: None }
    }

    pub fn fatal(job_id: JobId, error: impl Into<String>) -> Self {
        Self { job_id, status: None, error: Some(error.into()) }
    }

    pub fn is_successful(&self) -> bool {
        self.status == Some(JobStatus::Successful)
    }
}

/// One line per job: `<id>  <status>` or `<id>  error: <message>`.
pub fn format_outcomes(outcomes: &[JobOutcome]) -> String {
    let id_w = outcomes.iter().map(|o| o.job_id.to_string().len()).max().unwrap_or(0).max(2);
    let mut out = format!("{:<id_w$}  STATUS\n", "ID");
    for outcome in outcomes {
        let status = match (&outcome.status, &outcome.error) {
            (Some(status), _) => status.to_string(),
            (None, Some(error)) => format!("error: {error}"),
            (None, None) => "-".to_string(),
        };
        out.push_str(&format!("{:<id_w$}  {status}\n", outcome.job_id.to_string()));
    }
    out
}

pub fn print_outcomes(outcomes: &[JobOutcome], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => print!("{}", format_outcomes(outcomes)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcomes)?),
    }
    Ok(())
}
