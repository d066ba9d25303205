use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NormalizationError;

/// A CI job exactly as fetched from GitLab (or read back from the cache).
///
/// Identifiers are optional and timestamps are kept as the raw RFC 3339
/// strings returned by the API; [`normalize`] decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawJob {
    pub id: Option<u64>,
    pub project_id: Option<u64>,
    pub pipeline_id: Option<u64>,
    /// Job name as defined in .gitlab-ci.yml
    pub name: String,
    /// Free-form runner description; empty when no runner picked the job up
    #[serde(default)]
    pub runner_description: String,
    pub status: String,
    pub created_at: Option<String>,
    /// When the job entered the queue
    pub queued_at: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub tag_list: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failed,
    Canceled,
    Skipped,
    Other,
}

impl JobStatus {
    /// Maps a platform status string onto the closed set of statuses.
    ///
    /// Statuses this tool does not know about become [`JobStatus::Other`].
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "success" => Self::Success,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            "skipped" => Self::Skipped,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job with validated identifiers and derived durations (in seconds).
///
/// Both durations are either non-negative or `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedJob {
    pub id: u64,
    pub project_id: u64,
    pub pipeline_id: Option<u64>,
    pub name: String,
    pub runner_description: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub queue_duration: Option<f64>,
    pub run_duration: Option<f64>,
}

impl NormalizedJob {
    /// Queue plus run time, only when both are known.
    pub fn total_duration(&self) -> Option<f64> {
        Some(self.queue_duration? + self.run_duration?)
    }
}

/// Converts a raw job into a [`NormalizedJob`].
///
/// # Errors
///
/// Returns [`NormalizationError`] when an identifier or the creation time is
/// missing, or when any present timestamp fails to parse. Missing start,
/// queue or finish times are not errors; they only null out the durations
/// that depend on them.
pub fn normalize(raw: RawJob) -> Result<NormalizedJob, NormalizationError> {
    let id = raw.id.ok_or(NormalizationError::MissingIdentifier("job"))?;
    let project_id = raw
        .project_id
        .ok_or(NormalizationError::MissingIdentifier("project"))?;

    let created_at = parse_timestamp(id, "created_at", raw.created_at.as_deref())?
        .ok_or(NormalizationError::MissingTimestamp { job_id: id })?;
    let queued_at = parse_timestamp(id, "queued_at", raw.queued_at.as_deref())?;
    let started_at = parse_timestamp(id, "started_at", raw.started_at.as_deref())?;
    let finished_at = parse_timestamp(id, "finished_at", raw.finished_at.as_deref())?;

    Ok(NormalizedJob {
        id,
        project_id,
        pipeline_id: raw.pipeline_id,
        name: raw.name,
        runner_description: raw.runner_description,
        status: JobStatus::parse(&raw.status),
        created_at,
        queue_duration: duration_between(queued_at, started_at),
        run_duration: duration_between(started_at, finished_at),
    })
}

fn parse_timestamp(
    job_id: u64,
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, NormalizationError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    DateTime::parse_from_rfc3339(value)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|_| NormalizationError::MalformedTimestamp {
            job_id,
            field,
            value: value.to_string(),
        })
}

#[allow(clippy::cast_precision_loss)]
fn duration_between(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Option<f64> {
    let elapsed = to? - from?;
    let millis = elapsed.num_milliseconds();
    (millis >= 0).then(|| millis as f64 / 1000.0)
}
