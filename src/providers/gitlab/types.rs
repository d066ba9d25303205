use chrono::{DateTime, Duration, SecondsFormat};
use serde::Deserialize;

use crate::analysis::job::RawJob;

/// A GitLab project as returned by `GET /projects/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabProject {
    pub id: u64,
    pub path_with_namespace: String,
}

/// A CI job as returned by `GET /projects/:id/jobs`.
///
/// Every field GitLab may omit or null is optional; validation happens in
/// the normalizer, not here.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabJob {
    pub id: Option<u64>,
    /// Job name as defined in .gitlab-ci.yml
    #[serde(default)]
    pub name: String,
    /// Final job status (e.g., "success", "failed")
    #[serde(default)]
    pub status: String,
    pub created_at: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    /// Seconds spent waiting for a runner
    pub queued_duration: Option<f64>,
    pub runner: Option<GitLabRunner>,
    pub pipeline: Option<GitLabPipelineRef>,
    pub web_url: Option<String>,
    #[serde(default)]
    pub tag_list: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabRunner {
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitLabPipelineRef {
    pub id: Option<u64>,
    pub project_id: Option<u64>,
}

impl GitLabJob {
    /// Converts the API record into a [`RawJob`].
    ///
    /// The REST API reports queueing as a duration rather than a timestamp,
    /// so the enqueue time is reconstructed as `started_at - queued_duration`.
    /// Jobs listed under a project belong to it, so `project_id` fills in
    /// when the embedded pipeline does not carry one.
    pub fn into_raw_job(self, project_id: u64) -> RawJob {
        let queued_at = derive_queued_at(self.started_at.as_deref(), self.queued_duration);

        RawJob {
            id: self.id,
            project_id: self
                .pipeline
                .as_ref()
                .and_then(|p| p.project_id)
                .or(Some(project_id)),
            pipeline_id: self.pipeline.as_ref().and_then(|p| p.id),
            name: self.name,
            runner_description: self
                .runner
                .and_then(|r| r.description)
                .unwrap_or_default(),
            status: self.status,
            created_at: self.created_at,
            queued_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            web_url: self.web_url,
            tag_list: self.tag_list,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn derive_queued_at(started_at: Option<&str>, queued_duration: Option<f64>) -> Option<String> {
    let queued = queued_duration.filter(|q| q.is_finite() && *q >= 0.0)?;
    let started = DateTime::parse_from_rfc3339(started_at?).ok()?;
    // Saturating cast; absurd durations fall out of range below.
    let delta = Duration::try_milliseconds((queued * 1000.0).round() as i64)?;
    let enqueued = started.checked_sub_signed(delta)?;
    Some(enqueued.to_rfc3339_opts(SecondsFormat::Millis, true))
}
