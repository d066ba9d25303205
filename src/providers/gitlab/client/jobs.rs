use reqwest::header::HeaderMap;

use super::core::GitLabClient;
use crate::error::{CompareError, Result};
use crate::providers::gitlab::types::{GitLabJob, GitLabProject};

/// One page of the jobs listing.
#[derive(Debug)]
pub struct JobsPage {
    pub jobs: Vec<GitLabJob>,
    /// Next page number, `None` on the last page
    pub next_page: Option<usize>,
}

impl GitLabClient {
    /// Resolves a project path (e.g., "group/project") to its project record.
    pub async fn fetch_project(&self, project_path: &str) -> Result<GitLabProject> {
        let encoded: String = url::form_urlencoded::byte_serialize(project_path.as_bytes()).collect();
        let url = self.endpoint(&format!("projects/{encoded}"))?;

        match self.get_json(url, &[]).await {
            Ok((project, _)) => Ok(project),
            Err(CompareError::ApiError { status: 404, .. }) => {
                Err(CompareError::ProjectNotFound(project_path.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetches one page of a project's jobs, newest first.
    pub async fn fetch_jobs_page(
        &self,
        project_id: u64,
        page: usize,
        per_page: usize,
        scopes: &[String],
    ) -> Result<JobsPage> {
        let url = self.endpoint(&format!("projects/{project_id}/jobs"))?;

        let mut query = vec![
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        query.extend(scopes.iter().map(|scope| ("scope[]", scope.clone())));

        let (jobs, headers): (Vec<GitLabJob>, HeaderMap) = self.get_json(url, &query).await?;

        Ok(JobsPage {
            jobs,
            next_page: next_page(&headers),
        })
    }
}

fn next_page(headers: &HeaderMap) -> Option<usize> {
    headers
        .get("x-next-page")?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
