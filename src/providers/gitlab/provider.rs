use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

use crate::analysis::job::RawJob;
use crate::auth::Token;
use crate::error::{CompareError, Result};
use crate::providers::gitlab::cache::{CacheCoverage, JobCache};
use crate::providers::gitlab::client::GitLabClient;

/// Cached jobs created within this many hours of the newest cached one are
/// fetched again, picking up jobs that only reached a requested status after
/// the previous run.
pub const CACHE_OVERLAP_HOURS: i64 = 24;

/// What to fetch and how far back to go.
#[derive(Debug, Clone)]
pub struct FetchOptions<'a> {
    /// Jobs created before this instant are not returned
    pub since: DateTime<Utc>,
    /// Job statuses requested from the API
    pub scopes: &'a [String],
    pub per_page: usize,
    /// Serve jobs from the cache only
    pub no_fetch: bool,
}

/// Jobs collected for one project.
#[derive(Debug, Clone)]
pub struct FetchedJobs {
    pub project_id: Option<u64>,
    /// Newest first, created on or after `since`
    pub jobs: Vec<RawJob>,
}

/// GitLab job source for a single project.
///
/// Pages through the REST jobs listing newest first and keeps a raw job
/// cache up to date so later runs only pull what is new.
pub struct GitLabProvider {
    pub client: GitLabClient,
    pub project_path: String,
}

impl GitLabProvider {
    /// Creates a new GitLab provider for the specified project.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitLab instance base URL (e.g., <https://gitlab.com>)
    /// * `project_path` - Project path (e.g., "group/project")
    /// * `token` - Optional authentication token
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL cannot be constructed.
    pub fn new(base_url: &str, project_path: String, token: Option<Token>) -> Result<Self> {
        let client = GitLabClient::new(base_url, token)?;

        Ok(Self {
            client,
            project_path,
        })
    }

    /// Collects the project's jobs created on or after `options.since`.
    ///
    /// Pages are walked newest first until one reaches back past `since`,
    /// until a page holds only cached jobs created more than
    /// [`CACHE_OVERLAP_HOURS`] before the newest cached one, or until GitLab
    /// reports no next page. A job id seen on an earlier page is dropped.
    /// New jobs are merged ahead of the cached ones and the whole set is
    /// written back to the cache.
    ///
    /// The cache is only reused when it belongs to the same project and its
    /// [`CacheCoverage`] spans the requested range and scopes.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The project cannot be resolved
    /// - API requests fail after retries
    /// - `no_fetch` is set and the cache is disabled or empty
    /// - The cache file cannot be written
    pub async fn fetch_jobs(
        &self,
        options: &FetchOptions<'_>,
        cache: &JobCache,
    ) -> Result<FetchedJobs> {
        if options.no_fetch {
            return self.cached_jobs(options, cache);
        }

        let project = self.client.fetch_project(&self.project_path).await?;
        info!(
            "Fetching jobs for {} (id {}) since {}",
            project.path_with_namespace, project.id, options.since
        );

        let wanted = CacheCoverage::new(options.since, options.scopes);
        let reusable = self.reusable_coverage(cache, project.id, &wanted);
        let cached: &[RawJob] = if reusable.is_some() { cache.jobs() } else { &[] };
        let coverage = reusable.cloned().unwrap_or(wanted);

        let cached_ids: HashSet<u64> = cached.iter().filter_map(|job| job.id).collect();
        let settled_before = if cached.is_empty() {
            None
        } else {
            cache
                .latest_created_at()
                .map(|newest| newest - Duration::hours(CACHE_OVERLAP_HOURS))
        };

        let mut fresh = Vec::new();
        let mut fresh_ids = HashSet::new();
        let mut repeated = 0;
        let mut page = 1;

        loop {
            let result = self
                .client
                .fetch_jobs_page(project.id, page, options.per_page, options.scopes)
                .await?;
            debug!(
                "Page {page} of {}: {} jobs",
                self.project_path,
                result.jobs.len()
            );

            let mut past_since = false;
            let mut only_settled = settled_before.is_some();
            for job in result.jobs {
                let raw = job.into_raw_job(project.id);
                let created = created_at(&raw);
                if created.is_some_and(|created| created < options.since) {
                    past_since = true;
                    continue;
                }

                let known = raw.id.is_some_and(|id| cached_ids.contains(&id));
                let settled = matches!(
                    (created, settled_before),
                    (Some(created), Some(floor)) if created < floor
                );
                if !(known && settled) {
                    only_settled = false;
                }

                if let Some(id) = raw.id {
                    // Offset paging repeats a record when newer jobs land mid-walk.
                    if !fresh_ids.insert(id) {
                        repeated += 1;
                        continue;
                    }
                }
                fresh.push(raw);
            }

            match result.next_page {
                Some(next) if !past_since && !only_settled => page = next,
                _ => break,
            }
        }

        if repeated > 0 {
            debug!(
                "Dropped {repeated} jobs repeated across pages of {}",
                self.project_path
            );
        }
        let new_jobs = fresh
            .iter()
            .filter(|job| job.id.map_or(true, |id| !cached_ids.contains(&id)))
            .count();
        info!(
            "Fetched {new_jobs} new jobs for {} ({} cached)",
            self.project_path,
            cached.len()
        );

        let merged = merge_jobs(fresh, cached);
        cache.save(project.id, &coverage, &merged)?;

        Ok(FetchedJobs {
            project_id: Some(project.id),
            jobs: since_filter(merged, options.since),
        })
    }

    /// Coverage of the cached jobs when they can seed this fetch.
    fn reusable_coverage<'c>(
        &self,
        cache: &'c JobCache,
        project_id: u64,
        wanted: &CacheCoverage,
    ) -> Option<&'c CacheCoverage> {
        if !cache.is_enabled() {
            debug!(
                "Cache disabled, fetching {} back to {}",
                self.project_path, wanted.since
            );
            return None;
        }

        let held = cache.coverage()?;
        if cache.project_id() != Some(project_id) {
            warn!(
                "Cache for {} belongs to another project id, refetching",
                self.project_path
            );
            None
        } else if !held.covers(wanted) {
            warn!(
                "Cache for {} holds {:?} since {}, refetching for {:?} since {}",
                self.project_path, held.scopes, held.since, wanted.scopes, wanted.since
            );
            None
        } else {
            Some(held)
        }
    }

    fn cached_jobs(&self, options: &FetchOptions<'_>, cache: &JobCache) -> Result<FetchedJobs> {
        if !cache.is_enabled() {
            return Err(CompareError::Cache(format!(
                "Job cache is disabled (fetch.no-cache), nothing to read for {} with --no-fetch",
                self.project_path
            )));
        }
        let (Some(project_id), Some(held)) = (cache.project_id(), cache.coverage()) else {
            return Err(CompareError::Cache(format!(
                "No cached jobs for {} (run without --no-fetch first)",
                self.project_path
            )));
        };

        let wanted = CacheCoverage::new(options.since, options.scopes);
        if !held.covers(&wanted) {
            warn!(
                "Cached jobs for {} cover {:?} since {}, but {:?} since {} was requested; \
                 results may be incomplete",
                self.project_path, held.scopes, held.since, wanted.scopes, wanted.since
            );
        }

        info!(
            "Using {} cached jobs for {}",
            cache.jobs().len(),
            self.project_path
        );

        Ok(FetchedJobs {
            project_id: Some(project_id),
            jobs: since_filter(cache.jobs().to_vec(), options.since),
        })
    }
}

fn created_at(job: &RawJob) -> Option<DateTime<Utc>> {
    let ts = job.created_at.as_deref()?;
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// New jobs first, then cached ones; the first record of each job id wins.
fn merge_jobs(fresh: Vec<RawJob>, cached: &[RawJob]) -> Vec<RawJob> {
    let mut seen = HashSet::new();
    fresh
        .into_iter()
        .chain(cached.iter().cloned())
        .filter(|job| job.id.map_or(true, |id| seen.insert(id)))
        .collect()
}

/// Drops jobs created before `since`; jobs without a readable creation time
/// are kept for the normalizer to report.
fn since_filter(jobs: Vec<RawJob>, since: DateTime<Utc>) -> Vec<RawJob> {
    jobs.into_iter()
        .filter(|job| created_at(job).map_or(true, |created| created >= since))
        .collect()
}
