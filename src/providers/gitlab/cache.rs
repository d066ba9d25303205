use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::job::RawJob;
use crate::error::{CompareError, Result};

/// The slice of a project's job history a cache file holds: every job with
/// one of `scopes` created on or after `since`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCoverage {
    pub since: DateTime<Utc>,
    pub scopes: BTreeSet<String>,
}

impl CacheCoverage {
    pub fn new(since: DateTime<Utc>, scopes: &[String]) -> Self {
        Self {
            since,
            scopes: scopes.iter().cloned().collect(),
        }
    }

    /// Whether every job a `wanted` request would return is already held.
    ///
    /// Scopes must match exactly since cached jobs are not filtered by status.
    pub fn covers(&self, wanted: &CacheCoverage) -> bool {
        self.since <= wanted.since && self.scopes == wanted.scopes
    }
}

/// On-disk cache contents for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedProject {
    project_id: u64,
    coverage: CacheCoverage,
    /// Newest first
    jobs: Vec<RawJob>,
}

/// Raw job cache for a GitLab project.
///
/// Lets repeated runs fetch only jobs newer than the newest cached one, and
/// lets `--no-fetch` runs work entirely offline. Uses per-project cache files
/// in platform-specific cache directories:
/// - Linux: `~/.cache/runner-compare/gitlab/{project-slug}.json`
/// - macOS: `~/Library/Caches/runner-compare/gitlab/{project-slug}.json`
///
/// Only raw records are cached; every statistic is recomputed each run.
pub struct JobCache {
    cache_file: PathBuf,
    cached: Option<CachedProject>,
    enabled: bool,
}

impl JobCache {
    /// Creates a cache for `project_path`, loading any existing file.
    ///
    /// # Arguments
    ///
    /// * `project_path` - GitLab project path (e.g., "group/project")
    /// * `enabled` - Whether caching is enabled
    /// * `cache_dir` - Overrides the platform cache directory
    ///
    /// # Errors
    ///
    /// Returns error if cache directory cannot be determined or created.
    pub fn new(project_path: &str, enabled: bool, cache_dir: Option<&Path>) -> Result<Self> {
        if !enabled {
            debug!("Job cache disabled");
            return Ok(Self {
                cache_file: PathBuf::new(),
                cached: None,
                enabled: false,
            });
        }

        let cache_file = cache_file_path(project_path, cache_dir)?;
        if let Some(parent) = cache_file.parent() {
            fs::create_dir_all(parent)?;
        }

        let cached = if cache_file.exists() {
            fs::read_to_string(&cache_file)
                .ok()
                .and_then(|content| serde_json::from_str(&content).ok())
                .inspect(|_| debug!("Loaded cache from: {}", cache_file.display()))
                .or_else(|| {
                    warn!("Failed to load cache, starting with empty cache");
                    None
                })
        } else {
            None
        };

        info!("Job cache enabled at: {}", cache_file.display());

        Ok(Self {
            cache_file,
            cached,
            enabled: true,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Project id recorded with the cached jobs, if any were loaded.
    pub fn project_id(&self) -> Option<u64> {
        self.cached.as_ref().map(|c| c.project_id)
    }

    /// Range and scopes the cached jobs were fetched with.
    pub fn coverage(&self) -> Option<&CacheCoverage> {
        self.cached.as_ref().map(|c| &c.coverage)
    }

    pub fn jobs(&self) -> &[RawJob] {
        self.cached
            .as_ref()
            .map(|c| c.jobs.as_slice())
            .unwrap_or_default()
    }

    /// Creation time of the newest cached job with a parseable timestamp.
    pub fn latest_created_at(&self) -> Option<DateTime<Utc>> {
        self.jobs()
            .iter()
            .filter_map(|job| job.created_at.as_deref())
            .filter_map(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .max()
    }

    /// Replaces the cache file with `jobs` (newest first) and the coverage
    /// they were fetched with.
    pub fn save(&self, project_id: u64, coverage: &CacheCoverage, jobs: &[RawJob]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let content = serde_json::to_string(&CachedProject {
            project_id,
            coverage: coverage.clone(),
            jobs: jobs.to_vec(),
        })?;

        // Readers must never see a partially written file.
        let tmp_file = self.cache_file.with_extension("json.tmp");
        fs::write(&tmp_file, content)?;
        fs::rename(&tmp_file, &self.cache_file)?;

        debug!(
            "Saved {} jobs to cache: {}",
            jobs.len(),
            self.cache_file.display()
        );

        Ok(())
    }

    /// Removes the project's cache file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if cache file cannot be removed.
    pub fn clear_project_cache(project_path: &str, cache_dir: Option<&Path>) -> Result<()> {
        let cache_file = cache_file_path(project_path, cache_dir)?;

        if cache_file.exists() {
            fs::remove_file(&cache_file)?;
            info!("Cache cleared: {}", cache_file.display());
        } else {
            info!("No cache file found for project: {project_path}");
        }

        Ok(())
    }
}

fn cache_file_path(project_path: &str, cache_dir: Option<&Path>) -> Result<PathBuf> {
    let cache_dir = match cache_dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs::cache_dir()
            .ok_or_else(|| CompareError::Cache("No cache directory found".into()))?
            .join("runner-compare")
            .join("gitlab"),
    };

    // "group/project" -> "group-project.json"
    let cache_filename = project_path.replace('/', "-") + ".json";
    Ok(cache_dir.join(cache_filename))
}
