use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::analysis::analyze;
use crate::auth::Token;
use crate::config::{Config, FetchConfig, RepoConfig};
use crate::output::{self, PhaseProgress, HTML_FILE_NAME, JSON_FILE_NAME};
use crate::providers::{FetchOptions, FetchedJobs, GitLabProvider, JobCache};
use crate::report::{ProjectReport, RunReport};

#[derive(Parser)]
#[command(name = "runner-compare")]
#[command(author, version, about = "Compare GitLab CI job durations across runner configurations", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./runner-compare.{toml,json,yaml})
    #[arg(short, long, env = "RUNNER_COMPARE_CONFIG")]
    config: Option<PathBuf>,

    /// Analyze cached jobs only, without contacting GitLab
    #[arg(long, default_value_t = false)]
    no_fetch: bool,

    /// Directory for runner_statistics.json and .html
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    #[arg(short, long, default_value_t = false)]
    pretty: bool,

    /// Delete cached jobs for the configured projects before fetching
    #[arg(long, default_value_t = false)]
    clear_cache: bool,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;
        // Rule errors abort the run before any cache or network access.
        let rules = config
            .rule_set()
            .context("Invalid runner configuration")?;
        let since = config.since()?;

        if config.repos.is_empty() {
            warn!("No repos configured, nothing to compare");
        }
        if rules.is_empty() {
            warn!("No runner rules configured, every job will be unclassified");
        }
        for rule in rules.rules() {
            debug!(
                "Rule {} '{}': pattern {} from {}",
                rule.priority,
                rule.name,
                rule.pattern.as_str(),
                rule.window.start
            );
        }
        info!(
            "Comparing {} runner rules across {} projects since {since}",
            rules.len(),
            config.repos.len()
        );

        let progress = PhaseProgress::start_phase_1(config.repos.len());

        let fetches = config
            .repos
            .iter()
            .map(|repo| self.fetch_repo(repo, &config.fetch, since));
        let results = futures::future::join_all(fetches).await;

        let fetched = match results.into_iter().collect::<Result<Vec<_>>>() {
            Ok(fetched) => fetched,
            Err(e) => {
                progress.abandon();
                return Err(e);
            }
        };

        let job_count = fetched.iter().map(|f| f.jobs.len()).sum();
        let progress = progress.finish_phase_1_start_phase_2(job_count);

        let projects: Vec<ProjectReport> = config
            .repos
            .iter()
            .zip(fetched)
            .map(|(repo, fetched)| {
                let fetched_jobs = fetched.jobs.len();
                let analysis = analyze(fetched.jobs, &rules);
                ProjectReport {
                    path: repo.path.clone(),
                    project_id: fetched.project_id,
                    fetched_jobs,
                    analyzed_jobs: analysis.analyzed_jobs,
                    skipped: analysis.skipped,
                    report: analysis.report,
                }
            })
            .collect();

        let report = RunReport {
            generated_at: Utc::now(),
            since,
            projects,
        };

        let progress = progress.finish_phase_2_start_phase_3();

        let output_dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| config.output.directory.clone());
        let pretty = self.pretty || config.output.pretty;

        if let Err(e) = write_reports(&report, &output_dir, pretty) {
            progress.abandon();
            return Err(e);
        }
        progress.finish_phase_3();

        if config.output.summary {
            output::print_summary(&report);
        }

        Ok(())
    }

    async fn fetch_repo(
        &self,
        repo: &RepoConfig,
        fetch: &FetchConfig,
        since: DateTime<Utc>,
    ) -> Result<FetchedJobs> {
        let cache_dir = fetch.cache_dir.as_deref();
        if self.clear_cache {
            JobCache::clear_project_cache(&repo.path, cache_dir)?;
        }

        let token = Token::from_env(&repo.auth_token_env_var);
        if token.is_none() && !self.no_fetch {
            warn!(
                "{} is not set, requesting {} without authentication",
                repo.auth_token_env_var, repo.path
            );
        }

        let cache = JobCache::new(&repo.path, !fetch.no_cache, cache_dir)?;
        let provider = GitLabProvider::new(&repo.gitlab_instance, repo.path.clone(), token)?;

        let options = FetchOptions {
            since,
            scopes: &fetch.scopes,
            per_page: fetch.per_page,
            no_fetch: self.no_fetch,
        };

        provider
            .fetch_jobs(&options, &cache)
            .await
            .with_context(|| format!("Failed to collect jobs for {}", repo.path))
    }
}

fn write_reports(report: &RunReport, output_dir: &Path, pretty: bool) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let json_path = output_dir.join(JSON_FILE_NAME);
    let mut json_file = BufWriter::new(
        File::create(&json_path)
            .with_context(|| format!("Failed to create {}", json_path.display()))?,
    );
    output::write_json(report, pretty, &mut json_file)?;
    json_file.flush()?;
    info!("Statistics written to: {}", json_path.display());

    let html_path = output_dir.join(HTML_FILE_NAME);
    let mut html_file = BufWriter::new(
        File::create(&html_path)
            .with_context(|| format!("Failed to create {}", html_path.display()))?,
    );
    output::write_html(report, &mut html_file)?;
    html_file.flush()?;
    info!("HTML report written to: {}", html_path.display());

    Ok(())
}
