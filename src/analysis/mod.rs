pub mod aggregate;
pub mod job;
pub mod rules;
pub mod stats;

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use crate::error::NormalizationError;
use crate::report::{ReportModel, SkipSummary};

use self::aggregate::aggregate;
use self::job::{normalize, NormalizedJob, RawJob};
use self::rules::{classify, RuleSet, UNCLASSIFIED};

/// Outcome of analyzing one project's jobs.
#[derive(Debug)]
pub struct Analysis {
    pub report: ReportModel,
    pub skipped: SkipSummary,
    /// Jobs that made it past normalization
    pub analyzed_jobs: usize,
}

/// Normalizes, classifies and aggregates raw jobs against a validated rule
/// set.
///
/// Jobs that fail normalization are dropped and tallied in
/// [`Analysis::skipped`]; they never abort the analysis. A job id seen more
/// than once keeps its first record; later copies are tallied as
/// `duplicate_job`.
pub fn analyze(raw_jobs: Vec<RawJob>, rules: &RuleSet) -> Analysis {
    let mut skipped = SkipSummary::default();
    let mut jobs: Vec<NormalizedJob> = Vec::with_capacity(raw_jobs.len());
    let mut seen_ids = HashSet::new();

    for raw in raw_jobs {
        let normalized = normalize(raw).and_then(|job| {
            if seen_ids.insert(job.id) {
                Ok(job)
            } else {
                Err(NormalizationError::DuplicateJob { job_id: job.id })
            }
        });
        match normalized {
            Ok(job) => jobs.push(job),
            Err(e) => {
                debug!("Skipping job record: {e}");
                skipped.record(&e);
            }
        }
    }

    if skipped.total > 0 {
        warn!(
            "Skipped {} unusable or repeated job records",
            skipped.total
        );
    }

    let bucket_of: HashMap<u64, String> = jobs
        .iter()
        .map(|job| (job.id, classify(job, rules).to_string()))
        .collect();

    let unclassified = bucket_of.values().filter(|b| *b == UNCLASSIFIED).count();
    if unclassified > 0 {
        info!("{unclassified} jobs matched no runner rule");
    }

    let aggregates = aggregate(&jobs, &bucket_of);

    let mut report = ReportModel::build(&aggregates);
    report.align_buckets(&rules.bucket_names());

    Analysis {
        report,
        skipped,
        analyzed_jobs: jobs.len(),
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::analysis::rules::RuleConfig;

    fn rule(name: &str, start: &str, end: Option<&str>, pattern: &str) -> RuleConfig {
        RuleConfig {
            name: name.to_string(),
            start: start.to_string(),
            end: end.map(ToString::to_string),
            pattern: pattern.to_string(),
            project_ids: None,
        }
    }

    fn raw(id: u64, created: &str, runner: &str, run_seconds: i64) -> RawJob {
        let started = chrono::DateTime::parse_from_rfc3339(created).unwrap();
        let finished = started + chrono::Duration::seconds(run_seconds);
        RawJob {
            id: Some(id),
            project_id: Some(1),
            name: "build".to_string(),
            runner_description: runner.to_string(),
            status: "success".to_string(),
            created_at: Some(created.to_string()),
            started_at: Some(started.to_rfc3339()),
            finished_at: Some(finished.to_rfc3339()),
            ..RawJob::default()
        }
    }

    fn pool_rules() -> RuleSet {
        RuleSet::from_configs(&[
            rule("pool-a", "2024-01-01", Some("2024-02-01"), "pool-a-.*"),
            rule("pool-b", "2024-02-01", None, "pool-b-.*"),
        ])
        .unwrap()
    }

    #[test]
    fn test_pool_comparison_scenario() {
        let raw_jobs = vec![
            raw(1, "2024-01-15T00:00:00Z", "pool-a-01", 120),
            raw(2, "2024-02-10T00:00:00Z", "pool-b-02", 80),
            raw(3, "2024-03-01T00:00:00Z", "unknown-03", 200),
        ];

        let analysis = analyze(raw_jobs, &pool_rules());
        let report = &analysis.report;

        let names: Vec<&str> = report.buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["pool-a", "pool-b", UNCLASSIFIED]);

        let mean = |bucket: &str| {
            report
                .bucket(bucket)
                .and_then(|b| b.job("build"))
                .and_then(|s| s.run_duration.mean())
        };
        assert_eq!(mean("pool-a"), Some(120.0));
        assert_eq!(mean("pool-b"), Some(80.0));
        assert_eq!(mean(UNCLASSIFIED), Some(200.0));
        assert_eq!(analysis.analyzed_jobs, 3);
        assert_eq!(analysis.skipped.total, 0);
    }

    #[test]
    fn test_every_job_lands_in_exactly_one_bucket() {
        let raw_jobs = vec![
            raw(1, "2024-01-15T00:00:00Z", "pool-a-01", 10),
            raw(2, "2024-01-16T00:00:00Z", "pool-b-01", 10),
            raw(3, "2024-02-15T00:00:00Z", "pool-a-01", 10),
            raw(4, "2024-02-16T00:00:00Z", "pool-b-01", 10),
            raw(5, "2023-12-01T00:00:00Z", "", 10),
        ];

        let analysis = analyze(raw_jobs, &pool_rules());
        let total: usize = analysis.report.buckets.iter().map(|b| b.total_jobs).sum();

        assert_eq!(total, 5);
        assert_eq!(analysis.report.bucket("pool-a").unwrap().total_jobs, 1);
        assert_eq!(analysis.report.bucket("pool-b").unwrap().total_jobs, 1);
        assert_eq!(analysis.report.bucket(UNCLASSIFIED).unwrap().total_jobs, 3);
    }

    #[test]
    fn test_defective_records_are_skipped_not_fatal() {
        let mut no_id = raw(1, "2024-01-15T00:00:00Z", "pool-a-01", 10);
        no_id.id = None;
        let mut bad_time = raw(2, "2024-01-15T00:00:00Z", "pool-a-01", 10);
        bad_time.finished_at = Some("soon".to_string());
        let good = raw(3, "2024-01-15T00:00:00Z", "pool-a-01", 10);

        let analysis = analyze(vec![no_id, bad_time, good], &pool_rules());

        assert_eq!(analysis.skipped.total, 2);
        assert_eq!(analysis.analyzed_jobs, 1);
        assert_eq!(analysis.report.bucket("pool-a").unwrap().total_jobs, 1);
    }

    #[test]
    fn test_repeated_job_ids_count_once() {
        let first = raw(2, "2024-01-15T00:00:00Z", "pool-a-01", 60);
        let repeat = raw(2, "2024-01-15T00:00:00Z", "pool-a-01", 600);
        let raw_jobs = vec![
            raw(3, "2024-01-16T00:00:00Z", "pool-a-01", 60),
            first,
            repeat,
            raw(1, "2024-01-14T00:00:00Z", "pool-a-01", 60),
        ];

        let analysis = analyze(raw_jobs, &pool_rules());
        let build = analysis.report.bucket("pool-a").unwrap().job("build").unwrap();

        assert_eq!(build.count, 3);
        assert_eq!(build.run_duration.samples, 3);
        assert_eq!(build.run_duration.values.unwrap().max, 60.0);
        assert_eq!(analysis.analyzed_jobs, 3);
        assert_eq!(analysis.skipped.total, 1);
        assert_eq!(analysis.skipped.reasons.get("duplicate_job"), Some(&1));
    }

    #[test]
    fn test_empty_input_still_lists_configured_buckets() {
        let analysis = analyze(Vec::new(), &pool_rules());

        let names: Vec<&str> = analysis.report.buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["pool-a", "pool-b", UNCLASSIFIED]);
        assert!(analysis.report.buckets.iter().all(|b| b.jobs.is_empty()));
    }
}
