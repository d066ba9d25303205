use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::job::JobStatus;
use crate::error::NormalizationError;

/// Statistics keyed by `(bucket, job name)`.
pub type AggregateMap = BTreeMap<(String, String), AggregateStat>;

#[derive(Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub since: DateTime<Utc>,
    pub projects: Vec<ProjectReport>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectReport {
    pub path: String,
    pub project_id: Option<u64>,
    pub fetched_jobs: usize,
    pub analyzed_jobs: usize,
    pub skipped: SkipSummary,
    pub report: ReportModel,
}

/// Raw job records excluded by the normalizer, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipSummary {
    pub total: usize,
    pub reasons: BTreeMap<String, usize>,
}

impl SkipSummary {
    pub fn record(&mut self, error: &NormalizationError) {
        self.total += 1;
        *self.reasons.entry(error.kind().to_string()).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportModel {
    pub buckets: Vec<BucketReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketReport {
    pub name: String,
    pub total_jobs: usize,
    /// Sorted by job name
    pub jobs: Vec<JobReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub name: String,
    pub stats: AggregateStat,
}

/// Statistics for one job name within one bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStat {
    /// All jobs in the group, including those without timing data
    pub count: usize,
    pub statuses: BTreeMap<JobStatus, usize>,
    pub queue_duration: DurationStats,
    pub run_duration: DurationStats,
    pub total_duration: DurationStats,
}

/// Summary of one duration kind. `values` is `None` when no job in the group
/// had that duration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub samples: usize,
    pub values: Option<DurationValues>,
}

impl DurationStats {
    pub fn mean(&self) -> Option<f64> {
        self.values.as_ref().map(|v| v.mean)
    }
}

/// Durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationValues {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
}

impl ReportModel {
    /// Partitions aggregates by bucket. Buckets and the jobs inside each
    /// bucket come out in lexicographic order; stats are copied unchanged.
    pub fn build(aggregates: &AggregateMap) -> Self {
        let mut buckets: Vec<BucketReport> = Vec::new();

        for ((bucket, job_name), stats) in aggregates {
            let needs_new = buckets.last().map_or(true, |last| last.name != *bucket);
            if needs_new {
                buckets.push(BucketReport::empty(bucket));
            }
            if let Some(current) = buckets.last_mut() {
                current.total_jobs += stats.count;
                current.jobs.push(JobReport {
                    name: job_name.clone(),
                    stats: stats.clone(),
                });
            }
        }

        Self { buckets }
    }

    /// Reorders buckets to follow `order`, adding an empty bucket for every
    /// listed name that has no jobs. Buckets not listed keep their relative
    /// order at the end.
    pub fn align_buckets(&mut self, order: &[&str]) {
        let mut remaining = std::mem::take(&mut self.buckets);
        let mut aligned = Vec::with_capacity(order.len().max(remaining.len()));

        for &name in order {
            match remaining.iter().position(|b| b.name == name) {
                Some(index) => aligned.push(remaining.remove(index)),
                None => aligned.push(BucketReport::empty(name)),
            }
        }
        aligned.extend(remaining);

        self.buckets = aligned;
    }

    pub fn bucket(&self, name: &str) -> Option<&BucketReport> {
        self.buckets.iter().find(|b| b.name == name)
    }

    /// Every job name present in any bucket, sorted.
    pub fn job_names(&self) -> BTreeSet<&str> {
        self.buckets
            .iter()
            .flat_map(|b| b.jobs.iter().map(|j| j.name.as_str()))
            .collect()
    }

    /// Flattens the model back into the `(bucket, job name)` mapping.
    pub fn aggregates(&self) -> AggregateMap {
        self.buckets
            .iter()
            .flat_map(|bucket| {
                bucket
                    .jobs
                    .iter()
                    .map(|job| ((bucket.name.clone(), job.name.clone()), job.stats.clone()))
            })
            .collect()
    }
}

impl BucketReport {
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            total_jobs: 0,
            jobs: Vec::new(),
        }
    }

    pub fn job(&self, name: &str) -> Option<&AggregateStat> {
        self.jobs.iter().find(|j| j.name == name).map(|j| &j.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(count: usize) -> AggregateStat {
        AggregateStat {
            count,
            ..AggregateStat::default()
        }
    }

    fn aggregates() -> AggregateMap {
        [
            (("pool-b", "test"), 2),
            (("pool-a", "test"), 3),
            (("pool-a", "build"), 1),
            (("unclassified", "lint"), 4),
        ]
        .into_iter()
        .map(|((bucket, job), count)| ((bucket.to_string(), job.to_string()), stat(count)))
        .collect()
    }

    #[test]
    fn test_build_partitions_and_sorts() {
        let model = ReportModel::build(&aggregates());

        let names: Vec<&str> = model.buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["pool-a", "pool-b", "unclassified"]);

        let pool_a = model.bucket("pool-a").unwrap();
        let jobs: Vec<&str> = pool_a.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(jobs, vec!["build", "test"]);
        assert_eq!(pool_a.total_jobs, 4);
        assert_eq!(pool_a.job("test").unwrap().count, 3);
    }

    #[test]
    fn test_round_trip_preserves_partition() {
        let original = aggregates();
        let model = ReportModel::build(&original);
        assert_eq!(model.aggregates(), original);
    }

    #[test]
    fn test_align_buckets_orders_and_fills() {
        let mut model = ReportModel::build(&aggregates());
        model.align_buckets(&["pool-b", "pool-c", "pool-a"]);

        let names: Vec<&str> = model.buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["pool-b", "pool-c", "pool-a", "unclassified"]);
        assert!(model.bucket("pool-c").unwrap().jobs.is_empty());

        // Empty buckets contribute no groupings.
        assert_eq!(model.aggregates(), aggregates());
    }

    #[test]
    fn test_job_names_union() {
        let model = ReportModel::build(&aggregates());
        let names: Vec<&str> = model.job_names().into_iter().collect();
        assert_eq!(names, vec!["build", "lint", "test"]);
    }

    #[test]
    fn test_absent_stats_serialize_as_null() {
        let json = serde_json::to_value(stat(2)).unwrap();
        assert_eq!(json["count"], 2);
        assert_eq!(json["run_duration"]["samples"], 0);
        assert!(json["run_duration"]["values"].is_null());
        assert!(json["queue_duration"].get("values").is_some());
    }

    #[test]
    fn test_skip_summary_counts_by_reason() {
        let mut skipped = SkipSummary::default();
        skipped.record(&NormalizationError::MissingIdentifier("job"));
        skipped.record(&NormalizationError::MissingIdentifier("project"));
        skipped.record(&NormalizationError::MissingTimestamp { job_id: 3 });

        assert_eq!(skipped.total, 3);
        assert_eq!(skipped.reasons["missing_identifier"], 2);
        assert_eq!(skipped.reasons["missing_timestamp"], 1);
    }
}
