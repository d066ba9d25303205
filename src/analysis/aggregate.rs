use std::collections::{BTreeMap, HashMap};

use super::job::{JobStatus, NormalizedJob};
use super::rules::UNCLASSIFIED;
use super::stats::summarize;
use crate::report::{AggregateMap, AggregateStat};

#[derive(Default)]
struct GroupData {
    count: usize,
    statuses: BTreeMap<JobStatus, usize>,
    queue: Vec<f64>,
    run: Vec<f64>,
    total: Vec<f64>,
}

/// Groups classified jobs by `(bucket, job name)` and summarizes each
/// duration kind.
///
/// Null durations are left out of that duration's statistics but still count
/// towards the group's `count`. Jobs missing from `bucket_of` land in
/// `unclassified`. The result depends only on the multiset of jobs, not on
/// their order.
pub fn aggregate(jobs: &[NormalizedJob], bucket_of: &HashMap<u64, String>) -> AggregateMap {
    let mut groups: BTreeMap<(String, String), GroupData> = BTreeMap::new();

    for job in jobs {
        let bucket = bucket_of
            .get(&job.id)
            .map_or(UNCLASSIFIED, String::as_str);

        let data = groups
            .entry((bucket.to_string(), job.name.clone()))
            .or_default();

        data.count += 1;
        *data.statuses.entry(job.status).or_insert(0) += 1;
        data.queue.extend(job.queue_duration);
        data.run.extend(job.run_duration);
        data.total.extend(job.total_duration());
    }

    groups
        .into_iter()
        .map(|(key, data)| {
            let stats = AggregateStat {
                count: data.count,
                statuses: data.statuses,
                queue_duration: summarize(data.queue),
                run_duration: summarize(data.run),
                total_duration: summarize(data.total),
            };
            (key, stats)
        })
        .collect()
}
