use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::job::NormalizedJob;
use crate::error::RuleSetError;

/// Bucket for jobs that match no rule.
pub const UNCLASSIFIED: &str = "unclassified";

/// A runner rule as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleConfig {
    /// Bucket label
    pub name: String,
    /// Inclusive start, RFC 3339 or `YYYY-MM-DD`
    pub start: String,
    /// Exclusive end; omitted while the runner configuration is still live
    #[serde(default)]
    pub end: Option<String>,
    /// Regular expression searched for in the runner description
    pub pattern: String,
    /// Restrict the rule to these GitLab project ids
    #[serde(default)]
    pub project_ids: Option<Vec<u64>>,
}

/// Half-open interval `[start, end)`; `end == None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && self.end.map_or(true, |end| ts < end)
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub priority: usize,
    pub name: String,
    pub window: TimeWindow,
    pub pattern: Regex,
    pub project_ids: Option<BTreeSet<u64>>,
}

impl ClassificationRule {
    pub fn matches(&self, job: &NormalizedJob) -> bool {
        self.window.contains(job.created_at)
            && self.pattern.is_match(&job.runner_description)
            && self
                .project_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&job.project_id))
    }
}

/// Validated, ordered runner rules. Earlier rules take precedence.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ClassificationRule>,
}

impl RuleSet {
    /// Validates and compiles configured rules, keeping their order as
    /// priority.
    ///
    /// # Errors
    ///
    /// Fails on the first rule that reuses a name, uses the reserved
    /// `unclassified` name, has a pattern that does not compile, or has an
    /// unparseable or empty time window. Overlapping rules are accepted.
    pub fn from_configs(configs: &[RuleConfig]) -> Result<Self, RuleSetError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(configs.len());

        for (priority, config) in configs.iter().enumerate() {
            if config.name == UNCLASSIFIED {
                return Err(RuleSetError::ReservedRuleName(config.name.clone()));
            }
            if !seen.insert(config.name.as_str()) {
                return Err(RuleSetError::DuplicateRuleName(config.name.clone()));
            }

            let pattern =
                Regex::new(&config.pattern).map_err(|source| RuleSetError::InvalidPattern {
                    rule: config.name.clone(),
                    source,
                })?;

            let start = parse_boundary(&config.name, "start", &config.start)?;
            let end = config
                .end
                .as_deref()
                .map(|end| parse_boundary(&config.name, "end", end))
                .transpose()?;
            if end.is_some_and(|end| end <= start) {
                return Err(RuleSetError::EmptyWindow(config.name.clone()));
            }

            rules.push(ClassificationRule {
                priority,
                name: config.name.clone(),
                window: TimeWindow { start, end },
                pattern,
                project_ids: config
                    .project_ids
                    .as_ref()
                    .map(|ids| ids.iter().copied().collect()),
            });
        }

        debug!("Validated {} runner rules", rules.len());

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Bucket names in priority order, followed by `unclassified`.
    pub fn bucket_names(&self) -> Vec<&str> {
        self.rules
            .iter()
            .map(|rule| rule.name.as_str())
            .chain(std::iter::once(UNCLASSIFIED))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Returns the bucket of the first rule matching `job`, or `unclassified`.
pub fn classify<'a>(job: &NormalizedJob, rules: &'a RuleSet) -> &'a str {
    rules
        .rules
        .iter()
        .find(|rule| rule.matches(job))
        .map_or(UNCLASSIFIED, |rule| rule.name.as_str())
}

/// Parses a rule boundary: a full RFC 3339 timestamp, a naive
/// `YYYY-MM-DDTHH:MM:SS` (taken as UTC) or a bare date (midnight UTC).
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_boundary(
    rule: &str,
    field: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, RuleSetError> {
    parse_datetime(value).ok_or_else(|| RuleSetError::InvalidTimestamp {
        rule: rule.to_string(),
        field,
        value: value.to_string(),
    })
}
