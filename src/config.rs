use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::rules::{parse_datetime, RuleConfig, RuleSet};
use crate::error::RuleSetError;

/// Configuration file structure.
///
/// Lists the GitLab projects to pull jobs from and the ordered runner rules
/// that define the buckets being compared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Only jobs created on or after this date are measured
    #[serde(default)]
    pub since: Option<String>,

    #[serde(default)]
    pub repos: Vec<RepoConfig>,

    /// Runner rules, highest priority first
    #[serde(default)]
    pub runners: Vec<RuleConfig>,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RepoConfig {
    /// GitLab project path (e.g., 'group/project')
    pub path: String,

    /// GitLab instance base URL
    #[serde(default = "default_gitlab_instance")]
    pub gitlab_instance: String,

    /// Environment variable holding the access token
    #[serde(default = "default_auth_token_env_var")]
    pub auth_token_env_var: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Job statuses requested from the API
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// Disable the raw job cache
    #[serde(default)]
    pub no_cache: bool,

    /// Override the platform cache directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory receiving runner_statistics.json and .html
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,

    /// Print the comparison table to the terminal
    #[serde(default = "default_true")]
    pub summary: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            scopes: default_scopes(),
            per_page: default_per_page(),
            no_cache: false,
            cache_dir: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            pretty: false,
            summary: true,
        }
    }
}

fn default_gitlab_instance() -> String {
    "https://gitlab.com".to_string()
}

fn default_auth_token_env_var() -> String {
    "GITLAB_TOKEN".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["success".to_string()]
}

fn default_per_page() -> usize {
    100
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

/// First day of the month before `today`.
fn first_of_previous_month(today: NaiveDate) -> NaiveDate {
    let last_of_previous = today.with_day(1).unwrap_or(today) - Duration::days(1);
    last_of_previous.with_day(1).unwrap_or(last_of_previous)
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./runner-compare.toml
    /// 3. ./runner-compare.json
    /// 4. ./runner-compare.yaml
    /// 5. ./runner-compare.yml
    ///
    /// Returns an error if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            anyhow::ensure!(
                path.exists(),
                "Configuration file missing: {}",
                path.display()
            );
            return Self::load_from_path(path);
        }

        let candidates = [
            "runner-compare.toml",
            "runner-compare.json",
            "runner-compare.yaml",
            "runner-compare.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        anyhow::bail!("No configuration file found (looked for runner-compare.toml/json/yaml)")
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }

    /// Validates the configured runners into an ordered [`RuleSet`].
    ///
    /// # Errors
    ///
    /// Returns the first [`RuleSetError`] found; callers must stop the run.
    pub fn rule_set(&self) -> std::result::Result<RuleSet, RuleSetError> {
        RuleSet::from_configs(&self.runners)
    }

    /// Start of the measured period, defaulting to the first day of the
    /// previous month.
    pub fn since(&self) -> Result<DateTime<Utc>> {
        self.since_relative_to(Utc::now().date_naive())
    }

    fn since_relative_to(&self, today: NaiveDate) -> Result<DateTime<Utc>> {
        match &self.since {
            Some(since) => parse_datetime(since)
                .with_context(|| format!("Invalid 'since' date: {since}")),
            None => Ok(first_of_previous_month(today)
                .and_hms_opt(0, 0, 0)
                .context("Invalid default 'since' date")?
                .and_utc()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.repos.is_empty());
        assert_eq!(config.fetch.scopes, vec!["success"]);
        assert_eq!(config.fetch.per_page, 100);
        assert!(config.output.summary);
        assert!(!config.output.pretty);
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
since = "2024-01-01"

[[repos]]
path = "group/project"

[[repos]]
path = "group/other"
gitlab-instance = "https://gitlab.example.com"
auth-token-env-var = "OTHER_TOKEN"

[[runners]]
name = "pool-a"
start = "2024-01-01"
end = "2024-02-01"
pattern = "pool-a-.*"

[[runners]]
name = "pool-b"
start = "2024-02-01"
pattern = "pool-b-.*"
project-ids = [1, 2]

[fetch]
scopes = ["success", "failed"]

[output]
directory = "reports"
pretty = true
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.repos.len(), 2);
        assert_eq!(config.repos[0].gitlab_instance, "https://gitlab.com");
        assert_eq!(config.repos[0].auth_token_env_var, "GITLAB_TOKEN");
        assert_eq!(config.repos[1].gitlab_instance, "https://gitlab.example.com");
        assert_eq!(config.repos[1].auth_token_env_var, "OTHER_TOKEN");
        assert_eq!(config.runners[0].end.as_deref(), Some("2024-02-01"));
        assert_eq!(config.runners[1].project_ids, Some(vec![1, 2]));
        assert_eq!(config.fetch.scopes, vec!["success", "failed"]);
        assert_eq!(config.fetch.per_page, 100);
        assert_eq!(config.output.directory, PathBuf::from("reports"));
        assert!(config.output.pretty);

        let rules = config.rule_set().unwrap();
        assert_eq!(rules.bucket_names(), vec!["pool-a", "pool-b", "unclassified"]);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "repos": [{ "path": "group/project" }],
  "runners": [
    { "name": "old", "start": "2024-01-01T00:00:00Z", "pattern": "old" }
  ]
}"#;
        write!(temp_file, "{}", json_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.repos[0].path, "group/project");
        assert_eq!(config.runners[0].name, "old");
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        let yaml_content = r"
repos:
  - path: group/project
runners:
  - name: new
    start: '2024-03-01'
    pattern: 'new-.*'
fetch:
  no-cache: true
";
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.runners[0].pattern, "new-.*");
        assert!(config.fetch.no_cache);
    }

    #[test]
    fn test_load_missing_config_fails() {
        let result = Config::load(Some(Path::new("nonexistent-runner-compare.toml")));
        assert!(result.unwrap_err().to_string().contains("missing"));
    }

    #[test]
    fn test_duplicate_runner_names_fail_validation() {
        let config: Config = toml::from_str(
            r#"
[[runners]]
name = "pool-a"
start = "2024-01-01"
pattern = "a"

[[runners]]
name = "pool-a"
start = "2024-02-01"
pattern = "b"
"#,
        )
        .unwrap();

        assert!(matches!(
            config.rule_set(),
            Err(RuleSetError::DuplicateRuleName(name)) if name == "pool-a"
        ));
    }

    #[test]
    fn test_since_parsing_and_default() {
        let mut config = Config::default();
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(
            config.since_relative_to(today).unwrap().to_rfc3339(),
            "2024-02-01T00:00:00+00:00"
        );

        let january = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            config.since_relative_to(january).unwrap().to_rfc3339(),
            "2023-12-01T00:00:00+00:00"
        );

        config.since = Some("2024-01-10".to_string());
        assert_eq!(
            config.since_relative_to(today).unwrap().to_rfc3339(),
            "2024-01-10T00:00:00+00:00"
        );

        config.since = Some("whenever".to_string());
        assert!(config.since_relative_to(today).is_err());
    }
}
