use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid runner rules: {0}")]
    Rules(#[from] RuleSetError),

    #[error("GitLab API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("GitLab API still failing with status {status} after {retries} retries")]
    ApiErrorAfterRetries { status: u16, retries: u32 },

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CompareError>;

/// Defects in the configured runner rules. Any one of these aborts the run
/// before a single job is classified.
#[derive(Error, Debug)]
pub enum RuleSetError {
    #[error("runner rule '{0}' is defined more than once")]
    DuplicateRuleName(String),

    #[error("runner rule '{rule}' has an invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("runner rule name '{0}' is reserved for jobs matching no rule")]
    ReservedRuleName(String),

    #[error("runner rule '{rule}' has an invalid {field} timestamp: {value}")]
    InvalidTimestamp {
        rule: String,
        field: &'static str,
        value: String,
    },

    #[error("runner rule '{0}' has an end that is not after its start")]
    EmptyWindow(String),
}

/// Reasons a raw job record is excluded from classification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("job record is missing its {0} id")]
    MissingIdentifier(&'static str),

    #[error("job {job_id} has no creation timestamp")]
    MissingTimestamp { job_id: u64 },

    #[error("job {job_id} has a malformed {field} timestamp: {value}")]
    MalformedTimestamp {
        job_id: u64,
        field: &'static str,
        value: String,
    },

    #[error("job {job_id} appears more than once")]
    DuplicateJob { job_id: u64 },
}

impl NormalizationError {
    /// Short stable label used when tallying skipped records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingIdentifier(_) => "missing_identifier",
            Self::MissingTimestamp { .. } => "missing_timestamp",
            Self::MalformedTimestamp { .. } => "malformed_timestamp",
            Self::DuplicateJob { .. } => "duplicate_job",
        }
    }
}
