mod gitlab;

pub use gitlab::{FetchOptions, FetchedJobs, GitLabProvider, JobCache};
