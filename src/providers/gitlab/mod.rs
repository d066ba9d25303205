mod cache;
mod client;
mod provider;
mod types;

pub use cache::JobCache;
pub use provider::{FetchOptions, FetchedJobs, GitLabProvider};
