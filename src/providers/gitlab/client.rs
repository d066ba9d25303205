mod core;
mod jobs;

pub use self::core::GitLabClient;
