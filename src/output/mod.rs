mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::{write_html, write_json, HTML_FILE_NAME, JSON_FILE_NAME};
pub use progress::PhaseProgress;
pub use styling::{dim, magenta_bold};
pub use summary::print_summary;

/// Prints the runner-compare banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🏃 runner-compare"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GitLab CI runner comparison")
    );
}
