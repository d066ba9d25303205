use comfy_table::{Cell, Color as TableColor};

use crate::report::{ProjectReport, RunReport};

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim};
use super::tables::{create_table, header_cells, ranked_duration_cell};

/// Prints a human-readable comparison of runner buckets to stdout.
///
/// For each project this shows an overview (job counts, skipped records,
/// bucket sizes) followed by a table of mean run durations with one row per
/// job name and one column per bucket. Within a row the fastest bucket is
/// green and the slowest red.
pub fn print_summary(report: &RunReport) {
    println!("{}", render_summary(report));
}

#[allow(clippy::format_push_string)]
fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    output.push_str(&format!("{} {}\n", bright(emoji), bright(title).underlined()));
}

#[allow(clippy::format_push_string)]
fn render_summary(report: &RunReport) -> String {
    let mut output = String::new();

    if report.projects.is_empty() {
        output.push_str(&format!("{}\n", bright_yellow("No projects configured.")));
        return output;
    }

    for project in &report.projects {
        render_project(&mut output, project, report);
    }

    output
}

#[allow(clippy::format_push_string)]
fn render_project(output: &mut String, project: &ProjectReport, report: &RunReport) {
    add_section_header(output, "📊", &project.path);

    let skipped_display = if project.skipped.total == 0 {
        bright_green(project.skipped.total)
    } else {
        bright_red(project.skipped.total)
    };

    output.push_str(&format!(
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        dim("Jobs since:"),
        cyan(report.since.format("%Y-%m-%d")),
        dim("Jobs fetched:"),
        bright_yellow(project.fetched_jobs),
        dim("Jobs analyzed:"),
        bright_yellow(project.analyzed_jobs),
        dim("Jobs skipped:"),
        skipped_display
    ));
    for (reason, count) in &project.skipped.reasons {
        output.push_str(&format!("    {} {count}\n", dim(format!("{reason}:"))));
    }
    for bucket in &project.report.buckets {
        output.push_str(&format!(
            "  {} {}\n",
            dim(format!("{}:", bucket.name)),
            bright_yellow(bucket.total_jobs)
        ));
    }
    output.push('\n');

    let job_names = project.report.job_names();
    if job_names.is_empty() {
        output.push_str(&format!("{}\n\n", bright_yellow("No job data found.")));
        return;
    }

    add_section_header(output, "⏱️", "Mean Run Duration");

    let buckets = &project.report.buckets;
    let mut labels = vec!["Job"];
    labels.extend(buckets.iter().map(|b| b.name.as_str()));

    let mut table = create_table();
    table.set_header(header_cells(&labels));

    for job in job_names {
        let means: Vec<Option<f64>> = buckets
            .iter()
            .map(|bucket| bucket.job(job).and_then(|stat| stat.run_duration.mean()))
            .collect();

        let mut row = vec![Cell::new(job)];
        row.extend(means.iter().map(|mean| ranked_duration_cell(*mean, &means)));
        table.add_row(row);
    }

    let mut counts = vec![Cell::new("jobs").fg(TableColor::DarkGrey)];
    counts.extend(
        buckets
            .iter()
            .map(|bucket| Cell::new(bucket.total_jobs).fg(TableColor::DarkGrey)),
    );
    table.add_row(counts);

    output.push_str(&format!("{table}\n\n"));
}
