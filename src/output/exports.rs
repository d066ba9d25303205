use anyhow::Result;
use std::io::Write;

use crate::report::{AggregateStat, DurationStats, ProjectReport, RunReport};

/// JSON document file name inside the output directory.
pub const JSON_FILE_NAME: &str = "runner_statistics.json";
/// HTML report file name inside the output directory.
pub const HTML_FILE_NAME: &str = "runner_statistics.html";

/// Writes the run report as a single JSON document.
///
/// Absent statistics serialize as `null`.
pub fn write_json(report: &RunReport, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

/// Writes a self-contained HTML report.
///
/// Each project gets average total, queue and run duration tables plus a job
/// count table. Rows are job names, columns are buckets in rule order.
pub fn write_html(report: &RunReport, output: &mut dyn Write) -> Result<()> {
    writeln!(output, "<!DOCTYPE html>")?;
    writeln!(output, "<html lang=\"en\">")?;
    writeln!(output, "<head>")?;
    writeln!(output, "    <meta charset=\"UTF-8\">")?;
    writeln!(output, "    <title>Runner Statistics</title>")?;
    writeln!(output, "    <style>")?;
    writeln!(output, "        body {{ font-family: sans-serif; margin: 40px; }}")?;
    writeln!(output, "        h1 {{ color: #2c3e50; }}")?;
    writeln!(output, "        h2 {{ color: #34495e; margin-top: 30px; }}")?;
    writeln!(output, "        table {{ border-collapse: collapse; margin: 25px 0; font-size: 0.9em; min-width: 400px; box-shadow: 0 0 20px rgba(0, 0, 0, 0.15); }}")?;
    writeln!(output, "        table thead tr {{ background-color: #009879; color: #ffffff; text-align: left; }}")?;
    writeln!(output, "        table th, table td {{ padding: 12px 15px; }}")?;
    writeln!(output, "        table tbody tr {{ border-bottom: 1px solid #dddddd; }}")?;
    writeln!(output, "        table tbody tr:nth-of-type(even) {{ background-color: #f3f3f3; }}")?;
    writeln!(output, "        table tbody tr:last-of-type {{ border-bottom: 2px solid #009879; }}")?;
    writeln!(output, "        .absent {{ color: #999999; }}")?;
    writeln!(output, "        .meta {{ color: #666666; }}")?;
    writeln!(output, "    </style>")?;
    writeln!(output, "</head>")?;
    writeln!(output, "<body>")?;
    writeln!(
        output,
        "    <p class=\"meta\">Jobs created since {}, generated {}</p>",
        report.since.format("%Y-%m-%d %H:%M UTC"),
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    )?;

    for project in &report.projects {
        write_project(project, output)?;
    }

    writeln!(output, "</body>")?;
    writeln!(output, "</html>")?;

    Ok(())
}

fn write_project(project: &ProjectReport, output: &mut dyn Write) -> Result<()> {
    let path = escape_html(&project.path);

    writeln!(
        output,
        "    <h1>{path} (Average Total Duration aka Run Time + Queue Time)</h1>"
    )?;
    write_duration_table(project, output, |stat| &stat.total_duration)?;

    writeln!(output, "    <h1>{path} (Average Queue Time)</h1>")?;
    write_duration_table(project, output, |stat| &stat.queue_duration)?;

    writeln!(output, "    <h1>{path} (Average Run Time)</h1>")?;
    write_duration_table(project, output, |stat| &stat.run_duration)?;

    writeln!(output, "    <h2>{path} (Job Count)</h2>")?;
    write_table(project, output, |stat| match stat {
        Some(stat) => stat.count.to_string(),
        None => "0".to_string(),
    })?;

    if project.skipped.total > 0 {
        let reasons: Vec<String> = project
            .skipped
            .reasons
            .iter()
            .map(|(reason, count)| format!("{} {count}", escape_html(reason)))
            .collect();
        writeln!(
            output,
            "    <p class=\"meta\">Skipped {} of {} jobs ({})</p>",
            project.skipped.total,
            project.fetched_jobs,
            reasons.join(", ")
        )?;
    }

    Ok(())
}

fn write_duration_table(
    project: &ProjectReport,
    output: &mut dyn Write,
    select: impl Fn(&AggregateStat) -> &DurationStats,
) -> Result<()> {
    write_table(project, output, |stat| {
        match stat.and_then(|stat| select(stat).mean()) {
            Some(mean) => format!("{mean:.2}"),
            None => "<span class=\"absent\">n/a</span>".to_string(),
        }
    })
}

/// Rows are job names, columns are buckets; `cell` receives `None` when the
/// bucket never ran that job.
fn write_table(
    project: &ProjectReport,
    output: &mut dyn Write,
    cell: impl Fn(Option<&AggregateStat>) -> String,
) -> Result<()> {
    let buckets = &project.report.buckets;

    writeln!(output, "    <table>")?;
    writeln!(output, "        <thead>")?;
    writeln!(output, "            <tr>")?;
    writeln!(output, "                <th>Job</th>")?;
    for bucket in buckets {
        writeln!(output, "                <th>{}</th>", escape_html(&bucket.name))?;
    }
    writeln!(output, "            </tr>")?;
    writeln!(output, "        </thead>")?;
    writeln!(output, "        <tbody>")?;

    for job in project.report.job_names() {
        writeln!(output, "            <tr>")?;
        writeln!(output, "                <td>{}</td>", escape_html(job))?;
        for bucket in buckets {
            writeln!(output, "                <td>{}</td>", cell(bucket.job(job)))?;
        }
        writeln!(output, "            </tr>")?;
    }

    writeln!(output, "        </tbody>")?;
    writeln!(output, "    </table>")?;

    Ok(())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
