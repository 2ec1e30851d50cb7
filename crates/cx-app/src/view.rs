//! Terminal rendering of jobs and results.
//!
//! Every function here returns a `String` and has no side effects; the command
//! layer decides where it goes.

pub mod plot;

use std::fmt::Write;

use chrono::{DateTime, Utc};
use colored::{Color, Colorize};
use cx_client::ApiClient;
use cx_core::{CanonicalResult, Job, JobStatus};

pub const NO_DATA: &str = "No data extracted";

fn status_color(status: JobStatus) -> Color {
    match status {
        JobStatus::Uploaded => Color::BrightBlack,
        JobStatus::Processing => Color::Yellow,
        JobStatus::Done => Color::Green,
        JobStatus::Error => Color::Red,
    }
}

pub fn status_badge(status: JobStatus) -> String {
    format!("{} {}", status.icon(), status.label())
        .color(status_color(status))
        .bold()
        .to_string()
}

fn timing(job: &Job, now: DateTime<Utc>) -> Option<String> {
    let created = job.created_at?;
    let line = match job.processed_at {
        Some(processed) if job.status.is_terminal() => {
            format!("Completed in {}s", (processed - created).num_seconds().max(0))
        }
        _ => format!("Elapsed: {}s", (now - created).num_seconds().max(0)),
    };
    Some(line)
}

pub fn job_card(job: &Job, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  {}  {}",
        format!("#{}", job.id).bold(),
        job.display_name(),
        status_badge(job.status)
    );

    if let Some(mime) = &job.mime_type {
        let _ = writeln!(out, "    {}", mime.dimmed());
    }
    if let (Some(panels), Some(series)) = (job.n_panels, job.n_series) {
        let _ = writeln!(out, "    {panels} panel(s), {series} series");
    }
    if let Some(time) = timing(job, now) {
        let _ = writeln!(out, "    {}", time.dimmed());
    }
    if job.status == JobStatus::Error {
        let _ = writeln!(out, "    {}", job.failure_message().red());
    }
    out
}

pub fn job_table(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return format!("{}\n", "No jobs yet".dimmed());
    }

    let name_width = jobs
        .iter()
        .map(|j| j.display_name().chars().count())
        .max()
        .unwrap_or(0)
        .clamp(8, 40);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        format!("{:>6}  {:<name_width$}  {:<19}  STATUS", "ID", "FILE", "CREATED").bold()
    );
    for job in jobs {
        let name: String = job.display_name().chars().take(name_width).collect();
        let created = job
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:>6}  {:<name_width$}  {:<19}  {}",
            job.id.to_string(),
            name,
            created,
            status_badge(job.status)
        );
    }

    let active = jobs.iter().filter(|j| j.status.is_active()).count();
    let finished = jobs.iter().filter(|j| j.status.is_terminal()).count();
    let _ = writeln!(out, "{}", format!("Active: {active} | Finished: {finished}").dimmed());
    out
}

pub fn artifact_list(job: &Job, client: &ApiClient) -> String {
    let keys = job.artifacts();
    if keys.is_empty() {
        return format!("{}\n", "No artifacts".dimmed());
    }

    let mut out = format!("{}\n", "Artifacts".bold());
    for key in keys {
        let _ = writeln!(out, "  {} ({})", key.title(), key.subtitle().dimmed());
        let _ = writeln!(out, "    {}  {}", key.as_str().cyan(), client.artifact_url(job.id, key.as_str()));
    }
    let _ = writeln!(out, "  {} ({})", "Original".bold(), client.original_url(job.id));
    out
}

fn fmt_num(v: f64) -> String {
    let s = format!("{v:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

pub fn result_summary(result: &CanonicalResult) -> String {
    if result.is_empty() {
        return format!("{}\n", NO_DATA.dimmed());
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        format!("{} series, {} points", result.len(), result.total_points()).bold()
    );
    for summary in result.summaries() {
        let _ = writeln!(
            out,
            "  {:<24} {:>5} pts  x [{}, {}]  y [{}, {}]",
            summary.id,
            summary.points,
            fmt_num(summary.x_min),
            fmt_num(summary.x_max),
            fmt_num(summary.y_min),
            fmt_num(summary.y_max),
        );
    }
    out
}

pub fn failure_alert(title: &str, message: &str) -> String {
    format!("{} {}\n", format!("{title}:").red().bold(), message)
}
