//! Display formatting for CLI output
//!
//! Provides:
//! - Converge summaries grouped by outcome
//! - Diff output for releases with pending changes
//! - Release listings as a table or JSON rows

use console::style;
use serde::Serialize;
use sherpfile_kube::{ConvergeReport, Operation, ReleaseOutcome, ReleaseResult};

use crate::app::DocumentPlan;

/// One row of `list`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseRow {
    pub name: String,
    pub namespace: String,
    pub enabled: bool,
    pub labels: String,
    pub chart: String,
    pub version: String,
    pub group: usize,
}

/// Rows for every planned release, document by document
pub fn release_rows(plans: &[DocumentPlan]) -> Vec<ReleaseRow> {
    let mut rows = Vec::new();
    for plan in plans {
        let mut planned: Vec<_> = plan
            .groups
            .iter()
            .flat_map(|group| group.releases.iter().map(move |r| (group.number, r)))
            .collect();
        planned.sort_by_key(|(_, r)| r.index);

        for (group, r) in planned {
            let release = &r.release;
            rows.push(ReleaseRow {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
                enabled: release.desired(),
                labels: release
                    .labels
                    .iter()
                    .map(|(k, v)| format!("{}:{}", k, v))
                    .collect::<Vec<_>>()
                    .join(","),
                chart: release.chart.clone(),
                version: release.version.clone().unwrap_or_default(),
                group,
            });
        }
    }
    rows
}

/// Render rows as an aligned table
pub fn format_table(rows: &[ReleaseRow]) -> String {
    let header = ["NAME", "NAMESPACE", "ENABLED", "LABELS", "CHART", "VERSION", "GROUP"];
    let cells: Vec<[String; 7]> = rows
        .iter()
        .map(|r| {
            [
                r.name.clone(),
                r.namespace.clone(),
                r.enabled.to_string(),
                r.labels.clone(),
                r.chart.clone(),
                r.version.clone(),
                r.group.to_string(),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let format_line = |cells: &[&str]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![format_line(&header[..])];
    for row in &cells {
        let refs: Vec<&str> = row.iter().map(String::as_str).collect();
        lines.push(format_line(&refs[..]));
    }
    lines.join("\n")
}

/// Print the group layout of each document
pub fn print_plans(plans: &[DocumentPlan]) {
    for plan in plans.iter().filter(|p| !p.groups.is_empty()) {
        println!(
            "{} {}",
            style("→").blue().bold(),
            style(plan.state.file_path.display()).cyan()
        );
        println!("{}", plan.summary().display());
    }
}

/// Print the diff text of every release with pending changes
pub fn print_diffs(report: &ConvergeReport) {
    for result in &report.results {
        if let ReleaseOutcome::Changed(diff) = &result.outcome {
            println!("{} {}", style("Comparing release").bold(), style(&result.id).cyan());
            if !diff.trim().is_empty() {
                println!("{}", diff.trim_end());
            }
        }
    }
}

/// Summary sections of a converge pass
pub fn report_sections(report: &ConvergeReport, operation: Operation) -> Vec<(String, Vec<&ReleaseResult>)> {
    let mut updated = report.installed();
    updated.extend(report.upgraded());
    updated.sort_by_key(|r| r.index);

    let sections = [
        ("UPDATED RELEASES", updated),
        ("DELETED RELEASES", report.deleted()),
        (
            if operation == Operation::Diff {
                "RELEASES WITH CHANGES"
            } else {
                "PENDING CHANGES"
            },
            report.changed(),
        ),
        ("SKIPPED RELEASES", report.skipped()),
        ("FAILED RELEASES", report.failed()),
    ];

    sections
        .into_iter()
        .filter(|(_, results)| !results.is_empty())
        .map(|(title, results)| (title.to_string(), results))
        .collect()
}

/// Print the summary of a converge pass
pub fn print_report(report: &ConvergeReport, operation: Operation) {
    let sections = report_sections(report, operation);
    if sections.is_empty() {
        println!(
            "{} {} up to date",
            style("✓").green().bold(),
            pluralize(report.unchanged().len(), "release is", "releases are")
        );
        return;
    }

    for (title, results) in sections {
        println!();
        println!("{}", style(title).bold());
        for result in results {
            let detail = match &result.outcome {
                ReleaseOutcome::Skipped(reason) => format!(" ({})", reason),
                ReleaseOutcome::Failed(error) => format!(": {}", error),
                _ => String::new(),
            };
            let icon = match &result.outcome {
                ReleaseOutcome::Failed(_) => style("✗").red(),
                ReleaseOutcome::Skipped(_) => style("-").dim(),
                ReleaseOutcome::Changed(_) => style("~").yellow(),
                _ => style("✓").green(),
            };
            println!("  {} {}{}", icon, result.id, detail);
        }
    }

    if report.interrupted {
        println!();
        println!("{} interrupted, remaining releases were not started", style("⚠").yellow());
    }
    tracing::debug!(elapsed_ms = report.elapsed().num_milliseconds(), "converge finished");
}

/// Format count with proper pluralization
pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}
