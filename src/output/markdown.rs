//! Markdown rendering of the integrity audit
//!
//! The same report is printed to the terminal via `Display`; this is the
//! file form written to `report-path`.

use crate::audit::{AuditReport, Severity};
use crate::output::{OutputError, OutputResult};
use std::fs;
use std::path::Path;

/// Writes the audit report as markdown to `output_path`
pub fn write_audit_markdown(
    report: &AuditReport,
    generated_at: &str,
    output_path: &Path,
) -> OutputResult<()> {
    if output_path.as_os_str().is_empty() {
        return Err(OutputError::EmptyPath);
    }

    let markdown = format_audit_markdown(report, generated_at);
    fs::write(output_path, markdown).map_err(|source| OutputError::Write {
        path: output_path.display().to_string(),
        source,
    })
}

/// Formats an audit report as markdown
pub fn format_audit_markdown(report: &AuditReport, generated_at: &str) -> String {
    let mut md = String::new();

    md.push_str("# Rally-Graph Integrity Report\n\n");
    md.push_str(&format!("- **Generated**: {}\n", generated_at));
    md.push_str(&format!("- **Players checked**: {}\n", report.players_checked));
    md.push_str(&format!(
        "- **Player/tournament pairs**: {}\n",
        report.tournaments_checked
    ));
    md.push_str(&format!("- **Matches checked**: {}\n\n", report.matches_checked));

    md.push_str("## Summary\n\n");
    if report.is_clean() {
        md.push_str("No issues found.\n");
        return md;
    }

    md.push_str("| Severity | Rule | Count |\n");
    md.push_str("|----------|------|-------|\n");
    for ((severity, rule), count) in report.counts_by_rule() {
        md.push_str(&format!("| {} | `{}` | {} |\n", severity, rule, count));
    }
    md.push('\n');

    for (heading, severity) in [("Errors", Severity::Error), ("Warnings", Severity::Warning)] {
        let issues: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.severity == severity)
            .collect();
        if issues.is_empty() {
            continue;
        }

        md.push_str(&format!("## {} ({})\n\n", heading, issues.len()));
        md.push_str("| Rule | Tournament | Player | Matches | Detail |\n");
        md.push_str("|------|------------|--------|---------|--------|\n");
        for issue in issues {
            let player = issue
                .player_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            let ids: Vec<String> = issue.match_ids.iter().map(|id| id.to_string()).collect();
            md.push_str(&format!(
                "| `{}` | {} | {} | {} | {} |\n",
                issue.rule,
                issue.tournament_id,
                player,
                ids.join(", "),
                issue.detail.replace('|', "\\|")
            ));
        }
        md.push('\n');
    }

    md
}
