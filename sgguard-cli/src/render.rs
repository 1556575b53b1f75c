//! Output formats for a validation report

use std::fmt::{self, Write as _};

use clap::ValueEnum;
use colored::Colorize;

use sgguard_core::{ExitStatus, Finding, LoadError, Report, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Colored summary and itemized findings
    Text,
    /// Machine-readable report
    Json,
    /// Pull request comment
    Markdown,
    /// One tab-separated finding per line
    Lines,
}

pub fn render(report: &Report, format: Format) -> Result<String, String> {
    match format {
        Format::Text => written(report, text),
        Format::Json => serde_json::to_string_pretty(report)
            .map(|json| format!("{}\n", json))
            .map_err(|e| format!("Failed to serialize report: {}", e)),
        Format::Markdown => written(report, markdown),
        Format::Lines => Ok(lines(report)),
    }
}

fn written(
    report: &Report,
    write: fn(&mut String, &Report) -> fmt::Result,
) -> Result<String, String> {
    let mut out = String::new();
    write(&mut out, report).map_err(|e| format!("Failed to render report: {}", e))?;
    Ok(out)
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
    }
}

fn text(out: &mut String, report: &Report) -> fmt::Result {
    writeln!(
        out,
        "{} {} (account {})",
        "Validating".cyan(),
        report.file.display(),
        report.account_id
    )?;

    let summary = match report.status {
        ExitStatus::Clean => "✓ All guardrail checks passed.".green().bold(),
        ExitStatus::WarningsOnly => format!("! {}", report.summary()).yellow().bold(),
        ExitStatus::Blocking => format!("✗ {}", report.summary()).red().bold(),
    };
    writeln!(out, "{}", summary)?;

    for finding in &report.findings {
        writeln!(out)?;
        writeln!(
            out,
            "{}[{}] {}",
            severity_label(finding.severity),
            finding.rule_id,
            finding.path.bold()
        )?;
        writeln!(out, "  {}", finding.message)?;
    }
    Ok(())
}

fn lines(report: &Report) -> String {
    report
        .findings
        .iter()
        .map(|f| {
            format!(
                "{}\t{}\t{}\t{}\n",
                f.severity,
                f.rule_id,
                f.path,
                one_line(&f.message)
            )
        })
        .collect()
}

fn one_line(s: &str) -> String {
    s.replace(['\t', '\n'], " ")
}

fn table_cell(s: &str) -> String {
    one_line(s).replace('|', "\\|")
}

fn markdown(out: &mut String, report: &Report) -> fmt::Result {
    let verdict = match report.status {
        ExitStatus::Clean => "passed",
        ExitStatus::WarningsOnly => "passed with warnings",
        ExitStatus::Blocking => "failed",
    };
    writeln!(out, "## Security group validation {}", verdict)?;
    writeln!(out)?;
    writeln!(
        out,
        "`{}` (account `{}`): **{}**",
        report.file.display(),
        report.account_id,
        report.summary()
    )?;

    for (group, findings) in report.by_group() {
        writeln!(out)?;
        match group {
            Some(name) => writeln!(out, "### `{}`", name)?,
            None => writeln!(out, "### Request")?,
        }
        writeln!(out)?;
        writeln!(out, "| Severity | Rule | Location | Message |")?;
        writeln!(out, "|---|---|---|---|")?;
        for finding in findings {
            writeln!(out, "{}", markdown_row(finding))?;
        }
    }
    Ok(())
}

fn markdown_row(finding: &Finding) -> String {
    let severity = match finding.severity {
        Severity::Error => "**error**",
        Severity::Warning => "warning",
    };
    format!(
        "| {} | `{}` | `{}` | {} |",
        severity,
        finding.rule_id,
        finding.path,
        table_cell(&finding.message)
    )
}

/// `fatal: <reason>, file: <path>`
pub fn fatal_line(error: &LoadError) -> String {
    format!("fatal: {}, file: {}", error, error.path().display())
}

pub fn fatal_json(error: &LoadError) -> String {
    serde_json::json!({
        "fatal": error.to_string(),
        "file": error.path().display().to_string(),
    })
    .to_string()
}
