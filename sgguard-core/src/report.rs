//! Report - Ordered findings, counts and the exit status contract

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::finding::{Finding, Severity};

/// Adjustments applied before findings are counted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOptions {
    /// Report warnings as errors, so they block
    pub warnings_as_errors: bool,
    /// Drop warnings entirely; applied before `warnings_as_errors`
    pub no_warnings: bool,
}

/// Outcome of a run, as seen by CI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// No findings
    Clean,
    /// At least one error
    Blocking,
    /// Warnings but no errors
    WarningsOnly,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::Blocking => 1,
            ExitStatus::WarningsOnly => 2,
        }
    }
}

/// Result of validating one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub account_id: String,
    pub file: PathBuf,
    pub errors: usize,
    pub warnings: usize,
    pub status: ExitStatus,
    pub exit_code: i32,
    /// In document order
    pub findings: Vec<Finding>,
}

impl Report {
    pub fn new(
        account_id: impl Into<String>,
        file: impl Into<PathBuf>,
        mut findings: Vec<Finding>,
        options: ReportOptions,
    ) -> Self {
        if options.no_warnings {
            findings.retain(Finding::is_error);
        }
        if options.warnings_as_errors {
            for finding in &mut findings {
                finding.severity = Severity::Error;
            }
        }
        // Stable, so findings about the same rule keep their check order
        findings.sort_by_key(|f| f.locator.sort_key());

        let errors = findings.iter().filter(|f| f.is_error()).count();
        let warnings = findings.len() - errors;
        let status = if errors > 0 {
            ExitStatus::Blocking
        } else if warnings > 0 {
            ExitStatus::WarningsOnly
        } else {
            ExitStatus::Clean
        };

        Self {
            account_id: account_id.into(),
            file: file.into(),
            errors,
            warnings,
            status,
            exit_code: status.code(),
            findings,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.status == ExitStatus::Clean
    }

    /// Findings split into runs that share a security group, in report
    /// order; document-level findings have no group
    pub fn by_group(&self) -> Vec<(Option<&str>, Vec<&Finding>)> {
        let mut groups: Vec<(Option<&str>, Vec<&Finding>)> = Vec::new();
        for finding in &self.findings {
            let name = finding.locator.group_name();
            if let Some((last, items)) = groups.last_mut()
                && *last == name
            {
                items.push(finding);
                continue;
            }
            groups.push((name, vec![finding]));
        }
        groups
    }

    /// "2 errors, 1 warning"
    pub fn summary(&self) -> String {
        format!(
            "{} {}, {} {}",
            self.errors,
            plural(self.errors, "error"),
            self.warnings,
            plural(self.warnings, "warning")
        )
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.file.display(), self.summary())?;
        for finding in &self.findings {
            writeln!(f, "{}", finding)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Direction, Locator, RuleId};

    fn findings() -> Vec<Finding> {
        vec![
            Finding::error(
                RuleId::RuleDuplicate,
                Locator::rule(1, "db", Direction::Ingress, 1),
                "dup",
            ),
            Finding::warning(
                RuleId::RuleWarningPort,
                Locator::rule(0, "web", Direction::Egress, 0),
                "port",
            ),
            Finding::error(RuleId::SgRequiredTags, Locator::group(1, "db"), "tags"),
            Finding::warning(
                RuleId::SchemaNoSecurityGroups,
                Locator::document("security_groups"),
                "none",
            ),
            Finding::error(
                RuleId::RuleBlockedPort,
                Locator::rule(0, "web", Direction::Ingress, 0),
                "blocked",
            ),
        ]
    }

    fn paths(report: &Report) -> Vec<&str> {
        report.findings.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn findings_are_put_in_document_order() {
        let report = Report::new("123456789012", "sg.yaml", findings(), ReportOptions::default());
        assert_eq!(
            paths(&report),
            vec![
                "security_groups",
                "security_group.web.ingress[0]",
                "security_group.web.egress[0]",
                "security_group.db",
                "security_group.db.ingress[1]",
            ]
        );
        assert_eq!(report.errors, 3);
        assert_eq!(report.warnings, 2);
        assert_eq!(report.status, ExitStatus::Blocking);
        assert_eq!(report.exit_code, 1);
    }

    #[test]
    fn exit_codes() {
        let clean = Report::new("1", "f", Vec::new(), ReportOptions::default());
        assert_eq!(clean.exit_code, 0);
        assert!(clean.is_clean());

        let warnings: Vec<Finding> = findings().into_iter().filter(|f| !f.is_error()).collect();
        let report = Report::new("1", "f", warnings, ReportOptions::default());
        assert_eq!(report.status, ExitStatus::WarningsOnly);
        assert_eq!(report.exit_code, 2);
    }

    #[test]
    fn warning_options() {
        let warnings: Vec<Finding> = findings().into_iter().filter(|f| !f.is_error()).collect();

        let promoted = Report::new(
            "1",
            "f",
            warnings.clone(),
            ReportOptions {
                warnings_as_errors: true,
                ..Default::default()
            },
        );
        assert_eq!((promoted.errors, promoted.warnings), (2, 0));
        assert_eq!(promoted.exit_code, 1);

        let dropped = Report::new(
            "1",
            "f",
            warnings,
            ReportOptions {
                no_warnings: true,
                warnings_as_errors: true,
            },
        );
        assert_eq!(dropped.exit_code, 0);
    }

    #[test]
    fn groups_and_summary() {
        let report = Report::new("1", "f", findings(), ReportOptions::default());
        let groups: Vec<(Option<&str>, usize)> = report
            .by_group()
            .into_iter()
            .map(|(name, items)| (name, items.len()))
            .collect();
        assert_eq!(groups, vec![(None, 1), (Some("web"), 2), (Some("db"), 2)]);
        assert_eq!(report.summary(), "3 errors, 2 warnings");
    }

    #[test]
    fn json_shape() {
        let report = Report::new("123456789012", "sg.yaml", findings(), ReportOptions::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["exit_code"], 1);
        assert_eq!(json["status"], "blocking");
        assert_eq!(json["findings"][0]["rule_id"], "schema_no_security_groups");
        assert_eq!(json["findings"][0]["severity"], "warning");
        assert!(json["findings"][0].get("locator").is_none());
    }
}
