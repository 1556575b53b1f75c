//! Validator - One linear pass from loaded documents to findings
//!
//! Document checks run first and decode the request; group and rule
//! guardrails then run over every security group. The result is a pure
//! function of the two input documents.

use std::path::Path;

use crate::checks::{
    ActiveCompliance, GroupInput, GroupLimits, RuleInput, check_document, check_group, check_rule,
    duplicate_rules,
};
use crate::error::LoadResult;
use crate::finding::{Direction, Finding, Locator};
use crate::loader::{RequestDocument, load_policy, load_request};
use crate::policy::{ComplianceMode, Guardrails};
use crate::report::{Report, ReportOptions};
use crate::request::SecurityGroupRequest;

/// All findings about a loaded request, in check order
pub fn validate(doc: &RequestDocument, guardrails: &Guardrails) -> Vec<Finding> {
    let (request, mut findings) = check_document(doc, guardrails);
    log::debug!("Document checks: {} finding(s)", findings.len());

    let guardrail_findings = evaluate(&request, guardrails);
    log::debug!(
        "Guardrail checks over {} security group(s): {} finding(s)",
        request.security_groups.len(),
        guardrail_findings.len()
    );

    findings.extend(guardrail_findings);
    findings
}

/// Group and rule guardrails for every security group
pub fn evaluate(request: &SecurityGroupRequest, guardrails: &Guardrails) -> Vec<Finding> {
    let mode = request.compliance_mode;
    let compliance: ActiveCompliance<'_> = match mode {
        ComplianceMode::None => None,
        mode => guardrails.compliance(mode).map(|rules| (mode, rules)),
    };

    let mut findings = Vec::new();
    for group in &request.security_groups {
        let limits = GroupLimits::resolve(group, guardrails);

        findings.extend(check_group(&GroupInput {
            group,
            request,
            guardrails,
            limits: &limits,
            compliance,
        }));

        for direction in Direction::ALL {
            for (i, rule) in group.rules(direction).iter().enumerate() {
                if rule.invalid {
                    continue;
                }
                let input = RuleInput::new(
                    rule,
                    direction,
                    Locator::rule(group.index, group.name.clone(), direction, i),
                    guardrails,
                    &limits,
                    compliance,
                );
                findings.extend(check_rule(&input));
            }
            findings.extend(duplicate_rules(group, direction));
        }
    }
    findings
}

/// Validate a loaded request and build its report
pub fn validate_document(
    doc: &RequestDocument,
    guardrails: &Guardrails,
    options: ReportOptions,
) -> Report {
    let findings = validate(doc, guardrails);
    let report = Report::new(doc.account_id.clone(), doc.path.clone(), findings, options);
    log::debug!("{}: {}", doc.path.display(), report.summary());
    report
}

/// Load both documents from disk and validate
pub fn validate_path(request: &Path, policy: &Path, options: ReportOptions) -> LoadResult<Report> {
    let guardrails = load_policy(policy)?;
    let doc = load_request(request)?;
    Ok(validate_document(&doc, &guardrails, options))
}
