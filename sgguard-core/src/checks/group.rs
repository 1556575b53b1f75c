//! Group checks - Guardrails that apply to a security group as a whole

use crate::finding::{Direction, Finding, Locator, RuleId};
use crate::policy::{ComplianceMode, ComplianceRuleSet, Guardrails};
use crate::request::{Protocol, SecurityGroupRequest, SecurityGroupSpec};

/// Limits in force for one group after applying its `type` override
#[derive(Debug, Clone, PartialEq)]
pub struct GroupLimits {
    /// The group's type, when it names a known override
    pub group_type: Option<String>,
    pub max_port_range: u32,
    pub max_rules_per_group: usize,
    /// `None` allows every protocol
    pub allowed_protocols: Option<Vec<Protocol>>,
}

impl GroupLimits {
    pub fn resolve(group: &SecurityGroupSpec, guardrails: &Guardrails) -> Self {
        let policy = &guardrails.policy;
        let mut limits = GroupLimits {
            group_type: None,
            max_port_range: policy.max_port_range,
            max_rules_per_group: policy.max_rules_per_group,
            allowed_protocols: None,
        };

        let Some((name, over)) = group
            .group_type
            .as_deref()
            .and_then(|t| policy.type_overrides.get_key_value(t))
        else {
            return limits;
        };

        limits.group_type = Some(name.clone());
        if let Some(range) = over.max_port_range {
            limits.max_port_range = range;
        }
        if let Some(max) = over.max_rules_per_group {
            limits.max_rules_per_group = max;
        }
        // Unparsable entries are rejected when the policy is compiled
        limits.allowed_protocols = over.allowed_protocols.as_ref().map(|protocols| {
            protocols
                .iter()
                .filter_map(|p| Protocol::parse(p).ok())
                .collect()
        });
        limits
    }
}

/// Compliance rule set in force, with the mode that selected it
pub type ActiveCompliance<'a> = Option<(ComplianceMode, &'a ComplianceRuleSet)>;

/// How a compliance rule set is cited in messages
pub fn cite(mode: ComplianceMode, rules: &ComplianceRuleSet) -> String {
    match &rules.reference {
        Some(reference) => reference.clone(),
        None => format!("{} compliance rules", mode.as_str().to_uppercase()),
    }
}

/// A group together with everything its checks consult
pub struct GroupInput<'a> {
    pub group: &'a SecurityGroupSpec,
    pub request: &'a SecurityGroupRequest,
    pub guardrails: &'a Guardrails,
    pub limits: &'a GroupLimits,
    pub compliance: ActiveCompliance<'a>,
}

impl GroupInput<'_> {
    fn locator(&self) -> Locator {
        Locator::group(self.group.index, self.group.name.clone())
    }
}

type GroupCheck = fn(&GroupInput<'_>) -> Vec<Finding>;

const GROUP_CHECKS: [GroupCheck; 10] = [
    naming_pattern,
    name_length,
    reserved_name,
    non_ascii,
    description,
    empty_rules,
    required_tags,
    compliance_tags,
    rule_limit,
    unknown_type,
];

/// Run every group-level check
pub fn check_group(input: &GroupInput<'_>) -> Vec<Finding> {
    GROUP_CHECKS.iter().flat_map(|check| check(input)).collect()
}

fn naming_pattern(input: &GroupInput<'_>) -> Vec<Finding> {
    let name = &input.group.name;
    if input.guardrails.naming().is_match(name) {
        return Vec::new();
    }
    vec![Finding::error(
        RuleId::SgNamingPattern,
        input.locator(),
        format!(
            "Security group name '{}' doesn't match required pattern {}",
            name, input.guardrails.policy.naming_pattern
        ),
    )]
}

fn name_length(input: &GroupInput<'_>) -> Vec<Finding> {
    let length = input.group.name.chars().count();
    let max = input.guardrails.policy.max_name_length;
    if length <= max {
        return Vec::new();
    }
    vec![Finding::error(
        RuleId::SgNameTooLong,
        input.locator(),
        format!(
            "Security group name '{}' is too long ({} characters, max {})",
            input.group.name, length, max
        ),
    )]
}

fn reserved_name(input: &GroupInput<'_>) -> Vec<Finding> {
    let name = &input.group.name;
    input
        .guardrails
        .policy
        .reserved_name_prefixes
        .iter()
        .find(|prefix| name.starts_with(prefix.as_str()))
        .map(|prefix| {
            Finding::warning(
                RuleId::SgReservedName,
                input.locator(),
                format!(
                    "Security group name '{}' starts with reserved prefix '{}'",
                    name, prefix
                ),
            )
        })
        .into_iter()
        .collect()
}

/// First character outside printable ASCII, with its position
fn first_non_ascii(value: &str) -> Option<(usize, char)> {
    value
        .chars()
        .enumerate()
        .find(|(_, c)| !(c.is_ascii_graphic() || c.is_ascii_whitespace()))
}

fn non_ascii_finding(locator: Locator, value: &str) -> Option<Finding> {
    let (position, c) = first_non_ascii(value)?;
    let message = format!(
        "Non-ASCII character {:?} (U+{:04X}) in {} at position {}; only printable ASCII is allowed",
        c, c as u32, locator, position
    );
    Some(Finding::error(RuleId::SgNonAscii, locator, message))
}

fn non_ascii(input: &GroupInput<'_>) -> Vec<Finding> {
    let group = input.group;
    let mut findings = Vec::new();

    findings.extend(non_ascii_finding(input.locator().field("name"), &group.name));
    if let Some(description) = &group.description {
        findings.extend(non_ascii_finding(
            input.locator().field("description"),
            description,
        ));
    }
    for (key, value) in &group.tags {
        let locator = input.locator().field("tags").field(key.as_str());
        findings.extend(non_ascii_finding(locator.clone(), key));
        findings.extend(non_ascii_finding(locator, value));
    }
    for direction in Direction::ALL {
        for (i, rule) in group.rules(direction).iter().enumerate() {
            if let Some(description) = &rule.description {
                let locator = Locator::rule(group.index, group.name.clone(), direction, i)
                    .field("description");
                findings.extend(non_ascii_finding(locator, description));
            }
        }
    }

    findings
}

fn description(input: &GroupInput<'_>) -> Vec<Finding> {
    let group = input.group;
    let present = group
        .description
        .as_deref()
        .is_some_and(|d| !d.trim().is_empty());
    if present || group.malformed.contains("description") {
        return Vec::new();
    }
    vec![Finding::error(
        RuleId::SgRequiredDescription,
        input.locator().field("description"),
        format!(
            "Security group '{}' must have a non-empty description explaining what it protects",
            group.name
        ),
    )]
}

fn empty_rules(input: &GroupInput<'_>) -> Vec<Finding> {
    let group = input.group;
    Direction::ALL
        .into_iter()
        .filter(|direction| {
            let rules = match direction {
                Direction::Ingress => &group.ingress,
                Direction::Egress => &group.egress,
            };
            rules.as_ref().is_some_and(Vec::is_empty)
        })
        .map(|direction| {
            Finding::warning(
                RuleId::SgEmptyRules,
                input.locator().field(direction.as_str()),
                format!(
                    "Security group '{}' has an empty {} list; remove it or add rules",
                    group.name, direction
                ),
            )
        })
        .collect()
}

fn missing_tags<'t>(input: &GroupInput<'_>, required: &'t [String]) -> Vec<&'t str> {
    let merged = input.group.merged_tags(&input.request.tags);
    required
        .iter()
        .filter(|tag| !merged.contains_key(tag.as_str()))
        .map(String::as_str)
        .collect()
}

fn required_tags(input: &GroupInput<'_>) -> Vec<Finding> {
    let required = &input.guardrails.policy.required_tags;
    let missing = missing_tags(input, required);
    if missing.is_empty() {
        return Vec::new();
    }
    let noun = if missing.len() == 1 { "tag" } else { "tags" };
    vec![Finding::error(
        RuleId::SgRequiredTags,
        input.locator().field("tags"),
        format!(
            "Missing required {}: {}. Every security group must carry: {}",
            noun,
            missing.join(", "),
            required.join(", ")
        ),
    )]
}

fn compliance_tags(input: &GroupInput<'_>) -> Vec<Finding> {
    let Some((mode, rules)) = input.compliance else {
        return Vec::new();
    };
    let base = &input.guardrails.policy.required_tags;
    let missing: Vec<&str> = missing_tags(input, &rules.required_tags)
        .into_iter()
        .filter(|tag| !base.iter().any(|b| b == tag))
        .collect();
    if missing.is_empty() {
        return Vec::new();
    }
    vec![Finding::error(
        RuleId::ComplianceRequiredTags,
        input.locator().field("tags"),
        format!(
            "Missing tags required under {}: {}",
            cite(mode, rules),
            missing.join(", ")
        ),
    )]
}

fn rule_limit(input: &GroupInput<'_>) -> Vec<Finding> {
    let count = input.group.rule_count();
    let max = input.limits.max_rules_per_group;
    if count <= max {
        return Vec::new();
    }
    let scope = match &input.limits.group_type {
        Some(t) => format!("maximum for type '{}'", t),
        None => "maximum".to_string(),
    };
    vec![Finding::error(
        RuleId::SgRuleLimitExceeded,
        input.locator(),
        format!(
            "Security group '{}' has {} rules (ingress + egress), {} is {}. Consolidate rules or split the group by function",
            input.group.name, count, scope, max
        ),
    )]
}

fn unknown_type(input: &GroupInput<'_>) -> Vec<Finding> {
    let Some(group_type) = &input.group.group_type else {
        return Vec::new();
    };
    let overrides = &input.guardrails.policy.type_overrides;
    if overrides.contains_key(group_type) {
        return Vec::new();
    }
    let known = if overrides.is_empty() {
        "the guardrail policy defines no types".to_string()
    } else {
        let names: Vec<&str> = overrides.keys().map(String::as_str).collect();
        format!("known types: {}", names.join(", "))
    };
    vec![Finding::error(
        RuleId::SgUnknownType,
        input.locator().field("type"),
        format!("Unknown security group type '{}'; {}", group_type, known),
    )]
}
