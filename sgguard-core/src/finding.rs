//! Finding - One validation outcome about a security group request
//!
//! Findings are the product of a validation run, not failures of it.
//! Each one carries a stable rule identifier and a locator into the
//! request document so CI tooling can act on it without parsing prose.

use std::fmt;

use serde::Serialize;

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks the pull request
    Error,
    /// Surfaced but non-blocking
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of the guardrail or schema check that fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    // Document shape
    SchemaUnknownKey,
    SchemaType,
    SchemaInvalidEnvironment,
    SchemaInvalidComplianceMode,
    SchemaNoSecurityGroups,
    AccountIdMismatch,
    BaselineProfileUnknown,
    BaselineProfileConflict,
    BaselineProfileDuplicate,

    // Security group
    SgNamingPattern,
    SgNameTooLong,
    SgReservedName,
    SgNonAscii,
    SgRequiredDescription,
    SgRequiredTags,
    SgRuleLimitExceeded,
    SgEmptyRules,
    SgUnknownType,
    TypeProtocolRestriction,

    // Individual rules
    RuleRequiredProtocol,
    RuleInvalidProtocol,
    RuleRequiredPorts,
    RuleInvalidPortRange,
    RulePortRangeTooBroad,
    RuleBlockedPort,
    RuleWarningPort,
    RuleMissingSource,
    RuleInvalidCidr,
    RuleCidrBlocked,
    RuleMissingDescription,
    RuleDuplicate,
    RuleUnknownPrefixList,
    RuleUnknownBaselineReference,

    // Compliance mode extras
    ComplianceBlockedPort,
    ComplianceWarningPort,
    ComplianceCidrBlocked,
    ComplianceBroadCidr,
    ComplianceRequiredTags,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::SchemaUnknownKey => "schema_unknown_key",
            RuleId::SchemaType => "schema_type",
            RuleId::SchemaInvalidEnvironment => "schema_invalid_environment",
            RuleId::SchemaInvalidComplianceMode => "schema_invalid_compliance_mode",
            RuleId::SchemaNoSecurityGroups => "schema_no_security_groups",
            RuleId::AccountIdMismatch => "account_id_mismatch",
            RuleId::BaselineProfileUnknown => "baseline_profile_unknown",
            RuleId::BaselineProfileConflict => "baseline_profile_conflict",
            RuleId::BaselineProfileDuplicate => "baseline_profile_duplicate",
            RuleId::SgNamingPattern => "sg_naming_pattern",
            RuleId::SgNameTooLong => "sg_name_too_long",
            RuleId::SgReservedName => "sg_reserved_name",
            RuleId::SgNonAscii => "sg_non_ascii",
            RuleId::SgRequiredDescription => "sg_required_description",
            RuleId::SgRequiredTags => "sg_required_tags",
            RuleId::SgRuleLimitExceeded => "sg_rule_limit_exceeded",
            RuleId::SgEmptyRules => "sg_empty_rules",
            RuleId::SgUnknownType => "sg_unknown_type",
            RuleId::TypeProtocolRestriction => "type_protocol_restriction",
            RuleId::RuleRequiredProtocol => "rule_required_protocol",
            RuleId::RuleInvalidProtocol => "rule_invalid_protocol",
            RuleId::RuleRequiredPorts => "rule_required_ports",
            RuleId::RuleInvalidPortRange => "rule_invalid_port_range",
            RuleId::RulePortRangeTooBroad => "rule_port_range_too_broad",
            RuleId::RuleBlockedPort => "rule_blocked_port",
            RuleId::RuleWarningPort => "rule_warning_port",
            RuleId::RuleMissingSource => "rule_missing_source",
            RuleId::RuleInvalidCidr => "rule_invalid_cidr",
            RuleId::RuleCidrBlocked => "rule_cidr_blocked",
            RuleId::RuleMissingDescription => "rule_missing_description",
            RuleId::RuleDuplicate => "rule_duplicate",
            RuleId::RuleUnknownPrefixList => "rule_unknown_prefix_list",
            RuleId::RuleUnknownBaselineReference => "rule_unknown_baseline_reference",
            RuleId::ComplianceBlockedPort => "compliance_blocked_port",
            RuleId::ComplianceWarningPort => "compliance_warning_port",
            RuleId::ComplianceCidrBlocked => "compliance_cidr_blocked",
            RuleId::ComplianceBroadCidr => "compliance_broad_cidr",
            RuleId::ComplianceRequiredTags => "compliance_required_tags",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule direction within a security group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Ingress, Direction::Egress];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ingress => "ingress",
            Direction::Egress => "egress",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report section a group-scoped finding belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    /// The security group as a whole (name, tags, description, counts)
    Group,
    Rules(Direction),
}

/// Where in the request document a finding points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A top-level key path, e.g. `environment` or `baseline_profiles[1]`
    Document(String),
    /// Something inside a security group
    Group {
        /// Position of the group in the source document
        index: usize,
        name: String,
        section: Section,
        /// Rule position within its direction list
        rule: Option<usize>,
        /// Trailing field path, e.g. `tags` or `cidr_blocks[0]`
        field: Option<String>,
    },
}

impl Locator {
    pub fn document(path: impl Into<String>) -> Self {
        Locator::Document(path.into())
    }

    pub fn group(index: usize, name: impl Into<String>) -> Self {
        Locator::Group {
            index,
            name: name.into(),
            section: Section::Group,
            rule: None,
            field: None,
        }
    }

    pub fn rule(index: usize, name: impl Into<String>, direction: Direction, rule: usize) -> Self {
        Locator::Group {
            index,
            name: name.into(),
            section: Section::Rules(direction),
            rule: Some(rule),
            field: None,
        }
    }

    /// Narrow the locator to a field below it
    pub fn field(self, field: impl Into<String>) -> Self {
        match self {
            Locator::Document(path) => Locator::Document(format!("{}.{}", path, field.into())),
            Locator::Group {
                index,
                name,
                section,
                rule,
                field: existing,
            } => {
                let field = field.into();
                let field = match existing {
                    Some(prefix) => format!("{}.{}", prefix, field),
                    None => field,
                };
                Locator::Group {
                    index,
                    name,
                    section,
                    rule,
                    field: Some(field),
                }
            }
        }
    }

    /// Key used to put findings into document order
    ///
    /// Document-level findings come first, then each group in source order,
    /// and within a group: group-level, ingress, egress, ordered by rule.
    pub fn sort_key(&self) -> (usize, Section, Option<usize>) {
        match self {
            Locator::Document(_) => (0, Section::Group, None),
            Locator::Group {
                index,
                section,
                rule,
                ..
            } => (index + 1, *section, *rule),
        }
    }

    /// Name of the security group this locator points into, if any
    pub fn group_name(&self) -> Option<&str> {
        match self {
            Locator::Document(_) => None,
            Locator::Group { name, .. } => Some(name),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Document(path) => f.write_str(path),
            Locator::Group {
                name,
                section,
                rule,
                field,
                ..
            } => {
                write!(f, "security_group.{}", name)?;
                if let (Section::Rules(direction), Some(rule)) = (section, rule) {
                    write!(f, ".{}[{}]", direction, rule)?;
                }
                if let Some(field) = field {
                    write!(f, ".{}", field)?;
                }
                Ok(())
            }
        }
    }
}

/// One reported validation outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub rule_id: RuleId,
    pub message: String,
    pub path: String,
    #[serde(skip)]
    pub locator: Locator,
}

impl Finding {
    pub fn new(
        severity: Severity,
        rule_id: RuleId,
        locator: Locator,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            rule_id,
            message: message.into(),
            path: locator.to_string(),
            locator,
        }
    }

    pub fn error(rule_id: RuleId, locator: Locator, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, rule_id, locator, message)
    }

    pub fn warning(rule_id: RuleId, locator: Locator, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, rule_id, locator, message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {}: {}",
            self.severity, self.rule_id, self.path, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_id_serializes_as_stable_code() {
        let json = serde_json::to_string(&RuleId::RulePortRangeTooBroad).unwrap();
        assert_eq!(json, "\"rule_port_range_too_broad\"");
        assert_eq!(
            RuleId::RuleUnknownBaselineReference.as_str(),
            "rule_unknown_baseline_reference"
        );
    }

    #[test]
    fn locator_paths() {
        assert_eq!(Locator::document("environment").to_string(), "environment");
        assert_eq!(
            Locator::group(0, "web-servers").to_string(),
            "security_group.web-servers"
        );
        assert_eq!(
            Locator::rule(0, "web-servers", Direction::Ingress, 0).to_string(),
            "security_group.web-servers.ingress[0]"
        );
        assert_eq!(
            Locator::rule(0, "web-servers", Direction::Egress, 2)
                .field("cidr_blocks[1]")
                .to_string(),
            "security_group.web-servers.egress[2].cidr_blocks[1]"
        );
        assert_eq!(
            Locator::group(1, "db").field("tags").field("Team").to_string(),
            "security_group.db.tags.Team"
        );
    }

    #[test]
    fn sort_key_orders_document_then_groups() {
        let doc = Locator::document("account_id").sort_key();
        let group = Locator::group(0, "a").sort_key();
        let ingress = Locator::rule(0, "a", Direction::Ingress, 3).sort_key();
        let egress = Locator::rule(0, "a", Direction::Egress, 0).sort_key();
        let next = Locator::group(1, "b").sort_key();
        assert!(doc < group);
        assert!(group < ingress);
        assert!(ingress < egress);
        assert!(egress < next);
    }

    #[test]
    fn finding_display() {
        let finding = Finding::error(
            RuleId::RuleBlockedPort,
            Locator::rule(0, "web", Direction::Ingress, 0),
            "Port 23 (Telnet) is blocked",
        );
        assert_eq!(
            finding.to_string(),
            "error[rule_blocked_port] security_group.web.ingress[0]: Port 23 (Telnet) is blocked"
        );
    }
}
