//! Guardrail policy - Organization-defined constraints as data
//!
//! The policy is loaded once per run and never mutated. Operators change
//! port and CIDR lists by editing the policy document, not the code.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cidr::Cidr;
use crate::request::Protocol;

fn default_version() -> u32 {
    GuardrailPolicy::CURRENT_VERSION
}

fn default_true() -> bool {
    true
}

fn default_blocked_ports() -> BTreeSet<u16> {
    [23, 135, 139, 445].into_iter().collect()
}

fn default_warning_ports() -> BTreeSet<u16> {
    [22, 3389, 1433, 3306, 5432, 6379, 27017].into_iter().collect()
}

fn default_blocked_cidrs() -> Vec<String> {
    vec![
        "0.0.0.0/0".to_string(),
        "::/0".to_string(),
        "169.254.169.254/32".to_string(),
    ]
}

fn default_max_port_range() -> u32 {
    1000
}

fn default_required_tags() -> Vec<String> {
    ["ManagedBy", "Team", "Environment", "Application"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_allowed_environments() -> Vec<String> {
    ["production", "staging", "development"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_rules_per_group() -> usize {
    60
}

fn default_naming_pattern() -> String {
    "^[a-z0-9][a-z0-9-]*[a-z0-9]$".to_string()
}

fn default_max_name_length() -> usize {
    63
}

fn default_reserved_name_prefixes() -> Vec<String> {
    ["default", "baseline", "aws-", "amazon-"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// How rule CIDRs are compared against blocked CIDRs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CidrMatch {
    /// Exact string match against the blocked list
    #[default]
    Exact,
    /// Also match rule networks that cover a blocked network
    Contains,
}

/// Compliance regime selected by a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceMode {
    Sox,
    Pci,
    Hipaa,
    #[default]
    None,
}

impl ComplianceMode {
    pub const ALL: [ComplianceMode; 4] = [
        ComplianceMode::Sox,
        ComplianceMode::Pci,
        ComplianceMode::Hipaa,
        ComplianceMode::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceMode::Sox => "sox",
            ComplianceMode::Pci => "pci",
            ComplianceMode::Hipaa => "hipaa",
            ComplianceMode::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

impl fmt::Display for ComplianceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Baseline profile catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaselineCatalog {
    /// Profile names a request may list in `baseline_profiles`
    #[serde(default = "BaselineCatalog::default_profiles")]
    pub profiles: Vec<String>,
    /// Sets of profiles of which at most one may be selected
    #[serde(default = "BaselineCatalog::default_mutually_exclusive")]
    pub mutually_exclusive: Vec<Vec<String>>,
    /// Baseline security group names that rules may reference.
    /// Empty disables reference checking.
    #[serde(default)]
    pub security_groups: Vec<String>,
}

impl BaselineCatalog {
    fn default_profiles() -> Vec<String> {
        ["vpc-endpoints", "eks-standard", "eks-internet"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn default_mutually_exclusive() -> Vec<Vec<String>> {
        vec![vec!["eks-standard".to_string(), "eks-internet".to_string()]]
    }
}

impl Default for BaselineCatalog {
    fn default() -> Self {
        Self {
            profiles: Self::default_profiles(),
            mutually_exclusive: Self::default_mutually_exclusive(),
            security_groups: Vec::new(),
        }
    }
}

/// Limits that replace the policy-wide ones for groups of a given `type`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeOverride {
    pub max_port_range: Option<u32>,
    pub max_rules_per_group: Option<usize>,
    pub allowed_protocols: Option<Vec<String>>,
}

/// Extra checks contributed by a compliance mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplianceRuleSet {
    /// Citation appended to messages, e.g. "PCI DSS Req 1.3"
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub blocked_ports: BTreeSet<u16>,
    #[serde(default)]
    pub warning_ports: BTreeSet<u16>,
    #[serde(default)]
    pub blocked_cidrs: Vec<String>,
    /// Ingress sources considered too broad under this regime
    #[serde(default)]
    pub broad_cidrs: Vec<String>,
    #[serde(default)]
    pub required_tags: Vec<String>,
}

/// Guardrail policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardrailPolicy {
    /// Policy document format version
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_blocked_ports")]
    pub blocked_ports: BTreeSet<u16>,
    #[serde(default = "default_warning_ports")]
    pub warning_ports: BTreeSet<u16>,
    #[serde(default = "default_blocked_cidrs")]
    pub blocked_cidrs: Vec<String>,
    #[serde(default)]
    pub cidr_match: CidrMatch,
    /// Largest allowed `to_port - from_port`
    #[serde(default = "default_max_port_range")]
    pub max_port_range: u32,
    #[serde(default = "default_required_tags")]
    pub required_tags: Vec<String>,
    #[serde(default = "default_allowed_environments")]
    pub allowed_environments: Vec<String>,
    /// Cap on ingress + egress rules per group
    #[serde(default = "default_max_rules_per_group")]
    pub max_rules_per_group: usize,
    /// Regular expression group names must fully match
    #[serde(default = "default_naming_pattern")]
    pub naming_pattern: String,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    #[serde(default = "default_reserved_name_prefixes")]
    pub reserved_name_prefixes: Vec<String>,
    #[serde(default = "default_true")]
    pub require_description_for_rules: bool,
    #[serde(default)]
    pub baseline: BaselineCatalog,
    /// Prefix list names rules may reference. Empty disables the check.
    #[serde(default)]
    pub known_prefix_lists: Vec<String>,
    #[serde(default)]
    pub type_overrides: BTreeMap<String, TypeOverride>,
    #[serde(default)]
    pub compliance_rules: BTreeMap<ComplianceMode, ComplianceRuleSet>,
}

impl GuardrailPolicy {
    /// Current policy document format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Check the policy and compile what the validator needs
    pub fn compile(self) -> Result<Guardrails, Vec<String>> {
        let mut problems = Vec::new();

        let naming = match Regex::new(&format!("^(?:{})$", self.naming_pattern)) {
            Ok(re) => Some(re),
            Err(e) => {
                problems.push(format!(
                    "naming_pattern '{}' is not a valid regular expression: {}",
                    self.naming_pattern, e
                ));
                None
            }
        };

        if self.max_name_length == 0 {
            problems.push("max_name_length must be greater than 0".to_string());
        }
        if self.max_port_range > 65535 {
            problems.push(format!(
                "max_port_range must be at most 65535, got {}",
                self.max_port_range
            ));
        }

        check_cidrs("blocked_cidrs", &self.blocked_cidrs, &mut problems);

        for (name, over) in &self.type_overrides {
            if let Some(protocols) = &over.allowed_protocols {
                for protocol in protocols {
                    if let Err(e) = Protocol::parse(protocol) {
                        problems.push(format!(
                            "type_overrides.{}.allowed_protocols: {}",
                            name, e
                        ));
                    }
                }
            }
            if let Some(range) = over.max_port_range
                && range > 65535
            {
                problems.push(format!(
                    "type_overrides.{}.max_port_range must be at most 65535, got {}",
                    name, range
                ));
            }
        }

        for (mode, rules) in &self.compliance_rules {
            check_cidrs(
                &format!("compliance_rules.{}.blocked_cidrs", mode),
                &rules.blocked_cidrs,
                &mut problems,
            );
            check_cidrs(
                &format!("compliance_rules.{}.broad_cidrs", mode),
                &rules.broad_cidrs,
                &mut problems,
            );
        }

        match naming {
            Some(naming) if problems.is_empty() => Ok(Guardrails {
                policy: self,
                naming,
            }),
            _ => Err(problems),
        }
    }
}

fn check_cidrs(field: &str, cidrs: &[String], problems: &mut Vec<String>) {
    for (i, cidr) in cidrs.iter().enumerate() {
        if let Err(e) = cidr.parse::<Cidr>() {
            problems.push(format!("{}[{}]: {}", field, i, e));
        }
    }
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            version: default_version(),
            blocked_ports: default_blocked_ports(),
            warning_ports: default_warning_ports(),
            blocked_cidrs: default_blocked_cidrs(),
            cidr_match: CidrMatch::default(),
            max_port_range: default_max_port_range(),
            required_tags: default_required_tags(),
            allowed_environments: default_allowed_environments(),
            max_rules_per_group: default_max_rules_per_group(),
            naming_pattern: default_naming_pattern(),
            max_name_length: default_max_name_length(),
            reserved_name_prefixes: default_reserved_name_prefixes(),
            require_description_for_rules: true,
            baseline: BaselineCatalog::default(),
            known_prefix_lists: Vec::new(),
            type_overrides: BTreeMap::new(),
            compliance_rules: BTreeMap::new(),
        }
    }
}

/// A checked policy, ready for evaluation
#[derive(Debug, Clone)]
pub struct Guardrails {
    pub policy: GuardrailPolicy,
    naming: Regex,
}

impl Guardrails {
    /// Anchored group naming regex
    pub fn naming(&self) -> &Regex {
        &self.naming
    }

    /// Find the blocked entry matching a rule CIDR, if any
    ///
    /// Exact mode compares strings. Contains mode additionally matches when
    /// the rule network covers a blocked network.
    pub fn blocked_match<'a>(&self, blocked: &'a [String], cidr: &str) -> Option<&'a str> {
        if let Some(hit) = blocked.iter().find(|b| b.as_str() == cidr) {
            return Some(hit);
        }
        if self.policy.cidr_match == CidrMatch::Exact {
            return None;
        }
        let rule: Cidr = cidr.parse().ok()?;
        blocked
            .iter()
            .find(|b| b.parse::<Cidr>().is_ok_and(|b| rule.contains(&b)))
            .map(String::as_str)
    }

    pub fn compliance(&self, mode: ComplianceMode) -> Option<&ComplianceRuleSet> {
        self.policy.compliance_rules.get(&mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<GuardrailPolicy, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    #[test]
    fn empty_document_uses_defaults() {
        let policy = parse("{}").unwrap();
        assert_eq!(policy, GuardrailPolicy::default());
        assert!(policy.blocked_ports.contains(&23));
        assert!(policy.warning_ports.contains(&22));
        assert_eq!(policy.max_name_length, 63);
        assert!(policy.require_description_for_rules);
    }

    #[test]
    fn unknown_policy_key_is_rejected() {
        assert!(parse("blocked_portz: [23]").is_err());
    }

    #[test]
    fn unknown_compliance_mode_is_rejected() {
        assert!(parse("compliance_rules: {gdpr: {}}").is_err());
        assert!(parse("compliance_rules: {pci: {reference: PCI DSS}}").is_ok());
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        assert!(parse("blocked_ports: [70000]").is_err());
    }

    #[test]
    fn compile_rejects_bad_pattern_and_cidr() {
        let policy = parse("naming_pattern: '[a-z'\nblocked_cidrs: ['10.0.0.0/40']").unwrap();
        let problems = policy.compile().unwrap_err();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("naming_pattern"));
        assert!(problems[1].contains("blocked_cidrs[0]"));
    }

    #[test]
    fn compile_rejects_bad_override_protocol() {
        let policy =
            parse("type_overrides: {eks-nodes: {allowed_protocols: [tcp, bogus]}}").unwrap();
        let problems = policy.compile().unwrap_err();
        assert!(problems[0].contains("type_overrides.eks-nodes.allowed_protocols"));
    }

    #[test]
    fn naming_pattern_is_fully_anchored() {
        let guardrails = parse("naming_pattern: '[a-z]+'").unwrap().compile().unwrap();
        assert!(guardrails.naming().is_match("web"));
        assert!(!guardrails.naming().is_match("web-1"));
    }

    #[test]
    fn blocked_match_exact() {
        let guardrails = GuardrailPolicy::default().compile().unwrap();
        let blocked = &guardrails.policy.blocked_cidrs;
        assert_eq!(guardrails.blocked_match(blocked, "0.0.0.0/0"), Some("0.0.0.0/0"));
        assert_eq!(guardrails.blocked_match(blocked, "169.254.0.0/16"), None);
    }

    #[test]
    fn blocked_match_contains() {
        let guardrails = parse("cidr_match: contains\nblocked_cidrs: ['169.254.169.254/32']")
            .unwrap()
            .compile()
            .unwrap();
        let blocked = &guardrails.policy.blocked_cidrs;
        assert_eq!(
            guardrails.blocked_match(blocked, "169.254.0.0/16"),
            Some("169.254.169.254/32")
        );
        assert_eq!(guardrails.blocked_match(blocked, "10.0.0.0/8"), None);
    }
}
