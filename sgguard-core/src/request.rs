//! Request - Typed security group request document

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use crate::finding::Direction;
use crate::policy::ComplianceMode;

/// Rule protocol, normalised so `6` and `tcp` compare equal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    /// All traffic (`-1` / `all`)
    All,
    /// Any other IP protocol number
    Number(u8),
}

impl Protocol {
    /// Parse a protocol name or number as written in a rule
    pub fn parse(s: &str) -> Result<Self, String> {
        let lowered = s.trim().to_ascii_lowercase();
        let protocol = match lowered.as_str() {
            "tcp" | "6" => Protocol::Tcp,
            "udp" | "17" => Protocol::Udp,
            "icmp" | "1" => Protocol::Icmp,
            "icmpv6" | "58" => Protocol::Icmpv6,
            "all" | "-1" => Protocol::All,
            "gre" => Protocol::Number(47),
            "esp" => Protocol::Number(50),
            "ah" => Protocol::Number(51),
            other => match other.parse::<u8>() {
                Ok(n) => Protocol::Number(n),
                Err(_) => {
                    return Err(format!(
                        "invalid protocol '{}': expected tcp, udp, icmp, icmpv6, ah, esp, gre, all, -1 or a number 0-255",
                        s
                    ));
                }
            },
        };
        Ok(protocol)
    }

    /// Whether rules of this protocol carry a port range
    pub fn has_ports(&self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
            Protocol::Icmp => f.write_str("icmp"),
            Protocol::Icmpv6 => f.write_str("icmpv6"),
            Protocol::All => f.write_str("all"),
            Protocol::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Rule keys naming a source or destination
pub const SOURCE_KEYS: [&str; 5] = [
    "cidr_blocks",
    "ipv6_cidr_blocks",
    "security_groups",
    "prefix_list_ids",
    "self",
];

/// One ingress or egress rule
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rule {
    /// The list item was not a mapping; nothing else is set
    pub invalid: bool,
    /// Protocol as written; parsed by the rule checks
    pub protocol: Option<String>,
    pub from_port: Option<i64>,
    pub to_port: Option<i64>,
    pub cidr_blocks: Vec<String>,
    pub ipv6_cidr_blocks: Vec<String>,
    pub security_groups: Vec<String>,
    pub prefix_list_ids: Vec<String>,
    pub self_ref: bool,
    pub description: Option<String>,
    /// Keys present with a mistyped value (already reported)
    pub malformed: BTreeSet<String>,
}

impl Rule {
    pub fn has_source(&self) -> bool {
        self.self_ref
            || !self.cidr_blocks.is_empty()
            || !self.ipv6_cidr_blocks.is_empty()
            || !self.security_groups.is_empty()
            || !self.prefix_list_ids.is_empty()
    }

    pub fn has_description(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty())
    }

    pub fn is_malformed(&self, key: &str) -> bool {
        self.malformed.contains(key)
    }

    pub fn has_malformed_source(&self) -> bool {
        SOURCE_KEYS.iter().any(|key| self.is_malformed(key))
    }
}

/// One security group definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityGroupSpec {
    /// Position in the source document
    pub index: usize,
    /// Mapping key in `security_groups`
    pub name: String,
    pub description: Option<String>,
    pub group_type: Option<String>,
    pub tags: BTreeMap<String, String>,
    /// `None` when the key is absent, `Some(vec![])` when explicitly empty
    pub ingress: Option<Vec<Rule>>,
    pub egress: Option<Vec<Rule>>,
    /// Keys present with a mistyped value (already reported)
    pub malformed: BTreeSet<String>,
}

impl SecurityGroupSpec {
    pub fn rules(&self, direction: Direction) -> &[Rule] {
        let rules = match direction {
            Direction::Ingress => &self.ingress,
            Direction::Egress => &self.egress,
        };
        rules.as_deref().unwrap_or(&[])
    }

    pub fn rule_count(&self) -> usize {
        self.rules(Direction::Ingress).len() + self.rules(Direction::Egress).len()
    }

    /// Document-level tags overlaid with this group's tags
    pub fn merged_tags(&self, document_tags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged = document_tags.clone();
        merged.extend(self.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// Security group request document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityGroupRequest {
    /// File the request was read from, if any
    pub source: Option<PathBuf>,
    pub account_id: String,
    pub environment: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub baseline_profiles: Vec<String>,
    pub compliance_mode: ComplianceMode,
    /// In document order
    pub security_groups: Vec<SecurityGroupSpec>,
}

impl SecurityGroupRequest {
    /// Names of all groups, in document order
    pub fn group_names(&self) -> Vec<&str> {
        self.security_groups.iter().map(|g| g.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_names_and_numbers_normalise() {
        assert_eq!(Protocol::parse("tcp").unwrap(), Protocol::Tcp);
        assert_eq!(Protocol::parse("6").unwrap(), Protocol::Tcp);
        assert_eq!(Protocol::parse("TCP").unwrap(), Protocol::Tcp);
        assert_eq!(Protocol::parse("-1").unwrap(), Protocol::All);
        assert_eq!(Protocol::parse("all").unwrap(), Protocol::All);
        assert_eq!(Protocol::parse("esp").unwrap(), Protocol::Number(50));
        assert_eq!(Protocol::parse("132").unwrap(), Protocol::Number(132));
    }

    #[test]
    fn invalid_protocols() {
        assert!(Protocol::parse("http").is_err());
        assert!(Protocol::parse("256").is_err());
        assert!(Protocol::parse("-2").is_err());
    }

    #[test]
    fn only_tcp_and_udp_have_ports() {
        assert!(Protocol::Tcp.has_ports());
        assert!(Protocol::Udp.has_ports());
        assert!(!Protocol::Icmp.has_ports());
        assert!(!Protocol::All.has_ports());
    }

    #[test]
    fn merged_tags_group_overrides_document() {
        let document: BTreeMap<String, String> = [
            ("Team".to_string(), "platform".to_string()),
            ("ManagedBy".to_string(), "terraform".to_string()),
        ]
        .into_iter()
        .collect();
        let group = SecurityGroupSpec {
            name: "web".to_string(),
            tags: [("Team".to_string(), "web".to_string())].into_iter().collect(),
            ..Default::default()
        };
        let merged = group.merged_tags(&document);
        assert_eq!(merged.get("Team").map(String::as_str), Some("web"));
        assert_eq!(merged.get("ManagedBy").map(String::as_str), Some("terraform"));
    }

    #[test]
    fn rule_source_detection() {
        let mut rule = Rule::default();
        assert!(!rule.has_source());
        rule.self_ref = true;
        assert!(rule.has_source());
    }

    #[test]
    fn malformed_source_keys() {
        let mut rule = Rule::default();
        rule.malformed.insert("from_port".to_string());
        assert!(!rule.has_malformed_source());
        rule.malformed.insert("cidr_blocks".to_string());
        assert!(rule.has_malformed_source());
    }
}
