//! Rule checks - Guardrails evaluated against each ingress and egress rule
//!
//! Every check is an independent function over one rule. They run in a
//! fixed order so output reads predictably, but none depends on another's
//! outcome: a rule that violates three guardrails yields three findings.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::ops::RangeInclusive;

use crate::cidr::{Family, parse_cidr};
use crate::finding::{Direction, Finding, Locator, RuleId};
use crate::policy::Guardrails;
use crate::ports::{blocked_port_guidance, describe_port, warning_port_guidance};
use crate::request::{Protocol, Rule, SecurityGroupSpec};
use crate::schema::edit_distance;

use super::group::{ActiveCompliance, GroupLimits, cite};

/// One rule together with everything its checks consult
pub struct RuleInput<'a> {
    pub rule: &'a Rule,
    pub direction: Direction,
    pub locator: Locator,
    /// Parsed protocol; `None` when missing or invalid
    pub protocol: Option<Protocol>,
    pub guardrails: &'a Guardrails,
    pub limits: &'a GroupLimits,
    pub compliance: ActiveCompliance<'a>,
}

impl<'a> RuleInput<'a> {
    pub fn new(
        rule: &'a Rule,
        direction: Direction,
        locator: Locator,
        guardrails: &'a Guardrails,
        limits: &'a GroupLimits,
        compliance: ActiveCompliance<'a>,
    ) -> Self {
        let protocol = rule.protocol.as_deref().and_then(|p| Protocol::parse(p).ok());
        Self {
            rule,
            direction,
            locator,
            protocol,
            guardrails,
            limits,
            compliance,
        }
    }

    fn at(&self, field: impl Into<String>) -> Locator {
        self.locator.clone().field(field)
    }

    /// The rule's port span, when it is a well-formed tcp/udp range
    fn span(&self) -> Option<RangeInclusive<u16>> {
        if !self.protocol.is_some_and(|p| p.has_ports()) {
            return None;
        }
        let from = u16::try_from(self.rule.from_port?).ok()?;
        let to = u16::try_from(self.rule.to_port?).ok()?;
        (from <= to).then_some(from..=to)
    }

    /// Parsed CIDRs of both address families, with their field paths
    fn cidrs(&self) -> Vec<(String, &'a str)> {
        let rule = self.rule;
        let v4 = rule.cidr_blocks.iter().enumerate().filter_map(|(i, c)| {
            parse_cidr(c, Family::V4)
                .ok()
                .map(|_| (format!("cidr_blocks[{}]", i), c.as_str()))
        });
        let v6 = rule.ipv6_cidr_blocks.iter().enumerate().filter_map(|(i, c)| {
            parse_cidr(c, Family::V6)
                .ok()
                .map(|_| (format!("ipv6_cidr_blocks[{}]", i), c.as_str()))
        });
        v4.chain(v6).collect()
    }
}

type RuleCheck = fn(&RuleInput<'_>) -> Vec<Finding>;

const RULE_CHECKS: [RuleCheck; 9] = [
    protocol,
    type_protocol,
    ports,
    missing_source,
    cidrs,
    description,
    prefix_lists,
    baseline_references,
    compliance,
];

/// Run every rule-level check
pub fn check_rule(input: &RuleInput<'_>) -> Vec<Finding> {
    RULE_CHECKS.iter().flat_map(|check| check(input)).collect()
}

fn protocol(input: &RuleInput<'_>) -> Vec<Finding> {
    let rule = input.rule;
    match &rule.protocol {
        None if rule.is_malformed("protocol") => Vec::new(),
        None => vec![Finding::error(
            RuleId::RuleRequiredProtocol,
            input.locator.clone(),
            "Rule is missing 'protocol'",
        )],
        Some(raw) => match Protocol::parse(raw) {
            Ok(_) => Vec::new(),
            Err(e) => vec![Finding::error(
                RuleId::RuleInvalidProtocol,
                input.at("protocol"),
                capitalize(&e),
            )],
        },
    }
}

fn type_protocol(input: &RuleInput<'_>) -> Vec<Finding> {
    let (Some(allowed), Some(protocol)) = (&input.limits.allowed_protocols, input.protocol) else {
        return Vec::new();
    };
    if allowed.contains(&protocol) {
        return Vec::new();
    }
    let names: Vec<String> = allowed.iter().map(Protocol::to_string).collect();
    vec![Finding::error(
        RuleId::TypeProtocolRestriction,
        input.at("protocol"),
        format!(
            "Protocol '{}' is not allowed for type '{}'; allowed: {}",
            protocol,
            input.limits.group_type.as_deref().unwrap_or_default(),
            names.join(", ")
        ),
    )]
}

/// Port sanity, breadth, blocked and warning ports, in that order.
/// An unusable range stops the remaining port checks.
fn ports(input: &RuleInput<'_>) -> Vec<Finding> {
    let rule = input.rule;
    if !input.protocol.is_some_and(|p| p.has_ports())
        || rule.is_malformed("from_port")
        || rule.is_malformed("to_port")
    {
        return Vec::new();
    }

    let (Some(from), Some(to)) = (rule.from_port, rule.to_port) else {
        let missing: Vec<&str> = [("from_port", rule.from_port), ("to_port", rule.to_port)]
            .into_iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k)
            .collect();
        return vec![Finding::error(
            RuleId::RuleRequiredPorts,
            input.locator.clone(),
            format!(
                "TCP/UDP rule requires 'from_port' and 'to_port' (missing {})",
                missing.join(" and ")
            ),
        )];
    };

    let mut findings = Vec::new();
    for (field, value) in [("from_port", from), ("to_port", to)] {
        if !(0..=65535).contains(&value) {
            findings.push(Finding::error(
                RuleId::RuleInvalidPortRange,
                input.at(field),
                format!("{} {} is outside 0-65535", field, value),
            ));
        }
    }
    if findings.is_empty() && from > to {
        findings.push(Finding::error(
            RuleId::RuleInvalidPortRange,
            input.locator.clone(),
            format!("Invalid port range: from_port ({}) > to_port ({})", from, to),
        ));
    }
    if !findings.is_empty() {
        return findings;
    }

    let Some(span) = input.span() else {
        return findings;
    };
    findings.extend(port_breadth(input, &span));
    findings.extend(blocked_ports(input, &span));
    findings.extend(warning_ports(input, &span));
    findings
}

fn port_breadth(input: &RuleInput<'_>, span: &RangeInclusive<u16>) -> Option<Finding> {
    let width = u32::from(span.end() - span.start());
    let max = input.limits.max_port_range;
    if width <= max {
        return None;
    }
    let mut message = format!(
        "Port range {}-{} is too broad ({} > max {}); narrow it to the ports the application needs",
        span.start(),
        span.end(),
        width,
        max
    );
    if input.limits.group_type.is_none() && !input.guardrails.policy.type_overrides.is_empty() {
        message.push_str(", or set a group type that allows wider ranges");
    }
    Some(Finding::error(
        RuleId::RulePortRangeTooBroad,
        input.locator.clone(),
        message,
    ))
}

fn blocked_ports(input: &RuleInput<'_>, span: &RangeInclusive<u16>) -> Vec<Finding> {
    input
        .guardrails
        .policy
        .blocked_ports
        .range(span.clone())
        .map(|&port| {
            let (reason, suggestion) = blocked_port_guidance(port);
            Finding::error(
                RuleId::RuleBlockedPort,
                input.locator.clone(),
                format!(
                    "Port {} is blocked: {}. {}",
                    describe_port(port),
                    reason,
                    suggestion
                ),
            )
        })
        .collect()
}

fn warning_ports(input: &RuleInput<'_>, span: &RangeInclusive<u16>) -> Vec<Finding> {
    let policy = &input.guardrails.policy;
    policy
        .warning_ports
        .range(span.clone())
        .filter(|port| !policy.blocked_ports.contains(port))
        .map(|&port| {
            Finding::warning(
                RuleId::RuleWarningPort,
                input.locator.clone(),
                format!(
                    "Port {} is allowed but flagged for review. {}",
                    describe_port(port),
                    warning_port_guidance(port)
                ),
            )
        })
        .collect()
}

fn missing_source(input: &RuleInput<'_>) -> Vec<Finding> {
    let rule = input.rule;
    if rule.has_source() || rule.has_malformed_source() {
        return Vec::new();
    }
    vec![Finding::error(
        RuleId::RuleMissingSource,
        input.locator.clone(),
        "Rule must specify at least one source/destination: cidr_blocks, ipv6_cidr_blocks, security_groups, prefix_list_ids or self",
    )]
}

fn cidrs(input: &RuleInput<'_>) -> Vec<Finding> {
    let rule = input.rule;
    let mut findings = Vec::new();

    let lists = [
        ("cidr_blocks", Family::V4, &rule.cidr_blocks),
        ("ipv6_cidr_blocks", Family::V6, &rule.ipv6_cidr_blocks),
    ];
    for (field, family, cidrs) in lists {
        for (i, cidr) in cidrs.iter().enumerate() {
            let locator = input.at(format!("{}[{}]", field, i));
            let parsed = match parse_cidr(cidr, family) {
                Ok(parsed) => parsed,
                Err(e) => {
                    findings.push(Finding::error(
                        RuleId::RuleInvalidCidr,
                        locator,
                        format!("Invalid CIDR block '{}': {}", cidr, e),
                    ));
                    continue;
                }
            };

            let blocked = &input.guardrails.policy.blocked_cidrs;
            let Some(hit) = input.guardrails.blocked_match(blocked, cidr) else {
                continue;
            };
            let message = if parsed.prefix() == 0 {
                match input.direction {
                    Direction::Ingress => format!(
                        "{} ingress is not allowed; this opens the rule to the entire internet. Use a specific CIDR, a security group reference or a prefix list instead",
                        cidr
                    ),
                    Direction::Egress => format!(
                        "{} egress is not allowed; this permits unrestricted outbound access. Scope it to specific CIDRs, security group references or prefix lists",
                        cidr
                    ),
                }
            } else if hit == cidr {
                format!("CIDR {} is blocked by the guardrail policy", cidr)
            } else {
                format!("CIDR {} covers blocked CIDR {}", cidr, hit)
            };
            findings.push(Finding::error(RuleId::RuleCidrBlocked, locator, message));
        }
    }

    findings
}

fn description(input: &RuleInput<'_>) -> Vec<Finding> {
    let rule = input.rule;
    if !input.guardrails.policy.require_description_for_rules
        || rule.has_description()
        || rule.is_malformed("description")
    {
        return Vec::new();
    }
    vec![Finding::warning(
        RuleId::RuleMissingDescription,
        input.locator.clone(),
        "Rule has no description; say what traffic it allows and why",
    )]
}

/// Closest candidate within edit distance 2, for "did you mean" hints
fn closest<'c>(name: &str, candidates: &'c [String]) -> Option<&'c str> {
    candidates
        .iter()
        .map(|c| (edit_distance(name, c), c))
        .filter(|(d, _)| *d <= 2)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.as_str())
}

fn unknown_reference(kind: &str, name: &str, known: &[String]) -> String {
    match closest(name, known) {
        Some(candidate) => format!("Unknown {} '{}'; did you mean '{}'?", kind, name, candidate),
        None => format!("Unknown {} '{}'; known: {}", kind, name, known.join(", ")),
    }
}

/// Named prefix lists must be known; AWS-managed `pl-` IDs are not checked
fn prefix_lists(input: &RuleInput<'_>) -> Vec<Finding> {
    let known = &input.guardrails.policy.known_prefix_lists;
    if known.is_empty() {
        return Vec::new();
    }
    input
        .rule
        .prefix_list_ids
        .iter()
        .enumerate()
        .filter(|(_, id)| !id.starts_with("pl-") && !known.contains(id))
        .map(|(i, id)| {
            Finding::error(
                RuleId::RuleUnknownPrefixList,
                input.at(format!("prefix_list_ids[{}]", i)),
                unknown_reference("prefix list", id, known),
            )
        })
        .collect()
}

/// `baseline-` references must name a known baseline group. Anything else
/// (IDs, same-document names, cross-account references) is left alone.
fn baseline_references(input: &RuleInput<'_>) -> Vec<Finding> {
    let known = &input.guardrails.policy.baseline.security_groups;
    if known.is_empty() {
        return Vec::new();
    }
    input
        .rule
        .security_groups
        .iter()
        .enumerate()
        .filter(|(_, name)| name.starts_with("baseline-") && !known.contains(name))
        .map(|(i, name)| {
            Finding::error(
                RuleId::RuleUnknownBaselineReference,
                input.at(format!("security_groups[{}]", i)),
                unknown_reference("baseline security group", name, known),
            )
        })
        .collect()
}

/// Extra port and CIDR checks of the active compliance mode. Anything the
/// base policy already reports is skipped.
fn compliance(input: &RuleInput<'_>) -> Vec<Finding> {
    let Some((mode, rules)) = input.compliance else {
        return Vec::new();
    };
    let policy = &input.guardrails.policy;
    let reference = cite(mode, rules);
    let mut findings = Vec::new();

    if let Some(span) = input.span() {
        for &port in rules.blocked_ports.range(span.clone()) {
            if policy.blocked_ports.contains(&port) {
                continue;
            }
            findings.push(Finding::error(
                RuleId::ComplianceBlockedPort,
                input.locator.clone(),
                format!("Port {} is not allowed under {}", describe_port(port), reference),
            ));
        }
        for &port in rules.warning_ports.range(span) {
            if policy.blocked_ports.contains(&port)
                || policy.warning_ports.contains(&port)
                || rules.blocked_ports.contains(&port)
            {
                continue;
            }
            findings.push(Finding::warning(
                RuleId::ComplianceWarningPort,
                input.locator.clone(),
                format!(
                    "Port {} is flagged for review under {}",
                    describe_port(port),
                    reference
                ),
            ));
        }
    }

    for (field, cidr) in input.cidrs() {
        if input
            .guardrails
            .blocked_match(&policy.blocked_cidrs, cidr)
            .is_some()
        {
            continue;
        }
        if input.guardrails.blocked_match(&rules.blocked_cidrs, cidr).is_some() {
            findings.push(Finding::error(
                RuleId::ComplianceCidrBlocked,
                input.at(field),
                format!("CIDR {} is not allowed under {}", cidr, reference),
            ));
        } else if input.direction == Direction::Ingress
            && input.guardrails.blocked_match(&rules.broad_cidrs, cidr).is_some()
        {
            findings.push(Finding::warning(
                RuleId::ComplianceBroadCidr,
                input.at(field),
                format!(
                    "Ingress from broad CIDR {}; scope it to specific VPC or subnet CIDRs ({})",
                    cidr, reference
                ),
            ));
        }
    }

    findings
}

/// Identity of a rule for duplicate detection: protocol, ports and the
/// normalised set of sources
#[derive(Debug, PartialEq, Eq, Hash)]
struct RuleKey {
    protocol: String,
    from_port: Option<i64>,
    to_port: Option<i64>,
    cidr_blocks: Vec<String>,
    ipv6_cidr_blocks: Vec<String>,
    security_groups: Vec<String>,
    prefix_list_ids: Vec<String>,
    self_ref: bool,
}

impl RuleKey {
    fn of(rule: &Rule) -> Self {
        let protocol = match &rule.protocol {
            Some(raw) => match Protocol::parse(raw) {
                Ok(p) => p.to_string(),
                Err(_) => raw.trim().to_ascii_lowercase(),
            },
            None => String::new(),
        };
        Self {
            protocol,
            from_port: rule.from_port,
            to_port: rule.to_port,
            cidr_blocks: sorted(&rule.cidr_blocks),
            ipv6_cidr_blocks: sorted(&rule.ipv6_cidr_blocks),
            security_groups: sorted(&rule.security_groups),
            prefix_list_ids: sorted(&rule.prefix_list_ids),
            self_ref: rule.self_ref,
        }
    }
}

fn sorted(items: &[String]) -> Vec<String> {
    let mut items = items.to_vec();
    items.sort();
    items
}

/// Flag the second and later occurrences of identical rules in one direction
pub fn duplicate_rules(group: &SecurityGroupSpec, direction: Direction) -> Vec<Finding> {
    let mut first_seen: HashMap<RuleKey, usize> = HashMap::new();
    let mut findings = Vec::new();

    for (i, rule) in group.rules(direction).iter().enumerate() {
        if rule.invalid {
            continue;
        }
        match first_seen.entry(RuleKey::of(rule)) {
            Entry::Occupied(first) => findings.push(Finding::error(
                RuleId::RuleDuplicate,
                Locator::rule(group.index, group.name.clone(), direction, i),
                format!(
                    "Duplicate rule: {}[{}] is identical to {}[{}]; remove the duplicate",
                    direction,
                    i,
                    direction,
                    first.get()
                ),
            )),
            Entry::Vacant(slot) => {
                slot.insert(i);
            }
        }
    }

    findings
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ComplianceMode, GuardrailPolicy};

    fn guardrails(yaml: &str) -> Guardrails {
        let policy: GuardrailPolicy = serde_yaml::from_str(yaml).unwrap();
        policy.compile().unwrap()
    }

    fn tcp(from: i64, to: i64, cidr: &str) -> Rule {
        Rule {
            protocol: Some("tcp".to_string()),
            from_port: Some(from),
            to_port: Some(to),
            cidr_blocks: vec![cidr.to_string()],
            description: Some("test rule".to_string()),
            ..Default::default()
        }
    }

    fn run_in(rule: &Rule, direction: Direction, guardrails: &Guardrails) -> Vec<Finding> {
        let limits = GroupLimits::resolve(&SecurityGroupSpec::default(), guardrails);
        let compliance = guardrails
            .compliance(ComplianceMode::Pci)
            .map(|rules| (ComplianceMode::Pci, rules));
        let input = RuleInput::new(
            rule,
            direction,
            Locator::rule(0, "web", direction, 0),
            guardrails,
            &limits,
            compliance,
        );
        check_rule(&input)
    }

    fn run(rule: &Rule) -> Vec<Finding> {
        run_in(rule, Direction::Ingress, &guardrails("{}"))
    }

    fn ids(findings: &[Finding]) -> Vec<RuleId> {
        findings.iter().map(|f| f.rule_id).collect()
    }

    #[test]
    fn clean_rule() {
        assert!(run(&tcp(443, 443, "10.0.0.0/16")).is_empty());
    }

    #[test]
    fn open_world_full_range() {
        let findings = run(&tcp(0, 65535, "0.0.0.0/0"));
        let found = ids(&findings);
        assert!(found.contains(&RuleId::RulePortRangeTooBroad));
        assert!(found.contains(&RuleId::RuleCidrBlocked));
        // Every blocked port in the span is named
        assert_eq!(
            found.iter().filter(|id| **id == RuleId::RuleBlockedPort).count(),
            4
        );
        let cidr = findings
            .iter()
            .find(|f| f.rule_id == RuleId::RuleCidrBlocked)
            .unwrap();
        assert_eq!(cidr.path, "security_group.web.ingress[0].cidr_blocks[0]");
        assert!(cidr.message.contains("entire internet"));
    }

    #[test]
    fn ssh_is_a_warning() {
        let findings = run(&tcp(22, 22, "10.0.0.0/8"));
        assert_eq!(ids(&findings), vec![RuleId::RuleWarningPort]);
        assert!(findings[0].message.contains("22 (SSH)"));
        assert!(findings[0].message.contains("Session Manager"));
    }

    #[test]
    fn blocked_port_is_not_also_a_warning() {
        let guardrails = guardrails("blocked_ports: [22]\nwarning_ports: [22]");
        let findings = run_in(&tcp(22, 22, "10.0.0.0/8"), Direction::Ingress, &guardrails);
        assert_eq!(ids(&findings), vec![RuleId::RuleBlockedPort]);
    }

    #[test]
    fn every_blocked_port_fires_once_on_its_own() {
        let guardrails = guardrails("{}");
        for &port in &guardrails.policy.blocked_ports {
            let findings = run_in(
                &tcp(i64::from(port), i64::from(port), "10.0.0.0/8"),
                Direction::Ingress,
                &guardrails,
            );
            let blocked: Vec<&Finding> = findings
                .iter()
                .filter(|f| f.rule_id == RuleId::RuleBlockedPort)
                .collect();
            assert_eq!(blocked.len(), 1, "port {}", port);
            assert!(blocked[0].message.contains(&port.to_string()));
        }
    }

    #[test]
    fn breadth_is_to_minus_from() {
        // 2000-3001 holds no blocked or warning port
        assert!(run(&tcp(2000, 3000, "10.0.0.0/8")).is_empty());
        assert_eq!(
            ids(&run(&tcp(2000, 3001, "10.0.0.0/8"))),
            vec![RuleId::RulePortRangeTooBroad]
        );

        let quiet = guardrails("warning_ports: []");
        let at_limit = run_in(&tcp(1000, 2000, "10.0.0.0/8"), Direction::Ingress, &quiet);
        assert!(at_limit.is_empty());
        let over = run_in(&tcp(1000, 2001, "10.0.0.0/8"), Direction::Ingress, &quiet);
        assert_eq!(ids(&over), vec![RuleId::RulePortRangeTooBroad]);
    }

    #[test]
    fn invalid_range_short_circuits_port_checks() {
        let findings = run(&tcp(443, 22, "0.0.0.0/0"));
        assert_eq!(
            ids(&findings),
            vec![RuleId::RuleInvalidPortRange, RuleId::RuleCidrBlocked]
        );

        let findings = run(&tcp(0, 70000, "10.0.0.0/8"));
        assert_eq!(ids(&findings), vec![RuleId::RuleInvalidPortRange]);
        assert_eq!(findings[0].path, "security_group.web.ingress[0].to_port");
    }

    #[test]
    fn tcp_without_ports() {
        let mut rule = tcp(0, 0, "10.0.0.0/8");
        rule.to_port = None;
        let findings = run(&rule);
        assert_eq!(ids(&findings), vec![RuleId::RuleRequiredPorts]);
        assert!(findings[0].message.contains("missing to_port"));

        rule.malformed.insert("to_port".to_string());
        assert!(run(&rule).is_empty());
    }

    #[test]
    fn ports_are_ignored_for_icmp_and_all() {
        let mut rule = tcp(0, 65535, "10.0.0.0/8");
        rule.protocol = Some("icmp".to_string());
        assert!(run(&rule).is_empty());
        rule.protocol = Some("-1".to_string());
        assert!(run(&rule).is_empty());
    }

    #[test]
    fn protocol_problems() {
        let mut rule = tcp(443, 443, "10.0.0.0/8");
        rule.protocol = None;
        assert_eq!(ids(&run(&rule)), vec![RuleId::RuleRequiredProtocol]);

        rule.protocol = Some("http".to_string());
        let findings = run(&rule);
        assert_eq!(ids(&findings), vec![RuleId::RuleInvalidProtocol]);
        assert!(findings[0].message.starts_with("Invalid protocol 'http'"));
    }

    #[test]
    fn missing_source_and_description() {
        let rule = Rule {
            protocol: Some("tcp".to_string()),
            from_port: Some(443),
            to_port: Some(443),
            ..Default::default()
        };
        let findings = run(&rule);
        assert_eq!(
            ids(&findings),
            vec![RuleId::RuleMissingSource, RuleId::RuleMissingDescription]
        );
        assert!(!findings[1].is_error());

        let no_descriptions = guardrails("require_description_for_rules: false");
        let findings = run_in(&rule, Direction::Ingress, &no_descriptions);
        assert_eq!(ids(&findings), vec![RuleId::RuleMissingSource]);
    }

    #[test]
    fn multiple_source_kinds_are_checked_independently() {
        let mut rule = tcp(443, 443, "10.0.0.0/33");
        rule.ipv6_cidr_blocks = vec!["::/0".to_string(), "10.0.0.0/8".to_string()];
        rule.security_groups = vec!["sg-0123456789abcdef0".to_string()];
        let findings = run(&rule);
        let paths: Vec<(&str, RuleId)> =
            findings.iter().map(|f| (f.path.as_str(), f.rule_id)).collect();
        assert_eq!(
            paths,
            vec![
                (
                    "security_group.web.ingress[0].cidr_blocks[0]",
                    RuleId::RuleInvalidCidr
                ),
                (
                    "security_group.web.ingress[0].ipv6_cidr_blocks[0]",
                    RuleId::RuleCidrBlocked
                ),
                (
                    "security_group.web.ingress[0].ipv6_cidr_blocks[1]",
                    RuleId::RuleInvalidCidr
                ),
            ]
        );
    }

    #[test]
    fn egress_open_world_message() {
        let findings = run_in(&tcp(443, 443, "0.0.0.0/0"), Direction::Egress, &guardrails("{}"));
        assert_eq!(ids(&findings), vec![RuleId::RuleCidrBlocked]);
        assert!(findings[0].message.contains("unrestricted outbound"));
    }

    #[test]
    fn cidr_containment_is_opt_in() {
        let rule = tcp(443, 443, "169.254.0.0/16");
        assert!(run(&rule).is_empty());

        let contains = guardrails("cidr_match: contains");
        let findings = run_in(&rule, Direction::Ingress, &contains);
        assert_eq!(ids(&findings), vec![RuleId::RuleCidrBlocked]);
        assert!(findings[0].message.contains("covers blocked CIDR 169.254.169.254/32"));
    }

    #[test]
    fn type_protocol_restriction() {
        let guardrails = guardrails("type_overrides: {nlb: {allowed_protocols: [tcp]}}");
        let group = SecurityGroupSpec {
            group_type: Some("nlb".to_string()),
            ..Default::default()
        };
        let limits = GroupLimits::resolve(&group, &guardrails);
        let mut rule = tcp(53, 53, "10.0.0.0/8");
        rule.protocol = Some("17".to_string());
        let input = RuleInput::new(
            &rule,
            Direction::Ingress,
            Locator::rule(0, "dns", Direction::Ingress, 0),
            &guardrails,
            &limits,
            None,
        );
        let findings = check_rule(&input);
        assert_eq!(ids(&findings), vec![RuleId::TypeProtocolRestriction]);
        assert_eq!(
            findings[0].message,
            "Protocol 'udp' is not allowed for type 'nlb'; allowed: tcp"
        );
    }

    #[test]
    fn references_are_checked_only_against_static_lists() {
        let mut rule = tcp(443, 443, "10.0.0.0/8");
        rule.prefix_list_ids = vec!["corporate-network".to_string(), "pl-0abc".to_string()];
        rule.security_groups = vec![
            "baseline-eks-worker".to_string(),
            "sg-0123".to_string(),
            "web".to_string(),
        ];
        // Nothing configured: nothing flagged
        assert!(run(&rule).is_empty());

        let guardrails = guardrails(
            "known_prefix_lists: [corporate-networks]\nbaseline: {security_groups: [baseline-eks-workers]}",
        );
        let findings = run_in(&rule, Direction::Ingress, &guardrails);
        assert_eq!(
            ids(&findings),
            vec![
                RuleId::RuleUnknownPrefixList,
                RuleId::RuleUnknownBaselineReference
            ]
        );
        assert!(findings[0].message.contains("did you mean 'corporate-networks'?"));
        assert_eq!(
            findings[1].path,
            "security_group.web.ingress[0].security_groups[0]"
        );
    }

    #[test]
    fn compliance_extras_cite_reference() {
        let guardrails = guardrails(
            "compliance_rules:
  pci:
    reference: PCI DSS Req 1.3
    blocked_ports: [23, 8080]
    warning_ports: [22, 9090]
    broad_cidrs: [10.0.0.0/8]
    blocked_cidrs: [192.168.0.0/16]
",
        );
        let findings = run_in(&tcp(8000, 9100, "10.0.0.0/8"), Direction::Ingress, &guardrails);
        assert_eq!(
            ids(&findings),
            vec![
                RuleId::RulePortRangeTooBroad,
                RuleId::ComplianceBlockedPort,
                RuleId::ComplianceWarningPort,
                RuleId::ComplianceBroadCidr
            ]
        );
        assert_eq!(
            findings[1].message,
            "Port 8080 is not allowed under PCI DSS Req 1.3"
        );

        let findings = run_in(
            &tcp(443, 443, "192.168.0.0/16"),
            Direction::Egress,
            &guardrails,
        );
        assert_eq!(ids(&findings), vec![RuleId::ComplianceCidrBlocked]);

        // Broad CIDRs only matter inbound
        let findings = run_in(&tcp(443, 443, "10.0.0.0/8"), Direction::Egress, &guardrails);
        assert!(findings.is_empty());
    }

    #[test]
    fn duplicates_flag_later_occurrences() {
        let mut first = tcp(443, 443, "10.0.0.0/8");
        first.cidr_blocks.push("10.1.0.0/16".to_string());
        let mut second = first.clone();
        second.protocol = Some("6".to_string());
        second.cidr_blocks.reverse();
        second.description = Some("different text".to_string());
        let group = SecurityGroupSpec {
            name: "web".to_string(),
            ingress: Some(vec![first.clone(), tcp(80, 80, "10.0.0.0/8"), second, first]),
            egress: Some(vec![tcp(443, 443, "10.0.0.0/8")]),
            ..Default::default()
        };

        let findings = duplicate_rules(&group, Direction::Ingress);
        let paths: Vec<&str> = findings.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "security_group.web.ingress[2]",
                "security_group.web.ingress[3]"
            ]
        );
        assert!(findings[0].message.contains("identical to ingress[0]"));
        assert!(duplicate_rules(&group, Direction::Egress).is_empty());
    }
}
