//! Document checks - Shape of the request document
//!
//! Decodes the untyped request into a [`SecurityGroupRequest`] while
//! reporting unknown keys and mistyped values as findings. Decoding keeps
//! going past a bad value, so one typo does not hide the rest of the request
//! from the guardrail checks.

use std::collections::{BTreeMap, BTreeSet};

use serde_yaml::{Mapping, Value};

use crate::finding::{Direction, Finding, Locator, RuleId};
use crate::loader::{RequestDocument, is_account_id};
use crate::policy::{ComplianceMode, Guardrails};
use crate::request::{Rule, SecurityGroupRequest, SecurityGroupSpec};
use crate::schema::{
    ObjectSchema, TypeError, key_name, request_schema, rule_schema, security_group_schema,
    value_type_name,
};

/// Decode a request, returning it with the findings about its shape
pub fn check_document(
    doc: &RequestDocument,
    guardrails: &Guardrails,
) -> (SecurityGroupRequest, Vec<Finding>) {
    let mut decoder = Decoder::new(guardrails);
    let request = decoder.request(doc);
    (request, decoder.findings)
}

struct Decoder<'a> {
    guardrails: &'a Guardrails,
    request_schema: ObjectSchema,
    group_schema: ObjectSchema,
    rule_schema: ObjectSchema,
    findings: Vec<Finding>,
}

impl<'a> Decoder<'a> {
    fn new(guardrails: &'a Guardrails) -> Self {
        Self {
            guardrails,
            request_schema: request_schema(),
            group_schema: security_group_schema(),
            rule_schema: rule_schema(),
            findings: Vec::new(),
        }
    }

    fn request(&mut self, doc: &RequestDocument) -> SecurityGroupRequest {
        let root = &doc.root;
        report(
            &mut self.findings,
            &self.request_schema,
            root,
            "the request",
            |path| Locator::document(path),
        );

        let mut request = SecurityGroupRequest {
            source: Some(doc.path.clone()),
            account_id: doc.account_id.clone(),
            ..Default::default()
        };

        self.account_directory(doc);

        if let Some(Value::String(environment)) = root.get("environment") {
            self.environment(environment);
            request.environment = Some(environment.clone());
        }

        if let Some(tags) = root.get("tags") {
            request.tags = tag_map(tags);
        }

        if let Some(value) = root.get("baseline_profiles") {
            let (profiles, _) = string_list(value);
            self.baseline_profiles(&profiles);
            request.baseline_profiles = profiles;
        }

        if let Some(Value::String(mode)) = root.get("compliance_mode") {
            request.compliance_mode = self.compliance_mode(mode);
        }

        let empty = Mapping::new();
        let groups = match root.get("security_groups") {
            Some(Value::Mapping(groups)) => Some(groups),
            Some(Value::Null) => Some(&empty),
            _ => None,
        };
        if let Some(groups) = groups {
            if groups.is_empty() {
                self.findings.push(Finding::warning(
                    RuleId::SchemaNoSecurityGroups,
                    Locator::document("security_groups"),
                    "No security groups defined. An empty security_groups mapping is usually a mistake.",
                ));
            }
            request.security_groups = self.groups(groups);
        }

        request
    }

    fn account_directory(&mut self, doc: &RequestDocument) {
        let Some(dir) = doc
            .path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
        else {
            return;
        };
        if is_account_id(dir) && dir != doc.account_id {
            self.findings.push(Finding::warning(
                RuleId::AccountIdMismatch,
                Locator::document("account_id"),
                format!(
                    "account_id '{}' doesn't match directory name '{}'",
                    doc.account_id, dir
                ),
            ));
        }
    }

    fn environment(&mut self, environment: &str) {
        let allowed = &self.guardrails.policy.allowed_environments;
        if !allowed.iter().any(|e| e == environment) {
            self.findings.push(Finding::error(
                RuleId::SchemaInvalidEnvironment,
                Locator::document("environment"),
                format!(
                    "Invalid environment '{}'; must be one of: {}",
                    environment,
                    allowed.join(", ")
                ),
            ));
        }
    }

    fn baseline_profiles(&mut self, profiles: &[String]) {
        let catalog = &self.guardrails.policy.baseline;

        for (i, profile) in profiles.iter().enumerate() {
            if !catalog.profiles.contains(profile) {
                self.findings.push(Finding::error(
                    RuleId::BaselineProfileUnknown,
                    Locator::document(format!("baseline_profiles[{}]", i)),
                    format!(
                        "Baseline profile '{}' does not exist. Available profiles: {}",
                        profile,
                        catalog.profiles.join(", ")
                    ),
                ));
            }
        }

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut duplicates: BTreeSet<&str> = BTreeSet::new();
        for profile in profiles {
            if !seen.insert(profile.as_str()) {
                duplicates.insert(profile.as_str());
            }
        }
        if !duplicates.is_empty() {
            self.findings.push(Finding::warning(
                RuleId::BaselineProfileDuplicate,
                Locator::document("baseline_profiles"),
                format!(
                    "Duplicate baseline profiles: {}",
                    duplicates.into_iter().collect::<Vec<_>>().join(", ")
                ),
            ));
        }

        for exclusive in &catalog.mutually_exclusive {
            let selected: BTreeSet<&str> = exclusive
                .iter()
                .filter(|p| seen.contains(p.as_str()))
                .map(String::as_str)
                .collect();
            if selected.len() > 1 {
                let selected: Vec<&str> = selected.into_iter().collect();
                self.findings.push(Finding::error(
                    RuleId::BaselineProfileConflict,
                    Locator::document("baseline_profiles"),
                    format!(
                        "Baseline profiles {} cannot be used together; pick one",
                        selected.join(" and ")
                    ),
                ));
            }
        }
    }

    fn compliance_mode(&mut self, mode: &str) -> ComplianceMode {
        let Some(parsed) = ComplianceMode::parse(mode) else {
            let valid: Vec<&str> = ComplianceMode::ALL.iter().map(|m| m.as_str()).collect();
            self.findings.push(Finding::error(
                RuleId::SchemaInvalidComplianceMode,
                Locator::document("compliance_mode"),
                format!(
                    "Unknown compliance_mode '{}'; must be one of: {}",
                    mode,
                    valid.join(", ")
                ),
            ));
            return ComplianceMode::None;
        };

        if parsed != ComplianceMode::None && self.guardrails.compliance(parsed).is_none() {
            self.findings.push(Finding::error(
                RuleId::SchemaInvalidComplianceMode,
                Locator::document("compliance_mode"),
                format!(
                    "compliance_mode '{}' has no rule set in the guardrail policy",
                    mode
                ),
            ));
            return ComplianceMode::None;
        }

        parsed
    }

    fn groups(&mut self, groups: &Mapping) -> Vec<SecurityGroupSpec> {
        let mut decoded = Vec::with_capacity(groups.len());

        for (index, (key, value)) in groups.iter().enumerate() {
            let name = key_name(key);
            let empty = Mapping::new();
            let mapping = match value {
                Value::Mapping(mapping) => mapping,
                Value::Null => &empty,
                other => {
                    self.findings.push(Finding::error(
                        RuleId::SchemaType,
                        Locator::group(index, name.clone()),
                        format!(
                            "Security group '{}' must be a mapping, got {}",
                            name,
                            value_type_name(other)
                        ),
                    ));
                    continue;
                }
            };
            decoded.push(self.group(index, name, mapping));
        }

        decoded
    }

    fn group(&mut self, index: usize, name: String, mapping: &Mapping) -> SecurityGroupSpec {
        let malformed = report(
            &mut self.findings,
            &self.group_schema,
            mapping,
            &format!("security group '{}'", name),
            |path| Locator::group(index, name.clone()).field(path),
        );

        let mut group = SecurityGroupSpec {
            index,
            name,
            description: string(mapping.get("description")),
            group_type: string(mapping.get("type")),
            tags: mapping.get("tags").map(tag_map).unwrap_or_default(),
            ..Default::default()
        };

        for direction in Direction::ALL {
            let rules: Option<Vec<Rule>> = match mapping.get(direction.as_str()) {
                Some(Value::Sequence(items)) => Some(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| self.rule(index, &group.name, direction, i, item))
                        .collect(),
                ),
                _ => None,
            };
            match direction {
                Direction::Ingress => group.ingress = rules,
                Direction::Egress => group.egress = rules,
            }
        }

        group.malformed = malformed;
        group
    }

    fn rule(
        &mut self,
        index: usize,
        name: &str,
        direction: Direction,
        position: usize,
        item: &Value,
    ) -> Rule {
        let locator = Locator::rule(index, name, direction, position);
        let Value::Mapping(mapping) = item else {
            self.findings.push(Finding::error(
                RuleId::SchemaType,
                locator,
                format!(
                    "Rule {} {}[{}] must be a mapping, got {}",
                    name,
                    direction,
                    position,
                    value_type_name(item)
                ),
            ));
            return Rule {
                invalid: true,
                ..Default::default()
            };
        };

        let mut malformed = report(
            &mut self.findings,
            &self.rule_schema,
            mapping,
            &format!("{} {}[{}]", name, direction, position),
            |path| locator.clone().field(path),
        );

        let mut list = |key: &str| -> Vec<String> {
            let Some(value) = mapping.get(key) else {
                return Vec::new();
            };
            let (items, well_typed) = string_list(value);
            if !well_typed {
                malformed.insert(key.to_string());
            }
            items
        };

        let cidr_blocks = list("cidr_blocks");
        let ipv6_cidr_blocks = list("ipv6_cidr_blocks");
        let security_groups = list("security_groups");
        let prefix_list_ids = list("prefix_list_ids");

        Rule {
            invalid: false,
            protocol: match mapping.get("protocol") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            },
            from_port: mapping.get("from_port").and_then(Value::as_i64),
            to_port: mapping.get("to_port").and_then(Value::as_i64),
            cidr_blocks,
            ipv6_cidr_blocks,
            security_groups,
            prefix_list_ids,
            self_ref: mapping.get("self").and_then(Value::as_bool).unwrap_or(false),
            description: string(mapping.get("description")),
            malformed,
        }
    }
}

/// Validate a mapping against its schema and turn the errors into
/// findings; returns the keys whose values were mistyped
fn report(
    findings: &mut Vec<Finding>,
    schema: &ObjectSchema,
    mapping: &Mapping,
    context: &str,
    at: impl Fn(String) -> Locator,
) -> BTreeSet<String> {
    let mut malformed = BTreeSet::new();

    for error in schema.validate(mapping) {
        let path = format!("{}{}", error.key, error.error.path_suffix());
        let finding = match error.error.root_cause() {
            TypeError::UnknownAttribute { name, suggestion } => {
                let mut message = format!("Unknown key '{}' in {}", name, context);
                if let Some(suggestion) = suggestion {
                    message.push_str(&format!("; did you mean '{}'?", suggestion));
                } else {
                    message.push('.');
                }
                message.push_str(&format!(
                    " Valid keys: {}. Misspelled keys would be silently ignored.",
                    schema.known_keys().join(", ")
                ));
                Finding::error(RuleId::SchemaUnknownKey, at(path), message)
            }
            cause => {
                let value = mapping.get(error.key.as_str());
                // A bare string is still decoded as a one-item list
                if !bare_string_for_list(&path, cause, value) {
                    malformed.insert(error.key.clone());
                }
                let message = type_message(&path, cause, value);
                Finding::error(RuleId::SchemaType, at(path), message)
            }
        };
        findings.push(finding);
    }

    malformed
}

/// A single string written where a list of strings belongs
fn bare_string_for_list(path: &str, cause: &TypeError, value: Option<&Value>) -> bool {
    matches!(
        (cause, value),
        (TypeError::TypeMismatch { expected, .. }, Some(Value::String(_)))
            if expected == "List<String>" && !path.ends_with(']')
    )
}

fn type_message(path: &str, cause: &TypeError, value: Option<&Value>) -> String {
    match (cause, value) {
        (TypeError::TypeMismatch { .. }, Some(Value::String(s)))
            if bare_string_for_list(path, cause, value) =>
        {
            format!(
                "'{}' must be a list, got a single string; write {}: [\"{}\"]",
                path, path, s
            )
        }
        (TypeError::TypeMismatch { expected, got }, _) => {
            format!("'{}' must be {}, got {}", path, describe_type(expected), got)
        }
        (TypeError::ValidationFailed { message }, _) => format!("'{}': {}", path, message),
        (other, _) => format!("'{}': {}", path, other),
    }
}

fn describe_type(name: &str) -> String {
    match name {
        "String" => "a string".to_string(),
        "Int" => "an integer".to_string(),
        "Bool" => "true or false".to_string(),
        "Map" => "a mapping".to_string(),
        "List<String>" => "a list of strings".to_string(),
        "List<Any>" => "a list".to_string(),
        other => other.to_string(),
    }
}

fn string(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(String::from)
}

/// String items of a list; a bare string counts as a one-item list.
/// The flag is false when the value was not usable as a list of strings.
fn string_list(value: &Value) -> (Vec<String>, bool) {
    match value {
        Value::Null => (Vec::new(), true),
        Value::String(s) => (vec![s.clone()], true),
        Value::Sequence(items) => {
            let strings: Vec<String> = items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect();
            let well_typed = strings.len() == items.len();
            (strings, well_typed)
        }
        _ => (Vec::new(), false),
    }
}

/// Scalar tag values rendered as strings; other values become empty so the
/// key still counts as present
fn tag_map(value: &Value) -> BTreeMap<String, String> {
    let Value::Mapping(mapping) = value else {
        return BTreeMap::new();
    };
    mapping
        .iter()
        .map(|(k, v)| {
            let rendered = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => String::new(),
            };
            (key_name(k), rendered)
        })
        .collect()
}
