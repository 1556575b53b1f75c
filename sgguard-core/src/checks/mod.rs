//! Checks - Content validation of a loaded request
//!
//! Document checks decode the request and report its shape. Group and rule
//! checks then evaluate each security group against the guardrails.

mod document;
mod group;
mod rules;

pub use document::check_document;
pub use group::{ActiveCompliance, GroupInput, GroupLimits, check_group, cite};
pub use rules::{RuleInput, check_rule, duplicate_rules};
