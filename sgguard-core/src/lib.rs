//! Sgguard Core
//!
//! Validates AWS security group requests against an organization's
//! guardrail policy before they reach a pull request

pub mod checks;
pub mod cidr;
pub mod error;
pub mod finding;
pub mod loader;
pub mod policy;
pub mod ports;
pub mod report;
pub mod request;
pub mod schema;
pub mod validator;

pub use error::{LoadError, LoadResult};
pub use finding::{Direction, Finding, Locator, RuleId, Severity};
pub use policy::{GuardrailPolicy, Guardrails};
pub use report::{ExitStatus, Report, ReportOptions};
pub use validator::{validate, validate_document, validate_path};
