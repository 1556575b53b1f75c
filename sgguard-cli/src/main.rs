mod render;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use sgguard_core::loader::{discover_policy, load_policy, load_request, resolve_request_path};
use sgguard_core::validator::validate_document;
use sgguard_core::{GuardrailPolicy, Guardrails, LoadError, LoadResult, Report, ReportOptions};

use render::{Format, fatal_json, fatal_line, render};

#[derive(Parser)]
#[command(name = "sgguard")]
#[command(about = "Validate security group requests against guardrail policy", long_about = None)]
struct Cli {
    /// Log what is loaded and how many findings each stage produced
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a security group request
    Validate {
        /// Request file, or an account directory containing security-groups.yaml
        path: PathBuf,

        /// Guardrail policy file (default: nearest guardrails.yaml above the request)
        #[arg(long, env = "SGGUARD_POLICY")]
        policy: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        /// Treat warnings as errors
        #[arg(long)]
        warnings_as_errors: bool,

        /// Do not report warnings
        #[arg(long)]
        no_warnings: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let code = match cli.command {
        Commands::Validate {
            path,
            policy,
            format,
            warnings_as_errors,
            no_warnings,
        } => {
            let options = ReportOptions {
                warnings_as_errors,
                no_warnings,
            };
            run_validate(&path, policy.as_deref(), options, format)
        }
    };
    std::process::exit(code);
}

fn run_validate(
    path: &Path,
    policy: Option<&Path>,
    options: ReportOptions,
    format: Format,
) -> i32 {
    let report = match validate(path, policy, options) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{}", fatal_line(&e));
            if format == Format::Json {
                println!("{}", fatal_json(&e));
            }
            return 1;
        }
    };

    match render(&report, format) {
        Ok(out) => {
            print!("{}", out);
            report.exit_code
        }
        Err(e) => {
            eprintln!("fatal: {}, file: {}", e, report.file.display());
            1
        }
    }
}

fn validate(path: &Path, policy: Option<&Path>, options: ReportOptions) -> LoadResult<Report> {
    let request = resolve_request_path(path)?;
    let guardrails = guardrails_for(&request, policy)?;
    let doc = load_request(&request)?;
    Ok(validate_document(&doc, &guardrails, options))
}

/// An explicit policy must load; otherwise the nearest `guardrails.yaml`
/// is used, falling back to the built-in defaults
fn guardrails_for(request: &Path, policy: Option<&Path>) -> LoadResult<Guardrails> {
    if let Some(policy) = policy {
        return load_policy(policy);
    }
    if let Some(found) = discover_policy(request) {
        return load_policy(&found);
    }
    log::warn!(
        "No guardrails.yaml found above {}; using built-in guardrail defaults",
        request.display()
    );
    GuardrailPolicy::default()
        .compile()
        .map_err(|problems| LoadError::Policy {
            path: request.to_path_buf(),
            problems,
        })
}
