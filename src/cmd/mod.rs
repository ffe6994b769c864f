//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module      | Commands handled                                |
//! |-------------|-------------------------------------------------|
//! | `directive` | `Directive`, `Plan`, `Deliverable`              |
//! | `handoff`   | `Handoff`, `Progress`                           |
//! | `review`    | `Review`, `Dispatch`                            |
//! | `audit`     | `Audit`                                         |
//! | `config`    | `Config`                                        |

pub mod audit;
pub mod config;
pub mod directive;
pub mod handoff;
pub mod review;

use anyhow::Result;
use console::style;
use serde::Serialize;

use gatekeeper::GateError;
use gatekeeper::store::Directive;

pub use audit::cmd_audit;
pub use config::cmd_config;
pub use directive::{cmd_deliverable, cmd_directive, cmd_plan};
pub use handoff::{cmd_handoff, cmd_progress};
pub use review::{cmd_dispatch, cmd_review};

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a failed command. Gate errors carry their code and a remediation hint.
pub fn report_error(err: &anyhow::Error, json: bool) {
    let gate = err.downcast_ref::<GateError>();
    if json {
        let body = match gate {
            Some(e) => serde_json::json!({
                "error": {
                    "code": e.code(),
                    "message": e.to_string(),
                    "remediation": e.remediation(),
                    "retryable": e.is_retryable(),
                    "remediators": e.remediation_plan(),
                }
            }),
            None => serde_json::json!({ "error": { "message": format!("{:#}", err) } }),
        };
        println!("{}", body);
        return;
    }
    match gate {
        Some(e) => {
            eprintln!("{} {}", style(format!("error[{}]:", e.code())).red().bold(), e);
            eprintln!("  {} {}", style("hint:").dim(), e.remediation());
            for r in e.remediation_plan() {
                let who = r.reviewer.as_ref().map_or("phase owner", |c| c.as_code());
                eprintln!("    {} [{}] {}: {}", style(who).cyan(), r.category, r.validator, r.action);
            }
        }
        None => eprintln!("{} {:#}", style("error:").red().bold(), err),
    }
}

pub(crate) fn directive_line(d: &Directive) -> String {
    format!(
        "#{:<4} {:<15} {:<12} {:>3}%  {}",
        d.id,
        d.current_phase.as_str(),
        d.status.as_str(),
        d.progress_percentage,
        d.title
    )
}
