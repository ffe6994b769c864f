//! Audit trail listing for `gatekeeper audit`.

use anyhow::Result;
use console::style;

use gatekeeper::GateEngine;
use gatekeeper::audit::AuditKind;

use super::super::Cli;
use super::print_json;

pub async fn cmd_audit(cli: &Cli, engine: &GateEngine, directive: Option<i64>) -> Result<()> {
    let events = engine.audit_trail(directive).await?;
    if cli.json {
        return print_json(&events);
    }
    if events.is_empty() {
        println!("No audit events.");
        return Ok(());
    }
    for e in &events {
        let kind = match e.kind {
            AuditKind::ConstraintViolation => style(e.kind.as_str()).red(),
            AuditKind::CircuitBreakerBlock => style(e.kind.as_str()).yellow(),
        };
        let target = match (e.directive_id, e.handoff_id) {
            (Some(d), Some(h)) => format!("directive #{} handoff #{}", d, h),
            (Some(d), None) => format!("directive #{}", d),
            _ => "-".to_string(),
        };
        println!(
            "{} {} {} ({}) {}: {}",
            style(e.created_at.format("%Y-%m-%d %H:%M:%S")).dim(),
            kind,
            e.actor_id,
            e.actor_role.as_str(),
            target,
            e.attempted_operation
        );
        println!("    {}", e.reason);
    }
    Ok(())
}
