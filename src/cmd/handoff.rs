//! Handoff and progress commands.

use anyhow::{Context, Result};
use console::style;

use gatekeeper::handoff::HandoffDraft;
use gatekeeper::progress::ProgressBreakdown;
use gatekeeper::store::{AcceptResult, Handoff, HandoffFilter, HandoffStatus};
use gatekeeper::{GateEngine, Phase};

use super::super::{Cli, HandoffCommands};
use super::{directive_line, print_json};

pub async fn cmd_handoff(cli: &Cli, engine: &GateEngine, command: HandoffCommands) -> Result<()> {
    match command {
        HandoffCommands::Create {
            directive_id,
            from,
            to,
            draft,
            summary,
            key_decisions,
            known_issues,
            resource_utilization,
            action_items,
        } => {
            let mut draft = match draft {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read draft: {}", path.display()))?;
                    toml::from_str::<HandoffDraft>(&text)
                        .with_context(|| format!("Failed to parse draft: {}", path.display()))?
                }
                None => HandoffDraft::default(),
            };
            if let Some(text) = summary {
                draft.fields.executive_summary = text;
            }
            if let Some(text) = key_decisions {
                draft.fields.key_decisions = text;
            }
            if let Some(text) = known_issues {
                draft.fields.known_issues = text;
            }
            if let Some(text) = resource_utilization {
                draft.fields.resource_utilization = text;
            }
            if !action_items.is_empty() {
                draft.fields.action_items = action_items
                    .iter()
                    .map(|item| format!("- {}", item))
                    .collect::<Vec<_>>()
                    .join("\n");
            }

            let actor = cli.actor()?;
            let result = match (from, to) {
                (Some(from), Some(to)) => {
                    engine
                        .create_handoff(directive_id, from, to, draft, &actor)
                        .await?
                }
                _ => engine.execute(directive_id, draft, &actor).await?,
            };
            if cli.json {
                return print_json(&result);
            }
            println!("{} {}", style("Accepted").green().bold(), handoff_line(&result.handoff));
            println!("  {}", directive_line(&result.directive));
        }
        HandoffCommands::Accept { handoff_id } => {
            let outcome = engine.accept_handoff(handoff_id, &cli.actor()?).await?;
            if cli.json {
                return print_json(&outcome);
            }
            match outcome {
                AcceptResult::Accepted {
                    handoff, directive, ..
                } => {
                    println!("{} {}", style("Accepted").green().bold(), handoff_line(&handoff));
                    println!("  {}", directive_line(&directive));
                }
                AcceptResult::AlreadyAccepted { handoff_id } => {
                    println!("Handoff #{} was already accepted.", handoff_id);
                }
            }
        }
        HandoffCommands::Reject { handoff_id, reason } => {
            let handoff = engine
                .reject_handoff(handoff_id, &cli.actor()?, reason)
                .await?;
            if cli.json {
                return print_json(&handoff);
            }
            println!("{} {}", style("Rejected").red().bold(), handoff_line(&handoff));
        }
        HandoffCommands::Pending {
            directive,
            acceptable_by,
        } => {
            let filter = HandoffFilter {
                directive_id: directive,
                handoff_type: None,
                acceptable_by,
            };
            let handoffs = engine.list_pending_handoffs(filter).await?;
            if cli.json {
                return print_json(&handoffs);
            }
            if handoffs.is_empty() {
                println!("No handoffs pending acceptance.");
            }
            for h in &handoffs {
                println!("{}", handoff_line(h));
            }
        }
        HandoffCommands::History { directive_id } => {
            let handoffs = engine.handoff_history(directive_id).await?;
            if cli.json {
                return print_json(&handoffs);
            }
            for h in &handoffs {
                println!("{}", handoff_line(h));
                for result in h.validation_details.iter().filter(|r| !r.passed) {
                    println!("    {} {} ({})", style("✗").red(), result.name, result.score);
                    for issue in &result.issues {
                        println!("      - {}", issue);
                    }
                }
                if let Some(reason) = &h.rejection_reason {
                    println!("    rejected: {}", reason);
                }
            }
        }
    }
    Ok(())
}

pub async fn cmd_progress(cli: &Cli, engine: &GateEngine, directive_id: i64) -> Result<()> {
    let breakdown = engine.get_progress(directive_id).await?;
    if cli.json {
        return print_json(&breakdown);
    }
    print_breakdown(&breakdown);
    Ok(())
}

fn print_breakdown(b: &ProgressBreakdown) {
    println!();
    println!(
        "Directive #{}: {}%{}",
        b.directive_id,
        style(b.overall).bold(),
        if b.can_complete { " (complete)" } else { "" }
    );
    println!();
    for phase in Phase::ALL {
        let Some(p) = b.phases.get(&phase) else {
            continue;
        };
        let done = (p.completion * 100.0).round() as u32;
        println!("  {:<15} {:>3}% of {:>2}", phase.as_str(), done, p.weight);
        for note in &p.notes {
            println!("      {}", style(note).dim());
        }
    }
    println!();
}

fn handoff_line(h: &Handoff) -> String {
    let status = match h.status {
        HandoffStatus::Accepted => style(h.status.as_str()).green(),
        HandoffStatus::Rejected => style(h.status.as_str()).red(),
        HandoffStatus::PendingAcceptance => style(h.status.as_str()).yellow(),
    };
    format!(
        "#{:<4} {:<32} attempt {:<2} score {:>3}  {}",
        h.id,
        h.handoff_type.as_str(),
        h.attempt_number,
        h.validation_score.value(),
        status
    )
}
