//! Directive lifecycle and evidence commands: `directive`, `plan`, `deliverable`.

use anyhow::{Context, Result, bail};
use console::style;

use gatekeeper::GateEngine;
use gatekeeper::store::NewDirective;

use super::super::{Cli, DeliverableCommands, DirectiveCommands, PlanCommands};
use super::{directive_line, print_json};

pub async fn cmd_directive(cli: &Cli, engine: &GateEngine, command: DirectiveCommands) -> Result<()> {
    match command {
        DirectiveCommands::Create {
            title,
            description,
            parent,
        } => {
            let mut input = NewDirective::new(title, description);
            if let Some(parent_id) = parent {
                input = input.with_parent(parent_id);
            }
            let directive = engine.create_directive(input, &cli.actor()?).await?;
            let activations = engine.activations(Some(directive.id)).await?;
            if cli.json {
                return print_json(&serde_json::json!({
                    "directive": directive,
                    "activations": activations,
                }));
            }
            println!("{} {}", style("Created").green().bold(), directive_line(&directive));
            for a in &activations {
                println!(
                    "  reviewer {} (priority {}, matched \"{}\")",
                    style(&a.reviewer_code).cyan(),
                    a.priority,
                    a.matched_phrase
                );
            }
        }
        DirectiveCommands::Activate { id } => {
            let directive = engine.activate_directive(id, &cli.actor()?).await?;
            if cli.json {
                return print_json(&directive);
            }
            println!("{} {}", style("Activated").green(), directive_line(&directive));
        }
        DirectiveCommands::Defer { id } => {
            let directive = engine.defer_directive(id, &cli.actor()?).await?;
            if cli.json {
                return print_json(&directive);
            }
            println!("{} {}", style("Deferred").yellow(), directive_line(&directive));
        }
        DirectiveCommands::Show { id } => {
            let directive = engine.get_directive(id).await?;
            let progress = engine.get_progress(id).await?;
            let history = engine.handoff_history(id).await?;
            if cli.json {
                return print_json(&serde_json::json!({
                    "directive": directive,
                    "progress": progress,
                    "handoffs": history,
                }));
            }
            println!();
            println!("{}", style(&directive.title).bold());
            println!("{}", directive_line(&directive));
            if !directive.description.is_empty() {
                println!();
                println!("{}", directive.description);
            }
            if let Some(parent) = directive.parent_id {
                println!("Parent: #{}", parent);
            }
            println!();
            println!("Handoff attempts: {}", history.len());
            println!(
                "Can complete: {}",
                if progress.can_complete { "yes" } else { "no" }
            );
            println!();
        }
        DirectiveCommands::List => {
            let directives = engine.list_directives().await?;
            if cli.json {
                return print_json(&directives);
            }
            if directives.is_empty() {
                println!("No directives.");
            }
            for d in &directives {
                println!("{}", directive_line(d));
            }
        }
    }
    Ok(())
}

pub async fn cmd_plan(cli: &Cli, engine: &GateEngine, command: PlanCommands) -> Result<()> {
    match command {
        PlanCommands::Set {
            directive_id,
            content,
            file,
        } => {
            let content = match (content, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read plan file: {}", path.display()))?,
                (None, None) => bail!("provide the plan with --content or --file"),
            };
            let plan = engine
                .set_plan_document(directive_id, content, &cli.actor()?)
                .await?;
            if cli.json {
                return print_json(&plan);
            }
            println!(
                "{} plan for #{} ({} chars)",
                style("Saved").green(),
                plan.directive_id,
                plan.content.chars().count()
            );
        }
    }
    Ok(())
}

pub async fn cmd_deliverable(
    cli: &Cli,
    engine: &GateEngine,
    command: DeliverableCommands,
) -> Result<()> {
    let deliverable = match command {
        DeliverableCommands::Track {
            directive_id,
            name,
            kind,
        } => {
            engine
                .track_deliverable(directive_id, name, kind, &cli.actor()?)
                .await?
        }
        DeliverableCommands::Complete { deliverable_id } => {
            engine
                .complete_deliverable(deliverable_id, &cli.actor()?)
                .await?
        }
    };
    if cli.json {
        return print_json(&deliverable);
    }
    println!(
        "Deliverable #{} {} ({}) [{}]",
        deliverable.id,
        deliverable.name,
        deliverable.kind,
        deliverable.status.as_str()
    );
    Ok(())
}
