//! Reviewer commands: verdicts, activation delivery and trigger dry runs.

use anyhow::Result;
use console::style;

use gatekeeper::gate_config::GateConfig;
use gatekeeper::review::{JsonLinesSink, NewReviewerResult, TriggerContext};
use gatekeeper::{GateEngine, GateError, Score};

use super::super::{Cli, ReviewCommands};
use super::print_json;

pub async fn cmd_review(cli: &Cli, engine: &GateEngine, command: ReviewCommands) -> Result<()> {
    match command {
        ReviewCommands::Record {
            directive_id,
            reviewer,
            verdict,
            confidence,
            issues,
            warnings,
            recommendations,
        } => {
            let confidence = Score::new(confidence).map_err(|e| GateError::ValidationFailure {
                validator: "confidence".to_string(),
                message: e.to_string(),
            })?;
            let input = NewReviewerResult {
                reviewer_code: reviewer,
                verdict,
                confidence,
                issues,
                warnings,
                recommendations,
            };
            let result = engine
                .record_reviewer_result(directive_id, input, &cli.actor()?)
                .await?;
            if cli.json {
                return print_json(&result);
            }
            let verdict = if result.verdict.is_blocking() {
                style(result.verdict.to_string()).red()
            } else {
                style(result.verdict.to_string()).green()
            };
            println!(
                "Recorded {} from {} on #{} (confidence {})",
                verdict, result.reviewer_code, result.directive_id, result.confidence
            );
        }
        ReviewCommands::Activations { directive } => {
            let activations = engine.activations(directive).await?;
            if cli.json {
                return print_json(&activations);
            }
            if activations.is_empty() {
                println!("No reviewer activations.");
            }
            for a in &activations {
                let state = match (&a.delivered_at, &a.last_error) {
                    (Some(_), _) => style("delivered".to_string()).green(),
                    (None, Some(err)) => style(format!("failed x{}: {}", a.attempts, err)).red(),
                    (None, None) => style("queued".to_string()).yellow(),
                };
                println!(
                    "#{:<4} directive #{:<4} {:<14} priority {:>3}  {}",
                    a.id,
                    a.directive_id,
                    a.reviewer_code.to_string(),
                    a.priority.value(),
                    state
                );
            }
        }
        ReviewCommands::Deliver => {
            let report = engine.deliver_activations(&JsonLinesSink).await?;
            if !cli.json {
                eprintln!(
                    "{} delivered, {} failed",
                    report.delivered, report.failed
                );
            }
        }
    }
    Ok(())
}

pub fn cmd_dispatch(cli: &Cli, config: &GateConfig, text: &str, context: TriggerContext) -> Result<()> {
    let dispatcher = config.dispatcher()?;
    let activations = dispatcher.dispatch(text, context);
    if cli.json {
        return print_json(&activations);
    }
    if activations.is_empty() {
        println!("No reviewers triggered.");
    }
    for a in &activations {
        println!(
            "{:<14} priority {:>3}  matched \"{}\"",
            a.reviewer.to_string(),
            a.priority.value(),
            a.matched_phrase
        );
    }
    Ok(())
}
