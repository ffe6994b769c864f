//! `gatekeeper config`: show or validate settings, or write a default file.

use anyhow::{Result, bail};
use console::style;
use std::path::PathBuf;

use gatekeeper::gate_config::{CONFIG_FILE_NAME, GateToml};

use super::super::{Cli, ConfigCommands};
use super::print_json;

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

    match command {
        None | Some(ConfigCommands::Show) => {
            let config = cli.resolve_config()?;
            if cli.json {
                return print_json(&serde_json::json!({
                    "source": config.source,
                    "db_path": config.db_path(),
                    "threshold": config.threshold(),
                    "config": config.toml,
                    "triggers": config.toml.effective_triggers(),
                }));
            }
            println!();
            println!("Gatekeeper Configuration");
            println!("========================");
            println!();
            match &config.source {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("No {} found, using defaults.", CONFIG_FILE_NAME),
            }
            println!();
            print!("{}", config.toml.to_toml_string()?);
            println!();
            println!("Effective values (with env/CLI overrides):");
            println!("  db_path = \"{}\"", config.db_path().display());
            println!("  threshold = {}", config.threshold());
            println!(
                "  triggers = {}{}",
                config.toml.effective_triggers().len(),
                if config.toml.triggers.is_empty() {
                    " (defaults)"
                } else {
                    ""
                }
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            if !config_path.exists() {
                if cli.config.is_some() {
                    bail!("Config file not found: {}", config_path.display());
                }
                println!("No {} found. Using defaults (valid).", CONFIG_FILE_NAME);
                return Ok(());
            }

            let toml = GateToml::load(&config_path)?;
            let problems = toml.validate();
            if cli.json {
                print_json(&serde_json::json!({
                    "path": config_path,
                    "valid": problems.is_empty(),
                    "problems": problems,
                }))?;
            } else if problems.is_empty() {
                println!("{} {}", style("Configuration is valid:").green(), config_path.display());
            } else {
                println!("{}", style("Configuration problems:").red().bold());
                for problem in &problems {
                    println!("  - {}", problem);
                }
            }
            if !problems.is_empty() {
                bail!("{} has {} problem(s)", config_path.display(), problems.len());
            }
        }
        Some(ConfigCommands::Init { force }) => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists. Use --force to overwrite.",
                    config_path.display()
                );
            }
            GateToml::default().save(&config_path)?;
            println!("Created {}", config_path.display());
        }
    }
    Ok(())
}
