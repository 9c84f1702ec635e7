use anyhow::{bail, Context, Result};

use crate::cli::output::OutputOptions;
use crate::core::collectors::CollectorKind;
use crate::core::config::AppConfig;

fn parse_kind(id: &str) -> Result<CollectorKind> {
    match CollectorKind::from_id(id) {
        Some(kind) => Ok(kind),
        None => {
            let known: Vec<&str> = CollectorKind::all().iter().map(|k| k.id()).collect();
            bail!("Unknown collector: '{}' (known: {})", id, known.join(", "))
        }
    }
}

pub fn init(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    let config = AppConfig::default();
    let path = config.save().context("Failed to generate config")?;
    println!("Generated config at {}", path.display());

    let enabled: Vec<&str> = config
        .enabled_collectors()
        .iter()
        .map(|(kind, _)| kind.id())
        .collect();
    println!(
        "  {} collector{} enabled: {}",
        enabled.len(),
        if enabled.len() == 1 { "" } else { "s" },
        enabled.join(", ")
    );
    println!("  Enable AWS with `costguard config add aws_cost_explorer`.");
    Ok(())
}

pub fn add(collector_id: &str, _opts: &OutputOptions) -> Result<()> {
    let kind = parse_kind(collector_id)?;
    let mut config = AppConfig::load().context("Failed to load config")?;

    if !config.set_enabled(kind, true) {
        bail!("Collector '{}' is already enabled", kind.id());
    }
    config.save().context("Failed to save config")?;
    println!("Enabled collector: {}", kind.id());
    println!("  Credentials: {}", kind.credential_hint());
    if kind == CollectorKind::AwsBudgets {
        println!("  Set `account_id` for aws_budgets in the config file.");
    }
    Ok(())
}

pub fn remove(collector_id: &str, _opts: &OutputOptions) -> Result<()> {
    let kind = parse_kind(collector_id)?;
    let mut config = AppConfig::load().context("Failed to load config")?;

    if !config.set_enabled(kind, false) {
        bail!("Collector '{}' is already disabled", kind.id());
    }
    config.save().context("Failed to save config")?;
    println!("Disabled collector: {}", kind.id());
    Ok(())
}

pub fn check(_opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if !path.exists() {
        eprintln!("No config file found at {}", path.display());
        eprintln!("Run `costguard config init` to create one.");
        return Ok(());
    }

    let config = AppConfig::load().context("Failed to load config")?;
    let issues = config.validate();
    if !issues.is_empty() {
        eprintln!("Config issues found in {}:", path.display());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        bail!("{} config issue{}", issues.len(), if issues.len() == 1 { "" } else { "s" });
    }

    println!("Config is valid: {}", path.display());
    let enabled: Vec<&str> = config
        .enabled_collectors()
        .iter()
        .map(|(kind, _)| kind.id())
        .collect();
    if enabled.is_empty() {
        println!("  No collectors enabled.");
    } else {
        println!("  Enabled collectors: {}", enabled.join(", "));
    }
    Ok(())
}
