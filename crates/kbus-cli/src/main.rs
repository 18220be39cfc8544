//! CLI entry point for KBUS.
//!
//! This binary provides the `kbus` command with subcommands for checking
//! bus names, matching patterns, running scripted sessions, and a built-in
//! request/reply demonstration.

mod cli;
mod config;
mod script;

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use kbus_kernel::name::{Pattern, validate_name};
use kbus_kernel::{Kbus, KbusConfig, Message, OpenMode, QueuedMessage, Role};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check { names } => cmd_check(&names, &config),
        Commands::Match { pattern, name } => cmd_match(&pattern, &name, &config),
        Commands::Run { script } => cmd_run(&script, config),
        Commands::Demo { device } => cmd_demo(device, config).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: check
// ---------------------------------------------------------------------------

fn cmd_check(names: &[String], config: &KbusConfig) -> Result<()> {
    for name in names {
        let as_pattern = match Pattern::parse_bounded(name, config.max_name_len) {
            Ok(pattern) if pattern.is_wildcard() => "ok (wildcard)".to_string(),
            Ok(_) => "ok".to_string(),
            Err(e) => e.to_string(),
        };
        let as_message = match validate_name(name, config.max_name_len) {
            Ok(()) => "ok".to_string(),
            Err(e) => e.to_string(),
        };
        println!("{name}");
        println!("  pattern: {as_pattern}");
        println!("  message: {as_message}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: match
// ---------------------------------------------------------------------------

fn cmd_match(pattern: &str, name: &str, config: &KbusConfig) -> Result<()> {
    let pattern = Pattern::parse_bounded(pattern, config.max_name_len)
        .with_context(|| format!("'{pattern}' is not a valid pattern"))?;
    validate_name(name, config.max_name_len)
        .with_context(|| format!("'{name}' is not a valid message name"))?;

    if pattern.matches(name) {
        let specificity = pattern.specificity();
        println!(
            "{pattern} matches {name} ({} literal components, {:?})",
            specificity.literals, specificity.kind
        );
    } else {
        println!("{pattern} does not match {name}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

fn cmd_run(path: &std::path::Path, config: KbusConfig) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    let script = script::Script::parse(&content)?;
    info!(path = %path.display(), steps = script.steps.len(), "running script");

    let failures = script::run_script(&script, config, &mut io::stdout().lock())?;
    if failures > 0 {
        println!();
        println!("  {failures} of {} steps failed", script.steps.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: demo
// ---------------------------------------------------------------------------

async fn cmd_demo(device: usize, config: KbusConfig) -> Result<()> {
    let bus = Kbus::new(config);

    let listener = bus.open(device, OpenMode::ReadOnly)?;
    let replier = bus.open(device, OpenMode::ReadWrite)?;
    let requester = bus.open(device, OpenMode::ReadWrite)?;

    listener.bind("$.Demo.*", Role::Listener, false)?;
    replier.bind("$.Demo.Time", Role::Replier, true)?;
    info!(device, "demo endpoints bound");

    let snapshot = replier.device().snapshot_bindings();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    requester.send(Message::new("$.Demo.Hello", "hello, bus"))?;
    requester.send(Message::request("$.Demo.Time", "what time is it?"))?;

    replier.readable().await?;
    let request = replier
        .messages()
        .find(QueuedMessage::should_reply)
        .context("replier was not asked to reply")?;
    print_copy("replier", &request)?;

    let reply = request
        .reply("twelve o'clock")
        .context("request copy has no sender")?;
    replier.send(reply)?;

    requester.readable().await?;
    for copy in requester.messages() {
        print_copy("requester", &copy)?;
    }
    for copy in listener.messages() {
        print_copy("listener", &copy)?;
    }
    Ok(())
}

fn print_copy(reader: &str, copy: &QueuedMessage) -> Result<()> {
    let view = serde_json::json!({
        "reader": reader,
        "id": copy.id(),
        "name": copy.name(),
        "from": copy.from(),
        "to": copy.to(),
        "in_reply_to": copy.in_reply_to(),
        "is_request": copy.is_request(),
        "should_reply": copy.should_reply(),
        "data": String::from_utf8_lossy(copy.data()),
        "wire_len": copy.wire_len(),
    });
    println!("{}", serde_json::to_string(&view)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}
