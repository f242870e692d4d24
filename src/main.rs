//! mirrorsync - command line entry point
//!
//! ```text
//! mirrorsync push [auto|merge|force|manual]
//! mirrorsync pull [local|remote|merge|manual]
//! mirrorsync status
//! mirrorsync env
//! ```

use std::sync::Arc;

use mirrorsync::apply::{apply_current, ShellExportSink};
use mirrorsync::sync::{
    ConflictPrompter, PushStrategy, ResolutionStrategy, SyncOrchestrator, SyncOutcome,
    TerminalPrompter,
};
use mirrorsync::Config;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: mirrorsync <push [strategy] | pull [strategy] | status | env>";

#[derive(Debug)]
enum Command {
    Push(Option<PushStrategy>),
    Pull(Option<ResolutionStrategy>),
    Status,
    Env,
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let (command, rest) = args
        .split_first()
        .ok_or_else(|| anyhow::anyhow!(USAGE))?;
    let strategy = rest.first().map(String::as_str);
    if rest.len() > 1 {
        anyhow::bail!(USAGE);
    }

    match (command.as_str(), strategy) {
        ("push", s) => Ok(Command::Push(s.map(str::parse).transpose()?)),
        ("pull", s) => Ok(Command::Pull(s.map(str::parse).transpose()?)),
        ("status", None) => Ok(Command::Status),
        ("env", None) => Ok(Command::Env),
        _ => anyhow::bail!(USAGE),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mirrorsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(()) => {}
        Err(e) if is_cancelled(&e) => {
            info!("Cancelled, nothing was changed");
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    err.downcast_ref::<mirrorsync::SyncError>()
        .map(|e| e.is_cancelled())
        .unwrap_or(false)
}

async fn run() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;
    let config = Config::from_env()?;

    if let Command::Env = command {
        let state = config.store().load().await?;
        let mut sink = ShellExportSink::default();
        apply_current(&state, &[], &mut sink).await?;
        print!("{}", sink.render());
        return Ok(());
    }

    let transport = config.build_transport()?;
    let mut orchestrator = SyncOrchestrator::new(
        transport,
        config.store(),
        config.backups(),
        config.require_password()?,
        config.sync_options(),
    )?;

    let wants_prompt = config.interactive
        || matches!(command, Command::Pull(Some(ResolutionStrategy::Manual)))
        || (matches!(command, Command::Pull(None)) && config.strategy == ResolutionStrategy::Manual);
    if wants_prompt {
        let prompter: Arc<dyn ConflictPrompter> = Arc::new(TerminalPrompter::stdio());
        orchestrator = orchestrator.with_prompter(prompter);
    }

    match command {
        Command::Push(strategy) => {
            let outcome = orchestrator
                .push(strategy.unwrap_or(config.push_strategy))
                .await?;
            report("push", &outcome);
        }
        Command::Pull(strategy) => {
            let outcome = orchestrator.pull(strategy.unwrap_or(config.strategy)).await?;
            report("pull", &outcome);
        }
        Command::Status => {
            let status = orchestrator.status().await?;
            if !status.remote_exists {
                println!("No remote snapshot yet ({} local mirrors)", status.local_active);
                return Ok(());
            }
            println!(
                "Remote: {} mirrors from device {} at {} (v{})",
                status.remote_active,
                status.remote_device.unwrap_or_default(),
                status
                    .remote_timestamp
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
                status.remote_version.unwrap_or_default(),
            );
            println!(
                "Local: {} mirrors, last sync {}",
                status.local_active,
                status
                    .last_sync
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string()),
            );
            match status.report {
                Some(report) if !report.is_empty() => {
                    println!("{} conflict(s):", report.len());
                    for conflict in &report.conflicts {
                        println!("  [{}] {}", conflict.kind, conflict.description);
                    }
                }
                _ => println!("In sync"),
            }
        }
        Command::Env => {}
    }

    Ok(())
}

fn report(op: &str, outcome: &SyncOutcome) {
    if outcome.first_push {
        println!("First {}: uploaded {} mirrors", op, outcome.active_mirrors);
        return;
    }
    println!(
        "{} complete: {} mirrors, {} conflict(s) resolved{}",
        op,
        outcome.active_mirrors,
        outcome.conflicts,
        if outcome.changed { ", local state updated" } else { "" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_commands() {
        assert!(matches!(parse_args(&args(&["push"])).unwrap(), Command::Push(None)));
        assert!(matches!(
            parse_args(&args(&["pull", "remote"])).unwrap(),
            Command::Pull(Some(ResolutionStrategy::Remote))
        ));
        assert!(matches!(
            parse_args(&args(&["push", "force"])).unwrap(),
            Command::Push(Some(PushStrategy::Force))
        ));
        assert!(matches!(parse_args(&args(&["status"])).unwrap(), Command::Status));
        assert!(matches!(parse_args(&args(&["env"])).unwrap(), Command::Env));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&args(&["pull", "newest"])).is_err());
        assert!(parse_args(&args(&["status", "merge"])).is_err());
        assert!(parse_args(&args(&["pull", "merge", "extra"])).is_err());
        assert!(parse_args(&args(&["sync"])).is_err());
    }
}
