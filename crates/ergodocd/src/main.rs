//! ergodoc - diagnostic playbook engine for Ergo actor nodes.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ergodoc_shared::{evaluate, MetricSnapshot, RawObservation, SessionBudget};
use ergodocd::action::{
    ActionGate, ActionRequest, AuthorizationToken, DryRunActions, ACTION_CONFIRMATION,
};
use ergodocd::cli::{ActCommands, Cli, Commands};
use ergodocd::config::Config;
use ergodocd::observer::{ObservationRequest, ScriptedObserver};
use ergodocd::poller::poll_trend;
use ergodocd::report;
use ergodocd::session::Session;
use owo_colors::OwoColorize;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Playbooks => {
            let set = config.load_playbooks()?;
            print!("{}", report::render_playbooks(&set));
        }
        Commands::Evaluate {
            playbook,
            snapshots,
            json,
        } => {
            let set = config.load_playbooks()?;
            let playbook = playbook.unwrap_or_else(|| config.playbooks.default_playbook.clone());
            let history = load_snapshots(&snapshots)?;
            let hypotheses = evaluate(&set, &playbook, &history)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hypotheses)?);
            } else {
                println!(
                    "{} {} over {} snapshot(s)",
                    "Playbook".bold(),
                    playbook.cyan(),
                    history.len()
                );
                print!("{}", report::render_hypotheses(&hypotheses));
            }
        }
        Commands::Run {
            playbook,
            fixture,
            max_steps,
            max_duration_ms,
            json,
        } => {
            let set = Arc::new(config.load_playbooks()?);
            let playbook = playbook.unwrap_or_else(|| config.playbooks.default_playbook.clone());
            let budget = session_budget(&config, max_steps, max_duration_ms);
            let observer = ScriptedObserver::load_json(&fixture)?;

            let mut session = Session::new(set, &playbook, budget)?;
            let conclusion = session.run(&observer).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&conclusion)?);
            } else {
                print!("{}", report::render_conclusion(&conclusion));
            }
        }
        Commands::Poll {
            playbook,
            fixture,
            kind,
            target,
            samples,
            interval_ms,
        } => {
            let set = Arc::new(config.load_playbooks()?);
            let playbook = playbook.unwrap_or_else(|| config.playbooks.default_playbook.clone());
            let observer = ScriptedObserver::load_json(&fixture)?;
            let mut session = Session::new(set, &playbook, config.to_session_budget())?;
            session.observe(&observer, ObservationRequest::survey()).await?;

            let mut budget = config.to_poll_budget();
            if let Some(ms) = interval_ms {
                budget.interval_ms = ms;
            }
            if let Some(n) = samples {
                budget.max_samples = n;
            }
            let request = match &target {
                Some(subject) => ObservationRequest::targeting(kind, subject),
                None => ObservationRequest::of(kind),
            };

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping after the current sample");
                    on_interrupt.cancel();
                }
            });

            let poll = poll_trend(&mut session, &observer, &request, budget, &cancel).await?;
            println!(
                "{} {:?}: {} sample(s), {} attempt(s), {}ms",
                "Polling stopped".bold(),
                poll.stopped,
                poll.samples,
                poll.attempts,
                poll.elapsed_ms
            );
            match session.conclusion() {
                Some(conclusion) => print!("{}", report::render_conclusion(conclusion)),
                None => print!("{}", report::render_hypotheses(session.hypotheses())),
            }
        }
        Commands::Act { action, confirm } => {
            let request = match action {
                ActCommands::Terminate { pid, reason } => {
                    ActionRequest::TerminateProcess { pid, reason }
                }
                ActCommands::Kill { pid } => ActionRequest::KillProcess { pid },
                ActCommands::Disconnect { peer } => ActionRequest::DisconnectPeer { peer },
            };
            let token = confirm
                .map(|phrase| AuthorizationToken::grant(&request, &phrase))
                .transpose()?;

            let gate = ActionGate::new(DryRunActions::new());
            match gate.act(&request, token).await {
                Ok(outcome) => println!("{}", report::render_action(&outcome)),
                Err(e) => {
                    eprintln!("[ERROR] {} (code {})", e.to_string().red(), e.code());
                    eprintln!("Re-run with --confirm \"{}\"", ACTION_CONFIRMATION);
                    bail!("action not performed");
                }
            }
        }
        Commands::InitConfig { path } => {
            Config::save_default(&path)?;
            println!("[OK] Wrote {}", path.display().green());
        }
    }

    Ok(())
}

fn session_budget(
    config: &Config,
    max_steps: Option<u32>,
    max_duration_ms: Option<u64>,
) -> SessionBudget {
    let mut budget = config.to_session_budget();
    if let Some(steps) = max_steps {
        budget.max_steps = steps;
    }
    if let Some(ms) = max_duration_ms {
        budget.max_duration_ms = ms;
    }
    let budget = budget.clamped();
    info!(
        "Session budget: {} step(s), {}ms, {}ms per observation",
        budget.max_steps, budget.max_duration_ms, budget.observation_timeout_ms
    );
    budget
}

fn load_snapshots(path: &Path) -> Result<Vec<MetricSnapshot>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let raws: Vec<RawObservation> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid observations in {}", path.display()))?;
    raws.into_iter()
        .enumerate()
        .map(|(i, raw)| {
            MetricSnapshot::from_raw(raw)
                .with_context(|| format!("{}: observation #{}", path.display(), i + 1))
        })
        .collect()
}
