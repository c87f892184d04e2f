//! CLI - Command-line argument parsing
//!
//! Defines the CLI structure using clap. Execution lives in main.rs.

use clap::{Parser, Subcommand};
use ergodoc_shared::SnapshotKind;
use std::path::PathBuf;

/// ergodoc CLI
#[derive(Parser)]
#[command(name = "ergodoc")]
#[command(about = "Diagnostic playbooks for Ergo actor nodes", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (overrides /etc/ergodoc/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// List playbooks and their rules in priority order
    Playbooks,

    /// Evaluate a playbook against recorded observations (JSON array)
    Evaluate {
        #[arg(long)]
        playbook: Option<String>,

        #[arg(long)]
        snapshots: PathBuf,

        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Run a full session against recorded observations
    Run {
        #[arg(long)]
        playbook: Option<String>,

        #[arg(long)]
        fixture: PathBuf,

        /// Observation requests allowed (capped at 64)
        #[arg(long)]
        max_steps: Option<u32>,

        /// Wall-clock budget in milliseconds (capped at 10 minutes)
        #[arg(long)]
        max_duration_ms: Option<u64>,

        /// Output JSON only
        #[arg(long)]
        json: bool,
    },

    /// Survey, then sample one observation repeatedly; Ctrl-C stops early
    Poll {
        #[arg(long)]
        playbook: Option<String>,

        #[arg(long)]
        fixture: PathBuf,

        #[arg(long, value_parser = parse_kind)]
        kind: SnapshotKind,

        /// Subject to follow (pid, node, peer or event)
        #[arg(long)]
        target: Option<String>,

        #[arg(long)]
        samples: Option<u32>,

        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Perform an action (dry run). Requires --confirm
    Act {
        #[command(subcommand)]
        action: ActCommands,

        /// Confirmation phrase: "I CONFIRM (apply action)"
        #[arg(long, global = true)]
        confirm: Option<String>,
    },

    /// Write a default config file
    InitConfig { path: PathBuf },
}

/// Action subcommands
#[derive(Subcommand)]
pub enum ActCommands {
    /// Ask a process to exit
    Terminate {
        #[arg(long)]
        pid: String,

        #[arg(long, default_value = "normal")]
        reason: String,
    },

    /// Kill a process
    Kill {
        #[arg(long)]
        pid: String,
    },

    /// Disconnect a peer node
    Disconnect {
        #[arg(long)]
        peer: String,
    },
}

fn parse_kind(s: &str) -> Result<SnapshotKind, String> {
    SnapshotKind::ALL
        .into_iter()
        .find(|k| k.as_str() == s)
        .ok_or_else(|| format!("unknown observation kind '{}'", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "ergodoc",
            "run",
            "--fixture",
            "demo.json",
            "--max-steps",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                max_steps, playbook, ..
            } => {
                assert_eq!(max_steps, Some(3));
                assert!(playbook.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("network"), Ok(SnapshotKind::Network));
        assert!(parse_kind("disk").is_err());
    }

    #[test]
    fn test_act_confirm_is_optional() {
        let cli = Cli::try_parse_from(["ergodoc", "act", "terminate", "--pid", "<A.0.1>"]).unwrap();
        match cli.command {
            Commands::Act { confirm, .. } => assert!(confirm.is_none()),
            _ => panic!("expected act"),
        }
    }
}
