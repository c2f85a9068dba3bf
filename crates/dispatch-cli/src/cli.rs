//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Decentralized courier dispatch by agent negotiation.
#[derive(Parser, Debug, Clone)]
#[command(name = "dispatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Negotiate a scenario until quiescent and export the schedules.
    Run(RunArgs),
}

/// Arguments for `dispatch run`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Scenario JSON with courier and order records.
    #[arg(short, long)]
    pub scenario: PathBuf,

    /// Dispatch configuration JSON.
    #[arg(short, long, env = "DISPATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// File receiving the exported schedules; stdout when omitted.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Read commands from stdin after the scenario has settled.
    #[arg(short, long)]
    pub interactive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_help_does_not_panic() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run_with_scenario_only() {
        let cli = Cli::parse_from(["dispatch", "run", "--scenario", "city.json"]);
        let Commands::Run(args) = cli.command;
        assert_eq!(args.scenario, PathBuf::from("city.json"));
        assert!(args.out.is_none());
        assert!(!args.interactive);
    }

    #[test]
    fn parse_run_with_everything() {
        let cli = Cli::parse_from([
            "dispatch",
            "run",
            "-s",
            "city.json",
            "-c",
            "tuned.json",
            "-o",
            "result.json",
            "--interactive",
        ]);
        let Commands::Run(args) = cli.command;
        assert_eq!(args.config, Some(PathBuf::from("tuned.json")));
        assert_eq!(args.out, Some(PathBuf::from("result.json")));
        assert!(args.interactive);
    }

    #[test]
    fn run_requires_scenario() {
        assert!(Cli::try_parse_from(["dispatch", "run"]).is_err());
    }
}
