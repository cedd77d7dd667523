//! CLI command definitions and dispatch.

pub mod apply;
pub mod links;
pub mod plan;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Stratum — typed infrastructure components with deferred outputs.
#[derive(Parser, Debug)]
#[command(name = "stratum", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to the state file, overriding the stack file's `state_file`.
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the resource nodes a stack file composes to, in order.
    Plan(plan::PlanArgs),
    /// Materialize the stack with the simulated provider and write state.
    Apply(apply::ApplyArgs),
    /// Print resolved link properties from the last apply.
    Links(links::LinksArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let state_file = cli.state_file.as_deref();
    match cli.command {
        Command::Plan(args) => plan::execute(&args),
        Command::Apply(args) => apply::execute(&args, state_file),
        Command::Links(args) => links::execute(&args, state_file),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn links_takes_file_then_component() {
        let cli = Cli::try_parse_from(["stratum", "links", "infra.yaml", "MyDatabase", "--json"])
            .expect("parse");
        let Command::Links(args) = cli.command else {
            panic!("expected links");
        };
        assert_eq!(args.file, PathBuf::from("infra.yaml"));
        assert_eq!(args.component.as_deref(), Some("MyDatabase"));
        assert!(args.json);
    }

    #[test]
    fn apply_collects_fault_targets() {
        let cli = Cli::try_parse_from([
            "stratum",
            "--state-file",
            "/tmp/state.json",
            "apply",
            "--fail",
            "DbInstance",
            "--fail",
            "NetVpc",
        ])
        .expect("parse");
        assert_eq!(cli.state_file, Some(PathBuf::from("/tmp/state.json")));
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.fail, vec!["DbInstance", "NetVpc"]);
        assert_eq!(args.file, PathBuf::from("stratum.yaml"));
    }
}
