//! `stratum plan` — Show the resource nodes a stack composes to.

use std::path::PathBuf;

use clap::Args;
use stratum_common::constants::DEFAULT_STACK_FILE;

use crate::output::{self, PlanEntry};
use crate::stack_file::StackFile;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the stack file.
    #[arg(default_value = DEFAULT_STACK_FILE)]
    pub file: PathBuf,

    /// Print the plan as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `plan` command.
///
/// Composes every component against an in-memory backend and lists the
/// submitted nodes in submission order with their dependencies.
///
/// # Errors
///
/// Returns an error if the stack file is invalid or composition fails.
pub fn execute(args: &PlanArgs) -> anyhow::Result<()> {
    let stack_file = StackFile::load(&args.file)?;
    let composed = stack_file.compose()?;
    let entries: Vec<PlanEntry> = composed
        .backend
        .submitted()
        .iter()
        .map(PlanEntry::from_node)
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let project = composed.stack.project();
    println!("Plan for: {} ({} / {})", args.file.display(), project.app, project.stage);
    println!();
    print!("{}", output::render_plan(&entries));
    println!();
    println!(
        "  {} node(s) across {} component(s).",
        entries.len(),
        composed.stack.components().count()
    );
    Ok(())
}
