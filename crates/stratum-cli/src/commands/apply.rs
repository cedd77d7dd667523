//! `stratum apply` — Materialize a stack with the simulated provider.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail};
use clap::Args;
use stratum_common::constants::DEFAULT_STACK_FILE;
use stratum_runtime::engine::Engine;
use stratum_runtime::provider::SimulatedProvider;
use stratum_runtime::state::{StateStore, save_state};

use crate::stack_file::StackFile;

/// Arguments for the `apply` command.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Path to the stack file.
    #[arg(default_value = DEFAULT_STACK_FILE)]
    pub file: PathBuf,

    /// Make the named node (logical name or URN) fail.
    #[arg(long, value_name = "NODE")]
    pub fail: Vec<String>,

    /// Region embedded in simulated endpoints.
    #[arg(long, default_value = "us-east-1")]
    pub region: String,
}

/// Executes the `apply` command.
///
/// State is written even when nodes fail, so that `stratum links` can
/// report which outputs are unavailable.
///
/// # Errors
///
/// Returns an error if composition fails, a `--fail` target is unknown,
/// state cannot be written, or any node fails.
pub fn execute(args: &ApplyArgs, state_file: Option<&Path>) -> anyhow::Result<()> {
    let stack_file = StackFile::load(&args.file)?;
    let composed = stack_file.compose()?;
    let nodes = composed.backend.submitted();

    let provider = SimulatedProvider::new().with_region(args.region.clone());
    let mut engine = Engine::new(Arc::new(provider));
    for target in &args.fail {
        let node = nodes
            .iter()
            .find(|n| n.name == *target || n.urn.as_str() == target)
            .ok_or_else(|| anyhow!("--fail: no node named `{target}` in {}", args.file.display()))?;
        engine = engine.with_fault(node.urn.clone());
    }

    let mut state = StateStore::new(composed.stack.project().clone());
    let report = engine.apply(&nodes, &mut state);
    let path = stack_file.state_path(&args.file, state_file);
    save_state(&path, &state)?;

    for urn in &report.created {
        println!("  + {}", urn.name());
    }
    for (urn, err) in &report.failed {
        println!("  ! {} ({err})", urn.name());
    }
    println!();
    println!(
        "  {} created, {} failed. State written to {}",
        report.created.len(),
        report.failed.len(),
        path.display()
    );

    if !report.is_success() {
        bail!("{} of {} node(s) failed", report.failed.len(), nodes.len());
    }
    Ok(())
}
