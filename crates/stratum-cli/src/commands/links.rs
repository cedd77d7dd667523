//! `stratum links` — Print resolved link properties.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Args;
use serde_json::Value;
use stratum_common::constants::DEFAULT_STACK_FILE;
use stratum_runtime::state::load_state;

use crate::output;
use crate::stack_file::StackFile;

/// Arguments for the `links` command.
#[derive(Args, Debug)]
pub struct LinksArgs {
    /// Path to the stack file.
    #[arg(default_value = DEFAULT_STACK_FILE)]
    pub file: PathBuf,

    /// Only this component (path such as `Parent/Child` for nested ones).
    pub component: Option<String>,

    /// Print the properties as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `links` command.
///
/// Recomposes the stack to rebuild its link bags, then resolves them
/// against the state written by the last apply.
///
/// # Errors
///
/// Returns an error if composition fails, no state exists, or the named
/// component is not linkable.
pub fn execute(args: &LinksArgs, state_file: Option<&Path>) -> anyhow::Result<()> {
    let stack_file = StackFile::load(&args.file)?;
    let composed = stack_file.compose()?;
    let state = load_state(&stack_file.state_path(&args.file, state_file))?;

    let bags = match &args.component {
        Some(name) => BTreeMap::from([(name.clone(), composed.links.resolve(name, &state)?)]),
        None => composed.links.resolve_all(&state),
    };

    if args.json {
        let json: BTreeMap<&str, Value> = bags
            .iter()
            .map(|(name, bag)| (name.as_str(), output::link_json(bag)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }
    for (name, bag) in &bags {
        print!("{}", output::render_link(name, bag));
    }
    Ok(())
}
