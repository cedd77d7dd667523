//! Persistent state management.
//!
//! Keeps the outputs of every materialized node together with the run that
//! produced them, and serves them to deferred values as an output source.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratum_common::config::ProjectContext;
use stratum_common::error::{Result, StratumError};
use stratum_common::types::Urn;
use stratum_compose::deferred::{FieldState, OutputRef, OutputSource, OutputTable, ResolutionError};
use uuid::Uuid;

/// Outputs of one app/stage and the run that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateStore {
    /// App and stage the state belongs to.
    pub project: ProjectContext,
    /// Identifier of the last apply.
    pub run_id: Option<Uuid>,
    /// When the last apply started.
    pub applied_at: Option<DateTime<Utc>>,
    outputs: OutputTable,
}

impl StateStore {
    /// Creates an empty state for `project`.
    #[must_use]
    pub fn new(project: ProjectContext) -> Self {
        Self {
            project,
            run_id: None,
            applied_at: None,
            outputs: OutputTable::new(),
        }
    }

    /// Stamps a new run and returns its id.
    pub fn begin_run(&mut self) -> Uuid {
        let run_id = Uuid::new_v4();
        self.run_id = Some(run_id);
        self.applied_at = Some(Utc::now());
        run_id
    }

    /// Records the outputs of `urn`.
    pub fn record_ready(&mut self, urn: Urn, fields: BTreeMap<String, Value>) {
        self.outputs.record_ready(urn, fields);
    }

    /// Records that `urn` failed.
    pub fn record_failed(&mut self, urn: Urn, error: ResolutionError) {
        self.outputs.record_failed(urn, error);
    }

    /// Returns the recorded outputs.
    #[must_use]
    pub const fn outputs(&self) -> &OutputTable {
        &self.outputs
    }
}

impl OutputSource for StateStore {
    fn field(&self, output: &OutputRef) -> FieldState {
        self.outputs.field(output)
    }
}

/// Loads state from disk.
///
/// # Errors
///
/// Returns an error if the file is missing, unreadable, or malformed.
pub fn load_state(path: &Path) -> Result<StateStore> {
    tracing::debug!(path = %path.display(), "loading state");
    if !path.exists() {
        return Err(StratumError::NotFound {
            kind: "state file",
            id: path.display().to_string(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|e| StratumError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Persists state to disk atomically.
///
/// Writes to a sibling temporary file first, then renames it over `path`.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_state(path: &Path, state: &StateStore) -> Result<()> {
    tracing::debug!(path = %path.display(), nodes = state.outputs.len(), "saving state");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StratumError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let json = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| StratumError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| StratumError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stratum_compose::deferred::{Deferred, Resolution};

    use super::*;

    fn urn(name: &str) -> Urn {
        Urn::new("shop", "dev", "aws:rds/instance:Instance", name)
    }

    #[test]
    fn save_then_load_keeps_outputs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("state.json");

        let mut state = StateStore::new(ProjectContext::new("shop", "dev"));
        let run = state.begin_run();
        state.record_ready(urn("Db"), BTreeMap::from([("port".to_string(), json!(5432))]));
        state.record_failed(urn("Replica"), ResolutionError::new("Replica", "quota exceeded"));
        save_state(&path, &state).expect("save");

        let loaded = load_state(&path).expect("load");
        assert_eq!(loaded, state);
        assert_eq!(loaded.run_id, Some(run));
        let port: Deferred<u16> = Deferred::output(urn("Db"), "port");
        assert_eq!(port.poll(&loaded), Resolution::Ready(5432));
    }

    #[test]
    fn missing_state_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_state(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, StratumError::NotFound { .. }));
    }

    #[test]
    fn malformed_state_is_a_serialization_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").expect("write");
        assert!(matches!(load_state(&path), Err(StratumError::Serialization { .. })));
    }
}
