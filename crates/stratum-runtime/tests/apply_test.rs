//! End-to-end tests: compose components, apply them with the simulated
//! provider, and read their link bags from the resulting state.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;

use serde_json::json;
use stratum_common::config::ProjectContext;
use stratum_compose::backend::memory::MemoryBackend;
use stratum_compose::components::postgres::{INSTANCE, REPLICA, SUBNET_GROUP};
use stratum_compose::components::{Postgres, PostgresArgs, Vpc, VpcArgs};
use stratum_compose::deferred::Resolution;
use stratum_compose::stack::Stack;
use stratum_runtime::engine::Engine;
use stratum_runtime::links::LinkRegistry;
use stratum_runtime::provider::SimulatedProvider;
use stratum_runtime::state::{StateStore, load_state, save_state};

struct Deployment {
    backend: Arc<MemoryBackend>,
    db: Postgres,
    registry: LinkRegistry,
}

fn compose(replicas: u32) -> Deployment {
    let backend = Arc::new(MemoryBackend::new());
    let mut stack = Stack::new(ProjectContext::new("shop", "dev"), backend.clone());
    let vpc = Vpc::new(&mut stack, "Net", VpcArgs::default()).expect("vpc");
    let db = Postgres::new(&mut stack, "MyDatabase", PostgresArgs::new(&vpc).replicas(replicas))
        .expect("postgres");
    let mut registry = LinkRegistry::new();
    registry.register(&vpc);
    registry.register(&db);
    Deployment { backend, db, registry }
}

fn engine() -> Engine {
    Engine::new(Arc::new(SimulatedProvider::new()))
}

#[test]
fn apply_resolves_every_link_bag() {
    let deployment = compose(0);
    let mut state = StateStore::new(ProjectContext::new("shop", "dev"));
    let report = engine().apply(&deployment.backend.submitted(), &mut state);
    assert!(report.is_success(), "failed: {:?}", report.failed);

    let bag = deployment
        .registry
        .resolve("MyDatabase", &state)
        .expect("known")
        .ready()
        .expect("resolved");
    let host = bag["host"].as_str().expect("host");
    assert!(host.starts_with("shop-dev-mydatabase."), "got: {host}");
    assert!(!host.contains(':'));
    assert_eq!(bag["port"], json!(5432));
    assert_eq!(bag["username"], json!("postgres"));
    assert_eq!(bag["database"], json!("shop"));
    assert_eq!(bag["password"].as_str().map(str::len), Some(32));

    let net = deployment.registry.resolve("Net", &state).expect("known").ready().expect("resolved");
    assert_eq!(net["private_subnets"].as_array().map(Vec::len), Some(2));
}

#[test]
fn failed_subnet_group_poisons_instance_and_replicas() {
    let deployment = compose(2);
    let subnet_group = deployment.backend.submitted_of(&SUBNET_GROUP).remove(0);
    let mut state = StateStore::new(ProjectContext::new("shop", "dev"));
    let report = engine()
        .with_fault(subnet_group.urn.clone())
        .apply(&deployment.backend.submitted(), &mut state);

    assert!(!report.is_success());
    let failed: Vec<&str> = report.failed.iter().map(|(urn, _)| urn.name()).collect();
    assert_eq!(
        failed,
        vec![
            "MyDatabaseSubnetGroup",
            "MyDatabaseInstance",
            "MyDatabaseReplica0",
            "MyDatabaseReplica1",
        ]
    );
    assert!(report.failed.iter().all(|(_, err)| err.origin() == subnet_group.urn.as_str()));

    match deployment.db.host().poll(&state) {
        Resolution::Failed(err) => assert_eq!(err.origin(), subnet_group.urn.as_str()),
        other => panic!("expected failure, got {other:?}"),
    }
    for host in deployment.db.replica_hosts() {
        assert!(host.poll(&state).is_failed());
    }
    // Independent nodes are still created.
    assert!(report.created.iter().any(|urn| urn.name() == "MyDatabasePassword"));
    assert_eq!(deployment.backend.submitted_of(&INSTANCE).len(), 1);
    assert_eq!(deployment.backend.submitted_of(&REPLICA).len(), 2);
}

#[test]
fn persisted_state_resolves_a_fresh_composition() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(".stratum").join("state.json");

    let first = compose(1);
    let mut state = StateStore::new(ProjectContext::new("shop", "dev"));
    let report = engine().apply(&first.backend.submitted(), &mut state);
    assert!(report.is_success());
    save_state(&path, &state).expect("save");

    let second = compose(1);
    let loaded = load_state(&path).expect("load");
    assert_eq!(loaded.run_id, Some(report.run_id));
    let replica = second.db.replica_hosts()[0].poll(&loaded).ready().expect("replica host");
    assert!(replica.starts_with("shop-dev-mydatabasereplica0."), "got: {replica}");
    assert_eq!(
        second.registry.resolve("MyDatabase", &loaded).expect("known"),
        first.registry.resolve("MyDatabase", &state).expect("known")
    );
}
