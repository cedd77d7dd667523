//! # stratum-compose
//!
//! Composition of typed infrastructure components into an ordered graph of
//! resource nodes.
//!
//! Handles:
//! - **Deferred**: values known only once the backend materializes a node.
//! - **Transform**: per-kind overrides applied before a node is submitted.
//! - **Stack**: the component tree and atomic, ordered node submission.
//! - **Graph**: dependency ordering of the nodes of one component.
//! - **Adopt**: binding components to resources that already exist.
//! - **Link**: named property bags read by runtime code.
//! - **Components**: the concrete `Vpc` and `Postgres` components.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod adopt;
pub mod args;
pub mod backend;
pub mod component;
pub mod components;
pub mod deferred;
pub mod graph;
pub mod link;
pub mod stack;
pub mod transform;
