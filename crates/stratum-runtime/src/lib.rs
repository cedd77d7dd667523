//! Stand-in provisioning engine for the Stratum composition layer.
//!
//! Materializes submitted resource nodes through a [`provider::Provider`],
//! records their outputs in a [`state::StateStore`], and resolves link
//! bags against that state.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod engine;
pub mod links;
pub mod provider;
pub mod state;
