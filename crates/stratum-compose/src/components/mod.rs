//! Concrete components built on the composition core.

pub mod network;
pub mod postgres;
pub mod vpc;

pub use network::{NetworkConfig, NetworkInput};
pub use postgres::{ExistingPostgres, Postgres, PostgresArgs, PostgresInput};
pub use vpc::{Vpc, VpcArgs, VpcV1};
