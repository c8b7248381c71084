//! logdepot-core - Core models and store traits for server log collection
//!
//! This crate holds the records the collection engine reads and writes
//! (log files, tasks, depots, queue messages), the naming rules that must
//! stay stable across releases, and the storage traits the engine is
//! written against. Persistence itself lives behind those traits.

pub mod error;
pub mod models;
pub mod naming;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use models::*;
pub use store::{DepotStore, LogFileStore, TaskStore};
