//! Shared data models for log collection

mod collection;
mod depot;
mod log_file;
mod queue;
mod server;
mod task;
mod window;

pub use collection::*;
pub use depot::*;
pub use log_file::*;
pub use queue::*;
pub use server::*;
pub use task::*;
pub use window::*;
