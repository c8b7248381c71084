//! logdepot-collect - Server log collection engine
//!
//! Collects a server's rotated and live logs into zip bundles and uploads
//! them to a depot, keeping one `LogFile` record per bundle so that a day
//! already collected is never collected twice.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       LogCollector                          │
//! │                                                            │
//! │  ┌────────────────┐ ┌────────────────┐ ┌────────────────┐  │
//! │  │PatternResolver │ │ LogDateScanner │ │LogFileRegistry │  │
//! │  │ (globs)        │ │ (time windows) │ │ (dedup)        │  │
//! │  └────────────────┘ └────────────────┘ └────────────────┘  │
//! │                          │                                 │
//! │               ┌──────────┴──────────┐                      │
//! │               │ Archiver │ Transport │                     │
//! │               │ (zip)    │ (depot)   │                     │
//! │               └─────────────────────┘                      │
//! └────────────────────────────────────────────────────────────┘
//!            ▲                                   │
//!   QueueWorker ◀── WorkQueue (single flight) ◀──┘ request_log_collection
//! ```

pub mod archive;
pub mod collector;
pub mod config;
pub mod depot;
pub mod error;
pub mod memory;
pub mod patterns;
pub mod queue;
pub mod registry;
pub mod window;
pub mod worker;

pub use archive::{ArchiveSummary, Archiver, ZipArchiver};
pub use collector::{CleanupSummary, LogCollector, LogRequest, Stores};
pub use config::{CollectionConfig, DepotConfig, QueueConfig};
pub use depot::{DepotTransport, FileSystemDepot};
pub use error::{CollectError, CollectResult, StepError};
pub use memory::{MemoryDepotStore, MemoryLogFileStore, MemoryTaskStore};
pub use patterns::{ConfiguredDataDir, DataDirLocator, PatternResolver};
pub use queue::{DispatchOutcome, WorkQueue};
pub use registry::{LogFileRegistry, Lookup};
pub use window::{EvmLogScanner, LogDateScanner};
pub use worker::{run_scheduled_requests, Delivery, QueueWorker};
