//! # docseq-engine: Allocator Engine for docseq
//!
//! The in-process API business code uses to number its documents, and the
//! background worker that keeps abandoned numbers from leaving gaps.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Engine Architecture                              │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Allocator (Facade)                          │  │
//! │  │                                                                  │  │
//! │  │  generate / confirm / cancel / release / lookup / snapshot      │  │
//! │  └──────┬──────────────────────┬──────────────────────┬────────────┘  │
//! │         ▼                      ▼                      ▼                │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ PrefixRegistry │  │  BucketLocks   │  │  docseq-db             │    │
//! │  │ BranchDirectory│  │                │  │                        │    │
//! │  │ (TTL cache)    │  │ one mutex per  │  │ counters, reservations │    │
//! │  │                │  │ bucket         │  │ reclaim tasks          │    │
//! │  └────────────────┘  └────────────────┘  └───────────▲────────────┘    │
//! │                                                      │                 │
//! │  ┌───────────────────────────────────────────────────┴─────────────┐  │
//! │  │                      ReclaimWorker                               │  │
//! │  │  Spawned as a Tokio task; fires due reclaim tasks, retries       │  │
//! │  │  failures with exponential backoff                               │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`allocator`] - The `Allocator` facade
//! - [`cache`] - TTL cache shared by the registries
//! - [`clock`] - System and manual clocks
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Engine error types
//! - [`locks`] - Per-bucket async locks
//! - [`reclaimer`] - Background reclaim worker
//! - [`registry`] - Prefix registry and branch directory
//!
//! ## Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use docseq_core::CallerContext;
//! use docseq_db::Database;
//! use docseq_engine::{Allocator, EngineConfig, ReclaimWorker, SystemClock};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let (worker, _handle) = ReclaimWorker::new(db.clone(), Arc::new(SystemClock), config.reclaimer.clone());
//! tokio::spawn(worker.run());
//!
//! let allocator = Allocator::new(db, &config);
//! let caller = CallerContext::new(1);
//! let code = allocator.generate("Purchase Order", &caller, None).await?;
//! allocator.confirm("Purchase Order", &code, &caller, None).await?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocator;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod locks;
pub mod reclaimer;
pub mod registry;

// =============================================================================
// Re-exports
// =============================================================================

pub use allocator::Allocator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, ReclaimerSettings};
pub use error::{AllocError, AllocResult, ConfigError, WorkerError};
pub use reclaimer::{ReclaimStats, ReclaimWorker, ReclaimWorkerHandle};
pub use registry::{BranchDirectory, PrefixRegistry};
