//! Bulkload Import Engine
//!
//! Loads an ordered batch of records into an entity store, resolving each
//! record to a new or existing entity, wiring its associations and reporting
//! a per-row outcome.
//!
//! # Architecture
//!
//! - **Services**: orchestrator, record processor, association wiring,
//!   duplicate matching, result aggregation and the import log
//! - **Stores**: in-memory and sea-orm backed implementations of `EntityStore`
//! - **Config**: process-wide import settings
//!
//! # Usage
//!
//! ```rust,ignore
//! let store = Arc::new(MemoryStore::new());
//! let orchestrator = ImportOrchestrator::new(ImportConfig::default(), descriptor, store)?;
//! let result = orchestrator.import(ImportRequest::new(records)).await;
//! ```

pub mod config;
pub mod services;
pub mod stores;

pub use config::{ConfigError, ImportConfig};
pub use services::{ImportLogger, ImportOrchestrator, LookupResolver};
pub use stores::{DatabaseStore, MemoryStore};

pub use bulkload_types as types;
