//! Import orchestration services

mod associations;
mod duplicates;
mod log;
mod orchestrator;
mod processor;
mod results;

pub use associations::{AssociationLinker, LookupResolver};
pub use duplicates::DuplicateMatcher;
pub use log::{ImportLogger, LogLevel};
pub use orchestrator::ImportOrchestrator;
pub use processor::{RecordFlow, RecordProcessor};
pub use results::{ImportRun, ResultAggregator};
