//! Core types and traits for the bulkload import engine
//!
//! This crate provides the foundational abstractions shared by the import
//! engine, its persistence backends and its callers.
//!
//! # Architecture
//!
//! - **Records**: raw input rows as JSON objects
//! - **Descriptor**: static description of the target entity type, its
//!   associations, validations and lifecycle hooks
//! - **Store**: the persistence contract (`EntityStore`, `StoreTransaction`)
//! - **Outcomes**: per-row outcomes and the aggregated `ImportResult`
//! - **Errors**: unified error taxonomy for an import run

pub mod association;
pub mod descriptor;
pub mod error;
pub mod hooks;
pub mod outcome;
pub mod record;
pub mod request;
pub mod store;
pub mod validation;

pub use association::AssociationResolver;
pub use descriptor::{AssociationField, DuplicateCheck, ModelDescriptor};
pub use error::{ImportError, StoreError, StoreResult};
pub use hooks::{GlobalHook, HookFlow, HookResult, InstanceHook, LifecycleHooks, TypeHook};
pub use outcome::{
    FuzzyMatch, ImportAction, ImportResult, OutcomeStatus, RecordOutcome, RowIndex,
};
pub use record::{display_value, is_assignable, is_blank, Record};
pub use request::{ImportParams, ImportRequest};
pub use store::{Criterion, Entity, EntityRef, EntityStore, SaveOutcome, StoreTransaction};
pub use validation::{FieldError, LengthRule, PredicateRule, PresenceRule, ValidationRule};
