//! `EntityStore` implementations

mod database;
mod memory;

pub use database::{DatabaseStore, DatabaseTransactionStore};
pub use memory::{MemoryStore, MemoryTransaction};
