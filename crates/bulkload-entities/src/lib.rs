//! Database entities backing the bulkload database store
//!
//! Entities are stored schemaless: `import_entities` holds the attribute and
//! association payloads as JSON, and `import_entity_fields` indexes every
//! attribute value and association reference so equality lookups and
//! membership searches can run in SQL.

pub mod import_entities;
pub mod import_entity_fields;

/// Timestamp type used by every entity
pub type DBDateTime = chrono::DateTime<chrono::Utc>;
