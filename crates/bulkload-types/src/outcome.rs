//! Per-row outcomes and the aggregated import result

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::EntityRef;

/// 1-based position of a record in the original input
///
/// Row 1 is the header the caller stripped, so the first record is row 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowIndex(usize);

impl RowIndex {
    pub const HEADER: RowIndex = RowIndex(1);

    pub fn new(row: usize) -> Self {
        Self(row)
    }

    /// Row of the record at `offset` in the header-stripped input
    pub fn for_record(offset: usize) -> Self {
        Self(offset + 2)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for RowIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a record created a new entity or updated an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportAction {
    Create,
    Update,
}

impl ImportAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportAction::Create => "create",
            ImportAction::Update => "update",
        }
    }
}

impl fmt::Display for ImportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
    Warning,
}

/// Outcome recorded for one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub row_index: RowIndex,
    pub action: ImportAction,
    pub status: OutcomeStatus,
    pub message: String,
}

/// Possible duplicates of a newly created entity, kept for manual review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyMatch {
    pub row_index: RowIndex,
    pub full_name: String,
    /// Set once the new entity has been persisted
    pub created: Option<EntityRef>,
    pub candidates: Vec<EntityRef>,
}

/// Everything an import run reports back to its caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub success: Vec<String>,
    pub warning: Vec<String>,
    pub error: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Row outcomes in reporting order; kept even when the run was rolled back
    pub outcomes: Vec<RecordOutcome>,
    pub fuzzy_matches: Vec<FuzzyMatch>,
    /// The run's changes were discarded by the rollback policy
    pub rolled_back: bool,
}

impl ImportResult {
    pub fn has_errors(&self) -> bool {
        !self.error.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warning.is_empty()
    }

    /// Outcomes reported for one row
    pub fn outcomes_for(&self, row: RowIndex) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(move |o| o.row_index == row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_record_is_row_two() {
        assert_eq!(RowIndex::for_record(0).get(), 2);
        assert_eq!(RowIndex::for_record(4), RowIndex::new(6));
        assert!(RowIndex::HEADER < RowIndex::for_record(0));
    }

    #[test]
    fn test_result_serializes_without_empty_summaries() {
        let result = ImportResult {
            error: vec!["Please limit upload file to 3 line items.".to_string()],
            error_message: Some("1 Company failed to import".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_value(&result).unwrap();

        assert!(json.get("success_message").is_none());
        assert_eq!(json["error_message"], "1 Company failed to import");
        assert_eq!(json["success"], serde_json::json!([]));
    }
}
