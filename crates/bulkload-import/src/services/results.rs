//! Result aggregation for one import run

use std::fmt::Display;
use std::sync::Arc;

use bulkload_types::{
    EntityRef, FuzzyMatch, ImportAction, ImportResult, OutcomeStatus, RecordOutcome, RowIndex,
};

use super::log::{ImportLogger, LogLevel};

/// Accumulates success, warning and error messages across one run
///
/// Lists are append-only; the only removal is [`ResultAggregator::clear_success`],
/// used by the rollback policy.
#[derive(Debug)]
pub struct ResultAggregator {
    display_name: String,
    logger: Arc<ImportLogger>,
    success: Vec<String>,
    warning: Vec<String>,
    error: Vec<String>,
    outcomes: Vec<RecordOutcome>,
}

impl ResultAggregator {
    pub fn new(display_name: impl Into<String>, logger: Arc<ImportLogger>) -> Self {
        Self {
            display_name: display_name.into(),
            logger,
            success: Vec::new(),
            warning: Vec::new(),
            error: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    /// Entity saved for this row
    pub fn report_success(&mut self, row: RowIndex, action: ImportAction, label: &str) {
        let message = match action {
            ImportAction::Create => format!("Created {}", label),
            ImportAction::Update => format!("Updated {}", label),
        };
        self.record(row, action, OutcomeStatus::Success, message);
    }

    /// Row rejected (association not found, validation failure)
    pub fn report_failure(&mut self, row: RowIndex, action: ImportAction, label: &str, reason: &str) {
        let message = format!("Failed to {} {}: {}", action, label, reason);
        self.record(row, action, OutcomeStatus::Error, message);
    }

    /// Row imported, but something needs a human look
    pub fn report_warning(&mut self, row: RowIndex, action: ImportAction, message: impl Into<String>) {
        self.record(row, action, OutcomeStatus::Warning, message.into());
    }

    /// Error not tied to a create/update outcome; `row` is prefixed when known
    pub fn report_general_error(&mut self, row: Option<RowIndex>, message: impl Display) {
        let line = with_row(row, &message.to_string());
        self.logger.log(LogLevel::Error, &line);
        self.error.push(line);
    }

    pub fn report_general_warning(&mut self, message: impl Display) {
        let line = message.to_string();
        self.logger.log(LogLevel::Warn, &line);
        self.warning.push(line);
    }

    pub fn has_errors_or_warnings(&self) -> bool {
        !self.error.is_empty() || !self.warning.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.success.len()
    }

    /// Drop reported successes after their changes were discarded
    pub fn clear_success(&mut self) {
        self.success.clear();
    }

    /// Compute the summaries and hand back the final result
    pub fn finish(self, fuzzy_matches: Vec<FuzzyMatch>, rolled_back: bool) -> ImportResult {
        let success_message = (!self.success.is_empty()).then(|| {
            format!(
                "{} {} successfully imported",
                self.success.len(),
                self.display_name
            )
        });
        let warning_message = (!self.warning.is_empty())
            .then(|| pluralize(self.warning.len(), "warning", "warnings"));
        let error_message = (!self.error.is_empty())
            .then(|| format!("{} {} failed to import", self.error.len(), self.display_name));

        for summary in [&success_message, &warning_message, &error_message]
            .into_iter()
            .flatten()
        {
            self.logger.log(LogLevel::Info, summary);
        }

        ImportResult {
            success: self.success,
            warning: self.warning,
            error: self.error,
            success_message,
            warning_message,
            error_message,
            outcomes: self.outcomes,
            fuzzy_matches,
            rolled_back,
        }
    }

    fn record(&mut self, row: RowIndex, action: ImportAction, status: OutcomeStatus, message: String) {
        let line = with_row(Some(row), &message);
        match status {
            OutcomeStatus::Success => {
                self.logger.log(LogLevel::Info, &line);
                self.success.push(line);
            }
            OutcomeStatus::Warning => {
                self.logger.log(LogLevel::Warn, &line);
                self.warning.push(line);
            }
            OutcomeStatus::Error => {
                self.logger.log(LogLevel::Error, &line);
                self.error.push(line);
            }
        }
        self.outcomes.push(RecordOutcome {
            row_index: row,
            action,
            status,
            message,
        });
    }
}

/// Mutable state owned by a single `import` call
#[derive(Debug)]
pub struct ImportRun {
    pub results: ResultAggregator,
    pub fuzzy_matches: Vec<FuzzyMatch>,
    pub rolled_back: bool,
    model: String,
    legacy_hook_reported: bool,
}

impl ImportRun {
    pub fn new(model: &str, display_name: &str, logger: Arc<ImportLogger>) -> Self {
        Self {
            results: ResultAggregator::new(display_name, logger),
            fuzzy_matches: Vec::new(),
            rolled_back: false,
            model: model.to_string(),
            legacy_hook_reported: false,
        }
    }

    /// Warn about a two-argument hook; only the first one in a run is reported
    pub fn report_legacy_hook(&mut self, hook: &str) {
        if self.legacy_hook_reported {
            return;
        }
        self.legacy_hook_reported = true;
        self.results.report_general_warning(format!(
            "The import hook {}.{} should take only one argument; data may not be imported correctly",
            self.model, hook
        ));
    }

    /// Attach the persisted entity to the duplicate match found for its row
    pub fn attach_created(&mut self, row: RowIndex, created: EntityRef) {
        if let Some(fuzzy) = self
            .fuzzy_matches
            .iter_mut()
            .rev()
            .find(|m| m.row_index == row && m.created.is_none())
        {
            fuzzy.created = Some(created);
        }
    }

    /// Forget entities a rollback discarded; the candidates stay for review
    pub fn discard_created(&mut self) {
        for fuzzy in &mut self.fuzzy_matches {
            fuzzy.created = None;
        }
    }

    pub fn finish(self) -> ImportResult {
        self.results.finish(self.fuzzy_matches, self.rolled_back)
    }
}

fn with_row(row: Option<RowIndex>, message: &str) -> String {
    match row {
        Some(row) => format!("Row {}: {}", row, message),
        None => message.to_string(),
    }
}

pub(crate) fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> ResultAggregator {
        ResultAggregator::new("Company", Arc::new(ImportLogger::tracing_only()))
    }

    #[test]
    fn test_messages_embed_row_index() {
        let mut results = aggregator();

        results.report_success(RowIndex::new(2), ImportAction::Create, "Acme");
        results.report_failure(
            RowIndex::new(3),
            ImportAction::Update,
            "Globex",
            "Name can't be blank",
        );
        results.report_general_error(None, "Please limit upload file to 3 line items.");

        let result = results.finish(Vec::new(), false);
        assert_eq!(result.success, vec!["Row 2: Created Acme"]);
        assert_eq!(
            result.error,
            vec![
                "Row 3: Failed to update Globex: Name can't be blank",
                "Please limit upload file to 3 line items.",
            ]
        );
        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(result.outcomes[0].message, "Created Acme");
        assert_eq!(result.outcomes[1].status, OutcomeStatus::Error);
    }

    #[test]
    fn test_summaries_only_for_non_empty_lists() {
        let mut results = aggregator();
        results.report_success(RowIndex::new(2), ImportAction::Create, "Acme");
        results.report_success(RowIndex::new(3), ImportAction::Update, "Globex");

        let result = results.finish(Vec::new(), false);

        assert_eq!(
            result.success_message.as_deref(),
            Some("2 Company successfully imported")
        );
        assert!(result.warning_message.is_none());
        assert!(result.error_message.is_none());
    }

    #[test]
    fn test_warning_summary_is_pluralized() {
        let mut results = aggregator();
        results.report_general_warning("first");
        let single = results.finish(Vec::new(), false);
        assert_eq!(single.warning_message.as_deref(), Some("1 warning"));

        let mut results = aggregator();
        results.report_general_warning("first");
        results.report_warning(RowIndex::new(4), ImportAction::Create, "second");
        let many = results.finish(Vec::new(), false);
        assert_eq!(many.warning_message.as_deref(), Some("2 warnings"));
    }

    #[test]
    fn test_clear_success_keeps_outcomes() {
        let mut results = aggregator();
        results.report_success(RowIndex::new(2), ImportAction::Create, "Acme");
        results.report_general_error(Some(RowIndex::new(3)), "boom");

        results.clear_success();
        let result = results.finish(Vec::new(), true);

        assert!(result.success.is_empty());
        assert!(result.success_message.is_none());
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.error, vec!["Row 3: boom"]);
        assert!(result.rolled_back);
    }

    #[test]
    fn test_legacy_hook_warning_reported_once() {
        let mut run = ImportRun::new("person", "Person", Arc::new(ImportLogger::tracing_only()));

        run.report_legacy_hook("before_save");
        run.report_legacy_hook("after_save");

        let result = run.finish();
        assert_eq!(result.warning.len(), 1);
        assert!(result.warning[0].contains("person.before_save"));
    }

    #[test]
    fn test_attach_created_fills_matching_row() {
        let mut run = ImportRun::new("person", "Person", Arc::new(ImportLogger::tracing_only()));
        run.fuzzy_matches.push(FuzzyMatch {
            row_index: RowIndex::new(5),
            full_name: "Jane Doe".to_string(),
            created: None,
            candidates: vec![EntityRef::new("person", 1)],
        });

        run.attach_created(RowIndex::new(4), EntityRef::new("person", 9));
        assert!(run.fuzzy_matches[0].created.is_none());

        run.attach_created(RowIndex::new(5), EntityRef::new("person", 10));
        assert_eq!(
            run.fuzzy_matches[0].created,
            Some(EntityRef::new("person", 10))
        );
    }
}
