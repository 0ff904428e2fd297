//! Import orchestrator service
//!
//! Owns the batch loop: the record ceiling, global hooks, the optional
//! rollback transaction and per-row fault isolation.

use std::sync::Arc;

use bulkload_types::{
    EntityStore, ImportError, ImportRequest, ImportResult, ModelDescriptor, RowIndex,
    StoreTransaction,
};
use tracing::{debug, info, warn};

use super::log::ImportLogger;
use super::processor::{RecordFlow, RecordProcessor};
use super::results::ImportRun;
use crate::config::ImportConfig;

/// Imports batches of records for one model into one store
pub struct ImportOrchestrator {
    config: ImportConfig,
    descriptor: ModelDescriptor,
    store: Arc<dyn EntityStore>,
    logger: Arc<ImportLogger>,
}

impl ImportOrchestrator {
    /// Create an orchestrator, checking the descriptor and opening the import log
    pub fn new(
        config: ImportConfig,
        descriptor: ModelDescriptor,
        store: Arc<dyn EntityStore>,
    ) -> Result<Self, ImportError> {
        let logger = ImportLogger::from_config(&config).map_err(|e| {
            ImportError::Configuration(format!("Failed to open import log: {}", e))
        })?;
        Self::with_logger(config, descriptor, store, Arc::new(logger))
    }

    pub fn with_logger(
        config: ImportConfig,
        descriptor: ModelDescriptor,
        store: Arc<dyn EntityStore>,
        logger: Arc<ImportLogger>,
    ) -> Result<Self, ImportError> {
        descriptor.ensure_disjoint()?;
        info!(
            "Import orchestrator ready for {} (hooks: {:?})",
            descriptor.model,
            descriptor.hooks.declared()
        );
        Ok(Self {
            config,
            descriptor,
            store,
            logger,
        })
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    /// Import every record of the request, in order
    ///
    /// Never fails: every problem is reported in the returned result.
    pub async fn import(&self, request: ImportRequest) -> ImportResult {
        let ImportRequest { records, params } = request;
        let mut run = ImportRun::new(
            &self.descriptor.model,
            &self.descriptor.display_name,
            self.logger.clone(),
        );

        if records.len() > self.config.line_item_limit {
            let err = ImportError::BatchLimitExceeded {
                count: records.len(),
                limit: self.config.line_item_limit,
            };
            warn!(
                "Rejecting import of {} {} records: {}",
                records.len(),
                self.descriptor.model,
                err
            );
            run.results.report_general_error(None, err);
            return run.finish();
        }

        if let Err(err) = params.validate() {
            run.results.report_general_error(None, err);
            return run.finish();
        }

        info!(
            "Importing {} {} record(s) (update_if_exists: {})",
            records.len(),
            self.descriptor.model,
            params.update_if_exists
        );

        if let Some(hook) = &self.descriptor.hooks.before_import {
            if let Err(e) = hook.call() {
                run.results
                    .report_general_error(None, ImportError::hook("before_import", e));
                return run.finish();
            }
        }

        let txn = if self.config.rollback_on_error {
            match self.store.begin().await {
                Ok(Some(txn)) => Some(txn),
                Ok(None) => {
                    warn!(
                        "Rollback on error requested but the store is not transactional; changes will be kept"
                    );
                    None
                }
                Err(e) => {
                    run.results.report_general_error(
                        None,
                        format!("Failed to start import transaction: {}", e),
                    );
                    return run.finish();
                }
            }
        } else {
            None
        };

        {
            let store: &dyn EntityStore = match &txn {
                Some(txn) => txn.as_store(),
                None => self.store.as_ref(),
            };
            let processor = RecordProcessor::new(&self.config, &self.descriptor, &params, store);

            for (offset, record) in records.into_iter().enumerate() {
                let row = RowIndex::for_record(offset);
                match processor.process(&mut run, row, record).await {
                    Ok(RecordFlow::Completed) => {}
                    Ok(RecordFlow::Skipped) => debug!("Row {}: skipped by hook", row),
                    Err(err) => run
                        .results
                        .report_general_error(Some(row), format!("Error during import: {}", err)),
                }
            }
        }

        if let Some(txn) = txn {
            self.finish_transaction(&mut run, txn).await;
        }

        if let Some(hook) = &self.descriptor.hooks.after_import {
            if let Err(e) = hook.call() {
                run.results
                    .report_general_error(None, ImportError::hook("after_import", e));
            }
        }

        let result = run.finish();
        info!(
            "Import of {} finished: {} success, {} warning, {} error{}",
            self.descriptor.model,
            result.success.len(),
            result.warning.len(),
            result.error.len(),
            if result.rolled_back { " (rolled back)" } else { "" }
        );
        result
    }

    /// Commit the run, or roll it back when anything went wrong
    async fn finish_transaction(&self, run: &mut ImportRun, txn: Box<dyn StoreTransaction>) {
        if run.results.has_errors_or_warnings() {
            debug!(
                "Rolling back {} successful row(s)",
                run.results.success_count()
            );
            run.results.clear_success();
            run.discard_created();
            run.rolled_back = true;
            if let Err(e) = txn.rollback().await {
                run.results
                    .report_general_error(None, format!("Failed to roll back import: {}", e));
            }
        } else if let Err(e) = txn.commit().await {
            run.results
                .report_general_error(None, format!("Failed to commit import: {}", e));
        }
    }
}
