//! Per-record processing: resolve, assign, wire, save

use bulkload_types::{
    is_assignable, is_blank, Criterion, DuplicateCheck, Entity, EntityStore, HookFlow,
    ImportAction, ImportError, ImportParams, InstanceHook, ModelDescriptor, Record, RowIndex,
    SaveOutcome, TypeHook,
};
use serde_json::{Map, Value};
use tracing::debug;

use super::associations::AssociationLinker;
use super::duplicates::DuplicateMatcher;
use super::results::{pluralize, ImportRun};
use crate::config::ImportConfig;

/// How processing of one record ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFlow {
    /// The record ran to an outcome (success or reported failure)
    Completed,
    /// A hook asked to skip the record; nothing was reported
    Skipped,
}

/// Imports one record at a time against a store
pub struct RecordProcessor<'a> {
    config: &'a ImportConfig,
    descriptor: &'a ModelDescriptor,
    params: &'a ImportParams,
    store: &'a dyn EntityStore,
}

impl<'a> RecordProcessor<'a> {
    pub fn new(
        config: &'a ImportConfig,
        descriptor: &'a ModelDescriptor,
        params: &'a ImportParams,
        store: &'a dyn EntityStore,
    ) -> Self {
        Self {
            config,
            descriptor,
            params,
            store,
        }
    }

    /// Process one record, reporting its outcome on `run`
    ///
    /// Row-level failures (unresolved association, invalid entity) are
    /// reported and return `Ok`; anything returned as `Err` is left to the
    /// caller to report.
    pub async fn process(
        &self,
        run: &mut ImportRun,
        row: RowIndex,
        mut record: Record,
    ) -> Result<RecordFlow, ImportError> {
        let hooks = &self.descriptor.hooks;

        if self.config.pass_filename {
            if let Some(filename) = &self.params.filename {
                record.insert(
                    self.config.filename_field.clone(),
                    Value::String(filename.clone()),
                );
            }
        }

        if call_type_hook(run, "before_find", hooks.before_find.as_ref(), &mut record)?
            == HookFlow::Skip
        {
            return Ok(RecordFlow::Skipped);
        }

        let missing: Vec<&str> = self
            .params
            .lookup_fields()
            .iter()
            .filter(|field| !record.contains_key(field.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ImportError::Configuration(format!(
                "Missing update lookup field(s): {}",
                missing.join(", ")
            )));
        }

        let Some((mut entity, action)) = self.find_or_build(run, &record).await? else {
            return Ok(RecordFlow::Skipped);
        };
        debug!("Row {}: {} {}", row, action, self.descriptor.model);

        if action == ImportAction::Create && !self.params.skip_fuzzy_search {
            if let Some(check) = &self.descriptor.duplicate_check {
                self.flag_duplicates(run, row, check, &entity, &record).await?;
            }
        }

        if call_instance_hook(
            run,
            "before_associations",
            hooks.before_associations.as_ref(),
            &mut entity,
            &record,
        )? == HookFlow::Skip
        {
            return Ok(RecordFlow::Skipped);
        }

        let linker = AssociationLinker::new(self.store, self.params);
        match linker.wire(self.descriptor, &mut entity, &record).await {
            Ok(()) => {}
            Err(err @ ImportError::AssociationNotFound { .. }) => {
                let label = self.descriptor.label_for(&entity);
                run.results
                    .report_failure(row, action, &label, &err.to_string());
                call_instance_hook(
                    run,
                    "after_association_error",
                    hooks.after_association_error.as_ref(),
                    &mut entity,
                    &record,
                )?;
                return Ok(RecordFlow::Completed);
            }
            Err(err) => return Err(err),
        }

        if call_instance_hook(
            run,
            "before_save",
            hooks.before_save.as_ref(),
            &mut entity,
            &record,
        )? == HookFlow::Skip
        {
            return Ok(RecordFlow::Skipped);
        }

        match self.store.save(self.descriptor, entity).await? {
            SaveOutcome::Saved(mut saved) => {
                let label = self.descriptor.label_for(&saved);
                run.results.report_success(row, action, &label);
                if let Some(created) = saved.reference() {
                    run.attach_created(row, created);
                }
                call_instance_hook(
                    run,
                    "after_save",
                    hooks.after_save.as_ref(),
                    &mut saved,
                    &record,
                )?;
            }
            SaveOutcome::Invalid {
                mut entity,
                errors,
            } => {
                let reason = errors
                    .iter()
                    .map(|e| e.full_message())
                    .collect::<Vec<_>>()
                    .join(", ");
                let label = self.descriptor.label_for(&entity);
                run.results.report_failure(row, action, &label, &reason);
                call_instance_hook(
                    run,
                    "after_save_error",
                    hooks.after_save_error.as_ref(),
                    &mut entity,
                    &record,
                )?;
            }
        }

        Ok(RecordFlow::Completed)
    }

    /// Existing entity matching the lookup fields, or a new one, with attributes assigned
    async fn find_or_build(
        &self,
        run: &mut ImportRun,
        record: &Record,
    ) -> Result<Option<(Entity, ImportAction)>, ImportError> {
        let lookup_fields = self.params.lookup_fields();

        let existing = if lookup_fields.is_empty() {
            None
        } else {
            let criteria: Vec<Criterion> = lookup_fields
                .iter()
                .map(|field| {
                    (
                        field.clone(),
                        record.get(field).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect();
            self.store
                .find_first(&self.descriptor.model, &criteria)
                .await?
        };

        let (mut entity, action) = match existing {
            Some(entity) => (entity, ImportAction::Update),
            None => (Entity::new(self.descriptor.model.clone()), ImportAction::Create),
        };

        if call_instance_hook(
            run,
            "before_attributes",
            self.descriptor.hooks.before_attributes.as_ref(),
            &mut entity,
            record,
        )? == HookFlow::Skip
        {
            return Ok(None);
        }

        entity.assign_attributes(self.assignable_attributes(record, action));
        Ok(Some((entity, action)))
    }

    fn assignable_attributes(&self, record: &Record, action: ImportAction) -> Map<String, Value> {
        let lookup_fields = self.params.lookup_fields();
        record
            .iter()
            .filter(|(field, _)| self.descriptor.has_field(field) && !self.config.is_excluded(field))
            .filter(|(field, _)| {
                action == ImportAction::Create || !lookup_fields.iter().any(|l| l == *field)
            })
            .filter(|(_, value)| is_assignable(value))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }

    /// Warn about existing group members whose name is close to the new entity's
    async fn flag_duplicates(
        &self,
        run: &mut ImportRun,
        row: RowIndex,
        check: &DuplicateCheck,
        entity: &Entity,
        record: &Record,
    ) -> Result<(), ImportError> {
        let Some(raw) = record
            .get(&check.membership_field)
            .filter(|value| !is_blank(value))
        else {
            return Ok(());
        };
        let Some(field) = self.descriptor.many_association(&check.membership_field) else {
            return Ok(());
        };

        let groups = AssociationLinker::new(self.store, self.params)
            .resolve_existing(field, raw)
            .await?;
        let found = DuplicateMatcher::new(self.store, check)
            .find_candidates(row, entity, &groups)
            .await?;

        if let Some(fuzzy) = found {
            let message = format!(
                "Found {} of '{}'",
                pluralize(
                    fuzzy.candidates.len(),
                    "possible duplicate",
                    "possible duplicates"
                ),
                fuzzy.full_name
            );
            run.results
                .report_warning(row, ImportAction::Create, message);
            run.fuzzy_matches.push(fuzzy);
        }
        Ok(())
    }
}

fn call_type_hook(
    run: &mut ImportRun,
    name: &str,
    hook: Option<&TypeHook>,
    record: &mut Record,
) -> Result<HookFlow, ImportError> {
    let Some(hook) = hook else {
        return Ok(HookFlow::Continue);
    };
    if hook.is_legacy() {
        run.report_legacy_hook(name);
    }
    hook.call(record).map_err(|e| ImportError::hook(name, e))
}

fn call_instance_hook(
    run: &mut ImportRun,
    name: &str,
    hook: Option<&InstanceHook>,
    entity: &mut Entity,
    record: &Record,
) -> Result<HookFlow, ImportError> {
    let Some(hook) = hook else {
        return Ok(HookFlow::Continue);
    };
    if hook.is_legacy() {
        run.report_legacy_hook(name);
    }
    hook.call(entity, record)
        .map_err(|e| ImportError::hook(name, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::log::ImportLogger;
    use crate::stores::MemoryStore;
    use bulkload_types::{AssociationField, LifecycleHooks, OutcomeStatus, PresenceRule};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn company() -> ModelDescriptor {
        ModelDescriptor::new("company", "Company")
            .with_fields(["name", "email", "active", "id"])
            .with_validation(PresenceRule::new("name"))
            .with_many_association(AssociationField::new("groups", "group"))
    }

    fn run() -> ImportRun {
        ImportRun::new("company", "Company", Arc::new(ImportLogger::tracing_only()))
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn counter() -> (Arc<AtomicUsize>, InstanceHook) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let hook = InstanceHook::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(HookFlow::Continue)
        });
        (calls, hook)
    }

    #[tokio::test]
    async fn test_create_assigns_false_but_skips_blank_and_excluded() {
        // Arrange
        let store = MemoryStore::new();
        let config = ImportConfig::default();
        let descriptor = company();
        let params = ImportParams::default();
        let processor = RecordProcessor::new(&config, &descriptor, &params, &store);
        let mut run = run();

        // Act
        let flow = processor
            .process(
                &mut run,
                RowIndex::new(2),
                record(json!({"name": "Acme", "email": "", "active": false, "id": 99, "extra": 1})),
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(flow, RecordFlow::Completed);
        let saved = store.all("company").unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].attributes["active"], json!(false));
        assert!(saved[0].attribute("email").is_none());
        assert!(saved[0].attribute("id").is_none());
        assert!(saved[0].attribute("extra").is_none());
        assert_eq!(run.finish().success, vec!["Row 2: Created Acme"]);
    }

    #[tokio::test]
    async fn test_update_keeps_lookup_fields() {
        // Arrange
        let store = MemoryStore::new();
        let mut existing = Entity::new("company");
        existing.attributes.insert("name".into(), json!("Acme"));
        existing.attributes.insert("email".into(), json!("OPS@acme.test"));
        let existing = store.seed(existing).unwrap();
        let config = ImportConfig::default();
        let descriptor = company();
        let params = ImportParams {
            update_if_exists: true,
            update_lookup_fields: vec!["name".to_string()],
            ..Default::default()
        };
        let processor = RecordProcessor::new(&config, &descriptor, &params, &store);
        let mut run = run();

        // Act
        processor
            .process(
                &mut run,
                RowIndex::new(2),
                record(json!({"name": "Acme", "email": "ops@acme.test"})),
            )
            .await
            .unwrap();

        // Assert
        let updated = store.find_by_id("company", existing.id).await.unwrap().unwrap();
        assert_eq!(updated.attributes["email"], json!("ops@acme.test"));
        assert_eq!(store.all("company").unwrap().len(), 1);
        let result = run.finish();
        assert_eq!(result.outcomes[0].action, ImportAction::Update);
        assert_eq!(result.success, vec!["Row 2: Updated Acme"]);
    }

    #[tokio::test]
    async fn test_missing_lookup_field_is_an_error() {
        let store = MemoryStore::new();
        let config = ImportConfig::default();
        let descriptor = company();
        let params = ImportParams {
            update_if_exists: true,
            update_lookup_fields: vec!["email".to_string()],
            ..Default::default()
        };
        let processor = RecordProcessor::new(&config, &descriptor, &params, &store);

        let err = processor
            .process(&mut run(), RowIndex::new(2), record(json!({"name": "Acme"})))
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Configuration error: Missing update lookup field(s): email"
        );
        assert_eq!(store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_entity_reports_field_messages_and_fires_error_hook() {
        // Arrange
        let store = MemoryStore::new();
        let config = ImportConfig::default();
        let (errors_seen, hook) = counter();
        let descriptor =
            company().with_hooks(LifecycleHooks::new().with_after_save_error(hook));
        let params = ImportParams::default();
        let processor = RecordProcessor::new(&config, &descriptor, &params, &store);
        let mut run = run();

        // Act
        processor
            .process(&mut run, RowIndex::new(4), record(json!({"email": "a@b.c"})))
            .await
            .unwrap();

        // Assert
        let result = run.finish();
        assert_eq!(
            result.error,
            vec!["Row 4: Failed to create Company: Name can't be blank"]
        );
        assert_eq!(errors_seen.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_association_error_stops_before_save() {
        // Arrange
        let store = MemoryStore::new();
        let config = ImportConfig::default();
        let (assoc_errors, assoc_hook) = counter();
        let (saves, save_hook) = counter();
        let descriptor = company().with_hooks(
            LifecycleHooks::new()
                .with_after_association_error(assoc_hook)
                .with_before_save(save_hook),
        );
        let params = ImportParams::default();
        let processor = RecordProcessor::new(&config, &descriptor, &params, &store);
        let mut run = run();

        // Act
        processor
            .process(
                &mut run,
                RowIndex::new(2),
                record(json!({"name": "Acme", "groups": "X"})),
            )
            .await
            .unwrap();

        // Assert
        let result = run.finish();
        assert_eq!(
            result.error,
            vec!["Row 2: Failed to create Acme: Association not found: groups with name 'X'"]
        );
        assert_eq!(assoc_errors.load(Ordering::SeqCst), 1);
        assert_eq!(saves.load(Ordering::SeqCst), 0);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_skip_from_before_find_reports_nothing() {
        let store = MemoryStore::new();
        let config = ImportConfig::default();
        let descriptor = company().with_hooks(LifecycleHooks::new().with_before_find(
            TypeHook::new(|record| {
                Ok(if record.contains_key("skip") {
                    HookFlow::Skip
                } else {
                    HookFlow::Continue
                })
            }),
        ));
        let params = ImportParams::default();
        let processor = RecordProcessor::new(&config, &descriptor, &params, &store);
        let mut run = run();

        let flow = processor
            .process(&mut run, RowIndex::new(2), record(json!({"name": "Acme", "skip": true})))
            .await
            .unwrap();

        assert_eq!(flow, RecordFlow::Skipped);
        assert!(run.finish().outcomes.is_empty());
        assert_eq!(store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_filename_is_passed_through_when_enabled() {
        let store = MemoryStore::new();
        let config = ImportConfig::default().with_pass_filename(true);
        let descriptor = company().with_fields(["filename"]);
        let params = ImportParams {
            filename: Some("companies.csv".to_string()),
            ..Default::default()
        };
        let processor = RecordProcessor::new(&config, &descriptor, &params, &store);

        processor
            .process(&mut run(), RowIndex::new(2), record(json!({"name": "Acme"})))
            .await
            .unwrap();

        let saved = store.all("company").unwrap();
        assert_eq!(saved[0].attributes["filename"], json!("companies.csv"));
    }

    #[tokio::test]
    async fn test_hook_failure_propagates() {
        let store = MemoryStore::new();
        let config = ImportConfig::default();
        let descriptor = company().with_hooks(
            LifecycleHooks::new()
                .with_before_save(InstanceHook::new(|_, _| anyhow::bail!("audit unavailable"))),
        );
        let params = ImportParams::default();
        let processor = RecordProcessor::new(&config, &descriptor, &params, &store);

        let err = processor
            .process(&mut run(), RowIndex::new(2), record(json!({"name": "Acme"})))
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::Hook { ref hook, .. } if hook == "before_save"));
    }

    #[tokio::test]
    async fn test_duplicate_warning_does_not_block_create() {
        // Arrange
        let store = MemoryStore::new();
        let mut group = Entity::new("group");
        group.attributes.insert("name".into(), json!("Board"));
        let group = store.seed(group).unwrap();
        let mut jane = Entity::new("company");
        jane.attributes.insert("name".into(), json!("Acme Corp"));
        jane.many_associations
            .insert("groups".into(), vec![group.clone()]);
        let jane = store.seed(jane).unwrap();
        let config = ImportConfig::default();
        let descriptor =
            company().with_duplicate_check(DuplicateCheck::new("groups", ["name"]));
        let params = ImportParams::default();
        let processor = RecordProcessor::new(&config, &descriptor, &params, &store);
        let mut run = run();

        // Act
        processor
            .process(
                &mut run,
                RowIndex::new(3),
                record(json!({"name": "ACME Corp.", "groups": ["Board"]})),
            )
            .await
            .unwrap();

        // Assert
        let result = run.finish();
        assert_eq!(
            result.warning,
            vec!["Row 3: Found 1 possible duplicate of 'ACME Corp.'"]
        );
        assert_eq!(result.success, vec!["Row 3: Created ACME Corp."]);
        assert_eq!(result.fuzzy_matches.len(), 1);
        assert_eq!(result.fuzzy_matches[0].candidates, vec![jane]);
        assert!(result.fuzzy_matches[0].created.is_some());
        assert_eq!(
            result.outcomes.iter().map(|o| o.status).collect::<Vec<_>>(),
            vec![OutcomeStatus::Warning, OutcomeStatus::Success]
        );
    }
}
