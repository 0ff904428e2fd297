//! In-memory entity store with snapshot transactions

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bulkload_types::{
    Criterion, Entity, EntityRef, EntityStore, ModelDescriptor, SaveOutcome, StoreError,
    StoreResult, StoreTransaction,
};

#[derive(Debug, Clone)]
struct StoreState {
    next_id: i64,
    entities: BTreeMap<i64, Entity>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            next_id: 1,
            entities: BTreeMap::new(),
        }
    }
}

impl StoreState {
    fn find_first(&self, model: &str, criteria: &[Criterion]) -> Option<Entity> {
        self.entities
            .values()
            .find(|entity| entity.model == model && entity.matches(criteria))
            .cloned()
    }

    fn find_by_id(&self, model: &str, id: i64) -> Option<Entity> {
        self.entities
            .get(&id)
            .filter(|entity| entity.model == model)
            .cloned()
    }

    fn find_by_association(&self, model: &str, field: &str, targets: &[EntityRef]) -> Vec<Entity> {
        self.entities
            .values()
            .filter(|entity| entity.model == model)
            .filter(|entity| {
                entity
                    .associated(field)
                    .into_iter()
                    .any(|target| targets.contains(target))
            })
            .cloned()
            .collect()
    }

    fn insert(&mut self, mut entity: Entity) -> Entity {
        let id = match entity.id {
            Some(id) => {
                self.next_id = self.next_id.max(id + 1);
                id
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };
        entity.id = Some(id);
        self.entities.insert(id, entity.clone());
        entity
    }

    fn save(&mut self, descriptor: &ModelDescriptor, entity: Entity) -> SaveOutcome {
        let errors = descriptor.validate(&entity);
        if !errors.is_empty() {
            return SaveOutcome::Invalid { entity, errors };
        }
        SaveOutcome::Saved(self.insert(entity))
    }
}

fn read(state: &RwLock<StoreState>) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
    state
        .read()
        .map_err(|_| StoreError::Internal("memory store lock poisoned".to_string()))
}

fn write(state: &RwLock<StoreState>) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
    state
        .write()
        .map_err(|_| StoreError::Internal("memory store lock poisoned".to_string()))
}

/// Entity store kept in process memory
///
/// Clones share the same data. Transactions work on a snapshot that replaces
/// the shared data on commit, so writes made outside an open transaction are
/// lost when it commits. Only one transaction should be open at a time.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
    transactional: bool,
    operations: Arc<AtomicUsize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            transactional: true,
            operations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Store whose `begin` returns `None`
    pub fn non_transactional() -> Self {
        Self {
            transactional: false,
            ..Self::new()
        }
    }

    /// Insert an entity directly, bypassing validation
    pub fn seed(&self, entity: Entity) -> StoreResult<EntityRef> {
        let stored = write(&self.state)?.insert(entity);
        stored
            .reference()
            .ok_or_else(|| StoreError::Internal("seeded entity has no id".to_string()))
    }

    /// Every stored entity of `model`, by id
    pub fn all(&self, model: &str) -> StoreResult<Vec<Entity>> {
        Ok(read(&self.state)?
            .entities
            .values()
            .filter(|entity| entity.model == model)
            .cloned()
            .collect())
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(read(&self.state)?.entities.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of `EntityStore` calls served, including through transactions
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_first(&self, model: &str, criteria: &[Criterion]) -> StoreResult<Option<Entity>> {
        self.count();
        Ok(read(&self.state)?.find_first(model, criteria))
    }

    async fn find_by_id(&self, model: &str, id: i64) -> StoreResult<Option<Entity>> {
        self.count();
        Ok(read(&self.state)?.find_by_id(model, id))
    }

    async fn find_by_association(
        &self,
        model: &str,
        field: &str,
        targets: &[EntityRef],
    ) -> StoreResult<Vec<Entity>> {
        self.count();
        Ok(read(&self.state)?.find_by_association(model, field, targets))
    }

    async fn save(&self, descriptor: &ModelDescriptor, entity: Entity) -> StoreResult<SaveOutcome> {
        self.count();
        Ok(write(&self.state)?.save(descriptor, entity))
    }

    async fn begin(&self) -> StoreResult<Option<Box<dyn StoreTransaction>>> {
        self.count();
        if !self.transactional {
            return Ok(None);
        }
        let snapshot = read(&self.state)?.clone();
        Ok(Some(Box::new(MemoryTransaction {
            parent: self.state.clone(),
            working: RwLock::new(snapshot),
            operations: self.operations.clone(),
        })))
    }
}

/// Snapshot of a [`MemoryStore`]; committing replaces the store's data with it
///
/// Last writer wins: anything saved to the store itself after `begin` is
/// overwritten by the commit.
pub struct MemoryTransaction {
    parent: Arc<RwLock<StoreState>>,
    working: RwLock<StoreState>,
    operations: Arc<AtomicUsize>,
}

impl MemoryTransaction {
    fn count(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl EntityStore for MemoryTransaction {
    async fn find_first(&self, model: &str, criteria: &[Criterion]) -> StoreResult<Option<Entity>> {
        self.count();
        Ok(read(&self.working)?.find_first(model, criteria))
    }

    async fn find_by_id(&self, model: &str, id: i64) -> StoreResult<Option<Entity>> {
        self.count();
        Ok(read(&self.working)?.find_by_id(model, id))
    }

    async fn find_by_association(
        &self,
        model: &str,
        field: &str,
        targets: &[EntityRef],
    ) -> StoreResult<Vec<Entity>> {
        self.count();
        Ok(read(&self.working)?.find_by_association(model, field, targets))
    }

    async fn save(&self, descriptor: &ModelDescriptor, entity: Entity) -> StoreResult<SaveOutcome> {
        self.count();
        Ok(write(&self.working)?.save(descriptor, entity))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    fn as_store(&self) -> &dyn EntityStore {
        self
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        let working = this
            .working
            .into_inner()
            .map_err(|_| StoreError::Internal("memory transaction lock poisoned".to_string()))?;
        *write(&this.parent)? = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
