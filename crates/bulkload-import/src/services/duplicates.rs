//! Near-duplicate detection for newly created group members

use bulkload_types::{
    DuplicateCheck, Entity, EntityRef, EntityStore, FuzzyMatch, RowIndex, StoreResult,
};
use strsim::jaro_winkler;
use tracing::debug;

/// Case-insensitive Jaro-Winkler similarity between two names
pub fn name_similarity(a: &str, b: &str) -> f64 {
    jaro_winkler(&a.to_lowercase(), &b.to_lowercase())
}

/// Searches the members of a set of groups for names close to a new entity's
pub struct DuplicateMatcher<'a> {
    store: &'a dyn EntityStore,
    check: &'a DuplicateCheck,
}

impl<'a> DuplicateMatcher<'a> {
    pub fn new(store: &'a dyn EntityStore, check: &'a DuplicateCheck) -> Self {
        Self { store, check }
    }

    /// Existing entities in `groups` whose full name is close to the new entity's
    ///
    /// Returns `None` when the entity has no name or nothing is similar enough.
    pub async fn find_candidates(
        &self,
        row: RowIndex,
        entity: &Entity,
        groups: &[EntityRef],
    ) -> StoreResult<Option<FuzzyMatch>> {
        let full_name = self.check.full_name(entity);
        if full_name.is_empty() || groups.is_empty() {
            return Ok(None);
        }

        let members = self
            .store
            .find_by_association(&entity.model, &self.check.membership_field, groups)
            .await?;

        let mut candidates: Vec<EntityRef> = members
            .iter()
            .filter(|member| entity.id.is_none() || member.id != entity.id)
            .filter(|member| {
                let score = name_similarity(&full_name, &self.check.full_name(member));
                score >= self.check.threshold
            })
            .filter_map(Entity::reference)
            .collect();
        candidates.sort();
        candidates.dedup();

        debug!(
            "Row {}: {} duplicate candidate(s) for '{}' among {} member(s)",
            row,
            candidates.len(),
            full_name,
            members.len()
        );

        if candidates.is_empty() {
            return Ok(None);
        }
        Ok(Some(FuzzyMatch {
            row_index: row,
            full_name,
            created: None,
            candidates,
        }))
    }
}
