//! Relation bookkeeping for annotation removal.
//!
//! Pure planning over a snapshot's relations: nothing here touches the remote store. The
//! plans keep every surviving relation with a non-empty source and target side.

use crate::model::{AnnotationId, RelationGroup, RelationId};
use serde::Serialize;

/// Outcome of detaching one annotation from one relation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "relation", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationChange {
    /// A side would become empty; the whole relation goes.
    Delete(RelationGroup),
    /// Filtered id lists, same id and label.
    Update(RelationGroup),
    NoChange,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CascadePlan {
    pub to_delete: Vec<RelationGroup>,
    pub to_update: Vec<RelationGroup>,
}

impl CascadePlan {
    pub fn is_empty(&self) -> bool { self.to_delete.is_empty() && self.to_update.is_empty() }

    pub fn delete_ids(&self) -> Vec<RelationId> { self.to_delete.iter().map(|r| r.id.clone()).collect() }
}

pub fn plan_removal_from_relation(annotation_id: &AnnotationId, relation_id: &RelationId, relations: &[RelationGroup]) -> RelationChange {
    let Some(relation) = relations.iter().find(|r| &r.id == relation_id) else {
        return RelationChange::NoChange;
    };
    if !relation.references(annotation_id) { return RelationChange::NoChange; }
    let filtered = relation.without(annotation_id);
    if filtered.has_empty_side() {
        RelationChange::Delete(relation.clone())
    } else {
        RelationChange::Update(filtered)
    }
}

/// Partitions every relation touching `annotation_id` into deletions and updates.
pub fn plan_cascade_for_annotation_deletion(annotation_id: &AnnotationId, relations: &[RelationGroup]) -> CascadePlan {
    let mut plan = CascadePlan::default();
    for relation in relations.iter().filter(|r| r.references(annotation_id)) {
        let filtered = relation.without(annotation_id);
        if filtered.has_empty_side() {
            plan.to_delete.push(relation.clone());
        } else {
            plan.to_update.push(filtered);
        }
    }
    tracing::debug!(%annotation_id, delete = plan.to_delete.len(), update = plan.to_update.len(), "planned relation cascade");
    plan
}
