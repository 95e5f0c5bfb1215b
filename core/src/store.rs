//! Owner of the `PdfAnnotations` snapshot.
//!
//! Every mutation is validated locally, sent to the `RemoteStore`, and only applied once the
//! remote confirms it. Applying means cloning the latest snapshot, editing the clone and
//! swapping the `Arc`, so readers always hold a complete snapshot.
//!
//! Calls naming the same annotation id run one at a time in issue order. Relation edits take
//! the turn of every annotation the relation references. Calls on disjoint ids may overlap and
//! complete in any order.

use crate::error::StoreError;
use crate::model::{
    Annotation, AnnotationId, AnnotationLabel, DocTypeAnnotation, DocTypeId, DocumentContext, PdfAnnotations, PendingAnnotation,
    PendingRelation, Permission, RelationGroup, RelationId, RelationSide,
};
use crate::relations::{plan_cascade_for_annotation_deletion, plan_removal_from_relation, CascadePlan, RelationChange};
use crate::remote::RemoteStore;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// User-visible message produced by a rejected or failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Check the annotation's capability set before update and delete.
    pub enforce_permissions: bool,
}

impl Default for StoreConfig {
    fn default() -> Self { Self { enforce_permissions: true } }
}

/// The active document and its snapshot, swapped together.
#[derive(Default)]
struct DocState {
    context: Option<DocumentContext>,
    snapshot: Arc<PdfAnnotations>,
}

pub struct AnnotationStore {
    remote: Arc<dyn RemoteStore>,
    config: StoreConfig,
    state: RwLock<DocState>,
    notices: Mutex<Vec<Notice>>,
    id_locks: Mutex<HashMap<AnnotationId, Arc<AsyncMutex<()>>>>,
}

/// Holds an annotation id's turn; releasing it hands the id to the next queued call.
struct IdTurn<'a> {
    store: &'a AnnotationStore,
    id: AnnotationId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdTurn<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.store.id_locks.lock();
        if locks.get(&self.id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&self.id);
        }
    }
}

impl AnnotationStore {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self { Self::with_config(remote, StoreConfig::default()) }

    pub fn with_config(remote: Arc<dyn RemoteStore>, config: StoreConfig) -> Self {
        Self {
            remote,
            config,
            state: RwLock::new(DocState::default()),
            notices: Mutex::new(Vec::new()),
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Current snapshot. Cheap to call; the returned value never changes underneath the caller.
    pub fn snapshot(&self) -> Arc<PdfAnnotations> { self.state.read().snapshot.clone() }

    pub fn context(&self) -> Option<DocumentContext> { self.state.read().context.clone() }

    /// Switches document. The snapshot is emptied until the next `refresh`.
    pub fn set_context(&self, context: Option<DocumentContext>) {
        *self.state.write() = DocState { context, snapshot: Arc::default() };
    }

    pub fn drain_notices(&self) -> Vec<Notice> { std::mem::take(&mut *self.notices.lock()) }

    /// Replaces the snapshot with the remote's authoritative state.
    pub async fn refresh(&self) -> Result<Arc<PdfAnnotations>, StoreError> {
        let ctx = self.require_context()?;
        let loaded = self.remote.load(&ctx).await.map_err(|e| self.surface(e.into()))?;
        tracing::info!(annotations = loaded.annotations.len(), relations = loaded.relations.len(), "loaded annotations");
        self.apply(&ctx, |snap| *snap = loaded);
        Ok(self.snapshot())
    }

    /// Applies an already confirmed annotation, replacing any entry with its id.
    pub fn apply_confirmed_annotation(&self, annotation: Annotation) {
        let mut state = self.state.write();
        let mut next = (*state.snapshot).clone();
        next.upsert_annotation(annotation);
        state.snapshot = Arc::new(next);
    }

    pub async fn create_annotation(&self, candidate: PendingAnnotation) -> Result<Annotation, StoreError> {
        let ctx = self.require_context()?;
        if !candidate.is_submittable() {
            return Err(self.surface(StoreError::EmptyText));
        }
        let confirmed = self.remote.create_annotation(&ctx, &candidate).await.map_err(|e| self.surface(e.into()))?;
        tracing::info!(id = %confirmed.id, label = %confirmed.label.text, "annotation created");
        self.apply(&ctx, |snap| snap.upsert_annotation(confirmed.clone()));
        Ok(confirmed)
    }

    /// Replaces an annotation's content. Review state is kept as the snapshot holds it; it only
    /// changes through `approve_annotation` and `reject_annotation`.
    pub async fn update_annotation(&self, mut updated: Annotation) -> Result<Annotation, StoreError> {
        let ctx = self.require_context()?;
        if updated.approved && updated.rejected {
            return Err(self.surface(StoreError::ConflictingReview(updated.id.clone())));
        }
        let _turn = self.take_turn(&updated.id).await;
        self.check_permission(&updated.id, Permission::Update)?;
        if let Some(current) = self.snapshot().annotation(&updated.id) {
            updated.approved = current.approved;
            updated.rejected = current.rejected;
            updated.feedback = current.feedback.clone();
        }
        let confirmed = self.remote.update_annotation(&ctx, &updated).await.map_err(|e| self.surface(e.into()))?;
        tracing::info!(id = %confirmed.id, "annotation updated");
        self.apply(&ctx, |snap| snap.replace_annotation(confirmed.clone()));
        Ok(confirmed)
    }

    /// Deletes the annotation and, in the same batch, every relation change it forces.
    /// Local state moves only when the whole batch succeeded.
    pub async fn delete_annotation(&self, id: &AnnotationId) -> Result<CascadePlan, StoreError> {
        let ctx = self.require_context()?;
        let _turn = self.take_turn(id).await;
        self.check_permission(id, Permission::Remove)?;
        let plan = plan_cascade_for_annotation_deletion(id, &self.snapshot().relations);
        let delete_ids = plan.delete_ids();

        let remote = &self.remote;
        let (deleted, relations_deleted, relations_updated) = tokio::join!(
            remote.delete_annotation(&ctx, id),
            async {
                if delete_ids.is_empty() { Ok(()) } else { remote.delete_relations(&ctx, &delete_ids).await }
            },
            async {
                if plan.to_update.is_empty() { Ok(Vec::new()) } else { remote.update_relations(&ctx, &plan.to_update).await }
            },
        );
        let updated = deleted
            .and(relations_deleted)
            .and(relations_updated)
            .map_err(|e| self.surface(e.into()))?;

        tracing::info!(%id, relations_deleted = delete_ids.len(), relations_updated = updated.len(), "annotation deleted");
        self.apply(&ctx, |snap| {
            snap.remove_annotation(id);
            snap.remove_relations(&delete_ids);
            for relation in updated { snap.replace_relation(relation); }
        });
        Ok(plan)
    }

    pub async fn approve_annotation(&self, id: &AnnotationId, comment: Option<&str>) -> Result<Annotation, StoreError> {
        self.review(id, comment, true).await
    }

    pub async fn reject_annotation(&self, id: &AnnotationId, comment: Option<&str>) -> Result<Annotation, StoreError> {
        self.review(id, comment, false).await
    }

    async fn review(&self, id: &AnnotationId, comment: Option<&str>, approve: bool) -> Result<Annotation, StoreError> {
        let ctx = self.require_context()?;
        let _turn = self.take_turn(id).await;
        if self.snapshot().annotation(id).is_none() {
            return Err(self.surface(StoreError::UnknownAnnotation(id.clone())));
        }
        let result = if approve {
            self.remote.approve_annotation(&ctx, id, comment).await
        } else {
            self.remote.reject_annotation(&ctx, id, comment).await
        };
        let feedback = result.map_err(|e| self.surface(e.into()))?;
        tracing::info!(%id, approved = feedback.approved, "annotation reviewed");

        let mut reviewed = None;
        self.apply(&ctx, |snap| {
            if let Some(current) = snap.annotation(id) {
                let next = current.reviewed(feedback.clone());
                reviewed = Some(next.clone());
                snap.replace_annotation(next);
            }
        });
        // deleted while the review was in flight
        reviewed.ok_or_else(|| StoreError::UnknownAnnotation(id.clone()))
    }

    pub async fn create_doc_type_annotation(&self, label: &AnnotationLabel) -> Result<DocTypeAnnotation, StoreError> {
        let ctx = self.require_context()?;
        let confirmed = self.remote.create_doc_type_annotation(&ctx, label).await.map_err(|e| self.surface(e.into()))?;
        tracing::info!(id = %confirmed.id, label = %label.text, "doc type added");
        self.apply(&ctx, |snap| snap.upsert_doc_type(confirmed.clone()));
        Ok(confirmed)
    }

    pub async fn delete_doc_type_annotation(&self, id: &DocTypeId) -> Result<(), StoreError> {
        let ctx = self.require_context()?;
        self.remote.delete_doc_type_annotation(&ctx, id).await.map_err(|e| self.surface(e.into()))?;
        tracing::info!(%id, "doc type removed");
        self.apply(&ctx, |snap| snap.remove_doc_type(id));
        Ok(())
    }

    pub async fn create_relation(&self, candidate: PendingRelation) -> Result<RelationGroup, StoreError> {
        let ctx = self.require_context()?;
        if candidate.has_empty_side() {
            return Err(self.surface(StoreError::EmptyRelationSide));
        }
        let members: Vec<AnnotationId> = candidate.source_ids.iter().chain(&candidate.target_ids).cloned().collect();
        let _turns = self.take_relation_turns(&[], &members).await;
        self.require_annotations(&members)?;
        let confirmed = self.remote.create_relation(&ctx, &candidate).await.map_err(|e| self.surface(e.into()))?;
        tracing::info!(id = %confirmed.id, "relation created");
        self.apply(&ctx, |snap| snap.upsert_relation(confirmed.clone()));
        Ok(confirmed)
    }

    pub async fn delete_relation(&self, id: &RelationId) -> Result<(), StoreError> {
        let ctx = self.require_context()?;
        let ids = [id.clone()];
        let _turns = self.take_relation_turns(&ids, &[]).await;
        self.remote.delete_relations(&ctx, &ids).await.map_err(|e| self.surface(e.into()))?;
        tracing::info!(%id, "relation deleted");
        self.apply(&ctx, |snap| snap.remove_relations(&ids));
        Ok(())
    }

    /// Replaces relations by id. Every relation must keep both sides non-empty; use
    /// `delete_relation` to drop one.
    pub async fn update_relations(&self, relations: Vec<RelationGroup>) -> Result<Vec<RelationGroup>, StoreError> {
        let ctx = self.require_context()?;
        if relations.iter().any(RelationGroup::has_empty_side) {
            return Err(self.surface(StoreError::EmptyRelationSide));
        }
        let relation_ids: Vec<RelationId> = relations.iter().map(|r| r.id.clone()).collect();
        let members: Vec<AnnotationId> = relations.iter().flat_map(|r| r.source_ids.iter().chain(&r.target_ids)).cloned().collect();
        let _turns = self.take_relation_turns(&relation_ids, &members).await;
        self.require_annotations(&members)?;
        let confirmed = self.remote.update_relations(&ctx, &relations).await.map_err(|e| self.surface(e.into()))?;
        tracing::info!(count = confirmed.len(), "relations updated");
        self.apply(&ctx, |snap| {
            for relation in &confirmed { snap.replace_relation(relation.clone()); }
        });
        Ok(confirmed)
    }

    /// Detaches one annotation from one relation, deleting the relation if a side empties.
    pub async fn remove_annotation_from_relation(&self, annotation_id: &AnnotationId, relation_id: &RelationId) -> Result<RelationChange, StoreError> {
        let ctx = self.require_context()?;
        let _turns = self.take_relation_turns(std::slice::from_ref(relation_id), std::slice::from_ref(annotation_id)).await;
        let change = plan_removal_from_relation(annotation_id, relation_id, &self.snapshot().relations);
        match &change {
            RelationChange::Delete(relation) => {
                let ids = [relation.id.clone()];
                self.remote.delete_relations(&ctx, &ids).await.map_err(|e| self.surface(e.into()))?;
                tracing::info!(relation = %relation.id, annotation = %annotation_id, "relation emptied and deleted");
                self.apply(&ctx, |snap| snap.remove_relations(&ids));
            }
            RelationChange::Update(relation) => {
                let confirmed = self.remote.update_relations(&ctx, std::slice::from_ref(relation)).await.map_err(|e| self.surface(e.into()))?;
                tracing::info!(relation = %relation.id, annotation = %annotation_id, "annotation detached from relation");
                self.apply(&ctx, |snap| {
                    for r in confirmed { snap.replace_relation(r); }
                });
            }
            RelationChange::NoChange => tracing::debug!(relation = %relation_id, annotation = %annotation_id, "nothing to detach"),
        }
        Ok(change)
    }

    pub async fn add_annotations_to_relation(&self, relation_id: &RelationId, ids: &[AnnotationId], side: RelationSide) -> Result<RelationGroup, StoreError> {
        let ctx = self.require_context()?;
        let _turns = self.take_relation_turns(std::slice::from_ref(relation_id), ids).await;
        let Some(mut relation) = self.snapshot().relation(relation_id).cloned() else {
            return Err(self.surface(StoreError::UnknownRelation(relation_id.clone())));
        };
        self.require_annotations(ids)?;
        let list = match side {
            RelationSide::Source => &mut relation.source_ids,
            RelationSide::Target => &mut relation.target_ids,
        };
        for id in ids {
            if !list.contains(id) { list.push(id.clone()); }
        }
        let confirmed = self.remote.update_relations(&ctx, std::slice::from_ref(&relation)).await.map_err(|e| self.surface(e.into()))?;
        self.apply(&ctx, |snap| {
            for r in &confirmed { snap.replace_relation(r.clone()); }
        });
        Ok(confirmed.into_iter().next().unwrap_or(relation))
    }

    fn require_context(&self) -> Result<DocumentContext, StoreError> {
        self.context().ok_or_else(|| self.surface(StoreError::MissingContext))
    }

    fn check_permission(&self, id: &AnnotationId, permission: Permission) -> Result<(), StoreError> {
        if !self.config.enforce_permissions { return Ok(()); }
        match self.snapshot().annotation(id) {
            Some(a) if !a.can(permission) => Err(self.surface(StoreError::PermissionDenied { id: id.clone(), permission })),
            _ => Ok(()),
        }
    }

    fn require_annotations<'i>(&self, ids: impl IntoIterator<Item = &'i AnnotationId>) -> Result<(), StoreError> {
        let snap = self.snapshot();
        match ids.into_iter().find(|id| snap.annotation(id).is_none()) {
            Some(missing) => Err(self.surface(StoreError::UnknownAnnotation(missing.clone()))),
            None => Ok(()),
        }
    }

    /// Logs `err` and queues it as a notice for the user.
    fn surface(&self, err: StoreError) -> StoreError {
        let level = if err.is_validation() {
            tracing::warn!(error = %err, "operation rejected");
            NoticeLevel::Warning
        } else {
            tracing::error!(error = %err, "remote call failed");
            NoticeLevel::Error
        };
        self.notices.lock().push(Notice { level, message: err.to_string() });
        err
    }

    /// Swaps in an edited copy of the latest snapshot, unless the document changed meanwhile.
    fn apply(&self, ctx: &DocumentContext, edit: impl FnOnce(&mut PdfAnnotations)) {
        let mut state = self.state.write();
        if state.context.as_ref() != Some(ctx) {
            tracing::debug!(document = %ctx.document_id, "context changed while call was in flight; result dropped");
            return;
        }
        let mut next = (*state.snapshot).clone();
        edit(&mut next);
        state.snapshot = Arc::new(next);
    }

    async fn take_turn(&self, id: &AnnotationId) -> IdTurn<'_> {
        let lock = {
            let mut locks = self.id_locks.lock();
            // entries left behind by waiters that were cancelled
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(id.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        IdTurn { store: self, id: id.clone(), guard: Some(guard) }
    }

    /// Takes, in id order, the turn of `extra` and of every annotation the named relations
    /// reference. Starts over if the relations gained members while waiting.
    async fn take_relation_turns(&self, relations: &[RelationId], extra: &[AnnotationId]) -> Vec<IdTurn<'_>> {
        loop {
            let wanted = self.involved_ids(relations, extra);
            let mut turns = Vec::with_capacity(wanted.len());
            for id in &wanted {
                turns.push(self.take_turn(id).await);
            }
            if self.involved_ids(relations, extra).is_subset(&wanted) {
                return turns;
            }
            tracing::debug!(relations = relations.len(), "relation members changed while waiting; retaking turns");
        }
    }

    fn involved_ids(&self, relations: &[RelationId], extra: &[AnnotationId]) -> BTreeSet<AnnotationId> {
        let snap = self.snapshot();
        let mut ids: BTreeSet<AnnotationId> = extra.iter().cloned().collect();
        for relation in relations.iter().filter_map(|id| snap.relation(id)) {
            ids.extend(relation.source_ids.iter().cloned());
            ids.extend(relation.target_ids.iter().cloned());
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_remote::MemoryRemoteStore;
    use std::time::Duration;

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak_its_lock_entry() {
        let store = AnnotationStore::new(Arc::new(MemoryRemoteStore::new()));
        let a = AnnotationId::from("a");
        let first = store.take_turn(&a).await;
        {
            let waiter = store.take_turn(&a);
            tokio::pin!(waiter);
            assert!(tokio::time::timeout(Duration::from_millis(10), &mut waiter).await.is_err());
            drop(first);
        }
        assert!(store.id_locks.lock().contains_key(&a));
        let _other = store.take_turn(&AnnotationId::from("b")).await;
        assert!(!store.id_locks.lock().contains_key(&a));
    }
}
