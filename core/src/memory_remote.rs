//! In-process `RemoteStore` with failure injection and artificial latency.

use crate::model::{
    Annotation, AnnotationId, AnnotationLabel, DocTypeAnnotation, DocTypeId, DocumentContext, PdfAnnotations, PendingAnnotation,
    PendingRelation, Permission, RelationGroup, RelationId, UserFeedback,
};
use crate::remote::{RemoteError, RemoteResult, RemoteStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Load,
    CreateAnnotation,
    UpdateAnnotation,
    DeleteAnnotation,
    ApproveAnnotation,
    RejectAnnotation,
    CreateRelation,
    UpdateRelations,
    DeleteRelations,
    CreateDocType,
    DeleteDocType,
}

#[derive(Default)]
pub struct MemoryRemoteStore {
    docs: Mutex<HashMap<DocumentContext, PdfAnnotations>>,
    failing: Mutex<HashSet<RemoteOp>>,
    delays: Mutex<HashMap<RemoteOp, Duration>>,
    calls: Mutex<Vec<RemoteOp>>,
    next_id: AtomicU64,
}

impl MemoryRemoteStore {
    pub fn new() -> Self { Self::default() }

    /// Makes every later `op` call fail with a network error until cleared.
    pub fn set_failing(&self, op: RemoteOp, failing: bool) {
        let mut set = self.failing.lock();
        if failing { set.insert(op); } else { set.remove(&op); }
    }

    pub fn set_delay(&self, op: RemoteOp, delay: Duration) { self.delays.lock().insert(op, delay); }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<RemoteOp> { self.calls.lock().clone() }

    /// Direct view of what the store holds for `ctx`.
    pub fn stored(&self, ctx: &DocumentContext) -> PdfAnnotations { self.docs.lock().get(ctx).cloned().unwrap_or_default() }

    pub fn seed(&self, ctx: &DocumentContext, state: PdfAnnotations) { self.docs.lock().insert(ctx.clone(), state); }

    fn next_id(&self) -> String { (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string() }

    async fn enter(&self, op: RemoteOp) -> RemoteResult<()> {
        self.calls.lock().push(op);
        let delay = self.delays.lock().get(&op).copied();
        if let Some(delay) = delay { tokio::time::sleep(delay).await; }
        if self.failing.lock().contains(&op) {
            return Err(RemoteError::Network(format!("{op:?} unavailable")));
        }
        Ok(())
    }

    fn with_doc<T>(&self, ctx: &DocumentContext, f: impl FnOnce(&mut PdfAnnotations) -> RemoteResult<T>) -> RemoteResult<T> {
        let mut docs = self.docs.lock();
        f(docs.entry(ctx.clone()).or_default())
    }

    fn review(&self, ctx: &DocumentContext, id: &AnnotationId, approved: bool, comment: Option<&str>) -> RemoteResult<UserFeedback> {
        let feedback = UserFeedback { id: self.next_id(), approved, rejected: !approved, comment: comment.map(str::to_string) };
        self.with_doc(ctx, |doc| {
            let current = doc.annotation(id).ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
            let next = current.reviewed(feedback.clone());
            doc.replace_annotation(next);
            Ok(feedback)
        })
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn load(&self, ctx: &DocumentContext) -> RemoteResult<PdfAnnotations> {
        self.enter(RemoteOp::Load).await?;
        Ok(self.stored(ctx))
    }

    async fn create_annotation(&self, ctx: &DocumentContext, candidate: &PendingAnnotation) -> RemoteResult<Annotation> {
        self.enter(RemoteOp::CreateAnnotation).await?;
        let annotation = Annotation::confirm(AnnotationId(self.next_id()), candidate.clone(), Permission::all());
        self.with_doc(ctx, |doc| {
            doc.upsert_annotation(annotation.clone());
            Ok(annotation)
        })
    }

    async fn update_annotation(&self, ctx: &DocumentContext, annotation: &Annotation) -> RemoteResult<Annotation> {
        self.enter(RemoteOp::UpdateAnnotation).await?;
        self.with_doc(ctx, |doc| {
            if doc.annotation(&annotation.id).is_none() {
                return Err(RemoteError::NotFound(annotation.id.to_string()));
            }
            doc.replace_annotation(annotation.clone());
            Ok(annotation.clone())
        })
    }

    async fn delete_annotation(&self, ctx: &DocumentContext, id: &AnnotationId) -> RemoteResult<()> {
        self.enter(RemoteOp::DeleteAnnotation).await?;
        self.with_doc(ctx, |doc| {
            if doc.annotation(id).is_none() {
                return Err(RemoteError::NotFound(id.to_string()));
            }
            doc.remove_annotation(id);
            Ok(())
        })
    }

    async fn approve_annotation(&self, ctx: &DocumentContext, id: &AnnotationId, comment: Option<&str>) -> RemoteResult<UserFeedback> {
        self.enter(RemoteOp::ApproveAnnotation).await?;
        self.review(ctx, id, true, comment)
    }

    async fn reject_annotation(&self, ctx: &DocumentContext, id: &AnnotationId, comment: Option<&str>) -> RemoteResult<UserFeedback> {
        self.enter(RemoteOp::RejectAnnotation).await?;
        self.review(ctx, id, false, comment)
    }

    async fn create_relation(&self, ctx: &DocumentContext, candidate: &PendingRelation) -> RemoteResult<RelationGroup> {
        self.enter(RemoteOp::CreateRelation).await?;
        if candidate.has_empty_side() {
            return Err(RemoteError::Rejected("relation side is empty".into()));
        }
        let relation = RelationGroup {
            id: RelationId(self.next_id()),
            source_ids: candidate.source_ids.clone(),
            target_ids: candidate.target_ids.clone(),
            label: candidate.label.clone(),
        };
        self.with_doc(ctx, |doc| {
            doc.upsert_relation(relation.clone());
            Ok(relation)
        })
    }

    async fn update_relations(&self, ctx: &DocumentContext, relations: &[RelationGroup]) -> RemoteResult<Vec<RelationGroup>> {
        self.enter(RemoteOp::UpdateRelations).await?;
        self.with_doc(ctx, |doc| {
            if let Some(missing) = relations.iter().find(|r| doc.relation(&r.id).is_none()) {
                return Err(RemoteError::NotFound(missing.id.to_string()));
            }
            for relation in relations { doc.replace_relation(relation.clone()); }
            Ok(relations.to_vec())
        })
    }

    async fn delete_relations(&self, ctx: &DocumentContext, ids: &[RelationId]) -> RemoteResult<()> {
        self.enter(RemoteOp::DeleteRelations).await?;
        self.with_doc(ctx, |doc| {
            doc.remove_relations(ids);
            Ok(())
        })
    }

    async fn create_doc_type_annotation(&self, ctx: &DocumentContext, label: &AnnotationLabel) -> RemoteResult<DocTypeAnnotation> {
        self.enter(RemoteOp::CreateDocType).await?;
        let doc_type = DocTypeAnnotation { id: DocTypeId(self.next_id()), label: label.clone(), permissions: Permission::all() };
        self.with_doc(ctx, |doc| {
            doc.upsert_doc_type(doc_type.clone());
            Ok(doc_type)
        })
    }

    async fn delete_doc_type_annotation(&self, ctx: &DocumentContext, id: &DocTypeId) -> RemoteResult<()> {
        self.enter(RemoteOp::DeleteDocType).await?;
        self.with_doc(ctx, |doc| {
            doc.remove_doc_type(id);
            Ok(())
        })
    }
}
