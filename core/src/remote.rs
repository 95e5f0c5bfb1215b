//! Remote store seam.
//!
//! The engine never writes local state on its own authority: every mutation goes through a
//! `RemoteStore` and only the confirmed result is applied to the snapshot.

use crate::model::{
    Annotation, AnnotationId, AnnotationLabel, DocTypeAnnotation, DocTypeId, DocumentContext, PdfAnnotations, PendingAnnotation,
    PendingRelation, RelationGroup, RelationId, UserFeedback,
};
use async_trait::async_trait;

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rejected by server: {0}")]
    Rejected(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sled::Error> for RemoteError {
    fn from(e: sled::Error) -> Self { RemoteError::Storage(e.to_string()) }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self { RemoteError::Storage(e.to_string()) }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Authoritative state for one document.
    async fn load(&self, ctx: &DocumentContext) -> RemoteResult<PdfAnnotations>;

    async fn create_annotation(&self, ctx: &DocumentContext, candidate: &PendingAnnotation) -> RemoteResult<Annotation>;

    async fn update_annotation(&self, ctx: &DocumentContext, annotation: &Annotation) -> RemoteResult<Annotation>;

    async fn delete_annotation(&self, ctx: &DocumentContext, id: &AnnotationId) -> RemoteResult<()>;

    async fn approve_annotation(&self, ctx: &DocumentContext, id: &AnnotationId, comment: Option<&str>) -> RemoteResult<UserFeedback>;

    async fn reject_annotation(&self, ctx: &DocumentContext, id: &AnnotationId, comment: Option<&str>) -> RemoteResult<UserFeedback>;

    async fn create_relation(&self, ctx: &DocumentContext, candidate: &PendingRelation) -> RemoteResult<RelationGroup>;

    /// Replaces each relation by id and returns the stored versions.
    async fn update_relations(&self, ctx: &DocumentContext, relations: &[RelationGroup]) -> RemoteResult<Vec<RelationGroup>>;

    async fn delete_relations(&self, ctx: &DocumentContext, ids: &[RelationId]) -> RemoteResult<()>;

    async fn create_doc_type_annotation(&self, ctx: &DocumentContext, label: &AnnotationLabel) -> RemoteResult<DocTypeAnnotation>;

    async fn delete_doc_type_annotation(&self, ctx: &DocumentContext, id: &DocTypeId) -> RemoteResult<()>;
}
