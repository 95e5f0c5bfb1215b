use crate::model::{AnnotationId, Permission, RelationId};
use crate::remote::RemoteError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("No corpus or document selected")]
    MissingContext,
    #[error("Annotation text is empty")]
    EmptyText,
    #[error("A relation needs at least one source and one target")]
    EmptyRelationSide,
    #[error("Missing {permission} permission on annotation {id}")]
    PermissionDenied { id: AnnotationId, permission: Permission },
    #[error("Annotation {0} cannot be both approved and rejected")]
    ConflictingReview(AnnotationId),
    #[error("Unknown annotation: {0}")]
    UnknownAnnotation(AnnotationId),
    #[error("Unknown relation: {0}")]
    UnknownRelation(RelationId),
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),
}

impl StoreError {
    /// Rejected locally before any remote call was made.
    pub fn is_validation(&self) -> bool { !matches!(self, StoreError::Remote(_)) }
}
