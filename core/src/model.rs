use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self { Self(s.to_string()) }
        }
    };
}

id_type!(
    /// Remote-assigned annotation id. Pending candidates have none.
    AnnotationId
);
id_type!(RelationId);
id_type!(DocTypeId);

/// Axis-aligned box in unscaled page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self { Self { left, top, right, bottom } }

    /// Selection boxes can be dragged in any direction; this puts left/top at the minimum corner.
    pub fn normalized(&self) -> Self {
        Self {
            left: self.left.min(self.right),
            top: self.top.min(self.bottom),
            right: self.left.max(self.right),
            bottom: self.top.max(self.bottom),
        }
    }

    /// True when the two boxes share a region of positive area.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        a.left < b.right && b.left < a.right && a.top < b.bottom && b.top < a.bottom
    }

    pub fn union(&self, other: &BoundingBox) -> Self {
        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId {
    pub page_index: usize,
    pub token_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub page_index: usize,
    pub token_index: usize,
    pub text: String,
    pub bounds: BoundingBox,
}

impl Token {
    pub fn id(&self) -> TokenId { TokenId { page_index: self.page_index, token_index: self.token_index } }
}

/// A parsed page. `tokens` is `None` when the supplier had no token layer for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub page_index: usize,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tokens: Option<Vec<Token>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelType {
    SpanLabel,
    TokenLabel,
    RelationshipLabel,
    DocTypeLabel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationLabel {
    pub id: String,
    pub text: String,
    pub label_type: LabelType,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Create,
    Read,
    Update,
    Remove,
    Publish,
    Permission,
}

impl Permission {
    pub fn all() -> BTreeSet<Permission> {
        [Self::Create, Self::Read, Self::Update, Self::Remove, Self::Publish, Self::Permission].into_iter().collect()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Publish => "publish",
            Self::Permission => "permission",
        };
        f.write_str(s)
    }
}

/// Review feedback recorded against an annotation by approve/reject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFeedback {
    pub id: String,
    pub approved: bool,
    pub rejected: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinglePageAnnotationJson {
    pub bounds: BoundingBox,
    pub tokens_jsons: Vec<TokenId>,
    pub raw_text: String,
}

/// Per-page payload keyed by 1-based page number.
pub type MultipageAnnotationJson = BTreeMap<usize, SinglePageAnnotationJson>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnnotationTarget {
    /// Token regions over one or more pages; `page` is the lowest 1-based page number present.
    Tokens { page: usize, json: MultipageAnnotationJson },
    /// Char range `[start, end)` into the flattened text of a plain-text document.
    Span { start: usize, end: usize },
}

/// Locally constructed annotation that the remote store has not confirmed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAnnotation {
    pub label: AnnotationLabel,
    pub raw_text: String,
    pub target: AnnotationTarget,
    #[serde(default)]
    pub structural: bool,
}

impl PendingAnnotation {
    pub fn is_submittable(&self) -> bool { !self.raw_text.trim().is_empty() }
}

/// Remote-confirmed annotation carrying its authoritative id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub label: AnnotationLabel,
    pub raw_text: String,
    pub target: AnnotationTarget,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
    #[serde(default)]
    pub structural: bool,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub rejected: bool,
    #[serde(default)]
    pub feedback: Vec<UserFeedback>,
}

impl Annotation {
    pub fn confirm(id: AnnotationId, pending: PendingAnnotation, permissions: BTreeSet<Permission>) -> Self {
        Self {
            id,
            label: pending.label,
            raw_text: pending.raw_text,
            target: pending.target,
            permissions,
            structural: pending.structural,
            approved: false,
            rejected: false,
            feedback: Vec::new(),
        }
    }

    pub fn can(&self, permission: Permission) -> bool { self.permissions.contains(&permission) }

    /// Applies a confirmed review. `approved` and `rejected` never both hold.
    pub fn reviewed(&self, feedback: UserFeedback) -> Self {
        let mut next = self.clone();
        next.approved = feedback.approved;
        next.rejected = !feedback.approved && feedback.rejected;
        next.feedback.push(feedback);
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationSide {
    Source,
    Target,
}

/// Labeled many-to-many link. Both sides are non-empty in every committed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationGroup {
    pub id: RelationId,
    pub source_ids: Vec<AnnotationId>,
    pub target_ids: Vec<AnnotationId>,
    pub label: AnnotationLabel,
}

impl RelationGroup {
    pub fn references(&self, id: &AnnotationId) -> bool { self.source_ids.contains(id) || self.target_ids.contains(id) }

    pub fn has_empty_side(&self) -> bool { self.source_ids.is_empty() || self.target_ids.is_empty() }

    /// Copy with `id` filtered out of both sides.
    pub fn without(&self, id: &AnnotationId) -> Self {
        Self {
            id: self.id.clone(),
            source_ids: self.source_ids.iter().filter(|a| *a != id).cloned().collect(),
            target_ids: self.target_ids.iter().filter(|a| *a != id).cloned().collect(),
            label: self.label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRelation {
    pub source_ids: Vec<AnnotationId>,
    pub target_ids: Vec<AnnotationId>,
    pub label: AnnotationLabel,
}

impl PendingRelation {
    pub fn has_empty_side(&self) -> bool { self.source_ids.is_empty() || self.target_ids.is_empty() }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocTypeAnnotation {
    pub id: DocTypeId,
    pub label: AnnotationLabel,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

/// Whole-document annotation state. Replaced as a unit on every transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PdfAnnotations {
    pub annotations: Vec<Annotation>,
    pub relations: Vec<RelationGroup>,
    pub doc_types: Vec<DocTypeAnnotation>,
}

impl PdfAnnotations {
    pub fn annotation(&self, id: &AnnotationId) -> Option<&Annotation> { self.annotations.iter().find(|a| &a.id == id) }

    pub fn relation(&self, id: &RelationId) -> Option<&RelationGroup> { self.relations.iter().find(|r| &r.id == id) }

    /// Replaces the entry with the same id, or appends when none exists.
    pub fn upsert_annotation(&mut self, annotation: Annotation) {
        match self.annotations.iter_mut().find(|a| a.id == annotation.id) {
            Some(slot) => *slot = annotation,
            None => self.annotations.push(annotation),
        }
    }

    /// Replaces the entry with the same id; unmatched ids are ignored.
    pub fn replace_annotation(&mut self, annotation: Annotation) {
        if let Some(slot) = self.annotations.iter_mut().find(|a| a.id == annotation.id) {
            *slot = annotation;
        }
    }

    pub fn remove_annotation(&mut self, id: &AnnotationId) { self.annotations.retain(|a| &a.id != id); }

    pub fn upsert_relation(&mut self, relation: RelationGroup) {
        match self.relations.iter_mut().find(|r| r.id == relation.id) {
            Some(slot) => *slot = relation,
            None => self.relations.push(relation),
        }
    }

    pub fn replace_relation(&mut self, relation: RelationGroup) {
        if let Some(slot) = self.relations.iter_mut().find(|r| r.id == relation.id) {
            *slot = relation;
        }
    }

    pub fn remove_relations(&mut self, ids: &[RelationId]) { self.relations.retain(|r| !ids.contains(&r.id)); }

    pub fn upsert_doc_type(&mut self, doc_type: DocTypeAnnotation) {
        match self.doc_types.iter_mut().find(|d| d.id == doc_type.id) {
            Some(slot) => *slot = doc_type,
            None => self.doc_types.push(doc_type),
        }
    }

    pub fn remove_doc_type(&mut self, id: &DocTypeId) { self.doc_types.retain(|d| &d.id != id); }
}

/// Corpus and document the annotations belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentContext {
    pub corpus_id: String,
    pub document_id: String,
}

impl DocumentContext {
    pub fn new(corpus_id: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self { corpus_id: corpus_id.into(), document_id: document_id.into() }
    }
}
