//! Durable `RemoteStore` on top of sled.
//!
//! One tree per collection. Keys are `{len}:{corpus}{len}:{document}{id}`; the length prefixes
//! keep one document's key range from covering another's, whatever characters the ids hold.
//! Values are JSON.

use crate::model::{
    Annotation, AnnotationId, AnnotationLabel, DocTypeAnnotation, DocTypeId, DocumentContext, PdfAnnotations, PendingAnnotation,
    PendingRelation, Permission, RelationGroup, RelationId, UserFeedback,
};
use crate::remote::{RemoteError, RemoteResult, RemoteStore};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub struct SledRemoteStore {
    db: sled::Db,
    annotations: sled::Tree,
    relations: sled::Tree,
    doc_types: sled::Tree,
}

impl SledRemoteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> RemoteResult<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            annotations: db.open_tree("annotations")?,
            relations: db.open_tree("relations")?,
            doc_types: db.open_tree("doc_types")?,
            db,
        })
    }

    fn next_id(&self) -> RemoteResult<String> { Ok(self.db.generate_id()?.to_string()) }

    pub async fn flush(&self) -> RemoteResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

fn prefix(ctx: &DocumentContext) -> String {
    format!("{}:{}{}:{}", ctx.corpus_id.len(), ctx.corpus_id, ctx.document_id.len(), ctx.document_id)
}

fn key(ctx: &DocumentContext, id: &str) -> String { format!("{}{}", prefix(ctx), id) }

fn put<T: Serialize>(tree: &sled::Tree, key: &str, value: &T) -> RemoteResult<()> {
    tree.insert(key.as_bytes(), serde_json::to_vec(value)?)?;
    Ok(())
}

fn get<T: DeserializeOwned>(tree: &sled::Tree, key: &str) -> RemoteResult<Option<T>> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn scan<T: DeserializeOwned>(tree: &sled::Tree, ctx: &DocumentContext) -> RemoteResult<Vec<T>> {
    let mut out = Vec::new();
    for entry in tree.scan_prefix(prefix(ctx).as_bytes()) {
        let (_, bytes) = entry?;
        out.push(serde_json::from_slice(&bytes)?);
    }
    Ok(out)
}

impl SledRemoteStore {
    fn review(&self, ctx: &DocumentContext, id: &AnnotationId, approved: bool, comment: Option<&str>) -> RemoteResult<UserFeedback> {
        let k = key(ctx, id.as_str());
        let current: Annotation = get(&self.annotations, &k)?.ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        let feedback = UserFeedback { id: self.next_id()?, approved, rejected: !approved, comment: comment.map(str::to_string) };
        put(&self.annotations, &k, &current.reviewed(feedback.clone()))?;
        Ok(feedback)
    }
}

#[async_trait]
impl RemoteStore for SledRemoteStore {
    async fn load(&self, ctx: &DocumentContext) -> RemoteResult<PdfAnnotations> {
        let mut annotations: Vec<Annotation> = scan(&self.annotations, ctx)?;
        let mut relations: Vec<RelationGroup> = scan(&self.relations, ctx)?;
        let mut doc_types: Vec<DocTypeAnnotation> = scan(&self.doc_types, ctx)?;
        // sled ids are monotonic; order numerically so creation order survives the string keys
        annotations.sort_by_key(|a| a.id.as_str().parse::<u64>().unwrap_or(u64::MAX));
        relations.sort_by_key(|r| r.id.as_str().parse::<u64>().unwrap_or(u64::MAX));
        doc_types.sort_by_key(|d| d.id.as_str().parse::<u64>().unwrap_or(u64::MAX));
        Ok(PdfAnnotations { annotations, relations, doc_types })
    }

    async fn create_annotation(&self, ctx: &DocumentContext, candidate: &PendingAnnotation) -> RemoteResult<Annotation> {
        let annotation = Annotation::confirm(AnnotationId(self.next_id()?), candidate.clone(), Permission::all());
        put(&self.annotations, &key(ctx, annotation.id.as_str()), &annotation)?;
        Ok(annotation)
    }

    async fn update_annotation(&self, ctx: &DocumentContext, annotation: &Annotation) -> RemoteResult<Annotation> {
        let k = key(ctx, annotation.id.as_str());
        if !self.annotations.contains_key(k.as_bytes())? {
            return Err(RemoteError::NotFound(annotation.id.to_string()));
        }
        put(&self.annotations, &k, annotation)?;
        Ok(annotation.clone())
    }

    async fn delete_annotation(&self, ctx: &DocumentContext, id: &AnnotationId) -> RemoteResult<()> {
        match self.annotations.remove(key(ctx, id.as_str()).as_bytes())? {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(id.to_string())),
        }
    }

    async fn approve_annotation(&self, ctx: &DocumentContext, id: &AnnotationId, comment: Option<&str>) -> RemoteResult<UserFeedback> {
        self.review(ctx, id, true, comment)
    }

    async fn reject_annotation(&self, ctx: &DocumentContext, id: &AnnotationId, comment: Option<&str>) -> RemoteResult<UserFeedback> {
        self.review(ctx, id, false, comment)
    }

    async fn create_relation(&self, ctx: &DocumentContext, candidate: &PendingRelation) -> RemoteResult<RelationGroup> {
        if candidate.has_empty_side() {
            return Err(RemoteError::Rejected("relation side is empty".into()));
        }
        let relation = RelationGroup {
            id: RelationId(self.next_id()?),
            source_ids: candidate.source_ids.clone(),
            target_ids: candidate.target_ids.clone(),
            label: candidate.label.clone(),
        };
        put(&self.relations, &key(ctx, relation.id.as_str()), &relation)?;
        Ok(relation)
    }

    async fn update_relations(&self, ctx: &DocumentContext, relations: &[RelationGroup]) -> RemoteResult<Vec<RelationGroup>> {
        for relation in relations {
            if !self.relations.contains_key(key(ctx, relation.id.as_str()).as_bytes())? {
                return Err(RemoteError::NotFound(relation.id.to_string()));
            }
        }
        let mut batch = sled::Batch::default();
        for relation in relations {
            batch.insert(key(ctx, relation.id.as_str()).as_bytes(), serde_json::to_vec(relation)?);
        }
        self.relations.apply_batch(batch)?;
        Ok(relations.to_vec())
    }

    async fn delete_relations(&self, ctx: &DocumentContext, ids: &[RelationId]) -> RemoteResult<()> {
        let mut batch = sled::Batch::default();
        for id in ids { batch.remove(key(ctx, id.as_str()).as_bytes()); }
        self.relations.apply_batch(batch)?;
        Ok(())
    }

    async fn create_doc_type_annotation(&self, ctx: &DocumentContext, label: &AnnotationLabel) -> RemoteResult<DocTypeAnnotation> {
        let doc_type = DocTypeAnnotation { id: DocTypeId(self.next_id()?), label: label.clone(), permissions: Permission::all() };
        put(&self.doc_types, &key(ctx, doc_type.id.as_str()), &doc_type)?;
        Ok(doc_type)
    }

    async fn delete_doc_type_annotation(&self, ctx: &DocumentContext, id: &DocTypeId) -> RemoteResult<()> {
        self.doc_types.remove(key(ctx, id.as_str()).as_bytes())?;
        Ok(())
    }
}
