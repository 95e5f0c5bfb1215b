use crate::model::{AnnotationLabel, AnnotationTarget, BoundingBox, MultipageAnnotationJson, PendingAnnotation, SinglePageAnnotationJson};
use crate::token_index::{bounds_for_tokens, TokenIndex};
use serde::Serialize;
use std::collections::BTreeMap;

/// Pending selection boxes per 0-based page index during a multi-page gesture.
pub type PageSelectionQueue = BTreeMap<usize, Vec<BoundingBox>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActiveSelection {
    pub page_index: usize,
    pub bounds: BoundingBox,
}

/// Owns the in-progress selection gesture and turns it into a single token annotation.
#[derive(Debug, Clone, Default)]
pub struct SelectionBuilder {
    queue: PageSelectionQueue,
    active: Option<ActiveSelection>,
}

impl SelectionBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn queue(&self) -> &PageSelectionQueue { &self.queue }
    pub fn active(&self) -> Option<&ActiveSelection> { self.active.as_ref() }

    /// Starts or resizes the selection currently being dragged.
    pub fn set_active(&mut self, page_index: usize, bounds: BoundingBox) { self.active = Some(ActiveSelection { page_index, bounds }); }

    pub fn enqueue(&mut self, page_index: usize, bounds: BoundingBox) { self.queue.entry(page_index).or_default().push(bounds); }

    /// Moves the active selection into the queue so the gesture can continue elsewhere.
    pub fn queue_active(&mut self) {
        if let Some(active) = self.active.take() { self.enqueue(active.page_index, active.bounds); }
    }

    pub fn cancel(&mut self) {
        self.queue = PageSelectionQueue::new();
        self.active = None;
    }

    /// Resolves the queue plus the active selection into one annotation candidate.
    ///
    /// With no label this is a no-op returning `None` and the gesture is kept. Otherwise the
    /// gesture is consumed whatever the outcome; the returned candidate may still carry empty
    /// text, which `PendingAnnotation::is_submittable` rejects.
    pub fn commit(&mut self, index: &TokenIndex, label: Option<&AnnotationLabel>) -> Option<PendingAnnotation> {
        let Some(label) = label else {
            tracing::debug!("commit without an active label ignored");
            return None;
        };

        let mut merged = std::mem::take(&mut self.queue);
        if let Some(active) = self.active.take() {
            merged.entry(active.page_index).or_default().push(active.bounds);
        }

        let json: MultipageAnnotationJson = merged
            .iter()
            .filter_map(|(page_index, boxes)| resolve_page(index, *page_index, boxes).map(|p| (page_index + 1, p)))
            .collect();
        let raw_text = json.values().map(|p| p.raw_text.as_str()).collect::<Vec<_>>().join(" ");
        let page = json.keys().next().copied().or_else(|| merged.keys().next().map(|p| p + 1)).unwrap_or(1);

        tracing::debug!(pages = json.len(), anchor = page, "committed selection");
        Some(PendingAnnotation { label: label.clone(), raw_text, target: AnnotationTarget::Tokens { page, json }, structural: false })
    }
}

fn resolve_page(index: &TokenIndex, page_index: usize, boxes: &[BoundingBox]) -> Option<SinglePageAnnotationJson> {
    let tokens: Vec<_> = index
        .page_tokens(page_index)
        .iter()
        .filter(|t| boxes.iter().any(|b| t.bounds.overlaps(b)))
        .collect();
    let bounds = bounds_for_tokens(tokens.iter().copied())?;
    Some(SinglePageAnnotationJson {
        bounds,
        tokens_jsons: tokens.iter().map(|t| t.id()).collect(),
        raw_text: tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" "),
    })
}
