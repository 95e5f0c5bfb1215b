use annotation_core::model::{AnnotationLabel, AnnotationTarget, BoundingBox, LabelType, Page, Token, TokenId};
use annotation_core::selection::SelectionBuilder;
use annotation_core::token_index::TokenIndex;

fn page(page_index: usize, words: &[&str]) -> Page {
    let tokens = words
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let left = i as f64 * 15.0;
            Token { page_index, token_index: i, text: w.to_string(), bounds: BoundingBox::new(left, 0.0, left + 10.0, 10.0) }
        })
        .collect();
    Page { page_index, text: words.join(" "), tokens: Some(tokens) }
}

fn label() -> AnnotationLabel {
    AnnotationLabel { id: "l1".into(), text: "Party".into(), label_type: LabelType::TokenLabel, color: None, description: None }
}

fn over_token(i: usize) -> BoundingBox {
    let left = i as f64 * 15.0;
    BoundingBox::new(left + 1.0, 1.0, left + 9.0, 9.0)
}

#[test]
fn active_selection_merges_into_queued_page() {
    let index = TokenIndex::build(&[page(0, &["zero"]), page(1, &["a", "b", "c", "d"])]);
    let mut builder = SelectionBuilder::new();
    builder.enqueue(1, over_token(0));
    builder.set_active(1, over_token(2));

    let pending = builder.commit(&index, Some(&label())).expect("label set");
    let AnnotationTarget::Tokens { page, json } = &pending.target else { panic!("expected token target") };
    assert_eq!(*page, 2);
    assert_eq!(json.len(), 1);
    let p = &json[&2];
    assert_eq!(p.tokens_jsons, vec![TokenId { page_index: 1, token_index: 0 }, TokenId { page_index: 1, token_index: 2 }]);
    assert_eq!(p.raw_text, "a c");
    assert_eq!(p.bounds, BoundingBox::new(0.0, 0.0, 40.0, 10.0));
    assert!(builder.queue().is_empty());
    assert!(builder.active().is_none());
}

#[test]
fn no_label_is_a_no_op() {
    let index = TokenIndex::build(&[page(0, &["a"])]);
    let mut builder = SelectionBuilder::new();
    builder.enqueue(0, over_token(0));
    builder.set_active(0, over_token(0));
    assert!(builder.commit(&index, None).is_none());
    assert_eq!(builder.queue().get(&0).map(Vec::len), Some(1));
    assert!(builder.active().is_some());
}

#[test]
fn pages_join_in_ascending_order_and_empty_pages_drop() {
    let index = TokenIndex::build(&[page(0, &["first"]), page(1, &["x"]), page(2, &["last", "word"])]);
    let mut builder = SelectionBuilder::new();
    builder.enqueue(2, over_token(1));
    builder.enqueue(0, over_token(0));
    // nothing under this box on page 1
    builder.set_active(1, BoundingBox::new(100.0, 100.0, 120.0, 120.0));

    let pending = builder.commit(&index, Some(&label())).unwrap();
    let AnnotationTarget::Tokens { page, json } = &pending.target else { panic!("expected token target") };
    assert_eq!(*page, 1);
    assert_eq!(json.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(pending.raw_text, "first word");
    assert!(pending.is_submittable());
}

#[test]
fn commit_without_matching_tokens_is_not_submittable() {
    let index = TokenIndex::build(&[page(0, &["a"])]);
    let mut builder = SelectionBuilder::new();
    builder.set_active(0, BoundingBox::new(500.0, 500.0, 510.0, 510.0));
    let pending = builder.commit(&index, Some(&label())).unwrap();
    let AnnotationTarget::Tokens { json, .. } = &pending.target else { panic!("expected token target") };
    assert!(json.is_empty());
    assert!(!pending.is_submittable());
    // consumed regardless
    assert!(builder.active().is_none());
}

#[test]
fn cancel_and_queue_active() {
    let mut builder = SelectionBuilder::new();
    builder.set_active(3, over_token(0));
    builder.queue_active();
    assert!(builder.active().is_none());
    assert_eq!(builder.queue().get(&3).map(Vec::len), Some(1));
    builder.cancel();
    assert!(builder.queue().is_empty());
}
