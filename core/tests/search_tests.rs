use annotation_core::model::{BoundingBox, Page, Token, TokenId};
use annotation_core::search::{search, SearchOptions, SearchResult};
use annotation_core::token_index::TokenIndex;

/// Lays words out left to right, 10 units wide with 5 units of gap.
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

#[test]
fn results_follow_document_order() {
    let index = TokenIndex::from_plain_text("abc abc abc");
    let starts: Vec<usize> = search("abc", &index, &SearchOptions::default()).iter().map(SearchResult::start).collect();
    assert_eq!(starts, vec![0, 4, 8]);

    let index = TokenIndex::build(&[page(0, &["abc", "abc", "abc"])]);
    let results = search("ABC", &index, &SearchOptions::default());
    let starts: Vec<usize> = results.iter().map(SearchResult::start).collect();
    assert_eq!(starts, vec![0, 4, 8]);
    let ids: Vec<usize> = results.iter().map(SearchResult::id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    // stable across repeats
    assert_eq!(search("ABC", &index, &SearchOptions::default()), results);
}

#[test]
fn token_context_stays_within_budget() {
    let index = TokenIndex::build(&[page(0, &["one", "two", "three", "four", "five"])]);
    let results = search("three", &index, &SearchOptions { context_chars: 5 });
    let SearchResult::Token(hit) = &results[0] else { panic!("expected token result") };
    assert_eq!(hit.full_context.lead_in, "two");
    assert_eq!(hit.full_context.matched, "three");
    assert_eq!(hit.full_context.lead_out, "four");
    assert!(hit.full_context.lead_in.chars().count() <= 5);
    assert!(hit.full_context.lead_out.chars().count() <= 5);
}

#[test]
fn context_is_clamped_at_edges() {
    let index = TokenIndex::build(&[page(0, &["alpha", "beta"])]);
    let results = search("alpha", &index, &SearchOptions { context_chars: 5 });
    assert_eq!(results[0].context().lead_in, "");
    assert_eq!(results[0].context().lead_out, "beta");

    let results = search("beta", &index, &SearchOptions { context_chars: 5 });
    assert_eq!(results[0].context().lead_in, "alpha");
    assert_eq!(results[0].context().lead_out, "");
}

#[test]
fn partial_token_match_does_not_echo_its_own_token_as_context() {
    let index = TokenIndex::build(&[page(0, &["red", "xabcx", "blue"])]);
    let results = search("abc", &index, &SearchOptions::default());
    assert_eq!(results[0].context().lead_in, "red");
    assert_eq!(results[0].context().matched, "abc");
    assert_eq!(results[0].context().lead_out, "blue");
}

#[test]
fn match_across_pages_is_grouped_per_page() {
    let index = TokenIndex::build(&[page(0, &["intro", "end"]), page(1, &["start", "outro"])]);
    let results = search("end start", &index, &SearchOptions::default());
    assert_eq!(results.len(), 1);
    let SearchResult::Token(hit) = &results[0] else { panic!("expected token result") };
    assert_eq!(hit.start_page, 0);
    assert_eq!(hit.end_page, 1);
    assert_eq!(hit.tokens[&0], vec![TokenId { page_index: 0, token_index: 1 }]);
    assert_eq!(hit.tokens[&1], vec![TokenId { page_index: 1, token_index: 0 }]);
    assert_eq!(hit.bounds[&0], BoundingBox::new(15.0, 0.0, 25.0, 10.0));
    assert_eq!(hit.bounds[&1], BoundingBox::new(0.0, 0.0, 10.0, 10.0));
}

#[test]
fn page_without_token_layer_does_not_break_search() {
    let pages = vec![Page { page_index: 0, text: "needle in scan".into(), tokens: None }, page(1, &["needle", "here"])];
    let index = TokenIndex::build(&pages);
    let results = search("needle", &index, &SearchOptions::default());
    // only the positioned occurrence can be located
    assert_eq!(results.len(), 1);
    let SearchResult::Token(hit) = &results[0] else { panic!("expected token result") };
    assert_eq!(hit.start_page, 1);
}

#[test]
fn span_results_for_plain_text() {
    let index = TokenIndex::from_plain_text("The Cat sat on the cat mat");
    let results = search("cat", &index, &SearchOptions { context_chars: 4 });
    assert_eq!(results.len(), 2);
    let SearchResult::Span(first) = &results[0] else { panic!("expected span result") };
    assert_eq!((first.start_index, first.end_index), (4, 7));
    assert_eq!(first.text, "Cat");
    assert_eq!(first.full_context.lead_in, "The ");
    assert_eq!(first.full_context.lead_out, " sat");
}

#[test]
fn context_stops_at_a_wide_untokenized_stretch() {
    let scanned = |text: String| Page { page_index: 1, text, tokens: None };
    let options = SearchOptions { context_chars: 5 };

    let index = TokenIndex::build(&[page(0, &["alpha"]), scanned("x".repeat(500)), page(2, &["omega"])]);
    let results = search("alpha", &index, &options);
    assert_eq!(results[0].context().lead_out, "");
    let results = search("omega", &index, &options);
    assert_eq!(results[0].context().lead_in, "");

    let index = TokenIndex::build(&[page(0, &["alpha"]), scanned("x".into()), page(2, &["omega"])]);
    let results = search("alpha", &index, &options);
    assert_eq!(results[0].context().lead_out, "omega");
}
