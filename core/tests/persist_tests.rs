use annotation_core::model::{BoundingBox, Page, Token};
use annotation_core::persist::{load_meta, load_pages, load_token_index, save_meta, save_token_index, IndexPaths, MetaFile};
use annotation_core::search::{search, SearchOptions};
use annotation_core::token_index::TokenIndex;
use std::fs;
use tempfile::tempdir;

#[test]
fn persisted_index_answers_the_same_searches() {
    let dir = tempdir().unwrap();
    let pages_json = r#"[
        {"page_index": 0, "text": "Lease agreement", "tokens": [
            {"page_index": 0, "token_index": 0, "text": "Lease", "bounds": {"left": 0, "top": 0, "right": 30, "bottom": 10}},
            {"page_index": 0, "token_index": 1, "text": "agreement", "bounds": {"left": 35, "top": 0, "right": 90, "bottom": 10}}
        ]},
        {"page_index": 1, "text": "scanned page"}
    ]"#;
    let pages_path = dir.path().join("pages.json");
    fs::write(&pages_path, pages_json).unwrap();

    let pages: Vec<Page> = load_pages(&pages_path).unwrap();
    assert!(pages[1].tokens.is_none());
    let index = TokenIndex::build(&pages);

    let paths = IndexPaths::new(dir.path().join("index"));
    save_token_index(&paths, &index).unwrap();
    save_meta(&paths, &MetaFile::describe(&index, "2024-01-01T00:00:00Z".into())).unwrap();

    let loaded = load_token_index(&paths).unwrap();
    let meta = load_meta(&paths).unwrap();
    assert_eq!(meta.page_count, 2);
    assert_eq!(meta.missing_token_layers, vec![1]);
    assert_eq!(loaded.full_text(), index.full_text());
    let opts = SearchOptions::default();
    assert_eq!(search("agree", &loaded, &opts), search("agree", &index, &opts));
}

#[test]
fn unknown_index_version_is_refused() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    let token = Token { page_index: 0, token_index: 0, text: "x".into(), bounds: BoundingBox::new(0.0, 0.0, 1.0, 1.0) };
    let index = TokenIndex::build(&[Page { page_index: 0, text: "x".into(), tokens: Some(vec![token]) }]);
    let mut meta = MetaFile::describe(&index, String::new());
    meta.version = 99;
    save_token_index(&paths, &index).unwrap();
    save_meta(&paths, &meta).unwrap();
    assert!(load_meta(&paths).is_err());
    assert!(load_token_index(&paths).is_err());
}
