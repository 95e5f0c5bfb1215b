use crate::model::{BoundingBox, Page, Token, TokenId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inserted between consecutive tokens and between pages. Never mapped to a token.
pub const SEPARATOR: char = ' ';

/// Char offset -> token lookup over the flattened document text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharMap(Vec<Option<TokenId>>);

impl CharMap {
    pub fn get(&self, offset: usize) -> Option<TokenId> { self.0.get(offset).copied().flatten() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// Token geometry and text layout for one loaded document, built once at load time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenIndex {
    full_text: String,
    char_len: usize,
    char_map: Option<CharMap>,
    pages: BTreeMap<usize, Vec<Token>>,
    missing_token_layers: Vec<usize>,
}

impl TokenIndex {
    /// Flattens `pages` in order. Pages without a token layer contribute their raw text unmapped
    /// and are listed in `missing_token_layers` instead of failing the build.
    pub fn build(pages: &[Page]) -> Self {
        let mut full_text = String::new();
        let mut map: Vec<Option<TokenId>> = Vec::new();
        let mut geometry = BTreeMap::new();
        let mut missing = Vec::new();

        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                full_text.push(SEPARATOR);
                map.push(None);
            }
            match &page.tokens {
                Some(tokens) => {
                    let mut first = true;
                    for token in tokens.iter().filter(|t| !t.text.is_empty()) {
                        if !first {
                            full_text.push(SEPARATOR);
                            map.push(None);
                        }
                        first = false;
                        let id = token.id();
                        for ch in token.text.chars() {
                            full_text.push(ch);
                            map.push(Some(id));
                        }
                    }
                    geometry.insert(page.page_index, tokens.clone());
                }
                None => {
                    tracing::warn!(page_index = page.page_index, "page has no token layer; overlay disabled for it");
                    missing.push(page.page_index);
                    for ch in page.text.chars() {
                        full_text.push(ch);
                        map.push(None);
                    }
                    geometry.insert(page.page_index, Vec::new());
                }
            }
        }

        tracing::debug!(pages = pages.len(), chars = map.len(), missing = missing.len(), "built token index");
        Self { char_len: map.len(), full_text, char_map: Some(CharMap(map)), pages: geometry, missing_token_layers: missing }
    }

    /// Index for a plain-text document: no geometry, no char map.
    pub fn from_plain_text(text: impl Into<String>) -> Self {
        let full_text = text.into();
        Self { char_len: full_text.chars().count(), full_text, ..Self::default() }
    }

    pub fn full_text(&self) -> &str { &self.full_text }

    /// Length of `full_text` in chars.
    pub fn char_len(&self) -> usize { self.char_len }

    pub fn char_map(&self) -> Option<&CharMap> { self.char_map.as_ref() }

    pub fn lookup(&self, offset: usize) -> Option<TokenId> { self.char_map.as_ref().and_then(|m| m.get(offset)) }

    pub fn page_count(&self) -> usize { self.pages.len() }

    pub fn page_tokens(&self, page_index: usize) -> &[Token] {
        self.pages.get(&page_index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn token(&self, id: TokenId) -> Option<&Token> {
        let tokens = self.pages.get(&id.page_index)?;
        match tokens.get(id.token_index) {
            Some(t) if t.token_index == id.token_index => Some(t),
            _ => tokens.iter().find(|t| t.token_index == id.token_index),
        }
    }

    pub fn has_token_layer(&self, page_index: usize) -> bool {
        self.pages.contains_key(&page_index) && !self.missing_token_layers.contains(&page_index)
    }

    pub fn missing_token_layers(&self) -> &[usize] { &self.missing_token_layers }

    /// Tokens on `page_index` whose boxes overlap `selection`, in token order.
    pub fn tokens_in_box(&self, page_index: usize, selection: &BoundingBox) -> Vec<&Token> {
        self.page_tokens(page_index).iter().filter(|t| t.bounds.overlaps(selection)).collect()
    }
}

/// Smallest box enclosing every given token; `None` for no tokens.
pub fn bounds_for_tokens<'a, I>(tokens: I) -> Option<BoundingBox>
where
    I: IntoIterator<Item = &'a Token>,
{
    tokens.into_iter().map(|t| t.bounds.normalized()).reduce(|acc, b| acc.union(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(page: usize, idx: usize, text: &str, left: f64) -> Token {
        Token { page_index: page, token_index: idx, text: text.into(), bounds: BoundingBox::new(left, 0.0, left + 10.0, 10.0) }
    }

    #[test]
    fn maps_every_token_char_and_leaves_separators_unmapped() {
        let pages = vec![
            Page { page_index: 0, text: String::new(), tokens: Some(vec![token(0, 0, "ab", 0.0), token(0, 1, "c", 20.0)]) },
            Page { page_index: 1, text: String::new(), tokens: Some(vec![token(1, 0, "de", 0.0)]) },
        ];
        let index = TokenIndex::build(&pages);
        assert_eq!(index.full_text(), "ab c de");
        assert_eq!(index.lookup(1), Some(TokenId { page_index: 0, token_index: 0 }));
        assert_eq!(index.lookup(2), None);
        assert_eq!(index.lookup(3), Some(TokenId { page_index: 0, token_index: 1 }));
        assert_eq!(index.lookup(4), None);
        assert_eq!(index.lookup(6), Some(TokenId { page_index: 1, token_index: 0 }));
        assert_eq!(index.char_len(), 7);
    }

    #[test]
    fn missing_token_layer_is_reported_not_fatal() {
        let pages = vec![
            Page { page_index: 0, text: "scanned".into(), tokens: None },
            Page { page_index: 1, text: String::new(), tokens: Some(vec![token(1, 0, "ok", 0.0)]) },
        ];
        let index = TokenIndex::build(&pages);
        assert_eq!(index.missing_token_layers(), &[0]);
        assert!(!index.has_token_layer(0));
        assert!(index.has_token_layer(1));
        assert_eq!(index.full_text(), "scanned ok");
        assert_eq!(index.lookup(0), None);
        assert!(index.page_tokens(0).is_empty());
    }

    #[test]
    fn bounds_enclose_all_tokens() {
        let toks = vec![token(0, 0, "a", 0.0), token(0, 1, "b", 30.0)];
        assert_eq!(bounds_for_tokens(&toks), Some(BoundingBox::new(0.0, 0.0, 40.0, 10.0)));
        assert_eq!(bounds_for_tokens(&Vec::<Token>::new()), None);
    }

    #[test]
    fn plain_text_has_no_char_map() {
        let index = TokenIndex::from_plain_text("héllo");
        assert!(index.char_map().is_none());
        assert_eq!(index.char_len(), 5);
    }
}
