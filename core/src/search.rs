use crate::model::{BoundingBox, TokenId};
use crate::token_index::{bounds_for_tokens, CharMap, TokenIndex, SEPARATOR};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const DEFAULT_CONTEXT_CHARS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Upper bound on lead-in and lead-out length, in chars.
    pub context_chars: usize,
}

impl Default for SearchOptions {
    fn default() -> Self { Self { context_chars: DEFAULT_CONTEXT_CHARS } }
}

/// Renderable surroundings of a match, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchContext {
    pub lead_in: String,
    pub matched: String,
    pub lead_out: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSearchTokenResult {
    pub id: usize,
    /// Char range of the match in the flattened text.
    pub start: usize,
    pub end: usize,
    /// Tokens under the match, grouped by 0-based page index.
    pub tokens: BTreeMap<usize, Vec<TokenId>>,
    pub bounds: BTreeMap<usize, BoundingBox>,
    pub start_page: usize,
    pub end_page: usize,
    pub full_context: SearchContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSearchSpanResult {
    pub id: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub text: String,
    pub full_context: SearchContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchResult {
    Token(TextSearchTokenResult),
    Span(TextSearchSpanResult),
}

impl SearchResult {
    pub fn id(&self) -> usize {
        match self {
            Self::Token(r) => r.id,
            Self::Span(r) => r.id,
        }
    }

    pub fn start(&self) -> usize {
        match self {
            Self::Token(r) => r.start,
            Self::Span(r) => r.start_index,
        }
    }

    pub fn context(&self) -> &SearchContext {
        match self {
            Self::Token(r) => &r.full_context,
            Self::Span(r) => &r.full_context,
        }
    }
}

/// Every case-insensitive, non-overlapping occurrence of `term`, in document order.
pub fn search(term: &str, index: &TokenIndex, options: &SearchOptions) -> Vec<SearchResult> {
    if term.is_empty() { return Vec::new(); }
    let pattern = match RegexBuilder::new(&regex::escape(term)).case_insensitive(true).build() {
        Ok(p) => p,
        Err(err) => {
            tracing::warn!(%err, "search term could not be compiled");
            return Vec::new();
        }
    };

    let text = index.full_text();
    let chars: Vec<char> = text.chars().collect();
    // byte offset of every char start, for converting regex byte offsets
    let char_starts: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    let to_char = |byte: usize| char_starts.binary_search(&byte).unwrap_or_else(|i| i);

    let mut results = Vec::new();
    for m in pattern.find_iter(text) {
        let start = to_char(m.start());
        let end = to_char(m.end());
        let id = results.len();
        let result = match index.char_map() {
            Some(map) => match token_result(id, start, end, m.as_str(), index, map, options) {
                Some(r) => SearchResult::Token(r),
                None => {
                    tracing::debug!(start, end, "match covers no tokens; skipped");
                    continue;
                }
            },
            None => SearchResult::Span(span_result(id, start, end, m.as_str(), &chars, options)),
        };
        results.push(result);
    }
    tracing::debug!(term, hits = results.len(), "search complete");
    results
}

fn token_result(id: usize, start: usize, end: usize, matched: &str, index: &TokenIndex, map: &CharMap, options: &SearchOptions) -> Option<TextSearchTokenResult> {
    let mut covered: Vec<TokenId> = Vec::new();
    for offset in start..end {
        if let Some(tid) = map.get(offset) {
            if covered.last() != Some(&tid) { covered.push(tid); }
        }
    }
    if covered.is_empty() { return None; }

    let mut tokens: BTreeMap<usize, Vec<TokenId>> = BTreeMap::new();
    for tid in &covered { tokens.entry(tid.page_index).or_default().push(*tid); }
    let bounds: BTreeMap<usize, BoundingBox> = tokens
        .iter()
        .filter_map(|(page, ids)| bounds_for_tokens(ids.iter().filter_map(|t| index.token(*t))).map(|b| (*page, b)))
        .collect();
    let start_page = *tokens.keys().next()?;
    let end_page = *tokens.keys().next_back()?;

    let in_match: HashSet<TokenId> = covered.into_iter().collect();
    let before = (0..start).rev();
    let after = end..map.len();
    let lead_in = gather_tokens(before, index, map, &in_match, options.context_chars, true);
    let lead_out = gather_tokens(after, index, map, &in_match, options.context_chars, false);

    Some(TextSearchTokenResult {
        id,
        start,
        end,
        tokens,
        bounds,
        start_page,
        end_page,
        full_context: SearchContext { lead_in, matched: matched.to_string(), lead_out },
    })
}

/// Collects whole tokens while walking `offsets` until the next token would push the
/// joined text past `budget` chars, or an unmapped stretch longer than `budget` is crossed.
fn gather_tokens<I>(offsets: I, index: &TokenIndex, map: &CharMap, skip: &HashSet<TokenId>, budget: usize, backward: bool) -> String
where
    I: Iterator<Item = usize>,
{
    let mut picked: Vec<&str> = Vec::new();
    let mut used = 0usize;
    let mut gap = 0usize;
    let mut last: Option<TokenId> = None;
    for offset in offsets {
        let Some(tid) = map.get(offset) else {
            gap += 1;
            if gap > budget { break; }
            continue;
        };
        gap = 0;
        if last == Some(tid) || skip.contains(&tid) { continue; }
        last = Some(tid);
        let Some(token) = index.token(tid) else { continue };
        let len = token.text.chars().count() + if picked.is_empty() { 0 } else { 1 };
        if used + len > budget { break; }
        used += len;
        picked.push(token.text.as_str());
    }
    if backward { picked.reverse(); }
    picked.join(SEPARATOR.to_string().as_str())
}

fn span_result(id: usize, start: usize, end: usize, matched: &str, chars: &[char], options: &SearchOptions) -> TextSearchSpanResult {
    let lead_start = start.saturating_sub(options.context_chars);
    let lead_end = end.saturating_add(options.context_chars).min(chars.len());
    TextSearchSpanResult {
        id,
        start_index: start,
        end_index: end,
        text: matched.to_string(),
        full_context: SearchContext {
            lead_in: chars[lead_start..start].iter().collect(),
            matched: matched.to_string(),
            lead_out: chars[end..lead_end].iter().collect(),
        },
    }
}

/// Search results for the current term plus a cyclic selection cursor.
#[derive(Debug, Clone, Default)]
pub struct SearchSession {
    term: String,
    results: Vec<SearchResult>,
    selected: usize,
    options: SearchOptions,
}

impl SearchSession {
    pub fn new(options: SearchOptions) -> Self { Self { options, ..Self::default() } }

    /// Re-runs the search when `term` differs from the current one; the cursor returns to 0.
    pub fn set_term(&mut self, term: &str, index: &TokenIndex) -> &[SearchResult] {
        if term != self.term {
            self.term = term.to_string();
            self.results = search(term, index, &self.options);
            self.selected = 0;
        }
        &self.results
    }

    pub fn clear(&mut self) {
        self.term.clear();
        self.results.clear();
        self.selected = 0;
    }

    pub fn term(&self) -> &str { &self.term }
    pub fn results(&self) -> &[SearchResult] { &self.results }
    pub fn selected(&self) -> usize { self.selected }
    pub fn selected_result(&self) -> Option<&SearchResult> { self.results.get(self.selected) }

    pub fn advance(&mut self) -> usize {
        self.selected = if self.results.is_empty() { 0 } else { (self.selected + 1) % self.results.len() };
        self.selected
    }

    pub fn reverse(&mut self) -> usize {
        self.selected = match self.results.len() {
            0 => 0,
            n if self.selected == 0 => n - 1,
            _ => self.selected - 1,
        };
        self.selected
    }
}
