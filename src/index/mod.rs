//! Searchable indexes over extracted symbols
//!
//! - [`SymbolTable`] for exact lookups and filtered listing
//! - [`Bm25Index`] and [`TfIdfIndex`] for free-text ranking
//! - [`hybrid_search`] fusing both with reciprocal rank fusion

pub mod bm25;
pub mod symbols;
pub mod tfidf;

use std::collections::HashMap;

pub use bm25::{tokenize, Bm25Index, ScoredDoc};
pub use symbols::{SymbolFilter, SymbolTable};
pub use tfidf::TfIdfIndex;

use crate::schema::{Symbol, SymbolId};

/// Reciprocal rank fusion constant
pub const RRF_K: f64 = 60.0;

/// Terms describing a symbol. Name terms are repeated to weigh them above
/// the path, signature and doc comment.
pub fn symbol_terms(symbol: &Symbol) -> Vec<String> {
    let mut terms = bm25::tokenize_all(&symbol.name);
    terms.extend(bm25::tokenize_all(&symbol.name));
    if let Some(container) = &symbol.container {
        terms.extend(bm25::tokenize_all(container));
    }
    terms.extend(path_terms(&symbol.file));
    terms.push(symbol.kind.as_str().to_string());
    terms.extend(bm25::tokenize_all(&symbol.signature));
    if let Some(doc) = &symbol.doc {
        terms.extend(bm25::tokenize_all(doc));
    }
    terms
}

/// File stem and parent directory terms
fn path_terms(path: &str) -> Vec<String> {
    let mut parts = path.rsplit('/');
    let file = parts.next().unwrap_or(path);
    let stem = file.split('.').next().unwrap_or(file);
    let mut terms = bm25::tokenize_all(stem);
    if let Some(dir) = parts.next() {
        terms.extend(bm25::tokenize_all(dir));
    }
    terms
}

/// Fuse ranked id lists with `score = Σ 1 / (k + rank)`, ranks starting at 1
pub fn rrf_fuse(lists: &[Vec<SymbolId>], k: f64) -> Vec<(SymbolId, f64)> {
    let mut scores: HashMap<SymbolId, f64> = HashMap::new();
    for list in lists {
        for (rank, id) in list.iter().enumerate() {
            *scores.entry(*id).or_insert(0.0) += 1.0 / (k + rank as f64 + 1.0);
        }
    }
    let mut fused: Vec<(SymbolId, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}

/// BM25 and TF-IDF results fused with RRF
pub fn hybrid_search(bm25: &Bm25Index, tfidf: &TfIdfIndex, query: &str, limit: usize) -> Vec<ScoredDoc> {
    let depth = limit.saturating_mul(3).max(30);
    let bm25_hits = bm25.search(query, depth);
    let tfidf_hits = tfidf.search(query, depth);

    let mut matched: HashMap<SymbolId, Vec<String>> = HashMap::new();
    for hit in bm25_hits.iter().chain(tfidf_hits.iter()) {
        let terms = matched.entry(hit.id).or_default();
        for term in &hit.matched_terms {
            if !terms.contains(term) {
                terms.push(term.clone());
            }
        }
    }

    let lists = [
        bm25_hits.iter().map(|h| h.id).collect::<Vec<_>>(),
        tfidf_hits.iter().map(|h| h.id).collect::<Vec<_>>(),
    ];
    rrf_fuse(&lists, RRF_K)
        .into_iter()
        .take(limit)
        .map(|(id, score)| ScoredDoc {
            id,
            score,
            matched_terms: matched.remove(&id).unwrap_or_default(),
        })
        .collect()
}
