//! TF-IDF vectors with cosine similarity

use ahash::AHashMap;

use super::bm25::{sort_scored, tokenize_all, ScoredDoc};
use crate::schema::SymbolId;

/// Sparse TF-IDF index.
///
/// Documents are collected as raw term counts and turned into L2-normalized
/// weight vectors by `finalize`, so a query score is a plain dot product.
#[derive(Debug, Clone, Default)]
pub struct TfIdfIndex {
    pending: Vec<(SymbolId, AHashMap<String, u32>)>,
    /// term -> (doc, normalized weight)
    postings: AHashMap<String, Vec<(SymbolId, f64)>>,
    idf: AHashMap<String, f64>,
    docs: usize,
}

impl TfIdfIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&mut self, id: SymbolId, terms: &[String]) {
        let mut counts: AHashMap<String, u32> = AHashMap::new();
        for term in terms {
            *counts.entry(term.clone()).or_insert(0) += 1;
        }
        self.pending.push((id, counts));
    }

    pub fn finalize(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.docs += pending.len();

        let mut df: AHashMap<&str, usize> = AHashMap::new();
        for (_, counts) in &pending {
            for term in counts.keys() {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }
        let n = self.docs as f64;
        self.idf = df
            .into_iter()
            .map(|(term, df)| (term.to_string(), (n / df as f64).ln() + 1.0))
            .collect();

        self.postings.clear();
        for (id, counts) in &pending {
            let weights: Vec<(&String, f64)> = counts
                .iter()
                .map(|(term, &tf)| {
                    let idf = self.idf.get(term).copied().unwrap_or(1.0);
                    (term, (1.0 + (tf as f64).ln()) * idf)
                })
                .collect();
            let norm = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            if norm == 0.0 {
                continue;
            }
            for (term, weight) in weights {
                self.postings
                    .entry(term.clone())
                    .or_default()
                    .push((*id, weight / norm));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.docs
    }

    pub fn is_empty(&self) -> bool {
        self.docs == 0
    }

    /// Rank documents by cosine similarity to the query
    pub fn search(&self, query: &str, limit: usize) -> Vec<ScoredDoc> {
        let mut counts: AHashMap<String, u32> = AHashMap::new();
        for term in tokenize_all(query) {
            *counts.entry(term).or_insert(0) += 1;
        }
        let query_vec: Vec<(&String, f64)> = counts
            .iter()
            .filter_map(|(term, &tf)| {
                let idf = self.idf.get(term)?;
                Some((term, (1.0 + (tf as f64).ln()) * idf))
            })
            .collect();
        let norm = query_vec.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm == 0.0 {
            return Vec::new();
        }

        let mut scores: AHashMap<SymbolId, (f64, Vec<String>)> = AHashMap::new();
        for (term, weight) in &query_vec {
            let Some(postings) = self.postings.get(*term) else {
                continue;
            };
            for (doc, doc_weight) in postings {
                let entry = scores.entry(*doc).or_insert((0.0, Vec::new()));
                entry.0 += weight / norm * doc_weight;
                entry.1.push((*term).clone());
            }
        }

        let mut results: Vec<ScoredDoc> = scores
            .into_iter()
            .map(|(id, (score, mut matched_terms))| {
                matched_terms.sort();
                ScoredDoc {
                    id,
                    score,
                    matched_terms,
                }
            })
            .collect();
        sort_scored(&mut results);
        results.truncate(limit);
        results
    }
}
