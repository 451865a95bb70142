//! BM25 ranking over symbol documents
//!
//! Unlike exact symbol name matching, BM25 answers loose term queries like
//! "authentication", "error handling" or "database connection" with code
//! that is conceptually related.
//!
//! # Parameters
//!
//! - k1 = 1.2 (term frequency saturation)
//! - b = 0.75 (document length normalization)
//! - IDF = ln((N - df + 0.5) / (df + 0.5) + 1)

use std::collections::HashSet;

use ahash::AHashMap;

use crate::schema::SymbolId;

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// One ranked hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDoc {
    pub id: SymbolId,
    pub score: f64,
    /// Query terms that matched this document
    pub matched_terms: Vec<String>,
}

#[derive(Debug, Clone)]
struct Posting {
    doc: SymbolId,
    tf: u32,
}

/// Inverted index with BM25 scoring
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    postings: AHashMap<String, Vec<Posting>>,
    doc_lengths: AHashMap<SymbolId, u32>,
    avg_doc_length: f64,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document. Repeated terms raise its term frequency.
    pub fn add_document(&mut self, id: SymbolId, terms: &[String]) {
        let mut term_freqs: AHashMap<&str, u32> = AHashMap::new();
        for term in terms {
            *term_freqs.entry(term.as_str()).or_insert(0) += 1;
        }
        for (term, tf) in term_freqs {
            self.postings
                .entry(term.to_string())
                .or_default()
                .push(Posting { doc: id, tf });
        }
        self.doc_lengths.insert(id, terms.len() as u32);
    }

    /// Compute corpus statistics. Call once after the last `add_document`.
    pub fn finalize(&mut self) {
        let total = self.doc_lengths.len();
        self.avg_doc_length = if total > 0 {
            self.doc_lengths.values().map(|&l| l as f64).sum::<f64>() / total as f64
        } else {
            0.0
        };
    }

    pub fn len(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }

    /// Search the index with BM25 ranking
    pub fn search(&self, query: &str, limit: usize) -> Vec<ScoredDoc> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.is_empty() {
            return Vec::new();
        }

        let total_docs = self.doc_lengths.len() as f64;
        let avg_len = if self.avg_doc_length > 0.0 {
            self.avg_doc_length
        } else {
            1.0
        };
        let mut scores: AHashMap<SymbolId, (f64, Vec<String>)> = AHashMap::new();

        for term in &query_terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let df = postings.len() as f64;
            let idf = ((total_docs - df + 0.5) / (df + 0.5) + 1.0).ln();

            for posting in postings {
                let tf = posting.tf as f64;
                let doc_len = self.doc_lengths.get(&posting.doc).copied().unwrap_or(0) as f64;
                let numerator = tf * (K1 + 1.0);
                let denominator = tf + K1 * (1.0 - B + B * doc_len / avg_len);

                let (score, matched) = scores.entry(posting.doc).or_insert((0.0, Vec::new()));
                *score += idf * numerator / denominator;
                if !matched.contains(term) {
                    matched.push(term.clone());
                }
            }
        }

        let mut results: Vec<ScoredDoc> = scores
            .into_iter()
            .map(|(id, (score, matched_terms))| ScoredDoc {
                id,
                score,
                matched_terms,
            })
            .collect();
        sort_scored(&mut results);
        results.truncate(limit);
        results
    }

    /// Terms that co-occur most often with the query terms
    pub fn suggest_related_terms(&self, query: &str, limit: usize) -> Vec<String> {
        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        if query_terms.is_empty() {
            return Vec::new();
        }

        let matching_docs: HashSet<SymbolId> = query_terms
            .iter()
            .filter_map(|t| self.postings.get(t))
            .flatten()
            .map(|p| p.doc)
            .collect();
        if matching_docs.is_empty() {
            return Vec::new();
        }

        let mut terms: Vec<(&String, usize)> = self
            .postings
            .iter()
            .filter(|(term, _)| !query_terms.contains(*term))
            .map(|(term, postings)| {
                let count = postings
                    .iter()
                    .filter(|p| matching_docs.contains(&p.doc))
                    .count();
                (term, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect();
        terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        terms.truncate(limit);
        terms.into_iter().map(|(t, _)| t.clone()).collect()
    }
}

/// Score descending, then id for a stable order
pub(crate) fn sort_scored(results: &mut [ScoredDoc]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Tokenize text into unique searchable terms, in order of first appearance.
///
/// Splits on non-alphanumerics and on camelCase boundaries, lowercases, and
/// drops terms shorter than two characters and stop words. The whole word is
/// kept alongside its segments so `getUser` matches both `get_user` and
/// `getuser`.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize_all(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Like [`tokenize`] but keeps repeated terms, for term-frequency counting
pub fn tokenize_all(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let segments = split_camel_case(word);
        let multi = segments.len() > 1;
        for segment in segments {
            push_term(&mut terms, &segment);
        }
        if multi {
            push_term(&mut terms, word);
        }
    }
    terms
}

fn push_term(terms: &mut Vec<String>, raw: &str) {
    let lower = raw.to_lowercase();
    if lower.chars().count() >= 2 && !is_stop_word(&lower) {
        terms.push(lower);
    }
}

/// `parseHTTPResponse2` -> [parse, HTTP, Response2]
fn split_camel_case(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                segments.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Common words with little search value
fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "the" | "a" | "an" | "is" | "are" | "was" | "be" | "to" | "of" | "and" |
        "in" | "it" | "for" | "on" | "with" | "as" | "at" | "by" | "or" | "if" |
        "fn" | "let" | "var" | "const" | "mut" | "pub" | "self" | "impl" | "def" |
        "func" | "this" | "return"
    )
}
