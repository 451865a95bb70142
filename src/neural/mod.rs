//! Neural (embedding) search
//!
//! Symbols are embedded through a remote embeddings API and ranked by cosine
//! similarity to the embedded query. Only the API backend is compiled in;
//! asking for the ONNX backend is a configuration error.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::wizard::ApiProvider;
use crate::error::{NarsilError, Result};
use crate::schema::{Symbol, SymbolId};

/// Symbols embedded per API request
pub const EMBED_BATCH: usize = 96;

/// Characters of symbol text sent per document
const MAX_DOC_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Api,
    Onnx,
}

impl FromStr for BackendKind {
    type Err = NarsilError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "onnx" => Ok(Self::Onnx),
            other => Err(NarsilError::ConfigError {
                message: format!("unknown neural backend '{}' (expected api or onnx)", other),
            }),
        }
    }
}

/// Resolved neural search settings
#[derive(Debug, Clone)]
pub struct NeuralConfig {
    pub backend: BackendKind,
    pub provider: ApiProvider,
    pub model: String,
    pub api_key: Option<String>,
    /// Override of the provider's embeddings URL
    pub endpoint: Option<String>,
}

impl NeuralConfig {
    /// Resolve from flags and the process environment
    pub fn from_env(backend: BackendKind, model: Option<String>, endpoint: Option<String>) -> Self {
        Self::resolve(backend, model, endpoint, |var| std::env::var(var).ok())
    }

    /// Resolve with an explicit variable lookup. The first provider with a
    /// non-empty key wins, in the order Voyage, OpenAI, custom.
    pub fn resolve(
        backend: BackendKind,
        model: Option<String>,
        endpoint: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let found = [ApiProvider::Voyage, ApiProvider::OpenAI, ApiProvider::Custom]
            .into_iter()
            .find_map(|p| {
                lookup(p.env_var_name())
                    .filter(|k| !k.trim().is_empty())
                    .map(|k| (p, k))
            });
        let (provider, api_key) = match found {
            Some((p, k)) => (p, Some(k)),
            None => (ApiProvider::Voyage, None),
        };
        let endpoint = endpoint.or_else(|| lookup("EMBEDDING_API_URL"));
        Self {
            backend,
            provider,
            model: model.unwrap_or_else(|| default_model(provider).to_string()),
            api_key,
            endpoint,
        }
    }

    fn url(&self) -> Result<String> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }
        match self.provider {
            ApiProvider::Voyage => Ok("https://api.voyageai.com/v1/embeddings".into()),
            ApiProvider::OpenAI => Ok("https://api.openai.com/v1/embeddings".into()),
            ApiProvider::Custom => Err(NarsilError::ConfigError {
                message: "EMBEDDING_API_KEY is set but no endpoint; set EMBEDDING_API_URL".into(),
            }),
        }
    }
}

pub fn default_model(provider: ApiProvider) -> &'static str {
    match provider {
        ApiProvider::Voyage => "voyage-code-2",
        ApiProvider::OpenAI | ApiProvider::Custom => "text-embedding-3-small",
    }
}

/// What a text is embedded as; some providers embed queries differently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Document,
    Query,
}

pub trait EmbeddingBackend: Send + Sync {
    fn name(&self) -> String;

    /// One vector per input text, in input order
    fn embed(&self, texts: &[String], kind: InputKind) -> Result<Vec<Vec<f32>>>;
}

/// Create the configured backend
pub fn create_backend(config: &NeuralConfig) -> Result<Box<dyn EmbeddingBackend>> {
    match config.backend {
        BackendKind::Onnx => Err(NarsilError::ConfigError {
            message: "the ONNX backend is not compiled into this build; use --neural-backend api".into(),
        }),
        BackendKind::Api => Ok(Box::new(ApiEmbedder::new(config)?)),
    }
}

/// Voyage / OpenAI compatible embeddings client
pub struct ApiEmbedder {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    api_key: String,
    provider: ApiProvider,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl ApiEmbedder {
    pub fn new(config: &NeuralConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| NarsilError::ConfigError {
            message: "neural search needs VOYAGE_API_KEY, OPENAI_API_KEY or EMBEDDING_API_KEY".into(),
        })?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("narsil-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NarsilError::NeuralError {
                message: format!("cannot build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            url: config.url()?,
            model: config.model.clone(),
            api_key,
            provider: config.provider,
        })
    }

    fn request_body(&self, texts: &[String], kind: InputKind) -> serde_json::Value {
        let mut body = serde_json::json!({
            "input": texts,
            "model": self.model,
        });
        if self.provider == ApiProvider::Voyage {
            body["input_type"] = serde_json::json!(match kind {
                InputKind::Document => "document",
                InputKind::Query => "query",
            });
        }
        body
    }
}

impl EmbeddingBackend for ApiEmbedder {
    fn name(&self) -> String {
        format!("{} ({})", self.provider.display_name(), self.model)
    }

    fn embed(&self, texts: &[String], kind: InputKind) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let neural_err = |message: String| NarsilError::NeuralError { message };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(texts, kind))
            .send()
            .map_err(|e| neural_err(format!("request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(neural_err(format!("embeddings API returned {}: {}", status, body.trim())));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .map_err(|e| neural_err(format!("unexpected embeddings response: {}", e)))?;
        if parsed.data.len() != texts.len() {
            return Err(neural_err(format!(
                "asked for {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut items = parsed.data;
        items.sort_by_key(|item| item.index.unwrap_or(usize::MAX));
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}

/// Text embedded for a symbol
pub fn symbol_document(symbol: &Symbol) -> String {
    let mut text = format!("{} {}\n{}", symbol.kind.as_str(), symbol.qualified_name(), symbol.signature);
    if let Some(doc) = &symbol.doc {
        text.push('\n');
        text.push_str(doc);
    }
    text.push_str("\nfile: ");
    text.push_str(&symbol.file);
    if text.len() > MAX_DOC_CHARS {
        let cut = (0..=MAX_DOC_CHARS).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
        text.truncate(cut);
    }
    text
}

/// Unit-normalized embeddings keyed by symbol
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    ids: Vec<SymbolId>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Embed `symbols` in batches
    pub fn build<'a>(
        backend: &dyn EmbeddingBackend,
        symbols: impl IntoIterator<Item = &'a Symbol>,
    ) -> Result<Self> {
        let symbols: Vec<&Symbol> = symbols.into_iter().collect();
        let mut index = Self::new();
        for (n, chunk) in symbols.chunks(EMBED_BATCH).enumerate() {
            let docs: Vec<String> = chunk.iter().map(|s| symbol_document(s)).collect();
            let vectors = backend.embed(&docs, InputKind::Document)?;
            for (symbol, vector) in chunk.iter().zip(vectors) {
                index.insert(symbol.id, vector);
            }
            debug!("embedded batch {} ({} symbols)", n + 1, chunk.len());
        }
        info!("built vector index with {} symbols using {}", index.len(), backend.name());
        Ok(index)
    }

    pub fn insert(&mut self, id: SymbolId, mut vector: Vec<f32>) {
        normalize(&mut vector);
        self.ids.push(id);
        self.vectors.push(vector);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Top `limit` symbols by cosine similarity to `query`
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<(SymbolId, f32)> {
        let mut query = query.to_vec();
        normalize(&mut query);
        let mut scored: Vec<(SymbolId, f32)> = self
            .ids
            .iter()
            .zip(&self.vectors)
            .filter(|(_, v)| v.len() == query.len())
            .map(|(id, v)| (*id, dot(v, &query)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);
        scored
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalize(v: &mut [f32]) {
    let norm = dot(v, v).sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Lang;
    use crate::schema::{Span, SymbolKind};
    use std::collections::HashMap;

    /// Deterministic bag-of-letters embedding
    struct LetterEmbedder;

    impl EmbeddingBackend for LetterEmbedder {
        fn name(&self) -> String {
            "letters".into()
        }

        fn embed(&self, texts: &[String], _kind: InputKind) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                        v[(c - b'a') as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    fn symbol(name: &str) -> Symbol {
        let span = Span {
            start_line: 1,
            end_line: 2,
            start_byte: 0,
            end_byte: 10,
        };
        Symbol {
            id: SymbolId::new("m.py", &span, name),
            name: name.into(),
            kind: SymbolKind::Function,
            file: "m.py".into(),
            lang: Lang::Python,
            span,
            scope: None,
            container: None,
            signature: String::new(),
            doc: None,
            exported: true,
        }
    }

    #[test]
    fn test_resolve_provider_order() {
        let env: HashMap<&str, &str> = [("OPENAI_API_KEY", "sk-123456789012"), ("EMBEDDING_API_KEY", "x")].into();
        let config = NeuralConfig::resolve(BackendKind::Api, None, None, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.provider, ApiProvider::OpenAI);
        assert_eq!(config.model, "text-embedding-3-small");
        assert_eq!(config.url().unwrap(), "https://api.openai.com/v1/embeddings");

        let empty = NeuralConfig::resolve(BackendKind::Api, Some("m".into()), None, |_| None);
        assert!(empty.api_key.is_none());
        assert_eq!(empty.model, "m");
        assert!(matches!(create_backend(&empty), Err(NarsilError::ConfigError { .. })));
    }

    #[test]
    fn test_onnx_is_config_error() {
        let config = NeuralConfig::resolve(BackendKind::Onnx, None, None, |_| Some("pa-123456789".into()));
        assert!(matches!(create_backend(&config), Err(NarsilError::ConfigError { .. })));
        assert_eq!("ONNX".parse::<BackendKind>().unwrap(), BackendKind::Onnx);
        assert!("gpu".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_voyage_request_has_input_type() {
        let config = NeuralConfig::resolve(BackendKind::Api, None, None, |k| {
            (k == "VOYAGE_API_KEY").then(|| "pa-123456789".to_string())
        });
        let embedder = ApiEmbedder::new(&config).unwrap();
        let body = embedder.request_body(&["q".to_string()], InputKind::Query);
        assert_eq!(body["input_type"], "query");
        assert_eq!(body["model"], "voyage-code-2");
    }

    #[test]
    fn test_vector_index_ranks_by_cosine() {
        let symbols = vec![symbol("zzz_zebra"), symbol("aaa_apple"), symbol("mmm_mango")];
        let index = VectorIndex::build(&LetterEmbedder, &symbols).unwrap();
        assert_eq!(index.len(), 3);

        let query = LetterEmbedder.embed(&["apple apple".to_string()], InputKind::Query).unwrap();
        let hits = index.search(&query[0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, symbols[1].id);
        assert!(hits[0].1 > hits[1].1);
    }
}
