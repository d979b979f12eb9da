//! Text embeddings for semantic recall.
//!
//! Provides a trait-based interface for turning text into vectors, and the
//! shipped [`TfIdfEmbedder`]: deterministic term-frequency vectors, feature
//! hashed into a fixed number of buckets, optionally IDF-weighted over a
//! fitted corpus. No model files, no network.

use std::collections::{HashMap, HashSet};

use crate::error::{MemoryError, Result};
use crate::types::Embedding;

/// Default embedding width.
pub const DEFAULT_DIMENSIONS: usize = 512;

/// Minimum token length kept by [`tokenize`].
const MIN_TOKEN_LEN: usize = 2;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Generate vector embeddings from text.
///
/// Implementations must be `Send + Sync`: recall ranks on the blocking pool.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::EmptyEmbedding`] if the text has nothing to
    /// index.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed a batch of texts.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding in the batch fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Cosine similarity
// ---------------------------------------------------------------------------

/// Compute the cosine similarity between two embedding vectors.
///
/// Returns a value in \[-1.0, 1.0\]. Returns `0.0` for mismatched lengths or
/// a zero-magnitude vector.
#[must_use]
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.0.len() != b.0.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut mag_a = 0.0_f32;
    let mut mag_b = 0.0_f32;

    for (x, y) in a.0.iter().zip(b.0.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "before", "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has",
    "have", "he", "her", "his", "how", "if", "in", "into", "is", "it", "its", "just", "may",
    "me", "more", "most", "my", "no", "not", "of", "on", "or", "our", "out", "over", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "them", "then", "there", "these",
    "they", "this", "those", "to", "too", "up", "us", "very", "was", "we", "were", "what",
    "when", "where", "which", "while", "who", "why", "will", "with", "would", "you", "your",
];

/// Lowercase, split on non-alphanumerics, drop short tokens and stop words.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// 64-bit FNV-1a. Stable across runs and platforms, unlike `DefaultHasher`.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

// ---------------------------------------------------------------------------
// TF-IDF provider
// ---------------------------------------------------------------------------

/// Feature-hashed TF-IDF embedder.
///
/// Unfitted, every term has IDF 1.0 and vectors are plain term frequencies.
/// After [`TfIdfEmbedder::fit`], terms are weighted by
/// `ln((1 + N) / (1 + df)) + 1`; unseen terms get the maximum weight.
#[derive(Debug, Clone)]
pub struct TfIdfEmbedder {
    dims: usize,
    idf: HashMap<String, f32>,
    unseen_idf: f32,
}

impl Default for TfIdfEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl TfIdfEmbedder {
    /// Unfitted embedder producing `dimensions`-wide vectors (minimum 1).
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dims: dimensions.max(1),
            idf: HashMap::new(),
            unseen_idf: 1.0,
        }
    }

    /// Learn IDF weights from `corpus`, replacing any previous fit.
    pub fn fit<S: AsRef<str>>(&mut self, corpus: &[S]) {
        let mut df: HashMap<String, usize> = HashMap::new();
        for doc in corpus {
            let unique: HashSet<String> = tokenize(doc.as_ref()).into_iter().collect();
            for term in unique {
                *df.entry(term).or_insert(0) += 1;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let n = corpus.len() as f32;
        #[allow(clippy::cast_precision_loss)]
        let weight = |df: usize| ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0;

        self.idf = df.into_iter().map(|(term, d)| (term, weight(d))).collect();
        self.unseen_idf = weight(0);
    }

    /// Whether [`TfIdfEmbedder::fit`] has been called with a non-empty corpus.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        !self.idf.is_empty()
    }

    fn idf_of(&self, term: &str) -> f32 {
        if self.idf.is_empty() {
            1.0
        } else {
            self.idf.get(term).copied().unwrap_or(self.unseen_idf)
        }
    }

    fn bucket(&self, term: &str) -> usize {
        // Lossless: the modulus is a usize.
        #[allow(clippy::cast_possible_truncation)]
        let idx = (fnv1a(term.as_bytes()) % self.dims as u64) as usize;
        idx
    }
}

impl EmbeddingProvider for TfIdfEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(MemoryError::EmptyEmbedding);
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }

        #[allow(clippy::cast_precision_loss)]
        let total = tokens.len() as f32;
        let mut vector = vec![0.0_f32; self.dims];
        for (term, count) in counts {
            #[allow(clippy::cast_precision_loss)]
            let tf = count as f32 / total;
            vector[self.bucket(term)] += tf * self.idf_of(term);
        }
        Ok(Embedding(vector))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "tfidf-fnv1a"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors() {
        let a = Embedding(vec![1.0, 0.0, 0.0]);
        let b = Embedding(vec![1.0, 0.0, 0.0]);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_and_orthogonal() {
        let a = Embedding(vec![1.0, 0.0]);
        assert!((cosine_similarity(&a, &Embedding(vec![-1.0, 0.0])) + 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &Embedding(vec![0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_or_zero() {
        let a = Embedding(vec![1.0, 0.0]);
        assert_eq!(cosine_similarity(&a, &Embedding(vec![1.0, 0.0, 0.0])), 0.0);
        assert_eq!(cosine_similarity(&a, &Embedding(vec![0.0, 0.0])), 0.0);
    }

    #[test]
    fn tokenizer_drops_noise() {
        assert_eq!(
            tokenize("The API uses a PostgreSQL-backed queue!"),
            vec!["api", "uses", "postgresql", "backed", "queue"]
        );
        assert!(tokenize("a I . ,").is_empty());
    }

    #[test]
    fn fnv1a_known_vector() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn embedding_is_deterministic() {
        let embedder = TfIdfEmbedder::default();
        let a = embedder.embed("retry budget for the payment service").expect("tokens");
        let b = embedder.embed("retry budget for the payment service").expect("tokens");
        assert_eq!(a, b);
        assert_eq!(a.dimensions(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn empty_text_is_an_error() {
        let embedder = TfIdfEmbedder::default();
        assert!(matches!(embedder.embed("   "), Err(MemoryError::EmptyEmbedding)));
        assert!(matches!(embedder.embed("the of a"), Err(MemoryError::EmptyEmbedding)));
    }

    #[test]
    fn related_text_is_more_similar() {
        let embedder = TfIdfEmbedder::default();
        let query = embedder.embed("database connection pool").expect("tokens");
        let near = embedder.embed("connection pool size for the database").expect("tokens");
        let far = embedder.embed("frontend button colours").expect("tokens");
        assert!(query.cosine_similarity(&near) > query.cosine_similarity(&far));
    }

    #[test]
    fn fit_downweights_common_terms() {
        let corpus = ["service uses redis", "service uses postgres", "service uses kafka"];
        let mut embedder = TfIdfEmbedder::new(4096);
        embedder.fit(&corpus);
        assert!(embedder.is_fitted());
        assert!(embedder.idf_of("service") < embedder.idf_of("redis"));
        assert!(embedder.idf_of("never-seen") >= embedder.idf_of("redis"));
    }

    #[test]
    fn batch_embed_works() {
        let embedder = TfIdfEmbedder::new(16);
        let results = embedder.embed_batch(&["hello world", "rust code"]).expect("batch");
        assert_eq!(results.len(), 2);
    }
}
