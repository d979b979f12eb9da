//! Per-candidate match signals used by the retrieval engine.

use crate::embedding::EmbeddingProvider;
use crate::types::Embedding;

/// Whether `haystack` contains `needle_lower` ignoring case.
///
/// `needle_lower` must already be lowercased; the engine lowercases the
/// query once per request.
#[must_use]
pub fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Cosine similarity between the query vector and `content`.
///
/// Content with no indexable terms scores 0.
#[must_use]
pub fn content_similarity(
    embedder: &dyn EmbeddingProvider,
    query_vec: &Embedding,
    content: &str,
) -> f32 {
    embedder
        .embed(content)
        .map_or(0.0, |vec| query_vec.cosine_similarity(&vec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::TfIdfEmbedder;

    #[test]
    fn case_insensitive_match() {
        assert!(contains_ignore_case("Uses PHOENIX", "phoenix"));
        assert!(!contains_ignore_case("Uses Elixir", "phoenix"));
    }

    #[test]
    fn unembeddable_content_scores_zero() {
        let embedder = TfIdfEmbedder::default();
        let query = embedder.embed("phoenix").expect("tokens");
        assert_eq!(content_similarity(&embedder, &query, "!!"), 0.0);
        assert!(content_similarity(&embedder, &query, "phoenix phoenix") > 0.99);
    }
}
