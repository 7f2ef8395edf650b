mod hashing;
/// Embedding boundary
///
/// The engine sees embeddings only through the [`EmbeddingProvider`] trait.
/// - FastEmbedProvider for local ONNX models (all-MiniLM-L6-v2, 384-dim)
/// - HashingEmbedder for deterministic, download-free vectors
mod provider;

pub use hashing::HashingEmbedder;
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};

use crate::config::EmbeddingConfig;
use std::sync::Arc;

/// Build the provider selected by configuration
pub fn build_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "fastembed" => {
            let provider = FastEmbedProvider::new(&config.model, config.batch_size)?;
            if provider.dimension() != config.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: config.dimension,
                    actual: provider.dimension(),
                });
            }
            Ok(Arc::new(provider))
        }
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimension)?)),
        other => Err(EmbeddingError::InitializationError(format!(
            "Unknown embedding provider '{}'",
            other
        ))),
    }
}
