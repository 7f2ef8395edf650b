/// Deterministic feature-hashing embedder
///
/// Maps unigrams and adjacent-word bigrams into signed buckets via BLAKE3 and
/// L2-normalises the result. No model download, identical output on every run
/// and platform: used for offline operation and as the test double for the
/// engine.
use super::{EmbeddingError, EmbeddingProvider};

pub struct HashingEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InitializationError(
                "Dimension must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            dimension,
            model_name: format!("hashing-{}", dimension),
        })
    }

    fn accumulate(&self, feature: &str, vector: &mut [f32]) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();

        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[..8]);
        let bucket = (u64::from_le_bytes(word) % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

        vector[bucket] += sign;
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.accumulate(token, &mut vector);
        }
        for pair in tokens.windows(2) {
            self.accumulate(&format!("{} {}", pair[0], pair[1]), &mut vector);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        Ok(vector)
    }

    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
