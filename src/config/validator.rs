use crate::config::Config;
use crate::error::{KbError, Result, ValidationError};

const SUPPORTED_PROVIDERS: [&str; 2] = ["fastembed", "hashing"];
const SUPPORTED_INDEX_KINDS: [&str; 2] = ["exact", "hnsw"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(KbError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        let storage = &config.storage;

        if storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if storage.index_file.is_empty() {
            errors.push(ValidationError::new(
                "storage.index_file",
                "Index file name cannot be empty",
            ));
        }

        if storage.metadata_file.is_empty() {
            errors.push(ValidationError::new(
                "storage.metadata_file",
                "Metadata file name cannot be empty",
            ));
        }

        if storage.index_file == storage.metadata_file {
            errors.push(ValidationError::new(
                "storage.metadata_file",
                "Index and metadata must be different files",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;

        if chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        if chunking.overlap >= chunking.chunk_size {
            errors.push(ValidationError::new(
                "chunking.overlap",
                format!(
                    "Overlap ({}) must be smaller than chunk size ({})",
                    chunking.overlap, chunking.chunk_size
                ),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let embedding = &config.embedding;

        if !SUPPORTED_PROVIDERS.contains(&embedding.provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    SUPPORTED_PROVIDERS, embedding.provider
                ),
            ));
        }

        if embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Embedding dimension must be greater than 0",
            ));
        }

        if embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        let index = &config.index;

        if !SUPPORTED_INDEX_KINDS.contains(&index.kind.as_str()) {
            errors.push(ValidationError::new(
                "index.kind",
                format!(
                    "Index kind must be one of {:?}, got '{}'",
                    SUPPORTED_INDEX_KINDS, index.kind
                ),
            ));
        }

        if index.kind == "hnsw" {
            if index.hnsw_m == 0 {
                errors.push(ValidationError::new(
                    "index.hnsw_m",
                    "HNSW M must be greater than 0",
                ));
            }

            if index.hnsw_ef_construction == 0 {
                errors.push(ValidationError::new(
                    "index.hnsw_ef_construction",
                    "HNSW ef_construction must be greater than 0",
                ));
            }

            if index.hnsw_ef_search == 0 {
                errors.push(ValidationError::new(
                    "index.hnsw_ef_search",
                    "HNSW ef_search must be greater than 0",
                ));
            }
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        if retrieval.enumeration_top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.enumeration_top_k",
                "enumeration_top_k must be greater than 0",
            ));
        }

        if retrieval.max_context_chars == 0 {
            errors.push(ValidationError::new(
                "retrieval.max_context_chars",
                "Context budget must be greater than 0",
            ));
        }

        if retrieval
            .enumeration_keywords
            .iter()
            .any(|k| k.trim().is_empty())
        {
            errors.push(ValidationError::new(
                "retrieval.enumeration_keywords",
                "Keywords cannot be empty",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_paths(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(KbError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_overlap_not_smaller_than_chunk_size() {
        let mut config = Config::default();
        config.chunking.overlap = config.chunking.chunk_size;
        assert_eq!(error_paths(&config), vec!["chunking.overlap"]);
    }

    #[test]
    fn test_invalid_provider() {
        let mut config = Config::default();
        config.embedding.provider = "openai".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        config.embedding.dimension = 0;
        config.index.kind = "ivf".to_string();

        let paths = error_paths(&config);
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&"retrieval.top_k".to_string()));
        assert!(paths.contains(&"embedding.dimension".to_string()));
        assert!(paths.contains(&"index.kind".to_string()));
    }

    #[test]
    fn test_hnsw_params_checked_only_for_hnsw() {
        let mut config = Config::default();
        config.index.hnsw_m = 0;
        assert!(ConfigValidator::validate(&config).is_ok());

        config.index.kind = "hnsw".to_string();
        assert_eq!(error_paths(&config), vec!["index.hnsw_m"]);
    }
}
