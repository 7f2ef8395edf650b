use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use unikb::config::Config;
use unikb::embedding::HashingEmbedder;
use unikb::{KbState, KnowledgeBase};

fn test_config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = temp.path().join("data");
    config.storage.corpus_dir = temp.path().join("knowledge_base");
    config.embedding.provider = "hashing".to_string();
    config.embedding.dimension = 128;
    config
}

fn open_with_dimension(config: &Config, dimension: usize) -> KnowledgeBase {
    let provider = Arc::new(HashingEmbedder::new(dimension).unwrap());
    KnowledgeBase::open(config.clone(), provider).expect("Failed to open knowledge base")
}

fn open(config: &Config) -> KnowledgeBase {
    open_with_dimension(config, config.embedding.dimension)
}

/// Ingest a small corpus and return the config it lives under
fn ingested(temp: &TempDir) -> Config {
    let config = test_config(temp);
    let corpus = &config.storage.corpus_dir;
    fs::create_dir_all(corpus).unwrap();
    fs::write(
        corpus.join("fees.txt"),
        "Tuition fees must be paid before the deadline. Installment plans are available.",
    )
    .unwrap();
    fs::write(
        corpus.join("wifi.txt"),
        "Connect to the campus network with your registration ID and portal password.",
    )
    .unwrap();

    let kb = open(&config);
    kb.ingest(corpus).expect("Ingestion failed");
    assert_eq!(kb.state(), KbState::Ready { chunks: 2 });
    config
}

fn assert_uninitialized(kb: &KnowledgeBase) {
    assert_eq!(kb.state(), KbState::Uninitialized);
    assert_eq!(kb.search("tuition fees", 5), "");
    assert!(kb.retrieve("tuition fees", 5).unwrap().is_empty());
}

#[test]
fn test_corrupt_metadata_is_uninitialized() {
    let temp = TempDir::new().unwrap();
    let config = ingested(&temp);
    let kb = open(&config);

    fs::write(&kb.paths().metadata, b"{ this is not json").unwrap();
    assert_uninitialized(&open(&config));
}

#[test]
fn test_missing_metadata_is_uninitialized() {
    let temp = TempDir::new().unwrap();
    let config = ingested(&temp);
    let kb = open(&config);

    fs::remove_file(&kb.paths().metadata).unwrap();
    assert_uninitialized(&open(&config));
}

#[test]
fn test_truncated_index_is_uninitialized() {
    let temp = TempDir::new().unwrap();
    let config = ingested(&temp);
    let kb = open(&config);

    let bytes = fs::read(&kb.paths().index).unwrap();
    fs::write(&kb.paths().index, &bytes[..bytes.len() / 2]).unwrap();
    assert_uninitialized(&open(&config));
}

#[test]
fn test_tampered_index_payload_is_uninitialized() {
    let temp = TempDir::new().unwrap();
    let config = ingested(&temp);
    let kb = open(&config);

    let mut bytes = fs::read(&kb.paths().index).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&kb.paths().index, &bytes).unwrap();
    assert_uninitialized(&open(&config));
}

#[test]
fn test_metadata_from_other_generation_is_uninitialized() {
    let temp = TempDir::new().unwrap();
    let config = ingested(&temp);
    let kb = open(&config);
    let old_metadata = fs::read(&kb.paths().metadata).unwrap();

    fs::write(
        config.storage.corpus_dir.join("library.txt"),
        "The library opens at eight.",
    )
    .unwrap();
    kb.ingest(&config.storage.corpus_dir).unwrap();

    // Crash between the two renames: new index, old metadata
    fs::write(&kb.paths().metadata, old_metadata).unwrap();
    assert_uninitialized(&open(&config));
}

#[test]
fn test_other_embedding_dimension_is_uninitialized() {
    let temp = TempDir::new().unwrap();
    let config = ingested(&temp);

    let kb = open_with_dimension(&config, 64);
    assert_uninitialized(&kb);
}

#[test]
fn test_reingestion_recovers_from_corruption() {
    let temp = TempDir::new().unwrap();
    let config = ingested(&temp);
    let kb = open(&config);

    fs::write(&kb.paths().index, b"garbage").unwrap();
    assert_eq!(kb.reload(), KbState::Uninitialized);

    kb.ingest(&config.storage.corpus_dir).unwrap();
    assert_eq!(kb.state(), KbState::Ready { chunks: 2 });
    assert!(open(&config).search("tuition fees", 1).contains("Tuition"));
}
