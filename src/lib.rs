//! unikb - University knowledge base
//!
//! Retrieval engine behind a university-information assistant: ingests a
//! directory of text documents, splits them into overlapping chunks, embeds
//! them, indexes the vectors for nearest-neighbour search and serves the
//! top-k passages for a question as a single context string.

pub mod assistant;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod storage;
pub mod store;

pub use engine::{IngestOutcome, IngestStats, KbState, KnowledgeBase, RetrievedChunk};
pub use error::{KbError, Result};
