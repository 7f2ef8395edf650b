//! Question answering on top of the knowledge base
//!
//! The engine only returns context. Deciding how much context a question
//! needs, keeping it within the completion budget and talking to the language
//! model all happen here, behind the [`CompletionService`] trait.

use crate::config::RetrievalConfig;
use crate::engine::KnowledgeBase;
use crate::error::{KbError, Result};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

/// Characters kept from the start of an over-long context
const CONTEXT_HEAD_CHARS: usize = 4_000;

/// Inserted where an over-long context was cut
const TRIM_MARKER: &str = "\n\n[...]\n\n";

const CONTEXT_PREAMBLE: &str = "You are a university help-desk assistant. \
Answer directly and concisely using the exact facts in the context below.";

const GENERAL_PREAMBLE: &str = "You are a university help-desk assistant. \
The knowledge base has nothing relevant to this question; answer from general \
knowledge and say that the answer is not based on university documents.";

/// Text-completion collaborator (an LLM API in production)
pub trait CompletionService: Send + Sync {
    /// Complete `user_message` given a system prompt carrying the context
    fn complete(&self, system_context: &str, user_message: &str) -> anyhow::Result<String>;
}

/// How much context a question gets
#[derive(Debug, Clone)]
pub struct ContextPolicy {
    default_top_k: usize,
    enumeration_top_k: usize,
    max_context_chars: usize,
    enumeration: Option<Regex>,
}

impl ContextPolicy {
    /// Build a policy; keywords match case-insensitively on word boundaries
    pub fn new(
        default_top_k: usize,
        enumeration_top_k: usize,
        max_context_chars: usize,
        keywords: &[String],
    ) -> Result<Self> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| {
                k.split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+")
            })
            .collect();

        let enumeration = if alternatives.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
            Some(Regex::new(&pattern).map_err(|e| {
                KbError::Config(format!("Invalid enumeration keywords: {}", e))
            })?)
        };

        Ok(Self {
            default_top_k,
            enumeration_top_k,
            max_context_chars,
            enumeration,
        })
    }

    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        Self::new(
            config.top_k,
            config.enumeration_top_k,
            config.max_context_chars,
            &config.enumeration_keywords,
        )
    }

    /// Whether the question asks for a list ("list all faculty members")
    pub fn is_enumeration(&self, question: &str) -> bool {
        self.enumeration
            .as_ref()
            .is_some_and(|re| re.is_match(question))
    }

    pub fn top_k_for(&self, question: &str) -> usize {
        if self.is_enumeration(question) {
            self.enumeration_top_k
        } else {
            self.default_top_k
        }
    }

    /// Keep the context within budget: the first 4000 characters, a marker,
    /// then the end of the context filling the rest of the budget
    pub fn trim(&self, context: &str) -> String {
        let len = context.chars().count();
        if len <= self.max_context_chars {
            return context.to_string();
        }

        let head_len = CONTEXT_HEAD_CHARS.min(self.max_context_chars);
        let tail_len = self.max_context_chars - head_len;

        let head: String = context.chars().take(head_len).collect();
        let tail: String = context.chars().skip(len - tail_len).collect();
        debug!("Trimmed context from {} to {} chars", len, self.max_context_chars);

        format!("{}{}{}", head, TRIM_MARKER, tail)
    }
}

/// Retrieval-augmented question answering
pub struct Assistant<C: CompletionService> {
    kb: Arc<KnowledgeBase>,
    policy: ContextPolicy,
    completion: C,
}

impl<C: CompletionService> Assistant<C> {
    pub fn new(kb: Arc<KnowledgeBase>, policy: ContextPolicy, completion: C) -> Self {
        Self {
            kb,
            policy,
            completion,
        }
    }

    pub fn policy(&self) -> &ContextPolicy {
        &self.policy
    }

    /// Answer `question` using the knowledge base as context
    pub fn answer(&self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(KbError::Config("Question cannot be empty".to_string()));
        }

        let top_k = self.policy.top_k_for(question);
        let context = self.policy.trim(&self.kb.search(question, top_k));
        info!(
            "Answering with top_k={} ({} context chars)",
            top_k,
            context.chars().count()
        );

        let system = if context.is_empty() {
            GENERAL_PREAMBLE.to_string()
        } else {
            format!("{}\n\nCONTEXT:\n{}", CONTEXT_PREAMBLE, context)
        };

        self.completion
            .complete(&system, question)
            .map_err(|e| KbError::Completion(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::HashingEmbedder;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingCompletion {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl CompletionService for &RecordingCompletion {
        fn complete(&self, system_context: &str, user_message: &str) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((system_context.to_string(), user_message.to_string()));
            Ok("answer".to_string())
        }
    }

    struct FailingCompletion;

    impl CompletionService for FailingCompletion {
        fn complete(&self, _: &str, _: &str) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("rate limited"))
        }
    }

    fn policy() -> ContextPolicy {
        ContextPolicy::from_config(&RetrievalConfig::default()).unwrap()
    }

    fn knowledge_base(temp: &TempDir, documents: &[(&str, &str)]) -> Arc<KnowledgeBase> {
        let mut config = Config::default();
        config.storage.data_dir = temp.path().join("data");
        config.embedding.provider = "hashing".to_string();
        config.embedding.dimension = 64;

        let corpus = temp.path().join("corpus");
        std::fs::create_dir_all(&corpus).unwrap();
        for (name, text) in documents {
            std::fs::write(corpus.join(name), text).unwrap();
        }

        let provider = Arc::new(HashingEmbedder::new(64).unwrap());
        let kb = KnowledgeBase::open(config, provider).unwrap();
        if !documents.is_empty() {
            kb.ingest(&corpus).unwrap();
        }
        Arc::new(kb)
    }

    #[test]
    fn test_enumeration_detection() {
        let policy = policy();

        assert!(policy.is_enumeration("List the CS faculty"));
        assert!(policy.is_enumeration("Who   are the deans?"));
        assert!(policy.is_enumeration("which COURSES are offered"));
        assert!(!policy.is_enumeration("What is the attendance policy?"));
        // Word boundaries: "all" inside "install" does not count
        assert!(!policy.is_enumeration("How do I install the VPN client?"));

        assert_eq!(policy.top_k_for("list all departments"), 12);
        assert_eq!(policy.top_k_for("When do exams start?"), 5);
    }

    #[test]
    fn test_no_keywords_never_enumerates() {
        let policy = ContextPolicy::new(5, 12, 100, &[]).unwrap();
        assert!(!policy.is_enumeration("list all faculty"));
    }

    #[test]
    fn test_trim_keeps_head_and_tail() {
        let policy = policy();
        let short = "fees are due monthly";
        assert_eq!(policy.trim(short), short);

        let long = format!("{}{}{}", "h".repeat(4_000), "m".repeat(10_000), "t".repeat(26_000));
        let trimmed = policy.trim(&long);
        assert_eq!(
            trimmed,
            format!("{}{}{}", "h".repeat(4_000), TRIM_MARKER, "t".repeat(26_000))
        );
    }

    #[test]
    fn test_trim_small_budget() {
        let policy = ContextPolicy::new(5, 12, 10, &[]).unwrap();
        assert_eq!(policy.trim("abcdefghijklmnop"), format!("abcdefghij{}", TRIM_MARKER));
    }

    #[test]
    fn test_answer_passes_context() {
        let temp = TempDir::new().unwrap();
        let kb = knowledge_base(
            &temp,
            &[("attendance.txt", "Students need 75 percent attendance in every course.")],
        );
        let completion = RecordingCompletion::default();
        let assistant = Assistant::new(kb, policy(), &completion);

        assert_eq!(assistant.answer("  attendance percent? ").unwrap(), "answer");

        let calls = completion.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains("75 percent attendance"));
        assert_eq!(calls[0].1, "attendance percent?");
    }

    #[test]
    fn test_answer_without_knowledge_uses_general_preamble() {
        let temp = TempDir::new().unwrap();
        let kb = knowledge_base(&temp, &[]);
        let completion = RecordingCompletion::default();
        let assistant = Assistant::new(kb, policy(), &completion);

        assistant.answer("What is a GPA?").unwrap();
        assert_eq!(completion.calls.lock().unwrap()[0].0, GENERAL_PREAMBLE);
    }

    #[test]
    fn test_empty_question_rejected() {
        let temp = TempDir::new().unwrap();
        let kb = knowledge_base(&temp, &[]);
        let assistant = Assistant::new(kb, policy(), FailingCompletion);

        assert!(matches!(assistant.answer("   "), Err(KbError::Config(_))));
    }

    #[test]
    fn test_completion_failure_mapped() {
        let temp = TempDir::new().unwrap();
        let kb = knowledge_base(&temp, &[]);
        let assistant = Assistant::new(kb, policy(), FailingCompletion);

        assert!(matches!(
            assistant.answer("hello"),
            Err(KbError::Completion(message)) if message.contains("rate limited")
        ));
    }
}
