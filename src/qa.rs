//! # Question answering
//!
//! Retrieval-augmented answers over a loaded collection: embed the question,
//! pull the closest passages, hand them to the chat model with a
//! [`PromptTemplate`], return the reply together with the passages used.
//!
//! [`run_interactive`] wraps this in the console loop. A blank line asks the
//! next of [`PREDEFINED_QUESTIONS`]; `exit`, `quit` or end of input stops it.
//! A failed question is reported and the loop keeps going.

use std::error::Error;
use std::io::{BufRead, Write};
use tracing::{debug, error};

use crate::api::{ChatProvider, EmbeddingProvider};
use crate::config::OlympiqConfig;
use crate::error::{ConfigError, QueryError};
use crate::pretty;
use crate::retriever::{MemoryQueryResult, SemanticMemory};
use crate::template::PromptTemplate;

/// Asked in turn when the user submits an empty line.
pub const PREDEFINED_QUESTIONS: [&str; 7] = [
    "Which athletes won the gold medal in curling at the 2022 Winter Olympics?",
    "who winned gold metals in kurling at the olimpics",
    "How many records were set at the 2022 Winter Olympics?",
    "Did Jamaica or Cuba have more athletes at the 2022 Winter Olympics?",
    "What is 2+2?",
    "Which Olympic sport is the most entertaining?",
    "Who won the gold medal in curling at the 2018 Winter Olympics?",
];

/// Cycles through [`PREDEFINED_QUESTIONS`], wrapping to the first.
#[derive(Debug, Default, Clone)]
pub struct QuestionRotation {
    next: usize,
}

impl QuestionRotation {
    pub fn next_question(&mut self) -> &'static str {
        let question = PREDEFINED_QUESTIONS[self.next];
        self.next = (self.next + 1) % PREDEFINED_QUESTIONS.len();
        question
    }
}

/// Retrieval and sampling knobs for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySettings {
    pub collection: String,
    pub limit: usize,
    pub min_relevance: f64,
    pub temperature: f32,
}

impl QuerySettings {
    pub fn from_config(config: &OlympiqConfig) -> Self {
        Self {
            collection: config.collection_name.clone(),
            limit: config.search_limit,
            min_relevance: config.min_relevance,
            temperature: config.temperature,
        }
    }

    /// Apply command-line overrides. `min_relevance` must lie in `[-1, 1]`,
    /// the same range `OlympiqConfig::validate` enforces.
    pub fn with_overrides(
        mut self,
        limit: Option<usize>,
        min_relevance: Option<f64>,
    ) -> Result<Self, ConfigError> {
        if let Some(limit) = limit {
            self.limit = limit;
        }
        if let Some(min_relevance) = min_relevance {
            if !(-1.0..=1.0).contains(&min_relevance) {
                return Err(ConfigError::OutOfRange {
                    field: "min_relevance",
                    value: min_relevance.to_string(),
                });
            }
            self.min_relevance = min_relevance;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub question: String,
    /// Passages given to the model, best first.
    pub matches: Vec<MemoryQueryResult>,
    pub response: String,
}

/// Answer `question` from the passages in `settings.collection`.
///
/// With no passage above the threshold the model still gets the question and
/// the instructions, which tell it to say it could not find an answer.
pub async fn answer_question<E, C>(
    memory: &SemanticMemory<'_, E>,
    chat: &C,
    template: &PromptTemplate,
    settings: &QuerySettings,
    question: &str,
) -> Result<Answer, QueryError>
where
    E: EmbeddingProvider,
    C: ChatProvider,
{
    let matches = memory
        .search(
            &settings.collection,
            question,
            settings.limit,
            settings.min_relevance,
        )
        .await?;
    debug!(matches = matches.len(), "context retrieved");

    let user_message = template.render(matches.iter().map(|m| m.text.as_str()), question);
    let response = chat
        .complete(&template.system_prompt, &user_message, settings.temperature)
        .await?;

    Ok(Answer {
        question: question.to_string(),
        matches,
        response,
    })
}

/// Read questions from `input` until `exit`, `quit` or end of input.
///
/// Returns how many questions were answered successfully.
pub async fn run_interactive<E, C, R, W>(
    memory: &SemanticMemory<'_, E>,
    chat: &C,
    template: &PromptTemplate,
    settings: &QuerySettings,
    mut input: R,
    out: &mut W,
) -> Result<usize, Box<dyn Error>>
where
    E: EmbeddingProvider,
    C: ChatProvider,
    R: BufRead,
    W: Write,
{
    let mut rotation = QuestionRotation::default();
    let mut answered = 0;

    loop {
        pretty::print_prompt(out)?;
        let mut raw = Vec::new();
        if input.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(err) => {
                error!("unreadable input line: {err}");
                pretty::print_error(out, &err)?;
                continue;
            }
        };

        let question = match line.trim() {
            "exit" | "quit" => break,
            "" => {
                let q = rotation.next_question();
                pretty::print_random_question(out, q)?;
                q.to_string()
            }
            typed => typed.to_string(),
        };

        match answer_question(memory, chat, template, settings, &question).await {
            Ok(answer) => {
                for (rank, hit) in answer.matches.iter().enumerate() {
                    pretty::print_match(out, rank, hit)?;
                }
                pretty::print_answer(out, &answer.question, &answer.response)?;
                answered += 1;
            }
            Err(err) => {
                error!("question failed: {err}");
                pretty::print_error(out, &err)?;
            }
        }
    }

    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, StoreError};
    use crate::record::Record;
    use crate::vector_store::MemoryStore;
    use parking_lot::Mutex;
    use std::io::Cursor;

    /// Maps curling-ish questions to one axis, everything else to the other.
    struct KeywordEmbedder;

    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            let lower = text.to_lowercase();
            if lower.contains("fail") {
                Err(ProviderError::RateLimited("slow down".into()))
            } else if lower.contains("curling") || lower.contains("kurling") {
                Ok(vec![0.9, 0.1])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    #[derive(Default)]
    struct RecordingChat {
        calls: Mutex<Vec<(String, String, f32)>>,
    }

    impl ChatProvider for RecordingChat {
        async fn complete(
            &self,
            system_prompt: &str,
            user_message: &str,
            temperature: f32,
        ) -> Result<String, ProviderError> {
            self.calls.lock().push((
                system_prompt.to_string(),
                user_message.to_string(),
                temperature,
            ));
            Ok("Stefania Constantini and Amos Mosaner.".to_string())
        }
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_collection("winterOlympics").unwrap();
        store
            .upsert(
                "winterOlympics",
                Record::new("PK_0", "Curling mixed doubles gold: Italy", vec![1.0, 0.0]).as_reference(),
            )
            .unwrap();
        store
            .upsert(
                "winterOlympics",
                Record::new("PK_1", "Luge results", vec![0.0, 1.0]).as_reference(),
            )
            .unwrap();
        store
    }

    fn settings() -> QuerySettings {
        QuerySettings {
            collection: "winterOlympics".into(),
            limit: 1,
            min_relevance: 0.5,
            temperature: 0.0,
        }
    }

    #[test]
    fn test_rotation_wraps() {
        let mut rotation = QuestionRotation::default();
        let first = rotation.next_question();
        for _ in 1..PREDEFINED_QUESTIONS.len() {
            rotation.next_question();
        }
        assert_eq!(rotation.next_question(), first);
        assert_eq!(first, PREDEFINED_QUESTIONS[0]);
    }

    #[test]
    fn test_settings_from_config() {
        let settings = QuerySettings::from_config(&OlympiqConfig::default());
        assert_eq!(settings.collection, "winterOlympics");
        assert_eq!(settings.limit, 5);
        assert_eq!(settings.temperature, 0.0);
    }

    #[tokio::test]
    async fn test_answer_uses_retrieved_context() {
        let store = store();
        let memory = SemanticMemory::new(&store, KeywordEmbedder);
        let chat = RecordingChat::default();
        let template = PromptTemplate::default();

        let answer = answer_question(
            &memory,
            &chat,
            &template,
            &settings(),
            "Who won curling gold?",
        )
        .await
        .unwrap();

        assert_eq!(answer.matches.len(), 1);
        assert_eq!(answer.matches[0].id, "PK_0");
        assert_eq!(answer.response, "Stefania Constantini and Amos Mosaner.");

        let calls = chat.calls.lock();
        let (system, user, temperature) = &calls[0];
        assert_eq!(system, &template.system_prompt);
        assert!(user.contains("Wikipedia article section:\nCurling mixed doubles gold: Italy"));
        assert!(!user.contains("Luge results"));
        assert!(user.ends_with("Question: Who won curling gold?"));
        assert_eq!(*temperature, 0.0);
    }

    #[tokio::test]
    async fn test_answer_reports_missing_collection() {
        let store = MemoryStore::new();
        let memory = SemanticMemory::new(&store, KeywordEmbedder);
        let chat = RecordingChat::default();

        let err = answer_question(
            &memory,
            &chat,
            &PromptTemplate::default(),
            &settings(),
            "curling?",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QueryError::Store(StoreError::CollectionNotFound(_))));
        assert!(chat.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_interactive_loop_survives_errors() {
        let store = store();
        let memory = SemanticMemory::new(&store, KeywordEmbedder);
        let chat = RecordingChat::default();
        let input = Cursor::new("\nplease fail\nWhat about luge?\nquit\nnever asked\n");
        let mut out = Vec::new();

        let answered = run_interactive(
            &memory,
            &chat,
            &PromptTemplate::default(),
            &settings(),
            input,
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(answered, 2);
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains(PREDEFINED_QUESTIONS[0]));
        assert!(out.contains("Semantic result #0, Relevance: 0.99"));
        assert!(out.contains("rate limited: slow down"));
        assert!(out.contains("Semantic result #0, Relevance: 1."));
        assert!(!out.contains("never asked"));

        let calls = chat.calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].1.ends_with("Question: What about luge?"));
    }

    #[tokio::test]
    async fn test_interactive_loop_skips_undecodable_line() {
        let store = store();
        let memory = SemanticMemory::new(&store, KeywordEmbedder);
        let chat = RecordingChat::default();
        let input = Cursor::new(b"who won\xff curling\nsecond question\nquit\n".to_vec());
        let mut out = Vec::new();

        let answered = run_interactive(
            &memory,
            &chat,
            &PromptTemplate::default(),
            &settings(),
            input,
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(answered, 1);
        let out = String::from_utf8_lossy(&out);
        assert!(out.contains("Error: invalid utf-8"), "{out}");

        let calls = chat.calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.ends_with("Question: second question"));
    }

    #[test]
    fn test_overrides_are_range_checked() {
        let base = QuerySettings::from_config(&OlympiqConfig::default());

        let tuned = base.clone().with_overrides(Some(2), Some(-0.5)).unwrap();
        assert_eq!(tuned.limit, 2);
        assert_eq!(tuned.min_relevance, -0.5);

        assert_eq!(base.clone().with_overrides(None, None).unwrap(), base);

        for bad in [1.5, -1.01, f64::NAN] {
            assert!(matches!(
                base.clone().with_overrides(None, Some(bad)),
                Err(ConfigError::OutOfRange { field: "min_relevance", .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_interactive_loop_ends_at_eof() {
        let store = store();
        let memory = SemanticMemory::new(&store, KeywordEmbedder);
        let chat = RecordingChat::default();
        let mut out = Vec::new();

        let answered = run_interactive(
            &memory,
            &chat,
            &PromptTemplate::default(),
            &settings(),
            Cursor::new(""),
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(answered, 0);
    }
}
