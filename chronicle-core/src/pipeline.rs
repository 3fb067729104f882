//! Pipeline orchestration: validate, retrieve, format, generate, sanitize.
//!
//! Drives one request through the stages in order; any stage failure stops
//! the pipeline and surfaces as a typed error — there are no partial
//! answers, no internal retries, and no fallback between backends. The
//! orchestrator imposes no timeout of its own: backend timeouts come from
//! backend config, and a caller cancelling the future cancels the
//! in-flight stage with it.

use crate::config::ChronicleConfig;
use crate::context::ContextFormatter;
use crate::corpus::Corpus;
use crate::embeddings::{Embedder, create_embedder};
use crate::error::{IndexError, QueryError, Result};
use crate::index::VectorIndex;
use crate::providers::{BackendKind, GenerationBackend, create_backend};
use crate::retriever::{KnowledgeBase, retrieve};
use crate::sanitize::sanitize_response;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Fixed instruction contract supplied to every backend. Owned here, not by
/// the backend variants, so the sanitizer can make the same assumptions
/// about any backend's output.
const SYSTEM_PROMPT: &str = "You are a question answering assistant for a corpus of historical \
     events. Answer using only the supplied context and cite the event URIs \
     you used. Produce raw markup: no enclosing code fence markers and no \
     leading language label.";

/// An incoming question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Number of events to retrieve. Unset or out-of-range values fall back
    /// to the configured default.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Backend to generate with. Unset means the configured default.
    #[serde(default)]
    pub backend: Option<BackendKind>,
}

/// A completed answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    /// Which backend produced the answer.
    pub backend: BackendKind,
    /// How many events the retriever returned, after the default fallback
    /// and the corpus-size clamp. The context formatter may admit fewer if
    /// its char budget runs out; that is reported per-request in the logs,
    /// not here.
    pub effective_top_k: usize,
}

/// The retrieval-and-generation pipeline.
///
/// Stateless per request apart from the shared read-only knowledge base and
/// the backends' lazily-initialized clients, so one instance serves
/// concurrent requests.
pub struct Pipeline {
    config: ChronicleConfig,
    embedder: Box<dyn Embedder>,
    /// The (corpus, index) pair swaps atomically behind this lock on
    /// rebuild; readers grab an `Arc` and never observe a half-replaced
    /// pair.
    knowledge: RwLock<Arc<KnowledgeBase>>,
    formatter: ContextFormatter,
    local: Arc<dyn GenerationBackend>,
    hosted: Arc<dyn GenerationBackend>,
}

impl Pipeline {
    /// Assemble a pipeline from pre-built parts. Tests use this to inject
    /// embedder and backend doubles.
    pub fn new(
        config: ChronicleConfig,
        embedder: Box<dyn Embedder>,
        knowledge: KnowledgeBase,
        local: Arc<dyn GenerationBackend>,
        hosted: Arc<dyn GenerationBackend>,
    ) -> Self {
        let formatter = ContextFormatter::new(config.query.max_context_chars);
        Self {
            config,
            embedder,
            knowledge: RwLock::new(Arc::new(knowledge)),
            formatter,
            local,
            hosted,
        }
    }

    /// Build a pipeline from configuration and a loaded corpus, embedding
    /// every record.
    pub fn from_corpus(config: ChronicleConfig, corpus: Corpus) -> Result<Self> {
        let embedder = create_embedder(&config.embedding);
        let knowledge = KnowledgeBase::build(corpus, embedder.as_ref())?;
        Self::with_parts(config, embedder, knowledge)
    }

    /// Build a pipeline from configuration, a loaded corpus, and a restored
    /// index snapshot. The snapshot must align with both the corpus and the
    /// configured embedder.
    pub fn from_snapshot(
        config: ChronicleConfig,
        corpus: Corpus,
        index: VectorIndex,
    ) -> Result<Self> {
        let embedder = create_embedder(&config.embedding);
        if index.dimensions() != embedder.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: embedder.dimensions(),
                actual: index.dimensions(),
            }
            .into());
        }
        let knowledge = KnowledgeBase::from_parts(corpus, index)?;
        Self::with_parts(config, embedder, knowledge)
    }

    fn with_parts(
        config: ChronicleConfig,
        embedder: Box<dyn Embedder>,
        knowledge: KnowledgeBase,
    ) -> Result<Self> {
        let local = create_backend(BackendKind::Local, &config.generation)?;
        let hosted = create_backend(BackendKind::Hosted, &config.generation)?;
        Ok(Self::new(config, embedder, knowledge, local, hosted))
    }

    /// Current knowledge base snapshot.
    pub fn knowledge(&self) -> Arc<KnowledgeBase> {
        self.knowledge
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Re-embed a new corpus and swap the (corpus, index) pair in one move.
    /// In-flight requests keep the snapshot they started with.
    pub fn rebuild(&self, corpus: Corpus) -> Result<()> {
        let rebuilt = Arc::new(KnowledgeBase::build(corpus, self.embedder.as_ref())?);
        let mut guard = self
            .knowledge
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = rebuilt;
        info!(records = guard.len(), "Knowledge base rebuilt");
        Ok(())
    }

    /// Answer a question: validate -> retrieve -> format -> generate ->
    /// sanitize. The first failing stage ends the request.
    pub async fn answer(&self, request: &QueryRequest) -> Result<QueryResponse> {
        // Validating. Query bounds hard-reject; top_k soft-corrects. That
        // asymmetry is deliberate (inherited policy), not an oversight.
        let query = request.query.as_str();
        if query.trim().is_empty() {
            return Err(QueryError::Empty.into());
        }
        let length = query.chars().count();
        let max = self.config.query.max_query_length;
        if length > max {
            return Err(QueryError::TooLong { length, max }.into());
        }

        let top_k = match request.top_k {
            Some(k) if (1..=self.config.query.max_top_k).contains(&k) => k,
            Some(k) => {
                debug!(
                    requested = k,
                    fallback = self.config.query.default_top_k,
                    "top_k out of range, using default"
                );
                self.config.query.default_top_k
            }
            None => self.config.query.default_top_k,
        };
        let backend_kind = request
            .backend
            .unwrap_or(self.config.generation.default_backend);

        // Retrieving.
        let knowledge = self.knowledge();
        let events = retrieve(query, top_k, self.embedder.as_ref(), &knowledge)?;
        let effective_top_k = events.len();

        // Formatting.
        let context = self.formatter.format(&events);
        if context.truncated {
            debug!(
                entries = context.entries,
                retrieved = events.len(),
                "Context truncated to fit char budget"
            );
        }
        let user_prompt = format!(
            "Use the following documents to answer the question. Provide \
             references to the document sources where applicable.\n\n\
             Context:\n{}\n\nQuestion:\n{}\n\nAnswer (with references):",
            context.text, query
        );

        // Generating.
        let backend = self.backend_for(backend_kind);
        let raw = backend.generate(SYSTEM_PROMPT, &user_prompt).await?;

        // Sanitizing.
        let answer = sanitize_response(&raw);

        info!(
            backend = %backend_kind,
            effective_top_k,
            answer_len = answer.len(),
            "Answer complete"
        );
        Ok(QueryResponse {
            answer,
            backend: backend_kind,
            effective_top_k,
        })
    }

    fn backend_for(&self, kind: BackendKind) -> &Arc<dyn GenerationBackend> {
        match kind {
            BackendKind::Local => &self.local,
            BackendKind::Hosted => &self.hosted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::EventRow;
    use crate::embeddings::HashEmbedder;
    use crate::error::ChronicleError;
    use crate::providers::MockBackend;

    fn row(label: &str, abstract_text: &str) -> EventRow {
        EventRow {
            event_uri: format!("http://dbpedia.org/resource/{}", label.replace(' ', "_")),
            label: label.into(),
            date: "1950-01-01".into(),
            abstract_text: abstract_text.into(),
        }
    }

    fn test_corpus() -> Corpus {
        Corpus::load(vec![
            row("Moon Landing", "Apollo 11 landed humans on the Moon."),
            row("Velvet Revolution", "Peaceful revolution in Prague."),
            row("Suez Crisis", "Invasion of Egypt over the Suez Canal."),
        ])
        .unwrap()
    }

    fn test_pipeline(
        local: Arc<MockBackend>,
        hosted: Arc<MockBackend>,
    ) -> Pipeline {
        let embedder = HashEmbedder::new(64);
        let knowledge = KnowledgeBase::build(test_corpus(), &embedder).unwrap();
        Pipeline::new(
            ChronicleConfig::default(),
            Box::new(embedder),
            knowledge,
            local,
            hosted,
        )
    }

    #[tokio::test]
    async fn test_answer_happy_path_sanitizes_output() {
        let local = Arc::new(MockBackend::replying("```html\n<p>Apollo 11.</p>\n```"));
        let hosted = Arc::new(MockBackend::replying("unused"));
        let pipeline = test_pipeline(local.clone(), hosted.clone());

        let response = pipeline
            .answer(&QueryRequest {
                query: "What happened on the Moon?".into(),
                top_k: Some(2),
                backend: Some(BackendKind::Local),
            })
            .await
            .unwrap();

        assert_eq!(response.answer, "<p>Apollo 11.</p>");
        assert_eq!(response.backend, BackendKind::Local);
        assert_eq!(response.effective_top_k, 2);
        assert_eq!(local.call_count(), 1);
        assert_eq!(hosted.call_count(), 0);
    }

    #[tokio::test]
    async fn test_answer_empty_query_halts_before_generation() {
        let local = Arc::new(MockBackend::replying("unreached"));
        let hosted = Arc::new(MockBackend::replying("unreached"));
        let pipeline = test_pipeline(local.clone(), hosted.clone());

        for query in ["", "   "] {
            let err = pipeline
                .answer(&QueryRequest {
                    query: query.into(),
                    top_k: None,
                    backend: None,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ChronicleError::Query(QueryError::Empty)));
        }
        assert_eq!(local.call_count(), 0);
        assert_eq!(hosted.call_count(), 0);
    }

    #[tokio::test]
    async fn test_answer_overlong_query_rejected() {
        let local = Arc::new(MockBackend::replying("unreached"));
        let hosted = Arc::new(MockBackend::replying("unreached"));
        let pipeline = test_pipeline(local.clone(), hosted);

        let err = pipeline
            .answer(&QueryRequest {
                query: "x".repeat(1001),
                top_k: None,
                backend: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChronicleError::Query(QueryError::TooLong { length: 1001, max: 1000 })
        ));
        assert_eq!(local.call_count(), 0);
    }

    #[tokio::test]
    async fn test_answer_zero_top_k_corrected_to_default() {
        let local = Arc::new(MockBackend::replying("answer"));
        let hosted = Arc::new(MockBackend::replying("unused"));
        let pipeline = test_pipeline(local, hosted);

        let response = pipeline
            .answer(&QueryRequest {
                query: "revolution".into(),
                top_k: Some(0),
                backend: None,
            })
            .await
            .unwrap();
        // Default is 5, corpus has 3 — the retriever clamps the rest.
        assert_eq!(response.effective_top_k, 3);
    }

    #[tokio::test]
    async fn test_answer_oversized_top_k_corrected_to_default() {
        let local = Arc::new(MockBackend::replying("answer"));
        let hosted = Arc::new(MockBackend::replying("unused"));
        let pipeline = test_pipeline(local, hosted);

        let response = pipeline
            .answer(&QueryRequest {
                query: "revolution".into(),
                top_k: Some(9999),
                backend: None,
            })
            .await
            .unwrap();
        assert_eq!(response.effective_top_k, 3);
    }

    #[tokio::test]
    async fn test_effective_top_k_reports_retrieved_count_under_truncation() {
        let local = Arc::new(MockBackend::replying("answer"));
        let hosted = Arc::new(MockBackend::replying("unused"));
        let embedder = HashEmbedder::new(64);
        let knowledge = KnowledgeBase::build(test_corpus(), &embedder).unwrap();
        // Budget admits the heading and nothing else.
        let mut config = ChronicleConfig::default();
        config.query.max_context_chars = 20;
        let pipeline = Pipeline::new(config, Box::new(embedder), knowledge, local, hosted);

        let response = pipeline
            .answer(&QueryRequest {
                query: "revolution".into(),
                top_k: Some(3),
                backend: None,
            })
            .await
            .unwrap();
        // Retrieval count, not the number of entries that fit the context.
        assert_eq!(response.effective_top_k, 3);
    }

    #[tokio::test]
    async fn test_answer_backend_failure_surfaces_without_fallback() {
        let local = Arc::new(MockBackend::replying("should not be consulted"));
        let hosted = Arc::new(MockBackend::failing("hosted API down"));
        let pipeline = test_pipeline(local.clone(), hosted.clone());

        let err = pipeline
            .answer(&QueryRequest {
                query: "revolution".into(),
                top_k: Some(1),
                backend: Some(BackendKind::Hosted),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChronicleError::Generation(_)));
        assert_eq!(hosted.call_count(), 1);
        // Failure never silently retries on the other backend.
        assert_eq!(local.call_count(), 0);
    }

    #[tokio::test]
    async fn test_rebuild_swaps_knowledge_base_atomically() {
        let local = Arc::new(MockBackend::replying("answer"));
        let hosted = Arc::new(MockBackend::replying("unused"));
        let pipeline = test_pipeline(local, hosted);
        assert_eq!(pipeline.knowledge().len(), 3);

        let before = pipeline.knowledge();
        pipeline
            .rebuild(Corpus::load(vec![row("Lone Event", "Only one.")]).unwrap())
            .unwrap();

        // Old snapshot stays intact for anyone still holding it.
        assert_eq!(before.len(), 3);
        assert_eq!(pipeline.knowledge().len(), 1);
        assert_eq!(
            pipeline.knowledge().index().len(),
            pipeline.knowledge().corpus().len()
        );
    }
}
