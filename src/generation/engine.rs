//! Answer engine: drives retrieval, prompting, and streamed persistence

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::config::{GenerationConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::providers::{GenerationOptions, TextGenerator, TokenStream};
use crate::retrieval::Retriever;
use crate::storage::{ConversationStore, DocumentRegistry};
use crate::types::{Document, Message, MessageRole};

/// Tokens buffered between the model and a slow client before the
/// driver task starts applying backpressure
const STREAM_BUFFER: usize = 32;

/// Orchestrates one question or explanation against one document.
///
/// Resolves the document scoped to the requesting user before anything
/// else. Persistence contract for answers: the user message is stored
/// before any model call; the assistant message is stored exactly once,
/// and only if the stream ran to completion and every token reached the
/// client.
pub struct AnswerEngine {
    retriever: Retriever,
    generator: Arc<dyn TextGenerator>,
    registry: Arc<dyn DocumentRegistry>,
    conversations: Arc<dyn ConversationStore>,
    retrieval: RetrievalConfig,
    generation: GenerationConfig,
}

impl AnswerEngine {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn TextGenerator>,
        registry: Arc<dyn DocumentRegistry>,
        conversations: Arc<dyn ConversationStore>,
        retrieval: RetrievalConfig,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            registry,
            conversations,
            retrieval,
            generation,
        }
    }

    /// Answer a conversational question about the user's document.
    ///
    /// The returned stream yields answer fragments; an `Err` item means
    /// generation broke mid-answer, in which case the user message stays
    /// recorded and no assistant message is written.
    pub async fn answer(
        &self,
        document_id: Uuid,
        user_id: &str,
        question: &str,
    ) -> Result<TokenStream> {
        let document = self.require_document(document_id, user_id).await?;

        // History is read before the new question lands, so the prompt
        // carries the prior exchange and the question exactly once
        let history = self
            .conversations
            .recent(document.id, self.retrieval.history_limit)
            .await?;

        let user_message = Message::new(document.id, MessageRole::User, question);
        self.conversations.append(&user_message).await?;

        let context = self
            .retriever
            .retrieve(&document.namespace(), question, self.retrieval.chat_top_k)
            .await?;

        let prompt = PromptBuilder::chat_prompt(question, &context.context_text(), &history);
        let options = GenerationOptions {
            temperature: self.generation.chat_temperature,
            max_output_tokens: self.generation.max_output_tokens,
            top_p: self.generation.top_p,
        };

        tracing::info!(
            "Answer on document {}: {} context chunks, {} history messages",
            document.id,
            context.hits.len(),
            history.len()
        );

        let upstream = self.generator.generate_stream(&prompt, options).await?;
        Ok(self.drive_stream(document.id, upstream))
    }

    /// Explain a passage the reader selected. Nothing is persisted, so
    /// the upstream stream passes straight through.
    pub async fn explain(
        &self,
        document_id: Uuid,
        user_id: &str,
        selected_text: &str,
        instruction: Option<&str>,
        language: Option<&str>,
    ) -> Result<TokenStream> {
        let document = self.require_document(document_id, user_id).await?;

        let context = self
            .retriever
            .retrieve(
                &document.namespace(),
                selected_text,
                self.retrieval.explain_top_k,
            )
            .await?;

        let prompt = PromptBuilder::explain_prompt(
            selected_text,
            &context.context_text(),
            instruction,
            language,
        );
        let options = GenerationOptions {
            temperature: self.generation.explain_temperature,
            max_output_tokens: self.generation.max_output_tokens,
            top_p: self.generation.top_p,
        };

        tracing::info!(
            "Explain on document {}: {} context chunks, {} selected chars",
            document.id,
            context.hits.len(),
            selected_text.len()
        );

        self.generator.generate_stream(&prompt, options).await
    }

    /// Resolve the document, scoped to the requesting owner
    async fn require_document(&self, document_id: Uuid, user_id: &str) -> Result<Document> {
        self.registry
            .get_for_owner(document_id, user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Document {}", document_id)))
    }

    /// Forward the model stream through a driver task that accumulates
    /// the full answer and persists it on clean completion.
    ///
    /// A failed send means the client dropped the stream: forwarding
    /// stops and nothing is persisted. An upstream error is forwarded
    /// and likewise ends the attempt without persistence.
    fn drive_stream(&self, document_id: Uuid, mut upstream: TokenStream) -> TokenStream {
        let (tx, rx) = mpsc::channel::<Result<String>>(STREAM_BUFFER);
        let conversations = Arc::clone(&self.conversations);

        tokio::spawn(async move {
            let mut answer = String::new();

            while let Some(item) = upstream.next().await {
                match item {
                    Ok(piece) => {
                        answer.push_str(&piece);
                        if tx.send(Ok(piece)).await.is_err() {
                            tracing::debug!(
                                "Client dropped chat stream for document {}, discarding partial answer",
                                document_id
                            );
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Generation stream failed for document {}: {}",
                            document_id,
                            e
                        );
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            let message = Message::new(document_id, MessageRole::Assistant, answer);
            if let Err(e) = conversations.append(&message).await {
                tracing::error!(
                    "Failed to persist assistant message for document {}: {}",
                    document_id,
                    e
                );
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::index::{InMemoryIndex, VectorIndex, VectorRecord};
    use crate::providers::EmbeddingProvider;
    use crate::storage::{ChatDb, DocumentRegistry};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct FlatEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FlatEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "flat"
        }
    }

    /// Replays scripted token sequences and records every prompt it saw
    struct ScriptedGenerator {
        scripts: Mutex<Vec<Vec<Result<String>>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(scripts: Vec<Vec<Result<String>>>) -> Self {
            Self {
                scripts: Mutex::new(scripts),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn single(script: Vec<Result<String>>) -> Self {
            Self::new(vec![script])
        }

        fn recorded_prompt(&self) -> String {
            self.prompts.lock().first().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate_stream(
            &self,
            prompt: &str,
            _options: GenerationOptions,
        ) -> Result<TokenStream> {
            self.prompts.lock().push(prompt.to_string());
            let script = {
                let mut scripts = self.scripts.lock();
                if scripts.is_empty() {
                    return Err(Error::GenerationStream("no script left".to_string()));
                }
                scripts.remove(0)
            };
            Ok(Box::pin(futures_util::stream::iter(script)))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Fails at stream setup, before any token is produced
    struct BrokenGenerator;

    #[async_trait]
    impl TextGenerator for BrokenGenerator {
        async fn generate_stream(
            &self,
            _prompt: &str,
            _options: GenerationOptions,
        ) -> Result<TokenStream> {
            Err(Error::GenerationStream("backend unavailable".to_string()))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(false)
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    struct Harness {
        engine: AnswerEngine,
        db: Arc<ChatDb>,
        document: Document,
    }

    async fn harness(generator: Arc<dyn TextGenerator>) -> Harness {
        let db = Arc::new(ChatDb::in_memory().unwrap());
        let document = Document::new("tester", "doc.pdf", "hash", 100);
        db.create(&document).await.unwrap();

        let index = Arc::new(InMemoryIndex::new(2));
        index
            .upsert(
                &document.namespace(),
                vec![
                    VectorRecord {
                        embedding: vec![1.0, 0.0],
                        text: "relevant page text".to_string(),
                        position: 1,
                    },
                    VectorRecord {
                        embedding: vec![0.9, 0.1],
                        text: "second page text".to_string(),
                        position: 2,
                    },
                ],
            )
            .await
            .unwrap();

        let engine = AnswerEngine::new(
            Retriever::new(Arc::new(FlatEmbedder), index),
            generator,
            db.clone(),
            db.clone(),
            RetrievalConfig::default(),
            GenerationConfig::default(),
        );

        Harness {
            engine,
            db,
            document,
        }
    }

    async fn collect_ok(mut stream: TokenStream) -> String {
        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item.unwrap());
        }
        out
    }

    /// Wait for the driver task to settle before inspecting the store
    async fn settle() {
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_chat_streams_answer_and_persists_both_messages() {
        let generator = Arc::new(ScriptedGenerator::single(vec![
            Ok("Hel".to_string()),
            Ok("lo".to_string()),
        ]));
        let h = harness(generator).await;

        let stream = h.engine.answer(h.document.id, "tester", "say hello").await.unwrap();
        assert_eq!(collect_ok(stream).await, "Hello");

        settle().await;
        let thread = h.db.list(h.document.id).await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].role, MessageRole::User);
        assert_eq!(thread[0].text, "say hello");
        assert_eq!(thread[1].role, MessageRole::Assistant);
        assert_eq!(thread[1].text, "Hello");
    }

    #[tokio::test]
    async fn test_mid_stream_error_forwards_and_skips_assistant_message() {
        let generator = Arc::new(ScriptedGenerator::single(vec![
            Ok("Par".to_string()),
            Err(Error::GenerationStream("upstream died".to_string())),
        ]));
        let h = harness(generator).await;

        let mut stream = h.engine.answer(h.document.id, "tester", "question").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "Par");
        assert!(matches!(
            stream.next().await.unwrap(),
            Err(Error::GenerationStream(_))
        ));
        assert!(stream.next().await.is_none());

        settle().await;
        let thread = h.db.list(h.document.id).await.unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_setup_failure_keeps_user_message_only() {
        let h = harness(Arc::new(BrokenGenerator)).await;

        let err = h.engine.answer(h.document.id, "tester", "question").await.err().unwrap();
        assert!(matches!(err, Error::GenerationStream(_)));

        let thread = h.db.list(h.document.id).await.unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_client_drop_cancels_without_persisting() {
        // More tokens than the stream buffer holds, so the driver can
        // never outrun the dropped receiver
        let script: Vec<Result<String>> = (0..200).map(|i| Ok(format!("t{}", i))).collect();
        let h = harness(Arc::new(ScriptedGenerator::single(script))).await;

        let mut stream = h.engine.answer(h.document.id, "tester", "question").await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);

        settle().await;
        let thread = h.db.list(h.document.id).await.unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_chat_prompt_contains_context_history_and_question() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            vec![Ok("first answer".to_string())],
            vec![Ok("second answer".to_string())],
        ]));
        let h = harness(generator.clone()).await;

        let stream = h.engine.answer(h.document.id, "tester", "first question").await.unwrap();
        collect_ok(stream).await;
        settle().await;

        let stream = h.engine.answer(h.document.id, "tester", "second question").await.unwrap();
        collect_ok(stream).await;
        settle().await;

        let prompts = generator.prompts.lock().clone();
        assert_eq!(prompts.len(), 2);

        // First prompt: no history section yet
        assert!(!prompts[0].contains("CONVERSATION SO FAR"));
        assert!(prompts[0].contains("relevant page text"));
        assert!(prompts[0].contains("QUESTION: first question"));

        // Second prompt: prior exchange present, current question only
        // in the QUESTION slot
        assert!(prompts[1].contains("User: first question"));
        assert!(prompts[1].contains("Assistant: first answer"));
        assert!(prompts[1].contains("QUESTION: second question"));
        assert_eq!(prompts[1].matches("second question").count(), 1);
    }

    #[tokio::test]
    async fn test_history_respects_configured_limit() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            vec![Ok("a1".to_string())],
            vec![Ok("a2".to_string())],
            vec![Ok("a3".to_string())],
        ]));
        let db = Arc::new(ChatDb::in_memory().unwrap());
        let document = Document::new("tester", "doc.pdf", "hash", 100);
        db.create(&document).await.unwrap();

        let index = Arc::new(InMemoryIndex::new(2));
        let retrieval = RetrievalConfig {
            history_limit: 2,
            ..RetrievalConfig::default()
        };
        let engine = AnswerEngine::new(
            Retriever::new(Arc::new(FlatEmbedder), index),
            generator.clone(),
            db.clone(),
            db.clone(),
            retrieval,
            GenerationConfig::default(),
        );

        for question in ["q1", "q2", "q3"] {
            let stream = engine.answer(document.id, "tester", question).await.unwrap();
            collect_ok(stream).await;
            settle().await;
        }

        let prompts = generator.prompts.lock().clone();
        let third = &prompts[2];
        // Last two of (q1, a1, q2, a2) are the q2 exchange
        assert!(third.contains("User: q2"));
        assert!(third.contains("Assistant: a2"));
        assert!(!third.contains("User: q1"));
    }

    #[tokio::test]
    async fn test_explain_persists_nothing() {
        let generator = Arc::new(ScriptedGenerator::single(vec![Ok(
            "it means this".to_string()
        )]));
        let h = harness(generator.clone()).await;

        let stream = h
            .engine
            .explain(h.document.id, "tester", "confusing sentence", None, None)
            .await
            .unwrap();
        assert_eq!(collect_ok(stream).await, "it means this");

        settle().await;
        assert!(h.db.list(h.document.id).await.unwrap().is_empty());

        let prompt = generator.recorded_prompt();
        assert!(prompt.contains("SELECTED PASSAGE:"));
        assert!(prompt.contains("confusing sentence"));
    }

    #[tokio::test]
    async fn test_foreign_document_is_not_found() {
        let generator = Arc::new(ScriptedGenerator::single(vec![Ok("never".to_string())]));
        let h = harness(generator).await;

        // Wrong owner: rejected before the user message is recorded.
        let err = h
            .engine
            .answer(h.document.id, "intruder", "question")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::NotFound(_)));

        let err = h
            .engine
            .explain(h.document.id, "intruder", "text", None, None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::NotFound(_)));

        assert!(h.db.list(h.document.id).await.unwrap().is_empty());
    }
}
