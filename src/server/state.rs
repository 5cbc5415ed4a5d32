//! Shared application state wiring the pipeline together

use std::fs;
use std::sync::Arc;

use crate::config::{AppConfig, BackendProvider};
use crate::error::Result;
use crate::generation::AnswerEngine;
use crate::index::InMemoryIndex;
use crate::ingestion::{IngestPipeline, IngestQueue, IngestWorker};
use crate::loader::PdfLoader;
use crate::providers::{
    AuthResolver, ConfigSubscriptions, EmbeddingProvider, GeminiClient, HeaderAuth, LogNotifier,
    OllamaClient, TextGenerator,
};
use crate::retrieval::Retriever;
use crate::storage::ChatDb;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: AppConfig,
    /// Document and conversation storage
    db: Arc<ChatDb>,
    /// Embedding provider (Ollama or Gemini)
    embedder: Arc<dyn EmbeddingProvider>,
    /// Generation provider (Ollama or Gemini)
    generator: Arc<dyn TextGenerator>,
    /// Request identity resolution
    auth: Arc<dyn AuthResolver>,
    /// Retrieval-augmented answer engine
    engine: Arc<AnswerEngine>,
    /// Handle for submitting ingestion jobs
    queue: IngestQueue,
}

impl AppState {
    /// Create new application state and start the ingestion worker
    pub async fn new(config: AppConfig) -> Result<Self> {
        tracing::info!(
            "Initializing application state (backend: {:?})...",
            config.backend
        );

        let originals_dir = config.storage.originals_dir();
        fs::create_dir_all(&originals_dir)?;

        let db = Arc::new(ChatDb::new(config.storage.database_path())?);
        tracing::info!("Database opened at {}", config.storage.database_path().display());

        let index = Arc::new(InMemoryIndex::new(config.embedding.dimensions));

        let (embedder, generator): (Arc<dyn EmbeddingProvider>, Arc<dyn TextGenerator>) =
            match config.backend {
                BackendProvider::Ollama => {
                    tracing::info!(
                        "Using Ollama backend (embed: {}, generate: {})",
                        config.ollama.embed_model,
                        config.ollama.generate_model
                    );
                    let client = Arc::new(OllamaClient::new(&config.ollama, &config.embedding));
                    (client.clone(), client)
                }
                BackendProvider::Gemini => {
                    tracing::info!(
                        "Using Gemini backend (embed: {}, generate: {})",
                        config.gemini.embedding_model,
                        config.gemini.generation_model
                    );
                    let client = Arc::new(GeminiClient::new(&config.gemini, &config.embedding)?);
                    (client.clone(), client)
                }
            };

        let subscriptions = Arc::new(ConfigSubscriptions::from_config(&config.plans)?);
        let auth: Arc<dyn AuthResolver> =
            Arc::new(HeaderAuth::new(config.server.default_user.clone()));

        let retriever = Retriever::new(embedder.clone(), index.clone());
        let engine = Arc::new(AnswerEngine::new(
            retriever,
            generator.clone(),
            db.clone(),
            db.clone(),
            config.retrieval.clone(),
            config.generation.clone(),
        ));

        let pipeline = IngestPipeline::new(
            Arc::new(PdfLoader),
            db.clone(),
            subscriptions,
            embedder.clone(),
            index,
            Arc::new(LogNotifier),
            &config.embedding,
        );

        let (queue, receiver) = IngestQueue::new(config.ingestion.queue_depth);
        let worker = IngestWorker::new(Arc::new(pipeline), config.ingestion.worker_count());
        tracing::info!(
            "Ingestion queue ready ({} workers, depth {})",
            config.ingestion.worker_count(),
            config.ingestion.queue_depth
        );
        tokio::spawn(async move {
            worker.run(receiver).await;
        });

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                embedder,
                generator,
                auth,
                engine,
                queue,
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Get the document and conversation store
    pub fn db(&self) -> &Arc<ChatDb> {
        &self.inner.db
    }

    /// Get the auth resolver
    pub fn auth(&self) -> &Arc<dyn AuthResolver> {
        &self.inner.auth
    }

    /// Get the answer engine
    pub fn engine(&self) -> &Arc<AnswerEngine> {
        &self.inner.engine
    }

    /// Get the ingestion queue handle
    pub fn queue(&self) -> &IngestQueue {
        &self.inner.queue
    }

    /// Check whether both backend providers answer their health probes
    pub async fn is_ready(&self) -> bool {
        let embed_ok = self.inner.embedder.health_check().await.unwrap_or(false);
        let generate_ok = self.inner.generator.health_check().await.unwrap_or(false);
        embed_ok && generate_ok
    }
}
