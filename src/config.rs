//! Configuration for the document chat service

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Backend provider (ollama or gemini)
    #[serde(default)]
    pub backend: BackendProvider,
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Generation configuration
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Ingestion worker configuration
    #[serde(default)]
    pub ingestion: IngestionConfig,
    /// Subscription plan limits
    #[serde(default)]
    pub plans: PlanConfig,
    /// Ollama configuration (used when backend = ollama)
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// Gemini configuration (used when backend = gemini)
    #[serde(default)]
    pub gemini: GeminiConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from the path in `DOCCHAT_CONFIG`, falling back to defaults
    pub fn load() -> Result<Self> {
        match std::env::var("DOCCHAT_CONFIG") {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Backend provider selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Local backend (Ollama for embeddings and generation)
    #[default]
    Ollama,
    /// Google Gemini API (text-embedding-004 + gemini-2.0-flash)
    Gemini,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number
    #[serde(default = "default_port")]
    pub port: u16,
    /// Enable permissive CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 32MB)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
    /// User assumed for requests without an X-User-Id header.
    /// Set to none to require the header on every request.
    #[serde(default = "default_user")]
    pub default_user: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_enable_cors() -> bool {
    true
}
fn default_max_upload_size() -> usize {
    32 * 1024 * 1024
}
fn default_user() -> Option<String> {
    Some("local".to_string())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: default_enable_cors(),
            max_upload_size: default_max_upload_size(),
            default_user: default_user(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the database and uploaded originals
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docchat-rag")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    /// Path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("docchat.db")
    }

    /// Directory where uploaded originals are kept
    pub fn originals_dir(&self) -> PathBuf {
        self.data_dir.join("originals")
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding dimensions (768 for nomic-embed-text and text-embedding-004)
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Chunks per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Retries for failed embedding requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_dimensions() -> usize {
    768
}
fn default_batch_size() -> usize {
    16
}
fn default_max_retries() -> u32 {
    2
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
        }
    }
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Temperature for conversational answers (factual, grounded)
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,
    /// Temperature for selected-text explanations
    #[serde(default = "default_explain_temperature")]
    pub explain_temperature: f32,
    /// Maximum output tokens per answer
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Nucleus sampling parameter
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_chat_temperature() -> f32 {
    0.0
}
fn default_explain_temperature() -> f32 {
    0.3
}
fn default_max_output_tokens() -> u32 {
    2048
}
fn default_top_p() -> f32 {
    0.95
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            chat_temperature: default_chat_temperature(),
            explain_temperature: default_explain_temperature(),
            max_output_tokens: default_max_output_tokens(),
            top_p: default_top_p(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Chunks retrieved for a conversational query
    #[serde(default = "default_chat_top_k")]
    pub chat_top_k: usize,
    /// Chunks retrieved for a selected-text explanation
    #[serde(default = "default_explain_top_k")]
    pub explain_top_k: usize,
    /// Prior messages included in the prompt
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_chat_top_k() -> usize {
    4
}
fn default_explain_top_k() -> usize {
    3
}
fn default_history_limit() -> usize {
    6
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chat_top_k: default_chat_top_k(),
            explain_top_k: default_explain_top_k(),
            history_limit: default_history_limit(),
        }
    }
}

/// Ingestion worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Concurrent ingestion jobs (default: CPU count, max 4)
    #[serde(default)]
    pub workers: Option<usize>,
    /// Pending jobs the queue will hold before upload requests back off
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_queue_depth() -> usize {
    100
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            workers: None,
            queue_depth: default_queue_depth(),
        }
    }
}

impl IngestionConfig {
    /// Resolved worker count
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| num_cpus::get().min(4)).max(1)
    }
}

/// Subscription plan limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Plan assigned to users with no explicit entry
    #[serde(default = "default_plan_name")]
    pub default_plan: String,
    /// Limits per plan name
    #[serde(default = "default_plan_limits")]
    pub limits: HashMap<String, PlanLimits>,
    /// Per-user plan overrides (user id -> plan name)
    #[serde(default)]
    pub users: HashMap<String, String>,
}

/// Limits for one subscription plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Maximum pages per ingested document
    pub max_units: usize,
}

fn default_plan_name() -> String {
    "free".to_string()
}

fn default_plan_limits() -> HashMap<String, PlanLimits> {
    let mut limits = HashMap::new();
    limits.insert("free".to_string(), PlanLimits { max_units: 5 });
    limits.insert("pro".to_string(), PlanLimits { max_units: 25 });
    limits
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            default_plan: default_plan_name(),
            limits: default_plan_limits(),
            users: HashMap::new(),
        }
    }
}

/// Ollama configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama base URL
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Embedding model name
    #[serde(default = "default_ollama_embed_model")]
    pub embed_model: String,
    /// Generation model name
    #[serde(default = "default_ollama_generate_model")]
    pub generate_model: String,
    /// Connection timeout in seconds.
    /// No total-request timeout is applied, so long generations stream freely.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_ollama_embed_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_ollama_generate_model() -> String {
    "llama3.2:3b".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            embed_model: default_ollama_embed_model(),
            generate_model: default_ollama_generate_model(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Gemini API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API base URL
    #[serde(default = "default_gemini_url")]
    pub base_url: String,
    /// Environment variable holding the API key (never stored in config)
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,
    /// Embedding model (default: "text-embedding-004")
    #[serde(default = "default_gemini_embedding_model")]
    pub embedding_model: String,
    /// Generation model (default: "gemini-2.0-flash")
    #[serde(default = "default_gemini_generation_model")]
    pub generation_model: String,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_gemini_embedding_model() -> String {
    "text-embedding-004".to_string()
}
fn default_gemini_generation_model() -> String {
    "gemini-2.0-flash".to_string()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_url(),
            api_key_env: default_gemini_key_env(),
            embedding_model: default_gemini_embedding_model(),
            generation_model: default_gemini_generation_model(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.backend, BackendProvider::Ollama);
        assert_eq!(config.retrieval.chat_top_k, 4);
        assert_eq!(config.retrieval.explain_top_k, 3);
        assert_eq!(config.retrieval.history_limit, 6);
        assert_eq!(config.plans.limits["free"].max_units, 5);
        assert_eq!(config.plans.limits["pro"].max_units, 25);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            backend = "gemini"

            [server]
            port = 9090

            [retrieval]
            chat_top_k = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendProvider::Gemini);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.retrieval.chat_top_k, 8);
        assert_eq!(config.retrieval.history_limit, 6);
    }

    #[test]
    fn test_plan_overrides_parse() {
        let config: AppConfig = toml::from_str(
            r#"
            [plans]
            default_plan = "free"

            [plans.limits.team]
            max_units = 100

            [plans.users]
            "user-42" = "team"
            "#,
        )
        .unwrap();

        assert_eq!(config.plans.limits["team"].max_units, 100);
        assert_eq!(config.plans.users["user-42"], "team");
    }
}
