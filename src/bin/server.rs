//! Document chat server binary
//!
//! Run with: cargo run --bin docchat-rag-server

use docchat_rag::config::{AppConfig, BackendProvider};
use docchat_rag::server::DocChatServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docchat_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                       DocChat RAG                         ║
║            Chat with your uploaded documents              ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Load configuration (DOCCHAT_CONFIG points at a TOML file)
    let config = AppConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Backend: {:?}", config.backend);
    tracing::info!("  - Embedding dimensions: {}", config.embedding.dimensions);
    tracing::info!("  - Data directory: {}", config.storage.data_dir.display());

    match config.backend {
        BackendProvider::Ollama => {
            tracing::info!("Checking Ollama at {}...", config.ollama.base_url);
            let client = reqwest::Client::new();
            match client
                .get(format!("{}/api/tags", config.ollama.base_url))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!("Ollama is running");
                }
                _ => {
                    tracing::warn!("Ollama not available at {}", config.ollama.base_url);
                    tracing::warn!("Please start Ollama:");
                    tracing::warn!("  1. Start: ollama serve");
                    tracing::warn!(
                        "  2. Pull models: ollama pull {} && ollama pull {}",
                        config.ollama.embed_model,
                        config.ollama.generate_model
                    );
                }
            }
        }
        BackendProvider::Gemini => {
            tracing::info!(
                "Using Gemini API (key read from {})",
                config.gemini.api_key_env
            );
        }
    }

    // Create and start server
    let server = DocChatServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}/api", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/documents              - Upload a PDF");
    println!("  GET  /api/documents              - List documents");
    println!("  POST /api/documents/:id/chat     - Ask a question (streaming)");
    println!("  POST /api/documents/:id/explain  - Explain a passage (streaming)");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
