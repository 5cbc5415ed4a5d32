//! Text generation trait with streamed output

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::Result;

/// Incremental answer text, as the model produces it
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Per-request sampling parameters
#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
}

/// Trait for streaming answer generation
///
/// A returned stream yields text fragments in order; an `Err` item means
/// generation broke mid-answer and nothing further will arrive.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Start generating from a fully rendered prompt
    async fn generate_stream(
        &self,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<TokenStream>;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
