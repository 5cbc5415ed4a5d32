//! Pluggable collaborators: model backends, auth, subscriptions, notifications

pub mod auth;
pub mod embedding;
pub mod gemini;
pub mod generation;
pub mod notify;
pub mod ollama;
pub mod subscription;

pub use auth::{AuthResolver, HeaderAuth};
pub use embedding::EmbeddingProvider;
pub use gemini::GeminiClient;
pub use generation::{GenerationOptions, TextGenerator, TokenStream};
pub use notify::{LogNotifier, UploadNotifier};
pub use ollama::OllamaClient;
pub use subscription::{ConfigSubscriptions, SubscriptionResolver};
