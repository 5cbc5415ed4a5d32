//! Answer generation: prompt assembly and streamed delivery

mod engine;
mod prompt;

pub use engine::AnswerEngine;
pub use prompt::PromptBuilder;
