//! Prompt templates for document-grounded answers

use crate::types::Message;

/// Prompt builder for chat and explanation requests.
///
/// Templates interpolate user text verbatim; nothing here rewrites or
/// trims the question or the selected passage.
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build the conversational prompt from retrieved context and the
    /// prior exchange. The history section disappears entirely for the
    /// first question of a thread.
    pub fn chat_prompt(question: &str, context: &str, history: &[Message]) -> String {
        let history_block = if history.is_empty() {
            String::new()
        } else {
            format!("\nCONVERSATION SO FAR:\n{}\n", Self::format_history(history))
        };

        format!(
            r#"You are an assistant answering questions about one uploaded document.
Answer only from the document excerpts below. If the excerpts do not contain the answer, say the document does not cover it. Do not invent content.

DOCUMENT EXCERPTS:
{context}
{history}
QUESTION: {question}

Answer:"#,
            context = context,
            history = history_block,
            question = question
        )
    }

    /// Build the prompt for explaining a passage the reader selected.
    ///
    /// `instruction` adds a caller-supplied steering line and `language`
    /// requests the answer in that language; omitted options leave no
    /// trace in the prompt.
    pub fn explain_prompt(
        selected_text: &str,
        context: &str,
        instruction: Option<&str>,
        language: Option<&str>,
    ) -> String {
        let mut extras = String::new();
        if let Some(instruction) = instruction {
            extras.push_str(&format!("\nADDITIONAL INSTRUCTION: {}\n", instruction));
        }
        if let Some(language) = language {
            extras.push_str(&format!("\nAnswer in {}.\n", language));
        }

        format!(
            r#"You are an assistant explaining a passage from an uploaded document.
Use the document excerpts below as context. Explain plainly what the selected passage means and how it fits the surrounding material.

DOCUMENT EXCERPTS:
{context}

SELECTED PASSAGE:
{selected}
{extras}
Explanation:"#,
            context = context,
            selected = selected_text,
            extras = extras
        )
    }

    /// One line per message, oldest first
    fn format_history(history: &[Message]) -> String {
        history
            .iter()
            .map(|m| format!("{}: {}", m.role.display_name(), m.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
