//! Instruction template and prompt assembly.
//!
//! The assembled prompt is the fixed instruction template with the retrieved
//! chunks, joined by newlines in retrieval order, substituted into its single
//! `{context}` placeholder. The user's question is sent alongside it, not
//! inside it.

use std::fs;
use std::path::Path;

use crate::error::{ChatError, Result};
use crate::retriever::ContextChunk;

pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Grounded-answer instructions used when no template file is configured.
pub const DEFAULT_TEMPLATE: &str = r#"You are an assistant that answers questions based strictly on the context provided below.
If the question is not directly answerable from the provided context, simply respond with "I don't know."
Do not make up answers or use your pre-trained knowledge to answer the question.
Do not ask follow-up questions, only provide answers.
Answer the question directly, without any introductory phrases or explanations.

Context:
=========
{context}
=========

Question:
"#;

/// A template with exactly one `{context}` substitution point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionTemplate {
    text: String,
    split_at: usize,
}

impl InstructionTemplate {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let count = text.matches(CONTEXT_PLACEHOLDER).count();
        if count != 1 {
            return Err(ChatError::InvalidTemplate(format!(
                "expected exactly one {} placeholder, found {}",
                CONTEXT_PLACEHOLDER, count
            )));
        }
        let split_at = text.find(CONTEXT_PLACEHOLDER).unwrap_or_default();
        Ok(Self { text, split_at })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::new(text)
    }

    fn before(&self) -> &str {
        &self.text[..self.split_at]
    }

    fn after(&self) -> &str {
        &self.text[self.split_at + CONTEXT_PLACEHOLDER.len()..]
    }
}

impl Default for InstructionTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
            split_at: DEFAULT_TEMPLATE.find(CONTEXT_PLACEHOLDER).unwrap_or_default(),
        }
    }
}

/// The template plus the joined context for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub instruction_template: InstructionTemplate,
    pub context: String,
}

impl AssembledPrompt {
    /// Template text with the context spliced in. Single pass, so a literal
    /// `{context}` inside a chunk stays as written.
    pub fn render(&self) -> String {
        let before = self.instruction_template.before();
        let after = self.instruction_template.after();
        let mut out = String::with_capacity(before.len() + self.context.len() + after.len());
        out.push_str(before);
        out.push_str(&self.context);
        out.push_str(after);
        out
    }
}

pub fn join_chunks(chunks: &[ContextChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn assemble(template: &InstructionTemplate, chunks: &[ContextChunk]) -> AssembledPrompt {
    AssembledPrompt {
        instruction_template: template.clone(),
        context: join_chunks(chunks),
    }
}
