//! Terminal chat that answers questions from a local chunk index.
//!
//! The UI loop owns all visible state. Each question is handed to a worker
//! task that retrieves context, assembles the prompt and asks the model;
//! the answer comes back through the result mailbox, which the UI drains on
//! a fixed tick.

pub mod ai;
pub mod app;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod logging;
pub mod mailbox;
pub mod prompt;
pub mod provider;
pub mod retriever;
pub mod state;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use ai::{AnswerRequester, ClaudeClient, OllamaClient, OpenAIClient};
pub use app::App;
pub use config::Config;
pub use dispatcher::{parse_k, Dispatcher, Query, QueryId};
pub use error::{ChatError, Result};
pub use mailbox::{mailbox, Mailbox, MailboxMessage, MailboxSender};
pub use prompt::{assemble, AssembledPrompt, InstructionTemplate};
pub use provider::Provider;
pub use retriever::{ChunkIndex, ContextChunk, IndexRetriever, Retriever};
pub use state::{ChatEntry, ChatRole, Transcript};
