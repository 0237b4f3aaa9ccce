//! Worker dispatcher: runs retrieve -> assemble -> ask off the UI thread.
//!
//! Every submitted query gets its own tokio task and produces exactly one
//! [`MailboxMessage`], whatever happens inside the collaborators. Workers
//! share nothing with the UI except the mailbox sender.

use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::ai::AnswerRequester;
use crate::config::DEFAULT_K;
use crate::mailbox::{MailboxMessage, MailboxSender};
use crate::prompt::{assemble, InstructionTemplate};
use crate::retriever::Retriever;

/// Identifies a query in logs and in its mailbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub k: NonZeroUsize,
}

impl Query {
    pub fn new(text: impl Into<String>, k: NonZeroUsize) -> Self {
        Self {
            text: text.into(),
            k,
        }
    }
}

pub fn default_k() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_K).unwrap_or(NonZeroUsize::MIN)
}

/// Parse the result-count field. Empty, non-numeric and zero all fall
/// back to `default`.
pub fn parse_k(input: &str, default: NonZeroUsize) -> NonZeroUsize {
    input
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(NonZeroUsize::new)
        .unwrap_or(default)
}

#[derive(Clone)]
pub struct Dispatcher {
    retriever: Arc<dyn Retriever>,
    answerer: Arc<dyn AnswerRequester>,
    template: Arc<InstructionTemplate>,
    mailbox: MailboxSender,
    limiter: Option<Arc<Semaphore>>,
    limit: Option<usize>,
    next_id: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        answerer: Arc<dyn AnswerRequester>,
        template: InstructionTemplate,
        mailbox: MailboxSender,
    ) -> Self {
        Self {
            retriever,
            answerer,
            template: Arc::new(template),
            mailbox,
            limiter: None,
            limit: None,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Bound how many pipelines run at once. `None` keeps the default of
    /// one unbounded worker per query. Waiting workers park on the
    /// semaphore, never the UI.
    pub fn with_concurrency_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.filter(|n| *n > 0);
        self.limiter = self.limit.map(|n| Arc::new(Semaphore::new(n)));
        self
    }

    pub fn concurrency_limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn describe_answerer(&self) -> String {
        self.answerer.describe()
    }

    /// Spawn a worker for `query` and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, query: Query) -> QueryId {
        let id = QueryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        info!(query_id = %id, k = query.k.get(), "dispatching query");

        let worker = self.clone();
        tokio::spawn(async move {
            let msg = worker.run_contained(id, query).await;
            worker.mailbox.push(msg);
        });

        id
    }

    /// Run the pipeline, turning a panic in any collaborator into an
    /// error message so the query still yields exactly one answer.
    async fn run_contained(&self, id: QueryId, query: Query) -> MailboxMessage {
        match AssertUnwindSafe(self.run(id, query)).catch_unwind().await {
            Ok(msg) => msg,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(query_id = %id, reason = %reason, "query worker panicked");
                MailboxMessage::error(id, format!("internal error: {}", reason))
            }
        }
    }

    /// Retrieve, assemble and ask for one query. Never fails: retrieval
    /// problems mean empty context, generation problems mean an error answer.
    pub async fn run(&self, id: QueryId, query: Query) -> MailboxMessage {
        let _permit = match &self.limiter {
            Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
            None => None,
        };
        let started = Instant::now();

        let chunks = match self.retriever.search(&query.text, query.k.get()).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(query_id = %id, error = %e, "retrieval failed, continuing without context");
                Vec::new()
            }
        };
        debug!(query_id = %id, chunks = chunks.len(), "retrieval finished");

        let prompt = assemble(&self.template, &chunks);

        let msg = match self.answerer.ask(&query.text, &prompt.render()).await {
            Ok(answer) => MailboxMessage::answer(id, answer),
            Err(e) => {
                warn!(query_id = %id, error = %e, "answer request failed");
                MailboxMessage::error(id, e)
            }
        };

        info!(
            query_id = %id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            error = msg.is_error(),
            "query completed"
        );
        msg
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
