//! Result mailbox: the only channel from query workers back to the UI loop.
//!
//! Unbounded and FIFO per producer. Pushing never blocks a worker and
//! popping never blocks the UI. Across workers, messages arrive in
//! completion order, not submission order.

use std::fmt;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use crate::dispatcher::QueryId;

/// Prefix marking an answer that is really a failure description.
pub const ERROR_PREFIX: &str = "Error: ";

/// One finished query. Failures are ordinary answer text with [`ERROR_PREFIX`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxMessage {
    pub query_id: QueryId,
    pub answer_text: String,
}

impl MailboxMessage {
    pub fn answer(query_id: QueryId, answer_text: impl Into<String>) -> Self {
        Self {
            query_id,
            answer_text: answer_text.into(),
        }
    }

    pub fn error(query_id: QueryId, err: impl fmt::Display) -> Self {
        Self {
            query_id,
            answer_text: format!("{}{}", ERROR_PREFIX, err),
        }
    }

    pub fn is_error(&self) -> bool {
        self.answer_text.starts_with(ERROR_PREFIX)
    }
}

/// Create a connected sender/receiver pair.
pub fn mailbox() -> (MailboxSender, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MailboxSender { tx }, Mailbox { rx })
}

/// Producer half, cloned into every worker.
#[derive(Debug, Clone)]
pub struct MailboxSender {
    tx: mpsc::UnboundedSender<MailboxMessage>,
}

impl MailboxSender {
    /// Append a message. Returns `false` only when the UI side is gone,
    /// which happens during shutdown.
    pub fn push(&self, msg: MailboxMessage) -> bool {
        match self.tx.send(msg) {
            Ok(()) => true,
            Err(mpsc::error::SendError(msg)) => {
                debug!(query_id = %msg.query_id, "mailbox closed, dropping answer");
                false
            }
        }
    }
}

/// Consumer half, owned by the UI loop.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::UnboundedReceiver<MailboxMessage>,
}

impl Mailbox {
    /// Oldest unconsumed message, or `None` if nothing is waiting.
    pub fn try_pop(&mut self) -> Option<MailboxMessage> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Pop until empty.
    pub fn drain(&mut self) -> Vec<MailboxMessage> {
        let mut drained = Vec::new();
        while let Some(msg) = self.try_pop() {
            drained.push(msg);
        }
        drained
    }

    /// Wait for the next message. Used by tests and headless callers; the
    /// UI loop only ever calls [`Mailbox::try_pop`].
    pub async fn recv(&mut self) -> Option<MailboxMessage> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pop_does_not_block() {
        let (_tx, mut rx) = mailbox();
        assert!(rx.try_pop().is_none());
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_fifo_for_one_producer() {
        let (tx, mut rx) = mailbox();
        for i in 0..5 {
            assert!(tx.push(MailboxMessage::answer(QueryId(i), format!("answer {}", i))));
        }
        let ids: Vec<u64> = rx.drain().into_iter().map(|m| m.query_id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn test_error_prefix() {
        let msg = MailboxMessage::error(QueryId(1), "quota exceeded");
        assert_eq!(msg.answer_text, "Error: quota exceeded");
        assert!(msg.is_error());
        assert!(!MailboxMessage::answer(QueryId(2), "I don't know.").is_error());
    }

    #[test]
    fn test_push_after_consumer_dropped() {
        let (tx, rx) = mailbox();
        drop(rx);
        assert!(!tx.push(MailboxMessage::answer(QueryId(9), "late")));
    }

    #[test]
    fn test_many_threads_push_without_loss() {
        let (tx, mut rx) = mailbox();
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for i in 0..100u64 {
                        tx.push(MailboxMessage::answer(QueryId(t * 1000 + i), "x"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let drained = rx.drain();
        assert_eq!(drained.len(), 800);

        // Per-producer order survives interleaving
        for t in 0..8u64 {
            let mine: Vec<u64> = drained
                .iter()
                .map(|m| m.query_id.0)
                .filter(|id| id / 1000 == t)
                .collect();
            let mut sorted = mine.clone();
            sorted.sort_unstable();
            assert_eq!(mine, sorted);
        }
    }
}
