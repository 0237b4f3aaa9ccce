use std::num::NonZeroUsize;

use ratatui::layout::Rect;
use tracing::{debug, info};

use crate::dispatcher::{parse_k, Dispatcher, Query, QueryId};
use crate::mailbox::Mailbox;
use crate::state::{ChatRole, Transcript};
use crate::ui;

/// Ticks per animation frame of the "Thinking" indicator.
const TICKS_PER_FRAME: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputField {
    Question,
    ResultCount,
}

/// UI loop state. Lives on the UI task only; workers reach it solely
/// through the mailbox drained by [`App::poll_cycle`].
pub struct App {
    pub should_quit: bool,
    pub focus: InputField,

    // Question input
    pub query_input: String,
    pub query_cursor: usize, // cursor position in query_input, in chars

    // Result count input
    pub k_input: String,
    pub k_cursor: usize,

    // Chat state
    pub transcript: Transcript,
    pub in_flight: usize,
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub follow_tail: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
    ticks: u64,

    // Header labels
    pub model_label: String,
    pub index_label: String,

    // Panel area for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,

    default_k: NonZeroUsize,
    dispatcher: Dispatcher,
    mailbox: Mailbox,
}

impl App {
    pub fn new(
        dispatcher: Dispatcher,
        mailbox: Mailbox,
        default_k: NonZeroUsize,
        index_label: impl Into<String>,
    ) -> Self {
        let model_label = dispatcher.describe_answerer();
        let k_input = default_k.to_string();
        let k_cursor = k_input.chars().count();

        Self {
            should_quit: false,
            focus: InputField::Question,

            query_input: String::new(),
            query_cursor: 0,

            k_input,
            k_cursor,

            transcript: Transcript::new(),
            in_flight: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_tail: true,

            animation_frame: 0,
            ticks: 0,

            model_label,
            index_label: index_label.into(),

            chat_area: None,

            default_k,
            dispatcher,
            mailbox,
        }
    }

    pub fn default_k(&self) -> NonZeroUsize {
        self.default_k
    }

    /// Result count that a submit right now would use.
    pub fn effective_k(&self) -> NonZeroUsize {
        parse_k(&self.k_input, self.default_k)
    }

    /// Submit whatever is in the question field.
    pub fn on_submit(&mut self) -> Option<QueryId> {
        let text = self.query_input.clone();
        let k_input = self.k_input.clone();
        self.submit_text(&text, &k_input)
    }

    /// Echo the question, clear the input and hand the query to a worker.
    /// Blank questions are ignored.
    pub fn submit_text(&mut self, text: &str, k_input: &str) -> Option<QueryId> {
        let question = text.trim();
        if question.is_empty() {
            return None;
        }

        let k = parse_k(k_input, self.default_k);
        self.transcript.push_user(question);
        self.query_input.clear();
        self.query_cursor = 0;

        let id = self.dispatcher.submit(Query::new(question, k));
        self.in_flight += 1;
        self.follow_tail = true;
        self.scroll_to_bottom();
        Some(id)
    }

    /// Drain every waiting answer into the transcript, oldest first.
    /// Returns how many were appended. Never blocks.
    pub fn poll_cycle(&mut self) -> usize {
        let drained = self.mailbox.drain();
        let count = drained.len();

        for msg in drained {
            debug!(query_id = %msg.query_id, error = msg.is_error(), "rendering answer");
            self.transcript.push_bot(msg.answer_text);
            self.in_flight = self.in_flight.saturating_sub(1);
        }

        if count > 0 {
            info!(answers = count, in_flight = self.in_flight, "drained mailbox");
            // New answers always bring the view back to the newest entry
            self.follow_tail = true;
            self.scroll_to_bottom();
        }
        count
    }

    /// Periodic timer callback: poll the mailbox and advance the animation.
    pub fn on_tick(&mut self) {
        self.poll_cycle();

        self.ticks = self.ticks.wrapping_add(1);
        if self.is_busy() && self.ticks % TICKS_PER_FRAME == 0 {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            InputField::Question => InputField::ResultCount,
            InputField::ResultCount => {
                self.leave_k_field();
                InputField::Question
            }
        };
    }

    /// An empty result-count field snaps back to the default when left.
    fn leave_k_field(&mut self) {
        if self.k_input.trim().is_empty() {
            self.k_input = self.default_k.to_string();
            self.k_cursor = self.k_input.chars().count();
        }
    }

    /// Number of rendered lines the transcript needs at the current width,
    /// counted with the same word wrapping the chat panel draws with.
    pub fn transcript_lines(&self) -> u16 {
        // Default to 50 columns until the first render reports the real width
        let wrap_width = if self.chat_width > 0 { self.chat_width } else { 50 };
        let lines = ui::chat_paragraph(self).line_count(wrap_width);
        u16::try_from(lines).unwrap_or(u16::MAX)
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.transcript_lines().saturating_sub(visible_height)
    }

    /// Scroll so the newest entry is visible
    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_scroll();
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_tail = false;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_scroll();
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
        self.follow_tail = self.chat_scroll >= max;
    }

    pub fn user_count(&self) -> usize {
        self.transcript.count(ChatRole::User)
    }

    pub fn bot_count(&self) -> usize {
        self.transcript.count(ChatRole::Bot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AnswerRequester;
    use crate::error::{ChatError, Result};
    use crate::mailbox::{mailbox, MailboxMessage, MailboxSender};
    use crate::prompt::InstructionTemplate;
    use crate::retriever::{ContextChunk, Retriever};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct NoContext;

    #[async_trait]
    impl Retriever for NoContext {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<ContextChunk>> {
            Ok(Vec::new())
        }
    }

    /// Echoes the question. Questions containing "fail" fail and ones
    /// containing "slow" take a while.
    struct Echo;

    #[async_trait]
    impl AnswerRequester for Echo {
        async fn ask(&self, question: &str, _context: &str) -> Result<String> {
            if question.contains("slow") {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            if question.contains("fail") {
                return Err(ChatError::Config("boom".to_string()));
            }
            Ok(format!("re: {}", question))
        }

        fn describe(&self) -> String {
            "Echo: test".to_string()
        }
    }

    fn app() -> App {
        app_with_sender().0
    }

    /// App plus a sender for pushing answers without running a worker.
    fn app_with_sender() -> (App, MailboxSender) {
        let (tx, rx) = mailbox();
        let dispatcher = Dispatcher::new(
            Arc::new(NoContext),
            Arc::new(Echo),
            InstructionTemplate::default(),
            tx.clone(),
        );
        let app = App::new(dispatcher, rx, NonZeroUsize::new(5).unwrap(), "test index");
        (app, tx)
    }

    /// Poll like the UI timer does until `bots` answers are in.
    async fn poll_until(app: &mut App, bots: usize) {
        for _ in 0..500 {
            app.poll_cycle();
            if app.bot_count() >= bots {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("only {} of {} answers arrived", app.bot_count(), bots);
    }

    #[tokio::test]
    async fn test_submit_echoes_immediately_and_clears_input() {
        let mut app = app();
        app.query_input = "  What is the refund window?  ".to_string();
        app.query_cursor = app.query_input.chars().count();

        assert!(app.on_submit().is_some());
        assert_eq!(app.transcript.len(), 1);
        assert_eq!(app.transcript.entries()[0].role, ChatRole::User);
        assert_eq!(app.transcript.entries()[0].text, "What is the refund window?");
        assert!(app.query_input.is_empty());
        assert_eq!(app.query_cursor, 0);
        assert!(app.is_busy());

        poll_until(&mut app, 1).await;
        assert_eq!(app.transcript.entries()[1].text, "re: What is the refund window?");
        assert!(!app.is_busy());
    }

    #[tokio::test]
    async fn test_blank_submit_is_ignored() {
        let mut app = app();
        assert!(app.submit_text("   ", "5").is_none());
        assert!(app.transcript.is_empty());
        assert_eq!(app.in_flight, 0);
    }

    #[tokio::test]
    async fn test_error_answer_rendered_and_app_keeps_going() {
        let mut app = app();
        app.submit_text("please fail", "5");
        poll_until(&mut app, 1).await;
        assert!(app.transcript.entries().last().unwrap().text.starts_with("Error: "));

        app.submit_text("next question", "5");
        poll_until(&mut app, 2).await;
        assert_eq!(app.transcript.entries().last().unwrap().text, "re: next question");
    }

    #[tokio::test]
    async fn test_poll_drains_everything_in_one_cycle() {
        let mut app = app();
        app.submit_text("one", "5");
        app.submit_text("two", "5");
        app.submit_text("three", "5");

        // Let all three workers finish before the first poll
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(app.poll_cycle(), 3);
        assert_eq!(app.bot_count(), 3);
        assert_eq!(app.poll_cycle(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_answers_both_rendered() {
        let mut app = app();
        app.submit_text("slow one", "5");
        app.submit_text("quick one", "5");
        poll_until(&mut app, 2).await;

        let bots: Vec<&str> = app
            .transcript
            .entries()
            .iter()
            .filter(|e| e.role == ChatRole::Bot)
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(bots, vec!["re: quick one", "re: slow one"]);
        assert_eq!(app.user_count(), 2);
    }

    #[tokio::test]
    async fn test_k_field_resets_when_left_empty() {
        let mut app = app();
        app.focus = InputField::ResultCount;
        app.k_input.clear();
        app.k_cursor = 0;
        app.toggle_focus();
        assert_eq!(app.focus, InputField::Question);
        assert_eq!(app.k_input, "5");
        assert_eq!(app.k_cursor, 1);
    }

    #[tokio::test]
    async fn test_effective_k_falls_back() {
        let mut app = app();
        app.k_input = "x".to_string();
        assert_eq!(app.effective_k().get(), 5);
        app.k_input = "9".to_string();
        assert_eq!(app.effective_k().get(), 9);
    }

    #[tokio::test]
    async fn test_follows_tail_until_user_scrolls_up() {
        let mut app = app();
        app.chat_height = 4;
        app.chat_width = 40;
        for i in 0..5 {
            app.transcript.push_user(format!("question {}", i));
        }
        app.scroll_to_bottom();
        let bottom = app.chat_scroll;
        assert!(bottom > 0);

        app.scroll_up(3);
        assert!(!app.follow_tail);
        app.scroll_down(100);
        assert_eq!(app.chat_scroll, bottom);
        assert!(app.follow_tail);
    }

    #[test]
    fn test_answer_drained_while_scrolled_up_shows_newest() {
        let (mut app, tx) = app_with_sender();
        app.chat_height = 4;
        app.chat_width = 40;
        for i in 0..6 {
            app.transcript.push_user(format!("question {}", i));
        }
        app.scroll_to_bottom();
        app.scroll_up(1);
        assert!(!app.follow_tail);

        assert!(tx.push(MailboxMessage::answer(QueryId(1), "NEWEST")));
        assert_eq!(app.poll_cycle(), 1);
        assert_eq!(app.chat_scroll, app.max_scroll());
        assert!(app.follow_tail);
    }

    #[test]
    fn test_transcript_lines_counts_word_wrapping() {
        let (mut app, _tx) = app_with_sender();
        app.chat_width = 20;
        let words: Vec<String> = (0..12).map(|i| format!("word{:07}", i)).collect();
        app.transcript.push_bot(words.join(" "));

        // "Bot:", one 11-char word per 20-column row, blank separator
        assert_eq!(app.transcript_lines(), 1 + 12 + 1);
    }
}
