use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputField};
use crate::mailbox::ERROR_PREFIX;
use crate::state::ChatRole;

const USER_COLOR: Color = Color::LightGreen;
const BOT_COLOR: Color = Color::White;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input row, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_inputs(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let busy = if app.is_busy() {
        format!(" [{} pending]", app.in_flight)
    } else {
        String::new()
    };

    let title = Line::from(vec![
        Span::styled(" RAG Bot Chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!(" {} ", app.index_label), Style::default().fg(Color::Gray)),
        Span::styled(busy, Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);

    // Inner size minus borders, used for scroll calculations
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);
    if app.follow_tail {
        app.scroll_to_bottom();
    }

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} ", app.model_label));

    let chat = chat_paragraph(app)
        .block(chat_block)
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

/// The transcript as it is drawn inside the chat border. Scroll limits are
/// measured on this same paragraph so they match the rendered wrapping.
pub fn chat_paragraph(app: &App) -> Paragraph<'static> {
    Paragraph::new(chat_text(app)).wrap(Wrap { trim: true })
}

fn chat_text(app: &App) -> Text<'static> {
    if app.transcript.is_empty() && !app.is_busy() {
        Text::from(Span::styled(
            "Ask a question about the indexed documents...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for entry in app.transcript.entries() {
            match entry.role {
                ChatRole::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default().fg(USER_COLOR).add_modifier(Modifier::BOLD),
                    )));
                    for line in entry.text.lines() {
                        lines.push(Line::from(Span::styled(
                            line.to_string(),
                            Style::default().fg(USER_COLOR),
                        )));
                    }
                }
                ChatRole::Bot => {
                    lines.push(Line::from(Span::styled(
                        "Bot:",
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    )));
                    if entry.text.starts_with(ERROR_PREFIX) {
                        for line in entry.text.lines() {
                            lines.push(Line::from(Span::styled(
                                line.to_string(),
                                Style::default().fg(Color::Red),
                            )));
                        }
                    } else {
                        for line in entry.text.lines() {
                            lines.push(parse_markdown_line(line).fg(BOT_COLOR));
                        }
                    }
                }
            }
            lines.push(Line::default());
        }

        if app.is_busy() {
            lines.push(Line::from(Span::styled(
                "Bot:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    }
}

fn field_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

/// Slice of `input` that fits `width` with the cursor kept visible.
/// Returns the visible text and the cursor column inside it.
fn visible_window(input: &str, cursor: usize, width: usize) -> (String, usize) {
    let scroll_offset = if width == 0 || cursor < width {
        0
    } else {
        cursor - width + 1
    };

    let visible: String = input.chars().skip(scroll_offset).take(width).collect();
    (visible, cursor - scroll_offset)
}

fn render_inputs(app: &App, frame: &mut Frame, area: Rect) {
    let [question_area, k_area] = Layout::horizontal([
        Constraint::Min(10),
        Constraint::Length(14),
    ])
    .areas(area);

    let question_focused = app.focus == InputField::Question;
    let question_block = Block::default()
        .borders(Borders::ALL)
        .border_style(field_style(question_focused))
        .title(" Ask (Enter to send) ");
    let question_width = question_area.width.saturating_sub(2) as usize;
    let (question_text, question_cursor) =
        visible_window(&app.query_input, app.query_cursor, question_width);
    frame.render_widget(
        Paragraph::new(question_text)
            .style(Style::default().fg(USER_COLOR))
            .block(question_block),
        question_area,
    );

    let k_focused = app.focus == InputField::ResultCount;
    let k_block = Block::default()
        .borders(Borders::ALL)
        .border_style(field_style(k_focused))
        .title(" Chunks ");
    let k_width = k_area.width.saturating_sub(2) as usize;
    let (k_text, k_cursor) = visible_window(&app.k_input, app.k_cursor, k_width);
    frame.render_widget(Paragraph::new(k_text).block(k_block), k_area);

    let (target, column) = if question_focused {
        (question_area, question_cursor)
    } else {
        (k_area, k_cursor)
    };
    frame.set_cursor_position((target.x + column as u16 + 1, target.y + 1));
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let focus_label = match app.focus {
        InputField::Question => " chunks ",
        InputField::ResultCount => " question ",
    };

    let hints = vec![
        Span::styled(" Enter ", key_style),
        Span::styled(" send ", label_style),
        Span::styled(" Tab ", key_style),
        Span::styled(focus_label, label_style),
        Span::styled(" ↑/↓ PgUp/PgDn ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" Esc ", key_style),
        Span::styled(" quit ", label_style),
    ];

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AnswerRequester;
    use crate::dispatcher::{Dispatcher, QueryId};
    use crate::error::Result;
    use crate::mailbox::{mailbox, MailboxMessage};
    use crate::prompt::InstructionTemplate;
    use crate::retriever::{ContextChunk, Retriever};
    use async_trait::async_trait;
    use ratatui::{backend::TestBackend, Terminal};
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    struct NoContext;

    #[async_trait]
    impl Retriever for NoContext {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<ContextChunk>> {
            Ok(Vec::new())
        }
    }

    struct Silent;

    #[async_trait]
    impl AnswerRequester for Silent {
        async fn ask(&self, _question: &str, _context: &str) -> Result<String> {
            Ok(String::new())
        }

        fn describe(&self) -> String {
            "Silent: test".to_string()
        }
    }

    fn screen(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_markdown_bold() {
        let line = parse_markdown_line("The window is **30 days** long");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "30 days");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_markdown_unclosed_is_literal() {
        let line = parse_markdown_line("a **b");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "a **b");
    }

    #[test]
    fn test_visible_window_scrolls_with_cursor() {
        assert_eq!(visible_window("hello", 2, 10), ("hello".to_string(), 2));
        assert_eq!(visible_window("abcdefgh", 8, 4), ("fgh".to_string(), 3));
        assert_eq!(visible_window("", 0, 0), (String::new(), 0));
    }

    #[test]
    fn test_long_wrapped_answer_scrolls_fully_into_view() {
        let (tx, rx) = mailbox();
        let dispatcher = Dispatcher::new(
            Arc::new(NoContext),
            Arc::new(Silent),
            InstructionTemplate::default(),
            tx.clone(),
        );
        let mut app = App::new(dispatcher, rx, NonZeroUsize::new(5).unwrap(), "idx");
        let mut terminal = Terminal::new(TestBackend::new(22, 14)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        let mut words: Vec<String> = (0..12).map(|i| format!("word{:07}", i)).collect();
        words.push("ENDMARKER".to_string());
        assert!(tx.push(MailboxMessage::answer(QueryId(1), words.join(" "))));
        assert_eq!(app.poll_cycle(), 1);
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        assert!(screen(&terminal).contains("ENDMARKER"));
    }
}
