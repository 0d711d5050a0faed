use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use pawa_core::render::{inline_spans, segments, Segment};
use pawa_core::{BackendStatus, NoticeLevel, ViewEntry};
use crate::app::{App, InputMode};

/// Prose as styled terminal lines, using the same inline passes as the HTML view.
fn styled_lines(text: &str) -> Vec<Line<'static>> {
    let mut lines = vec![Line::default()];
    for span in inline_spans(text) {
        let mut style = Style::default();
        if span.style.code {
            style = style.fg(Color::Green);
        }
        if span.style.bold {
            style = style.add_modifier(Modifier::BOLD);
        }
        if span.style.italic {
            style = style.add_modifier(Modifier::ITALIC);
        }
        for (i, part) in span.text.split('\n').enumerate() {
            if i > 0 {
                lines.push(Line::default());
            }
            if !part.is_empty() {
                if let Some(line) = lines.last_mut() {
                    line.spans.push(Span::styled(part.to_string(), style));
                }
            }
        }
    }
    lines
}

/// Rows a line takes up once word-wrapped to `width` columns.
///
/// Words move whole to the next row when they do not fit; a word wider than
/// the row is broken across rows.
fn wrapped_rows(line: &Line, width: usize) -> usize {
    if width == 0 {
        return 1;
    }
    let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();

    let mut rows = 1;
    let mut used = 0;
    for word in text.split(' ') {
        let len = Span::raw(word).width();
        if used > 0 && used + 1 + len <= width {
            used += 1 + len;
            continue;
        }
        if used > 0 {
            rows += 1;
        }
        // Start the word on a fresh row, breaking it if it is too long
        rows += len.saturating_sub(1) / width;
        used = match len % width {
            0 if len > 0 => width,
            rest => rest,
        };
    }
    rows
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let status = app.backend_status();
    let status_color = match status {
        BackendStatus::Online => Color::Green,
        BackendStatus::Offline => Color::Red,
        BackendStatus::Unknown => Color::Gray,
    };

    let title = Line::from(vec![
        Span::styled(" Pawa AI ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("[{}] ", app.model), Style::default().fg(Color::White)),
        Span::styled(status.label(), Style::default().fg(status_color)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

/// Build the transcript lines, numbering code blocks across all replies.
fn transcript_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut block_number = 0;

    for entry in app.view.entries() {
        match entry {
            ViewEntry::User { text } => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in text.lines() {
                    lines.push(Line::from(line.to_string()));
                }
                lines.push(Line::default());
            }
            ViewEntry::Assistant { raw, .. } => {
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                for segment in segments(raw) {
                    match segment {
                        Segment::Text(text) => {
                            let text = text.trim_matches('\n');
                            if !text.is_empty() {
                                lines.extend(styled_lines(text));
                            }
                        }
                        Segment::Code { language, body } => {
                            let selected = app.selected_block == Some(block_number);
                            let header_style = if selected {
                                Style::default().bg(Color::Magenta).fg(Color::White).bold()
                            } else {
                                Style::default().fg(Color::Magenta)
                            };
                            lines.push(Line::from(Span::styled(
                                format!("```{language} [{}]", block_number + 1),
                                header_style,
                            )));
                            let marker = if selected { "┃ " } else { "│ " };
                            for line in body.lines() {
                                lines.push(Line::from(vec![
                                    Span::styled(marker, Style::default().fg(Color::Magenta)),
                                    Span::styled(line.to_string(), Style::default().fg(Color::Green)),
                                ]));
                            }
                            lines.push(Line::from(Span::styled(
                                "```",
                                Style::default().fg(Color::Magenta),
                            )));
                            block_number += 1;
                        }
                    }
                }
                lines.push(Line::default());
            }
            ViewEntry::Error { text } => {
                lines.push(Line::from(Span::styled(
                    text.clone(),
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::default());
            }
        }
    }

    // Waiting for the first chunk of a reply
    if app.view.is_loading() && app.view.live_text().is_none() {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(match app.input_mode {
            InputMode::Normal => Color::Cyan,
            InputMode::Editing => Color::DarkGray,
        }))
        .title(" Chat ");

    let lines = transcript_lines(app);
    if lines.is_empty() {
        let hint = Paragraph::new(Text::from(Span::styled(
            "Ask Pawa AI about your code...",
            Style::default().fg(Color::DarkGray),
        )))
        .block(chat_block);
        frame.render_widget(hint, area);
        app.fit_scroll(0, 0);
        return;
    }

    // Inner size minus borders
    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2);
    let total_rows: usize = lines.iter().map(|l| wrapped_rows(l, inner_width)).sum();
    app.fit_scroll(total_rows.min(u16::MAX as usize) as u16, inner_height);

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(" Message ");

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut spans = vec![Span::styled(mode_text, mode_style)];

    // A pending notice takes the place of the key hints
    if let Some(notice) = &app.notice {
        let color = match notice.level {
            NoticeLevel::Info => Color::Green,
            NoticeLevel::Warning => Color::Yellow,
            NoticeLevel::Error => Color::Red,
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(notice.text.clone(), Style::default().fg(color)));
    } else {
        let hints: &[(&str, &str)] = match app.input_mode {
            InputMode::Editing => &[(" Enter ", " send "), (" Esc ", " commands "), (" ^C ", " quit ")],
            InputMode::Normal => &[
                (" j/k ", " scroll "),
                (" n/N ", " block "),
                (" c ", " copy "),
                (" a ", " apply "),
                (" e/r/f/m/t/g ", " actions "),
                (" C ", " clear "),
                (" i ", " type "),
                (" q ", " quit "),
            ],
        };
        for (key, label) in hints {
            spans.push(Span::styled(*key, key_style));
            spans.push(Span::styled(*label, label_style));
        }
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawa_core::OutboundMessage;
    use ratatui::{backend::TestBackend, Terminal};
    use tokio::sync::mpsc;

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn strip_tags(html: &str) -> String {
        let mut out = String::new();
        let mut in_tag = false;
        for c in html.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ if !in_tag => out.push(c),
                _ => {}
            }
        }
        out
    }

    #[test]
    fn test_styled_lines_match_html_render() {
        let raw = "an *italic* word\nuse **this** with `cargo`";
        let lines = styled_lines(raw);
        let text: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(text, vec!["an italic word", "use this with cargo"]);

        let html = pawa_core::render::render_html(raw);
        assert_eq!(strip_tags(&html.replace("<br>", "\n")), text.join("\n"));

        assert_eq!(lines[0].spans[1].content, "italic");
        assert!(lines[0].spans[1].style.add_modifier.contains(Modifier::ITALIC));
        assert!(lines[1].spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(lines[1].spans[3].style.fg, Some(Color::Green));

        let open = styled_lines("a **b");
        assert_eq!(line_text(&open[0]), "a **b");
    }

    #[test]
    fn test_wrapped_rows_break_at_words() {
        let line = Line::from("aaaa bbbb cccc");
        assert_eq!(wrapped_rows(&line, 14), 1);
        assert_eq!(wrapped_rows(&line, 10), 2);
        assert_eq!(wrapped_rows(&line, 6), 3);
        // Every word moves to a new row; dividing 15 columns by 6 would say 3
        assert_eq!(wrapped_rows(&Line::from("aa bbbb cc dddd"), 6), 4);
        assert_eq!(wrapped_rows(&Line::from("abcdefghij"), 4), 3);
        assert_eq!(wrapped_rows(&Line::from("ab cdefgh"), 7), 2);
        assert_eq!(wrapped_rows(&Line::default(), 10), 1);
    }

    #[test]
    fn test_transcript_numbers_code_blocks() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, "m");
        app.on_panel(OutboundMessage::UserMessage { message: "hi".into() });
        app.on_panel(OutboundMessage::AssistantChunk {
            chunk: "Here:\n```rust\nfn a() {}\n```\n".into(),
        });
        app.on_panel(OutboundMessage::Loading { is_loading: false });

        let text: Vec<String> = transcript_lines(&app).iter().map(line_text).collect();
        assert_eq!(text[0], "You:");
        assert!(text.contains(&"```rust [1]".to_string()));
        assert!(text.contains(&"│ fn a() {}".to_string()));
    }

    #[test]
    fn test_render_follows_long_transcript() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(tx, "m");
        for i in 0..30 {
            app.on_panel(OutboundMessage::UserMessage { message: format!("question {i}") });
        }

        let mut terminal = Terminal::new(TestBackend::new(40, 20)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert!(app.max_scroll > 0);
        assert_eq!(app.scroll, app.max_scroll);
    }
}
