//! Display-side state of the chat panel.
//!
//! `ChatView` consumes [`OutboundMessage`]s in order and keeps what the panel
//! should show. Assistant replies are re-rendered from their raw text on
//! every chunk.

use crate::events::{BlockAction, InboundMessage, OutboundMessage};
use crate::render::{escape_html, CodeBlock, RenderedMarkdown, StreamAccumulator};

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEntry {
    User { text: String },
    Assistant { raw: String, rendered: RenderedMarkdown },
    Error { text: String },
}

/// Result of a delegated click on a code block button.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    Copy(String),
    Send(InboundMessage),
}

#[derive(Debug, Default)]
pub struct ChatView {
    entries: Vec<ViewEntry>,
    // Index into `entries` of the reply being streamed
    live: Option<usize>,
    accumulator: StreamAccumulator,
    loading: bool,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ViewEntry] {
        &self.entries
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Raw text of the reply currently streaming, if any.
    pub fn live_text(&self) -> Option<&str> {
        self.live.and(self.accumulator.text())
    }

    pub fn apply(&mut self, msg: &OutboundMessage) {
        match msg {
            OutboundMessage::UserMessage { message } => {
                self.entries.push(ViewEntry::User {
                    text: message.clone(),
                });
            }
            OutboundMessage::AssistantChunk { chunk } => {
                let index = match self.live {
                    Some(index) => index,
                    None => {
                        self.accumulator.begin();
                        self.entries.push(ViewEntry::Assistant {
                            raw: String::new(),
                            rendered: RenderedMarkdown::default(),
                        });
                        let index = self.entries.len() - 1;
                        self.live = Some(index);
                        index
                    }
                };
                let rendered = self.accumulator.push(chunk);
                let raw = self.accumulator.text().unwrap_or_default().to_string();
                self.entries[index] = ViewEntry::Assistant { raw, rendered };
            }
            OutboundMessage::Loading { is_loading } => {
                self.loading = *is_loading;
                // Both the start and the end of a turn close the live reply
                self.end_turn();
            }
            OutboundMessage::Error { error } => {
                self.entries.push(ViewEntry::Error {
                    text: error.clone(),
                });
            }
            OutboundMessage::ClearChat => {
                self.entries.clear();
                self.end_turn();
            }
        }
    }

    fn end_turn(&mut self) {
        self.live = None;
        self.accumulator.finish();
    }

    /// Turn input text into a send request. A no-op while a reply is in
    /// flight or when the text is blank.
    pub fn submit(&mut self, text: &str) -> Option<InboundMessage> {
        let message = text.trim();
        if message.is_empty() || self.loading {
            return None;
        }
        // Block further sends until the session reports the turn finished
        self.loading = true;
        Some(InboundMessage::SendMessage {
            message: message.to_string(),
        })
    }

    /// Resolve a delegated click from its `data-message`, `data-action` and
    /// `data-block` attributes.
    pub fn dispatch(&self, entry: usize, action: &str, block: &str) -> Option<ViewCommand> {
        let action = BlockAction::parse(action)?;
        let block: usize = block.parse().ok()?;
        let code_block = match self.entries.get(entry)? {
            ViewEntry::Assistant { rendered, .. } => rendered.code_blocks.get(block)?,
            _ => return None,
        };
        Some(command_for(action, code_block))
    }

    /// Most recent code block in the transcript.
    pub fn last_code_block(&self) -> Option<&CodeBlock> {
        self.entries.iter().rev().find_map(|entry| match entry {
            ViewEntry::Assistant { rendered, .. } => rendered.code_blocks.last(),
            _ => None,
        })
    }

    pub fn run_on_last_block(&self, action: BlockAction) -> Option<ViewCommand> {
        self.last_code_block().map(|block| command_for(action, block))
    }

    /// Standalone HTML of the transcript.
    pub fn to_html(&self) -> String {
        let mut html = String::from(r#"<div id="messages" class="messages">"#);
        for (index, entry) in self.entries.iter().enumerate() {
            match entry {
                ViewEntry::User { text } => html.push_str(&format!(
                    r#"<div class="message user-message"><div class="message-header"><span>You</span></div><div class="message-content">{}</div></div>"#,
                    escape_html(text)
                )),
                ViewEntry::Assistant { rendered, .. } => html.push_str(&format!(
                    r#"<div class="message assistant-message" data-message="{index}"><div class="message-header"><span>Pawa AI</span></div><div class="message-content">{}</div></div>"#,
                    rendered.html
                )),
                ViewEntry::Error { text } => html.push_str(&format!(
                    r#"<div class="error-message">Error: {}</div>"#,
                    escape_html(text)
                )),
            }
        }
        if self.loading {
            html.push_str(r#"<div class="message assistant-message" id="loading-indicator"><div class="loading"></div></div>"#);
        }
        html.push_str("</div>");
        html
    }
}

fn command_for(action: BlockAction, block: &CodeBlock) -> ViewCommand {
    match action {
        BlockAction::Copy => ViewCommand::Copy(block.code.clone()),
        BlockAction::Apply => ViewCommand::Send(InboundMessage::ApplyCode {
            code: block.code.clone(),
            language: block.language.clone(),
            file_path: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render_markdown;

    fn chunk(s: &str) -> OutboundMessage {
        OutboundMessage::AssistantChunk { chunk: s.into() }
    }

    fn turn(view: &mut ChatView, user: &str, chunks: &[&str]) {
        view.apply(&OutboundMessage::UserMessage { message: user.into() });
        view.apply(&OutboundMessage::Loading { is_loading: true });
        for c in chunks {
            view.apply(&chunk(c));
        }
        view.apply(&OutboundMessage::Loading { is_loading: false });
    }

    #[test]
    fn test_chunks_accumulate_into_one_entry() {
        let mut view = ChatView::new();
        view.apply(&OutboundMessage::Loading { is_loading: true });
        view.apply(&chunk("Hel"));
        view.apply(&chunk("lo "));
        view.apply(&chunk("world"));

        assert_eq!(view.entries().len(), 1);
        assert_eq!(view.live_text(), Some("Hello world"));
        assert_eq!(
            view.entries()[0],
            ViewEntry::Assistant {
                raw: "Hello world".into(),
                rendered: render_markdown("Hello world")
            }
        );
    }

    #[test]
    fn test_each_turn_gets_its_own_reply() {
        let mut view = ChatView::new();
        turn(&mut view, "one", &["first"]);
        turn(&mut view, "two", &["second"]);

        assert_eq!(view.entries().len(), 4);
        assert!(!view.is_loading());
        assert!(view.live_text().is_none());
    }

    #[test]
    fn test_error_is_appended_after_partial_reply() {
        let mut view = ChatView::new();
        view.apply(&OutboundMessage::UserMessage { message: "q".into() });
        view.apply(&OutboundMessage::Loading { is_loading: true });
        view.apply(&chunk("partial"));
        view.apply(&OutboundMessage::Error { error: "stream reset".into() });
        view.apply(&OutboundMessage::Loading { is_loading: false });

        assert_eq!(view.entries().len(), 3);
        assert!(matches!(&view.entries()[1], ViewEntry::Assistant { rendered, .. } if rendered.html == "partial"));
        assert_eq!(view.entries()[2], ViewEntry::Error { text: "stream reset".into() });
    }

    #[test]
    fn test_submit_is_noop_while_loading() {
        let mut view = ChatView::new();
        assert!(view.submit("   ").is_none());
        assert_eq!(
            view.submit(" hi "),
            Some(InboundMessage::SendMessage { message: "hi".into() })
        );
        assert!(view.submit("again").is_none());

        view.apply(&OutboundMessage::Loading { is_loading: false });
        assert!(view.submit("again").is_some());
    }

    #[test]
    fn test_clear_chat_empties_view() {
        let mut view = ChatView::new();
        turn(&mut view, "q", &["a"]);
        view.apply(&OutboundMessage::ClearChat);
        assert!(view.entries().is_empty());
        assert_eq!(view.to_html(), r#"<div id="messages" class="messages"></div>"#);
    }

    #[test]
    fn test_dispatch_copy_and_apply() {
        let mut view = ChatView::new();
        turn(&mut view, "q", &["```py\n", "print(1)\n", "```\n"]);

        assert_eq!(
            view.dispatch(1, "copy", "0"),
            Some(ViewCommand::Copy("print(1)".into()))
        );
        assert_eq!(
            view.dispatch(1, "apply", "0"),
            Some(ViewCommand::Send(InboundMessage::ApplyCode {
                code: "print(1)".into(),
                language: "py".into(),
                file_path: None,
            }))
        );
        assert!(view.dispatch(0, "copy", "0").is_none());
        assert!(view.dispatch(1, "copy", "7").is_none());
        assert!(view.dispatch(1, "explode", "0").is_none());
        assert_eq!(view.last_code_block().map(|b| b.code.as_str()), Some("print(1)"));
    }

    #[test]
    fn test_html_export_escapes_user_text() {
        let mut view = ChatView::new();
        turn(&mut view, "<b>", &["**ok**"]);
        let html = view.to_html();
        assert!(html.contains("&lt;b&gt;"));
        assert!(html.contains("<strong>ok</strong>"));
        assert!(html.contains(r#"data-message="1""#));
    }
}
