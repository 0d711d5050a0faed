use pawa_core::events::BlockAction;
use pawa_core::{
    BackendStatus, ChatView, CodeAction, InboundMessage, NoticeLevel, OutboundMessage, ViewCommand,
    ViewEntry,
};
use tokio::sync::{mpsc, watch};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Last notification shown in the footer.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Chat state
    pub view: ChatView,
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars
    pub scroll: u16,
    pub max_scroll: u16,
    pub follow: bool, // keep the newest output in view

    // Code block under the cursor, counted across the transcript
    pub selected_block: Option<usize>,

    pub notice: Option<Notice>,
    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub model: String,
    pub backend: Option<watch::Receiver<BackendStatus>>,

    panel: mpsc::UnboundedSender<InboundMessage>,
}

impl App {
    pub fn new(panel: mpsc::UnboundedSender<InboundMessage>, model: impl Into<String>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            view: ChatView::new(),
            input: String::new(),
            cursor: 0,
            scroll: 0,
            max_scroll: 0,
            follow: true,
            selected_block: None,
            notice: None,
            animation_frame: 0,
            model: model.into(),
            backend: None,
            panel,
        }
    }

    pub fn with_backend_status(mut self, status: watch::Receiver<BackendStatus>) -> Self {
        self.backend = Some(status);
        self
    }

    pub fn backend_status(&self) -> BackendStatus {
        self.backend
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(BackendStatus::Unknown)
    }

    fn send(&mut self, msg: InboundMessage) {
        if self.panel.send(msg).is_err() {
            self.set_notice(NoticeLevel::Error, "Chat session has stopped");
        }
    }

    pub fn set_notice(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.notice = Some(Notice {
            level,
            text: text.into(),
        });
    }

    /// Apply a panel update to the transcript.
    pub fn on_panel(&mut self, msg: OutboundMessage) {
        if let OutboundMessage::ClearChat = msg {
            self.selected_block = None;
            self.scroll = 0;
        }
        self.view.apply(&msg);
    }

    /// Submit the input box. Blank input and sends while a reply is
    /// streaming are ignored.
    pub fn submit(&mut self) {
        if let Some(msg) = self.view.submit(&self.input) {
            debug!("submitting chat message");
            self.input.clear();
            self.cursor = 0;
            self.follow = true;
            self.send(msg);
        }
    }

    pub fn clear_history(&mut self) {
        self.send(InboundMessage::ClearHistory);
    }

    pub fn run_action(&mut self, action: CodeAction, input: Option<String>) {
        self.send(InboundMessage::RunAction { action, input });
    }

    /// All code blocks in the transcript as (entry, block) pairs.
    pub fn code_blocks(&self) -> Vec<(usize, usize)> {
        self.view
            .entries()
            .iter()
            .enumerate()
            .flat_map(|(entry, e)| {
                let count = match e {
                    ViewEntry::Assistant { rendered, .. } => rendered.code_blocks.len(),
                    _ => 0,
                };
                (0..count).map(move |block| (entry, block))
            })
            .collect()
    }

    pub fn select_next_block(&mut self) {
        let count = self.code_blocks().len();
        if count == 0 {
            return;
        }
        self.selected_block = Some(match self.selected_block {
            Some(i) => (i + 1) % count,
            None => count - 1,
        });
    }

    pub fn select_prev_block(&mut self) {
        let count = self.code_blocks().len();
        if count == 0 {
            return;
        }
        self.selected_block = Some(match self.selected_block {
            Some(0) | None => count - 1,
            Some(i) => i - 1,
        });
    }

    /// Run copy or apply on the selected code block, or the newest one.
    pub fn block_action(&mut self, action: BlockAction) -> Option<ViewCommand> {
        let blocks = self.code_blocks();
        let index = self.selected_block.or(blocks.len().checked_sub(1))?;
        let (entry, block) = *blocks.get(index)?;
        let attr = match action {
            BlockAction::Copy => "copy",
            BlockAction::Apply => "apply",
        };
        let command = self.view.dispatch(entry, attr, &block.to_string())?;
        if let ViewCommand::Send(msg) = &command {
            self.send(msg.clone());
        }
        Some(command)
    }

    pub fn tick_animation(&mut self) {
        if self.view.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, rows: u16) {
        self.follow = false;
        self.scroll = self.scroll.saturating_sub(rows);
    }

    pub fn scroll_down(&mut self, rows: u16) {
        self.scroll = self.scroll.saturating_add(rows);
        if self.scroll >= self.max_scroll {
            self.follow = true;
        }
    }

    /// Clamp the scroll offset once the transcript has been laid out.
    pub fn fit_scroll(&mut self, total_rows: u16, visible_rows: u16) {
        self.max_scroll = total_rows.saturating_sub(visible_rows);
        self.scroll = if self.follow {
            self.max_scroll
        } else {
            self.scroll.min(self.max_scroll)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> (App, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (App::new(tx, "test-model"), rx)
    }

    fn reply(app: &mut App, text: &str) {
        app.on_panel(OutboundMessage::Loading { is_loading: true });
        app.on_panel(OutboundMessage::AssistantChunk { chunk: text.into() });
        app.on_panel(OutboundMessage::Loading { is_loading: false });
    }

    #[test]
    fn test_submit_sends_once_until_reply_finishes() {
        let (mut app, mut rx) = app();
        app.input = "hello".into();
        app.submit();
        app.input = "again".into();
        app.submit();

        assert_eq!(
            rx.try_recv().unwrap(),
            InboundMessage::SendMessage { message: "hello".into() }
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(app.input, "again");
    }

    #[test]
    fn test_apply_selected_block_goes_to_panel() {
        let (mut app, mut rx) = app();
        reply(&mut app, "```rust\nfn a() {}\n```\n```rust\nfn b() {}\n```");

        assert_eq!(app.code_blocks(), vec![(0, 0), (0, 1)]);
        app.select_prev_block();
        app.select_prev_block();
        assert_eq!(app.selected_block, Some(0));

        let command = app.block_action(BlockAction::Apply);
        let expected = InboundMessage::ApplyCode {
            code: "fn a() {}".into(),
            language: "rust".into(),
            file_path: None,
        };
        assert_eq!(command, Some(ViewCommand::Send(expected.clone())));
        assert_eq!(rx.try_recv().unwrap(), expected);
    }

    #[test]
    fn test_copy_defaults_to_newest_block() {
        let (mut app, _rx) = app();
        assert!(app.block_action(BlockAction::Copy).is_none());
        reply(&mut app, "```py\nold()\n```");
        reply(&mut app, "```py\nnew()\n```");
        assert_eq!(
            app.block_action(BlockAction::Copy),
            Some(ViewCommand::Copy("new()".into()))
        );
    }

    #[test]
    fn test_clear_chat_resets_selection() {
        let (mut app, _rx) = app();
        reply(&mut app, "```py\nx\n```");
        app.select_next_block();
        app.scroll_up(3);
        app.fit_scroll(40, 10);
        assert!(!app.follow);
        app.scroll_down(100);
        assert!(app.follow);
        app.on_panel(OutboundMessage::ClearChat);
        assert!(app.selected_block.is_none());
        assert!(app.view.entries().is_empty());
    }
}
