pub mod actions;
pub mod ai;
pub mod attachments;
pub mod browser;
pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod events;
pub mod host;
pub mod panel;
pub mod render;
pub mod state;
pub mod store;
pub mod view;

// Re-export main types for convenience
pub use actions::{ActionOutcome, CodeAction};
pub use ai::{ChunkSink, PawaClient};
pub use browser::{BackendStatus, BrowserSession, HealthMonitor};
pub use config::Config;
pub use conversation::ConversationLog;
pub use error::{ClientError, ClientResult};
pub use events::{InboundMessage, OutboundMessage};
pub use host::{EditorHost, NoticeLevel};
pub use panel::ChatPanel;
pub use render::{render_markdown, RenderedMarkdown, StreamAccumulator};
pub use state::{ChatMessage, ChatRole};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use view::{ChatView, ViewCommand, ViewEntry};
