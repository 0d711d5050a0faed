pub mod client;
pub mod prompts;
pub mod stream;

pub use client::{
    ChatResponse, ChunkStream, FileChange, PawaClient, WebChatRequest, WebChatResponse,
};
pub use stream::{ChunkSink, CollectSink, LineSplitter};
