use bytes::BytesMut;

use crate::error::ClientError;

/// Splits a byte stream into newline-terminated text lines.
///
/// Bytes are buffered until a `\n` arrives, so a line split across network
/// reads (or a UTF-8 sequence split across reads) is only emitted once whole.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: BytesMut,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return every line completed by them, newline included.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Flush the held partial line at end of stream.
    ///
    /// Whitespace-only residue is dropped.
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.buf.split();
        let text = String::from_utf8_lossy(&rest).into_owned();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Callback side of a streamed reply.
///
/// For one stream, `on_chunk` fires zero or more times, then exactly one of
/// `on_complete` or `on_error`.
pub trait ChunkSink {
    fn on_chunk(&mut self, chunk: &str);

    fn on_complete(&mut self) {}

    fn on_error(&mut self, error: ClientError);
}

/// Collects a streamed reply into memory. Mostly useful for one-shot callers.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub text: String,
    pub chunks: usize,
    pub completed: bool,
    pub error: Option<String>,
}

impl ChunkSink for CollectSink {
    fn on_chunk(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.chunks += 1;
    }

    fn on_complete(&mut self) {
        self.completed = true;
    }

    fn on_error(&mut self, error: ClientError) {
        self.error = Some(error.to_string());
    }
}
