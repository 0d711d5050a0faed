use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::ai::stream::{ChunkSink, LineSplitter};
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::state::ChatMessage;

/// Timeout for every non-streaming request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Raw text chunks of a streamed reply, ending after the first error.
pub type ChunkStream = BoxStream<'static, ClientResult<String>>;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct AgentChatRequest<'a> {
    message: String,
    conversation_history: Vec<HistoryEntry>,
    project_path: &'a str,
    stream: bool,
}

#[derive(Serialize)]
struct GeminiChatRequest<'a> {
    message: String,
    conversation_history: Vec<HistoryEntry>,
    model: &'a str,
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiChatResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FileChange {
    pub path: String,
    pub content: String,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub files_created: Vec<FileChange>,
    #[serde(default)]
    pub files_modified: Vec<FileChange>,
}

/// Request body of the browser chat endpoint.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct WebChatRequest {
    pub message: String,
    pub conversation_id: Option<String>,
    pub use_rag: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl WebChatRequest {
    pub fn new(message: impl Into<String>, conversation_id: Option<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id,
            use_rag: true,
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct WebChatResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// HTTP client for the Pawa AI backend.
///
/// Holds configuration only; conversation state belongs to the caller.
#[derive(Clone)]
pub struct PawaClient {
    client: Client,
    config: Config,
    project_path: String,
}

impl PawaClient {
    pub fn new(config: Config) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        let project_path = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        Self {
            client,
            config,
            project_path,
        }
    }

    pub fn with_project_path(mut self, project_path: impl Into<String>) -> Self {
        self.project_path = project_path.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Model name the backend is asked to use.
    pub fn model(&self) -> &str {
        if self.config.use_gemini {
            &self.config.gemini_model
        } else {
            &self.config.model
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    /// Start a streamed reply from the agent endpoint.
    ///
    /// Fails up front on connection errors and non-2xx statuses. After that
    /// the stream yields raw lines and ends at the first read error.
    pub async fn stream_chat(
        &self,
        message: &str,
        history: &[ChatMessage],
        context: &str,
    ) -> ClientResult<ChunkStream> {
        let url = self.url("/ai-agent/chat");
        let request = AgentChatRequest {
            message: with_context(message, context),
            conversation_history: history_entries(history, false),
            project_path: &self.project_path,
            stream: true,
        };

        debug!(%url, history = history.len(), "starting streamed chat");
        let response = self.client.post(&url).json(&request).send().await?;
        let mut body = check_status(response).await?.bytes_stream();

        let s = async_stream::stream! {
            let mut splitter = LineSplitter::new();
            while let Some(read) = body.next().await {
                match read {
                    Ok(bytes) => {
                        for line in splitter.push(&bytes) {
                            yield Ok(line);
                        }
                    }
                    Err(e) => {
                        warn!("chat stream failed: {e}");
                        yield Err(ClientError::Transport(e));
                        return;
                    }
                }
            }
            if let Some(rest) = splitter.finish() {
                yield Ok(rest);
            }
        };

        Ok(Box::pin(s))
    }

    /// Drive a streamed reply into `sink`.
    pub async fn stream_chat_with<S: ChunkSink + ?Sized>(
        &self,
        message: &str,
        history: &[ChatMessage],
        context: &str,
        sink: &mut S,
    ) {
        let mut stream = match self.stream_chat(message, history, context).await {
            Ok(stream) => stream,
            Err(e) => {
                sink.on_error(e);
                return;
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => sink.on_chunk(&chunk),
                Err(e) => {
                    sink.on_error(e);
                    return;
                }
            }
        }
        sink.on_complete();
    }

    /// Non-streaming chat. Routed to the Gemini endpoint when configured.
    pub async fn chat(
        &self,
        message: &str,
        history: &[ChatMessage],
        context: &str,
    ) -> ClientResult<ChatResponse> {
        if self.config.use_gemini {
            return self.gemini_chat(message, history, context).await;
        }

        let url = self.url("/ai-agent/chat");
        let request = AgentChatRequest {
            message: with_context(message, context),
            conversation_history: history_entries(history, false),
            project_path: &self.project_path,
            stream: false,
        };

        debug!(%url, "sending chat request");
        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn gemini_chat(
        &self,
        message: &str,
        history: &[ChatMessage],
        context: &str,
    ) -> ClientResult<ChatResponse> {
        let url = self.url("/gemini/chat");
        let request = GeminiChatRequest {
            message: with_context(message, context),
            conversation_history: history_entries(history, true),
            model: &self.config.gemini_model,
            temperature: self.config.temperature,
        };

        debug!(%url, model = %self.config.gemini_model, "sending gemini chat request");
        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;
        let gemini: GeminiChatResponse = serde_json::from_slice(&body)?;

        Ok(ChatResponse {
            response: gemini.response,
            ..ChatResponse::default()
        })
    }

    /// Browser chat endpoint, keyed by a server-issued conversation id.
    pub async fn web_chat(&self, request: &WebChatRequest) -> ClientResult<WebChatResponse> {
        let url = self.url("/chat");

        debug!(%url, conversation = ?request.conversation_id, "sending web chat request");
        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(request)
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Check if the API is reachable
    pub async fn health(&self) -> bool {
        self.health_status().await.is_ok()
    }

    pub async fn health_status(&self) -> ClientResult<serde_json::Value> {
        let response = self
            .client
            .get(self.url("/health"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;
        if body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

fn with_context(message: &str, context: &str) -> String {
    if context.is_empty() {
        message.to_string()
    } else {
        format!("{message}\n\n{context}")
    }
}

fn history_entries(history: &[ChatMessage], gemini_roles: bool) -> Vec<HistoryEntry> {
    history
        .iter()
        .map(|m| HistoryEntry {
            role: if gemini_roles {
                m.role.gemini_str().to_string()
            } else {
                m.role.as_str().to_string()
            },
            content: m.content.clone(),
        })
        .collect()
}

async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if text.is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        Err(_) => text,
    };

    warn!(%status, %detail, "chat backend returned an error");
    Err(ClientError::Status { status, detail })
}
