//! One-shot code actions on the active editor selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::ai::{prompts, PawaClient};
use crate::context::EditorSnapshot;
use crate::host::{EditorHost, NoticeLevel};
use crate::render::{segments, Segment};

/// Language assumed for generated code when no editor is open.
const FALLBACK_LANGUAGE: &str = "typescript";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CodeAction {
    Generate,
    Explain,
    Refactor,
    Fix,
    Comment,
    Test,
    Clear,
}

impl CodeAction {
    pub const ALL: [CodeAction; 7] = [
        CodeAction::Generate,
        CodeAction::Explain,
        CodeAction::Refactor,
        CodeAction::Fix,
        CodeAction::Comment,
        CodeAction::Test,
        CodeAction::Clear,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CodeAction::Generate => "generate",
            CodeAction::Explain => "explain",
            CodeAction::Refactor => "refactor",
            CodeAction::Fix => "fix",
            CodeAction::Comment => "comment",
            CodeAction::Test => "test",
            CodeAction::Clear => "clear",
        }
    }

    /// Word used in `Please select some code to <verb>`.
    fn verb(&self) -> &'static str {
        self.name()
    }

    fn failure(&self) -> &'static str {
        match self {
            CodeAction::Generate => "Failed to generate code",
            CodeAction::Explain => "Failed to explain code",
            CodeAction::Refactor => "Failed to refactor code",
            CodeAction::Fix => "Failed to fix bug",
            CodeAction::Comment => "Failed to add comments",
            CodeAction::Test => "Failed to generate tests",
            CodeAction::Clear => "Failed to clear history",
        }
    }
}

impl fmt::Display for CodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CodeAction::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| format!("unknown action: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The result was written through the host.
    Applied,
    /// Text to send as a chat turn.
    PostToChat(String),
    ClearChat,
    /// Missing editor, selection or input; nothing was sent.
    Skipped(String),
    Failed(String),
}

/// Run `action` against the host's active editor.
///
/// `input` is the description for `generate` and the optional bug
/// description for `fix`; other actions ignore it.
pub async fn run_action<H: EditorHost>(
    action: CodeAction,
    host: &mut H,
    client: &PawaClient,
    input: Option<&str>,
) -> ActionOutcome {
    match action {
        CodeAction::Clear => ActionOutcome::ClearChat,
        CodeAction::Generate => generate(host, client, input).await,
        _ => on_selection(action, host, client, input).await,
    }
}

async fn generate<H: EditorHost>(
    host: &mut H,
    client: &PawaClient,
    input: Option<&str>,
) -> ActionOutcome {
    let action = CodeAction::Generate;
    let Some(description) = input.map(str::trim).filter(|d| !d.is_empty()) else {
        return ActionOutcome::Skipped("No description given".to_string());
    };
    let editor = host.active_editor();
    let language = editor
        .as_ref()
        .map(|e| e.language_id.clone())
        .unwrap_or_else(|| FALLBACK_LANGUAGE.to_string());

    let prompt = prompts::generate_code(description, &language);
    let code = match request(client, action, &prompt).await {
        Ok(reply) => extract_code(&reply),
        Err(message) => return fail(host, message),
    };

    let result = if editor.is_some() {
        host.insert_at_cursor(&code)
            .map(|_| host.notify(NoticeLevel::Info, "Code generated successfully!"))
    } else {
        host.open_document(&language, &code)
    };
    finish(host, action, result)
}

async fn on_selection<H: EditorHost>(
    action: CodeAction,
    host: &mut H,
    client: &PawaClient,
    input: Option<&str>,
) -> ActionOutcome {
    let editor = host.active_editor();
    let (editor, code) = match selected(host, editor, action) {
        Ok(found) => found,
        Err(outcome) => return outcome,
    };
    let language = editor.language_id.as_str();

    let prompt = match action {
        // Explanations stream into the chat panel instead
        CodeAction::Explain => {
            return ActionOutcome::PostToChat(prompts::explain_in_chat(&code, language))
        }
        CodeAction::Refactor => prompts::refactor_code(&code, language),
        CodeAction::Fix => prompts::fix_bug(&code, language, input),
        CodeAction::Comment => prompts::add_comments(&code, language),
        _ => prompts::generate_tests(&code, language, None),
    };

    let reply = match request(client, action, &prompt).await {
        Ok(reply) => extract_code(&reply),
        Err(message) => return fail(host, message),
    };

    let result = match action {
        CodeAction::Refactor => host.show_diff(&editor.path, &reply, "Pawa AI: Refactored Code"),
        CodeAction::Fix => host
            .replace_selection(&reply)
            .map(|_| host.notify(NoticeLevel::Info, "Bug fix applied!")),
        CodeAction::Comment => host
            .replace_selection(&reply)
            .map(|_| host.notify(NoticeLevel::Info, "Comments added!")),
        _ => host.open_document(language, &reply).map(|_| {
            host.notify(
                NoticeLevel::Info,
                "Tests generated! Save the file to keep them.",
            )
        }),
    };
    finish(host, action, result)
}

fn selected<H: EditorHost>(
    host: &mut H,
    editor: Option<EditorSnapshot>,
    action: CodeAction,
) -> Result<(EditorSnapshot, String), ActionOutcome> {
    let Some(editor) = editor else {
        return Err(skip(host, "No active editor".to_string()));
    };
    match editor.selected_text() {
        Some(code) => Ok((editor, code)),
        None => Err(skip(
            host,
            format!("Please select some code to {}", action.verb()),
        )),
    }
}

async fn request(client: &PawaClient, action: CodeAction, prompt: &str) -> Result<String, String> {
    debug!(%action, "running code action");
    client
        .chat(prompt, &[], "")
        .await
        .map(|reply| reply.response)
        .map_err(|e| format!("{}: {e}", action.failure()))
}

fn finish<H: EditorHost>(host: &mut H, action: CodeAction, result: anyhow::Result<()>) -> ActionOutcome {
    match result {
        Ok(()) => ActionOutcome::Applied,
        Err(e) => fail(host, format!("{}: {e}", action.failure())),
    }
}

fn skip<H: EditorHost>(host: &mut H, reason: String) -> ActionOutcome {
    host.notify(NoticeLevel::Warning, &reason);
    ActionOutcome::Skipped(reason)
}

fn fail<H: EditorHost>(host: &mut H, message: String) -> ActionOutcome {
    warn!("{message}");
    host.notify(NoticeLevel::Error, &message);
    ActionOutcome::Failed(message)
}

/// The first fenced block of a reply, or the whole reply trimmed when it has
/// none.
pub fn extract_code(reply: &str) -> String {
    segments(reply)
        .into_iter()
        .find_map(|segment| match segment {
            Segment::Code { body, .. } => Some(body.to_string()),
            Segment::Text(_) => None,
        })
        .unwrap_or_else(|| reply.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::{Position, Selection};
    use crate::host::test_support::RecordingHost;
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(uri: &str) -> PawaClient {
        PawaClient::new(Config {
            api_url: uri.to_string(),
            ..Config::default()
        })
    }

    fn host_with_selection(text: &str, selection: Selection) -> RecordingHost {
        RecordingHost {
            editor: Some(EditorSnapshot::new("/work/app.py", text, selection)),
            ..RecordingHost::default()
        }
    }

    async fn server_replying(reply: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai-agent/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": reply })))
            .mount(&server)
            .await;
        server
    }

    fn whole_line() -> Selection {
        Selection {
            start: Position::new(0, 0),
            end: Position::new(0, 9),
        }
    }

    #[tokio::test]
    async fn test_missing_selection_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let client = client_for(&server.uri());

        let mut host = RecordingHost::default();
        let outcome = run_action(CodeAction::Refactor, &mut host, &client, None).await;
        assert_eq!(outcome, ActionOutcome::Skipped("No active editor".into()));

        let mut host = host_with_selection("x = 1", Selection::cursor(Position::new(0, 0)));
        let outcome = run_action(CodeAction::Fix, &mut host, &client, None).await;
        assert_eq!(
            outcome,
            ActionOutcome::Skipped("Please select some code to fix".into())
        );
        assert_eq!(
            host.notices,
            vec![(NoticeLevel::Warning, "Please select some code to fix".to_string())]
        );
    }

    #[tokio::test]
    async fn test_fix_replaces_selection_with_code_block() {
        let server = server_replying("Here you go:\n```python\ny = 2\n```\nDone.").await;
        let client = client_for(&server.uri());
        let mut host = host_with_selection("x = 1 + 1", whole_line());

        let outcome = run_action(CodeAction::Fix, &mut host, &client, Some("wrong value")).await;
        assert_eq!(outcome, ActionOutcome::Applied);
        assert_eq!(host.replaced_selection, vec!["y = 2".to_string()]);

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body["message"],
            "Fix this bug in python code: wrong value\n\n```python\nx = 1 + 1\n```"
        );
        assert_eq!(body["stream"], false);
    }

    #[tokio::test]
    async fn test_refactor_shows_diff() {
        let server = server_replying("z = 2").await;
        let client = client_for(&server.uri());
        let mut host = host_with_selection("x = 1 + 1", whole_line());

        run_action(CodeAction::Refactor, &mut host, &client, None).await;
        assert_eq!(
            host.diffs,
            vec![(
                PathBuf::from("/work/app.py"),
                "z = 2".to_string(),
                "Pawa AI: Refactored Code".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_tests_open_new_document() {
        let server = server_replying("def test_x(): pass").await;
        let client = client_for(&server.uri());
        let mut host = host_with_selection("x = 1 + 1", whole_line());

        run_action(CodeAction::Test, &mut host, &client, None).await;
        assert_eq!(
            host.opened,
            vec![("python".to_string(), "def test_x(): pass".to_string())]
        );

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Generate pytest unit tests for this python code:"));
    }

    #[tokio::test]
    async fn test_explain_posts_to_chat_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let client = client_for(&server.uri());
        let mut host = host_with_selection("x = 1 + 1", whole_line());

        let outcome = run_action(CodeAction::Explain, &mut host, &client, None).await;
        assert_eq!(
            outcome,
            ActionOutcome::PostToChat("Explain this code:\n```python\nx = 1 + 1\n```".into())
        );
    }

    #[tokio::test]
    async fn test_generate_without_editor_opens_document() {
        let server = server_replying("```ts\nconst a = 1;\n```").await;
        let client = client_for(&server.uri());
        let mut host = RecordingHost::default();

        let outcome = run_action(CodeAction::Generate, &mut host, &client, Some("a constant")).await;
        assert_eq!(outcome, ActionOutcome::Applied);
        assert_eq!(
            host.opened,
            vec![("typescript".to_string(), "const a = 1;".to_string())]
        );

        let outcome = run_action(CodeAction::Generate, &mut host, &client, Some("  ")).await;
        assert!(matches!(outcome, ActionOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_backend_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "boom"})))
            .mount(&server)
            .await;
        let client = client_for(&server.uri());
        let mut host = host_with_selection("x = 1 + 1", whole_line());

        let outcome = run_action(CodeAction::Comment, &mut host, &client, None).await;
        let ActionOutcome::Failed(message) = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(message.starts_with("Failed to add comments: "));
        assert!(message.contains("boom"));
        assert!(host.replaced_selection.is_empty());
        assert_eq!(host.notices[0].0, NoticeLevel::Error);
    }

    #[test]
    fn test_extract_code_prefers_first_block() {
        assert_eq!(extract_code("```rs\na\n```\n```rs\nb\n```"), "a");
        assert_eq!(extract_code("  plain reply \n"), "plain reply");
    }

    #[test]
    fn test_action_names_round_trip() {
        for action in CodeAction::ALL {
            assert_eq!(action.name().parse::<CodeAction>(), Ok(action));
        }
        assert!("deploy".parse::<CodeAction>().is_err());
    }
}
