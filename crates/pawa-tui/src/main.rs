use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pawa_core::browser::{SendOutcome, HEALTH_POLL_INTERVAL};
use pawa_core::context::{EditorSnapshot, Position, Selection, WorkspaceInfo};
use pawa_core::{
    ActionOutcome, BrowserSession, ChatPanel, CodeAction, Config, ConversationLog, HealthMonitor,
    InboundMessage, JsonFileStore, OutboundMessage, PawaClient,
};
use tokio::sync::mpsc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const PANEL_STATE_FILE: &str = "panel-state.json";
const BROWSER_STATE_FILE: &str = "browser-state.json";

mod app;
mod handler;
mod host;
mod tui;
mod ui;

use app::App;
use host::TerminalHost;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "pawa")]
#[command(version, about = "Chat with the Pawa AI coding assistant from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    editor: EditorArgs,
}

/// The file standing in for the active editor.
#[derive(Args, Clone, Default)]
struct EditorArgs {
    /// File to use as the active editor
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// Cursor line (1-based); selection start when --end-line is given
    #[arg(long, global = true, default_value_t = 1)]
    line: usize,

    /// Cursor column (1-based)
    #[arg(long, global = true, default_value_t = 1)]
    column: usize,

    /// Selection end line (1-based)
    #[arg(long, global = true)]
    end_line: Option<usize>,

    /// Selection end column (1-based); defaults to the end of --end-line
    #[arg(long, global = true)]
    end_column: Option<usize>,

    /// Workspace folder; defaults to the current directory
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat panel (default)
    Chat,
    /// Send one message and stream the reply to stdout
    Ask {
        /// Your message
        message: Vec<String>,
    },
    /// Run a code action on the --file selection
    Action {
        /// generate, explain, refactor, fix, comment, test or clear
        action: CodeAction,
        /// Description for generate, bug description for fix
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Send one turn through the standalone browser chat
    Web {
        /// Your message
        message: Vec<String>,
        /// Files to attach
        #[arg(short, long)]
        attach: Vec<PathBuf>,
        /// Continue a saved conversation
        #[arg(short, long)]
        conversation: Option<String>,
    },
    /// List saved browser conversations
    Conversations,
    /// Check whether the backend is reachable
    Health,
    /// Show or clear the editor chat history
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
    /// Show or change the saved configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the config file location and its settings
    Show,
    /// Change one setting, e.g. `pawa config set api_url http://host:8000`
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum HistoryCommand {
    Show,
    Clear,
}

fn init_logging() -> Result<WorkerGuard> {
    let log_dir = Config::data_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::never(&log_dir, "pawa.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG overrides the default filter
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pawa_core=info,pawa=info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_filter(env_filter);

    let _ = tracing_subscriber::registry().with(file_layer).try_init();
    Ok(guard)
}

/// Editor panel state: the chat history.
fn open_panel_store() -> Result<JsonFileStore> {
    JsonFileStore::open(Config::data_dir()?.join(PANEL_STATE_FILE))
}

/// Browser session state: the saved conversation list.
fn open_browser_store() -> Result<JsonFileStore> {
    JsonFileStore::open(Config::data_dir()?.join(BROWSER_STATE_FILE))
}

impl EditorArgs {
    fn selection(&self, text: &str) -> Selection {
        let start = Position::new(self.line.saturating_sub(1), self.column.saturating_sub(1));
        let Some(end_line) = self.end_line else {
            return Selection::cursor(start);
        };
        let end_line = end_line.saturating_sub(1);
        let end_character = match self.end_column {
            Some(column) => column.saturating_sub(1),
            None => text
                .lines()
                .nth(end_line)
                .map(|l| l.chars().count())
                .unwrap_or(0),
        };
        Selection {
            start,
            end: Position::new(end_line, end_character),
        }
    }

    fn editor(&self) -> Result<Option<EditorSnapshot>> {
        let Some(path) = &self.file else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(EditorSnapshot::new(path, text.clone(), self.selection(&text))))
    }

    fn workspace(&self) -> Option<WorkspaceInfo> {
        self.workspace
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .map(WorkspaceInfo::from_path)
    }

    fn host(&self) -> Result<TerminalHost> {
        Ok(TerminalHost::new(self.editor()?, self.workspace(), open_panel_store()?))
    }
}

fn client_for(config: Config, workspace: Option<&Path>) -> PawaClient {
    let client = PawaClient::new(config);
    match workspace {
        Some(path) => client.with_project_path(path.display().to_string()),
        None => client,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging()?;

    let config = Config::load()?;
    let client = client_for(config, cli.editor.workspace.as_deref());
    info!(url = client.config().base_url(), "pawa starting");

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(&cli.editor, client).await?,
        Commands::Ask { message } => ask(&cli.editor, client, &message.join(" ")).await?,
        Commands::Action { action, input } => {
            run_action(&cli.editor, client, action, input.as_deref()).await?
        }
        Commands::Web {
            message,
            attach,
            conversation,
        } => web(client, &message.join(" "), &attach, conversation.as_deref()).await?,
        Commands::Conversations => list_conversations(client)?,
        Commands::Health => {
            if client.health().await {
                println!("Backend online at {}", client.config().base_url());
            } else {
                anyhow::bail!("Backend unreachable at {}", client.config().base_url());
            }
        }
        Commands::History { command } => history(command)?,
        Commands::Config { command } => configure(command)?,
    }

    Ok(())
}

async fn run_chat(args: &EditorArgs, client: PawaClient) -> Result<()> {
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let host = args.host()?.with_notices(notice_tx);

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let model = client.model().to_string();
    let monitor = HealthMonitor::spawn(client.clone(), HEALTH_POLL_INTERVAL);
    let panel = ChatPanel::new(client, host, outbound_tx);
    panel.replay_history();
    tokio::spawn(panel.run(inbound_rx));

    let mut app = App::new(inbound_tx, model).with_backend_status(monitor.subscribe());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    events.attach_panel(outbound_rx);
    events.attach_notices(notice_rx);

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event)?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

/// Drive a panel without a view, printing what it posts.
fn headless_panel(
    args: &EditorArgs,
    client: PawaClient,
) -> Result<(ChatPanel<TerminalHost>, tokio::task::JoinHandle<()>)> {
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let panel = ChatPanel::new(client, args.host()?, outbound_tx);

    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(msg) = outbound_rx.recv().await {
            match msg {
                OutboundMessage::AssistantChunk { chunk } => {
                    let _ = stdout.write_all(chunk.as_bytes());
                    let _ = stdout.flush();
                }
                OutboundMessage::Error { error } => eprintln!("{error}"),
                OutboundMessage::Loading { is_loading: false } => println!(),
                _ => {}
            }
        }
    });

    Ok((panel, printer))
}

async fn ask(args: &EditorArgs, client: PawaClient, message: &str) -> Result<()> {
    let (mut panel, printer) = headless_panel(args, client)?;
    panel
        .handle(InboundMessage::SendMessage {
            message: message.to_string(),
        })
        .await;
    drop(panel);
    printer.await?;
    Ok(())
}

async fn run_action(
    args: &EditorArgs,
    client: PawaClient,
    action: CodeAction,
    input: Option<&str>,
) -> Result<()> {
    let (mut panel, printer) = headless_panel(args, client)?;
    let outcome = panel.run_action(action, input).await;
    drop(panel);
    printer.await?;

    match outcome {
        ActionOutcome::Skipped(reason) => eprintln!("{reason}"),
        ActionOutcome::Failed(error) => anyhow::bail!(error),
        _ => {}
    }
    Ok(())
}

async fn web(
    client: PawaClient,
    message: &str,
    attach: &[PathBuf],
    conversation: Option<&str>,
) -> Result<()> {
    let mut session = BrowserSession::new(client, open_browser_store()?);
    if let Some(id) = conversation {
        if !session.load_conversation(id)? {
            anyhow::bail!("no saved conversation {id}");
        }
    }
    for error in session.stage_paths(attach) {
        eprintln!("{error}");
    }

    match session.send(message).await? {
        SendOutcome::Ignored => eprintln!("Nothing to send"),
        SendOutcome::Replied | SendOutcome::Failed(_) => {
            if let Some(reply) = session.messages().last() {
                println!("{}", reply.content);
            }
            if let Some(id) = session.conversation_id() {
                println!("\n[conversation {id}, {} avg]", session.stats().average_label());
            }
        }
    }
    Ok(())
}

fn list_conversations(client: PawaClient) -> Result<()> {
    let session = BrowserSession::new(client, open_browser_store()?);
    let records = session.conversations().list()?;
    if records.is_empty() {
        println!("No saved conversations");
    }
    for record in records {
        println!("{}  {} ({} messages)", record.id, record.title, record.messages.len());
    }
    Ok(())
}

fn history(command: HistoryCommand) -> Result<()> {
    let mut store = open_panel_store()?;
    let mut log = ConversationLog::new();
    log.load(&store)?;

    match command {
        HistoryCommand::Show => {
            for message in log.messages() {
                println!("{}: {}\n", message.role.as_str(), message.content);
            }
        }
        HistoryCommand::Clear => {
            log.clear(&mut store)?;
            println!("Chat history cleared");
        }
    }
    Ok(())
}

fn configure(command: ConfigCommand) -> Result<()> {
    let path = Config::get_config_path()?;
    // The file alone, without environment overrides
    let mut config = Config::load_from(&path)?;

    match command {
        ConfigCommand::Show => {
            println!("{}", path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommand::Set { key, value } => {
            config.set_field(&key, &value)?;
            config.save()?;
            println!("Saved {key} to {}", path.display());
        }
    }
    Ok(())
}
