//! File-backed editor host for the terminal.
//!
//! The "active editor" is a file given on the command line. Edits are written
//! straight back to disk, new documents land next to the workspace, and diffs
//! are written as a `<file>.new` sibling for review.

use anyhow::{Context, Result};
use pawa_core::context::{extension_for, EditorSnapshot, WorkspaceInfo};
use pawa_core::{EditorHost, JsonFileStore, NoticeLevel};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

pub struct TerminalHost {
    editor: Option<EditorSnapshot>,
    workspace: Option<WorkspaceInfo>,
    store: JsonFileStore,
    notices: Option<UnboundedSender<(NoticeLevel, String)>>,
}

impl TerminalHost {
    pub fn new(
        editor: Option<EditorSnapshot>,
        workspace: Option<WorkspaceInfo>,
        store: JsonFileStore,
    ) -> Self {
        Self {
            editor,
            workspace,
            store,
            notices: None,
        }
    }

    /// Send notices to the UI instead of stderr.
    pub fn with_notices(mut self, notices: UnboundedSender<(NoticeLevel, String)>) -> Self {
        self.notices = Some(notices);
        self
    }

    fn document_dir(&self) -> PathBuf {
        self.workspace
            .as_ref()
            .map(|w| w.path.clone())
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Write the active editor's text back to its file.
    fn save_editor(&self) -> Result<()> {
        let editor = self
            .editor
            .as_ref()
            .context("No active editor")?;
        fs::write(&editor.path, &editor.text)
            .with_context(|| format!("writing {}", editor.path.display()))
    }

    fn edit(&mut self, text: &str) -> Result<()> {
        let editor = self.editor.as_mut().context("No active editor")?;
        editor.splice(text);
        self.save_editor()
    }
}

impl EditorHost for TerminalHost {
    type Store = JsonFileStore;

    fn active_editor(&self) -> Option<EditorSnapshot> {
        self.editor.clone()
    }

    fn workspace(&self) -> Option<WorkspaceInfo> {
        self.workspace.clone()
    }

    fn store(&mut self) -> &mut JsonFileStore {
        &mut self.store
    }

    fn notify(&mut self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Error => warn!("{message}"),
            _ => info!("{message}"),
        }
        if let Some(tx) = &self.notices {
            if tx.send((level, message.to_string())).is_ok() {
                return;
            }
        }
        eprintln!("{message}");
    }

    fn insert_at_cursor(&mut self, text: &str) -> Result<()> {
        if let Some(editor) = self.editor.as_mut() {
            // Insert after the selection rather than over it
            editor.selection.start = editor.selection.end;
        }
        self.edit(text)
    }

    fn replace_selection(&mut self, text: &str) -> Result<()> {
        self.edit(text)
    }

    fn open_document(&mut self, language: &str, content: &str) -> Result<()> {
        let dir = self.document_dir();
        let extension = extension_for(language);
        let path = (1..)
            .map(|n| dir.join(format!("pawa-untitled-{n}.{extension}")))
            .find(|p| !p.exists())
            .context("no free document name")?;

        fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        self.notify(NoticeLevel::Info, &format!("Opened {}", path.display()));
        Ok(())
    }

    fn replace_file(&mut self, path: &Path, content: &str) -> Result<()> {
        fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        if let Some(editor) = self.editor.as_mut().filter(|e| e.path == path) {
            editor.text = content.to_string();
        }
        self.notify(NoticeLevel::Info, &format!("Updated {}", path.display()));
        Ok(())
    }

    fn show_diff(&mut self, original: &Path, proposed: &str, title: &str) -> Result<()> {
        let mut name = original.as_os_str().to_owned();
        name.push(".new");
        let target = PathBuf::from(name);

        fs::write(&target, proposed).with_context(|| format!("writing {}", target.display()))?;
        self.notify(
            NoticeLevel::Info,
            &format!("{title}: review {} against {}", target.display(), original.display()),
        );
        Ok(())
    }
}
