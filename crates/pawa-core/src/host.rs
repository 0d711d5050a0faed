//! The boundary between the chat panel and the editor that embeds it.

use anyhow::Result;
use std::path::Path;

use crate::context::{EditorSnapshot, WorkspaceInfo};
use crate::store::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Everything the panel and the code actions need from their host editor.
pub trait EditorHost: Send {
    type Store: KeyValueStore;

    fn active_editor(&self) -> Option<EditorSnapshot>;

    fn workspace(&self) -> Option<WorkspaceInfo>;

    fn store(&mut self) -> &mut Self::Store;

    fn notify(&mut self, level: NoticeLevel, message: &str);

    fn insert_at_cursor(&mut self, text: &str) -> Result<()>;

    fn replace_selection(&mut self, text: &str) -> Result<()>;

    /// Open an unsaved document with the given content.
    fn open_document(&mut self, language: &str, content: &str) -> Result<()>;

    fn replace_file(&mut self, path: &Path, content: &str) -> Result<()>;

    /// Present `proposed` next to the current content of `original`.
    fn show_diff(&mut self, original: &Path, proposed: &str, title: &str) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::MemoryStore;
    use std::path::PathBuf;

    /// Host that records every side effect instead of performing it.
    #[derive(Default)]
    pub struct RecordingHost {
        pub editor: Option<EditorSnapshot>,
        pub workspace: Option<WorkspaceInfo>,
        pub store: MemoryStore,
        pub notices: Vec<(NoticeLevel, String)>,
        pub inserted: Vec<String>,
        pub replaced_selection: Vec<String>,
        pub opened: Vec<(String, String)>,
        pub replaced_files: Vec<(PathBuf, String)>,
        pub diffs: Vec<(PathBuf, String, String)>,
    }

    impl EditorHost for RecordingHost {
        type Store = MemoryStore;

        fn active_editor(&self) -> Option<EditorSnapshot> {
            self.editor.clone()
        }

        fn workspace(&self) -> Option<WorkspaceInfo> {
            self.workspace.clone()
        }

        fn store(&mut self) -> &mut MemoryStore {
            &mut self.store
        }

        fn notify(&mut self, level: NoticeLevel, message: &str) {
            self.notices.push((level, message.to_string()));
        }

        fn insert_at_cursor(&mut self, text: &str) -> Result<()> {
            self.inserted.push(text.to_string());
            Ok(())
        }

        fn replace_selection(&mut self, text: &str) -> Result<()> {
            self.replaced_selection.push(text.to_string());
            Ok(())
        }

        fn open_document(&mut self, language: &str, content: &str) -> Result<()> {
            self.opened.push((language.to_string(), content.to_string()));
            Ok(())
        }

        fn replace_file(&mut self, path: &Path, content: &str) -> Result<()> {
            self.replaced_files.push((path.to_path_buf(), content.to_string()));
            Ok(())
        }

        fn show_diff(&mut self, original: &Path, proposed: &str, title: &str) -> Result<()> {
            self.diffs
                .push((original.to_path_buf(), proposed.to_string(), title.to_string()));
            Ok(())
        }
    }
}
