//! Editor context appended to outgoing chat messages.

use anyhow::{Context as _, Result};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Zero-based line and character offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    pub fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

/// An empty selection (`start == end`) is just the cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub start: Position,
    pub end: Position,
}

impl Selection {
    pub fn cursor(at: Position) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// What the host knows about the active document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSnapshot {
    pub path: PathBuf,
    pub language_id: String,
    pub text: String,
    pub selection: Selection,
}

impl EditorSnapshot {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>, selection: Selection) -> Self {
        let path = path.into();
        Self {
            language_id: language_id_for(&path).to_string(),
            path,
            text: text.into(),
            selection,
        }
    }

    pub fn from_path(path: impl AsRef<Path>, selection: Selection) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(Self::new(path, text, selection))
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    /// Selected text, or `None` when the selection is empty.
    pub fn selected_text(&self) -> Option<String> {
        if self.selection.is_empty() {
            return None;
        }
        Some(self.text[self.selection_range()].to_string())
    }

    /// Byte range of the selection, start before end.
    pub fn selection_range(&self) -> Range<usize> {
        let from = self.offset_of(self.selection.start);
        let to = self.offset_of(self.selection.end);
        from.min(to)..from.max(to)
    }

    /// Replace the selection with `text` and leave the cursor after it.
    pub fn splice(&mut self, text: &str) {
        let range = self.selection_range();
        let end = range.start + text.len();
        self.text.replace_range(range, text);
        let cursor = self.position_of(end);
        self.selection = Selection::cursor(cursor);
    }

    fn position_of(&self, offset: usize) -> Position {
        let before = &self.text[..offset];
        let line = before.matches('\n').count();
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        Position::new(line, before[line_start..].chars().count())
    }

    /// Whole lines `first..=last`, clipped to the document.
    pub fn lines_between(&self, first: usize, last: usize) -> String {
        self.text
            .split('\n')
            .skip(first)
            .take(last.saturating_sub(first) + 1)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Byte offset of a position, clamped to the end of its line.
    fn offset_of(&self, pos: Position) -> usize {
        let mut offset = 0;
        for (i, line) in self.text.split('\n').enumerate() {
            if i == pos.line {
                return offset
                    + line
                        .char_indices()
                        .nth(pos.character)
                        .map(|(b, _)| b)
                        .unwrap_or(line.len());
            }
            offset += line.len() + 1;
        }
        self.text.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub name: String,
    pub path: PathBuf,
}

impl WorkspaceInfo {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }
}

/// Build the context block for the current editor state.
///
/// With a selection the exact selected text is sent; otherwise a window of
/// `context_lines` lines either side of the cursor. No editor and no
/// workspace gives an empty string.
pub fn build_context(
    editor: Option<&EditorSnapshot>,
    workspace: Option<&WorkspaceInfo>,
    context_lines: usize,
) -> String {
    let mut context = String::new();

    if let Some(editor) = editor {
        let language = &editor.language_id;
        let cursor = editor.selection.start;

        context.push_str(&format!("\n\n## Current File: {}\n", editor.file_name()));
        context.push_str(&format!("Language: {language}\n"));

        match editor.selected_text() {
            Some(selected) => {
                context.push_str(&format!(
                    "\n### Selected Code:\n```{language}\n{selected}\n```\n"
                ));
            }
            None => {
                let last_line = editor.line_count().saturating_sub(1);
                let line = cursor.line.min(last_line);
                let start_line = line.saturating_sub(context_lines);
                let end_line = line.saturating_add(context_lines).min(last_line);
                let window = editor.lines_between(start_line, end_line);

                context.push_str(&format!(
                    "\n### Context (lines {}-{}):\n```{language}\n{window}\n```\n",
                    start_line + 1,
                    end_line + 1
                ));
            }
        }

        context.push_str(&format!(
            "\nCursor position: Line {}, Column {}\n",
            cursor.line + 1,
            cursor.character + 1
        ));
    }

    if let Some(workspace) = workspace {
        context.push_str(&format!("\n## Workspace: {}\n", workspace.name));
        context.push_str(&format!("Path: {}\n", workspace.path.display()));
    }

    context
}

/// File extension for a new document in `language`.
pub fn extension_for(language: &str) -> &'static str {
    match language {
        "rust" => "rs",
        "typescript" => "ts",
        "typescriptreact" => "tsx",
        "javascript" => "js",
        "javascriptreact" => "jsx",
        "python" | "py" => "py",
        "java" => "java",
        "csharp" => "cs",
        "go" => "go",
        "ruby" => "rb",
        "php" => "php",
        "c" => "c",
        "cpp" => "cpp",
        "shellscript" | "bash" | "sh" => "sh",
        "json" => "json",
        "toml" => "toml",
        "yaml" => "yaml",
        "markdown" => "md",
        "html" => "html",
        "css" => "css",
        "sql" => "sql",
        _ => "txt",
    }
}

/// Editor language id for a file, from its extension.
pub fn language_id_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "rs" => "rust",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "py" => "python",
        "java" => "java",
        "cs" => "csharp",
        "go" => "go",
        "rb" => "ruby",
        "php" => "php",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "sh" | "bash" => "shellscript",
        "json" => "json",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "md" => "markdown",
        "html" | "htm" => "html",
        "css" => "css",
        "sql" => "sql",
        _ => "plaintext",
    }
}
