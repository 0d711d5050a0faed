//! Browser-side attachment staging.
//!
//! Files are read whole into memory as base64 data URLs. The chat endpoint
//! only ever receives a bracketed text descriptor per file, never the bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::render::escape_html;

/// Largest accepted attachment, in bytes (50 MiB).
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    #[serde(rename = "dataUrl")]
    pub data_url: String,
}

impl Attachment {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        let mime_type = mime_type.into();
        let data_url = format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes));
        Self {
            name: name.into(),
            mime_type,
            size: bytes.len() as u64,
            data_url,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }

    /// Text placeholder sent to the chat endpoint in place of the file.
    pub fn descriptor(&self) -> String {
        if self.is_image() {
            format!("[Uploaded image: {}]", self.name)
        } else if self.is_video() {
            format!("[Uploaded video: {}]", self.name)
        } else {
            format!("[Uploaded file: {}]", self.name)
        }
    }

    /// Inline media element shown with a sent message. Plain files show nothing.
    pub fn media_html(&self) -> String {
        let src = escape_html(&self.data_url);
        let name = escape_html(&self.name);
        if self.is_image() {
            format!(r#"<img src="{src}" alt="{name}" data-media="image">"#)
        } else if self.is_video() {
            format!(r#"<video src="{src}" controls data-media="video"></video>"#)
        } else {
            String::new()
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StagingError {
    #[error("File {name} is too large. Maximum size is 50MB.")]
    TooLarge { name: String, size: u64 },

    #[error("File {name} could not be read: {reason}")]
    Unreadable { name: String, reason: String },
}

/// Join the descriptors of every attachment, space separated.
pub fn describe(attachments: &[Attachment]) -> String {
    attachments
        .iter()
        .map(Attachment::descriptor)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Outgoing text with attachment descriptors in front of the message.
pub fn prefix_message(message: &str, attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        message.to_string()
    } else {
        format!("{}\n\n{}", describe(attachments), message)
    }
}

/// Attachments waiting to go out with the next message.
#[derive(Debug, Default, Clone)]
pub struct AttachmentStaging {
    pending: Vec<Attachment>,
}

impl AttachmentStaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage in-memory file content. `reported_size` is checked before the
    /// content is encoded.
    pub fn stage(
        &mut self,
        name: &str,
        mime_type: &str,
        reported_size: u64,
        bytes: &[u8],
    ) -> Result<(), StagingError> {
        check_size(name, reported_size)?;
        self.pending.push(Attachment::from_bytes(name, mime_type, bytes));
        debug!(name, size = reported_size, "staged attachment");
        Ok(())
    }

    /// Stage a file from disk. The size is taken from metadata so oversized
    /// files are never read.
    pub fn stage_path(&mut self, path: &Path) -> Result<(), StagingError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let size = fs::metadata(path)
            .map_err(|e| StagingError::Unreadable {
                name: name.clone(),
                reason: e.to_string(),
            })?
            .len();
        check_size(&name, size)?;

        let bytes = fs::read(path).map_err(|e| StagingError::Unreadable {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        let mime_type = mime_guess::from_path(path).first_or_octet_stream();

        self.stage(&name, mime_type.essence_str(), size, &bytes)
    }

    /// Stage several files. Rejected files are reported and skipped; the
    /// rest still stage.
    pub fn stage_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> Vec<StagingError> {
        let mut warnings = Vec::new();
        for path in paths {
            if let Err(e) = self.stage_path(path.as_ref()) {
                warn!("{e}");
                warnings.push(e);
            }
        }
        warnings
    }

    pub fn remove(&mut self, index: usize) -> Option<Attachment> {
        if index < self.pending.len() {
            Some(self.pending.remove(index))
        } else {
            None
        }
    }

    pub fn pending(&self) -> &[Attachment] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Hand over everything staged, leaving the staging area empty.
    pub fn take(&mut self) -> Vec<Attachment> {
        std::mem::take(&mut self.pending)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Thumbnail strip for the pending list. Remove buttons carry the index
    /// in `data-attachment` for delegated handling.
    pub fn render_previews(&self) -> String {
        self.pending
            .iter()
            .enumerate()
            .map(|(index, att)| {
                let preview = if att.is_image() || att.is_video() {
                    att.media_html()
                } else {
                    format!(r#"<div class="attachment-file">📄 {}</div>"#, escape_html(&att.name))
                };
                format!(
                    r#"<div class="attachment-item">{preview}<div class="attachment-remove" data-action="remove-attachment" data-attachment="{index}">×</div></div>"#
                )
            })
            .collect()
    }
}

fn check_size(name: &str, size: u64) -> Result<(), StagingError> {
    if size > MAX_FILE_SIZE {
        return Err(StagingError::TooLarge {
            name: name.to_string(),
            size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_oversized_file_rejected_siblings_staged() {
        let mut staging = AttachmentStaging::new();

        assert!(staging.stage("a.png", "image/png", 3, b"abc").is_ok());
        let err = staging
            .stage("huge.mp4", "video/mp4", MAX_FILE_SIZE + 1, b"")
            .unwrap_err();
        assert_eq!(err.to_string(), "File huge.mp4 is too large. Maximum size is 50MB.");
        assert!(staging.stage("b.txt", "text/plain", 2, b"hi").is_ok());

        let names: Vec<_> = staging.pending().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.txt"]);
        assert!(!staging.render_previews().contains("huge.mp4"));
    }

    #[test]
    fn test_exactly_at_limit_is_accepted() {
        let mut staging = AttachmentStaging::new();
        assert!(staging.stage("edge.bin", "application/octet-stream", MAX_FILE_SIZE, b"").is_ok());
    }

    #[test]
    fn test_data_url_and_descriptors() {
        let att = Attachment::from_bytes("cat.png", "image/png", b"hi");
        assert_eq!(att.data_url, "data:image/png;base64,aGk=");
        assert_eq!(att.descriptor(), "[Uploaded image: cat.png]");

        let video = Attachment::from_bytes("clip.webm", "video/webm", b"");
        let doc = Attachment::from_bytes("notes.pdf", "application/pdf", b"");
        assert_eq!(
            prefix_message("what is this?", &[att, video, doc]),
            "[Uploaded image: cat.png] [Uploaded video: clip.webm] [Uploaded file: notes.pdf]\n\nwhat is this?"
        );
        assert_eq!(prefix_message("plain", &[]), "plain");
    }

    #[test]
    fn test_stage_paths_from_disk() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("photo.jpg");
        fs::write(&image, b"\xff\xd8\xff").unwrap();
        let missing = dir.path().join("missing.txt");

        let mut staging = AttachmentStaging::new();
        let warnings = staging.stage_paths(&[missing, image]);

        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], StagingError::Unreadable { .. }));
        assert_eq!(staging.pending().len(), 1);
        assert_eq!(staging.pending()[0].mime_type, "image/jpeg");
        assert_eq!(staging.pending()[0].size, 3);
    }

    #[test]
    fn test_take_and_remove() {
        let mut staging = AttachmentStaging::new();
        staging.stage("a.txt", "text/plain", 1, b"a").unwrap();
        staging.stage("b.txt", "text/plain", 1, b"b").unwrap();

        assert_eq!(staging.remove(0).map(|a| a.name), Some("a.txt".to_string()));
        assert!(staging.remove(5).is_none());
        assert_eq!(staging.take().len(), 1);
        assert!(staging.is_empty());
    }

    #[test]
    fn test_preview_escapes_names() {
        let mut staging = AttachmentStaging::new();
        staging.stage("<x>.txt", "text/plain", 1, b"x").unwrap();
        let html = staging.render_previews();
        assert!(html.contains("&lt;x&gt;.txt"));
        assert!(html.contains(r#"data-attachment="0""#));
    }
}
