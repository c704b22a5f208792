//! Upload handling.
//!
//! Transport parsing (multipart decoding and the like) happens elsewhere.
//! This module receives descriptors of files the transport already stored,
//! checks them, sanitizes their client-supplied names and moves them into
//! the destination directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use model::{FailureKind, OperationResult};
use tracing::{debug, info, warn};

use super::resolver::{is_name_char, PathResolver, SecurityError};

/// Message for an upload whose destination is not a directory.
pub const INVALID_DESTINATION_MESSAGE: &str = "The destination directory is not a valid directory";

/// A file received by the upload transport.
pub trait IncomingFile {
    /// Whether the transport received the file completely and correctly.
    fn is_valid(&self) -> bool;

    /// Why the file is not valid.
    fn error_message(&self) -> String;

    /// The file name as sent by the client, unsanitized.
    fn client_original_name(&self) -> &str;

    /// Move the file to `directory/filename`, returning the new path.
    fn move_to(&mut self, directory: &Path, filename: &str) -> io::Result<PathBuf>;
}

/// An incoming file already written to local disk by the transport.
#[derive(Debug, Clone)]
pub struct StagedFile {
    path: PathBuf,
    original_name: String,
    error: Option<String>,
}

impl StagedFile {
    /// Describe the staged file at `path`, sent by the client as `original_name`.
    pub fn new(path: impl Into<PathBuf>, original_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            original_name: original_name.into(),
            error: None,
        }
    }

    /// Describe a local file, using its own file name as the client name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(path, original_name)
    }

    /// Mark the file as rejected by the transport.
    pub fn rejected(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Current location of the staged file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IncomingFile for StagedFile {
    fn is_valid(&self) -> bool {
        self.error.is_none() && self.path.is_file()
    }

    fn error_message(&self) -> String {
        match &self.error {
            Some(message) => message.clone(),
            None => format!("The file \"{}\" was not uploaded", self.original_name),
        }
    }

    fn client_original_name(&self) -> &str {
        &self.original_name
    }

    fn move_to(&mut self, directory: &Path, filename: &str) -> io::Result<PathBuf> {
        let target = directory.join(filename);

        if let Err(e) = fs::rename(&self.path, &target) {
            // Staging areas often live on another filesystem.
            debug!(error = %e, "Rename failed, falling back to copy");
            fs::copy(&self.path, &target)?;
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = ?self.path, error = %e, "Failed to remove staged file after copy");
            }
        }

        self.path = target.clone();
        Ok(target)
    }
}

/// Validates incoming files and moves them into the virtual tree.
#[derive(Debug, Clone)]
pub struct UploadHandler {
    resolver: PathResolver,
}

impl UploadHandler {
    /// Create an upload handler.
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Move every valid file into `destination`.
    ///
    /// Invalid files do not stop the others; their error messages are
    /// collected and returned newline-joined in a failed result.
    pub fn upload<F: IncomingFile>(
        &self,
        destination: &str,
        files: &mut [F],
    ) -> Result<OperationResult, SecurityError> {
        let real = self.resolver.resolve(destination)?;

        if !real.is_dir() {
            return Ok(OperationResult::failure(
                FailureKind::InvalidDestination,
                INVALID_DESTINATION_MESSAGE,
            ));
        }

        let mut errors = Vec::new();

        for file in files.iter_mut() {
            if !file.is_valid() {
                errors.push(file.error_message());
                continue;
            }

            let filename = sanitize_filename(file.client_original_name());
            match file.move_to(&real, &filename) {
                Ok(stored) => info!(path = ?stored, "Stored uploaded file"),
                Err(e) => {
                    warn!(
                        name = file.client_original_name(),
                        error = %e,
                        "Failed to store uploaded file"
                    );
                    errors.push(format!(
                        "Unable to move uploaded file {}",
                        file.client_original_name()
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(OperationResult::ok())
        } else {
            Ok(OperationResult::failure(FailureKind::Upload, errors.join("\n")))
        }
    }
}

/// Make a client-supplied file name safe to store.
///
/// Whitespace runs become `_`, the accented vowels é è ê and à ä are
/// transliterated, and everything outside `[A-Za-z0-9._-]` is dropped.
pub fn sanitize_filename(name: &str) -> String {
    let mut clean = String::with_capacity(name.len());
    let mut in_whitespace = false;

    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                clean.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;

        let c = match c {
            'é' | 'è' | 'ê' => 'e',
            'à' | 'ä' => 'a',
            other => other,
        };
        if is_name_char(c) {
            clean.push(c);
        }
    }

    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::resolver::VirtualRoot;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn handler(dir: &Path) -> UploadHandler {
        UploadHandler::new(PathResolver::new(Arc::new(VirtualRoot::new(dir, "/files"))))
    }

    fn stage(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Héllo World!.png"), "Hello_World.png");
        assert_eq!(sanitize_filename("a  \t b.txt"), "a_b.txt");
        assert_eq!(sanitize_filename("crème brûlée.jpg"), "creme_brlee.jpg");
        assert_eq!(sanitize_filename("déjà vu.gif"), "deja_vu.gif");
        assert_eq!(sanitize_filename("../../etc/passwd"), "....etcpasswd");
        assert_eq!(sanitize_filename("plain-name_1.txt"), "plain-name_1.txt");
    }

    #[test]
    fn test_upload_stores_sanitized_name() {
        let root = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        fs::create_dir(root.path().join("inbox")).unwrap();

        let mut files = vec![StagedFile::new(
            stage(staging.path(), "upload-1", "pixels"),
            "Héllo World!.png",
        )];

        let result = handler(root.path()).upload("/files/inbox", &mut files).unwrap();
        assert!(result.success);
        assert_eq!(
            fs::read_to_string(root.path().join("inbox/Hello_World.png")).unwrap(),
            "pixels"
        );
        assert_eq!(files[0].path(), root.path().join("inbox/Hello_World.png"));
        assert!(!staging.path().join("upload-1").exists());
    }

    #[test]
    fn test_upload_invalid_destination() {
        let root = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let staged = stage(staging.path(), "upload-1", "x");

        let mut files = vec![StagedFile::new(&staged, "a.txt")];
        let result = handler(root.path()).upload("/files/missing", &mut files).unwrap();

        assert!(result.is_failure_of(FailureKind::InvalidDestination));
        assert_eq!(result.message, INVALID_DESTINATION_MESSAGE);
        assert!(staged.exists());
    }

    #[test]
    fn test_upload_partial_failure() {
        let root = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();

        let mut files = vec![
            StagedFile::new(stage(staging.path(), "u1", "one"), "one.txt"),
            StagedFile::new(stage(staging.path(), "u2", "two"), "two.txt")
                .rejected("The file \"two.txt\" exceeds the upload limit"),
            StagedFile::new(staging.path().join("never-written"), "three.txt"),
        ];

        let result = handler(root.path()).upload("/files", &mut files).unwrap();

        assert!(result.is_failure_of(FailureKind::Upload));
        assert_eq!(
            result.message,
            "The file \"two.txt\" exceeds the upload limit\nThe file \"three.txt\" was not uploaded"
        );
        assert!(root.path().join("one.txt").is_file());
        assert!(!root.path().join("two.txt").exists());
    }

    #[test]
    fn test_upload_traversal() {
        let root = TempDir::new().unwrap();
        let mut files: Vec<StagedFile> = Vec::new();

        let result = handler(root.path()).upload("/files/../tmp", &mut files);
        assert!(matches!(result, Err(SecurityError::PathTraversal(_))));
    }

    #[test]
    fn test_staged_file_from_path() {
        let staged = StagedFile::from_path("/tmp/incoming/photo 1.png");
        assert_eq!(staged.client_original_name(), "photo 1.png");
    }
}
