//! The caller-facing file manager.
//!
//! [`LocalFileSystem`] owns one immutable [`VirtualRoot`] and hands it to
//! every component, so all operations agree on how virtual paths map onto
//! the real tree.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use model::{DirectoryNode, FileEntry, OperationResult};
use tracing::info;

use crate::config::{Config, FilesystemConfig};
use crate::files::{
    BrowserError, DirectoryTreeEnumerator, DownloadService, DownloadablePayload,
    FileListingService, IncomingFile, MutationOperations, PathResolver, SecurityError,
    ThumbnailRenderer, TransferError, UploadHandler, VirtualRoot,
};

/// Operations offered over a virtual directory tree.
pub trait FileManager {
    /// Every directory of the tree, the root first.
    fn list_tree(&self) -> Result<Vec<DirectoryNode>, BrowserError>;

    fn create_directory(&self, path: &str, name: &str) -> Result<OperationResult, SecurityError>;

    fn delete_directory(&self, path: &str) -> Result<OperationResult, SecurityError>;

    fn move_directory(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<OperationResult, SecurityError>;

    /// Always fails; recursive directory copy is not offered.
    fn copy_directory(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<OperationResult, SecurityError>;

    fn rename_directory(
        &self,
        origin: &str,
        new_name: &str,
    ) -> Result<OperationResult, SecurityError>;

    /// Files directly inside `directory`, optionally only images.
    fn list_files(
        &self,
        directory: &str,
        type_filter: Option<&str>,
    ) -> Result<Vec<FileEntry>, SecurityError>;

    /// Move received files into `destination`.
    fn upload<F: IncomingFile>(
        &self,
        destination: &str,
        files: &mut [F],
    ) -> Result<OperationResult, SecurityError>;

    fn download(&self, path: &str) -> Result<DownloadablePayload, TransferError>;

    /// A zip archive of the whole directory, built in a temporary file.
    fn download_directory(&self, directory: &str) -> Result<DownloadablePayload, TransferError>;

    fn delete_file(&self, path: &str) -> Result<OperationResult, SecurityError>;

    fn move_file(&self, origin: &str, destination: &str) -> Result<OperationResult, SecurityError>;

    fn copy_file(
        &self,
        origin: &str,
        destination_directory: &str,
    ) -> Result<OperationResult, SecurityError>;

    fn rename_file(&self, path: &str, new_name: &str) -> Result<OperationResult, SecurityError>;

    fn thumbnail(
        &self,
        path: &str,
        width: u32,
        height: u32,
    ) -> Result<DownloadablePayload, TransferError>;
}

/// Settings for a [`LocalFileSystem`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilesystemSettings {
    pub root_path: PathBuf,
    pub virtual_root: Option<String>,
    pub include_hidden: bool,
    pub strict_paths: bool,
    pub temp_dir: Option<PathBuf>,
}

impl FilesystemSettings {
    /// Settings for `root_path` with everything else at its default.
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            virtual_root: None,
            include_hidden: false,
            strict_paths: false,
            temp_dir: None,
        }
    }

    pub fn virtual_root(mut self, prefix: impl Into<String>) -> Self {
        self.virtual_root = Some(prefix.into());
        self
    }

    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    pub fn strict_paths(mut self, strict: bool) -> Self {
        self.strict_paths = strict;
        self
    }

    pub fn temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }
}

impl From<&FilesystemConfig> for FilesystemSettings {
    fn from(config: &FilesystemConfig) -> Self {
        Self {
            root_path: config.root_path.clone(),
            virtual_root: config.virtual_root.clone(),
            include_hidden: config.include_hidden,
            strict_paths: config.strict_paths,
            temp_dir: config.temp_dir.clone(),
        }
    }
}

/// A [`FileManager`] backed by a directory on local disk.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: Arc<VirtualRoot>,
    tree: DirectoryTreeEnumerator,
    listing: FileListingService,
    mutations: MutationOperations,
    uploads: UploadHandler,
    downloads: DownloadService,
    thumbnails: ThumbnailRenderer,
}

impl LocalFileSystem {
    /// Build the file manager for the settings' root directory.
    ///
    /// The root is canonicalized first, so it must exist.
    pub fn new(settings: FilesystemSettings) -> io::Result<Self> {
        let real_root = settings.root_path.canonicalize()?;
        let root = Arc::new(match &settings.virtual_root {
            Some(prefix) => VirtualRoot::new(real_root, prefix),
            None => VirtualRoot::from_real_root(real_root),
        });

        let resolver = PathResolver::new(Arc::clone(&root)).strict(settings.strict_paths);

        let mut downloads =
            DownloadService::new(resolver.clone()).include_hidden(settings.include_hidden);
        if let Some(temp_dir) = settings.temp_dir {
            downloads = downloads.with_temp_dir(temp_dir);
        }

        info!(
            root = %root.real_root().display(),
            prefix = root.root_path(),
            strict = settings.strict_paths,
            "File manager ready"
        );

        Ok(Self {
            tree: DirectoryTreeEnumerator::new(resolver.clone())
                .include_hidden(settings.include_hidden),
            listing: FileListingService::new(resolver.clone())
                .include_hidden(settings.include_hidden),
            mutations: MutationOperations::new(resolver.clone()),
            uploads: UploadHandler::new(resolver.clone()),
            thumbnails: ThumbnailRenderer::new(resolver),
            downloads,
            root,
        })
    }

    /// Validate `config` and build the file manager it describes.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Self::new(FilesystemSettings::from(&config.filesystem)).with_context(|| {
            format!(
                "Failed to open root directory: {}",
                config.filesystem.root_path.display()
            )
        })
    }

    /// The virtual root shared by every component.
    pub fn root(&self) -> &VirtualRoot {
        &self.root
    }
}

impl FileManager for LocalFileSystem {
    fn list_tree(&self) -> Result<Vec<DirectoryNode>, BrowserError> {
        self.tree.list_tree()
    }

    fn create_directory(&self, path: &str, name: &str) -> Result<OperationResult, SecurityError> {
        self.mutations.create_directory(path, name)
    }

    fn delete_directory(&self, path: &str) -> Result<OperationResult, SecurityError> {
        self.mutations.delete_directory(path)
    }

    fn move_directory(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<OperationResult, SecurityError> {
        self.mutations.move_directory(origin, destination)
    }

    fn copy_directory(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<OperationResult, SecurityError> {
        self.mutations.copy_directory(origin, destination)
    }

    fn rename_directory(
        &self,
        origin: &str,
        new_name: &str,
    ) -> Result<OperationResult, SecurityError> {
        self.mutations.rename_directory(origin, new_name)
    }

    fn list_files(
        &self,
        directory: &str,
        type_filter: Option<&str>,
    ) -> Result<Vec<FileEntry>, SecurityError> {
        self.listing.list_files(directory, type_filter)
    }

    fn upload<F: IncomingFile>(
        &self,
        destination: &str,
        files: &mut [F],
    ) -> Result<OperationResult, SecurityError> {
        self.uploads.upload(destination, files)
    }

    fn download(&self, path: &str) -> Result<DownloadablePayload, TransferError> {
        self.downloads.download(path)
    }

    fn download_directory(&self, directory: &str) -> Result<DownloadablePayload, TransferError> {
        self.downloads.download_directory(directory)
    }

    fn delete_file(&self, path: &str) -> Result<OperationResult, SecurityError> {
        self.mutations.delete_file(path)
    }

    fn move_file(&self, origin: &str, destination: &str) -> Result<OperationResult, SecurityError> {
        self.mutations.move_file(origin, destination)
    }

    fn copy_file(
        &self,
        origin: &str,
        destination_directory: &str,
    ) -> Result<OperationResult, SecurityError> {
        self.mutations.copy_file(origin, destination_directory)
    }

    fn rename_file(&self, path: &str, new_name: &str) -> Result<OperationResult, SecurityError> {
        self.mutations.rename_file(path, new_name)
    }

    fn thumbnail(
        &self,
        path: &str,
        width: u32,
        height: u32,
    ) -> Result<DownloadablePayload, TransferError> {
        self.thumbnails.thumbnail(path, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_prefix_is_root_basename() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("media");
        fs::create_dir(&root).unwrap();

        let manager = LocalFileSystem::new(FilesystemSettings::new(&root)).unwrap();
        assert_eq!(manager.root().prefix(), "/media");
        assert_eq!(manager.root().real_root(), root.canonicalize().unwrap());
    }

    #[test]
    fn test_explicit_prefix() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();

        let settings = FilesystemSettings::new(temp_dir.path()).virtual_root("/files/");
        let manager = LocalFileSystem::new(settings).unwrap();
        assert_eq!(manager.root().prefix(), "/files");

        let files = manager.list_files("/files", None).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].url, "/files/a.txt");
    }

    #[test]
    fn test_missing_root_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let result = LocalFileSystem::new(FilesystemSettings::new(temp_dir.path().join("missing")));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_config_validates() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.filesystem.root_path = temp_dir.path().to_path_buf();
        config.filesystem.virtual_root = Some("files".to_string());

        let err = LocalFileSystem::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("virtual_root"));

        config.filesystem.virtual_root = Some("/files".to_string());
        let manager = LocalFileSystem::from_config(&config).unwrap();
        assert_eq!(manager.root().root_path(), "/files");
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = FilesystemConfig::default();
        config.include_hidden = true;
        config.strict_paths = true;
        config.temp_dir = Some(PathBuf::from("/var/tmp"));

        let settings = FilesystemSettings::from(&config);
        assert_eq!(
            settings,
            FilesystemSettings::new(".")
                .include_hidden(true)
                .strict_paths(true)
                .temp_dir("/var/tmp")
        );
    }
}
