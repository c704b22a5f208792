//! Streaming downloads of single files and zipped directories.
//!
//! This module provides:
//! - [`DownloadablePayload`]: content type, file name and a deferred stream factory
//! - [`PayloadStream`]: the opened byte stream, with an optional cleanup action
//! - [`DownloadService`]: builds payloads for files and directories
//!
//! Nothing is read until [`DownloadablePayload::open`] is called. Directory
//! downloads build a temporary zip archive up front; the archive is deleted
//! when the stream is dropped, or with the payload if it is never opened.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::browser::is_hidden;
use super::resolver::{PathResolver, SecurityError};

/// Content type of directory archives.
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Fallback content type for unrecognized binary content.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Number of leading bytes inspected for MIME detection.
const SNIFF_LEN: u64 = 8192;

/// Errors that can occur while preparing or opening a download.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The path was rejected by the resolver.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// The requested path does not exist.
    #[error("file not found: {0}")]
    NotFound(String),

    /// A file was expected but the path is a directory.
    #[error("path is a directory: {0}")]
    IsADirectory(String),

    /// A directory was expected.
    #[error("path is not a directory: {0}")]
    NotADirectory(String),

    /// Thumbnail bounds must be positive.
    #[error("invalid thumbnail size {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// The image format cannot be thumbnailed.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Directory walk error.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Archive writer error.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Image codec error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

type Cleanup = Box<dyn FnOnce() + Send>;
type StreamFactory = Box<dyn FnOnce() -> Result<PayloadStream, TransferError> + Send>;

/// An opened download stream.
///
/// If a cleanup action is attached it runs exactly once, when the stream is
/// dropped, whether the consumer read everything or gave up early.
pub struct PayloadStream {
    reader: Box<dyn Read + Send>,
    cleanup: Option<Cleanup>,
}

impl PayloadStream {
    /// Wrap a reader with no cleanup action.
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            cleanup: None,
        }
    }

    /// Wrap a reader and run `cleanup` once the stream is released.
    pub fn with_cleanup(
        reader: impl Read + Send + 'static,
        cleanup: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// Release the stream now.
    pub fn close(self) {}
}

impl Read for PayloadStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Drop for PayloadStream {
    fn drop(&mut self) {
        // Close the reader before cleanup so the backing file is released.
        self.reader = Box::new(io::empty());
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl fmt::Debug for PayloadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadStream")
            .field("has_cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// A download that has not been opened yet.
pub struct DownloadablePayload {
    content_type: String,
    filename: String,
    factory: StreamFactory,
}

impl DownloadablePayload {
    /// Create a payload whose stream is produced by `factory` on demand.
    pub fn new(
        content_type: impl Into<String>,
        filename: impl Into<String>,
        factory: impl FnOnce() -> Result<PayloadStream, TransferError> + Send + 'static,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            filename: filename.into(),
            factory: Box::new(factory),
        }
    }

    /// MIME type of the content.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Suggested file name for the download.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Open the stream. The payload is consumed; it can be opened only once.
    pub fn open(self) -> Result<PayloadStream, TransferError> {
        (self.factory)()
    }
}

impl fmt::Debug for DownloadablePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadablePayload")
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .finish()
    }
}

/// Builds download payloads for files and directories.
#[derive(Debug, Clone)]
pub struct DownloadService {
    resolver: PathResolver,
    temp_dir: PathBuf,
    include_hidden: bool,
}

impl DownloadService {
    /// Create a download service writing archives to the system temp dir.
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            temp_dir: std::env::temp_dir(),
            include_hidden: false,
        }
    }

    /// Set the directory for temporary archives.
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    /// Set whether hidden files are put into directory archives.
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Prepare a single file for download.
    ///
    /// The content type is detected from the file's leading bytes. The file
    /// itself is opened only when the payload is opened.
    pub fn download(&self, path: &str) -> Result<DownloadablePayload, TransferError> {
        let real = self.resolver.resolve(path)?;

        let metadata = fs::metadata(&real).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                TransferError::NotFound(path.to_string())
            } else {
                TransferError::Io(e)
            }
        })?;

        if metadata.is_dir() {
            return Err(TransferError::IsADirectory(path.to_string()));
        }

        let content_type = sniff_content_type(&real)?;
        let filename = real
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!(path, content_type = %content_type, "Prepared file download");

        Ok(DownloadablePayload::new(content_type, filename, move || {
            let file = File::open(&real)?;
            Ok(PayloadStream::new(file))
        }))
    }

    /// Zip every file under `directory` and prepare the archive for download.
    ///
    /// Entries are named by their path relative to the real root. The
    /// archive is complete when this returns; a failure while building it
    /// removes the partial file. Symbolic links are not followed, so linked
    /// files and directories are left out.
    pub fn download_directory(
        &self,
        directory: &str,
    ) -> Result<DownloadablePayload, TransferError> {
        let real = self.resolver.resolve(directory)?;

        if !real.is_dir() {
            return Err(TransferError::NotADirectory(directory.to_string()));
        }

        let (temp_path, entries) =
            self.stage_archive(|file, archive| self.write_archive(&real, file, archive))?;

        info!(directory, entries, archive = ?temp_path, "Built directory archive");

        let filename = format!("{}.zip", archive_stem(directory, &real));
        Ok(DownloadablePayload::new(ZIP_CONTENT_TYPE, filename, move || {
            let file = File::open(&temp_path)?;
            Ok(PayloadStream::with_cleanup(file, move || remove_archive(temp_path)))
        }))
    }

    /// Create a temporary archive file and fill it with `write`.
    ///
    /// The file is deleted if `write` fails.
    fn stage_archive<F>(&self, write: F) -> Result<(TempPath, usize), TransferError>
    where
        F: FnOnce(&File, &Path) -> Result<usize, TransferError>,
    {
        let archive = tempfile::Builder::new()
            .prefix("roxyfs-")
            .suffix(".zip")
            .tempfile_in(&self.temp_dir)?;

        let entries = match write(archive.as_file(), archive.path()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(archive = ?archive.path(), error = %e, "Discarding partial archive");
                return Err(e);
            }
        };

        Ok((archive.into_temp_path(), entries))
    }

    fn write_archive(
        &self,
        source: &Path,
        file: &File,
        archive_path: &Path,
    ) -> Result<usize, TransferError> {
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        // The archive itself may live under `source`.
        let archive_real =
            fs::canonicalize(archive_path).unwrap_or_else(|_| archive_path.to_path_buf());
        let is_archive = |path: &Path| path == archive_path || path == archive_real;

        let include_hidden = self.include_hidden;
        let walker = WalkDir::new(source)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| e.depth() == 0 || include_hidden || !is_hidden(e.file_name()));

        let mut entries = 0;
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() || is_archive(entry.path()) {
                continue;
            }

            let name = self
                .resolver
                .relative_to_root(entry.path())
                .unwrap_or_else(|| relative_name(source, entry.path()));

            writer.start_file(name, options)?;
            let mut input = File::open(entry.path())?;
            io::copy(&mut input, &mut writer)?;
            entries += 1;
        }

        writer.finish()?;
        Ok(entries)
    }
}

/// Detect the MIME type of a file from its leading bytes.
pub fn sniff_content_type(path: &Path) -> io::Result<String> {
    let mut head = Vec::new();
    File::open(path)?.take(SNIFF_LEN).read_to_end(&mut head)?;
    Ok(content_type_of(&head))
}

/// MIME type for a buffer of leading file content.
///
/// Known binary signatures win; otherwise empty content, UTF-8 text and
/// arbitrary binary data are told apart.
pub fn content_type_of(head: &[u8]) -> String {
    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }

    if head.is_empty() {
        return "application/x-empty".to_string();
    }

    match std::str::from_utf8(head) {
        Ok(_) => "text/plain".to_string(),
        // A multi-byte character cut off by the sniff window.
        Err(e) if e.error_len().is_none() => "text/plain".to_string(),
        Err(_) => OCTET_STREAM.to_string(),
    }
}

fn remove_archive(temp_path: TempPath) {
    let path = temp_path.to_path_buf();
    match temp_path.close() {
        Ok(()) => debug!(archive = ?path, "Removed temporary archive"),
        Err(e) => warn!(archive = ?path, error = %e, "Failed to remove temporary archive"),
    }
}

/// Name of the archive for `directory`, without the `.zip` extension.
///
/// The root of a `/` virtual prefix has no virtual name, so the real
/// directory's name is used instead.
fn archive_stem(directory: &str, real: &Path) -> String {
    match base_name(directory) {
        "" => real
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string()),
        name => name.to_string(),
    }
}

/// Last segment of a virtual path.
fn base_name(virtual_path: &str) -> &str {
    virtual_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(virtual_path)
}

fn relative_name(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
