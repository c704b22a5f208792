//! Read-only browsing of the virtual tree.
//!
//! This module provides the two listing views of the file manager:
//! - [`DirectoryTreeEnumerator`]: every directory under the root with shallow child counts
//! - [`FileListingService`]: the files of a single directory with size, mtime and image dimensions
//!
//! Both re-derive virtual paths from the real paths they visit.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use image::ImageReader;
use model::{DirectoryNode, FileEntry};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::resolver::{PathResolver, SecurityError};

/// Type filter value selecting image files only.
pub const IMAGE_FILTER: &str = "image";

/// Extensions treated as images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// Errors that can occur while enumerating the directory tree.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The path was rejected by the resolver.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// The real root is not a directory.
    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Enumerates every directory of the virtual tree.
#[derive(Debug, Clone)]
pub struct DirectoryTreeEnumerator {
    resolver: PathResolver,
    include_hidden: bool,
}

impl DirectoryTreeEnumerator {
    /// Create an enumerator over the resolver's root.
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            include_hidden: false,
        }
    }

    /// Set whether entries starting with '.' are listed and counted.
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// List the root and every directory below it.
    ///
    /// The root comes first; descendants follow in walk order. Each node
    /// counts only its direct children.
    pub fn list_tree(&self) -> Result<Vec<DirectoryNode>, BrowserError> {
        let root = self.resolver.root().real_root();
        if !fs::metadata(root)?.is_dir() {
            return Err(BrowserError::NotADirectory(root.to_path_buf()));
        }

        let (file_count, directory_count) = count_children(root, self.include_hidden)?;
        let mut nodes = vec![DirectoryNode::new(
            self.resolver.root().root_path(),
            file_count,
            directory_count,
        )];

        let include_hidden = self.include_hidden;
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| e.depth() == 0 || include_hidden || !is_hidden(e.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry during tree walk");
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let (file_count, directory_count) = match count_children(entry.path(), include_hidden) {
                Ok(counts) => counts,
                Err(e) => {
                    debug!(path = ?entry.path(), error = %e, "Skipping unreadable directory");
                    continue;
                }
            };

            if let Some(path) = self.resolver.to_virtual(entry.path()) {
                nodes.push(DirectoryNode::new(path, file_count, directory_count));
            }
        }

        debug!(directories = nodes.len(), "Enumerated directory tree");
        Ok(nodes)
    }
}

/// Lists the files of one directory.
#[derive(Debug, Clone)]
pub struct FileListingService {
    resolver: PathResolver,
    include_hidden: bool,
}

impl FileListingService {
    /// Create a listing service.
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            include_hidden: false,
        }
    }

    /// Set whether files starting with '.' are listed.
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// List the regular files directly inside `directory`.
    ///
    /// A directory that does not exist yields an empty listing. With the
    /// `image` filter only png/jpg/jpeg/gif files are returned. Image files
    /// get their dimensions from a header probe; everything else is 0x0.
    pub fn list_files(
        &self,
        directory: &str,
        type_filter: Option<&str>,
    ) -> Result<Vec<FileEntry>, SecurityError> {
        let real = self.resolver.resolve(directory)?;

        if !real.is_dir() {
            debug!(directory, "Listing a path that is not a directory");
            return Ok(Vec::new());
        }

        let entries = match fs::read_dir(&real) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = ?real, error = %e, "Failed to read directory");
                return Ok(Vec::new());
            }
        };

        let images_only = type_filter == Some(IMAGE_FILTER);
        let mut files = Vec::new();

        for entry in entries.flatten() {
            if !self.include_hidden && is_hidden(&entry.file_name()) {
                continue;
            }

            let path = entry.path();
            let metadata = match fs::symlink_metadata(&path) {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };

            let is_image = has_image_extension(&path);
            if images_only && !is_image {
                continue;
            }

            let Some(url) = self.resolver.to_virtual(&path) else {
                continue;
            };

            let (width, height) = if images_only || is_image {
                probe_dimensions(&path)
            } else {
                (0, 0)
            };

            files.push(FileEntry {
                url,
                size: metadata.len(),
                modified: unix_seconds(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
                width,
                height,
            });
        }

        files.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(files)
    }
}

/// Count the files and subdirectories directly inside `dir`.
///
/// Symbolic links are neither; they are not followed anywhere in the tree.
fn count_children(dir: &Path, include_hidden: bool) -> std::io::Result<(usize, usize)> {
    let mut files = 0;
    let mut directories = 0;

    for entry in fs::read_dir(dir)?.flatten() {
        if !include_hidden && is_hidden(&entry.file_name()) {
            continue;
        }
        match entry.file_type() {
            Ok(t) if t.is_dir() => directories += 1,
            Ok(t) if t.is_file() => files += 1,
            _ => {}
        }
    }

    Ok((files, directories))
}

pub(crate) fn is_hidden(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Whether the path has one of the image extensions, ignoring case.
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Read image dimensions from the file header without decoding pixels.
///
/// Unreadable or unrecognized files report 0x0.
pub fn probe_dimensions(path: &Path) -> (u32, u32) {
    let reader = match ImageReader::open(path).and_then(|r| r.with_guessed_format()) {
        Ok(reader) => reader,
        Err(e) => {
            debug!(path = ?path, error = %e, "Failed to open image for probing");
            return (0, 0);
        }
    };

    reader.into_dimensions().unwrap_or_else(|e| {
        debug!(path = ?path, error = %e, "Failed to probe image dimensions");
        (0, 0)
    })
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
