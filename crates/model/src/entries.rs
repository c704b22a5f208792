//! Directory tree nodes and file listing entries.

use serde::{Deserialize, Serialize};

/// One directory of the virtual tree.
///
/// Counts are shallow: only the direct children of this directory are
/// counted, never the contents of nested subdirectories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    /// Virtual path of the directory, starting with the virtual root prefix.
    pub path: String,
    /// Number of files directly inside the directory.
    pub file_count: usize,
    /// Number of subdirectories directly inside the directory.
    pub directory_count: usize,
}

impl DirectoryNode {
    /// Create a new directory node.
    pub fn new(path: impl Into<String>, file_count: usize, directory_count: usize) -> Self {
        Self {
            path: path.into(),
            file_count,
            directory_count,
        }
    }
}

/// A single file in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Virtual URL of the file.
    pub url: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modified timestamp (Unix epoch seconds).
    pub modified: u64,
    /// Image width in pixels (0 for non-images).
    pub width: u32,
    /// Image height in pixels (0 for non-images).
    pub height: u32,
}

impl FileEntry {
    /// Whether the listing probed image dimensions for this entry.
    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Final path segment of the virtual URL.
    pub fn name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }
}
