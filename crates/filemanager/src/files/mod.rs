//! File manager components.
//!
//! This module provides the building blocks of the virtual-path file manager:
//! - Virtual-to-real path resolution with traversal protection
//! - Directory tree enumeration and file listing with image dimensions
//! - Directory and file mutations returning uniform operation results
//! - Upload validation with filename sanitization
//! - Streaming file downloads, zipped directory downloads and thumbnails
//!
//! # Security
//!
//! Every component resolves virtual paths through [`PathResolver`] before
//! touching the filesystem. Paths containing `../` are rejected outright.

pub mod browser;
pub mod mutation;
pub mod resolver;
pub mod thumbnail;
pub mod transfer;
pub mod upload;

pub use browser::{BrowserError, DirectoryTreeEnumerator, FileListingService, IMAGE_FILTER};
pub use mutation::MutationOperations;
pub use resolver::{is_valid_name, PathResolver, SecurityError, VirtualRoot};
pub use thumbnail::{fit_within, ThumbnailRenderer};
pub use transfer::{DownloadService, DownloadablePayload, PayloadStream, TransferError};
pub use upload::{sanitize_filename, IncomingFile, StagedFile, UploadHandler};
