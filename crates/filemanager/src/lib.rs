//! # Roxyfs File Manager Library
//!
//! This crate exposes a real directory tree under a virtual path prefix and
//! offers the operations a web file manager needs on top of it.
//!
//! ## Overview
//!
//! Callers only ever see virtual paths such as `/files/photos/cat.png`.
//! The library provides:
//!
//! - **Browsing**: The full directory tree with shallow counts, and flat file
//!   listings with sizes, modification times and image dimensions
//! - **Mutations**: Create, delete, move, rename and copy for directories and
//!   files, reported as [`model::OperationResult`] values
//! - **Uploads**: Validation and filename sanitization of received files
//! - **Downloads**: Lazily opened streams for single files, zipped
//!   directories and resized thumbnails
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 LocalFileSystem (FileManager)            │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌────────────┐  ┌────────────┐  ┌─────────────────────┐ │
//! │  │  Browser   │  │  Mutation  │  │  Upload / Download  │ │
//! │  │            │  │ Operations │  │   / Thumbnails      │ │
//! │  └────────────┘  └────────────┘  └─────────────────────┘ │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │     PathResolver over a shared VirtualRoot         │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use filemanager::{FileManager, FilesystemSettings, LocalFileSystem};
//!
//! fn main() -> anyhow::Result<()> {
//!     let manager = LocalFileSystem::new(
//!         FilesystemSettings::new("/srv/uploads").virtual_root("/files"),
//!     )?;
//!
//!     for node in manager.list_tree()? {
//!         println!("{} ({} files)", node.path, node.file_count);
//!     }
//!
//!     let result = manager.create_directory("/files", "holidays")?;
//!     assert!(result.success);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Path resolution and the individual file manager components
//! - [`filesystem`]: The [`FileManager`] trait and its local implementation

pub mod config;
pub mod files;
pub mod filesystem;

// Re-export the shared data model for convenience
pub use model;
pub use model::{DirectoryNode, FailureKind, FileEntry, OperationResult};

pub use config::{Config, ConfigError};

pub use files::{
    BrowserError, DownloadablePayload, IncomingFile, PayloadStream, SecurityError, StagedFile,
    TransferError, VirtualRoot, IMAGE_FILTER,
};

pub use filesystem::{FileManager, FilesystemSettings, LocalFileSystem};
