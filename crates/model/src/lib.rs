//! # Roxyfs Model Library
//!
//! Value types returned by the roxyfs file manager.
//!
//! ## Overview
//!
//! Everything a caller receives from the file manager, other than byte
//! streams, is one of the types in this crate:
//!
//! - **Directory nodes**: one entry per directory of the virtual tree, with shallow child counts
//! - **File entries**: listing rows with size, modification time and image dimensions
//! - **Operation results**: the uniform success/failure value of every mutation
//!
//! All types serialize to snake_case JSON so a web layer can hand them to a
//! file-picker UI unchanged.
//!
//! ## Example Usage
//!
//! ```rust
//! use model::{FailureKind, OperationResult};
//!
//! let result = OperationResult::failure(FailureKind::Io, "Unable to create directory");
//! assert!(!result.success);
//! assert_eq!(result.message, "Unable to create directory");
//! ```
//!
//! ## Modules
//!
//! - [`entries`]: Directory nodes and file entries
//! - [`result`]: Operation results and failure kinds

pub mod entries;
pub mod result;

pub use entries::{DirectoryNode, FileEntry};
pub use result::{FailureKind, OperationResult};
