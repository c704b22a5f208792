//! Directory and file mutations.
//!
//! Every operation resolves its virtual paths first, so a traversal attempt
//! fails with [`SecurityError`] before anything is touched. Name validation
//! runs next, and only then the filesystem call. Filesystem failures are
//! reported as a failed [`OperationResult`] with [`FailureKind::Io`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use model::{FailureKind, OperationResult};
use tracing::{info, warn};

use super::resolver::{is_valid_name, PathResolver, SecurityError};

/// Message for an invalid name passed to `create_directory`.
pub const INVALID_NAME_MESSAGE: &str =
    "Name not valid. Only a-z, A-Z, 0-9, -, . and _ are authorized";

/// Message for an invalid name passed to the rename operations.
pub const INVALID_NEW_NAME_MESSAGE: &str = "New name not valid";

/// Message returned by `copy_directory`.
pub const COPY_DIRECTORY_UNSUPPORTED: &str = "Directory copy is not yet implemented";

/// Create/delete/move/copy/rename for directories and files.
#[derive(Debug, Clone)]
pub struct MutationOperations {
    resolver: PathResolver,
}

impl MutationOperations {
    /// Create the mutation operations.
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Create directory `name` inside `path`.
    ///
    /// Missing parents are created; an existing directory is a success.
    pub fn create_directory(
        &self,
        path: &str,
        name: &str,
    ) -> Result<OperationResult, SecurityError> {
        let real = self.resolver.resolve(path)?;
        if !is_valid_name(name) {
            return Ok(invalid_name(INVALID_NAME_MESSAGE, name));
        }

        let target = real.join(name);
        Ok(complete(
            "create directory",
            &target,
            fs::create_dir_all(&target),
            "Unable to create directory",
        ))
    }

    /// Delete a directory and everything in it.
    ///
    /// A directory that is already gone counts as deleted.
    pub fn delete_directory(&self, path: &str) -> Result<OperationResult, SecurityError> {
        let real = self.resolver.resolve(path)?;
        Ok(complete(
            "delete directory",
            &real,
            remove_path(&real),
            "Unable to delete directory",
        ))
    }

    /// Move directory `origin` into `destination`, keeping its base name.
    ///
    /// There is no collision check; the outcome follows the platform's
    /// rename semantics.
    pub fn move_directory(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<OperationResult, SecurityError> {
        let real_origin = self.resolver.resolve(origin)?;
        let real_destination = self.resolver.resolve(destination)?;

        let outcome = into_directory(&real_origin, &real_destination)
            .and_then(|target| fs::rename(&real_origin, target));
        Ok(complete(
            "move directory",
            &real_origin,
            outcome,
            "Unable to move directory",
        ))
    }

    /// Recursive directory copy is not supported and always fails.
    pub fn copy_directory(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<OperationResult, SecurityError> {
        self.resolver.resolve(origin)?;
        self.resolver.resolve(destination)?;

        Ok(OperationResult::failure(
            FailureKind::Unsupported,
            COPY_DIRECTORY_UNSUPPORTED,
        ))
    }

    /// Rename directory `origin` to `new_name` within its parent.
    pub fn rename_directory(
        &self,
        origin: &str,
        new_name: &str,
    ) -> Result<OperationResult, SecurityError> {
        let real = self.resolver.resolve(origin)?;
        if !is_valid_name(new_name) {
            return Ok(invalid_name(INVALID_NEW_NAME_MESSAGE, new_name));
        }

        Ok(complete(
            "rename directory",
            &real,
            rename_in_place(&real, new_name),
            "Unable to rename directory",
        ))
    }

    /// Delete a file. A file that is already gone counts as deleted.
    pub fn delete_file(&self, path: &str) -> Result<OperationResult, SecurityError> {
        let real = self.resolver.resolve(path)?;
        Ok(complete(
            "delete file",
            &real,
            remove_path(&real),
            "Unable to delete file",
        ))
    }

    /// Move a file. `destination` is the full target path.
    pub fn move_file(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<OperationResult, SecurityError> {
        let real_origin = self.resolver.resolve(origin)?;
        let real_destination = self.resolver.resolve(destination)?;

        Ok(complete(
            "move file",
            &real_origin,
            fs::rename(&real_origin, &real_destination),
            "Unable to move file",
        ))
    }

    /// Copy a file into `destination_directory`, keeping its base name.
    pub fn copy_file(
        &self,
        origin: &str,
        destination_directory: &str,
    ) -> Result<OperationResult, SecurityError> {
        let real_origin = self.resolver.resolve(origin)?;
        let real_destination = self.resolver.resolve(destination_directory)?;

        let outcome = into_directory(&real_origin, &real_destination)
            .and_then(|target| fs::copy(&real_origin, target))
            .map(|_| ());
        Ok(complete("copy file", &real_origin, outcome, "Unable to copy file"))
    }

    /// Rename a file to `new_name` within its directory.
    pub fn rename_file(
        &self,
        path: &str,
        new_name: &str,
    ) -> Result<OperationResult, SecurityError> {
        let real = self.resolver.resolve(path)?;
        if !is_valid_name(new_name) {
            return Ok(invalid_name(INVALID_NEW_NAME_MESSAGE, new_name));
        }

        Ok(complete(
            "rename file",
            &real,
            rename_in_place(&real, new_name),
            "Unable to rename file",
        ))
    }
}

fn invalid_name(message: &str, name: &str) -> OperationResult {
    info!(name, "Rejected invalid name");
    OperationResult::failure(FailureKind::InvalidName, message)
}

/// Turn the outcome of a filesystem call into an operation result.
fn complete(action: &str, path: &Path, outcome: io::Result<()>, failure: &str) -> OperationResult {
    match outcome {
        Ok(()) => {
            info!(action, path = ?path, "Filesystem operation completed");
            OperationResult::ok()
        }
        Err(e) => {
            warn!(action, path = ?path, error = %e, "Filesystem operation failed");
            OperationResult::failure(FailureKind::Io, failure)
        }
    }
}

/// Remove a file or a whole directory tree; a missing path is not an error.
fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Target path for placing `origin` inside `directory` under its own name.
fn into_directory(origin: &Path, directory: &Path) -> io::Result<PathBuf> {
    let name = origin.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no base name")
    })?;
    Ok(directory.join(name))
}

fn rename_in_place(path: &Path, new_name: &str) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory")
    })?;
    fs::rename(path, parent.join(new_name))
}
