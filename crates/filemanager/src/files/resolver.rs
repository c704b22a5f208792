//! Virtual-to-real path resolution.
//!
//! Callers only ever see virtual paths, which start with the virtual root
//! prefix (for example `/files/photos`). This module maps them onto the real
//! directory tree and back, and rejects traversal attempts before any other
//! component touches the filesystem.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

/// Substring that marks a traversal attempt anywhere in a virtual path.
pub const TRAVERSAL_PATTERN: &str = "../";

/// Errors raised when a virtual path is not allowed.
///
/// These are never converted into an `OperationResult`: a caller sending
/// them is misbehaving, so every operation stops with this error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// The path contains the `../` pattern.
    #[error("path cannot contain \"../\" pattern: {0}")]
    PathTraversal(String),

    /// The resolved path leaves the real root (strict mode only).
    #[error("path is outside the virtual root: {0}")]
    OutsideRoot(String),
}

/// The fixed pair of real root directory and virtual prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualRoot {
    real_root: PathBuf,
    real_root_str: String,
    prefix: String,
}

impl VirtualRoot {
    /// Create a virtual root mapping `prefix` onto `real_root`.
    ///
    /// Trailing slashes are trimmed from both sides, so `/files/` and
    /// `/files` are the same prefix. A bare `/` prefix maps the real root
    /// onto the top of the virtual namespace.
    pub fn new(real_root: impl Into<PathBuf>, prefix: impl AsRef<str>) -> Self {
        let real_root = real_root.into();
        let lossy = real_root.to_string_lossy();
        let real_root_str = match lossy.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };

        Self {
            real_root_str,
            real_root,
            prefix: prefix.as_ref().trim_end_matches('/').to_string(),
        }
    }

    /// Create a virtual root whose prefix is `/` plus the base name of the
    /// real root, e.g. `/srv/uploads` is served as `/uploads`.
    pub fn from_real_root(real_root: impl Into<PathBuf>) -> Self {
        let real_root = real_root.into();
        let prefix = real_root
            .file_name()
            .map(|n| format!("/{}", n.to_string_lossy()))
            .unwrap_or_default();
        Self::new(real_root, prefix)
    }

    /// The real directory backing the virtual tree.
    pub fn real_root(&self) -> &Path {
        &self.real_root
    }

    /// The virtual prefix, without trailing slash (empty for a `/` prefix).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The virtual path of the root directory itself.
    pub fn root_path(&self) -> &str {
        if self.prefix.is_empty() {
            "/"
        } else {
            &self.prefix
        }
    }
}

/// Maps virtual paths to real paths and back.
///
/// Cloning is cheap; every component of the file manager holds its own
/// resolver sharing one immutable [`VirtualRoot`].
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: Arc<VirtualRoot>,
    strict: bool,
}

impl PathResolver {
    /// Create a resolver using literal prefix substitution.
    pub fn new(root: Arc<VirtualRoot>) -> Self {
        Self {
            root,
            strict: false,
        }
    }

    /// Enable strict containment checking.
    ///
    /// In strict mode the substituted path is normalized and must still lie
    /// under the real root.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// The shared virtual root.
    pub fn root(&self) -> &VirtualRoot {
        &self.root
    }

    /// Resolve a virtual path to a real path.
    ///
    /// Any occurrence of `../` is rejected. Otherwise the leading virtual
    /// prefix is replaced by the real root; a path that does not start with
    /// the prefix is returned unchanged unless strict mode is enabled.
    pub fn resolve(&self, virtual_path: &str) -> Result<PathBuf, SecurityError> {
        if virtual_path.contains(TRAVERSAL_PATTERN) {
            warn!(path = virtual_path, "Rejected path traversal attempt");
            return Err(SecurityError::PathTraversal(virtual_path.to_string()));
        }

        let real = match virtual_path.strip_prefix(self.root.prefix.as_str()) {
            Some(rest) => PathBuf::from(format!("{}{}", self.root.real_root_str, rest)),
            None => PathBuf::from(virtual_path),
        };

        if self.strict && !normalize(&real).starts_with(normalize(&self.root.real_root)) {
            warn!(path = virtual_path, "Rejected path outside the virtual root");
            return Err(SecurityError::OutsideRoot(virtual_path.to_string()));
        }

        debug!(path = virtual_path, real = %real.display(), "Resolved virtual path");
        Ok(real)
    }

    /// Map a real path under the root back to its virtual path.
    ///
    /// Returns `None` for paths outside the real root.
    pub fn to_virtual(&self, real_path: &Path) -> Option<String> {
        let relative = real_path.strip_prefix(&self.root.real_root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if segments.is_empty() {
            Some(self.root.root_path().to_string())
        } else {
            Some(format!("{}/{}", self.root.prefix, segments.join("/")))
        }
    }

    /// Path of `real_path` relative to the real root, with `/` separators.
    pub fn relative_to_root(&self, real_path: &Path) -> Option<String> {
        let relative = real_path.strip_prefix(&self.root.real_root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Some(segments.join("/"))
    }

    /// Check a bare directory or file name.
    pub fn validate_name(name: &str) -> bool {
        is_valid_name(name)
    }
}

/// Whether `name` is an acceptable bare directory or file name.
///
/// Only ASCII letters, digits, `.`, `-` and `_` are allowed, which rules out
/// path separators. The names `.` and `..` are rejected as well.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name.chars().all(is_name_char)
}

/// Characters allowed in directory and file names.
pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
}

/// Lexically normalize a path without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::new(Arc::new(VirtualRoot::new("/srv/uploads", "/files")))
    }

    #[test]
    fn test_resolve_prefix() {
        let resolver = resolver();
        assert_eq!(
            resolver.resolve("/files/photos/cat.png").unwrap(),
            PathBuf::from("/srv/uploads/photos/cat.png")
        );
        assert_eq!(resolver.resolve("/files").unwrap(), PathBuf::from("/srv/uploads"));
    }

    #[test]
    fn test_resolve_rejects_traversal_anywhere() {
        let resolver = resolver();
        for path in ["/files/../etc", "../files", "/files/a/../../b", "x../y"] {
            assert!(matches!(
                resolver.resolve(path),
                Err(SecurityError::PathTraversal(_))
            ));
        }
    }

    #[test]
    fn test_resolve_allows_double_dot_without_slash() {
        // Only the "../" substring is rejected.
        let resolver = resolver();
        assert_eq!(
            resolver.resolve("/files/..").unwrap(),
            PathBuf::from("/srv/uploads/..")
        );
    }

    #[test]
    fn test_resolve_passes_through_foreign_paths() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("/etc/passwd").unwrap(), PathBuf::from("/etc/passwd"));
    }

    #[test]
    fn test_strict_rejects_foreign_paths() {
        let resolver = resolver().strict(true);
        assert!(matches!(
            resolver.resolve("/etc/passwd"),
            Err(SecurityError::OutsideRoot(_))
        ));
        assert!(matches!(
            resolver.resolve("/files/.."),
            Err(SecurityError::OutsideRoot(_))
        ));
        assert!(resolver.resolve("/files/photos").is_ok());
    }

    #[test]
    fn test_default_prefix_from_basename() {
        let root = VirtualRoot::from_real_root("/srv/uploads");
        assert_eq!(root.prefix(), "/uploads");
        assert_eq!(root.root_path(), "/uploads");
    }

    #[test]
    fn test_trailing_slashes_trimmed() {
        let resolver = PathResolver::new(Arc::new(VirtualRoot::new("/srv/uploads/", "/files/")));
        assert_eq!(
            resolver.resolve("/files/a.txt").unwrap(),
            PathBuf::from("/srv/uploads/a.txt")
        );
    }

    #[test]
    fn test_bare_slash_prefix() {
        let resolver = PathResolver::new(Arc::new(VirtualRoot::new("/srv/uploads", "/")));
        assert_eq!(resolver.root().root_path(), "/");
        assert_eq!(
            resolver.resolve("/a/b.txt").unwrap(),
            PathBuf::from("/srv/uploads/a/b.txt")
        );
        assert_eq!(
            resolver.to_virtual(Path::new("/srv/uploads/a")).unwrap(),
            "/a"
        );
    }

    #[test]
    fn test_to_virtual() {
        let resolver = resolver();
        assert_eq!(resolver.to_virtual(Path::new("/srv/uploads")).unwrap(), "/files");
        assert_eq!(
            resolver.to_virtual(Path::new("/srv/uploads/a/b/")).unwrap(),
            "/files/a/b"
        );
        assert!(resolver.to_virtual(Path::new("/elsewhere")).is_none());
    }

    #[test]
    fn test_relative_to_root() {
        let resolver = resolver();
        assert_eq!(
            resolver.relative_to_root(Path::new("/srv/uploads/sub/b.txt")).unwrap(),
            "sub/b.txt"
        );
        assert_eq!(resolver.relative_to_root(Path::new("/srv/uploads")).unwrap(), "");
    }

    #[test]
    fn test_valid_names() {
        for name in ["photos", "my-file_2.txt", ".hidden", "A.B.C"] {
            assert!(is_valid_name(name), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", ".", "..", "a/b", "a\\b", "with space", "caf\u{e9}", "x?", "../x"] {
            assert!(!PathResolver::validate_name(name), "{name} should be invalid");
        }
    }
}
