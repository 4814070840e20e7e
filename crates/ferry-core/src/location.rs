//! URI-style addressing for filesystem entries.
//!
//! A [`Location`] pairs a [`Scheme`] with an absolute, lexically normalized
//! path. Normalizing on construction means two locations naming the same
//! entry compare equal structurally, which the self-recursion guard relies on.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::FsError;

/// The addressing scheme of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Scheme {
    /// A regular local file.
    #[default]
    File,
    /// An entry inside the trash.
    Trash,
    /// A staging area for disc burning; moves into it become copies.
    Burn,
}

impl Scheme {
    /// The scheme name as it appears in a URI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Trash => "trash",
            Self::Burn => "burn",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "file" => Some(Self::File),
            "trash" => Some(Self::Trash),
            "burn" => Some(Self::Burn),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An absolute location addressed by scheme and path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    scheme: Scheme,
    path: PathBuf,
}

impl Location {
    /// Create a location, resolving the path to absolute form.
    ///
    /// Relative `file` paths are resolved against the current directory;
    /// relative paths of other schemes are rooted at `/`.
    pub fn new(scheme: Scheme, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = if path.has_root() {
            path.to_path_buf()
        } else if scheme == Scheme::File {
            std::path::absolute(path).unwrap_or_else(|_| Path::new("/").join(path))
        } else {
            Path::new("/").join(path)
        };

        Self {
            scheme,
            path: normalize(&absolute),
        }
    }

    /// Create a local file location.
    pub fn local(path: impl AsRef<Path>) -> Self {
        Self::new(Scheme::File, path)
    }

    /// The root of the trash.
    pub fn trash_root() -> Self {
        Self::new(Scheme::Trash, "/")
    }

    /// Parse a URI (`file:///a`, `trash:///x`, `burn:///`) or a plain path.
    pub fn parse(uri: &str) -> Result<Self, FsError> {
        if let Some((scheme, rest)) = uri.split_once("://") {
            let scheme = Scheme::from_name(scheme).ok_or_else(|| FsError::InvalidUri {
                uri: uri.to_string(),
            })?;
            let path = if rest.is_empty() { "/" } else { rest };
            if !path.starts_with('/') {
                return Err(FsError::InvalidUri {
                    uri: uri.to_string(),
                });
            }
            return Ok(Self::new(scheme, path));
        }

        if let Some((name, rest)) = uri.split_once(':') {
            match Scheme::from_name(name) {
                Some(scheme) if scheme != Scheme::File => {
                    return Ok(Self::new(scheme, if rest.is_empty() { "/" } else { rest }));
                }
                _ => {}
            }
        }

        Ok(Self::local(uri))
    }

    /// The scheme of this location.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The absolute path within the scheme.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render as a URI string.
    pub fn uri(&self) -> String {
        format!("{}://{}", self.scheme, self.path.display())
    }

    /// Whether this is a plain local file.
    pub fn is_native(&self) -> bool {
        self.scheme == Scheme::File
    }

    /// Whether this location is inside (or is) the trash.
    pub fn is_trash(&self) -> bool {
        self.scheme == Scheme::Trash
    }

    /// Whether this location is a burn staging target.
    pub fn is_burn(&self) -> bool {
        self.scheme == Scheme::Burn
    }

    /// Whether this is the root of its scheme.
    pub fn is_root(&self) -> bool {
        self.path.parent().is_none()
    }

    /// The parent location, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        self.path.parent().map(|parent| Self {
            scheme: self.scheme,
            path: parent.to_path_buf(),
        })
    }

    /// A child of this location.
    pub fn child(&self, name: impl AsRef<Path>) -> Self {
        Self::new(self.scheme, self.path.join(name))
    }

    /// The final path component, if it is valid UTF-8.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// The final path component for display (lossy).
    pub fn display_name(&self) -> String {
        match self.path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => "/".to_string(),
        }
    }

    /// The path of `self` relative to `base`, when `base` is an ancestor
    /// (or equal) in the same scheme.
    pub fn relative_to(&self, base: &Location) -> Option<PathBuf> {
        if self.scheme != base.scheme {
            return None;
        }
        self.path
            .strip_prefix(&base.path)
            .ok()
            .map(Path::to_path_buf)
    }

    /// Resolve a relative path against this location.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Self {
        Self::new(self.scheme, self.path.join(relative))
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Location) -> bool {
        self.scheme == other.scheme && self.path != other.path && other.path.starts_with(&self.path)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scheme == Scheme::File {
            write!(f, "{}", self.path.display())
        } else {
            f.write_str(&self.uri())
        }
    }
}

impl From<&Path> for Location {
    fn from(path: &Path) -> Self {
        Self::local(path)
    }
}

impl From<PathBuf> for Location {
    fn from(path: PathBuf) -> Self {
        Self::local(path)
    }
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schemes() {
        let loc = Location::parse("file:///tmp/a.txt").unwrap();
        assert!(loc.is_native());
        assert_eq!(loc.path(), Path::new("/tmp/a.txt"));

        let trash = Location::parse("trash:///").unwrap();
        assert!(trash.is_trash());
        assert!(trash.is_root());

        let burn = Location::parse("burn:").unwrap();
        assert!(burn.is_burn());

        assert!(Location::parse("smb://host/share").is_err());
    }

    #[test]
    fn test_normalization() {
        let loc = Location::local("/a/./b/../c");
        assert_eq!(loc.path(), Path::new("/a/c"));
        assert_eq!(Location::local("/.."), Location::local("/"));
    }

    #[test]
    fn test_uri_round_trip() {
        let loc = Location::local("/dst/a (1).txt");
        assert_eq!(loc.uri(), "file:///dst/a (1).txt");
        assert_eq!(Location::parse(&loc.uri()).unwrap(), loc);
    }

    #[test]
    fn test_relative_and_ancestry() {
        let base = Location::local("/src");
        let child = Location::local("/src/dir/file");
        assert_eq!(child.relative_to(&base), Some(PathBuf::from("dir/file")));
        assert!(base.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&base));
        assert!(!base.is_ancestor_of(&base));
        assert!(!Location::local("/sr").is_ancestor_of(&child));
        assert_eq!(base.resolve("dir/file"), child);
    }
}
