//! Path normalization and root prefixing.
//!
//! Callers hand in paths relative to a backend root (`a/b.txt`, `/a/b.txt/` and
//! `a//./b.txt` all mean the same file). Backends only ever send absolute,
//! root-qualified paths outward and strip the root from anything coming back.

use crate::error::{Result, StorageError};

/// Normalize a caller path into `seg/seg/seg` form.
///
/// Backslashes count as separators, empty and `.` segments are dropped and `..`
/// pops the previous segment. Climbing above the root is rejected.
pub fn normalize_path(path: &str) -> Result<String> {
    if path.chars().any(char::is_control) {
        return Err(StorageError::InvalidPath(path.to_string()));
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                if parts.pop().is_none() {
                    return Err(StorageError::PathTraversal(path.to_string()));
                }
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Last segment of a slash-separated path
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Maps root-relative paths to root-qualified ones and back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixer {
    /// Always ends with a single `/`
    prefix: String,
}

impl PathPrefixer {
    /// The root is always anchored at `/`, whether or not it is given with a leading slash
    pub fn new(root: &str) -> Self {
        let segments: Vec<&str> = root
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();
        let prefix = if segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", segments.join("/"))
        };
        Self { prefix }
    }

    /// The root itself, without a trailing slash (except for `/`)
    pub fn root(&self) -> &str {
        if self.prefix == "/" {
            &self.prefix
        } else {
            &self.prefix[..self.prefix.len() - 1]
        }
    }

    /// Normalize `path` and qualify it with the root
    pub fn prefix_path(&self, path: &str) -> Result<String> {
        let relative = normalize_path(path)?;
        if relative.is_empty() {
            return Ok(self.root().to_string());
        }
        Ok(format!("{}{}", self.prefix, relative))
    }

    /// Whether a root-qualified path lies at or below the root
    pub fn contains(&self, path: &str) -> bool {
        path.starts_with(self.prefix.as_str()) || path.trim_end_matches('/') == self.root()
    }

    /// Turn a root-qualified path back into a root-relative one.
    /// Paths outside the root only lose their outer slashes; check `contains` first.
    pub fn strip_prefix(&self, path: &str) -> String {
        if let Some(rest) = path.strip_prefix(self.prefix.as_str()) {
            return rest.trim_end_matches('/').to_string();
        }
        if path == self.root() {
            return String::new();
        }
        path.trim_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_separators() {
        assert_eq!(normalize_path("/a//b/./c.txt/").unwrap(), "a/b/c.txt");
        assert_eq!(normalize_path("a\\b\\c").unwrap(), "a/b/c");
        assert_eq!(normalize_path("a/b/../c").unwrap(), "a/c");
        assert_eq!(normalize_path("/").unwrap(), "");
    }

    #[test]
    fn test_normalize_rejects_traversal() {
        assert!(matches!(
            normalize_path("../etc/passwd"),
            Err(StorageError::PathTraversal(_))
        ));
        assert!(matches!(
            normalize_path("a/../../b"),
            Err(StorageError::PathTraversal(_))
        ));
    }

    #[test]
    fn test_normalize_rejects_control_characters() {
        assert!(matches!(
            normalize_path("a/b\0.txt"),
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_prefix_and_strip_roundtrip() {
        let prefixer = PathPrefixer::new("/elabftw/uploads/");
        for path in ["a/b.txt", "a", "x/y/z/file.bin"] {
            let absolute = prefixer.prefix_path(path).unwrap();
            assert!(absolute.starts_with("/elabftw/uploads/"));
            assert_eq!(prefixer.strip_prefix(&absolute), path);
        }
    }

    #[test]
    fn test_prefix_root_itself() {
        let prefixer = PathPrefixer::new("/elabftw/uploads");
        assert_eq!(prefixer.prefix_path("").unwrap(), "/elabftw/uploads");
        assert_eq!(prefixer.prefix_path("/").unwrap(), "/elabftw/uploads");
        assert_eq!(prefixer.strip_prefix("/elabftw/uploads"), "");
    }

    #[test]
    fn test_slash_root() {
        let prefixer = PathPrefixer::new("/");
        assert_eq!(prefixer.root(), "/");
        assert_eq!(prefixer.prefix_path("/a/b.txt").unwrap(), "/a/b.txt");
        assert_eq!(prefixer.strip_prefix("/a/b.txt"), "a/b.txt");
        assert_eq!(PathPrefixer::new(""), prefixer);
    }

    #[test]
    fn test_root_without_leading_slash_is_anchored() {
        let prefixer = PathPrefixer::new("elabftw/uploads");
        assert_eq!(prefixer.root(), "/elabftw/uploads");
        assert_eq!(
            prefixer.prefix_path("a/b.txt").unwrap(),
            "/elabftw/uploads/a/b.txt"
        );
        assert_eq!(prefixer, PathPrefixer::new("/elabftw//uploads/"));
        assert_eq!(PathPrefixer::new("./").root(), "/");
    }

    #[test]
    fn test_contains_checks_whole_segments() {
        let prefixer = PathPrefixer::new("/data");
        assert!(prefixer.contains("/data/x"));
        assert!(prefixer.contains("/data"));
        assert!(prefixer.contains("/data/"));
        assert!(!prefixer.contains("/database/x"));
        assert!(!prefixer.contains("/other/file"));
        assert!(PathPrefixer::new("/").contains("/anything"));
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/root/a/b.txt"), "b.txt");
        assert_eq!(basename("b.txt"), "b.txt");
        assert_eq!(basename("/root/dir/"), "dir");
    }
}
