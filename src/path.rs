//! Logical path and name utilities
//!
//! The engine operates on logical, `/`-separated paths that are independent
//! of the host filesystem. A [`TreePath`] is an ordered sequence of name
//! segments; the first segment names one of the tree's top-level roots.
//!
//! Name comparison is governed by an explicit [`PathComparisonMode`] value
//! that is passed in at engine construction and threaded through every
//! lookup — there is no process-wide case-sensitivity toggle, so tests and
//! embedders can mix modes freely. The one exception is the difference
//! engine, which always compares names case-sensitively.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How entry names are compared during path resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathComparisonMode {
    /// Names match only when byte-for-byte equal
    CaseSensitive,
    /// Names match regardless of ASCII letter case
    CaseInsensitive,
}

impl PathComparisonMode {
    /// Check whether two entry names are equal under this mode
    pub fn names_equal(&self, a: &str, b: &str) -> bool {
        match self {
            PathComparisonMode::CaseSensitive => a == b,
            PathComparisonMode::CaseInsensitive => a.eq_ignore_ascii_case(b),
        }
    }
}

impl Default for PathComparisonMode {
    fn default() -> Self {
        PathComparisonMode::CaseSensitive
    }
}

/// A logical path inside the versioned tree
///
/// Stored in canonical form: segments joined with `/`, backslashes
/// normalized to `/`, no trailing separator. The empty path addresses the
/// synthetic root itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreePath(String);

impl TreePath {
    /// Create a path from a string, normalizing separators
    pub fn new(path: impl AsRef<str>) -> Self {
        let normalized = path.as_ref().replace('\\', "/");
        let trimmed = normalized.trim_matches('/');
        TreePath(trimmed.to_string())
    }

    /// The canonical string form of this path
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this path addresses the synthetic root
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the name segments, root-most first
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Number of name segments
    pub fn part_count(&self) -> usize {
        self.parts().count()
    }

    /// The last name segment, or `""` for the root path
    pub fn name(&self) -> &str {
        self.parts().last().unwrap_or("")
    }

    /// The path of the containing directory, or `None` for a
    /// single-segment path (whose parent is the synthetic root)
    pub fn parent(&self) -> Option<TreePath> {
        let idx = self.0.rfind('/')?;
        Some(TreePath(self.0[..idx].to_string()))
    }

    /// This path extended by one child name
    pub fn appended_with(&self, name: &str) -> TreePath {
        if self.0.is_empty() {
            TreePath::new(name)
        } else {
            TreePath(format!("{}/{}", self.0, name))
        }
    }

    /// This path with its last segment replaced by `new_name`
    pub fn renamed_with(&self, new_name: &str) -> TreePath {
        match self.parent() {
            Some(parent) => parent.appended_with(new_name),
            None => TreePath::new(new_name),
        }
    }

    /// Check whether `self` is `ancestor` or lies strictly below it
    ///
    /// The comparison is segment-boundary aware: `dir1x/file` does not
    /// start with `dir1` even though it shares the string prefix.
    pub fn starts_with(&self, ancestor: &TreePath, mode: PathComparisonMode) -> bool {
        let mut own = self.parts();
        for expected in ancestor.parts() {
            match own.next() {
                Some(part) if mode.names_equal(part, expected) => {}
                _ => return false,
            }
        }
        true
    }

    /// Check whether two paths address the same entry under `mode`
    pub fn matches(&self, other: &TreePath, mode: PathComparisonMode) -> bool {
        let mut own = self.parts();
        let mut theirs = other.parts();
        loop {
            match (own.next(), theirs.next()) {
                (None, None) => return true,
                (Some(a), Some(b)) if mode.names_equal(a, b) => {}
                _ => return false,
            }
        }
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TreePath {
    fn from(s: &str) -> Self {
        TreePath::new(s)
    }
}

impl From<String> for TreePath {
    fn from(s: String) -> Self {
        TreePath::new(s)
    }
}
