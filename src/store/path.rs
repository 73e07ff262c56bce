use std::borrow::Borrow;
use std::fmt;

use crate::Result;
use crate::StoreError;

pub const ROOT_PATH: &str = "/";

/// Validated slash-delimited node path, e.g. `/config/serviceA`.
///
/// Rules: absolute, no trailing slash (except the root itself), no empty,
/// `.` or `..` segments, no NUL characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(String);

impl NodePath {
    pub fn root() -> Self {
        NodePath(ROOT_PATH.to_string())
    }

    pub fn parse(path: &str) -> Result<Self> {
        Self::validate(path)?;
        Ok(NodePath(path.to_string()))
    }

    pub fn validate(path: &str) -> Result<()> {
        let invalid = |reason| {
            Err(StoreError::InvalidPath {
                path: path.to_string(),
                reason,
            }
            .into())
        };

        if path.is_empty() {
            return invalid("path is empty");
        }
        if !path.starts_with('/') {
            return invalid("path must start with '/'");
        }
        if path == ROOT_PATH {
            return Ok(());
        }
        if path.ends_with('/') {
            return invalid("path must not end with '/'");
        }
        if path.contains('\0') {
            return invalid("path contains a NUL character");
        }
        for segment in path[1..].split('/') {
            match segment {
                "" => return invalid("path contains an empty segment"),
                "." | ".." => return invalid("relative segments are not allowed"),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_PATH
    }

    /// Parent path; `None` for the root.
    pub fn parent(&self) -> Option<NodePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(NodePath(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Last segment of the path; empty for the root.
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Every non-root prefix of this path in root-to-leaf order, ending with `self`.
    ///
    /// `/a/b/c` yields `[/a, /a/b, /a/b/c]`.
    pub fn ancestors(&self) -> Vec<NodePath> {
        if self.is_root() {
            return Vec::new();
        }
        self.0
            .match_indices('/')
            .skip(1)
            .map(|(idx, _)| NodePath(self.0[..idx].to_string()))
            .chain(std::iter::once(self.clone()))
            .collect()
    }

    /// Appends a relative child path (which may itself contain `/`).
    pub fn join(
        &self,
        child: &str,
    ) -> Result<NodePath> {
        let child = child.trim_start_matches('/');
        let joined = if self.is_root() {
            format!("/{child}")
        } else {
            format!("{}/{child}", self.0)
        };
        NodePath::parse(&joined)
    }
}

impl fmt::Display for NodePath {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for NodePath {
    type Error = crate::Error;

    fn try_from(value: &str) -> Result<Self> {
        NodePath::parse(value)
    }
}
