use serde::{Deserialize, Serialize};
use std::fmt;

/// Hierarchical, slash-delimited key
///
/// A key is always rooted (`/`), never ends in a slash (except the root
/// itself), and never contains empty, `.` or `..` segments once cleaned.
/// Keys order lexicographically by their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Key(String);

impl Key {
    /// Create a key from any path-like string, cleaning it
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(clean(s.as_ref()))
    }

    /// Create a key without cleaning
    ///
    /// The caller guarantees the string is already in clean form. A missing
    /// leading slash is still added so the root invariant holds.
    pub fn raw(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.starts_with('/') {
            Self(s)
        } else {
            Self(format!("/{}", s))
        }
    }

    /// The root key `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// String form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Parent key; the root is its own parent
    pub fn parent(&self) -> Key {
        match self.0.rfind('/') {
            Some(0) | None => Key::root(),
            Some(idx) => Key(self.0[..idx].to_string()),
        }
    }

    /// Append `other` beneath this key
    pub fn child(&self, other: &Key) -> Key {
        if self.is_root() {
            other.clone()
        } else if other.is_root() {
            self.clone()
        } else {
            Key(format!("{}{}", self.0, other.0))
        }
    }

    /// Append a single path segment (or sub-path) beneath this key
    pub fn child_string(&self, s: &str) -> Key {
        Key::new(format!("{}/{}", self.0, s))
    }

    /// Whether `other` lies strictly beneath this key
    pub fn is_ancestor_of(&self, other: &Key) -> bool {
        if other.0.len() <= self.0.len() {
            return false;
        }
        if self.is_root() {
            return true;
        }
        other.0.starts_with(&self.0) && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// Whether this key lies strictly beneath `other`
    pub fn is_descendant_of(&self, other: &Key) -> bool {
        other.is_ancestor_of(self)
    }

    /// Whether the key has exactly one segment
    pub fn is_top_level(&self) -> bool {
        self.namespaces().len() == 1
    }

    /// Path segments, root has none
    pub fn namespaces(&self) -> Vec<&str> {
        self.0.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Last path segment
    pub fn base_namespace(&self) -> &str {
        self.namespaces().last().copied().unwrap_or("")
    }

    /// Remainder of this key below `prefix`, if `prefix` is this key or one of its ancestors.
    ///
    /// `/foo/bar` stripped of `/foo` is `/bar`; `/foo` stripped of `/foo` is `/`.
    pub fn strip_ancestor(&self, prefix: &Key) -> Option<Key> {
        if prefix.is_root() {
            return Some(self.clone());
        }
        if self == prefix {
            return Some(Key::root());
        }
        if prefix.is_ancestor_of(self) {
            return Some(Key(self.0[prefix.0.len()..].to_string()));
        }
        None
    }
}

/// Resolve empty, `.` and `..` segments, rooted at `/`
fn clean(s: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in s.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

impl Default for Key {
    fn default() -> Self {
        Key::root()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::new(s)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::new(s)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
