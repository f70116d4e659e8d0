use std::fmt::{Display, Formatter};

use crate::keys::{Key, KeyError};

/// Location of a node in the document tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(Vec<Key>);

impl Path {
    pub fn root() -> Path {
        Path(vec![])
    }

    /// Parses a `/` separated path. Empty segments are skipped.
    pub fn parse(path: &str) -> Result<Path, KeyError> {
        path.split('/')
            .filter(|it| !it.is_empty())
            .map(Key::new)
            .collect::<Result<Vec<_>, _>>()
            .map(Path)
    }

    pub fn child(&self, key: &Key) -> Path {
        let mut segments = self.0.clone();
        segments.push(key.clone());
        Path(segments)
    }

    pub(crate) fn field(&self, name: &'static str) -> Path {
        self.child(&Key::field(name))
    }

    pub fn join(&self, relative: &Path) -> Path {
        let mut segments = self.0.clone();
        segments.extend(relative.0.iter().cloned());
        Path(segments)
    }

    pub fn segments(&self) -> &[Key] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Key> {
        self.0.last()
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub fn contains(&self, other: &Path) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Whether a write at one path changes the subtree at the other.
    pub fn overlaps(&self, other: &Path) -> bool {
        self.contains(other) || other.contains(self)
    }

    pub fn strip_prefix(&self, base: &Path) -> Option<&[Key]> {
        self.0.strip_prefix(base.0.as_slice())
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        let mut first = true;
        for segment in &self.0 {
            if !first {
                f.write_str("/")?;
            }
            first = false;
            f.write_str(segment.as_str())?;
        }
        Ok(())
    }
}
