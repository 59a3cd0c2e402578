//! Destination filenames
//!
//! The document store flattens names, so path separators are folded into
//! `__` before upload. Folding can merge distinct source paths; the profile's
//! [`CollisionPolicy`] decides which one survives.

use bytes::Bytes;
use core_runtime::config::CollisionPolicy;
use std::collections::HashMap;
use tracing::warn;

use crate::{Result, SyncError};

/// Token that replaces `/` in destination filenames
pub const PATH_SEPARATOR_TOKEN: &str = "__";

/// Flatten a source path into a destination filename
pub fn destination_filename(path: &str) -> String {
    path.replace('/', PATH_SEPARATOR_TOKEN)
}

/// Incoming documents keyed by destination filename, in insertion order
#[derive(Debug, Clone)]
pub struct DocumentSet {
    policy: CollisionPolicy,
    entries: Vec<(String, Bytes)>,
    positions: HashMap<String, usize>,
    collisions: usize,
}

impl DocumentSet {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            policy,
            entries: Vec::new(),
            positions: HashMap::new(),
            collisions: 0,
        }
    }

    /// Add a document found at `source_path`.
    ///
    /// # Errors
    ///
    /// `FilenameCollision` when the flattened name is already taken and the
    /// policy is `Reject`.
    pub fn insert(&mut self, source_path: &str, data: Bytes) -> Result<()> {
        let filename = destination_filename(source_path);

        let Some(&position) = self.positions.get(&filename) else {
            self.positions.insert(filename.clone(), self.entries.len());
            self.entries.push((filename, data));
            return Ok(());
        };

        self.collisions += 1;
        match self.policy {
            CollisionPolicy::KeepFirst => {
                warn!(filename = %filename, source_path, "Filename collision, keeping first document");
            }
            CollisionPolicy::KeepLast => {
                warn!(filename = %filename, source_path, "Filename collision, replacing earlier document");
                self.entries[position].1 = data;
            }
            CollisionPolicy::Reject => {
                return Err(SyncError::FilenameCollision { filename });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of inserts that hit an existing filename
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.positions.contains_key(filename)
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.entries.iter().map(|(name, data)| (name.as_str(), data))
    }
}

impl IntoIterator for DocumentSet {
    type Item = (String, Bytes);
    type IntoIter = std::vec::IntoIter<(String, Bytes)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separators_become_double_underscore() {
        assert_eq!(destination_filename("hr/policies/leave.pdf"), "hr__policies__leave.pdf");
        assert_eq!(destination_filename("flat.pdf"), "flat.pdf");
    }

    #[test]
    fn test_keep_last_overwrites_in_place() {
        let mut set = DocumentSet::new(CollisionPolicy::KeepLast);
        set.insert("a/b.pdf", Bytes::from_static(b"first")).unwrap();
        set.insert("c.pdf", Bytes::from_static(b"other")).unwrap();
        set.insert("a__b.pdf", Bytes::from_static(b"second")).unwrap();

        let entries: Vec<_> = set.into_iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("a__b.pdf".to_string(), Bytes::from_static(b"second")));
    }

    #[test]
    fn test_keep_first_ignores_later_paths() {
        let mut set = DocumentSet::new(CollisionPolicy::KeepFirst);
        set.insert("a/b.pdf", Bytes::from_static(b"first")).unwrap();
        set.insert("a__b.pdf", Bytes::from_static(b"second")).unwrap();

        assert_eq!(set.collisions(), 1);
        let (_, data) = set.iter().next().unwrap();
        assert_eq!(data, &Bytes::from_static(b"first"));
    }

    #[test]
    fn test_reject_fails_on_collision() {
        let mut set = DocumentSet::new(CollisionPolicy::Reject);
        set.insert("a/b.pdf", Bytes::new()).unwrap();
        let err = set.insert("a__b.pdf", Bytes::new()).unwrap_err();
        assert!(matches!(err, SyncError::FilenameCollision { filename } if filename == "a__b.pdf"));
    }
}
