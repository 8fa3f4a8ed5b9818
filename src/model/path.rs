//! Document addressing: collections, documents and field paths.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A collection, addressed by its slash-separated path below the
/// database's documents root (e.g. `users` or `users/ada/posts`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    root: Arc<str>,
    path: String,
}

impl CollectionRef {
    /// `root` is the database's documents root,
    /// `projects/{project}/databases/{database}/documents`.
    pub fn new(root: impl Into<Arc<str>>, path: impl Into<String>) -> Self {
        Self { root: root.into(), path: path.into() }
    }

    /// Last path segment.
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reference to a document in this collection. Never fails; an
    /// invalid id (such as `""`) is reported by the write that uses it.
    pub fn doc(&self, id: impl Into<String>) -> DocumentRef {
        DocumentRef { parent: self.clone(), id: id.into() }
    }

    /// Segments alternate collection and document ids, so a collection
    /// path has an odd number of them.
    fn validate(&self) -> Result<()> {
        let segments = self.path.split('/');
        if self.path.is_empty()
            || segments.clone().any(str::is_empty)
            || segments.count() % 2 == 0
        {
            return Err(Error::InvalidArgument(format!(
                "invalid collection path {:?}",
                self.path
            )));
        }
        Ok(())
    }
}

/// A single document: parent collection plus document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    parent: CollectionRef,
    id: String,
}

impl DocumentRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> &CollectionRef {
        &self.parent
    }

    /// Path below the documents root, e.g. `users/ada`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.parent.path, self.id)
    }

    /// Fully qualified resource name, unique across databases.
    pub fn name(&self) -> String {
        format!("{}/{}/{}", self.parent.root, self.parent.path, self.id)
    }

    /// Subcollection under this document.
    pub fn collection(&self, id: impl AsRef<str>) -> CollectionRef {
        CollectionRef {
            root: self.parent.root.clone(),
            path: format!("{}/{}", self.path(), id.as_ref()),
        }
    }

    /// Rejects references no write may target.
    pub fn validate(&self) -> Result<()> {
        self.parent.validate()?;
        if self.id.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "empty document id in collection {:?}",
                self.parent.path
            )));
        }
        if self.id.contains('/') {
            return Err(Error::InvalidArgument(format!("document id {:?} contains '/'", self.id)));
        }
        Ok(())
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parent.path, self.id)
    }
}

/// Path to a (possibly nested) field. `"address.city"` addresses the
/// `city` key of the `address` map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True if `self` equals `other` or names one of its ancestors.
    pub fn is_prefix_of(&self, other: &FieldPath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() || self.0.iter().any(String::is_empty) {
            return Err(Error::InvalidArgument(format!(
                "invalid field path {:?}",
                self.to_string()
            )));
        }
        Ok(())
    }
}

impl From<&str> for FieldPath {
    fn from(dotted: &str) -> Self {
        Self(dotted.split('.').map(str::to_owned).collect())
    }
}

impl From<String> for FieldPath {
    fn from(dotted: String) -> Self {
        Self::from(dotted.as_str())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}
