//! Request-scoped context.
//!
//! A `Context` is an immutable chain of key/value associations plus an
//! optional deadline. Deriving a child never changes the parent, so a
//! context can be cloned freely and handed down a call chain.
//!
//! Keys are types implementing [`ContextKey`]. Two components can only
//! share an association if they can both name the same key type, which
//! lets a module keep its keys private.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{Error, Result};

/// A typed key for values carried on a [`Context`].
pub trait ContextKey: 'static {
    type Value: Any + Send + Sync;
}

/// Immutable, hierarchical key/value scope.
#[derive(Clone, Default)]
pub struct Context {
    entries: Option<Arc<Entry>>,
    deadline: Option<Instant>,
}

struct Entry {
    key: TypeId,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Entry>>,
}

impl Context {
    /// The empty root context: no values, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child carrying `value` under `K`. Shadows any value `K`
    /// already has in this context.
    pub fn with_value<K: ContextKey>(&self, value: K::Value) -> Self {
        Self {
            entries: Some(Arc::new(Entry {
                key: TypeId::of::<K>(),
                value: Box::new(value),
                parent: self.entries.clone(),
            })),
            deadline: self.deadline,
        }
    }

    /// Nearest value stored under `K`, if any.
    pub fn value<K: ContextKey>(&self) -> Option<&K::Value> {
        let wanted = TypeId::of::<K>();
        let mut cursor = self.entries.as_deref();
        while let Some(entry) = cursor {
            if entry.key == wanted {
                return entry.value.downcast_ref::<K::Value>();
            }
            cursor = entry.parent.as_deref();
        }
        None
    }

    /// Derive a child that expires at `deadline`, or at the inherited
    /// deadline if that one is earlier.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self { entries: self.entries.clone(), deadline: Some(deadline) }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails with `DeadlineExceeded` once the deadline has passed.
    pub fn check(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.entries.as_deref();
        while let Some(entry) = cursor {
            depth += 1;
            cursor = entry.parent.as_deref();
        }
        depth
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("values", &self.depth())
            .field("deadline", &self.deadline)
            .finish()
    }
}
