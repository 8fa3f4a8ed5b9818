//! # Document Model
//!
//! Plain data that crosses every boundary: caller ↔ dispatcher ↔ driver.
//! The dispatcher never inspects these values; drivers give them meaning.
//!
//! Design rule: no driver state here. This module is pure data — no I/O,
//! no locks, no async.

pub mod path;
pub mod value;
pub mod document;
pub mod write;

pub use path::{CollectionRef, DocumentRef, FieldPath};
pub use value::{Value, Fields, to_fields};
pub use document::DocumentSnapshot;
pub use write::{SetOptions, FieldUpdate, UpdateValue, Precondition};
