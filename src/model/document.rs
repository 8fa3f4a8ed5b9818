//! Read results.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use super::{DocumentRef, FieldPath, Fields, Value};
use super::value::lookup;
use crate::Result;

/// A committed document as seen by a read.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub reference: DocumentRef,
    pub fields: Fields,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl DocumentSnapshot {
    pub fn get(&self, path: impl Into<FieldPath>) -> Option<&Value> {
        lookup(&self.fields, &path.into())
    }

    /// Deserialize the document's fields into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        let json = Value::Map(self.fields.clone()).into_json();
        Ok(serde_json::from_value(json)?)
    }
}
