//! Write options, field updates and preconditions.
//!
//! These are interpreted by drivers; the dispatcher forwards them as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FieldPath, Fields, Value};
use super::value::lookup;
use crate::{Error, Result};

/// How `set` combines new data with an existing document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum SetOptions {
    /// Replace the whole document.
    #[default]
    Overwrite,
    /// Write every leaf field in the data, keep all other fields.
    MergeAll,
    /// Write only the listed fields; each must be present in the data.
    Merge(Vec<FieldPath>),
}

impl SetOptions {
    pub(crate) fn validate(&self, data: &Fields) -> Result<()> {
        if let SetOptions::Merge(paths) = self {
            for path in paths {
                path.validate()?;
                if lookup(data, path).is_none() {
                    return Err(Error::InvalidArgument(format!(
                        "merge field {path} is not present in the data"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// New content for one field in an `update`.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateValue {
    Set(Value),
    /// Remove the field.
    Delete,
    /// Set the field to the commit time.
    ServerTimestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub path: FieldPath,
    pub value: UpdateValue,
}

impl FieldUpdate {
    pub fn set(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self { path: path.into(), value: UpdateValue::Set(value.into()) }
    }

    pub fn delete(path: impl Into<FieldPath>) -> Self {
        Self { path: path.into(), value: UpdateValue::Delete }
    }

    pub fn server_timestamp(path: impl Into<FieldPath>) -> Self {
        Self { path: path.into(), value: UpdateValue::ServerTimestamp }
    }
}

/// Non-empty, valid paths, and no path that is a prefix of another.
pub(crate) fn validate_updates(updates: &[FieldUpdate]) -> Result<()> {
    if updates.is_empty() {
        return Err(Error::InvalidArgument("update needs at least one field".into()));
    }
    for (i, update) in updates.iter().enumerate() {
        update.path.validate()?;
        for other in &updates[i + 1..] {
            if update.path.is_prefix_of(&other.path) || other.path.is_prefix_of(&update.path) {
                return Err(Error::InvalidArgument(format!(
                    "conflicting update paths {} and {}",
                    update.path, other.path
                )));
            }
        }
    }
    Ok(())
}

/// Condition the stored document must meet for a write to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precondition {
    /// Document must (or must not) exist.
    Exists(bool),
    /// Document must exist with exactly this update time.
    LastUpdateTime(DateTime<Utc>),
}

/// At most one precondition per write.
pub(crate) fn single_precondition(preconditions: &[Precondition]) -> Result<Option<Precondition>> {
    match preconditions {
        [] => Ok(None),
        [one] => Ok(Some(*one)),
        _ => Err(Error::InvalidArgument(format!(
            "at most one precondition per write, got {}",
            preconditions.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_path_conflicts() {
        assert!(validate_updates(&[]).is_err());
        assert!(validate_updates(&[FieldUpdate::set("a", 1), FieldUpdate::set("b", 2)]).is_ok());
        assert!(validate_updates(&[FieldUpdate::set("a", 1), FieldUpdate::delete("a.b")]).is_err());
        assert!(validate_updates(&[FieldUpdate::set("a", 1), FieldUpdate::set("a", 2)]).is_err());
        assert!(validate_updates(&[FieldUpdate::set("", 1)]).is_err());
    }

    #[test]
    fn test_merge_paths_must_be_in_data() {
        let data = crate::fields! { "a" => crate::fields! { "b" => 1 } };
        assert!(SetOptions::Merge(vec!["a.b".into()]).validate(&data).is_ok());
        assert!(SetOptions::Merge(vec!["c".into()]).validate(&data).is_err());
        assert!(SetOptions::MergeAll.validate(&data).is_ok());
    }

    #[test]
    fn test_single_precondition() {
        assert_eq!(single_precondition(&[]).unwrap(), None);
        assert_eq!(
            single_precondition(&[Precondition::Exists(true)]).unwrap(),
            Some(Precondition::Exists(true))
        );
        let two = [Precondition::Exists(true), Precondition::Exists(false)];
        assert!(single_precondition(&two).is_err());
    }
}
