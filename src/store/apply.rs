//! Write semantics shared by the standalone and transactional paths of
//! the in-process driver.

use chrono::{DateTime, Utc};

use crate::model::*;
use crate::model::write::{single_precondition, validate_updates};
use crate::{Error, Result};

/// A validated write, ready to be applied to a document.
#[derive(Debug, Clone)]
pub(crate) enum Write {
    Create { doc: DocumentRef, data: Fields },
    Set { doc: DocumentRef, data: Fields, options: SetOptions },
    Update { doc: DocumentRef, updates: Vec<FieldUpdate>, precondition: Option<Precondition> },
    Delete { doc: DocumentRef, precondition: Option<Precondition> },
}

impl Write {
    pub fn create(doc: &DocumentRef, data: Fields) -> Result<Self> {
        doc.validate()?;
        Ok(Write::Create { doc: doc.clone(), data })
    }

    pub fn set(doc: &DocumentRef, data: Fields, options: SetOptions) -> Result<Self> {
        doc.validate()?;
        options.validate(&data)?;
        Ok(Write::Set { doc: doc.clone(), data, options })
    }

    pub fn update(
        doc: &DocumentRef,
        updates: Vec<FieldUpdate>,
        preconditions: &[Precondition],
    ) -> Result<Self> {
        doc.validate()?;
        validate_updates(&updates)?;
        let precondition = single_precondition(preconditions)?;
        if let Some(Precondition::Exists(_)) = precondition {
            return Err(Error::InvalidArgument(
                "update always requires the document to exist; Exists is not allowed".into(),
            ));
        }
        Ok(Write::Update { doc: doc.clone(), updates, precondition })
    }

    pub fn delete(doc: &DocumentRef, preconditions: &[Precondition]) -> Result<Self> {
        doc.validate()?;
        let precondition = single_precondition(preconditions)?;
        Ok(Write::Delete { doc: doc.clone(), precondition })
    }

    pub fn doc(&self) -> &DocumentRef {
        match self {
            Write::Create { doc, .. }
            | Write::Set { doc, .. }
            | Write::Update { doc, .. }
            | Write::Delete { doc, .. } => doc,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Write::Create { .. } => "create",
            Write::Set { .. } => "set",
            Write::Update { .. } => "update",
            Write::Delete { .. } => "delete",
        }
    }

    /// State of the document after this write, given its current state.
    /// `now` is the commit time.
    pub fn apply(
        &self,
        current: Option<&DocumentSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<Option<DocumentSnapshot>> {
        match self {
            Write::Create { doc, data } => {
                if current.is_some() {
                    return Err(Error::AlreadyExists(doc.path()));
                }
                Ok(Some(written(doc, data.clone(), None, now)))
            }
            Write::Set { doc, data, options } => {
                let fields = match options {
                    SetOptions::Overwrite => data.clone(),
                    SetOptions::MergeAll => {
                        let mut fields = current.map(|d| d.fields.clone()).unwrap_or_default();
                        merge_all(&mut fields, data.clone());
                        fields
                    }
                    SetOptions::Merge(paths) => {
                        let mut fields = current.map(|d| d.fields.clone()).unwrap_or_default();
                        for path in paths {
                            let value = value::lookup(data, path).cloned().ok_or_else(|| {
                                Error::InvalidArgument(format!(
                                    "merge field {path} is not present in the data"
                                ))
                            })?;
                            set_path(&mut fields, path, value);
                        }
                        fields
                    }
                };
                Ok(Some(written(doc, fields, current, now)))
            }
            Write::Update { doc, updates, precondition } => {
                check_precondition(doc, current, *precondition)?;
                let existing = current.ok_or_else(|| Error::NotFound(doc.path()))?;
                let mut fields = existing.fields.clone();
                for update in updates {
                    match &update.value {
                        UpdateValue::Set(value) => {
                            set_path(&mut fields, &update.path, value.clone())
                        }
                        UpdateValue::Delete => remove_path(&mut fields, &update.path),
                        UpdateValue::ServerTimestamp => {
                            set_path(&mut fields, &update.path, Value::Timestamp(now))
                        }
                    }
                }
                Ok(Some(written(doc, fields, current, now)))
            }
            Write::Delete { doc, precondition } => {
                check_precondition(doc, current, *precondition)?;
                Ok(None)
            }
        }
    }
}

fn written(
    doc: &DocumentRef,
    fields: Fields,
    current: Option<&DocumentSnapshot>,
    now: DateTime<Utc>,
) -> DocumentSnapshot {
    DocumentSnapshot {
        reference: doc.clone(),
        fields,
        create_time: current.map_or(now, |d| d.create_time),
        update_time: now,
    }
}

fn check_precondition(
    doc: &DocumentRef,
    current: Option<&DocumentSnapshot>,
    precondition: Option<Precondition>,
) -> Result<()> {
    match (precondition, current) {
        (None, _) => Ok(()),
        (Some(Precondition::Exists(true)), None) => Err(Error::NotFound(doc.path())),
        (Some(Precondition::Exists(false)), Some(_)) => Err(Error::AlreadyExists(doc.path())),
        (Some(Precondition::Exists(_)), _) => Ok(()),
        (Some(Precondition::LastUpdateTime(_)), None) => Err(Error::FailedPrecondition(
            format!("{} does not exist", doc.path()),
        )),
        (Some(Precondition::LastUpdateTime(expected)), Some(existing)) => {
            if existing.update_time == expected {
                Ok(())
            } else {
                Err(Error::FailedPrecondition(format!(
                    "{} was last updated at {}, expected {}",
                    doc.path(),
                    existing.update_time.to_rfc3339(),
                    expected.to_rfc3339()
                )))
            }
        }
    }
}

/// Deep merge: nested non-empty maps merge key by key, anything else replaces.
fn merge_all(target: &mut Fields, data: Fields) {
    for (key, value) in data {
        match (target.get_mut(&key), value) {
            (Some(Value::Map(existing)), Value::Map(incoming)) if !incoming.is_empty() => {
                merge_all(existing, incoming)
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Write `value` at `path`, creating (or replacing non-map) parents with maps.
fn set_path(fields: &mut Fields, path: &FieldPath, value: Value) {
    let Some((last, parents)) = path.segments().split_last() else { return };
    let mut current = fields;
    for segment in parents {
        let slot = current.entry(segment.clone()).or_insert_with(|| Value::Map(Fields::new()));
        if !matches!(slot, Value::Map(_)) {
            *slot = Value::Map(Fields::new());
        }
        current = match slot {
            Value::Map(map) => map,
            _ => unreachable!("slot was just replaced with a map"),
        };
    }
    current.insert(last.clone(), value);
}

fn remove_path(fields: &mut Fields, path: &FieldPath) {
    let Some((last, parents)) = path.segments().split_last() else { return };
    let mut current = fields;
    for segment in parents {
        match current.get_mut(segment) {
            Some(Value::Map(map)) => current = map,
            _ => return,
        }
    }
    current.remove(last);
}
