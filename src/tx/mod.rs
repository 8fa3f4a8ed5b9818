//! Transaction handles.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::model::{DocumentRef, DocumentSnapshot, FieldUpdate, Fields, Precondition, SetOptions};
use crate::Result;

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TxMode {
    ReadOnly,
    #[default]
    ReadWrite,
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Options for opening a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxOptions {
    pub mode: TxMode,
}

impl TxOptions {
    pub fn read_only() -> Self {
        Self { mode: TxMode::ReadOnly }
    }
}

/// Handle to one in-flight transaction, produced by a driver.
///
/// Handles are shared: clones refer to the same transaction. Writes are
/// buffered and take effect when the driver commits; after commit or
/// rollback every operation fails with `Error::TxClosed`.
#[async_trait]
pub trait Transaction: Clone + Send + Sync + 'static {
    fn id(&self) -> TxId;
    fn mode(&self) -> TxMode;

    /// Read committed state. Reads must come before the transaction's first
    /// write; afterwards they fail with `Error::ReadAfterWrite`.
    async fn get(&self, ctx: &Context, doc: &DocumentRef) -> Result<Option<DocumentSnapshot>>;

    /// Create `doc`; commit fails with `AlreadyExists` if it exists.
    fn create(&self, doc: &DocumentRef, data: Fields) -> Result<()>;

    fn set(&self, doc: &DocumentRef, data: Fields, options: SetOptions) -> Result<()>;

    /// Commit fails with `NotFound` if `doc` is missing.
    fn update(
        &self,
        doc: &DocumentRef,
        updates: Vec<FieldUpdate>,
        preconditions: &[Precondition],
    ) -> Result<()>;

    fn delete(&self, doc: &DocumentRef, preconditions: &[Precondition]) -> Result<()>;
}
