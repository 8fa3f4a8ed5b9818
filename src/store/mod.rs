//! # Document Store Trait
//!
//! This is THE contract between the dispatcher and a database driver:
//! opening and finishing transactions, plus the standalone writes used
//! when no transaction is active.
//!
//! ## Implementations
//!
//! | Driver | Module | Description |
//! |--------|--------|-------------|
//! | `MemoryStore` | `memory` | In-process store for testing/embedding |

pub mod memory;
mod apply;

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::model::*;
use crate::tx::{Transaction, TxOptions};
use crate::Result;

pub use memory::MemoryStore;

// ============================================================================
// Store Configuration
// ============================================================================

/// Which database a driver talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub project_id: String,
    pub database_id: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            project_id: "test".into(),
            database_id: "(default)".into(),
        }
    }
}

impl StoreConfig {
    pub const PROJECT_ENV: &'static str = "DOCSTORE_PROJECT_ID";
    pub const DATABASE_ENV: &'static str = "DOCSTORE_DATABASE_ID";

    pub fn new(project_id: impl Into<String>) -> Self {
        Self { project_id: project_id.into(), ..Self::default() }
    }

    /// Defaults overridden by `DOCSTORE_PROJECT_ID` / `DOCSTORE_DATABASE_ID`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the two
    /// variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            project_id: lookup(Self::PROJECT_ENV).unwrap_or(defaults.project_id),
            database_id: lookup(Self::DATABASE_ENV).unwrap_or(defaults.database_id),
        }
    }

    /// `projects/{project}/databases/{database}/documents`
    pub fn documents_root(&self) -> String {
        format!("projects/{}/databases/{}/documents", self.project_id, self.database_id)
    }
}

// ============================================================================
// DocumentStore Trait
// ============================================================================

/// The driver contract.
///
/// Drivers honor the deadline carried by the `Context` they are given:
/// an expired context fails with `Error::DeadlineExceeded` before any
/// state is touched.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// The transaction handle type for this driver.
    type Tx: Transaction;

    fn config(&self) -> &StoreConfig;

    /// Top-level (or slash-separated nested) collection.
    fn collection(&self, path: &str) -> CollectionRef {
        CollectionRef::new(self.config().documents_root(), path)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    async fn begin_tx(&self, ctx: &Context, options: TxOptions) -> Result<Self::Tx>;

    /// Apply every buffered write atomically, or none of them.
    async fn commit_tx(&self, ctx: &Context, tx: Self::Tx) -> Result<()>;

    /// Discard buffered writes.
    async fn rollback_tx(&self, ctx: &Context, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Standalone operations
    // ========================================================================

    async fn get(&self, ctx: &Context, doc: &DocumentRef) -> Result<Option<DocumentSnapshot>>;

    /// Fails with `AlreadyExists` if `doc` exists.
    async fn create(&self, ctx: &Context, doc: &DocumentRef, data: Fields) -> Result<()>;

    async fn set(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        data: Fields,
        options: SetOptions,
    ) -> Result<()>;

    /// Fails with `NotFound` if `doc` is missing.
    async fn update(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        updates: Vec<FieldUpdate>,
        preconditions: &[Precondition],
    ) -> Result<()>;

    /// Deleting a missing document succeeds unless a precondition says otherwise.
    async fn delete(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        preconditions: &[Precondition],
    ) -> Result<()>;
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for Arc<S> {
    type Tx = S::Tx;

    fn config(&self) -> &StoreConfig {
        (**self).config()
    }

    async fn begin_tx(&self, ctx: &Context, options: TxOptions) -> Result<Self::Tx> {
        (**self).begin_tx(ctx, options).await
    }

    async fn commit_tx(&self, ctx: &Context, tx: Self::Tx) -> Result<()> {
        (**self).commit_tx(ctx, tx).await
    }

    async fn rollback_tx(&self, ctx: &Context, tx: Self::Tx) -> Result<()> {
        (**self).rollback_tx(ctx, tx).await
    }

    async fn get(&self, ctx: &Context, doc: &DocumentRef) -> Result<Option<DocumentSnapshot>> {
        (**self).get(ctx, doc).await
    }

    async fn create(&self, ctx: &Context, doc: &DocumentRef, data: Fields) -> Result<()> {
        (**self).create(ctx, doc, data).await
    }

    async fn set(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        data: Fields,
        options: SetOptions,
    ) -> Result<()> {
        (**self).set(ctx, doc, data, options).await
    }

    async fn update(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        updates: Vec<FieldUpdate>,
        preconditions: &[Precondition],
    ) -> Result<()> {
        (**self).update(ctx, doc, updates, preconditions).await
    }

    async fn delete(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        preconditions: &[Precondition],
    ) -> Result<()> {
        (**self).delete(ctx, doc, preconditions).await
    }
}
