//! Transaction manager: runs work inside a transaction and routes writes.
//!
//! `run_tx` opens a transaction, derives a child `Context` carrying the
//! handle, and gives that context to the work. Anything the work calls
//! can recover the handle with [`get_tx`]. The `*_with_tx` helpers use
//! that lookup to write through the active transaction when there is
//! one and straight to the store when there isn't.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::{Context, ContextKey};
use crate::model::*;
use crate::store::DocumentStore;
use crate::tx::{Transaction, TxOptions};
use crate::{Error, Result};

/// Context key for the active handle. Private, so no other component
/// can read or shadow it.
struct TxKey<T>(PhantomData<fn() -> T>);

impl<T: Transaction> ContextKey for TxKey<T> {
    type Value = T;
}

/// Handle of the nearest enclosing `run_tx`, if `ctx` descends from one.
pub fn get_tx<T: Transaction>(ctx: &Context) -> Option<T> {
    ctx.value::<TxKey<T>>().cloned()
}

/// Runs work in transactions against one store.
pub struct TxManager<S: DocumentStore> {
    store: Arc<S>,
}

impl<S: DocumentStore> Clone for TxManager<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone() }
    }
}

impl<S: DocumentStore> TxManager<S> {
    pub fn new(store: S) -> Self {
        Self { store: Arc::new(store) }
    }

    pub fn from_arc(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run `work` in a read-write transaction.
    ///
    /// `work` gets a child of `ctx` carrying the transaction handle and is
    /// called exactly once. `Ok` commits; a failed commit is returned in
    /// place of the value. `Err` rolls back and is returned unchanged.
    /// Nothing is retried here.
    pub async fn run_tx<F, Fut, T, E>(
        &self,
        ctx: &Context,
        work: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        self.run_tx_with(ctx, TxOptions::default(), work).await
    }

    /// [`run_tx`](Self::run_tx) with explicit transaction options.
    ///
    /// Fails with `Error::NestedTx` if `ctx` already carries a handle;
    /// an inner transaction would commit independently of the outer one.
    #[tracing::instrument(name = "run_tx", skip_all, fields(mode = ?options.mode))]
    pub async fn run_tx_with<F, Fut, T, E>(
        &self,
        ctx: &Context,
        options: TxOptions,
        work: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        if get_tx::<S::Tx>(ctx).is_some() {
            return Err(Error::NestedTx.into());
        }
        let tx = self.store.begin_tx(ctx, options).await?;
        let id = tx.id();
        let tx_ctx = ctx.with_value::<TxKey<S::Tx>>(tx.clone());

        match work(tx_ctx).await {
            Ok(value) => {
                self.store.commit_tx(ctx, tx).await?;
                debug!(tx = %id, "work committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.store.rollback_tx(ctx, tx).await {
                    warn!(
                        tx = %id,
                        error = %rollback_err,
                        "rollback after failed work did not complete"
                    );
                }
                debug!(tx = %id, "work failed, transaction rolled back");
                Err(err)
            }
        }
    }

    /// Read `doc` through the active transaction, or directly.
    pub async fn get_with_tx(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
    ) -> Result<Option<DocumentSnapshot>> {
        match get_tx::<S::Tx>(ctx) {
            Some(tx) => tx.get(ctx, doc).await,
            None => self.store.get(ctx, doc).await,
        }
    }

    /// Create `doc`; fails if it already exists.
    pub async fn create_with_tx(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        data: Fields,
    ) -> Result<()> {
        match get_tx::<S::Tx>(ctx) {
            Some(tx) => tx.create(doc, data),
            None => self.store.create(ctx, doc, data).await,
        }
    }

    pub async fn set_with_tx(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        data: Fields,
        options: SetOptions,
    ) -> Result<()> {
        match get_tx::<S::Tx>(ctx) {
            Some(tx) => tx.set(doc, data, options),
            None => self.store.set(ctx, doc, data, options).await,
        }
    }

    /// Apply field updates; fails if `doc` is missing or a precondition is unmet.
    pub async fn update_with_tx(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        updates: Vec<FieldUpdate>,
        preconditions: &[Precondition],
    ) -> Result<()> {
        match get_tx::<S::Tx>(ctx) {
            Some(tx) => tx.update(doc, updates, preconditions),
            None => self.store.update(ctx, doc, updates, preconditions).await,
        }
    }

    pub async fn delete_with_tx(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        preconditions: &[Precondition],
    ) -> Result<()> {
        match get_tx::<S::Tx>(ctx) {
            Some(tx) => tx.delete(doc, preconditions),
            None => self.store.delete(ctx, doc, preconditions).await,
        }
    }
}
