//! In-memory document store.
//!
//! This is the reference implementation of `DocumentStore`, playing the
//! part the database emulator plays for the managed service. Committed
//! documents live in one `BTreeMap` behind a `RwLock`.
//!
//! ## Transactions
//!
//! - Writes are validated when issued and buffered on the handle.
//! - `commit_tx()` applies the buffer in order against a staging overlay
//!   and publishes it only if every write succeeds.
//! - `rollback_tx()` drops the buffer.
//! - Reads see committed state and must come before the first write;
//!   a read after a buffered write fails with `ReadAfterWrite`.
//! - No conflict detection and no retries: the last commit wins.
//!
//! Use this store for:
//! - Testing code built on `TxManager`
//! - Embedding in applications that don't need persistence

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::context::Context;
use crate::model::*;
use crate::tx::{Transaction, TxId, TxMode, TxOptions};
use crate::{Error, Result};
use super::apply::Write;
use super::{DocumentStore, StoreConfig};

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory document storage. Clones share the same documents.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    config: StoreConfig,
    state: RwLock<StoreState>,
    next_tx_id: AtomicU64,
    counters: Counters,
}

struct StoreState {
    /// document name → committed snapshot
    docs: BTreeMap<String, DocumentSnapshot>,
    last_commit: DateTime<Utc>,
}

/// Calls received per driver entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub gets: u64,
    pub creates: u64,
    pub sets: u64,
    pub updates: u64,
    pub deletes: u64,
    pub begins: u64,
    /// Commits that were applied.
    pub commits: u64,
    pub rollbacks: u64,
    /// Writes buffered through transaction handles.
    pub tx_writes: u64,
}

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    creates: AtomicU64,
    sets: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    tx_writes: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                config,
                state: RwLock::new(StoreState {
                    docs: BTreeMap::new(),
                    last_commit: DateTime::<Utc>::MIN_UTC,
                }),
                next_tx_id: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        }
    }

    /// Number of committed documents.
    pub fn len(&self) -> usize {
        self.inner.state.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed documents directly inside `collection`, ordered by name.
    pub fn documents(&self, collection: &CollectionRef) -> Vec<DocumentSnapshot> {
        self.inner
            .state
            .read()
            .docs
            .values()
            .filter(|d| d.reference.parent() == collection)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        let c = &self.inner.counters;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StoreStats {
            gets: load(&c.gets),
            creates: load(&c.creates),
            sets: load(&c.sets),
            updates: load(&c.updates),
            deletes: load(&c.deletes),
            begins: load(&c.begins),
            commits: load(&c.commits),
            rollbacks: load(&c.rollbacks),
            tx_writes: load(&c.tx_writes),
        }
    }

    fn write_now(&self, ctx: &Context, write: Result<Write>) -> Result<()> {
        ctx.check()?;
        let write = write?;
        self.inner.state.write().apply_all(std::slice::from_ref(&write))?;
        trace!(op = write.kind(), doc = %write.doc(), "standalone write applied");
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreState {
    /// Strictly increasing commit timestamps.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.last_commit = if now > self.last_commit {
            now
        } else {
            self.last_commit + TimeDelta::microseconds(1)
        };
        self.last_commit
    }

    /// Apply `writes` in order; publish all of them or none.
    fn apply_all(&mut self, writes: &[Write]) -> Result<()> {
        let now = self.tick();
        let mut staged: BTreeMap<String, Option<DocumentSnapshot>> = BTreeMap::new();
        for write in writes {
            let key = write.doc().name();
            let current = match staged.get(&key) {
                Some(staged_doc) => staged_doc.as_ref(),
                None => self.docs.get(&key),
            };
            let next = write.apply(current, now)?;
            staged.insert(key, next);
        }
        for (key, doc) in staged {
            match doc {
                Some(doc) => {
                    self.docs.insert(key, doc);
                }
                None => {
                    self.docs.remove(&key);
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// In-memory transaction handle. Clones share one write buffer.
#[derive(Clone)]
pub struct MemoryTx {
    inner: Arc<TxInner>,
}

struct TxInner {
    id: TxId,
    mode: TxMode,
    store: Arc<MemoryInner>,
    state: Mutex<TxState>,
}

struct TxState {
    active: bool,
    writes: Vec<Write>,
}

impl MemoryTx {
    /// True until the transaction is committed or rolled back.
    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    /// Writes buffered so far.
    pub fn pending_writes(&self) -> usize {
        self.inner.state.lock().writes.len()
    }

    fn buffer(&self, write: Result<Write>) -> Result<()> {
        let mut state = self.inner.state.lock();
        if !state.active {
            return Err(Error::TxClosed(self.inner.id));
        }
        if self.inner.mode == TxMode::ReadOnly {
            return Err(Error::ReadOnlyTx(self.inner.id));
        }
        let write = write?;
        trace!(tx = %self.inner.id, op = write.kind(), doc = %write.doc(), "write buffered");
        bump(&self.inner.store.counters.tx_writes);
        state.writes.push(write);
        Ok(())
    }

    /// Close the transaction and hand back its buffer.
    fn finish(&self) -> Result<Vec<Write>> {
        let mut state = self.inner.state.lock();
        if !state.active {
            return Err(Error::TxClosed(self.inner.id));
        }
        state.active = false;
        Ok(std::mem::take(&mut state.writes))
    }
}

impl std::fmt::Debug for MemoryTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTx")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("active", &self.is_active())
            .finish()
    }
}

#[async_trait]
impl Transaction for MemoryTx {
    fn id(&self) -> TxId { self.inner.id }
    fn mode(&self) -> TxMode { self.inner.mode }

    async fn get(&self, ctx: &Context, doc: &DocumentRef) -> Result<Option<DocumentSnapshot>> {
        ctx.check()?;
        doc.validate()?;
        {
            let state = self.inner.state.lock();
            if !state.active {
                return Err(Error::TxClosed(self.inner.id));
            }
            if !state.writes.is_empty() {
                return Err(Error::ReadAfterWrite(self.inner.id));
            }
        }
        Ok(self.inner.store.state.read().docs.get(&doc.name()).cloned())
    }

    fn create(&self, doc: &DocumentRef, data: Fields) -> Result<()> {
        self.buffer(Write::create(doc, data))
    }

    fn set(&self, doc: &DocumentRef, data: Fields, options: SetOptions) -> Result<()> {
        self.buffer(Write::set(doc, data, options))
    }

    fn update(
        &self,
        doc: &DocumentRef,
        updates: Vec<FieldUpdate>,
        preconditions: &[Precondition],
    ) -> Result<()> {
        self.buffer(Write::update(doc, updates, preconditions))
    }

    fn delete(&self, doc: &DocumentRef, preconditions: &[Precondition]) -> Result<()> {
        self.buffer(Write::delete(doc, preconditions))
    }
}

// ============================================================================
// DocumentStore impl
// ============================================================================

#[async_trait]
impl DocumentStore for MemoryStore {
    type Tx = MemoryTx;

    fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    async fn begin_tx(&self, ctx: &Context, options: TxOptions) -> Result<MemoryTx> {
        ctx.check()?;
        bump(&self.inner.counters.begins);
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        debug!(tx = %id, mode = ?options.mode, "transaction started");
        Ok(MemoryTx {
            inner: Arc::new(TxInner {
                id,
                mode: options.mode,
                store: self.inner.clone(),
                state: Mutex::new(TxState { active: true, writes: Vec::new() }),
            }),
        })
    }

    async fn commit_tx(&self, ctx: &Context, tx: MemoryTx) -> Result<()> {
        if !Arc::ptr_eq(&tx.inner.store, &self.inner) {
            return Err(Error::InvalidArgument(format!("{} belongs to another store", tx.id())));
        }
        let writes = tx.finish()?;
        ctx.check()?;
        self.inner.state.write().apply_all(&writes)?;
        bump(&self.inner.counters.commits);
        debug!(tx = %tx.id(), writes = writes.len(), "transaction committed");
        Ok(())
    }

    async fn rollback_tx(&self, _ctx: &Context, tx: MemoryTx) -> Result<()> {
        if !Arc::ptr_eq(&tx.inner.store, &self.inner) {
            return Err(Error::InvalidArgument(format!("{} belongs to another store", tx.id())));
        }
        bump(&self.inner.counters.rollbacks);
        let discarded = tx.finish()?;
        debug!(tx = %tx.id(), discarded = discarded.len(), "transaction rolled back");
        Ok(())
    }

    async fn get(&self, ctx: &Context, doc: &DocumentRef) -> Result<Option<DocumentSnapshot>> {
        ctx.check()?;
        bump(&self.inner.counters.gets);
        doc.validate()?;
        Ok(self.inner.state.read().docs.get(&doc.name()).cloned())
    }

    async fn create(&self, ctx: &Context, doc: &DocumentRef, data: Fields) -> Result<()> {
        bump(&self.inner.counters.creates);
        self.write_now(ctx, Write::create(doc, data))
    }

    async fn set(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        data: Fields,
        options: SetOptions,
    ) -> Result<()> {
        bump(&self.inner.counters.sets);
        self.write_now(ctx, Write::set(doc, data, options))
    }

    async fn update(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        updates: Vec<FieldUpdate>,
        preconditions: &[Precondition],
    ) -> Result<()> {
        bump(&self.inner.counters.updates);
        self.write_now(ctx, Write::update(doc, updates, preconditions))
    }

    async fn delete(
        &self,
        ctx: &Context,
        doc: &DocumentRef,
        preconditions: &[Precondition],
    ) -> Result<()> {
        bump(&self.inner.counters.deletes);
        self.write_now(ctx, Write::delete(doc, preconditions))
    }
}
