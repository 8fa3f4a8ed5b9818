//! # docstore-tx — Context-scoped transactions for document stores
//!
//! Runs a unit of work inside a document-store transaction and makes the
//! transaction handle available to everything the work calls, through an
//! explicit [`Context`] argument rather than ambient state.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `DocumentStore` is the contract with the database driver
//! 2. **Explicit context**: the active handle travels in `Context`, never in globals
//! 3. **Pass-through errors**: work failures reach the caller unchanged
//! 4. **One branch**: helpers pick the transactional or standalone path, nothing more
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docstore_tx::{fields, Context, DocumentStore, MemoryStore, SetOptions, TxManager};
//!
//! # async fn example() -> docstore_tx::Result<()> {
//! let manager = TxManager::new(MemoryStore::new());
//! let users = manager.store().collection("users");
//! let m = &manager;
//!
//! manager
//!     .run_tx(&Context::background(), |ctx| async move {
//!         let ada = users.doc("ada");
//!         m.create_with_tx(&ctx, &ada, fields! { "name" => "Ada" }).await?;
//!         let bob = users.doc("bob");
//!         m.set_with_tx(&ctx, &bob, fields! { "name" => "Bob" }, SetOptions::Overwrite)
//!             .await
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Drivers
//!
//! | Driver | Module | Description |
//! |--------|--------|-------------|
//! | `MemoryStore` | `store::memory` | In-process store for testing/embedding |

// ============================================================================
// Modules
// ============================================================================

pub mod context;
pub mod model;
pub mod tx;
pub mod store;
pub mod manager;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    CollectionRef, DocumentRef, FieldPath, DocumentSnapshot,
    Value, Fields, to_fields,
    SetOptions, FieldUpdate, UpdateValue, Precondition,
};

// ============================================================================
// Re-exports: Context, transactions and drivers
// ============================================================================

pub use context::{Context, ContextKey};
pub use tx::{Transaction, TxMode, TxId, TxOptions};
pub use store::{DocumentStore, StoreConfig, MemoryStore};
pub use manager::{TxManager, get_tx};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Write in read-only transaction {0}")]
    ReadOnlyTx(TxId),

    #[error("Transaction {0} is no longer active")]
    TxClosed(TxId),

    #[error("Nested transactions are not supported")]
    NestedTx,

    #[error("Read after write in transaction {0}")]
    ReadAfterWrite(TxId),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Status code name, in the vocabulary of the managed database's RPC layer.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::AlreadyExists(_) => "ALREADY_EXISTS",
            Error::FailedPrecondition(_) | Error::ReadOnlyTx(_) | Error::NestedTx => {
                "FAILED_PRECONDITION"
            }
            Error::InvalidArgument(_) | Error::Serialization(_) | Error::ReadAfterWrite(_) => {
                "INVALID_ARGUMENT"
            }
            Error::TxClosed(_) => "ABORTED",
            Error::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
