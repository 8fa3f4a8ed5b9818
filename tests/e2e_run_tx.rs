//! End-to-end tests for running work inside transactions.
//!
//! Each test drives `TxManager::run_tx` against a fresh `MemoryStore` and
//! checks the committed state afterwards.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use docstore_tx::store::memory::MemoryTx;
use docstore_tx::{
    fields, get_tx, to_fields, Context, DocumentStore, Error, FieldUpdate, Fields, MemoryStore,
    SetOptions, Transaction, TxManager, TxOptions,
};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

const TEST_COLLECTION: &str = "TestCollection";

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Num {
    num: i64,
}

fn num(n: i64) -> Fields {
    to_fields(&Num { num: n }).unwrap()
}

fn bg() -> Context {
    Context::background()
}

// ============================================================================
// 1. Rollback when the work fails
// ============================================================================

#[tokio::test]
async fn test_rollback_when_error_occurred() {
    let manager = TxManager::new(MemoryStore::new());
    let things = manager.store().collection(TEST_COLLECTION);

    let result = manager
        .run_tx(&bg(), |ctx| async move {
            let tx = get_tx::<MemoryTx>(&ctx).expect("transaction attached");
            let _ = tx.set(&things.doc("1"), num(1), SetOptions::Overwrite);
            tx.set(&things.doc(""), num(2), SetOptions::Overwrite)
        })
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "got {err:?}");

    let things = manager.store().collection(TEST_COLLECTION);
    let missing = manager.store().get(&bg(), &things.doc("1")).await.unwrap();
    assert!(missing.is_none(), "document 1 must be rolled back");
    assert_eq!(manager.store().stats().rollbacks, 1);
}

// ============================================================================
// 2. Commit when the work succeeds
// ============================================================================

#[tokio::test]
async fn test_commit_when_no_error_occurred() {
    let manager = TxManager::new(MemoryStore::new());
    let things = manager.store().collection(TEST_COLLECTION);
    let refs = things.clone();

    manager
        .run_tx(&bg(), |ctx| async move {
            let tx = get_tx::<MemoryTx>(&ctx).expect("transaction attached");
            tx.set(&refs.doc("1"), num(1), SetOptions::Overwrite)?;
            tx.set(&refs.doc("2"), num(2), SetOptions::Overwrite)?;
            Ok::<_, Error>(())
        })
        .await
        .unwrap();

    let one = manager.store().get(&bg(), &things.doc("1")).await.unwrap().unwrap();
    let two = manager.store().get(&bg(), &things.doc("2")).await.unwrap().unwrap();
    assert_eq!(one.data_as::<Num>().unwrap(), Num { num: 1 });
    assert_eq!(two.data_as::<Num>().unwrap(), Num { num: 2 });
    assert_eq!(manager.store().stats().commits, 1);
}

// ============================================================================
// 3. Work errors come back unchanged
// ============================================================================

#[derive(Debug, PartialEq)]
enum AppError {
    Rejected(&'static str),
    Store(&'static str),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Store(err.code())
    }
}

#[tokio::test]
async fn test_work_error_is_returned_unchanged() {
    let manager = TxManager::new(MemoryStore::new());
    let things = manager.store().collection(TEST_COLLECTION);
    let m = &manager;

    let result: Result<(), AppError> = manager
        .run_tx(&bg(), |ctx| async move {
            m.set_with_tx(&ctx, &things.doc("1"), num(1), SetOptions::Overwrite).await?;
            Err::<(), AppError>(AppError::Rejected("business rule"))
        })
        .await;

    assert_eq!(result, Err(AppError::Rejected("business rule")));
    assert!(manager.store().is_empty());
}

// ============================================================================
// 4. Commit failures replace success
// ============================================================================

#[tokio::test]
async fn test_commit_failure_is_returned() {
    let manager = TxManager::new(MemoryStore::new());
    let things = manager.store().collection(TEST_COLLECTION);
    let m = &manager;
    let refs = things.clone();

    let result = manager
        .run_tx(&bg(), |ctx| async move {
            m.create_with_tx(&ctx, &refs.doc("a"), num(1)).await?;
            m.set_with_tx(&ctx, &refs.doc("b"), num(2), SetOptions::Overwrite).await?;
            // Someone else creates "a" before this transaction commits.
            m.store().create(&Context::background(), &refs.doc("a"), num(99)).await?;
            Ok::<_, Error>("done")
        })
        .await;

    assert!(matches!(result, Err(Error::AlreadyExists(_))));
    let a = manager.store().get(&bg(), &things.doc("a")).await.unwrap().unwrap();
    assert_eq!(a.data_as::<Num>().unwrap(), Num { num: 99 });
    assert!(manager.store().get(&bg(), &things.doc("b")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_commit_failure_converts_into_caller_error() {
    let manager = TxManager::new(MemoryStore::new());
    let things = manager.store().collection(TEST_COLLECTION);
    manager.store().create(&bg(), &things.doc("a"), num(0)).await.unwrap();
    let m = &manager;

    let result: Result<(), AppError> = manager
        .run_tx(&bg(), |ctx| async move {
            m.create_with_tx(&ctx, &things.doc("a"), num(1)).await?;
            Ok::<(), AppError>(())
        })
        .await;

    assert_eq!(result, Err(AppError::Store("ALREADY_EXISTS")));
}

// ============================================================================
// 5. Work runs exactly once and returns its value
// ============================================================================

#[tokio::test]
async fn test_work_runs_once() {
    let manager = TxManager::new(MemoryStore::new());
    let calls = AtomicUsize::new(0);
    let counter = &calls;

    let value = manager
        .run_tx(&bg(), |_ctx| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(42)
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.store().stats().begins, 1);
}

// ============================================================================
// 6. Handle scoping
// ============================================================================

#[tokio::test]
async fn test_nested_run_tx_is_rejected() {
    let manager = TxManager::new(MemoryStore::new());
    let things = manager.store().collection(TEST_COLLECTION);
    let m = &manager;
    let refs = things.clone();

    let result = manager
        .run_tx(&bg(), |outer| async move {
            m.set_with_tx(&outer, &refs.doc("outer"), num(1), SetOptions::Overwrite).await?;
            let nested = m
                .run_tx(&outer, |inner| async move {
                    m.set_with_tx(&inner, &refs.doc("inner"), num(2), SetOptions::Overwrite)
                        .await
                })
                .await;
            assert!(matches!(nested, Err(Error::NestedTx)), "got {nested:?}");
            assert!(get_tx::<MemoryTx>(&outer).unwrap().is_active());
            nested
        })
        .await;

    assert!(matches!(result, Err(Error::NestedTx)));
    assert!(manager.store().is_empty(), "outer work rolled back, nothing leaked");
    assert_eq!(manager.store().stats().begins, 1);
    assert!(get_tx::<MemoryTx>(&bg()).is_none());
}

#[tokio::test]
async fn test_handle_is_closed_after_run_tx() {
    let manager = TxManager::new(MemoryStore::new());
    let things = manager.store().collection(TEST_COLLECTION);

    let leaked = manager
        .run_tx(&bg(), |ctx| async move { Ok::<_, Error>(get_tx::<MemoryTx>(&ctx).unwrap()) })
        .await
        .unwrap();

    assert!(!leaked.is_active());
    let err = leaked.set(&things.doc("late"), num(1), SetOptions::Overwrite).unwrap_err();
    assert!(matches!(err, Error::TxClosed(_)));
    assert!(manager.store().is_empty());
}

// ============================================================================
// 7. Options and cancellation
// ============================================================================

#[tokio::test]
async fn test_read_only_transaction_rejects_writes() {
    let manager = TxManager::new(MemoryStore::new());
    let things = manager.store().collection(TEST_COLLECTION);
    let m = &manager;

    let result = manager
        .run_tx_with(&bg(), TxOptions::read_only(), |ctx| async move {
            m.get_with_tx(&ctx, &things.doc("1")).await?;
            m.set_with_tx(&ctx, &things.doc("1"), num(1), SetOptions::Overwrite).await
        })
        .await;

    assert!(matches!(result, Err(Error::ReadOnlyTx(_))));
    assert!(manager.store().is_empty());
}

#[tokio::test]
async fn test_expired_context_never_runs_work() {
    let manager = TxManager::new(MemoryStore::new());
    let expired = bg().with_deadline(Instant::now());
    let ran = AtomicBool::new(false);
    let flag = &ran;

    let result = manager
        .run_tx(&expired, |_ctx| async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, Error>(())
        })
        .await;

    assert!(matches!(result, Err(Error::DeadlineExceeded)));
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(manager.store().stats().begins, 0);
}

// ============================================================================
// 8. Concurrent transactions are independent
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transactions() {
    let manager = TxManager::new(MemoryStore::new());
    let mut handles = Vec::new();

    for i in 0..8i64 {
        let m = manager.clone();
        handles.push(tokio::spawn(async move {
            let things = m.store().collection(TEST_COLLECTION);
            let inner = m.clone();
            m.run_tx(&Context::background(), |ctx| async move {
                let id = get_tx::<MemoryTx>(&ctx).unwrap().id();
                inner
                    .set_with_tx(&ctx, &things.doc(i.to_string()), num(i), SetOptions::Overwrite)
                    .await?;
                Ok::<_, Error>(id)
            })
            .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    ids.sort_by_key(|id| id.0);
    ids.dedup();
    assert_eq!(ids.len(), 8, "every run_tx gets its own handle");
    assert_eq!(manager.store().len(), 8);
    assert_eq!(manager.store().stats().commits, 8);
}

#[tokio::test]
async fn test_commit_fields_macro_data() {
    let manager = TxManager::new(MemoryStore::new());
    let things = manager.store().collection(TEST_COLLECTION);
    let m = &manager;
    let refs = things.clone();

    manager
        .run_tx(&bg(), |ctx| async move {
            m.set_with_tx(&ctx, &refs.doc("x"), fields! { "num" => 7 }, SetOptions::Overwrite).await
        })
        .await
        .unwrap();

    let docs = manager.store().documents(&things);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].data_as::<Num>().unwrap(), Num { num: 7 });
}

// ============================================================================
// 9. Shared stores
// ============================================================================

#[tokio::test]
async fn test_manager_shares_store_from_arc() {
    let store = Arc::new(MemoryStore::new());
    let manager = TxManager::from_arc(store.clone());
    let things = store.collection(TEST_COLLECTION);
    let m = &manager;
    let refs = things.clone();

    manager
        .run_tx(&bg(), |ctx| async move {
            m.create_with_tx(&ctx, &refs.doc("1"), num(1)).await
        })
        .await
        .unwrap();

    let doc = store.get(&bg(), &things.doc("1")).await.unwrap().unwrap();
    assert_eq!(doc.data_as::<Num>().unwrap(), Num { num: 1 });
    assert_eq!(store.stats().commits, 1);
}

#[tokio::test]
async fn test_manager_over_arc_store() {
    let store = Arc::new(MemoryStore::new());
    let manager: TxManager<Arc<MemoryStore>> = TxManager::new(store.clone());
    let things = manager.store().collection(TEST_COLLECTION);
    let m = &manager;
    let refs = things.clone();

    let result = manager
        .run_tx(&bg(), |ctx| async move {
            assert!(get_tx::<MemoryTx>(&ctx).is_some());
            m.set_with_tx(&ctx, &refs.doc("1"), num(1), SetOptions::Overwrite).await?;
            m.delete_with_tx(&ctx, &refs.doc("2"), &[]).await?;
            m.update_with_tx(&ctx, &refs.doc("1"), vec![FieldUpdate::set("num", 5)], &[])
                .await?;
            Ok::<_, Error>(())
        })
        .await;
    result.unwrap();

    manager.store().create(&bg(), &things.doc("3"), num(3)).await.unwrap();
    let one = manager.store().get(&bg(), &things.doc("1")).await.unwrap().unwrap();
    assert_eq!(one.data_as::<Num>().unwrap(), Num { num: 5 });
    assert_eq!(store.len(), 2);
    assert_eq!(manager.store().config(), store.config());

    let failed = manager
        .run_tx(&bg(), |ctx| async move {
            m.create_with_tx(&ctx, &things.doc("3"), num(0)).await?;
            Err::<(), Error>(Error::InvalidArgument("stop".into()))
        })
        .await;
    assert!(matches!(failed, Err(Error::InvalidArgument(_))));
    assert_eq!(store.stats().rollbacks, 1);
}
