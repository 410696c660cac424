//! Keylock Locker Tests
//!
//! Lock protocol properties checked against every backend through the
//! `Locker` trait. The remote backend runs on `MemoryAtomicStore`, so these
//! tests need no external services.

use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use keylock::{
    AtomicStore, BackendKind, Context, LocalLocker, LockError, LockManager, LockManagerConfig,
    Locker, MemoryAtomicStore, StoreError,
};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn managers(ttl: Duration) -> Vec<(&'static str, LockManager)> {
    init_tracing();
    let store: Arc<dyn AtomicStore> = Arc::new(MemoryAtomicStore::new());
    vec![
        ("local", LockManager::local(ttl)),
        ("remote", LockManager::remote(store, ttl)),
    ]
}

// ============== Protocol Properties ==============

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_mutual_exclusion_under_contention() {
    for (backend, manager) in managers(Duration::from_secs(5)) {
        let num = 100;
        let lockers: Vec<Arc<dyn Locker>> =
            (0..num).map(|_| manager.new_locker("contended")).collect();

        let handles: Vec<_> = lockers
            .into_iter()
            .map(|locker| {
                tokio::spawn(async move { locker.acquire(&Context::background()).await })
            })
            .collect();

        let mut acquired = 0;
        let mut not_acquired = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => acquired += 1,
                Err(LockError::NotAcquired) => not_acquired += 1,
                Err(e) => panic!("{backend}: unexpected error: {e}"),
            }
        }
        assert_eq!(acquired, 1, "{backend}: exactly one acquire must win");
        assert_eq!(not_acquired, num - 1, "{backend}");
    }
}

#[tokio::test]
async fn test_ttl_reacquisition() {
    for (backend, manager) in managers(Duration::from_millis(100)) {
        let ctx = Context::background();
        let locker = manager.new_locker("ttl");

        locker.acquire(&ctx).await.unwrap();
        assert!(
            matches!(locker.acquire(&ctx).await, Err(LockError::NotAcquired)),
            "{backend}: second acquire before ttl must fail"
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        locker
            .acquire(&ctx)
            .await
            .unwrap_or_else(|e| panic!("{backend}: acquire after ttl failed: {e}"));
    }
}

#[tokio::test]
async fn test_release_without_acquire() {
    for (backend, manager) in managers(Duration::from_secs(5)) {
        let locker = manager.new_locker("never-acquired");
        assert!(
            matches!(
                locker.release(&Context::background()).await,
                Err(LockError::LockNotHeld)
            ),
            "{backend}"
        );
    }
}

#[tokio::test]
async fn test_acquire_release_acquire() {
    for (backend, manager) in managers(Duration::from_secs(5)) {
        let ctx = Context::background();
        let locker = manager.new_locker("round-trip");

        for _ in 0..3 {
            locker
                .acquire(&ctx)
                .await
                .unwrap_or_else(|e| panic!("{backend}: {e}"));
            locker
                .release(&ctx)
                .await
                .unwrap_or_else(|e| panic!("{backend}: {e}"));
        }
    }
}

#[tokio::test]
async fn test_repeated_release_is_not_held() {
    for (backend, manager) in managers(Duration::from_secs(5)) {
        let ctx = Context::background();
        let locker = manager.new_locker("released");

        locker.acquire(&ctx).await.unwrap();
        locker.release(&ctx).await.unwrap();
        for _ in 0..5 {
            let err = locker.release(&ctx).await.unwrap_err();
            assert!(matches!(err, LockError::LockNotHeld), "{backend}: {err}");
        }
    }
}

#[tokio::test]
async fn test_ownership_stays_with_acquiring_handle() {
    for (backend, manager) in managers(Duration::from_secs(5)) {
        let ctx = Context::background();
        let holder = manager.new_locker("owned");
        let other = manager.new_locker("owned");

        holder.acquire(&ctx).await.unwrap();
        let err = other.release(&ctx).await.unwrap_err();
        assert!(matches!(err, LockError::LockNotHeld), "{backend}: {err}");
        holder
            .release(&ctx)
            .await
            .unwrap_or_else(|e| panic!("{backend}: {e}"));
    }
}

#[tokio::test]
async fn test_lockers_over_distinct_storages_do_not_exclude() {
    init_tracing();
    let ctx = Context::background();
    let a = LocalLocker::new("x", Duration::from_secs(5));
    let b = LocalLocker::new("x", Duration::from_secs(5));

    a.acquire(&ctx).await.unwrap();
    b.acquire(&ctx).await.unwrap();

    // Separate managers keep separate storages too
    let first = LockManager::local(Duration::from_secs(5));
    let second = LockManager::local(Duration::from_secs(5));
    first.new_locker("x").acquire(&ctx).await.unwrap();
    second.new_locker("x").acquire(&ctx).await.unwrap();
}

// ============== Concrete Scenarios ==============

#[tokio::test]
async fn test_local_scenario() {
    init_tracing();
    let ctx = Context::background();
    let manager = LockManager::local(Duration::from_millis(100));
    let locker = manager.new_locker("instance-01");

    locker.acquire(&ctx).await.unwrap();
    assert!(matches!(
        locker.acquire(&ctx).await,
        Err(LockError::NotAcquired)
    ));
    tokio::time::sleep(Duration::from_millis(200)).await;
    locker.acquire(&ctx).await.unwrap();
}

#[tokio::test]
async fn test_remote_scenario() {
    init_tracing();
    let ctx = Context::background();
    let store: Arc<dyn AtomicStore> = Arc::new(MemoryAtomicStore::new());
    let manager = LockManager::remote(store, Duration::from_secs(100));
    let locker = manager.new_locker("__TEST_LOCK_KEY__");

    locker.acquire(&ctx).await.unwrap();
    assert!(matches!(
        locker.acquire(&ctx).await,
        Err(LockError::NotAcquired)
    ));
    locker.release(&ctx).await.unwrap();
    assert!(matches!(
        locker.release(&ctx).await,
        Err(LockError::LockNotHeld)
    ));
}

// ============== Errors and Configuration ==============

#[tokio::test]
async fn test_deadline_surfaces_as_store_error() {
    init_tracing();
    let store: Arc<dyn AtomicStore> = Arc::new(MemoryAtomicStore::new());
    let manager = LockManager::remote(store, Duration::from_secs(5));
    let locker = manager.new_locker("deadline");

    let ctx = Context::with_timeout(Duration::ZERO);
    let err = locker.acquire(&ctx).await.unwrap_err();
    assert!(matches!(err, LockError::Store(StoreError::DeadlineExceeded)));
    assert!(err.is_infrastructure());
    assert!(!err.is_contention());

    // Nothing was claimed
    locker.acquire(&Context::background()).await.unwrap();
}

#[tokio::test]
async fn test_manager_from_config() -> anyhow::Result<()> {
    init_tracing();
    let config = LockManagerConfig::new(Duration::from_secs(5), BackendKind::Remote)
        .with_key_prefix("jobs:");
    let store = Arc::new(MemoryAtomicStore::new());
    let manager = LockManager::from_config(&config, Some(store.clone() as Arc<dyn AtomicStore>))?;

    let locker = manager.new_locker("nightly");
    assert_eq!(locker.name(), "jobs:nightly");
    locker.acquire(&Context::background()).await?;
    assert!(store.get("jobs:nightly").is_some());
    locker.release(&Context::background()).await?;
    assert!(store.get("jobs:nightly").is_none());
    Ok(())
}
