//! Vault coordinator: lock decisions on the caller's thread, storage I/O on
//! the blocking pool.
//!
//! Every public operation decides synchronously whether it may proceed. When
//! it may, the lock table is updated immediately and the I/O is handed to a
//! blocking worker; the caller gets a [`Pending`] result. Workers never touch
//! the lock table. They report back through a completion channel which the
//! owner drains with [`VaultCoordinator::poll_completions`] or
//! [`VaultCoordinator::process_next`]. Completion handling releases the lock
//! before resolving the caller's result.

use crate::codec::ItemCodec;
use crate::core::config::VaultConfig;
use crate::core::error::{BackendError, Error, Result};
use crate::storage::{DeleteOutcome, SharedBackend};
use crate::system::metrics;
use crate::types::{VaultKey, VaultRecord};
use crate::vault::lock::{LockTable, LockToken};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Result of an operation whose I/O is still running.
///
/// Resolves once the coordinator has processed the operation's completion.
#[must_use = "a pending vault result does nothing unless awaited or polled"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    fn channel() -> (oneshot::Sender<Result<T>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Take the result without waiting, for hosts that poll once per tick
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(abandoned())),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(abandoned())))
    }
}

fn abandoned() -> Error {
    Error::internal("vault coordinator dropped the operation before it completed")
}

/// Finished worker job, carried back to the control thread
pub(crate) enum Completion {
    Opened {
        key: VaultKey,
        token: LockToken,
        result: Result<VaultRecord>,
        reply: oneshot::Sender<Result<VaultRecord>>,
        started: Instant,
    },
    Saved {
        key: VaultKey,
        token: LockToken,
        result: Result<()>,
        reply: oneshot::Sender<Result<()>>,
        started: Instant,
    },
    Deleted {
        key: VaultKey,
        token: LockToken,
        result: Result<()>,
        reply: oneshot::Sender<Result<()>>,
        started: Instant,
    },
}

/// Owns the lock table and dispatches vault I/O.
///
/// Not `Sync`-shared: exactly one owner (a game loop or a
/// [`VaultService`](crate::vault::VaultService) task) drives it.
pub struct VaultCoordinator {
    backend: SharedBackend,
    codec: ItemCodec,
    config: VaultConfig,
    locks: LockTable,
    runtime: Handle,
    completion_tx: flume::Sender<Completion>,
    completion_rx: flume::Receiver<Completion>,
    in_flight: usize,
}

impl VaultCoordinator {
    /// Create a coordinator dispatching onto the current tokio runtime
    pub fn new(backend: SharedBackend, codec: ItemCodec, config: &VaultConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::internal(format!("vault coordinator needs a tokio runtime: {}", e)))?;
        Ok(Self::with_runtime(backend, codec, config, runtime))
    }

    /// Create a coordinator dispatching onto `runtime`
    pub fn with_runtime(
        backend: SharedBackend,
        codec: ItemCodec,
        config: &VaultConfig,
        runtime: Handle,
    ) -> Self {
        let (completion_tx, completion_rx) = flume::unbounded();
        tracing::debug!(backend = backend.name(), lease = ?config.lease(), "vault coordinator created");
        Self {
            backend,
            codec,
            config: config.clone(),
            locks: LockTable::with_lease(config.lease()),
            runtime,
            completion_tx,
            completion_rx,
            in_flight: 0,
        }
    }

    /// Lock `key` for `requester` and load its contents.
    ///
    /// Fails with `Busy` if the vault is in use. The lock stays held after the
    /// record is delivered; it is given up by `save` or `release`. `viewer`
    /// defaults to the vault owner.
    pub fn open(
        &mut self,
        requester: &str,
        key: VaultKey,
        viewer: Option<&str>,
    ) -> Result<Pending<VaultRecord>> {
        let token = LockToken::new(requester);
        self.acquire(&key, token.clone())?;

        let viewer = viewer.unwrap_or(key.player()).to_string();
        let title = self.config.title_for(key.number());
        let capacity = self.config.capacity;
        let backend = self.backend.clone();
        let codec = self.codec;
        let (reply, pending) = Pending::channel();

        tracing::debug!(key = %key, requester, "opening vault");
        self.dispatch(move || {
            let started = Instant::now();
            let record = VaultRecord::new(key.clone(), capacity)
                .with_viewer(viewer)
                .with_title(title)
                .with_lock(token.clone());
            let result = load_record(backend.as_ref(), &codec, record);
            Completion::Opened { key, token, result, reply, started }
        });
        Ok(pending)
    }

    /// Persist `record` and give up its lock.
    ///
    /// The record must carry the token of the current holder, otherwise the
    /// call fails with `NotHeld` and nothing changes. The lock is released
    /// once the write finishes, whether or not it succeeded.
    pub fn save(&mut self, record: &VaultRecord) -> Result<Pending<()>> {
        let key = record.key().clone();
        let save_token = LockToken::save();
        let held = record
            .lock_token()
            .map_or(false, |token| self.locks.reassert(&key, token, save_token.clone()));
        if !held {
            if let Some(metrics) = metrics::global() {
                metrics.not_held_rejections.inc();
            }
            return Err(Error::NotHeld { key });
        }

        let contents = record.contents();
        let backend = self.backend.clone();
        let codec = self.codec;
        let (reply, pending) = Pending::channel();

        tracing::debug!(key = %key, slots = contents.len(), "saving vault");
        self.dispatch(move || {
            let started = Instant::now();
            let result = codec
                .encode(&contents)
                .map_err(Error::from)
                .and_then(|bytes| backend.write(&key, &bytes).map_err(Error::from));
            Completion::Saved { key, token: save_token, result, reply, started }
        });
        Ok(pending)
    }

    /// Remove a vault from storage.
    ///
    /// Fails with `Busy` if the vault is in use; resolves to `NotFound` if
    /// nothing was stored.
    pub fn delete(&mut self, key: VaultKey) -> Result<Pending<()>> {
        let token = LockToken::delete();
        self.acquire(&key, token.clone())?;

        let backend = self.backend.clone();
        let (reply, pending) = Pending::channel();

        tracing::debug!(key = %key, "deleting vault");
        self.dispatch(move || {
            let started = Instant::now();
            let result = match backend.delete(&key) {
                Ok(DeleteOutcome::Deleted) => Ok(()),
                Ok(DeleteOutcome::NotFound) => Err(Error::NotFound(key.clone())),
                Err(e) => Err(e.into()),
            };
            Completion::Deleted { key, token, result, reply, started }
        });
        Ok(pending)
    }

    /// Give up the lock on `key` without saving.
    ///
    /// Only releases when `expected` is the current holder; returns whether
    /// anything was released.
    pub fn release(&mut self, key: &VaultKey, expected: &LockToken) -> bool {
        let released = self.locks.release(key, expected);
        if released {
            tracing::debug!(key = %key, holder = %expected, "vault released");
            self.update_lock_gauge();
        }
        released
    }

    /// Current holder of `key`
    pub fn holder(&self, key: &VaultKey) -> Option<&LockToken> {
        self.locks.holder(key)
    }

    /// True if `key` is locked
    pub fn is_locked(&self, key: &VaultKey) -> bool {
        self.locks.is_locked(key)
    }

    /// Number of locked vaults
    pub fn locked_count(&self) -> usize {
        self.locks.len()
    }

    /// Operations dispatched but not yet completed
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Backend this coordinator writes to
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Handle every completion that is already available, without waiting.
    ///
    /// Returns the number handled.
    pub fn poll_completions(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.complete(completion);
            handled += 1;
        }
        handled
    }

    /// Wait for and handle one completion.
    ///
    /// Returns `false` immediately if nothing is in flight.
    pub async fn process_next(&mut self) -> bool {
        if self.in_flight == 0 {
            return false;
        }
        match self.completion_rx.recv_async().await {
            Ok(completion) => {
                self.complete(completion);
                true
            }
            Err(_) => false,
        }
    }

    /// Wait until nothing is in flight
    pub async fn drain(&mut self) {
        while self.process_next().await {}
    }

    pub(crate) fn completions(&self) -> flume::Receiver<Completion> {
        self.completion_rx.clone()
    }

    fn acquire(&mut self, key: &VaultKey, token: LockToken) -> Result<()> {
        if self.locks.try_acquire(key, token) {
            self.update_lock_gauge();
            return Ok(());
        }
        let holder = self
            .locks
            .holder(key)
            .map(|token| token.holder().to_string())
            .unwrap_or_default();
        tracing::debug!(key = %key, holder = %holder, "vault busy");
        if let Some(metrics) = metrics::global() {
            metrics.busy_rejections.inc();
        }
        Err(Error::Busy { key: key.clone(), holder })
    }

    fn dispatch<F>(&mut self, job: F)
    where
        F: FnOnce() -> Completion + Send + 'static,
    {
        let completions = self.completion_tx.clone();
        self.in_flight += 1;
        if let Some(metrics) = metrics::global() {
            metrics.in_flight.inc();
        }
        self.runtime.spawn_blocking(move || {
            // the receiver lives in the coordinator; if it is gone nobody waits
            let _ = completions.send(job());
        });
    }

    pub(crate) fn complete(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if let Some(metrics) = metrics::global() {
            metrics.in_flight.dec();
        }

        match completion {
            Completion::Opened { key, token, result, reply, started } => {
                observe("open", started, &result);
                if let Err(e) = &result {
                    tracing::error!(key = %key, error = %e, "failed to load vault");
                    self.release_after(&key, &token);
                }
                // a dropped receiver means nobody will ever save or release
                if let Err(Ok(_)) = reply.send(result) {
                    tracing::debug!(key = %key, "open abandoned by caller, releasing lock");
                    self.release_after(&key, &token);
                }
            }
            Completion::Saved { key, token, result, reply, started } => {
                observe("save", started, &result);
                match &result {
                    Ok(()) => tracing::debug!(key = %key, "vault saved"),
                    Err(e) => tracing::error!(key = %key, error = %e, "failed to save vault"),
                }
                self.release_after(&key, &token);
                let _ = reply.send(result);
            }
            Completion::Deleted { key, token, result, reply, started } => {
                observe("delete", started, &result);
                match &result {
                    Ok(()) => tracing::info!(key = %key, "vault deleted"),
                    Err(Error::NotFound(_)) => tracing::debug!(key = %key, "no vault to delete"),
                    Err(e) => tracing::error!(key = %key, error = %e, "failed to delete vault"),
                }
                self.release_after(&key, &token);
                let _ = reply.send(result);
            }
        }
    }

    fn release_after(&mut self, key: &VaultKey, token: &LockToken) {
        if !self.locks.release(key, token) {
            tracing::warn!(key = %key, holder = %token, "lock was taken over before the operation completed");
        }
        self.update_lock_gauge();
    }

    fn update_lock_gauge(&self) {
        if let Some(metrics) = metrics::global() {
            metrics.locks_held.set(self.locks.len() as i64);
        }
    }
}

fn load_record(
    backend: &dyn crate::storage::VaultBackend,
    codec: &ItemCodec,
    mut record: VaultRecord,
) -> Result<VaultRecord> {
    let bytes = match backend.read(record.key()) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Ok(record),
        Err(BackendError::Corrupt(e)) => {
            tracing::warn!(key = %record.key(), error = %e, "stored vault is unreadable, opening it empty");
            return Ok(record);
        }
        Err(e) => return Err(e.into()),
    };
    match codec.decode(&bytes) {
        Ok(slots) => {
            let dropped = record.load(slots);
            if dropped > 0 {
                tracing::warn!(key = %record.key(), dropped, "dropped slots outside the vault");
            }
        }
        Err(e) => {
            tracing::warn!(key = %record.key(), error = %e, "stored vault is unreadable, opening it empty");
        }
    }
    Ok(record)
}

fn observe<T>(operation: &'static str, started: Instant, result: &Result<T>) {
    let Some(metrics) = metrics::global() else {
        return;
    };
    let outcome = match result {
        Ok(_) => "ok",
        Err(Error::NotFound(_)) => "not_found",
        Err(_) => "error",
    };
    metrics
        .operations
        .with_label_values(&[operation, outcome])
        .inc();
    metrics
        .operation_duration
        .with_label_values(&[operation])
        .observe(started.elapsed().as_secs_f64());
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DocumentFormat, DocumentStore, MemoryStore, VaultBackend};
    use crate::types::ItemSlot;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn key(player: &str, number: u32) -> VaultKey {
        VaultKey::new(player, number).unwrap()
    }

    fn coordinator_with(backend: SharedBackend) -> VaultCoordinator {
        VaultCoordinator::new(backend, ItemCodec::default(), &VaultConfig::default()).unwrap()
    }

    async fn settle<T>(coordinator: &mut VaultCoordinator, pending: Pending<T>) -> Result<T> {
        assert!(coordinator.process_next().await);
        pending.await
    }

    async fn open_now(
        coordinator: &mut VaultCoordinator,
        requester: &str,
        key: VaultKey,
        viewer: Option<&str>,
    ) -> Result<VaultRecord> {
        let pending = coordinator.open(requester, key, viewer)?;
        settle(coordinator, pending).await
    }

    async fn save_now(coordinator: &mut VaultCoordinator, record: &VaultRecord) -> Result<()> {
        let pending = coordinator.save(record)?;
        settle(coordinator, pending).await
    }

    async fn delete_now(coordinator: &mut VaultCoordinator, key: VaultKey) -> Result<()> {
        let pending = coordinator.delete(key)?;
        settle(coordinator, pending).await
    }

    /// Backend whose calls fail while `failing` is set
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> std::result::Result<(), BackendError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire").into());
            }
            Ok(())
        }
    }

    impl VaultBackend for FlakyStore {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn read(&self, key: &VaultKey) -> std::result::Result<Option<Vec<u8>>, BackendError> {
            self.check()?;
            self.inner.read(key)
        }

        fn write(&self, key: &VaultKey, contents: &[u8]) -> std::result::Result<(), BackendError> {
            self.check()?;
            self.inner.write(key, contents)
        }

        fn delete(&self, key: &VaultKey) -> std::result::Result<DeleteOutcome, BackendError> {
            self.check()?;
            self.inner.delete(key)
        }
    }

    #[test]
    fn test_new_requires_runtime() {
        let backend: SharedBackend = Arc::new(MemoryStore::new());
        let result = VaultCoordinator::new(backend, ItemCodec::default(), &VaultConfig::default());
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_open_missing_vault_is_empty_and_stays_locked() {
        let mut coordinator = coordinator_with(Arc::new(MemoryStore::new()));
        let pending = coordinator.open("alice", key("alice", 1), None).unwrap();
        assert!(coordinator.is_locked(&key("alice", 1)));
        assert_eq!(coordinator.in_flight(), 1);

        let record = settle(&mut coordinator, pending).await.unwrap();
        assert!(record.is_empty());
        assert_eq!(record.viewer(), "alice");
        assert_eq!(record.title(), "Vault #1");
        assert_eq!(record.capacity(), 54);
        assert_eq!(coordinator.in_flight(), 0);
        assert_eq!(coordinator.holder(&key("alice", 1)), record.lock_token());
    }

    #[tokio::test]
    async fn test_alice_saves_and_reopens() {
        let mut coordinator = coordinator_with(Arc::new(MemoryStore::new()));
        let mut record = open_now(&mut coordinator, "alice", key("alice", 1), None)
            .await
            .unwrap();
        record.set(ItemSlot::new(0, 1, 0, 64)).unwrap();
        record
            .set(ItemSlot::new(8, 276, 12, 1).with_aux_tag(vec![1, 2, 3]))
            .unwrap();

        let pending = coordinator.save(&record).unwrap();
        assert_eq!(
            coordinator.holder(&key("alice", 1)).map(LockToken::holder),
            Some(crate::vault::SAVE_HOLDER)
        );
        settle(&mut coordinator, pending).await.unwrap();
        assert!(!coordinator.is_locked(&key("alice", 1)));

        let reopened = open_now(&mut coordinator, "alice", key("alice", 1), None)
            .await
            .unwrap();
        assert_eq!(reopened.contents(), record.contents());
    }

    #[tokio::test]
    async fn test_bob_is_busy_while_alice_holds_vault() {
        let mut coordinator = coordinator_with(Arc::new(MemoryStore::new()));
        let record = open_now(&mut coordinator, "alice", key("alice", 1), None)
            .await
            .unwrap();

        match coordinator.open("bob", key("alice", 1), Some("bob")) {
            Err(Error::Busy { holder, .. }) => assert_eq!(holder, "alice"),
            Err(e) => panic!("expected busy, got {}", e),
            Ok(_) => panic!("expected busy, got a pending open"),
        }
        assert!(matches!(coordinator.delete(key("alice", 1)), Err(Error::Busy { .. })));
        assert_eq!(coordinator.in_flight(), 0);

        // releasing with a foreign token is a no-op
        assert!(!coordinator.release(&key("alice", 1), &LockToken::new("alice")));
        assert!(coordinator.release(&key("alice", 1), record.lock_token().unwrap()));

        let viewed = open_now(&mut coordinator, "bob", key("alice", 1), Some("bob"))
            .await
            .unwrap();
        assert_eq!(viewed.viewer(), "bob");
        assert_eq!(viewed.key().player(), "alice");
    }

    #[tokio::test]
    async fn test_save_with_stale_record_is_not_held() {
        let mut coordinator = coordinator_with(Arc::new(MemoryStore::new()));
        let record = open_now(&mut coordinator, "alice", key("alice", 1), None)
            .await
            .unwrap();
        save_now(&mut coordinator, &record).await.unwrap();

        // the lock is gone, so the same record cannot be saved again
        assert!(matches!(coordinator.save(&record), Err(Error::NotHeld { .. })));

        let unlocked = VaultRecord::new(key("alice", 2), 54);
        assert!(matches!(coordinator.save(&unlocked), Err(Error::NotHeld { .. })));
        assert_eq!(coordinator.locked_count(), 0);
    }

    #[tokio::test]
    async fn test_sequential_saves_last_writer_wins() {
        let mut coordinator = coordinator_with(Arc::new(MemoryStore::new()));
        for count in [1u8, 2] {
            let mut record = open_now(&mut coordinator, "alice", key("alice", 3), None)
                .await
                .unwrap();
            record.set(ItemSlot::new(0, 1, 0, count)).unwrap();
            save_now(&mut coordinator, &record).await.unwrap();
        }

        let record = open_now(&mut coordinator, "alice", key("alice", 3), None)
            .await
            .unwrap();
        assert_eq!(record.get(0).map(|item| item.count), Some(2));
    }

    #[tokio::test]
    async fn test_delete_never_saved_is_not_found_twice() {
        let mut coordinator = coordinator_with(Arc::new(MemoryStore::new()));
        for _ in 0..2 {
            let result = delete_now(&mut coordinator, key("carol", 4)).await;
            assert!(matches!(result, Err(Error::NotFound(_))));
            assert!(!coordinator.is_locked(&key("carol", 4)));
        }
    }

    #[tokio::test]
    async fn test_delete_removes_saved_vault() {
        let store = Arc::new(MemoryStore::new());
        let mut coordinator = coordinator_with(store.clone());
        let mut record = open_now(&mut coordinator, "dave", key("dave", 1), None)
            .await
            .unwrap();
        record.set(ItemSlot::new(3, 5, 0, 1)).unwrap();
        save_now(&mut coordinator, &record).await.unwrap();
        assert_eq!(store.len(), 1);

        delete_now(&mut coordinator, key("dave", 1)).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_open_releases_lock() {
        let store = Arc::new(FlakyStore::default());
        store.failing.store(true, Ordering::SeqCst);
        let mut coordinator = coordinator_with(store.clone());

        let result = open_now(&mut coordinator, "alice", key("alice", 1), None).await;
        assert!(matches!(result, Err(Error::Backend(_))));
        assert!(!coordinator.is_locked(&key("alice", 1)));
    }

    #[tokio::test]
    async fn test_failed_save_still_releases_lock() {
        let store = Arc::new(FlakyStore::default());
        let mut coordinator = coordinator_with(store.clone());
        let record = open_now(&mut coordinator, "alice", key("alice", 1), None)
            .await
            .unwrap();

        store.failing.store(true, Ordering::SeqCst);
        let err = save_now(&mut coordinator, &record).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!coordinator.is_locked(&key("alice", 1)));
    }

    #[tokio::test]
    async fn test_corrupt_contents_open_empty() {
        let store = Arc::new(MemoryStore::new());
        store.write(&key("erin", 1), b"\x78garbage").unwrap();
        let mut coordinator = coordinator_with(store);

        let record = open_now(&mut coordinator, "erin", key("erin", 1), None)
            .await
            .unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_base64_in_document_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DocumentStore::open(dir.path(), DocumentFormat::Json).unwrap());
        std::fs::write(store.path_for("alice"), r#"{"1":"!!!not base64!!!"}"#).unwrap();
        let mut coordinator = coordinator_with(store.clone());

        let mut record = open_now(&mut coordinator, "alice", key("alice", 1), None)
            .await
            .unwrap();
        assert!(record.is_empty());
        assert_eq!(coordinator.holder(&key("alice", 1)), record.lock_token());

        // saving replaces the damaged entry
        record.set(ItemSlot::new(0, 1, 0, 1)).unwrap();
        save_now(&mut coordinator, &record).await.unwrap();
        assert!(store.read(&key("alice", 1)).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_abandoned_open_releases_lock() {
        let mut coordinator = coordinator_with(Arc::new(MemoryStore::new()));
        let pending = coordinator.open("alice", key("alice", 1), None).unwrap();
        drop(pending);
        assert!(coordinator.is_locked(&key("alice", 1)));

        assert!(coordinator.process_next().await);
        assert!(!coordinator.is_locked(&key("alice", 1)));
        assert_eq!(coordinator.locked_count(), 0);

        // the vault is usable again right away
        open_now(&mut coordinator, "bob", key("alice", 1), Some("bob"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_taken_over() {
        let config = VaultConfig {
            lock_lease: Duration::from_millis(20),
            ..Default::default()
        };
        let mut coordinator =
            VaultCoordinator::new(Arc::new(MemoryStore::new()), ItemCodec::default(), &config)
                .unwrap();
        let stale = open_now(&mut coordinator, "alice", key("alice", 1), None)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        let fresh = open_now(&mut coordinator, "bob", key("alice", 1), Some("bob"))
            .await
            .unwrap();

        assert!(matches!(coordinator.save(&stale), Err(Error::NotHeld { .. })));
        assert!(!coordinator.release(&key("alice", 1), stale.lock_token().unwrap()));
        assert_eq!(coordinator.holder(&key("alice", 1)), fresh.lock_token());
    }

    #[tokio::test]
    async fn test_poll_completions_for_tick_driven_hosts() {
        let mut coordinator = coordinator_with(Arc::new(MemoryStore::new()));
        let mut pending = coordinator.open("alice", key("alice", 1), None).unwrap();
        assert!(pending.try_take().is_none());

        let mut handled = 0;
        while handled == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
            handled = coordinator.poll_completions();
        }
        assert_eq!(handled, 1);
        assert!(pending.try_take().unwrap().is_ok());
        assert!(!coordinator.process_next().await);
    }
}
