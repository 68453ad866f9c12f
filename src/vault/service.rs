//! Async front end for hosts without a control loop of their own.
//!
//! [`VaultService`] runs as a tokio task that owns the coordinator, so every
//! lock decision still happens on one logical thread. Callers talk to it
//! through a cloneable [`VaultHandle`].

use crate::core::error::{Error, Result};
use crate::types::{VaultKey, VaultRecord};
use crate::vault::coordinator::{Pending, VaultCoordinator};
use crate::vault::lock::LockToken;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Open {
        requester: String,
        key: VaultKey,
        viewer: Option<String>,
        reply: Reply<Pending<VaultRecord>>,
    },
    Save {
        record: Box<VaultRecord>,
        reply: Reply<Pending<()>>,
    },
    Delete {
        key: VaultKey,
        reply: Reply<Pending<()>>,
    },
    Release {
        key: VaultKey,
        token: LockToken,
        reply: oneshot::Sender<bool>,
    },
    Holder {
        key: VaultKey,
        reply: oneshot::Sender<Option<LockToken>>,
    },
}

/// Task owning a [`VaultCoordinator`]
pub struct VaultService {
    coordinator: VaultCoordinator,
    commands: flume::Receiver<Command>,
}

/// Cloneable handle to a running [`VaultService`].
///
/// Each method returns the coordinator's immediate decision; the outer
/// result carries `Busy`/`NotHeld`, the inner [`Pending`] the I/O outcome:
///
/// ```ignore
/// let record = handle.open("alice", key, None).await?.await?;
/// ```
#[derive(Clone)]
pub struct VaultHandle {
    commands: flume::Sender<Command>,
}

impl VaultService {
    /// Start the service on the current runtime.
    ///
    /// The task exits once every handle is dropped and in-flight work has
    /// completed.
    pub fn spawn(coordinator: VaultCoordinator) -> (VaultHandle, JoinHandle<()>) {
        let (tx, rx) = flume::unbounded();
        let service = Self {
            coordinator,
            commands: rx,
        };
        let task = tokio::spawn(service.run());
        (VaultHandle { commands: tx }, task)
    }

    async fn run(mut self) {
        tracing::info!(backend = self.coordinator.backend_name(), "vault service started");
        let completions = self.coordinator.completions();
        let mut accepting = true;

        loop {
            tokio::select! {
                command = self.commands.recv_async(), if accepting => match command {
                    Ok(command) => self.handle(command),
                    Err(_) => accepting = false,
                },
                completion = completions.recv_async() => {
                    if let Ok(completion) = completion {
                        self.coordinator.complete(completion);
                    }
                }
            }

            if !accepting && self.coordinator.in_flight() == 0 {
                break;
            }
        }

        tracing::info!(
            locked = self.coordinator.locked_count(),
            "vault service stopped"
        );
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Open { requester, key, viewer, reply } => {
                // an undelivered Pending is dropped here, and its completion
                // then gives the lock back
                let _ = reply.send(self.coordinator.open(&requester, key, viewer.as_deref()));
            }
            Command::Save { record, reply } => {
                let _ = reply.send(self.coordinator.save(&record));
            }
            Command::Delete { key, reply } => {
                let _ = reply.send(self.coordinator.delete(key));
            }
            Command::Release { key, token, reply } => {
                let _ = reply.send(self.coordinator.release(&key, &token));
            }
            Command::Holder { key, reply } => {
                let _ = reply.send(self.coordinator.holder(&key).cloned());
            }
        }
    }
}

impl VaultHandle {
    /// See [`VaultCoordinator::open`]
    pub async fn open(
        &self,
        requester: &str,
        key: VaultKey,
        viewer: Option<&str>,
    ) -> Result<Pending<VaultRecord>> {
        self.request(|reply| Command::Open {
            requester: requester.to_string(),
            key,
            viewer: viewer.map(str::to_string),
            reply,
        })
        .await?
    }

    /// See [`VaultCoordinator::save`]
    pub async fn save(&self, record: &VaultRecord) -> Result<Pending<()>> {
        self.request(|reply| Command::Save {
            record: Box::new(record.clone()),
            reply,
        })
        .await?
    }

    /// See [`VaultCoordinator::delete`]
    pub async fn delete(&self, key: VaultKey) -> Result<Pending<()>> {
        self.request(|reply| Command::Delete { key, reply }).await?
    }

    /// See [`VaultCoordinator::release`]
    pub async fn release(&self, key: VaultKey, token: LockToken) -> Result<bool> {
        self.request(|reply| Command::Release { key, token, reply })
            .await
    }

    /// Current holder of `key`
    pub async fn holder(&self, key: VaultKey) -> Result<Option<LockToken>> {
        self.request(|reply| Command::Holder { key, reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send_async(build(tx))
            .await
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())
    }
}

fn stopped() -> Error {
    Error::internal("vault service has stopped")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ItemCodec;
    use crate::core::config::VaultConfig;
    use crate::storage::{MemoryStore, VaultBackend};
    use crate::types::ItemSlot;
    use std::sync::Arc;
    use std::time::Duration;

    fn key(player: &str, number: u32) -> VaultKey {
        VaultKey::new(player, number).unwrap()
    }

    fn spawn_with(store: Arc<MemoryStore>) -> (VaultHandle, JoinHandle<()>) {
        let coordinator =
            VaultCoordinator::new(store, ItemCodec::default(), &VaultConfig::default()).unwrap();
        VaultService::spawn(coordinator)
    }

    async fn wait_unlocked(handle: &VaultHandle, key: VaultKey) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.holder(key.clone()).await.unwrap().is_some() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("lock was never released");
    }

    #[tokio::test]
    async fn test_open_save_round_trip_through_handle() {
        let store = Arc::new(MemoryStore::new());
        let (handle, task) = spawn_with(store.clone());

        let mut record = handle
            .open("alice", key("alice", 1), None)
            .await
            .unwrap()
            .await
            .unwrap();
        record.set(ItemSlot::new(4, 17, 2, 32)).unwrap();

        let other = handle.clone();
        assert!(matches!(
            other.open("bob", key("alice", 1), Some("bob")).await,
            Err(Error::Busy { .. })
        ));

        handle.save(&record).await.unwrap().await.unwrap();
        assert_eq!(handle.holder(key("alice", 1)).await.unwrap(), None);
        assert!(store.get(&key("alice", 1)).is_some());

        drop(handle);
        drop(other);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_release_through_handle() {
        let (handle, _task) = spawn_with(Arc::new(MemoryStore::new()));
        let record = handle
            .open("alice", key("alice", 2), None)
            .await
            .unwrap()
            .await
            .unwrap();
        let token = record.lock_token().cloned().unwrap();

        assert!(!handle.release(key("alice", 2), LockToken::new("alice")).await.unwrap());
        assert_eq!(handle.holder(key("alice", 2)).await.unwrap(), Some(token.clone()));
        assert!(handle.release(key("alice", 2), token).await.unwrap());
        assert!(matches!(
            handle.save(&record).await,
            Err(Error::NotHeld { .. })
        ));
    }

    #[tokio::test]
    async fn test_service_drains_before_exit() {
        let store = Arc::new(MemoryStore::new());
        store.write(&key("bob", 1), &[0x0a]).unwrap();
        let (handle, task) = spawn_with(store.clone());

        let pending = handle.delete(key("bob", 1)).await.unwrap();
        drop(handle);
        task.await.unwrap();

        assert!(pending.await.is_ok());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_pending_open_releases_lock() {
        let (handle, _task) = spawn_with(Arc::new(MemoryStore::new()));
        let pending = handle.open("alice", key("alice", 1), None).await.unwrap();
        drop(pending);

        wait_unlocked(&handle, key("alice", 1)).await;
        assert!(handle
            .open("bob", key("alice", 1), Some("bob"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_open_request_releases_lock() {
        let (handle, _task) = spawn_with(Arc::new(MemoryStore::new()));

        // the caller went away before the service answered
        let (reply, rx) = oneshot::channel();
        drop(rx);
        handle
            .commands
            .send_async(Command::Open {
                requester: "alice".to_string(),
                key: key("alice", 1),
                viewer: None,
                reply,
            })
            .await
            .unwrap();

        wait_unlocked(&handle, key("alice", 1)).await;
    }
}
