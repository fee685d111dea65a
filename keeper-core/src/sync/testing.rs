//! In-process [`Remote`] used by the unit tests.

use crate::sync::models::{ItemOutcome, SecretKind, SyncAck, SyncBatch};
use crate::sync::remote::Remote;
use crate::{KeeperError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Hook = Box<dyn FnMut() + Send>;

#[derive(Default)]
pub(crate) struct FakeRemote {
    batches: Mutex<Vec<SyncBatch>>,
    failing_kinds: Mutex<HashSet<SecretKind>>,
    rejected_items: Mutex<HashSet<i64>>,
    hook: Mutex<Option<Hook>>,
    delay: Mutex<Option<Duration>>,
    truncate: AtomicBool,
    offline: AtomicBool,
    auth_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRemote {
    pub fn batches(&self) -> Vec<SyncBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn fail_kind(&self, kind: SecretKind) {
        self.failing_kinds.lock().unwrap().insert(kind);
    }

    pub fn reject_item(&self, id: i64) {
        self.rejected_items.lock().unwrap().insert(id);
    }

    pub fn during_replicate(&self, hook: impl FnMut() + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn truncate_acks(&self) {
        self.truncate.store(true, Ordering::SeqCst);
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(KeeperError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Remote for FakeRemote {
    async fn register(&self, login: &str, _password: &str) -> Result<i64> {
        self.check_online()?;
        if login == "taken" {
            return Err(KeeperError::AlreadyExists(login.to_string()));
        }
        Ok(1)
    }

    async fn authenticate(&self, login: &str, password: &str) -> Result<String> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        if password == "bad" {
            return Err(KeeperError::Unauthenticated("wrong password".to_string()));
        }
        Ok(format!("token-{}-{}", login, self.auth_calls()))
    }

    async fn health(&self) -> Result<()> {
        self.check_online()
    }

    async fn replicate(&self, batch: &SyncBatch) -> Result<SyncAck> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(hook) = self.hook.lock().unwrap().as_mut() {
            hook();
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.check_online()?;
        self.batches.lock().unwrap().push(batch.clone());

        if self.failing_kinds.lock().unwrap().contains(&batch.kind()) {
            return Err(KeeperError::Transport("server error 500".to_string()));
        }

        let rejected = self.rejected_items.lock().unwrap().clone();
        let mut results: Vec<ItemOutcome> = batch
            .item_ids()
            .into_iter()
            .map(|id| ItemOutcome {
                id,
                applied: !rejected.contains(&id),
                error: rejected.contains(&id).then(|| "rejected".to_string()),
            })
            .collect();
        if self.truncate.load(Ordering::SeqCst) {
            results.pop();
        }

        Ok(SyncAck {
            message: "completed".to_string(),
            results,
        })
    }
}
