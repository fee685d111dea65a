//! Background sync worker.
//!
//! Two trigger sources feed one loop: a fixed-interval timer and a
//! post-login signal. Each trigger starts a PushData attempt unless one is
//! already in flight. Cancelling the shutdown token stops new attempts and
//! waits for the running one to finish.

use crate::sync::engine::{PushOutcome, Pusher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pending login signals beyond this are coalesced.
const LOGIN_QUEUE_DEPTH: usize = 8;

/// Emitted after a successful online login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginEvent {
    pub user_id: i64,
}

/// Sending half of the login signal, held by the authenticator.
#[derive(Debug, Clone)]
pub struct LoginNotifier {
    tx: mpsc::Sender<LoginEvent>,
}

impl LoginNotifier {
    /// Signal a login. Never blocks; a full queue already guarantees a push.
    pub fn notify(&self, user_id: i64) {
        match self.tx.try_send(LoginEvent { user_id }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(user_id, "Login signal queue full, push already pending");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(user_id, "Sync worker gone, login signal dropped");
            }
        }
    }
}

/// Create the login signal pair.
pub fn login_channel() -> (LoginNotifier, mpsc::Receiver<LoginEvent>) {
    let (tx, rx) = mpsc::channel(LOGIN_QUEUE_DEPTH);
    (LoginNotifier { tx }, rx)
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Login,
    Timer,
}

/// Drains the outbox until shut down.
pub struct SyncWorker {
    pusher: Arc<Pusher>,
    interval: Duration,
    login_events: mpsc::Receiver<LoginEvent>,
    in_flight: Arc<Mutex<()>>,
}

impl SyncWorker {
    pub fn new(pusher: Pusher, interval: Duration, login_events: mpsc::Receiver<LoginEvent>) -> Self {
        Self {
            pusher: Arc::new(pusher),
            interval,
            login_events,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Run until `shutdown` is cancelled, then wait for in-flight attempts.
    pub async fn run(self, shutdown: CancellationToken) {
        let SyncWorker {
            pusher,
            interval,
            mut login_events,
            in_flight,
        } = self;

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut attempts = JoinSet::new();
        let mut login_open = true;

        info!(interval_ms = interval.as_millis() as u64, "Sync worker started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = login_events.recv(), if login_open => match event {
                    Some(event) => {
                        info!(user_id = event.user_id, "Login signal received");
                        spawn_attempt(&mut attempts, &pusher, &in_flight, Trigger::Login);
                    }
                    None => login_open = false,
                },
                _ = ticker.tick() => {
                    spawn_attempt(&mut attempts, &pusher, &in_flight, Trigger::Timer);
                }
                Some(joined) = attempts.join_next(), if !attempts.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Push attempt panicked");
                    }
                }
            }
        }

        info!(in_flight = attempts.len(), "Sync worker stopping");
        while let Some(joined) = attempts.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Push attempt panicked");
            }
        }
        info!("Sync worker stopped");
    }
}

fn spawn_attempt(
    attempts: &mut JoinSet<()>,
    pusher: &Arc<Pusher>,
    in_flight: &Arc<Mutex<()>>,
    trigger: Trigger,
) {
    let Ok(permit) = Arc::clone(in_flight).try_lock_owned() else {
        debug!(?trigger, "Push already in flight, skipping");
        return;
    };

    let pusher = Arc::clone(pusher);
    attempts.spawn(async move {
        let _permit = permit;
        match pusher.push_data().await {
            Ok(PushOutcome::NothingToSync) => debug!(?trigger, "Nothing to sync"),
            Ok(PushOutcome::Pushed(report)) => info!(
                ?trigger,
                acknowledged = report.acknowledged(),
                failed_groups = report.failed_groups(),
                "Push attempt finished"
            ),
            Err(e) => warn!(?trigger, error = %e, "Push attempt failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity;
    use crate::sync::testing::FakeRemote;
    use crate::vault::Vault;

    fn setup() -> (Vault, Arc<FakeRemote>) {
        let vault = Vault::in_memory().unwrap();
        {
            let db = vault.database();
            let db = db.lock().unwrap();
            identity::remember_login(db.conn(), "alice", "hash", "tok").unwrap();
        }
        (vault, Arc::new(FakeRemote::default()))
    }

    async fn wait_until_drained(vault: &Vault) {
        for _ in 0..200 {
            if vault.pending_changes().unwrap() == 0 {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("outbox never drained");
    }

    #[tokio::test]
    async fn login_signal_triggers_push() {
        let (vault, remote) = setup();
        vault.save_note("tok", "hello").unwrap();

        let (notifier, events) = login_channel();
        // The first tick fires immediately; after that only the signal can push.
        let worker = SyncWorker::new(
            Pusher::new(vault.database(), remote.clone()),
            Duration::from_secs(3600),
            events,
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        time::sleep(Duration::from_millis(50)).await;
        vault.save_note("tok", "after first tick").unwrap();
        notifier.notify(1);

        wait_until_drained(&vault).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(remote.batches().len() >= 2);
    }

    #[tokio::test]
    async fn timer_drains_outbox() {
        let (vault, remote) = setup();
        let (_notifier, events) = login_channel();
        let worker = SyncWorker::new(
            Pusher::new(vault.database(), remote.clone()),
            Duration::from_millis(20),
            events,
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        vault.save_credential("tok", "github", "alice", "pw").unwrap();
        wait_until_drained(&vault).await;

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn attempts_never_overlap() {
        let (vault, remote) = setup();
        remote.slow_down(Duration::from_millis(100));
        for i in 0..3 {
            vault.save_note("tok", &format!("note {i}")).unwrap();
        }

        let (notifier, events) = login_channel();
        let worker = SyncWorker::new(
            Pusher::new(vault.database(), remote.clone()),
            Duration::from_millis(5),
            events,
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        for _ in 0..5 {
            notifier.notify(1);
        }
        time::sleep(Duration::from_millis(250)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(remote.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_attempt() {
        let (vault, remote) = setup();
        remote.slow_down(Duration::from_millis(150));
        vault.save_note("tok", "slow").unwrap();

        let (_notifier, events) = login_channel();
        let worker = SyncWorker::new(
            Pusher::new(vault.database(), remote.clone()),
            Duration::from_millis(10),
            events,
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();
        handle.await.unwrap();

        // The attempt that was in flight at cancellation ran to completion.
        assert_eq!(remote.batches().len(), 1);
        assert_eq!(vault.pending_changes().unwrap(), 0);
    }

    #[tokio::test]
    async fn closed_login_channel_keeps_timer_running() {
        let (vault, remote) = setup();
        let (notifier, events) = login_channel();
        drop(notifier);

        let worker = SyncWorker::new(
            Pusher::new(vault.database(), remote.clone()),
            Duration::from_millis(20),
            events,
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(shutdown.clone()));

        vault.save_note("tok", "still synced").unwrap();
        wait_until_drained(&vault).await;

        shutdown.cancel();
        handle.await.unwrap();
    }
}
