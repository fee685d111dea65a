//! Client auth service: registration, online login and offline login.
//!
//! Online login asks the server for a token and caches it together with a
//! local password hash. Offline login checks the password against that
//! hash and hands back the cached token without any network call.

use crate::crypto;
use crate::database::Database;
use crate::identity;
use crate::sync::remote::Remote;
use crate::sync::worker::LoginNotifier;
use crate::{KeeperError, Result};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// How a session was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    Online,
    Offline,
}

/// An authenticated session on this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub login: String,
    pub token: String,
    pub mode: LoginMode,
}

pub struct Authenticator {
    db: Arc<Mutex<Database>>,
    remote: Arc<dyn Remote>,
    notifier: Option<LoginNotifier>,
}

fn require_credentials(login: &str, password: &str) -> Result<()> {
    if login.is_empty() || password.is_empty() {
        return Err(KeeperError::InvalidArgument(
            "login and password are required".to_string(),
        ));
    }
    Ok(())
}

impl Authenticator {
    /// `notifier` receives a signal after every successful online login.
    pub fn new(
        db: Arc<Mutex<Database>>,
        remote: Arc<dyn Remote>,
        notifier: Option<LoginNotifier>,
    ) -> Self {
        Self {
            db,
            remote,
            notifier,
        }
    }

    /// Create an account on the server.
    pub async fn register(&self, login: &str, password: &str) -> Result<i64> {
        require_credentials(login, password)?;
        let user_id = self.remote.register(login, password).await?;
        info!(login, user_id, "Registered");
        Ok(user_id)
    }

    /// Log in against the server and cache the new token locally.
    pub async fn login(&self, login: &str, password: &str) -> Result<String> {
        require_credentials(login, password)?;

        let token = self.remote.authenticate(login, password).await?;
        if token.is_empty() {
            return Err(KeeperError::Internal("access token is empty".to_string()));
        }

        let owned = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || crypto::hash_password(&owned))
            .await
            .map_err(|e| KeeperError::Internal(format!("password hashing task failed: {}", e)))??;
        let user_id = {
            let db = self
                .db
                .lock()
                .map_err(|_| KeeperError::lock_poisoned("login"))?;
            identity::remember_login(db.conn(), login, &password_hash, &token)?
        };

        info!(login, user_id, "Logged in online");
        if let Some(notifier) = &self.notifier {
            notifier.notify(user_id);
        }
        Ok(token)
    }

    /// Check the password against the cached hash and return the cached
    /// token. Never contacts the server.
    pub fn offline_login(&self, login: &str, password: &str) -> Result<String> {
        require_credentials(login, password)?;

        let db = self
            .db
            .lock()
            .map_err(|_| KeeperError::lock_poisoned("offline login"))?;
        let user = identity::find_by_login(db.conn(), login)?
            .ok_or_else(|| KeeperError::NotFound(format!("login {} not cached", login)))?;

        if !crypto::verify_password(password, &user.password_hash)? {
            return Err(KeeperError::Unauthenticated("wrong password".to_string()));
        }

        let token = user
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| KeeperError::Unauthenticated("no cached token".to_string()))?;

        info!(login, "Logged in offline");
        Ok(token)
    }

    /// Probe the server; log in online when it answers, offline otherwise.
    pub async fn sign_in(&self, login: &str, password: &str) -> Result<Session> {
        match self.remote.health().await {
            Ok(()) => {
                let token = self.login(login, password).await?;
                Ok(Session {
                    login: login.to_string(),
                    token,
                    mode: LoginMode::Online,
                })
            }
            Err(e) => {
                warn!(error = %e, "Server unreachable, using cached credentials");
                let token = self.offline_login(login, password)?;
                Ok(Session {
                    login: login.to_string(),
                    token,
                    mode: LoginMode::Offline,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::FakeRemote;
    use crate::sync::worker::login_channel;
    use crate::vault::Vault;

    fn setup() -> (Vault, Arc<FakeRemote>) {
        (Vault::in_memory().unwrap(), Arc::new(FakeRemote::default()))
    }

    #[tokio::test]
    async fn online_login_caches_token_and_signals_worker() {
        let (vault, remote) = setup();
        let (notifier, mut events) = login_channel();
        let auth = Authenticator::new(vault.database(), remote.clone(), Some(notifier));

        let token = auth.login("alice", "pw1").await.unwrap();

        assert_eq!(vault.cached_token("alice").unwrap(), token);
        let event = events.try_recv().unwrap();
        let db = vault.database();
        let db = db.lock().unwrap();
        assert_eq!(identity::user_id_by_token(db.conn(), &token).unwrap(), event.user_id);
    }

    #[tokio::test]
    async fn second_login_rotates_cached_token() {
        let (vault, remote) = setup();
        let auth = Authenticator::new(vault.database(), remote, None);

        let first = auth.login("alice", "pw1").await.unwrap();
        let second = auth.login("alice", "pw1").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(vault.cached_token("alice").unwrap(), second);
    }

    #[tokio::test]
    async fn offline_login_uses_cache_without_network() {
        let (vault, remote) = setup();
        let auth = Authenticator::new(vault.database(), remote.clone(), None);
        let cached = auth.login("alice", "pw1").await.unwrap();
        let calls_before = remote.auth_calls();

        remote.go_offline();
        let session = auth.sign_in("alice", "pw1").await.unwrap();

        assert_eq!(session.mode, LoginMode::Offline);
        assert_eq!(session.token, cached);
        assert_eq!(remote.auth_calls(), calls_before);
    }

    #[tokio::test]
    async fn offline_login_rejects_wrong_password_and_unknown_login() {
        let (vault, remote) = setup();
        let auth = Authenticator::new(vault.database(), remote, None);
        auth.login("alice", "pw1").await.unwrap();

        assert!(matches!(
            auth.offline_login("alice", "nope"),
            Err(KeeperError::Unauthenticated(_))
        ));
        assert!(matches!(
            auth.offline_login("bob", "pw"),
            Err(KeeperError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn sign_in_goes_online_when_server_answers() {
        let (vault, remote) = setup();
        let auth = Authenticator::new(vault.database(), remote.clone(), None);

        let session = auth.sign_in("alice", "pw1").await.unwrap();
        assert_eq!(session.mode, LoginMode::Online);
        assert_eq!(remote.auth_calls(), 1);
    }

    #[tokio::test]
    async fn empty_credentials_are_invalid() {
        let (vault, remote) = setup();
        let auth = Authenticator::new(vault.database(), remote.clone(), None);

        assert!(matches!(
            auth.register("", "pw").await,
            Err(KeeperError::InvalidArgument(_))
        ));
        assert!(matches!(
            auth.login("alice", "").await,
            Err(KeeperError::InvalidArgument(_))
        ));
        assert_eq!(remote.auth_calls(), 0);
    }

    #[tokio::test]
    async fn server_rejections_pass_through() {
        let (vault, remote) = setup();
        let auth = Authenticator::new(vault.database(), remote, None);

        assert!(matches!(
            auth.register("taken", "pw").await,
            Err(KeeperError::AlreadyExists(_))
        ));
        assert!(matches!(
            auth.login("alice", "bad").await,
            Err(KeeperError::Unauthenticated(_))
        ));
        assert!(matches!(
            auth.offline_login("alice", "bad"),
            Err(KeeperError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn login_hashes_off_the_async_executor() {
        let (vault, remote) = setup();
        let auth = Authenticator::new(vault.database(), remote, None);

        let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = ticks.clone();
        let ticker = tokio::spawn(async move {
            loop {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        });

        auth.login("alice", "pw1").await.unwrap();
        let observed = ticks.load(std::sync::atomic::Ordering::SeqCst);
        ticker.abort();

        // On the single-threaded test runtime the ticker only advances while
        // login is parked on the hashing task.
        assert!(observed >= 2, "ticker ran {} times during login", observed);
    }
}
