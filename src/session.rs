//! Session and credential handling.
//!
//! The current `{token, userId}` pair lives in a `tokio::sync::watch`
//! channel; every connector holds a receiver and reads the value at call
//! time. Sign-in and sign-up replace the session wholesale and mirror it
//! into the configured [`CredentialStore`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::connector::HttpConnector;
use crate::error::{Error, Result};
use crate::protocol::Credentials;

/// The current credential state. Replaced wholesale, never patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl Session {
    pub fn is_signed_in(&self) -> bool {
        self.token.is_some()
    }
}

/// Opaque persistent surface for the token/userId slots.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Session;
    fn save(&self, session: &Session);
    fn clear(&self);
}

/// Default in-memory credential store; sessions last as long as the process.
#[derive(Default)]
pub struct MemoryCredentials {
    slot: Mutex<Session>,
}

impl CredentialStore for MemoryCredentials {
    fn load(&self) -> Session {
        self.slot.lock().clone()
    }

    fn save(&self, session: &Session) {
        *self.slot.lock() = session.clone();
    }

    fn clear(&self) {
        *self.slot.lock() = Session::default();
    }
}

/// Authentication surface: sign-in, sign-up, sign-out, and session
/// observation.
pub struct Auth {
    sender: watch::Sender<Session>,
    store: Arc<dyn CredentialStore>,
    http: Arc<HttpConnector>,
}

impl Auth {
    pub(crate) fn new(
        sender: watch::Sender<Session>,
        store: Arc<dyn CredentialStore>,
        http: Arc<HttpConnector>,
    ) -> Self {
        Self { sender, store, http }
    }

    /// Exchange credentials for a session. Any failure, transport or
    /// otherwise, surfaces as the one generic credential error.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<bool> {
        self.authenticate("/auth/signin", credentials).await
    }

    /// Create an account and sign in with it.
    pub async fn sign_up(&self, credentials: &Credentials) -> Result<bool> {
        self.authenticate("/auth/signup", credentials).await
    }

    async fn authenticate(&self, path: &str, credentials: &Credentials) -> Result<bool> {
        let body = serde_json::to_value(credentials).map_err(|_| Error::Credentials)?;
        let response = self
            .http
            .request(path, &body)
            .await
            .map_err(|_| Error::Credentials)?;
        let session: Session = serde_json::from_value(response).map_err(|_| Error::Credentials)?;
        if !session.is_signed_in() {
            return Err(Error::Credentials);
        }

        debug!("session established for user {:?}", session.user_id);
        self.store.save(&session);
        let _ = self.sender.send(session);
        Ok(true)
    }

    /// Drop the current session everywhere.
    pub fn sign_out(&self) {
        self.store.clear();
        let _ = self.sender.send(Session::default());
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.sender.borrow().clone()
    }

    /// Observe session changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.sender.subscribe()
    }
}
