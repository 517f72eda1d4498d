//! Auth state as an explicit input.
//!
//! The coordinator consumes auth as a read-only tri-state value delivered
//! over a watch channel, rather than reaching into ambient context. Waiting
//! for auth is bounded: after the configured timeout the state flips to
//! `TimedOut` and the caller decides how to degrade.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::AuthError;

/// Authenticated user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tri-state auth context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Auth initialization still in flight.
    Loading,
    /// Authenticated.
    Ready(UserId),
    /// Gave up waiting for auth initialization.
    TimedOut,
}

impl AuthState {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Ready(id) => Some(*id),
            _ => None,
        }
    }
}

/// Publisher half: the host application resolves auth through this.
#[derive(Debug)]
pub struct AuthPublisher {
    tx: watch::Sender<AuthState>,
}

impl AuthPublisher {
    pub fn set_ready(&self, user: UserId) {
        let _ = self.tx.send(AuthState::Ready(user));
    }

    pub fn set_timed_out(&self) {
        let _ = self.tx.send(AuthState::TimedOut);
    }
}

/// Consumer half: read-only view of the auth state.
#[derive(Debug, Clone)]
pub struct AuthWatcher {
    rx: watch::Receiver<AuthState>,
}

impl AuthWatcher {
    /// Create a watcher starting in `Loading`, plus its publisher.
    pub fn pending() -> (AuthPublisher, AuthWatcher) {
        let (tx, rx) = watch::channel(AuthState::Loading);
        (AuthPublisher { tx }, AuthWatcher { rx })
    }

    /// Create a watcher already resolved to `Ready(user)`.
    pub fn ready(user: UserId) -> AuthWatcher {
        let (_tx, rx) = watch::channel(AuthState::Ready(user));
        AuthWatcher { rx }
    }

    pub fn current(&self) -> AuthState {
        *self.rx.borrow()
    }

    /// Wait until the state leaves `Loading`, at most `timeout`.
    ///
    /// Returns the user id on `Ready`. A timeout or an explicit `TimedOut`
    /// resolves to `AuthError::TimedOut`.
    pub async fn wait_ready(&mut self, timeout: Duration) -> Result<UserId, AuthError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.current() {
                AuthState::Ready(id) => return Ok(id),
                AuthState::TimedOut => return Err(AuthError::TimedOut { waited: timeout }),
                AuthState::Loading => {}
            }
            match tokio::time::timeout_at(deadline, self.rx.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(AuthError::WatcherDropped),
                Err(_) => return Err(AuthError::TimedOut { waited: timeout }),
            }
        }
    }
}
