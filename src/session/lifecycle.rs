use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Result;
use crate::SessionConfig;
use crate::SessionError;

/// Lifecycle of the process-wide session
///
/// ```text
/// Disconnected -> Connecting -> Connected
///                     ^   |         |
///           (retry)   |   v         v (expire)
///                    Expired <------+
/// any state -> Disconnected (explicit shutdown)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Expired,
}

/// Handshake with the coordination backend
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn handshake(
        &self,
        target: &str,
    ) -> Result<()>;
}

/// Backend living in this process: the handshake always succeeds at once.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessConnector;

#[async_trait]
impl Connector for InProcessConnector {
    async fn handshake(
        &self,
        target: &str,
    ) -> Result<()> {
        debug!(target, "in-process handshake");
        Ok(())
    }
}

/// Explicit handle for the shared session, injected into every component
/// that needs a live connection.
///
/// Store and watch operations fail fast with `NotConnected` instead of
/// queueing; callers await [`Session::wait_connected`] before their first
/// operation. After [`Session::disconnect`] the session is closed for good.
pub struct Session {
    state_tx: watch::Sender<SessionState>,
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    policy: BackoffPolicy,
    /// Serializes concurrent `connect()` callers
    connect_lock: Mutex<()>,
    /// Set by `disconnect()`; no transition leaves `Disconnected` afterwards
    closed: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("target", &self.config.connect_target)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        config: SessionConfig,
        policy: BackoffPolicy,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            state_tx,
            connector,
            config,
            policy,
            connect_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Whether `disconnect()` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Receiver observing every state transition
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Gate for store and watch operations.
    pub fn ensure_connected(&self) -> Result<()> {
        match self.state() {
            SessionState::Connected => Ok(()),
            state => Err(SessionError::NotConnected { state }.into()),
        }
    }

    /// Waits until the session reaches `Connected`.
    ///
    /// Fails with `NotConnected` once the session is closed.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.state_tx.subscribe();
        let _ = rx
            .wait_for(|state| *state == SessionState::Connected || self.is_closed())
            .await;
        self.ensure_connected()
    }

    /// Performs the handshake, retrying per the connect policy.
    ///
    /// Each attempt is bounded by `connect_timeout_ms`; a failed attempt
    /// moves the session to `Expired` before the next `Connecting`. Returns
    /// `ConnectionFailure` once every attempt has failed, or `NotConnected`
    /// if the session is closed before or during the handshake.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        if self.is_closed() {
            return Err(closed_error());
        }
        if self.is_connected() {
            return Ok(());
        }

        let target = self.config.connect_target.as_str();
        let connect_timeout = self.config.connect_timeout();
        let attempts = self.policy.max_retries.max(1);

        for attempt in 0..attempts {
            if !self.transition(SessionState::Connecting) {
                return Err(closed_error());
            }
            debug!(target, attempt, "session handshake");

            match timeout(connect_timeout, self.connector.handshake(target)).await {
                Ok(Ok(())) => {
                    if !self.transition(SessionState::Connected) {
                        return Err(closed_error());
                    }
                    info!(target, attempt, "session connected");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!(target, attempt, error = %e, "session handshake failed");
                }
                Err(_) => {
                    let e = SessionError::HandshakeTimeout {
                        target: target.to_string(),
                        timeout: connect_timeout,
                    };
                    warn!(target, attempt, error = %e, "session handshake timed out");
                }
            }

            if !self.transition(SessionState::Expired) {
                return Err(closed_error());
            }
            if attempt + 1 < attempts {
                sleep(self.policy.delay_for(attempt)).await;
            }
        }

        Err(SessionError::ConnectionFailure {
            target: target.to_string(),
            attempts,
        }
        .into())
    }

    /// Re-runs the handshake after an expiry. A closed session stays closed.
    pub async fn reconnect(&self) -> Result<()> {
        info!(state = ?self.state(), "session reconnecting");
        self.connect().await
    }

    /// Marks a connected session as lost. Returns whether the state changed.
    pub fn expire(&self) -> bool {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == SessionState::Connected {
                *state = SessionState::Expired;
                true
            } else {
                false
            }
        });
        if changed {
            warn!(target = %self.config.connect_target, "session expired");
        }
        changed
    }

    /// Terminal transition; safe to call any number of times.
    ///
    /// Returns whether this call closed the session.
    pub fn disconnect(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // always notify, so waiters on a never-connected session wake up too
        self.state_tx.send_replace(SessionState::Disconnected);
        info!(target = %self.config.connect_target, "session disconnected");
        true
    }

    /// Moves to `next` unless the session is closed. Returns `false` when
    /// closed; the flag is read under the channel lock.
    fn transition(
        &self,
        next: SessionState,
    ) -> bool {
        let mut prev = None;
        self.state_tx.send_if_modified(|state| {
            if self.closed.load(Ordering::Acquire) {
                return false;
            }
            prev = Some(*state);
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        match prev {
            Some(prev) => {
                if prev != next {
                    debug!(from = ?prev, to = ?next, "session state transition");
                }
                true
            }
            None => false,
        }
    }
}

fn closed_error() -> crate::Error {
    SessionError::NotConnected {
        state: SessionState::Disconnected,
    }
    .into()
}
