use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::ConfNodeBuilder;
use crate::ConfSyncConfig;
use crate::ConfigSync;
use crate::ConsumerRegistry;
use crate::NodeStore;
use crate::Result;
use crate::Session;
use crate::SessionState;
use crate::WatchRegistry;

pub struct ConfNode {
    config: Arc<ConfSyncConfig>,
    session: Arc<Session>,
    watches: Arc<WatchRegistry>,
    store: Arc<NodeStore>,
    sync: ConfigSync,

    shutdown_token: CancellationToken,
    session_monitor: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl std::fmt::Debug for ConfNode {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ConfNode")
            .field("session", &self.session)
            .field("sync", &self.sync)
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ConfNode {
    pub fn builder(config: ConfSyncConfig) -> ConfNodeBuilder {
        ConfNodeBuilder::new(config)
    }

    pub(crate) fn new(
        config: Arc<ConfSyncConfig>,
        session: Arc<Session>,
        watches: Arc<WatchRegistry>,
        store: Arc<NodeStore>,
        sync: ConfigSync,
    ) -> Self {
        Self {
            config,
            session,
            watches,
            store,
            sync,
            shutdown_token: CancellationToken::new(),
            session_monitor: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Connects, starts watch delivery and registers every consumer.
    ///
    /// Returns once the session is `Connected` and all consumers are
    /// watching their nodes. On any failure everything acquired so far is
    /// released before the error is returned.
    pub async fn start(
        &self,
        consumers: &ConsumerRegistry,
    ) -> Result<()> {
        if let Err(e) = self.try_start(consumers).await {
            error!(error = %e, "conf node failed to start");
            self.shutdown();
            return Err(e);
        }
        info!(
            target = %self.config.session.connect_target,
            consumers = consumers.len(),
            "conf node started"
        );
        Ok(())
    }

    async fn try_start(
        &self,
        consumers: &ConsumerRegistry,
    ) -> Result<()> {
        self.watches.start()?;
        self.session.connect().await?;
        self.spawn_session_monitor();
        self.sync.bootstrap(consumers)?;
        Ok(())
    }

    /// Follows session transitions: re-runs the handshake after an expiry
    /// (when `auto_reconnect` is on) and re-arms parked watches once
    /// `Connected` again.
    ///
    /// Failed reconnects back off per the connect policy, capped at its
    /// `max_delay_ms`, until the session recovers or the node shuts down.
    fn spawn_session_monitor(&self) {
        let mut state_rx = self.session.subscribe();
        let session = self.session.clone();
        let sync = self.sync.clone();
        let token = self.shutdown_token.clone();
        let auto_reconnect = self.config.session.auto_reconnect;
        let policy = self.config.retry.connect;

        let handle = tokio::spawn(async move {
            'monitor: loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let state = *state_rx.borrow_and_update();
                match state {
                    SessionState::Connected => {
                        if sync.pending_rearm_count() > 0 {
                            let still_pending = sync.rearm_pending();
                            if still_pending > 0 {
                                warn!(still_pending, "config watches still waiting to be re-armed");
                            }
                        }
                    }
                    SessionState::Expired if auto_reconnect => {
                        let mut failures = 0;
                        loop {
                            tokio::select! {
                                _ = token.cancelled() => break 'monitor,
                                result = session.reconnect() => match result {
                                    Ok(()) => break,
                                    Err(_) if session.is_closed() => break 'monitor,
                                    Err(e) => {
                                        let delay = policy.delay_for(failures);
                                        failures += 1;
                                        error!(error = %e, failures, ?delay, "session reconnect failed");
                                        tokio::select! {
                                            _ = token.cancelled() => break 'monitor,
                                            _ = sleep(delay) => {}
                                        }
                                    }
                                },
                            }
                        }
                    }
                    SessionState::Disconnected => break,
                    _ => {}
                }
            }
        });

        if let Some(previous) = self.session_monitor.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Releases every resource: stops the session monitor and the watch
    /// dispatcher, then disconnects the session. Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown_token.cancel();
        if let Some(handle) = self.session_monitor.lock().take() {
            handle.abort();
        }
        self.watches.stop();
        self.session.disconnect();
        info!("conf node shut down");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &ConfSyncConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    pub fn watches(&self) -> &Arc<WatchRegistry> {
        &self.watches
    }

    pub fn sync(&self) -> &ConfigSync {
        &self.sync
    }
}

impl Drop for ConfNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}
