use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::BackoffPolicy;
use crate::ConfigSync;
use crate::InProcessConnector;
use crate::NodeStore;
use crate::Session;
use crate::SessionConfig;
use crate::SyncConfig;
use crate::WatchConfig;
use crate::WatchRegistry;

pub(crate) const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

/// Fast retry policy so failure paths stay quick in tests
pub(crate) fn fast_policy(max_retries: usize) -> BackoffPolicy {
    BackoffPolicy {
        max_retries,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

pub(crate) fn new_session() -> Arc<Session> {
    Arc::new(Session::new(
        SessionConfig::default(),
        fast_policy(2),
        Arc::new(InProcessConnector),
    ))
}

/// Components wired as in `ConfNodeBuilder`, session connected and
/// dispatcher running
pub(crate) struct TestStack {
    pub session: Arc<Session>,
    pub watches: Arc<WatchRegistry>,
    pub store: Arc<NodeStore>,
}

impl TestStack {
    pub(crate) async fn connected() -> Self {
        enable_logger();
        let session = new_session();
        session.connect().await.expect("in-process connect");
        let watches = Arc::new(WatchRegistry::new(session.clone(), WatchConfig::default()));
        watches.start().expect("dispatcher starts");
        let store = Arc::new(NodeStore::new(session.clone(), watches.clone()));
        Self {
            session,
            watches,
            store,
        }
    }

    pub(crate) fn config_sync(&self) -> ConfigSync {
        ConfigSync::new(
            self.store.clone(),
            self.watches.clone(),
            SyncConfig::default(),
            fast_policy(3),
        )
        .expect("default prefix is valid")
    }
}

/// Waits for one message, panicking after [`EVENT_TIMEOUT`].
pub(crate) fn recv_within<T>(rx: &mpsc::Receiver<T>) -> T {
    rx.recv_timeout(EVENT_TIMEOUT).expect("event not delivered in time")
}

/// Asserts nothing arrives within a short grace period.
pub(crate) fn assert_silent<T: std::fmt::Debug>(rx: &mpsc::Receiver<T>) {
    if let Ok(msg) = rx.recv_timeout(Duration::from_millis(150)) {
        panic!("unexpected event: {msg:?}");
    }
}
