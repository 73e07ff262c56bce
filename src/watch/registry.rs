//! One-shot watch registry with a background delivery thread
//!
//! ```text
//! Write path:
//!   NodeStore::write() -> fire(path) -> remove armed watch -> send(queue)
//!                                                              ↓
//! Dispatcher thread:
//!   queue.recv() -> watcher.process(event)   (may call arm() again)
//! ```
//!
//! A watch moves `Unarmed --arm--> Armed --fire--> Unarmed`. Firing removes
//! the registration before the callback is queued, so each arm yields at most
//! one callback. Writes that land while a path is unarmed are not queued for
//! later: observers must re-read after re-arming.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::bounded;
use crossbeam_channel::unbounded;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::Error;
use crate::NodePath;
use crate::Result;
use crate::Session;
use crate::WatchConfig;

/// What happened to the watched node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// A node was created at a path that was watched before it existed
    NodeCreated,
    /// The payload was replaced by a successful write
    NodeDataChanged,
    NodeDeleted,
}

/// Notification handed to a fired watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub path: NodePath,
    pub kind: WatchEventKind,
    /// Node version right after the triggering operation
    pub version: u64,
}

/// Arm state of a single path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Unarmed,
    Armed,
}

/// Callback invoked once when an armed watch fires.
///
/// Runs on the dispatcher thread; it must not block indefinitely. Calling
/// [`WatchRegistry::arm`] from inside `process` is expected.
pub trait Watcher: Send + Sync + 'static {
    fn process(
        &self,
        event: WatchedEvent,
    );
}

impl<F> Watcher for F
where
    F: Fn(WatchedEvent) + Send + Sync + 'static,
{
    fn process(
        &self,
        event: WatchedEvent,
    ) {
        self(event)
    }
}

struct ArmedWatch {
    id: u64,
    watcher: Arc<dyn Watcher>,
}

struct Delivery {
    watch_id: u64,
    watcher: Arc<dyn Watcher>,
    event: WatchedEvent,
}

/// Internal state of WatchRegistry
struct RegistryInner {
    /// At most one armed watch per path
    watches: DashMap<NodePath, ArmedWatch>,

    /// Next watch ID (monotonically increasing)
    next_id: AtomicU64,

    /// Total callbacks handed to the dispatcher
    fired: AtomicU64,

    /// Dispatcher thread handle (None when not running)
    thread_handle: Mutex<Option<JoinHandle<()>>>,

    /// Shutdown signal sender (None when not running)
    shutdown_tx: Mutex<Option<Sender<()>>>,

    session: Arc<Session>,

    config: WatchConfig,
}

/// Tracks one-shot watches per node path and delivers fired callbacks on a
/// dedicated background thread.
///
/// Deliveries are queued in fire order, so callbacks for a single path run
/// in write order; there is no ordering promise across paths beyond that.
pub struct WatchRegistry {
    inner: Arc<RegistryInner>,

    /// Sender for the delivery queue (never drops an event)
    event_sender: Sender<Delivery>,

    /// Receiver for the delivery queue (consumed by the dispatcher)
    event_receiver: Receiver<Delivery>,
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("armed", &self.inner.watches.len())
            .field("fired", &self.inner.fired.load(Ordering::Relaxed))
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl WatchRegistry {
    pub fn new(
        session: Arc<Session>,
        config: WatchConfig,
    ) -> Self {
        let (event_sender, event_receiver) = unbounded();

        let inner = Arc::new(RegistryInner {
            watches: DashMap::new(),
            next_id: AtomicU64::new(1),
            fired: AtomicU64::new(0),
            thread_handle: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            session,
            config,
        });

        Self {
            inner,
            event_sender,
            event_receiver,
        }
    }

    /// Start the background dispatcher thread
    ///
    /// Calling `start()` when a dispatcher is already running is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut handle_guard = self.inner.thread_handle.lock();

        // Already running
        if handle_guard.is_some() {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let receiver = self.event_receiver.clone();

        let handle = std::thread::Builder::new()
            .name(self.inner.config.dispatcher_thread_name.clone())
            .spawn(move || {
                debug!("Watch dispatcher thread started");

                loop {
                    crossbeam_channel::select! {
                        recv(receiver) -> result => {
                            match result {
                                Ok(delivery) => Self::deliver(delivery),
                                Err(_) => {
                                    warn!("Watch delivery channel closed unexpectedly");
                                    break;
                                }
                            }
                        }
                        recv(shutdown_rx) -> _ => {
                            debug!("Watch dispatcher received shutdown signal");
                            break;
                        }
                    }
                }

                debug!("Watch dispatcher thread stopped");
            })
            .map_err(|e| Error::Fatal(format!("failed to spawn watch dispatcher: {e}")))?;

        *handle_guard = Some(handle);
        *self.inner.shutdown_tx.lock() = Some(shutdown_tx);
        Ok(())
    }

    /// Stop the background dispatcher thread and wait for it to exit.
    ///
    /// A callback that is already running completes first. Calling `stop()`
    /// when no dispatcher is running is a no-op.
    pub fn stop(&self) {
        if let Some(tx) = self.inner.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }

        let handle = self.inner.thread_handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                // stop() issued from inside a callback: the loop exits on its own
                return;
            }
            if handle.join().is_err() {
                error!("Watch dispatcher thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.thread_handle.lock().is_some()
    }

    /// Arms a one-shot watch on `path`, replacing any unfired watch there.
    ///
    /// Requires a connected session and fails fast otherwise; await
    /// [`Session::wait_connected`] first. Returns the id of the new
    /// registration.
    pub fn arm<W: Watcher>(
        &self,
        path: &str,
        watcher: W,
    ) -> Result<u64> {
        self.inner.session.ensure_connected()?;
        let path = NodePath::parse(path)?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .inner
            .watches
            .insert(
                path.clone(),
                ArmedWatch {
                    id,
                    watcher: Arc::new(watcher),
                },
            )
            .map(|w| w.id);

        trace!(watch_id = id, path = %path, replaced = ?replaced, "Watch armed");
        Ok(id)
    }

    /// Removes an unfired watch. Returns whether one was armed.
    pub fn disarm(
        &self,
        path: &str,
    ) -> bool {
        let removed = self.inner.watches.remove(path).is_some();
        if removed {
            trace!(path = %path, "Watch disarmed");
        }
        removed
    }

    /// Takes the watch armed on `path` (if any) and queues its callback.
    ///
    /// Returns whether a watch was fired.
    pub(crate) fn fire(
        &self,
        path: &NodePath,
        kind: WatchEventKind,
        version: u64,
    ) -> bool {
        let Some((_, armed)) = self.inner.watches.remove(path) else {
            return false;
        };

        let delivery = Delivery {
            watch_id: armed.id,
            watcher: armed.watcher,
            event: WatchedEvent {
                path: path.clone(),
                kind,
                version,
            },
        };
        self.inner.fired.fetch_add(1, Ordering::Relaxed);

        trace!(watch_id = armed.id, path = %path, kind = ?kind, version, "Watch fired");
        if self.event_sender.send(delivery).is_err() {
            // Receiver half lives in self, so this only happens while dropping
            warn!(path = %path, "Watch delivery queue closed; event discarded");
        }
        true
    }

    fn deliver(delivery: Delivery) {
        let Delivery {
            watch_id,
            watcher,
            event,
        } = delivery;
        let path = event.path.clone();

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| watcher.process(event)));
        match outcome {
            Ok(()) => trace!(watch_id, path = %path, "Watch delivered"),
            Err(_) => error!(watch_id, path = %path, "Watch callback panicked"),
        }
    }

    pub fn watch_state(
        &self,
        path: &str,
    ) -> WatchState {
        if self.inner.watches.contains_key(path) {
            WatchState::Armed
        } else {
            WatchState::Unarmed
        }
    }

    /// Number of currently armed watches
    pub fn armed_count(&self) -> usize {
        self.inner.watches.len()
    }

    /// Total number of watches fired since creation
    pub fn fired_count(&self) -> u64 {
        self.inner.fired.load(Ordering::Relaxed)
    }

    /// Fired callbacks still waiting for the dispatcher
    pub fn pending_deliveries(&self) -> usize {
        self.event_receiver.len()
    }
}

impl Drop for WatchRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}
