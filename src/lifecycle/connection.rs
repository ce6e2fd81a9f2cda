//! Connection accounting and shutdown state.
//!
//! # Responsibilities
//! - Hold the one-way `Normal → Destroyed` server state
//! - Count tracked connections (serving a request, not hijacked/upgraded)
//! - Decide, per connection event, whether the connection stays open
//! - Let shutdown wait for the tracked count to reach zero
//!
//! # Design Decisions
//! - The state flips once by compare-and-swap; a `watch` channel publishes it
//!   to the accept loop and live connections
//! - The count lives in a `watch` channel so drain waits are event-driven
//!   rather than polled
//! - `Active` increments before checking the state, so a request racing a
//!   shutdown is either waited for or refused, never missed

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::trace;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Server-wide lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Normal = 0,
    Destroyed = 1,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Normal,
            _ => Self::Destroyed,
        }
    }
}

/// Connection events reported to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// A request started being served.
    Active,
    /// The request finished; the connection waits for the next one.
    Idle,
    /// The application took the connection over.
    Hijacked,
    /// Protocol-upgraded (websocket) connection; never tracked.
    Upgraded,
}

/// What to do with the connection after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Close,
}

struct Inner {
    state: AtomicU8,
    closing: watch::Sender<bool>,
    tracked: watch::Sender<usize>,
}

/// Tracks served connections for graceful shutdown.
#[derive(Clone)]
pub struct ConnectionTracker {
    inner: Arc<Inner>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(LifecycleState::Normal as u8),
                closing: watch::Sender::new(false),
                tracked: watch::Sender::new(0),
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == LifecycleState::Destroyed
    }

    /// Number of tracked connections.
    pub fn tracked(&self) -> usize {
        *self.inner.tracked.borrow()
    }

    /// Account for a connection event.
    pub fn observe(&self, event: ConnState) -> Disposition {
        match event {
            ConnState::Active => {
                self.inner.tracked.send_modify(|count| *count += 1);
                if self.is_destroyed() {
                    self.release();
                    return Disposition::Close;
                }
                Disposition::Keep
            }
            ConnState::Idle => {
                self.release();
                self.disposition()
            }
            ConnState::Hijacked => {
                self.release();
                Disposition::Keep
            }
            ConnState::Upgraded => self.disposition(),
        }
    }

    /// Start tracking a request. `None` if the server is shutting down.
    pub fn activate(&self) -> Option<TrackedRequest> {
        match self.observe(ConnState::Active) {
            Disposition::Keep => Some(TrackedRequest {
                tracker: self.clone(),
                released: false,
            }),
            Disposition::Close => None,
        }
    }

    /// Flip `Normal → Destroyed`. Returns `false` if already destroyed.
    pub fn begin_shutdown(&self) -> bool {
        let flipped = self
            .inner
            .state
            .compare_exchange(
                LifecycleState::Normal as u8,
                LifecycleState::Destroyed as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if flipped {
            self.inner.closing.send_replace(true);
        }
        flipped
    }

    /// Receiver that turns `true` once shutdown begins.
    pub fn closing(&self) -> watch::Receiver<bool> {
        self.inner.closing.subscribe()
    }

    /// Wait until no tracked connections remain.
    pub async fn drained(&self) {
        let mut rx = self.inner.tracked.subscribe();
        // The sender lives in `inner`, so the channel cannot close here.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    fn release(&self) {
        self.inner
            .tracked
            .send_modify(|count| *count = count.saturating_sub(1));
    }

    fn disposition(&self) -> Disposition {
        if self.is_destroyed() {
            Disposition::Close
        } else {
            Disposition::Keep
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A request being served. Reports `Idle` when dropped.
pub struct TrackedRequest {
    tracker: ConnectionTracker,
    released: bool,
}

impl TrackedRequest {
    /// Whether the connection should close after this response.
    pub fn disposition(&self) -> Disposition {
        self.tracker.disposition()
    }

    /// The connection was hijacked; stop tracking it.
    pub fn hijack(mut self) {
        self.released = true;
        self.tracker.observe(ConnState::Hijacked);
        trace!("Connection hijacked");
    }
}

impl Drop for TrackedRequest {
    fn drop(&mut self) {
        if !self.released {
            self.tracker.observe(ConnState::Idle);
        }
    }
}
