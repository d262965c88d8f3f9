//! Price Board - broadcasts price notifications from structures to agents.
//!
//! Every subscriber owns a one-value mailbox: a broadcast overwrites
//! whatever the subscriber has not read yet (last write wins, no backlog).
//! Termination is sticky: once a mailbox has seen a terminal notification
//! it stays terminated.
//!
//! Structures hold a [`Publisher`]. When the last open publisher closes, the
//! board sends the terminal notification to everyone.

use parking_lot::{Condvar, Mutex};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Subscriber handle key.
pub type SubscriberId = u64;

/// A price update pushed to agents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Notification {
    pub price: Decimal,
    pub terminate: bool,
}

impl Notification {
    /// Sentinel price carried by terminal notifications.
    pub const TERMINAL_PRICE: Decimal = Decimal::NEGATIVE_ONE;

    #[inline]
    pub fn price(price: Decimal) -> Self {
        Self {
            price,
            terminate: false,
        }
    }

    #[inline]
    pub fn terminal() -> Self {
        Self {
            price: Self::TERMINAL_PRICE,
            terminate: true,
        }
    }
}

#[derive(Default)]
struct MailboxState {
    /// Unread value, replaced on every delivery
    pending: Option<Notification>,
    /// Last value delivered, read or not
    latest: Option<Notification>,
    terminated: bool,
}

#[derive(Default)]
struct Mailbox {
    state: Mutex<MailboxState>,
    cond: Condvar,
}

impl Mailbox {
    fn deliver(&self, notification: Notification) {
        let mut state = self.state.lock();
        state.pending = Some(notification);
        state.latest = Some(notification);
        state.terminated |= notification.terminate;
        drop(state);
        self.cond.notify_all();
    }

    fn wait(&self, timeout: Duration) -> Option<Notification> {
        // Too far out to express as an Instant: wait without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();
        while state.pending.is_none() && !state.terminated {
            match deadline {
                Some(d) => {
                    if self.cond.wait_until(&mut state, d).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut state),
            }
        }
        let terminated = state.terminated;
        match state.pending.take() {
            Some(mut n) => {
                n.terminate |= terminated;
                Some(n)
            }
            None if terminated => Some(Notification::terminal()),
            None => None,
        }
    }
}

struct BoardState {
    subscribers: FxHashMap<SubscriberId, Arc<Mailbox>>,
    next_id: SubscriberId,
    open_publishers: usize,
    terminated: bool,
}

struct BoardInner {
    state: Mutex<BoardState>,
}

impl BoardInner {
    /// Deliver to every current subscriber; returns how many were reached.
    fn broadcast(&self, notification: Notification) -> usize {
        let mailboxes: Vec<Arc<Mailbox>> = {
            let mut state = self.state.lock();
            state.terminated |= notification.terminate;
            state.subscribers.values().cloned().collect()
        };
        for mailbox in &mailboxes {
            mailbox.deliver(notification);
        }
        debug!(
            price = %notification.price,
            terminate = notification.terminate,
            subscribers = mailboxes.len(),
            "broadcast"
        );
        mailboxes.len()
    }
}

/// Shared registry of subscribers. Cheap to clone.
#[derive(Clone)]
pub struct PriceBoard {
    inner: Arc<BoardInner>,
}

impl PriceBoard {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BoardInner {
                state: Mutex::new(BoardState {
                    subscribers: FxHashMap::default(),
                    next_id: 0,
                    open_publishers: 0,
                    terminated: false,
                }),
            }),
        }
    }

    /// Register a new subscriber. A board that already terminated hands out
    /// terminated subscriptions.
    pub fn subscribe(&self) -> Subscription {
        let mailbox = Arc::new(Mailbox::default());
        let mut state = self.inner.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        if state.terminated {
            mailbox.deliver(Notification::terminal());
        }
        state.subscribers.insert(id, mailbox.clone());
        Subscription {
            id,
            mailbox,
            board: self.inner.clone(),
        }
    }

    /// Open a publisher. The board terminates when the last one closes.
    pub fn publisher(&self) -> Publisher {
        self.inner.state.lock().open_publishers += 1;
        Publisher {
            board: self.inner.clone(),
        }
    }

    /// Send a notification to all subscribers.
    pub fn broadcast(&self, price: Decimal, terminate: bool) -> usize {
        self.inner.broadcast(Notification { price, terminate })
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.state.lock().terminated
    }
}

impl Default for PriceBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscriber's end of the board. Unsubscribes on drop.
pub struct Subscription {
    id: SubscriberId,
    mailbox: Arc<Mailbox>,
    board: Arc<BoardInner>,
}

impl Subscription {
    #[inline]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait up to `timeout` for an unread notification and consume it.
    ///
    /// Returns immediately with a terminal notification once terminated.
    pub fn wait(&self, timeout: Duration) -> Option<Notification> {
        self.mailbox.wait(timeout)
    }

    /// Most recent notification delivered, without consuming it.
    pub fn latest(&self) -> Option<Notification> {
        self.mailbox.state.lock().latest
    }

    pub fn is_terminated(&self) -> bool {
        self.mailbox.state.lock().terminated
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.board.state.lock().subscribers.remove(&self.id);
    }
}

/// A structure's end of the board. Closing the last publisher terminates
/// the board.
pub struct Publisher {
    board: Arc<BoardInner>,
}

impl Publisher {
    /// Announce a new price to every subscriber.
    pub fn broadcast(&self, price: Decimal) -> usize {
        self.board.broadcast(Notification::price(price))
    }

    /// Close this publisher (same as dropping it).
    pub fn close(self) {}
}

impl Drop for Publisher {
    fn drop(&mut self) {
        let last = {
            let mut state = self.board.state.lock();
            state.open_publishers -= 1;
            state.open_publishers == 0
        };
        if last {
            self.board.broadcast(Notification::terminal());
        }
    }
}
