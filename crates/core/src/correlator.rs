//! Pending-request correlator.
//!
//! Deep-link callbacks arrive as independent events, so the call that opened
//! the link cannot simply await a response on its own stack. Instead it
//! registers a waiter here, keyed by request kind, and whichever code path
//! handles the callback settles that waiter. Each kind has a single slot:
//! registering again supersedes (rejects) the previous waiter, and every
//! waiter carries a deadline after which it rejects with a timeout.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, Either};
use tracing::{debug, warn};

use crate::error::{WalletError, WalletResult};
use crate::service::{ConnectedWallet, PaymentReceipt};
use crate::timer::{self, Instant};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(120);
pub const PAYMENT_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Connect,
    Payment,
}

impl RequestKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connect => "Wallet connection",
            Self::Payment => "Payment confirmation",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("connect"),
            Self::Payment => f.write_str("payment"),
        }
    }
}

struct Outstanding<T> {
    generation: u64,
    deadline: Instant,
    tx: oneshot::Sender<WalletResult<T>>,
}

struct SlotInner<T> {
    current: Option<Outstanding<T>>,
    next_generation: u64,
}

/// Single-slot future registry for one request kind.
pub struct PendingSlot<T> {
    kind: RequestKind,
    timeout: Duration,
    inner: Rc<RefCell<SlotInner<T>>>,
}

impl<T> PendingSlot<T> {
    pub fn new(kind: RequestKind, timeout: Duration) -> Self {
        Self {
            kind,
            timeout,
            inner: Rc::new(RefCell::new(SlotInner {
                current: None,
                next_generation: 1,
            })),
        }
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Register a new waiter, rejecting any outstanding one with `Superseded`.
    pub fn register(&self) -> PendingRequest<T> {
        let mut inner = self.inner.borrow_mut();
        if let Some(old) = inner.current.take() {
            debug!(
                "[correlator] {} request #{} superseded",
                self.kind, old.generation
            );
            let _ = old.tx.send(Err(WalletError::Superseded(self.kind)));
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;
        let deadline = Instant::now() + self.timeout;
        let (tx, rx) = oneshot::channel();
        inner.current = Some(Outstanding {
            generation,
            deadline,
            tx,
        });
        debug!("[correlator] {} request #{} registered", self.kind, generation);

        PendingRequest {
            kind: self.kind,
            generation,
            deadline,
            rx,
            slot: Rc::downgrade(&self.inner),
        }
    }

    /// Settle the outstanding waiter successfully. No-op when nothing is pending.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle the outstanding waiter with an error. No-op when nothing is pending.
    pub fn reject(&self, err: WalletError) -> bool {
        self.settle(Err(err))
    }

    pub fn is_pending(&self) -> bool {
        self.expire_overdue();
        self.inner.borrow().current.is_some()
    }

    fn settle(&self, outcome: WalletResult<T>) -> bool {
        self.expire_overdue();
        let taken = self.inner.borrow_mut().current.take();
        match taken {
            Some(outstanding) => {
                let ok = outcome.is_ok();
                if outstanding.tx.send(outcome).is_err() {
                    debug!(
                        "[correlator] {} request #{} settled after its waiter was dropped",
                        self.kind, outstanding.generation
                    );
                } else {
                    debug!(
                        "[correlator] {} request #{} settled (ok={})",
                        self.kind, outstanding.generation, ok
                    );
                }
                true
            }
            None => false,
        }
    }

    // Runs on every slot access so an unpolled waiter still expires on time.
    fn expire_overdue(&self) {
        let mut inner = self.inner.borrow_mut();
        let stale = match inner.current.as_ref() {
            Some(o) => Instant::now() >= o.deadline || o.tx.is_canceled(),
            None => false,
        };
        if !stale {
            return;
        }
        if let Some(o) = inner.current.take() {
            if !o.tx.is_canceled() {
                warn!("[correlator] {} request #{} timed out", self.kind, o.generation);
                let _ = o.tx.send(Err(WalletError::Timeout(self.kind)));
            }
        }
    }
}

/// Handle for a registered waiter.
#[must_use = "a pending request does nothing unless awaited"]
pub struct PendingRequest<T> {
    kind: RequestKind,
    generation: u64,
    deadline: Instant,
    rx: oneshot::Receiver<WalletResult<T>>,
    slot: Weak<RefCell<SlotInner<T>>>,
}

impl<T> PendingRequest<T> {
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Wait for settlement or the deadline, whichever comes first.
    pub async fn wait(self) -> WalletResult<T> {
        let PendingRequest {
            kind,
            generation,
            deadline,
            rx,
            slot,
        } = self;

        let expiry = Box::pin(timer::sleep_until(deadline));
        match future::select(rx, expiry).await {
            Either::Left((Ok(outcome), _)) => outcome,
            Either::Left((Err(_), _)) => Err(WalletError::Cancelled(kind)),
            Either::Right(((), mut rx)) => {
                if let Ok(Some(outcome)) = rx.try_recv() {
                    return outcome;
                }
                if let Some(inner) = slot.upgrade() {
                    let mut inner = inner.borrow_mut();
                    let ours = inner
                        .current
                        .as_ref()
                        .map(|o| o.generation == generation)
                        .unwrap_or(false);
                    if ours {
                        inner.current = None;
                    }
                }
                warn!("[correlator] {} request #{} timed out", kind, generation);
                Err(WalletError::Timeout(kind))
            }
        }
    }
}

/// The two request kinds the wallet protocol correlates.
pub struct PendingRequests {
    pub connect: PendingSlot<ConnectedWallet>,
    pub payment: PendingSlot<PaymentReceipt>,
}

impl PendingRequests {
    pub fn new(connect_timeout: Duration, payment_timeout: Duration) -> Self {
        Self {
            connect: PendingSlot::new(RequestKind::Connect, connect_timeout),
            payment: PendingSlot::new(RequestKind::Payment, payment_timeout),
        }
    }

    /// Reject whatever is outstanding in both slots.
    pub fn reject_all(&self, err: WalletError) {
        self.connect.reject(err.clone());
        self.payment.reject(err);
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new(CONNECT_TIMEOUT, PAYMENT_TIMEOUT)
    }
}
