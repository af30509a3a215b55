use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use std::time::Duration;

/// Caller-side handle; dropping it or calling [`CancelHandle::cancel`]
/// cancels every token cloned from it.
pub struct CancelHandle {
    tx: Option<Sender<()>>,
}

impl CancelHandle {
    pub fn cancel(&mut self) {
        self.tx.take();
    }
}

/// Cancellation signal checked between batches and used for every wait.
///
/// Backed by a zero-capacity channel nobody ever sends on: cancelling drops
/// the sender, which wakes all blocked receivers at once.
#[derive(Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
    _keepalive: Option<Sender<()>>,
}

impl CancelToken {
    pub fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = bounded(0);
        (
            CancelHandle { tx: Some(tx) },
            CancelToken {
                rx,
                _keepalive: None,
            },
        )
    }

    /// A token that is never cancelled.
    pub fn never() -> CancelToken {
        let (tx, rx) = bounded(0);
        CancelToken {
            rx,
            _keepalive: Some(tx),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleeps for `duration` unless cancelled first. Returns false if
    /// cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_cancelled();
        }
        matches!(self.rx.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}
