use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handle used to wake the io loop after enqueuing frames.
///
/// Registered once the poll instance exists; waking before that is a
/// no-op, which is fine: the loop drains the queue on startup anyway.
#[derive(Clone, Default)]
pub(crate) struct Waker(Arc<Mutex<Option<mio::Waker>>>);

impl Waker {
    pub(crate) fn register(&self, waker: mio::Waker) {
        *self.0.lock() = Some(waker);
    }

    pub(crate) fn wake(&self) {
        if let Some(waker) = &*self.0.lock() {
            let _ = waker.wake();
        }
    }
}

impl std::fmt::Debug for Waker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waker").finish()
    }
}
