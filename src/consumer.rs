use crate::message::Delivery;
use crate::protocol::basic;
use crate::types::ShortString;
use parking_lot::Mutex;
use std::{fmt, sync::Arc};

/// Callbacks invoked for a consumer's lifecycle.
///
/// Delegates run on the connection's io thread: a delegate that blocks
/// stalls frame processing for the whole connection.
pub trait ConsumerDelegate: Send + Sync + 'static {
    fn on_new_delivery(&self, delivery: Delivery);

    fn on_canceled(&self) {}

    fn on_error(&self, _error: crate::Error) {}
}

impl<F: Fn(Delivery) + Send + Sync + 'static> ConsumerDelegate for F {
    fn on_new_delivery(&self, delivery: Delivery) {
        self(delivery)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum ConsumerState {
    #[default]
    Active,
    /// Marked during connection teardown; resubscribed on recovery.
    Closed,
}

/// A single subscription on a channel, addressed by its consumer tag.
#[derive(Clone)]
pub(crate) struct Consumer {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    tag: ShortString,
    queue: ShortString,
    options: basic::Consume,
    state: ConsumerState,
    delegate: Arc<dyn ConsumerDelegate>,
}

impl Consumer {
    pub(crate) fn new(
        tag: ShortString,
        queue: ShortString,
        options: basic::Consume,
        delegate: Arc<dyn ConsumerDelegate>,
    ) -> Consumer {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                tag,
                queue,
                options,
                state: ConsumerState::Active,
                delegate,
            })),
        }
    }

    pub(crate) fn state(&self) -> ConsumerState {
        self.inner.lock().state
    }

    pub(crate) fn set_state(&self, state: ConsumerState) {
        self.inner.lock().state = state;
    }

    /// The basic.consume to replay when the channel recovers, carrying the
    /// original tag so deliveries resume addressing this consumer.
    pub(crate) fn resubscribe_method(&self) -> basic::Consume {
        let inner = self.inner.lock();
        basic::Consume {
            queue: inner.queue.clone(),
            consumer_tag: inner.tag.clone(),
            ..inner.options.clone()
        }
    }

    pub(crate) fn start_delivery(&self, delivery: Delivery) {
        let delegate = self.inner.lock().delegate.clone();
        delegate.on_new_delivery(delivery);
    }

    pub(crate) fn canceled(&self) {
        let delegate = self.inner.lock().delegate.clone();
        delegate.on_canceled();
    }

    pub(crate) fn error(&self, error: crate::Error) {
        let delegate = {
            let mut inner = self.inner.lock();
            inner.state = ConsumerState::Closed;
            inner.delegate.clone()
        };
        delegate.on_error(error);
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Consumer");
        if let Some(inner) = self.inner.try_lock() {
            debug
                .field("tag", &inner.tag)
                .field("queue", &inner.queue)
                .field("state", &inner.state);
        }
        debug.finish()
    }
}
