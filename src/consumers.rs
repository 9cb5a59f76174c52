use crate::consumer::{Consumer, ConsumerState};
use crate::error::Error;
use crate::message::Delivery;
use crate::types::ShortString;
use parking_lot::Mutex;
use std::{collections::HashMap, fmt, sync::Arc};

/// The tag → consumer registry of one channel.
#[derive(Clone, Default)]
pub(crate) struct Consumers(Arc<Mutex<HashMap<ShortString, Consumer>>>);

impl Consumers {
    pub(crate) fn register(&self, tag: ShortString, consumer: Consumer) {
        self.0.lock().insert(tag, consumer);
    }

    pub(crate) fn deregister(&self, tag: &str) -> Option<Consumer> {
        self.0.lock().remove(tag)
    }

    pub(crate) fn contains(&self, tag: &str) -> bool {
        self.0.lock().contains_key(tag)
    }

    pub(crate) fn start_delivery(&self, tag: &str, delivery: Delivery) {
        if let Some(consumer) = self.0.lock().get(tag).cloned() {
            consumer.start_delivery(delivery);
        }
    }

    /// ConsumeOk seen for an already-known tag: the replayed subscription
    /// of a recovering channel.
    pub(crate) fn reactivate(&self, tag: &str) {
        if let Some(consumer) = self.0.lock().get(tag) {
            consumer.set_state(ConsumerState::Active);
        }
    }

    /// Connection teardown: every consumer is marked closed so recovery
    /// knows to resubscribe it.
    pub(crate) fn error(&self, error: Error) {
        for consumer in self.0.lock().values() {
            consumer.error(error.clone());
        }
    }

    pub(crate) fn cancel_all(&self) {
        for (_, consumer) in self.0.lock().drain() {
            consumer.canceled();
        }
    }

    /// The subscriptions to replay after the channel re-opens.
    pub(crate) fn to_resubscribe(&self) -> Vec<Consumer> {
        self.0
            .lock()
            .values()
            .filter(|consumer| consumer.state() == ConsumerState::Closed)
            .cloned()
            .collect()
    }
}

impl fmt::Debug for Consumers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_tuple("Consumers");
        if let Some(consumers) = self.0.try_lock() {
            debug.field(&*consumers);
        }
        debug.finish()
    }
}
