use crate::error::Error;
use flume::{Receiver, Sender};
use futures_core::Stream;
use std::sync::Arc;
use tracing::trace;

/// Connection event bus.
///
/// Wrapped in an Arc not to temper with the receiver count: events are
/// only forwarded when at least one external listener exists.
#[derive(Clone, Debug)]
pub(crate) struct Events(Arc<Inner>);

#[derive(Debug)]
struct Inner {
    sender: Sender<Event>,
    receiver: Receiver<Event>,
}

impl Events {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self(Arc::new(Inner { sender, receiver }))
    }

    pub(crate) fn sender(&self) -> EventsSender {
        EventsSender(self.0.sender.clone())
    }

    pub(crate) fn listener(&self) -> impl Stream<Item = Event> + Send + 'static {
        self.0.receiver.clone().into_stream()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct EventsSender(Sender<Event>);

impl EventsSender {
    fn send(&self, event: Event) {
        // Do nothing if we don't have at least one external receiver; the
        // connection is torn down either way.
        if self.0.receiver_count() > 1 {
            let _ = self.0.send(event);
        } else {
            trace!(?event, "no events listener");
        }
    }

    pub(crate) fn connected(&self) {
        self.send(Event::Connected);
    }

    pub(crate) fn secure_connected(&self) {
        self.send(Event::SecureConnected);
    }

    pub(crate) fn data(&self, bytes: usize) {
        self.send(Event::Data(bytes));
    }

    pub(crate) fn drain(&self) {
        self.send(Event::Drain);
    }

    pub(crate) fn end(&self) {
        self.send(Event::End);
    }

    pub(crate) fn closed(&self) {
        self.send(Event::Closed);
    }

    pub(crate) fn timeout(&self) {
        self.send(Event::Timeout);
    }

    pub(crate) fn error(&self, error: Error) {
        self.send(Event::Error(error));
    }

    pub(crate) fn ready(&self) {
        self.send(Event::Ready);
    }

    pub(crate) fn heartbeat(&self) {
        self.send(Event::Heartbeat);
    }

    pub(crate) fn blocked(&self, reason: String) {
        self.send(Event::Blocked(reason));
    }

    pub(crate) fn unblocked(&self) {
        self.send(Event::Unblocked);
    }
}

/// An event happening on the connection.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Event {
    /// TCP connection established.
    Connected,
    /// TLS handshake completed.
    SecureConnected,
    /// Bytes received from the transport.
    Data(usize),
    /// The send queue drained completely.
    Drain,
    /// The transport ended.
    End,
    /// Teardown finished.
    Closed,
    /// The initial connect deadline fired.
    Timeout,
    Error(Error),
    /// Handshake completed, channels are usable.
    Ready,
    /// A heartbeat frame arrived from the server.
    Heartbeat,
    /// Server asked us to stop publishing.
    Blocked(String),
    Unblocked,
}
