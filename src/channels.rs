use crate::channel::Channel;
use crate::channel_status::ChannelState;
use crate::configuration::Configuration;
use crate::connection_status::ConnectionStatus;
use crate::error::{Error, ErrorKind, Result};
use crate::frame::ContentHeader;
use crate::frames::Frames;
use crate::id_sequence::IdSequence;
use crate::protocol::AMQPClass;
use crate::types::ChannelId;
use crate::waker::Waker;
use parking_lot::Mutex;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::debug;

/// Registry of the connection's nonzero channels.
///
/// Channel 0 is the connection's own control channel and is dispatched by
/// the io loop straight into the connection state machine; only real
/// multiplexed channels live here.
#[derive(Clone)]
pub(crate) struct Channels {
    inner: Arc<Mutex<Inner>>,
    configuration: Configuration,
    connection_status: ConnectionStatus,
    frames: Frames,
    waker: Waker,
}

struct Inner {
    channels: HashMap<ChannelId, Channel>,
    channel_id: IdSequence,
}

impl Channels {
    pub(crate) fn new(
        configuration: Configuration,
        connection_status: ConnectionStatus,
        frames: Frames,
        waker: Waker,
    ) -> Self {
        let channel_id = IdSequence::new(configuration.channel_max());
        Self {
            inner: Arc::new(Mutex::new(Inner {
                channels: HashMap::default(),
                channel_id,
            })),
            configuration,
            connection_status,
            frames,
            waker,
        }
    }

    /// Allocates the next free channel id, scanning upward from the last
    /// handed-out id and wrapping once. A full fruitless cycle means the
    /// negotiated limit is exhausted.
    pub(crate) fn create(&self) -> Result<Channel> {
        let mut inner = self.inner.lock();
        inner.channel_id.set_max(self.configuration.channel_max());
        let first_id = inner.channel_id.next();
        let mut id = first_id;
        loop {
            if !inner.channels.contains_key(&id) {
                debug!(channel = id, "create channel");
                let channel = Channel::new(
                    id,
                    self.configuration.clone(),
                    self.connection_status.clone(),
                    self.frames.clone(),
                    self.waker.clone(),
                );
                inner.channels.insert(id, channel.clone());
                return Ok(channel);
            }
            id = inner.channel_id.next();
            if id == first_id {
                return Err(ErrorKind::ChannelsLimitReached.into());
            }
        }
    }

    pub(crate) fn get(&self, id: ChannelId) -> Option<Channel> {
        self.inner.lock().channels.get(&id).cloned()
    }

    pub(crate) fn remove(&self, id: ChannelId) {
        self.inner.lock().channels.remove(&id);
    }

    pub(crate) fn receive_method(&self, id: ChannelId, method: AMQPClass) -> Result<()> {
        match self.get(id) {
            Some(channel) => {
                channel.receive_method(method)?;
                // the handler releases its slot by going closed
                if channel.status().state() == ChannelState::Closed {
                    self.remove(id);
                }
                Ok(())
            }
            None => {
                debug!(channel = id, method = method.method_name(), "method for unknown channel dropped");
                Ok(())
            }
        }
    }

    pub(crate) fn handle_content_header_frame(
        &self,
        id: ChannelId,
        header: ContentHeader,
    ) -> Result<()> {
        match self.get(id) {
            Some(channel) => channel.handle_content_header_frame(header),
            None => {
                debug!(channel = id, "content header for unknown channel dropped");
                Ok(())
            }
        }
    }

    pub(crate) fn handle_body_frame(&self, id: ChannelId, payload: Vec<u8>) -> Result<()> {
        match self.get(id) {
            Some(channel) => channel.handle_body_frame(payload),
            None => {
                debug!(channel = id, "body frame for unknown channel dropped");
                Ok(())
            }
        }
    }

    /// Connection-wide teardown: every channel goes closed (its consumers
    /// marked for resubscription), every queued frame and waiter dies.
    pub(crate) fn set_connection_error(&self, error: Error) {
        for channel in self.inner.lock().channels.values() {
            channel.set_connection_error(error.clone());
        }
        self.frames.drop_pending(error);
    }

    /// Ready after a reconnect: replay every surviving channel.
    pub(crate) fn recover_all(&self) {
        for channel in self.inner.lock().channels.values() {
            channel.recover();
        }
        self.waker.wake();
    }
}

impl fmt::Debug for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Channels");
        if let Some(inner) = self.inner.try_lock() {
            debug
                .field("count", &inner.channels.len())
                .field("channel_id", &inner.channel_id);
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels_with_max(channel_max: ChannelId) -> Channels {
        let configuration = Configuration::new(0);
        configuration.set_channel_max(channel_max);
        Channels::new(
            configuration,
            ConnectionStatus::default(),
            Frames::default(),
            Waker::default(),
        )
    }

    #[test]
    fn allocated_ids_are_distinct_and_in_range() {
        let channels = channels_with_max(16);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..16 {
            let id = channels.create().unwrap().id();
            assert!((1..=16).contains(&id));
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn exhaustion_fails_and_release_reuses_the_slot() {
        let channels = channels_with_max(3);
        let ids: Vec<ChannelId> = (0..3).map(|_| channels.create().unwrap().id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        let err = channels.create().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ChannelsLimitReached));
        channels.remove(2);
        assert_eq!(channels.create().unwrap().id(), 2);
    }

    #[test]
    fn allocation_scans_upward_from_the_counter() {
        let channels = channels_with_max(4);
        for _ in 0..3 {
            channels.create().unwrap();
        }
        channels.remove(1);
        // counter sits at 3, so the next scan wraps past 4 down to 1
        assert_eq!(channels.create().unwrap().id(), 4);
        assert_eq!(channels.create().unwrap().id(), 1);
    }
}
