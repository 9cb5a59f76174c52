//! Values negotiated during the Connection.Tune exchange.
//!
//! Per-connection state: nothing here is shared across connections.

use crate::protocol::constants;
use crate::types::{ChannelId, FrameSize, Heartbeat};
use std::{
    fmt,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

#[derive(Clone)]
pub struct Configuration {
    inner: Arc<RwLock<Inner>>,
}

struct Inner {
    channel_max: ChannelId,
    frame_max: FrameSize,
    heartbeat: Heartbeat,
}

impl Configuration {
    pub(crate) fn new(requested_heartbeat: Heartbeat) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                channel_max: constants::DEFAULT_CHANNEL_MAX,
                frame_max: constants::DEFAULT_FRAME_MAX,
                heartbeat: requested_heartbeat,
            })),
        }
    }

    pub fn channel_max(&self) -> ChannelId {
        self.read_inner().channel_max
    }

    pub(crate) fn set_channel_max(&self, channel_max: ChannelId) {
        self.write_inner().channel_max = channel_max;
    }

    pub fn frame_max(&self) -> FrameSize {
        self.read_inner().frame_max
    }

    pub(crate) fn set_frame_max(&self, frame_max: FrameSize) {
        // Anything below the frame overhead could not even carry an empty
        // body frame.
        let frame_max = frame_max.max(constants::FRAME_OVERHEAD);
        self.write_inner().frame_max = frame_max;
    }

    pub fn heartbeat(&self) -> Heartbeat {
        self.read_inner().heartbeat
    }

    pub(crate) fn set_heartbeat(&self, heartbeat: Heartbeat) {
        self.write_inner().heartbeat = heartbeat;
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read_inner();
        f.debug_struct("Configuration")
            .field("channel_max", &inner.channel_max)
            .field("frame_max", &inner.frame_max)
            .field("heartbeat", &inner.heartbeat)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_max_is_clamped_to_the_overhead() {
        let configuration = Configuration::new(0);
        configuration.set_frame_max(1);
        assert_eq!(configuration.frame_max(), constants::FRAME_OVERHEAD);
        configuration.set_frame_max(131_072);
        assert_eq!(configuration.frame_max(), 131_072);
    }
}
