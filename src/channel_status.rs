use parking_lot::Mutex;
use std::{fmt, sync::Arc};

/// Shared view of a single channel's lifecycle.
#[derive(Clone, Default)]
pub struct ChannelStatus {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChannelState {
    /// Channel.Open sent, OpenOk not yet received.
    #[default]
    Initial,
    Connected,
    Closing,
    Closed,
    Error,
}

impl ChannelStatus {
    pub fn state(&self) -> ChannelState {
        self.inner.lock().state
    }

    pub(crate) fn set_state(&self, state: ChannelState) {
        self.inner.lock().state = state;
    }

    pub fn initializing(&self) -> bool {
        self.state() == ChannelState::Initial
    }

    pub fn connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    pub fn closing(&self) -> bool {
        self.state() == ChannelState::Closing
    }

    pub fn confirm(&self) -> bool {
        self.inner.lock().confirm
    }

    pub(crate) fn set_confirm(&self) {
        self.inner.lock().confirm = true;
    }
}

#[derive(Default)]
struct Inner {
    state: ChannelState,
    confirm: bool,
}

impl fmt::Debug for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ChannelStatus");
        if let Some(inner) = self.inner.try_lock() {
            debug
                .field("state", &inner.state)
                .field("confirm", &inner.confirm);
        }
        debug.finish()
    }
}
