use crate::error::Result;
use crate::types::FieldTable;
use std::{
    fmt,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Shared view of the connection lifecycle.
#[derive(Clone, Default)]
pub struct ConnectionStatus(Arc<RwLock<Inner>>);

/// Where the connection currently stands in its lifecycle.
///
/// The `AwaitingStart` → `AwaitingTune` → `AwaitingOpenOk` sequence tracks
/// the handshake; everything the state machine receives on channel 0 is
/// interpreted against this.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// TCP connect in flight; protocol header not yet written.
    Connecting,
    AwaitingStart,
    AwaitingTune,
    AwaitingOpenOk,
    Ready,
    Closing,
    Failed,
}

impl ConnectionStatus {
    pub fn state(&self) -> ConnectionState {
        self.read().state
    }

    pub(crate) fn set_state(&self, state: ConnectionState) -> ConnectionState {
        let mut inner = self.write();
        if state == ConnectionState::Ready {
            inner.ready_emitted = true;
        }
        std::mem::replace(&mut inner.state, state)
    }

    pub fn ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn connecting(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting
                | ConnectionState::AwaitingStart
                | ConnectionState::AwaitingTune
                | ConnectionState::AwaitingOpenOk
        )
    }

    pub fn closing(&self) -> bool {
        self.state() == ConnectionState::Closing
    }

    pub fn disconnected(&self) -> bool {
        self.state() == ConnectionState::Disconnected
    }

    pub fn failed(&self) -> bool {
        self.state() == ConnectionState::Failed
    }

    /// True iff the last transition into `Ready` was not followed by an
    /// error. Drives the premature-end authentication heuristic.
    pub(crate) fn ready_emitted(&self) -> bool {
        self.read().ready_emitted
    }

    pub(crate) fn clear_ready_emitted(&self) {
        self.write().ready_emitted = false;
    }

    pub fn blocked(&self) -> bool {
        self.read().blocked
    }

    pub fn blocked_reason(&self) -> Option<String> {
        self.read().blocked_reason.clone()
    }

    pub(crate) fn block(&self, reason: String) {
        let mut inner = self.write();
        inner.blocked = true;
        inner.blocked_reason = Some(reason);
    }

    pub(crate) fn unblock(&self) {
        let mut inner = self.write();
        inner.blocked = false;
        inner.blocked_reason = None;
    }

    pub fn server_properties(&self) -> FieldTable {
        self.read().server_properties.clone()
    }

    pub(crate) fn set_server_properties(&self, server_properties: FieldTable) {
        self.write().server_properties = server_properties;
    }

    /// Installs the one-shot waiter resolved when the handshake reaches
    /// `Ready` (or fails terminally).
    pub(crate) fn set_connect_waiter(&self, waiter: flume::Sender<Result<()>>) {
        self.write().connect_waiter = Some(waiter);
    }

    pub(crate) fn take_connect_waiter(&self) -> Option<flume::Sender<Result<()>>> {
        self.write().connect_waiter.take()
    }
}

struct Inner {
    state: ConnectionState,
    blocked: bool,
    blocked_reason: Option<String>,
    server_properties: FieldTable,
    ready_emitted: bool,
    connect_waiter: Option<flume::Sender<Result<()>>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            state: ConnectionState::default(),
            blocked: false,
            blocked_reason: None,
            server_properties: FieldTable::default(),
            ready_emitted: false,
            connect_waiter: None,
        }
    }
}

impl ConnectionStatus {
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.0.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ConnectionStatus");
        if let Ok(inner) = self.0.try_read() {
            debug
                .field("state", &inner.state)
                .field("blocked", &inner.blocked)
                .field("ready_emitted", &inner.ready_emitted);
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_transition_records_emission() {
        let status = ConnectionStatus::default();
        assert!(!status.ready_emitted());
        status.set_state(ConnectionState::Ready);
        assert!(status.ready_emitted());
        status.clear_ready_emitted();
        status.set_state(ConnectionState::Failed);
        assert!(!status.ready_emitted());
    }

    #[test]
    fn block_carries_the_reason() {
        let status = ConnectionStatus::default();
        status.block("low on memory".to_string());
        assert!(status.blocked());
        assert_eq!(status.blocked_reason().as_deref(), Some("low on memory"));
        status.unblock();
        assert!(!status.blocked());
        assert_eq!(status.blocked_reason(), None);
    }
}
