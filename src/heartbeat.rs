use crate::types::Heartbeat as HeartbeatInterval;
use parking_lot::Mutex;
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

/// What the io loop should do for liveness this iteration.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HeartbeatState {
    Idle,
    /// The outbound interval elapsed with no traffic; send a heartbeat
    /// frame if the transport is writable.
    SendHeartbeat,
    /// Nothing inbound for the whole grace period; the variant carries the
    /// grace in seconds.
    Dead(u64),
}

/// Bidirectional liveness timers.
///
/// Outbound fires `interval` after the last outbound frame. Inbound fires
/// after twice the interval with no inbound bytes; by default it stands
/// down while the transport still looks readable, unless
/// `force_reconnect` was requested.
#[derive(Clone)]
pub(crate) struct Heartbeat {
    force_reconnect: bool,
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    last_read: Instant,
    last_write: Instant,
    interval: Option<Duration>,
}

impl Heartbeat {
    pub(crate) fn new(force_reconnect: bool) -> Self {
        Self {
            force_reconnect,
            inner: Arc::new(Mutex::new(Inner {
                last_read: Instant::now(),
                last_write: Instant::now(),
                interval: None,
            })),
        }
    }

    /// (Re)arms both timers; 0 seconds keeps them disabled.
    pub(crate) fn arm(&self, interval: HeartbeatInterval) {
        let mut inner = self.inner.lock();
        inner.interval = (interval != 0).then(|| Duration::from_secs(u64::from(interval)));
        let now = Instant::now();
        inner.last_read = now;
        inner.last_write = now;
    }

    pub(crate) fn cancel(&self) {
        self.inner.lock().interval = None;
    }

    pub(crate) fn update_last_write(&self) {
        self.inner.lock().last_write = Instant::now();
    }

    pub(crate) fn update_last_read(&self) {
        self.inner.lock().last_read = Instant::now();
    }

    /// How long the io loop may sleep before one of the timers is due.
    pub(crate) fn poll_timeout(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        let interval = inner.interval?;
        let now = Instant::now();
        let outbound = (inner.last_write + interval).saturating_duration_since(now);
        let inbound = (inner.last_read + 2 * interval).saturating_duration_since(now);
        Some(outbound.min(inbound).max(Duration::from_millis(1)))
    }

    /// Checks both deadlines. `transport_readable` reports whether the
    /// socket still looks alive; a half-dead transport only trips the
    /// inbound timer when `force_reconnect` is set.
    pub(crate) fn poll(&self, transport_readable: bool) -> HeartbeatState {
        let mut inner = self.inner.lock();
        let interval = match inner.interval {
            Some(interval) => interval,
            None => return HeartbeatState::Idle,
        };
        let now = Instant::now();
        let grace = 2 * interval;
        if now.duration_since(inner.last_read) >= grace {
            if transport_readable && !self.force_reconnect {
                // stand down and re-arm
                inner.last_read = now;
            } else {
                inner.interval = None;
                return HeartbeatState::Dead(grace.as_secs());
            }
        }
        if now.duration_since(inner.last_write) >= interval {
            // Update last_write up front so a backpressured socket does not
            // enqueue countless heartbeats.
            inner.last_write = now;
            return HeartbeatState::SendHeartbeat;
        }
        HeartbeatState::Idle
    }
}

impl fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heartbeat").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewind(heartbeat: &Heartbeat, read_back: Duration, write_back: Duration) {
        let mut inner = heartbeat.inner.lock();
        let now = Instant::now();
        inner.last_read = now - read_back;
        inner.last_write = now - write_back;
    }

    #[test]
    fn disabled_heartbeat_does_nothing() {
        let heartbeat = Heartbeat::new(false);
        heartbeat.arm(0);
        assert_eq!(heartbeat.poll_timeout(), None);
        assert_eq!(heartbeat.poll(true), HeartbeatState::Idle);
    }

    #[test]
    fn outbound_fires_after_the_interval() {
        let heartbeat = Heartbeat::new(false);
        heartbeat.arm(1);
        assert_eq!(heartbeat.poll(true), HeartbeatState::Idle);
        rewind(&heartbeat, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(heartbeat.poll(true), HeartbeatState::SendHeartbeat);
        // re-armed by the send
        assert_eq!(heartbeat.poll(true), HeartbeatState::Idle);
    }

    #[test]
    fn inbound_grace_is_twice_the_interval() {
        let heartbeat = Heartbeat::new(true);
        heartbeat.arm(1);
        rewind(&heartbeat, Duration::from_secs(1), Duration::ZERO);
        assert_eq!(heartbeat.poll(true), HeartbeatState::Idle);
        rewind(&heartbeat, Duration::from_secs(2), Duration::ZERO);
        assert_eq!(heartbeat.poll(true), HeartbeatState::Dead(2));
        // timers are canceled once dead
        assert_eq!(heartbeat.poll(true), HeartbeatState::Idle);
    }

    #[test]
    fn readable_transport_defers_the_inbound_timeout() {
        let heartbeat = Heartbeat::new(false);
        heartbeat.arm(1);
        rewind(&heartbeat, Duration::from_secs(5), Duration::ZERO);
        assert_eq!(heartbeat.poll(true), HeartbeatState::Idle);
        // an unreadable transport is dead regardless
        rewind(&heartbeat, Duration::from_secs(5), Duration::ZERO);
        assert_eq!(heartbeat.poll(false), HeartbeatState::Dead(2));
    }

    #[test]
    fn poll_timeout_tracks_the_nearest_deadline() {
        let heartbeat = Heartbeat::new(false);
        heartbeat.arm(2);
        let timeout = heartbeat.poll_timeout().unwrap();
        assert!(timeout <= Duration::from_secs(2));
        assert!(timeout > Duration::from_millis(1500));
    }
}
