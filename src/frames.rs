use crate::error::{Error, Result};
use crate::frame::AMQPFrame;
use crate::protocol::AMQPClass;
use crate::types::ChannelId;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
};
use tracing::trace;

/// Resolved by the io loop when the server reply for a pending
/// request/reply method pair arrives on the channel.
pub(crate) type ReplyResolver = flume::Sender<Result<AMQPClass>>;

/// Outbound frame queue plus the per-channel expected replies.
///
/// Frames are serialized in pop order; a batch stays contiguous, which is
/// what keeps a publish's header and body frames glued to their
/// basic.publish (the server closes the connection otherwise).
#[derive(Clone, Default)]
pub(crate) struct Frames {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    current_batch: VecDeque<AMQPFrame>,
    frames: VecDeque<Outbound>,
    low_prio_frames: VecDeque<Outbound>,
    expected_replies: HashMap<ChannelId, VecDeque<ReplyResolver>>,
}

enum Outbound {
    Single(AMQPFrame),
    Batch(VecDeque<AMQPFrame>),
}

impl Frames {
    pub(crate) fn push(&self, frame: AMQPFrame) {
        self.inner.lock().frames.push_back(Outbound::Single(frame));
    }

    pub(crate) fn push_with_reply(
        &self,
        channel_id: ChannelId,
        frame: AMQPFrame,
        resolver: ReplyResolver,
    ) {
        let mut inner = self.inner.lock();
        inner.frames.push_back(Outbound::Single(frame));
        trace!(channel_id, "channel now waiting for a reply");
        inner
            .expected_replies
            .entry(channel_id)
            .or_default()
            .push_back(resolver);
    }

    /// Publish path: the whole method/header/body sequence is enqueued as
    /// one unit and later popped without interleaving.
    pub(crate) fn push_batch<I: IntoIterator<Item = AMQPFrame>>(&self, frames: I) {
        self.inner
            .lock()
            .low_prio_frames
            .push_back(Outbound::Batch(frames.into_iter().collect()));
    }

    /// Next frame to serialize. Publish batches are withheld while the
    /// server has us blocked; control frames keep flowing.
    pub(crate) fn pop(&self, flow: bool) -> Option<AMQPFrame> {
        let mut inner = self.inner.lock();
        if let Some(frame) = inner.current_batch.pop_front() {
            return Some(frame);
        }
        let next = match inner.frames.pop_front() {
            Some(next) => Some(next),
            None if flow => inner.low_prio_frames.pop_front(),
            None => None,
        };
        match next {
            Some(Outbound::Single(frame)) => Some(frame),
            Some(Outbound::Batch(batch)) => {
                inner.current_batch = batch;
                inner.current_batch.pop_front()
            }
            None => None,
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        let inner = self.inner.lock();
        !(inner.current_batch.is_empty()
            && inner.frames.is_empty()
            && inner.low_prio_frames.is_empty())
    }

    pub(crate) fn next_expected_reply(&self, channel_id: ChannelId) -> Option<ReplyResolver> {
        self.inner
            .lock()
            .expected_replies
            .get_mut(&channel_id)
            .and_then(|replies| replies.pop_front())
    }

    pub(crate) fn drop_pending(&self, error: Error) {
        let mut inner = self.inner.lock();
        inner.current_batch.clear();
        inner.frames.clear();
        inner.low_prio_frames.clear();
        for (_, replies) in inner.expected_replies.drain() {
            Self::cancel_expected_replies(replies, error.clone());
        }
    }

    pub(crate) fn clear_expected_replies(&self, channel_id: ChannelId, error: Error) {
        if let Some(replies) = self.inner.lock().expected_replies.remove(&channel_id) {
            Self::cancel_expected_replies(replies, error);
        }
    }

    fn cancel_expected_replies(replies: VecDeque<ReplyResolver>, error: Error) {
        for resolver in replies {
            let _ = resolver.send(Err(error.clone()));
        }
    }
}

impl fmt::Debug for Frames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Frames");
        if let Some(inner) = self.inner.try_lock() {
            debug
                .field("pending", &inner.frames.len())
                .field("low_prio", &inner.low_prio_frames.len())
                .field("expected_replies", &inner.expected_replies.len());
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn batches_stay_contiguous() {
        let frames = Frames::default();
        frames.push_batch(vec![
            AMQPFrame::Body(1, b"a".to_vec()),
            AMQPFrame::Body(1, b"b".to_vec()),
        ]);
        frames.push(AMQPFrame::Heartbeat(0));
        // control frame first (batches are low priority), then the whole
        // batch without interleaving
        assert_eq!(frames.pop(true), Some(AMQPFrame::Heartbeat(0)));
        assert_eq!(frames.pop(true), Some(AMQPFrame::Body(1, b"a".to_vec())));
        assert_eq!(frames.pop(true), Some(AMQPFrame::Body(1, b"b".to_vec())));
        assert_eq!(frames.pop(true), None);
    }

    #[test]
    fn blocked_connection_withholds_batches_only() {
        let frames = Frames::default();
        frames.push_batch(vec![AMQPFrame::Body(1, b"a".to_vec())]);
        frames.push(AMQPFrame::Heartbeat(0));
        assert_eq!(frames.pop(false), Some(AMQPFrame::Heartbeat(0)));
        assert_eq!(frames.pop(false), None);
        assert!(frames.has_pending());
        assert_eq!(frames.pop(true), Some(AMQPFrame::Body(1, b"a".to_vec())));
    }

    #[test]
    fn dropped_pending_resolves_waiters_with_the_error() {
        let frames = Frames::default();
        let (tx, rx) = flume::bounded(1);
        frames.push_with_reply(4, AMQPFrame::Heartbeat(4), tx);
        frames.drop_pending(ErrorKind::NotConnected.into());
        assert!(rx.recv().unwrap().is_err());
        assert!(!frames.has_pending());
    }
}
