use crate::channel_status::{ChannelState, ChannelStatus};
use crate::configuration::Configuration;
use crate::connection_status::ConnectionStatus;
use crate::consumer::{Consumer, ConsumerDelegate};
use crate::consumers::Consumers;
use crate::error::{Error, ErrorKind, Result};
use crate::exchange::ExchangeKind;
use crate::frame::{self, AMQPFrame, ContentHeader};
use crate::frames::Frames;
use crate::message::{Delivery, Payload};
use crate::protocol::{self, AMQPClass, BasicProperties, basic, channel, confirm, exchange, queue, tx};
use crate::queue::Queue;
use crate::types::{ChannelId, DeliveryTag, FieldTable, ShortString};
use crate::waker::Waker;
use self::options::*;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Options carried by the channel operations, mirroring the bit fields of
/// the corresponding methods.
pub mod options {
    use serde::{Deserialize, Serialize};

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct ExchangeDeclareOptions {
        #[serde(default)]
        pub passive: bool,
        #[serde(default)]
        pub durable: bool,
        #[serde(default)]
        pub auto_delete: bool,
        #[serde(default)]
        pub internal: bool,
        #[serde(default)]
        pub nowait: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct ExchangeDeleteOptions {
        #[serde(default)]
        pub if_unused: bool,
        #[serde(default)]
        pub nowait: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct QueueDeclareOptions {
        #[serde(default)]
        pub passive: bool,
        #[serde(default)]
        pub durable: bool,
        #[serde(default)]
        pub exclusive: bool,
        #[serde(default)]
        pub auto_delete: bool,
        #[serde(default)]
        pub nowait: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct QueueBindOptions {
        #[serde(default)]
        pub nowait: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct QueuePurgeOptions {
        #[serde(default)]
        pub nowait: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct QueueDeleteOptions {
        #[serde(default)]
        pub if_unused: bool,
        #[serde(default)]
        pub if_empty: bool,
        #[serde(default)]
        pub nowait: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct BasicQosOptions {
        #[serde(default)]
        pub global: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct BasicConsumeOptions {
        #[serde(default)]
        pub no_local: bool,
        #[serde(default)]
        pub no_ack: bool,
        #[serde(default)]
        pub exclusive: bool,
        #[serde(default)]
        pub nowait: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct BasicCancelOptions {
        #[serde(default)]
        pub nowait: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct BasicPublishOptions {
        #[serde(default)]
        pub mandatory: bool,
        #[serde(default)]
        pub immediate: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct BasicAckOptions {
        #[serde(default)]
        pub multiple: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct BasicNackOptions {
        #[serde(default)]
        pub multiple: bool,
        #[serde(default)]
        pub requeue: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct BasicRejectOptions {
        #[serde(default)]
        pub requeue: bool,
    }

    #[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct ConfirmSelectOptions {
        #[serde(default)]
        pub nowait: bool,
    }
}

/// A single multiplexed stream within the connection.
///
/// Cheap to clone; all channel state is shared behind the handle. The
/// request/reply operations block the calling thread until the server
/// replies, so they must not be invoked from a consumer delegate (which
/// runs on the io thread).
#[derive(Clone)]
pub struct Channel {
    id: ChannelId,
    configuration: Configuration,
    connection_status: ConnectionStatus,
    status: ChannelStatus,
    frames: Frames,
    consumers: Consumers,
    waker: Waker,
    pending_content: Arc<Mutex<Option<PendingContent>>>,
    /// Consume requests in flight, registered by the io thread as their
    /// consume-ok arrives so no early delivery can slip past.
    pending_consumers: Arc<Mutex<VecDeque<(basic::Consume, Arc<dyn ConsumerDelegate>)>>>,
}

/// Content method waiting for its header and body frames.
struct PendingContent {
    method: basic::Methods,
    header: Option<ContentHeader>,
    body: Vec<u8>,
}

impl PendingContent {
    fn complete(&self) -> bool {
        self.header
            .as_ref()
            .is_some_and(|header| self.body.len() as u64 >= header.body_size)
    }
}

impl Channel {
    pub(crate) fn new(
        id: ChannelId,
        configuration: Configuration,
        connection_status: ConnectionStatus,
        frames: Frames,
        waker: Waker,
    ) -> Channel {
        Self {
            id,
            configuration,
            connection_status,
            status: ChannelStatus::default(),
            frames,
            consumers: Consumers::default(),
            waker,
            pending_content: Arc::new(Mutex::new(None)),
            pending_consumers: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn status(&self) -> &ChannelStatus {
        &self.status
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.connection_status.ready() {
            return Err(ErrorKind::InvalidConnectionState(self.connection_status.state()).into());
        }
        if !self.status.connected() {
            return Err(ErrorKind::InvalidChannelState(self.status.state()).into());
        }
        Ok(())
    }

    /// Sends `method` and blocks until the server's reply for it arrives.
    fn rpc(&self, method: AMQPClass) -> Result<AMQPClass> {
        let (resolver, reply) = flume::bounded(1);
        self.frames
            .push_with_reply(self.id, AMQPFrame::Method(self.id, method), resolver);
        self.waker.wake();
        reply
            .recv()
            .map_err(|_| Error::from(ErrorKind::NotConnected))?
    }

    fn send(&self, method: AMQPClass) {
        self.frames.push(AMQPFrame::Method(self.id, method));
        self.waker.wake();
    }

    /// A nowait request gets no reply from the server; synthesize the Ok
    /// locally the way the wire contract promises it.
    fn rpc_nowait(
        &self,
        method: AMQPClass,
        nowait: bool,
        synthesized: AMQPClass,
    ) -> Result<AMQPClass> {
        if nowait {
            self.send(method);
            Ok(synthesized)
        } else {
            self.rpc(method)
        }
    }

    /// Channel.Open round trip; the registry created us in `Initial`.
    pub(crate) fn open(&self) -> Result<()> {
        match self.rpc(AMQPClass::Channel(channel::Methods::Open))? {
            AMQPClass::Channel(channel::Methods::OpenOk) => Ok(()),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    pub fn close(&self, reply_code: u16, reply_text: &str) -> Result<()> {
        self.ensure_connected()?;
        self.status.set_state(ChannelState::Closing);
        match self.rpc(AMQPClass::Channel(channel::Methods::Close(channel::Close {
            reply_code,
            reply_text: reply_text.to_string(),
            class_id: 0,
            method_id: 0,
        })))? {
            AMQPClass::Channel(channel::Methods::CloseOk) => Ok(()),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    pub fn exchange_declare(
        &self,
        exchange: &str,
        kind: ExchangeKind,
        opts: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<()> {
        self.ensure_connected()?;
        let method = AMQPClass::Exchange(exchange::Methods::Declare(exchange::Declare {
            exchange: exchange.to_string(),
            kind: kind.as_str().to_string(),
            passive: opts.passive,
            durable: opts.durable,
            auto_delete: opts.auto_delete,
            internal: opts.internal,
            nowait: opts.nowait,
            arguments,
        }));
        let reply = AMQPClass::Exchange(exchange::Methods::DeclareOk);
        match self.rpc_nowait(method, opts.nowait, reply)? {
            AMQPClass::Exchange(exchange::Methods::DeclareOk) => Ok(()),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    pub fn exchange_delete(&self, exchange: &str, opts: ExchangeDeleteOptions) -> Result<()> {
        self.ensure_connected()?;
        let method = AMQPClass::Exchange(exchange::Methods::Delete(exchange::Delete {
            exchange: exchange.to_string(),
            if_unused: opts.if_unused,
            nowait: opts.nowait,
        }));
        let reply = AMQPClass::Exchange(exchange::Methods::DeleteOk);
        match self.rpc_nowait(method, opts.nowait, reply)? {
            AMQPClass::Exchange(exchange::Methods::DeleteOk) => Ok(()),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    pub fn queue_declare(
        &self,
        queue: &str,
        opts: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<Queue> {
        self.ensure_connected()?;
        let method = AMQPClass::Queue(queue::Methods::Declare(queue::Declare {
            queue: queue.to_string(),
            passive: opts.passive,
            durable: opts.durable,
            exclusive: opts.exclusive,
            auto_delete: opts.auto_delete,
            nowait: opts.nowait,
            arguments,
        }));
        let reply = AMQPClass::Queue(queue::Methods::DeclareOk(queue::DeclareOk {
            queue: queue.to_string(),
            message_count: 0,
            consumer_count: 0,
        }));
        match self.rpc_nowait(method, opts.nowait, reply)? {
            AMQPClass::Queue(queue::Methods::DeclareOk(ok)) => Ok(Queue::new(
                self.clone(),
                ok.queue,
                ok.message_count,
                ok.consumer_count,
            )),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    pub fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        opts: QueueBindOptions,
        arguments: FieldTable,
    ) -> Result<()> {
        self.ensure_connected()?;
        let method = AMQPClass::Queue(queue::Methods::Bind(queue::Bind {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            nowait: opts.nowait,
            arguments,
        }));
        let reply = AMQPClass::Queue(queue::Methods::BindOk);
        match self.rpc_nowait(method, opts.nowait, reply)? {
            AMQPClass::Queue(queue::Methods::BindOk) => Ok(()),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    pub fn queue_unbind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Result<()> {
        self.ensure_connected()?;
        match self.rpc(AMQPClass::Queue(queue::Methods::Unbind(queue::Unbind {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            arguments,
        })))? {
            AMQPClass::Queue(queue::Methods::UnbindOk) => Ok(()),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    pub fn queue_purge(&self, queue: &str, opts: QueuePurgeOptions) -> Result<u32> {
        self.ensure_connected()?;
        let method = AMQPClass::Queue(queue::Methods::Purge(queue::Purge {
            queue: queue.to_string(),
            nowait: opts.nowait,
        }));
        let reply = AMQPClass::Queue(queue::Methods::PurgeOk(queue::PurgeOk::default()));
        match self.rpc_nowait(method, opts.nowait, reply)? {
            AMQPClass::Queue(queue::Methods::PurgeOk(ok)) => Ok(ok.message_count),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    pub fn queue_delete(&self, queue: &str, opts: QueueDeleteOptions) -> Result<u32> {
        self.ensure_connected()?;
        let method = AMQPClass::Queue(queue::Methods::Delete(queue::Delete {
            queue: queue.to_string(),
            if_unused: opts.if_unused,
            if_empty: opts.if_empty,
            nowait: opts.nowait,
        }));
        let reply = AMQPClass::Queue(queue::Methods::DeleteOk(queue::DeleteOk::default()));
        match self.rpc_nowait(method, opts.nowait, reply)? {
            AMQPClass::Queue(queue::Methods::DeleteOk(ok)) => Ok(ok.message_count),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    pub fn basic_qos(&self, prefetch_count: u16, opts: BasicQosOptions) -> Result<()> {
        self.ensure_connected()?;
        match self.rpc(AMQPClass::Basic(basic::Methods::Qos(basic::Qos {
            prefetch_size: 0,
            prefetch_count,
            global: opts.global,
        })))? {
            AMQPClass::Basic(basic::Methods::QosOk) => Ok(()),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    /// Enqueues the method, header and body frames of one message as a
    /// contiguous unit. Returns once the frames are queued; delivery is
    /// best-effort unless confirms are in use.
    pub fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        opts: BasicPublishOptions,
        payload: Payload,
        properties: BasicProperties,
    ) -> Result<()> {
        self.ensure_connected()?;
        let (body, properties) = payload.into_parts(properties)?;
        let mut frames = Vec::with_capacity(3);
        frames.push(AMQPFrame::Method(
            self.id,
            AMQPClass::Basic(basic::Methods::Publish(basic::Publish {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                mandatory: opts.mandatory,
                immediate: opts.immediate,
            })),
        ));
        frames.push(AMQPFrame::Header(
            self.id,
            ContentHeader {
                class_id: protocol::constants::BASIC_CLASS,
                weight: 0,
                body_size: body.len() as u64,
                properties,
            },
        ));
        frames.extend(frame::split_body(
            self.id,
            body,
            self.configuration.frame_max(),
        ));
        self.frames.push_batch(frames);
        self.waker.wake();
        Ok(())
    }

    pub fn basic_consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        opts: BasicConsumeOptions,
        arguments: FieldTable,
        delegate: Arc<dyn ConsumerDelegate>,
    ) -> Result<ShortString> {
        self.ensure_connected()?;
        let method = basic::Consume {
            queue: queue.to_string(),
            consumer_tag: consumer_tag.to_string(),
            no_local: opts.no_local,
            no_ack: opts.no_ack,
            exclusive: opts.exclusive,
            nowait: opts.nowait,
            arguments,
        };
        if opts.nowait {
            // no consume-ok will come, so the server cannot pick the tag
            if consumer_tag.is_empty() {
                return Err(ErrorKind::PreconditionFailed.into());
            }
            let consumer = Consumer::new(
                consumer_tag.to_string(),
                queue.to_string(),
                method.clone(),
                delegate,
            );
            self.consumers.register(consumer_tag.to_string(), consumer);
            self.send(AMQPClass::Basic(basic::Methods::Consume(method)));
            return Ok(consumer_tag.to_string());
        }
        self.pending_consumers
            .lock()
            .push_back((method.clone(), delegate));
        match self.rpc(AMQPClass::Basic(basic::Methods::Consume(method)))? {
            AMQPClass::Basic(basic::Methods::ConsumeOk(ok)) => Ok(ok.consumer_tag),
            method => {
                self.pending_consumers.lock().pop_back();
                Err(ErrorKind::InvalidMethod(method).into())
            }
        }
    }

    pub fn basic_cancel(&self, consumer_tag: &str, opts: BasicCancelOptions) -> Result<()> {
        self.ensure_connected()?;
        let method = AMQPClass::Basic(basic::Methods::Cancel(basic::Cancel {
            consumer_tag: consumer_tag.to_string(),
            nowait: opts.nowait,
        }));
        let reply = AMQPClass::Basic(basic::Methods::CancelOk(basic::CancelOk {
            consumer_tag: consumer_tag.to_string(),
        }));
        match self.rpc_nowait(method, opts.nowait, reply)? {
            AMQPClass::Basic(basic::Methods::CancelOk(ok)) => {
                if let Some(consumer) = self.consumers.deregister(&ok.consumer_tag) {
                    consumer.canceled();
                }
                Ok(())
            }
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    pub fn basic_ack(&self, delivery_tag: DeliveryTag, opts: BasicAckOptions) -> Result<()> {
        self.ensure_connected()?;
        self.send(AMQPClass::Basic(basic::Methods::Ack(basic::Ack {
            delivery_tag,
            multiple: opts.multiple,
        })));
        Ok(())
    }

    pub fn basic_nack(&self, delivery_tag: DeliveryTag, opts: BasicNackOptions) -> Result<()> {
        self.ensure_connected()?;
        self.send(AMQPClass::Basic(basic::Methods::Nack(basic::Nack {
            delivery_tag,
            multiple: opts.multiple,
            requeue: opts.requeue,
        })));
        Ok(())
    }

    pub fn basic_reject(&self, delivery_tag: DeliveryTag, opts: BasicRejectOptions) -> Result<()> {
        self.ensure_connected()?;
        self.send(AMQPClass::Basic(basic::Methods::Reject(basic::Reject {
            delivery_tag,
            requeue: opts.requeue,
        })));
        Ok(())
    }

    pub fn basic_recover(&self, requeue: bool) -> Result<()> {
        self.ensure_connected()?;
        match self.rpc(AMQPClass::Basic(basic::Methods::Recover(basic::Recover {
            requeue,
        })))? {
            AMQPClass::Basic(basic::Methods::RecoverOk) => Ok(()),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    pub fn confirm_select(&self, opts: ConfirmSelectOptions) -> Result<()> {
        self.ensure_connected()?;
        let method = AMQPClass::Confirm(confirm::Methods::Select(confirm::Select {
            nowait: opts.nowait,
        }));
        let reply = AMQPClass::Confirm(confirm::Methods::SelectOk);
        match self.rpc_nowait(method, opts.nowait, reply)? {
            AMQPClass::Confirm(confirm::Methods::SelectOk) => {
                self.status.set_confirm();
                Ok(())
            }
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    pub fn tx_select(&self) -> Result<()> {
        self.tx_rpc(tx::Methods::Select, tx::Methods::SelectOk)
    }

    pub fn tx_commit(&self) -> Result<()> {
        self.tx_rpc(tx::Methods::Commit, tx::Methods::CommitOk)
    }

    pub fn tx_rollback(&self) -> Result<()> {
        self.tx_rpc(tx::Methods::Rollback, tx::Methods::RollbackOk)
    }

    fn tx_rpc(&self, request: tx::Methods, expected: tx::Methods) -> Result<()> {
        self.ensure_connected()?;
        match self.rpc(AMQPClass::Tx(request))? {
            AMQPClass::Tx(reply) if reply == expected => Ok(()),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    // ---- io-thread side ----

    /// Dispatches a method frame received for this channel.
    pub(crate) fn receive_method(&self, method: AMQPClass) -> Result<()> {
        trace!(channel = self.id, method = method.method_name(), "received");
        match method {
            AMQPClass::Channel(channel::Methods::OpenOk) => {
                self.status.set_state(ChannelState::Connected);
                self.resolve_reply(AMQPClass::Channel(channel::Methods::OpenOk))
            }
            AMQPClass::Channel(channel::Methods::CloseOk) => {
                self.status.set_state(ChannelState::Closed);
                self.resolve_reply(AMQPClass::Channel(channel::Methods::CloseOk))?;
                self.consumers.cancel_all();
                Ok(())
            }
            AMQPClass::Channel(channel::Methods::Close(close)) => {
                debug!(
                    channel = self.id,
                    code = close.reply_code,
                    text = %close.reply_text,
                    "channel closed by server"
                );
                self.send(AMQPClass::Channel(channel::Methods::CloseOk));
                let error: Error = ErrorKind::ChannelClose {
                    code: close.reply_code,
                    message: close.reply_text,
                }
                .into();
                self.status.set_state(ChannelState::Closed);
                self.frames.clear_expected_replies(self.id, error.clone());
                self.consumers.error(error);
                self.consumers.cancel_all();
                Ok(())
            }
            AMQPClass::Channel(channel::Methods::Flow(flow)) => {
                self.send(AMQPClass::Channel(channel::Methods::FlowOk(
                    channel::FlowOk { active: flow.active },
                )));
                Ok(())
            }
            AMQPClass::Channel(channel::Methods::FlowOk(ok)) => {
                self.resolve_reply(AMQPClass::Channel(channel::Methods::FlowOk(ok)))
            }
            AMQPClass::Basic(basic::Methods::Deliver(deliver)) => {
                self.start_content(basic::Methods::Deliver(deliver))
            }
            AMQPClass::Basic(basic::Methods::Return(ret)) => {
                self.start_content(basic::Methods::Return(ret))
            }
            AMQPClass::Basic(basic::Methods::GetOk(get_ok)) => {
                self.start_content(basic::Methods::GetOk(get_ok))
            }
            AMQPClass::Basic(basic::Methods::ConsumeOk(ok)) => {
                if self.consumers.contains(&ok.consumer_tag) {
                    // a recovery replay coming back up
                    self.consumers.reactivate(&ok.consumer_tag);
                } else if let Some((method, delegate)) = self.pending_consumers.lock().pop_front()
                {
                    let consumer = Consumer::new(
                        ok.consumer_tag.clone(),
                        method.queue.clone(),
                        method,
                        delegate,
                    );
                    self.consumers.register(ok.consumer_tag.clone(), consumer);
                }
                self.resolve_reply(AMQPClass::Basic(basic::Methods::ConsumeOk(ok)))
            }
            AMQPClass::Basic(basic::Methods::CancelOk(ok)) => {
                if let Some(consumer) = self.consumers.deregister(&ok.consumer_tag) {
                    consumer.canceled();
                }
                self.resolve_reply(AMQPClass::Basic(basic::Methods::CancelOk(ok)))
            }
            AMQPClass::Basic(basic::Methods::Cancel(cancel)) => {
                // server-initiated cancel, e.g. the queue was deleted
                if let Some(consumer) = self.consumers.deregister(&cancel.consumer_tag) {
                    consumer.canceled();
                }
                if !cancel.nowait {
                    self.send(AMQPClass::Basic(basic::Methods::CancelOk(
                        basic::CancelOk {
                            consumer_tag: cancel.consumer_tag,
                        },
                    )));
                }
                Ok(())
            }
            AMQPClass::Basic(basic::Methods::Ack(ack)) => {
                trace!(channel = self.id, delivery_tag = ack.delivery_tag, "publish confirmed");
                Ok(())
            }
            AMQPClass::Basic(basic::Methods::Nack(nack)) => {
                warn!(channel = self.id, delivery_tag = nack.delivery_tag, "publish nacked");
                Ok(())
            }
            reply @ (AMQPClass::Exchange(exchange::Methods::DeclareOk)
            | AMQPClass::Exchange(exchange::Methods::DeleteOk)
            | AMQPClass::Exchange(exchange::Methods::BindOk)
            | AMQPClass::Exchange(exchange::Methods::UnbindOk)
            | AMQPClass::Queue(queue::Methods::DeclareOk(_))
            | AMQPClass::Queue(queue::Methods::BindOk)
            | AMQPClass::Queue(queue::Methods::UnbindOk)
            | AMQPClass::Queue(queue::Methods::PurgeOk(_))
            | AMQPClass::Queue(queue::Methods::DeleteOk(_))
            | AMQPClass::Basic(basic::Methods::QosOk)
            | AMQPClass::Basic(basic::Methods::RecoverOk)
            | AMQPClass::Basic(basic::Methods::GetEmpty)
            | AMQPClass::Tx(_)
            | AMQPClass::Confirm(confirm::Methods::SelectOk)) => self.resolve_reply(reply),
            method => Err(ErrorKind::InvalidMethod(method).into()),
        }
    }

    fn resolve_reply(&self, reply: AMQPClass) -> Result<()> {
        match self.frames.next_expected_reply(self.id) {
            Some(resolver) => {
                // A dropped receiver is fine: recovery enqueues its
                // replays without waiting on them.
                let _ = resolver.send(Ok(reply));
                Ok(())
            }
            None => Err(ErrorKind::InvalidMethod(reply).into()),
        }
    }

    fn start_content(&self, method: basic::Methods) -> Result<()> {
        let mut pending = self.pending_content.lock();
        if pending.is_some() {
            return Err(ErrorKind::InvalidFrameReceived.into());
        }
        *pending = Some(PendingContent {
            method,
            header: None,
            body: Vec::new(),
        });
        Ok(())
    }

    pub(crate) fn handle_content_header_frame(&self, header: ContentHeader) -> Result<()> {
        let mut pending = self.pending_content.lock();
        let done = match pending.as_mut() {
            Some(content) if content.header.is_none() => {
                content.body.reserve(header.body_size as usize);
                content.header = Some(header);
                content.complete()
            }
            _ => return Err(ErrorKind::InvalidFrameReceived.into()),
        };
        if done {
            if let Some(content) = pending.take() {
                drop(pending);
                self.deliver_content(content);
            }
        }
        Ok(())
    }

    pub(crate) fn handle_body_frame(&self, payload: Vec<u8>) -> Result<()> {
        let mut pending = self.pending_content.lock();
        let done = match pending.as_mut() {
            Some(content) if content.header.is_some() => {
                content.body.extend_from_slice(&payload);
                content.complete()
            }
            _ => return Err(ErrorKind::InvalidFrameReceived.into()),
        };
        if done {
            if let Some(content) = pending.take() {
                drop(pending);
                self.deliver_content(content);
            }
        }
        Ok(())
    }

    fn deliver_content(&self, content: PendingContent) {
        let header = match content.header {
            Some(header) => header,
            None => return,
        };
        match content.method {
            basic::Methods::Deliver(deliver) => {
                let delivery = Delivery {
                    delivery_tag: deliver.delivery_tag,
                    consumer_tag: Some(deliver.consumer_tag.clone()),
                    exchange: deliver.exchange,
                    routing_key: deliver.routing_key,
                    redelivered: deliver.redelivered,
                    properties: header.properties,
                    data: content.body,
                };
                self.consumers.start_delivery(&deliver.consumer_tag, delivery);
            }
            basic::Methods::Return(ret) => {
                warn!(
                    channel = self.id,
                    code = ret.reply_code,
                    text = %ret.reply_text,
                    exchange = %ret.exchange,
                    routing_key = %ret.routing_key,
                    "message returned by server"
                );
            }
            basic::Methods::GetOk(get_ok) => {
                debug!(
                    channel = self.id,
                    delivery_tag = get_ok.delivery_tag,
                    "unsolicited get-ok content dropped"
                );
            }
            method => {
                debug!(channel = self.id, method = method.method_name(), "dropped content");
            }
        }
    }

    /// Connection teardown: the slot survives so recovery can rebuild the
    /// channel, but everything in flight is dead.
    pub(crate) fn set_connection_error(&self, error: Error) {
        self.status.set_state(ChannelState::Closed);
        self.pending_content.lock().take();
        self.pending_consumers.lock().clear();
        self.frames.clear_expected_replies(self.id, error.clone());
        self.consumers.error(error);
    }

    /// Replays Channel.Open and every closed consumer's basic.consume
    /// after a reconnect reached ready. Runs on the io thread, so the
    /// replies are consumed by the expected-reply queue without waiters.
    pub(crate) fn recover(&self) {
        if self.status.state() != ChannelState::Closed {
            return;
        }
        debug!(channel = self.id, "recovering channel");
        self.status.set_state(ChannelState::Initial);
        let (resolver, _ignored) = flume::bounded(1);
        self.frames.push_with_reply(
            self.id,
            AMQPFrame::Method(self.id, AMQPClass::Channel(channel::Methods::Open)),
            resolver,
        );
        for consumer in self.consumers.to_resubscribe() {
            let (resolver, _ignored) = flume::bounded(1);
            self.frames.push_with_reply(
                self.id,
                AMQPFrame::Method(
                    self.id,
                    AMQPClass::Basic(basic::Methods::Consume(consumer.resubscribe_method())),
                ),
                resolver,
            );
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::ConsumerState;

    fn test_channel() -> Channel {
        Channel::new(
            7,
            Configuration::new(0),
            ConnectionStatus::default(),
            Frames::default(),
            Waker::default(),
        )
    }

    fn deliver(tag: &str, delivery_tag: DeliveryTag) -> AMQPClass {
        AMQPClass::Basic(basic::Methods::Deliver(basic::Deliver {
            consumer_tag: tag.to_string(),
            delivery_tag,
            redelivered: false,
            exchange: "logs".to_string(),
            routing_key: "info".to_string(),
        }))
    }

    fn register_recording_consumer(
        channel: &Channel,
        tag: &str,
    ) -> Arc<Mutex<Vec<Delivery>>> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let consumer = Consumer::new(
            tag.to_string(),
            "logs-queue".to_string(),
            basic::Consume {
                queue: "logs-queue".to_string(),
                consumer_tag: tag.to_string(),
                ..Default::default()
            },
            Arc::new(move |delivery: Delivery| sink.lock().push(delivery)),
        );
        channel.consumers.register(tag.to_string(), consumer);
        received
    }

    #[test]
    fn content_is_assembled_across_body_frames() {
        let channel = test_channel();
        channel.status.set_state(ChannelState::Connected);
        let received = register_recording_consumer(&channel, "tag-1");

        channel.receive_method(deliver("tag-1", 42)).unwrap();
        channel
            .handle_content_header_frame(ContentHeader {
                class_id: protocol::constants::BASIC_CLASS,
                weight: 0,
                body_size: 10,
                properties: BasicProperties::default().with_delivery_mode(2),
            })
            .unwrap();
        channel.handle_body_frame(b"hello".to_vec()).unwrap();
        assert!(received.lock().is_empty());
        channel.handle_body_frame(b"world".to_vec()).unwrap();

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].delivery_tag, 42);
        assert_eq!(received[0].consumer_tag.as_deref(), Some("tag-1"));
        assert_eq!(received[0].data, b"helloworld");
        assert_eq!(received[0].properties.delivery_mode, Some(2));
    }

    #[test]
    fn zero_length_bodies_complete_on_the_header() {
        let channel = test_channel();
        channel.status.set_state(ChannelState::Connected);
        let received = register_recording_consumer(&channel, "tag-1");
        channel.receive_method(deliver("tag-1", 1)).unwrap();
        channel
            .handle_content_header_frame(ContentHeader {
                class_id: protocol::constants::BASIC_CLASS,
                weight: 0,
                body_size: 0,
                properties: BasicProperties::default(),
            })
            .unwrap();
        assert_eq!(received.lock().len(), 1);
    }

    #[test]
    fn content_frames_without_a_method_are_rejected() {
        let channel = test_channel();
        channel.status.set_state(ChannelState::Connected);
        assert!(channel.handle_body_frame(b"junk".to_vec()).is_err());
        assert!(
            channel
                .handle_content_header_frame(ContentHeader {
                    class_id: protocol::constants::BASIC_CLASS,
                    weight: 0,
                    body_size: 1,
                    properties: BasicProperties::default(),
                })
                .is_err()
        );
    }

    #[test]
    fn open_ok_resolves_the_pending_reply() {
        let channel = test_channel();
        let (resolver, reply) = flume::bounded(1);
        channel.frames.push_with_reply(
            channel.id,
            AMQPFrame::Method(channel.id, AMQPClass::Channel(channel::Methods::Open)),
            resolver,
        );
        channel
            .receive_method(AMQPClass::Channel(channel::Methods::OpenOk))
            .unwrap();
        assert_eq!(channel.status.state(), ChannelState::Connected);
        assert_eq!(
            reply.try_recv().unwrap().unwrap(),
            AMQPClass::Channel(channel::Methods::OpenOk)
        );
    }

    #[test]
    fn unexpected_replies_fail_fatally() {
        let channel = test_channel();
        let error = channel
            .receive_method(AMQPClass::Queue(queue::Methods::BindOk))
            .unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::InvalidMethod(_)));
    }

    #[test]
    fn teardown_marks_consumers_for_resubscription_and_recover_replays_them() {
        let channel = test_channel();
        channel.status.set_state(ChannelState::Connected);
        register_recording_consumer(&channel, "tag-1");

        channel.set_connection_error(ErrorKind::NotConnected.into());
        assert_eq!(channel.status.state(), ChannelState::Closed);
        let closed = channel.consumers.to_resubscribe();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].state(), ConsumerState::Closed);

        channel.recover();
        assert_eq!(channel.status.state(), ChannelState::Initial);
        // channel.open first, then the consumer replay
        assert_eq!(
            channel.frames.pop(true),
            Some(AMQPFrame::Method(
                7,
                AMQPClass::Channel(channel::Methods::Open)
            ))
        );
        match channel.frames.pop(true) {
            Some(AMQPFrame::Method(7, AMQPClass::Basic(basic::Methods::Consume(consume)))) => {
                assert_eq!(consume.consumer_tag, "tag-1");
                assert_eq!(consume.queue, "logs-queue");
            }
            other => panic!("expected a consume replay, got {:?}", other),
        }

        // the server replies in order; the channel comes back up and the
        // consumer goes active again
        channel
            .receive_method(AMQPClass::Channel(channel::Methods::OpenOk))
            .unwrap();
        assert_eq!(channel.status.state(), ChannelState::Connected);
        channel
            .receive_method(AMQPClass::Basic(basic::Methods::ConsumeOk(
                basic::ConsumeOk {
                    consumer_tag: "tag-1".to_string(),
                },
            )))
            .unwrap();
        assert_eq!(
            channel.consumers.to_resubscribe().len(),
            0,
            "consumer should be active again"
        );
    }

    #[test]
    fn server_channel_close_is_acknowledged_and_closes_the_channel() {
        let channel = test_channel();
        channel.status.set_state(ChannelState::Connected);
        channel
            .receive_method(AMQPClass::Channel(channel::Methods::Close(
                channel::Close {
                    reply_code: 404,
                    reply_text: "NOT_FOUND".to_string(),
                    class_id: 50,
                    method_id: 10,
                },
            )))
            .unwrap();
        assert_eq!(channel.status.state(), ChannelState::Closed);
        assert_eq!(
            channel.frames.pop(true),
            Some(AMQPFrame::Method(
                7,
                AMQPClass::Channel(channel::Methods::CloseOk)
            ))
        );
    }

    #[test]
    fn publish_enqueues_method_header_and_chunked_bodies() {
        let channel = test_channel();
        channel.status.set_state(ChannelState::Connected);
        // not ready at the connection level
        assert!(
            channel
                .basic_publish(
                    "",
                    "rk",
                    BasicPublishOptions::default(),
                    Payload::Bytes(vec![0; 4]),
                    BasicProperties::default(),
                )
                .is_err()
        );

        channel
            .connection_status
            .set_state(crate::connection_status::ConnectionState::Ready);
        channel
            .basic_publish(
                "",
                "rk",
                BasicPublishOptions::default(),
                Payload::Bytes(vec![7; 300_000]),
                BasicProperties::default(),
            )
            .unwrap();
        let mut frames = Vec::new();
        while let Some(frame) = channel.frames.pop(true) {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 5);
        assert!(matches!(
            &frames[0],
            AMQPFrame::Method(7, AMQPClass::Basic(basic::Methods::Publish(_)))
        ));
        match &frames[1] {
            AMQPFrame::Header(7, header) => {
                assert_eq!(header.body_size, 300_000);
                assert_eq!(header.class_id, protocol::constants::BASIC_CLASS);
                assert_eq!(
                    header.properties.content_type.as_deref(),
                    Some("application/octet-stream")
                );
            }
            other => panic!("expected the content header, got {:?}", other),
        }
        let sizes: Vec<usize> = frames[2..]
            .iter()
            .map(|frame| match frame {
                AMQPFrame::Body(7, payload) => payload.len(),
                other => panic!("expected a body frame, got {:?}", other),
            })
            .collect();
        assert_eq!(sizes, vec![131_064, 131_064, 37_872]);
    }
}
