use crate::channel::Channel;
use crate::channel::options::{
    BasicCancelOptions, BasicConsumeOptions, QueueBindOptions, QueueDeleteOptions,
    QueuePurgeOptions,
};
use crate::consumer::ConsumerDelegate;
use crate::error::Result;
use crate::types::{FieldTable, ShortString};
use std::sync::Arc;

/// A declared queue and the channel it lives on.
#[derive(Clone, Debug)]
pub struct Queue {
    channel: Channel,
    name: ShortString,
    message_count: u32,
    consumer_count: u32,
}

impl Queue {
    pub(crate) fn new(
        channel: Channel,
        name: ShortString,
        message_count: u32,
        consumer_count: u32,
    ) -> Queue {
        Self {
            channel,
            name,
            message_count,
            consumer_count,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Message count reported by the queue.declare-ok that created us.
    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    pub fn consumer_count(&self) -> u32 {
        self.consumer_count
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn bind(&self, exchange: &str, routing_key: &str, opts: QueueBindOptions) -> Result<()> {
        self.channel
            .queue_bind(&self.name, exchange, routing_key, opts, FieldTable::default())
    }

    pub fn unbind(&self, exchange: &str, routing_key: &str) -> Result<()> {
        self.channel
            .queue_unbind(&self.name, exchange, routing_key, FieldTable::default())
    }

    /// Starts a consumer; returns the tag the server settled on.
    pub fn subscribe(
        &self,
        consumer_tag: &str,
        opts: BasicConsumeOptions,
        delegate: Arc<dyn ConsumerDelegate>,
    ) -> Result<ShortString> {
        self.channel.basic_consume(
            &self.name,
            consumer_tag,
            opts,
            FieldTable::default(),
            delegate,
        )
    }

    pub fn unsubscribe(&self, consumer_tag: &str, opts: BasicCancelOptions) -> Result<()> {
        self.channel.basic_cancel(consumer_tag, opts)
    }

    pub fn purge(&self, opts: QueuePurgeOptions) -> Result<u32> {
        self.channel.queue_purge(&self.name, opts)
    }

    pub fn delete(&self, opts: QueueDeleteOptions) -> Result<u32> {
        self.channel.queue_delete(&self.name, opts)
    }
}
