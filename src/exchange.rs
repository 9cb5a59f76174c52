use crate::channel::Channel;
use crate::channel::options::{BasicPublishOptions, ExchangeDeleteOptions};
use crate::error::Result;
use crate::message::Payload;
use crate::protocol::BasicProperties;
use crate::types::ShortString;

/// The routing behavior of an exchange, sent as the `type` field of
/// exchange.declare.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Headers,
    Topic,
    Custom(ShortString),
}

impl ExchangeKind {
    pub fn as_str(&self) -> &str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Headers => "headers",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Custom(name) => name,
        }
    }
}

/// A declared exchange bound to the channel it was declared on.
#[derive(Clone, Debug)]
pub struct Exchange {
    name: ShortString,
    channel: Channel,
}

impl Exchange {
    pub(crate) fn new(channel: Channel, name: ShortString) -> Exchange {
        Self { name, channel }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn publish(
        &self,
        routing_key: &str,
        payload: impl Into<Payload>,
        opts: BasicPublishOptions,
        properties: BasicProperties,
    ) -> Result<()> {
        self.channel
            .basic_publish(&self.name, routing_key, opts, payload.into(), properties)
    }

    pub fn delete(&self, opts: ExchangeDeleteOptions) -> Result<()> {
        self.channel.exchange_delete(&self.name, opts)
    }
}
