//! Wire-level value types shared by the codec and the method registry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, btree_map};

/// An AMQP channel id. Channel 0 is the connection control channel.
pub type ChannelId = u16;
/// Negotiated maximum frame size, in bytes.
pub type FrameSize = u32;
/// Heartbeat interval in seconds; 0 disables heartbeats.
pub type Heartbeat = u16;
/// Reply code carried by Connection.Close / Channel.Close.
pub type ReplyCode = u16;
pub type ClassId = u16;
pub type MethodId = u16;
pub type DeliveryTag = u64;
/// String limited to 255 bytes on the wire.
pub type ShortString = String;
/// Length-prefixed byte sequence; used for SASL responses which may be
/// binary.
pub type LongString = Vec<u8>;

/// A value stored in an AMQP field table or field array.
///
/// Wire tags follow the 0-9-1 errata, not the original grammar table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AMQPValue {
    Boolean(bool),
    ShortShortInt(i8),
    ShortShortUInt(u8),
    ShortInt(i16),
    ShortUInt(u16),
    LongInt(i32),
    LongUInt(u32),
    LongLongInt(i64),
    LongLongUInt(u64),
    Float(f32),
    Double(f64),
    DecimalValue(u8, u32),
    ShortString(ShortString),
    LongString(String),
    FieldArray(Vec<AMQPValue>),
    Timestamp(u64),
    FieldTable(FieldTable),
    Void,
}

impl From<&str> for AMQPValue {
    fn from(s: &str) -> Self {
        AMQPValue::LongString(s.to_string())
    }
}

impl From<String> for AMQPValue {
    fn from(s: String) -> Self {
        AMQPValue::LongString(s)
    }
}

impl From<bool> for AMQPValue {
    fn from(b: bool) -> Self {
        AMQPValue::Boolean(b)
    }
}

/// An AMQP field table: ordered string keys mapped to typed values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldTable(BTreeMap<ShortString, AMQPValue>);

impl FieldTable {
    pub fn insert(&mut self, key: ShortString, value: AMQPValue) {
        self.0.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&AMQPValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ShortString, AMQPValue> {
        self.0.iter()
    }
}

impl FromIterator<(ShortString, AMQPValue)> for FieldTable {
    fn from_iter<I: IntoIterator<Item = (ShortString, AMQPValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FieldTable {
    type Item = (&'a ShortString, &'a AMQPValue);
    type IntoIter = btree_map::Iter<'a, ShortString, AMQPValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
