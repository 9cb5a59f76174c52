//! The AMQP 0-9-1 method registry.
//!
//! Single source of truth for the (class id, method id) ↔ typed method
//! mapping and for each method's wire field order. Both the serializer and
//! the parser go through [`AMQPClass::encode`]/[`AMQPClass::decode`];
//! decoding an unrecognized pair fails with `FrameError::UnknownMethod`.

use crate::codec::{FrameReader, FrameWriter};
use crate::frame::FrameError;
use crate::types::{ClassId, FieldTable, MethodId, ShortString};
use serde::{Deserialize, Serialize};

/// The 8-byte sentinel sent once at connection start. Not a frame.
pub const PROTOCOL_HEADER: [u8; 8] = *b"AMQP\x00\x00\x09\x01";

pub(crate) const FRAME_METHOD: u8 = 1;
pub(crate) const FRAME_HEADER: u8 = 2;
pub(crate) const FRAME_BODY: u8 = 3;
pub(crate) const FRAME_HEARTBEAT: u8 = 8;
pub(crate) const FRAME_END: u8 = 0xCE;

pub mod constants {
    use crate::types::{ChannelId, ClassId, FrameSize, ReplyCode};

    pub const VERSION_MAJOR: u8 = 0;
    pub const VERSION_MINOR: u8 = 9;
    pub const REPLY_SUCCESS: ReplyCode = 200;
    /// 7 bytes of frame header plus the end octet.
    pub const FRAME_OVERHEAD: FrameSize = 8;
    pub const DEFAULT_FRAME_MAX: FrameSize = 131_072;
    pub const DEFAULT_CHANNEL_MAX: ChannelId = 2047;
    /// Class 60, the carrier of user message metadata in content headers.
    pub const BASIC_CLASS: ClassId = 60;
}

/// A decoded AMQP method, grouped by class.
#[derive(Clone, Debug, PartialEq)]
pub enum AMQPClass {
    Connection(connection::Methods),
    Channel(channel::Methods),
    Exchange(exchange::Methods),
    Queue(queue::Methods),
    Basic(basic::Methods),
    Tx(tx::Methods),
    Confirm(confirm::Methods),
}

impl AMQPClass {
    pub fn class_id(&self) -> ClassId {
        match self {
            AMQPClass::Connection(_) => connection::CLASS_ID,
            AMQPClass::Channel(_) => channel::CLASS_ID,
            AMQPClass::Exchange(_) => exchange::CLASS_ID,
            AMQPClass::Queue(_) => queue::CLASS_ID,
            AMQPClass::Basic(_) => basic::CLASS_ID,
            AMQPClass::Tx(_) => tx::CLASS_ID,
            AMQPClass::Confirm(_) => confirm::CLASS_ID,
        }
    }

    pub fn method_id(&self) -> MethodId {
        match self {
            AMQPClass::Connection(m) => m.method_id(),
            AMQPClass::Channel(m) => m.method_id(),
            AMQPClass::Exchange(m) => m.method_id(),
            AMQPClass::Queue(m) => m.method_id(),
            AMQPClass::Basic(m) => m.method_id(),
            AMQPClass::Tx(m) => m.method_id(),
            AMQPClass::Confirm(m) => m.method_id(),
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            AMQPClass::Connection(m) => m.method_name(),
            AMQPClass::Channel(m) => m.method_name(),
            AMQPClass::Exchange(m) => m.method_name(),
            AMQPClass::Queue(m) => m.method_name(),
            AMQPClass::Basic(m) => m.method_name(),
            AMQPClass::Tx(m) => m.method_name(),
            AMQPClass::Confirm(m) => m.method_name(),
        }
    }

    /// True for the methods followed by a content header and body frames.
    pub(crate) fn has_content(&self) -> bool {
        matches!(
            self,
            AMQPClass::Basic(basic::Methods::Publish(_))
                | AMQPClass::Basic(basic::Methods::Return(_))
                | AMQPClass::Basic(basic::Methods::Deliver(_))
                | AMQPClass::Basic(basic::Methods::GetOk(_))
        )
    }

    pub(crate) fn decode(reader: &mut FrameReader<'_>) -> Result<AMQPClass, FrameError> {
        let class_id = reader.read_u16()?;
        let method_id = reader.read_u16()?;
        match class_id {
            connection::CLASS_ID => {
                connection::Methods::decode(method_id, reader).map(AMQPClass::Connection)
            }
            channel::CLASS_ID => {
                channel::Methods::decode(method_id, reader).map(AMQPClass::Channel)
            }
            exchange::CLASS_ID => {
                exchange::Methods::decode(method_id, reader).map(AMQPClass::Exchange)
            }
            queue::CLASS_ID => queue::Methods::decode(method_id, reader).map(AMQPClass::Queue),
            basic::CLASS_ID => basic::Methods::decode(method_id, reader).map(AMQPClass::Basic),
            tx::CLASS_ID => tx::Methods::decode(method_id, reader).map(AMQPClass::Tx),
            confirm::CLASS_ID => {
                confirm::Methods::decode(method_id, reader).map(AMQPClass::Confirm)
            }
            _ => Err(FrameError::UnknownMethod(class_id, method_id)),
        }
    }

    pub(crate) fn encode(&self, writer: &mut FrameWriter<'_>) -> Result<(), FrameError> {
        writer.write_u16(self.class_id());
        writer.write_u16(self.method_id());
        match self {
            AMQPClass::Connection(m) => m.encode(writer),
            AMQPClass::Channel(m) => m.encode(writer),
            AMQPClass::Exchange(m) => m.encode(writer),
            AMQPClass::Queue(m) => m.encode(writer),
            AMQPClass::Basic(m) => m.encode(writer),
            AMQPClass::Tx(m) => m.encode(writer),
            AMQPClass::Confirm(m) => m.encode(writer),
        }
    }
}

pub mod connection {
    use super::*;
    use crate::types::{FrameSize, Heartbeat, LongString, ReplyCode};

    pub(crate) const CLASS_ID: ClassId = 10;

    #[derive(Clone, Debug, PartialEq)]
    pub enum Methods {
        Start(Start),
        StartOk(StartOk),
        Secure(Secure),
        SecureOk(SecureOk),
        Tune(Tune),
        TuneOk(TuneOk),
        Open(Open),
        OpenOk,
        Close(Close),
        CloseOk,
        Blocked(Blocked),
        Unblocked,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct Start {
        pub version_major: u8,
        pub version_minor: u8,
        pub server_properties: FieldTable,
        pub mechanisms: String,
        pub locales: String,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct StartOk {
        pub client_properties: FieldTable,
        pub mechanism: ShortString,
        pub response: LongString,
        pub locale: ShortString,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct Secure {
        pub challenge: LongString,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct SecureOk {
        pub response: LongString,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Tune {
        pub channel_max: u16,
        pub frame_max: FrameSize,
        pub heartbeat: Heartbeat,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TuneOk {
        pub channel_max: u16,
        pub frame_max: FrameSize,
        pub heartbeat: Heartbeat,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct Open {
        pub virtual_host: ShortString,
        pub capabilities: ShortString,
        pub insist: bool,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct Close {
        pub reply_code: ReplyCode,
        pub reply_text: ShortString,
        pub class_id: ClassId,
        pub method_id: MethodId,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct Blocked {
        pub reason: ShortString,
    }

    impl Methods {
        pub(crate) fn method_id(&self) -> MethodId {
            match self {
                Methods::Start(_) => 10,
                Methods::StartOk(_) => 11,
                Methods::Secure(_) => 20,
                Methods::SecureOk(_) => 21,
                Methods::Tune(_) => 30,
                Methods::TuneOk(_) => 31,
                Methods::Open(_) => 40,
                Methods::OpenOk => 41,
                Methods::Close(_) => 50,
                Methods::CloseOk => 51,
                Methods::Blocked(_) => 60,
                Methods::Unblocked => 61,
            }
        }

        pub(crate) fn method_name(&self) -> &'static str {
            match self {
                Methods::Start(_) => "connection.start",
                Methods::StartOk(_) => "connection.start-ok",
                Methods::Secure(_) => "connection.secure",
                Methods::SecureOk(_) => "connection.secure-ok",
                Methods::Tune(_) => "connection.tune",
                Methods::TuneOk(_) => "connection.tune-ok",
                Methods::Open(_) => "connection.open",
                Methods::OpenOk => "connection.open-ok",
                Methods::Close(_) => "connection.close",
                Methods::CloseOk => "connection.close-ok",
                Methods::Blocked(_) => "connection.blocked",
                Methods::Unblocked => "connection.unblocked",
            }
        }

        pub(super) fn decode(
            method_id: MethodId,
            r: &mut FrameReader<'_>,
        ) -> Result<Methods, FrameError> {
            match method_id {
                10 => Ok(Methods::Start(Start {
                    version_major: r.read_u8()?,
                    version_minor: r.read_u8()?,
                    server_properties: r.read_table()?,
                    mechanisms: r.read_long_string()?,
                    locales: r.read_long_string()?,
                })),
                11 => Ok(Methods::StartOk(StartOk {
                    client_properties: r.read_table()?,
                    mechanism: r.read_short_string()?,
                    response: r.read_long_bytes()?,
                    locale: r.read_short_string()?,
                })),
                20 => Ok(Methods::Secure(Secure {
                    challenge: r.read_long_bytes()?,
                })),
                21 => Ok(Methods::SecureOk(SecureOk {
                    response: r.read_long_bytes()?,
                })),
                30 => Ok(Methods::Tune(Tune {
                    channel_max: r.read_u16()?,
                    frame_max: r.read_u32()?,
                    heartbeat: r.read_u16()?,
                })),
                31 => Ok(Methods::TuneOk(TuneOk {
                    channel_max: r.read_u16()?,
                    frame_max: r.read_u32()?,
                    heartbeat: r.read_u16()?,
                })),
                40 => Ok(Methods::Open(Open {
                    virtual_host: r.read_short_string()?,
                    capabilities: r.read_short_string()?,
                    insist: r.read_u8()? & 1 != 0,
                })),
                41 => {
                    let _known_hosts = r.read_short_string()?;
                    Ok(Methods::OpenOk)
                }
                50 => Ok(Methods::Close(Close {
                    reply_code: r.read_u16()?,
                    reply_text: r.read_short_string()?,
                    class_id: r.read_u16()?,
                    method_id: r.read_u16()?,
                })),
                51 => Ok(Methods::CloseOk),
                60 => Ok(Methods::Blocked(Blocked {
                    reason: r.read_short_string()?,
                })),
                61 => Ok(Methods::Unblocked),
                _ => Err(FrameError::UnknownMethod(CLASS_ID, method_id)),
            }
        }

        pub(super) fn encode(&self, w: &mut FrameWriter<'_>) -> Result<(), FrameError> {
            match self {
                Methods::Start(m) => {
                    w.write_u8(m.version_major);
                    w.write_u8(m.version_minor);
                    w.write_table(&m.server_properties)?;
                    w.write_long_string(&m.mechanisms);
                    w.write_long_string(&m.locales);
                }
                Methods::StartOk(m) => {
                    w.write_table(&m.client_properties)?;
                    w.write_short_string(&m.mechanism)?;
                    w.write_long_bytes(&m.response);
                    w.write_short_string(&m.locale)?;
                }
                Methods::Secure(m) => w.write_long_bytes(&m.challenge),
                Methods::SecureOk(m) => w.write_long_bytes(&m.response),
                Methods::Tune(m) => {
                    w.write_u16(m.channel_max);
                    w.write_u32(m.frame_max);
                    w.write_u16(m.heartbeat);
                }
                Methods::TuneOk(m) => {
                    w.write_u16(m.channel_max);
                    w.write_u32(m.frame_max);
                    w.write_u16(m.heartbeat);
                }
                Methods::Open(m) => {
                    w.write_short_string(&m.virtual_host)?;
                    w.write_short_string(&m.capabilities)?;
                    w.write_u8(u8::from(m.insist));
                }
                Methods::OpenOk => w.write_short_string("")?,
                Methods::Close(m) => {
                    w.write_u16(m.reply_code);
                    w.write_short_string(&m.reply_text)?;
                    w.write_u16(m.class_id);
                    w.write_u16(m.method_id);
                }
                Methods::CloseOk => {}
                Methods::Blocked(m) => w.write_short_string(&m.reason)?,
                Methods::Unblocked => {}
            }
            Ok(())
        }
    }
}

pub mod channel {
    use super::*;
    use crate::types::ReplyCode;

    pub(crate) const CLASS_ID: ClassId = 20;

    #[derive(Clone, Debug, PartialEq)]
    pub enum Methods {
        Open,
        OpenOk,
        Flow(Flow),
        FlowOk(FlowOk),
        Close(Close),
        CloseOk,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Flow {
        pub active: bool,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FlowOk {
        pub active: bool,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub struct Close {
        pub reply_code: ReplyCode,
        pub reply_text: ShortString,
        pub class_id: ClassId,
        pub method_id: MethodId,
    }

    impl Methods {
        pub(crate) fn method_id(&self) -> MethodId {
            match self {
                Methods::Open => 10,
                Methods::OpenOk => 11,
                Methods::Flow(_) => 20,
                Methods::FlowOk(_) => 21,
                Methods::Close(_) => 40,
                Methods::CloseOk => 41,
            }
        }

        pub(crate) fn method_name(&self) -> &'static str {
            match self {
                Methods::Open => "channel.open",
                Methods::OpenOk => "channel.open-ok",
                Methods::Flow(_) => "channel.flow",
                Methods::FlowOk(_) => "channel.flow-ok",
                Methods::Close(_) => "channel.close",
                Methods::CloseOk => "channel.close-ok",
            }
        }

        pub(super) fn decode(
            method_id: MethodId,
            r: &mut FrameReader<'_>,
        ) -> Result<Methods, FrameError> {
            match method_id {
                10 => {
                    let _reserved = r.read_short_string()?;
                    Ok(Methods::Open)
                }
                11 => {
                    let _reserved = r.read_long_bytes()?;
                    Ok(Methods::OpenOk)
                }
                20 => Ok(Methods::Flow(Flow {
                    active: r.read_u8()? & 1 != 0,
                })),
                21 => Ok(Methods::FlowOk(FlowOk {
                    active: r.read_u8()? & 1 != 0,
                })),
                40 => Ok(Methods::Close(Close {
                    reply_code: r.read_u16()?,
                    reply_text: r.read_short_string()?,
                    class_id: r.read_u16()?,
                    method_id: r.read_u16()?,
                })),
                41 => Ok(Methods::CloseOk),
                _ => Err(FrameError::UnknownMethod(CLASS_ID, method_id)),
            }
        }

        pub(super) fn encode(&self, w: &mut FrameWriter<'_>) -> Result<(), FrameError> {
            match self {
                Methods::Open => w.write_short_string("")?,
                Methods::OpenOk => w.write_long_bytes(&[]),
                Methods::Flow(m) => w.write_u8(u8::from(m.active)),
                Methods::FlowOk(m) => w.write_u8(u8::from(m.active)),
                Methods::Close(m) => {
                    w.write_u16(m.reply_code);
                    w.write_short_string(&m.reply_text)?;
                    w.write_u16(m.class_id);
                    w.write_u16(m.method_id);
                }
                Methods::CloseOk => {}
            }
            Ok(())
        }
    }
}

pub mod exchange {
    use super::*;

    pub(crate) const CLASS_ID: ClassId = 40;

    #[derive(Clone, Debug, PartialEq)]
    pub enum Methods {
        Declare(Declare),
        DeclareOk,
        Delete(Delete),
        DeleteOk,
        Bind(Bind),
        BindOk,
        Unbind(Unbind),
        UnbindOk,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Declare {
        pub exchange: ShortString,
        pub kind: ShortString,
        pub passive: bool,
        pub durable: bool,
        pub auto_delete: bool,
        pub internal: bool,
        pub nowait: bool,
        pub arguments: FieldTable,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Delete {
        pub exchange: ShortString,
        pub if_unused: bool,
        pub nowait: bool,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Bind {
        pub destination: ShortString,
        pub source: ShortString,
        pub routing_key: ShortString,
        pub nowait: bool,
        pub arguments: FieldTable,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Unbind {
        pub destination: ShortString,
        pub source: ShortString,
        pub routing_key: ShortString,
        pub nowait: bool,
        pub arguments: FieldTable,
    }

    impl Methods {
        pub(crate) fn method_id(&self) -> MethodId {
            match self {
                Methods::Declare(_) => 10,
                Methods::DeclareOk => 11,
                Methods::Delete(_) => 20,
                Methods::DeleteOk => 21,
                Methods::Bind(_) => 30,
                Methods::BindOk => 31,
                Methods::Unbind(_) => 40,
                Methods::UnbindOk => 51,
            }
        }

        pub(crate) fn method_name(&self) -> &'static str {
            match self {
                Methods::Declare(_) => "exchange.declare",
                Methods::DeclareOk => "exchange.declare-ok",
                Methods::Delete(_) => "exchange.delete",
                Methods::DeleteOk => "exchange.delete-ok",
                Methods::Bind(_) => "exchange.bind",
                Methods::BindOk => "exchange.bind-ok",
                Methods::Unbind(_) => "exchange.unbind",
                Methods::UnbindOk => "exchange.unbind-ok",
            }
        }

        pub(super) fn decode(
            method_id: MethodId,
            r: &mut FrameReader<'_>,
        ) -> Result<Methods, FrameError> {
            match method_id {
                10 => {
                    let _ticket = r.read_u16()?;
                    let exchange = r.read_short_string()?;
                    let kind = r.read_short_string()?;
                    let bits = r.read_u8()?;
                    Ok(Methods::Declare(Declare {
                        exchange,
                        kind,
                        passive: bits & 1 != 0,
                        durable: bits & (1 << 1) != 0,
                        auto_delete: bits & (1 << 2) != 0,
                        internal: bits & (1 << 3) != 0,
                        nowait: bits & (1 << 4) != 0,
                        arguments: r.read_table()?,
                    }))
                }
                11 => Ok(Methods::DeclareOk),
                20 => {
                    let _ticket = r.read_u16()?;
                    let exchange = r.read_short_string()?;
                    let bits = r.read_u8()?;
                    Ok(Methods::Delete(Delete {
                        exchange,
                        if_unused: bits & 1 != 0,
                        nowait: bits & (1 << 1) != 0,
                    }))
                }
                21 => Ok(Methods::DeleteOk),
                30 | 40 => {
                    let _ticket = r.read_u16()?;
                    let destination = r.read_short_string()?;
                    let source = r.read_short_string()?;
                    let routing_key = r.read_short_string()?;
                    let nowait = r.read_u8()? & 1 != 0;
                    let arguments = r.read_table()?;
                    Ok(if method_id == 30 {
                        Methods::Bind(Bind {
                            destination,
                            source,
                            routing_key,
                            nowait,
                            arguments,
                        })
                    } else {
                        Methods::Unbind(Unbind {
                            destination,
                            source,
                            routing_key,
                            nowait,
                            arguments,
                        })
                    })
                }
                31 => Ok(Methods::BindOk),
                51 => Ok(Methods::UnbindOk),
                _ => Err(FrameError::UnknownMethod(CLASS_ID, method_id)),
            }
        }

        pub(super) fn encode(&self, w: &mut FrameWriter<'_>) -> Result<(), FrameError> {
            match self {
                Methods::Declare(m) => {
                    w.write_u16(0);
                    w.write_short_string(&m.exchange)?;
                    w.write_short_string(&m.kind)?;
                    let mut bits = 0u8;
                    if m.passive {
                        bits |= 1;
                    }
                    if m.durable {
                        bits |= 1 << 1;
                    }
                    if m.auto_delete {
                        bits |= 1 << 2;
                    }
                    if m.internal {
                        bits |= 1 << 3;
                    }
                    if m.nowait {
                        bits |= 1 << 4;
                    }
                    w.write_u8(bits);
                    w.write_table(&m.arguments)?;
                }
                Methods::DeclareOk => {}
                Methods::Delete(m) => {
                    w.write_u16(0);
                    w.write_short_string(&m.exchange)?;
                    let mut bits = 0u8;
                    if m.if_unused {
                        bits |= 1;
                    }
                    if m.nowait {
                        bits |= 1 << 1;
                    }
                    w.write_u8(bits);
                }
                Methods::DeleteOk => {}
                Methods::Bind(m) => {
                    w.write_u16(0);
                    w.write_short_string(&m.destination)?;
                    w.write_short_string(&m.source)?;
                    w.write_short_string(&m.routing_key)?;
                    w.write_u8(u8::from(m.nowait));
                    w.write_table(&m.arguments)?;
                }
                Methods::BindOk => {}
                Methods::Unbind(m) => {
                    w.write_u16(0);
                    w.write_short_string(&m.destination)?;
                    w.write_short_string(&m.source)?;
                    w.write_short_string(&m.routing_key)?;
                    w.write_u8(u8::from(m.nowait));
                    w.write_table(&m.arguments)?;
                }
                Methods::UnbindOk => {}
            }
            Ok(())
        }
    }
}

pub mod queue {
    use super::*;

    pub(crate) const CLASS_ID: ClassId = 50;

    #[derive(Clone, Debug, PartialEq)]
    pub enum Methods {
        Declare(Declare),
        DeclareOk(DeclareOk),
        Bind(Bind),
        BindOk,
        Purge(Purge),
        PurgeOk(PurgeOk),
        Delete(Delete),
        DeleteOk(DeleteOk),
        Unbind(Unbind),
        UnbindOk,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Declare {
        pub queue: ShortString,
        pub passive: bool,
        pub durable: bool,
        pub exclusive: bool,
        pub auto_delete: bool,
        pub nowait: bool,
        pub arguments: FieldTable,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct DeclareOk {
        pub queue: ShortString,
        pub message_count: u32,
        pub consumer_count: u32,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Bind {
        pub queue: ShortString,
        pub exchange: ShortString,
        pub routing_key: ShortString,
        pub nowait: bool,
        pub arguments: FieldTable,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Purge {
        pub queue: ShortString,
        pub nowait: bool,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PurgeOk {
        pub message_count: u32,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Delete {
        pub queue: ShortString,
        pub if_unused: bool,
        pub if_empty: bool,
        pub nowait: bool,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DeleteOk {
        pub message_count: u32,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Unbind {
        pub queue: ShortString,
        pub exchange: ShortString,
        pub routing_key: ShortString,
        pub arguments: FieldTable,
    }

    impl Methods {
        pub(crate) fn method_id(&self) -> MethodId {
            match self {
                Methods::Declare(_) => 10,
                Methods::DeclareOk(_) => 11,
                Methods::Bind(_) => 20,
                Methods::BindOk => 21,
                Methods::Purge(_) => 30,
                Methods::PurgeOk(_) => 31,
                Methods::Delete(_) => 40,
                Methods::DeleteOk(_) => 41,
                Methods::Unbind(_) => 50,
                Methods::UnbindOk => 51,
            }
        }

        pub(crate) fn method_name(&self) -> &'static str {
            match self {
                Methods::Declare(_) => "queue.declare",
                Methods::DeclareOk(_) => "queue.declare-ok",
                Methods::Bind(_) => "queue.bind",
                Methods::BindOk => "queue.bind-ok",
                Methods::Purge(_) => "queue.purge",
                Methods::PurgeOk(_) => "queue.purge-ok",
                Methods::Delete(_) => "queue.delete",
                Methods::DeleteOk(_) => "queue.delete-ok",
                Methods::Unbind(_) => "queue.unbind",
                Methods::UnbindOk => "queue.unbind-ok",
            }
        }

        pub(super) fn decode(
            method_id: MethodId,
            r: &mut FrameReader<'_>,
        ) -> Result<Methods, FrameError> {
            match method_id {
                10 => {
                    let _ticket = r.read_u16()?;
                    let queue = r.read_short_string()?;
                    let bits = r.read_u8()?;
                    Ok(Methods::Declare(Declare {
                        queue,
                        passive: bits & 1 != 0,
                        durable: bits & (1 << 1) != 0,
                        exclusive: bits & (1 << 2) != 0,
                        auto_delete: bits & (1 << 3) != 0,
                        nowait: bits & (1 << 4) != 0,
                        arguments: r.read_table()?,
                    }))
                }
                11 => Ok(Methods::DeclareOk(DeclareOk {
                    queue: r.read_short_string()?,
                    message_count: r.read_u32()?,
                    consumer_count: r.read_u32()?,
                })),
                20 => {
                    let _ticket = r.read_u16()?;
                    Ok(Methods::Bind(Bind {
                        queue: r.read_short_string()?,
                        exchange: r.read_short_string()?,
                        routing_key: r.read_short_string()?,
                        nowait: r.read_u8()? & 1 != 0,
                        arguments: r.read_table()?,
                    }))
                }
                21 => Ok(Methods::BindOk),
                30 => {
                    let _ticket = r.read_u16()?;
                    Ok(Methods::Purge(Purge {
                        queue: r.read_short_string()?,
                        nowait: r.read_u8()? & 1 != 0,
                    }))
                }
                31 => Ok(Methods::PurgeOk(PurgeOk {
                    message_count: r.read_u32()?,
                })),
                40 => {
                    let _ticket = r.read_u16()?;
                    let queue = r.read_short_string()?;
                    let bits = r.read_u8()?;
                    Ok(Methods::Delete(Delete {
                        queue,
                        if_unused: bits & 1 != 0,
                        if_empty: bits & (1 << 1) != 0,
                        nowait: bits & (1 << 2) != 0,
                    }))
                }
                41 => Ok(Methods::DeleteOk(DeleteOk {
                    message_count: r.read_u32()?,
                })),
                50 => {
                    let _ticket = r.read_u16()?;
                    Ok(Methods::Unbind(Unbind {
                        queue: r.read_short_string()?,
                        exchange: r.read_short_string()?,
                        routing_key: r.read_short_string()?,
                        arguments: r.read_table()?,
                    }))
                }
                51 => Ok(Methods::UnbindOk),
                _ => Err(FrameError::UnknownMethod(CLASS_ID, method_id)),
            }
        }

        pub(super) fn encode(&self, w: &mut FrameWriter<'_>) -> Result<(), FrameError> {
            match self {
                Methods::Declare(m) => {
                    w.write_u16(0);
                    w.write_short_string(&m.queue)?;
                    let mut bits = 0u8;
                    if m.passive {
                        bits |= 1;
                    }
                    if m.durable {
                        bits |= 1 << 1;
                    }
                    if m.exclusive {
                        bits |= 1 << 2;
                    }
                    if m.auto_delete {
                        bits |= 1 << 3;
                    }
                    if m.nowait {
                        bits |= 1 << 4;
                    }
                    w.write_u8(bits);
                    w.write_table(&m.arguments)?;
                }
                Methods::DeclareOk(m) => {
                    w.write_short_string(&m.queue)?;
                    w.write_u32(m.message_count);
                    w.write_u32(m.consumer_count);
                }
                Methods::Bind(m) => {
                    w.write_u16(0);
                    w.write_short_string(&m.queue)?;
                    w.write_short_string(&m.exchange)?;
                    w.write_short_string(&m.routing_key)?;
                    w.write_u8(u8::from(m.nowait));
                    w.write_table(&m.arguments)?;
                }
                Methods::BindOk => {}
                Methods::Purge(m) => {
                    w.write_u16(0);
                    w.write_short_string(&m.queue)?;
                    w.write_u8(u8::from(m.nowait));
                }
                Methods::PurgeOk(m) => w.write_u32(m.message_count),
                Methods::Delete(m) => {
                    w.write_u16(0);
                    w.write_short_string(&m.queue)?;
                    let mut bits = 0u8;
                    if m.if_unused {
                        bits |= 1;
                    }
                    if m.if_empty {
                        bits |= 1 << 1;
                    }
                    if m.nowait {
                        bits |= 1 << 2;
                    }
                    w.write_u8(bits);
                }
                Methods::DeleteOk(m) => w.write_u32(m.message_count),
                Methods::Unbind(m) => {
                    w.write_u16(0);
                    w.write_short_string(&m.queue)?;
                    w.write_short_string(&m.exchange)?;
                    w.write_short_string(&m.routing_key)?;
                    w.write_table(&m.arguments)?;
                }
                Methods::UnbindOk => {}
            }
            Ok(())
        }
    }
}

pub mod basic {
    use super::*;
    use crate::types::{DeliveryTag, ReplyCode};

    pub(crate) const CLASS_ID: ClassId = 60;

    #[derive(Clone, Debug, PartialEq)]
    pub enum Methods {
        Qos(Qos),
        QosOk,
        Consume(Consume),
        ConsumeOk(ConsumeOk),
        Cancel(Cancel),
        CancelOk(CancelOk),
        Publish(Publish),
        Return(Return),
        Deliver(Deliver),
        Get(Get),
        GetOk(GetOk),
        GetEmpty,
        Ack(Ack),
        Reject(Reject),
        Recover(Recover),
        RecoverOk,
        Nack(Nack),
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Qos {
        pub prefetch_size: u32,
        pub prefetch_count: u16,
        pub global: bool,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Consume {
        pub queue: ShortString,
        pub consumer_tag: ShortString,
        pub no_local: bool,
        pub no_ack: bool,
        pub exclusive: bool,
        pub nowait: bool,
        pub arguments: FieldTable,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct ConsumeOk {
        pub consumer_tag: ShortString,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Cancel {
        pub consumer_tag: ShortString,
        pub nowait: bool,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct CancelOk {
        pub consumer_tag: ShortString,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Publish {
        pub exchange: ShortString,
        pub routing_key: ShortString,
        pub mandatory: bool,
        pub immediate: bool,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Return {
        pub reply_code: ReplyCode,
        pub reply_text: ShortString,
        pub exchange: ShortString,
        pub routing_key: ShortString,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Deliver {
        pub consumer_tag: ShortString,
        pub delivery_tag: DeliveryTag,
        pub redelivered: bool,
        pub exchange: ShortString,
        pub routing_key: ShortString,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct Get {
        pub queue: ShortString,
        pub no_ack: bool,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    pub struct GetOk {
        pub delivery_tag: DeliveryTag,
        pub redelivered: bool,
        pub exchange: ShortString,
        pub routing_key: ShortString,
        pub message_count: u32,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Ack {
        pub delivery_tag: DeliveryTag,
        pub multiple: bool,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Reject {
        pub delivery_tag: DeliveryTag,
        pub requeue: bool,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Recover {
        pub requeue: bool,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Nack {
        pub delivery_tag: DeliveryTag,
        pub multiple: bool,
        pub requeue: bool,
    }

    impl Methods {
        pub(crate) fn method_id(&self) -> MethodId {
            match self {
                Methods::Qos(_) => 10,
                Methods::QosOk => 11,
                Methods::Consume(_) => 20,
                Methods::ConsumeOk(_) => 21,
                Methods::Cancel(_) => 30,
                Methods::CancelOk(_) => 31,
                Methods::Publish(_) => 40,
                Methods::Return(_) => 50,
                Methods::Deliver(_) => 60,
                Methods::Get(_) => 70,
                Methods::GetOk(_) => 71,
                Methods::GetEmpty => 72,
                Methods::Ack(_) => 80,
                Methods::Reject(_) => 90,
                Methods::Recover(_) => 110,
                Methods::RecoverOk => 111,
                Methods::Nack(_) => 120,
            }
        }

        pub(crate) fn method_name(&self) -> &'static str {
            match self {
                Methods::Qos(_) => "basic.qos",
                Methods::QosOk => "basic.qos-ok",
                Methods::Consume(_) => "basic.consume",
                Methods::ConsumeOk(_) => "basic.consume-ok",
                Methods::Cancel(_) => "basic.cancel",
                Methods::CancelOk(_) => "basic.cancel-ok",
                Methods::Publish(_) => "basic.publish",
                Methods::Return(_) => "basic.return",
                Methods::Deliver(_) => "basic.deliver",
                Methods::Get(_) => "basic.get",
                Methods::GetOk(_) => "basic.get-ok",
                Methods::GetEmpty => "basic.get-empty",
                Methods::Ack(_) => "basic.ack",
                Methods::Reject(_) => "basic.reject",
                Methods::Recover(_) => "basic.recover",
                Methods::RecoverOk => "basic.recover-ok",
                Methods::Nack(_) => "basic.nack",
            }
        }

        pub(super) fn decode(
            method_id: MethodId,
            r: &mut FrameReader<'_>,
        ) -> Result<Methods, FrameError> {
            match method_id {
                10 => Ok(Methods::Qos(Qos {
                    prefetch_size: r.read_u32()?,
                    prefetch_count: r.read_u16()?,
                    global: r.read_u8()? & 1 != 0,
                })),
                11 => Ok(Methods::QosOk),
                20 => {
                    let _ticket = r.read_u16()?;
                    let queue = r.read_short_string()?;
                    let consumer_tag = r.read_short_string()?;
                    let bits = r.read_u8()?;
                    Ok(Methods::Consume(Consume {
                        queue,
                        consumer_tag,
                        no_local: bits & 1 != 0,
                        no_ack: bits & (1 << 1) != 0,
                        exclusive: bits & (1 << 2) != 0,
                        nowait: bits & (1 << 3) != 0,
                        arguments: r.read_table()?,
                    }))
                }
                21 => Ok(Methods::ConsumeOk(ConsumeOk {
                    consumer_tag: r.read_short_string()?,
                })),
                30 => Ok(Methods::Cancel(Cancel {
                    consumer_tag: r.read_short_string()?,
                    nowait: r.read_u8()? & 1 != 0,
                })),
                31 => Ok(Methods::CancelOk(CancelOk {
                    consumer_tag: r.read_short_string()?,
                })),
                40 => {
                    let _ticket = r.read_u16()?;
                    let exchange = r.read_short_string()?;
                    let routing_key = r.read_short_string()?;
                    let bits = r.read_u8()?;
                    Ok(Methods::Publish(Publish {
                        exchange,
                        routing_key,
                        mandatory: bits & 1 != 0,
                        immediate: bits & (1 << 1) != 0,
                    }))
                }
                50 => Ok(Methods::Return(Return {
                    reply_code: r.read_u16()?,
                    reply_text: r.read_short_string()?,
                    exchange: r.read_short_string()?,
                    routing_key: r.read_short_string()?,
                })),
                60 => Ok(Methods::Deliver(Deliver {
                    consumer_tag: r.read_short_string()?,
                    delivery_tag: r.read_u64()?,
                    redelivered: r.read_u8()? & 1 != 0,
                    exchange: r.read_short_string()?,
                    routing_key: r.read_short_string()?,
                })),
                70 => {
                    let _ticket = r.read_u16()?;
                    Ok(Methods::Get(Get {
                        queue: r.read_short_string()?,
                        no_ack: r.read_u8()? & 1 != 0,
                    }))
                }
                71 => Ok(Methods::GetOk(GetOk {
                    delivery_tag: r.read_u64()?,
                    redelivered: r.read_u8()? & 1 != 0,
                    exchange: r.read_short_string()?,
                    routing_key: r.read_short_string()?,
                    message_count: r.read_u32()?,
                })),
                72 => {
                    let _reserved = r.read_short_string()?;
                    Ok(Methods::GetEmpty)
                }
                80 => Ok(Methods::Ack(Ack {
                    delivery_tag: r.read_u64()?,
                    multiple: r.read_u8()? & 1 != 0,
                })),
                90 => Ok(Methods::Reject(Reject {
                    delivery_tag: r.read_u64()?,
                    requeue: r.read_u8()? & 1 != 0,
                })),
                110 => Ok(Methods::Recover(Recover {
                    requeue: r.read_u8()? & 1 != 0,
                })),
                111 => Ok(Methods::RecoverOk),
                120 => {
                    let delivery_tag = r.read_u64()?;
                    let bits = r.read_u8()?;
                    Ok(Methods::Nack(Nack {
                        delivery_tag,
                        multiple: bits & 1 != 0,
                        requeue: bits & (1 << 1) != 0,
                    }))
                }
                _ => Err(FrameError::UnknownMethod(CLASS_ID, method_id)),
            }
        }

        pub(super) fn encode(&self, w: &mut FrameWriter<'_>) -> Result<(), FrameError> {
            match self {
                Methods::Qos(m) => {
                    w.write_u32(m.prefetch_size);
                    w.write_u16(m.prefetch_count);
                    w.write_u8(u8::from(m.global));
                }
                Methods::QosOk => {}
                Methods::Consume(m) => {
                    w.write_u16(0);
                    w.write_short_string(&m.queue)?;
                    w.write_short_string(&m.consumer_tag)?;
                    let mut bits = 0u8;
                    if m.no_local {
                        bits |= 1;
                    }
                    if m.no_ack {
                        bits |= 1 << 1;
                    }
                    if m.exclusive {
                        bits |= 1 << 2;
                    }
                    if m.nowait {
                        bits |= 1 << 3;
                    }
                    w.write_u8(bits);
                    w.write_table(&m.arguments)?;
                }
                Methods::ConsumeOk(m) => w.write_short_string(&m.consumer_tag)?,
                Methods::Cancel(m) => {
                    w.write_short_string(&m.consumer_tag)?;
                    w.write_u8(u8::from(m.nowait));
                }
                Methods::CancelOk(m) => w.write_short_string(&m.consumer_tag)?,
                Methods::Publish(m) => {
                    w.write_u16(0);
                    w.write_short_string(&m.exchange)?;
                    w.write_short_string(&m.routing_key)?;
                    let mut bits = 0u8;
                    if m.mandatory {
                        bits |= 1;
                    }
                    if m.immediate {
                        bits |= 1 << 1;
                    }
                    w.write_u8(bits);
                }
                Methods::Return(m) => {
                    w.write_u16(m.reply_code);
                    w.write_short_string(&m.reply_text)?;
                    w.write_short_string(&m.exchange)?;
                    w.write_short_string(&m.routing_key)?;
                }
                Methods::Deliver(m) => {
                    w.write_short_string(&m.consumer_tag)?;
                    w.write_u64(m.delivery_tag);
                    w.write_u8(u8::from(m.redelivered));
                    w.write_short_string(&m.exchange)?;
                    w.write_short_string(&m.routing_key)?;
                }
                Methods::Get(m) => {
                    w.write_u16(0);
                    w.write_short_string(&m.queue)?;
                    w.write_u8(u8::from(m.no_ack));
                }
                Methods::GetOk(m) => {
                    w.write_u64(m.delivery_tag);
                    w.write_u8(u8::from(m.redelivered));
                    w.write_short_string(&m.exchange)?;
                    w.write_short_string(&m.routing_key)?;
                    w.write_u32(m.message_count);
                }
                Methods::GetEmpty => w.write_short_string("")?,
                Methods::Ack(m) => {
                    w.write_u64(m.delivery_tag);
                    w.write_u8(u8::from(m.multiple));
                }
                Methods::Reject(m) => {
                    w.write_u64(m.delivery_tag);
                    w.write_u8(u8::from(m.requeue));
                }
                Methods::Recover(m) => w.write_u8(u8::from(m.requeue)),
                Methods::RecoverOk => {}
                Methods::Nack(m) => {
                    w.write_u64(m.delivery_tag);
                    let mut bits = 0u8;
                    if m.multiple {
                        bits |= 1;
                    }
                    if m.requeue {
                        bits |= 1 << 1;
                    }
                    w.write_u8(bits);
                }
            }
            Ok(())
        }
    }
}

pub mod tx {
    use super::*;

    pub(crate) const CLASS_ID: ClassId = 90;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Methods {
        Select,
        SelectOk,
        Commit,
        CommitOk,
        Rollback,
        RollbackOk,
    }

    impl Methods {
        pub(crate) fn method_id(&self) -> MethodId {
            match self {
                Methods::Select => 10,
                Methods::SelectOk => 11,
                Methods::Commit => 20,
                Methods::CommitOk => 21,
                Methods::Rollback => 30,
                Methods::RollbackOk => 31,
            }
        }

        pub(crate) fn method_name(&self) -> &'static str {
            match self {
                Methods::Select => "tx.select",
                Methods::SelectOk => "tx.select-ok",
                Methods::Commit => "tx.commit",
                Methods::CommitOk => "tx.commit-ok",
                Methods::Rollback => "tx.rollback",
                Methods::RollbackOk => "tx.rollback-ok",
            }
        }

        pub(super) fn decode(
            method_id: MethodId,
            _r: &mut FrameReader<'_>,
        ) -> Result<Methods, FrameError> {
            match method_id {
                10 => Ok(Methods::Select),
                11 => Ok(Methods::SelectOk),
                20 => Ok(Methods::Commit),
                21 => Ok(Methods::CommitOk),
                30 => Ok(Methods::Rollback),
                31 => Ok(Methods::RollbackOk),
                _ => Err(FrameError::UnknownMethod(CLASS_ID, method_id)),
            }
        }

        pub(super) fn encode(&self, _w: &mut FrameWriter<'_>) -> Result<(), FrameError> {
            Ok(())
        }
    }
}

pub mod confirm {
    use super::*;

    pub(crate) const CLASS_ID: ClassId = 85;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Methods {
        Select(Select),
        SelectOk,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Select {
        pub nowait: bool,
    }

    impl Methods {
        pub(crate) fn method_id(&self) -> MethodId {
            match self {
                Methods::Select(_) => 10,
                Methods::SelectOk => 11,
            }
        }

        pub(crate) fn method_name(&self) -> &'static str {
            match self {
                Methods::Select(_) => "confirm.select",
                Methods::SelectOk => "confirm.select-ok",
            }
        }

        pub(super) fn decode(
            method_id: MethodId,
            r: &mut FrameReader<'_>,
        ) -> Result<Methods, FrameError> {
            match method_id {
                10 => Ok(Methods::Select(Select {
                    nowait: r.read_u8()? & 1 != 0,
                })),
                11 => Ok(Methods::SelectOk),
                _ => Err(FrameError::UnknownMethod(CLASS_ID, method_id)),
            }
        }

        pub(super) fn encode(&self, w: &mut FrameWriter<'_>) -> Result<(), FrameError> {
            if let Methods::Select(m) = self {
                w.write_u8(u8::from(m.nowait));
            }
            Ok(())
        }
    }
}

/// Properties of the Basic class carried by content header frames.
///
/// Flag bit `15 - i` is set iff field `i` below is present.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicProperties {
    pub content_type: Option<ShortString>,
    pub content_encoding: Option<ShortString>,
    pub headers: Option<FieldTable>,
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<ShortString>,
    pub reply_to: Option<ShortString>,
    pub expiration: Option<ShortString>,
    pub message_id: Option<ShortString>,
    pub timestamp: Option<u64>,
    pub kind: Option<ShortString>,
    pub user_id: Option<ShortString>,
    pub app_id: Option<ShortString>,
    pub cluster_id: Option<ShortString>,
}

impl BasicProperties {
    pub fn with_content_type(mut self, content_type: ShortString) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn with_content_encoding(mut self, content_encoding: ShortString) -> Self {
        self.content_encoding = Some(content_encoding);
        self
    }

    pub fn with_headers(mut self, headers: FieldTable) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_delivery_mode(mut self, delivery_mode: u8) -> Self {
        self.delivery_mode = Some(delivery_mode);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: ShortString) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_reply_to(mut self, reply_to: ShortString) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    pub fn with_expiration(mut self, expiration: ShortString) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_message_id(mut self, message_id: ShortString) -> Self {
        self.message_id = Some(message_id);
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub(crate) fn flags(&self) -> u16 {
        let mut flags = 0u16;
        let mut bit = 15;
        let mut mark = |present: bool| {
            if present {
                flags |= 1 << bit;
            }
            bit -= 1;
        };
        mark(self.content_type.is_some());
        mark(self.content_encoding.is_some());
        mark(self.headers.is_some());
        mark(self.delivery_mode.is_some());
        mark(self.priority.is_some());
        mark(self.correlation_id.is_some());
        mark(self.reply_to.is_some());
        mark(self.expiration.is_some());
        mark(self.message_id.is_some());
        mark(self.timestamp.is_some());
        mark(self.kind.is_some());
        mark(self.user_id.is_some());
        mark(self.app_id.is_some());
        mark(self.cluster_id.is_some());
        flags
    }

    pub(crate) fn encode(&self, w: &mut FrameWriter<'_>) -> Result<(), FrameError> {
        w.write_u16(self.flags());
        if let Some(v) = &self.content_type {
            w.write_short_string(v)?;
        }
        if let Some(v) = &self.content_encoding {
            w.write_short_string(v)?;
        }
        if let Some(v) = &self.headers {
            w.write_table(v)?;
        }
        if let Some(v) = self.delivery_mode {
            w.write_u8(v);
        }
        if let Some(v) = self.priority {
            w.write_u8(v);
        }
        if let Some(v) = &self.correlation_id {
            w.write_short_string(v)?;
        }
        if let Some(v) = &self.reply_to {
            w.write_short_string(v)?;
        }
        if let Some(v) = &self.expiration {
            w.write_short_string(v)?;
        }
        if let Some(v) = &self.message_id {
            w.write_short_string(v)?;
        }
        if let Some(v) = self.timestamp {
            w.write_u64(v);
        }
        if let Some(v) = &self.kind {
            w.write_short_string(v)?;
        }
        if let Some(v) = &self.user_id {
            w.write_short_string(v)?;
        }
        if let Some(v) = &self.app_id {
            w.write_short_string(v)?;
        }
        if let Some(v) = &self.cluster_id {
            w.write_short_string(v)?;
        }
        Ok(())
    }

    pub(crate) fn decode(flags: u16, r: &mut FrameReader<'_>) -> Result<Self, FrameError> {
        let mut bit = 15;
        let mut present = || {
            let set = flags & (1 << bit) != 0;
            bit -= 1;
            set
        };
        let mut properties = BasicProperties::default();
        if present() {
            properties.content_type = Some(r.read_short_string()?);
        }
        if present() {
            properties.content_encoding = Some(r.read_short_string()?);
        }
        if present() {
            properties.headers = Some(r.read_table()?);
        }
        if present() {
            properties.delivery_mode = Some(r.read_u8()?);
        }
        if present() {
            properties.priority = Some(r.read_u8()?);
        }
        if present() {
            properties.correlation_id = Some(r.read_short_string()?);
        }
        if present() {
            properties.reply_to = Some(r.read_short_string()?);
        }
        if present() {
            properties.expiration = Some(r.read_short_string()?);
        }
        if present() {
            properties.message_id = Some(r.read_short_string()?);
        }
        if present() {
            properties.timestamp = Some(r.read_u64()?);
        }
        if present() {
            properties.kind = Some(r.read_short_string()?);
        }
        if present() {
            properties.user_id = Some(r.read_short_string()?);
        }
        if present() {
            properties.app_id = Some(r.read_short_string()?);
        }
        if present() {
            properties.cluster_id = Some(r.read_short_string()?);
        }
        Ok(properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::types::AMQPValue;

    fn roundtrip(method: AMQPClass) {
        let mut buf = Buffer::with_capacity(512);
        method.encode(&mut FrameWriter::new(&mut buf)).unwrap();
        let mut reader = FrameReader::new(buf.data());
        let decoded = AMQPClass::decode(&mut reader).unwrap();
        assert_eq!(decoded, method);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn connection_methods_roundtrip() {
        let mut server_properties = FieldTable::default();
        server_properties.insert("product".into(), AMQPValue::LongString("RabbitMQ".into()));
        roundtrip(AMQPClass::Connection(connection::Methods::Start(
            connection::Start {
                version_major: 0,
                version_minor: 9,
                server_properties,
                mechanisms: "PLAIN AMQPLAIN".into(),
                locales: "en_US".into(),
            },
        )));
        roundtrip(AMQPClass::Connection(connection::Methods::Tune(
            connection::Tune {
                channel_max: 2047,
                frame_max: 131_072,
                heartbeat: 60,
            },
        )));
        roundtrip(AMQPClass::Connection(connection::Methods::Open(
            connection::Open {
                virtual_host: "/".into(),
                capabilities: "".into(),
                insist: true,
            },
        )));
        roundtrip(AMQPClass::Connection(connection::Methods::Close(
            connection::Close {
                reply_code: 320,
                reply_text: "CONNECTION_FORCED".into(),
                class_id: 0,
                method_id: 0,
            },
        )));
        roundtrip(AMQPClass::Connection(connection::Methods::OpenOk));
        roundtrip(AMQPClass::Connection(connection::Methods::CloseOk));
    }

    #[test]
    fn bit_fields_share_one_octet() {
        let declare = queue::Declare {
            queue: "q".into(),
            durable: true,
            exclusive: true,
            ..Default::default()
        };
        let mut buf = Buffer::with_capacity(64);
        AMQPClass::Queue(queue::Methods::Declare(declare))
            .encode(&mut FrameWriter::new(&mut buf))
            .unwrap();
        // class(2) method(2) ticket(2) queue(1+1) bits(1) table(4)
        assert_eq!(buf.data().len(), 13);
        assert_eq!(buf.data()[8], (1 << 1) | (1 << 2));
    }

    #[test]
    fn unknown_method_pair_is_rejected() {
        let mut buf = Buffer::with_capacity(16);
        let mut w = FrameWriter::new(&mut buf);
        w.write_u16(10);
        w.write_u16(99);
        let err = AMQPClass::decode(&mut FrameReader::new(buf.data())).unwrap_err();
        assert_eq!(err, FrameError::UnknownMethod(10, 99));
        let mut buf = Buffer::with_capacity(16);
        let mut w = FrameWriter::new(&mut buf);
        w.write_u16(77);
        w.write_u16(10);
        let err = AMQPClass::decode(&mut FrameReader::new(buf.data())).unwrap_err();
        assert_eq!(err, FrameError::UnknownMethod(77, 10));
    }

    #[test]
    fn basic_properties_flags_follow_declaration_order() {
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_timestamp(1_700_000_000);
        let flags = properties.flags();
        assert_eq!(flags, (1 << 15) | (1 << 12) | (1 << 6));

        let mut buf = Buffer::with_capacity(128);
        properties.encode(&mut FrameWriter::new(&mut buf)).unwrap();
        let mut reader = FrameReader::new(buf.data());
        let read_flags = reader.read_u16().unwrap();
        let decoded = BasicProperties::decode(read_flags, &mut reader).unwrap();
        assert_eq!(decoded, properties);
    }

    #[test]
    fn deliver_has_content_but_ack_does_not() {
        let deliver = AMQPClass::Basic(basic::Methods::Deliver(basic::Deliver::default()));
        assert!(deliver.has_content());
        let ack = AMQPClass::Basic(basic::Methods::Ack(basic::Ack::default()));
        assert!(!ack.has_content());
        assert_eq!(deliver.method_name(), "basic.deliver");
    }
}
