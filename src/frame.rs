//! Frame envelope serialization.
//!
//! ```text
//! 0      1         3             7                    size+7 size+8
//! +------+---------+-------------+   +------------+   +-----------+
//! | type | channel |    size     |   | payload    |   | frame-end |
//! +------+---------+-------------+   +------------+   +-----------+
//!   octet  short        long        size octets           octet
//! ```
//!
//! The size field counts the payload octets between the header and the
//! terminating `0xCE`. It is backpatched once the payload has been written;
//! the staging buffer never exposes the frame before that happens.

use crate::buffer::Buffer;
use crate::codec::{FrameReader, FrameWriter};
use crate::protocol::{
    self, AMQPClass, BasicProperties, FRAME_BODY, FRAME_END, FRAME_HEADER, FRAME_HEARTBEAT,
    FRAME_METHOD,
};
use crate::types::{ChannelId, ClassId, FrameSize, MethodId};
use std::{error, fmt};

/// A single unit of AMQP transmission, plus the protocol-header sentinel.
#[derive(Clone, Debug, PartialEq)]
pub enum AMQPFrame {
    /// The 8-byte `"AMQP" 0 0 9 1` sequence sent once at connection start.
    ProtocolHeader,
    Method(ChannelId, AMQPClass),
    Header(ChannelId, ContentHeader),
    Body(ChannelId, Vec<u8>),
    Heartbeat(ChannelId),
}

impl AMQPFrame {
    pub(crate) fn channel_id(&self) -> ChannelId {
        match self {
            AMQPFrame::ProtocolHeader => 0,
            AMQPFrame::Method(channel_id, _)
            | AMQPFrame::Header(channel_id, _)
            | AMQPFrame::Body(channel_id, _)
            | AMQPFrame::Heartbeat(channel_id) => *channel_id,
        }
    }

}

/// The payload of a content header frame, preceding body frames.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentHeader {
    pub class_id: ClassId,
    pub weight: u16,
    pub body_size: u64,
    pub properties: BasicProperties,
}

/// Errors raised by the codec and the frame parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Declared payload size exceeds the negotiated frame limit.
    Oversized(FrameSize, FrameSize),
    BadFrameEnd(u8),
    BadFrameType(u8),
    UnknownMethod(ClassId, MethodId),
    Truncated,
    InvalidFieldType(u8),
    Utf8,
    StringTooLong(usize),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Oversized(size, max) => {
                write!(f, "frame payload of {} bytes exceeds limit of {}", size, max)
            }
            FrameError::BadFrameEnd(byte) => {
                write!(f, "expected frame-end octet 0xCE, got 0x{:02X}", byte)
            }
            FrameError::BadFrameType(frame_type) => write!(f, "unknown frame type {}", frame_type),
            FrameError::UnknownMethod(class_id, method_id) => {
                write!(f, "unknown method {}:{}", class_id, method_id)
            }
            FrameError::Truncated => write!(f, "field decoding ran past payload bounds"),
            FrameError::InvalidFieldType(tag) => {
                write!(f, "invalid field value tag 0x{:02X}", tag)
            }
            FrameError::Utf8 => write!(f, "string field is not valid UTF-8"),
            FrameError::StringTooLong(length) => {
                write!(f, "short string of {} bytes exceeds 255", length)
            }
        }
    }
}

impl error::Error for FrameError {}

/// Serializes `frame` into the staging buffer.
pub(crate) fn gen_frame(frame: &AMQPFrame, buf: &mut Buffer) -> Result<(), FrameError> {
    match frame {
        AMQPFrame::ProtocolHeader => {
            buf.push(&protocol::PROTOCOL_HEADER);
            Ok(())
        }
        AMQPFrame::Method(channel_id, method) => {
            gen_framed(FRAME_METHOD, *channel_id, buf, |w| method.encode(w))
        }
        AMQPFrame::Header(channel_id, header) => {
            gen_framed(FRAME_HEADER, *channel_id, buf, |w| {
                w.write_u16(header.class_id);
                w.write_u16(header.weight);
                w.write_u64(header.body_size);
                header.properties.encode(w)
            })
        }
        AMQPFrame::Body(channel_id, payload) => gen_framed(FRAME_BODY, *channel_id, buf, |w| {
            w.write_bytes(payload);
            Ok(())
        }),
        AMQPFrame::Heartbeat(channel_id) => {
            gen_framed(FRAME_HEARTBEAT, *channel_id, buf, |_| Ok(()))
        }
    }
}

fn gen_framed<F>(
    frame_type: u8,
    channel_id: ChannelId,
    buf: &mut Buffer,
    payload: F,
) -> Result<(), FrameError>
where
    F: FnOnce(&mut FrameWriter<'_>) -> Result<(), FrameError>,
{
    let start = buf.checkpoint();
    let mut writer = FrameWriter::new(buf);
    writer.write_u8(frame_type);
    writer.write_u16(channel_id);
    writer.write_u32(0);
    payload(&mut writer)?;
    let size = buf.written_since(start) - 7;
    buf.patch_u32(start, 3, size as u32);
    buf.push_u8(FRAME_END);
    Ok(())
}

/// Splits a message body into as many body frames as the negotiated frame
/// size allows: each frame's `8 + payload + 1` stays within `frame_max`.
pub(crate) fn split_body(
    channel_id: ChannelId,
    body: Vec<u8>,
    frame_max: FrameSize,
) -> Vec<AMQPFrame> {
    let chunk = (frame_max - protocol::constants::FRAME_OVERHEAD) as usize;
    if body.is_empty() {
        return Vec::new();
    }
    if body.len() <= chunk {
        return vec![AMQPFrame::Body(channel_id, body)];
    }
    body.chunks(chunk)
        .map(|piece| AMQPFrame::Body(channel_id, piece.to_vec()))
        .collect()
}

/// Decodes a complete frame payload, already stripped of the envelope.
pub(crate) fn decode_payload(
    frame_type: u8,
    channel_id: ChannelId,
    payload: &[u8],
) -> Result<AMQPFrame, FrameError> {
    match frame_type {
        FRAME_METHOD => {
            let mut reader = FrameReader::new(payload);
            let method = AMQPClass::decode(&mut reader)?;
            Ok(AMQPFrame::Method(channel_id, method))
        }
        FRAME_HEADER => {
            let mut reader = FrameReader::new(payload);
            let class_id = reader.read_u16()?;
            let weight = reader.read_u16()?;
            let body_size = reader.read_u64()?;
            let flags = reader.read_u16()?;
            let properties = BasicProperties::decode(flags, &mut reader)?;
            Ok(AMQPFrame::Header(
                channel_id,
                ContentHeader {
                    class_id,
                    weight,
                    body_size,
                    properties,
                },
            ))
        }
        FRAME_BODY => Ok(AMQPFrame::Body(channel_id, payload.to_vec())),
        FRAME_HEARTBEAT => Ok(AMQPFrame::Heartbeat(channel_id)),
        frame_type => Err(FrameError::BadFrameType(frame_type)),
    }
}
