//! Stateful frame parser.
//!
//! Consumes whatever bytes the transport produced, across arbitrary chunk
//! boundaries, and yields one structured frame at a time. A parse error is
//! terminal: the parser stays poisoned and the connection must discard it
//! (and the buffered bytes) before carrying on.

use crate::buffer::Buffer;
use crate::frame::{self, AMQPFrame, FrameError};
use crate::protocol::{
    FRAME_BODY, FRAME_END, FRAME_HEADER, FRAME_HEARTBEAT, FRAME_METHOD, constants,
};
use crate::types::{ChannelId, FrameSize};

#[derive(Clone, Copy, Debug)]
enum Mode {
    ReadHeader,
    ReadPayload {
        frame_type: u8,
        channel_id: ChannelId,
        size: FrameSize,
    },
}

pub(crate) struct FrameParser {
    mode: Mode,
    max_frame_size: FrameSize,
    poisoned: Option<FrameError>,
}

impl FrameParser {
    pub(crate) fn new(max_frame_size: FrameSize) -> FrameParser {
        Self {
            mode: Mode::ReadHeader,
            max_frame_size: max_frame_size.max(constants::FRAME_OVERHEAD),
            poisoned: None,
        }
    }

    /// Updates the enforced limit after Connection.Tune renegotiates it.
    pub(crate) fn set_max_frame_size(&mut self, max_frame_size: FrameSize) {
        self.max_frame_size = max_frame_size.max(constants::FRAME_OVERHEAD);
    }

    /// Consumes as much of the buffered data as needed for the next frame.
    ///
    /// `Ok(None)` means more bytes are required; call again once the buffer
    /// has been refilled.
    pub(crate) fn parse(&mut self, buf: &mut Buffer) -> Result<Option<AMQPFrame>, FrameError> {
        if let Some(error) = &self.poisoned {
            return Err(error.clone());
        }
        match self.step(buf) {
            Err(error) => {
                self.poisoned = Some(error.clone());
                Err(error)
            }
            complete => complete,
        }
    }

    fn step(&mut self, buf: &mut Buffer) -> Result<Option<AMQPFrame>, FrameError> {
        loop {
            match self.mode {
                Mode::ReadHeader => {
                    if buf.available_data() < 7 {
                        return Ok(None);
                    }
                    let data = buf.data();
                    let frame_type = data[0];
                    if !matches!(
                        frame_type,
                        FRAME_METHOD | FRAME_HEADER | FRAME_BODY | FRAME_HEARTBEAT
                    ) {
                        return Err(FrameError::BadFrameType(frame_type));
                    }
                    let channel_id = u16::from_be_bytes([data[1], data[2]]);
                    let size = u32::from_be_bytes([data[3], data[4], data[5], data[6]]);
                    if size > self.max_frame_size - constants::FRAME_OVERHEAD {
                        return Err(FrameError::Oversized(size, self.max_frame_size));
                    }
                    buf.consume(7);
                    self.mode = Mode::ReadPayload {
                        frame_type,
                        channel_id,
                        size,
                    };
                }
                Mode::ReadPayload {
                    frame_type,
                    channel_id,
                    size,
                } => {
                    let size = size as usize;
                    if buf.available_data() < size + 1 {
                        return Ok(None);
                    }
                    let data = buf.data();
                    let end = data[size];
                    if end != FRAME_END {
                        return Err(FrameError::BadFrameEnd(end));
                    }
                    let parsed = frame::decode_payload(frame_type, channel_id, &data[..size])?;
                    buf.consume(size + 1);
                    self.mode = Mode::ReadHeader;
                    return Ok(Some(parsed));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AMQPClass, connection};

    fn frames_bytes(frames: &[AMQPFrame]) -> Vec<u8> {
        let mut buf = Buffer::with_capacity(4096);
        for frame in frames {
            frame::gen_frame(frame, &mut buf).unwrap();
        }
        buf.data().to_vec()
    }

    fn sample_frames() -> Vec<AMQPFrame> {
        vec![
            AMQPFrame::Heartbeat(0),
            AMQPFrame::Method(
                0,
                AMQPClass::Connection(connection::Methods::Tune(connection::Tune {
                    channel_max: 2047,
                    frame_max: 131_072,
                    heartbeat: 60,
                })),
            ),
            AMQPFrame::Body(7, b"some payload bytes".to_vec()),
            AMQPFrame::Method(
                0,
                AMQPClass::Connection(connection::Methods::OpenOk),
            ),
        ]
    }

    fn collect(parser: &mut FrameParser, buf: &mut Buffer) -> Vec<AMQPFrame> {
        let mut out = Vec::new();
        while let Some(frame) = parser.parse(buf).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn whole_stream_in_one_chunk() {
        let expected = sample_frames();
        let mut buf = Buffer::with_capacity(4096);
        buf.push(&frames_bytes(&expected));
        let mut parser = FrameParser::new(constants::DEFAULT_FRAME_MAX);
        assert_eq!(collect(&mut parser, &mut buf), expected);
        assert_eq!(buf.available_data(), 0);
    }

    #[test]
    fn any_chunking_yields_the_same_events() {
        let expected = sample_frames();
        let bytes = frames_bytes(&expected);
        for chunk_size in [1, 2, 3, 5, 7, 11, bytes.len()] {
            let mut parser = FrameParser::new(constants::DEFAULT_FRAME_MAX);
            let mut buf = Buffer::with_capacity(4096);
            let mut out = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                buf.push(chunk);
                out.extend(collect(&mut parser, &mut buf));
            }
            assert_eq!(out, expected, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn bad_frame_end_poisons_the_parser() {
        let mut bytes = frames_bytes(&[AMQPFrame::Heartbeat(0)]);
        *bytes.last_mut().unwrap() = 0x42;
        let mut parser = FrameParser::new(constants::DEFAULT_FRAME_MAX);
        let mut buf = Buffer::with_capacity(64);
        buf.push(&bytes);
        assert_eq!(
            parser.parse(&mut buf).unwrap_err(),
            FrameError::BadFrameEnd(0x42)
        );
        // still poisoned on the next call, even with sane input
        let mut sane = Buffer::with_capacity(64);
        sane.push(&frames_bytes(&[AMQPFrame::Heartbeat(0)]));
        assert!(parser.parse(&mut sane).is_err());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut parser = FrameParser::new(4096);
        let mut buf = Buffer::with_capacity(64);
        buf.push(&[FRAME_BODY, 0, 1, 0, 1, 0, 0]);
        assert_eq!(
            parser.parse(&mut buf).unwrap_err(),
            FrameError::Oversized(65536, 4096)
        );
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        let mut parser = FrameParser::new(4096);
        let mut buf = Buffer::with_capacity(64);
        buf.push(&[4, 0, 0, 0, 0, 0, 0, FRAME_END]);
        assert_eq!(
            parser.parse(&mut buf).unwrap_err(),
            FrameError::BadFrameType(4)
        );
    }

    #[test]
    fn raising_the_limit_after_tune_is_honored() {
        let mut parser = FrameParser::new(16);
        parser.set_max_frame_size(131_072);
        let body = AMQPFrame::Body(1, vec![0u8; 1024]);
        let mut buf = Buffer::with_capacity(2048);
        buf.push(&frames_bytes(&[body.clone()]));
        assert_eq!(parser.parse(&mut buf).unwrap(), Some(body));
    }
}
