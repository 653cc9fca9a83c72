//! The nTCP wire format: a three-byte header followed by up to 255 body
//! bytes, carried back-to-back over a reliable byte pipe with no other
//! framing.
//!
//! ```text
//! byte 0: stream_id (u8)
//! byte 1: body_length (u8)
//! byte 2: flags       bit0=START, bit1=END, bit2=TO_HOST, bits 3-7 zero
//! ```
//!
//! The device side reads headers a byte at a time inside its bus state
//! machines; this module is the shared definition of the layout plus the
//! buffered [`Frame`] form the host side parses and emits.

use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;
use thiserror::Error;

/// Bytes in a frame header.
pub const HEADER_LEN: usize = 3;

/// Largest body a single frame can carry.
pub const MAX_BODY_LEN: usize = 255;

/// Session-state indicators carried in the header's flags byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    /// Start-of-stream marker.
    pub start: bool,
    /// End-of-stream marker.
    pub end: bool,
    /// Direction: false for host-to-device, true for device-to-host.
    pub to_host: bool,
}

impl Flags {
    pub const START: u8 = 1 << 0;
    pub const END: u8 = 1 << 1;
    pub const TO_HOST: u8 = 1 << 2;

    pub fn from_byte(byte: u8) -> Self {
        Flags {
            start: byte & Self::START != 0,
            end: byte & Self::END != 0,
            to_host: byte & Self::TO_HOST != 0,
        }
    }

    /// Reserved bits are always written as zero.
    pub fn to_byte(self) -> u8 {
        let mut byte = 0;
        if self.start {
            byte |= Self::START;
        }
        if self.end {
            byte |= Self::END;
        }
        if self.to_host {
            byte |= Self::TO_HOST;
        }
        byte
    }
}

/// A decoded frame header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub stream_id: u8,
    pub body_len: u8,
    pub flags: Flags,
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        [self.stream_id, self.body_len, self.flags.to_byte()]
    }

    pub fn decode(bytes: [u8; HEADER_LEN]) -> Self {
        Header {
            stream_id: bytes[0],
            body_len: bytes[1],
            flags: Flags::from_byte(bytes[2]),
        }
    }
}

/// Errors from parsing or building frames on the host side.
///
/// `Incomplete` is the expected steady-state outcome while a frame is still
/// arriving; everything else indicates a caller bug or a torn stream.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("stream ended before a full frame")]
    Incomplete,

    #[error("frame body of {0} bytes exceeds the {MAX_BODY_LEN}-byte limit")]
    BodyTooLong(usize),
}

/// An owned frame: header plus body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub body: Bytes,
}

impl Frame {
    /// Build a frame, checking the body against the wire limit.
    pub fn new(stream_id: u8, flags: Flags, body: Bytes) -> Result<Self, FrameError> {
        if body.len() > MAX_BODY_LEN {
            return Err(FrameError::BodyTooLong(body.len()));
        }
        Ok(Frame {
            header: Header {
                stream_id,
                body_len: body.len() as u8,
                flags,
            },
            body,
        })
    }

    /// The empty frame that opens a host-to-device session.
    pub fn start(stream_id: u8) -> Self {
        Frame {
            header: Header {
                stream_id,
                body_len: 0,
                flags: Flags {
                    start: true,
                    ..Flags::default()
                },
            },
            body: Bytes::new(),
        }
    }

    /// The empty frame that closes the host-to-device direction.
    pub fn end(stream_id: u8) -> Self {
        Frame {
            header: Header {
                stream_id,
                body_len: 0,
                flags: Flags {
                    end: true,
                    ..Flags::default()
                },
            },
            body: Bytes::new(),
        }
    }

    /// A plain host-to-device data frame. `body` must fit the wire limit.
    pub fn data(stream_id: u8, body: &[u8]) -> Result<Self, FrameError> {
        Frame::new(stream_id, Flags::default(), Bytes::copy_from_slice(body))
    }

    /// Checks whether an entire frame is available at the cursor. On
    /// success returns the total frame length (header plus body) without
    /// consuming anything.
    pub fn check(src: &Cursor<&[u8]>) -> Result<usize, FrameError> {
        let buf = *src.get_ref();
        let at = src.position() as usize;
        let available = buf.len().saturating_sub(at);
        if available < HEADER_LEN {
            return Err(FrameError::Incomplete);
        }
        let body_len = buf[at + 1] as usize;
        let total = HEADER_LEN + body_len;
        if available < total {
            return Err(FrameError::Incomplete);
        }
        Ok(total)
    }

    /// Parses one frame, advancing the cursor past it. The caller has
    /// usually validated availability with [`check`](Frame::check) first.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, FrameError> {
        let total = Frame::check(src)?;
        let buf = *src.get_ref();
        let at = src.position() as usize;
        let header = Header::decode([buf[at], buf[at + 1], buf[at + 2]]);
        let body = Bytes::copy_from_slice(&buf[at + HEADER_LEN..at + total]);
        src.set_position((at + total) as u64);
        Ok(Frame { header, body })
    }

    /// Wire encoding of the whole frame.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.body.len());
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.body);
        buf.freeze()
    }

    pub fn stream_id(&self) -> u8 {
        self.header.stream_id
    }

    pub fn flags(&self) -> Flags {
        self.header.flags
    }
}
