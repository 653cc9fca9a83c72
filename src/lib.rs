//! A software rendition of a serial-attached HTTP/1.0 accelerator.
//!
//! Three layers, bottom to top:
//!
//! - [`stream`]: a bounded byte-pipe substrate with single-producer,
//!   single-consumer back-pressure, plus the reusable transformers
//!   (limit-forwarder, mux/demux, fanout) and the per-byte [`matcher`]s
//!   and [`print`]ers built over it.
//! - [`bus`]: the nTCP framing layer. Each frame is a three-byte header
//!   (`stream_id`, `body_length`, `flags`) plus body; a [`bus::StreamStop`]
//!   owns one stream id and exposes its traffic as a bidirectional
//!   [`session::BidiSession`] to a tenant.
//! - [`http`]: an HTTP/1.0 classifier and dispatcher mounted on one stop,
//!   answering a small fixed route set with canned responses and a live
//!   counter report.
//!
//! [`device::HttpAccelerator`] composes the three into the thing that sits
//! on the wire; [`host`] is the tokio-side proxy that fronts it with a TCP
//! listener, plus a simulator pump for running without hardware.
//!
//! The device core runs with bounded memory and no per-byte allocation,
//! and it never returns errors: every malformed input is handled as a
//! state-machine transition that ends in a well-formed HTTP response.
//!
//! # Example
//!
//! ```
//! use ntcp::codec::Frame;
//! use ntcp::device::{HttpAccelerator, HTTP_STREAM_ID};
//!
//! let mut device = HttpAccelerator::new();
//!
//! // One session: START, the request, END.
//! let mut wire = Vec::new();
//! wire.extend_from_slice(&Frame::start(HTTP_STREAM_ID).to_bytes());
//! let request = b"POST /led HTTP/1.0\r\nHost: t\r\n\r\nFF8800\r\n";
//! wire.extend_from_slice(&Frame::data(HTTP_STREAM_ID, request).unwrap().to_bytes());
//! wire.extend_from_slice(&Frame::end(HTTP_STREAM_ID).to_bytes());
//!
//! let mut response = Vec::new();
//! for &byte in &wire {
//!     while !device.serial_in().offer(byte) {
//!         device.run_until_idle();
//!         while let Some(b) = device.serial_out().poll() {
//!             response.push(b);
//!         }
//!     }
//! }
//! loop {
//!     device.run_until_idle();
//!     let before = response.len();
//!     while let Some(b) = device.serial_out().poll() {
//!         response.push(b);
//!     }
//!     if response.len() == before {
//!         break;
//!     }
//! }
//!
//! assert_eq!(device.led(), (0xFF, 0x88, 0x00));
//! ```

pub mod bus;
pub mod codec;
pub mod device;
pub mod host;
pub mod http;
pub mod matcher;
pub mod print;
pub mod session;
pub mod stream;

#[cfg(test)]
mod tests;

pub use bus::{Bus, ConnState, StreamStop};
pub use codec::{Flags, Frame, FrameError, Header};
pub use device::{HTTP_STREAM_ID, HttpAccelerator};
pub use host::{FrameReader, FrameWriter, ProxyError};
pub use http::{HttpServer, Method, Protocol, StatusCode};
pub use session::{BidiSession, Session};
pub use stream::{BytePipe, ByteSink, ByteSource};
