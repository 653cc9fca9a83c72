// ABOUTME: Host-side TCP proxy speaking nTCP frames over a serial transport
// ABOUTME: Maps one TCP connection at a time onto one device session on stream 1

//! The host half of the link.
//!
//! The device end of the wire is a synchronous state machine; this end is a
//! small tokio proxy. A TCP listener accepts one client at a time (the far
//! side is a single serial device carrying one session per stream id),
//! opens an nTCP session, shuttles bytes both ways, and closes the session
//! when either side finishes:
//!
//! - on accept: an empty START frame on stream 1;
//! - client bytes: plain data frames, bodies chunked to the wire limit;
//! - client EOF: an empty END frame;
//! - device frames: body bytes copied to the client until the device's END.

pub mod sim;

use crate::codec::{Frame, FrameError, MAX_BODY_LEN};
use bytes::{Buf, BytesMut};
use std::io::{self, Cursor};
use thiserror::Error;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, timeout};

/// Stream id the proxy opens sessions on.
pub const PROXY_STREAM_ID: u8 = 1;

/// How long the device may go silent mid-session before the proxy gives
/// up on it.
const DEVICE_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from proxy operation.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("device went quiet mid-session")]
    DeviceTimeout,

    #[error("serial transport closed")]
    DeviceClosed,
}

/// Reads frames out of a byte stream, buffering partial arrivals.
pub struct FrameReader<R> {
    inner: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        FrameReader {
            inner,
            // Plenty for several maximum-size frames.
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Read one frame. `Ok(None)` means the transport closed cleanly on a
    /// frame boundary; closing mid-frame is an error.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ProxyError> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }
            if 0 == self.inner.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ProxyError::DeviceClosed)
                };
            }
        }
    }

    /// Try to lift a complete frame out of the buffer. The cheap length
    /// check runs first so partial data costs nothing.
    fn parse_frame(&mut self) -> Result<Option<Frame>, ProxyError> {
        let mut cursor = Cursor::new(&self.buffer[..]);
        match Frame::check(&cursor) {
            Ok(len) => {
                let frame = Frame::parse(&mut cursor)?;
                self.buffer.advance(len);
                Ok(Some(frame))
            }
            Err(FrameError::Incomplete) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Writes frames into a byte stream through a write buffer.
pub struct FrameWriter<W> {
    inner: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        FrameWriter {
            inner: BufWriter::new(inner),
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        self.inner.write_all(&frame.to_bytes()).await?;
        self.inner.flush().await
    }
}

/// Split a serial transport into its frame reader and writer halves so
/// both directions can run concurrently.
pub fn framed<T>(transport: T) -> (FrameReader<ReadHalf<T>>, FrameWriter<WriteHalf<T>>)
where
    T: AsyncRead + AsyncWrite,
{
    let (reader, writer) = tokio::io::split(transport);
    (FrameReader::new(reader), FrameWriter::new(writer))
}

/// Accept TCP clients forever, one session at a time, against the given
/// serial transport. Returns only on listener or transport failure.
pub async fn serve<T>(listener: TcpListener, transport: T) -> Result<(), ProxyError>
where
    T: AsyncRead + AsyncWrite,
{
    let (mut reader, mut writer) = framed(transport);
    loop {
        let (client, peer) = listener.accept().await?;
        tracing::info!(%peer, "client connected");
        match handle_client(client, &mut reader, &mut writer).await {
            Ok(()) => tracing::info!(%peer, "session complete"),
            Err(err @ (ProxyError::DeviceClosed | ProxyError::DeviceTimeout)) => {
                tracing::error!(%peer, error = %err, "device side failed");
                return Err(err);
            }
            Err(err) => tracing::warn!(%peer, error = %err, "session failed"),
        }
    }
}

/// Run one TCP connection as one nTCP session.
pub async fn handle_client<R, W>(
    client: TcpStream,
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
) -> Result<(), ProxyError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_frame(&Frame::start(PROXY_STREAM_ID)).await?;

    let (mut client_rd, mut client_wr) = client.into_split();
    let mut client_open = true;
    let mut client_writable = true;
    let mut buf = [0u8; MAX_BODY_LEN];

    loop {
        tokio::select! {
            read = client_rd.read(&mut buf), if client_open => {
                match read {
                    Ok(0) => {
                        writer.write_frame(&Frame::end(PROXY_STREAM_ID)).await?;
                        client_open = false;
                    }
                    Ok(n) => {
                        let frame = Frame::data(PROXY_STREAM_ID, &buf[..n])?;
                        writer.write_frame(&frame).await?;
                    }
                    Err(err) => {
                        // A torn client still gets its session closed out
                        // so the device can reset.
                        tracing::warn!(error = %err, "client read failed");
                        writer.write_frame(&Frame::end(PROXY_STREAM_ID)).await?;
                        client_open = false;
                        client_writable = false;
                    }
                }
            }
            frame = timeout(DEVICE_IDLE_TIMEOUT, reader.read_frame()) => {
                let frame = frame.map_err(|_| ProxyError::DeviceTimeout)??;
                let Some(frame) = frame else {
                    return Err(ProxyError::DeviceClosed);
                };
                if frame.stream_id() != PROXY_STREAM_ID || !frame.flags().to_host {
                    tracing::warn!(
                        stream_id = frame.stream_id(),
                        flags = frame.flags().to_byte(),
                        "discarding unexpected frame from device"
                    );
                    continue;
                }
                if client_writable && !frame.body.is_empty() {
                    if let Err(err) = client_wr.write_all(&frame.body).await {
                        tracing::warn!(error = %err, "client write failed");
                        client_writable = false;
                    }
                }
                if frame.flags().end {
                    break;
                }
            }
        }
    }

    // The device has finished talking; make sure our half of the session
    // is closed too so the stop can reset.
    if client_open {
        writer.write_frame(&Frame::end(PROXY_STREAM_ID)).await?;
    }
    let _ = client_wr.shutdown().await;
    Ok(())
}
