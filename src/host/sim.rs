//! Runs an [`HttpAccelerator`] behind any async byte stream, playing the
//! role the real serial-attached hardware would.
//!
//! The device is purely reactive: it only produces output in response to
//! input, so the pump can settle it completely, flush whatever it said,
//! and then block on the next read.

use crate::device::HttpAccelerator;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Drive `device` over `transport` until the transport closes.
pub async fn attach<T>(mut device: HttpAccelerator, mut transport: T) -> std::io::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut inbuf = [0u8; 256];
    loop {
        let mut out = Vec::new();
        settle(&mut device, &mut out);
        if !out.is_empty() {
            transport.write_all(&out).await?;
            transport.flush().await?;
        }

        let n = transport.read(&mut inbuf).await?;
        if n == 0 {
            tracing::debug!("transport closed, stopping simulated device");
            return Ok(());
        }

        for &byte in &inbuf[..n] {
            while !device.serial_in().offer(byte) {
                // Ingress is full: let the device chew and flush so it
                // frees up. The device always drains given egress room.
                let mut spill = Vec::new();
                settle(&mut device, &mut spill);
                if !spill.is_empty() {
                    transport.write_all(&spill).await?;
                    transport.flush().await?;
                }
            }
        }
    }
}

/// Tick the device until quiescent, collecting all egress bytes.
fn settle(device: &mut HttpAccelerator, out: &mut Vec<u8>) {
    loop {
        device.run_until_idle();
        let before = out.len();
        while let Some(byte) = device.serial_out().poll() {
            out.push(byte);
        }
        if out.len() == before {
            return;
        }
    }
}
