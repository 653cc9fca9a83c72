//! The complete accelerator: serial in, HTTP out.
//!
//! Splices one bus stop between the serial ingress and egress pipes — the
//! degenerate single-stop topology — and mounts the HTTP dispatcher as its
//! tenant. Everything is driven by [`tick`](HttpAccelerator::tick); the
//! caller owns the pacing, whether that is a simulator pump, a test, or a
//! benchmark loop.

use crate::bus::{ConnState, StreamStop};
use crate::http::HttpServer;
use crate::session::BidiSession;
use crate::stream::BytePipe;

/// Serial-side pipe capacity.
const SERIAL_CAPACITY: usize = 256;

/// Session FIFO capacity: at least one maximum frame body.
const SESSION_CAPACITY: usize = 256;

/// Stream id the HTTP stop answers on.
pub const HTTP_STREAM_ID: u8 = 1;

/// A serial-attached HTTP/1.0 accelerator.
pub struct HttpAccelerator {
    rx: BytePipe,
    tx: BytePipe,
    forward: BytePipe,
    stop: StreamStop,
    session: BidiSession,
    http: HttpServer,
}

impl HttpAccelerator {
    pub fn new() -> Self {
        HttpAccelerator {
            rx: BytePipe::with_capacity(SERIAL_CAPACITY),
            tx: BytePipe::with_capacity(SERIAL_CAPACITY),
            forward: BytePipe::with_capacity(SERIAL_CAPACITY),
            stop: StreamStop::new(HTTP_STREAM_ID),
            session: BidiSession::new(SESSION_CAPACITY),
            http: HttpServer::new(),
        }
    }

    /// Bytes arriving from the host enter here.
    pub fn serial_in(&mut self) -> &mut BytePipe {
        &mut self.rx
    }

    /// Bytes leaving for the host are read from here.
    pub fn serial_out(&mut self) -> &mut BytePipe {
        &mut self.tx
    }

    /// Current LED channel registers.
    pub fn led(&self) -> (u8, u8, u8) {
        self.http.led()
    }

    /// `(requests, ok, errors)` counter snapshot.
    pub fn counts(&self) -> (u32, u32, u32) {
        self.http.counts()
    }

    /// Session phase of the bus stop, for harnesses.
    pub fn connection_state(&self) -> ConnState {
        self.stop.state()
    }

    /// Advance every component once. Returns whether anything moved.
    pub fn tick(&mut self) -> bool {
        let mut progress = self.stop.step(
            &mut self.rx,
            &mut self.forward,
            &mut self.tx,
            &mut self.session,
        );
        // Single stop on the bus: the forward tail is grounded.
        if self.forward.clear() > 0 {
            tracing::debug!("discarded frame bytes for unowned stream");
            progress = true;
        }
        progress |= self.http.step(&mut self.session);
        progress
    }

    /// Tick until quiescent: no component can move another byte without
    /// more serial input or egress drain.
    pub fn run_until_idle(&mut self) -> bool {
        let mut any = false;
        while self.tick() {
            any = true;
        }
        any
    }
}

impl Default for HttpAccelerator {
    fn default() -> Self {
        HttpAccelerator::new()
    }
}
