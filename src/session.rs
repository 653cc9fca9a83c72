//! Sessions: the next level of connection management above raw
//! back-pressure.
//!
//! A [`Session`] wraps a byte pipe in a reusable, level-triggered `active`
//! handshake; a [`BidiSession`] pairs two of them into the full
//! bidirectional lifecycle:
//!
//! - At reset, both `active` flags are low.
//! - A new session starts with `inbound.active` raised.
//! - Data may flow once `outbound.active` has been raised in response;
//!   both pipes apply flow control as usual.
//! - Each side lowers its `active` only after its final byte has been
//!   consumed by the peer.
//! - The still-active side keeps consuming until the other `active` falls.
//! - Once both are low the session is reset and may be reused.

use crate::stream::BytePipe;

/// One direction of a session: an `active` level plus its data stream.
#[derive(Debug)]
pub struct Session {
    /// The session is, or wants to be, open in this direction. Falls only
    /// after all data for the session has been consumed.
    pub active: bool,
    pub data: BytePipe,
}

impl Session {
    pub fn new(capacity: usize) -> Self {
        Session {
            active: false,
            data: BytePipe::with_capacity(capacity),
        }
    }

    /// Inactive with nothing left buffered.
    pub fn is_quiet(&self) -> bool {
        !self.active && self.data.is_empty()
    }
}

/// A bidirectional session as seen by an endpoint's tenant: `inbound`
/// carries peer-to-tenant data, `outbound` tenant-to-peer.
#[derive(Debug)]
pub struct BidiSession {
    pub inbound: Session,
    pub outbound: Session,
}

impl BidiSession {
    pub fn new(capacity: usize) -> Self {
        BidiSession {
            inbound: Session::new(capacity),
            outbound: Session::new(capacity),
        }
    }

    /// Both directions idle and drained: a new session may begin.
    pub fn is_reset(&self) -> bool {
        self.inbound.is_quiet() && self.outbound.is_quiet()
    }
}
