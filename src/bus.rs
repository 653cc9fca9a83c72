//! nTCP stops and the local bus.
//!
//! A *stop* is an endpoint on the bus owning one stream id. It watches the
//! shared ingress byte stream for frames addressed to it, presents their
//! bodies to its tenant as a [`BidiSession`], and frames the tenant's
//! response back onto the egress. Frames for other ids are re-emitted
//! bit-for-bit on a forward link so stops can be chained; the final link is
//! grounded, which is where traffic for unknown ids goes to die.
//!
//! ## Session lifecycle at a stop
//!
//! ```text
//! Closed → Requested → Open → ClientDone ─┐
//!                          └→ ServerDone ─┴→ Flush → Closed
//! ```
//!
//! - `Closed`: nothing in flight; only a START frame is honored.
//! - `Requested`: START seen, tenant not yet accepted; the START body
//!   stays on the wire, back-pressuring the bus.
//! - `Open`: both directions active, data flows.
//! - `ClientDone` / `ServerDone`: one direction has ended, the other is
//!   draining.
//! - `Flush`: both directions ended; waits for every buffer to empty.
//!
//! Exactly one START and one END per direction per session; a second START
//! while the session is anything but `Closed` is a framing error and the
//! frame is discarded whole.

use crate::codec::{Flags, HEADER_LEN, MAX_BODY_LEN};
use crate::session::{BidiSession, Session};
use crate::stream::{BytePipe, LimitForwarder, NullSink};

/// Capacity of the forward links between chained stops.
const LINK_CAPACITY: usize = 64;

/// Where a stop's session currently stands. See the module docs for the
/// transition diagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    Closed,
    Requested,
    Open,
    ClientDone,
    ServerDone,
    Flush,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadState {
    /// Awaiting the stream-id byte of the next header.
    Stream,
    /// Awaiting the body-length byte.
    Len,
    /// Awaiting the flags byte; routing is decided here.
    Flags,
    /// START consumed; holding its body until the tenant accepts.
    AwaitAccept,
    /// Forwarding a local body into the session FIFO.
    Body,
    /// Swallowing the body of a frame this stop must ignore.
    Discard,
    /// Re-emitting a foreign header onto the forward link.
    ForwardHeader,
    /// Re-emitting a foreign body onto the forward link.
    ForwardBody,
}

/// Inbound half of a stop: header parsing, accept handshake, body routing.
struct InboundStop {
    stream_id: u8,
    state: ReadState,
    hdr_stream: u8,
    hdr_len: u8,
    hdr_flags: Flags,
    fwd_header: [u8; HEADER_LEN],
    fwd_emitted: usize,
    limiter: LimitForwarder,
    discard: NullSink,
    connected: bool,
    /// END observed; inbound `active` falls once the FIFO drains.
    end_pending: bool,
    /// END observed this session; sticky until the stop re-closes.
    end_seen: bool,
}

impl InboundStop {
    fn new(stream_id: u8) -> Self {
        InboundStop {
            stream_id,
            state: ReadState::Stream,
            hdr_stream: 0,
            hdr_len: 0,
            hdr_flags: Flags::default(),
            fwd_header: [0; HEADER_LEN],
            fwd_emitted: 0,
            limiter: LimitForwarder::new(),
            discard: NullSink::new(),
            connected: false,
            end_pending: false,
            end_seen: false,
        }
    }

    fn end_seen(&self) -> bool {
        self.end_seen
    }

    fn clear_session(&mut self) {
        self.end_seen = false;
    }

    /// Decide what to do with a fully-read header. Returns the next state,
    /// or `None` to stall without consuming the flags byte.
    fn route_header(
        &mut self,
        flags: Flags,
        session: &mut Session,
        allow_start: bool,
    ) -> Option<ReadState> {
        if self.hdr_stream != self.stream_id {
            self.fwd_header = [self.hdr_stream, self.hdr_len, flags.to_byte()];
            self.fwd_emitted = 0;
            return Some(ReadState::ForwardHeader);
        }

        if flags.start {
            if allow_start {
                session.active = true;
                return Some(ReadState::AwaitAccept);
            }
            if self.connected || session.active {
                tracing::warn!(
                    stream_id = self.stream_id,
                    "duplicate START for open stream, discarding frame"
                );
                self.limiter.start(u16::from(self.hdr_len));
                return Some(ReadState::Discard);
            }
            // The previous session is still flushing; leave the frame on
            // the wire until the stop re-closes.
            return None;
        }

        if self.connected {
            self.limiter.start(u16::from(self.hdr_len));
            Some(ReadState::Body)
        } else {
            tracing::warn!(
                stream_id = self.stream_id,
                "data frame for closed stream, discarding"
            );
            self.limiter.start(u16::from(self.hdr_len));
            Some(ReadState::Discard)
        }
    }

    fn step(
        &mut self,
        bus: &mut BytePipe,
        forward: &mut BytePipe,
        session: &mut Session,
        accepted: bool,
        allow_start: bool,
    ) -> bool {
        let mut progress = false;
        let mut moved = true;
        while moved {
            moved = false;
            match self.state {
                ReadState::Stream => {
                    if let Some(byte) = bus.poll() {
                        self.hdr_stream = byte;
                        self.state = ReadState::Len;
                        moved = true;
                    }
                }
                ReadState::Len => {
                    if let Some(byte) = bus.poll() {
                        self.hdr_len = byte;
                        self.state = ReadState::Flags;
                        moved = true;
                    }
                }
                ReadState::Flags => {
                    if let Some(byte) = BytePipe::peek(bus) {
                        let flags = Flags::from_byte(byte);
                        if let Some(next) = self.route_header(flags, session, allow_start) {
                            bus.poll();
                            self.hdr_flags = flags;
                            self.state = next;
                            moved = true;
                        }
                    }
                }
                ReadState::AwaitAccept => {
                    if accepted {
                        self.connected = true;
                        self.limiter.start(u16::from(self.hdr_len));
                        self.state = ReadState::Body;
                        moved = true;
                        tracing::debug!(stream_id = self.stream_id, "session accepted");
                    }
                }
                ReadState::Body => {
                    progress |= self.limiter.step(bus, &mut session.data) > 0;
                    if self.limiter.is_done() {
                        if self.hdr_flags.end {
                            self.end_pending = true;
                            self.end_seen = true;
                        }
                        self.state = ReadState::Stream;
                        moved = true;
                    }
                }
                ReadState::Discard => {
                    progress |= self.limiter.step(bus, &mut self.discard) > 0;
                    if self.limiter.is_done() {
                        self.state = ReadState::Stream;
                        moved = true;
                    }
                }
                ReadState::ForwardHeader => {
                    while self.fwd_emitted < HEADER_LEN
                        && forward.offer(self.fwd_header[self.fwd_emitted])
                    {
                        self.fwd_emitted += 1;
                        moved = true;
                    }
                    if self.fwd_emitted == HEADER_LEN {
                        self.limiter.start(u16::from(self.hdr_len));
                        self.state = ReadState::ForwardBody;
                        moved = true;
                    }
                }
                ReadState::ForwardBody => {
                    progress |= self.limiter.step(bus, forward) > 0;
                    if self.limiter.is_done() {
                        self.state = ReadState::Stream;
                        moved = true;
                    }
                }
            }
            progress |= moved;
        }

        // END has been seen and the tenant has drained every buffered byte:
        // only now may the inbound direction fall.
        if self.end_pending && session.data.is_empty() {
            session.active = false;
            self.connected = false;
            self.end_pending = false;
            progress = true;
            tracing::debug!(stream_id = self.stream_id, "inbound direction closed");
        }

        progress
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriteState {
    /// No session; waiting for the tenant to raise `active`.
    Disconnected,
    /// In session; deciding whether a frame is owed.
    Ready,
    /// Emitting the three header bytes.
    Header,
    /// Emitting the body through the limiter.
    Body,
}

/// Outbound half of a stop: packetizes the tenant's byte stream.
struct OutboundStop {
    stream_id: u8,
    state: WriteState,
    pending_start: bool,
    frame_flags: Flags,
    frame_len: u8,
    header: [u8; HEADER_LEN],
    emitted: usize,
    limiter: LimitForwarder,
    connected: bool,
    end_sent: bool,
}

impl OutboundStop {
    fn new(stream_id: u8) -> Self {
        OutboundStop {
            stream_id,
            state: WriteState::Disconnected,
            pending_start: false,
            frame_flags: Flags::default(),
            frame_len: 0,
            header: [0; HEADER_LEN],
            emitted: 0,
            limiter: LimitForwarder::new(),
            connected: false,
            end_sent: false,
        }
    }

    fn end_sent(&self) -> bool {
        self.end_sent
    }

    fn clear_session(&mut self) {
        self.end_sent = false;
    }

    /// Whether this half has (or is mid-way through) a frame for the
    /// egress. Used by the bus for talker arbitration.
    fn wants_bus(&self, session: &Session) -> bool {
        match self.state {
            WriteState::Disconnected => session.active && !self.end_sent,
            WriteState::Ready => {
                self.pending_start || !session.active || session.data.level() > 0
            }
            WriteState::Header | WriteState::Body => true,
        }
    }

    /// A frame is partially on the wire and the egress must not be handed
    /// to another stop.
    fn mid_frame(&self) -> bool {
        matches!(self.state, WriteState::Header | WriteState::Body)
    }

    fn step(&mut self, session: &mut Session, bus: &mut BytePipe) -> bool {
        let mut progress = false;
        let mut moved = true;
        while moved {
            moved = false;
            match self.state {
                WriteState::Disconnected => {
                    if session.active && !self.end_sent {
                        self.pending_start = true;
                        self.connected = true;
                        self.state = WriteState::Ready;
                        moved = true;
                        tracing::debug!(stream_id = self.stream_id, "outbound session opened");
                    }
                }
                WriteState::Ready => {
                    let level = session.data.level();
                    if self.pending_start || !session.active || level > 0 {
                        // The level at this instant becomes the frame body;
                        // the closing frame is the empty one emitted after
                        // the tenant went inactive with nothing buffered.
                        self.frame_len = level.min(MAX_BODY_LEN) as u8;
                        self.frame_flags = Flags {
                            start: self.pending_start,
                            end: !session.active && level == 0,
                            to_host: true,
                        };
                        self.header = [self.stream_id, self.frame_len, self.frame_flags.to_byte()];
                        self.emitted = 0;
                        self.state = WriteState::Header;
                        moved = true;
                    }
                }
                WriteState::Header => {
                    while self.emitted < HEADER_LEN && bus.offer(self.header[self.emitted]) {
                        self.emitted += 1;
                        moved = true;
                    }
                    if self.emitted == HEADER_LEN {
                        self.limiter.start(u16::from(self.frame_len));
                        self.state = WriteState::Body;
                        moved = true;
                    }
                }
                WriteState::Body => {
                    progress |= self.limiter.step(&mut session.data, bus) > 0;
                    if self.limiter.is_done() {
                        self.pending_start = false;
                        if self.frame_flags.end {
                            self.end_sent = true;
                            self.connected = false;
                            self.state = WriteState::Disconnected;
                            tracing::debug!(stream_id = self.stream_id, "outbound END sent");
                        } else {
                            self.state = WriteState::Ready;
                        }
                        moved = true;
                    }
                }
            }
            progress |= moved;
        }
        progress
    }
}

/// A stop on the bus: one stream id, one tenant session.
pub struct StreamStop {
    stream_id: u8,
    inbound: InboundStop,
    outbound: OutboundStop,
    state: ConnState,
}

impl StreamStop {
    pub fn new(stream_id: u8) -> Self {
        StreamStop {
            stream_id,
            inbound: InboundStop::new(stream_id),
            outbound: OutboundStop::new(stream_id),
            state: ConnState::Closed,
        }
    }

    pub fn stream_id(&self) -> u8 {
        self.stream_id
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Debug indicator: the session is live in at least one direction.
    pub fn is_connected(&self) -> bool {
        self.inbound.connected || self.outbound.connected
    }

    /// Full step for the degenerate single-stop topology: ingress spliced
    /// straight to the stop, forward link grounded by the caller.
    pub fn step(
        &mut self,
        rx: &mut BytePipe,
        forward: &mut BytePipe,
        tx: &mut BytePipe,
        session: &mut BidiSession,
    ) -> bool {
        let mut progress = self.step_inbound(rx, forward, session);
        progress |= self.step_outbound(&mut session.outbound, tx);
        progress |= self.update_state(session);
        progress
    }

    fn step_inbound(
        &mut self,
        bus: &mut BytePipe,
        forward: &mut BytePipe,
        session: &mut BidiSession,
    ) -> bool {
        let accepted = session.outbound.active;
        let allow_start = self.state == ConnState::Closed;
        let progress =
            self.inbound
                .step(bus, forward, &mut session.inbound, accepted, allow_start);
        progress | self.update_state(session)
    }

    fn step_outbound(&mut self, outbound: &mut Session, tx: &mut BytePipe) -> bool {
        self.outbound.step(outbound, tx)
    }

    fn outbound_wants(&self, outbound: &Session) -> bool {
        self.outbound.wants_bus(outbound)
    }

    fn outbound_mid_frame(&self) -> bool {
        self.outbound.mid_frame()
    }

    fn update_state(&mut self, session: &BidiSession) -> bool {
        let next = match self.state {
            ConnState::Closed if session.inbound.active => ConnState::Requested,
            ConnState::Requested if session.outbound.active => ConnState::Open,
            ConnState::Open => match (self.inbound.end_seen(), self.outbound.end_sent()) {
                (true, true) => ConnState::Flush,
                (true, false) => ConnState::ClientDone,
                (false, true) => ConnState::ServerDone,
                (false, false) => ConnState::Open,
            },
            ConnState::ClientDone if self.outbound.end_sent() => ConnState::Flush,
            ConnState::ServerDone if self.inbound.end_seen() => ConnState::Flush,
            ConnState::Flush if session.is_reset() => {
                self.inbound.clear_session();
                self.outbound.clear_session();
                ConnState::Closed
            }
            state => state,
        };
        if next != self.state {
            tracing::debug!(
                stream_id = self.stream_id,
                from = ?self.state,
                to = ?next,
                "connection state"
            );
            self.state = next;
            true
        } else {
            false
        }
    }
}

/// A chain of stops between the serial ingress and egress.
///
/// Ingress frames enter the first stop; each stop consumes frames for its
/// own id and forwards the rest, and the final forward link is grounded.
/// The egress is granted to one talker at a time, for a whole frame.
pub struct Bus {
    stops: Vec<StreamStop>,
    links: Vec<BytePipe>,
    talker: Option<usize>,
}

impl Bus {
    pub fn new(stream_ids: &[u8]) -> Self {
        assert!(!stream_ids.is_empty(), "a bus needs at least one stop");
        Bus {
            stops: stream_ids.iter().map(|&id| StreamStop::new(id)).collect(),
            links: stream_ids
                .iter()
                .map(|_| BytePipe::with_capacity(LINK_CAPACITY))
                .collect(),
            talker: None,
        }
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn stop(&self, index: usize) -> &StreamStop {
        &self.stops[index]
    }

    /// Advance every stop once. `sessions[i]` is the tenant session of
    /// stop `i`; each session FIFO must hold at least one maximum frame
    /// body.
    pub fn step(
        &mut self,
        rx: &mut BytePipe,
        tx: &mut BytePipe,
        sessions: &mut [BidiSession],
    ) -> bool {
        assert_eq!(sessions.len(), self.stops.len());
        let mut progress = false;

        for i in 0..self.stops.len() {
            let (upstream_links, rest) = self.links.split_at_mut(i);
            let forward = &mut rest[0];
            let upstream: &mut BytePipe = match upstream_links.last_mut() {
                Some(link) => link,
                None => rx,
            };
            progress |= self.stops[i].step_inbound(upstream, forward, &mut sessions[i]);
        }

        // Ground the tail: traffic for ids nobody owns ends here.
        if let Some(ground) = self.links.last_mut() {
            let dropped = ground.clear();
            if dropped > 0 {
                tracing::debug!(dropped, "grounded unowned bus traffic");
                progress = true;
            }
        }

        // Egress arbitration: pick a talker, keep it until its frame is
        // fully on the wire.
        if self.talker.is_none() {
            self.talker = (0..self.stops.len())
                .find(|&i| self.stops[i].outbound_wants(&sessions[i].outbound));
        }
        if let Some(i) = self.talker {
            progress |= self.stops[i].step_outbound(&mut sessions[i].outbound, tx);
            progress |= self.stops[i].update_state(&sessions[i]);
            if !self.stops[i].outbound_mid_frame() {
                self.talker = None;
            }
        }

        progress
    }
}
