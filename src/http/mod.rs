//! The HTTP/1.0 engine: a session tenant that classifies one request per
//! session and answers with a canned response.
//!
//! Inbound bytes are routed through a four-way demux — start line, header
//! scan, body handler, sink — as the request progresses; the response side
//! is a mux over the canned printers plus the `/count` report. All failure
//! modes land on a response, never on an error: a request that cannot be
//! understood is a 404/405/418 with the session drained and closed cleanly.

pub mod count;
pub mod led;
pub mod start_line;

pub use count::CountPrinter;
pub use led::LedBodyParser;
pub use start_line::{Method, Protocol, StartLineParser};

use crate::matcher::{ContainsMatcher, Matcher};
use crate::print::{Print, TextPrinter};
use crate::session::BidiSession;
use crate::stream::{fanout, ByteSink, ByteSource, NullSink, StreamDemux, StreamMux};
use num_enum::IntoPrimitive;

/// Paths the classifier knows, in 1-based index order.
const PATHS: [&str; 3] = ["/led", "/count", "/coffee"];
const PATH_LED: usize = 1;
const PATH_COUNT: usize = 2;
const PATH_COFFEE: usize = 3;

// Inbound demux positions.
const PARSER_START: usize = 0;
const PARSER_HEADERS: usize = 1;
const PARSER_BODY: usize = 2;
const PARSER_SINK: usize = 3;

// Response mux positions.
const SEL_OK: usize = 0;
const SEL_NOT_FOUND: usize = 1;
const SEL_METHOD_NOT_ALLOWED: usize = 2;
const SEL_TEAPOT: usize = 3;
const SEL_COUNT: usize = 4;

const RESPONSE_OK: &str = "HTTP/1.0 200 OK\r\n\
    Host: Fomu\r\n\
    Content-Type: text/plain; charset=utf-8\r\n\
    \r\n\
    \r\n\
    \u{1F44D}\r\n";

const RESPONSE_NOT_FOUND: &str = "HTTP/1.0 404 Not Found\r\n\
    Host: Fomu\r\n\
    Content-Type: text/plain; charset=utf-8\r\n\
    \r\n\
    \r\n\
    \u{1F44E}\r\n";

const RESPONSE_METHOD_NOT_ALLOWED: &str = "HTTP/1.0 405 Method Not Allowed\r\n\
    Host: Fomu\r\n\
    Content-Type: text/plain; charset=utf-8\r\n\
    \r\n\
    \r\n\
    \u{1F6D1}\r\n";

const RESPONSE_TEAPOT: &str = "HTTP/1.0 418 I'm a teapot\r\n\
    Host: Fomu\r\n\
    Content-Type: text/plain; charset=utf-8\r\n\
    \r\n\
    \r\n\
    short and stout\r\n";

/// Status of the response a request was routed to.
#[derive(IntoPrimitive, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 200,
    NotFound = 404,
    MethodNotAllowed = 405,
    Teapot = 418,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HttpState {
    /// Waiting for a session to open.
    Idle,
    /// Consuming the request line.
    ParsingStart,
    /// Scanning for the end-of-headers marker.
    ParsingHeaders,
    /// Consuming a `POST /led` body.
    ParsingLedBody,
    /// Draining the response; remaining input goes to the sink.
    Writing,
}

/// One-session-at-a-time HTTP/1.0 dispatcher.
///
/// The LED registers and the three counters live here and are written by
/// nothing else.
pub struct HttpServer {
    state: HttpState,
    demux: StreamDemux,
    mux: StreamMux,

    start_line: StartLineParser,
    headers_end: ContainsMatcher,
    led_body: LedBodyParser,
    sink: NullSink,

    ok_printer: TextPrinter,
    not_found_printer: TextPrinter,
    method_not_allowed_printer: TextPrinter,
    teapot_printer: TextPrinter,
    counters: CountPrinter,
    /// A `/count` response still owes the report after the 200 prefix.
    pending_count: bool,

    red: u8,
    green: u8,
    blue: u8,
}

impl HttpServer {
    pub fn new() -> Self {
        HttpServer {
            state: HttpState::Idle,
            demux: StreamDemux::new(),
            mux: StreamMux::new(),
            start_line: StartLineParser::new(&PATHS),
            headers_end: ContainsMatcher::new("\r\n\r\n"),
            led_body: LedBodyParser::new(),
            sink: NullSink::new(),
            ok_printer: TextPrinter::new(RESPONSE_OK),
            not_found_printer: TextPrinter::new(RESPONSE_NOT_FOUND),
            method_not_allowed_printer: TextPrinter::new(RESPONSE_METHOD_NOT_ALLOWED),
            teapot_printer: TextPrinter::new(RESPONSE_TEAPOT),
            counters: CountPrinter::new(),
            pending_count: false,
            red: 0,
            green: 0,
            blue: 0,
        }
    }

    /// Current LED channel registers.
    pub fn led(&self) -> (u8, u8, u8) {
        (self.red, self.green, self.blue)
    }

    /// `(requests, ok, errors)` counter snapshot.
    pub fn counts(&self) -> (u32, u32, u32) {
        self.counters.counts()
    }

    /// Advance the dispatcher against its session. Returns whether any
    /// byte moved or state changed.
    pub fn step(&mut self, session: &mut BidiSession) -> bool {
        let mut progress = self.pump_inbound(session);
        progress |= self.advance(session);
        progress |= self.pump_outbound(session);
        progress
    }

    fn pump_inbound(&mut self, session: &mut BidiSession) -> bool {
        let HttpServer {
            demux,
            start_line,
            headers_end,
            led_body,
            sink,
            ..
        } = self;
        if demux.select == PARSER_START {
            // Request-line bytes also feed the end-of-headers scanner: with
            // zero header lines the \r\n\r\n terminator spans the line
            // boundary, so the scanner must see the line's own CRLF.
            let mut outs: [&mut dyn ByteSink; 2] = [start_line, headers_end];
            fanout(&mut session.inbound.data, &mut outs) > 0
        } else {
            let mut sinks: [&mut dyn ByteSink; 4] = [start_line, headers_end, led_body, sink];
            demux.step(&mut session.inbound.data, &mut sinks) > 0
        }
    }

    fn pump_outbound(&mut self, session: &mut BidiSession) -> bool {
        let HttpServer {
            mux,
            ok_printer,
            not_found_printer,
            method_not_allowed_printer,
            teapot_printer,
            counters,
            ..
        } = self;
        let mut sources: [&mut dyn ByteSource; 5] = [
            ok_printer,
            not_found_printer,
            method_not_allowed_printer,
            teapot_printer,
            counters,
        ];
        mux.step(&mut sources, &mut session.outbound.data) > 0
    }

    fn advance(&mut self, session: &mut BidiSession) -> bool {
        match self.state {
            HttpState::Idle => {
                if session.inbound.active {
                    session.outbound.active = true;
                    self.counters.inc_requests();
                    self.demux.select = PARSER_START;
                    self.state = HttpState::ParsingStart;
                    tracing::debug!("request opened");
                    true
                } else {
                    false
                }
            }
            HttpState::ParsingStart => {
                if self.start_line.is_done() {
                    self.demux.select = PARSER_HEADERS;
                    self.state = HttpState::ParsingHeaders;
                    true
                } else if self.headers_end.accepted() {
                    // Headers ended before the request line did: malformed.
                    self.respond(StatusCode::NotFound);
                    true
                } else if !session.inbound.active {
                    // Session died before the request line finished.
                    self.respond(StatusCode::NotFound);
                    true
                } else {
                    false
                }
            }
            HttpState::ParsingHeaders => {
                if self.headers_end.accepted() {
                    self.route();
                    true
                } else if !session.inbound.active {
                    self.respond(StatusCode::NotFound);
                    true
                } else {
                    false
                }
            }
            HttpState::ParsingLedBody => {
                if self.led_body.accepted() {
                    let (red, green, blue) = self.led_body.rgb();
                    self.red = red;
                    self.green = green;
                    self.blue = blue;
                    tracing::debug!(red, green, blue, "led updated");
                    self.respond(StatusCode::Ok);
                    true
                } else if self.led_body.rejected() || !session.inbound.active {
                    self.respond(StatusCode::NotFound);
                    true
                } else {
                    false
                }
            }
            HttpState::Writing => {
                let mut progress = false;
                if self.pending_count && self.ok_printer.is_done() {
                    self.counters.start();
                    self.mux.select = SEL_COUNT;
                    self.pending_count = false;
                    progress = true;
                }
                let response_done = !self.pending_count && self.current_printer_done();
                if response_done && session.outbound.active {
                    session.outbound.active = false;
                    progress = true;
                }
                if response_done && !session.outbound.active && !session.inbound.active {
                    self.start_line.reset();
                    self.headers_end.reset();
                    self.led_body.reset();
                    // Re-point the demux before the next session opens so
                    // its first bytes cannot fall into the sink.
                    self.demux.select = PARSER_START;
                    self.state = HttpState::Idle;
                    tracing::debug!("request finished");
                    progress = true;
                }
                progress
            }
        }
    }

    fn current_printer_done(&self) -> bool {
        match self.mux.select {
            SEL_OK => self.ok_printer.is_done(),
            SEL_NOT_FOUND => self.not_found_printer.is_done(),
            SEL_METHOD_NOT_ALLOWED => self.method_not_allowed_printer.is_done(),
            SEL_TEAPOT => self.teapot_printer.is_done(),
            _ => self.counters.is_done(),
        }
    }

    /// Pick the response for a classified request once the headers have
    /// been consumed.
    fn route(&mut self) {
        let method = self.start_line.method();
        let path = self.start_line.path();
        if self.start_line.protocol() != Protocol::Http10 {
            tracing::debug!(?method, path, "unrecognized protocol on request line");
        }
        match (method, path) {
            (Method::Post, PATH_LED) => {
                self.led_body.reset();
                self.demux.select = PARSER_BODY;
                self.state = HttpState::ParsingLedBody;
            }
            (Method::Get, PATH_COUNT) => self.respond_count(),
            (Method::Get | Method::Brew, PATH_COFFEE) => self.respond(StatusCode::Teapot),
            (_, PATH_LED) | (_, PATH_COUNT) => self.respond(StatusCode::MethodNotAllowed),
            _ => self.respond(StatusCode::NotFound),
        }
    }

    /// Start one of the canned responses and update exactly one counter.
    fn respond(&mut self, status: StatusCode) {
        match status {
            StatusCode::Ok => {
                self.counters.inc_ok();
                self.ok_printer.start();
                self.mux.select = SEL_OK;
            }
            StatusCode::NotFound => {
                self.counters.inc_errors();
                self.not_found_printer.start();
                self.mux.select = SEL_NOT_FOUND;
            }
            StatusCode::MethodNotAllowed => {
                self.counters.inc_errors();
                self.method_not_allowed_printer.start();
                self.mux.select = SEL_METHOD_NOT_ALLOWED;
            }
            StatusCode::Teapot => {
                self.counters.inc_errors();
                self.teapot_printer.start();
                self.mux.select = SEL_TEAPOT;
            }
        }
        self.pending_count = false;
        self.demux.select = PARSER_SINK;
        self.state = HttpState::Writing;
        tracing::debug!(status = u16::from(status), "responding");
    }

    /// The `/count` route: the 200 response followed by the counter
    /// report. The report includes the request being served.
    fn respond_count(&mut self) {
        self.counters.inc_ok();
        self.ok_printer.start();
        self.mux.select = SEL_OK;
        self.pending_count = true;
        self.demux.select = PARSER_SINK;
        self.state = HttpState::Writing;
        tracing::debug!(status = u16::from(StatusCode::Ok), "responding with count");
    }
}

impl Default for HttpServer {
    fn default() -> Self {
        HttpServer::new()
    }
}
