//! Streaming classifier for the request line of an HTTP/1.0 request:
//! `METHOD PATH PROTOCOL\r\n`.

use crate::matcher::{Matcher, StringMatcher};
use crate::stream::ByteSink;
use num_enum::TryFromPrimitive;

/// Recognized request methods. `NoMatch` is the sentinel for anything the
/// parallel matchers did not accept.
#[derive(TryFromPrimitive, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Method {
    NoMatch = 0,
    Get = 1,
    Post = 2,
    Brew = 3,
}

/// Recognized protocol versions.
#[derive(TryFromPrimitive, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Protocol {
    NoMatch = 0,
    Http10 = 1,
}

/// Matcher patterns in [`Method`] discriminant order.
const METHODS: [&str; 3] = ["GET", "POST", "BREW"];

const PROTOCOL_HTTP10: &str = "HTTP/1.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Bytes up to the first space fan out to the method matchers.
    Method,
    /// Bytes up to the second space fan out to the path matchers.
    Path,
    /// Bytes up to the carriage return feed the protocol matcher.
    Version,
    /// Carriage return seen; waiting for the line feed.
    AwaitLf,
    Done,
}

/// Consumes a request line byte-by-byte and classifies its three fields.
///
/// Each field is matched by a bank of parallel literal matchers fed in
/// lock-step; the field delimiter (space, or CRLF for the protocol) is
/// consumed by the parser itself and never reaches the matchers. `done`
/// latches once the terminating line feed has been consumed.
///
/// When several configured paths accept — overlapping literals such as `/`
/// and `/style.css` — the classification is the longest accepted literal.
pub struct StartLineParser {
    methods: Vec<StringMatcher>,
    paths: Vec<StringMatcher>,
    protocol: StringMatcher,
    phase: Phase,
}

impl StartLineParser {
    /// `paths` are the literals the path field is classified against, in
    /// the order their 1-based indices are reported by [`path`].
    ///
    /// [`path`]: StartLineParser::path
    pub fn new(paths: &[&str]) -> Self {
        StartLineParser {
            methods: METHODS.iter().map(|m| StringMatcher::new(m)).collect(),
            paths: paths.iter().map(|p| StringMatcher::new(p)).collect(),
            protocol: StringMatcher::new(PROTOCOL_HTTP10),
            phase: Phase::Method,
        }
    }

    /// The terminating CRLF has been consumed.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn reset(&mut self) {
        for m in &mut self.methods {
            m.reset();
        }
        for p in &mut self.paths {
            p.reset();
        }
        self.protocol.reset();
        self.phase = Phase::Method;
    }

    /// Classified method, `NoMatch` if nothing accepted.
    pub fn method(&self) -> Method {
        match self.methods.iter().position(|m| m.accepted()) {
            Some(i) => Method::try_from(i as u8 + 1).unwrap_or(Method::NoMatch),
            None => Method::NoMatch,
        }
    }

    /// Classified path as a 1-based index into the configured literals,
    /// or 0 for no match. Overlapping accepts resolve to the longest
    /// literal.
    pub fn path(&self) -> usize {
        let mut best = 0;
        let mut best_len = 0;
        for (i, p) in self.paths.iter().enumerate() {
            if p.accepted() && p.pattern_len() > best_len {
                best = i + 1;
                best_len = p.pattern_len();
            }
        }
        best
    }

    /// Classified protocol, `NoMatch` if nothing accepted.
    pub fn protocol(&self) -> Protocol {
        if self.protocol.accepted() {
            Protocol::Http10
        } else {
            Protocol::NoMatch
        }
    }

    /// Method field as a bitfield: bit 0 is the no-match sentinel, bit i+1
    /// is methods\[i\].
    pub fn method_bits(&self) -> u8 {
        let mut bits = 0u8;
        for (i, m) in self.methods.iter().enumerate() {
            if m.accepted() {
                bits |= 1 << (i + 1);
            }
        }
        if bits == 0 { 1 } else { bits }
    }

    /// Path field as a bitfield with the same sentinel convention.
    pub fn path_bits(&self) -> u32 {
        let mut bits = 0u32;
        for (i, p) in self.paths.iter().enumerate() {
            if p.accepted() {
                bits |= 1 << (i + 1);
            }
        }
        if bits == 0 { 1 } else { bits }
    }

    /// Protocol field as a bitfield with the same sentinel convention.
    pub fn protocol_bits(&self) -> u8 {
        if self.protocol.accepted() { 1 << 1 } else { 1 }
    }

    fn fan(matchers: &mut [StringMatcher], byte: u8) {
        for m in matchers.iter_mut() {
            if !m.is_terminated() {
                m.push(byte);
            }
        }
    }
}

impl ByteSink for StartLineParser {
    fn is_ready(&self) -> bool {
        self.phase != Phase::Done
    }

    fn push(&mut self, byte: u8) {
        match self.phase {
            Phase::Method => {
                if byte == b' ' {
                    self.phase = Phase::Path;
                } else {
                    Self::fan(&mut self.methods, byte);
                }
            }
            Phase::Path => {
                if byte == b' ' {
                    self.phase = Phase::Version;
                } else {
                    Self::fan(&mut self.paths, byte);
                }
            }
            Phase::Version => {
                if byte == b'\r' {
                    self.phase = Phase::AwaitLf;
                } else if !self.protocol.is_terminated() {
                    self.protocol.push(byte);
                }
            }
            Phase::AwaitLf => {
                if byte == b'\n' {
                    self.phase = Phase::Done;
                }
            }
            Phase::Done => {}
        }
    }
}
