//! The `/count` report: three request counters printed as one line.

use crate::print::{BcdCounter, Print, TextPrinter};
use crate::stream::ByteSource;

const COUNTER_DIGITS: usize = 4;

/// Prints `requests: NNNN ok_responses: NNNN error_responses: NNNN\r\n`
/// and owns the counters it reports.
///
/// The counters are fixed-width BCD, so the report carries leading zeros
/// (`0003`). That makes the line deliberately not-quite-JSON; stripping
/// the zeros would change the interface, so it stays.
pub struct CountPrinter {
    requests: BcdCounter,
    ok: BcdCounter,
    errors: BcdCounter,
    literals: [TextPrinter; 4],
    segment: usize,
    active: bool,
}

/// Segment order: literal, counter, literal, counter, literal, counter,
/// literal.
const SEGMENTS: usize = 7;

impl CountPrinter {
    pub fn new() -> Self {
        CountPrinter {
            requests: BcdCounter::new(COUNTER_DIGITS, true),
            ok: BcdCounter::new(COUNTER_DIGITS, true),
            errors: BcdCounter::new(COUNTER_DIGITS, true),
            literals: [
                TextPrinter::new("requests: "),
                TextPrinter::new(" ok_responses: "),
                TextPrinter::new(" error_responses: "),
                TextPrinter::new("\r\n"),
            ],
            segment: 0,
            active: false,
        }
    }

    pub fn inc_requests(&mut self) {
        self.requests.inc();
    }

    pub fn inc_ok(&mut self) {
        self.ok.inc();
    }

    pub fn inc_errors(&mut self) {
        self.errors.inc();
    }

    /// `(requests, ok, errors)` as plain integers.
    pub fn counts(&self) -> (u32, u32, u32) {
        (self.requests.value(), self.ok.value(), self.errors.value())
    }

    fn segment_source(&self, segment: usize) -> &dyn ByteSource {
        match segment {
            0 => &self.literals[0],
            1 => &self.requests,
            2 => &self.literals[1],
            3 => &self.ok,
            4 => &self.literals[2],
            5 => &self.errors,
            _ => &self.literals[3],
        }
    }

    fn segment_source_mut(&mut self, segment: usize) -> &mut dyn ByteSource {
        match segment {
            0 => &mut self.literals[0],
            1 => &mut self.requests,
            2 => &mut self.literals[1],
            3 => &mut self.ok,
            4 => &mut self.literals[2],
            5 => &mut self.errors,
            _ => &mut self.literals[3],
        }
    }

    fn start_segment(&mut self, segment: usize) {
        match segment {
            0 => self.literals[0].start(),
            1 => self.requests.start(),
            2 => self.literals[1].start(),
            3 => self.ok.start(),
            4 => self.literals[2].start(),
            5 => self.errors.start(),
            _ => self.literals[3].start(),
        }
    }
}

impl Default for CountPrinter {
    fn default() -> Self {
        CountPrinter::new()
    }
}

impl ByteSource for CountPrinter {
    fn peek(&self) -> Option<u8> {
        if !self.active {
            return None;
        }
        self.segment_source(self.segment).peek()
    }

    fn take(&mut self) -> u8 {
        let segment = self.segment;
        let byte = self.segment_source_mut(segment).take();
        // Keep the invariant that an active printer always has a byte
        // pending: skip ahead over finished segments.
        while self.active && self.segment_source(self.segment).peek().is_none() {
            self.segment += 1;
            if self.segment == SEGMENTS {
                self.active = false;
            } else {
                self.start_segment(self.segment);
            }
        }
        byte
    }
}

impl Print for CountPrinter {
    fn start(&mut self) {
        if self.active {
            return;
        }
        self.segment = 0;
        self.active = true;
        self.start_segment(0);
    }

    fn is_done(&self) -> bool {
        !self.active
    }
}
