//! Level-selected stream routing: many-to-one and one-to-many.

use super::{ByteSink, ByteSource};

/// Routes one of K input streams to a single output.
///
/// `select` is level-triggered: it names the input that is wired through
/// until it is changed. Non-selected inputs see no readiness and are left
/// untouched. An out-of-range `select` produces nothing on the output.
#[derive(Debug)]
pub struct StreamMux {
    /// Which input is wired to the output.
    pub select: usize,
}

impl StreamMux {
    pub fn new() -> Self {
        StreamMux { select: 0 }
    }

    /// Move bytes from the selected input into `out` while both sides
    /// allow. Returns the number transferred.
    pub fn step(&mut self, inputs: &mut [&mut dyn ByteSource], out: &mut dyn ByteSink) -> usize {
        let Some(input) = inputs.get_mut(self.select) else {
            return 0;
        };
        let mut moved = 0;
        while input.peek().is_some() && out.is_ready() {
            out.push(input.take());
            moved += 1;
        }
        moved
    }
}

impl Default for StreamMux {
    fn default() -> Self {
        StreamMux::new()
    }
}

/// Routes a single input stream to one of K outputs.
///
/// Mirror of [`StreamMux`]: the selected output sees the input, the others
/// see nothing, and an out-of-range `select` withholds readiness from the
/// input entirely.
#[derive(Debug)]
pub struct StreamDemux {
    /// Which output the input is wired to.
    pub select: usize,
}

impl StreamDemux {
    pub fn new() -> Self {
        StreamDemux { select: 0 }
    }

    /// Move bytes from `input` into the selected output while both sides
    /// allow. Returns the number transferred.
    pub fn step(&mut self, input: &mut dyn ByteSource, outs: &mut [&mut dyn ByteSink]) -> usize {
        let Some(out) = outs.get_mut(self.select) else {
            return 0;
        };
        let mut moved = 0;
        while input.peek().is_some() && out.is_ready() {
            out.push(input.take());
            moved += 1;
        }
        moved
    }
}

impl Default for StreamDemux {
    fn default() -> Self {
        StreamDemux::new()
    }
}
