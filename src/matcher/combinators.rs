//! Matchers built out of other matchers.

use super::Matcher;
use crate::stream::ByteSink;

/// Match any of several alternatives driven in lock-step.
///
/// Every non-terminated child sees every consumed byte, so a byte is only
/// consumed when all of them can take it; children that have already spoken
/// are masked out of that gate. Accepts as soon as any child accepts
/// (shortest match); rejects once every child has rejected.
pub struct AltMatcher {
    children: Vec<Box<dyn Matcher>>,
}

impl AltMatcher {
    pub fn new(children: Vec<Box<dyn Matcher>>) -> Self {
        assert!(!children.is_empty(), "alternation over nothing");
        AltMatcher { children }
    }

    /// Index of the first accepting child, if any.
    pub fn which(&self) -> Option<usize> {
        self.children.iter().position(|c| c.accepted())
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl ByteSink for AltMatcher {
    fn is_ready(&self) -> bool {
        // All non-terminated children must be able to take the byte; the
        // aggregate is also done once it has a verdict of its own.
        !self.is_terminated()
            && self
                .children
                .iter()
                .all(|c| c.is_terminated() || c.is_ready())
    }

    fn push(&mut self, byte: u8) {
        for child in &mut self.children {
            if !child.is_terminated() {
                child.push(byte);
            }
        }
    }
}

impl Matcher for AltMatcher {
    fn accepted(&self) -> bool {
        self.children.iter().any(|c| c.accepted())
    }

    fn rejected(&self) -> bool {
        self.children.iter().all(|c| c.rejected())
    }

    fn reset(&mut self) {
        for child in &mut self.children {
            child.reset();
        }
    }
}

/// Match several patterns one after another.
///
/// Child i is held back until child i−1 has accepted; the byte that
/// completes one child is not seen by the next. Rejects eagerly as soon as
/// any child rejects; accepts when the final child does.
pub struct SeqMatcher {
    children: Vec<Box<dyn Matcher>>,
}

impl SeqMatcher {
    pub fn new(children: Vec<Box<dyn Matcher>>) -> Self {
        assert!(!children.is_empty(), "sequence of nothing");
        SeqMatcher { children }
    }

    /// The child currently consuming input: the first that has not yet
    /// accepted.
    fn active(&self) -> Option<usize> {
        self.children.iter().position(|c| !c.accepted())
    }
}

impl ByteSink for SeqMatcher {
    fn is_ready(&self) -> bool {
        if self.is_terminated() {
            return false;
        }
        match self.active() {
            Some(i) => self.children[i].is_ready(),
            None => false,
        }
    }

    fn push(&mut self, byte: u8) {
        if let Some(i) = self.active() {
            self.children[i].push(byte);
        }
    }
}

impl Matcher for SeqMatcher {
    fn accepted(&self) -> bool {
        self.children
            .last()
            .map(|c| c.accepted())
            .unwrap_or(false)
    }

    fn rejected(&self) -> bool {
        self.children.iter().any(|c| c.rejected())
    }

    fn reset(&mut self) {
        for child in &mut self.children {
            child.reset();
        }
    }
}
