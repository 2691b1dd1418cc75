//! Console abstraction behind the emulated serial card.
//!
//! The `SerialConsole` trait lets the same serial card drive a real terminal
//! or a `HeadlessConsole` that captures output for tests.

use std::collections::VecDeque;

/// Far end of a serial line: takes transmitted bytes, supplies received ones.
pub trait SerialConsole: Send {
    /// Transmit one byte down the line.
    fn write(&mut self, ch: u8);

    /// True when a received byte is waiting. Never blocks.
    fn has_key(&self) -> bool;

    /// Take the oldest received byte, if any.
    fn get_key(&mut self) -> Option<u8>;

    /// Number of keys waiting. Consoles that cannot count report 0 or 1.
    fn available(&self) -> usize {
        usize::from(self.has_key())
    }
}

/// Line with no terminal attached. Transmitted bytes are kept; received
/// bytes come from a scripted queue.
#[derive(Default)]
pub struct HeadlessConsole {
    sent: Vec<u8>,
    pending: VecDeque<u8>,
}

impl HeadlessConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Line whose receive queue starts out holding `input`.
    pub fn with_input(input: &[u8]) -> Self {
        Self {
            sent: Vec::new(),
            pending: input.iter().copied().collect(),
        }
    }

    /// Append bytes to the receive queue.
    pub fn feed(&mut self, input: &[u8]) {
        self.pending.extend(input.iter().copied());
    }

    /// Everything transmitted so far.
    pub fn transmitted(&self) -> &[u8] {
        &self.sent
    }

    pub fn transmitted_text(&self) -> String {
        String::from_utf8_lossy(&self.sent).into_owned()
    }
}

impl SerialConsole for HeadlessConsole {
    fn write(&mut self, ch: u8) {
        self.sent.push(ch);
    }

    fn has_key(&self) -> bool {
        !self.pending.is_empty()
    }

    fn get_key(&mut self) -> Option<u8> {
        self.pending.pop_front()
    }

    fn available(&self) -> usize {
        self.pending.len()
    }
}
