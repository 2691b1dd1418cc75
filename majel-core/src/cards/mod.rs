//! Emulated backplane cards.
//!
//! Every card speaks the IOSEEK identification handshake; `DidResponder`
//! implements that part once so each card only handles its own commands.

mod sd;
mod serial;
mod stub;

pub use sd::SdCard;
pub use serial::SerialCard;
pub use stub::StubCard;

use crate::bus::FLOATING_BUS;
use crate::ioseek::{RSP_SB1, RSP_SB2};

/// Device-ID handshake state shared by all compliant cards.
#[derive(Debug, Clone)]
pub struct DidResponder {
    class: u8,
    busy_reads: u8,
    pending_busy: u8,
    step: Option<u8>,
}

impl DidResponder {
    pub fn new(class: u8) -> Self {
        Self {
            class,
            busy_reads: 0,
            pending_busy: 0,
            step: None,
        }
    }

    /// Answer with this many busy reads before the signature.
    pub fn with_busy_reads(mut self, reads: u8) -> Self {
        self.busy_reads = reads;
        self
    }

    /// Device class byte.
    pub fn class(&self) -> u8 {
        self.class
    }

    /// Start a handshake (GET_DEVICE_ID received).
    pub fn arm(&mut self) {
        self.step = Some(0);
        self.pending_busy = self.busy_reads;
    }

    /// Abandon any handshake in progress.
    pub fn disarm(&mut self) {
        self.step = None;
    }

    /// Whether data reads currently belong to the handshake.
    pub fn is_active(&self) -> bool {
        self.step.is_some()
    }

    /// Next handshake byte.
    pub fn next(&mut self) -> u8 {
        if self.pending_busy > 0 {
            self.pending_busy -= 1;
            return FLOATING_BUS;
        }
        match self.step {
            Some(0) => {
                self.step = Some(1);
                RSP_SB1
            }
            Some(1) => {
                self.step = Some(2);
                RSP_SB2
            }
            Some(_) => {
                self.step = None;
                self.class
            }
            None => FLOATING_BUS,
        }
    }
}
