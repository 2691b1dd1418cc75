//! Identification-only card.

use super::DidResponder;
use crate::bus::{Card, FLOATING_BUS};
use crate::ioseek::CMD_DID;

/// Card that answers the device-ID handshake and nothing else.
/// Stands in for hardware that has no emulation.
#[derive(Debug, Clone)]
pub struct StubCard {
    did: DidResponder,
}

impl StubCard {
    pub fn new(class: u8) -> Self {
        Self {
            did: DidResponder::new(class),
        }
    }

    /// Respond only after `reads` busy reads.
    pub fn with_busy_reads(class: u8, reads: u8) -> Self {
        Self {
            did: DidResponder::new(class).with_busy_reads(reads),
        }
    }
}

impl Card for StubCard {
    fn command(&mut self, cmd: u8) {
        if cmd == CMD_DID {
            self.did.arm();
        } else {
            self.did.disarm();
        }
    }

    fn write_data(&mut self, _value: u8) {}

    fn read_data(&mut self) -> u8 {
        if self.did.is_active() {
            self.did.next()
        } else {
            FLOATING_BUS
        }
    }

    fn name(&self) -> &str {
        "stub"
    }
}
