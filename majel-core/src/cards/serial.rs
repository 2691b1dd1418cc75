//! Serial line card.

use super::DidResponder;
use crate::bus::Card;
use crate::console::SerialConsole;
use crate::ioseek::{CMD_DID, DID_SERIAL};

/// Get number of bytes available.
pub const SER_CMD_AVAIL: u8 = 0x01;
/// Set interrupt vector (next data write).
pub const SER_CMD_SETINT: u8 = 0x02;
/// Clear interrupt vector.
pub const SER_CMD_CLRINT: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    Avail,
    Vector,
}

/// Serial card forwarding its data channel to a console.
pub struct SerialCard {
    console: Box<dyn SerialConsole>,
    did: DidResponder,
    pending: Pending,
    vector: Option<u8>,
}

impl SerialCard {
    pub fn new(console: Box<dyn SerialConsole>) -> Self {
        Self {
            console,
            did: DidResponder::new(DID_SERIAL),
            pending: Pending::None,
            vector: None,
        }
    }

    /// Interrupt vector last registered by software.
    pub fn vector(&self) -> Option<u8> {
        self.vector
    }

    pub fn console(&self) -> &dyn SerialConsole {
        self.console.as_ref()
    }
}

impl Card for SerialCard {
    fn command(&mut self, cmd: u8) {
        if cmd == CMD_DID {
            self.did.arm();
            return;
        }
        self.did.disarm();
        self.pending = match cmd {
            SER_CMD_AVAIL => Pending::Avail,
            SER_CMD_SETINT => Pending::Vector,
            SER_CMD_CLRINT => {
                self.vector = None;
                Pending::None
            }
            _ => Pending::None,
        };
    }

    fn write_data(&mut self, value: u8) {
        if self.pending == Pending::Vector {
            self.vector = Some(value);
            self.pending = Pending::None;
        } else {
            self.console.write(value);
        }
    }

    fn read_data(&mut self) -> u8 {
        if self.did.is_active() {
            return self.did.next();
        }
        if self.pending == Pending::Avail {
            self.pending = Pending::None;
            return self.console.available().min(u8::MAX as usize) as u8;
        }
        self.console.get_key().unwrap_or(0)
    }

    fn name(&self) -> &str {
        "serial"
    }
}
