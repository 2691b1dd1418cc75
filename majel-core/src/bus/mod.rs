//! Backplane abstractions.
//!
//! This module provides the two sides of the Majel-1 I/O backplane:
//! - `Backplane`: port-level access as seen by the CPU and the drivers
//! - `Card`: the device side of a single slot
//! - `Chassis`: eight slots wired to the static port map

mod chassis;
pub mod ports;

pub use chassis::Chassis;
pub use ports::{decode_port, slot_ports, Channel, SlotPorts, FLOATING_BUS, SLOT_COUNT};

/// Port-level I/O bus. Drivers only ever talk to hardware through this.
pub trait Backplane {
    /// Write a byte to an I/O port.
    fn output(&mut self, port: u8, value: u8);

    /// Read a byte from an I/O port. Unbacked ports read `FLOATING_BUS`.
    fn input(&mut self, port: u8) -> u8;
}

/// Device plugged into one backplane slot.
pub trait Card: Send {
    /// Byte written to the slot's command port.
    fn command(&mut self, cmd: u8);

    /// Byte written to the slot's data port.
    fn write_data(&mut self, value: u8);

    /// Byte read from the slot's data port.
    fn read_data(&mut self) -> u8;

    /// Short human-readable card name.
    fn name(&self) -> &str;

    /// Storage medium behind the card, if it has one.
    fn medium(&self) -> Option<&[u8]> {
        None
    }
}

impl<B: Backplane + ?Sized> Backplane for &mut B {
    fn output(&mut self, port: u8, value: u8) {
        (**self).output(port, value)
    }

    fn input(&mut self, port: u8) -> u8 {
        (**self).input(port)
    }
}
