//! Static backplane port map.
//!
//! Slot `n` owns two consecutive ports at the top of the I/O space:
//! - `0xF0 + 2n`: data channel
//! - `0xF1 + 2n`: command channel

/// Number of backplane slots.
pub const SLOT_COUNT: usize = 8;

/// Data port of slot 0; every other port is derived from it.
pub const IODAT0: u8 = 0xF0;

/// Command port of slot 0.
pub const IOCMD0: u8 = 0xF1;

/// Command port of the last slot.
pub const IOCMD7: u8 = 0xFF;

/// Value read from a port with nothing behind it.
pub const FLOATING_BUS: u8 = 0xFF;

/// Command/data port pair of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPorts {
    pub cmd: u8,
    pub data: u8,
}

/// Which channel of a slot a port addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Command,
    Data,
}

/// Ports for a slot (0-7).
pub fn slot_ports(slot: u8) -> Option<SlotPorts> {
    if (slot as usize) < SLOT_COUNT {
        Some(SlotPorts {
            cmd: IOCMD0 + slot * 2,
            data: IODAT0 + slot * 2,
        })
    } else {
        None
    }
}

/// Decode a port into its slot and channel.
pub fn decode_port(port: u8) -> Option<(u8, Channel)> {
    if port < IODAT0 {
        return None;
    }
    let rel = port - IODAT0;
    let channel = if rel & 1 == 0 {
        Channel::Data
    } else {
        Channel::Command
    };
    Some((rel / 2, channel))
}
