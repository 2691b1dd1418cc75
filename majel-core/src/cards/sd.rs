//! SD card interface: storage controller with a streaming address register.
//!
//! Commands on the command port:
//! - `0x00` OPEN: the next data read returns the card status
//! - `0x04` SETADDR: the next eight data writes form a little-endian 64-bit
//!   byte address; afterwards data reads and writes stream from that address
//! - `0xFE` GET_DEVICE_ID: IOSEEK handshake

use super::DidResponder;
use crate::bus::{Card, FLOATING_BUS};
use crate::ioseek::{CMD_DID, DID_STORAGE};
use crate::mfs::{CMD_OPEN, CMD_SETADDR, STATUS_NO_MEDIUM, STATUS_READY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SdState {
    Idle,
    Status,
    Address { filled: u8, value: u64 },
    Stream,
}

/// Emulated SD card interface backed by an in-memory medium image.
#[derive(Debug, Clone)]
pub struct SdCard {
    medium: Option<Vec<u8>>,
    state: SdState,
    address: u64,
    did: DidResponder,
    writes: u64,
}

impl SdCard {
    /// Card with a medium inserted.
    pub fn new(medium: Vec<u8>) -> Self {
        Self {
            medium: Some(medium),
            ..Self::empty()
        }
    }

    /// Card with an empty medium slot.
    pub fn empty() -> Self {
        Self {
            medium: None,
            state: SdState::Idle,
            address: 0,
            did: DidResponder::new(DID_STORAGE),
            writes: 0,
        }
    }

    /// Answer the device-ID handshake only after `reads` busy reads.
    pub fn with_busy_reads(mut self, reads: u8) -> Self {
        self.did = self.did.with_busy_reads(reads);
        self
    }

    /// Swap the inserted medium, returning the previous one.
    pub fn insert(&mut self, medium: Option<Vec<u8>>) -> Option<Vec<u8>> {
        self.state = SdState::Idle;
        std::mem::replace(&mut self.medium, medium)
    }

    /// Current streaming address.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Number of bytes stored to the medium so far.
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    fn byte_at(&self, address: u64) -> u8 {
        self.medium
            .as_ref()
            .and_then(|m| usize::try_from(address).ok().and_then(|a| m.get(a)))
            .copied()
            .unwrap_or(FLOATING_BUS)
    }
}

impl Card for SdCard {
    fn command(&mut self, cmd: u8) {
        if cmd == CMD_DID {
            self.did.arm();
            self.state = SdState::Idle;
            return;
        }
        self.did.disarm();
        self.state = match cmd {
            CMD_OPEN => SdState::Status,
            CMD_SETADDR => SdState::Address {
                filled: 0,
                value: 0,
            },
            _ => SdState::Idle,
        };
    }

    fn write_data(&mut self, value: u8) {
        match self.state {
            SdState::Address { filled, value: acc } => {
                let acc = acc | (value as u64) << (filled as u32 * 8);
                if filled + 1 == 8 {
                    self.address = acc;
                    self.state = SdState::Stream;
                } else {
                    self.state = SdState::Address {
                        filled: filled + 1,
                        value: acc,
                    };
                }
            }
            SdState::Stream => {
                if let Some(medium) = self.medium.as_mut() {
                    if let Some(byte) = usize::try_from(self.address)
                        .ok()
                        .and_then(|a| medium.get_mut(a))
                    {
                        *byte = value;
                        self.writes += 1;
                    }
                }
                self.address = self.address.wrapping_add(1);
            }
            SdState::Idle | SdState::Status => {}
        }
    }

    fn read_data(&mut self) -> u8 {
        if self.did.is_active() {
            return self.did.next();
        }
        match self.state {
            SdState::Status => {
                self.state = SdState::Idle;
                if self.medium.is_some() {
                    STATUS_READY
                } else {
                    STATUS_NO_MEDIUM
                }
            }
            SdState::Stream => {
                let byte = self.byte_at(self.address);
                self.address = self.address.wrapping_add(1);
                byte
            }
            SdState::Idle | SdState::Address { .. } => FLOATING_BUS,
        }
    }

    fn name(&self) -> &str {
        "sd"
    }

    fn medium(&self) -> Option<&[u8]> {
        self.medium.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_address(card: &mut SdCard, address: u64) {
        card.command(CMD_SETADDR);
        for b in address.to_le_bytes() {
            card.write_data(b);
        }
    }

    #[test]
    fn test_open_status() {
        let mut card = SdCard::new(vec![0; 512]);
        card.command(CMD_OPEN);
        assert_eq!(card.read_data(), STATUS_READY);

        let mut empty = SdCard::empty();
        empty.command(CMD_OPEN);
        assert_eq!(empty.read_data(), STATUS_NO_MEDIUM);
    }

    #[test]
    fn test_stream_read_crosses_blocks() {
        let medium: Vec<u8> = (0..512).map(|i| (i % 251) as u8).collect();
        let mut card = SdCard::new(medium.clone());

        set_address(&mut card, 0xFE);
        assert_eq!(card.address(), 0xFE);
        for i in 0xFE..0x104 {
            assert_eq!(card.read_data(), medium[i]);
        }
    }

    #[test]
    fn test_stream_write() {
        let mut card = SdCard::new(vec![0; 256]);
        set_address(&mut card, 0x10);
        card.write_data(0xAB);
        card.write_data(0xCD);

        let medium = card.medium().unwrap();
        assert_eq!(&medium[0x10..0x12], &[0xAB, 0xCD]);
        assert_eq!(card.write_count(), 2);
    }

    #[test]
    fn test_out_of_range_floats() {
        let mut card = SdCard::new(vec![0; 256]);
        set_address(&mut card, 0x1000);
        assert_eq!(card.read_data(), FLOATING_BUS);
        card.write_data(1);
        assert_eq!(card.write_count(), 0);
    }

    #[test]
    fn test_did_handshake_interrupts_stream() {
        let mut card = SdCard::new(vec![0x11; 256]);
        set_address(&mut card, 0);
        card.command(CMD_DID);
        assert_eq!(card.read_data(), 0xAA);
        assert_eq!(card.read_data(), 0x55);
        assert_eq!(card.read_data(), DID_STORAGE);
        assert_eq!(card.read_data(), FLOATING_BUS);
    }
}
