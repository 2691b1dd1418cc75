//! IOSEEK: dynamic device discovery on the backplane.
//!
//! Each slot is asked for its device ID (`0xFE` on the command port). A
//! compliant card answers on its data port with the static signature
//! `0xAA 0x55` followed by its class byte. The discovered IDs are kept in a
//! 16-byte table that firmware places just below `IOTBL_MAX_ADDR`.

use crate::bus::{slot_ports, Backplane, SLOT_COUNT};

/// Command for getting the device ID.
pub const CMD_DID: u8 = 0xFE;
/// First static response byte.
pub const RSP_SB1: u8 = 0xAA;
/// Second static response byte.
pub const RSP_SB2: u8 = 0x55;
/// Data reads spent waiting for the first signature byte.
pub const PROBE_ATTEMPTS: usize = 8;

/// Table entry for an empty or unidentified slot.
pub const DID_ABSENT: u16 = 0;
/// Device class reported by serial line cards.
pub const DID_SERIAL: u8 = 0x01;
/// Device class reported by SD storage controllers.
pub const DID_STORAGE: u8 = 0x07;

/// Size of the device table in memory.
pub const IOTBL_SIZE: usize = 2 * SLOT_COUNT;

/// Device IDs per slot, in firmware memory layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoTable {
    dids: [u16; SLOT_COUNT],
}

const _: () = assert!(core::mem::size_of::<IoTable>() == IOTBL_SIZE);

impl IoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device ID recorded for a slot (0 when absent or out of range).
    pub fn get(&self, slot: u8) -> u16 {
        self.dids.get(slot as usize).copied().unwrap_or(DID_ABSENT)
    }

    /// First slot reporting `did`.
    pub fn lookup(&self, did: u16) -> Option<u8> {
        if did == DID_ABSENT {
            return None;
        }
        self.dids.iter().position(|&d| d == did).map(|i| i as u8)
    }

    /// `(slot, did)` for every identified slot.
    pub fn devices(&self) -> impl Iterator<Item = (u8, u16)> + '_ {
        self.dids
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d != DID_ABSENT)
            .map(|(i, &d)| (i as u8, d))
    }

    /// Little-endian memory image.
    pub fn to_bytes(&self) -> [u8; IOTBL_SIZE] {
        let mut out = [0u8; IOTBL_SIZE];
        for (chunk, did) in out.chunks_exact_mut(2).zip(self.dids) {
            chunk.copy_from_slice(&did.to_le_bytes());
        }
        out
    }
}

/// Backplane scanner owning the device table.
#[derive(Debug, Default)]
pub struct Ioseek {
    table: IoTable,
    /// Log each probe to stderr.
    pub trace: bool,
}

impl Ioseek {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table from the last scan.
    pub fn table(&self) -> &IoTable {
        &self.table
    }

    /// Probe all slots and rebuild the table. Returns the number of
    /// identified devices.
    pub fn scan<B: Backplane + ?Sized>(&mut self, bus: &mut B) -> usize {
        for slot in 0..SLOT_COUNT as u8 {
            let did = self.probe(bus, slot);
            self.table.dids[slot as usize] = did;
        }
        self.table.devices().count()
    }

    /// First slot reporting `did`.
    pub fn lookup(&self, did: u16) -> Option<u8> {
        self.table.lookup(did)
    }

    fn probe<B: Backplane + ?Sized>(&self, bus: &mut B, slot: u8) -> u16 {
        let Some(ports) = slot_ports(slot) else {
            return DID_ABSENT;
        };
        bus.output(ports.cmd, CMD_DID);

        let mut attempts = 0;
        let answered = loop {
            if attempts == PROBE_ATTEMPTS {
                break false;
            }
            attempts += 1;
            if bus.input(ports.data) == RSP_SB1 {
                break true;
            }
        };
        if !answered {
            if self.trace {
                eprintln!("[IOSEEK] Slot {}: no response", slot);
            }
            return DID_ABSENT;
        }

        let second = bus.input(ports.data);
        if second != RSP_SB2 {
            if self.trace {
                eprintln!("[IOSEEK] Slot {}: bad signature {:#04X}", slot, second);
            }
            return DID_ABSENT;
        }

        let class = bus.input(ports.data);
        if self.trace {
            eprintln!(
                "[IOSEEK] Slot {}: DID {:#04X} after {} read(s)",
                slot, class, attempts
            );
        }
        class as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Card, Chassis};
    use crate::cards::StubCard;

    /// Card that answers with the wrong second signature byte.
    struct Impostor;

    impl Card for Impostor {
        fn command(&mut self, _cmd: u8) {}
        fn write_data(&mut self, _value: u8) {}
        fn read_data(&mut self) -> u8 {
            RSP_SB1
        }
        fn name(&self) -> &str {
            "impostor"
        }
    }

    #[test]
    fn test_scan_empty_chassis() {
        let mut chassis = Chassis::new();
        let mut ioseek = Ioseek::new();
        assert_eq!(ioseek.scan(&mut chassis), 0);
        assert_eq!(ioseek.table(), &IoTable::new());
    }

    #[test]
    fn test_scan_slot_three() {
        let mut chassis = Chassis::new();
        chassis.insert(3, Box::new(StubCard::new(0x07)));

        let mut ioseek = Ioseek::new();
        assert_eq!(ioseek.scan(&mut chassis), 1);
        assert_eq!(ioseek.table().get(3), 0x07);
        assert_eq!(ioseek.lookup(0x07), Some(3));
    }

    #[test]
    fn test_lookup_lowest_slot_wins() {
        let mut chassis = Chassis::new();
        chassis.insert(6, Box::new(StubCard::new(0x20)));
        chassis.insert(2, Box::new(StubCard::new(0x20)));
        chassis.insert(4, Box::new(StubCard::new(0x21)));

        let mut ioseek = Ioseek::new();
        ioseek.scan(&mut chassis);
        assert_eq!(ioseek.lookup(0x20), Some(2));
        assert_eq!(ioseek.lookup(0x21), Some(4));
        assert_eq!(ioseek.lookup(0x22), None);
        assert_eq!(ioseek.lookup(DID_ABSENT), None);
    }

    #[test]
    fn test_busy_card_within_attempts() {
        let mut chassis = Chassis::new();
        chassis.insert(1, Box::new(StubCard::with_busy_reads(0x33, 5)));
        chassis.insert(2, Box::new(StubCard::with_busy_reads(0x34, PROBE_ATTEMPTS as u8)));

        let mut ioseek = Ioseek::new();
        ioseek.scan(&mut chassis);
        assert_eq!(ioseek.table().get(1), 0x33);
        // Never answers inside the probe budget
        assert_eq!(ioseek.table().get(2), DID_ABSENT);
    }

    #[test]
    fn test_bad_signature_is_absent() {
        let mut chassis = Chassis::new();
        chassis.insert(0, Box::new(Impostor));

        let mut ioseek = Ioseek::new();
        assert_eq!(ioseek.scan(&mut chassis), 0);
    }

    #[test]
    fn test_rescan_overwrites_table() {
        let mut chassis = Chassis::new();
        chassis.insert(5, Box::new(StubCard::new(0x07)));

        let mut ioseek = Ioseek::new();
        ioseek.scan(&mut chassis);
        let first = *ioseek.table();
        ioseek.scan(&mut chassis);
        assert_eq!(ioseek.table(), &first);

        chassis.remove(5);
        ioseek.scan(&mut chassis);
        assert_eq!(ioseek.lookup(0x07), None);
    }

    #[test]
    fn test_table_bytes() {
        let mut chassis = Chassis::new();
        chassis.insert(1, Box::new(StubCard::new(0x07)));
        let mut ioseek = Ioseek::new();
        ioseek.scan(&mut chassis);

        let bytes = ioseek.table().to_bytes();
        assert_eq!(bytes.len(), IOTBL_SIZE);
        assert_eq!(&bytes[2..4], &[0x07, 0x00]);
        assert!(bytes[..2].iter().chain(&bytes[4..]).all(|&b| b == 0));
    }
}
