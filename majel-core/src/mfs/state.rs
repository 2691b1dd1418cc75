//! MajelFS driver state record.
//!
//! The firmware keeps this record in a fixed window directly above the
//! stack, so its size is part of the contract. Fields are stored as raw
//! bytes in firmware order (lowest address first) and the total is checked
//! at compile time.
//!
//! Layout (86 bytes):
//! - 0x00: flags
//! - 0x01: I/O data port
//! - 0x02: I/O command port
//! - 0x03: block truncation
//! - 0x04: block offset, followed by the 8-byte block number (0x05-0x0C)
//! - 0x0D: current directory index
//! - 0x0E: zero long
//! - 0x16: scratch registers 0 to 3, eight bytes each (register 0 at 0x16,
//!   register 3 at 0x2E). Firmware numbers these longs downward from the
//!   label buffer, so register 0 is firmware long 3 and register 3 is
//!   firmware long 0.
//! - 0x36: label buffer (32 bytes)

use bitflags::bitflags;

use super::address::{compute_address, split_address};
use crate::bus::SlotPorts;

/// Longest label, excluding the terminating NUL.
pub const LABEL_MAX: usize = 31;
/// Label buffer size.
pub const LABEL_SIZE: usize = 32;
/// Size of one long field.
pub const LONG_SIZE: usize = 8;
/// Number of general purpose longs.
pub const SCRATCH_COUNT: usize = 4;

/// Exact size of the state record.
pub const MFS_CACHE_SIZE: usize = 86;

/// Scratch long holding the open handle's first byte address.
pub const SCRATCH_START: usize = 0;
/// Scratch long holding the open handle's end address (exclusive).
pub const SCRATCH_END: usize = 1;
/// Scratch long holding the directory cursor block.
pub const SCRATCH_CURSOR: usize = 2;
/// Scratch long counting chain steps during a walk.
pub const SCRATCH_STEPS: usize = 3;

bitflags! {
    /// Driver state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MfsFlags: u8 {
        /// MFS is connected.
        const CONNECTED = 1 << 0;
        /// A file is open.
        const FILE_OPEN = 1 << 1;
        /// The open file permits writing.
        const WRITABLE = 1 << 2;
        /// A directory is open.
        const DIR_OPEN = 1 << 3;
        /// Nothing is open.
        const IDLE = 1 << 4;
    }
}

impl MfsFlags {
    /// Whether a file or directory handle is open.
    pub fn has_handle(self) -> bool {
        self.intersects(Self::FILE_OPEN | Self::DIR_OPEN)
    }
}

/// Driver state record.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MfsState {
    flags: u8,
    io_data: u8,
    io_cmd: u8,
    truncation: u8,
    address: [u8; 1 + LONG_SIZE],
    dir_index: u8,
    zero_long: [u8; LONG_SIZE],
    scratch: [[u8; LONG_SIZE]; SCRATCH_COUNT],
    label: [u8; LABEL_SIZE],
}

const _: () = assert!(core::mem::size_of::<MfsState>() == MFS_CACHE_SIZE);

impl Default for MfsState {
    fn default() -> Self {
        Self::new()
    }
}

impl MfsState {
    /// Power-on state: disconnected, nothing open.
    pub const fn new() -> Self {
        Self {
            flags: MfsFlags::IDLE.bits(),
            io_data: 0,
            io_cmd: 0,
            truncation: 0,
            address: [0; 1 + LONG_SIZE],
            dir_index: 0,
            zero_long: [0; LONG_SIZE],
            scratch: [[0; LONG_SIZE]; SCRATCH_COUNT],
            label: [0; LABEL_SIZE],
        }
    }

    pub fn flags(&self) -> MfsFlags {
        MfsFlags::from_bits_truncate(self.flags)
    }

    pub fn set_flags(&mut self, flags: MfsFlags) {
        self.flags = flags.bits();
    }

    /// Command/data ports of the storage controller.
    pub fn ports(&self) -> SlotPorts {
        SlotPorts {
            cmd: self.io_cmd,
            data: self.io_data,
        }
    }

    pub fn set_ports(&mut self, ports: SlotPorts) {
        self.io_cmd = ports.cmd;
        self.io_data = ports.data;
    }

    pub fn current_block(&self) -> u64 {
        let mut raw = [0u8; LONG_SIZE];
        raw.copy_from_slice(&self.address[1..]);
        u64::from_le_bytes(raw)
    }

    pub fn current_offset(&self) -> u8 {
        self.address[0]
    }

    /// Full linear address of the current position.
    pub fn address(&self) -> u64 {
        compute_address(self.current_block(), self.current_offset())
    }

    /// Store a position as block and offset.
    pub fn set_address(&mut self, address: u64) {
        let (block, offset) = split_address(address);
        self.address[0] = offset;
        self.address[1..].copy_from_slice(&block.to_le_bytes());
    }

    /// The offset byte read as a 64-bit little-endian quantity. It runs on
    /// into the block number, so this is the linear address for any block
    /// below 2^56.
    pub fn linear_alias(&self) -> u64 {
        let mut raw = [0u8; LONG_SIZE];
        raw.copy_from_slice(&self.address[..LONG_SIZE]);
        u64::from_le_bytes(raw)
    }

    pub fn truncation(&self) -> u8 {
        self.truncation
    }

    pub fn set_truncation(&mut self, limit: u8) {
        self.truncation = limit;
    }

    pub fn dir_index(&self) -> u8 {
        self.dir_index
    }

    pub fn set_dir_index(&mut self, index: u8) {
        self.dir_index = index;
    }

    /// Constant zero operand.
    pub fn zero_long(&self) -> u64 {
        u64::from_le_bytes(self.zero_long)
    }

    pub fn scratch(&self, reg: usize) -> u64 {
        u64::from_le_bytes(self.scratch[reg])
    }

    pub fn set_scratch(&mut self, reg: usize, value: u64) {
        self.scratch[reg] = value.to_le_bytes();
    }

    /// Clear a scratch register from the zero long.
    pub fn clear_scratch(&mut self, reg: usize) {
        self.scratch[reg] = self.zero_long;
    }

    /// Label text up to the first NUL.
    pub fn label(&self) -> &str {
        let end = self.label.iter().position(|&b| b == 0).unwrap_or(LABEL_SIZE);
        std::str::from_utf8(&self.label[..end]).unwrap_or("")
    }

    /// Raw label buffer.
    pub fn label_bytes(&self) -> &[u8; LABEL_SIZE] {
        &self.label
    }

    /// Load a label from medium bytes; at most `LABEL_MAX` bytes are kept
    /// so the buffer stays NUL terminated.
    pub fn set_label(&mut self, raw: &[u8]) {
        self.label = [0; LABEL_SIZE];
        let len = raw
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(raw.len())
            .min(LABEL_MAX);
        self.label[..len].copy_from_slice(&raw[..len]);
    }

    /// Memory image of the record, lowest address first.
    pub fn to_bytes(&self) -> [u8; MFS_CACHE_SIZE] {
        let mut out = [0u8; MFS_CACHE_SIZE];
        out[0] = self.flags;
        out[1] = self.io_data;
        out[2] = self.io_cmd;
        out[3] = self.truncation;
        out[4..13].copy_from_slice(&self.address);
        out[13] = self.dir_index;
        out[14..22].copy_from_slice(&self.zero_long);
        for (i, reg) in self.scratch.iter().enumerate() {
            let at = 22 + i * LONG_SIZE;
            out[at..at + LONG_SIZE].copy_from_slice(reg);
        }
        out[54..].copy_from_slice(&self.label);
        out
    }
}
