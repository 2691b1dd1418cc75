//! On-medium layout of MajelFS.
//!
//! All multi-byte numbers are little-endian.
//!
//! FS header (block 0):
//! - 0x00: magic "MJFS"
//! - 0x04: version
//! - 0x10: total block count
//! - 0x18: directory control block
//! - 0x40: volume label (32 bytes, NUL padded)
//!
//! Directory control block: three 82-byte summary records at 0x02, 0x54 and
//! 0xA6. Each record holds an in-use flag, the directory label and the
//! first entry block of the directory's chain.
//!
//! Directory slot block (one per entry):
//! - 0x00: entry label
//! - 0x20: sub-block (first data block)
//! - 0x28: length in bytes
//! - 0xF8: next block in the chain

use super::address::BLOCK_SIZE;
use super::state::{LABEL_MAX, LABEL_SIZE};

/// FS header magic.
pub const FS_MAGIC: [u8; 4] = *b"MJFS";
/// Only supported layout version.
pub const FS_VERSION: u8 = 1;
/// Block holding the FS header.
pub const FS_HEADER_BLOCK: u64 = 0;

pub const OFFSET_MAGIC: u8 = 0x00;
pub const OFFSET_VERSION: u8 = 0x04;
pub const OFFSET_BLOCKCOUNT: u8 = 0x10;
pub const OFFSET_FSDIRBLK: u8 = 0x18;
pub const OFFSET_FSLBL: u8 = 0x40;

/// Summary record offsets in the control block, stride 2 + 80.
pub const OFFSET_DIRS: [u8; DIR_SLOTS] = [0x02, 0x54, 0xA6];
pub const DIR_SLOTS: usize = 3;
pub const DIR_RECORD_SIZE: usize = 0x52;
/// Record fields, relative to the record start.
pub const RECORD_FLAGS: u8 = 0x00;
pub const RECORD_LABEL: u8 = 0x02;
pub const RECORD_HEAD: u8 = 0x22;
/// Record flag: slot holds a directory.
pub const RECORD_IN_USE: u8 = 0x01;

pub const OFFSET_DIRLBL: u8 = 0x00;
pub const OFFSET_DIRBLK: u8 = 0x20;
pub const OFFSET_DIRLEN: u8 = 0x28;
pub const OFFSET_NXTBLK: u8 = 0xF8;

/// Whether a chain pointer ends the chain.
pub fn is_sentinel(block: u64) -> bool {
    block == 0 || block == u64::MAX
}

/// One directory summary from the control block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSummary {
    pub slot: u8,
    pub label: String,
    pub head: u64,
}

/// One entry of a directory chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Position in the chain.
    pub index: u32,
    /// Block holding the entry.
    pub block: u64,
    pub label: String,
    /// First data block.
    pub data_block: u64,
    /// Length in bytes.
    pub length: u64,
    /// Next entry block (sentinel at the end).
    pub next: u64,
}

/// Label text from a raw, NUL padded field.
pub fn label_str(raw: &[u8]) -> String {
    let end = raw
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(raw.len())
        .min(LABEL_MAX);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Encode a label into a NUL padded field. Returns None if it does not fit.
pub fn encode_label(label: &str) -> Option<[u8; LABEL_SIZE]> {
    let bytes = label.as_bytes();
    if bytes.len() > LABEL_MAX || bytes.contains(&0) {
        return None;
    }
    let mut out = [0u8; LABEL_SIZE];
    out[..bytes.len()].copy_from_slice(bytes);
    Some(out)
}

pub(crate) fn read_u64(block: &[u8], offset: u8) -> u64 {
    let at = offset as usize;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&block[at..at + 8]);
    u64::from_le_bytes(raw)
}

pub(crate) fn write_u64(block: &mut [u8], offset: u8, value: u64) {
    let at = offset as usize;
    block[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// Decode an entry from its directory slot block.
pub fn decode_entry(index: u32, block_no: u64, block: &[u8; BLOCK_SIZE]) -> DirEntry {
    let lbl = OFFSET_DIRLBL as usize;
    DirEntry {
        index,
        block: block_no,
        label: label_str(&block[lbl..lbl + LABEL_SIZE]),
        data_block: read_u64(block, OFFSET_DIRBLK),
        length: read_u64(block, OFFSET_DIRLEN),
        next: read_u64(block, OFFSET_NXTBLK),
    }
}

/// Decode summary record `slot` from a control block. None if unused.
pub fn decode_summary(slot: u8, control: &[u8; BLOCK_SIZE]) -> Option<DirSummary> {
    let base = *OFFSET_DIRS.get(slot as usize)? as usize;
    let record = &control[base..base + DIR_RECORD_SIZE];
    if record[RECORD_FLAGS as usize] & RECORD_IN_USE == 0 {
        return None;
    }
    let lbl = RECORD_LABEL as usize;
    Some(DirSummary {
        slot,
        label: label_str(&record[lbl..lbl + LABEL_SIZE]),
        head: read_u64(record, RECORD_HEAD),
    })
}
