//! Block/offset address arithmetic.
//!
//! A linear address is the block number shifted up by one byte with the
//! in-block offset in the low byte. Carrying out of the offset therefore
//! lands in the block number, which is how sequential transfers cross block
//! boundaries without separate carry handling.

/// Bytes per block.
pub const BLOCK_SIZE: usize = 256;

/// Bits of the offset within a linear address.
pub const BLOCK_SHIFT: u32 = 8;

/// Highest block number representable in a linear address.
pub const MAX_BLOCK: u64 = u64::MAX >> BLOCK_SHIFT;

/// Linear address of `offset` within `block`. Block bits above `MAX_BLOCK`
/// are shifted out.
pub const fn compute_address(block: u64, offset: u8) -> u64 {
    (block << BLOCK_SHIFT) | offset as u64
}

/// Split a linear address into block and offset.
pub const fn split_address(address: u64) -> (u64, u8) {
    (address >> BLOCK_SHIFT, address as u8)
}

/// Move an address forward, carrying out of the offset into the block.
pub const fn advance(address: u64, bytes: u64) -> u64 {
    address.wrapping_add(bytes)
}

/// Bytes transferable from `offset` before the next block boundary, given an
/// in-block limit (`0` means the whole block is usable).
pub fn transferable(offset: u8, limit: u8) -> usize {
    let limit = if limit == 0 {
        BLOCK_SIZE
    } else {
        limit as usize
    };
    limit.saturating_sub(offset as usize)
}

/// In-block limit for a position, given the exclusive end of the open
/// handle: the end's offset when the end falls inside the current block,
/// otherwise 0.
pub fn truncation_for(address: u64, end: u64) -> u8 {
    let (block, _) = split_address(address);
    let (end_block, end_offset) = split_address(end);
    if end_block == block {
        end_offset
    } else {
        0
    }
}
