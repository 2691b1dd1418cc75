//! MajelFS: block-structured file system over an SD card interface.
//!
//! The driver is built to run from a tiny fixed window above the stack:
//! - `state`: the packed driver state record and its flags
//! - `address`: block/offset address arithmetic
//! - `layout`: on-medium offsets and record decoding
//! - `driver`: connection, positioning and directory chains
//! - `ops`: open/read/write/close on the single active handle

pub mod address;
mod driver;
pub mod layout;
mod ops;
pub mod state;

pub use address::{advance, compute_address, split_address, BLOCK_SIZE, MAX_BLOCK};
pub use driver::{storage_ports, Mfs};
pub use layout::{DirEntry, DirSummary};
pub use ops::{Handle, HandleKind, OpenMode, OpenTarget};
pub use state::{MfsFlags, MfsState, MFS_CACHE_SIZE};

/// SD card open command.
pub const CMD_OPEN: u8 = 0x00;
/// SD card set full 64-bit address.
pub const CMD_SETADDR: u8 = 0x04;

/// OPEN status: medium inserted and ready.
pub const STATUS_READY: u8 = 0x00;
/// OPEN status: no medium in the card.
pub const STATUS_NO_MEDIUM: u8 = 0x01;
