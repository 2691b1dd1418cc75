//! Majel-1 Storage Stack Core
//!
//! This crate provides the storage-side firmware components of the Majel-1
//! and the emulated hardware they run against:
//! - IOSEEK: backplane scan building the I/O device table
//! - MajelFS (MFS): block file system driver over the SD card interface
//! - Emulated backplane, cards and a Z80 machine harness
//!
//! # Architecture
//!
//! The driver side never owns hardware:
//! - `Backplane` trait: port-level I/O (`output`/`input`)
//! - `Card` trait: the device behind one slot
//! - `Ioseek`: scans a backplane into an `IoTable`
//! - `Mfs`: single-context file system driver over one storage slot
//! - `Machine`: integrates a Z80 CPU with a `Chassis` as its I/O space

pub mod bus;
pub mod cards;
pub mod console;
pub mod error;
pub mod image;
pub mod ioseek;
pub mod machine;
pub mod memory;
pub mod mfs;
pub mod package;

pub use bus::{slot_ports, Backplane, Card, Chassis, SlotPorts};
pub use cards::{SdCard, SerialCard, StubCard};
pub use console::{HeadlessConsole, SerialConsole};
pub use error::{MajelError, MajelResult, MfsError, MfsResult};
pub use image::ImageBuilder;
pub use ioseek::{IoTable, Ioseek};
pub use machine::Machine;
pub use memory::{MemoryPlan, Region};
pub use mfs::{
    compute_address, split_address, storage_ports, DirEntry, DirSummary, Handle, HandleKind,
    Mfs, MfsFlags, MfsState, OpenMode, OpenTarget,
};
pub use package::{
    load_chassis, load_chassis_from_path, CardKind, ChassisManifest, LoadedChassis, SlotEntry,
};

/// Reason the machine stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    /// CPU halted
    Halt,
    /// T-state budget used up
    Limit,
}

/// Information about a machine run.
#[derive(Debug, Clone)]
pub struct ExitInfo {
    pub reason: ExitReason,
    pub t_states: u64,
    pub pc: u16,
}
