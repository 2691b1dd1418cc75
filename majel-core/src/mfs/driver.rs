//! MajelFS driver core: connection, positioning and directory chains.

use super::address::{advance, compute_address, truncation_for, BLOCK_SIZE};
use super::layout::{
    decode_entry, decode_summary, is_sentinel, read_u64, DirEntry, DirSummary, DIR_SLOTS,
    FS_HEADER_BLOCK, FS_MAGIC, FS_VERSION, OFFSET_BLOCKCOUNT, OFFSET_FSDIRBLK, OFFSET_FSLBL,
    OFFSET_MAGIC, OFFSET_VERSION,
};
use super::state::{
    MfsFlags, MfsState, LABEL_SIZE, SCRATCH_CURSOR, SCRATCH_END, SCRATCH_STEPS,
};
use super::{CMD_OPEN, CMD_SETADDR, STATUS_READY};
use crate::bus::{slot_ports, Backplane, SlotPorts};
use crate::error::{MfsError, MfsResult};
use crate::ioseek::{IoTable, DID_STORAGE};

/// Ports of the first storage controller found by an IOSEEK scan.
pub fn storage_ports(table: &IoTable) -> MfsResult<SlotPorts> {
    table
        .lookup(DID_STORAGE as u16)
        .and_then(slot_ports)
        .ok_or(MfsError::NotFound)
}

/// MajelFS driver context.
///
/// Holds the single driver state record. Every operation takes the
/// backplane explicitly; the driver never owns hardware.
#[derive(Debug, Default)]
pub struct Mfs {
    pub(super) state: MfsState,
    /// Log protocol steps to stderr.
    pub trace: bool,
}

impl Mfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver state record.
    pub fn state(&self) -> &MfsState {
        &self.state
    }

    pub fn flags(&self) -> MfsFlags {
        self.state.flags()
    }

    pub fn is_connected(&self) -> bool {
        self.flags().contains(MfsFlags::CONNECTED)
    }

    /// Most recently loaded volume or directory label.
    pub fn label(&self) -> &str {
        self.state.label()
    }

    /// Connect to the storage controller on `ports` and validate the medium.
    pub fn connect<B: Backplane + ?Sized>(
        &mut self,
        bus: &mut B,
        ports: SlotPorts,
    ) -> MfsResult<()> {
        if self.is_connected() {
            return Err(MfsError::Connected);
        }
        self.guarded(bus, |mfs, bus| mfs.attach(bus, ports))
    }

    fn attach<B: Backplane + ?Sized>(&mut self, bus: &mut B, ports: SlotPorts) -> MfsResult<()> {
        self.state.set_ports(ports);

        bus.output(ports.cmd, CMD_OPEN);
        let status = bus.input(ports.data);
        if status != STATUS_READY {
            if self.trace {
                eprintln!(
                    "[MFS] No card on {:#04X}/{:#04X} (status {:#04X})",
                    ports.cmd, ports.data, status
                );
            }
            return Err(MfsError::NoCard);
        }

        let header = self.read_block(bus, FS_HEADER_BLOCK);
        let magic = OFFSET_MAGIC as usize;
        if header[magic..magic + FS_MAGIC.len()] != FS_MAGIC {
            return Err(MfsError::NoFormat);
        }
        let version = header[OFFSET_VERSION as usize];
        if version != FS_VERSION {
            if self.trace {
                eprintln!("[MFS] Unsupported version {}", version);
            }
            return Err(MfsError::BadVersion);
        }

        let lbl = OFFSET_FSLBL as usize;
        self.state.set_label(&header[lbl..lbl + LABEL_SIZE]);
        self.state.set_dir_index(0);
        self.state.set_flags(MfsFlags::CONNECTED | MfsFlags::IDLE);
        self.goto(bus, compute_address(FS_HEADER_BLOCK, 0));

        if self.trace {
            eprintln!(
                "[MFS] Connected on {:#04X}/{:#04X}, label {:?}",
                ports.cmd,
                ports.data,
                self.state.label()
            );
        }
        Ok(())
    }

    /// Drop the connection and reinitialise the state record.
    pub fn disconnect(&mut self) {
        if self.trace && self.is_connected() {
            eprintln!("[MFS] Disconnected");
        }
        self.state = MfsState::new();
    }

    /// Move the controller to a linear address.
    pub fn seek<B: Backplane + ?Sized>(&mut self, bus: &mut B, address: u64) -> MfsResult<()> {
        self.require_connected()?;
        self.goto(bus, address);
        Ok(())
    }

    /// Current position as `(block, offset)`.
    pub fn tell(&self) -> (u64, u8) {
        (self.state.current_block(), self.state.current_offset())
    }

    /// Total blocks on the medium according to the FS header. The driver
    /// position is unchanged.
    pub fn block_count<B: Backplane + ?Sized>(&mut self, bus: &mut B) -> MfsResult<u64> {
        self.require_connected()?;
        Ok(self.preserving(bus, |mfs, bus| {
            mfs.read_long(bus, FS_HEADER_BLOCK, OFFSET_BLOCKCOUNT)
        }))
    }

    /// Directories present in the control block. The driver position is
    /// unchanged.
    pub fn directories<B: Backplane + ?Sized>(
        &mut self,
        bus: &mut B,
    ) -> MfsResult<Vec<DirSummary>> {
        self.require_connected()?;
        let control = self.preserving(bus, |mfs, bus| mfs.control_block(bus));
        Ok((0..DIR_SLOTS as u8)
            .filter_map(|slot| decode_summary(slot, &control))
            .collect())
    }

    /// Make directory `slot` current and load its label.
    pub fn select_directory<B: Backplane + ?Sized>(
        &mut self,
        bus: &mut B,
        slot: u8,
    ) -> MfsResult<DirSummary> {
        self.require_connected()?;
        if self.flags().has_handle() {
            return Err(MfsError::Connected);
        }
        let summary = self.summary(bus, slot)?;
        self.state.set_dir_index(slot);
        self.state.set_label(summary.label.as_bytes());
        Ok(summary)
    }

    /// Entry `index` of the current directory.
    ///
    /// The chain is followed through the next-block pointers and is bounded
    /// by the medium's block count, so a looping chain fails with
    /// `NotFound` instead of spinning. The driver position is unchanged.
    pub fn walk_directory<B: Backplane + ?Sized>(
        &mut self,
        bus: &mut B,
        index: u32,
    ) -> MfsResult<DirEntry> {
        self.require_connected()?;
        self.preserving(bus, |mfs, bus| {
            mfs.find_entry(bus, |entry| entry.index == index)
        })
    }

    /// First entry of the current directory matching `pred`.
    pub(super) fn find_entry<B, F>(&mut self, bus: &mut B, mut pred: F) -> MfsResult<DirEntry>
    where
        B: Backplane + ?Sized,
        F: FnMut(&DirEntry) -> bool,
    {
        let limit = self.read_long(bus, FS_HEADER_BLOCK, OFFSET_BLOCKCOUNT);
        let slot = self.state.dir_index();
        let summary = self.summary(bus, slot)?;
        self.state.set_scratch(SCRATCH_CURSOR, summary.head);
        self.state.clear_scratch(SCRATCH_STEPS);
        loop {
            let block = self.state.scratch(SCRATCH_CURSOR);
            let steps = self.state.scratch(SCRATCH_STEPS);
            let entry = self.chain_entry(bus, block, steps, limit)?;
            if pred(&entry) {
                return Ok(entry);
            }
            self.state.set_scratch(SCRATCH_CURSOR, entry.next);
            self.state.set_scratch(SCRATCH_STEPS, steps + 1);
        }
    }

    /// Load the chain entry at `block` reached after `steps` hops.
    pub(super) fn chain_entry<B: Backplane + ?Sized>(
        &mut self,
        bus: &mut B,
        block: u64,
        steps: u64,
        limit: u64,
    ) -> MfsResult<DirEntry> {
        if is_sentinel(block) {
            return Err(MfsError::NotFound);
        }
        if block >= limit || steps >= limit {
            if self.trace {
                eprintln!(
                    "[MFS] Broken chain at block {} after {} step(s)",
                    block, steps
                );
            }
            return Err(MfsError::NotFound);
        }
        let raw = self.read_block(bus, block);
        Ok(decode_entry(steps as u32, block, &raw))
    }

    pub(super) fn require_connected(&self) -> MfsResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MfsError::NoCard)
        }
    }

    /// Run `op`, putting the state record (and the controller position)
    /// back the way it was if it fails.
    pub(super) fn guarded<B, T, F>(&mut self, bus: &mut B, op: F) -> MfsResult<T>
    where
        B: Backplane + ?Sized,
        F: FnOnce(&mut Self, &mut B) -> MfsResult<T>,
    {
        let saved = self.state;
        let result = op(self, bus);
        if result.is_err() {
            self.restore(bus, saved);
        }
        result
    }

    /// Run `op` for its result only; the state record and the controller
    /// position are put back afterwards.
    fn preserving<B, T, F>(&mut self, bus: &mut B, op: F) -> T
    where
        B: Backplane + ?Sized,
        F: FnOnce(&mut Self, &mut B) -> T,
    {
        let saved = self.state;
        let result = op(self, bus);
        self.restore(bus, saved);
        result
    }

    fn restore<B: Backplane + ?Sized>(&mut self, bus: &mut B, saved: MfsState) {
        self.state = saved;
        if self.is_connected() {
            self.goto(bus, saved.address());
        }
    }

    pub(super) fn summary<B: Backplane + ?Sized>(
        &mut self,
        bus: &mut B,
        slot: u8,
    ) -> MfsResult<DirSummary> {
        if slot as usize >= DIR_SLOTS {
            return Err(MfsError::NotFound);
        }
        let control = self.control_block(bus);
        decode_summary(slot, &control).ok_or(MfsError::NotFound)
    }

    fn control_block<B: Backplane + ?Sized>(&mut self, bus: &mut B) -> [u8; BLOCK_SIZE] {
        let block = self.read_long(bus, FS_HEADER_BLOCK, OFFSET_FSDIRBLK);
        self.read_block(bus, block)
    }

    /// Point the controller at `address` (SETADDR + 8 address bytes).
    pub(super) fn goto<B: Backplane + ?Sized>(&mut self, bus: &mut B, address: u64) {
        self.state.set_address(address);
        self.refresh_truncation();
        let ports = self.state.ports();
        bus.output(ports.cmd, CMD_SETADDR);
        for byte in address.to_le_bytes() {
            bus.output(ports.data, byte);
        }
    }

    /// Stream bytes in from the current position.
    pub(super) fn stream_in<B: Backplane + ?Sized>(&mut self, bus: &mut B, buf: &mut [u8]) {
        let data = self.state.ports().data;
        for byte in buf.iter_mut() {
            *byte = bus.input(data);
        }
        self.moved(buf.len());
    }

    /// Stream bytes out at the current position.
    pub(super) fn stream_out<B: Backplane + ?Sized>(&mut self, bus: &mut B, buf: &[u8]) {
        let data = self.state.ports().data;
        for &byte in buf {
            bus.output(data, byte);
        }
        self.moved(buf.len());
    }

    fn moved(&mut self, bytes: usize) {
        let address = advance(self.state.address(), bytes as u64);
        self.state.set_address(address);
        self.refresh_truncation();
    }

    pub(super) fn refresh_truncation(&mut self) {
        let limit = if self.flags().contains(MfsFlags::FILE_OPEN) {
            truncation_for(self.state.address(), self.state.scratch(SCRATCH_END))
        } else {
            0
        };
        self.state.set_truncation(limit);
    }

    pub(super) fn read_block<B: Backplane + ?Sized>(
        &mut self,
        bus: &mut B,
        block: u64,
    ) -> [u8; BLOCK_SIZE] {
        let mut raw = [0u8; BLOCK_SIZE];
        self.goto(bus, compute_address(block, 0));
        self.stream_in(bus, &mut raw);
        raw
    }

    pub(super) fn read_long<B: Backplane + ?Sized>(
        &mut self,
        bus: &mut B,
        block: u64,
        offset: u8,
    ) -> u64 {
        let mut raw = [0u8; 8];
        self.goto(bus, compute_address(block, offset));
        self.stream_in(bus, &mut raw);
        read_u64(&raw, 0)
    }
}
