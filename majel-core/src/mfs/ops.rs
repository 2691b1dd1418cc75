//! Handle operations: open, read, write and close.
//!
//! The driver has exactly one handle. A file handle streams between the
//! start and end addresses kept in the scratch registers; a directory handle
//! walks the entry chain with the cursor and step registers.

use super::address::{advance, compute_address, transferable};
use super::driver::Mfs;
use super::layout::{is_sentinel, DirEntry, FS_HEADER_BLOCK, OFFSET_BLOCKCOUNT};
use super::state::{
    MfsFlags, SCRATCH_COUNT, SCRATCH_CURSOR, SCRATCH_END, SCRATCH_START, SCRATCH_STEPS,
};
use crate::bus::Backplane;
use crate::error::{MfsError, MfsResult};

/// Access requested when opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    ReadWrite,
}

/// What to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenTarget<'a> {
    /// Directory slot in the control block.
    Directory(u8),
    /// Entry index in the selected directory.
    Entry(u32),
    /// `NAME` in the selected directory, or `DIR/NAME`. Labels match
    /// case-insensitively.
    Path(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    File,
    Directory,
}

/// Descriptor of the open handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub kind: HandleKind,
    pub label: String,
    /// File length in bytes; 0 for directories.
    pub length: u64,
}

impl Mfs {
    /// Open a file or directory as the single active handle.
    pub fn open<B: Backplane + ?Sized>(
        &mut self,
        bus: &mut B,
        target: OpenTarget<'_>,
        mode: OpenMode,
    ) -> MfsResult<Handle> {
        self.require_connected()?;
        if self.flags().has_handle() {
            return Err(MfsError::Connected);
        }
        let handle = self.guarded(bus, |mfs, bus| match target {
            OpenTarget::Directory(slot) => mfs.open_directory(bus, slot),
            OpenTarget::Entry(index) => {
                let entry = mfs.walk_directory(bus, index)?;
                Ok(mfs.open_entry(bus, &entry, mode))
            }
            OpenTarget::Path(path) => {
                let entry = mfs.resolve(bus, path)?;
                Ok(mfs.open_entry(bus, &entry, mode))
            }
        })?;
        if self.trace {
            eprintln!(
                "[MFS] Opened {:?} {:?} ({} bytes, {:?})",
                handle.kind, handle.label, handle.length, mode
            );
        }
        Ok(handle)
    }

    fn open_directory<B: Backplane + ?Sized>(
        &mut self,
        bus: &mut B,
        slot: u8,
    ) -> MfsResult<Handle> {
        let summary = self.select_directory(bus, slot)?;
        self.state.set_scratch(SCRATCH_CURSOR, summary.head);
        self.state.clear_scratch(SCRATCH_STEPS);
        self.state.set_flags(self.flags() - MfsFlags::IDLE | MfsFlags::DIR_OPEN);
        Ok(Handle {
            kind: HandleKind::Directory,
            label: summary.label,
            length: 0,
        })
    }

    fn open_entry<B: Backplane + ?Sized>(
        &mut self,
        bus: &mut B,
        entry: &DirEntry,
        mode: OpenMode,
    ) -> Handle {
        let start = compute_address(entry.data_block, 0);
        self.state.set_scratch(SCRATCH_START, start);
        self.state.set_scratch(SCRATCH_END, advance(start, entry.length));

        let mut flags = self.flags() - MfsFlags::IDLE | MfsFlags::FILE_OPEN;
        if mode == OpenMode::ReadWrite {
            flags |= MfsFlags::WRITABLE;
        }
        self.state.set_flags(flags);
        self.state.set_label(entry.label.as_bytes());
        self.goto(bus, start);

        Handle {
            kind: HandleKind::File,
            label: entry.label.clone(),
            length: entry.length,
        }
    }

    fn resolve<B: Backplane + ?Sized>(&mut self, bus: &mut B, path: &str) -> MfsResult<DirEntry> {
        let name = match path.split_once('/') {
            Some((dir, name)) => {
                let slot = self
                    .directories(bus)?
                    .into_iter()
                    .find(|d| d.label.eq_ignore_ascii_case(dir))
                    .map(|d| d.slot)
                    .ok_or(MfsError::NotFound)?;
                self.select_directory(bus, slot)?;
                name
            }
            None => path,
        };
        if name.is_empty() {
            return Err(MfsError::NotFound);
        }
        self.find_entry(bus, |entry| entry.label.eq_ignore_ascii_case(name))
    }

    /// Read from the open file. Returns the number of bytes read, 0 at the
    /// end of the file.
    pub fn read<B: Backplane + ?Sized>(&mut self, bus: &mut B, buf: &mut [u8]) -> MfsResult<usize> {
        self.require_file()?;
        let mut done = 0;
        while done < buf.len() {
            let chunk = self.next_chunk(buf.len() - done);
            if chunk == 0 {
                break;
            }
            self.stream_in(bus, &mut buf[done..done + chunk]);
            done += chunk;
        }
        Ok(done)
    }

    /// Write to the open file in place. Writing stops at the file end.
    pub fn write<B: Backplane + ?Sized>(&mut self, bus: &mut B, buf: &[u8]) -> MfsResult<usize> {
        self.require_file()?;
        if !self.flags().contains(MfsFlags::WRITABLE) {
            return Err(MfsError::NotFound);
        }
        let mut done = 0;
        while done < buf.len() {
            let chunk = self.next_chunk(buf.len() - done);
            if chunk == 0 {
                break;
            }
            self.stream_out(bus, &buf[done..done + chunk]);
            done += chunk;
        }
        Ok(done)
    }

    /// Largest transfer that stays inside both the current block and the file.
    /// Zero when the controller sits outside the file.
    fn next_chunk(&self, wanted: usize) -> usize {
        let Some(remaining) = self.remaining() else {
            return 0;
        };
        let in_block = transferable(self.state.current_offset(), self.state.truncation());
        let chunk = (in_block as u64).min(remaining).min(wanted as u64);
        chunk as usize
    }

    /// Bytes left between the controller address and the file end, or None
    /// if the address is not inside `[start, end)`.
    fn remaining(&self) -> Option<u64> {
        let address = self.state.address();
        let start = self.state.scratch(SCRATCH_START);
        let end = self.state.scratch(SCRATCH_END);
        if address < start || address >= end {
            return None;
        }
        Some(end - address)
    }

    /// Byte offset into the open file. Fails with `NotFound` after a raw
    /// `seek` has left the file.
    pub fn position(&self) -> MfsResult<u64> {
        self.require_file()?;
        let address = self.state.address();
        let start = self.state.scratch(SCRATCH_START);
        let end = self.state.scratch(SCRATCH_END);
        if address < start || address > end {
            return Err(MfsError::NotFound);
        }
        Ok(address - start)
    }

    /// Move within the open file, clamped to its length. Returns the new
    /// offset.
    pub fn set_position<B: Backplane + ?Sized>(&mut self, bus: &mut B, pos: u64) -> MfsResult<u64> {
        self.require_file()?;
        let start = self.state.scratch(SCRATCH_START);
        let length = self.state.scratch(SCRATCH_END).wrapping_sub(start);
        let pos = pos.min(length);
        self.goto(bus, advance(start, pos));
        Ok(pos)
    }

    /// Next entry of the open directory, or None past the last one.
    pub fn next_entry<B: Backplane + ?Sized>(
        &mut self,
        bus: &mut B,
    ) -> MfsResult<Option<DirEntry>> {
        self.require_connected()?;
        if !self.flags().contains(MfsFlags::DIR_OPEN) {
            return Err(MfsError::NotFound);
        }
        let block = self.state.scratch(SCRATCH_CURSOR);
        if is_sentinel(block) {
            return Ok(None);
        }
        let steps = self.state.scratch(SCRATCH_STEPS);
        let limit = self.read_long(bus, FS_HEADER_BLOCK, OFFSET_BLOCKCOUNT);
        let entry = self.chain_entry(bus, block, steps, limit)?;
        self.state.set_scratch(SCRATCH_CURSOR, entry.next);
        self.state.set_scratch(SCRATCH_STEPS, steps + 1);
        Ok(Some(entry))
    }

    /// Close the open handle, if any.
    pub fn close(&mut self) {
        if !self.flags().has_handle() {
            return;
        }
        let flags =
            self.flags() - (MfsFlags::FILE_OPEN | MfsFlags::WRITABLE | MfsFlags::DIR_OPEN);
        self.state.set_flags(flags | MfsFlags::IDLE);
        for reg in 0..SCRATCH_COUNT {
            self.state.clear_scratch(reg);
        }
        self.state.set_truncation(0);
        if self.trace {
            eprintln!("[MFS] Closed handle");
        }
    }

    fn require_file(&self) -> MfsResult<()> {
        self.require_connected()?;
        if self.flags().contains(MfsFlags::FILE_OPEN) {
            Ok(())
        } else {
            Err(MfsError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{slot_ports, Chassis};
    use crate::cards::SdCard;
    use crate::image::ImageBuilder;

    fn mounted(image: Vec<u8>) -> (Chassis, Mfs) {
        let mut chassis = Chassis::new();
        chassis.insert(0, Box::new(SdCard::new(image)));
        let mut mfs = Mfs::new();
        mfs.connect(&mut chassis, slot_ports(0).unwrap()).unwrap();
        (chassis, mfs)
    }

    fn sample() -> Vec<u8> {
        let big: Vec<u8> = (0..600u32).map(|i| (i % 253) as u8).collect();
        ImageBuilder::new("VOLUME")
            .directory("DOCS")
            .file("DOCS", "README", b"hello".to_vec())
            .file("DOCS", "BIG", big)
            .directory("BIN")
            .file("BIN", "EMPTY", Vec::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_open_by_path_and_read() {
        let (mut bus, mut mfs) = mounted(sample());
        let handle = mfs
            .open(&mut bus, OpenTarget::Path("docs/readme"), OpenMode::Read)
            .unwrap();
        assert_eq!(handle.kind, HandleKind::File);
        assert_eq!(handle.label, "README");
        assert_eq!(handle.length, 5);

        let mut buf = [0u8; 16];
        assert_eq!(mfs.read(&mut bus, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(mfs.read(&mut bus, &mut buf).unwrap(), 0);
        assert_eq!(mfs.position().unwrap(), 5);
    }

    #[test]
    fn test_read_spans_blocks() {
        let (mut bus, mut mfs) = mounted(sample());
        mfs.open(&mut bus, OpenTarget::Path("DOCS/BIG"), OpenMode::Read)
            .unwrap();

        let mut out = Vec::new();
        let mut buf = [0u8; 100];
        loop {
            let n = mfs.read(&mut bus, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        let expected: Vec<u8> = (0..600u32).map(|i| (i % 253) as u8).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_set_position_clamps() {
        let (mut bus, mut mfs) = mounted(sample());
        mfs.open(&mut bus, OpenTarget::Path("DOCS/BIG"), OpenMode::Read)
            .unwrap();
        assert_eq!(mfs.set_position(&mut bus, 300).unwrap(), 300);
        let mut byte = [0u8; 1];
        mfs.read(&mut bus, &mut byte).unwrap();
        assert_eq!(byte[0], (300 % 253) as u8);
        assert_eq!(mfs.set_position(&mut bus, 10_000).unwrap(), 600);
        assert_eq!(mfs.read(&mut bus, &mut byte).unwrap(), 0);
    }

    #[test]
    fn test_transfers_outside_file_move_nothing() {
        let (mut bus, mut mfs) = mounted(sample());
        mfs.open(&mut bus, OpenTarget::Path("DOCS/README"), OpenMode::ReadWrite)
            .unwrap();
        mfs.seek(&mut bus, 0).unwrap();

        assert_eq!(mfs.write(&mut bus, b"ZZZZ").unwrap(), 0);
        let mut buf = [0u8; 8];
        assert_eq!(mfs.read(&mut bus, &mut buf).unwrap(), 0);
        assert_eq!(mfs.position(), Err(MfsError::NotFound));
        let medium = bus.card(0).and_then(|c| c.medium()).unwrap();
        assert_eq!(&medium[..4], b"MJFS");

        assert_eq!(mfs.set_position(&mut bus, 0).unwrap(), 0);
        assert_eq!(mfs.read(&mut bus, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn test_write_in_place() {
        let (mut bus, mut mfs) = mounted(sample());
        mfs.open(&mut bus, OpenTarget::Path("DOCS/README"), OpenMode::ReadWrite)
            .unwrap();
        assert_eq!(mfs.write(&mut bus, b"JELLO, WORLD").unwrap(), 5);
        mfs.close();

        mfs.open(&mut bus, OpenTarget::Path("DOCS/README"), OpenMode::Read)
            .unwrap();
        let mut buf = [0u8; 5];
        mfs.read(&mut bus, &mut buf).unwrap();
        assert_eq!(&buf, b"JELLO");
    }

    #[test]
    fn test_write_requires_writable() {
        let (mut bus, mut mfs) = mounted(sample());
        mfs.open(&mut bus, OpenTarget::Path("DOCS/README"), OpenMode::Read)
            .unwrap();
        let before = *mfs.state();
        assert_eq!(mfs.write(&mut bus, b"x"), Err(MfsError::NotFound));
        assert_eq!(*mfs.state(), before);
    }

    #[test]
    fn test_second_open_rejected() {
        let (mut bus, mut mfs) = mounted(sample());
        mfs.open(&mut bus, OpenTarget::Entry(0), OpenMode::Read)
            .unwrap();
        let before = *mfs.state();
        assert_eq!(
            mfs.open(&mut bus, OpenTarget::Entry(1), OpenMode::Read),
            Err(MfsError::Connected)
        );
        assert_eq!(*mfs.state(), before);
    }

    #[test]
    fn test_failed_open_restores_state() {
        let (mut bus, mut mfs) = mounted(sample());
        let before = *mfs.state();
        assert_eq!(
            mfs.open(&mut bus, OpenTarget::Path("BIN/NOPE"), OpenMode::Read),
            Err(MfsError::NotFound)
        );
        assert_eq!(*mfs.state(), before);
        assert_eq!(mfs.state().dir_index(), 0);
    }

    #[test]
    fn test_directory_listing() {
        let (mut bus, mut mfs) = mounted(sample());
        let handle = mfs
            .open(&mut bus, OpenTarget::Directory(0), OpenMode::Read)
            .unwrap();
        assert_eq!(handle.kind, HandleKind::Directory);
        assert_eq!(handle.label, "DOCS");

        let mut names = Vec::new();
        while let Some(entry) = mfs.next_entry(&mut bus).unwrap() {
            names.push(entry.label);
        }
        assert_eq!(names, ["README", "BIG"]);
        assert_eq!(mfs.next_entry(&mut bus).unwrap(), None);
    }

    #[test]
    fn test_empty_file() {
        let (mut bus, mut mfs) = mounted(sample());
        let handle = mfs
            .open(&mut bus, OpenTarget::Path("BIN/EMPTY"), OpenMode::ReadWrite)
            .unwrap();
        assert_eq!(handle.length, 0);
        let mut buf = [0u8; 4];
        assert_eq!(mfs.read(&mut bus, &mut buf).unwrap(), 0);
        assert_eq!(mfs.write(&mut bus, b"abc").unwrap(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut bus, mut mfs) = mounted(sample());
        mfs.close();
        mfs.open(&mut bus, OpenTarget::Path("README"), OpenMode::ReadWrite)
            .unwrap();
        mfs.close();
        mfs.close();
        assert_eq!(mfs.flags(), MfsFlags::CONNECTED | MfsFlags::IDLE);
        assert_eq!(mfs.state().truncation(), 0);
        let mut buf = [0u8; 1];
        assert_eq!(mfs.read(&mut bus, &mut buf), Err(MfsError::NotFound));
    }

    #[test]
    fn test_ops_before_connect() {
        let mut bus = Chassis::new();
        let mut mfs = Mfs::new();
        assert_eq!(
            mfs.open(&mut bus, OpenTarget::Directory(0), OpenMode::Read),
            Err(MfsError::NoCard)
        );
        let mut buf = [0u8; 1];
        assert_eq!(mfs.read(&mut bus, &mut buf), Err(MfsError::NoCard));
    }
}
