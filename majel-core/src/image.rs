//! MajelFS medium formatter.
//!
//! Lays a volume out as: FS header in block 0, the directory control block
//! in block 1, then for every file its directory slot block followed by its
//! data blocks.

use crate::error::{MajelError, MajelResult};
use crate::mfs::address::BLOCK_SIZE;
use crate::mfs::layout::{
    encode_label, write_u64, DIR_SLOTS, FS_MAGIC, FS_VERSION, OFFSET_BLOCKCOUNT, OFFSET_DIRBLK,
    OFFSET_DIRLBL, OFFSET_DIRLEN, OFFSET_DIRS, OFFSET_FSDIRBLK, OFFSET_FSLBL, OFFSET_MAGIC,
    OFFSET_NXTBLK, OFFSET_VERSION, RECORD_FLAGS, RECORD_HEAD, RECORD_IN_USE, RECORD_LABEL,
};
use crate::mfs::state::LABEL_SIZE;

const CONTROL_BLOCK: u64 = 1;
const END_OF_CHAIN: u64 = u64::MAX;

#[derive(Debug, Clone)]
struct PendingFile {
    dir: String,
    name: String,
    data: Vec<u8>,
}

/// Builds a formatted medium image.
#[derive(Debug, Clone, Default)]
pub struct ImageBuilder {
    label: String,
    directories: Vec<String>,
    files: Vec<PendingFile>,
    min_blocks: u64,
}

impl ImageBuilder {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Self::default()
        }
    }

    /// Add a directory; slots are assigned in call order.
    pub fn directory(mut self, label: &str) -> Self {
        self.directories.push(label.to_string());
        self
    }

    /// Add a file to directory `dir`.
    pub fn file(mut self, dir: &str, name: &str, data: Vec<u8>) -> Self {
        self.files.push(PendingFile {
            dir: dir.to_string(),
            name: name.to_string(),
            data,
        });
        self
    }

    /// Pad the medium to at least `blocks` blocks.
    pub fn min_blocks(mut self, blocks: u64) -> Self {
        self.min_blocks = blocks;
        self
    }

    pub fn build(&self) -> MajelResult<Vec<u8>> {
        if self.directories.len() > DIR_SLOTS {
            return Err(MajelError::Image(format!(
                "{} directories requested, at most {} fit",
                self.directories.len(),
                DIR_SLOTS
            )));
        }
        let volume_label = label_field(&self.label)?;

        // Directory slot -> files in insertion order.
        let mut per_dir: Vec<Vec<&PendingFile>> = vec![Vec::new(); self.directories.len()];
        for (i, dir) in self.directories.iter().enumerate() {
            label_field(dir)?;
            if self.directories[..i]
                .iter()
                .any(|d| d.eq_ignore_ascii_case(dir))
            {
                return Err(MajelError::Image(format!("duplicate directory {:?}", dir)));
            }
        }
        for file in &self.files {
            label_field(&file.name)?;
            let slot = self
                .directories
                .iter()
                .position(|d| d.eq_ignore_ascii_case(&file.dir))
                .ok_or_else(|| MajelError::Image(format!("no directory {:?}", file.dir)))?;
            if per_dir[slot]
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(&file.name))
            {
                return Err(MajelError::Image(format!(
                    "duplicate file {:?} in {:?}",
                    file.name, file.dir
                )));
            }
            per_dir[slot].push(file);
        }

        // Allocate blocks: one slot block per file, then its data blocks.
        let mut next_free = CONTROL_BLOCK + 1;
        let mut placed: Vec<Vec<(u64, &PendingFile)>> = Vec::with_capacity(per_dir.len());
        for files in &per_dir {
            let mut chain = Vec::with_capacity(files.len());
            for &file in files {
                chain.push((next_free, file));
                next_free += 1 + data_blocks(file.data.len());
            }
            placed.push(chain);
        }
        let block_count = next_free.max(self.min_blocks);

        let size = usize::try_from(block_count)
            .ok()
            .and_then(|b| b.checked_mul(BLOCK_SIZE))
            .ok_or_else(|| MajelError::Image(format!("{} blocks do not fit", block_count)))?;
        let mut image = vec![0u8; size];

        let header = &mut image[..BLOCK_SIZE];
        header[OFFSET_MAGIC as usize..OFFSET_MAGIC as usize + FS_MAGIC.len()]
            .copy_from_slice(&FS_MAGIC);
        header[OFFSET_VERSION as usize] = FS_VERSION;
        write_u64(header, OFFSET_BLOCKCOUNT, block_count);
        write_u64(header, OFFSET_FSDIRBLK, CONTROL_BLOCK);
        put_label(header, OFFSET_FSLBL, &volume_label);

        for (slot, chain) in placed.iter().enumerate() {
            let control = block_mut(&mut image, CONTROL_BLOCK);
            let base = OFFSET_DIRS[slot] as usize;
            let record = &mut control[base..];
            record[RECORD_FLAGS as usize] = RECORD_IN_USE;
            put_label(record, RECORD_LABEL, &label_field(&self.directories[slot])?);
            let head = chain.first().map_or(0, |&(block, _)| block);
            write_u64(record, RECORD_HEAD, head);

            for (i, &(block, file)) in chain.iter().enumerate() {
                let next = chain.get(i + 1).map_or(END_OF_CHAIN, |&(b, _)| b);
                let entry = block_mut(&mut image, block);
                put_label(entry, OFFSET_DIRLBL, &label_field(&file.name)?);
                write_u64(entry, OFFSET_DIRBLK, block + 1);
                write_u64(entry, OFFSET_DIRLEN, file.data.len() as u64);
                write_u64(entry, OFFSET_NXTBLK, next);

                let start = (block as usize + 1) * BLOCK_SIZE;
                image[start..start + file.data.len()].copy_from_slice(&file.data);
            }
        }
        Ok(image)
    }
}

fn data_blocks(len: usize) -> u64 {
    len.div_ceil(BLOCK_SIZE) as u64
}

fn label_field(label: &str) -> MajelResult<[u8; LABEL_SIZE]> {
    encode_label(label).ok_or_else(|| MajelError::Image(format!("bad label {:?}", label)))
}

fn put_label(block: &mut [u8], offset: u8, label: &[u8; LABEL_SIZE]) {
    let at = offset as usize;
    block[at..at + LABEL_SIZE].copy_from_slice(label);
}

fn block_mut(image: &mut [u8], block: u64) -> &mut [u8] {
    let start = block as usize * BLOCK_SIZE;
    &mut image[start..start + BLOCK_SIZE]
}
