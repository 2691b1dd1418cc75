//! Fixed RAM windows for the driver records.
//!
//! The MFS state record and the IOTBL each live in a small window placed
//! directly below a configured top address, growing downward.

use crate::error::{MajelError, MajelResult};
use crate::ioseek::IOTBL_SIZE;
use crate::mfs::MFS_CACHE_SIZE;

/// Default top of the MFS state window.
pub const MFS_DEFAULT_TOP: u32 = 0x0100;
/// Default top of the IOTBL window.
pub const IOTBL_DEFAULT_TOP: u32 = 0x0200;
/// End of the 16-bit address space.
pub const ADDRESS_SPACE: u32 = 0x1_0000;

/// Half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: u32,
    pub end: u32,
}

impl Region {
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Place `size` bytes directly below `top`.
pub fn place(name: &'static str, top: u32, size: usize) -> MajelResult<Region> {
    if top > ADDRESS_SPACE || (size as u64) > top as u64 {
        return Err(MajelError::Window { name, size, top });
    }
    Ok(Region {
        start: top - size as u32,
        end: top,
    })
}

/// Where the driver records live in RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryPlan {
    pub mfs: Region,
    pub iotbl: Region,
}

impl MemoryPlan {
    pub fn new(mfs_top: u32, iotbl_top: u32) -> MajelResult<Self> {
        let mfs = place("MFS cache", mfs_top, MFS_CACHE_SIZE)?;
        let iotbl = place("IOTBL", iotbl_top, IOTBL_SIZE)?;
        if mfs.overlaps(&iotbl) {
            return Err(MajelError::Overlap(format!(
                "MFS cache {:#06X}..{:#06X} overlaps IOTBL {:#06X}..{:#06X}",
                mfs.start, mfs.end, iotbl.start, iotbl.end
            )));
        }
        Ok(Self { mfs, iotbl })
    }
}

impl Default for MemoryPlan {
    fn default() -> Self {
        Self {
            mfs: Region {
                start: MFS_DEFAULT_TOP - MFS_CACHE_SIZE as u32,
                end: MFS_DEFAULT_TOP,
            },
            iotbl: Region {
                start: IOTBL_DEFAULT_TOP - IOTBL_SIZE as u32,
                end: IOTBL_DEFAULT_TOP,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan() {
        let plan = MemoryPlan::default();
        assert_eq!(plan, MemoryPlan::new(MFS_DEFAULT_TOP, IOTBL_DEFAULT_TOP).unwrap());
        assert_eq!(plan.mfs.start, 0x00AA);
        assert_eq!(plan.mfs.len(), MFS_CACHE_SIZE);
        assert_eq!(plan.iotbl.start, 0x01F0);
    }

    #[test]
    fn test_window_too_low() {
        let err = MemoryPlan::new(0x0040, IOTBL_DEFAULT_TOP).unwrap_err();
        assert!(matches!(err, MajelError::Window { name: "MFS cache", .. }));
        assert!(place("X", ADDRESS_SPACE + 1, 1).is_err());
    }

    #[test]
    fn test_top_of_memory() {
        let region = place("IOTBL", ADDRESS_SPACE, IOTBL_SIZE).unwrap();
        assert_eq!(region.start, 0xFFF0);
        assert_eq!(region.end, ADDRESS_SPACE);
    }

    #[test]
    fn test_overlap_rejected() {
        let err = MemoryPlan::new(0x0100, 0x0100).unwrap_err();
        assert!(matches!(err, MajelError::Overlap(_)));
        assert!(MemoryPlan::new(0x0100, 0x0105).is_err());
        assert!(MemoryPlan::new(0x0100, 0x0110).is_ok());
        assert!(MemoryPlan::new(0x0100, 0x0200).is_ok());
    }
}
