//! Base types for the structure of a message table resource.

use binrw::{binrw, BinRead, BinWrite};

/// Size of the block count preceding the block directory
pub const HEADER_SIZE: usize = 4;

/// Size of one [`ResourceBlock`]
pub const BLOCK_SIZE: usize = 12;

/// Size of the [`EntryHeader`] preceding each record's text
pub const ENTRY_HEADER_SIZE: usize = 4;

/// Message table resource header
///
/// The block count followed by that many block descriptors. All data is little endian.
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResourceHeader {
    #[bw(try_calc(u32::try_from(blocks.len())))]
    block_count: u32,

    /// Block directory, in declaration order
    #[br(count = block_count)]
    pub blocks: Vec<ResourceBlock>,
}

impl ResourceHeader {
    /// Create a header for the given blocks
    pub fn new(blocks: Vec<ResourceBlock>) -> Self {
        Self { blocks }
    }

    /// Size in bytes of the header and its block directory
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.blocks.len() * BLOCK_SIZE
    }
}

/// Message table block descriptor
///
/// Declares the inclusive identifier range `[low_id, high_id]` whose records start
/// `offset_to_entries` bytes from the start of the resource.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct ResourceBlock {
    /// First identifier in the block
    pub low_id: u32,

    /// Last identifier in the block
    pub high_id: u32,

    /// Offset from the start of the resource to the first record
    pub offset_to_entries: u32,
}

impl ResourceBlock {
    /// Number of records in the block
    pub fn record_count(&self) -> u64 {
        if self.high_id < self.low_id {
            return 0;
        }
        u64::from(self.high_id - self.low_id) + 1
    }
}

/// Message table record header
///
/// `length` counts the header, the text and any padding; the next record starts `length`
/// bytes after this one.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct EntryHeader {
    /// Size of the whole record in bytes
    pub length: u16,

    /// `0` for narrow text, `1` for wide text
    pub flags: u16,
}
