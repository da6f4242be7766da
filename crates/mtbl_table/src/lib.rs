//! # Message Table Resource Documentation
//!
//! This crate decodes the **message table** resource (`RT_MESSAGETABLE`) found in Windows
//! executables and drivers into an in-memory table keyed by 32-bit message identifier. The same
//! layout is what the message compiler writes to its `MSG*.bin` outputs. Tables can be built and
//! edited in memory and encoded back into the resource layout.
//!
//! ## Resource Structure
//!
//! A resource consists of a block count, a directory of blocks, and the records those blocks
//! point at.
//!
//! | Offset (bytes) | Field                  | Description                                                |
//! |----------------|------------------------|------------------------------------------------------------|
//! | 0x0000         | Block Count            | 4 bytes: Number of blocks in the directory                 |
//! | 0x0004         | Blocks                 | (Block Count * 12) bytes: Block directory                  |
//!
//! ### Block
//!
//! Each block declares an inclusive range of identifiers whose records are stored back to back.
//!
//! | Offset (bytes) | Field                  | Description                                             |
//! |----------------|------------------------|---------------------------------------------------------|
//! | 0x0000         | Low ID                 | 4 bytes: First identifier in the block                  |
//! | 0x0004         | High ID                | 4 bytes: Last identifier in the block                   |
//! | 0x0008         | Offset                 | 4 bytes: Offset of the first record from resource start |
//!
//! ### Record
//!
//! | Offset (bytes) | Field                  | Description                                             |
//! |----------------|------------------------|---------------------------------------------------------|
//! | 0x0000         | Length                 | 2 bytes: Size of the record, header included            |
//! | 0x0002         | Flags                  | 2 bytes: `0` narrow text, `1` UTF-16LE text             |
//! | 0x0004         | Text                   | (Length - 4) bytes: Terminated text and padding         |
//!
//! ## Allocation
//!
//! Every allocation a table makes is first charged to a [`pool::Pool`]. The default
//! [`pool::PagedPool`] grants everything; [`pool::CountingPool`] tracks outstanding allocations
//! and can be capped to exercise out of memory paths.
//!
//! ## Additional Information
//!
//! - **File Extension**: `.bin` for message compiler output
//! - **Endianness**: Little-endian for all multi-byte integers
//!

pub mod entry;
pub mod error;
pub mod pool;
pub mod read;
pub mod store;
pub mod table;
pub mod types;
pub mod write;

#[cfg(feature = "serde")]
mod serde;

pub use entry::{Encoding, Entry, TextView};
pub use table::{Insertion, MessageTable};
pub use write::{MessageTableWriter, WriterOptions};
