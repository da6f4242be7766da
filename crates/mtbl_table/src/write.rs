//! Types for writing message table resources
//!

use binrw::BinWrite;
use bon::Builder;
use std::borrow::Cow;
use std::io::{Cursor, Write};
use tracing::{debug, instrument};

use crate::entry::{terminated_len, Encoding, Entry};
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::table::MessageTable;
use crate::types::{EntryHeader, ResourceBlock, ResourceHeader, ENTRY_HEADER_SIZE};

/// Which encoding records are written with
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EncodingPolicy {
    /// Each entry keeps the encoding it was inserted with
    #[default]
    Keep,

    /// Every entry is written as narrow text
    Narrow,

    /// Every entry is written as wide text
    Wide,
}

/// Options for how the resource should be written
#[derive(Debug, Clone, Copy, Builder)]
pub struct WriterOptions {
    /// Encoding of the written records
    #[builder(default)]
    pub encoding: EncodingPolicy,

    /// Append a terminator to every text.
    ///
    /// Records are always padded to a multiple of four bytes. Without a terminator, a text whose
    /// size is already a multiple of four cannot be decoded again.
    #[builder(default = true)]
    pub terminate: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

struct Record<'a> {
    id: u32,
    encoding: Encoding,
    text: Cow<'a, [u8]>,
    length: u16,
}

/// Message table resource generator
///
/// ```
/// # fn doit() -> mtbl_table::error::Result<()>
/// # {
/// use mtbl_table::write::{EncodingPolicy, MessageTableWriter, WriterOptions};
/// use mtbl_table::MessageTable;
///
/// let mut table = MessageTable::new()?;
/// table.insert_str(1, "Hello")?;
///
/// let writer = MessageTableWriter::new(
///     Vec::new(),
///     WriterOptions::builder().encoding(EncodingPolicy::Wide).build(),
/// );
/// let resource = writer.finish(&table)?;
///
/// let decoded = MessageTable::from_resource(&resource)?;
/// assert!(decoded.get(1).is_some_and(|e| e.is_wide()));
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
pub struct MessageTableWriter<W: Write> {
    inner: W,
    options: WriterOptions,
}

impl<W: Write> MessageTableWriter<W> {
    /// Create a writer emitting into `inner`.
    pub fn new(inner: W, options: WriterOptions) -> Self {
        Self { inner, options }
    }

    /// Encode `table` and return the underlying writer.
    ///
    /// Runs of consecutive identifiers share a block. Records follow the block directory in
    /// ascending identifier order.
    #[instrument(skip_all, fields(entries = table.len()), err)]
    pub fn finish<P: Pool>(mut self, table: &MessageTable<P>) -> Result<W> {
        let records = table
            .iter()
            .map(|entry| self.encode(entry))
            .collect::<Result<Vec<_>>>()?;

        let mut header = ResourceHeader::new(group_blocks(&records));
        let mut offset = header.size();
        let mut records_iter = records.iter();
        for block in header.blocks.iter_mut() {
            block.offset_to_entries = u32::try_from(offset)
                .map_err(|_| Error::CustomError("resource exceeds 4 GiB".into()))?;
            for record in records_iter.by_ref().take(block_len(block)) {
                offset += usize::from(record.length);
            }
            debug!(
                low = block.low_id,
                high = block.high_id,
                offset = block.offset_to_entries,
                "block"
            );
        }

        let mut out = Cursor::new(Vec::with_capacity(offset));
        header.write(&mut out)?;

        for record in &records {
            let header = EntryHeader {
                length: record.length,
                flags: record.encoding.flags(),
            };
            header.write(&mut out)?;
            out.write_all(&record.text)?;

            let padding = usize::from(record.length) - ENTRY_HEADER_SIZE - record.text.len();
            out.write_all(&[0u8; 8][..padding])?;
        }

        self.inner.write_all(out.get_ref())?;
        Ok(self.inner)
    }

    fn encode<'a>(&self, entry: &'a Entry) -> Result<Record<'a>> {
        let encoding = match self.options.encoding {
            EncodingPolicy::Keep => entry.encoding(),
            EncodingPolicy::Narrow => Encoding::Narrow,
            EncodingPolicy::Wide => Encoding::Wide,
        };

        let text: Cow<'a, [u8]> = match (entry.encoding(), encoding) {
            (from, to) if from == to => Cow::Borrowed(entry.bytes()),
            (_, Encoding::Narrow) => Cow::Owned(entry.to_string_lossy().into_bytes()),
            (_, Encoding::Wide) => Cow::Owned(
                entry
                    .to_string_lossy()
                    .encode_utf16()
                    .flat_map(u16::to_le_bytes)
                    .collect(),
            ),
        };

        if let Ok(position) = terminated_len(entry.id(), encoding, &text) {
            return Err(Error::CustomError(format!(
                "text for id {} has a terminator at byte {position} and would be cut short",
                entry.id()
            )));
        }

        let terminator = if self.options.terminate {
            encoding.unit_size()
        } else {
            0
        };
        let length = (ENTRY_HEADER_SIZE + text.len() + terminator).next_multiple_of(4);
        let length = u16::try_from(length).map_err(|_| {
            Error::CustomError(format!(
                "record for id {} is {length} bytes, more than a record can hold",
                entry.id()
            ))
        })?;

        Ok(Record {
            id: entry.id(),
            encoding,
            text,
            length,
        })
    }
}

fn block_len(block: &ResourceBlock) -> usize {
    usize::try_from(block.record_count()).unwrap_or(usize::MAX)
}

/// Group ascending identifiers into runs of consecutive values.
fn group_blocks(records: &[Record<'_>]) -> Vec<ResourceBlock> {
    let mut blocks: Vec<ResourceBlock> = Vec::new();

    for record in records {
        match blocks.last_mut() {
            Some(block) if block.high_id.checked_add(1) == Some(record.id) => {
                block.high_id = record.id;
            }
            _ => blocks.push(ResourceBlock {
                low_id: record.id,
                high_id: record.id,
                offset_to_entries: 0,
            }),
        }
    }

    blocks
}

impl<P: Pool> MessageTable<P> {
    /// Encode the table with the default [`WriterOptions`].
    pub fn to_resource(&self) -> Result<Vec<u8>> {
        MessageTableWriter::new(Vec::new(), WriterOptions::default()).finish(self)
    }
}
