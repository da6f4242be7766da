//! Types for decoding message table resources
//!

use binrw::BinRead;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use tracing::{debug, instrument, trace};

use crate::{
    entry::{terminated_len, Encoding, TextView},
    error::{CorruptDataError, Error, InvalidArgumentError, Result},
    pool::{PagedPool, Pool},
    table::MessageTable,
    types::{EntryHeader, ResourceHeader, BLOCK_SIZE, ENTRY_HEADER_SIZE, HEADER_SIZE},
};

/// One undecoded record
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct RawRecord<'a> {
    /// Encoding flags as stored
    pub flags: u16,

    /// Everything after the record header, terminator and padding included
    pub text: &'a [u8],
}

/// Walks the records of one block.
///
/// Each step reads a record header and moves forward by the length it declares. Every step is
/// checked against the end of the resource; nothing past it is ever read.
pub(crate) struct RecordCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> RecordCursor<'a> {
    pub fn new(data: &'a [u8], block: u32, offset: u32) -> Result<Self> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start < data.len())
            .ok_or(CorruptDataError::BlockOutOfBounds { block, offset })?;

        Ok(Self {
            data,
            offset: start,
        })
    }

    /// Offset of the next record from the start of the resource
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Read the record for `id` and step past it.
    pub fn next_record(&mut self, id: u32) -> Result<RawRecord<'a>> {
        let offset = self.offset;
        let rest = self
            .data
            .get(offset..)
            .ok_or(CorruptDataError::TruncatedRecord { id, offset })?;

        let header = EntryHeader::read(&mut Cursor::new(rest))
            .map_err(|_| Error::from(CorruptDataError::TruncatedRecord { id, offset }))?;

        let length = usize::from(header.length);
        if length < ENTRY_HEADER_SIZE {
            return Err(CorruptDataError::RecordTooShort {
                id,
                length: header.length,
            }
            .into());
        }

        let record = rest
            .get(..length)
            .ok_or(CorruptDataError::RecordOutOfBounds {
                id,
                offset,
                length: header.length,
            })?;

        self.offset += length;

        Ok(RawRecord {
            flags: header.flags,
            text: &record[ENTRY_HEADER_SIZE..],
        })
    }
}

/// Read the block directory, refusing counts the resource cannot hold.
fn read_header(data: &[u8]) -> Result<ResourceHeader> {
    let mut reader = Cursor::new(data);

    let count = reader
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::from(CorruptDataError::TruncatedHeader))?;

    let capacity = (data.len() - HEADER_SIZE) / BLOCK_SIZE;
    if usize::try_from(count).map_or(true, |count| count > capacity) {
        return Err(CorruptDataError::TooManyBlocks { count }.into());
    }

    reader.set_position(0);
    ResourceHeader::read(&mut reader).map_err(|_| Error::from(CorruptDataError::TruncatedHeader))
}

impl MessageTable<PagedPool> {
    /// Decode a raw message table resource into a new table on the default pool.
    ///
    /// ```
    /// use mtbl_table::MessageTable;
    ///
    /// #[rustfmt::skip]
    /// let resource = [
    ///     0x01, 0x00, 0x00, 0x00,
    ///     0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
    ///     0x0C, 0x00, 0x00, 0x00, b'H', b'e', b'l', b'l', b'o', b'\r', b'\n', 0x00,
    /// ];
    ///
    /// let table = MessageTable::from_resource(&resource)?;
    /// assert_eq!(table.get(1).map(|e| e.bytes()), Some(&b"Hello\r\n"[..]));
    /// # Ok::<(), mtbl_table::error::Error>(())
    /// ```
    pub fn from_resource(data: &[u8]) -> Result<Self> {
        Self::from_resource_in(data, PagedPool::default())
    }
}

impl<P: Pool> MessageTable<P> {
    /// Decode a raw message table resource into a new table charged to `pool`.
    ///
    /// Construction is all or nothing: on any failure the partially filled table is destroyed
    /// before the error is returned.
    #[instrument(skip_all, fields(len = data.len()), err)]
    pub fn from_resource_in(data: &[u8], pool: P) -> Result<Self> {
        if data.is_empty() {
            return Err(InvalidArgumentError::EmptyBuffer.into());
        }

        let header = read_header(data)?;
        let mut table = MessageTable::new_in(pool)?;

        match table.decode_blocks(data, &header) {
            Ok(()) => Ok(table),
            Err(e) => {
                table.destroy();
                Err(e)
            }
        }
    }

    fn decode_blocks(&mut self, data: &[u8], header: &ResourceHeader) -> Result<()> {
        for (block, range) in (0u32..).zip(header.blocks.iter()) {
            debug!(
                block,
                low = range.low_id,
                high = range.high_id,
                offset = range.offset_to_entries,
                "decoding block"
            );

            if range.record_count() == 0 {
                continue;
            }

            let mut cursor = RecordCursor::new(data, block, range.offset_to_entries)?;
            for id in range.low_id..=range.high_id {
                let offset = cursor.offset();
                let record = cursor.next_record(id)?;

                let encoding = Encoding::try_from(record.flags)
                    .map_err(|flags| CorruptDataError::UnknownEncoding { id, flags })?;
                let length = terminated_len(id, encoding, record.text)?;
                trace!(id, offset, %encoding, length, "decoded record");

                let view = TextView::from_parts(Some(record.text), length, record.text.len());
                match encoding {
                    Encoding::Narrow => self.insert_narrow(id, &view)?,
                    Encoding::Wide => self.insert_wide(id, &view)?,
                };
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use crate::entry::Encoding;
    use crate::error::{CorruptDataError, Error, InvalidArgumentError, Result};
    use crate::pool::CountingPool;
    use crate::read::{read_header, RawRecord, RecordCursor};
    use crate::table::MessageTable;

    fn corrupt<T: std::fmt::Debug>(result: Result<T>) -> CorruptDataError {
        match result {
            Err(Error::CorruptData(e)) => e,
            other => panic!("expected corrupt data, got {other:?}"),
        }
    }

    #[traced_test]
    #[test]
    fn read_single_narrow_entry() -> Result<()> {
        #[rustfmt::skip]
        let input = [
            // Header
            0x01, 0x00, 0x00, 0x00,
            // Block [1, 1] at 0x10
            0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
            // Record (12)
            0x0C, 0x00, 0x00, 0x00, 0x48, 0x65, 0x6C, 0x6C, 0x6F, 0x0D, 0x0A, 0x00,
        ];

        let table = MessageTable::from_resource(&input)?;
        assert_eq!(table.len(), 1);

        let entry = table.get(1).ok_or(Error::CustomError("missing".into()))?;
        assert_eq!(entry.encoding(), Encoding::Narrow);
        assert_eq!(entry.bytes(), b"Hello\r\n");

        Ok(())
    }

    #[traced_test]
    #[test]
    fn read_multiple_blocks() -> Result<()> {
        #[rustfmt::skip]
        let input = [
            // Header
            0x02, 0x00, 0x00, 0x00,
            // Block [1, 2] at 0x1C
            0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x1C, 0x00, 0x00, 0x00,
            // Block [10, 10] at 0x30
            0x0A, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x30, 0x00, 0x00, 0x00,
            // Record 1, narrow (8)
            0x08, 0x00, 0x00, 0x00, 0x4F, 0x6E, 0x65, 0x00,
            // Record 2, wide (12)
            0x0C, 0x00, 0x01, 0x00, 0x54, 0x00, 0x77, 0x00, 0x6F, 0x00, 0x00, 0x00,
            // Record 10, narrow (8)
            0x08, 0x00, 0x00, 0x00, 0x54, 0x65, 0x6E, 0x00,
        ];

        let table = MessageTable::from_resource(&input)?;

        assert_eq!(table.ids().collect::<Vec<_>>(), vec![1, 2, 10]);
        assert_eq!(
            table
                .iter()
                .map(|e| (e.encoding(), e.to_string_lossy()))
                .collect::<Vec<_>>(),
            vec![
                (Encoding::Narrow, "One".to_string()),
                (Encoding::Wide, "Two".to_string()),
                (Encoding::Narrow, "Ten".to_string()),
            ]
        );

        Ok(())
    }

    #[traced_test]
    #[test]
    fn corrupt_encoding_releases_partial_table() {
        #[rustfmt::skip]
        let input = [
            0x01, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
            // Record 1, valid
            0x08, 0x00, 0x00, 0x00, 0x4F, 0x6B, 0x00, 0x00,
            // Record 2, flags 2
            0x08, 0x00, 0x02, 0x00, 0x58, 0x78, 0x00, 0x00,
        ];

        let pool = CountingPool::new();
        let baseline = pool.outstanding();

        let result = MessageTable::from_resource_in(&input, &pool);
        assert_eq!(
            corrupt(result),
            CorruptDataError::UnknownEncoding { id: 2, flags: 2 }
        );

        // the first record was inserted before the failure
        assert!(pool.granted() > 1);
        assert_eq!(pool.outstanding(), baseline);
        assert_eq!(pool.outstanding_bytes(), 0);
    }

    #[traced_test]
    #[test]
    fn refused_allocation_at_any_point_releases_partial_table() -> Result<()> {
        #[rustfmt::skip]
        let input = [
            0x02, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x1C, 0x00, 0x00, 0x00,
            0x0A, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x30, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x00, 0x00, 0x4F, 0x6E, 0x65, 0x00,
            0x0C, 0x00, 0x01, 0x00, 0x54, 0x00, 0x77, 0x00, 0x6F, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x00, 0x00, 0x54, 0x65, 0x6E, 0x00,
        ];

        let pool = CountingPool::new();
        MessageTable::from_resource_in(&input, &pool)?.destroy();
        let needed = pool.granted();
        // control structure, then a payload and a node per record
        assert_eq!(needed, 1 + 2 * 3);

        for limit in 0..needed {
            let pool = CountingPool::with_limit(limit);
            let result = MessageTable::from_resource_in(&input, &pool);

            assert!(
                matches!(result, Err(Error::OutOfMemory)),
                "limit {limit} gave {result:?}"
            );
            assert_eq!(pool.outstanding(), 0, "leak with limit {limit}");
            assert_eq!(pool.outstanding_bytes(), 0, "leak with limit {limit}");
        }

        let pool = CountingPool::with_limit(needed);
        assert_eq!(MessageTable::from_resource_in(&input, &pool)?.len(), 3);

        Ok(())
    }

    #[test]
    fn zero_length_record_is_corrupt() {
        #[rustfmt::skip]
        let input = [
            0x01, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x41, 0x00, 0x00, 0x00,
        ];

        assert_eq!(
            corrupt(MessageTable::from_resource(&input)),
            CorruptDataError::RecordTooShort { id: 1, length: 0 }
        );
    }

    #[test]
    fn record_past_end_is_corrupt() {
        #[rustfmt::skip]
        let input = [
            0x01, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
            0x40, 0x00, 0x00, 0x00, 0x41, 0x00, 0x00, 0x00,
        ];

        assert_eq!(
            corrupt(MessageTable::from_resource(&input)),
            CorruptDataError::RecordOutOfBounds {
                id: 1,
                offset: 0x10,
                length: 0x40
            }
        );
    }

    #[test]
    fn range_longer_than_records_is_corrupt() {
        #[rustfmt::skip]
        let input = [
            0x01, 0x00, 0x00, 0x00,
            // claims ids 1 through 3, only one record follows
            0x01, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x00, 0x00, 0x41, 0x00, 0x00, 0x00,
        ];

        let pool = CountingPool::new();
        assert_eq!(
            corrupt(MessageTable::from_resource_in(&input, &pool)),
            CorruptDataError::TruncatedRecord { id: 2, offset: 0x18 }
        );
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn block_offset_past_end_is_corrupt() {
        #[rustfmt::skip]
        let input = [
            0x01, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00,
        ];

        assert_eq!(
            corrupt(MessageTable::from_resource(&input)),
            CorruptDataError::BlockOutOfBounds {
                block: 0,
                offset: 0xFF
            }
        );
    }

    #[test]
    fn unterminated_text_is_corrupt() {
        #[rustfmt::skip]
        let input = [
            0x01, 0x00, 0x00, 0x00,
            0x07, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x00, 0x00, 0x41, 0x42, 0x43, 0x44,
        ];

        assert_eq!(
            corrupt(MessageTable::from_resource(&input)),
            CorruptDataError::UnterminatedText { id: 7 }
        );
    }

    #[test]
    fn empty_text_is_rejected() {
        #[rustfmt::skip]
        let input = [
            0x01, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        assert!(matches!(
            MessageTable::from_resource(&input),
            Err(Error::InvalidArgument(InvalidArgumentError::ZeroLength))
        ));
    }

    #[test]
    fn empty_and_truncated_buffers() {
        assert!(matches!(
            MessageTable::from_resource(&[]),
            Err(Error::InvalidArgument(InvalidArgumentError::EmptyBuffer))
        ));
        assert_eq!(
            corrupt(MessageTable::from_resource(&[0x01, 0x00])),
            CorruptDataError::TruncatedHeader
        );
        assert_eq!(
            corrupt(MessageTable::from_resource(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00])),
            CorruptDataError::TooManyBlocks { count: u32::MAX }
        );
    }

    #[test]
    fn no_blocks_is_an_empty_table() -> Result<()> {
        let table = MessageTable::from_resource(&[0x00, 0x00, 0x00, 0x00])?;
        assert!(table.is_empty());

        Ok(())
    }

    #[test]
    fn inverted_range_is_skipped() -> Result<()> {
        #[rustfmt::skip]
        let input = [
            0x01, 0x00, 0x00, 0x00,
            0x05, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00,
        ];

        assert!(MessageTable::from_resource(&input)?.is_empty());

        Ok(())
    }

    #[test]
    fn cursor_steps_by_declared_length() -> Result<()> {
        #[rustfmt::skip]
        let input = [
            0x0C, 0x00, 0x01, 0x00, 0x41, 0x00, 0x00, 0x00, 0xEE, 0xEE, 0xEE, 0xEE,
            0x06, 0x00, 0x00, 0x00, 0x42, 0x00,
        ];

        let mut cursor = RecordCursor::new(&input, 0, 0)?;
        assert_eq!(
            cursor.next_record(1)?,
            RawRecord {
                flags: 1,
                text: &input[4..12]
            }
        );
        assert_eq!(cursor.offset(), 12);
        assert_eq!(
            cursor.next_record(2)?,
            RawRecord {
                flags: 0,
                text: &input[16..18]
            }
        );
        assert_eq!(cursor.offset(), input.len());
        assert_eq!(
            corrupt(cursor.next_record(3)),
            CorruptDataError::TruncatedRecord { id: 3, offset: 18 }
        );

        Ok(())
    }

    #[test]
    fn header_reads_declared_blocks() -> Result<()> {
        #[rustfmt::skip]
        let input = [
            0x01, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
        ];

        let header = read_header(&input)?;
        assert_eq!(header.blocks.len(), 1);
        assert_eq!(header.blocks[0].record_count(), 2);

        Ok(())
    }
}
