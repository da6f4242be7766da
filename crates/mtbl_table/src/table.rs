//! The in-memory message table.
//!

use std::fmt;

use tracing::{debug, instrument};
use widestring::U16Str;

use crate::{
    entry::{clear_entry, compare_entries, Encoding, Entry, TextView},
    error::Result,
    pool::{PagedPool, Pool},
    store::{EntryStore, Iter},
};

/// Outcome of inserting an entry
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// The identifier was not in the table before
    Inserted,

    /// An entry with the same identifier was released and overwritten
    Replaced,
}

/// Identifier keyed table of narrow and wide messages.
///
/// Every entry and every payload is owned by the table and charged to its [`Pool`]. Dropping
/// the table releases all of them.
///
/// ```
/// use mtbl_table::{Encoding, Insertion, MessageTable, TextView};
///
/// let mut table = MessageTable::new()?;
/// table.insert_narrow(1, &TextView::new(b"first"))?;
/// let outcome = table.insert_wide(1, &TextView::new(b"s\0e\0c\0o\0n\0d\0"))?;
///
/// assert_eq!(outcome, Insertion::Replaced);
/// assert_eq!(table.len(), 1);
/// assert_eq!(table.get(1).map(|e| e.encoding()), Some(Encoding::Wide));
/// # Ok::<(), mtbl_table::error::Error>(())
/// ```
pub struct MessageTable<P: Pool = PagedPool> {
    store: EntryStore<Entry, P>,
}

impl MessageTable<PagedPool> {
    /// Create an empty table on the default pool.
    pub fn new() -> Result<Self> {
        Self::new_in(PagedPool::default())
    }
}

impl<P: Pool> MessageTable<P> {
    /// Create an empty table whose allocations are charged to `pool`.
    pub fn new_in(pool: P) -> Result<Self> {
        Ok(Self {
            store: EntryStore::create(compare_entries, pool)?,
        })
    }

    /// Copy narrow text into the table under `id`, replacing any existing entry.
    #[instrument(skip(self, view), fields(len = view.len()), err)]
    pub fn insert_narrow(&mut self, id: u32, view: &TextView<'_>) -> Result<Insertion> {
        self.insert(id, Encoding::Narrow, view)
    }

    /// Copy wide text into the table under `id`, replacing any existing entry.
    ///
    /// The view's length and capacity must both be even.
    #[instrument(skip(self, view), fields(len = view.len()), err)]
    pub fn insert_wide(&mut self, id: u32, view: &TextView<'_>) -> Result<Insertion> {
        self.insert(id, Encoding::Wide, view)
    }

    /// Insert the UTF-8 bytes of `text` as a narrow entry.
    pub fn insert_str(&mut self, id: u32, text: &str) -> Result<Insertion> {
        self.insert_narrow(id, &TextView::new(text.as_bytes()))
    }

    /// Insert `text` as a wide entry of little endian code units.
    pub fn insert_u16_str(&mut self, id: u32, text: &U16Str) -> Result<Insertion> {
        let bytes: Vec<u8> = text
            .as_slice()
            .iter()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();
        self.insert_wide(id, &TextView::new(&bytes))
    }

    fn insert(&mut self, id: u32, encoding: Encoding, view: &TextView<'_>) -> Result<Insertion> {
        let entry = Entry::duplicate(self.store.pool(), id, encoding, view)?;

        if self.store.insert_or_replace(entry, clear_entry::<P>)? {
            Ok(Insertion::Inserted)
        } else {
            debug!(id, %encoding, "replaced existing entry");
            Ok(Insertion::Replaced)
        }
    }

    /// Look up the entry for `id`.
    pub fn get(&self, id: u32) -> Option<&Entry> {
        self.store.search_by(|entry| entry.id().cmp(&id))
    }

    /// Whether an entry exists for `id`
    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    /// Release and remove the entry for `id`. Returns whether one existed.
    pub fn remove(&mut self, id: u32) -> bool {
        self.store
            .remove_by(|entry| entry.id().cmp(&id), clear_entry::<P>)
            .is_some()
    }

    /// Number of entries in the table
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Entries in ascending identifier order
    pub fn iter(&self) -> Iter<'_, Entry> {
        self.store.iter()
    }

    /// Identifiers in ascending order
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.iter().map(Entry::id)
    }

    /// The pool this table charges its allocations to
    pub fn pool(&self) -> &P {
        self.store.pool()
    }

    /// Release every entry, smallest identifier first, leaving the table empty.
    pub fn clear(&mut self) {
        while self.store.pop_first_with(clear_entry::<P>).is_some() {}
    }

    /// Release every entry and the table itself.
    ///
    /// Anything done elsewhere with this table's text is not undone.
    pub fn destroy(mut self) {
        self.clear();
    }

    /// Destroy the table held in `slot`, if any, leaving `None` behind.
    ///
    /// Calling this on an empty slot does nothing, so it can run on every exit path.
    pub fn close(slot: &mut Option<Self>) {
        if let Some(table) = slot.take() {
            table.destroy();
        }
    }
}

impl<P: Pool> Drop for MessageTable<P> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<'a, P: Pool> IntoIterator for &'a MessageTable<P> {
    type Item = &'a Entry;
    type IntoIter = Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<P: Pool> fmt::Debug for MessageTable<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|entry| (entry.id(), entry.to_string_lossy())))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;
    use widestring::u16str;

    use crate::entry::{Encoding, TextView};
    use crate::error::{Error, InvalidArgumentError, Result};
    use crate::pool::CountingPool;
    use crate::table::{Insertion, MessageTable};

    #[traced_test]
    #[test]
    fn second_insert_wins_and_releases_first() -> Result<()> {
        let pool = CountingPool::new();
        let mut table = MessageTable::new_in(&pool)?;

        assert_eq!(table.insert_str(4, "narrow text")?, Insertion::Inserted);
        let after_first = pool.outstanding();
        let bytes_after_first = pool.outstanding_bytes();

        assert_eq!(
            table.insert_u16_str(4, u16str!("wide"))?,
            Insertion::Replaced
        );

        assert_eq!(table.len(), 1);
        let entry = table.get(4).ok_or(Error::CustomError("missing".into()))?;
        assert_eq!(entry.encoding(), Encoding::Wide);
        assert_eq!(entry.bytes(), b"w\0i\0d\0e\0");

        // one payload swapped for another, nothing outlives the overwrite
        assert_eq!(pool.outstanding(), after_first);
        assert_eq!(pool.outstanding_bytes(), bytes_after_first - 11 + 8);

        Ok(())
    }

    #[test]
    fn wide_then_narrow_keeps_narrow() -> Result<()> {
        let mut table = MessageTable::new()?;

        table.insert_wide(9, &TextView::new(b"x\0"))?;
        table.insert_narrow(9, &TextView::new(b"y"))?;

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(9).map(|e| e.encoding()), Some(Encoding::Narrow));
        assert_eq!(table.get(9).map(|e| e.bytes()), Some(&b"y"[..]));

        Ok(())
    }

    #[test]
    fn rejected_views_leave_table_unchanged() -> Result<()> {
        let pool = CountingPool::new();
        let mut table = MessageTable::new_in(&pool)?;
        table.insert_str(1, "keep")?;
        let baseline = pool.outstanding();

        let data: &[u8] = b"abc";
        let views = [
            TextView::from_parts(None, 3, 3),
            TextView::with_length(data, 0),
            TextView::from_parts(Some(data), 3, 2),
        ];

        for view in views {
            assert!(matches!(
                table.insert_narrow(1, &view),
                Err(Error::InvalidArgument(_))
            ));
            assert!(matches!(
                table.insert_wide(2, &view),
                Err(Error::InvalidArgument(_))
            ));
        }

        assert!(matches!(
            table.insert_wide(2, &TextView::with_length(data, 3)),
            Err(Error::InvalidArgument(InvalidArgumentError::OddLength(3)))
        ));
        assert!(matches!(
            table.insert_wide(2, &TextView::from_parts(Some(data), 2, 3)),
            Err(Error::InvalidArgument(InvalidArgumentError::OddCapacity(3)))
        ));

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(1).map(|e| e.bytes()), Some(&b"keep"[..]));
        assert_eq!(pool.outstanding(), baseline);

        Ok(())
    }

    #[test]
    fn iterates_in_ascending_order() -> Result<()> {
        let mut table = MessageTable::new()?;

        for id in [10, 1, 2] {
            table.insert_str(id, "text")?;
        }

        assert_eq!(table.ids().collect::<Vec<_>>(), vec![1, 2, 10]);
        assert_eq!((&table).into_iter().len(), 3);

        Ok(())
    }

    #[test]
    fn remove_releases_payload() -> Result<()> {
        let pool = CountingPool::new();
        let mut table = MessageTable::new_in(&pool)?;
        let baseline = pool.outstanding();

        table.insert_str(3, "gone soon")?;
        assert!(table.remove(3));
        assert!(!table.remove(3));
        assert!(!table.contains(3));
        assert_eq!(pool.outstanding(), baseline);

        Ok(())
    }

    #[test]
    fn destroy_releases_everything() -> Result<()> {
        let pool = Rc::new(CountingPool::new());
        let mut table = MessageTable::new_in(pool.clone())?;

        for id in 0..100 {
            table.insert_str(id, "message")?;
        }
        assert!(pool.outstanding() > 100);

        table.destroy();
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.outstanding_bytes(), 0);

        Ok(())
    }

    #[test]
    fn close_is_idempotent() -> Result<()> {
        let pool = CountingPool::new();

        let mut slot = Some(MessageTable::new_in(&pool)?);
        MessageTable::close(&mut slot);
        MessageTable::close(&mut slot);
        assert!(slot.is_none());
        assert_eq!(pool.outstanding(), 0);

        let mut empty: Option<MessageTable> = None;
        MessageTable::close(&mut empty);

        Ok(())
    }

    #[test]
    fn out_of_memory_keeps_table_consistent() -> Result<()> {
        // control structure, then payload and node for the first entry
        let pool = CountingPool::with_limit(3);
        let mut table = MessageTable::new_in(&pool)?;

        table.insert_str(1, "fits")?;
        assert!(matches!(table.insert_str(2, "no room"), Err(Error::OutOfMemory)));
        assert_eq!(table.len(), 1);

        table.destroy();
        assert_eq!(pool.outstanding(), 0);

        Ok(())
    }
}
