//! Owned message table entries and the rules for creating them from borrowed text.

use std::{alloc::Layout, cmp::Ordering, fmt};

use widestring::U16String;

use crate::{
    error::{CorruptDataError, Error, InvalidArgumentError, Result},
    pool::Pool,
};

/// Code unit width of an entry's text
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Encoding {
    /// Single byte code units
    #[default]
    Narrow = 0,

    /// Two byte little endian code units
    Wide = 1,
}

impl Encoding {
    /// Flag value stored in a resource record
    pub const fn flags(self) -> u16 {
        self as u16
    }

    /// Size in bytes of one code unit
    pub const fn unit_size(self) -> usize {
        match self {
            Encoding::Narrow => 1,
            Encoding::Wide => 2,
        }
    }
}

impl TryFrom<u16> for Encoding {
    type Error = u16;

    fn try_from(value: u16) -> core::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Encoding::Narrow),
            1 => Ok(Encoding::Wide),
            other => Err(other),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Narrow => f.pad("narrow"),
            Encoding::Wide => f.pad("wide"),
        }
    }
}

/// Borrowed string data offered for insertion into a table.
///
/// Mirrors a counted string: an optional backing buffer, the number of bytes in use and the
/// number of bytes the buffer claims to hold. Nothing is trusted until
/// [`TextView::validate`] has run.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TextView<'a> {
    buffer: Option<&'a [u8]>,
    length: usize,
    capacity: usize,
}

impl<'a> TextView<'a> {
    /// View over all of `buffer`.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer: Some(buffer),
            length: buffer.len(),
            capacity: buffer.len(),
        }
    }

    /// View over the first `length` bytes of `buffer`.
    pub fn with_length(buffer: &'a [u8], length: usize) -> Self {
        Self {
            buffer: Some(buffer),
            length,
            capacity: buffer.len(),
        }
    }

    /// View built from its raw parts, as received from a caller.
    pub const fn from_parts(buffer: Option<&'a [u8]>, length: usize, capacity: usize) -> Self {
        Self {
            buffer,
            length,
            capacity,
        }
    }

    /// Number of bytes in use
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the view claims no bytes
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of bytes the view claims to hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check the view is usable as `encoding` text and return the bytes in use.
    pub fn validate(&self, encoding: Encoding) -> Result<&'a [u8]> {
        let buffer = self.buffer.ok_or(InvalidArgumentError::NullBuffer)?;

        if self.length == 0 {
            return Err(InvalidArgumentError::ZeroLength.into());
        }
        if self.capacity == 0 {
            return Err(InvalidArgumentError::ZeroCapacity.into());
        }
        if self.capacity < self.length {
            return Err(InvalidArgumentError::LengthExceedsCapacity {
                length: self.length,
                capacity: self.capacity,
            }
            .into());
        }

        if encoding == Encoding::Wide {
            if self.length % 2 != 0 {
                return Err(InvalidArgumentError::OddLength(self.length).into());
            }
            if self.capacity % 2 != 0 {
                return Err(InvalidArgumentError::OddCapacity(self.capacity).into());
            }
        }

        buffer.get(..self.length).ok_or_else(|| {
            InvalidArgumentError::LengthExceedsBuffer {
                length: self.length,
                available: buffer.len(),
            }
            .into()
        })
    }
}

/// One message: an identifier and its owned text.
#[derive(PartialEq, Eq)]
pub struct Entry {
    id: u32,
    encoding: Encoding,
    payload: Box<[u8]>,
}

impl Entry {
    /// Copy the validated bytes of `view` into a buffer charged to `pool`.
    pub(crate) fn duplicate<P: Pool>(
        pool: &P,
        id: u32,
        encoding: Encoding,
        view: &TextView<'_>,
    ) -> Result<Self> {
        let text = view.validate(encoding)?;

        pool.allocate(payload_layout(text.len())?)?;

        let mut payload = Vec::new();
        if payload.try_reserve_exact(text.len()).is_err() {
            pool.free(payload_layout(text.len())?);
            return Err(Error::OutOfMemory);
        }
        payload.extend_from_slice(text);

        Ok(Self {
            id,
            encoding,
            payload: payload.into_boxed_slice(),
        })
    }

    /// The message identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// How the payload is encoded
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Whether the payload holds two byte code units
    pub fn is_wide(&self) -> bool {
        self.encoding == Encoding::Wide
    }

    /// The raw payload
    pub fn bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload has been released
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes owned by the payload; always equal to [`Entry::len`]
    pub fn capacity(&self) -> usize {
        self.payload.len()
    }

    /// Wide payload as UTF-16 code units, `None` for narrow entries.
    pub fn to_u16_string(&self) -> Option<U16String> {
        match self.encoding {
            Encoding::Narrow => None,
            Encoding::Wide => Some(U16String::from_vec(
                self.payload
                    .chunks_exact(2)
                    .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
                    .collect::<Vec<_>>(),
            )),
        }
    }

    /// Payload decoded for display.
    ///
    /// Narrow payloads are read as UTF-8, which covers ASCII message files.
    pub fn to_string_lossy(&self) -> String {
        match self.to_u16_string() {
            Some(wide) => wide.to_string_lossy(),
            None => String::from_utf8_lossy(&self.payload).into_owned(),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("encoding", &self.encoding)
            .field("text", &self.to_string_lossy())
            .finish()
    }
}

/// Order entries by identifier.
pub(crate) fn compare_entries(a: &Entry, b: &Entry) -> Ordering {
    a.id.cmp(&b.id)
}

/// Release the payload of `entry` back to `pool`.
///
/// The identifier and encoding are left untouched: the store still orders the entry by its
/// identifier while it unlinks or overwrites it.
pub(crate) fn clear_entry<P: Pool>(entry: &mut Entry, pool: &P) {
    let payload = std::mem::take(&mut entry.payload);
    if payload.is_empty() {
        return;
    }

    // a layout for a byte slice that was already allocated cannot overflow
    if let Ok(layout) = Layout::array::<u8>(payload.len()) {
        pool.free(layout);
    }
}

fn payload_layout(len: usize) -> Result<Layout> {
    Layout::array::<u8>(len).map_err(|_| Error::OutOfMemory)
}

/// Length in bytes of the text in a record, up to but excluding its terminator.
///
/// The scan never looks past `text`; text without a terminator is rejected.
pub(crate) fn terminated_len(id: u32, encoding: Encoding, text: &[u8]) -> Result<usize> {
    let position = match encoding {
        Encoding::Narrow => text.iter().position(|&b| b == 0),
        Encoding::Wide => text
            .chunks_exact(2)
            .position(|unit| unit == [0, 0])
            .map(|units| units * 2),
    };

    position.ok_or_else(|| CorruptDataError::UnterminatedText { id }.into())
}
