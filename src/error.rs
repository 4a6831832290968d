use core::fmt;

use crate::table::MIN_CAPACITY;
use crate::table::RobinTable;

/// Reasons a requested capacity cannot back a valid table.
///
/// Returned by [`RobinTable::with_capacity`] and, wrapped in a
/// [`ResizeError`], by [`RobinTable::resize`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapacityError {
    /// The request was below the [`MIN_CAPACITY`] slot minimum.
    TooSmall {
        /// The rejected capacity.
        requested: usize,
    },
    /// The request exceeds the `u32` slot-index range used by cached hashes
    /// and displacements.
    TooLarge {
        /// The rejected capacity.
        requested: usize,
    },
    /// A resize target too small to hold the table's live entries.
    WouldTruncate {
        /// The rejected capacity.
        requested: usize,
        /// The number of entries the table currently holds.
        len: usize,
    },
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityError::TooSmall { requested } => {
                write!(f, "capacity {requested} is below the {MIN_CAPACITY}-slot minimum")
            }
            CapacityError::TooLarge { requested } => {
                write!(f, "capacity {requested} exceeds the u32 slot-index range")
            }
            CapacityError::WouldTruncate { requested, len } => {
                write!(f, "capacity {requested} cannot hold the {len} entries already stored")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CapacityError {}

/// Error returned by [`RobinTable::insert`] when every slot is occupied and
/// the key is not already present.
///
/// The rejected pair is handed back untouched so the caller can grow the
/// table and retry; the table itself is left exactly as it was.
pub struct TableFull<K, V> {
    /// The key that could not be inserted.
    pub key: K,
    /// The value that could not be inserted.
    pub value: V,
}

impl<K, V> fmt::Debug for TableFull<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TableFull { .. }")
    }
}

impl<K, V> fmt::Display for TableFull<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("table is at capacity")
    }
}

#[cfg(feature = "std")]
impl<K, V> std::error::Error for TableFull<K, V> {}

/// Error returned by [`RobinTable::resize`] when the requested capacity is
/// rejected.
///
/// Resizing consumes the table, so the error carries it back unchanged;
/// recover it with [`into_table`](ResizeError::into_table).
pub struct ResizeError<K, V> {
    pub(crate) table: RobinTable<K, V>,
    pub(crate) error: CapacityError,
}

impl<K, V> ResizeError<K, V> {
    /// The reason the resize was rejected.
    pub fn error(&self) -> CapacityError {
        self.error
    }

    /// Recovers the original table, untouched by the failed resize.
    pub fn into_table(self) -> RobinTable<K, V> {
        self.table
    }
}

impl<K, V> fmt::Debug for ResizeError<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResizeError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<K, V> fmt::Display for ResizeError<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

#[cfg(feature = "std")]
impl<K, V> std::error::Error for ResizeError<K, V> {}
