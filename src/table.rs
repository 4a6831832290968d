use alloc::boxed::Box;
use core::fmt::Debug;
use core::mem;
use core::mem::MaybeUninit;

use crate::error::CapacityError;
use crate::error::ResizeError;
use crate::error::TableFull;

/// Smallest capacity a table can be created or resized to.
pub const MIN_CAPACITY: usize = 2;

/// Special displacement value marking an empty slot.
///
/// Occupancy is a property of the displacement field: every value except
/// this sentinel, including 0, marks the slot occupied, so the emptiness
/// check is a single comparison. Real displacements can never reach the
/// sentinel because capacities are validated to fit the `u32` index range.
const EMPTY: u32 = u32::MAX;

/// One storage unit of the table.
///
/// `key` and `value` are initialized exactly when `dib != EMPTY`. `dib` is
/// the entry's distance to its initial bucket: the slot index is always
/// `(hash + dib) mod capacity` in wrapping `u32` arithmetic.
struct Slot<K, V> {
    dib: u32,
    hash: u32,
    key: MaybeUninit<K>,
    value: MaybeUninit<V>,
}

impl<K, V> Slot<K, V> {
    const fn empty() -> Self {
        Slot {
            dib: EMPTY,
            hash: 0,
            key: MaybeUninit::uninit(),
            value: MaybeUninit::uninit(),
        }
    }

    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.dib == EMPTY
    }
}

/// A fixed-capacity Robin Hood hash table.
///
/// `RobinTable<K, V>` stores key-value pairs in a single flat slot array
/// using linear probing. Collisions are resolved by displacement: an entry
/// that has probed further than a slot's occupant evicts it, and the evicted
/// entry continues probing, which bounds the variance of probe lengths
/// across the table. Deletion backward-shifts the following run of displaced
/// entries instead of leaving tombstones.
///
/// The table never resizes on its own and never hashes anything: every
/// operation takes the key's hash, and lookups take an equality predicate.
/// This keeps the engine free of policy; [`RobinMap`](crate::RobinMap)
/// layers a stored hasher and automatic growth on top.
///
/// ## Example
///
/// ```rust
/// use robin_table::RobinTable;
///
/// let mut table: RobinTable<u64, &str> = RobinTable::with_capacity(8)?;
///
/// // The caller supplies hashes; 7 stands in for hash(1) here.
/// table.insert(7, 1, "one", |a, b| a == b).unwrap();
///
/// assert_eq!(table.find(7, |&k| k == 1), Some((&1, &"one")));
/// assert_eq!(table.len(), 1);
/// # Ok::<(), robin_table::CapacityError>(())
/// ```
pub struct RobinTable<K, V> {
    slots: Box<[Slot<K, V>]>,
    count: usize,
}

impl<K, V> RobinTable<K, V> {
    /// Creates a table with exactly `capacity` slots.
    ///
    /// The capacity is fixed for the table's lifetime; only an explicit
    /// [`resize`](RobinTable::resize) changes it. Fails without allocating
    /// if `capacity` is below [`MIN_CAPACITY`] or beyond the `u32`
    /// slot-index range.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinTable;
    ///
    /// let table: RobinTable<u64, String> = RobinTable::with_capacity(64)?;
    /// assert_eq!(table.capacity(), 64);
    ///
    /// assert!(RobinTable::<u64, String>::with_capacity(1).is_err());
    /// # Ok::<(), robin_table::CapacityError>(())
    /// ```
    pub fn with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        Self::check_capacity(capacity)?;
        Ok(Self::with_slots(capacity))
    }

    fn check_capacity(capacity: usize) -> Result<(), CapacityError> {
        if capacity < MIN_CAPACITY {
            Err(CapacityError::TooSmall { requested: capacity })
        } else if capacity > u32::MAX as usize {
            Err(CapacityError::TooLarge { requested: capacity })
        } else {
            Ok(())
        }
    }

    /// Builds the slot array without validating `capacity`. Callers are the
    /// validated public constructors and in-crate code that already holds a
    /// legal capacity.
    pub(crate) fn with_slots(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::empty()).collect(),
            count: 0,
        }
    }

    /// Returns the number of entries in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if the table contains no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the total number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Mean displacement over all occupied slots.
    ///
    /// Diagnostic only: low averages mean lookups terminate close to their
    /// ideal bucket. Returns NaN on an empty table — callers must guard.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinTable;
    ///
    /// let mut table: RobinTable<u64, u64> = RobinTable::with_capacity(8)?;
    /// assert!(table.average_displacement().is_nan());
    ///
    /// // Three keys hashed to the same bucket sit at displacements 0, 1, 2.
    /// for k in 0..3 {
    ///     table.insert(0, k, k, |a, b| a == b).unwrap();
    /// }
    /// assert_eq!(table.average_displacement(), 1.0);
    /// # Ok::<(), robin_table::CapacityError>(())
    /// ```
    pub fn average_displacement(&self) -> f64 {
        let mut total = 0u64;
        for slot in self.slots.iter() {
            if !slot.is_empty() {
                total += u64::from(slot.dib);
            }
        }
        total as f64 / self.count as f64
    }

    /// Computes a histogram of displacements for the current table state.
    ///
    /// Index `d` of the returned vector counts the occupied slots sitting
    /// `d` probes from their ideal bucket. The vector is only as long as the
    /// largest displacement present; it is empty for an empty table.
    #[cfg(feature = "stats")]
    pub fn displacement_histogram(&self) -> alloc::vec::Vec<usize> {
        let mut hist = alloc::vec::Vec::new();
        for slot in self.slots.iter() {
            if slot.is_empty() {
                continue;
            }
            let dib = slot.dib as usize;
            if hist.len() <= dib {
                hist.resize(dib + 1, 0);
            }
            hist[dib] += 1;
        }
        hist
    }

    /// Index probed for a hash at displacement `dib`.
    ///
    /// Wrapping `u32` arithmetic, so the probe sequence matches the
    /// displacement arithmetic stored in the slots exactly.
    #[inline(always)]
    fn probe_index(&self, hash: u32, dib: u32) -> usize {
        (hash.wrapping_add(dib) % self.slots.len() as u32) as usize
    }

    /// Probe walk shared by the read-side operations.
    ///
    /// Returns the index of the occupied slot holding the key, or `None`
    /// after hitting an empty slot or a slot whose displacement is smaller
    /// than the candidate's — any entry for this key would have displaced
    /// such a slot already, so the key cannot be present further along.
    fn find_index(&self, hash: u32, eq: &mut impl FnMut(&K) -> bool) -> Option<usize> {
        for dib in 0..self.slots.len() as u32 {
            let probe = self.probe_index(hash, dib);
            let slot = &self.slots[probe];
            if slot.is_empty() || slot.dib < dib {
                return None;
            }
            // SAFETY: The slot is occupied, so its key is initialized.
            if slot.hash == hash && eq(unsafe { slot.key.assume_init_ref() }) {
                return Some(probe);
            }
        }
        None
    }

    /// Looks up an entry by hash and equality predicate.
    ///
    /// The cached hash short-circuits the predicate: `eq` only runs on keys
    /// whose hash matches. A hash collision alone never counts as equality.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinTable;
    ///
    /// let mut table: RobinTable<u64, i32> = RobinTable::with_capacity(8)?;
    /// table.insert(3, 42, -1, |a, b| a == b).unwrap();
    ///
    /// assert_eq!(table.find(3, |&k| k == 42), Some((&42, &-1)));
    /// assert_eq!(table.find(3, |&k| k == 99), None);
    /// # Ok::<(), robin_table::CapacityError>(())
    /// ```
    pub fn find(&self, hash: u32, mut eq: impl FnMut(&K) -> bool) -> Option<(&K, &V)> {
        let probe = self.find_index(hash, &mut eq)?;
        let slot = &self.slots[probe];
        // SAFETY: `find_index` only returns occupied slots.
        unsafe { Some((slot.key.assume_init_ref(), slot.value.assume_init_ref())) }
    }

    /// Looks up an entry, returning a mutable reference to its value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinTable;
    ///
    /// let mut table: RobinTable<u64, i32> = RobinTable::with_capacity(8)?;
    /// table.insert(3, 42, 1, |a, b| a == b).unwrap();
    ///
    /// if let Some((_, v)) = table.find_mut(3, |&k| k == 42) {
    ///     *v += 9;
    /// }
    /// assert_eq!(table.find(3, |&k| k == 42), Some((&42, &10)));
    /// # Ok::<(), robin_table::CapacityError>(())
    /// ```
    pub fn find_mut(&mut self, hash: u32, mut eq: impl FnMut(&K) -> bool) -> Option<(&K, &mut V)> {
        let probe = self.find_index(hash, &mut eq)?;
        let slot = &mut self.slots[probe];
        // SAFETY: `find_index` only returns occupied slots.
        unsafe { Some((slot.key.assume_init_ref(), slot.value.assume_init_mut())) }
    }

    /// Inserts a key-value pair, or updates the value of an existing key.
    ///
    /// `eq` is called as `eq(inserted, resident)` on resident keys whose
    /// cached hash matches; when it reports equality only the resident value
    /// is replaced (key and slot untouched) and the previous value is
    /// returned as `Ok(Some(_))`. A fresh insertion returns `Ok(None)`.
    ///
    /// The entry probes from `hash % capacity`, evicting any occupant that
    /// is closer to its ideal bucket than the entry being placed; the
    /// occupant then continues the walk in its stead. Eviction reuses the
    /// occupant's cached hash, so nothing is rehashed.
    ///
    /// Fails with [`TableFull`] — handing the pair back, table unchanged —
    /// exactly when every slot is occupied and the key is not present.
    /// Updating a key that is present succeeds even on a full table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinTable;
    ///
    /// let mut table: RobinTable<u64, &str> = RobinTable::with_capacity(2)?;
    ///
    /// assert_eq!(table.insert(0, 1, "a", |a, b| a == b).unwrap(), None);
    /// assert_eq!(table.insert(1, 2, "b", |a, b| a == b).unwrap(), None);
    ///
    /// // Full: a new key is rejected and returned...
    /// let full = table.insert(2, 3, "c", |a, b| a == b).unwrap_err();
    /// assert_eq!((full.key, full.value), (3, "c"));
    ///
    /// // ...but updating a present key still succeeds.
    /// assert_eq!(table.insert(0, 1, "A", |a, b| a == b).unwrap(), Some("a"));
    /// # Ok::<(), robin_table::CapacityError>(())
    /// ```
    pub fn insert(
        &mut self,
        hash: u32,
        key: K,
        value: V,
        mut eq: impl FnMut(&K, &K) -> bool,
    ) -> Result<Option<V>, TableFull<K, V>> {
        let capacity = self.slots.len();

        // The scratch entry: the caller's pair until the first eviction,
        // then whichever entry was last displaced.
        let mut dib = 0u32;
        let mut hash = hash;
        let mut key = key;
        let mut value = value;
        let mut displaced = false;

        while (dib as usize) < capacity {
            let probe = self.probe_index(hash, dib);
            let slot = &mut self.slots[probe];

            if slot.is_empty() {
                slot.dib = dib;
                slot.hash = hash;
                slot.key.write(key);
                slot.value.write(value);
                self.count += 1;
                return Ok(None);
            }

            // Update path. A displaced scratch entry is already resident
            // elsewhere in the table and can never equal another resident
            // key, so the check only runs for the caller's entry.
            // SAFETY: The slot is occupied, so its key is initialized.
            if !displaced && slot.hash == hash && eq(&key, unsafe { slot.key.assume_init_ref() }) {
                // SAFETY: Occupied slot; the value is initialized.
                let previous = unsafe { mem::replace(slot.value.assume_init_mut(), value) };
                return Ok(Some(previous));
            }

            if slot.dib < dib {
                if self.count == capacity {
                    // The occupant outranks the scratch entry, which proves
                    // the key absent (lookup would have stopped here), and a
                    // full table leaves an evicted entry nowhere to go.
                    return Err(TableFull { key, value });
                }

                // Evict the richer occupant: the scratch entry takes the
                // slot and the occupant continues the walk.
                mem::swap(&mut dib, &mut slot.dib);
                mem::swap(&mut hash, &mut slot.hash);
                // SAFETY: The slot is occupied and the locals are live
                // values, so both sides of each swap are initialized.
                unsafe {
                    core::ptr::swap(&mut key, slot.key.as_mut_ptr());
                    core::ptr::swap(&mut value, slot.value.as_mut_ptr());
                }
                displaced = true;
            }

            dib += 1;
        }

        if self.count == capacity {
            // Degenerate full table: every slot along the walk outranked or
            // tied the scratch entry, so no eviction point was ever reached.
            return Err(TableFull { key, value });
        }
        unreachable!("displacement probing exhausted a table with free slots");
    }

    /// Removes the entry matching `hash` and `eq`, returning it.
    ///
    /// An absent key is a normal outcome and returns `None`. Removal closes
    /// the gap by shifting the following run of displaced entries one slot
    /// backward (each ends one probe closer to its ideal bucket), so no
    /// tombstones ever exist and lookups keep short-circuiting correctly.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinTable;
    ///
    /// let mut table: RobinTable<u64, &str> = RobinTable::with_capacity(8)?;
    /// table.insert(5, 9, "nine", |a, b| a == b).unwrap();
    ///
    /// assert_eq!(table.remove(5, |&k| k == 9), Some((9, "nine")));
    /// assert_eq!(table.remove(5, |&k| k == 9), None);
    /// # Ok::<(), robin_table::CapacityError>(())
    /// ```
    pub fn remove(&mut self, hash: u32, mut eq: impl FnMut(&K) -> bool) -> Option<(K, V)> {
        let probe = self.find_index(hash, &mut eq)?;
        let slot = &mut self.slots[probe];
        slot.dib = EMPTY;
        // SAFETY: `find_index` returned an occupied slot; clearing the tag
        // above makes these reads a move of the pair.
        let pair = unsafe { (slot.key.assume_init_read(), slot.value.assume_init_read()) };
        self.count -= 1;
        self.shift_back(probe);
        Some(pair)
    }

    /// Closes the gap left by a deletion.
    ///
    /// Followers with nonzero displacement move one slot backward into the
    /// gap; the run ends at the first empty slot or at an entry already in
    /// its ideal bucket, which cannot move without changing buckets.
    fn shift_back(&mut self, mut gap: usize) {
        let capacity = self.slots.len();
        loop {
            let next = (gap + 1) % capacity;
            if self.slots[next].is_empty() || self.slots[next].dib == 0 {
                return;
            }

            let slot = &mut self.slots[next];
            let dib = slot.dib - 1;
            let hash = slot.hash;
            slot.dib = EMPTY;
            // SAFETY: `next` was occupied; clearing its tag above makes
            // these reads a move into the gap slot.
            let (key, value) = unsafe { (slot.key.assume_init_read(), slot.value.assume_init_read()) };

            let slot = &mut self.slots[gap];
            slot.dib = dib;
            slot.hash = hash;
            slot.key.write(key);
            slot.value.write(value);

            gap = next;
        }
    }

    /// Removes all entries, keeping the capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinTable;
    ///
    /// let mut table: RobinTable<u64, String> = RobinTable::with_capacity(4)?;
    /// table.insert(0, 1, "x".to_string(), |a, b| a == b).unwrap();
    ///
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.capacity(), 4);
    /// # Ok::<(), robin_table::CapacityError>(())
    /// ```
    pub fn clear(&mut self) {
        if self.count == 0 {
            return;
        }
        if mem::needs_drop::<K>() || mem::needs_drop::<V>() {
            for slot in self.slots.iter_mut() {
                if !slot.is_empty() {
                    slot.dib = EMPTY;
                    // SAFETY: The slot was occupied; the tag is cleared
                    // before dropping so a panic mid-drop cannot cause a
                    // second drop.
                    unsafe {
                        slot.key.assume_init_drop();
                        slot.value.assume_init_drop();
                    }
                }
            }
        } else {
            for slot in self.slots.iter_mut() {
                slot.dib = EMPTY;
            }
        }
        self.count = 0;
    }

    /// Rebuilds the table with `new_capacity` slots.
    ///
    /// Consumes the table; on success the old storage is released and the
    /// returned table holds exactly the same entries, replayed through
    /// ordinary insertion with their cached hashes (bucket placement is
    /// recomputed, entry order is not preserved). Requesting the current
    /// capacity returns the table unchanged.
    ///
    /// Fails — returning the intact table inside the error — if the request
    /// is below [`MIN_CAPACITY`], beyond the `u32` index range, or smaller
    /// than [`len`](RobinTable::len): the table never silently truncates.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinTable;
    ///
    /// let mut table: RobinTable<u64, u64> = RobinTable::with_capacity(4)?;
    /// for k in 0..3 {
    ///     table.insert(k as u32, k, k * 10, |a, b| a == b).unwrap();
    /// }
    ///
    /// let table = table.resize(16).unwrap();
    /// assert_eq!(table.capacity(), 16);
    /// assert_eq!(table.len(), 3);
    /// assert_eq!(table.find(1, |&k| k == 1), Some((&1, &10)));
    ///
    /// // Shrinking below the live entry count is rejected; the error hands
    /// // the table back untouched.
    /// let err = table.resize(2).unwrap_err();
    /// let table = err.into_table();
    /// assert_eq!(table.len(), 3);
    /// # Ok::<(), robin_table::CapacityError>(())
    /// ```
    pub fn resize(mut self, new_capacity: usize) -> Result<Self, ResizeError<K, V>> {
        if new_capacity == self.slots.len() {
            return Ok(self);
        }
        if let Err(error) = Self::check_capacity(new_capacity) {
            return Err(ResizeError { table: self, error });
        }
        if new_capacity < self.count {
            let error = CapacityError::WouldTruncate {
                requested: new_capacity,
                len: self.count,
            };
            return Err(ResizeError { table: self, error });
        }

        let mut next = Self::with_slots(new_capacity);
        for slot in self.slots.iter_mut() {
            if slot.is_empty() {
                continue;
            }
            slot.dib = EMPTY;
            // SAFETY: The slot was occupied; clearing the tag above makes
            // these reads a move, so the old table's drop sees only empty
            // slots.
            let (key, value) = unsafe { (slot.key.assume_init_read(), slot.value.assume_init_read()) };
            next.reinsert(slot.hash, key, value);
        }
        self.count = 0;
        Ok(next)
    }

    /// Replays an entry into a rebuild target using its cached hash.
    fn reinsert(&mut self, hash: u32, key: K, value: V) {
        // Keys being replayed are unique, so the update path cannot match.
        match self.insert(hash, key, value, |_, _| false) {
            Ok(_) => {}
            Err(_) => unreachable!("rebuild target sized below its entry count"),
        }
    }

    /// Returns an iterator over the entries in slot order.
    ///
    /// The order is increasing slot index — not insertion order, not hash
    /// order — and a fresh traversal always starts at slot 0. The iterator
    /// holds only a slot index; the borrow it keeps on the table is what
    /// prevents mutation mid-traversal.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinTable;
    ///
    /// let mut table: RobinTable<u64, &str> = RobinTable::with_capacity(8)?;
    /// table.insert(6, 1, "late", |a, b| a == b).unwrap();
    /// table.insert(2, 2, "early", |a, b| a == b).unwrap();
    ///
    /// let entries: Vec<_> = table.iter().collect();
    /// assert_eq!(entries, [(&2, &"early"), (&1, &"late")]);
    /// # Ok::<(), robin_table::CapacityError>(())
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            table: self,
            index: 0,
        }
    }
}

impl<K, V> Drop for RobinTable<K, V> {
    fn drop(&mut self) {
        if (mem::needs_drop::<K>() || mem::needs_drop::<V>()) && self.count > 0 {
            for slot in self.slots.iter_mut() {
                if !slot.is_empty() {
                    // SAFETY: Occupied slots hold initialized pairs, and
                    // nothing reads them after the table is dropped.
                    unsafe {
                        slot.key.assume_init_drop();
                        slot.value.assume_init_drop();
                    }
                }
            }
        }
    }
}

impl<K, V> Clone for RobinTable<K, V>
where
    K: Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        let slots = self
            .slots
            .iter()
            .map(|slot| {
                if slot.is_empty() {
                    Slot::empty()
                } else {
                    Slot {
                        dib: slot.dib,
                        hash: slot.hash,
                        // SAFETY: The slot is occupied, so both halves of
                        // the pair are initialized.
                        key: MaybeUninit::new(unsafe { slot.key.assume_init_ref() }.clone()),
                        value: MaybeUninit::new(unsafe { slot.value.assume_init_ref() }.clone()),
                    }
                }
            })
            .collect();
        Self {
            slots,
            count: self.count,
        }
    }
}

impl<K, V> Debug for RobinTable<K, V>
where
    K: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::vec::Vec;

        f.debug_struct("RobinTable")
            .field("count", &self.count)
            .field("capacity", &self.slots.len())
            .field(
                "slots",
                &self
                    .slots
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| !slot.is_empty())
                    .map(|(i, slot)| {
                        // SAFETY: Filtered to occupied slots above.
                        let key = unsafe { slot.key.assume_init_ref() };
                        format!("{i:03}: dib={} hash={:08x} key={key:?}", slot.dib, slot.hash)
                    })
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// An iterator over a table's entries in slot order.
///
/// Created by [`RobinTable::iter`].
pub struct Iter<'a, K, V> {
    table: &'a RobinTable<K, V>,
    index: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.table.slots.len() {
            let slot = &self.table.slots[self.index];
            self.index += 1;
            if !slot.is_empty() {
                // SAFETY: Occupied slots hold initialized pairs.
                return Some(unsafe { (slot.key.assume_init_ref(), slot.value.assume_init_ref()) });
            }
        }
        None
    }
}

impl<'a, K, V> IntoIterator for &'a RobinTable<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;

    fn sip_hash(key: u64) -> u32 {
        let mut hasher = SipHasher::new_with_keys(0x0123_4567, 0x89ab_cdef);
        hasher.write_u64(key);
        hasher.finish() as u32
    }

    /// Walks every slot and asserts the structural invariants: the cached
    /// displacement addresses the slot it sits in, runs never break in a way
    /// that would defeat the lookup short-circuit, and the count matches.
    fn check_invariants<K, V>(table: &RobinTable<K, V>) {
        let capacity = table.slots.len() as u32;
        let mut occupied = 0;
        for (i, slot) in table.slots.iter().enumerate() {
            if slot.is_empty() {
                continue;
            }
            occupied += 1;
            assert!(slot.dib < capacity);
            assert_eq!(
                i,
                (slot.hash.wrapping_add(slot.dib) % capacity) as usize,
                "slot {i} does not sit at hash + dib"
            );
            if slot.dib > 0 {
                let prev = &table.slots[(i + capacity as usize - 1) % capacity as usize];
                assert!(
                    !prev.is_empty() && prev.dib >= slot.dib - 1,
                    "slot {i} (dib {}) is unreachable past its predecessor",
                    slot.dib
                );
            }
        }
        assert_eq!(occupied, table.count);
        assert!(table.count <= capacity as usize);
    }

    fn eq(a: &u64, b: &u64) -> bool {
        a == b
    }

    #[test]
    fn capacity_validation() {
        assert_eq!(
            RobinTable::<u64, u64>::with_capacity(0).unwrap_err(),
            CapacityError::TooSmall { requested: 0 }
        );
        assert_eq!(
            RobinTable::<u64, u64>::with_capacity(1).unwrap_err(),
            CapacityError::TooSmall { requested: 1 }
        );
        assert!(RobinTable::<u64, u64>::with_capacity(2).is_ok());

        #[cfg(target_pointer_width = "64")]
        assert_eq!(
            RobinTable::<u64, u64>::with_capacity(1 << 33).unwrap_err(),
            CapacityError::TooLarge { requested: 1 << 33 }
        );
    }

    #[test]
    fn round_trip() {
        let mut table: RobinTable<u64, i32> = RobinTable::with_capacity(32).unwrap();
        for k in 0..20u64 {
            assert_eq!(table.insert(sip_hash(k), k, k as i32 * 2, eq).unwrap(), None);
        }
        assert_eq!(table.len(), 20);
        for k in 0..20u64 {
            assert_eq!(
                table.find(sip_hash(k), |&x| x == k),
                Some((&k, &(k as i32 * 2))),
                "{table:#?}"
            );
        }
        assert_eq!(table.find(sip_hash(999), |&x| x == 999), None);
        check_invariants(&table);
    }

    #[test]
    fn update_keeps_count() {
        let mut table: RobinTable<u64, &str> = RobinTable::with_capacity(8).unwrap();
        table.insert(sip_hash(1), 1, "v1", eq).unwrap();
        let before = table.len();

        assert_eq!(table.insert(sip_hash(1), 1, "v2", eq).unwrap(), Some("v1"));
        assert_eq!(table.len(), before);
        assert_eq!(table.find(sip_hash(1), |&k| k == 1), Some((&1, &"v2")));
    }

    #[test]
    fn collision_chain_layout_and_backward_shift() {
        // Keys A, B, C all hash to bucket 0 of a 4-slot table: they must
        // land at slots 0, 1, 2 with displacements 0, 1, 2.
        let mut table: RobinTable<u64, char> = RobinTable::with_capacity(4).unwrap();
        table.insert(0, 10, 'a', eq).unwrap();
        table.insert(0, 11, 'b', eq).unwrap();
        table.insert(0, 12, 'c', eq).unwrap();

        for (i, key) in [(0usize, 10u64), (1, 11), (2, 12)] {
            assert_eq!(table.slots[i].dib, i as u32);
            assert_eq!(unsafe { *table.slots[i].key.assume_init_ref() }, key);
        }
        assert!(table.slots[3].is_empty());

        // Deleting A shifts B and C one slot back, each one probe closer to
        // the ideal bucket.
        assert_eq!(table.remove(0, |&k| k == 10), Some((10, 'a')));
        for (i, key) in [(0usize, 11u64), (1, 12)] {
            assert_eq!(table.slots[i].dib, i as u32);
            assert_eq!(unsafe { *table.slots[i].key.assume_init_ref() }, key);
        }
        assert!(table.slots[2].is_empty());
        assert!(table.slots[3].is_empty());
        check_invariants(&table);
    }

    #[test]
    fn richer_occupant_is_evicted() {
        let mut table: RobinTable<u64, char> = RobinTable::with_capacity(8).unwrap();
        // X sits in its ideal bucket 1; A fills bucket 0; B probes through
        // both and evicts X, which moves on to slot 2.
        table.insert(1, 100, 'x', eq).unwrap();
        table.insert(0, 200, 'a', eq).unwrap();
        table.insert(0, 201, 'b', eq).unwrap();

        assert_eq!(unsafe { *table.slots[1].key.assume_init_ref() }, 201);
        assert_eq!(table.slots[1].dib, 1);
        assert_eq!(unsafe { *table.slots[2].key.assume_init_ref() }, 100);
        assert_eq!(table.slots[2].dib, 1);
        check_invariants(&table);

        for (hash, key, value) in [(1u32, 100u64, 'x'), (0, 200, 'a'), (0, 201, 'b')] {
            assert_eq!(table.find(hash, |&k| k == key), Some((&key, &value)));
        }
    }

    #[test]
    fn full_table_rejects_new_key() {
        let mut table: RobinTable<u64, i32> = RobinTable::with_capacity(4).unwrap();
        for k in 0..4u64 {
            table.insert(k as u32, k, k as i32, eq).unwrap();
        }
        assert_eq!(table.len(), 4);

        let full = table.insert(sip_hash(77), 77, -7, eq).unwrap_err();
        assert_eq!((full.key, full.value), (77, -7));
        assert_eq!(table.len(), 4);
        for k in 0..4u64 {
            assert_eq!(table.find(k as u32, |&x| x == k), Some((&k, &(k as i32))));
        }
        check_invariants(&table);
    }

    #[test]
    fn full_table_rejects_colliding_new_key() {
        // Every key in bucket 0: the probe walk never meets a poorer entry
        // and must fail through displacement exhaustion instead.
        let mut table: RobinTable<u64, i32> = RobinTable::with_capacity(4).unwrap();
        for k in 0..4u64 {
            table.insert(0, k, k as i32, eq).unwrap();
        }

        let full = table.insert(0, 9, 9, eq).unwrap_err();
        assert_eq!((full.key, full.value), (9, 9));
        assert_eq!(table.len(), 4);
        check_invariants(&table);
    }

    #[test]
    fn update_succeeds_when_full() {
        let mut table: RobinTable<u64, i32> = RobinTable::with_capacity(4).unwrap();
        for k in 0..4u64 {
            table.insert(0, k, k as i32, eq).unwrap();
        }

        assert_eq!(table.insert(0, 2, 22, eq).unwrap(), Some(2));
        assert_eq!(table.len(), 4);
        assert_eq!(table.find(0, |&k| k == 2), Some((&2, &22)));
        check_invariants(&table);
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut table: RobinTable<u64, i32> = RobinTable::with_capacity(8).unwrap();
        table.insert(sip_hash(1), 1, 1, eq).unwrap();

        assert_eq!(table.remove(sip_hash(2), |&k| k == 2), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_preserves_other_entries() {
        let mut table: RobinTable<u64, i32> = RobinTable::with_capacity(16).unwrap();
        for k in 0..12u64 {
            table.insert(sip_hash(k), k, k as i32, eq).unwrap();
        }

        assert_eq!(table.remove(sip_hash(5), |&k| k == 5), Some((5, 5)));
        assert_eq!(table.find(sip_hash(5), |&k| k == 5), None);
        for k in (0..12u64).filter(|&k| k != 5) {
            assert_eq!(
                table.find(sip_hash(k), |&x| x == k),
                Some((&k, &(k as i32))),
                "{table:#?}"
            );
        }
        check_invariants(&table);
    }

    #[test]
    fn backward_shift_wraps_around() {
        // A chain rooted in the last bucket wraps to the front; the shift
        // after deleting its head must follow the wrap.
        let mut table: RobinTable<u64, char> = RobinTable::with_capacity(4).unwrap();
        table.insert(3, 30, 'a', eq).unwrap();
        table.insert(3, 31, 'b', eq).unwrap();
        table.insert(3, 32, 'c', eq).unwrap();

        assert_eq!(unsafe { *table.slots[3].key.assume_init_ref() }, 30);
        assert_eq!(unsafe { *table.slots[0].key.assume_init_ref() }, 31);
        assert_eq!(unsafe { *table.slots[1].key.assume_init_ref() }, 32);

        assert_eq!(table.remove(3, |&k| k == 30), Some((30, 'a')));
        assert_eq!(unsafe { *table.slots[3].key.assume_init_ref() }, 31);
        assert_eq!(table.slots[3].dib, 0);
        assert_eq!(unsafe { *table.slots[0].key.assume_init_ref() }, 32);
        assert_eq!(table.slots[0].dib, 1);
        assert!(table.slots[1].is_empty());
        check_invariants(&table);

        assert_eq!(table.find(3, |&k| k == 31), Some((&31, &'b')));
        assert_eq!(table.find(3, |&k| k == 32), Some((&32, &'c')));
    }

    #[test]
    fn shift_stops_at_ideal_bucket() {
        let mut table: RobinTable<u64, char> = RobinTable::with_capacity(8).unwrap();
        table.insert(0, 1, 'a', eq).unwrap();
        table.insert(0, 2, 'b', eq).unwrap();
        // Key in its own bucket right behind the chain must not move.
        table.insert(2, 3, 'c', eq).unwrap();

        table.remove(0, |&k| k == 1);
        assert_eq!(unsafe { *table.slots[0].key.assume_init_ref() }, 2);
        assert_eq!(unsafe { *table.slots[2].key.assume_init_ref() }, 3);
        assert!(table.slots[1].is_empty());
        check_invariants(&table);
    }

    #[test]
    fn resize_preserves_entries() {
        let mut table: RobinTable<u64, i32> = RobinTable::with_capacity(8).unwrap();
        for k in 0..6u64 {
            table.insert(sip_hash(k), k, k as i32 * 3, eq).unwrap();
        }
        let before: std::collections::HashMap<u64, i32> =
            table.iter().map(|(&k, &v)| (k, v)).collect();

        let table = table.resize(32).unwrap();
        let after: std::collections::HashMap<u64, i32> =
            table.iter().map(|(&k, &v)| (k, v)).collect();
        assert_eq!(before, after);
        assert_eq!(table.capacity(), 32);
        assert_eq!(table.len(), 6);
        check_invariants(&table);
        for k in 0..6u64 {
            assert_eq!(table.find(sip_hash(k), |&x| x == k), Some((&k, &(k as i32 * 3))));
        }

        // Shrinking to exactly the entry count must also replay cleanly.
        let table = table.resize(6).unwrap();
        assert_eq!(table.capacity(), 6);
        assert_eq!(table.len(), 6);
        check_invariants(&table);
        for k in 0..6u64 {
            assert_eq!(table.find(sip_hash(k), |&x| x == k), Some((&k, &(k as i32 * 3))));
        }
    }

    #[test]
    fn resize_same_capacity_is_identity() {
        let mut table: RobinTable<u64, i32> = RobinTable::with_capacity(8).unwrap();
        table.insert(sip_hash(1), 1, 1, eq).unwrap();

        let table = table.resize(8).unwrap();
        assert_eq!(table.capacity(), 8);
        assert_eq!(table.find(sip_hash(1), |&k| k == 1), Some((&1, &1)));
    }

    #[test]
    fn resize_rejects_truncation() {
        let mut table: RobinTable<u64, i32> = RobinTable::with_capacity(8).unwrap();
        for k in 0..3u64 {
            table.insert(sip_hash(k), k, k as i32, eq).unwrap();
        }

        let err = table.resize(2).unwrap_err();
        assert_eq!(
            err.error(),
            CapacityError::WouldTruncate {
                requested: 2,
                len: 3
            }
        );

        // The rejected table comes back intact and still usable.
        let mut table = err.into_table();
        assert_eq!(table.capacity(), 8);
        assert_eq!(table.len(), 3);
        for k in 0..3u64 {
            assert_eq!(table.find(sip_hash(k), |&x| x == k), Some((&k, &(k as i32))));
        }
        table.insert(sip_hash(3), 3, 3, eq).unwrap();
        check_invariants(&table);

        let err = table.resize(0).unwrap_err();
        assert_eq!(err.error(), CapacityError::TooSmall { requested: 0 });
    }

    #[test]
    fn iteration_follows_slot_order() {
        let mut table: RobinTable<u64, char> = RobinTable::with_capacity(8).unwrap();
        table.insert(6, 60, 'z', eq).unwrap();
        table.insert(1, 10, 'a', eq).unwrap();
        table.insert(4, 40, 'm', eq).unwrap();

        let keys: Vec<u64> = table.iter().map(|(&k, _)| k).collect();
        assert_eq!(keys, [10, 40, 60]);
        assert_eq!(table.iter().count(), table.len());
    }

    #[test]
    fn zero_sized_values() {
        let mut table: RobinTable<u64, ()> = RobinTable::with_capacity(8).unwrap();
        table.insert(sip_hash(1), 1, (), eq).unwrap();
        table.insert(sip_hash(2), 2, (), eq).unwrap();

        assert_eq!(table.find(sip_hash(1), |&k| k == 1), Some((&1, &())));
        assert_eq!(table.remove(sip_hash(1), |&k| k == 1), Some((1, ())));
        assert_eq!(table.len(), 1);
        check_invariants(&table);
    }

    #[test]
    fn average_displacement_diagnostic() {
        let mut table: RobinTable<u64, u64> = RobinTable::with_capacity(8).unwrap();
        assert!(table.average_displacement().is_nan());

        for k in 0..4u64 {
            table.insert(0, k, k, eq).unwrap();
        }
        // Displacements 0 + 1 + 2 + 3 over four entries.
        assert_eq!(table.average_displacement(), 1.5);
    }

    #[test]
    fn clear_drops_and_resets() {
        let mut table: RobinTable<u64, String> = RobinTable::with_capacity(8).unwrap();
        for k in 0..5u64 {
            table
                .insert(sip_hash(k), k, alloc::format!("value {k}"), |a, b| a == b)
                .unwrap();
        }

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.find(sip_hash(2), |&k| k == 2), None);

        table
            .insert(sip_hash(9), 9, "again".to_string(), |a, b| a == b)
            .unwrap();
        assert_eq!(table.len(), 1);
        check_invariants(&table);
    }

    #[test]
    fn drop_releases_owned_entries() {
        use std::rc::Rc;

        let marker = Rc::new(());
        {
            let mut table: RobinTable<u64, Rc<()>> = RobinTable::with_capacity(8).unwrap();
            for k in 0..4u64 {
                table.insert(sip_hash(k), k, Rc::clone(&marker), eq).unwrap();
            }
            assert_eq!(Rc::strong_count(&marker), 5);

            // Updates and removals must drop the replaced/removed values.
            table.insert(sip_hash(0), 0, Rc::clone(&marker), eq).unwrap();
            assert_eq!(Rc::strong_count(&marker), 5);
            table.remove(sip_hash(1), |&k| k == 1);
            assert_eq!(Rc::strong_count(&marker), 4);
        }
        assert_eq!(Rc::strong_count(&marker), 1);
    }

    #[test]
    fn clone_is_independent() {
        let mut table: RobinTable<u64, String> = RobinTable::with_capacity(8).unwrap();
        for k in 0..4u64 {
            table
                .insert(sip_hash(k), k, alloc::format!("{k}"), |a, b| a == b)
                .unwrap();
        }

        let snapshot = table.clone();
        table.remove(sip_hash(0), |&k| k == 0);
        table
            .insert(sip_hash(1), 1, "changed".to_string(), |a, b| a == b)
            .unwrap();

        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.find(sip_hash(0), |&k| k == 0).map(|(_, v)| v.as_str()), Some("0"));
        assert_eq!(snapshot.find(sip_hash(1), |&k| k == 1).map(|(_, v)| v.as_str()), Some("1"));
        check_invariants(&snapshot);
    }

    #[cfg(feature = "stats")]
    #[test]
    fn displacement_histogram_counts_slots() {
        let mut table: RobinTable<u64, u64> = RobinTable::with_capacity(8).unwrap();
        assert!(table.displacement_histogram().is_empty());

        for k in 0..3u64 {
            table.insert(0, k, k, eq).unwrap();
        }
        assert_eq!(table.displacement_histogram(), [1, 1, 1]);
    }

    #[test]
    fn randomized_against_std() {
        let mut rng = SmallRng::seed_from_u64(0x0b1e_55ed);
        let mut table: RobinTable<u64, i32> = RobinTable::with_capacity(512).unwrap();
        let mut mirror = std::collections::HashMap::new();

        for step in 0..20_000u32 {
            let k = rng.random_range(0..256u64);
            match rng.random_range(0..4u32) {
                0 | 1 => {
                    let v = rng.random::<i32>();
                    let previous = table.insert(sip_hash(k), k, v, eq).unwrap();
                    assert_eq!(previous, mirror.insert(k, v));
                }
                2 => {
                    let removed = table.remove(sip_hash(k), |&x| x == k).map(|(_, v)| v);
                    assert_eq!(removed, mirror.remove(&k));
                }
                _ => {
                    let found = table.find(sip_hash(k), |&x| x == k).map(|(_, v)| *v);
                    assert_eq!(found, mirror.get(&k).copied());
                }
            }
            if step % 1000 == 0 {
                check_invariants(&table);
            }
        }

        check_invariants(&table);
        assert_eq!(table.len(), mirror.len());
        for (&k, &v) in table.iter() {
            assert_eq!(mirror.get(&k), Some(&v));
        }
    }
}
