use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::mem;

use crate::DefaultHashBuilder;
use crate::error::TableFull;
use crate::table::Iter as TableIter;
use crate::table::MIN_CAPACITY;
use crate::table::RobinTable;

/// Builds a table for the wrapper, clamping the request to the table's
/// minimum capacity.
fn sized_table<K, V>(capacity: usize) -> RobinTable<K, V> {
    match RobinTable::with_capacity(capacity.max(MIN_CAPACITY)) {
        Ok(table) => table,
        Err(_) => panic!("capacity overflow"),
    }
}

/// A key-value map backed by a [`RobinTable`].
///
/// `RobinMap<K, V, S>` fixes the key and value types and a hasher builder
/// `S` at binding time, generating the typed surface over the raw table:
/// keys implement `Hash + Eq`, hashes are computed by `S` and truncated to
/// the table's 32-bit cached width, and a full table is grown by doubling
/// and retrying — the one piece of resize policy in the crate, layered here
/// rather than in the engine.
///
/// # Examples
///
/// ```rust
/// use robin_table::RobinMap;
///
/// let mut map: RobinMap<&str, i32> = RobinMap::new();
/// map.insert("answer", 42);
///
/// assert_eq!(map.get(&"answer"), Some(&42));
/// assert_eq!(map.get(&"question"), None);
/// ```
#[derive(Clone)]
pub struct RobinMap<K, V, S = DefaultHashBuilder> {
    table: RobinTable<K, V>,
    hash_builder: S,
}

impl<K, V, S> RobinMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty map with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::DefaultHashBuilder;
    /// use robin_table::RobinMap;
    ///
    /// let map: RobinMap<u64, String> = RobinMap::with_hasher(DefaultHashBuilder::default());
    /// assert!(map.is_empty());
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates a map with at least `capacity` slots and the given hasher
    /// builder.
    ///
    /// Requests below the table minimum are rounded up to it.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: sized_table(capacity),
            hash_builder,
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinMap;
    ///
    /// let mut map: RobinMap<i32, &str> = RobinMap::new();
    /// assert_eq!(map.len(), 0);
    /// map.insert(1, "a");
    /// assert_eq!(map.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the capacity of the underlying table.
    ///
    /// Unlike load-factor based maps, every slot is usable: the map only
    /// grows once all `capacity` slots are occupied.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all entries, keeping the allocated capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinMap;
    ///
    /// let mut map: RobinMap<i32, &str> = RobinMap::new();
    /// map.insert(1, "a");
    /// map.clear();
    /// assert!(map.is_empty());
    /// ```
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Mean displacement over the occupied slots of the underlying table.
    ///
    /// Diagnostic only. Returns NaN on an empty map — callers must guard.
    pub fn average_displacement(&self) -> f64 {
        self.table.average_displacement()
    }

    fn hash_of(&self, key: &K) -> u32 {
        self.hash_builder.hash_one(key) as u32
    }

    /// Inserts a key-value pair into the map.
    ///
    /// Returns the previous value if the key was already present, `None`
    /// otherwise. When the table is full and the key is new, the map doubles
    /// its capacity and retries; insertion therefore never fails.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinMap;
    ///
    /// let mut map: RobinMap<i32, &str> = RobinMap::new();
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.insert(37, "b"), Some("a"));
    /// assert_eq!(map.get(&37), Some(&"b"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.hash_of(&key);
        match self.table.insert(hash, key, value, |a, b| a == b) {
            Ok(previous) => previous,
            Err(full) => self.grow_and_insert(hash, full),
        }
    }

    #[cold]
    #[inline(never)]
    fn grow_and_insert(&mut self, hash: u32, full: TableFull<K, V>) -> Option<V> {
        let TableFull { key, value } = full;
        let doubled = match self.table.capacity().checked_mul(2) {
            Some(doubled) => doubled,
            None => panic!("capacity overflow"),
        };

        // `resize` consumes the table, so park a minimal one in its place
        // while the rebuild runs.
        let table = mem::replace(&mut self.table, RobinTable::with_slots(MIN_CAPACITY));
        self.table = match table.resize(doubled) {
            Ok(table) => table,
            // Doubling can only be rejected by outgrowing the u32 slot
            // range.
            Err(_) => panic!("capacity overflow"),
        };

        match self.table.insert(hash, key, value, |a, b| a == b) {
            Ok(previous) => previous,
            Err(_) => unreachable!("insert cannot fail after growth"),
        }
    }

    /// Returns a reference to the value for `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinMap;
    ///
    /// let mut map: RobinMap<i32, &str> = RobinMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.get(&1), Some(&"a"));
    /// assert_eq!(map.get(&2), None);
    /// ```
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hash_of(key);
        self.table.find(hash, |k| k == key).map(|(_, v)| v)
    }

    /// Returns the stored key-value pair for `key`.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        let hash = self.hash_of(key);
        self.table.find(hash, |k| k == key)
    }

    /// Returns a mutable reference to the value for `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinMap;
    ///
    /// let mut map: RobinMap<i32, i32> = RobinMap::new();
    /// map.insert(1, 10);
    /// if let Some(v) = map.get_mut(&1) {
    ///     *v += 1;
    /// }
    /// assert_eq!(map.get(&1), Some(&11));
    /// ```
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = self.hash_of(key);
        self.table.find_mut(hash, |k| k == key).map(|(_, v)| v)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes `key` from the map, returning its value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinMap;
    ///
    /// let mut map: RobinMap<i32, &str> = RobinMap::new();
    /// map.insert(1, "a");
    /// assert_eq!(map.remove(&1), Some("a"));
    /// assert_eq!(map.remove(&1), None);
    /// ```
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let hash = self.hash_of(key);
        self.table.remove(hash, |k| k == key).map(|(_, v)| v)
    }

    /// Removes `key` from the map, returning the stored key and value.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let hash = self.hash_of(key);
        self.table.remove(hash, |k| k == key)
    }

    /// Returns an iterator over the map's entries in table slot order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinMap;
    ///
    /// let mut map: RobinMap<i32, &str> = RobinMap::new();
    /// map.insert(1, "one");
    /// map.insert(2, "two");
    ///
    /// for (key, value) in map.iter() {
    ///     println!("{key}: {value}");
    /// }
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the map's keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the map's values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }
}

impl<K, V, S> RobinMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates an empty map using the default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinMap;
    ///
    /// let map: RobinMap<u64, String> = RobinMap::new();
    /// assert!(map.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a map with at least `capacity` slots using the default hasher
    /// builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_table::RobinMap;
    ///
    /// let map: RobinMap<u64, String> = RobinMap::with_capacity(100);
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S> Default for RobinMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Debug for RobinMap<K, V, S>
where
    K: Debug + Hash + Eq,
    V: Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

impl<K, V, S> FromIterator<(K, V)> for RobinMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K, V, S> Extend<(K, V)> for RobinMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a RobinMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

/// An iterator over the entries of a [`RobinMap`].
pub struct Iter<'a, K, V> {
    inner: TableIter<'a, K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// An iterator over the keys of a [`RobinMap`].
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
}

/// An iterator over the values of a [`RobinMap`].
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }
}
