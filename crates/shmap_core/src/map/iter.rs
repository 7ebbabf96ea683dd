//! Iterators over the live contents of a map.
//!
//! Iteration is a cursor over `(segment, slot)` positions. Each step locks
//! one segment just long enough to copy out the next live entry, so the
//! iterator never holds a lock between calls and never buffers the map.
//! Removing the element just yielded through the iterator is supported;
//! mutations made through other paths while iterating may cause an element
//! to be skipped or seen twice, never a corrupted store.

use super::shared_map::SharedMap;
use crate::codec::{Decode, Encode};
use crate::error::{StoreError, StoreResult};
use crate::segment::RawEntry;
use crate::store::SegmentedStore;
use std::borrow::Borrow;

/// Position in a scan over all segments.
pub(crate) struct Cursor<'m> {
    store: &'m SegmentedStore,
    segment: usize,
    slot: u32,
    finished: bool,
    last_key: Option<Vec<u8>>,
}

impl<'m> Cursor<'m> {
    pub(crate) fn new(store: &'m SegmentedStore) -> Self {
        Self {
            store,
            segment: 0,
            slot: 0,
            finished: false,
            last_key: None,
        }
    }

    pub(crate) fn advance(&mut self) -> Option<StoreResult<RawEntry>> {
        if self.finished {
            return None;
        }
        match self.store.next_entry(self.segment, self.slot) {
            Ok(Some((segment, entry))) => {
                self.segment = segment;
                self.slot = entry.slot + 1;
                self.last_key = Some(entry.key.clone());
                Some(Ok(entry))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }

    fn take_last(&mut self) -> StoreResult<Vec<u8>> {
        self.last_key.take().ok_or_else(|| {
            StoreError::invalid_operation("iterator has no element to remove")
        })
    }
}

fn remove_last<K, V>(map: &SharedMap<K, V>, cursor: &mut Cursor<'_>) -> StoreResult<()> {
    let key = cursor.take_last()?;
    map.remove_raw(&key)?;
    Ok(())
}

/// Iterator over keys.
pub struct KeyIter<'m, K, V> {
    map: &'m SharedMap<K, V>,
    cursor: Cursor<'m>,
}

impl<'m, K, V> KeyIter<'m, K, V> {
    pub(crate) fn new(map: &'m SharedMap<K, V>) -> Self {
        Self {
            map,
            cursor: map.cursor(),
        }
    }

    /// Removes the key returned by the last call to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidOperation`] if nothing has been yielded
    /// since the last removal.
    pub fn remove(&mut self) -> StoreResult<()> {
        remove_last(self.map, &mut self.cursor)
    }
}

impl<K: Decode, V> Iterator for KeyIter<'_, K, V> {
    type Item = StoreResult<K>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor
            .advance()
            .map(|entry| entry.and_then(|e| K::decode(&e.key)))
    }
}

/// Iterator over values.
pub struct ValueIter<'m, K, V> {
    map: &'m SharedMap<K, V>,
    cursor: Cursor<'m>,
}

impl<'m, K, V> ValueIter<'m, K, V> {
    pub(crate) fn new(map: &'m SharedMap<K, V>) -> Self {
        Self {
            map,
            cursor: map.cursor(),
        }
    }

    /// Removes the entry whose value was returned by the last call to `next`.
    pub fn remove(&mut self) -> StoreResult<()> {
        remove_last(self.map, &mut self.cursor)
    }
}

impl<K, V: Decode> Iterator for ValueIter<'_, K, V> {
    type Item = StoreResult<V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor
            .advance()
            .map(|entry| entry.and_then(|e| V::decode(&e.value)))
    }
}

/// Iterator over entries.
pub struct EntryIter<'m, K, V> {
    map: &'m SharedMap<K, V>,
    cursor: Cursor<'m>,
}

impl<'m, K, V> EntryIter<'m, K, V> {
    pub(crate) fn new(map: &'m SharedMap<K, V>) -> Self {
        Self {
            map,
            cursor: map.cursor(),
        }
    }

    /// Removes the entry returned by the last call to `next`.
    pub fn remove(&mut self) -> StoreResult<()> {
        remove_last(self.map, &mut self.cursor)
    }
}

impl<'m, K: Decode, V: Decode> Iterator for EntryIter<'m, K, V> {
    type Item = StoreResult<MapEntry<'m, K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        let map = self.map;
        self.cursor.advance().map(|entry| {
            entry.and_then(|e| {
                Ok(MapEntry {
                    map,
                    key: K::decode(&e.key)?,
                    value: V::decode(&e.value)?,
                })
            })
        })
    }
}

/// An entry yielded by [`EntryIter`].
///
/// Holds copies of the key and value as they were when yielded;
/// [`set_value`](Self::set_value) writes through to the map.
pub struct MapEntry<'m, K, V> {
    map: &'m SharedMap<K, V>,
    key: K,
    value: V,
}

impl<K, V> MapEntry<'_, K, V> {
    /// The entry's key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The entry's value as last seen or set through this entry.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the entry, returning its key and value.
    pub fn into_pair(self) -> (K, V) {
        (self.key, self.value)
    }
}

impl<K, V> MapEntry<'_, K, V>
where
    K: Encode + Decode,
    V: Encode + Decode,
{
    /// Replaces the stored value, returning the one it overwrote.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidOperation`] if the entry was removed
    /// since it was yielded.
    pub fn set_value<R>(&mut self, value: &R) -> StoreResult<V>
    where
        V: Borrow<R>,
        R: Encode + ?Sized,
    {
        let previous = self
            .map
            .replace(&self.key, value)?
            .ok_or_else(|| StoreError::invalid_operation("entry was removed from the map"))?;
        self.value = V::decode(&value.encode())?;
        Ok(previous)
    }
}

impl<K: std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug for MapEntry<'_, K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapEntry")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}
