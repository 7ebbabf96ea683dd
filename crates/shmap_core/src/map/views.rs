//! Live collection views.
//!
//! [`KeySet`], [`ValuesView`] and [`EntrySet`] hold nothing but a reference
//! to the map. Every call reads or mutates the store directly, so a change
//! made through the map or any view is visible through all of them.
//! Membership tests compare encoded bytes.

use super::iter::{EntryIter, KeyIter, ValueIter};
use super::shared_map::SharedMap;
use crate::codec::{Decode, Encode};
use crate::error::StoreResult;
use std::borrow::Borrow;
use std::collections::HashSet;

fn encode_all<'a, T, I>(items: I) -> HashSet<Vec<u8>>
where
    T: Encode + ?Sized + 'a,
    I: IntoIterator<Item = &'a T>,
{
    items.into_iter().map(|item| item.encode().into_owned()).collect()
}

/// Live view of a map's keys.
pub struct KeySet<'m, K, V> {
    map: &'m SharedMap<K, V>,
}

impl<'m, K, V> KeySet<'m, K, V>
where
    K: Encode + Decode,
    V: Encode + Decode,
{
    pub(crate) fn new(map: &'m SharedMap<K, V>) -> Self {
        Self { map }
    }

    /// Number of keys.
    pub fn len(&self) -> StoreResult<usize> {
        self.map.len()
    }

    /// Returns `true` if the map is empty.
    pub fn is_empty(&self) -> StoreResult<bool> {
        self.map.is_empty()
    }

    /// Returns `true` if `key` is present.
    pub fn contains<Q>(&self, key: &Q) -> StoreResult<bool>
    where
        K: Borrow<Q>,
        Q: Encode + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Removes `key` from the map.
    pub fn remove<Q>(&self, key: &Q) -> StoreResult<bool>
    where
        K: Borrow<Q>,
        Q: Encode + ?Sized,
    {
        self.map.remove_raw(&key.encode())
    }

    /// Removes every listed key. Returns `true` if anything was removed.
    pub fn remove_all<'a, Q, I>(&self, keys: I) -> StoreResult<bool>
    where
        K: Borrow<Q>,
        Q: Encode + ?Sized + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        let mut changed = false;
        for key in keys {
            changed |= self.map.remove_raw(&key.encode())?;
        }
        Ok(changed)
    }

    /// Removes every key not listed. Returns `true` if anything was removed.
    pub fn retain_all<'a, Q, I>(&self, keys: I) -> StoreResult<bool>
    where
        K: Borrow<Q>,
        Q: Encode + ?Sized + 'a,
        I: IntoIterator<Item = &'a Q>,
    {
        let keep = encode_all(keys);
        self.map.remove_where(|key, _| !keep.contains(key))
    }

    /// Clears the whole map.
    pub fn clear(&self) -> StoreResult<()> {
        self.map.clear()
    }

    /// Iterates over the keys.
    pub fn iter(&self) -> KeyIter<'m, K, V> {
        KeyIter::new(self.map)
    }
}

/// Live view of a map's values.
pub struct ValuesView<'m, K, V> {
    map: &'m SharedMap<K, V>,
}

impl<'m, K, V> ValuesView<'m, K, V>
where
    K: Encode + Decode,
    V: Encode + Decode,
{
    pub(crate) fn new(map: &'m SharedMap<K, V>) -> Self {
        Self { map }
    }

    /// Number of values.
    pub fn len(&self) -> StoreResult<usize> {
        self.map.len()
    }

    /// Returns `true` if the map is empty.
    pub fn is_empty(&self) -> StoreResult<bool> {
        self.map.is_empty()
    }

    /// Returns `true` if some entry holds `value`. Scans the map.
    pub fn contains<R>(&self, value: &R) -> StoreResult<bool>
    where
        V: Borrow<R>,
        R: Encode + ?Sized,
    {
        let wanted = value.encode();
        let mut cursor = self.map.cursor();
        while let Some(entry) = cursor.advance() {
            if entry?.value == *wanted {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Removes one entry holding `value`.
    pub fn remove<R>(&self, value: &R) -> StoreResult<bool>
    where
        V: Borrow<R>,
        R: Encode + ?Sized,
    {
        let wanted = value.encode();
        let mut removed = false;
        self.map.remove_where(|_, current| {
            if removed || current != &*wanted {
                return false;
            }
            removed = true;
            true
        })
    }

    /// Removes every entry holding one of `values`.
    pub fn remove_all<'a, R, I>(&self, values: I) -> StoreResult<bool>
    where
        V: Borrow<R>,
        R: Encode + ?Sized + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let doomed = encode_all(values);
        self.map.remove_where(|_, value| doomed.contains(value))
    }

    /// Removes every entry whose value is not among `values`.
    pub fn retain_all<'a, R, I>(&self, values: I) -> StoreResult<bool>
    where
        V: Borrow<R>,
        R: Encode + ?Sized + 'a,
        I: IntoIterator<Item = &'a R>,
    {
        let keep = encode_all(values);
        self.map.remove_where(|_, value| !keep.contains(value))
    }

    /// Clears the whole map.
    pub fn clear(&self) -> StoreResult<()> {
        self.map.clear()
    }

    /// Iterates over the values.
    pub fn iter(&self) -> ValueIter<'m, K, V> {
        ValueIter::new(self.map)
    }
}

/// Live view of a map's entries.
pub struct EntrySet<'m, K, V> {
    map: &'m SharedMap<K, V>,
}

impl<'m, K, V> EntrySet<'m, K, V>
where
    K: Encode + Decode,
    V: Encode + Decode,
{
    pub(crate) fn new(map: &'m SharedMap<K, V>) -> Self {
        Self { map }
    }

    /// Number of entries.
    pub fn len(&self) -> StoreResult<usize> {
        self.map.len()
    }

    /// Returns `true` if the map is empty.
    pub fn is_empty(&self) -> StoreResult<bool> {
        self.map.is_empty()
    }

    /// Returns `true` if `key` currently maps to `value`.
    pub fn contains<Q, R>(&self, key: &Q, value: &R) -> StoreResult<bool>
    where
        K: Borrow<Q>,
        V: Borrow<R>,
        Q: Encode + ?Sized,
        R: Encode + ?Sized,
    {
        let current = self.map.store().read(&key.encode())?;
        Ok(current.is_some_and(|bytes| bytes == *value.encode()))
    }

    /// Removes the entry `key -> value` if the map still holds it.
    pub fn remove<Q, R>(&self, key: &Q, value: &R) -> StoreResult<bool>
    where
        K: Borrow<Q>,
        V: Borrow<R>,
        Q: Encode + ?Sized,
        R: Encode + ?Sized,
    {
        self.map.remove_if(key, value)
    }

    /// Removes every listed entry the map still holds.
    pub fn remove_all<'a, Q, R, I>(&self, entries: I) -> StoreResult<bool>
    where
        K: Borrow<Q>,
        V: Borrow<R>,
        Q: Encode + ?Sized + 'a,
        R: Encode + ?Sized + 'a,
        I: IntoIterator<Item = (&'a Q, &'a R)>,
    {
        let mut changed = false;
        for (key, value) in entries {
            changed |= self.map.remove_if(key, value)?;
        }
        Ok(changed)
    }

    /// Removes every entry not listed.
    pub fn retain_all<'a, Q, R, I>(&self, entries: I) -> StoreResult<bool>
    where
        K: Borrow<Q>,
        V: Borrow<R>,
        Q: Encode + ?Sized + 'a,
        R: Encode + ?Sized + 'a,
        I: IntoIterator<Item = (&'a Q, &'a R)>,
    {
        let keep: HashSet<(Vec<u8>, Vec<u8>)> = entries
            .into_iter()
            .map(|(k, v)| (k.encode().into_owned(), v.encode().into_owned()))
            .collect();
        self.map
            .remove_where(|key, value| !keep.contains(&(key.to_vec(), value.to_vec())))
    }

    /// Clears the whole map.
    pub fn clear(&self) -> StoreResult<()> {
        self.map.clear()
    }

    /// Iterates over the entries.
    pub fn iter(&self) -> EntryIter<'m, K, V> {
        EntryIter::new(self.map)
    }
}
