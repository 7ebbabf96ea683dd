//! Typed concurrent map over a segmented store.

use super::iter::{Cursor, EntryIter, KeyIter, ValueIter};
use super::views::{EntrySet, KeySet, ValuesView};
use crate::codec::{Decode, Encode};
use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::layout::StoreLayout;
use crate::statemachine::StateMachineData;
use crate::stats::StoreStats;
use crate::store::SegmentedStore;
use crate::view::{IntValue, LongValue, Schema, SchemaRegistry, ValueRecord, ValueView};
use std::borrow::Borrow;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

/// A concurrent map whose entries live in a mapped region.
///
/// Keys and values are stored as encoded bytes (see [`Encode`] and
/// [`Decode`]). Every operation is routed to the segment owning the key and
/// completes under that segment's lock; operations on different segments run
/// in parallel. When the map is file-backed, any process opening the same
/// file with the same configuration sees the same entries.
///
/// # Example
///
/// ```rust,ignore
/// use shmap_core::{Config, SharedMap};
///
/// let map: SharedMap<String, String> = SharedMap::open(Config::new())?;
/// map.put("key1", "one")?;
/// assert_eq!(map.get("key1")?, Some("one".to_string()));
/// ```
pub struct SharedMap<K, V> {
    store: SegmentedStore,
    config: Config,
    registry: SchemaRegistry,
    value_schema: Option<Arc<Schema>>,
    stats: StoreStats,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> SharedMap<K, V> {
    /// Creates or opens a map.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the backing file
    /// cannot be opened, or an existing file has a different layout.
    pub fn open(config: Config) -> StoreResult<Self> {
        let store = SegmentedStore::open(&config)?;

        let registry = SchemaRegistry::new();
        registry.register(LongValue::schema())?;
        registry.register(IntValue::schema())?;
        registry.register(StateMachineData::schema())?;
        let value_schema = config
            .value_schema
            .clone()
            .map(|schema| registry.register(schema))
            .transpose()?;

        Ok(Self {
            store,
            config,
            registry,
            value_schema,
            stats: StoreStats::new(),
            _types: PhantomData,
        })
    }

    fn track<T>(&self, result: StoreResult<T>) -> StoreResult<T> {
        if let Err(err) = &result {
            self.stats.record_error(err);
        }
        result
    }

    /// Returns the configuration the map was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the region geometry.
    #[must_use]
    pub fn layout(&self) -> &StoreLayout {
        self.store.layout()
    }

    /// Returns the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.store.region().path()
    }

    /// Returns the operation counters of this handle.
    #[must_use]
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Returns the schema registry.
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub(crate) fn store(&self) -> &SegmentedStore {
        &self.store
    }

    /// Number of live entries, summed across segments without a global lock.
    pub fn len(&self) -> StoreResult<usize> {
        self.track(self.store.len())
    }

    /// Returns `true` if the map has no entries.
    pub fn is_empty(&self) -> StoreResult<bool> {
        self.track(self.store.is_empty())
    }

    /// Removes every entry.
    ///
    /// Segments are cleared one after another; entries inserted concurrently
    /// into an already cleared segment survive.
    pub fn clear(&self) -> StoreResult<()> {
        let removed = self.track(self.store.clear())?;
        tracing::debug!(removed, "cleared map");
        Ok(())
    }

    /// Flushes a file-backed map to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.track(self.store.flush())?;
        tracing::info!(path = ?self.path(), "flushed map");
        Ok(())
    }

    /// Flushes and unmaps the region.
    ///
    /// Views obtained from this map fail with [`StoreError::StoreClosed`]
    /// afterwards.
    pub fn close(self) -> StoreResult<()> {
        self.store.flush()?;
        tracing::info!(
            path = ?self.path(),
            entries = self.store.len().unwrap_or_default(),
            "closed map"
        );
        Ok(())
    }

    /// Registers an additional record layout for [`view_for`](Self::view_for).
    pub fn register_schema(&self, schema: Schema) -> StoreResult<Arc<Schema>> {
        self.registry.register(schema)
    }

    /// Creates an unbound view of the configured value schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidOperation`] if no value schema was configured.
    pub fn new_view(&self) -> StoreResult<ValueView> {
        self.value_schema
            .as_ref()
            .map(|schema| ValueView::new(Arc::clone(schema)))
            .ok_or_else(|| StoreError::invalid_operation("map has no value schema"))
    }

    /// Creates an unbound view of the registered schema called `name`.
    pub fn view_for(&self, name: &str) -> StoreResult<ValueView> {
        self.registry
            .get(name)
            .map(ValueView::new)
            .ok_or_else(|| StoreError::invalid_operation(format!("schema {name} is not registered")))
    }

    fn view_or_new(&self, using: Option<ValueView>) -> StoreResult<ValueView> {
        match using {
            Some(view) => Ok(view),
            None => self.new_view(),
        }
    }

    /// Removes the entry with encoded key `key`.
    pub(crate) fn remove_raw(&self, key: &[u8]) -> StoreResult<bool> {
        let removed = self.track(self.store.remove(key))?;
        if removed {
            self.stats.record_remove();
        }
        Ok(removed)
    }

    /// Removes every entry for which `doomed` holds, comparing on the value
    /// seen during the scan so concurrently rewritten entries are kept.
    pub(crate) fn remove_where<F>(&self, mut doomed: F) -> StoreResult<bool>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.stats.record_scan();
        let mut cursor = Cursor::new(&self.store);
        let mut changed = false;
        while let Some(entry) = cursor.advance() {
            let entry = self.track(entry)?;
            if doomed(&entry.key, &entry.value)
                && self.track(self.store.remove_if_matches(&entry.key, &entry.value))?
            {
                self.stats.record_remove();
                changed = true;
            }
        }
        Ok(changed)
    }

    pub(crate) fn cursor(&self) -> Cursor<'_> {
        self.stats.record_scan();
        Cursor::new(&self.store)
    }
}

impl<K, V> SharedMap<K, V>
where
    K: Encode + Decode,
    V: Encode + Decode,
{
    /// Copies out the value for `key`.
    pub fn get<Q>(&self, key: &Q) -> StoreResult<Option<V>>
    where
        K: Borrow<Q>,
        Q: Encode + ?Sized,
    {
        match self.track(self.store.read(&key.encode()))? {
            Some(bytes) => {
                self.stats.record_read(bytes.len());
                self.track(V::decode(&bytes)).map(Some)
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    /// Returns `true` if `key` has an entry.
    pub fn contains_key<Q>(&self, key: &Q) -> StoreResult<bool>
    where
        K: Borrow<Q>,
        Q: Encode + ?Sized,
    {
        self.track(self.store.contains(&key.encode()))
    }

    /// Inserts or overwrites `key`.
    ///
    /// Returns the previous value, or `None` if there was none or the map
    /// was configured with `put_returns_null`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntryTooLarge`] or [`StoreError::KeyTooLarge`]
    /// without touching the store, and [`StoreError::CapacityExceeded`] if
    /// the owning segment is full.
    pub fn put<Q, R>(&self, key: &Q, value: &R) -> StoreResult<Option<V>>
    where
        K: Borrow<Q>,
        V: Borrow<R>,
        Q: Encode + ?Sized,
        R: Encode + ?Sized,
    {
        let value = value.encode();
        let previous = self.track(self.store.put(
            &key.encode(),
            &value,
            !self.config.put_returns_null,
        ))?;
        self.stats.record_write(value.len());
        previous.map(|bytes| self.track(V::decode(&bytes))).transpose()
    }

    /// Removes `key`.
    ///
    /// Returns the removed value, or `None` if there was none or the map was
    /// configured with `remove_returns_null`.
    pub fn remove<Q>(&self, key: &Q) -> StoreResult<Option<V>>
    where
        K: Borrow<Q>,
        Q: Encode + ?Sized,
    {
        let key = key.encode();
        if self.config.remove_returns_null {
            self.remove_raw(&key)?;
            return Ok(None);
        }
        match self.track(self.store.take(&key))? {
            Some(bytes) => {
                self.stats.record_remove();
                self.track(V::decode(&bytes)).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Removes `key` only if it currently maps to `expected`.
    pub fn remove_if<Q, R>(&self, key: &Q, expected: &R) -> StoreResult<bool>
    where
        K: Borrow<Q>,
        V: Borrow<R>,
        Q: Encode + ?Sized,
        R: Encode + ?Sized,
    {
        let removed =
            self.track(self.store.remove_if_matches(&key.encode(), &expected.encode()))?;
        if removed {
            self.stats.record_remove();
        }
        Ok(removed)
    }

    /// Overwrites `key` only if it is present, returning the old value.
    pub fn replace<Q, R>(&self, key: &Q, value: &R) -> StoreResult<Option<V>>
    where
        K: Borrow<Q>,
        V: Borrow<R>,
        Q: Encode + ?Sized,
        R: Encode + ?Sized,
    {
        let value = value.encode();
        let previous = self.track(self.store.replace(&key.encode(), &value))?;
        if previous.is_some() {
            self.stats.record_write(value.len());
        }
        previous.map(|bytes| self.track(V::decode(&bytes))).transpose()
    }

    /// Overwrites `key` only if it currently maps to `expected`.
    pub fn replace_if<Q, R>(&self, key: &Q, expected: &R, value: &R) -> StoreResult<bool>
    where
        K: Borrow<Q>,
        V: Borrow<R>,
        Q: Encode + ?Sized,
        R: Encode + ?Sized,
    {
        let value = value.encode();
        let replaced = self.track(self.store.replace_if_matches(
            &key.encode(),
            &expected.encode(),
            &value,
        ))?;
        if replaced {
            self.stats.record_write(value.len());
        }
        Ok(replaced)
    }
}

/// Zero-copy access. These only need the key to be encodable, so maps whose
/// values are records (`SharedMap<String, LongValue>`) can use them.
impl<K, V> SharedMap<K, V> {
    /// Binds a view to the existing entry for `key`.
    ///
    /// Rebinds `using` when given, otherwise creates a view of the configured
    /// value schema. Returns `None` without allocating if `key` is absent.
    /// A stored value shorter than the view's record is zero-extended first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntryTooLarge`] if the record is larger than the
    /// configured entry size, and [`StoreError::InvalidOperation`] if `using`
    /// is `None`, the map has no value schema and `key` is present.
    pub fn get_using<Q>(&self, key: &Q, using: Option<ValueView>) -> StoreResult<Option<ValueView>>
    where
        K: Borrow<Q>,
        Q: Encode + ?Sized,
    {
        let encoded = key.encode();
        let mut view = match using {
            Some(view) => view,
            None => match self.new_view() {
                Ok(view) => view,
                Err(err) if self.track(self.store.contains(&encoded))? => return Err(err),
                Err(_) => {
                    self.stats.record_miss();
                    return Ok(None);
                }
            },
        };
        let min_len = view.schema().size();
        match self.track(self.store.get_sized(&encoded, min_len))? {
            Some(location) => {
                self.stats.record_read(0);
                self.track(view.bind_entry(self.store.region(), &location))?;
                Ok(Some(view))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    /// Binds a view to the entry for `key`, creating a zero-filled entry
    /// sized for the view's schema if absent.
    ///
    /// Concurrent callers for the same absent key all end up bound to the
    /// one entry created by whichever of them took the segment lock first.
    pub fn acquire_using<Q>(&self, key: &Q, using: Option<ValueView>) -> StoreResult<ValueView>
    where
        K: Borrow<Q>,
        Q: Encode + ?Sized,
    {
        let mut view = self.view_or_new(using)?;
        let location = self.track(
            self.store
                .acquire(&key.encode(), view.schema().size()),
        )?;
        self.stats.record_acquire();
        self.track(view.bind_entry(self.store.region(), &location))?;
        Ok(view)
    }

    /// Returns the typed record stored for `key`, if present.
    pub fn get_record<Q, R>(&self, key: &Q) -> StoreResult<Option<R>>
    where
        K: Borrow<Q>,
        Q: Encode + ?Sized,
        R: ValueRecord,
    {
        let view = ValueView::new(self.registry.register(R::schema())?);
        self.get_using(key, Some(view))?
            .map(R::from_view)
            .transpose()
    }

    /// Returns the typed record for `key`, creating a zeroed one if absent.
    pub fn acquire_record<Q, R>(&self, key: &Q) -> StoreResult<R>
    where
        K: Borrow<Q>,
        Q: Encode + ?Sized,
        R: ValueRecord,
    {
        let view = ValueView::new(self.registry.register(R::schema())?);
        R::from_view(self.acquire_using(key, Some(view))?)
    }
}

impl<K, V> SharedMap<K, V>
where
    K: Encode + Decode,
    V: Encode + Decode,
{
    /// Live view of the keys.
    #[must_use]
    pub fn key_set(&self) -> KeySet<'_, K, V> {
        KeySet::new(self)
    }

    /// Live view of the values.
    #[must_use]
    pub fn values(&self) -> ValuesView<'_, K, V> {
        ValuesView::new(self)
    }

    /// Live view of the entries.
    #[must_use]
    pub fn entry_set(&self) -> EntrySet<'_, K, V> {
        EntrySet::new(self)
    }

    /// Iterates over the entries; shorthand for `entry_set().iter()`.
    pub fn iter(&self) -> EntryIter<'_, K, V> {
        EntryIter::new(self)
    }

    /// Iterates over the keys.
    pub fn keys(&self) -> KeyIter<'_, K, V> {
        KeyIter::new(self)
    }

    /// Iterates over the values.
    pub fn value_iter(&self) -> ValueIter<'_, K, V> {
        ValueIter::new(self)
    }
}

impl<K, V> std::fmt::Debug for SharedMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMap")
            .field("store", &self.store)
            .field("value_schema", &self.value_schema.as_ref().map(|s| s.name()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statemachine::{MachineState, StateMachineProcessor};
    use crate::view::FieldType;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::thread;
    use tempfile::tempdir;

    fn tutorial_config() -> Config {
        Config::new().entries(10).min_segments(128).entry_size(24)
    }

    fn counter_schema() -> Schema {
        Schema::builder("Counter")
            .field("hits", FieldType::Int64)
            .field("flags", FieldType::Int32)
            .build()
            .unwrap()
    }

    #[test]
    fn tutorial_round_trip() {
        let map: SharedMap<String, String> = SharedMap::open(tutorial_config()).unwrap();

        assert_eq!(map.put("key1", "one").unwrap(), None);
        assert_eq!(map.put("key2", "two").unwrap(), None);
        assert_eq!(map.len().unwrap(), 2);

        assert_eq!(map.remove("key1").unwrap(), Some("one".to_string()));
        assert_eq!(map.get("key1").unwrap(), None);
        assert_eq!(map.len().unwrap(), 1);

        map.put("key3", "three").unwrap();
        assert_eq!(
            map.put("key3", "overwritten").unwrap(),
            Some("three".to_string())
        );
        assert_eq!(map.get("key3").unwrap(), Some("overwritten".to_string()));
        assert_eq!(map.len().unwrap(), 2);
    }

    #[test]
    fn returns_null_options_skip_previous_values() {
        let config = tutorial_config()
            .put_returns_null(true)
            .remove_returns_null(true);
        let map: SharedMap<String, String> = SharedMap::open(config).unwrap();

        assert_eq!(map.put("k", "a").unwrap(), None);
        assert_eq!(map.put("k", "b").unwrap(), None);
        assert_eq!(map.get("k").unwrap(), Some("b".to_string()));
        assert_eq!(map.remove("k").unwrap(), None);
        assert!(!map.contains_key("k").unwrap());
        assert_eq!(map.stats().removes(), 1);
    }

    #[test]
    fn conditional_operations() {
        let map: SharedMap<String, String> = SharedMap::open(tutorial_config()).unwrap();
        map.put("key1", "one").unwrap();

        assert!(!map.remove_if("key1", "two").unwrap());
        assert!(!map.replace_if("key1", "two", "three").unwrap());
        assert!(map.replace_if("key1", "one", "uno").unwrap());
        assert_eq!(map.replace("key1", "eins").unwrap(), Some("uno".to_string()));
        assert_eq!(map.replace("missing", "x").unwrap(), None);
        assert!(!map.contains_key("missing").unwrap());
        assert!(map.remove_if("key1", "eins").unwrap());
        assert!(map.is_empty().unwrap());
    }

    #[test]
    fn oversize_value_commits_nothing() {
        let map: SharedMap<String, String> = SharedMap::open(tutorial_config()).unwrap();
        let big = "x".repeat(25);

        assert!(matches!(
            map.put("fresh", big.as_str()),
            Err(StoreError::EntryTooLarge { size: 25, max: 24 })
        ));
        assert_eq!(map.get("fresh").unwrap(), None);

        map.put("kept", "small").unwrap();
        assert!(map.put("kept", big.as_str()).is_err());
        assert!(map.replace("kept", big.as_str()).is_err());
        assert_eq!(map.get("kept").unwrap(), Some("small".to_string()));
        assert_eq!(map.len().unwrap(), 1);
        assert_eq!(map.stats().errors(), 3);
    }

    #[test]
    fn keys_of_every_size_round_trip() {
        let map: SharedMap<String, u64> =
            SharedMap::open(Config::new().entries(256).min_segments(8).max_key_size(64)).unwrap();
        for len in 1..=64u64 {
            let key = "k".repeat(len as usize);
            map.put(key.as_str(), &len).unwrap();
        }
        for len in 1..=64u64 {
            let key = "k".repeat(len as usize);
            assert_eq!(map.get(key.as_str()).unwrap(), Some(len));
        }
        assert!(matches!(
            map.put("k".repeat(65).as_str(), &0u64),
            Err(StoreError::KeyTooLarge { .. })
        ));
    }

    #[test]
    fn capacity_failure_is_counted() {
        let map: SharedMap<u32, u32> =
            SharedMap::open(Config::new().entries(1).min_segments(1)).unwrap();
        let slots = map.layout().slots_per_segment as u32;
        for i in 0..slots {
            map.put(&i, &i).unwrap();
        }
        let err = map.put(&slots, &0u32).unwrap_err();
        assert!(err.is_capacity());
        assert_eq!(map.stats().capacity_failures(), 1);
        assert_eq!(map.len().unwrap(), slots as usize);
    }

    #[test]
    fn get_using_never_allocates() {
        let map: SharedMap<String, Vec<u8>> =
            SharedMap::open(tutorial_config().value_schema(counter_schema())).unwrap();
        assert!(map.get_using("absent", None).unwrap().is_none());
        assert!(map.is_empty().unwrap());
    }

    #[test]
    fn reused_and_fresh_views_agree() {
        let map: SharedMap<String, Vec<u8>> =
            SharedMap::open(tutorial_config().value_schema(counter_schema())).unwrap();

        let fresh = map.acquire_using("c", None).unwrap();
        fresh.add_and_get("hits", 3).unwrap();

        let container = map.new_view().unwrap();
        let reused = map.get_using("c", Some(container)).unwrap().unwrap();
        assert_eq!(reused.offset(), fresh.offset());
        assert_eq!(reused.get_i64("hits").unwrap(), fresh.get_i64("hits").unwrap());

        // Rebinding a used container to another key moves it.
        let moved = map.acquire_using("d", Some(reused)).unwrap();
        assert_ne!(moved.offset(), fresh.offset());
        assert_eq!(moved.get_i64("hits").unwrap(), 0);
    }

    #[test]
    fn views_require_a_schema() {
        let map: SharedMap<String, String> = SharedMap::open(tutorial_config()).unwrap();
        assert!(matches!(
            map.acquire_using("k", None),
            Err(StoreError::InvalidOperation { .. })
        ));
        assert!(map.view_for(LongValue::SCHEMA_NAME).is_ok());
        assert!(map.view_for("Nope").is_err());
    }

    #[test]
    fn record_valued_map() {
        let map: SharedMap<String, LongValue> = SharedMap::open(Config::new().entries(8)).unwrap();
        let hits = map.acquire_record::<str, LongValue>("hits").unwrap();
        hits.add_and_get(5).unwrap();
        let again = map.get_record::<str, LongValue>("hits").unwrap().unwrap();
        assert_eq!(again.get().unwrap(), 5);
        assert_eq!(map.len().unwrap(), 1);
        assert!(map.get_record::<str, LongValue>("misses").unwrap().is_none());
    }

    #[test]
    fn record_larger_than_entry_size_is_rejected() {
        let map: SharedMap<String, Vec<u8>> =
            SharedMap::open(Config::new().entries(8).entry_size(4)).unwrap();
        map.put("k", &vec![1u8, 2, 3, 4]).unwrap();

        let err = map.get_record::<str, LongValue>("k").unwrap_err();
        assert!(matches!(err, StoreError::EntryTooLarge { size: 8, max: 4 }));
        assert!(map.acquire_record::<str, LongValue>("k").is_err());
        assert_eq!(map.get("k").unwrap(), Some(vec![1u8, 2, 3, 4]));
    }

    #[test]
    fn views_never_see_bytes_of_removed_entries() {
        let map: SharedMap<String, Vec<u8>> =
            SharedMap::open(Config::new().entries(8).min_segments(1)).unwrap();
        map.put("old", &vec![0xAAu8; 8]).unwrap();
        map.remove("old").unwrap();
        map.put("new", &vec![1u8]).unwrap();

        let record = map.get_record::<str, LongValue>("new").unwrap().unwrap();
        assert_eq!(record.get().unwrap(), 1);
        assert_eq!(map.get("new").unwrap(), Some(vec![1u8, 0, 0, 0, 0, 0, 0, 0]));

        record.set(0).unwrap();
        assert_eq!(map.get("new").unwrap(), Some(vec![0u8; 8]));
    }

    #[test]
    fn get_using_miss_without_schema_is_absent() {
        let map: SharedMap<String, Vec<u8>> = SharedMap::open(tutorial_config()).unwrap();
        assert!(map.get_using("absent", None).unwrap().is_none());
        assert_eq!(map.stats().misses(), 1);

        map.put("present", &vec![0u8; 8]).unwrap();
        assert!(matches!(
            map.get_using("present", None),
            Err(StoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn collisions_do_not_move_entries() {
        let map: SharedMap<u32, Vec<u8>> =
            SharedMap::open(Config::new().entries(64).min_segments(1)).unwrap();
        let first: LongValue = map.acquire_record(&1u32).unwrap();
        first.set(11).unwrap();
        let offset = first.view().offset();

        for key in 2..40u32 {
            let other: LongValue = map.acquire_record(&key).unwrap();
            other.set(i64::from(key)).unwrap();
        }
        let again: LongValue = map.get_record(&1u32).unwrap().unwrap();
        assert_eq!(again.view().offset(), offset);
        assert_eq!(again.get().unwrap(), 11);
    }

    #[test]
    fn concurrent_acquire_and_increment() {
        let map: Arc<SharedMap<String, Vec<u8>>> =
            Arc::new(SharedMap::open(Config::new().entries(64).min_segments(4)).unwrap());
        let threads = 8;
        let rounds = 1_000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    let counter: LongValue = map.acquire_record("shared").unwrap();
                    for _ in 0..rounds {
                        counter.add_and_get(1).unwrap();
                    }
                    counter.view().offset()
                })
            })
            .collect();
        let offsets: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(offsets.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(map.len().unwrap(), 1);
        let counter: LongValue = map.get_record("shared").unwrap().unwrap();
        assert_eq!(counter.get().unwrap(), threads * rounds);
    }

    #[test]
    fn state_machine_ring_over_map() {
        let map: SharedMap<i32, Vec<u8>> = SharedMap::open(tutorial_config()).unwrap();
        let smd: StateMachineData = map.acquire_record(&0).unwrap();
        assert_eq!(smd.state().unwrap(), MachineState::State0);

        let workers: Vec<_> = [
            (MachineState::State1, MachineState::State2),
            (MachineState::State2, MachineState::State3),
            (MachineState::State3, MachineState::State1),
        ]
        .into_iter()
        .map(|(from, to)| {
            let data: StateMachineData = map.acquire_record(&0).unwrap();
            let processor = StateMachineProcessor::new(data, 5, from, to);
            thread::spawn(move || processor.run().unwrap())
        })
        .collect();

        assert!(smd
            .transition(MachineState::State0, MachineState::State1)
            .unwrap());
        let fired: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(fired, 15);
        assert_eq!(smd.state().unwrap(), MachineState::State1);
    }

    #[test]
    fn views_fail_after_close() {
        let map: SharedMap<String, Vec<u8>> = SharedMap::open(tutorial_config()).unwrap();
        let counter: LongValue = map.acquire_record("c").unwrap();
        counter.set(5).unwrap();
        map.close().unwrap();
        assert!(matches!(counter.get(), Err(StoreError::StoreClosed)));
    }

    #[test]
    fn reopen_restores_contents() {
        let dir = tempdir().unwrap();
        let config = tutorial_config().path(dir.path().join("map.shm"));
        {
            let map: SharedMap<String, String> = SharedMap::open(config.clone()).unwrap();
            map.put("key1", "one").unwrap();
            map.put("key2", "two").unwrap();
            map.remove("key1").unwrap();
            let hits: LongValue = map.acquire_record("hits").unwrap();
            hits.add_and_get(9).unwrap();
            map.close().unwrap();
        }
        let map: SharedMap<String, String> = SharedMap::open(config).unwrap();
        assert_eq!(map.len().unwrap(), 2);
        assert_eq!(map.get("key2").unwrap(), Some("two".to_string()));
        assert_eq!(map.get("key1").unwrap(), None);
        let hits: LongValue = map.get_record("hits").unwrap().unwrap();
        assert_eq!(hits.get().unwrap(), 9);
    }

    #[test]
    fn two_handles_on_one_file() {
        let dir = tempdir().unwrap();
        let config = tutorial_config().path(dir.path().join("shared.shm"));
        let a: SharedMap<i32, Vec<u8>> = SharedMap::open(config.clone()).unwrap();
        let b: SharedMap<i32, Vec<u8>> = SharedMap::open(config).unwrap();

        let on_a: LongValue = a.acquire_record(&7i32).unwrap();
        let on_b: LongValue = b.acquire_record(&7i32).unwrap();
        on_a.add_and_get(2).unwrap();
        on_b.add_and_get(3).unwrap();
        assert_eq!(on_a.get().unwrap(), 5);
        assert_eq!(b.len().unwrap(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Put(u8, u16),
        Remove(u8),
        Replace(u8, u16),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (any::<u8>(), any::<u16>()).prop_map(|(k, v)| Op::Put(k, v)),
            any::<u8>().prop_map(Op::Remove),
            (any::<u8>(), any::<u16>()).prop_map(|(k, v)| Op::Replace(k, v)),
        ]
    }

    proptest! {
        #[test]
        fn behaves_like_hash_map(ops in proptest::collection::vec(op(), 1..200)) {
            let map: SharedMap<u32, u64> =
                SharedMap::open(Config::new().entries(512).min_segments(8).entry_size(8)).unwrap();
            let mut model = HashMap::new();

            for op in ops {
                match op {
                    Op::Put(k, v) => {
                        let (k, v) = (u32::from(k), u64::from(v));
                        prop_assert_eq!(map.put(&k, &v).unwrap(), model.insert(k, v));
                    }
                    Op::Remove(k) => {
                        let k = u32::from(k);
                        prop_assert_eq!(map.remove(&k).unwrap(), model.remove(&k));
                    }
                    Op::Replace(k, v) => {
                        let (k, v) = (u32::from(k), u64::from(v));
                        let expected = model.get_mut(&k).map(|slot| std::mem::replace(slot, v));
                        prop_assert_eq!(map.replace(&k, &v).unwrap(), expected);
                    }
                }
                prop_assert_eq!(map.len().unwrap(), model.len());
            }

            for (k, v) in &model {
                prop_assert_eq!(map.get(k).unwrap(), Some(*v));
            }
        }
    }
}
