//! Zero-copy typed window onto a stored value.

use super::schema::{Field, FieldId, FieldType, FieldValue, Schema};
use crate::backoff::Backoff;
use crate::error::{StoreError, StoreResult};
use crate::segment::EntryLocation;
use shmap_region::MappedRegion;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Anything that names a field of a schema: a name or a resolved [`FieldId`].
pub trait AsField {
    /// Resolves to a field id of `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownField`] if `schema` has no such field.
    fn resolve(&self, schema: &Schema) -> StoreResult<FieldId>;
}

impl AsField for &str {
    fn resolve(&self, schema: &Schema) -> StoreResult<FieldId> {
        schema.field_id(self)
    }
}

impl AsField for FieldId {
    fn resolve(&self, schema: &Schema) -> StoreResult<FieldId> {
        match schema.field_at(*self) {
            Some(_) => Ok(*self),
            None => Err(StoreError::unknown_field(format!("#{}", self.0))),
        }
    }
}

#[derive(Clone)]
struct Binding {
    region: Weak<MappedRegion>,
    offset: usize,
}

/// A non-owning typed view of one entry's value bytes.
///
/// The view holds a weak reference to the region and a byte offset. Every
/// field access goes straight to the mapped memory; integer and float fields
/// are read and written with atomic loads and stores, so concurrent readers
/// never see a torn field. Integer fields also support atomic
/// [`add_and_get`](Self::add_and_get) and
/// [`compare_and_swap`](Self::compare_and_swap), which are totally ordered
/// per field across every thread and process mapping the region.
///
/// A view stays valid while its entry is live. Views of removed entries are
/// not revoked; using one reads or writes whatever the slot holds next.
#[derive(Clone)]
pub struct ValueView {
    schema: Arc<Schema>,
    binding: Option<Binding>,
}

impl ValueView {
    /// Creates an unbound view for `schema`.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            binding: None,
        }
    }

    /// Record layout of this view.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns `true` once the view has been bound to an entry.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Region offset of the bound value.
    #[must_use]
    pub fn offset(&self) -> Option<usize> {
        self.binding.as_ref().map(|b| b.offset)
    }

    /// Binds the view to the value at `offset`, replacing any prior binding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntryTooLarge`] if the record does not fit in
    /// `capacity` bytes, or a region error if the range is out of bounds or
    /// not 8-byte aligned.
    pub fn bind(
        &mut self,
        region: &Arc<MappedRegion>,
        offset: usize,
        capacity: usize,
    ) -> StoreResult<()> {
        if self.schema.size() > capacity {
            return Err(StoreError::EntryTooLarge {
                size: self.schema.size(),
                max: capacity,
            });
        }
        region.check(offset, self.schema.size())?;
        if offset % 8 != 0 {
            return Err(shmap_region::RegionError::Misaligned { offset, align: 8 }.into());
        }
        self.binding = Some(Binding {
            region: Arc::downgrade(region),
            offset,
        });
        Ok(())
    }

    pub(crate) fn bind_entry(
        &mut self,
        region: &Arc<MappedRegion>,
        location: &EntryLocation,
    ) -> StoreResult<()> {
        self.bind(region, location.value_offset(), location.capacity())
    }

    /// Drops the binding; later accesses fail with [`StoreError::NotBound`].
    pub fn unbind(&mut self) {
        self.binding = None;
    }

    /// Resolves `field` to its id in this view's schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownField`] if there is no such field.
    pub fn field_id(&self, field: impl AsField) -> StoreResult<FieldId> {
        field.resolve(&self.schema)
    }

    fn access(&self, field: impl AsField) -> StoreResult<(Arc<MappedRegion>, usize, &Field)> {
        let binding = self.binding.as_ref().ok_or(StoreError::NotBound)?;
        let id = field.resolve(&self.schema)?;
        let field = self
            .schema
            .field_at(id)
            .ok_or_else(|| StoreError::unknown_field(format!("#{}", id.0)))?;
        let region = binding.region.upgrade().ok_or(StoreError::StoreClosed)?;
        Ok((region, binding.offset + field.offset(), field))
    }

    fn typed(
        &self,
        field: impl AsField,
        expected: FieldType,
    ) -> StoreResult<(Arc<MappedRegion>, usize)> {
        let (region, offset, field) = self.access(field)?;
        if field.field_type() != expected {
            return Err(StoreError::FieldTypeMismatch {
                field: field.name().to_string(),
                expected,
                actual: field.field_type(),
            });
        }
        Ok((region, offset))
    }

    /// Reads a field of any type.
    pub fn read_field(&self, field: impl AsField) -> StoreResult<FieldValue> {
        let (region, offset, field) = self.access(field)?;
        Ok(match field.field_type() {
            FieldType::Int32 => {
                FieldValue::Int32(region.atomic_u32(offset)?.load(Ordering::Acquire) as i32)
            }
            FieldType::Int64 => {
                FieldValue::Int64(region.atomic_u64(offset)?.load(Ordering::Acquire) as i64)
            }
            FieldType::Float32 => FieldValue::Float32(f32::from_bits(
                region.atomic_u32(offset)?.load(Ordering::Acquire),
            )),
            FieldType::Float64 => FieldValue::Float64(f64::from_bits(
                region.atomic_u64(offset)?.load(Ordering::Acquire),
            )),
        })
    }

    /// Writes a field; the value's type must match the field's.
    pub fn write_field(&self, field: impl AsField, value: FieldValue) -> StoreResult<()> {
        let (region, offset) = self.typed(field, value.field_type())?;
        match value {
            FieldValue::Int32(v) => region.atomic_u32(offset)?.store(v as u32, Ordering::Release),
            FieldValue::Int64(v) => region.atomic_u64(offset)?.store(v as u64, Ordering::Release),
            FieldValue::Float32(v) => region
                .atomic_u32(offset)?
                .store(v.to_bits(), Ordering::Release),
            FieldValue::Float64(v) => region
                .atomic_u64(offset)?
                .store(v.to_bits(), Ordering::Release),
        }
        Ok(())
    }

    /// Reads an `Int32` field.
    pub fn get_i32(&self, field: impl AsField) -> StoreResult<i32> {
        let (region, offset) = self.typed(field, FieldType::Int32)?;
        Ok(region.atomic_u32(offset)?.load(Ordering::Acquire) as i32)
    }

    /// Writes an `Int32` field.
    pub fn set_i32(&self, field: impl AsField, value: i32) -> StoreResult<()> {
        self.write_field(field, FieldValue::Int32(value))
    }

    /// Reads an `Int64` field.
    pub fn get_i64(&self, field: impl AsField) -> StoreResult<i64> {
        let (region, offset) = self.typed(field, FieldType::Int64)?;
        Ok(region.atomic_u64(offset)?.load(Ordering::Acquire) as i64)
    }

    /// Writes an `Int64` field.
    pub fn set_i64(&self, field: impl AsField, value: i64) -> StoreResult<()> {
        self.write_field(field, FieldValue::Int64(value))
    }

    /// Reads a `Float32` field.
    pub fn get_f32(&self, field: impl AsField) -> StoreResult<f32> {
        let (region, offset) = self.typed(field, FieldType::Float32)?;
        Ok(f32::from_bits(region.atomic_u32(offset)?.load(Ordering::Acquire)))
    }

    /// Writes a `Float32` field.
    pub fn set_f32(&self, field: impl AsField, value: f32) -> StoreResult<()> {
        self.write_field(field, FieldValue::Float32(value))
    }

    /// Reads a `Float64` field.
    pub fn get_f64(&self, field: impl AsField) -> StoreResult<f64> {
        let (region, offset) = self.typed(field, FieldType::Float64)?;
        Ok(f64::from_bits(region.atomic_u64(offset)?.load(Ordering::Acquire)))
    }

    /// Writes a `Float64` field.
    pub fn set_f64(&self, field: impl AsField, value: f64) -> StoreResult<()> {
        self.write_field(field, FieldValue::Float64(value))
    }

    /// Atomically adds `delta` to an integer field and returns the new value.
    ///
    /// Arithmetic wraps. For `Int32` fields `delta` is truncated to 32 bits.
    pub fn add_and_get(&self, field: impl AsField, delta: i64) -> StoreResult<i64> {
        let (region, offset, field) = self.access(field)?;
        match field.field_type() {
            FieldType::Int32 => {
                let delta = delta as i32;
                let previous = region
                    .atomic_u32(offset)?
                    .fetch_add(delta as u32, Ordering::AcqRel) as i32;
                Ok(i64::from(previous.wrapping_add(delta)))
            }
            FieldType::Int64 => {
                let previous = region
                    .atomic_u64(offset)?
                    .fetch_add(delta as u64, Ordering::AcqRel) as i64;
                Ok(previous.wrapping_add(delta))
            }
            other => Err(StoreError::FieldTypeMismatch {
                field: field.name().to_string(),
                expected: FieldType::Int64,
                actual: other,
            }),
        }
    }

    /// Atomically replaces an integer field holding `expected` with `new`.
    ///
    /// Returns `false` if the field held anything else. For `Int32` fields an
    /// `expected` outside the 32-bit range can never match.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidOperation`] if `new` does not fit an
    /// `Int32` field, and [`StoreError::FieldTypeMismatch`] for float fields.
    pub fn compare_and_swap(&self, field: impl AsField, expected: i64, new: i64) -> StoreResult<bool> {
        let (region, offset, field) = self.access(field)?;
        match field.field_type() {
            FieldType::Int32 => {
                let new = i32::try_from(new).map_err(|_| {
                    StoreError::invalid_operation(format!(
                        "{new} does not fit Int32 field {}",
                        field.name()
                    ))
                })?;
                let Ok(expected) = i32::try_from(expected) else {
                    return Ok(false);
                };
                Ok(region
                    .atomic_u32(offset)?
                    .compare_exchange(
                        expected as u32,
                        new as u32,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok())
            }
            FieldType::Int64 => Ok(region
                .atomic_u64(offset)?
                .compare_exchange(
                    expected as u64,
                    new as u64,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()),
            other => Err(StoreError::FieldTypeMismatch {
                field: field.name().to_string(),
                expected: FieldType::Int64,
                actual: other,
            }),
        }
    }

    /// Takes a record lock held in an `Int32` field.
    ///
    /// The field holds 0 when free and the owning process id while held.
    /// Spins, then yields, until the lock is taken or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockTimeout`] if the lock stayed held.
    pub fn busy_lock(&self, field: impl AsField, timeout: Duration) -> StoreResult<()> {
        let id = field.resolve(&self.schema)?;
        let (region, offset) = self.typed(id, FieldType::Int32)?;
        let word = region.atomic_u32(offset)?;
        let token = lock_token();
        let deadline = Instant::now() + timeout;
        let mut backoff = Backoff::new();

        loop {
            if word
                .compare_exchange_weak(0, token, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(());
            }
            if Instant::now() >= deadline {
                let name = self
                    .schema
                    .field_at(id)
                    .map_or_else(String::new, |f| f.name().to_string());
                return Err(StoreError::LockTimeout { field: name });
            }
            backoff.snooze();
        }
    }

    /// Releases a record lock taken by [`busy_lock`](Self::busy_lock).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidOperation`] if this process does not hold it.
    pub fn unlock(&self, field: impl AsField) -> StoreResult<()> {
        let (region, offset) = self.typed(field, FieldType::Int32)?;
        region
            .atomic_u32(offset)?
            .compare_exchange(lock_token(), 0, Ordering::Release, Ordering::Relaxed)
            .map(|_| ())
            .map_err(|owner| {
                StoreError::invalid_operation(format!("record lock is held by {owner}"))
            })
    }

    /// Copies the whole record out of the region.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        let binding = self.binding.as_ref().ok_or(StoreError::NotBound)?;
        let region = binding.region.upgrade().ok_or(StoreError::StoreClosed)?;
        Ok(region.read_vec(binding.offset, self.schema.size())?)
    }
}

fn lock_token() -> u32 {
    std::process::id().max(1)
}

impl fmt::Debug for ValueView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueView")
            .field("schema", &self.schema.name())
            .field("offset", &self.offset())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder("Record")
                .field("lock", FieldType::Int32)
                .field("count", FieldType::Int32)
                .field("total", FieldType::Int64)
                .field("ratio", FieldType::Float64)
                .build()
                .unwrap(),
        )
    }

    fn bound(region: &Arc<MappedRegion>, offset: usize) -> ValueView {
        let mut view = ValueView::new(schema());
        view.bind(region, offset, 64).unwrap();
        view
    }

    #[test]
    fn unbound_access_fails_fast() {
        let view = ValueView::new(schema());
        assert!(!view.is_bound());
        assert!(matches!(view.get_i64("total"), Err(StoreError::NotBound)));
        assert!(matches!(view.to_bytes(), Err(StoreError::NotBound)));
    }

    #[test]
    fn fields_read_and_write_in_place() {
        let region = Arc::new(MappedRegion::anonymous(128).unwrap());
        let view = bound(&region, 8);

        view.set_i32("count", 7).unwrap();
        view.set_i64("total", -3).unwrap();
        view.set_f64("ratio", 0.5).unwrap();
        assert_eq!(view.read_field("count").unwrap(), FieldValue::Int32(7));
        assert_eq!(view.get_i64("total").unwrap(), -3);
        assert_eq!(view.get_f64("ratio").unwrap(), 0.5);

        let other = bound(&region, 8);
        assert_eq!(other.get_i32("count").unwrap(), 7);
        let mut raw = [0u8; 4];
        region.read(8 + 4, &mut raw).unwrap();
        assert_eq!(i32::from_ne_bytes(raw), 7);
    }

    #[test]
    fn type_mismatch_reported() {
        let region = Arc::new(MappedRegion::anonymous(64).unwrap());
        let view = bound(&region, 0);
        assert!(matches!(
            view.get_i64("count"),
            Err(StoreError::FieldTypeMismatch {
                expected: FieldType::Int64,
                actual: FieldType::Int32,
                ..
            })
        ));
        assert!(view.write_field("ratio", FieldValue::Int32(1)).is_err());
        assert!(view.add_and_get("ratio", 1).is_err());
        assert!(matches!(
            view.get_i32("nope"),
            Err(StoreError::UnknownField { .. })
        ));
    }

    #[test]
    fn bind_checks_capacity_and_alignment() {
        let region = Arc::new(MappedRegion::anonymous(64).unwrap());
        let mut view = ValueView::new(schema());
        assert!(matches!(
            view.bind(&region, 0, 16),
            Err(StoreError::EntryTooLarge { size: 24, max: 16 })
        ));
        assert!(view.bind(&region, 4, 64).is_err());
        assert!(view.bind(&region, 48, 64).is_err());
        view.bind(&region, 0, 24).unwrap();
        view.unbind();
        assert!(!view.is_bound());
    }

    #[test]
    fn add_and_cas() {
        let region = Arc::new(MappedRegion::anonymous(64).unwrap());
        let view = bound(&region, 0);
        let total = view.field_id("total").unwrap();

        assert_eq!(view.add_and_get(total, 5).unwrap(), 5);
        assert_eq!(view.add_and_get(total, -2).unwrap(), 3);
        assert!(view.compare_and_swap(total, 3, 10).unwrap());
        assert!(!view.compare_and_swap(total, 3, 11).unwrap());
        assert_eq!(view.get_i64(total).unwrap(), 10);

        assert_eq!(view.add_and_get("count", 1).unwrap(), 1);
        assert!(!view.compare_and_swap("count", i64::MAX, 2).unwrap());
        assert!(view.compare_and_swap("count", 1, i64::from(i32::MAX) + 1).is_err());
    }

    #[test]
    fn concurrent_increments_are_linearizable() {
        let region = Arc::new(MappedRegion::anonymous(64).unwrap());
        let threads = 8;
        let rounds = 2_000;
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let view = bound(&region, 0);
                thread::spawn(move || {
                    let field = view.field_id("total").unwrap();
                    for _ in 0..rounds {
                        view.add_and_get(field, 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(bound(&region, 0).get_i64("total").unwrap(), threads * rounds);
    }

    #[test]
    fn busy_lock_times_out_while_held() {
        let region = Arc::new(MappedRegion::anonymous(64).unwrap());
        let view = bound(&region, 0);
        view.busy_lock("lock", Duration::from_millis(10)).unwrap();
        assert!(matches!(
            view.busy_lock("lock", Duration::from_millis(10)),
            Err(StoreError::LockTimeout { field }) if field == "lock"
        ));
        view.unlock("lock").unwrap();
        assert!(view.unlock("lock").is_err());
        view.busy_lock("lock", Duration::from_millis(10)).unwrap();
    }

    #[test]
    fn closed_region_reported() {
        let region = Arc::new(MappedRegion::anonymous(64).unwrap());
        let view = bound(&region, 0);
        drop(region);
        assert!(matches!(view.get_i32("count"), Err(StoreError::StoreClosed)));
    }
}
