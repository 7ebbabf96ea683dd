//! Model-checking harness.
//!
//! Applies every operation both to a [`SharedMap`] and to a `HashMap`
//! model, and checks the two agree.

use crate::generators::MapOp;
use shmap_core::{Config, SharedMap, StoreResult};
use std::collections::HashMap;

/// A map paired with an in-memory model of its expected contents.
pub struct ModelHarness {
    /// The map under test.
    pub map: SharedMap<u32, Vec<u8>>,
    model: HashMap<u32, Vec<u8>>,
}

impl ModelHarness {
    /// Creates a harness over an anonymous map sized for `max_key` keys and
    /// values of up to `max_len` bytes.
    pub fn new(max_key: u32, max_len: usize) -> Self {
        let config = Config::new()
            .entries(u64::from(max_key) * 4)
            .min_segments(8)
            .entry_size(max_len.max(1));
        Self {
            map: SharedMap::open(config).expect("Failed to open map"),
            model: HashMap::new(),
        }
    }

    /// Applies `op` to both sides and asserts the results match.
    pub fn apply(&mut self, op: &MapOp) -> StoreResult<()> {
        match op {
            MapOp::Put(k, v) => {
                let previous = self.map.put(k, v)?;
                assert_eq!(previous, self.model.insert(*k, v.clone()), "put {k}");
            }
            MapOp::Remove(k) => {
                let removed = self.map.remove(k)?;
                assert_eq!(removed, self.model.remove(k), "remove {k}");
            }
            MapOp::RemoveIf(k, expected) => {
                let removed = self.map.remove_if(k, expected)?;
                let model_removed = self.model.get(k) == Some(expected);
                if model_removed {
                    self.model.remove(k);
                }
                assert_eq!(removed, model_removed, "remove_if {k}");
            }
            MapOp::Replace(k, v) => {
                let previous = self.map.replace(k, v)?;
                let expected = self
                    .model
                    .get_mut(k)
                    .map(|slot| std::mem::replace(slot, v.clone()));
                assert_eq!(previous, expected, "replace {k}");
            }
            MapOp::ReplaceIf(k, expected, v) => {
                let replaced = self.map.replace_if(k, expected, v)?;
                let model_replaced = match self.model.get_mut(k) {
                    Some(slot) if slot == expected => {
                        *slot = v.clone();
                        true
                    }
                    _ => false,
                };
                assert_eq!(replaced, model_replaced, "replace_if {k}");
            }
            MapOp::Get(k) => {
                assert_eq!(self.map.get(k)?, self.model.get(k).cloned(), "get {k}");
            }
            MapOp::Clear => {
                self.map.clear()?;
                self.model.clear();
            }
        }
        Ok(())
    }

    /// Checks size, every modelled key, and that iteration yields exactly
    /// the modelled entries.
    pub fn verify(&self) -> StoreResult<()> {
        assert_eq!(self.map.len()?, self.model.len(), "size mismatch");
        for (k, v) in &self.model {
            assert_eq!(self.map.get(k)?.as_ref(), Some(v), "content mismatch for {k}");
        }
        let mut seen = HashMap::new();
        for entry in self.map.iter() {
            let (k, v) = entry?.into_pair();
            assert!(seen.insert(k, v).is_none(), "key {k} yielded twice");
        }
        assert_eq!(seen, self.model, "iteration mismatch");
        Ok(())
    }

    /// The model's expected contents.
    pub fn model(&self) -> &HashMap<u32, Vec<u8>> {
        &self.model
    }
}
