//! Schema registry shared by every view factory of a map.

use super::schema::Schema;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Registered record layouts, keyed by schema name.
///
/// Each layout is computed once and shared by every view created from it.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `schema` and returns the shared copy.
    ///
    /// Registering an identical schema again returns the existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if a different schema with the
    /// same name is already registered.
    pub fn register(&self, schema: Schema) -> StoreResult<Arc<Schema>> {
        let mut schemas = self.schemas.write();
        if let Some(existing) = schemas.get(schema.name()) {
            if **existing == schema {
                return Ok(Arc::clone(existing));
            }
            return Err(StoreError::invalid_config(format!(
                "schema {} is already registered with a different layout",
                schema.name()
            )));
        }
        let shared = Arc::new(schema);
        schemas.insert(shared.name().to_string(), Arc::clone(&shared));
        Ok(shared)
    }

    /// Returns the schema called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.read().get(name).cloned()
    }

    /// Number of registered schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::FieldType;

    fn counter() -> Schema {
        Schema::builder("Counter")
            .field("value", FieldType::Int64)
            .build()
            .unwrap()
    }

    #[test]
    fn register_and_get() {
        let registry = SchemaRegistry::new();
        assert!(registry.is_empty());
        let shared = registry.register(counter()).unwrap();
        assert!(Arc::ptr_eq(&shared, &registry.get("Counter").unwrap()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn identical_registration_is_idempotent() {
        let registry = SchemaRegistry::new();
        let a = registry.register(counter()).unwrap();
        let b = registry.register(counter()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn conflicting_layout_rejected() {
        let registry = SchemaRegistry::new();
        registry.register(counter()).unwrap();
        let other = Schema::builder("Counter")
            .field("value", FieldType::Int32)
            .build()
            .unwrap();
        assert!(matches!(
            registry.register(other),
            Err(StoreError::InvalidConfig { .. })
        ));
    }
}
