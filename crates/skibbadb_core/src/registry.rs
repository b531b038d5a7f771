//! Process-local map of collection name → compiled descriptor. The only
//! piece of process-wide state in the system; everything else is reachable
//! through an explicit handle.

use crate::error::{Error, Result};
use crate::schema::CollectionDescriptor;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<String, Arc<CollectionDescriptor>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection descriptor. Fails if `name` is already present.
    pub fn register(&self, descriptor: CollectionDescriptor) -> Result<Arc<CollectionDescriptor>> {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if entries.contains_key(&descriptor.name) {
            return Err(Error::invalid_argument(format!(
                "collection '{}' is already registered",
                descriptor.name
            )));
        }
        let name = descriptor.name.clone();
        let descriptor = Arc::new(descriptor);
        entries.insert(name, descriptor.clone());
        Ok(descriptor)
    }

    pub fn get(&self, name: &str) -> Option<Arc<CollectionDescriptor>> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.write().expect("registry lock poisoned").clear();
    }

    /// Removes a single collection's descriptor, returning it if present.
    pub fn remove(&self, name: &str) -> Option<Arc<CollectionDescriptor>> {
        self.entries.write().expect("registry lock poisoned").remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CollectionOptions;
    use crate::validator::PermissiveValidator;

    fn descriptor(name: &str) -> CollectionDescriptor {
        CollectionDescriptor::new(name, Arc::new(PermissiveValidator), CollectionOptions::new())
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let registry = Registry::new();
        registry.register(descriptor("users")).unwrap();
        let err = registry.register(descriptor("users")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn get_has_list_clear_are_consistent() {
        let registry = Registry::new();
        registry.register(descriptor("users")).unwrap();

        assert!(registry.has("users"));
        assert!(registry.get("users").is_some());
        assert_eq!(registry.list(), vec!["users".to_string()]);

        registry.clear();
        assert!(!registry.has("users"));
    }

    #[test]
    fn remove_drops_a_single_entry() {
        let registry = Registry::new();
        registry.register(descriptor("users")).unwrap();
        registry.register(descriptor("widgets")).unwrap();

        let removed = registry.remove("users").unwrap();
        assert_eq!(removed.name, "users");
        assert!(!registry.has("users"));
        assert!(registry.has("widgets"));
        assert!(registry.remove("users").is_none());
    }
}
