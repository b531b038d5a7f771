//! Plugin manager: named plugins with lifecycle
//! hooks, run in registration order, under a strict or lenient error policy.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use skibbadb_core::{Error, Result};

/// A named plugin. Every hook has a no-op default so a plugin only
/// overrides the lifecycle points it cares about.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Per-hook time budget. `None` (the default) means no timeout is
    /// enforced. Checked after a hook call returns, since hooks run
    /// synchronously on the caller's thread with borrowed, non-`'static`
    /// arguments and so can't be preempted from another thread.
    fn hook_timeout(&self) -> Option<Duration> {
        None
    }

    fn on_before_insert(&self, _collection: &str, _doc: &mut serde_json::Value) -> Result<()> {
        Ok(())
    }
    fn on_after_insert(&self, _collection: &str, _doc: &serde_json::Value) -> Result<()> {
        Ok(())
    }
    fn on_before_update(&self, _collection: &str, _doc: &mut serde_json::Value) -> Result<()> {
        Ok(())
    }
    fn on_after_update(&self, _collection: &str, _doc: &serde_json::Value) -> Result<()> {
        Ok(())
    }
    fn on_before_delete(&self, _collection: &str, _id: &str) -> Result<()> {
        Ok(())
    }
    fn on_after_delete(&self, _collection: &str, _id: &str) -> Result<()> {
        Ok(())
    }
    fn on_before_query(&self, _collection: &str) -> Result<()> {
        Ok(())
    }
    fn on_after_query(&self, _collection: &str) -> Result<()> {
        Ok(())
    }
    fn on_before_transaction(&self) -> Result<()> {
        Ok(())
    }
    fn on_after_transaction(&self) -> Result<()> {
        Ok(())
    }
    /// Observational only: called after a hook failure, before the manager
    /// decides whether to abort (strict) or continue (lenient).
    fn on_error(&self, _hook_name: &str, _error: &Error) {}
    fn on_database_init(&self) -> Result<()> {
        Ok(())
    }
    fn on_database_close(&self) -> Result<()> {
        Ok(())
    }
    fn on_collection_create(&self, _collection: &str) -> Result<()> {
        Ok(())
    }
    fn on_collection_drop(&self, _collection: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// The first failing hook aborts the whole operation.
    Strict,
    /// Failing hooks are logged and the operation continues.
    Lenient,
}

pub struct PluginManager {
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
    policy: ErrorPolicy,
}

impl PluginManager {
    pub fn new(policy: ErrorPolicy) -> Self {
        PluginManager {
            plugins: RwLock::new(Vec::new()),
            policy,
        }
    }

    /// Registers a plugin, run after every plugin registered so far. Safe to
    /// call at any time (e.g. after `Database::open`, before the first
    /// collection is created): the manager is shared by reference, not
    /// snapshotted.
    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        self.plugins.write().expect("plugin manager lock poisoned").push(plugin);
    }

    fn run_hook(&self, hook_name: &str, mut call: impl FnMut(&dyn Plugin) -> Result<()>) -> Result<()> {
        let plugins = self.plugins.read().expect("plugin manager lock poisoned").clone();
        for plugin in &plugins {
            let started = Instant::now();
            let outcome = call(plugin.as_ref());
            let elapsed = started.elapsed();

            let outcome = match (outcome, plugin.hook_timeout()) {
                (Ok(()), Some(limit)) if elapsed > limit => {
                    Err(Error::plugin_timeout(plugin.name(), hook_name))
                }
                (outcome, _) => outcome,
            };

            if let Err(e) = outcome {
                plugin.on_error(hook_name, &e);
                match self.policy {
                    ErrorPolicy::Strict => return Err(Error::plugin(plugin.name(), hook_name, e)),
                    ErrorPolicy::Lenient => {
                        log::warn!(
                            "plugin '{}' hook '{}' failed (lenient policy, continuing): {}",
                            plugin.name(),
                            hook_name,
                            e
                        );
                    }
                }
            }
        }
        Ok(())
    }

    pub fn before_insert(&self, collection: &str, doc: &mut serde_json::Value) -> Result<()> {
        self.run_hook("onBeforeInsert", |p| p.on_before_insert(collection, doc))
    }

    pub fn after_insert(&self, collection: &str, doc: &serde_json::Value) -> Result<()> {
        self.run_hook("onAfterInsert", |p| p.on_after_insert(collection, doc))
    }

    pub fn before_update(&self, collection: &str, doc: &mut serde_json::Value) -> Result<()> {
        self.run_hook("onBeforeUpdate", |p| p.on_before_update(collection, doc))
    }

    pub fn after_update(&self, collection: &str, doc: &serde_json::Value) -> Result<()> {
        self.run_hook("onAfterUpdate", |p| p.on_after_update(collection, doc))
    }

    pub fn before_delete(&self, collection: &str, id: &str) -> Result<()> {
        self.run_hook("onBeforeDelete", |p| p.on_before_delete(collection, id))
    }

    pub fn after_delete(&self, collection: &str, id: &str) -> Result<()> {
        self.run_hook("onAfterDelete", |p| p.on_after_delete(collection, id))
    }

    pub fn before_query(&self, collection: &str) -> Result<()> {
        self.run_hook("onBeforeQuery", |p| p.on_before_query(collection))
    }

    pub fn after_query(&self, collection: &str) -> Result<()> {
        self.run_hook("onAfterQuery", |p| p.on_after_query(collection))
    }

    pub fn before_transaction(&self) -> Result<()> {
        self.run_hook("onBeforeTransaction", |p| p.on_before_transaction())
    }

    pub fn after_transaction(&self) -> Result<()> {
        self.run_hook("onAfterTransaction", |p| p.on_after_transaction())
    }

    pub fn database_init(&self) -> Result<()> {
        self.run_hook("onDatabaseInit", |p| p.on_database_init())
    }

    pub fn database_close(&self) -> Result<()> {
        self.run_hook("onDatabaseClose", |p| p.on_database_close())
    }

    pub fn collection_create(&self, collection: &str) -> Result<()> {
        self.run_hook("onCollectionCreate", |p| p.on_collection_create(collection))
    }

    pub fn collection_drop(&self, collection: &str) -> Result<()> {
        self.run_hook("onCollectionDrop", |p| p.on_collection_drop(collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct OrderTrackingPlugin {
        name: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Plugin for OrderTrackingPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn on_before_insert(&self, _collection: &str, _doc: &mut serde_json::Value) -> Result<()> {
            self.order.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    struct FailingPlugin;

    impl Plugin for FailingPlugin {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_before_insert(&self, _collection: &str, _doc: &mut serde_json::Value) -> Result<()> {
            Err(Error::validation("nope"))
        }
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let manager = PluginManager::new(ErrorPolicy::Strict);
        manager.register(Arc::new(OrderTrackingPlugin { name: "a", order: order.clone() }));
        manager.register(Arc::new(OrderTrackingPlugin { name: "b", order: order.clone() }));

        let mut doc = serde_json::json!({});
        manager.before_insert("users", &mut doc).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn strict_policy_aborts_on_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        struct CountingPlugin(Arc<AtomicUsize>);
        impl Plugin for CountingPlugin {
            fn name(&self) -> &str {
                "counter"
            }
            fn on_before_insert(&self, _c: &str, _d: &mut serde_json::Value) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let manager = PluginManager::new(ErrorPolicy::Strict);
        manager.register(Arc::new(FailingPlugin));
        manager.register(Arc::new(CountingPlugin(calls_clone)));

        let mut doc = serde_json::json!({});
        let result = manager.before_insert("users", &mut doc);
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0, "later plugin must not run after strict failure");
    }

    #[test]
    fn hook_exceeding_its_timeout_is_reported_as_a_plugin_timeout() {
        struct SlowPlugin(Duration);
        impl Plugin for SlowPlugin {
            fn name(&self) -> &str {
                "slow"
            }
            fn hook_timeout(&self) -> Option<Duration> {
                Some(Duration::from_millis(1))
            }
            fn on_before_insert(&self, _c: &str, _d: &mut serde_json::Value) -> Result<()> {
                std::thread::sleep(self.0);
                Ok(())
            }
        }

        let manager = PluginManager::new(ErrorPolicy::Strict);
        manager.register(Arc::new(SlowPlugin(Duration::from_millis(20))));

        let mut doc = serde_json::json!({});
        let err = manager.before_insert("users", &mut doc).unwrap_err();
        match err {
            Error::Plugin { source, .. } => assert!(matches!(*source, Error::PluginTimeout { .. })),
            other => panic!("expected a wrapped PluginTimeout, got {other:?}"),
        }
    }

    #[test]
    fn lenient_policy_continues_after_failure() {
        let manager = PluginManager::new(ErrorPolicy::Lenient);
        manager.register(Arc::new(FailingPlugin));

        let mut doc = serde_json::json!({});
        let result = manager.before_insert("users", &mut doc);
        assert!(result.is_ok());
    }
}
