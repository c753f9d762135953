//! Process-wide configuration store with atomic replacement.
//!
//! Readers call [`ConfigStore::snapshot`] and get an `Arc` to an immutable
//! snapshot, so they never observe a half-applied update. Writers go through
//! [`ConfigStore::update`], which is serialized, validates the candidate,
//! swaps it in, and then notifies listeners with the diff.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::{BridgeConfig, ConfigChange, ConfigError, ConfigSnapshot};

/// Capacity of the change broadcast channel.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Receives configuration changes synchronously, right after the new
/// snapshot is installed and before [`ConfigStore::update`] returns.
pub trait ConfigListener: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called once per installed snapshot.
    fn on_change(&self, snapshot: &ConfigSnapshot, change: &ConfigChange);
}

/// Holds the current [`ConfigSnapshot`] and propagates replacements.
///
/// # Example
///
/// ```
/// use hostbridge_config::{BridgeConfig, Category, ConfigStore, EndpointKey};
///
/// let key = EndpointKey::new(Category::Design, "geometry", "box");
/// let store = ConfigStore::new(BridgeConfig::builder().endpoint(key.clone(), "/Box").build())?;
/// assert_eq!(store.snapshot().version(), 1);
///
/// let change = store.update_endpoint(&key, "/CreateBox")?;
/// assert_eq!(change.to_version, 2);
/// assert_eq!(store.snapshot().endpoints.path(&key), Some("/CreateBox"));
/// # Ok::<(), hostbridge_config::ConfigError>(())
/// ```
pub struct ConfigStore {
    current: ArcSwap<ConfigSnapshot>,
    write_lock: Mutex<()>,
    listeners: RwLock<Vec<Arc<dyn ConfigListener>>>,
    changes: broadcast::Sender<Arc<ConfigChange>>,
}

impl ConfigStore {
    /// Validates `config` and installs it as version 1.
    pub fn new(config: BridgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            current: ArcSwap::from_pointee(ConfigSnapshot::new(1, config)),
            write_lock: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
            changes,
        })
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Registers a synchronous listener.
    pub fn add_listener(&self, listener: Arc<dyn ConfigListener>) {
        tracing::debug!(listener = listener.name(), "config listener registered");
        self.listeners.write().push(listener);
    }

    /// Subscribes to changes asynchronously.
    ///
    /// Slow receivers may observe `RecvError::Lagged`; the current snapshot is
    /// always available through [`snapshot`](Self::snapshot).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ConfigChange>> {
        self.changes.subscribe()
    }

    /// Replaces the configuration through `build`.
    ///
    /// `build` receives the current snapshot and returns the candidate
    /// configuration, or an error to abort. Updates are serialized: the
    /// snapshot `build` sees is the one that gets replaced. The candidate is
    /// validated before it is installed; on any error nothing changes and no
    /// listener is called.
    pub fn update<E, F>(&self, build: F) -> Result<ConfigChange, E>
    where
        F: FnOnce(&ConfigSnapshot) -> Result<BridgeConfig, E>,
        E: From<ConfigError>,
    {
        let _guard = self.write_lock.lock();

        let old = self.current.load_full();
        let candidate = build(&old)?;
        candidate.validate()?;

        let new = Arc::new(ConfigSnapshot::new(old.version() + 1, candidate));
        self.current.store(Arc::clone(&new));

        let change = ConfigChange::between(&old, &new);
        tracing::info!(
            from_version = change.from_version,
            to_version = change.to_version,
            endpoints_changed = change.endpoints.len(),
            modules_changed = change.modules.len(),
            "configuration replaced"
        );

        for listener in self.listeners.read().iter() {
            listener.on_change(&new, &change);
        }
        // No receivers is not an error
        let _ = self.changes.send(Arc::new(change.clone()));

        Ok(change)
    }

    /// Replaces the whole configuration.
    pub fn replace(&self, config: BridgeConfig) -> Result<ConfigChange, ConfigError> {
        self.update(|_| Ok(config))
    }

    /// Moves one existing endpoint to a new path.
    pub fn update_endpoint(
        &self,
        key: &crate::EndpointKey,
        new_path: &str,
    ) -> Result<ConfigChange, ConfigError> {
        self.update(|current| current.with_endpoint_path(key, new_path))
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("version", &self.current.load().version())
            .field("listeners", &self.listeners.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Category, EndpointKey};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Recorder {
        last_version: AtomicU64,
    }

    impl ConfigListener for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn on_change(&self, snapshot: &ConfigSnapshot, change: &ConfigChange) {
            assert_eq!(snapshot.version(), change.to_version);
            self.last_version.store(change.to_version, Ordering::SeqCst);
        }
    }

    fn box_key() -> EndpointKey {
        EndpointKey::new(Category::Design, "geometry", "box")
    }

    fn store() -> ConfigStore {
        ConfigStore::new(
            BridgeConfig::builder()
                .endpoint(box_key(), "/Box")
                .endpoint(EndpointKey::new(Category::Design, "geometry", "sphere"), "/Sphere")
                .build(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = BridgeConfig::builder().endpoint(box_key(), "no-slash").build();
        assert!(matches!(ConfigStore::new(config), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_update_notifies_listener() {
        let store = store();
        let recorder = Arc::new(Recorder {
            last_version: AtomicU64::new(0),
        });
        store.add_listener(recorder.clone());

        store.update_endpoint(&box_key(), "/CreateBox").unwrap();
        assert_eq!(recorder.last_version.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rejected_update_changes_nothing() {
        let store = store();
        let recorder = Arc::new(Recorder {
            last_version: AtomicU64::new(0),
        });
        store.add_listener(recorder.clone());
        let before = store.snapshot();

        assert!(store.update_endpoint(&box_key(), "/Sphere").is_err());
        assert!(store
            .update_endpoint(&EndpointKey::new(Category::Design, "geometry", "cone"), "/Cone")
            .is_err());

        let after = store.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(recorder.last_version.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_update_closure_can_abort() {
        #[derive(Debug)]
        enum Abort {
            Config(ConfigError),
            Conflict,
        }
        impl From<ConfigError> for Abort {
            fn from(e: ConfigError) -> Self {
                Self::Config(e)
            }
        }

        let store = store();
        let result: Result<_, Abort> = store.update(|_| Err(Abort::Conflict));
        assert!(matches!(result, Err(Abort::Conflict)));
        assert_eq!(store.snapshot().version(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_receive_change() {
        let store = store();
        let mut rx = store.subscribe();

        store.update_endpoint(&box_key(), "/CreateBox").unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.endpoints.len(), 1);
        assert_eq!(change.endpoints[0].new_path.as_deref(), Some("/CreateBox"));
    }

    #[test]
    fn test_old_snapshot_stays_readable() {
        let store = store();
        let old = store.snapshot();
        store.update_endpoint(&box_key(), "/CreateBox").unwrap();

        assert_eq!(old.endpoints.path(&box_key()), Some("/Box"));
        assert_eq!(store.snapshot().endpoints.path(&box_key()), Some("/CreateBox"));
    }
}
