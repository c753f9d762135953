//! File watching for configuration hot reload.
//!
//! [`ConfigWatcher`] watches the directory containing the configuration file
//! (editors often save by writing a new file and renaming it over the old
//! one) and reports changes to that one file, debounced.
//!
//! # Example
//!
//! ```no_run
//! use hostbridge_config::{ConfigLoader, ConfigWatcher};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), hostbridge_config::ConfigError> {
//! let mut watcher = ConfigWatcher::builder("hostbridge.toml")
//!     .with_debounce(Duration::from_millis(250))
//!     .build()?;
//!
//! while let Some(event) = watcher.next().await {
//!     match ConfigLoader::new().with_file(&event.path).and_then(ConfigLoader::load) {
//!         Ok(config) => println!("reloaded, {} endpoints", config.endpoints.len()),
//!         Err(e) => eprintln!("keeping previous configuration: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::ConfigError;

/// Buffered raw events between the notify thread and the async side.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Kind of change seen on the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFileChange {
    /// File was created (including replaced by rename).
    Created,
    /// File contents changed.
    Modified,
    /// File was removed.
    Removed,
}

impl ConfigFileChange {
    fn from_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Removed),
            _ => None,
        }
    }
}

/// A debounced change to the watched file.
#[derive(Debug, Clone)]
pub struct ConfigFileEvent {
    /// Path of the configuration file.
    pub path: PathBuf,
    /// What happened.
    pub kind: ConfigFileChange,
    /// When the change was observed.
    pub timestamp: Instant,
}

/// Builder for [`ConfigWatcher`].
#[derive(Debug)]
pub struct ConfigWatcherBuilder {
    path: PathBuf,
    debounce: Duration,
}

impl ConfigWatcherBuilder {
    /// Set the debounce window. Changes within it are coalesced. Default 500ms.
    #[must_use]
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce = duration;
        self
    }

    /// Start watching.
    pub fn build(self) -> Result<ConfigWatcher, ConfigError> {
        if !self.path.exists() {
            return Err(ConfigError::file_not_found(&self.path));
        }
        let file = self.path.canonicalize()?;
        let dir = file
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::InvalidConfig {
                message: format!("configuration file has no parent directory: {}", file.display()),
            })?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                // Receiver gone means the watcher is being dropped
                Ok(event) => {
                    let _ = tx.blocking_send(event);
                }
                Err(e) => tracing::warn!(error = %e, "config watcher error"),
            }
        })
        .map_err(|e| ConfigError::InvalidConfig {
            message: format!("failed to create file watcher: {e}"),
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| ConfigError::InvalidConfig {
                message: format!("failed to watch {}: {e}", dir.display()),
            })?;

        tracing::info!(path = %file.display(), "watching configuration file");

        Ok(ConfigWatcher {
            _watcher: watcher,
            rx,
            file,
            debounce: self.debounce,
            last_event: None,
        })
    }
}

/// Watches one configuration file for changes.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Event>,
    file: PathBuf,
    debounce: Duration,
    last_event: Option<Instant>,
}

impl ConfigWatcher {
    /// Create a builder for watching `path`.
    pub fn builder(path: impl AsRef<Path>) -> ConfigWatcherBuilder {
        ConfigWatcherBuilder {
            path: path.as_ref().to_path_buf(),
            debounce: Duration::from_millis(500),
        }
    }

    /// The canonical path being watched.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Wait for the next debounced change. Returns `None` once the watcher stops.
    pub async fn next(&mut self) -> Option<ConfigFileEvent> {
        loop {
            let event = self.rx.recv().await?;
            if let Some(change) = self.process_event(&event) {
                return Some(change);
            }
        }
    }

    /// Run until the watcher stops, invoking `on_change` for every change.
    ///
    /// The callback runs on the watcher's task and should be quick.
    pub async fn run<F>(mut self, mut on_change: F)
    where
        F: FnMut(ConfigFileEvent) + Send,
    {
        while let Some(event) = self.next().await {
            on_change(event);
        }
    }

    fn process_event(&mut self, event: &Event) -> Option<ConfigFileEvent> {
        let kind = ConfigFileChange::from_kind(&event.kind)?;

        if !event.paths.iter().any(|p| self.is_config_file(p)) {
            return None;
        }

        let now = Instant::now();
        if self
            .last_event
            .is_some_and(|last| now.duration_since(last) < self.debounce)
        {
            return None;
        }
        self.last_event = Some(now);

        Some(ConfigFileEvent {
            path: self.file.clone(),
            kind,
            timestamp: now,
        })
    }

    fn is_config_file(&self, path: &Path) -> bool {
        // Removed files cannot be canonicalized, so fall back to the file name
        path.canonicalize().map_or_else(
            |_| path.file_name() == self.file.file_name(),
            |p| p == self.file,
        )
    }
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("file", &self.file)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}
