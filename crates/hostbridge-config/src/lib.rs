//! Typed configuration for hostbridge.
//!
//! This crate provides:
//! - TOML and JSON configuration files with strict validation (unknown fields fail)
//! - Layered loading (defaults → file → environment)
//! - The endpoint map (category → group → name → path)
//! - Immutable snapshots with atomic replacement and change propagation
//! - File watching for hot reload
//!
//! # Overview
//!
//! [`BridgeConfig`] is the root type with these sections:
//!
//! - [`ServerConfig`] - listener address, task wait bound and enqueue retries
//! - [`QueueConfig`] - task queue capacity, drain batch and shutdown policy
//! - [`LoggingConfig`] - log filter and format
//! - [`EndpointMap`] - endpoint paths
//! - module settings blobs keyed by module name
//!
//! At runtime the configuration lives in a [`ConfigStore`]. Readers take an
//! `Arc<ConfigSnapshot>`; updates build a new snapshot, swap it in, and then
//! hand the [`ConfigChange`] to every [`ConfigListener`] and async subscriber.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server_config]
//! host = "127.0.0.1"
//! port = 8080
//! timeout_ms = 30000
//! max_retries = 3
//!
//! [queue]
//! capacity = 1024
//! drain_batch = 16
//! shutdown_policy = "discard"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [endpoints.design.geometry]
//! box = "/Box"
//!
//! [endpoints.manufacture.cam]
//! setups = "/cam/setups"
//! setup = "/cam/setups/{id}"
//!
//! [module_config.geometry]
//! units = "mm"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `HOSTBRIDGE__SERVER_CONFIG__PORT=9000`
//! - `HOSTBRIDGE__QUEUE__CAPACITY=256`
//! - `HOSTBRIDGE__LOGGING__LEVEL=debug`

#![warn(missing_docs)]

mod config;
mod endpoints;
mod error;
mod loader;
mod schema;
mod snapshot;
mod store;
mod watcher;

pub use config::{BridgeConfig, BridgeConfigBuilder, ModuleConfigMap};
pub use endpoints::{Category, EndpointKey, EndpointMap};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{LogFormat, LoggingConfig, QueueConfig, ServerConfig, ShutdownPolicy};
pub use snapshot::{ConfigChange, ConfigSnapshot, EndpointChange};
pub use store::{ConfigListener, ConfigStore};
pub use watcher::{ConfigFileChange, ConfigFileEvent, ConfigWatcher, ConfigWatcherBuilder};
