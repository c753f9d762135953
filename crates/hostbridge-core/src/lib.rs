//! # Hostbridge Core
//!
//! Handler contract and registry for the hostbridge server.
//!
//! This crate provides the types every other hostbridge crate builds on:
//!
//! - [`Handler`] - Synchronous handler trait
//! - [`HandlerDescriptor`] - A handler plus its declared metadata
//! - [`HandlerModule`] / [`ModuleCatalog`] - Compiled-in discovery units
//! - [`HandlerRegistry`] - Discovery, validation and lookup
//! - [`HandlerError`] - Typed handler failures mapped to HTTP statuses

#![doc(html_root_url = "https://docs.rs/hostbridge-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod capability;
mod descriptor;
mod error;
mod handler;
mod module;
mod registry;

pub use capability::{Capability, CapabilitySet};
pub use descriptor::{Execution, HandlerDescriptor, HandlerDescriptorBuilder, HandlerMeta, Priority};
pub use error::{DiscoveryError, HandlerError, HandlerErrorKind, HandlerResult, ValidationError};
pub use handler::{panic_message, FnHandler, Handler, HandlerRequest};
pub use hostbridge_config::{Category, EndpointKey};
pub use module::{HandlerModule, ModuleCatalog, ModuleContext};
pub use registry::{DiscoveryReport, HandlerRegistry, TeardownFailure};
