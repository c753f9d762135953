//! # Hostbridge
//!
//! Bridges HTTP clients to an application whose automation API may only be
//! called from one host thread.
//!
//! Requests arrive on server tasks, are routed to a registered handler and
//! either run inline or travel through a priority queue to the host thread,
//! which drains it from its own loop. The result comes back to the waiting
//! request, or a timeout does.
//!
//! ```text
//! HTTP ─▶ Dispatcher ─▶ middleware ─▶ handler (inline)
//!                                  └▶ TaskQueue ─▶ host thread: pump() ─▶ handler
//!                                        ▲                                   │
//!                                        └──────────── result ◀──────────────┘
//! ```
//!
//! ## Crates
//!
//! - [`router`]: path patterns and the route table
//! - [`core`]: handler contract, descriptors and the registry
//! - [`config`]: configuration snapshots, loading and hot reload
//! - [`tasks`]: the host task queue
//! - [`server`]: dispatch, middleware and the HTTP adapter
//!
//! This crate adds the [`Coordinator`], which wires them together.

#![doc(html_root_url = "https://docs.rs/hostbridge/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod coordinator;
mod error;
mod status;
pub mod telemetry;

pub use hostbridge_config as config;
pub use hostbridge_core as core;
pub use hostbridge_router as router;
pub use hostbridge_server as server;
pub use hostbridge_tasks as tasks;

pub use coordinator::{load_config, Coordinator, CoordinatorBuilder, ENV_PREFIX};
pub use error::{InitError, Stage, StageFailure, UpdateError};
pub use status::{BridgeStatus, Lifecycle, ShutdownReport, ValidationReport};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::coordinator::Coordinator;
    pub use crate::error::{InitError, UpdateError};
    pub use crate::status::{BridgeStatus, Lifecycle};
    pub use hostbridge_config::{BridgeConfig, EndpointKey};
    pub use hostbridge_core::{
        Capability, Category, FnHandler, Handler, HandlerDescriptor, HandlerError, HandlerModule,
        HandlerRequest, ModuleCatalog, ModuleContext, Priority,
    };
    pub use hostbridge_server::{DispatchRequest, DispatchResponse, HttpServer, Middleware, ShutdownSignal};
    pub use hostbridge_tasks::HostContext;
}
