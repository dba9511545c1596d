//! # Declarative
//!
//! A resource reconciliation engine.
//!
//! Resources describe desired state (a package at a version, a service
//! running and enabled, a command that must have run, an archive fetched
//! and extracted, a file with given content). The engine probes the current
//! state through a provider, computes the transitions needed and either
//! performs them or, in noop mode, reports what it would have done.
//!
//! ## Core Concepts
//!
//! - **Resource**: validated properties bound to a manager and a registry
//! - **Provider**: a platform backend (apt, systemd, ...) that probes and mutates
//! - **Registry**: provider factories keyed by type and name, with priority based selection
//! - **Manager**: the agent the engine runs inside; supplies noop mode, runners,
//!   session tracking and the fact/data environment
//! - **TransactionEvent**: the structured outcome of one apply or health check
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{PackageProperties, Registry, new_resource};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(Registry::new());
//! registry.register(Arc::new(AptFactory))?;
//!
//! let resource = new_resource(
//!     manager.clone(),
//!     registry.clone(),
//!     PackageProperties::new("zsh", "present").into(),
//! )?;
//!
//! let event = resource.apply();
//! if event.failed {
//!     eprintln!("{}: {}", event.reference(), event.errors.join("; "));
//! }
//! ```
//!
//! ## Collaborator Traits
//!
//! The engine depends only on traits for its surroundings:
//!
//! - [`Manager`]: noop mode, session queries, template environment
//! - [`CommandRunner`]: process execution for providers
//! - [`ExpressionEvaluator`]: `manage_if` / `manage_unless` evaluation
//! - [`TemplateResolver`]: placeholder resolution in properties
//! - [`HealthCheckExecutor`]: health checks bound to resources
//!
//! The `testing` module, behind the `testing` feature, has in-memory
//! implementations of all of them.

pub mod context;
pub mod error;
pub mod event;
pub mod kinds;
mod lifecycle;
pub mod provider;
pub mod refresh;
pub mod registry;
pub mod resource;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

// Re-export main types at crate root
pub use context::{
    ApplyContext, CommandRunner, ExpressionEvaluator, HealthCheckExecutor, Logger, Manager,
    TemplateResolver,
};
pub use error::{Error, Result};
pub use event::{HealthCheckResult, HealthStatus, TransactionEvent};
pub use kinds::{
    ArchiveProperties, ExecProperties, FileProperties, PackageProperties, Properties,
    ResourceProperties, ServiceProperties,
};
pub use provider::{Provider, ProviderFactory, ProviderInstance};
pub use registry::Registry;
pub use resource::{
    ArchiveResource, BoxedResource, ExecResource, FileResource, Managed, PackageResource,
    Resource, ResourceInfo, ResourceKind, ServiceResource, new_resource, resource_from_value,
};
pub use state::{ENSURE_ABSENT, ENSURE_PRESENT, ResourceState, join_noop_messages};
pub use types::{
    CommandOptions, CommandOutput, CommonProperties, ControlProperties, Facts, HealthCheck,
    ResourceRef, TemplateEnvironment, parse_duration,
};
