//! Provider contract
//!
//! A [`ProviderFactory`] is registered once per `(type, provider)` pair and
//! decides whether it can manage a resource on this host. The provider it
//! builds is a [`ProviderInstance`], a closed set of per-type capability
//! objects bound to a logger and a command runner.

use crate::context::{CommandRunner, Logger};
use crate::kinds::ResourceProperties;
use crate::kinds::archive::ArchiveProvider;
use crate::kinds::exec::ExecProvider;
use crate::kinds::file::FileProvider;
use crate::kinds::package::PackageProvider;
use crate::kinds::service::ServiceProvider;
use crate::types::Facts;
use anyhow::Result;
use std::fmt;
use std::sync::Arc;

/// Capabilities every provider instance has
pub trait Provider: Send + Sync {
    /// Provider name, e.g. "apt"
    fn name(&self) -> &str;
}

/// Registrable descriptor that tests applicability and builds providers
///
/// # Example
///
/// ```ignore
/// struct AptFactory;
///
/// impl ProviderFactory for AptFactory {
///     fn type_name(&self) -> &str { "package" }
///     fn name(&self) -> &str { "apt" }
///
///     fn is_manageable(&self, facts: &Facts, _: &ResourceProperties) -> anyhow::Result<Option<i32>> {
///         Ok(which::which("apt-get").ok().map(|_| 1))
///     }
///
///     fn new_provider(&self, logger: Logger, runner: Arc<dyn CommandRunner>) -> anyhow::Result<ProviderInstance> {
///         Ok(ProviderInstance::Package(Box::new(Apt::new(logger, runner))))
///     }
/// }
/// ```
pub trait ProviderFactory: Send + Sync {
    /// Resource type this factory serves, e.g. "package"
    fn type_name(&self) -> &str;

    /// Provider name, unique within the type
    fn name(&self) -> &str;

    /// Whether this provider can manage the resource on this host
    ///
    /// Returns `Some(priority)` when manageable, lower values preferred,
    /// and `None` when not manageable. Called while the registry lock is
    /// held, so implementations must not touch the registry.
    fn is_manageable(
        &self,
        facts: &Facts,
        properties: &ResourceProperties,
    ) -> Result<Option<i32>>;

    /// Build a provider bound to a logger and a command runner
    fn new_provider(
        &self,
        logger: Logger,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<ProviderInstance>;
}

/// A resolved provider, one variant per resource kind
pub enum ProviderInstance {
    Package(Box<dyn PackageProvider>),
    Service(Box<dyn ServiceProvider>),
    Exec(Box<dyn ExecProvider>),
    Archive(Box<dyn ArchiveProvider>),
    File(Box<dyn FileProvider>),
}

impl ProviderInstance {
    /// Name of the wrapped provider
    pub fn name(&self) -> &str {
        match self {
            Self::Package(p) => p.name(),
            Self::Service(p) => p.name(),
            Self::Exec(p) => p.name(),
            Self::Archive(p) => p.name(),
            Self::File(p) => p.name(),
        }
    }

    /// Resource type the wrapped provider serves
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Package(_) => "package",
            Self::Service(_) => "service",
            Self::Exec(_) => "exec",
            Self::Archive(_) => "archive",
            Self::File(_) => "file",
        }
    }
}

impl fmt::Debug for ProviderInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProviderInstance({}#{})", self.type_name(), self.name())
    }
}
