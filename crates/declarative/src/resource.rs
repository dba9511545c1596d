//! Resources
//!
//! A [`Resource`] is a validated set of properties bound to a manager and a
//! provider registry. Callers apply it, health check it or inspect its
//! current state; every kind shares the same lifecycle through [`Managed`].

use crate::context::{ApplyContext, Manager};
use crate::error::{Error, Result};
use crate::event::TransactionEvent;
use crate::kinds::{
    ArchiveProperties, ExecProperties, FileProperties, PackageProperties, Properties,
    ResourceProperties, ServiceProperties,
};
use crate::lifecycle::Lifecycle;
use crate::provider::ProviderInstance;
use crate::registry::Registry;
use crate::state::ResourceState;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A managed resource
///
/// Apply and health check never return errors; failures are reported on the
/// returned event.
pub trait Resource: Send + Sync + fmt::Debug {
    /// Resource type, e.g. "package"
    fn resource_type(&self) -> &'static str;

    /// Resource name, unique within its type
    fn name(&self) -> &str;

    /// Alternative name other resources may refer to this one by
    fn alias(&self) -> Option<&str>;

    /// Converge the resource toward its desired state
    fn apply(&self) -> TransactionEvent;

    /// Run only the health checks, without reconciling
    fn healthcheck(&self) -> TransactionEvent;

    /// Current state as reported by the provider
    fn info(&self) -> Result<ResourceInfo>;

    /// Name of the provider managing this resource
    fn provider(&self) -> Result<String>;

    /// The `type#name` identity
    fn reference(&self) -> String {
        format!("{}#{}", self.resource_type(), self.name())
    }
}

/// Type alias for boxed resources
pub type BoxedResource = Box<dyn Resource>;

/// Observed state of a resource, with type-erased metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceInfo {
    pub resource_type: String,
    pub name: String,
    pub provider: String,
    pub state: ResourceState<Value>,
}

/// A resource kind: its properties, provider trait and reconciliation
///
/// Implemented by each typed properties struct.
pub trait ResourceKind:
    Properties + Clone + Into<ResourceProperties> + fmt::Debug + Send + Sync + 'static
{
    const TYPE_NAME: &'static str;

    /// Provider capability trait for the kind
    type Provider: ?Sized;

    /// Type-specific state payload
    type Metadata: Serialize;

    /// Narrow a resolved provider to this kind's capabilities
    fn provider(instance: &ProviderInstance) -> Result<&Self::Provider>;

    /// Probe the current state without changing anything
    fn status(&self, provider: &Self::Provider) -> Result<ResourceState<Self::Metadata>>;

    /// Converge toward the desired state, or describe the change in noop mode
    fn apply_resource(
        &self,
        ctx: &ApplyContext<'_>,
        provider: &Self::Provider,
    ) -> Result<ResourceState<Self::Metadata>>;
}

/// A resource of kind `K` together with its lifecycle
pub struct Managed<K: ResourceKind> {
    properties: K,
    lifecycle: Lifecycle,
}

pub type PackageResource = Managed<PackageProperties>;
pub type ServiceResource = Managed<ServiceProperties>;
pub type ExecResource = Managed<ExecProperties>;
pub type ArchiveResource = Managed<ArchiveProperties>;
pub type FileResource = Managed<FileProperties>;

impl<K: ResourceKind> Managed<K> {
    /// Resolve templates, validate and bind the properties
    ///
    /// Facts are captured now and used for provider selection later.
    pub fn new(
        manager: Arc<dyn Manager>,
        registry: Arc<Registry>,
        mut properties: K,
    ) -> Result<Self> {
        let env = manager.template_environment();
        properties.resolve_templates(manager.template_resolver(), &env)?;
        properties.validate()?;

        let lifecycle = Lifecycle::new(
            K::TYPE_NAME,
            properties.common(),
            manager,
            registry,
            env.facts,
        );

        Ok(Self {
            properties,
            lifecycle,
        })
    }

    /// The resolved, validated properties
    pub fn properties(&self) -> &K {
        &self.properties
    }
}

impl<K: ResourceKind> fmt::Debug for Managed<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("properties", &self.properties)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl<K: ResourceKind> Resource for Managed<K> {
    fn resource_type(&self) -> &'static str {
        K::TYPE_NAME
    }

    fn name(&self) -> &str {
        &self.properties.common().name
    }

    fn alias(&self) -> Option<&str> {
        self.properties.common().alias.as_deref()
    }

    fn apply(&self) -> TransactionEvent {
        self.lifecycle.apply(&self.properties)
    }

    fn healthcheck(&self) -> TransactionEvent {
        self.lifecycle.healthcheck(&self.properties)
    }

    fn info(&self) -> Result<ResourceInfo> {
        let instance = self.lifecycle.provider(&self.properties)?;
        let state = self.properties.status(K::provider(instance)?)?;
        let metadata = serde_json::to_value(&state.metadata).map_err(anyhow::Error::from)?;

        Ok(ResourceInfo {
            resource_type: K::TYPE_NAME.to_string(),
            name: self.name().to_string(),
            provider: instance.name().to_string(),
            state: state.map_metadata(|_| metadata),
        })
    }

    fn provider(&self) -> Result<String> {
        Ok(self.lifecycle.provider(&self.properties)?.name().to_string())
    }
}

/// Build a resource from properties of any kind
pub fn new_resource(
    manager: Arc<dyn Manager>,
    registry: Arc<Registry>,
    properties: ResourceProperties,
) -> Result<BoxedResource> {
    Ok(match properties {
        ResourceProperties::Package(p) => Box::new(Managed::new(manager, registry, p)?),
        ResourceProperties::Service(p) => Box::new(Managed::new(manager, registry, p)?),
        ResourceProperties::Exec(p) => Box::new(Managed::new(manager, registry, p)?),
        ResourceProperties::Archive(p) => Box::new(Managed::new(manager, registry, p)?),
        ResourceProperties::File(p) => Box::new(Managed::new(manager, registry, p)?),
    })
}

/// Build a resource from a JSON object with a `type` field
pub fn resource_from_value(
    manager: Arc<dyn Manager>,
    registry: Arc<Registry>,
    value: Value,
) -> Result<BoxedResource> {
    let properties: ResourceProperties =
        serde_json::from_value(value).map_err(|e| Error::invalid(e.to_string()))?;
    new_resource(manager, registry, properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockManager, MockPackage, MockService, StaticFactory};
    use serde_json::json;

    fn registry() -> Arc<Registry> {
        let registry = Registry::new();
        let package = MockPackage::new().installed("zsh", "1.0.0");
        let factory = StaticFactory::package("mock", Some(1)).with_package(package);
        registry.register(Arc::new(factory)).unwrap();
        let service = MockService::new().service("nginx", true, true);
        let factory = StaticFactory::service("mock", Some(1)).with_service(service);
        registry.register(Arc::new(factory)).unwrap();
        Arc::new(registry)
    }

    fn manager() -> Arc<dyn Manager> {
        Arc::new(MockManager::new().with_data(json!({"version": "2.0.0"})))
    }

    #[test]
    fn test_new_resource_dispatches_by_type() {
        let props = ResourceProperties::Service(ServiceProperties::new("nginx", "running"));
        let resource = new_resource(manager(), registry(), props).unwrap();
        assert_eq!(resource.resource_type(), "service");
        assert_eq!(resource.reference(), "service#nginx");
    }

    #[test]
    fn test_new_resource_validates() {
        let props = ResourceProperties::Package(PackageProperties::new("", "present"));
        let err = new_resource(manager(), registry(), props).unwrap_err();
        assert!(matches!(err, Error::ResourceNameRequired));
    }

    #[test]
    fn test_templates_resolved_before_validation() {
        let props = PackageProperties::new("zsh", "{{ data.version }}");
        let resource = Managed::new(manager(), registry(), props).unwrap();
        assert_eq!(resource.properties().common.ensure, "2.0.0");

        let event = resource.apply();
        assert!(!event.failed, "{:?}", event.errors);
        assert!(event.changed);
        assert_eq!(event.actual_ensure, "2.0.0");
    }

    #[test]
    fn test_info_and_provider() {
        let resource = Managed::new(
            manager(),
            registry(),
            PackageProperties::new("zsh", "present"),
        )
        .unwrap();

        assert_eq!(resource.provider().unwrap(), "mock");
        let info = resource.info().unwrap();
        assert_eq!(info.provider, "mock");
        assert_eq!(info.state.ensure, "1.0.0");
        assert_eq!(info.state.metadata["name"], "zsh");
    }

    #[test]
    fn test_resource_from_value() {
        let resource = resource_from_value(
            manager(),
            registry(),
            json!({"type": "package", "name": "zsh", "ensure": "present"}),
        )
        .unwrap();
        assert_eq!(resource.reference(), "package#zsh");

        let err = resource_from_value(manager(), registry(), json!({"type": "printer"}))
            .unwrap_err();
        assert!(matches!(err, Error::ResourceInvalid { .. }));
    }
}
