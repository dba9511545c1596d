//! Provider registry
//!
//! Maps `type_name -> provider_name -> factory`. Every operation holds the
//! registry's single lock for its full duration, including the
//! manageability checks it triggers.
//!
//! Registries are explicit values shared through `Arc`, so tests can build
//! as many isolated registries as they need.

use crate::context::{CommandRunner, Logger};
use crate::error::{Error, Result};
use crate::kinds::ResourceProperties;
use crate::provider::{ProviderFactory, ProviderInstance};
use crate::types::Facts;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Registered {
    factory: Arc<dyn ProviderFactory>,
    /// Registration order, used to break priority ties
    sequence: u64,
}

#[derive(Default)]
struct Table {
    types: BTreeMap<String, BTreeMap<String, Registered>>,
    next_sequence: u64,
}

impl Table {
    fn select_providers(
        &self,
        type_name: &str,
        facts: &Facts,
        properties: &ResourceProperties,
    ) -> Vec<Arc<dyn ProviderFactory>> {
        let Some(factories) = self.types.get(type_name) else {
            return Vec::new();
        };

        let mut manageable: Vec<(i32, u64, &Arc<dyn ProviderFactory>)> = factories
            .values()
            .filter_map(|r| match r.factory.is_manageable(facts, properties) {
                Ok(Some(priority)) => Some((priority, r.sequence, &r.factory)),
                Ok(None) => None,
                Err(e) => {
                    log::warn!(
                        "Skipping provider {}#{}: manageability check failed: {}",
                        type_name,
                        r.factory.name(),
                        e
                    );
                    None
                }
            })
            .collect();

        manageable.sort_by_key(|(priority, sequence, _)| (*priority, *sequence));
        manageable
            .into_iter()
            .map(|(_, _, factory)| Arc::clone(factory))
            .collect()
    }

    fn select_provider(
        &self,
        type_name: &str,
        provider_name: &str,
        facts: &Facts,
        properties: &ResourceProperties,
    ) -> Result<Arc<dyn ProviderFactory>> {
        let registered = self
            .types
            .get(type_name)
            .and_then(|factories| factories.get(provider_name))
            .ok_or_else(|| Error::ProviderNotFound {
                type_name: type_name.to_string(),
                provider: provider_name.to_string(),
            })?;

        let not_manageable = |reason: String| Error::ProviderNotManageable {
            type_name: type_name.to_string(),
            provider: provider_name.to_string(),
            reason,
        };

        match registered.factory.is_manageable(facts, properties) {
            Ok(Some(_)) => Ok(Arc::clone(&registered.factory)),
            Ok(None) => Err(not_manageable("not supported on this host".to_string())),
            Err(e) => Err(not_manageable(format!("{e:#}"))),
        }
    }
}

/// Table of provider factories, keyed by resource type and provider name
#[derive(Default)]
pub struct Registry {
    table: Mutex<Table>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a factory
    ///
    /// Fails with [`Error::DuplicateProvider`] without touching the table if
    /// the `(type, provider)` pair is already present.
    pub fn register(&self, factory: Arc<dyn ProviderFactory>) -> Result<()> {
        let mut table = self.lock();
        let sequence = table.next_sequence;
        let type_name = factory.type_name().to_string();
        let provider = factory.name().to_string();

        let factories = table.types.entry(type_name.clone()).or_default();
        if factories.contains_key(&provider) {
            return Err(Error::DuplicateProvider {
                type_name,
                provider,
            });
        }
        factories.insert(provider, Registered { factory, sequence });
        table.next_sequence += 1;
        Ok(())
    }

    /// Every factory of a type that can manage the resource
    ///
    /// Sorted by ascending priority, then by registration order. Factories
    /// whose check errors are logged and skipped. Empty when nothing matches.
    pub fn select_providers(
        &self,
        type_name: &str,
        facts: &Facts,
        properties: &ResourceProperties,
    ) -> Vec<Arc<dyn ProviderFactory>> {
        self.lock().select_providers(type_name, facts, properties)
    }

    /// Look up a factory by exact name and check it can manage the resource
    pub fn select_provider(
        &self,
        type_name: &str,
        provider_name: &str,
        facts: &Facts,
        properties: &ResourceProperties,
    ) -> Result<Arc<dyn ProviderFactory>> {
        self.lock()
            .select_provider(type_name, provider_name, facts, properties)
    }

    /// Resolve and construct the provider for a resource
    ///
    /// With an empty `provider_name` exactly one factory must be manageable:
    /// none fails with [`Error::NoSuitableProvider`] and several with
    /// [`Error::MultipleProviders`]. A named provider that cannot be selected
    /// is reported as [`Error::ResourceInvalid`].
    pub fn find_suitable_provider(
        &self,
        type_name: &str,
        provider_name: &str,
        facts: &Facts,
        properties: &ResourceProperties,
        logger: Logger,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<ProviderInstance> {
        let table = self.lock();

        let factory = if provider_name.is_empty() {
            let mut candidates = table.select_providers(type_name, facts, properties);
            match candidates.len() {
                0 => {
                    return Err(Error::NoSuitableProvider {
                        type_name: type_name.to_string(),
                    });
                }
                1 => candidates.remove(0),
                _ => {
                    return Err(Error::MultipleProviders {
                        type_name: type_name.to_string(),
                        providers: candidates.iter().map(|f| f.name().to_string()).collect(),
                    });
                }
            }
        } else {
            table
                .select_provider(type_name, provider_name, facts, properties)
                .map_err(|e| Error::invalid(e.to_string()))?
        };

        logger.debug(format_args!("selected provider {}", factory.name()));
        Ok(factory.new_provider(logger, runner)?)
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<String> {
        self.lock().types.keys().cloned().collect()
    }

    /// Provider names registered for a type, sorted
    pub fn providers(&self, type_name: &str) -> Vec<String> {
        self.lock()
            .types
            .get(type_name)
            .map(|factories| factories.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove every registration
    pub fn clear(&self) {
        *self.lock() = Table::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::package::PackageProperties;
    use crate::testing::{MockRunner, StaticFactory};
    use serde_json::json;

    fn props() -> ResourceProperties {
        ResourceProperties::Package(PackageProperties::new("zsh", "present"))
    }

    fn registry_with(factories: Vec<StaticFactory>) -> Registry {
        let registry = Registry::new();
        for f in factories {
            registry.register(Arc::new(f)).unwrap();
        }
        registry
    }

    fn find(registry: &Registry, provider: &str) -> Result<ProviderInstance> {
        registry.find_suitable_provider(
            "package",
            provider,
            &json!({}),
            &props(),
            Logger::new("package#zsh"),
            Arc::new(MockRunner::new()),
        )
    }

    #[test]
    fn test_register_duplicate() {
        let registry = registry_with(vec![StaticFactory::package("apt", Some(1))]);
        let err = registry
            .register(Arc::new(StaticFactory::package("apt", Some(5))))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateProvider { .. }));

        // The original registration is untouched
        let selected = registry.select_providers("package", &json!({}), &props());
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_select_providers_orders_by_priority_then_registration() {
        let registry = registry_with(vec![
            StaticFactory::package("zypper", Some(5)),
            StaticFactory::package("dnf", Some(1)),
            StaticFactory::package("yum", Some(5)),
            StaticFactory::package("pacman", None),
        ]);

        let names: Vec<String> = registry
            .select_providers("package", &json!({}), &props())
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["dnf", "zypper", "yum"]);
    }

    #[test]
    fn test_select_providers_skips_erroring_factories() {
        let registry = registry_with(vec![
            StaticFactory::package("broken", Some(1)).failing(),
            StaticFactory::package("apt", Some(2)),
        ]);
        let selected = registry.select_providers("package", &json!({}), &props());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name(), "apt");
    }

    #[test]
    fn test_select_providers_unknown_type_is_empty() {
        let registry = Registry::new();
        assert!(
            registry
                .select_providers("package", &json!({}), &props())
                .is_empty()
        );
    }

    #[test]
    fn test_select_provider_errors() {
        let registry = registry_with(vec![
            StaticFactory::package("apt", None),
            StaticFactory::package("broken", Some(1)).failing(),
        ]);

        assert!(matches!(
            registry.select_provider("package", "dnf", &json!({}), &props()),
            Err(Error::ProviderNotFound { .. })
        ));
        assert!(matches!(
            registry.select_provider("package", "apt", &json!({}), &props()),
            Err(Error::ProviderNotManageable { .. })
        ));
        match registry.select_provider("package", "broken", &json!({}), &props()) {
            Err(Error::ProviderNotManageable { reason, .. }) => {
                assert!(reason.contains("manageability failed"));
            }
            other => panic!("unexpected result: {:?}", other.map(|f| f.name().to_string())),
        }
    }

    #[test]
    fn test_find_suitable_provider_requires_exactly_one() {
        let none = registry_with(vec![StaticFactory::package("apt", None)]);
        assert!(matches!(
            find(&none, ""),
            Err(Error::NoSuitableProvider { .. })
        ));

        let two = registry_with(vec![
            StaticFactory::package("apt", Some(1)),
            StaticFactory::package("dnf", Some(1)),
        ]);
        match find(&two, "") {
            Err(Error::MultipleProviders { providers, .. }) => {
                assert_eq!(providers, vec!["apt", "dnf"]);
            }
            other => panic!("expected MultipleProviders, got {other:?}"),
        }

        let one = registry_with(vec![StaticFactory::package("apt", Some(1))]);
        assert_eq!(find(&one, "").unwrap().name(), "apt");
    }

    #[test]
    fn test_find_suitable_provider_by_name() {
        // Registration order must not influence explicit selection
        for order in [["apt", "dnf"], ["dnf", "apt"]] {
            let registry = registry_with(
                order
                    .iter()
                    .map(|n| StaticFactory::package(n, Some(1)))
                    .collect(),
            );
            assert_eq!(find(&registry, "dnf").unwrap().name(), "dnf");
            assert_eq!(find(&registry, "apt").unwrap().name(), "apt");
        }
    }

    #[test]
    fn test_find_suitable_provider_wraps_named_errors() {
        let registry = registry_with(vec![StaticFactory::package("apt", Some(1))]);
        match find(&registry, "dnf") {
            Err(Error::ResourceInvalid { reason }) => {
                assert!(reason.contains("provider dnf not found"));
            }
            other => panic!("expected ResourceInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_types_and_clear() {
        let registry = registry_with(vec![
            StaticFactory::service("systemd", Some(1)),
            StaticFactory::package("apt", Some(1)),
        ]);
        assert_eq!(registry.types(), vec!["package", "service"]);
        assert_eq!(registry.providers("package"), vec!["apt"]);
        assert!(registry.providers("file").is_empty());

        registry.clear();
        assert!(registry.types().is_empty());
    }
}
