//! Shared apply and health check flow
//!
//! Every kind goes through the same steps: control expressions, require
//! gating, provider acquisition, type-specific reconciliation, health checks
//! and event assembly. Only the reconciliation step differs per kind.

use crate::context::{ApplyContext, Logger, Manager};
use crate::error::{Error, Result};
use crate::event::TransactionEvent;
use crate::kinds::{Properties, ResourceProperties};
use crate::provider::ProviderInstance;
use crate::registry::Registry;
use crate::resource::ResourceKind;
use crate::types::{CommonProperties, Facts};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;

/// Lazily resolved provider, shared by concurrent callers
///
/// Initialization is serialized and only a successful result is cached, so
/// a failed resolution is retried by the next caller.
#[derive(Default)]
pub(crate) struct ProviderCell {
    cell: OnceLock<ProviderInstance>,
    init: Mutex<()>,
}

impl ProviderCell {
    pub(crate) fn get_or_try_init(
        &self,
        init: impl FnOnce() -> Result<ProviderInstance>,
    ) -> Result<&ProviderInstance> {
        if let Some(provider) = self.cell.get() {
            return Ok(provider);
        }

        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(provider) = self.cell.get() {
            return Ok(provider);
        }

        let provider = init()?;
        Ok(self.cell.get_or_init(|| provider))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Apply,
    HealthCheck,
}

/// Controller that runs a resource through apply or health check
pub(crate) struct Lifecycle {
    manager: Arc<dyn Manager>,
    registry: Arc<Registry>,
    /// Facts as seen when the resource was constructed
    facts: Facts,
    logger: Logger,
    provider: ProviderCell,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("logger", &self.logger)
            .field("provider", &self.provider.cell.get())
            .finish_non_exhaustive()
    }
}

impl Lifecycle {
    pub(crate) fn new(
        resource_type: &str,
        common: &CommonProperties,
        manager: Arc<dyn Manager>,
        registry: Arc<Registry>,
        facts: Facts,
    ) -> Self {
        let logger = manager.logger(resource_type, &common.name);
        Self {
            manager,
            registry,
            facts,
            logger,
            provider: ProviderCell::default(),
        }
    }

    /// The resolved provider, resolving it on first use
    pub(crate) fn provider<K: ResourceKind>(&self, kind: &K) -> Result<&ProviderInstance> {
        self.provider.get_or_try_init(|| {
            let properties: ResourceProperties = kind.clone().into();
            self.registry.find_suitable_provider(
                K::TYPE_NAME,
                kind.common().provider_name(),
                &self.facts,
                &properties,
                self.logger.clone(),
                self.manager.new_runner(),
            )
        })
    }

    pub(crate) fn apply<K: ResourceKind>(&self, kind: &K) -> TransactionEvent {
        self.run(kind, Mode::Apply)
    }

    pub(crate) fn healthcheck<K: ResourceKind>(&self, kind: &K) -> TransactionEvent {
        self.run(kind, Mode::HealthCheck)
    }

    fn run<K: ResourceKind>(&self, kind: &K, mode: Mode) -> TransactionEvent {
        let started = Instant::now();
        let mut event = TransactionEvent::new(K::TYPE_NAME, kind.common());

        if let Err(e) = self.run_steps(kind, mode, &mut event) {
            self.logger.error(&e);
            event.fail(e);
        }

        event.duration = started.elapsed();
        event
    }

    fn run_steps<K: ResourceKind>(
        &self,
        kind: &K,
        mode: Mode,
        event: &mut TransactionEvent,
    ) -> Result<()> {
        let common = kind.common();

        if self.should_skip(common, event)? {
            return Ok(());
        }

        let instance = self.provider(kind)?;
        event.provider = Some(instance.name().to_string());
        let provider = K::provider(instance)?;

        if mode == Mode::Apply {
            let noop = self.manager.noop_mode();
            let ctx = ApplyContext::new(noop, &self.logger, self.manager.as_ref());
            let started = Instant::now();
            let outcome = kind.apply_resource(&ctx, provider);
            self.logger
                .debug(format_args!("reconciled in {:?}", started.elapsed()));
            event.record_state(&outcome?);
        }

        self.run_health_checks(K::TYPE_NAME, common, event);
        Ok(())
    }

    /// Apply control expressions and require gating
    ///
    /// Returns true when the resource is skipped; the reason is recorded on
    /// the event.
    fn should_skip(
        &self,
        common: &CommonProperties,
        event: &mut TransactionEvent,
    ) -> Result<bool> {
        if !self.should_manage(common)? {
            self.logger.info("skipped by control expression");
            event.skipped = true;
            return Ok(true);
        }

        let unmet = self.unmet_requirements(common)?;
        if !unmet.is_empty() {
            self.logger.warn(format_args!(
                "skipped, failed requirements: {}",
                unmet.join(", ")
            ));
            event.skipped = true;
            event.unmet_requirements = unmet;
            return Ok(true);
        }

        Ok(false)
    }

    fn should_manage(&self, common: &CommonProperties) -> Result<bool> {
        let Some(control) = &common.control else {
            return Ok(true);
        };

        let env = self.manager.template_environment();
        let evaluator = self.manager.expression_evaluator();
        let evaluate = |expression: &str| {
            evaluator
                .evaluate(expression, &env)
                .map_err(|source| Error::Expression {
                    expression: expression.to_string(),
                    source,
                })
        };

        if let Some(unless) = &control.manage_unless
            && evaluate(unless)?
        {
            return Ok(false);
        }
        if let Some(only_if) = &control.manage_if {
            return evaluate(only_if);
        }
        Ok(true)
    }

    fn unmet_requirements(&self, common: &CommonProperties) -> Result<Vec<String>> {
        let mut unmet = Vec::new();
        for reference in &common.require {
            let failed = self
                .manager
                .is_resource_failed(&reference.type_name, &reference.name)
                .map_err(|source| Error::Tracker {
                    reference: reference.to_string(),
                    source,
                })?;
            if failed {
                unmet.push(reference.to_string());
            }
        }
        Ok(unmet)
    }

    fn run_health_checks(
        &self,
        resource_type: &str,
        common: &CommonProperties,
        event: &mut TransactionEvent,
    ) {
        if common.health_checks.is_empty() {
            return;
        }

        let runner = self.manager.new_runner();
        let checker = self.manager.health_checker();

        for check in &common.health_checks {
            match checker.execute(resource_type, &common.name, check, runner.as_ref()) {
                Ok(result) => {
                    if !result.status.is_ok() {
                        let message =
                            format!("health check {} returned {}", result.name, result.status);
                        self.logger.error(&message);
                        event.fail(message);
                    }
                    event.health_checks.push(result);
                }
                Err(e) => {
                    let message = format!("health check {} failed: {e:#}", check.display_name());
                    self.logger.error(&message);
                    event.fail(message);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::package::PackageProperties;
    use crate::testing::{MockManager, MockPackage, StaticFactory};
    use crate::types::{ControlProperties, HealthCheck, ResourceRef};
    use serde_json::json;

    fn setup(manager: MockManager, provider: MockPackage) -> (Arc<dyn Manager>, Arc<Registry>) {
        let registry = Registry::new();
        let factory = StaticFactory::package("mock", Some(1)).with_package(provider);
        registry.register(Arc::new(factory)).unwrap();
        (Arc::new(manager), Arc::new(registry))
    }

    fn lifecycle(
        manager: Arc<dyn Manager>,
        registry: Arc<Registry>,
        props: &PackageProperties,
    ) -> Lifecycle {
        Lifecycle::new("package", &props.common, manager, registry, json!({}))
    }

    #[test]
    fn test_apply_success_event() {
        let provider = MockPackage::new().installed("zsh", "1.0.0");
        let (manager, registry) = setup(MockManager::new(), provider.clone());
        let props = PackageProperties::new("zsh", "2.0.0");

        let event = lifecycle(manager, registry, &props).apply(&props);

        assert!(!event.failed, "{:?}", event.errors);
        assert!(event.changed);
        assert_eq!(event.provider.as_deref(), Some("mock"));
        assert_eq!(event.requested_ensure, "2.0.0");
        assert_eq!(event.actual_ensure, "2.0.0");
        assert_eq!(provider.calls(), vec!["upgrade zsh 2.0.0"]);
    }

    #[test]
    fn test_unmet_requirement_skips() {
        let provider = MockPackage::new();
        let manager = MockManager::new().with_failed("package", "base");
        let (manager, registry) = setup(manager, provider.clone());
        let mut props = PackageProperties::new("zsh", "present");
        props.common.require = vec![ResourceRef::new("package", "base")];

        let event = lifecycle(manager, registry, &props).apply(&props);

        assert!(event.skipped);
        assert!(!event.failed);
        assert_eq!(event.unmet_requirements, vec!["package#base"]);
        assert!(provider.calls().is_empty());
        assert_eq!(event.provider, None);
    }

    #[test]
    fn test_control_expression_skips() {
        let provider = MockPackage::new();
        let manager = MockManager::new().with_expression("false", false);
        let (manager, registry) = setup(manager, provider.clone());
        let mut props = PackageProperties::new("zsh", "present");
        props.common.control = Some(ControlProperties {
            manage_if: Some("false".to_string()),
            manage_unless: None,
        });

        let event = lifecycle(manager, registry, &props).apply(&props);

        assert!(event.skipped);
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn test_manage_unless_wins() {
        let manager = MockManager::new()
            .with_expression("yes", true)
            .with_expression("also", true);
        let (manager, registry) = setup(manager, MockPackage::new());
        let mut props = PackageProperties::new("zsh", "present");
        props.common.control = Some(ControlProperties {
            manage_if: Some("yes".to_string()),
            manage_unless: Some("also".to_string()),
        });

        let event = lifecycle(manager, registry, &props).apply(&props);
        assert!(event.skipped);
    }

    #[test]
    fn test_expression_error_fails() {
        let (manager, registry) = setup(MockManager::new(), MockPackage::new());
        let mut props = PackageProperties::new("zsh", "present");
        props.common.control = Some(ControlProperties {
            manage_if: Some("unknown".to_string()),
            manage_unless: None,
        });

        let event = lifecycle(manager, registry, &props).apply(&props);

        assert!(event.failed);
        assert!(!event.skipped);
        assert!(event.errors[0].contains("could not evaluate expression 'unknown'"));
    }

    #[test]
    fn test_no_provider_fails() {
        let manager: Arc<dyn Manager> = Arc::new(MockManager::new());
        let registry = Arc::new(Registry::new());
        let props = PackageProperties::new("zsh", "present");

        let event = lifecycle(manager, registry, &props).apply(&props);

        assert!(event.failed);
        assert!(event.errors[0].contains("no suitable provider"));
    }

    #[test]
    fn test_provider_is_resolved_once() {
        let registry = Registry::new();
        let factory = Arc::new(StaticFactory::package("mock", Some(1)));
        registry.register(factory.clone()).unwrap();
        let manager: Arc<dyn Manager> = Arc::new(MockManager::new());
        let props = PackageProperties::new("zsh", "present");

        let lifecycle = lifecycle(manager, Arc::new(registry), &props);
        lifecycle.apply(&props);
        lifecycle.apply(&props);
        lifecycle.healthcheck(&props);

        assert_eq!(factory.constructed(), 1);
    }

    #[test]
    fn test_concurrent_resolution_constructs_once() {
        let registry = Registry::new();
        let factory = Arc::new(StaticFactory::package("mock", Some(1)));
        registry.register(factory.clone()).unwrap();
        let manager: Arc<dyn Manager> = Arc::new(MockManager::new());
        let props = PackageProperties::new("zsh", "present");
        let lifecycle = lifecycle(manager, Arc::new(registry), &props);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| lifecycle.provider(&props).map(|p| p.name().to_string()));
            }
        });

        assert_eq!(factory.constructed(), 1);
    }

    #[test]
    fn test_apply_error_skips_health_checks() {
        let provider = MockPackage::new().failing_mutations("dpkg lock held");
        let (manager, registry) = setup(MockManager::new(), provider);
        let mut props = PackageProperties::new("zsh", "present");
        props.common.health_checks = vec![HealthCheck::new("check_zsh")];

        let event = lifecycle(manager, registry, &props).apply(&props);

        assert!(event.failed);
        assert_eq!(event.errors, vec!["dpkg lock held"]);
        assert!(event.health_checks.is_empty());
    }

    #[test]
    fn test_failing_health_check_fails_event() {
        let provider = MockPackage::new().installed("zsh", "1.0.0");
        let manager = MockManager::new().with_health_exit("check_zsh", 2);
        let (manager, registry) = setup(manager, provider);
        let mut props = PackageProperties::new("zsh", "present");
        props.common.health_checks = vec![HealthCheck::new("check_zsh")];

        let event = lifecycle(manager, registry, &props).apply(&props);

        assert!(event.failed);
        assert_eq!(event.health_checks.len(), 1);
        assert!(event.errors[0].contains("CRITICAL"));
    }

    #[test]
    fn test_healthcheck_mode_does_not_reconcile() {
        let provider = MockPackage::new();
        let manager = MockManager::new().with_health_exit("check_zsh", 0);
        let (manager, registry) = setup(manager, provider.clone());
        let mut props = PackageProperties::new("zsh", "present");
        props.common.health_checks = vec![HealthCheck::new("check_zsh")];

        let event = lifecycle(manager, registry, &props).healthcheck(&props);

        assert!(!event.failed);
        assert!(!event.changed);
        assert!(provider.calls().is_empty());
        assert_eq!(event.health_checks.len(), 1);
    }

    #[test]
    fn test_noop_mode_from_manager() {
        let provider = MockPackage::new();
        let (manager, registry) = setup(MockManager::new().noop(), provider.clone());
        let props = PackageProperties::new("zsh", "present");

        let event = lifecycle(manager, registry, &props).apply(&props);

        assert!(event.noop);
        assert!(event.changed);
        assert_eq!(event.noop_message.as_deref(), Some("Would have installed"));
        assert!(provider.calls().is_empty());
    }
}
