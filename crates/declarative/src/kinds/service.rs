//! Service resources
//!
//! Services are reconciled on two independent axes: running state (the
//! ensure value, `running` or `stopped`) and boot-time enablement (the
//! optional `enable` property). A subscribe refresh restarts a service that
//! should be, and already is, running.

use super::{Properties, resolve_common};
use crate::context::{ApplyContext, TemplateResolver};
use crate::error::{Error, Result};
use crate::provider::{Provider, ProviderInstance};
use crate::refresh;
use crate::resource::ResourceKind;
use crate::state::{ResourceState, ServiceMetadata};
use crate::types::{CommonProperties, ResourceRef, TemplateEnvironment};
use serde::{Deserialize, Serialize};

pub const TYPE_NAME: &str = "service";

pub const ENSURE_RUNNING: &str = "running";
pub const ENSURE_STOPPED: &str = "stopped";

/// Operations a service manager must support
pub trait ServiceProvider: Provider {
    /// Probe the service; `ensure` is "running" or "stopped"
    fn status(&self, name: &str) -> anyhow::Result<ResourceState<ServiceMetadata>>;
    fn start(&self, name: &str) -> anyhow::Result<()>;
    fn stop(&self, name: &str) -> anyhow::Result<()>;
    fn restart(&self, name: &str) -> anyhow::Result<()>;
    fn enable(&self, name: &str) -> anyhow::Result<()>;
    fn disable(&self, name: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
    /// Desired boot-time enablement, left alone when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
}

impl ServiceProperties {
    pub fn new(name: impl Into<String>, ensure: impl Into<String>) -> Self {
        Self {
            common: CommonProperties::new(name, ensure),
            enable: None,
        }
    }

    #[must_use]
    pub fn with_enable(mut self, enable: bool) -> Self {
        self.enable = Some(enable);
        self
    }

    fn should_run(&self) -> bool {
        self.common.ensure == ENSURE_RUNNING
    }

    pub fn is_desired_state(&self, state: &ResourceState<ServiceMetadata>) -> bool {
        let running_ok = self.should_run() == state.metadata.running;
        let enabled_ok = self.enable.is_none_or(|e| e == state.metadata.enabled);
        running_ok && enabled_ok
    }

    fn plan<'a>(
        &self,
        initial: &ResourceState<ServiceMetadata>,
        refresh: Option<&'a ResourceRef>,
    ) -> Vec<Action<'a>> {
        let mut actions = Vec::new();
        let running = initial.metadata.running;

        if let Some(source) = refresh {
            actions.push(Action::Restart(source));
        } else if self.should_run() && !running {
            actions.push(Action::Start);
        } else if !self.should_run() && running {
            actions.push(Action::Stop);
        }

        match self.enable {
            Some(true) if !initial.metadata.enabled => actions.push(Action::Enable),
            Some(false) if initial.metadata.enabled => actions.push(Action::Disable),
            _ => {}
        }

        actions
    }
}

impl From<ServiceProperties> for super::ResourceProperties {
    fn from(value: ServiceProperties) -> Self {
        Self::Service(value)
    }
}

impl Properties for ServiceProperties {
    fn validate(&self) -> Result<()> {
        self.common.validate(true)?;
        match self.common.ensure.as_str() {
            ENSURE_RUNNING | ENSURE_STOPPED => Ok(()),
            other => Err(Error::invalid(format!(
                "service ensure must be {ENSURE_RUNNING} or {ENSURE_STOPPED}, got {other}"
            ))),
        }
    }

    fn common(&self) -> &CommonProperties {
        &self.common
    }

    fn resolve_templates(
        &mut self,
        resolver: &dyn TemplateResolver,
        env: &TemplateEnvironment,
    ) -> Result<()> {
        resolve_common(resolver, env, &mut self.common)
    }
}

#[derive(Debug, Clone, Copy)]
enum Action<'a> {
    Start,
    Stop,
    Restart(&'a ResourceRef),
    Enable,
    Disable,
}

impl Action<'_> {
    fn perform(self, provider: &dyn ServiceProvider, name: &str) -> anyhow::Result<()> {
        match self {
            Self::Start => provider.start(name),
            Self::Stop => provider.stop(name),
            Self::Restart(_) => provider.restart(name),
            Self::Enable => provider.enable(name),
            Self::Disable => provider.disable(name),
        }
    }

    fn noop_message(self) -> String {
        match self {
            Self::Start => "Would have started".to_string(),
            Self::Stop => "Would have stopped".to_string(),
            Self::Restart(source) => format!("Would have restarted via {source}"),
            Self::Enable => "Would have enabled".to_string(),
            Self::Disable => "Would have disabled".to_string(),
        }
    }

    fn describe(self) -> String {
        match self {
            Self::Start => "Starting".to_string(),
            Self::Stop => "Stopping".to_string(),
            Self::Restart(source) => format!("Restarting, refresh requested by {source}"),
            Self::Enable => "Enabling".to_string(),
            Self::Disable => "Disabling".to_string(),
        }
    }
}

impl ResourceKind for ServiceProperties {
    const TYPE_NAME: &'static str = TYPE_NAME;
    type Provider = dyn ServiceProvider;
    type Metadata = ServiceMetadata;

    fn provider(instance: &ProviderInstance) -> Result<&Self::Provider> {
        match instance {
            ProviderInstance::Service(p) => Ok(p.as_ref()),
            other => Err(Error::ProviderMismatch {
                expected: TYPE_NAME,
                provider: other.name().to_string(),
            }),
        }
    }

    fn status(&self, provider: &Self::Provider) -> Result<ResourceState<ServiceMetadata>> {
        Ok(provider.status(&self.common.name)?)
    }

    fn apply_resource(
        &self,
        ctx: &ApplyContext<'_>,
        provider: &Self::Provider,
    ) -> Result<ResourceState<ServiceMetadata>> {
        let name = &self.common.name;
        let initial = provider.status(name)?;

        let refresh = if self.should_run() && initial.metadata.running {
            refresh::triggered_by(ctx, &self.common.subscribe)?
        } else {
            None
        };

        if refresh.is_none() && self.is_desired_state(&initial) {
            return Ok(initial.mark_stable());
        }

        let actions = self.plan(&initial, refresh.as_ref());

        if ctx.noop {
            let messages: Vec<String> = actions.iter().map(|a| a.noop_message()).collect();
            let mut state = initial.mark_noop(&messages);
            if let Some(message) = &state.noop_message {
                ctx.logger.info(message);
            }
            state.refreshed = refresh.is_some();
            return Ok(state);
        }

        for action in &actions {
            ctx.logger.info(action.describe());
            action.perform(provider, name)?;
        }

        let mut current = provider.status(name)?;
        if !self.is_desired_state(&current) {
            return Err(Error::DesiredStateFailed(format!(
                "{name} is {} (enabled: {}) after reconciliation",
                current.ensure, current.metadata.enabled
            )));
        }

        current.changed = true;
        current.refreshed = refresh.is_some();
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Logger;
    use crate::testing::{MockManager, MockService};

    fn apply_with(
        manager: &MockManager,
        props: &ServiceProperties,
        provider: &MockService,
        noop: bool,
    ) -> Result<ResourceState<ServiceMetadata>> {
        let logger = Logger::new("service#test");
        let ctx = ApplyContext::new(noop, &logger, manager);
        props.apply_resource(&ctx, provider)
    }

    fn apply(
        props: &ServiceProperties,
        provider: &MockService,
        noop: bool,
    ) -> Result<ResourceState<ServiceMetadata>> {
        apply_with(&MockManager::new(), props, provider, noop)
    }

    #[test]
    fn test_start_and_enable() {
        let provider = MockService::new().service("nginx", false, false);
        let props = ServiceProperties::new("nginx", "running").with_enable(true);

        let state = apply(&props, &provider, false).unwrap();

        assert_eq!(provider.calls(), vec!["start nginx", "enable nginx"]);
        assert!(state.changed);
        assert!(state.metadata.running);
        assert!(state.metadata.enabled);
    }

    #[test]
    fn test_noop_joins_messages() {
        let provider = MockService::new().service("nginx", false, false);
        let props = ServiceProperties::new("nginx", "running").with_enable(true);

        let state = apply(&props, &provider, true).unwrap();

        assert!(provider.calls().is_empty());
        assert!(state.changed);
        assert_eq!(
            state.noop_message.as_deref(),
            Some("Would have started, would have enabled")
        );
    }

    #[test]
    fn test_stop_and_disable() {
        let provider = MockService::new().service("nginx", true, true);
        let props = ServiceProperties::new("nginx", "stopped").with_enable(false);
        apply(&props, &provider, false).unwrap();
        assert_eq!(provider.calls(), vec!["stop nginx", "disable nginx"]);
    }

    #[test]
    fn test_enable_unset_leaves_enablement_alone() {
        let provider = MockService::new().service("nginx", true, false);
        let state = apply(&ServiceProperties::new("nginx", "running"), &provider, false).unwrap();
        assert!(provider.calls().is_empty());
        assert!(state.stable);
    }

    #[test]
    fn test_refresh_restarts_running_service() {
        let manager = MockManager::new().with_changed("package", "nginx");
        let provider = MockService::new().service("nginx", true, true);
        let mut props = ServiceProperties::new("nginx", "running");
        props.common.subscribe = vec![ResourceRef::new("package", "nginx")];

        let state = apply_with(&manager, &props, &provider, false).unwrap();

        assert_eq!(provider.calls(), vec!["restart nginx"]);
        assert!(state.refreshed);
        assert!(state.changed);
    }

    #[test]
    fn test_refresh_noop_message() {
        let manager = MockManager::new().with_changed("package", "nginx");
        let provider = MockService::new().service("nginx", true, true);
        let mut props = ServiceProperties::new("nginx", "running");
        props.common.subscribe = vec![ResourceRef::new("package", "nginx")];

        let state = apply_with(&manager, &props, &provider, true).unwrap();

        assert!(provider.calls().is_empty());
        assert!(state.refreshed);
        assert_eq!(
            state.noop_message.as_deref(),
            Some("Would have restarted via package#nginx")
        );
    }

    #[test]
    fn test_refresh_ignored_when_stopped() {
        let manager = MockManager::new().with_changed("package", "nginx");
        let provider = MockService::new().service("nginx", false, false);
        let mut props = ServiceProperties::new("nginx", "running");
        props.common.subscribe = vec![ResourceRef::new("package", "nginx")];

        let state = apply_with(&manager, &props, &provider, false).unwrap();

        assert_eq!(provider.calls(), vec!["start nginx"]);
        assert!(!state.refreshed);
    }

    #[test]
    fn test_refresh_ignored_when_unchanged() {
        let provider = MockService::new().service("nginx", true, true);
        let mut props = ServiceProperties::new("nginx", "running");
        props.common.subscribe = vec![ResourceRef::new("package", "nginx")];

        let state = apply(&props, &provider, false).unwrap();

        assert!(provider.calls().is_empty());
        assert!(!state.refreshed);
        assert!(state.stable);
    }

    #[test]
    fn test_refresh_tracker_error() {
        let manager = MockManager::new().with_tracker_error();
        let provider = MockService::new().service("nginx", true, true);
        let mut props = ServiceProperties::new("nginx", "running");
        props.common.subscribe = vec![ResourceRef::new("package", "nginx")];

        let err = apply_with(&manager, &props, &provider, false).unwrap_err();
        assert!(matches!(err, Error::Tracker { .. }));
    }

    #[test]
    fn test_diverged_state_fails() {
        let provider = MockService::new()
            .service("nginx", false, false)
            .ignoring_mutations();
        let err = apply(&ServiceProperties::new("nginx", "running"), &provider, false).unwrap_err();
        assert!(matches!(err, Error::DesiredStateFailed(_)));
    }

    #[test]
    fn test_validate_ensure() {
        assert!(ServiceProperties::new("nginx", "running").validate().is_ok());
        assert!(ServiceProperties::new("nginx", "stopped").validate().is_ok());
        assert!(matches!(
            ServiceProperties::new("nginx", "present").validate(),
            Err(Error::ResourceInvalid { .. })
        ));
    }
}
