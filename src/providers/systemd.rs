//! `service#systemd` - units managed through systemctl

use anyhow::{Result, bail};
use declarative::kinds::service::{ENSURE_RUNNING, ENSURE_STOPPED, ServiceProvider};
use declarative::state::ServiceMetadata;
use declarative::{
    CommandRunner, Facts, Logger, Provider, ProviderFactory, ProviderInstance,
    ResourceProperties, ResourceState,
};
use std::path::Path;
use std::sync::Arc;

pub const NAME: &str = "systemd";

const SYSTEMCTL: &str = "systemctl";

/// Present when systemd is the running init system
const SYSTEMD_RUNTIME: &str = "/run/systemd/system";

pub struct SystemdFactory;

impl ProviderFactory for SystemdFactory {
    fn type_name(&self) -> &str {
        declarative::kinds::service::TYPE_NAME
    }

    fn name(&self) -> &str {
        NAME
    }

    fn is_manageable(&self, _: &Facts, _: &ResourceProperties) -> Result<Option<i32>> {
        let booted = Path::new(SYSTEMD_RUNTIME).is_dir();
        Ok((booted && which::which(SYSTEMCTL).is_ok()).then_some(10))
    }

    fn new_provider(
        &self,
        logger: Logger,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<ProviderInstance> {
        Ok(ProviderInstance::Service(Box::new(Systemd { logger, runner })))
    }
}

pub struct Systemd {
    logger: Logger,
    runner: Arc<dyn CommandRunner>,
}

impl Systemd {
    /// First line of `systemctl <query> <unit>`, regardless of exit code
    fn query(&self, query: &str, name: &str) -> Result<String> {
        let output = self.runner.execute(SYSTEMCTL, &[query, name])?;
        let answer = output.stdout_str().lines().next().unwrap_or_default().trim().to_string();
        self.logger.debug(format_args!("{query}: {answer}"));
        Ok(answer)
    }

    fn systemctl(&self, action: &str, name: &str) -> Result<()> {
        self.logger.info(format_args!("Running: {SYSTEMCTL} {action} {name}"));
        let output = self.runner.execute(SYSTEMCTL, &[action, name])?;
        if !output.success() {
            bail!(
                "{SYSTEMCTL} {action} {name} failed: {}",
                output.stderr_str().trim()
            );
        }
        Ok(())
    }
}

impl Provider for Systemd {
    fn name(&self) -> &str {
        NAME
    }
}

fn is_enabled(answer: &str) -> bool {
    matches!(answer, "enabled" | "enabled-runtime" | "alias")
}

impl ServiceProvider for Systemd {
    fn status(&self, name: &str) -> Result<ResourceState<ServiceMetadata>> {
        let running = self.query("is-active", name)? == "active";
        let enabled = is_enabled(&self.query("is-enabled", name)?);
        let ensure = if running {
            ENSURE_RUNNING
        } else {
            ENSURE_STOPPED
        };
        Ok(ResourceState::new(
            ensure,
            ServiceMetadata {
                name: name.to_string(),
                running,
                enabled,
            },
        ))
    }

    fn start(&self, name: &str) -> Result<()> {
        self.systemctl("start", name)
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.systemctl("stop", name)
    }

    fn restart(&self, name: &str) -> Result<()> {
        self.systemctl("restart", name)
    }

    fn enable(&self, name: &str) -> Result<()> {
        self.systemctl("enable", name)
    }

    fn disable(&self, name: &str) -> Result<()> {
        self.systemctl("disable", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::testing::MockRunner;

    fn systemd(runner: Arc<MockRunner>) -> Systemd {
        Systemd {
            logger: Logger::new("service#nginx"),
            runner,
        }
    }

    #[test]
    fn test_status_running_enabled() {
        let runner = MockRunner::new()
            .respond("systemctl is-active", 0, "active\n")
            .respond("systemctl is-enabled", 0, "enabled\n");
        let state = systemd(Arc::new(runner)).status("nginx").unwrap();
        assert_eq!(state.ensure, "running");
        assert!(state.metadata.running);
        assert!(state.metadata.enabled);
    }

    #[test]
    fn test_status_stopped_disabled() {
        let runner = MockRunner::new()
            .respond("systemctl is-active", 3, "inactive\n")
            .respond("systemctl is-enabled", 1, "disabled\n");
        let state = systemd(Arc::new(runner)).status("nginx").unwrap();
        assert_eq!(state.ensure, "stopped");
        assert!(!state.metadata.running);
        assert!(!state.metadata.enabled);
    }

    #[test]
    fn test_actions() {
        let runner = Arc::new(MockRunner::new());
        let provider = systemd(runner.clone());
        provider.start("nginx").unwrap();
        provider.restart("nginx").unwrap();
        provider.disable("nginx").unwrap();
        assert_eq!(
            runner.calls(),
            vec![
                "systemctl start nginx",
                "systemctl restart nginx",
                "systemctl disable nginx"
            ]
        );
    }

    #[test]
    fn test_failed_action() {
        let runner = MockRunner::new().respond("systemctl start", 5, "");
        let err = systemd(Arc::new(runner)).start("nginx").unwrap_err();
        assert!(err.to_string().starts_with("systemctl start nginx failed"));
    }
}
