//! The agent side of the engine's `Manager` contract

use anyhow::Result;
use declarative::{
    CommandRunner, ExpressionEvaluator, HealthCheckExecutor, Manager, TemplateEnvironment,
    TemplateResolver,
};
use std::sync::Arc;
use std::time::Duration;

use crate::expression::Conditions;
use crate::healthcheck::NagiosChecker;
use crate::runner::ProcessRunner;
use crate::session::Session;
use crate::template::Placeholders;

/// Manager backed by a session, host facts and manifest data
pub struct Agent {
    noop: bool,
    command_timeout: Option<Duration>,
    env: TemplateEnvironment,
    session: Arc<Session>,
}

impl Agent {
    pub fn new(
        noop: bool,
        command_timeout: Option<Duration>,
        env: TemplateEnvironment,
        session: Arc<Session>,
    ) -> Self {
        Self {
            noop,
            command_timeout,
            env,
            session,
        }
    }
}

impl Manager for Agent {
    fn noop_mode(&self) -> bool {
        self.noop
    }

    fn new_runner(&self) -> Arc<dyn CommandRunner> {
        Arc::new(ProcessRunner::new(self.command_timeout))
    }

    fn should_refresh(&self, resource_type: &str, name: &str) -> Result<bool> {
        self.session.should_refresh(resource_type, name)
    }

    fn is_resource_failed(&self, resource_type: &str, name: &str) -> Result<bool> {
        self.session.is_resource_failed(resource_type, name)
    }

    fn template_environment(&self) -> TemplateEnvironment {
        self.env.clone()
    }

    fn expression_evaluator(&self) -> &dyn ExpressionEvaluator {
        &Conditions
    }

    fn template_resolver(&self) -> &dyn TemplateResolver {
        &Placeholders
    }

    fn health_checker(&self) -> &dyn HealthCheckExecutor {
        &NagiosChecker
    }
}
