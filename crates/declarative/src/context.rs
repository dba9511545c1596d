//! Collaborator traits and the apply context
//!
//! These traits let the engine run without depending on a concrete session
//! store, process runner, expression language or template engine.

use crate::event::HealthCheckResult;
use crate::types::{CommandOptions, CommandOutput, HealthCheck, TemplateEnvironment};
use anyhow::Result;
use log::Level;
use std::fmt;
use std::sync::Arc;

/// Runs external commands on behalf of providers
///
/// Implement this trait to control how processes are spawned. The engine
/// never retries; timeouts are honored by the implementation.
pub trait CommandRunner: Send + Sync {
    /// Run a command with full options
    fn execute_with_options(&self, options: &CommandOptions) -> Result<CommandOutput>;

    /// Run a command with arguments and default options
    fn execute(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        self.execute_with_options(&CommandOptions::new(cmd).args(args.iter().copied()))
    }

    /// Run a command and return just success/failure
    fn run_status(&self, cmd: &str, args: &[&str]) -> Result<bool> {
        Ok(self.execute(cmd, args)?.success())
    }

    /// Run a command and capture stdout, failing on a non-zero exit
    fn run_capture(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = self.execute(cmd, args)?;
        if !output.success() {
            anyhow::bail!(
                "{} {} failed: {}",
                cmd,
                args.join(" "),
                output.stderr_str().trim()
            );
        }
        Ok(output.stdout_str())
    }
}

/// Evaluates boolean control expressions against the fact/data environment
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, env: &TemplateEnvironment) -> Result<bool>;
}

/// Resolves placeholders in string properties
pub trait TemplateResolver: Send + Sync {
    fn resolve(&self, input: &str, env: &TemplateEnvironment) -> Result<String>;
}

/// Executes health checks bound to a resource
pub trait HealthCheckExecutor: Send + Sync {
    fn execute(
        &self,
        resource_type: &str,
        resource_name: &str,
        check: &HealthCheck,
        runner: &dyn CommandRunner,
    ) -> Result<HealthCheckResult>;
}

/// The agent the engine runs inside
///
/// Supplies noop mode, command runners, logging, session tracking and the
/// read-only template environment.
pub trait Manager: Send + Sync {
    /// Whether mutations should be reported instead of performed
    fn noop_mode(&self) -> bool;

    /// A command runner for a newly constructed provider
    fn new_runner(&self) -> Arc<dyn CommandRunner>;

    /// A logger scoped to one resource
    fn logger(&self, resource_type: &str, name: &str) -> Logger {
        Logger::new(format!("{resource_type}#{name}"))
    }

    /// Whether the referenced resource changed during this session
    fn should_refresh(&self, resource_type: &str, name: &str) -> Result<bool>;

    /// Whether the referenced resource failed during this session
    fn is_resource_failed(&self, resource_type: &str, name: &str) -> Result<bool>;

    /// Facts and data visible to expressions and templates
    fn template_environment(&self) -> TemplateEnvironment;

    fn expression_evaluator(&self) -> &dyn ExpressionEvaluator;

    fn template_resolver(&self) -> &dyn TemplateResolver;

    fn health_checker(&self) -> &dyn HealthCheckExecutor;
}

/// Logger handle scoped to a resource
///
/// Messages go through the `log` facade prefixed with the scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logger {
    scope: String,
}

impl Logger {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn log(&self, level: Level, message: impl fmt::Display) {
        log::log!(target: "declarative", level, "{}: {}", self.scope, message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::Error, message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::Warn, message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::Info, message);
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::Debug, message);
    }
}

/// Context passed to type-specific reconciliation
pub struct ApplyContext<'a> {
    /// Whether mutations should be reported instead of performed
    pub noop: bool,
    pub logger: &'a Logger,
    pub manager: &'a dyn Manager,
}

impl<'a> ApplyContext<'a> {
    pub fn new(noop: bool, logger: &'a Logger, manager: &'a dyn Manager) -> Self {
        Self {
            noop,
            logger,
            manager,
        }
    }
}
