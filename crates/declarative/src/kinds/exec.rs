//! Exec resources
//!
//! An exec runs a command until it is satisfied. It is satisfied when its
//! `creates` path exists, when it is `refresh_only` and was not triggered,
//! or when its last exit code is one of `returns`. A subscribe refresh
//! always forces execution.

use super::{Properties, resolve_common, resolve_field, resolve_optional};
use crate::context::{ApplyContext, Logger, TemplateResolver};
use crate::error::{Error, Result};
use crate::provider::{Provider, ProviderInstance};
use crate::refresh;
use crate::resource::ResourceKind;
use crate::state::{ENSURE_PRESENT, ExecMetadata, ResourceState};
use crate::types::{CommonProperties, TemplateEnvironment, parse_duration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const TYPE_NAME: &str = "exec";

/// Operations an exec provider must support
pub trait ExecProvider: Provider {
    /// Probe the command's surroundings; never runs the command
    fn status(&self, properties: &ExecProperties) -> anyhow::Result<ResourceState<ExecMetadata>>;

    /// Run the command and return its exit code
    ///
    /// A non-zero exit is not an error here; only failing to run the
    /// command at all is.
    fn execute(&self, properties: &ExecProperties, logger: &Logger) -> anyhow::Result<i32>;
}

fn default_returns() -> Vec<i32> {
    vec![0]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
    /// Command line to run, defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Search path for the executable, replacing `PATH`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Exit codes that count as success
    #[serde(default = "default_returns")]
    pub returns: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Path whose existence means the command already ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creates: Option<String>,
    /// Only run when a subscribed resource changed
    #[serde(default)]
    pub refresh_only: bool,
    /// Log the command's output at info level
    #[serde(default)]
    pub log_output: bool,
}

impl ExecProperties {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            common: CommonProperties::new(command, ENSURE_PRESENT),
            command: None,
            cwd: None,
            environment: BTreeMap::new(),
            path: None,
            returns: default_returns(),
            timeout: None,
            creates: None,
            refresh_only: false,
            log_output: false,
        }
    }

    /// The command line to run
    pub fn command_line(&self) -> &str {
        self.command.as_deref().unwrap_or(&self.common.name)
    }

    /// Parsed timeout, if any
    pub fn timeout_duration(&self) -> Result<Option<Duration>> {
        self.timeout.as_deref().map(parse_duration).transpose()
    }

    pub fn is_desired_state(&self, state: &ResourceState<ExecMetadata>) -> bool {
        if self.creates.is_some() && state.metadata.creates_satisfied {
            return true;
        }
        match state.metadata.exit_code {
            None => self.refresh_only,
            Some(code) => self.returns.contains(&code),
        }
    }
}

impl From<ExecProperties> for super::ResourceProperties {
    fn from(value: ExecProperties) -> Self {
        Self::Exec(value)
    }
}

impl Properties for ExecProperties {
    fn validate(&self) -> Result<()> {
        self.common.validate(false)?;
        if self.command_line().trim().is_empty() {
            return Err(Error::invalid("exec command cannot be empty"));
        }
        if self.returns.is_empty() {
            return Err(Error::invalid("exec returns must list at least one exit code"));
        }
        if let Some(key) = self
            .environment
            .keys()
            .find(|k| k.is_empty() || k.contains('='))
        {
            return Err(Error::invalid(format!(
                "invalid environment variable name '{key}'"
            )));
        }
        self.timeout_duration()?;
        Ok(())
    }

    fn common(&self) -> &CommonProperties {
        &self.common
    }

    fn resolve_templates(
        &mut self,
        resolver: &dyn TemplateResolver,
        env: &TemplateEnvironment,
    ) -> Result<()> {
        resolve_common(resolver, env, &mut self.common)?;
        if self.common.ensure.is_empty() {
            self.common.ensure = ENSURE_PRESENT.to_string();
        }
        resolve_optional(resolver, env, "command", &mut self.command)?;
        resolve_optional(resolver, env, "cwd", &mut self.cwd)?;
        resolve_optional(resolver, env, "path", &mut self.path)?;
        resolve_optional(resolver, env, "creates", &mut self.creates)?;
        for value in self.environment.values_mut() {
            resolve_field(resolver, env, "environment", value)?;
        }
        Ok(())
    }
}

impl ResourceKind for ExecProperties {
    const TYPE_NAME: &'static str = TYPE_NAME;
    type Provider = dyn ExecProvider;
    type Metadata = ExecMetadata;

    fn provider(instance: &ProviderInstance) -> Result<&Self::Provider> {
        match instance {
            ProviderInstance::Exec(p) => Ok(p.as_ref()),
            other => Err(Error::ProviderMismatch {
                expected: TYPE_NAME,
                provider: other.name().to_string(),
            }),
        }
    }

    fn status(&self, provider: &Self::Provider) -> Result<ResourceState<ExecMetadata>> {
        Ok(provider.status(self)?)
    }

    fn apply_resource(
        &self,
        ctx: &ApplyContext<'_>,
        provider: &Self::Provider,
    ) -> Result<ResourceState<ExecMetadata>> {
        let initial = provider.status(self)?;
        let refresh = refresh::triggered_by(ctx, &self.common.subscribe)?;

        if refresh.is_none() && self.is_desired_state(&initial) {
            return Ok(initial.mark_stable());
        }

        if ctx.noop {
            let message = match &refresh {
                Some(source) => format!("Would have executed via {source}"),
                None => "Would have executed".to_string(),
            };
            ctx.logger.info(&message);
            let mut state = initial.mark_noop(&[message]);
            state.refreshed = refresh.is_some();
            return Ok(state);
        }

        let code = provider.execute(self, ctx.logger)?;

        let mut current = provider.status(self)?;
        current.metadata.exit_code = Some(code);
        if !self.is_desired_state(&current) {
            return Err(Error::DesiredStateFailed(format!(
                "{} exited with code {code}",
                self.command_line()
            )));
        }

        current.changed = true;
        current.refreshed = refresh.is_some();
        Ok(current)
    }
}
