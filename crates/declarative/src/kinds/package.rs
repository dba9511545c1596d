//! Package resources
//!
//! Ensure vocabulary:
//! - `present`: any installed version is acceptable
//! - `absent`: not installed
//! - `latest`: installed; the package manager is trusted to have picked the
//!   newest version, it is not re-verified
//! - anything else is an exact version, compared with the provider's
//!   native version ordering

use super::{Properties, resolve_common};
use crate::context::{ApplyContext, TemplateResolver};
use crate::error::{Error, Result};
use crate::provider::{Provider, ProviderInstance};
use crate::resource::ResourceKind;
use crate::state::{ENSURE_ABSENT, ENSURE_PRESENT, PackageMetadata, ResourceState};
use crate::types::{CommonProperties, TemplateEnvironment};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub const TYPE_NAME: &str = "package";

/// Ensure value requesting the newest available version
pub const ENSURE_LATEST: &str = "latest";

/// Operations a package manager must support
pub trait PackageProvider: Provider {
    /// Probe the installed state; `ensure` is the installed version or "absent"
    fn status(&self, name: &str) -> anyhow::Result<ResourceState<PackageMetadata>>;

    /// Install a package; `version` may be "present" or "latest" for no pin
    fn install(&self, name: &str, version: &str) -> anyhow::Result<()>;

    /// Upgrade a package; `version` may be "latest"
    fn upgrade(&self, name: &str, version: &str) -> anyhow::Result<()>;

    fn downgrade(&self, name: &str, version: &str) -> anyhow::Result<()>;

    fn uninstall(&self, name: &str) -> anyhow::Result<()>;

    /// Three-way comparison in the platform's native version ordering
    fn version_cmp(&self, a: &str, b: &str) -> anyhow::Result<Ordering>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageProperties {
    #[serde(flatten)]
    pub common: CommonProperties,
}

impl PackageProperties {
    pub fn new(name: impl Into<String>, ensure: impl Into<String>) -> Self {
        Self {
            common: CommonProperties::new(name, ensure),
        }
    }

    /// Whether an observed state satisfies the requested ensure
    pub fn is_desired_state(
        &self,
        provider: &dyn PackageProvider,
        state: &ResourceState<PackageMetadata>,
    ) -> Result<bool> {
        Ok(match self.common.ensure.as_str() {
            ENSURE_PRESENT | ENSURE_LATEST => !state.is_absent(),
            ENSURE_ABSENT => state.is_absent(),
            version => {
                !state.is_absent()
                    && provider.version_cmp(&state.ensure, version)? == Ordering::Equal
            }
        })
    }

    fn plan<'a>(
        &'a self,
        provider: &dyn PackageProvider,
        initial: &ResourceState<PackageMetadata>,
    ) -> Result<Option<Transition<'a>>> {
        let ensure = self.common.ensure.as_str();
        let transition = match ensure {
            ENSURE_LATEST if initial.is_absent() => Transition::Install(ENSURE_LATEST),
            ENSURE_LATEST => Transition::Upgrade(ENSURE_LATEST),
            ENSURE_ABSENT if initial.is_absent() => return Ok(None),
            ENSURE_ABSENT => Transition::Uninstall,
            _ if initial.is_absent() => Transition::Install(ensure),
            ENSURE_PRESENT => return Ok(None),
            version => match provider.version_cmp(&initial.ensure, version)? {
                Ordering::Less => Transition::Upgrade(version),
                Ordering::Greater => Transition::Downgrade(version),
                Ordering::Equal => return Ok(None),
            },
        };
        Ok(Some(transition))
    }
}

impl From<PackageProperties> for super::ResourceProperties {
    fn from(value: PackageProperties) -> Self {
        Self::Package(value)
    }
}

impl Properties for PackageProperties {
    fn validate(&self) -> Result<()> {
        self.common.validate(true)
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition<'a> {
    Install(&'a str),
    Upgrade(&'a str),
    Downgrade(&'a str),
    Uninstall,
}

impl Transition<'_> {
    fn perform(self, provider: &dyn PackageProvider, name: &str) -> anyhow::Result<()> {
        match self {
            Self::Install(version) => provider.install(name, version),
            Self::Upgrade(version) => provider.upgrade(name, version),
            Self::Downgrade(version) => provider.downgrade(name, version),
            Self::Uninstall => provider.uninstall(name),
        }
    }

    fn noop_message(self) -> String {
        match self {
            Self::Install(ENSURE_PRESENT) => "Would have installed".to_string(),
            Self::Install(version) => format!("Would have installed {version}"),
            Self::Upgrade(version) => format!("Would have upgraded to {version}"),
            Self::Downgrade(version) => format!("Would have downgraded to {version}"),
            Self::Uninstall => "Would have uninstalled".to_string(),
        }
    }
}

impl fmt::Display for Transition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install(version) => write!(f, "install {version}"),
            Self::Upgrade(version) => write!(f, "upgrade to {version}"),
            Self::Downgrade(version) => write!(f, "downgrade to {version}"),
            Self::Uninstall => write!(f, "uninstall"),
        }
    }
}

impl ResourceKind for PackageProperties {
    const TYPE_NAME: &'static str = TYPE_NAME;
    type Provider = dyn PackageProvider;
    type Metadata = PackageMetadata;

    fn provider(instance: &ProviderInstance) -> Result<&Self::Provider> {
        match instance {
            ProviderInstance::Package(p) => Ok(p.as_ref()),
            other => Err(Error::ProviderMismatch {
                expected: TYPE_NAME,
                provider: other.name().to_string(),
            }),
        }
    }

    fn status(&self, provider: &Self::Provider) -> Result<ResourceState<PackageMetadata>> {
        Ok(provider.status(&self.common.name)?)
    }

    fn apply_resource(
        &self,
        ctx: &ApplyContext<'_>,
        provider: &Self::Provider,
    ) -> Result<ResourceState<PackageMetadata>> {
        let name = &self.common.name;
        let initial = provider.status(name)?;

        if self.is_desired_state(provider, &initial)? {
            return Ok(initial.mark_stable());
        }

        let Some(transition) = self.plan(provider, &initial)? else {
            return Ok(initial.mark_stable());
        };

        if ctx.noop {
            let message = transition.noop_message();
            ctx.logger.info(&message);
            return Ok(initial.mark_noop(&[message]));
        }

        ctx.logger
            .info(format_args!("{} (currently {})", transition, initial.ensure));
        transition.perform(provider, name)?;

        let mut current = provider.status(name)?;
        if !self.is_desired_state(provider, &current)? {
            return Err(Error::DesiredStateFailed(format!(
                "{name} is {} after {transition}",
                current.ensure
            )));
        }

        current.changed = true;
        Ok(current)
    }
}
