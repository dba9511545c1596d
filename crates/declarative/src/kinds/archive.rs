//! Archive resources
//!
//! An archive is a file fetched from a URL into the resource's path, owned
//! by a given user and group, optionally extracted under `extract_parent`
//! and optionally removed again once extracted.

use super::{Properties, resolve_common, resolve_field, resolve_optional};
use crate::context::{ApplyContext, TemplateResolver};
use crate::error::{Error, Result};
use crate::provider::{Provider, ProviderInstance};
use crate::resource::ResourceKind;
use crate::state::{
    ArchiveMetadata, ENSURE_ABSENT, ENSURE_PRESENT, ResourceState, identity_matches,
};
use crate::types::{CommonProperties, TemplateEnvironment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const TYPE_NAME: &str = "archive";

/// File extensions an archive resource can manage
pub const SUPPORTED_EXTENSIONS: [&str; 3] = [".tar.gz", ".tgz", ".zip"];

/// Operations an archive provider must support
pub trait ArchiveProvider: Provider {
    /// Probe the archive file and the `creates` marker
    fn status(&self, properties: &ArchiveProperties)
    -> anyhow::Result<ResourceState<ArchiveMetadata>>;

    /// Fetch the archive into place with the requested ownership
    ///
    /// When a checksum is set it must be verified before the file replaces
    /// anything at the destination.
    fn download(&self, properties: &ArchiveProperties) -> anyhow::Result<()>;

    /// Unpack the archive into `extract_parent`
    fn extract(&self, properties: &ArchiveProperties) -> anyhow::Result<()>;

    /// Set the archive file's owner and group
    fn set_ownership(&self, properties: &ArchiveProperties) -> anyhow::Result<()>;

    /// Delete the archive file
    fn remove(&self, properties: &ArchiveProperties) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveProperties {
    /// `name` is the absolute destination path of the archive file
    #[serde(flatten)]
    pub common: CommonProperties,
    pub url: String,
    /// Expected sha256 of the archive, lowercase hex
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Extra HTTP request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub owner: String,
    pub group: String,
    /// Directory to extract into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_parent: Option<String>,
    /// Path that exists once extraction happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creates: Option<String>,
    /// Remove the archive file after extraction
    #[serde(default)]
    pub cleanup: bool,
}

impl ArchiveProperties {
    pub fn new(
        path: impl Into<String>,
        url: impl Into<String>,
        owner: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            common: CommonProperties::new(path, ENSURE_PRESENT),
            url: url.into(),
            checksum: None,
            headers: BTreeMap::new(),
            username: None,
            password: None,
            owner: owner.into(),
            group: group.into(),
            extract_parent: None,
            creates: None,
            cleanup: false,
        }
    }

    /// The requested ensure, `present` when unset
    pub fn ensure(&self) -> &str {
        if self.common.ensure.is_empty() {
            ENSURE_PRESENT
        } else {
            &self.common.ensure
        }
    }

    fn checksum_matches(&self, metadata: &ArchiveMetadata) -> bool {
        self.checksum
            .as_deref()
            .is_none_or(|want| metadata.checksum.as_deref() == Some(want))
    }

    fn ownership_matches(&self, metadata: &ArchiveMetadata) -> bool {
        identity_matches(&self.owner, metadata.owner.as_deref(), metadata.uid)
            && identity_matches(&self.group, metadata.group.as_deref(), metadata.gid)
    }

    pub fn is_desired_state(&self, state: &ResourceState<ArchiveMetadata>) -> bool {
        let m = &state.metadata;
        if self.ensure() == ENSURE_ABSENT {
            return !m.exists;
        }

        if self.creates.is_some() && !m.creates_exists {
            return false;
        }

        if self.cleanup {
            // the archive is only kept around until it has been extracted
            if self.creates.is_none() && m.exists {
                return false;
            }
        } else if !m.exists {
            return false;
        }

        !m.exists || (self.ownership_matches(m) && self.checksum_matches(m))
    }

    fn plan(&self, initial: &ResourceState<ArchiveMetadata>) -> Vec<Step> {
        if self.ensure() == ENSURE_ABSENT {
            return vec![Step::Remove];
        }

        let m = &initial.metadata;
        let mut steps = Vec::new();

        let download = !(m.exists && self.checksum_matches(m));
        if download {
            steps.push(Step::Download);
        } else if !self.cleanup && !self.ownership_matches(m) {
            steps.push(Step::Chown);
        }
        if self.extract_parent.is_some() && (download || !m.creates_exists) {
            steps.push(Step::Extract);
        }
        if self.cleanup && (m.exists || download) {
            steps.push(Step::Remove);
        }
        steps
    }
}

impl From<ArchiveProperties> for super::ResourceProperties {
    fn from(value: ArchiveProperties) -> Self {
        Self::Archive(value)
    }
}

fn has_supported_extension(path: &str) -> bool {
    SUPPORTED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

impl Properties for ArchiveProperties {
    fn validate(&self) -> Result<()> {
        self.common.validate(false)?;

        match self.ensure() {
            ENSURE_PRESENT | ENSURE_ABSENT => {}
            other => {
                return Err(Error::invalid(format!(
                    "archive ensure must be {ENSURE_PRESENT} or {ENSURE_ABSENT}, got {other}"
                )));
            }
        }

        if !Path::new(&self.common.name).is_absolute() {
            return Err(Error::invalid("archive name must be an absolute path"));
        }
        if !has_supported_extension(&self.common.name) {
            return Err(Error::invalid(format!(
                "archive name must end in one of {}",
                SUPPORTED_EXTENSIONS.join(", ")
            )));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::invalid("archive url must be http or https"));
        }
        if self.owner.trim().is_empty() || self.group.trim().is_empty() {
            return Err(Error::invalid("archive owner and group are required"));
        }
        if let Some(checksum) = &self.checksum
            && (checksum.len() != 64 || !checksum.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(Error::invalid("archive checksum must be a sha256 hex digest"));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(Error::invalid(
                "archive username and password must be set together",
            ));
        }
        if let Some(parent) = &self.extract_parent
            && !Path::new(parent).is_absolute()
        {
            return Err(Error::invalid("archive extract_parent must be an absolute path"));
        }
        if self.cleanup && self.extract_parent.is_none() {
            return Err(Error::invalid("archive cleanup requires extract_parent"));
        }
        if self.creates.is_some() && self.extract_parent.is_none() {
            return Err(Error::invalid("archive creates requires extract_parent"));
        }
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
        resolve_field(resolver, env, "url", &mut self.url)?;
        resolve_field(resolver, env, "owner", &mut self.owner)?;
        resolve_field(resolver, env, "group", &mut self.group)?;
        resolve_optional(resolver, env, "checksum", &mut self.checksum)?;
        resolve_optional(resolver, env, "username", &mut self.username)?;
        resolve_optional(resolver, env, "password", &mut self.password)?;
        resolve_optional(resolver, env, "extract_parent", &mut self.extract_parent)?;
        resolve_optional(resolver, env, "creates", &mut self.creates)?;
        for value in self.headers.values_mut() {
            resolve_field(resolver, env, "headers", value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Download,
    Chown,
    Extract,
    Remove,
}

impl Step {
    fn perform(
        self,
        provider: &dyn ArchiveProvider,
        properties: &ArchiveProperties,
    ) -> anyhow::Result<()> {
        match self {
            Self::Download => provider.download(properties),
            Self::Chown => provider.set_ownership(properties),
            Self::Extract => provider.extract(properties),
            Self::Remove => provider.remove(properties),
        }
    }

    fn noop_message(self) -> &'static str {
        match self {
            Self::Download => "Would have downloaded",
            Self::Chown => "Would have changed ownership",
            Self::Extract => "Would have extracted",
            Self::Remove => "Would have removed",
        }
    }
}

impl ResourceKind for ArchiveProperties {
    const TYPE_NAME: &'static str = TYPE_NAME;
    type Provider = dyn ArchiveProvider;
    type Metadata = ArchiveMetadata;

    fn provider(instance: &ProviderInstance) -> Result<&Self::Provider> {
        match instance {
            ProviderInstance::Archive(p) => Ok(p.as_ref()),
            other => Err(Error::ProviderMismatch {
                expected: TYPE_NAME,
                provider: other.name().to_string(),
            }),
        }
    }

    fn status(&self, provider: &Self::Provider) -> Result<ResourceState<ArchiveMetadata>> {
        Ok(provider.status(self)?)
    }

    fn apply_resource(
        &self,
        ctx: &ApplyContext<'_>,
        provider: &Self::Provider,
    ) -> Result<ResourceState<ArchiveMetadata>> {
        let initial = provider.status(self)?;
        if self.is_desired_state(&initial) {
            return Ok(initial.mark_stable());
        }

        let steps = self.plan(&initial);

        if ctx.noop {
            let messages: Vec<String> = steps
                .iter()
                .map(|s| s.noop_message().to_string())
                .collect();
            let state = initial.mark_noop(&messages);
            if let Some(message) = &state.noop_message {
                ctx.logger.info(message);
            }
            return Ok(state);
        }

        for step in &steps {
            ctx.logger.info(format_args!("{step:?} {}", self.common.name));
            step.perform(provider, self)?;
        }

        let mut current = provider.status(self)?;
        if !self.is_desired_state(&current) {
            return Err(Error::DesiredStateFailed(format!(
                "archive {} did not converge",
                self.common.name
            )));
        }

        current.changed = !steps.is_empty();
        Ok(current)
    }
}
