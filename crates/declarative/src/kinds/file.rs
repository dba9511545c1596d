//! File resources
//!
//! Manages a regular file (`present`) or a directory (`directory`) with an
//! owner, group and permission mode, or makes sure nothing exists at the
//! path (`absent`). Content is compared by sha256.

use super::{Properties, resolve_common, resolve_field, resolve_optional};
use crate::context::{ApplyContext, TemplateResolver};
use crate::error::{Error, Result};
use crate::provider::{Provider, ProviderInstance};
use crate::resource::ResourceKind;
use crate::state::{
    ENSURE_ABSENT, ENSURE_PRESENT, FileKind, FileMetadata, ResourceState, identity_matches,
};
use crate::types::{CommonProperties, TemplateEnvironment};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

pub const TYPE_NAME: &str = "file";

pub const ENSURE_DIRECTORY: &str = "directory";

/// Operations a file provider must support
pub trait FileProvider: Provider {
    fn status(&self, properties: &FileProperties) -> anyhow::Result<ResourceState<FileMetadata>>;

    /// Create or update the file or directory with content, ownership and mode
    fn store(&self, properties: &FileProperties) -> anyhow::Result<()>;

    fn remove(&self, properties: &FileProperties) -> anyhow::Result<()>;
}

/// Lowercase hex sha256 of some bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Parse an octal permission string such as "0644" or "755"
pub fn parse_mode(mode: &str) -> Result<u32> {
    let digits = mode.trim();
    if digits.is_empty() || digits.len() > 4 {
        return Err(Error::invalid(format!("invalid file mode '{mode}'")));
    }
    u32::from_str_radix(digits, 8)
        .map_err(|_| Error::invalid(format!("invalid file mode '{mode}'")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProperties {
    /// `name` is the absolute path
    #[serde(flatten)]
    pub common: CommonProperties,
    /// Content for regular files; left alone when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub group: String,
    /// Octal permission bits, e.g. "0644"
    #[serde(default)]
    pub mode: String,
}

impl FileProperties {
    pub fn new(
        path: impl Into<String>,
        ensure: impl Into<String>,
        owner: impl Into<String>,
        group: impl Into<String>,
        mode: impl Into<String>,
    ) -> Self {
        Self {
            common: CommonProperties::new(path, ensure),
            content: None,
            owner: owner.into(),
            group: group.into(),
            mode: mode.into(),
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    fn wanted_kind(&self) -> FileKind {
        match self.common.ensure.as_str() {
            ENSURE_DIRECTORY => FileKind::Directory,
            ENSURE_ABSENT => FileKind::Missing,
            _ => FileKind::File,
        }
    }

    fn mode_matches(&self, observed: Option<&str>) -> bool {
        match (parse_mode(&self.mode), observed.map(parse_mode)) {
            (Ok(want), Some(Ok(have))) => want == have,
            _ => false,
        }
    }

    pub fn is_desired_state(&self, state: &ResourceState<FileMetadata>) -> bool {
        let m = &state.metadata;
        let wanted = self.wanted_kind();
        if wanted == FileKind::Missing || m.kind != wanted {
            return m.kind == wanted;
        }

        let content_ok = match (&self.content, wanted) {
            (Some(content), FileKind::File) => {
                m.checksum.as_deref() == Some(sha256_hex(content.as_bytes()).as_str())
            }
            _ => true,
        };

        content_ok
            && identity_matches(&self.owner, m.owner.as_deref(), m.uid)
            && identity_matches(&self.group, m.group.as_deref(), m.gid)
            && self.mode_matches(m.mode.as_deref())
    }
}

impl From<FileProperties> for super::ResourceProperties {
    fn from(value: FileProperties) -> Self {
        Self::File(value)
    }
}

impl Properties for FileProperties {
    fn validate(&self) -> Result<()> {
        self.common.validate(true)?;

        if !Path::new(&self.common.name).is_absolute() {
            return Err(Error::invalid("file name must be an absolute path"));
        }

        match self.common.ensure.as_str() {
            ENSURE_ABSENT => return Ok(()),
            ENSURE_PRESENT | ENSURE_DIRECTORY => {}
            other => {
                return Err(Error::invalid(format!(
                    "file ensure must be {ENSURE_PRESENT}, {ENSURE_DIRECTORY} or {ENSURE_ABSENT}, got {other}"
                )));
            }
        }

        if self.owner.trim().is_empty() || self.group.trim().is_empty() {
            return Err(Error::invalid("file owner and group are required"));
        }
        parse_mode(&self.mode)?;
        if self.common.ensure == ENSURE_DIRECTORY && self.content.is_some() {
            return Err(Error::invalid("directories cannot have content"));
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
        resolve_optional(resolver, env, "content", &mut self.content)?;
        resolve_field(resolver, env, "owner", &mut self.owner)?;
        resolve_field(resolver, env, "group", &mut self.group)?;
        resolve_field(resolver, env, "mode", &mut self.mode)
    }
}

impl ResourceKind for FileProperties {
    const TYPE_NAME: &'static str = TYPE_NAME;
    type Provider = dyn FileProvider;
    type Metadata = FileMetadata;

    fn provider(instance: &ProviderInstance) -> Result<&Self::Provider> {
        match instance {
            ProviderInstance::File(p) => Ok(p.as_ref()),
            other => Err(Error::ProviderMismatch {
                expected: TYPE_NAME,
                provider: other.name().to_string(),
            }),
        }
    }

    fn status(&self, provider: &Self::Provider) -> Result<ResourceState<FileMetadata>> {
        Ok(provider.status(self)?)
    }

    fn apply_resource(
        &self,
        ctx: &ApplyContext<'_>,
        provider: &Self::Provider,
    ) -> Result<ResourceState<FileMetadata>> {
        let initial = provider.status(self)?;
        if self.is_desired_state(&initial) {
            return Ok(initial.mark_stable());
        }

        let removing = self.wanted_kind() == FileKind::Missing;
        if ctx.noop {
            let message = if removing {
                "Would have removed"
            } else if initial.metadata.kind == FileKind::Missing {
                "Would have created"
            } else {
                "Would have updated"
            };
            ctx.logger.info(message);
            return Ok(initial.mark_noop(&[message.to_string()]));
        }

        if removing {
            ctx.logger.info("Removing");
            provider.remove(self)?;
        } else {
            ctx.logger.info(format_args!(
                "Storing {} (currently {:?})",
                self.common.ensure, initial.metadata.kind
            ));
            provider.store(self)?;
        }

        let mut current = provider.status(self)?;
        if !self.is_desired_state(&current) {
            return Err(Error::DesiredStateFailed(format!(
                "{} is {:?} after reconciliation",
                self.common.name, current.metadata.kind
            )));
        }

        current.changed = true;
        Ok(current)
    }
}
