//! Resource kinds
//!
//! Each kind pairs a typed properties struct with a provider trait and the
//! reconciliation algorithm that drives it. [`ResourceProperties`] is the
//! closed set of kinds the engine knows about.

pub mod archive;
pub mod exec;
pub mod file;
pub mod package;
pub mod service;

use crate::context::TemplateResolver;
use crate::error::{Error, Result};
use crate::types::{CommonProperties, TemplateEnvironment};
use serde::{Deserialize, Serialize};

pub use archive::ArchiveProperties;
pub use exec::ExecProperties;
pub use file::FileProperties;
pub use package::PackageProperties;
pub use service::ServiceProperties;

/// Capabilities every typed properties struct provides
pub trait Properties {
    /// Check the properties are complete and consistent
    fn validate(&self) -> Result<()>;

    /// The properties shared by all kinds
    fn common(&self) -> &CommonProperties;

    /// Replace placeholders in string properties
    fn resolve_templates(
        &mut self,
        resolver: &dyn TemplateResolver,
        env: &TemplateEnvironment,
    ) -> Result<()>;
}

/// Properties of any known resource kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResourceProperties {
    Package(PackageProperties),
    Service(ServiceProperties),
    Exec(ExecProperties),
    Archive(ArchiveProperties),
    File(FileProperties),
}

impl ResourceProperties {
    /// Type name of the kind, e.g. "package"
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Package(_) => package::TYPE_NAME,
            Self::Service(_) => service::TYPE_NAME,
            Self::Exec(_) => exec::TYPE_NAME,
            Self::Archive(_) => archive::TYPE_NAME,
            Self::File(_) => file::TYPE_NAME,
        }
    }

    fn inner(&self) -> &dyn Properties {
        match self {
            Self::Package(p) => p,
            Self::Service(p) => p,
            Self::Exec(p) => p,
            Self::Archive(p) => p,
            Self::File(p) => p,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Properties {
        match self {
            Self::Package(p) => p,
            Self::Service(p) => p,
            Self::Exec(p) => p,
            Self::Archive(p) => p,
            Self::File(p) => p,
        }
    }
}

impl Properties for ResourceProperties {
    fn validate(&self) -> Result<()> {
        self.inner().validate()
    }

    fn common(&self) -> &CommonProperties {
        self.inner().common()
    }

    fn resolve_templates(
        &mut self,
        resolver: &dyn TemplateResolver,
        env: &TemplateEnvironment,
    ) -> Result<()> {
        self.inner_mut().resolve_templates(resolver, env)
    }
}

/// Resolve a single string property in place
pub(crate) fn resolve_field(
    resolver: &dyn TemplateResolver,
    env: &TemplateEnvironment,
    property: &'static str,
    value: &mut String,
) -> Result<()> {
    if value.contains("{{") {
        *value = resolver
            .resolve(value, env)
            .map_err(|source| Error::Template { property, source })?;
    }
    Ok(())
}

/// Resolve an optional string property in place
pub(crate) fn resolve_optional(
    resolver: &dyn TemplateResolver,
    env: &TemplateEnvironment,
    property: &'static str,
    value: &mut Option<String>,
) -> Result<()> {
    match value {
        Some(v) => resolve_field(resolver, env, property, v),
        None => Ok(()),
    }
}

/// Resolve the templated fields of the shared properties
pub(crate) fn resolve_common(
    resolver: &dyn TemplateResolver,
    env: &TemplateEnvironment,
    common: &mut CommonProperties,
) -> Result<()> {
    resolve_field(resolver, env, "name", &mut common.name)?;
    resolve_field(resolver, env, "ensure", &mut common.ensure)?;
    resolve_optional(resolver, env, "alias", &mut common.alias)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PlainResolver;
    use serde_json::json;

    #[test]
    fn test_deserialize_tagged_properties() {
        let props: ResourceProperties = serde_json::from_value(json!({
            "type": "package",
            "name": "zsh",
            "ensure": "2.0.0",
            "require": ["package#base"],
        }))
        .unwrap();

        assert_eq!(props.type_name(), "package");
        assert_eq!(props.common().name, "zsh");
        assert_eq!(props.common().require[0].to_string(), "package#base");
        assert!(props.validate().is_ok());
    }

    #[test]
    fn test_resolve_templates_uses_resolver() {
        let mut props =
            ResourceProperties::Package(PackageProperties::new("{{ data.pkg }}", "present"));
        let env = TemplateEnvironment::new(json!({}), json!({"pkg": "zsh"}));
        props.resolve_templates(&PlainResolver, &env).unwrap();
        assert_eq!(props.common().name, "zsh");
    }

    #[test]
    fn test_resolve_templates_reports_property() {
        let mut props =
            ResourceProperties::Package(PackageProperties::new("{{ data.missing }}", "present"));
        let err = props
            .resolve_templates(&PlainResolver, &TemplateEnvironment::default())
            .unwrap_err();
        assert!(matches!(err, Error::Template { property: "name", .. }));
    }
}
