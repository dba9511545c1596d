//! Manifest loading
//!
//! A manifest is a TOML document with an optional `[data]` table and an
//! ordered `[[resources]]` array, each entry tagged by `type`:
//!
//! ```toml
//! [data]
//! nginx_version = "1.24.0"
//!
//! [[resources]]
//! type = "package"
//! name = "nginx"
//! ensure = "{{ data.nginx_version }}"
//!
//! [[resources]]
//! type = "service"
//! name = "nginx"
//! ensure = "running"
//! require = ["package#nginx"]
//! ```

use anyhow::{Context, Result, bail};
use declarative::{BoxedResource, Manager, Registry};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Raw resource tables, in application order
    #[serde(default)]
    pub resources: Vec<Value>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Manifest data layered over `base`; manifest keys win
    pub fn merged_data(&self, base: Value) -> Value {
        let mut merged = match base {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in &self.data {
            merged.insert(key.clone(), value.clone());
        }
        Value::Object(merged)
    }

    /// Build every resource in manifest order
    ///
    /// Fails on the first invalid resource or on a repeated `type#name`.
    pub fn resources(
        &self,
        manager: &Arc<dyn Manager>,
        registry: &Arc<Registry>,
    ) -> Result<Vec<BoxedResource>> {
        let mut seen = HashSet::new();
        let mut resources = Vec::with_capacity(self.resources.len());

        for (index, value) in self.resources.iter().enumerate() {
            let resource =
                declarative::resource_from_value(manager.clone(), registry.clone(), value.clone())
                    .with_context(|| format!("resources[{index}] ({})", describe(value)))?;

            if !seen.insert(resource.reference()) {
                bail!("resources[{index}]: duplicate resource {}", resource.reference());
            }
            resources.push(resource);
        }
        Ok(resources)
    }
}

fn describe(value: &Value) -> String {
    let field = |key: &str| value.get(key).and_then(Value::as_str).unwrap_or("?");
    format!("{}#{}", field("type"), field("name"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::testing::{MockManager, MockPackage, StaticFactory};
    use serde_json::json;

    const MANIFEST: &str = r#"
[data]
version = "2.0.0"

[[resources]]
type = "package"
name = "zsh"
ensure = "{{ data.version }}"

[[resources]]
type = "package"
name = "git"
ensure = "present"
require = ["package#zsh"]
"#;

    fn setup() -> (Arc<dyn Manager>, Arc<Registry>) {
        let registry = Registry::new();
        let factory = StaticFactory::package("mock", Some(1)).with_package(MockPackage::new());
        registry.register(Arc::new(factory)).unwrap();
        let manager = MockManager::new().with_data(json!({"version": "2.0.0"}));
        (Arc::new(manager), Arc::new(registry))
    }

    #[test]
    fn test_parse_keeps_order() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(manifest.data["version"], "2.0.0");
        assert_eq!(manifest.resources.len(), 2);
        assert_eq!(manifest.resources[1]["name"], "git");
    }

    #[test]
    fn test_merged_data_prefers_manifest() {
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let merged = manifest.merged_data(json!({"version": "1.0.0", "env": "prod"}));
        assert_eq!(merged["version"], "2.0.0");
        assert_eq!(merged["env"], "prod");
    }

    #[test]
    fn test_resources_built_in_order() {
        let (manager, registry) = setup();
        let manifest = Manifest::parse(MANIFEST).unwrap();
        let resources = manifest.resources(&manager, &registry).unwrap();
        let refs: Vec<_> = resources.iter().map(|r| r.reference()).collect();
        assert_eq!(refs, vec!["package#zsh", "package#git"]);
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let (manager, registry) = setup();
        let manifest = Manifest::parse(
            r#"
[[resources]]
type = "package"
name = "zsh"
ensure = "present"

[[resources]]
type = "package"
name = "zsh"
ensure = "absent"
"#,
        )
        .unwrap();
        let err = manifest.resources(&manager, &registry).unwrap_err();
        assert!(err.to_string().contains("duplicate resource package#zsh"));
    }

    #[test]
    fn test_invalid_resource_names_index() {
        let (manager, registry) = setup();
        let manifest = Manifest::parse(
            r#"
[[resources]]
type = "printer"
name = "lp0"
"#,
        )
        .unwrap();
        let err = manifest.resources(&manager, &registry).unwrap_err();
        assert_eq!(err.to_string(), "resources[0] (printer#lp0)");
    }
}
