//! Core types shared by every resource kind

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Output;
use std::str::FromStr;
use std::time::Duration;

/// Host facts as gathered by the caller
pub type Facts = Value;

/// A `type#name` reference to another resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceRef {
    pub type_name: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
        }
    }
}

impl FromStr for ResourceRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('#') {
            Some((type_name, name))
                if !type_name.is_empty() && !name.is_empty() && !name.contains('#') =>
            {
                Ok(Self::new(type_name, name))
            }
            _ => Err(Error::InvalidReference(s.to_string())),
        }
    }
}

impl TryFrom<String> for ResourceRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ResourceRef> for String {
    fn from(value: ResourceRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.name)
    }
}

/// Boolean expressions deciding whether a resource is managed at all
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlProperties {
    /// Manage only when this evaluates true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage_if: Option<String>,
    /// Skip management when this evaluates true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage_unless: Option<String>,
}

fn default_tries() -> u32 {
    1
}

/// A check run after a resource is applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Display name, defaults to the command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Command to run, exit codes follow the nagios convention
    pub command: String,
    /// Attempts before the check is considered failed
    #[serde(default = "default_tries")]
    pub tries: u32,
    /// Delay between attempts, e.g. "5s"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub try_sleep: Option<String>,
    /// Per attempt timeout, e.g. "30s"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

impl HealthCheck {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            name: None,
            command: command.into(),
            tries: 1,
            try_sleep: None,
            timeout: None,
        }
    }

    /// The name shown in events and logs
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.command)
    }

    fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(Error::invalid("health check command is required"));
        }
        if self.tries == 0 {
            return Err(Error::invalid("health check tries must be at least 1"));
        }
        if let Some(sleep) = &self.try_sleep {
            parse_duration(sleep)?;
        }
        if let Some(timeout) = &self.timeout {
            parse_duration(timeout)?;
        }
        Ok(())
    }
}

/// Properties every resource type shares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonProperties {
    /// Unique identifier within the resource type
    #[serde(default)]
    pub name: String,
    /// Desired state token, vocabulary depends on the type
    #[serde(default)]
    pub ensure: String,
    /// Secondary name other resources may reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Force a specific provider instead of auto selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<ControlProperties>,
    /// Resources that must not have failed in this session
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub require: Vec<ResourceRef>,
    /// Resources whose changes trigger a refresh of this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscribe: Vec<ResourceRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub health_checks: Vec<HealthCheck>,
}

impl CommonProperties {
    pub fn new(name: impl Into<String>, ensure: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ensure: ensure.into(),
            ..Default::default()
        }
    }

    /// Validate the shared properties
    ///
    /// Types that supply their own default ensure pass `require_ensure = false`.
    pub fn validate(&self, require_ensure: bool) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ResourceNameRequired);
        }
        if require_ensure && self.ensure.trim().is_empty() {
            return Err(Error::ResourceEnsureRequired);
        }
        if self.alias.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(Error::invalid("alias may not be empty"));
        }
        if self.provider.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(Error::invalid("provider may not be empty"));
        }
        for check in &self.health_checks {
            check.validate()?;
        }
        Ok(())
    }

    /// The explicitly requested provider, or "" for auto selection
    pub fn provider_name(&self) -> &str {
        self.provider.as_deref().unwrap_or_default()
    }
}

/// Read-only environment handed to expressions and templates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateEnvironment {
    #[serde(default)]
    pub facts: Facts,
    #[serde(default)]
    pub data: Value,
}

impl TemplateEnvironment {
    pub fn new(facts: Facts, data: Value) -> Self {
        Self { facts, data }
    }

    /// Look up a dotted path such as `facts.os.family` or `data.version`
    ///
    /// Array elements are addressed by index, e.g. `data.ports.0`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = match parts.next()? {
            "facts" => &self.facts,
            "data" => &self.data,
            _ => return None,
        };
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// A command to run through a [`CommandRunner`](crate::context::CommandRunner)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
    /// Replacement PATH for the child process
    pub path: Option<String>,
    pub timeout: Option<Duration>,
}

impl CommandOptions {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The command line as a single display string
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Output from an executed command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// Check if the command exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Parse a duration such as "500ms", "30s", "5m", "1h" or a bare number of seconds
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::invalid(format!("invalid duration '{input}'")))?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(Error::invalid(format!("invalid duration '{input}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_reference() {
        let r: ResourceRef = "package#nginx".parse().unwrap();
        assert_eq!(r.type_name, "package");
        assert_eq!(r.name, "nginx");
        assert_eq!(r.to_string(), "package#nginx");
    }

    #[test]
    fn test_parse_reference_rejects_bad_shapes() {
        for bad in ["package", "#nginx", "package#", "a#b#c", ""] {
            assert!(
                matches!(bad.parse::<ResourceRef>(), Err(Error::InvalidReference(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_reference_deserialize() {
        let refs: Vec<ResourceRef> = serde_json::from_value(json!(["service#nginx"])).unwrap();
        assert_eq!(refs[0], ResourceRef::new("service", "nginx"));

        let bad: std::result::Result<Vec<ResourceRef>, _> =
            serde_json::from_value(json!(["nginx"]));
        assert!(bad.is_err());
    }

    #[test]
    fn test_common_validate() {
        assert!(matches!(
            CommonProperties::new("", "present").validate(true),
            Err(Error::ResourceNameRequired)
        ));
        assert!(matches!(
            CommonProperties::new("zsh", "").validate(true),
            Err(Error::ResourceEnsureRequired)
        ));
        assert!(CommonProperties::new("zsh", "").validate(false).is_ok());

        let mut props = CommonProperties::new("zsh", "present");
        props.health_checks.push(HealthCheck {
            tries: 0,
            ..HealthCheck::new("true")
        });
        assert!(props.validate(true).is_err());
    }

    #[test]
    fn test_environment_lookup() {
        let env = TemplateEnvironment::new(
            json!({"os": {"family": "debian"}}),
            json!({"ports": [80, 443]}),
        );
        assert_eq!(env.lookup("facts.os.family"), Some(&json!("debian")));
        assert_eq!(env.lookup("data.ports.1"), Some(&json!(443)));
        assert_eq!(env.lookup("facts.os.missing"), None);
        assert_eq!(env.lookup("other.x"), None);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("10d").is_err());
    }

    #[test]
    fn test_command_output() {
        let output = CommandOutput {
            stdout: b"ok\n".to_vec(),
            stderr: Vec::new(),
            exit_code: Some(0),
        };
        assert!(output.success());
        assert_eq!(output.stdout_str(), "ok\n");
    }
}
