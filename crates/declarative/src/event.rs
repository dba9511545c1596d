//! Transaction events
//!
//! One event is produced per apply or health check invocation and handed to
//! the session store. The engine never reads events back.

use crate::state::ResourceState;
use crate::types::CommonProperties;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Outcome of a single health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl HealthStatus {
    /// Map a nagios plugin exit code to a status
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Ok,
            Some(1) => Self::Warning,
            Some(2) => Self::Critical,
            _ => Self::Unknown,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Result of running one health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    /// Attempts made before the final status
    pub tries: u32,
    #[serde(default)]
    pub output: String,
}

/// Structured record of one apply or health check invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub timestamp: DateTime<Utc>,
    pub resource_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Provider actually used, once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub requested_ensure: String,
    #[serde(default)]
    pub actual_ensure: String,
    pub changed: bool,
    pub failed: bool,
    pub skipped: bool,
    pub noop: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noop_message: Option<String>,
    pub refreshed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmet_requirements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub health_checks: Vec<HealthCheckResult>,
    pub duration: Duration,
}

impl TransactionEvent {
    /// A blank event for a resource
    pub fn new(resource_type: &str, properties: &CommonProperties) -> Self {
        Self {
            timestamp: Utc::now(),
            resource_type: resource_type.to_string(),
            name: properties.name.clone(),
            alias: properties.alias.clone(),
            provider: None,
            requested_ensure: properties.ensure.clone(),
            actual_ensure: String::new(),
            changed: false,
            failed: false,
            skipped: false,
            noop: false,
            noop_message: None,
            refreshed: false,
            unmet_requirements: Vec::new(),
            errors: Vec::new(),
            health_checks: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Mark the event failed and record the error message
    pub fn fail(&mut self, error: impl fmt::Display) {
        self.failed = true;
        self.errors.push(error.to_string());
    }

    /// Copy the annotations of a reconciled state into the event
    pub fn record_state<M>(&mut self, state: &ResourceState<M>) {
        self.changed = state.changed;
        self.actual_ensure = state.ensure.clone();
        self.noop = state.noop;
        self.noop_message = state.noop_message.clone();
        self.refreshed = state.refreshed;
    }

    /// The `type#name` identity of the resource
    pub fn reference(&self) -> String {
        format!("{}#{}", self.resource_type, self.name)
    }

    /// Whether the event matches a reference by name or alias
    pub fn matches(&self, resource_type: &str, name: &str) -> bool {
        self.resource_type == resource_type
            && (self.name == name || self.alias.as_deref() == Some(name))
    }
}
