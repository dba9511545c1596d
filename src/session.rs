//! Session tracking
//!
//! A session is one agent run. It records every transaction event in order
//! and answers the engine's refresh and failure queries from that log.
//! Finished sessions are written to `<state_dir>/sessions/<id>.json`.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use declarative::{BoxedResource, TransactionEvent};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What a session did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Apply,
    HealthCheck,
}

/// A resource declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declared {
    pub resource_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Declared {
    fn matches(&self, resource_type: &str, name: &str) -> bool {
        self.resource_type == resource_type
            && (self.name == name || self.alias.as_deref() == Some(name))
    }
}

/// Persisted form of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub kind: SessionKind,
    pub noop: bool,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub events: Vec<TransactionEvent>,
}

impl SessionRecord {
    pub fn failed(&self) -> usize {
        self.events.iter().filter(|e| e.failed).count()
    }

    pub fn changed(&self) -> usize {
        self.events.iter().filter(|e| e.changed).count()
    }
}

/// In-memory event log for one run
#[derive(Debug)]
pub struct Session {
    kind: SessionKind,
    noop: bool,
    started: DateTime<Utc>,
    declared: Mutex<Vec<Declared>>,
    events: Mutex<Vec<TransactionEvent>>,
}

impl Session {
    pub fn new(kind: SessionKind, noop: bool) -> Self {
        Self {
            kind,
            noop,
            started: Utc::now(),
            declared: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Declare the resources this session may be asked about
    pub fn declare(&self, resources: &[BoxedResource]) {
        self.set_declared(
            resources
                .iter()
                .map(|r| Declared {
                    resource_type: r.resource_type().to_string(),
                    name: r.name().to_string(),
                    alias: r.alias().map(str::to_string),
                })
                .collect(),
        );
    }

    fn set_declared(&self, declared: Vec<Declared>) {
        *self.declared.lock().unwrap_or_else(PoisonError::into_inner) = declared;
    }

    fn is_declared(&self, resource_type: &str, name: &str) -> bool {
        self.declared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|d| d.matches(resource_type, name))
    }

    pub fn id(&self) -> String {
        self.started.format("%Y%m%dT%H%M%S%.3fZ").to_string()
    }

    fn events(&self) -> MutexGuard<'_, Vec<TransactionEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, event: TransactionEvent) {
        self.events().push(event);
    }

    /// The latest event for a reference
    ///
    /// `Ok(None)` means the resource is declared but has not run yet;
    /// references to undeclared resources are errors.
    fn latest(&self, resource_type: &str, name: &str) -> Result<Option<TransactionEvent>> {
        let found = self
            .events()
            .iter()
            .rev()
            .find(|e| e.matches(resource_type, name))
            .cloned();
        if found.is_none() && !self.is_declared(resource_type, name) {
            return Err(anyhow!("unknown resource {resource_type}#{name}"));
        }
        Ok(found)
    }

    /// Whether the resource changed this session without failing
    pub fn should_refresh(&self, resource_type: &str, name: &str) -> Result<bool> {
        Ok(self
            .latest(resource_type, name)?
            .is_some_and(|e| e.changed && !e.failed))
    }

    /// Whether the resource failed, or was skipped on unmet requirements
    pub fn is_resource_failed(&self, resource_type: &str, name: &str) -> Result<bool> {
        Ok(self
            .latest(resource_type, name)?
            .is_some_and(|e| e.failed || (e.skipped && !e.unmet_requirements.is_empty())))
    }

    /// Snapshot the session for reporting
    pub fn finish(&self) -> SessionRecord {
        SessionRecord {
            id: self.id(),
            kind: self.kind,
            noop: self.noop,
            started: self.started,
            finished: Utc::now(),
            events: self.events().clone(),
        }
    }
}

/// Write a record to `<state_dir>/sessions/<id>.json`
pub fn save(record: &SessionRecord, state_dir: &Path) -> Result<PathBuf> {
    let dir = state_dir.join("sessions");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Could not create {}", dir.display()))?;
    let path = dir.join(format!("{}.json", record.id));
    write_report(record, &path)?;
    Ok(path)
}

/// Write a record as pretty JSON to an arbitrary path
pub fn write_report(record: &SessionRecord, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(record)?;
    fs::write(path, content).with_context(|| format!("Could not write {}", path.display()))
}
