//! Observed resource state
//!
//! A [`ResourceState`] is produced fresh by every provider status probe.
//! The common annotation fields are filled in by reconciliation; the
//! metadata payload is specific to the resource type.

use serde::{Deserialize, Serialize};

/// Ensure value reported for resources that do not exist
pub const ENSURE_ABSENT: &str = "absent";
/// Ensure value for resources that should exist in any form
pub const ENSURE_PRESENT: &str = "present";

/// Whether an observed owner or group satisfies the requested one
///
/// The request may name the user or group, or give its numeric id.
pub fn identity_matches(wanted: &str, name: Option<&str>, id: Option<u32>) -> bool {
    name == Some(wanted) || wanted.parse::<u32>().is_ok_and(|w| id == Some(w))
}

/// State of a resource as probed by its provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState<M> {
    /// Observed ensure value
    pub ensure: String,
    /// Whether reconciliation changed (or would have changed) the resource
    #[serde(default)]
    pub changed: bool,
    /// Whether the desired state held without changes
    #[serde(default)]
    pub stable: bool,
    #[serde(default)]
    pub noop: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noop_message: Option<String>,
    /// Whether a subscribe refresh fired
    #[serde(default)]
    pub refreshed: bool,
    pub metadata: M,
}

impl<M> ResourceState<M> {
    /// A fresh, unannotated state
    pub fn new(ensure: impl Into<String>, metadata: M) -> Self {
        Self {
            ensure: ensure.into(),
            changed: false,
            stable: false,
            noop: false,
            noop_message: None,
            refreshed: false,
            metadata,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.ensure == ENSURE_ABSENT
    }

    /// Mark the state as converged without changes
    pub(crate) fn mark_stable(mut self) -> Self {
        self.stable = true;
        self.changed = false;
        self
    }

    /// Record a noop outcome with the messages of every skipped mutation
    pub(crate) fn mark_noop(mut self, messages: &[String]) -> Self {
        self.noop = true;
        self.changed = !messages.is_empty();
        self.noop_message = join_noop_messages(messages);
        self
    }

    /// Map the metadata payload, keeping the annotations
    pub fn map_metadata<N>(self, f: impl FnOnce(M) -> N) -> ResourceState<N> {
        ResourceState {
            ensure: self.ensure,
            changed: self.changed,
            stable: self.stable,
            noop: self.noop,
            noop_message: self.noop_message,
            refreshed: self.refreshed,
            metadata: f(self.metadata),
        }
    }
}

/// Join noop messages with a comma, lowercasing every message after the first
///
/// `["Would have started", "Would have enabled"]` becomes
/// `"Would have started, would have enabled"`.
pub fn join_noop_messages(messages: &[String]) -> Option<String> {
    let mut iter = messages.iter();
    let first = iter.next()?.clone();
    Some(iter.fold(first, |mut acc, msg| {
        acc.push_str(", ");
        let mut chars = msg.chars();
        if let Some(c) = chars.next() {
            acc.extend(c.to_lowercase());
            acc.push_str(chars.as_str());
        }
        acc
    }))
}

/// Metadata for package resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

/// Metadata for service resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub name: String,
    pub running: bool,
    pub enabled: bool,
}

/// Metadata for exec resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecMetadata {
    pub command: String,
    /// Exit code of the last execution in this reconciliation, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Whether the `creates` path exists
    #[serde(default)]
    pub creates_satisfied: bool,
}

/// Metadata for archive resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// Path of the archive file
    pub name: String,
    pub exists: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    /// Whether the `creates` marker exists
    #[serde(default)]
    pub creates_exists: bool,
}

/// Kind of filesystem entry found at a file resource's path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    #[default]
    Missing,
    File,
    Directory,
    Other,
}

/// Metadata for file resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub path: String,
    pub kind: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    /// Permission bits as an octal string, e.g. "0644"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// sha256 of the content for regular files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}
