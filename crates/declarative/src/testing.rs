//! In-memory test doubles
//!
//! [`MockManager`] stands in for the agent, [`StaticFactory`] registers
//! canned providers, and the `Mock*` providers keep their state in memory
//! so reconciliation can be exercised without touching the host.
//!
//! ```
//! use declarative::testing::{MockManager, MockPackage, StaticFactory};
//! use declarative::{PackageProperties, Registry, Resource, new_resource};
//! use std::sync::Arc;
//!
//! let registry = Registry::new();
//! let packages = MockPackage::new().installed("zsh", "1.0.0");
//! registry
//!     .register(Arc::new(StaticFactory::package("mock", Some(1)).with_package(packages.clone())))
//!     .unwrap();
//!
//! let resource = new_resource(
//!     Arc::new(MockManager::new()),
//!     Arc::new(registry),
//!     PackageProperties::new("zsh", "2.0.0").into(),
//! )
//! .unwrap();
//!
//! let event = resource.apply();
//! assert!(event.changed);
//! assert_eq!(packages.calls(), vec!["upgrade zsh 2.0.0"]);
//! ```

use crate::context::{
    CommandRunner, ExpressionEvaluator, HealthCheckExecutor, Logger, Manager, TemplateResolver,
};
use crate::error::Error;
use crate::event::{HealthCheckResult, HealthStatus};
use crate::kinds::archive::{ArchiveProperties, ArchiveProvider};
use crate::kinds::exec::{ExecProperties, ExecProvider};
use crate::kinds::file::{ENSURE_DIRECTORY, FileProperties, FileProvider, sha256_hex};
use crate::kinds::package::PackageProvider;
use crate::kinds::service::{ENSURE_RUNNING, ENSURE_STOPPED, ServiceProvider};
use crate::kinds::{ResourceProperties, archive, exec, file, package, service};
use crate::provider::{Provider, ProviderFactory, ProviderInstance};
use crate::state::{
    ArchiveMetadata, ENSURE_ABSENT, ExecMetadata, FileKind, FileMetadata, PackageMetadata,
    ResourceState, ServiceMetadata,
};
use crate::types::{CommandOptions, CommandOutput, Facts, HealthCheck, TemplateEnvironment};
use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

const MOCK_PROVIDER: &str = "mock";

// ============================================================================
// Collaborators
// ============================================================================

/// Command runner returning scripted output
///
/// Responses are matched on the displayed command line prefix; anything
/// unmatched succeeds with empty output.
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    responses: Arc<Mutex<Vec<(String, CommandOutput)>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix`
    #[must_use]
    pub fn respond(self, prefix: impl Into<String>, exit_code: i32, stdout: &str) -> Self {
        lock(&self.responses).push((
            prefix.into(),
            CommandOutput {
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
                exit_code: Some(exit_code),
            },
        ));
        self
    }

    /// Command lines run so far
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

impl CommandRunner for MockRunner {
    fn execute_with_options(&self, options: &CommandOptions) -> Result<CommandOutput> {
        let line = options.display();
        lock(&self.calls).push(line.clone());

        let responses = lock(&self.responses);
        Ok(responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map_or_else(
                || CommandOutput {
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                    exit_code: Some(0),
                },
                |(_, output)| output.clone(),
            ))
    }
}

/// Replaces `{{ path }}` placeholders with values from the environment
///
/// Unknown paths are errors; strings are inserted verbatim, other values as
/// JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainResolver;

impl TemplateResolver for PlainResolver {
    fn resolve(&self, input: &str, env: &TemplateEnvironment) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| anyhow!("unterminated placeholder in '{input}'"))?;
            let path = after[..end].trim();
            match env.lookup(path) {
                Some(Value::String(s)) => out.push_str(s),
                Some(other) => out.push_str(&other.to_string()),
                None => bail!("unknown placeholder '{path}'"),
            }
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Evaluator answering from a fixed table of expressions
#[derive(Debug, Clone, Default)]
pub struct TableEvaluator {
    answers: BTreeMap<String, bool>,
}

impl ExpressionEvaluator for TableEvaluator {
    fn evaluate(&self, expression: &str, _env: &TemplateEnvironment) -> Result<bool> {
        self.answers
            .get(expression)
            .copied()
            .ok_or_else(|| anyhow!("unknown expression"))
    }
}

/// Health checker answering with fixed exit codes per command
#[derive(Debug, Clone, Default)]
pub struct TableHealthChecker {
    exit_codes: BTreeMap<String, i32>,
}

impl HealthCheckExecutor for TableHealthChecker {
    fn execute(
        &self,
        _resource_type: &str,
        _resource_name: &str,
        check: &HealthCheck,
        _runner: &dyn CommandRunner,
    ) -> Result<HealthCheckResult> {
        let code = self
            .exit_codes
            .get(&check.command)
            .copied()
            .ok_or_else(|| anyhow!("no scripted result for {}", check.command))?;

        Ok(HealthCheckResult {
            name: check.display_name().to_string(),
            status: HealthStatus::from_exit_code(Some(code)),
            tries: 1,
            output: String::new(),
        })
    }
}

/// In-memory manager
#[derive(Debug, Default)]
pub struct MockManager {
    noop: bool,
    changed: BTreeSet<(String, String)>,
    failed: BTreeSet<(String, String)>,
    tracker_error: bool,
    facts: Facts,
    data: Value,
    evaluator: TableEvaluator,
    health: TableHealthChecker,
    runner: MockRunner,
    refresh_queries: AtomicUsize,
}

impl MockManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn noop(mut self) -> Self {
        self.noop = true;
        self
    }

    /// Report a resource as changed in this session
    #[must_use]
    pub fn with_changed(mut self, resource_type: &str, name: &str) -> Self {
        self.changed
            .insert((resource_type.to_string(), name.to_string()));
        self
    }

    /// Report a resource as failed in this session
    #[must_use]
    pub fn with_failed(mut self, resource_type: &str, name: &str) -> Self {
        self.failed
            .insert((resource_type.to_string(), name.to_string()));
        self
    }

    /// Make every session query fail
    #[must_use]
    pub fn with_tracker_error(mut self) -> Self {
        self.tracker_error = true;
        self
    }

    #[must_use]
    pub fn with_facts(mut self, facts: Facts) -> Self {
        self.facts = facts;
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn with_expression(mut self, expression: &str, result: bool) -> Self {
        self.evaluator
            .answers
            .insert(expression.to_string(), result);
        self
    }

    #[must_use]
    pub fn with_health_exit(mut self, command: &str, exit_code: i32) -> Self {
        self.health
            .exit_codes
            .insert(command.to_string(), exit_code);
        self
    }

    #[must_use]
    pub fn with_runner(mut self, runner: MockRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Number of refresh queries answered so far
    pub fn refresh_queries(&self) -> usize {
        self.refresh_queries.load(AtomicOrdering::SeqCst)
    }

    fn query(
        &self,
        set: &BTreeSet<(String, String)>,
        resource_type: &str,
        name: &str,
    ) -> Result<bool> {
        if self.tracker_error {
            bail!("session store unavailable");
        }
        Ok(set.contains(&(resource_type.to_string(), name.to_string())))
    }
}

impl Manager for MockManager {
    fn noop_mode(&self) -> bool {
        self.noop
    }

    fn new_runner(&self) -> Arc<dyn CommandRunner> {
        Arc::new(self.runner.clone())
    }

    fn should_refresh(&self, resource_type: &str, name: &str) -> Result<bool> {
        self.refresh_queries.fetch_add(1, AtomicOrdering::SeqCst);
        self.query(&self.changed, resource_type, name)
    }

    fn is_resource_failed(&self, resource_type: &str, name: &str) -> Result<bool> {
        self.query(&self.failed, resource_type, name)
    }

    fn template_environment(&self) -> TemplateEnvironment {
        TemplateEnvironment::new(self.facts.clone(), self.data.clone())
    }

    fn expression_evaluator(&self) -> &dyn ExpressionEvaluator {
        &self.evaluator
    }

    fn template_resolver(&self) -> &dyn TemplateResolver {
        &PlainResolver
    }

    fn health_checker(&self) -> &dyn HealthCheckExecutor {
        &self.health
    }
}

// ============================================================================
// Providers
// ============================================================================

#[derive(Debug, Default)]
struct MutationScript {
    calls: Vec<String>,
    /// Record mutations without changing state
    ignore: bool,
    /// Fail every mutation with this message
    fail: Option<String>,
}

impl MutationScript {
    /// Record a call; returns whether the state should change
    fn record(&mut self, call: String) -> Result<bool> {
        if let Some(message) = &self.fail {
            bail!("{message}");
        }
        self.calls.push(call);
        Ok(!self.ignore)
    }
}

fn version_parts(version: &str) -> Vec<u64> {
    version
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

#[derive(Debug, Default)]
struct PackageTable {
    installed: BTreeMap<String, String>,
    script: MutationScript,
}

/// Package manager keeping installed versions in memory
///
/// Versions compare numerically by dotted parts; `present` and `latest`
/// install as "1.0.0" and upgrade to "99.0.0".
#[derive(Debug, Clone)]
pub struct MockPackage {
    name: String,
    table: Arc<Mutex<PackageTable>>,
}

impl Default for MockPackage {
    fn default() -> Self {
        Self {
            name: MOCK_PROVIDER.to_string(),
            table: Arc::default(),
        }
    }
}

impl MockPackage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn installed(self, name: &str, version: &str) -> Self {
        lock(&self.table)
            .installed
            .insert(name.to_string(), version.to_string());
        self
    }

    /// Accept mutations without changing the installed state
    #[must_use]
    pub fn ignoring_mutations(self) -> Self {
        lock(&self.table).script.ignore = true;
        self
    }

    #[must_use]
    pub fn failing_mutations(self, message: &str) -> Self {
        lock(&self.table).script.fail = Some(message.to_string());
        self
    }

    /// Mutations performed so far, e.g. "upgrade zsh 2.0.0"
    pub fn calls(&self) -> Vec<String> {
        lock(&self.table).script.calls.clone()
    }

    fn set(&self, call: String, name: &str, version: Option<&str>) -> Result<()> {
        let mut table = lock(&self.table);
        if table.script.record(call)? {
            match version {
                Some(v) => table.installed.insert(name.to_string(), v.to_string()),
                None => table.installed.remove(name),
            };
        }
        Ok(())
    }
}

fn concrete_version(version: &str) -> &str {
    match version {
        crate::state::ENSURE_PRESENT => "1.0.0",
        package::ENSURE_LATEST => "99.0.0",
        v => v,
    }
}

impl Provider for MockPackage {
    fn name(&self) -> &str {
        &self.name
    }
}

impl PackageProvider for MockPackage {
    fn status(&self, name: &str) -> Result<ResourceState<PackageMetadata>> {
        let table = lock(&self.table);
        let version = table.installed.get(name).cloned();
        Ok(ResourceState::new(
            version.clone().unwrap_or_else(|| ENSURE_ABSENT.to_string()),
            PackageMetadata {
                name: name.to_string(),
                version,
                arch: None,
            },
        ))
    }

    fn install(&self, name: &str, version: &str) -> Result<()> {
        self.set(format!("install {name} {version}"), name, Some(concrete_version(version)))
    }

    fn upgrade(&self, name: &str, version: &str) -> Result<()> {
        self.set(format!("upgrade {name} {version}"), name, Some(concrete_version(version)))
    }

    fn downgrade(&self, name: &str, version: &str) -> Result<()> {
        self.set(format!("downgrade {name} {version}"), name, Some(version))
    }

    fn uninstall(&self, name: &str) -> Result<()> {
        self.set(format!("uninstall {name}"), name, None)
    }

    fn version_cmp(&self, a: &str, b: &str) -> Result<Ordering> {
        Ok(version_parts(a).cmp(&version_parts(b)))
    }
}

#[derive(Debug, Default)]
struct ServiceTable {
    /// name -> (running, enabled)
    services: BTreeMap<String, (bool, bool)>,
    script: MutationScript,
}

/// Service manager keeping running and enabled flags in memory
#[derive(Debug, Clone)]
pub struct MockService {
    name: String,
    table: Arc<Mutex<ServiceTable>>,
}

impl Default for MockService {
    fn default() -> Self {
        Self {
            name: MOCK_PROVIDER.to_string(),
            table: Arc::default(),
        }
    }
}

impl MockService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn service(self, name: &str, running: bool, enabled: bool) -> Self {
        lock(&self.table)
            .services
            .insert(name.to_string(), (running, enabled));
        self
    }

    #[must_use]
    pub fn ignoring_mutations(self) -> Self {
        lock(&self.table).script.ignore = true;
        self
    }

    /// Mutations performed so far, e.g. "start nginx"
    pub fn calls(&self) -> Vec<String> {
        lock(&self.table).script.calls.clone()
    }

    fn update(&self, action: &str, name: &str, f: impl FnOnce(&mut (bool, bool))) -> Result<()> {
        let mut table = lock(&self.table);
        if table.script.record(format!("{action} {name}"))? {
            f(table.services.entry(name.to_string()).or_default());
        }
        Ok(())
    }
}

impl Provider for MockService {
    fn name(&self) -> &str {
        &self.name
    }
}

impl ServiceProvider for MockService {
    fn status(&self, name: &str) -> Result<ResourceState<ServiceMetadata>> {
        let (running, enabled) = lock(&self.table)
            .services
            .get(name)
            .copied()
            .unwrap_or_default();
        let ensure = if running { ENSURE_RUNNING } else { ENSURE_STOPPED };
        Ok(ResourceState::new(
            ensure,
            ServiceMetadata {
                name: name.to_string(),
                running,
                enabled,
            },
        ))
    }

    fn start(&self, name: &str) -> Result<()> {
        self.update("start", name, |s| s.0 = true)
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.update("stop", name, |s| s.0 = false)
    }

    fn restart(&self, name: &str) -> Result<()> {
        self.update("restart", name, |s| s.0 = true)
    }

    fn enable(&self, name: &str) -> Result<()> {
        self.update("enable", name, |s| s.1 = true)
    }

    fn disable(&self, name: &str) -> Result<()> {
        self.update("disable", name, |s| s.1 = false)
    }
}

/// Exec provider that never runs anything
///
/// Every execution returns the configured exit code. `creates` is checked
/// against the real filesystem.
#[derive(Debug, Clone)]
pub struct MockExec {
    name: String,
    exit_code: i32,
    touch_creates: bool,
    runs: Arc<AtomicUsize>,
}

impl MockExec {
    #[must_use]
    pub fn new(exit_code: i32) -> Self {
        Self {
            name: MOCK_PROVIDER.to_string(),
            exit_code,
            touch_creates: false,
            runs: Arc::default(),
        }
    }

    /// Create the `creates` path on every execution
    #[must_use]
    pub fn touch_creates(mut self) -> Self {
        self.touch_creates = true;
        self
    }

    /// Number of executions so far
    pub fn runs(&self) -> usize {
        self.runs.load(AtomicOrdering::SeqCst)
    }
}

impl Default for MockExec {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Provider for MockExec {
    fn name(&self) -> &str {
        &self.name
    }
}

impl ExecProvider for MockExec {
    fn status(&self, properties: &ExecProperties) -> Result<ResourceState<ExecMetadata>> {
        let creates_satisfied = properties
            .creates
            .as_deref()
            .is_some_and(|p| Path::new(p).exists());
        Ok(ResourceState::new(
            crate::state::ENSURE_PRESENT,
            ExecMetadata {
                command: properties.command_line().to_string(),
                exit_code: None,
                creates_satisfied,
            },
        ))
    }

    fn execute(&self, properties: &ExecProperties, logger: &Logger) -> Result<i32> {
        logger.debug(format_args!("pretending to run {}", properties.command_line()));
        self.runs.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(creates) = properties.creates.as_deref()
            && self.touch_creates
        {
            std::fs::write(creates, "")?;
        }
        Ok(self.exit_code)
    }
}

#[derive(Debug, Default)]
struct ArchiveTable {
    /// (checksum, owner, group) of the archive file
    file: Option<(String, String, String)>,
    marker: bool,
    calls: Vec<String>,
}

/// Archive provider serving content with a fixed checksum
#[derive(Debug, Clone)]
pub struct MockArchive {
    name: String,
    served: String,
    table: Arc<Mutex<ArchiveTable>>,
}

impl MockArchive {
    /// A provider whose downloads hash to `served`
    #[must_use]
    pub fn new(served: &str) -> Self {
        Self {
            name: MOCK_PROVIDER.to_string(),
            served: served.to_string(),
            table: Arc::default(),
        }
    }

    /// Start with an archive file already in place
    #[must_use]
    pub fn with_file(self, checksum: &str, owner: &str, group: &str) -> Self {
        lock(&self.table).file = Some((checksum.to_string(), owner.to_string(), group.to_string()));
        self
    }

    pub fn file_exists(&self) -> bool {
        lock(&self.table).file.is_some()
    }

    /// Delete the extraction marker, as if someone removed the extracted tree
    pub fn remove_marker(&self) {
        lock(&self.table).marker = false;
    }

    /// Operations performed so far
    pub fn calls(&self) -> Vec<String> {
        lock(&self.table).calls.clone()
    }
}

impl Provider for MockArchive {
    fn name(&self) -> &str {
        &self.name
    }
}

impl ArchiveProvider for MockArchive {
    fn status(&self, properties: &ArchiveProperties) -> Result<ResourceState<ArchiveMetadata>> {
        let table = lock(&self.table);
        let ensure = if table.file.is_some() {
            crate::state::ENSURE_PRESENT
        } else {
            ENSURE_ABSENT
        };
        let (checksum, owner, group) = match &table.file {
            Some((c, o, g)) => (Some(c.clone()), Some(o.clone()), Some(g.clone())),
            None => (None, None, None),
        };
        Ok(ResourceState::new(
            ensure,
            ArchiveMetadata {
                name: properties.common.name.clone(),
                exists: table.file.is_some(),
                size: 0,
                checksum,
                owner,
                group,
                uid: None,
                gid: None,
                creates_exists: table.marker,
            },
        ))
    }

    fn download(&self, properties: &ArchiveProperties) -> Result<()> {
        if let Some(expected) = &properties.checksum
            && *expected != self.served
        {
            return Err(Error::ChecksumMismatch {
                expected: expected.clone(),
                actual: self.served.clone(),
            }
            .into());
        }

        let mut table = lock(&self.table);
        table.calls.push("download".to_string());
        table.file = Some((
            self.served.clone(),
            properties.owner.clone(),
            properties.group.clone(),
        ));
        Ok(())
    }

    fn extract(&self, properties: &ArchiveProperties) -> Result<()> {
        let mut table = lock(&self.table);
        if table.file.is_none() {
            bail!("{} does not exist", properties.common.name);
        }
        table.calls.push("extract".to_string());
        table.marker = true;
        Ok(())
    }

    fn set_ownership(&self, properties: &ArchiveProperties) -> Result<()> {
        let mut table = lock(&self.table);
        let Some(file) = table.file.as_mut() else {
            bail!("{} does not exist", properties.common.name);
        };
        file.1 = properties.owner.clone();
        file.2 = properties.group.clone();
        table.calls.push("chown".to_string());
        Ok(())
    }

    fn remove(&self, _properties: &ArchiveProperties) -> Result<()> {
        let mut table = lock(&self.table);
        table.calls.push("remove".to_string());
        table.file = None;
        Ok(())
    }
}

/// File provider keeping a virtual filesystem in memory
#[derive(Debug, Clone)]
pub struct MockFile {
    name: String,
    entries: Arc<Mutex<BTreeMap<String, FileMetadata>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Default for MockFile {
    fn default() -> Self {
        Self {
            name: MOCK_PROVIDER.to_string(),
            entries: Arc::default(),
            calls: Arc::default(),
        }
    }
}

impl MockFile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations performed so far, e.g. "store /etc/motd"
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

impl Provider for MockFile {
    fn name(&self) -> &str {
        &self.name
    }
}

impl FileProvider for MockFile {
    fn status(&self, properties: &FileProperties) -> Result<ResourceState<FileMetadata>> {
        let path = &properties.common.name;
        let metadata = lock(&self.entries)
            .get(path)
            .cloned()
            .unwrap_or_else(|| FileMetadata {
                path: path.clone(),
                ..FileMetadata::default()
            });
        let ensure = match metadata.kind {
            FileKind::Missing => ENSURE_ABSENT,
            FileKind::Directory => ENSURE_DIRECTORY,
            FileKind::File | FileKind::Other => crate::state::ENSURE_PRESENT,
        };
        Ok(ResourceState::new(ensure, metadata))
    }

    fn store(&self, properties: &FileProperties) -> Result<()> {
        let path = properties.common.name.clone();
        lock(&self.calls).push(format!("store {path}"));

        let mut entries = lock(&self.entries);
        let previous = entries.get(&path).and_then(|m| m.checksum.clone());
        let (kind, checksum) = if properties.common.ensure == ENSURE_DIRECTORY {
            (FileKind::Directory, None)
        } else {
            let checksum = match &properties.content {
                Some(content) => Some(sha256_hex(content.as_bytes())),
                None => previous.or_else(|| Some(sha256_hex(b""))),
            };
            (FileKind::File, checksum)
        };

        entries.insert(
            path.clone(),
            FileMetadata {
                path,
                kind,
                owner: Some(properties.owner.clone()),
                group: Some(properties.group.clone()),
                uid: None,
                gid: None,
                mode: Some(properties.mode.clone()),
                checksum,
            },
        );
        Ok(())
    }

    fn remove(&self, properties: &FileProperties) -> Result<()> {
        let path = &properties.common.name;
        lock(&self.calls).push(format!("remove {path}"));
        lock(&self.entries).remove(path);
        Ok(())
    }
}

// ============================================================================
// Factories
// ============================================================================

#[derive(Debug, Clone)]
enum Template {
    Package(MockPackage),
    Service(MockService),
    Exec(MockExec),
    Archive(MockArchive),
    File(MockFile),
}

/// Factory with a fixed manageability answer that hands out mock providers
///
/// Providers built by one factory share state with the mock it was given.
#[derive(Debug)]
pub struct StaticFactory {
    type_name: &'static str,
    name: String,
    priority: Option<i32>,
    failing: bool,
    template: Template,
    constructed: AtomicUsize,
}

impl StaticFactory {
    fn new(type_name: &'static str, name: &str, priority: Option<i32>, template: Template) -> Self {
        Self {
            type_name,
            name: name.to_string(),
            priority,
            failing: false,
            template,
            constructed: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn package(name: &str, priority: Option<i32>) -> Self {
        Self::new(package::TYPE_NAME, name, priority, Template::Package(MockPackage::new()))
    }

    #[must_use]
    pub fn service(name: &str, priority: Option<i32>) -> Self {
        Self::new(service::TYPE_NAME, name, priority, Template::Service(MockService::new()))
    }

    #[must_use]
    pub fn exec(name: &str, priority: Option<i32>) -> Self {
        Self::new(exec::TYPE_NAME, name, priority, Template::Exec(MockExec::default()))
    }

    #[must_use]
    pub fn archive(name: &str, priority: Option<i32>) -> Self {
        Self::new(archive::TYPE_NAME, name, priority, Template::Archive(MockArchive::new("")))
    }

    #[must_use]
    pub fn file(name: &str, priority: Option<i32>) -> Self {
        Self::new(file::TYPE_NAME, name, priority, Template::File(MockFile::new()))
    }

    #[must_use]
    pub fn with_package(mut self, provider: MockPackage) -> Self {
        self.template = Template::Package(provider);
        self
    }

    #[must_use]
    pub fn with_service(mut self, provider: MockService) -> Self {
        self.template = Template::Service(provider);
        self
    }

    #[must_use]
    pub fn with_exec(mut self, provider: MockExec) -> Self {
        self.template = Template::Exec(provider);
        self
    }

    #[must_use]
    pub fn with_archive(mut self, provider: MockArchive) -> Self {
        self.template = Template::Archive(provider);
        self
    }

    #[must_use]
    pub fn with_file(mut self, provider: MockFile) -> Self {
        self.template = Template::File(provider);
        self
    }

    /// Make the manageability check return an error
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Number of providers built so far
    pub fn constructed(&self) -> usize {
        self.constructed.load(AtomicOrdering::SeqCst)
    }
}

impl ProviderFactory for StaticFactory {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_manageable(
        &self,
        _facts: &Facts,
        _properties: &ResourceProperties,
    ) -> Result<Option<i32>> {
        if self.failing {
            bail!("manageability failed for {}", self.name);
        }
        Ok(self.priority)
    }

    fn new_provider(
        &self,
        logger: Logger,
        _runner: Arc<dyn CommandRunner>,
    ) -> Result<ProviderInstance> {
        self.constructed.fetch_add(1, AtomicOrdering::SeqCst);
        logger.debug(format_args!("building mock provider {}", self.name));

        let name = self.name.clone();
        Ok(match self.template.clone() {
            Template::Package(mut p) => {
                p.name = name;
                ProviderInstance::Package(Box::new(p))
            }
            Template::Service(mut p) => {
                p.name = name;
                ProviderInstance::Service(Box::new(p))
            }
            Template::Exec(mut p) => {
                p.name = name;
                ProviderInstance::Exec(Box::new(p))
            }
            Template::Archive(mut p) => {
                p.name = name;
                ProviderInstance::Archive(Box::new(p))
            }
            Template::File(mut p) => {
                p.name = name;
                ProviderInstance::File(Box::new(p))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_resolver() {
        let env = TemplateEnvironment::new(
            json!({"os": {"family": "debian"}}),
            json!({"ports": [80, 443]}),
        );
        assert_eq!(
            PlainResolver
                .resolve("{{ facts.os.family }}:{{data.ports.1}}", &env)
                .unwrap(),
            "debian:443"
        );
        assert_eq!(PlainResolver.resolve("plain", &env).unwrap(), "plain");
        assert!(PlainResolver.resolve("{{ data.nope }}", &env).is_err());
        assert!(PlainResolver.resolve("{{ data.ports", &env).is_err());
    }

    #[test]
    fn test_mock_runner_scripted_output() {
        let runner = MockRunner::new().respond("dpkg-query", 1, "");
        assert!(!runner.run_status("dpkg-query", &["-W", "zsh"]).unwrap());
        assert!(runner.run_status("true", &[]).unwrap());
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn test_mock_package_version_cmp() {
        let p = MockPackage::new();
        assert_eq!(p.version_cmp("1.0.0", "2.0.0").unwrap(), Ordering::Less);
        assert_eq!(p.version_cmp("1.10", "1.9").unwrap(), Ordering::Greater);
        assert_eq!(p.version_cmp("1.0", "1.0").unwrap(), Ordering::Equal);
    }
}
