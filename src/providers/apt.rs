//! `package#apt` - Debian packages through dpkg-query and apt-get

use anyhow::{Context, Result, bail};
use declarative::kinds::package::{ENSURE_LATEST, PackageProvider};
use declarative::state::PackageMetadata;
use declarative::{
    CommandOptions, CommandRunner, ENSURE_ABSENT, ENSURE_PRESENT, Facts, Logger, Provider,
    ProviderFactory, ProviderInstance, ResourceProperties, ResourceState,
};
use std::cmp::Ordering;
use std::sync::Arc;

use super::debversion;

pub const NAME: &str = "apt";

const DPKG_QUERY: &str = "dpkg-query";
const APT_GET: &str = "apt-get";

pub struct AptFactory;

impl ProviderFactory for AptFactory {
    fn type_name(&self) -> &str {
        declarative::kinds::package::TYPE_NAME
    }

    fn name(&self) -> &str {
        NAME
    }

    fn is_manageable(&self, facts: &Facts, _: &ResourceProperties) -> Result<Option<i32>> {
        if facts["os"]["family"] != "debian" {
            return Ok(None);
        }
        let tools = which::which(APT_GET).is_ok() && which::which(DPKG_QUERY).is_ok();
        Ok(tools.then_some(10))
    }

    fn new_provider(
        &self,
        logger: Logger,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<ProviderInstance> {
        Ok(ProviderInstance::Package(Box::new(Apt { logger, runner })))
    }
}

pub struct Apt {
    logger: Logger,
    runner: Arc<dyn CommandRunner>,
}

impl Apt {
    fn apt_get(&self, args: &[&str]) -> Result<()> {
        let options = CommandOptions::new(APT_GET)
            .args(["-y", "-q"])
            .args(args.iter().copied())
            .env("DEBIAN_FRONTEND", "noninteractive");
        self.logger.info(format_args!("Running: {}", options.display()));

        let output = self.runner.execute_with_options(&options)?;
        if !output.success() {
            bail!(
                "{} failed: {}",
                options.display(),
                output.stderr_str().trim()
            );
        }
        Ok(())
    }

    /// `name` or `name=version` for apt-get install
    fn target(name: &str, version: &str) -> String {
        match version {
            ENSURE_PRESENT | ENSURE_LATEST => name.to_string(),
            version => format!("{name}={version}"),
        }
    }
}

impl Provider for Apt {
    fn name(&self) -> &str {
        NAME
    }
}

/// Parse `dpkg-query -f '${Status}\t${Version}\t${Architecture}'` output
fn parse_status(name: &str, line: &str) -> ResourceState<PackageMetadata> {
    let mut fields = line.trim_end().split('\t');
    let status = fields.next().unwrap_or_default();
    let version = fields.next().unwrap_or_default();
    let arch = fields.next().filter(|a| !a.is_empty());

    let installed = status.split_whitespace().last() == Some("installed");
    if !installed || version.is_empty() {
        return ResourceState::new(
            ENSURE_ABSENT,
            PackageMetadata {
                name: name.to_string(),
                version: None,
                arch: None,
            },
        );
    }

    ResourceState::new(
        version,
        PackageMetadata {
            name: name.to_string(),
            version: Some(version.to_string()),
            arch: arch.map(str::to_string),
        },
    )
}

impl PackageProvider for Apt {
    fn status(&self, name: &str) -> Result<ResourceState<PackageMetadata>> {
        let output = self.runner.execute(
            DPKG_QUERY,
            &["-W", "-f=${Status}\t${Version}\t${Architecture}", name],
        )?;
        // dpkg-query exits 1 for packages it has never heard of
        let line = if output.success() {
            output.stdout_str()
        } else {
            String::new()
        };
        let state = parse_status(name, &line);
        self.logger
            .debug(format_args!("dpkg reports {name} as {}", state.ensure));
        Ok(state)
    }

    fn install(&self, name: &str, version: &str) -> Result<()> {
        self.apt_get(&["install", &Self::target(name, version)])
    }

    fn upgrade(&self, name: &str, version: &str) -> Result<()> {
        if version == ENSURE_LATEST {
            return self.apt_get(&["install", "--only-upgrade", name]);
        }
        self.apt_get(&["install", &Self::target(name, version)])
    }

    fn downgrade(&self, name: &str, version: &str) -> Result<()> {
        self.apt_get(&["install", "--allow-downgrades", &Self::target(name, version)])
    }

    fn uninstall(&self, name: &str) -> Result<()> {
        self.apt_get(&["remove", name])
    }

    fn version_cmp(&self, a: &str, b: &str) -> Result<Ordering> {
        debversion::compare(a, b).with_context(|| format!("cannot compare {a} with {b}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::testing::MockRunner;
    use serde_json::json;

    fn apt(runner: MockRunner) -> Apt {
        Apt {
            logger: Logger::new("package#nginx"),
            runner: Arc::new(runner),
        }
    }

    #[test]
    fn test_parse_installed() {
        let state = parse_status("nginx", "install ok installed\t1.24.0-2\tamd64\n");
        assert_eq!(state.ensure, "1.24.0-2");
        assert_eq!(state.metadata.version.as_deref(), Some("1.24.0-2"));
        assert_eq!(state.metadata.arch.as_deref(), Some("amd64"));
    }

    #[test]
    fn test_parse_not_installed() {
        assert!(parse_status("nginx", "deinstall ok config-files\t1.24.0-2\tamd64").is_absent());
        assert!(parse_status("nginx", "unknown ok not-installed\t\t").is_absent());
        assert!(parse_status("nginx", "").is_absent());
    }

    #[test]
    fn test_status_unknown_package() {
        let runner = MockRunner::new().respond("dpkg-query", 1, "");
        assert!(apt(runner).status("nope").unwrap().is_absent());
    }

    #[test]
    fn test_install_commands() {
        let runner = Arc::new(MockRunner::new());
        let provider = Apt {
            logger: Logger::new("package#nginx"),
            runner: runner.clone(),
        };

        provider.install("nginx", "present").unwrap();
        provider.install("nginx", "1.24.0-2").unwrap();
        provider.upgrade("nginx", "latest").unwrap();
        provider.downgrade("nginx", "1.22.0-1").unwrap();
        provider.uninstall("nginx").unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "apt-get -y -q install nginx",
                "apt-get -y -q install nginx=1.24.0-2",
                "apt-get -y -q install --only-upgrade nginx",
                "apt-get -y -q install --allow-downgrades nginx=1.22.0-1",
                "apt-get -y -q remove nginx",
            ]
        );
    }

    #[test]
    fn test_failed_install_reports_stderr() {
        let runner = MockRunner::new().respond("apt-get", 100, "");
        let err = apt(runner).install("nginx", "present").unwrap_err();
        assert!(err.to_string().starts_with("apt-get -y -q install nginx failed"));
    }

    #[test]
    fn test_version_cmp() {
        let provider = apt(MockRunner::new());
        assert_eq!(
            provider.version_cmp("1.24.0-2", "1.24.0-10").unwrap(),
            Ordering::Less
        );
        assert!(provider.version_cmp("", "1.0").is_err());
    }

    #[test]
    fn test_not_manageable_off_debian() {
        let facts = json!({"os": {"family": "rhel"}});
        let props = ResourceProperties::Package(declarative::PackageProperties::new("x", "present"));
        assert_eq!(AptFactory.is_manageable(&facts, &props).unwrap(), None);
    }
}
