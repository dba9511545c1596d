//! `exec#posix` - commands run directly, without a shell

use anyhow::{Result, bail};
use declarative::kinds::exec::{ExecProperties, ExecProvider};
use declarative::state::ExecMetadata;
use declarative::{
    CommandOptions, CommandRunner, ENSURE_PRESENT, Facts, Logger, Provider, ProviderFactory,
    ProviderInstance, ResourceProperties, ResourceState,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::argv;

pub const NAME: &str = "posix";

pub struct PosixExecFactory;

impl ProviderFactory for PosixExecFactory {
    fn type_name(&self) -> &str {
        declarative::kinds::exec::TYPE_NAME
    }

    fn name(&self) -> &str {
        NAME
    }

    fn is_manageable(&self, _: &Facts, _: &ResourceProperties) -> Result<Option<i32>> {
        Ok(Some(10))
    }

    fn new_provider(
        &self,
        logger: Logger,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<ProviderInstance> {
        Ok(ProviderInstance::Exec(Box::new(PosixExec { logger, runner })))
    }
}

pub struct PosixExec {
    logger: Logger,
    runner: Arc<dyn CommandRunner>,
}

impl Provider for PosixExec {
    fn name(&self) -> &str {
        NAME
    }
}

fn options(properties: &ExecProperties) -> Result<CommandOptions> {
    let mut words = argv::split(properties.command_line())?;
    let program = words.remove(0);

    let mut options = CommandOptions::new(program)
        .args(words)
        .timeout(properties.timeout_duration()?);
    options.environment = properties.environment.clone();
    options.cwd = properties.cwd.as_ref().map(PathBuf::from);
    options.path = properties.path.clone();
    Ok(options)
}

impl ExecProvider for PosixExec {
    fn status(&self, properties: &ExecProperties) -> Result<ResourceState<ExecMetadata>> {
        let creates_satisfied = properties
            .creates
            .as_deref()
            .is_some_and(|p| Path::new(p).exists());
        Ok(ResourceState::new(
            ENSURE_PRESENT,
            ExecMetadata {
                command: properties.command_line().to_string(),
                exit_code: None,
                creates_satisfied,
            },
        ))
    }

    fn execute(&self, properties: &ExecProperties, logger: &Logger) -> Result<i32> {
        let options = options(properties)?;
        self.logger.info(format_args!("Running: {}", options.display()));

        let output = self.runner.execute_with_options(&options)?;
        for line in output.stdout_str().lines() {
            if properties.log_output {
                logger.info(line);
            } else {
                logger.debug(line);
            }
        }

        match output.exit_code {
            Some(code) => {
                if code != 0 {
                    logger.debug(format_args!("stderr: {}", output.stderr_str().trim()));
                }
                Ok(code)
            }
            None => bail!("{} was terminated by a signal", options.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ProcessRunner;
    use declarative::testing::MockRunner;

    fn provider(runner: Arc<dyn CommandRunner>) -> PosixExec {
        PosixExec {
            logger: Logger::new("exec#test"),
            runner,
        }
    }

    #[test]
    fn test_options_from_properties() {
        let mut props = ExecProperties::new("deploy");
        props.command = Some("/usr/bin/env 'A B' \"c d\"".to_string());
        props.cwd = Some("/srv".to_string());
        props.path = Some("/usr/bin".to_string());
        props.timeout = Some("30s".to_string());
        props.environment.insert("MODE".to_string(), "prod".to_string());

        let options = options(&props).unwrap();
        assert_eq!(options.command, "/usr/bin/env");
        assert_eq!(options.args, vec!["A B", "c d"]);
        assert_eq!(options.cwd, Some(PathBuf::from("/srv")));
        assert_eq!(options.path.as_deref(), Some("/usr/bin"));
        assert_eq!(options.timeout, Some(std::time::Duration::from_secs(30)));
        assert_eq!(options.environment["MODE"], "prod");
    }

    #[test]
    fn test_execute_returns_exit_code() {
        let runner = Arc::new(MockRunner::new().respond("false", 1, ""));
        let exec = provider(runner.clone());
        let logger = Logger::new("exec#test");
        assert_eq!(exec.execute(&ExecProperties::new("false"), &logger).unwrap(), 1);
        assert_eq!(exec.execute(&ExecProperties::new("true"), &logger).unwrap(), 0);
        assert_eq!(runner.calls(), vec!["false", "true"]);
    }

    #[test]
    fn test_status_checks_creates() {
        let dir = tempfile::tempdir().unwrap();
        let exec = provider(Arc::new(MockRunner::new()));
        let mut props = ExecProperties::new("true");
        props.creates = Some(dir.path().join("done").display().to_string());
        assert!(!exec.status(&props).unwrap().metadata.creates_satisfied);

        std::fs::write(dir.path().join("done"), "").unwrap();
        assert!(exec.status(&props).unwrap().metadata.creates_satisfied);
    }

    #[test]
    fn test_real_process_without_shell() {
        let exec = provider(Arc::new(ProcessRunner::default()));
        let logger = Logger::new("exec#test");
        let props = ExecProperties::new("sh -c 'exit 4'");
        assert_eq!(exec.execute(&props, &logger).unwrap(), 4);

        // a pipe is just another argument
        let props = ExecProperties::new("echo a | false");
        assert_eq!(exec.execute(&props, &logger).unwrap(), 0);
    }

    #[test]
    fn test_malformed_command() {
        let exec = provider(Arc::new(MockRunner::new()));
        let props = ExecProperties::new("echo 'unterminated");
        assert!(exec.execute(&props, &Logger::new("exec#test")).is_err());
    }
}
