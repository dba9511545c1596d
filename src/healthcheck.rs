//! Nagios-style health checks
//!
//! A check is a command whose exit code is the verdict: 0 OK, 1 WARNING,
//! 2 CRITICAL, anything else UNKNOWN. It is retried up to `tries` times,
//! sleeping `try_sleep` in between, until it reports OK.

use anyhow::Result;
use declarative::{
    CommandOptions, CommandRunner, HealthCheck, HealthCheckExecutor, HealthCheckResult,
    HealthStatus, parse_duration,
};
use std::thread;

use crate::argv;

/// Runs health check commands through the resource's runner
#[derive(Debug, Default, Clone, Copy)]
pub struct NagiosChecker;

impl HealthCheckExecutor for NagiosChecker {
    fn execute(
        &self,
        resource_type: &str,
        resource_name: &str,
        check: &HealthCheck,
        runner: &dyn CommandRunner,
    ) -> Result<HealthCheckResult> {
        let mut words = argv::split(&check.command)?;
        let program = words.remove(0);
        let timeout = check.timeout.as_deref().map(parse_duration).transpose()?;
        let sleep = check.try_sleep.as_deref().map(parse_duration).transpose()?;
        let options = CommandOptions::new(program).args(words).timeout(timeout);

        let tries = check.tries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (status, output) = match runner.execute_with_options(&options) {
                Ok(out) => (
                    HealthStatus::from_exit_code(out.exit_code),
                    out.stdout_str().trim().to_string(),
                ),
                Err(e) => (HealthStatus::Unknown, format!("{e:#}")),
            };

            log::debug!(
                "{resource_type}#{resource_name}: health check {} attempt {attempt}/{tries}: {status}",
                check.display_name()
            );

            if status.is_ok() || attempt >= tries {
                return Ok(HealthCheckResult {
                    name: check.display_name().to_string(),
                    status,
                    tries: attempt,
                    output,
                });
            }
            if let Some(sleep) = sleep {
                thread::sleep(sleep);
            }
        }
    }
}
