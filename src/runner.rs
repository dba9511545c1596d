//! Process command runner
//!
//! Runs commands directly (no shell) with captured output. A timeout kills
//! the child and is reported as an error.

use anyhow::{Context, Result, bail};
use declarative::{CommandOptions, CommandOutput, CommandRunner};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs commands as child processes of the agent
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Applied when a command has no timeout of its own
    default_timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }

    fn command(options: &CommandOptions) -> Command {
        let mut cmd = Command::new(&options.command);
        cmd.args(&options.args)
            .envs(&options.environment)
            .stdin(Stdio::null());
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(path) = &options.path {
            cmd.env("PATH", path);
        }
        cmd
    }
}

impl CommandRunner for ProcessRunner {
    fn execute_with_options(&self, options: &CommandOptions) -> Result<CommandOutput> {
        log::debug!("Running: {}", options.display());
        let mut cmd = Self::command(options);

        let Some(timeout) = options.timeout.or(self.default_timeout) else {
            let output = cmd
                .output()
                .with_context(|| format!("Failed to execute: {}", options.display()))?;
            return Ok(output.into());
        };

        let child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to execute: {}", options.display()))?;
        wait_with_timeout(child, timeout)
            .with_context(|| format!("Failed to execute: {}", options.display()))
    }
}

fn drain(mut pipe: impl Read + Send + 'static) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        // a read error just truncates the captured output
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<CommandOutput> {
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);
    let deadline = Instant::now() + timeout;

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            bail!("timed out after {}s", timeout.as_secs_f64());
        }
        thread::sleep(POLL_INTERVAL);
    };

    let collect = |handle: Option<thread::JoinHandle<Vec<u8>>>| {
        handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    };

    Ok(CommandOutput {
        stdout: collect(stdout),
        stderr: collect(stderr),
        exit_code: status.code(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_output_and_exit_code() {
        let runner = ProcessRunner::default();
        let output = runner.execute("sh", &["-c", "echo out; echo err >&2; exit 3"]).unwrap();
        assert_eq!(output.stdout_str(), "out\n");
        assert_eq!(output.stderr_str(), "err\n");
        assert_eq!(output.exit_code, Some(3));
    }

    #[test]
    fn test_environment_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = CommandOptions::new("sh")
            .args(["-c", "echo $GREETING; pwd"])
            .env("GREETING", "hello");
        options.cwd = Some(dir.path().to_path_buf());

        let output = ProcessRunner::default().execute_with_options(&options).unwrap();
        let stdout = output.stdout_str();
        let mut lines = stdout.lines();
        assert_eq!(lines.next(), Some("hello"));
        let cwd = std::path::PathBuf::from(lines.next().unwrap());
        assert_eq!(cwd.canonicalize().unwrap(), dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_timeout_kills_child() {
        let options = CommandOptions::new("sleep")
            .args(["5"])
            .timeout(Some(Duration::from_millis(100)));
        let started = Instant::now();
        let err = ProcessRunner::default()
            .execute_with_options(&options)
            .unwrap_err();
        assert!(format!("{err:#}").contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_completes_within_timeout() {
        let runner = ProcessRunner::new(Some(Duration::from_secs(5)));
        let output = runner.execute("echo", &["done"]).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout_str(), "done\n");
    }

    #[test]
    fn test_missing_binary_is_error() {
        let err = ProcessRunner::default()
            .execute("converge-no-such-binary", &[])
            .unwrap_err();
        assert!(err.to_string().contains("Failed to execute"));
    }
}
