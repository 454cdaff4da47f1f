//! External command execution

use multiserver_common::config::CommandConfig;
use multiserver_common::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Runs external commands with optional `sudo` and a timeout
#[derive(Debug, Clone)]
pub struct CommandRunner {
    sudo: Option<String>,
    timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new(sudo: Option<String>, timeout: Option<Duration>) -> Self {
        Self { sudo, timeout }
    }

    pub fn from_config(config: &CommandConfig) -> Self {
        let sudo = config.use_sudo.then(|| config.sudo.clone());
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        Self::new(sudo, timeout)
    }

    /// Run a command as the current user
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        self.execute(None, program, args).await.map(|_| ())
    }

    /// Run a command as the current user and return its trimmed stdout
    pub async fn read(&self, program: &str, args: &[&str]) -> Result<String> {
        self.execute(None, program, args).await
    }

    /// Run a command through `sudo` when configured
    pub async fn run_privileged(&self, program: &str, args: &[&str]) -> Result<()> {
        self.execute(self.sudo.as_deref(), program, args)
            .await
            .map(|_| ())
    }

    async fn execute(&self, prefix: Option<&str>, program: &str, args: &[&str]) -> Result<String> {
        let mut argv: Vec<&str> = Vec::with_capacity(args.len() + 2);
        if let Some(prefix) = prefix {
            argv.push(prefix);
        }
        argv.push(program);
        argv.extend_from_slice(args);
        let command_line = argv.join(" ");

        debug!("Running: {}", command_line);

        let mut command = Command::new(argv[0]);
        command
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(output) => output?,
                Err(_) => {
                    return Err(Error::Timeout {
                        command: command_line,
                        seconds: limit.as_secs(),
                    })
                }
            },
            None => command.output().await?,
        };

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: command_line,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!("Finished: {}", command_line);
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
