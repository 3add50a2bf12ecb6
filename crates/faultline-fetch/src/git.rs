use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use faultline_config::FetchConfig;
use tokio::process::Command;
use tokio::time::timeout;

use crate::FetchError;
use crate::error::classify_git_failure;

/// Runs the git CLI with a per-command timeout. The child is killed when the
/// future is dropped, so cancelling a catastrophe never leaves fetches behind.
#[derive(Debug, Clone)]
pub struct GitRunner {
    binary: String,
    timeout: Duration,
}

impl GitRunner {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            config.git_binary.clone(),
            Duration::from_secs(config.command_timeout_secs.max(1)),
        )
    }

    pub async fn run(&self, dir: Option<&Path>, args: &[&str]) -> Result<Vec<u8>, FetchError> {
        let mut command = Command::new(&self.binary);
        if let Some(dir) = dir {
            command.arg("-C").arg(dir);
        }
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GCM_INTERACTIVE", "never")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(args = ?args, "running git");
        let output = match timeout(self.timeout, command.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(FetchError::Transient(format!(
                    "git {} timed out after {}s",
                    subcommand(args),
                    self.timeout.as_secs()
                )));
            }
        };

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(
                args = ?args,
                status = %output.status,
                stderr = %stderr.trim(),
                "git failed"
            );
            Err(classify_git_failure(&stderr))
        }
    }

    pub async fn run_text(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, FetchError> {
        let stdout = self.run(dir, args).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

fn subcommand<'a>(args: &[&'a str]) -> &'a str {
    args.iter()
        .copied()
        .find(|arg| !arg.starts_with('-'))
        .unwrap_or("command")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommand_skips_leading_flags() {
        assert_eq!(subcommand(&["--no-pager", "fetch", "origin"]), "fetch");
        assert_eq!(subcommand(&["--version"]), "command");
    }

    #[tokio::test]
    async fn missing_binary_is_an_io_error() {
        let runner = GitRunner::new("faultline-no-such-git", Duration::from_secs(5));
        let err = runner
            .run(None, &["--version"])
            .await
            .expect_err("binary does not exist");
        assert!(matches!(err, FetchError::Io(_)), "{err:?}");
    }
}
