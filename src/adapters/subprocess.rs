//! Subprocess model backend.
//!
//! Runs a local model CLI, piping the prompt to stdin and collecting
//! the completion from stdout. Carries its own deadline so a wedged
//! child cannot outlive the stage that spawned it.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::{BackendError, ModelBackend};

/// Model backend over a local CLI binary.
pub struct SubprocessModelBackend {
    binary_path: String,
    args: Vec<String>,
    deadline: Duration,
}

impl SubprocessModelBackend {
    pub fn new(binary_path: impl Into<String>, deadline: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            deadline,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    async fn run_once(&self, prompt: &str) -> Result<String, BackendError> {
        let mut child = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BackendError::Process(format!(
                    "failed to spawn '{}': {}",
                    self.binary_path, e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| BackendError::Process(format!("failed to write prompt: {}", e)))?;
            // Drop stdin to signal EOF
        }

        let output = timeout(self.deadline, child.wait_with_output())
            .await
            .map_err(|_| {
                BackendError::Unavailable(format!(
                    "model process '{}' exceeded {:?}",
                    self.binary_path, self.deadline
                ))
            })?
            .map_err(|e| BackendError::Process(format!("failed to wait for model process: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            return Err(BackendError::Process(format!(
                "model process exited with code {}: {}",
                exit_code,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map(|s| s.trim_end().to_string())
            .map_err(|_| BackendError::Malformed("model output is not valid UTF-8".to_string()))
    }
}

#[async_trait]
impl ModelBackend for SubprocessModelBackend {
    fn name(&self) -> &str {
        "subprocess-model"
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.run_once(prompt).await
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let output = Command::new(&self.binary_path)
            .arg("--help")
            .output()
            .await
            .map_err(|e| {
                BackendError::Unavailable(format!(
                    "model binary '{}' not runnable: {}",
                    self.binary_path, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Unavailable(format!(
                "model binary health check failed: {}",
                stderr.trim()
            )));
        }

        Ok(())
    }
}
