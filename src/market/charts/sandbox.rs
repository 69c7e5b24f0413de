// SPDX-License-Identifier: MIT

//! Out-of-process execution of chart scripts

use super::policy::ScriptPolicy;
use super::ChartRenderer;
use crate::adk::error::SandboxError;
use crate::market::config::SandboxConfig;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const SCRIPT_NAME: &str = "chart_script.py";

/// Forces a non-interactive backend before the generated code runs
const PREAMBLE: &str = "import matplotlib\nmatplotlib.use(\"Agg\")\n";

/// Runs chart scripts in an isolated Python interpreter
///
/// The interpreter starts in isolated mode (`-I`) with a scrubbed
/// environment, its working directory set to the run's output directory,
/// and is killed once `timeout` elapses.
pub struct PythonSandbox {
    interpreter: String,
    timeout: Duration,
    policy: ScriptPolicy,
}

impl PythonSandbox {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
            policy: ScriptPolicy::default(),
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(
            config.interpreter.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_policy(mut self, policy: ScriptPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn io_error(&self, source: std::io::Error) -> SandboxError {
        SandboxError::Spawn {
            interpreter: self.interpreter.clone(),
            source,
        }
    }

    /// `out_dir` must be absolute; the script is passed relative to it
    async fn execute(&self, out_dir: &Path) -> Result<(), SandboxError> {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-I")
            .arg(SCRIPT_NAME)
            .current_dir(out_dir)
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("MPLBACKEND", "Agg")
            .env("MPLCONFIGDIR", out_dir.join(".mplconfig"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| self.io_error(e))?;

        // Dropping the wait future on timeout kills the child
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| self.io_error(e))?,
            Err(_) => {
                return Err(SandboxError::Timeout {
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SandboxError::ScriptFailed {
                status: output.status.to_string(),
                stderr: stderr.trim().chars().take(2000).collect(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            log::debug!("Chart script output: {}", stdout.trim());
        }
        Ok(())
    }
}

#[async_trait]
impl ChartRenderer for PythonSandbox {
    async fn render(&self, script: &str, out_dir: &Path) -> Result<(), SandboxError> {
        self.policy.check(script)?;

        // The child runs inside out_dir, so relative paths would resolve twice
        let out_dir = tokio::fs::canonicalize(out_dir)
            .await
            .map_err(|e| self.io_error(e))?;
        let script_path = out_dir.join(SCRIPT_NAME);
        tokio::fs::write(&script_path, format!("{}{}\n", PREAMBLE, script))
            .await
            .map_err(|e| self.io_error(e))?;

        let result = self.execute(&out_dir).await;

        if let Err(e) = tokio::fs::remove_file(&script_path).await {
            log::debug!("Could not remove {}: {}", script_path.display(), e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_policy_violation_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = PythonSandbox::new("definitely-not-a-python", Duration::from_secs(1));

        let err = sandbox
            .render("import os\nos.system('ls')", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::PolicyViolation(_)));
        assert!(!dir.path().join(SCRIPT_NAME).exists());
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = PythonSandbox::new("definitely-not-a-python", Duration::from_secs(1));

        let err = sandbox
            .render("import matplotlib.pyplot as plt", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { .. }));
        // The staged script is cleaned up even on failure
        assert!(!dir.path().join(SCRIPT_NAME).exists());
    }

    /// Stand-in interpreter: fails unless its script argument resolves from
    /// its working directory, otherwise drops a chart there
    #[cfg(unix)]
    fn fake_interpreter(dir: &Path) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-python");
        std::fs::write(
            &path,
            "#!/bin/sh\n[ -f \"$2\" ] || { echo \"can't open file '$2'\" >&2; exit 2; }\ntouch chart_1.png\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_renders_into_absolute_dir() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let sandbox = PythonSandbox::new(
            fake_interpreter(bin.path()).to_string_lossy(),
            Duration::from_secs(10),
        );

        sandbox
            .render("import matplotlib.pyplot as plt", out.path())
            .await
            .unwrap();
        assert!(out.path().join("chart_1.png").exists());
        assert!(!out.path().join(SCRIPT_NAME).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_renders_into_relative_dir() {
        let bin = tempfile::tempdir().unwrap();
        let parent = tempfile::tempdir_in(".").unwrap();
        let name = parent.path().file_name().unwrap().to_owned();
        let relative = Path::new(&name).join("run");
        std::fs::create_dir_all(&relative).unwrap();
        assert!(relative.is_relative());

        let sandbox = PythonSandbox::new(
            fake_interpreter(bin.path()).to_string_lossy(),
            Duration::from_secs(10),
        );
        sandbox
            .render("import matplotlib.pyplot as plt", &relative)
            .await
            .unwrap();
        assert!(relative.join("chart_1.png").exists());
    }
}
