//! Runs short Python snippets with a reduced set of builtins.
//!
//! The snippet is executed by a child interpreter whose globals only expose
//! `print`, `range`, `len`, `sum`, `min`, `max`, `abs` and `sorted`. This is
//! a convenience for demos, not an isolation boundary: the child runs with
//! the server's privileges and Python offers well-known ways out of a
//! restricted `exec`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::Tool;
use crate::config::SnippetConfig;

/// Reads the snippet from stdin, runs it with restricted builtins and
/// reports the outcome as a single JSON object on the real stdout.
const PRELUDE: &str = r#"
import contextlib, io, json, sys
code = sys.stdin.read()
buffer = io.StringIO()
allowed = {"print": print, "range": range, "len": len, "sum": sum,
           "min": min, "max": max, "abs": abs, "sorted": sorted}
try:
    with contextlib.redirect_stdout(buffer):
        exec(code, {"__builtins__": allowed})
    outcome = {"success": True, "output": buffer.getvalue()}
except Exception as exc:
    outcome = {"success": False, "error": str(exc)}
sys.__stdout__.write(json.dumps(outcome))
"#;

#[derive(Debug, Error)]
enum SnippetError {
    #[error("failed to start interpreter '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        source: std::io::Error,
    },

    #[error("failed to talk to interpreter: {0}")]
    Io(#[from] std::io::Error),

    #[error("snippet timed out after {0}s")]
    Timeout(u64),

    #[error("interpreter exited without a result: {0}")]
    NoOutcome(String),
}

#[derive(Debug, Deserialize)]
struct Outcome {
    success: bool,
    #[serde(default)]
    output: String,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnippetResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SnippetResult {
    fn output(captured: &str) -> Self {
        let trimmed = captured.trim();
        Self {
            success: true,
            output: Some(if trimmed.is_empty() {
                "(no output)".to_string()
            } else {
                trimmed.to_string()
            }),
            error: None,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(message.into()),
        }
    }
}

pub struct SnippetRunner {
    interpreter: String,
    timeout: Duration,
}

impl SnippetRunner {
    pub fn new(config: &SnippetConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn execute(&self, code: &str) -> std::result::Result<Outcome, SnippetError> {
        let mut child = Command::new(&self.interpreter)
            .arg("-I")
            .arg("-c")
            .arg(PRELUDE)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SnippetError::Spawn {
                interpreter: self.interpreter.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(code.as_bytes()).await?;
            // Dropping stdin closes the pipe so the prelude's read() returns.
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| SnippetError::Timeout(self.timeout.as_secs()))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(stdout.trim()).map_err(|_| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.trim().lines().last().unwrap_or("no output").to_string();
            SnippetError::NoOutcome(reason)
        })
    }
}

#[async_trait::async_trait]
impl Tool for SnippetRunner {
    /// Python source to execute.
    type Input = String;
    type Output = SnippetResult;

    fn name(&self) -> &str {
        "python_exec"
    }

    async fn run(&self, code: String) -> Result<SnippetResult> {
        log::info!("SnippetRunner: executing {} byte snippet", code.len());

        let result = match self.execute(&code).await {
            Ok(outcome) if outcome.success => SnippetResult::output(&outcome.output),
            Ok(outcome) => SnippetResult::failure(outcome.error),
            Err(e) => {
                log::error!("SnippetRunner: {}", e);
                SnippetResult::failure(e.to_string())
            }
        };

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn runner() -> SnippetRunner {
        SnippetRunner::new(&SnippetConfig {
            interpreter: "python3".to_string(),
            timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn test_captures_printed_output() {
        if !python_available() {
            return;
        }
        let result = runner()
            .run("print(sum(range(5)))\nprint(sorted([3, 1, 2]))\n".to_string())
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(result).unwrap(),
            json!({"success": true, "output": "10\n[1, 2, 3]"})
        );
    }

    #[tokio::test]
    async fn test_no_output_placeholder() {
        if !python_available() {
            return;
        }
        let result = runner().run("x = max(1, 2)".to_string()).await.unwrap();
        assert_eq!(result.output.as_deref(), Some("(no output)"));
    }

    #[tokio::test]
    async fn test_disallowed_builtin_fails() {
        if !python_available() {
            return;
        }
        let result = runner()
            .run("open('/etc/passwd').read()".to_string())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("name 'open' is not defined"));
    }

    #[tokio::test]
    async fn test_import_is_blocked() {
        if !python_available() {
            return;
        }
        let result = runner().run("import os".to_string()).await.unwrap();
        assert!(!result.success);
        assert!(result.output.is_none());
    }

    #[tokio::test]
    async fn test_runaway_snippet_times_out() {
        if !python_available() {
            return;
        }
        let runner = SnippetRunner::new(&SnippetConfig {
            interpreter: "python3".to_string(),
            timeout_secs: 1,
        });
        let result = runner.run("while True:\n    pass\n".to_string()).await.unwrap();
        assert_eq!(result, SnippetResult::failure("snippet timed out after 1s"));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let runner = SnippetRunner::new(&SnippetConfig {
            interpreter: "definitely-not-a-python-binary".to_string(),
            timeout_secs: 1,
        });
        let result = runner.run("print(1)".to_string()).await.unwrap();
        assert!(!result.success);
        assert!(result
            .error
            .unwrap()
            .starts_with("failed to start interpreter 'definitely-not-a-python-binary'"));
    }

    #[test]
    fn test_output_is_trimmed() {
        assert_eq!(
            SnippetResult::output("  hi\n\n").output.as_deref(),
            Some("hi")
        );
    }
}
