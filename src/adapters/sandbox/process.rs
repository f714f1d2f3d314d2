//! Sandbox executor that runs a local test command in a scratch directory.
//!
//! The implementation and tests are written to a fresh temporary directory
//! and the configured command (by default `python -m pytest -q`) runs there.
//! Counts come from the runner's summary line; pytest and `cargo test`
//! formats are understood.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Node, SandboxConfig, SandboxResult};
use crate::domain::ports::SandboxExecutor;

/// Pass/fail/error counts parsed from runner output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestCounts {
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
}

/// Parse a pytest terminal summary such as
/// `=== 2 failed, 3 passed, 1 error in 0.12s ===`.
fn parse_pytest_summary(line: &str) -> Option<TestCounts> {
    let trimmed = line.trim().trim_matches('=').trim();
    let (counts_part, _) = trimmed.rsplit_once(" in ")?;

    let mut counts = TestCounts::default();
    let mut recognized = false;
    for part in counts_part.split(',') {
        let mut words = part.split_whitespace();
        let (Some(n), Some(kind)) = (words.next(), words.next()) else {
            continue;
        };
        let Ok(n) = n.parse::<u32>() else {
            continue;
        };
        match kind {
            "passed" => counts.passed = n,
            "failed" => counts.failed = n,
            "error" | "errors" => counts.errors = n,
            _ => continue,
        }
        recognized = true;
    }
    recognized.then_some(counts)
}

/// Extract a numeric count preceding a keyword from a `cargo test` summary,
/// e.g. 10 from `10 passed; 0 failed` for `passed`.
fn extract_count(line: &str, keyword: &str) -> Option<u32> {
    line.split(';')
        .map(str::trim)
        .filter(|part| part.contains(keyword))
        .find_map(|part| part.split_whitespace().find_map(|w| w.parse::<u32>().ok()))
}

/// Parse runner output. The last summary line wins.
pub fn parse_test_output(stdout: &str, stderr: &str) -> Option<TestCounts> {
    let combined = format!("{stdout}\n{stderr}");
    let mut found = None;

    for line in combined.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("test result:") {
            found = Some(TestCounts {
                passed: extract_count(rest, "passed").unwrap_or(0),
                failed: extract_count(rest, "failed").unwrap_or(0),
                errors: 0,
            });
        } else if let Some(counts) = parse_pytest_summary(trimmed) {
            found = Some(counts);
        }
    }
    found
}

/// Runs generated tests with a configured local command.
pub struct ProcessSandbox {
    config: SandboxConfig,
}

impl ProcessSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    fn write_artifacts(&self, dir: &TempDir, implementation: &str, test_code: &str) -> DomainResult<()> {
        std::fs::write(dir.path().join(&self.config.implementation_file), implementation)?;
        std::fs::write(dir.path().join(&self.config.test_file), test_code)?;
        Ok(())
    }
}

#[async_trait]
impl SandboxExecutor for ProcessSandbox {
    async fn execute(
        &self,
        implementation: &str,
        test_code: &str,
        node: &Node,
    ) -> DomainResult<SandboxResult> {
        let dir = TempDir::new()?;
        self.write_artifacts(&dir, implementation, test_code)?;

        debug!(
            node_id = %node.id,
            program = %self.config.program,
            dir = %dir.path().display(),
            "running sandbox command"
        );

        let started = Instant::now();
        let child = Command::new(&self.config.program)
            .args(&self.config.args)
            .current_dir(dir.path())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), child)
            .await
            .map_err(|_| {
                DomainError::Execution(format!(
                    "test command timed out after {}s",
                    self.config.timeout_secs
                ))
            })?
            .map_err(|e| {
                DomainError::Execution(format!(
                    "failed to spawn {}: {e}",
                    self.config.program
                ))
            })?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let counts = match parse_test_output(&stdout, &stderr) {
            Some(counts) => counts,
            // No summary: a failing exit is an error, a clean exit ran nothing.
            None if output.status.success() => TestCounts::default(),
            None => TestCounts {
                errors: 1,
                ..TestCounts::default()
            },
        };

        info!(
            node_id = %node.id,
            passed = counts.passed,
            failed = counts.failed,
            errors = counts.errors,
            exit = ?output.status.code(),
            duration_ms,
            "sandbox run complete"
        );

        Ok(SandboxResult {
            passed: counts.passed,
            failed: counts.failed,
            errors: counts.errors,
            stdout,
            stderr,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pytest_mixed_summary() {
        let stdout = "F..E\n=== 1 failed, 2 passed, 1 error in 0.12s ===\n";
        assert_eq!(
            parse_test_output(stdout, ""),
            Some(TestCounts { passed: 2, failed: 1, errors: 1 })
        );
    }

    #[test]
    fn parse_pytest_quiet_summary() {
        assert_eq!(
            parse_test_output("...\n3 passed in 0.01s\n", ""),
            Some(TestCounts { passed: 3, failed: 0, errors: 0 })
        );
    }

    #[test]
    fn parse_cargo_summary() {
        let stdout = r#"
running 3 tests
test tests::test_a ... ok
test tests::test_b ... FAILED
test tests::test_c ... ok

test result: FAILED. 2 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out
"#;
        assert_eq!(
            parse_test_output(stdout, ""),
            Some(TestCounts { passed: 2, failed: 1, errors: 0 })
        );
    }

    #[test]
    fn parse_output_without_summary() {
        assert_eq!(parse_test_output("ModuleNotFoundError: foo", ""), None);
        assert_eq!(parse_test_output("", ""), None);
    }

    fn shell_sandbox(script: &str, timeout_secs: u64) -> ProcessSandbox {
        ProcessSandbox::new(SandboxConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_secs,
            ..SandboxConfig::default()
        })
    }

    #[tokio::test]
    async fn execute_writes_files_and_parses_counts() {
        let sandbox = shell_sandbox(
            "test -f implementation.py && grep -q assert test_implementation.py && echo '2 passed in 0.01s'",
            10,
        );
        let result = sandbox
            .execute("def f(): return 1", "def test_f(): assert f() == 1", &Node::function("f", "f"))
            .await
            .unwrap();
        assert!(result.all_passed());
        assert_eq!(result.passed, 2);
    }

    #[tokio::test]
    async fn execute_nonzero_exit_without_summary_is_error() {
        let sandbox = shell_sandbox("echo boom >&2; exit 3", 10);
        let result = sandbox.execute("", "", &Node::function("f", "f")).await.unwrap();
        assert_eq!(result.errors, 1);
        assert!(result.stderr.contains("boom"));
        assert!(!result.all_passed());
    }

    #[tokio::test]
    async fn execute_times_out() {
        let sandbox = shell_sandbox("sleep 5", 1);
        let err = sandbox.execute("", "", &Node::function("f", "f")).await.unwrap_err();
        assert!(matches!(err, DomainError::Execution(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn execute_missing_program() {
        let sandbox = ProcessSandbox::new(SandboxConfig {
            program: "definitely-not-a-real-binary-xyz".to_string(),
            ..SandboxConfig::default()
        });
        let err = sandbox.execute("", "", &Node::function("f", "f")).await.unwrap_err();
        assert!(matches!(err, DomainError::Execution(msg) if msg.contains("failed to spawn")));
    }
}
