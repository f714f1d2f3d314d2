//! Ephemeral records produced inside a single TDD loop invocation.
//!
//! None of these are persisted; they exist for logging and reporting.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::graph::NodeId;

/// Outcome of running generated tests against an implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxResult {
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl SandboxResult {
    /// At least one test passed and nothing failed or errored.
    pub const fn all_passed(&self) -> bool {
        self.passed > 0 && self.failed == 0 && self.errors == 0
    }

    /// Synthetic failing result for an executor that could not run at all.
    pub fn infrastructure_failure(message: impl Into<String>) -> Self {
        Self {
            errors: 1,
            stderr: message.into(),
            ..Self::default()
        }
    }

    /// Combined output handed to the diagnoser.
    pub fn error_output(&self) -> String {
        let mut out = format!(
            "passed={} failed={} errors={}\n",
            self.passed, self.failed, self.errors
        );
        if !self.stdout.trim().is_empty() {
            out.push_str("--- stdout ---\n");
            out.push_str(self.stdout.trim_end());
            out.push('\n');
        }
        if !self.stderr.trim().is_empty() {
            out.push_str("--- stderr ---\n");
            out.push_str(self.stderr.trim_end());
            out.push('\n');
        }
        out
    }
}

/// Which artifact a diagnosis blames for a failing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClassification {
    ImplementationBug,
    TestBug,
    Environment,
}

impl FailureClassification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImplementationBug => "implementation_bug",
            Self::TestBug => "test_bug",
            Self::Environment => "environment",
        }
    }

    /// Parse the wire name; unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "implementation_bug" => Some(Self::ImplementationBug),
            "test_bug" => Some(Self::TestBug),
            "environment" => Some(Self::Environment),
            _ => None,
        }
    }
}

impl fmt::Display for FailureClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A diagnosis of a failing execution plus the proposed fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub classification: FailureClassification,
    pub fixed_implementation: Option<String>,
    pub fixed_test_code: Option<String>,
    pub explanation: String,
}

/// Implementation of an upstream node made available to generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCode {
    pub node_id: NodeId,
    pub name: String,
    pub signature: Option<String>,
    pub implementation: String,
}

/// Context handed to the generation collaborators for one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationContext {
    /// Already-generated ancestors, in processing order.
    pub dependencies: Vec<DependencyCode>,
}

impl GenerationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dependency(mut self, dependency: DependencyCode) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Render the dependencies as a prompt section.
    pub fn render(&self) -> String {
        if self.dependencies.is_empty() {
            return String::from("(no upstream implementations)");
        }
        self.dependencies
            .iter()
            .map(|d| format!("# {} ({})\n{}", d.name, d.node_id, d.implementation.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_passed_requires_a_pass() {
        assert!(!SandboxResult::default().all_passed());
        let ok = SandboxResult {
            passed: 3,
            ..SandboxResult::default()
        };
        assert!(ok.all_passed());
        let errored = SandboxResult {
            passed: 3,
            errors: 1,
            ..SandboxResult::default()
        };
        assert!(!errored.all_passed());
    }

    #[test]
    fn test_infrastructure_failure_is_failing() {
        let result = SandboxResult::infrastructure_failure("docker not running");
        assert!(!result.all_passed());
        assert!(result.error_output().contains("docker not running"));
    }

    #[test]
    fn test_classification_parse() {
        assert_eq!(
            FailureClassification::parse(" Test_Bug "),
            Some(FailureClassification::TestBug)
        );
        assert_eq!(FailureClassification::parse("flaky"), None);
        assert_eq!(FailureClassification::Environment.to_string(), "environment");
    }

    #[test]
    fn test_context_render() {
        assert!(GenerationContext::new().render().contains("no upstream"));
        let ctx = GenerationContext::new().with_dependency(DependencyCode {
            node_id: NodeId::from("f1"),
            name: "tokenize".into(),
            signature: None,
            implementation: "def tokenize(s):\n    return s.split()\n".into(),
        });
        let rendered = ctx.render();
        assert!(rendered.starts_with("# tokenize (f1)"));
        assert!(rendered.contains("return s.split()"));
    }
}
