//! External collaborator contracts
//!
//! Code generation, sandbox execution, planning and slice-completion
//! notification are provided by services outside this crate. They are
//! consumed only through these traits.

use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use vslice_model::{Project, ProjectId, Slice, SliceContract};

/// A file to write into the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Workspace-relative path
    pub path: String,
    /// Full file content
    pub content: String,
}

impl FileSpec {
    /// Create a file spec
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Line count of the content
    #[inline]
    #[must_use]
    pub fn lines(&self) -> usize {
        self.content.lines().count()
    }
}

/// Output of code generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    /// Source files
    pub files: Vec<FileSpec>,
    /// Reasoning notes, reported as thoughts
    #[serde(default)]
    pub reasoning: Vec<String>,
}

/// Output of test generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedTests {
    /// Test files
    pub files: Vec<FileSpec>,
}

/// Failure diagnosis with a proposed fix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// What went wrong
    pub diagnosis: String,
    /// What the fix changes
    pub fix_description: String,
    /// Replacement files
    pub files: Vec<FileSpec>,
}

/// Result of a sandbox command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Process exit code
    pub exit_code: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output
    #[must_use]
    pub fn failed(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Exit code is zero
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Sandbox workspace handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Workspace(pub String);

impl Workspace {
    /// Workspace owned by a project
    #[must_use]
    pub fn for_project(project: ProjectId) -> Self {
        Self(format!("vslice-{project}"))
    }
}

impl std::fmt::Display for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Code generation service
#[async_trait]
pub trait CodeGenService: Send + Sync {
    /// Generate source files for a slice contract
    async fn generate_code(
        &self,
        contract: &SliceContract,
        context: &Value,
        previous_files: &[String],
    ) -> Result<GeneratedCode, CollaboratorError>;

    /// Generate tests for freshly generated files
    async fn generate_tests(
        &self,
        contract: &SliceContract,
        files: &[FileSpec],
        context: &Value,
    ) -> Result<GeneratedTests, CollaboratorError>;

    /// Diagnose a build or test failure and propose a fix
    async fn diagnose(
        &self,
        error_output: &str,
        current_files: &[FileSpec],
        slice_name: &str,
    ) -> Result<Diagnosis, CollaboratorError>;
}

/// Isolated execution environment
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    /// Write files into the workspace
    async fn write_files(
        &self,
        workspace: &Workspace,
        files: &[FileSpec],
    ) -> Result<(), CollaboratorError>;

    /// Run a shell command in the workspace
    async fn run_command(
        &self,
        workspace: &Workspace,
        command: &str,
    ) -> Result<CommandOutput, CollaboratorError>;

    /// Read a workspace file
    async fn read_file(&self, workspace: &Workspace, path: &str)
        -> Result<String, CollaboratorError>;

    /// Public URL of a port served from the workspace
    async fn preview_url(&self, workspace: &Workspace, port: u16)
        -> Result<String, CollaboratorError>;
}

/// Turns analysis results into a slice plan
#[async_trait]
pub trait PlanningService: Send + Sync {
    /// Plan slices for a project
    ///
    /// Slices are returned in plan order; dependencies must reference
    /// slices in the same plan.
    async fn plan(
        &self,
        project: &Project,
        stage_results: &BTreeMap<String, Value>,
    ) -> Result<Vec<Slice>, CollaboratorError>;
}

/// Notified after a slice reaches `complete`
#[async_trait]
pub trait SliceCompleteHook: Send + Sync {
    /// Called once per completed slice build
    async fn slice_completed(&self, slice: &Slice) -> Result<(), CollaboratorError>;
}

/// Hook that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

#[async_trait]
impl SliceCompleteHook for NoopHook {
    async fn slice_completed(&self, _slice: &Slice) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_output_combined() {
        assert_eq!(CommandOutput::ok("fine").combined(), "fine");
        assert_eq!(CommandOutput::failed(1, "", "boom").combined(), "boom");
        assert_eq!(CommandOutput::failed(1, "a", "b").combined(), "a\nb");
        assert!(!CommandOutput::failed(2, "", "").success());
    }

    #[test]
    fn file_spec_lines() {
        assert_eq!(FileSpec::new("a.ts", "one\ntwo\nthree\n").lines(), 3);
        assert_eq!(FileSpec::new("empty.ts", "").lines(), 0);
    }

    #[test]
    fn workspace_is_per_project() {
        let project = ProjectId::new();
        assert_eq!(Workspace::for_project(project).0, format!("vslice-{project}"));
    }
}
