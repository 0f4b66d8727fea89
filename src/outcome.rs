//! Test verdicts and toolchain failures
//!
//! Every test case ends in exactly one [`TestOutcome`]. A toolchain failure is kept distinct from a
//! genuine test failure so that a broken environment is never reported as a hardware bug.

use std::fmt;

use thiserror::Error;

/// External step a [`ToolchainError`] originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolchainStage {
    /// Assembling/compiling the test source into an object.
    Compile,
    /// Linking the object into an executable image.
    Link,
    /// Stripping the image down to a flat binary.
    Extract,
    /// Writing the hex text for the harness.
    Encode,
    /// Starting the harness process itself.
    Launch,
}

impl ToolchainStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolchainStage::Compile => "compile",
            ToolchainStage::Link => "link",
            ToolchainStage::Extract => "extract",
            ToolchainStage::Encode => "encode",
            ToolchainStage::Launch => "launch",
        }
    }
}

impl fmt::Display for ToolchainStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An external tool could not be started or exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} step failed")]
pub struct ToolchainError {
    pub stage: ToolchainStage,
    /// Captured tool output or the launch failure message, shown verbatim to the user.
    pub diagnostic: String,
}

impl ToolchainError {
    pub fn new(stage: ToolchainStage, diagnostic: impl Into<String>) -> Self {
        Self {
            stage,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Output captured from a harness process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for CapturedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "stdout:")?;
        writeln!(f, "{}", self.stdout.trim_end())?;
        writeln!(f, "stderr:")?;
        write!(f, "{}", self.stderr.trim_end())
    }
}

/// Terminal verdict for one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    /// The harness completed without the expected pass indication.
    Failed(CapturedOutput),
    /// The harness exceeded its wall-clock budget and was killed.
    TimedOut(CapturedOutput),
    ToolchainError(ToolchainError),
}

/// Outcome category used for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Passed,
    Failed,
    TimedOut,
    Errored,
}

impl TestOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            TestOutcome::Passed => OutcomeKind::Passed,
            TestOutcome::Failed(_) => OutcomeKind::Failed,
            TestOutcome::TimedOut(_) => OutcomeKind::TimedOut,
            TestOutcome::ToolchainError(_) => OutcomeKind::Errored,
        }
    }

    /// The verdict word printed after the test name.
    pub fn verdict(&self) -> &'static str {
        match self {
            TestOutcome::Passed => "Passed",
            TestOutcome::TimedOut(_) => "Failed (timeout)",
            TestOutcome::Failed(_) | TestOutcome::ToolchainError(_) => "Failed",
        }
    }
}

impl From<ToolchainError> for TestOutcome {
    fn from(err: ToolchainError) -> Self {
        TestOutcome::ToolchainError(err)
    }
}
