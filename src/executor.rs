//! Test-set executor
//!
//! Drives requested sets end to end: builds each set's native project once, then for every test in
//! catalog order builds the artifact (ISA sets), runs the harness, and records exactly one outcome.
//!
//! A failing test never stops its set; only run-level environment problems (unknown set, native
//! build failure, unusable scratch area) abort the run with a [`RunError`].

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use miette::Diagnostic;
use rvconform_core::catalog::{TestFamily, TestSetInfo};
use thiserror::Error;

use crate::catalog::{CatalogError, TestCase, TestCatalog};
use crate::config::RunConfig;
use crate::harness::{Harness, HarnessRequest, PassCriterion};
use crate::outcome::{OutcomeKind, TestOutcome};
use crate::pipeline::{ArtifactBuilder, ScratchDir};
use crate::report::TestReporter;
use crate::toolchain::ToolInvocation;

/// Plusarg through which the simulation harness receives its ROM image path.
pub const ROM_PLUSARG: &str = "+ROM_PATH=";

/// Run-level failures. Any of these aborts the whole run.
#[derive(Debug, Error, Diagnostic)]
pub enum RunError {
    #[error("{0}")]
    #[diagnostic(code(rvconform::unknown_set), help("run `rvconform list` to see the registered test sets"))]
    Catalog(#[from] CatalogError),

    #[error("native build of `{project}` failed during {step}\n{diagnostic}")]
    #[diagnostic(
        code(rvconform::native_build),
        help("the harness executables could not be built, so no test in this set can run")
    )]
    NativeBuild {
        project: String,
        step: &'static str,
        diagnostic: String,
    },

    #[error("could not prepare scratch directory {}", .path.display())]
    #[diagnostic(code(rvconform::scratch), help("check that the build directory is writable"))]
    Scratch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not start the harness runtime")]
    #[diagnostic(code(rvconform::runtime))]
    Runtime(#[source] io::Error),

    #[error("could not write the report")]
    #[diagnostic(code(rvconform::report))]
    Report(#[from] io::Error),
}

/// Builds a native (CMake) project that provides harness executables.
pub trait NativeProjectBuilder {
    fn build_project(&self, config: &RunConfig, project: &str) -> Result<(), RunError>;
}

/// `cmake -GNinja` configure followed by `cmake --build`.
#[derive(Debug, Clone, Default)]
pub struct CmakeBuilder;

impl NativeProjectBuilder for CmakeBuilder {
    fn build_project(&self, config: &RunConfig, project: &str) -> Result<(), RunError> {
        let source_dir = config.native_source_dir(project);
        let build_dir = config.native_build_dir(project);
        let generator = &config.toolchain.build_generator;

        let configure = ToolInvocation::new(generator)
            .arg("-GNinja")
            .arg("-S")
            .arg(&source_dir)
            .arg("-B")
            .arg(&build_dir);
        run_native_step(project, "configure", &configure)?;

        let build = ToolInvocation::new(generator).arg("--build").arg(&build_dir);
        run_native_step(project, "build", &build)
    }
}

fn run_native_step(project: &str, step: &'static str, invocation: &ToolInvocation) -> Result<(), RunError> {
    let failure = |diagnostic: String| RunError::NativeBuild {
        project: project.to_string(),
        step,
        diagnostic,
    };
    let output = invocation.run().map_err(|e| failure(e.to_string()))?;
    if output.success() {
        Ok(())
    } else {
        Err(failure(format!("{}\n{}", invocation, output.diagnostic())))
    }
}

/// One judged test.
#[derive(Debug, Clone)]
pub struct TestRecord {
    pub case: TestCase,
    pub outcome: TestOutcome,
    pub duration: Duration,
}

/// Tally of outcomes by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub errored: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Passed => self.passed += 1,
            OutcomeKind::Failed => self.failed += 1,
            OutcomeKind::TimedOut => self.timed_out += 1,
            OutcomeKind::Errored => self.errored += 1,
        }
    }

    pub fn merge(&mut self, other: OutcomeCounts) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.timed_out += other.timed_out;
        self.errored += other.errored;
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.timed_out + self.errored
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total()
    }
}

/// Ordered results of one set.
#[derive(Debug, Clone)]
pub struct TestSetResult {
    pub set: &'static TestSetInfo,
    pub records: Vec<TestRecord>,
}

impl TestSetResult {
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for record in &self.records {
            counts.record(record.outcome.kind());
        }
        counts
    }
}

/// Results of every requested set, in request order.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub sets: Vec<TestSetResult>,
    pub duration: Duration,
    /// The run ended at the first non-passing test (`--exitfirst`)
    pub stopped_early: bool,
}

impl RunSummary {
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for set in &self.sets {
            counts.merge(set.counts());
        }
        counts
    }

    /// True when every outcome in the run is `Passed`.
    pub fn success(&self) -> bool {
        self.counts().all_passed()
    }
}

/// Sequential executor: one test fully built and judged before the next begins.
pub struct TestSetExecutor<'a> {
    config: &'a RunConfig,
    catalog: TestCatalog,
    builder: &'a dyn ArtifactBuilder,
    harness: &'a dyn Harness,
    native: &'a dyn NativeProjectBuilder,
    built_projects: HashSet<&'static str>,
}

impl<'a> TestSetExecutor<'a> {
    pub fn new(
        config: &'a RunConfig,
        builder: &'a dyn ArtifactBuilder,
        harness: &'a dyn Harness,
        native: &'a dyn NativeProjectBuilder,
    ) -> Self {
        Self {
            config,
            catalog: TestCatalog::new(config),
            builder,
            harness,
            native,
            built_projects: HashSet::new(),
        }
    }

    /// Run the given sets in order and collect a summary.
    pub fn run(
        &mut self,
        sets: &[&'static TestSetInfo],
        reporter: &mut dyn TestReporter,
    ) -> Result<RunSummary, RunError> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(sets.len());
        let mut stopped_early = false;

        for &set in sets {
            let (result, stopped) = self.run_set(set, reporter)?;
            results.push(result);
            if stopped {
                stopped_early = true;
                break;
            }
        }

        let summary = RunSummary {
            sets: results,
            duration: start.elapsed(),
            stopped_early,
        };
        reporter.on_run_complete(&summary)?;
        Ok(summary)
    }

    /// Run one set. The flag is set when `stop_on_fail` cut the set short.
    pub fn run_set(
        &mut self,
        set: &'static TestSetInfo,
        reporter: &mut dyn TestReporter,
    ) -> Result<(TestSetResult, bool), RunError> {
        let cases: Vec<TestCase> = self
            .catalog
            .tests_in(set.id)?
            .into_iter()
            .filter(|case| self.config.filter.as_ref().is_none_or(|k| case.name.contains(k.as_str())))
            .collect();

        tracing::info!(set = set.id, tests = cases.len(), "starting test set");
        reporter.on_set_start(set, cases.len())?;

        if !cases.is_empty() {
            self.ensure_native_project(set, reporter)?;
        }

        let mut records = Vec::with_capacity(cases.len());
        let mut stopped = false;
        for case in cases {
            reporter.on_test_start(set, &case)?;
            let start = Instant::now();
            let outcome = self.run_case(set, &case)?;
            let record = TestRecord {
                case,
                outcome,
                duration: start.elapsed(),
            };
            reporter.on_test_complete(&record)?;

            let passed = record.outcome.is_passed();
            records.push(record);
            if !passed && self.config.stop_on_fail {
                stopped = true;
                break;
            }
        }

        let result = TestSetResult { set, records };
        reporter.on_set_complete(&result)?;
        Ok((result, stopped))
    }

    fn ensure_native_project(
        &mut self,
        set: &'static TestSetInfo,
        reporter: &mut dyn TestReporter,
    ) -> Result<(), RunError> {
        if !self.config.native_build || self.built_projects.contains(set.native_project) {
            return Ok(());
        }
        tracing::info!(project = set.native_project, "building native project");
        reporter.on_native_build(set.native_project)?;
        self.native.build_project(self.config, set.native_project)?;
        self.built_projects.insert(set.native_project);
        Ok(())
    }

    /// Build (if needed) and judge one test in its own scratch directory.
    fn run_case(&self, set: &TestSetInfo, case: &TestCase) -> Result<TestOutcome, RunError> {
        let scratch = ScratchDir::for_case(&self.config.scratch_root(), case);
        scratch.prepare().map_err(|source| RunError::Scratch {
            path: scratch.path().to_path_buf(),
            source,
        })?;

        let outcome = match set.family {
            TestFamily::Isa(profile) => match self.builder.build(case, &profile, &scratch) {
                Ok(rom) => {
                    let mut plusarg = std::ffi::OsString::from(ROM_PLUSARG);
                    plusarg.push(&rom.path);
                    let request =
                        HarnessRequest::new(self.config.simulator_path(), self.config.timeout, PassCriterion::simulation())
                            .arg(plusarg)
                            .current_dir(scratch.path());
                    self.harness.run(&request)
                }
                Err(e) => e.into(),
            },
            TestFamily::Module => {
                let request = HarnessRequest::new(
                    self.config.module_test_path(&case.name),
                    self.config.timeout,
                    PassCriterion::ExitStatus,
                )
                .current_dir(scratch.path());
                self.harness.run(&request)
            }
        };

        if outcome.is_passed() && !self.config.keep_artifacts {
            if let Err(e) = scratch.remove() {
                tracing::warn!(path = %scratch.path().display(), error = %e, "could not remove scratch directory");
            }
        }
        Ok(outcome)
    }
}
