//! Result reporting
//!
//! ## TestReporter Trait
//!
//! The executor talks to a `TestReporter` instead of printing directly, so the output format can
//! be swapped (console, JSON) without touching execution. Reporters write to any `io::Write`
//! sink, which keeps their rendering testable.

use std::io::{self, Write};

use rvconform_core::catalog::{TestFamily, TestSetInfo};
use serde_json::{Value, json};

use crate::catalog::TestCase;
use crate::executor::{OutcomeCounts, RunSummary, TestRecord, TestSetResult};
use crate::outcome::{OutcomeKind, TestOutcome};

/// Receives progress events from the executor.
pub trait TestReporter {
    /// Called before a native project is configured and built
    fn on_native_build(&mut self, _project: &str) -> io::Result<()> {
        Ok(())
    }

    /// Called when a set begins, with the number of selected tests
    fn on_set_start(&mut self, set: &TestSetInfo, test_count: usize) -> io::Result<()>;

    /// Called before a test is built and run
    fn on_test_start(&mut self, set: &TestSetInfo, case: &TestCase) -> io::Result<()>;

    /// Called once the test's outcome is final
    fn on_test_complete(&mut self, record: &TestRecord) -> io::Result<()>;

    /// Called after the last test of a set
    fn on_set_complete(&mut self, _result: &TestSetResult) -> io::Result<()> {
        Ok(())
    }

    /// Called when all sets have completed
    fn on_run_complete(&mut self, summary: &RunSummary) -> io::Result<()>;
}

/// Reporter that discards everything.
#[derive(Debug, Default)]
pub struct NullReporter;

impl TestReporter for NullReporter {
    fn on_set_start(&mut self, _: &TestSetInfo, _: usize) -> io::Result<()> {
        Ok(())
    }

    fn on_test_start(&mut self, _: &TestSetInfo, _: &TestCase) -> io::Result<()> {
        Ok(())
    }

    fn on_test_complete(&mut self, _: &TestRecord) -> io::Result<()> {
        Ok(())
    }

    fn on_run_complete(&mut self, _: &RunSummary) -> io::Result<()> {
        Ok(())
    }
}

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD_GREEN: &str = "\x1b[1;32m";
const BOLD_RED: &str = "\x1b[1;31m";
const RESET: &str = "\x1b[0m";

/// Line-oriented console reporter.
///
/// Prints `Running <family> test <name>... <verdict>` per test, echoes captured output for
/// anything that did not pass, and ends with per-set counts.
pub struct ConsoleReporter<W: Write> {
    out: W,
    pub verbose: bool,
    pub color: bool,
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, verbose: bool, color: bool) -> Self {
        Self { out, verbose, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

fn family_word(set: &TestSetInfo) -> &'static str {
    match set.family {
        TestFamily::Isa(_) => "architecture",
        TestFamily::Module => "module",
    }
}

/// `"3 passed, 1 failed"`; only nonzero counts are listed.
pub fn count_parts(counts: &OutcomeCounts) -> String {
    let mut parts = Vec::new();
    if counts.passed > 0 {
        parts.push(format!("{} passed", counts.passed));
    }
    if counts.failed > 0 {
        parts.push(format!("{} failed", counts.failed));
    }
    if counts.timed_out > 0 {
        parts.push(format!("{} timed out", counts.timed_out));
    }
    if counts.errored > 0 {
        parts.push(format!("{} errored", counts.errored));
    }
    if parts.is_empty() {
        "no tests".to_string()
    } else {
        parts.join(", ")
    }
}

impl<W: Write> TestReporter for ConsoleReporter<W> {
    fn on_native_build(&mut self, project: &str) -> io::Result<()> {
        writeln!(self.out, "Building native project {project}...")
    }

    fn on_set_start(&mut self, set: &TestSetInfo, test_count: usize) -> io::Result<()> {
        let family = match set.family {
            TestFamily::Isa(_) => "Architecture",
            TestFamily::Module => "Module",
        };
        writeln!(self.out, "{} test set {}:", family, set.id)?;
        if test_count == 0 {
            writeln!(self.out, "No tests selected")?;
        }
        Ok(())
    }

    fn on_test_start(&mut self, set: &TestSetInfo, case: &TestCase) -> io::Result<()> {
        write!(self.out, "Running {} test {}...", family_word(set), case.name)?;
        self.out.flush()
    }

    fn on_test_complete(&mut self, record: &TestRecord) -> io::Result<()> {
        let outcome = &record.outcome;
        let color = match outcome.kind() {
            OutcomeKind::Passed => GREEN,
            OutcomeKind::TimedOut => YELLOW,
            OutcomeKind::Failed | OutcomeKind::Errored => RED,
        };
        let mut verdict = self.paint(color, outcome.verdict());
        if self.verbose {
            verdict.push_str(&format!(" ({}ms)", record.duration.as_millis()));
        }

        match outcome {
            TestOutcome::Passed => writeln!(self.out, " {verdict}"),
            TestOutcome::Failed(captured) | TestOutcome::TimedOut(captured) => {
                writeln!(self.out, " {verdict}")?;
                writeln!(self.out, "{captured}")
            }
            TestOutcome::ToolchainError(err) => {
                // diagnostic first, then the verdict
                writeln!(self.out)?;
                writeln!(self.out, "{err}:")?;
                writeln!(self.out, "{}", err.diagnostic.trim_end())?;
                writeln!(self.out, "{verdict}")
            }
        }
    }

    fn on_set_complete(&mut self, _result: &TestSetResult) -> io::Result<()> {
        writeln!(self.out)
    }

    fn on_run_complete(&mut self, summary: &RunSummary) -> io::Result<()> {
        writeln!(self.out, "Summary:")?;
        for set in &summary.sets {
            writeln!(self.out, "  {}: {}", set.set.id, count_parts(&set.counts()))?;
        }
        if summary.stopped_early {
            writeln!(self.out, "Stopped after the first failing test.")?;
        }

        let totals = format!(
            "{} in {:.2}s",
            count_parts(&summary.counts()),
            summary.duration.as_secs_f64()
        );
        let color = if summary.success() { BOLD_GREEN } else { BOLD_RED };
        let line = self.paint(color, &totals);
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }
}

/// Reporter that emits a single JSON document once the run completes.
pub struct JsonReporter<W: Write> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn kind_name(kind: OutcomeKind) -> &'static str {
    match kind {
        OutcomeKind::Passed => "passed",
        OutcomeKind::Failed => "failed",
        OutcomeKind::TimedOut => "timed_out",
        OutcomeKind::Errored => "errored",
    }
}

fn record_json(record: &TestRecord) -> Value {
    let mut value = json!({
        "name": record.case.name,
        "outcome": kind_name(record.outcome.kind()),
        "verdict": record.outcome.verdict(),
        "duration_ms": record.duration.as_millis() as u64,
    });
    match &record.outcome {
        TestOutcome::Passed => {}
        TestOutcome::Failed(captured) | TestOutcome::TimedOut(captured) => {
            value["stdout"] = json!(captured.stdout);
            value["stderr"] = json!(captured.stderr);
        }
        TestOutcome::ToolchainError(err) => {
            value["stage"] = json!(err.stage.as_str());
            value["diagnostic"] = json!(err.diagnostic);
        }
    }
    value
}

fn counts_json(counts: &OutcomeCounts) -> Value {
    json!({
        "passed": counts.passed,
        "failed": counts.failed,
        "timed_out": counts.timed_out,
        "errored": counts.errored,
    })
}

impl<W: Write> TestReporter for JsonReporter<W> {
    fn on_set_start(&mut self, _: &TestSetInfo, _: usize) -> io::Result<()> {
        Ok(())
    }

    fn on_test_start(&mut self, _: &TestSetInfo, _: &TestCase) -> io::Result<()> {
        Ok(())
    }

    fn on_test_complete(&mut self, _: &TestRecord) -> io::Result<()> {
        Ok(())
    }

    fn on_run_complete(&mut self, summary: &RunSummary) -> io::Result<()> {
        let sets: Vec<Value> = summary
            .sets
            .iter()
            .map(|set| {
                json!({
                    "id": set.set.id,
                    "family": set.set.family.label(),
                    "counts": counts_json(&set.counts()),
                    "tests": set.records.iter().map(record_json).collect::<Vec<_>>(),
                })
            })
            .collect();
        let doc = json!({
            "success": summary.success(),
            "stopped_early": summary.stopped_early,
            "duration_secs": summary.duration.as_secs_f64(),
            "counts": counts_json(&summary.counts()),
            "sets": sets,
        });
        serde_json::to_writer_pretty(&mut self.out, &doc)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use rvconform_core::catalog;

    use crate::outcome::{CapturedOutput, ToolchainError, ToolchainStage};

    fn record(set: &'static str, name: &str, outcome: TestOutcome) -> TestRecord {
        TestRecord {
            case: TestCase {
                set,
                name: name.to_string(),
                source_path: PathBuf::from(format!("{name}.S")),
            },
            outcome,
            duration: Duration::from_millis(7),
        }
    }

    /// Feed a fixed run through a reporter, the way the executor would.
    fn replay(reporter: &mut dyn TestReporter) -> RunSummary {
        let um = catalog::from_str("rv32um").unwrap();
        let modules = catalog::from_str("modules").unwrap();
        let um_records = vec![
            record("rv32um", "div", TestOutcome::Passed),
            record(
                "rv32um",
                "mul",
                TestOutcome::Failed(CapturedOutput {
                    stdout: "Test Failed\n".to_string(),
                    stderr: String::new(),
                }),
            ),
            record("rv32um", "rem", TestOutcome::TimedOut(CapturedOutput::default())),
            record(
                "rv32um",
                "remu",
                ToolchainError::new(ToolchainStage::Compile, "remu.S:3: error: unknown instruction\n").into(),
            ),
        ];
        let module_records = vec![record("modules", "FlattenTest", TestOutcome::Passed)];

        let mut sets = Vec::new();
        for (set, records) in [(um, um_records), (modules, module_records)] {
            reporter.on_set_start(set, records.len()).unwrap();
            for r in &records {
                reporter.on_test_start(set, &r.case).unwrap();
                reporter.on_test_complete(r).unwrap();
            }
            let result = TestSetResult { set, records };
            reporter.on_set_complete(&result).unwrap();
            sets.push(result);
        }
        let summary = RunSummary {
            sets,
            duration: Duration::from_millis(1500),
            stopped_early: false,
        };
        reporter.on_run_complete(&summary).unwrap();
        summary
    }

    #[test]
    fn test_console_rendering() {
        let mut reporter = ConsoleReporter::new(Vec::new(), false, false);
        replay(&mut reporter);
        let output = String::from_utf8(reporter.into_inner()).unwrap();
        insta::assert_snapshot!(output, @r"
        Architecture test set rv32um:
        Running architecture test div... Passed
        Running architecture test mul... Failed
        stdout:
        Test Failed
        stderr:

        Running architecture test rem... Failed (timeout)
        stdout:

        stderr:

        Running architecture test remu...
        compile step failed:
        remu.S:3: error: unknown instruction
        Failed

        Module test set modules:
        Running module test FlattenTest... Passed

        Summary:
          rv32um: 1 passed, 1 failed, 1 timed out, 1 errored
          modules: 1 passed
        2 passed, 1 failed, 1 timed out, 1 errored in 1.50s
        ");
    }

    #[test]
    fn test_console_verbose_and_color() {
        let mut reporter = ConsoleReporter::new(Vec::new(), true, true);
        let r = record("rv32um", "div", TestOutcome::Passed);
        reporter.on_test_complete(&r).unwrap();
        let output = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(output, " \x1b[32mPassed\x1b[0m (7ms)\n");
    }

    #[test]
    fn test_console_reports_stop() {
        let mut reporter = ConsoleReporter::new(Vec::new(), false, false);
        let summary = RunSummary {
            sets: Vec::new(),
            duration: Duration::ZERO,
            stopped_early: true,
        };
        reporter.on_run_complete(&summary).unwrap();
        let output = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(output, "Summary:\nStopped after the first failing test.\nno tests in 0.00s\n");
    }

    #[test]
    fn test_json_document() {
        let mut reporter = JsonReporter::new(Vec::new());
        replay(&mut reporter);
        let doc: Value = serde_json::from_slice(&reporter.into_inner()).unwrap();

        assert_eq!(doc["success"], json!(false));
        assert_eq!(doc["counts"]["passed"], json!(2));
        assert_eq!(doc["sets"][0]["id"], json!("rv32um"));
        assert_eq!(doc["sets"][0]["family"], json!("isa"));
        assert_eq!(doc["sets"][0]["tests"][1]["stdout"], json!("Test Failed\n"));
        assert_eq!(doc["sets"][0]["tests"][2]["verdict"], json!("Failed (timeout)"));
        assert_eq!(doc["sets"][0]["tests"][3]["stage"], json!("compile"));
        assert_eq!(doc["sets"][1]["tests"][0]["outcome"], json!("passed"));
    }

    #[test]
    fn test_count_parts() {
        assert_eq!(count_parts(&OutcomeCounts::default()), "no tests");
        let counts = OutcomeCounts {
            passed: 3,
            errored: 1,
            ..OutcomeCounts::default()
        };
        assert_eq!(count_parts(&counts), "3 passed, 1 errored");
    }
}
