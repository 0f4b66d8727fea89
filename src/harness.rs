//! Harness runner - executes a simulation or native test binary under a wall-clock bound
//!
//! The child gets no stdin. Its stdout and stderr are captured into bounded in-memory buffers by
//! background readers, so output produced before a timeout is still available for the report.
//! On unix the child leads its own process group; on expiry the whole group is killed, so helpers
//! started by a wrapper script go down with it, and the run is `TimedOut` whatever it printed.
//!
//! Classification of a completed run depends on the [`PassCriterion`]:
//! - simulation harness: exit status zero **and** the pass marker in the output,
//! - native module tests: exit status zero.
//!
//! A harness that cannot be started at all is a launch [`ToolchainError`], never a `Failed` verdict.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::runtime::Runtime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::outcome::{CapturedOutput, TestOutcome, ToolchainError, ToolchainStage};
use crate::toolchain;

/// Output substring the simulation harness prints on success.
pub const PASS_MARKER: &str = "Test Passed";

/// Per-stream capture limit; anything beyond is discarded.
const OUTPUT_LIMIT: usize = 1 << 20;

/// How long to keep draining output after the child is gone. Grandchildren holding the pipes
/// open must not stall the run.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How a completed harness run is judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassCriterion {
    /// Zero exit status and the marker somewhere in stdout or stderr.
    OutputMarker(String),
    /// Zero exit status alone.
    ExitStatus,
}

impl PassCriterion {
    /// The simulation harness criterion with the standard [`PASS_MARKER`].
    pub fn simulation() -> Self {
        PassCriterion::OutputMarker(PASS_MARKER.to_string())
    }
}

/// One harness execution.
#[derive(Debug, Clone)]
pub struct HarnessRequest {
    pub executable: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub criterion: PassCriterion,
}

impl HarnessRequest {
    pub fn new(executable: impl AsRef<Path>, timeout: Duration, criterion: PassCriterion) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            args: Vec::new(),
            current_dir: None,
            timeout,
            criterion,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

/// Runs a harness and produces its verdict.
///
/// Implemented by [`HarnessRunner`]; tests substitute scripted harnesses.
pub trait Harness {
    fn run(&self, request: &HarnessRequest) -> TestOutcome;
}

/// Process-backed harness runner with its own single-threaded async runtime.
#[derive(Debug)]
pub struct HarnessRunner {
    runtime: Runtime,
}

impl HarnessRunner {
    pub fn new() -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        Ok(Self { runtime })
    }
}

impl Harness for HarnessRunner {
    fn run(&self, request: &HarnessRequest) -> TestOutcome {
        self.runtime.block_on(run_bounded(request))
    }
}

type Buffer = Arc<Mutex<Vec<u8>>>;

async fn run_bounded(request: &HarnessRequest) -> TestOutcome {
    let path = match toolchain::resolve(&request.executable) {
        Ok(path) => path,
        Err(e) => return ToolchainError::new(ToolchainStage::Launch, e.to_string()).into(),
    };

    let mut command = Command::from(group_leader(&path));
    command
        .args(&request.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &request.current_dir {
        command.current_dir(dir);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return ToolchainError::new(
                ToolchainStage::Launch,
                format!("failed to launch `{}`: {}", path.display(), e),
            )
            .into();
        }
    };
    tracing::debug!(executable = %path.display(), timeout = ?request.timeout, "harness started");

    let pid = child.id();
    let (stdout, stdout_task) = spawn_capture(child.stdout.take());
    let (stderr, stderr_task) = spawn_capture(child.stderr.take());
    let mut readers: Vec<JoinHandle<()>> = [stdout_task, stderr_task].into_iter().flatten().collect();

    let status = match tokio::time::timeout(request.timeout, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            return ToolchainError::new(
                ToolchainStage::Launch,
                format!("lost track of `{}`: {}", path.display(), e),
            )
            .into();
        }
        Err(_) => {
            terminate(&mut child, pid, &path).await;
            None
        }
    };

    let drained = tokio::time::timeout(DRAIN_GRACE, async {
        for reader in readers.iter_mut() {
            let _ = reader.await;
        }
    })
    .await;
    if drained.is_err() {
        // something outside the group still holds the pipes
        for reader in &readers {
            reader.abort();
        }
        for reader in readers {
            let _ = reader.await;
        }
    }

    let captured = CapturedOutput {
        stdout: String::from_utf8_lossy(&stdout.lock().await).into_owned(),
        stderr: String::from_utf8_lossy(&stderr.lock().await).into_owned(),
    };

    match status {
        Some(status) => classify(status, captured, &request.criterion),
        None => {
            tracing::debug!(executable = %path.display(), "harness timed out");
            TestOutcome::TimedOut(captured)
        }
    }
}

fn group_leader(path: &Path) -> std::process::Command {
    #[allow(unused_mut)]
    let mut command = std::process::Command::new(path);
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut command, 0);
    command
}

/// Kill the child's process group (unix) and then the child itself.
async fn terminate(child: &mut Child, pid: Option<u32>, path: &Path) {
    if let Some(pid) = pid {
        if let Err(e) = kill_process_group(pid) {
            tracing::warn!(executable = %path.display(), error = %e, "failed to kill harness process group");
        }
    }
    if let Err(e) = child.kill().await {
        tracing::warn!(executable = %path.display(), error = %e, "failed to kill timed-out harness");
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_process_group(pgid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pgid).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    // SAFETY: killpg only sends a signal. The group was created for this child, which has not
    // been reaped yet, so its id cannot have been reused.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) -> io::Result<()> {
    Ok(())
}

fn spawn_capture<R>(reader: Option<R>) -> (Buffer, Option<JoinHandle<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer: Buffer = Arc::new(Mutex::new(Vec::new()));
    let task = reader.map(|mut reader| {
        let buffer = Arc::clone(&buffer);
        tokio::spawn(async move {
            let mut chunk = [0u8; 4096];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut buf = buffer.lock().await;
                        let room = OUTPUT_LIMIT.saturating_sub(buf.len());
                        buf.extend_from_slice(&chunk[..n.min(room)]);
                    }
                }
            }
        })
    });
    (buffer, task)
}

fn classify(status: ExitStatus, captured: CapturedOutput, criterion: &PassCriterion) -> TestOutcome {
    let passed = status.success()
        && match criterion {
            PassCriterion::OutputMarker(marker) => {
                captured.stdout.contains(marker.as_str()) || captured.stderr.contains(marker.as_str())
            }
            PassCriterion::ExitStatus => true,
        };
    if passed {
        TestOutcome::Passed
    } else {
        TestOutcome::Failed(captured)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str, timeout: Duration, criterion: PassCriterion) -> HarnessRequest {
        HarnessRequest::new("sh", timeout, criterion).arg("-c").arg(script)
    }

    fn runner() -> HarnessRunner {
        HarnessRunner::new().unwrap()
    }

    #[test]
    fn test_pass_marker_passes() {
        let outcome = runner().run(&sh("echo 'Test Passed'", Duration::from_secs(5), PassCriterion::simulation()));
        assert_eq!(outcome, TestOutcome::Passed);
    }

    #[test]
    fn test_fail_marker_fails_with_output() {
        let outcome = runner().run(&sh("echo 'Test Failed'", Duration::from_secs(5), PassCriterion::simulation()));
        match outcome {
            TestOutcome::Failed(out) => assert_eq!(out.stdout, "Test Failed\n"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_marker_fails() {
        let outcome = runner().run(&sh("true", Duration::from_secs(5), PassCriterion::simulation()));
        assert!(matches!(outcome, TestOutcome::Failed(_)));
    }

    #[test]
    fn test_marker_with_error_exit_fails() {
        let outcome = runner().run(&sh(
            "echo 'Test Passed'; exit 1",
            Duration::from_secs(5),
            PassCriterion::simulation(),
        ));
        assert!(matches!(outcome, TestOutcome::Failed(_)));
    }

    #[test]
    fn test_exit_status_criterion() {
        let r = runner();
        let ok = r.run(&sh("exit 0", Duration::from_secs(5), PassCriterion::ExitStatus));
        assert_eq!(ok, TestOutcome::Passed);

        let bad = r.run(&sh("echo boom 1>&2; exit 2", Duration::from_secs(5), PassCriterion::ExitStatus));
        match bad {
            TestOutcome::Failed(out) => assert_eq!(out.stderr, "boom\n"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_timeout_kills_and_keeps_partial_output() {
        let start = Instant::now();
        let outcome = runner().run(&sh(
            "echo 'Test Passed'; exec sleep 30",
            Duration::from_millis(300),
            PassCriterion::simulation(),
        ));
        assert!(start.elapsed() < Duration::from_secs(5));
        match outcome {
            TestOutcome::TimedOut(out) => assert!(out.stdout.contains("Test Passed")),
            other => panic!("expected TimedOut, got {other:?}"),
        }
    }

    /// True while `pid` exists and is not a zombie.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => {
                let state = stat.rsplit(')').next().unwrap_or("").trim_start();
                !(state.starts_with('Z') || state.starts_with('X'))
            }
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_timeout_kills_background_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let request = sh(
            "sleep 30 & echo $! > helper.pid; wait",
            Duration::from_millis(300),
            PassCriterion::simulation(),
        )
        .current_dir(dir.path());

        let start = Instant::now();
        let outcome = runner().run(&request);
        assert!(matches!(outcome, TestOutcome::TimedOut(_)));
        assert!(start.elapsed() < Duration::from_secs(5));

        let pid = std::fs::read_to_string(dir.path().join("helper.pid")).unwrap();
        let pid = pid.trim();
        let deadline = Instant::now() + Duration::from_secs(2);
        while is_running(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!is_running(pid), "helper {pid} survived the timeout");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_readers_released_when_pipes_outlive_the_group() {
        let r = runner();
        let start = Instant::now();
        // the setsid'd sleep leaves the group and keeps stdout open past the kill
        let outcome = r.run(&sh(
            "setsid sleep 3 & exec sleep 30",
            Duration::from_millis(300),
            PassCriterion::simulation(),
        ));
        assert!(matches!(outcome, TestOutcome::TimedOut(_)));
        assert!(start.elapsed() < Duration::from_millis(2500));
        assert_eq!(r.runtime.metrics().num_alive_tasks(), 0);
    }

    #[test]
    fn test_missing_executable_is_launch_error() {
        let request = HarnessRequest::new(
            "/nonexistent/rvconform/testbench",
            Duration::from_secs(1),
            PassCriterion::simulation(),
        );
        match runner().run(&request) {
            TestOutcome::ToolchainError(err) => assert_eq!(err.stage, ToolchainStage::Launch),
            other => panic!("expected launch error, got {other:?}"),
        }
    }

    #[test]
    fn test_runs_in_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let request = sh(
            "test -f marker.txt && echo 'Test Passed'",
            Duration::from_secs(5),
            PassCriterion::simulation(),
        )
        .current_dir(dir.path());
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        assert_eq!(runner().run(&request), TestOutcome::Passed);
    }
}
