//! CLI module for the conformance runner
//!
//! ## Commands
//!
//! - `[SETS]...` / `run [SETS]...` - Build and run test sets (default `rv32ui`, `all` for every set)
//! - `list` - Show the registered test sets
//! - `rom <SOURCE>` - Build a single ROM hex image
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{RunConfig, Toolchain};
use crate::executor::RunError;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Carries a message already formatted for the terminal and the exit code to return.
#[derive(Debug)]
pub struct CliError {
    pub message: String,
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<RunError> for CliError {
    /// Render through miette so the diagnostic code and help text reach the user.
    fn from(err: RunError) -> Self {
        CliError::failure(format!("{:?}", miette::Report::new(err)))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Hardware conformance test runner for RISC-V cores
#[derive(Parser, Debug)]
#[command(name = "rvconform")]
#[command(version = VERSION)]
#[command(about = "Build and run RISC-V conformance tests against a simulated core", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments for the default action (running test sets)
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build and run test sets
    Run(RunArgs),

    /// List registered test sets
    List,

    /// Build a ROM hex image from one assembly source
    Rom(RomArgs),
}

/// Console or machine-readable output.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Console,
    Json,
}

/// External tool names. Each is looked up on PATH when invoked.
#[derive(Args, Debug, Clone)]
pub struct ToolchainArgs {
    /// C compiler / assembler targeting RISC-V
    #[arg(long = "cc", env = "RVCONFORM_CC", default_value = "clang", value_name = "PROGRAM")]
    pub compiler: String,

    /// ELF linker
    #[arg(long = "ld", env = "RVCONFORM_LD", default_value = "ld.lld", value_name = "PROGRAM")]
    pub linker: String,

    /// Raw binary extractor
    #[arg(long, env = "RVCONFORM_OBJCOPY", default_value = "llvm-objcopy", value_name = "PROGRAM")]
    pub objcopy: String,

    /// Native build generator
    #[arg(long, env = "RVCONFORM_CMAKE", default_value = "cmake", value_name = "PROGRAM")]
    pub cmake: String,
}

impl ToolchainArgs {
    pub fn to_toolchain(&self) -> Toolchain {
        Toolchain {
            compiler: self.compiler.clone(),
            linker: self.linker.clone(),
            objcopy: self.objcopy.clone(),
            build_generator: self.cmake.clone(),
        }
    }
}

/// Where the project lives and which tools build it.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project root containing `src/` and `architecture_tests/`
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Build directory (default: <ROOT>/build)
    #[arg(long, value_name = "DIR")]
    pub build_dir: Option<PathBuf>,

    #[command(flatten)]
    pub toolchain: ToolchainArgs,
}

impl ProjectArgs {
    pub fn run_config(&self) -> RunConfig {
        let config = RunConfig::new(&self.root).with_toolchain(self.toolchain.to_toolchain());
        match &self.build_dir {
            Some(dir) => config.with_build_dir(dir),
            None => config,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Test sets to run (`all` for every set)
    #[arg(value_name = "SETS")]
    pub sets: Vec<String>,

    /// Show per-test durations
    #[arg(short, long)]
    pub verbose: bool,

    /// Stop on first failure
    #[arg(short = 'x', long = "exitfirst")]
    pub stop_on_fail: bool,

    /// Only run tests whose name contains this keyword
    #[arg(short = 'k', value_name = "EXPR")]
    pub filter: Option<String>,

    /// Per-test harness timeout in seconds
    #[arg(long, value_name = "SECS", default_value = "5", value_parser = parse_timeout)]
    pub timeout: Duration,

    /// Keep scratch artifacts of passing tests
    #[arg(long)]
    pub keep_artifacts: bool,

    /// Use the already-built harness executables
    #[arg(long)]
    pub no_native_build: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    #[command(flatten)]
    pub project: ProjectArgs,
}

impl RunArgs {
    pub fn run_config(&self) -> RunConfig {
        let mut config = self.project.run_config().with_timeout(self.timeout);
        config.keep_artifacts = self.keep_artifacts;
        config.native_build = !self.no_native_build;
        config.stop_on_fail = self.stop_on_fail;
        config.filter = self.filter.clone();
        config
    }
}

#[derive(Args, Debug, Clone)]
pub struct RomArgs {
    /// Assembly source to build
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Output hex file (default: SOURCE with a `.hex` extension)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Value for `-march=`
    #[arg(long, default_value = "rv32i")]
    pub march: String,

    /// Entry symbol or address passed to the linker
    #[arg(long, default_value = "entry")]
    pub entry: String,

    /// Link with this script instead of placing `.text` at address 0
    #[arg(long, value_name = "FILE")]
    pub linker_script: Option<PathBuf>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

fn parse_timeout(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number of seconds"))?;
    if secs.is_nan() || secs <= 0.0 {
        return Err("timeout must be greater than zero".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Some(Command::Run(args)) => commands::run_sets(&args),
        Some(Command::List) => commands::list_sets(),
        Some(Command::Rom(args)) => commands::build_rom(&args),
        None => commands::run_sets(&cli.run),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_cli_parse_default_sets() {
        let cli = Cli::try_parse_from(["rvconform", "rv32ui", "modules"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.run.sets, ["rv32ui", "modules"]);
        assert_eq!(cli.run.timeout, Duration::from_secs(5));
        assert_eq!(cli.run.format, OutputFormat::Console);
    }

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::try_parse_from(["rvconform"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.run.sets.is_empty());
    }

    #[test]
    fn test_cli_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "rvconform",
            "run",
            "-v",
            "-x",
            "-k",
            "mul",
            "--timeout",
            "0.5",
            "--format",
            "json",
            "rv32um",
        ])
        .unwrap();
        let Some(Command::Run(args)) = cli.command else {
            panic!("Expected Run command");
        };
        assert!(args.verbose);
        assert!(args.stop_on_fail);
        assert_eq!(args.filter.as_deref(), Some("mul"));
        assert_eq!(args.timeout, Duration::from_millis(500));
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.sets, ["rv32um"]);
    }

    #[test]
    fn test_cli_rejects_bad_timeout() {
        assert!(Cli::try_parse_from(["rvconform", "--timeout", "0"]).is_err());
        assert!(Cli::try_parse_from(["rvconform", "--timeout", "-1"]).is_err());
        assert!(Cli::try_parse_from(["rvconform", "--timeout", "soon"]).is_err());
    }

    #[test]
    fn test_cli_parse_list_and_rom() {
        let cli = Cli::try_parse_from(["rvconform", "list"]).unwrap();
        assert!(matches!(cli.command, Some(Command::List)));

        let cli = Cli::try_parse_from(["rvconform", "rom", "prog.S", "-o", "prog.hex"]).unwrap();
        let Some(Command::Rom(args)) = cli.command else {
            panic!("Expected Rom command");
        };
        assert_eq!(args.source, Path::new("prog.S"));
        assert_eq!(args.output.as_deref(), Some(Path::new("prog.hex")));
        assert_eq!(args.entry, "entry");
        assert!(args.linker_script.is_none());

        let cli = Cli::try_parse_from(["rvconform", "rom", "prog.S", "--linker-script", "rom.ld"]).unwrap();
        let Some(Command::Rom(args)) = cli.command else {
            panic!("Expected Rom command");
        };
        assert_eq!(args.linker_script.as_deref(), Some(Path::new("rom.ld")));
    }

    #[test]
    fn test_run_config_from_flags() {
        let cli = Cli::try_parse_from([
            "rvconform",
            "--root",
            "/core",
            "--keep-artifacts",
            "--no-native-build",
            "--ld",
            "ld.bfd",
        ])
        .unwrap();
        let config = cli.run.run_config();
        assert_eq!(config.root, Path::new("/core"));
        assert_eq!(config.build_dir, Path::new("/core/build"));
        assert!(config.keep_artifacts);
        assert!(!config.native_build);
        assert_eq!(config.toolchain.linker, "ld.bfd");
    }

    #[test]
    fn test_build_dir_override() {
        let cli = Cli::try_parse_from(["rvconform", "--root", "/core", "--build-dir", "/tmp/out"]).unwrap();
        assert_eq!(cli.run.run_config().build_dir, Path::new("/tmp/out"));
    }
}
