//! Run configuration
//!
//! There is no configuration file. A [`RunConfig`] is assembled from command-line flags (with
//! environment-variable fallbacks for toolchain names) and carries every path convention the
//! pipeline and harness rely on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rvconform_core::catalog::{ARCHITECTURE_PROJECT, MODULE_PROJECT};

use crate::toolchain::executable_name;

/// Wall-clock budget for a single harness run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Simulation harness executable produced by the architecture project.
pub const SIMULATOR_STEM: &str = "testbench";

/// Names of the external tools, resolved through PATH at invocation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Cross compiler/assembler
    pub compiler: String,
    pub linker: String,
    /// Raw-binary extractor
    pub objcopy: String,
    /// Native build generator (configure + build)
    pub build_generator: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            compiler: "clang".to_string(),
            linker: "ld.lld".to_string(),
            objcopy: "llvm-objcopy".to_string(),
            build_generator: "cmake".to_string(),
        }
    }
}

/// Settings for one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Project root holding `src/` and `architecture_tests/`
    pub root: PathBuf,
    /// Build area for native projects and per-test scratch directories
    pub build_dir: PathBuf,
    pub timeout: Duration,
    /// Keep scratch artifacts of passing tests too
    pub keep_artifacts: bool,
    /// Configure and build the native projects before running their sets
    pub native_build: bool,
    /// Stop after the first test that does not pass
    pub stop_on_fail: bool,
    /// Only run tests whose name contains this keyword
    pub filter: Option<String>,
    pub toolchain: Toolchain,
}

impl RunConfig {
    /// Create a config rooted at `root` with the default build directory (`<root>/build`).
    ///
    /// Relative paths are made absolute against the current directory: the harness runs inside
    /// the scratch directory, so every path handed to it must not depend on the working directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = absolute(root.as_ref());
        Self {
            build_dir: root.join("build"),
            root,
            timeout: DEFAULT_TIMEOUT,
            keep_artifacts: false,
            native_build: true,
            stop_on_fail: false,
            filter: None,
            toolchain: Toolchain::default(),
        }
    }

    pub fn with_build_dir(mut self, build_dir: impl AsRef<Path>) -> Self {
        self.build_dir = absolute(build_dir.as_ref());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    /// Root of all per-test scratch directories.
    pub fn scratch_root(&self) -> PathBuf {
        self.build_dir.join("scratch")
    }

    /// Source directory of a native CMake project.
    pub fn native_source_dir(&self, project: &str) -> PathBuf {
        self.root.join("src").join(project)
    }

    /// Build directory of a native CMake project.
    pub fn native_build_dir(&self, project: &str) -> PathBuf {
        self.build_dir.join(project)
    }

    /// Directory holding the `.S` sources of an ISA set.
    pub fn isa_source_dir(&self, set_id: &str) -> PathBuf {
        self.root.join("architecture_tests").join("isa").join(set_id)
    }

    /// Include paths for the ISA test macro headers.
    pub fn isa_include_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.root
                .join("architecture_tests")
                .join("isa")
                .join("macros")
                .join("scalar"),
            self.native_source_dir(ARCHITECTURE_PROJECT),
        ]
    }

    /// Linker script for ISA tests, if the project provides one.
    pub fn linker_script(&self) -> Option<PathBuf> {
        let script = self.native_source_dir(ARCHITECTURE_PROJECT).join("linker.ld");
        script.is_file().then_some(script)
    }

    /// Path of the simulation harness executable.
    pub fn simulator_path(&self) -> PathBuf {
        self.native_build_dir(ARCHITECTURE_PROJECT)
            .join(executable_name(SIMULATOR_STEM))
    }

    /// Path of the native test executable for one hardware module.
    pub fn module_test_path(&self, module: &str) -> PathBuf {
        self.native_build_dir(MODULE_PROJECT)
            .join(executable_name(&format!("{module}-test")))
    }
}

/// `std::path::absolute`, keeping the path as given if the current directory is unavailable.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
