//! Artifact pipeline - turns one test source into a ROM hex image
//!
//! Stages run strictly in order, each consuming only the previous stage's output:
//!
//! 1. compile/assemble → relocatable object (`test.o`)
//! 2. link → executable image (`test.elf`)
//! 3. extract → flat binary starting at the load address (`test.bin`)
//! 4. encode → hex text for the simulation harness (`test.hex`)
//!
//! The first failing stage aborts the rest and yields a [`ToolchainError`] tagged with that stage.
//!
//! ## Scratch isolation
//!
//! All intermediate files live in a [`ScratchDir`] keyed by set and test name, so two tests never
//! share an artifact path. The directory is recreated at the start of each build of that test.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rvconform_core::catalog::IsaProfile;
use rvconform_core::hex;

use crate::catalog::TestCase;
use crate::config::{RunConfig, Toolchain};
use crate::outcome::{ToolchainError, ToolchainStage};
use crate::toolchain::ToolInvocation;

/// Target triple passed to the cross compiler.
pub const TARGET_TRIPLE: &str = "riscv32-unknown-unknown-elf";

/// Linker emulation for 32-bit little-endian RISC-V.
pub const LINKER_EMULATION: &str = "elf32lriscv";

/// Entry point used for ISA tests (execution starts at ROM address 0).
pub const ISA_ENTRY: &str = "0x0";

/// Kind of file produced by a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactStage {
    Object,
    Linked,
    RawBinary,
    HexText,
}

impl ArtifactStage {
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactStage::Object => "test.o",
            ArtifactStage::Linked => "test.elf",
            ArtifactStage::RawBinary => "test.bin",
            ArtifactStage::HexText => "test.hex",
        }
    }
}

/// A stage's output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPath {
    pub stage: ArtifactStage,
    pub path: PathBuf,
}

/// Working directory exclusively owned by one test's build and run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `<scratch root>/<set>/<test>`
    pub fn for_case(scratch_root: &Path, case: &TestCase) -> Self {
        Self::new(scratch_root.join(case.set).join(&case.name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove leftovers from a previous run and create the directory empty.
    pub fn prepare(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::create_dir_all(&self.path)
    }

    pub fn remove(&self) -> io::Result<()> {
        fs::remove_dir_all(&self.path)
    }

    pub fn artifact(&self, stage: ArtifactStage) -> ArtifactPath {
        ArtifactPath {
            stage,
            path: self.path.join(stage.file_name()),
        }
    }
}

/// Builds the ROM image for one test case.
///
/// Implemented by [`ArtifactPipeline`]; tests substitute their own builders.
pub trait ArtifactBuilder {
    fn build(&self, case: &TestCase, profile: &IsaProfile, scratch: &ScratchDir) -> Result<ArtifactPath, ToolchainError>;
}

/// The compile → link → extract → encode chain.
#[derive(Debug, Clone)]
pub struct ArtifactPipeline {
    toolchain: Toolchain,
    include_dirs: Vec<PathBuf>,
    linker_script: Option<PathBuf>,
    entry: String,
}

impl ArtifactPipeline {
    pub fn new(toolchain: Toolchain) -> Self {
        Self {
            toolchain,
            include_dirs: Vec::new(),
            linker_script: None,
            entry: ISA_ENTRY.to_string(),
        }
    }

    /// Pipeline configured for the ISA test layout of a project.
    pub fn for_isa_tests(config: &RunConfig) -> Self {
        let mut pipeline = Self::new(config.toolchain.clone());
        pipeline.include_dirs = config.isa_include_dirs();
        pipeline.linker_script = config.linker_script();
        pipeline
    }

    pub fn with_include_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.include_dirs.push(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_linker_script(mut self, script: Option<PathBuf>) -> Self {
        self.linker_script = script;
        self
    }

    /// Entry-point symbol or address passed to the linker.
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    /// Run all four stages on `source`, writing into `scratch`.
    ///
    /// `defines` are passed to the compiler as `-D` flags.
    pub fn build_source(
        &self,
        source: &Path,
        march: &str,
        defines: &[String],
        scratch: &ScratchDir,
    ) -> Result<ArtifactPath, ToolchainError> {
        let object = self.compile(source, march, defines, scratch)?;
        let linked = self.link(&object, scratch)?;
        let binary = self.extract(&linked, scratch)?;
        encode(&binary, scratch)
    }

    fn compile(
        &self,
        source: &Path,
        march: &str,
        defines: &[String],
        scratch: &ScratchDir,
    ) -> Result<ArtifactPath, ToolchainError> {
        let object = scratch.artifact(ArtifactStage::Object);
        let invocation = ToolInvocation::new(&self.toolchain.compiler)
            .args(["-target", TARGET_TRIPLE])
            .arg(format!("-march={march}"))
            .arg("-mno-relax")
            .args(self.include_dirs.iter().map(|dir| format!("-I{}", dir.display())))
            .args(defines.iter().map(|d| format!("-D{d}")))
            .arg("-c")
            .arg("-o")
            .arg(&object.path)
            .arg(source);
        run_stage(ToolchainStage::Compile, &invocation)?;
        Ok(object)
    }

    fn link(&self, object: &ArtifactPath, scratch: &ScratchDir) -> Result<ArtifactPath, ToolchainError> {
        let linked = scratch.artifact(ArtifactStage::Linked);
        let mut invocation = ToolInvocation::new(&self.toolchain.linker);
        invocation = match &self.linker_script {
            Some(script) => invocation.arg("-T").arg(script),
            None => invocation.arg("--section-start=.text=0"),
        };
        let invocation = invocation
            .arg("-o")
            .arg(&linked.path)
            .args(["-e", self.entry.as_str()])
            .args(["-m", LINKER_EMULATION])
            .arg(&object.path);
        run_stage(ToolchainStage::Link, &invocation)?;
        Ok(linked)
    }

    fn extract(&self, linked: &ArtifactPath, scratch: &ScratchDir) -> Result<ArtifactPath, ToolchainError> {
        let binary = scratch.artifact(ArtifactStage::RawBinary);
        let invocation = ToolInvocation::new(&self.toolchain.objcopy)
            .arg("--output-target=binary")
            .arg(&linked.path)
            .arg(&binary.path);
        run_stage(ToolchainStage::Extract, &invocation)?;
        Ok(binary)
    }
}

impl ArtifactBuilder for ArtifactPipeline {
    fn build(&self, case: &TestCase, profile: &IsaProfile, scratch: &ScratchDir) -> Result<ArtifactPath, ToolchainError> {
        let defines = [format!("TESTNUM={}", profile.test_register)];
        self.build_source(&case.source_path, profile.march, &defines, scratch)
    }
}

/// Hex-encode the raw binary. An empty binary yields an empty hex file.
fn encode(binary: &ArtifactPath, scratch: &ScratchDir) -> Result<ArtifactPath, ToolchainError> {
    let hex_file = scratch.artifact(ArtifactStage::HexText);
    let bytes = fs::read(&binary.path).map_err(|e| {
        ToolchainError::new(
            ToolchainStage::Encode,
            format!("could not read {}: {}", binary.path.display(), e),
        )
    })?;
    fs::write(&hex_file.path, hex::encode(&bytes)).map_err(|e| {
        ToolchainError::new(
            ToolchainStage::Encode,
            format!("could not write {}: {}", hex_file.path.display(), e),
        )
    })?;
    tracing::debug!(bytes = bytes.len(), path = %hex_file.path.display(), "wrote ROM image");
    Ok(hex_file)
}

/// Run one external stage, turning launch failures and nonzero exits into a tagged error.
fn run_stage(stage: ToolchainStage, invocation: &ToolInvocation) -> Result<(), ToolchainError> {
    let output = invocation
        .run()
        .map_err(|e| ToolchainError::new(stage, e.to_string()))?;
    if output.success() {
        Ok(())
    } else {
        Err(ToolchainError::new(stage, format!("{}\n{}", invocation, output.diagnostic())))
    }
}
