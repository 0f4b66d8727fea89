//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::Path;

use rvconform_core::catalog::{DEFAULT_TEST_SET, TEST_SETS, TestFamily};

use crate::catalog::TestCatalog;
use crate::executor::{CmakeBuilder, RunError, TestSetExecutor};
use crate::harness::HarnessRunner;
use crate::pipeline::{ArtifactPipeline, ScratchDir};
use crate::report::{ConsoleReporter, JsonReporter};

use super::{CliError, CliResult, ExitCode, OutputFormat, RomArgs, RunArgs};

// ============================================================================
// Running test sets
// ============================================================================

/// Build and run the requested sets, reporting to stdout.
///
/// Exits 0 only when every test of every set passed.
pub fn run_sets(args: &RunArgs) -> CliResult<ExitCode> {
    let config = args.run_config();
    let sets = TestCatalog::new(&config)
        .resolve_sets(&args.sets)
        .map_err(RunError::from)?;

    let pipeline = ArtifactPipeline::for_isa_tests(&config);
    let harness = HarnessRunner::new().map_err(RunError::Runtime)?;
    let native = CmakeBuilder;
    let mut executor = TestSetExecutor::new(&config, &pipeline, &harness, &native);

    let stdout = io::stdout();
    let summary = match args.format {
        OutputFormat::Console => {
            let color = !args.no_color && stdout.is_terminal();
            let mut reporter = ConsoleReporter::new(stdout.lock(), args.verbose, color);
            executor.run(&sets, &mut reporter)?
        }
        OutputFormat::Json => {
            let mut reporter = JsonReporter::new(stdout.lock());
            executor.run(&sets, &mut reporter)?
        }
    };

    if summary.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

// ============================================================================
// Listing
// ============================================================================

pub fn list_sets() -> CliResult<ExitCode> {
    let mut out = io::stdout().lock();
    write_set_listing(&mut out).map_err(|e| CliError::failure(format!("Error writing listing: {e}")))?;
    Ok(ExitCode::SUCCESS)
}

/// One block per registered set: header line, description, member tests.
pub fn write_set_listing(out: &mut impl Write) -> io::Result<()> {
    for set in TEST_SETS {
        let profile = match set.family {
            TestFamily::Isa(profile) => format!(", -march={}", profile.march),
            TestFamily::Module => String::new(),
        };
        let default = if set.id == DEFAULT_TEST_SET { " (default)" } else { "" };
        writeln!(out, "{} [{}{}]{}", set.id, set.family.label(), profile, default)?;
        writeln!(out, "  {}", set.description)?;
        writeln!(out, "  {} tests: {}", set.tests.len(), set.tests.join(" "))?;
    }
    Ok(())
}

// ============================================================================
// Single ROM build
// ============================================================================

/// Run the artifact pipeline on one source and write its hex image.
pub fn build_rom(args: &RomArgs) -> CliResult<ExitCode> {
    let config = args.project.run_config();
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.source.with_extension("hex"));

    let stem = args
        .source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rom".to_string());
    let scratch = ScratchDir::new(config.scratch_root().join("rom").join(stem));
    scratch
        .prepare()
        .map_err(|source| RunError::Scratch {
            path: scratch.path().to_path_buf(),
            source,
        })?;

    // ISA include paths, but the project's linker script only on request
    let pipeline = config
        .isa_include_dirs()
        .into_iter()
        .fold(ArtifactPipeline::new(config.toolchain.clone()), |p, dir| p.with_include_dir(dir))
        .with_linker_script(args.linker_script.clone())
        .with_entry(args.entry.as_str());
    let hex = pipeline
        .build_source(&args.source, &args.march, &[], &scratch)
        .map_err(|e| CliError::failure(format!("{}:\n{}", e, e.diagnostic.trim_end())))?;

    copy_output(&hex.path, &output)?;
    println!("Wrote {}", output.display());
    Ok(ExitCode::SUCCESS)
}

fn copy_output(hex: &Path, output: &Path) -> CliResult<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| CliError::failure(format!("Error creating {}: {}", parent.display(), e)))?;
    }
    fs::copy(hex, output)
        .map(|_| ())
        .map_err(|e| CliError::failure(format!("Error writing {}: {}", output.display(), e)))
}
