#![deny(unsafe_code)]
//! RISC-V core conformance test orchestrator
//!
//! Builds single-instruction ISA test programs into ROM images with an external LLVM toolchain,
//! runs them on a simulation harness (or runs native per-module test binaries), and reports a
//! Passed / Failed / TimedOut / toolchain-error verdict for every test.
//!
//! ## Panic Policy
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module
//!   enforces `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Unsafe code**: denied crate-wide. The only exception is the `killpg` call in `harness`
//!   that terminates a timed-out harness's process group.
//!
//! - **Per-test failures are values**: a broken toolchain step or a hung harness becomes a
//!   [`outcome::TestOutcome`], never a panic or an early return from the run.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod executor;
pub mod harness;
pub mod outcome;
pub mod pipeline;
pub mod report;
pub mod toolchain;

pub use catalog::{TestCase, TestCatalog};
pub use config::{RunConfig, Toolchain};
pub use executor::{RunError, RunSummary, TestSetExecutor};
pub use harness::{Harness, HarnessRunner};
pub use outcome::{TestOutcome, ToolchainError, ToolchainStage};
pub use pipeline::{ArtifactBuilder, ArtifactPipeline};
