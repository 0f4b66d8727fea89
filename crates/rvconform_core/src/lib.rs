//! Provide the shared, pure vocabulary of the rvconform orchestrator.
//!
//! This crate is intentionally small and dependency-free. It contains:
//! - the **test-set registry**: which conformance sets exist, what family they belong to, which compiler profile
//!   they need, and their member tests in declaration order, and
//! - the **ROM hex codec**: the space-separated, two-digit uppercase hex text the simulation harness loads into
//!   its memory array.
//!
//! ## Notes
//!
//! - No IO, no global state, no process handling. Everything here is deterministic and `const`-friendly so both the
//!   orchestrator and its tests reason about the same tables.

pub mod catalog;
pub mod hex;

pub use catalog::{DEFAULT_TEST_SET, IsaProfile, TEST_SETS, TestFamily, TestSetInfo};
