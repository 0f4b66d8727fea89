//! Test-set registry.
//!
//! This module is the single source of truth for which conformance tests exist. Each entry maps a set id to its
//! family (single-instruction ISA programs or native module tests), the compiler profile it needs, the native
//! project that builds its harness, and the ordered list of member tests.
//!
//! ## Notes
//! - Member order is declaration order and is significant: reporting preserves it.
//! - Entries are `Copy` so the registry can live in a `const` table.
//!
//! ## Examples
//! ```rust
//! use rvconform_core::catalog::{self, TestFamily};
//!
//! let set = catalog::from_str("rv32um").unwrap();
//! assert!(matches!(set.family, TestFamily::Isa(p) if p.march == "rv32im"));
//! assert_eq!(set.tests.first(), Some(&"div"));
//! ```

/// Compiler profile required by an ISA test set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsaProfile {
    /// Value for `-march=` (baseline integer ISA, optionally with multiply/divide).
    pub march: &'static str,
    /// Register the test macros use as the self-check marker (`-DTESTNUM=`).
    pub test_register: &'static str,
}

/// Baseline RV32 integer profile.
pub const RV32I: IsaProfile = IsaProfile {
    march: "rv32i",
    test_register: "x31",
};

/// RV32 integer profile with the multiply/divide extension.
pub const RV32IM: IsaProfile = IsaProfile {
    march: "rv32im",
    test_register: "x31",
};

/// How the tests of a set are turned into something runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFamily {
    /// One assembly source per test, compiled to a ROM image and run on the simulation harness.
    Isa(IsaProfile),
    /// One prebuilt native executable per test (`<Name>-test`), judged by its exit status.
    Module,
}

impl TestFamily {
    /// Short lowercase label for listings.
    pub fn label(&self) -> &'static str {
        match self {
            TestFamily::Isa(_) => "isa",
            TestFamily::Module => "module",
        }
    }
}

/// Metadata entry for one test set.
#[derive(Debug, Clone, Copy)]
pub struct TestSetInfo {
    /// Stable set identifier, as accepted on the command line.
    pub id: &'static str,
    pub family: TestFamily,
    /// Native CMake project (under `src/` and the build directory) that produces the harness executables.
    pub native_project: &'static str,
    /// Member tests in declaration order.
    pub tests: &'static [&'static str],
    pub description: &'static str,
}

/// Native project that builds the simulation harness (`testbench`).
pub const ARCHITECTURE_PROJECT: &str = "architecture_tests";

/// Native project that builds the module test binaries.
pub const MODULE_PROJECT: &str = "module_tests";

/// Set run when none is requested.
pub const DEFAULT_TEST_SET: &str = "rv32ui";

/// Pseudo-id expanding to every registered set.
pub const ALL_SETS: &str = "all";

/// Registry of conformance test sets, in run order for [`ALL_SETS`].
pub const TEST_SETS: &[TestSetInfo] = &[
    TestSetInfo {
        id: "rv32ui",
        family: TestFamily::Isa(RV32I),
        native_project: ARCHITECTURE_PROJECT,
        tests: &[
            "simple", "add", "addi", "and", "andi", "auipc", "beq", "bge", "bgeu", "blt", "bltu", "bne", "fence_i",
            "jal", "jalr", "lb", "lbu", "lh", "lhu", "lw", "lui", "or", "ori", "sb", "sh", "sw", "sll", "slli", "slt",
            "slti", "sltiu", "sltu", "sra", "srai", "srl", "srli", "sub", "xor",
        ],
        description: "RV32I user-level single-instruction tests.",
    },
    TestSetInfo {
        id: "rv32um",
        family: TestFamily::Isa(RV32IM),
        native_project: ARCHITECTURE_PROJECT,
        tests: &["div", "divu", "mul", "mulh", "mulhsu", "mulhu", "rem", "remu"],
        description: "RV32M multiply/divide single-instruction tests.",
    },
    TestSetInfo {
        id: "modules",
        family: TestFamily::Module,
        native_project: MODULE_PROJECT,
        tests: &["FlattenTest", "BusArbiter", "IntegerUnit"],
        description: "Native unit tests for individual hardware blocks.",
    },
];

/// Resolve a set id to its registry entry.
pub fn from_str(id: &str) -> Option<&'static TestSetInfo> {
    TEST_SETS.iter().find(|s| s.id == id)
}

/// Iterate over all registered set ids in declaration order.
pub fn ids() -> impl Iterator<Item = &'static str> {
    TEST_SETS.iter().map(|s| s.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_set_ids_are_unique() {
        let mut seen = HashSet::new();
        for id in ids() {
            assert!(seen.insert(id), "duplicate set id {id}");
        }
        assert!(!seen.contains(ALL_SETS));
    }

    #[test]
    fn test_member_names_are_unique_within_set() {
        for set in TEST_SETS {
            let mut seen = HashSet::new();
            for name in set.tests {
                assert!(seen.insert(name), "duplicate test {name} in {}", set.id);
            }
        }
    }

    #[test]
    fn test_default_set_is_registered() {
        assert!(from_str(DEFAULT_TEST_SET).is_some());
    }

    #[test]
    fn test_declaration_order_is_kept() {
        let set = from_str("rv32ui").unwrap();
        assert_eq!(&set.tests[..3], &["simple", "add", "addi"]);
        assert_eq!(set.tests.last(), Some(&"xor"));
    }

    #[test]
    fn test_um_profile_extends_baseline() {
        let ui = from_str("rv32ui").unwrap();
        let um = from_str("rv32um").unwrap();
        assert_eq!(ui.family, TestFamily::Isa(RV32I));
        assert_eq!(um.family, TestFamily::Isa(RV32IM));
        assert_eq!(RV32I.test_register, RV32IM.test_register);
    }

    #[test]
    fn test_module_family_uses_module_project() {
        let set = from_str("modules").unwrap();
        assert_eq!(set.family, TestFamily::Module);
        assert_eq!(set.native_project, MODULE_PROJECT);
        assert_eq!(set.family.label(), "module");
    }

    #[test]
    fn test_unknown_set() {
        assert!(from_str("rv64ui").is_none());
        assert!(from_str(ALL_SETS).is_none());
    }
}
