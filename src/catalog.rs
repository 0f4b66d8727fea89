//! Test catalog: materializes [`TestCase`]s from the static set registry
//!
//! The registry in `rvconform_core::catalog` only knows names. This module attaches the filesystem
//! locations of each test's source according to the project layout in [`RunConfig`].

use std::path::PathBuf;

use rvconform_core::catalog::{self, ALL_SETS, DEFAULT_TEST_SET, TEST_SETS, TestFamily, TestSetInfo};
use thiserror::Error;

use crate::config::RunConfig;

/// One named test within a set. Identity is `(set, name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub set: &'static str,
    pub name: String,
    /// Assembly source (ISA sets) or C++ test source (module sets)
    pub source_path: PathBuf,
}

impl TestCase {
    /// `set::name`, unique across the whole catalog.
    pub fn id(&self) -> String {
        format!("{}::{}", self.set, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown test set `{id}` (known sets: {known})")]
    UnknownSet { id: String, known: String },
}

/// Catalog view bound to one project root.
#[derive(Debug, Clone)]
pub struct TestCatalog {
    config: RunConfig,
}

impl TestCatalog {
    pub fn new(config: &RunConfig) -> Self {
        Self { config: config.clone() }
    }

    /// Look up a single set.
    pub fn set(&self, id: &str) -> Result<&'static TestSetInfo, CatalogError> {
        catalog::from_str(id).ok_or_else(|| CatalogError::UnknownSet {
            id: id.to_string(),
            known: known_ids(),
        })
    }

    /// Resolve the sets requested on the command line, in the caller's order.
    ///
    /// No ids selects the default set; `all` expands to every set. Repeated ids run once.
    pub fn resolve_sets<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<&'static TestSetInfo>, CatalogError> {
        if ids.is_empty() {
            return Ok(vec![self.set(DEFAULT_TEST_SET)?]);
        }

        let mut sets: Vec<&'static TestSetInfo> = Vec::new();
        for id in ids {
            let id = id.as_ref();
            let expanded: Vec<&'static TestSetInfo> = if id == ALL_SETS {
                TEST_SETS.iter().collect()
            } else {
                vec![self.set(id)?]
            };
            for set in expanded {
                if !sets.iter().any(|s| s.id == set.id) {
                    sets.push(set);
                }
            }
        }
        Ok(sets)
    }

    /// Ordered test cases of a set, in declaration order.
    pub fn tests_in(&self, id: &str) -> Result<Vec<TestCase>, CatalogError> {
        let set = self.set(id)?;
        Ok(set.tests.iter().map(|name| self.test_case(set, name)).collect())
    }

    fn test_case(&self, set: &'static TestSetInfo, name: &str) -> TestCase {
        let source_path = match set.family {
            TestFamily::Isa(_) => self.config.isa_source_dir(set.id).join(format!("{name}.S")),
            TestFamily::Module => self
                .config
                .native_source_dir(set.native_project)
                .join(format!("{name}.cpp")),
        };
        TestCase {
            set: set.id,
            name: name.to_string(),
            source_path,
        }
    }
}

fn known_ids() -> String {
    catalog::ids().chain([ALL_SETS]).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn catalog() -> TestCatalog {
        TestCatalog::new(&RunConfig::new("/core"))
    }

    #[test]
    fn test_tests_in_preserves_declaration_order() {
        let tests = catalog().tests_in("rv32um").unwrap();
        let names: Vec<&str> = tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["div", "divu", "mul", "mulh", "mulhsu", "mulhu", "rem", "remu"]);
    }

    #[test]
    fn test_isa_source_path() {
        let tests = catalog().tests_in("rv32ui").unwrap();
        let add = tests.iter().find(|t| t.name == "add").unwrap();
        assert_eq!(add.source_path, Path::new("/core/architecture_tests/isa/rv32ui/add.S"));
        assert_eq!(add.id(), "rv32ui::add");
    }

    #[test]
    fn test_module_source_path() {
        let tests = catalog().tests_in("modules").unwrap();
        assert_eq!(tests[1].name, "BusArbiter");
        assert_eq!(tests[1].source_path, Path::new("/core/src/module_tests/BusArbiter.cpp"));
    }

    #[test]
    fn test_resolve_default_and_all() {
        let cat = catalog();
        let none: [&str; 0] = [];
        let default = cat.resolve_sets(&none).unwrap();
        assert_eq!(default.len(), 1);
        assert_eq!(default[0].id, DEFAULT_TEST_SET);

        let all = cat.resolve_sets(&["all"]).unwrap();
        assert_eq!(all.len(), TEST_SETS.len());
    }

    #[test]
    fn test_resolve_keeps_caller_order_and_dedupes() {
        let sets = catalog().resolve_sets(&["modules", "rv32um", "modules"]).unwrap();
        let ids: Vec<&str> = sets.iter().map(|s| s.id).collect();
        assert_eq!(ids, ["modules", "rv32um"]);
    }

    #[test]
    fn test_unknown_set_lists_known_ids() {
        let err = catalog().tests_in("rv64gc").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("rv64gc"));
        assert!(msg.contains("rv32ui, rv32um, modules, all"));
    }
}
