//! Policy checks configured from string options.
//!
//! A check is created from a name and an `{option: value}` map. The
//! `check_type` option selects the module from the [`registry`]; `desc` and
//! `disable` are accepted by every module, and each module adds its own
//! options. Unknown options are rejected.
//!
//! ```ignore
//! let mut config = CheckConfig::new();
//! config.insert("check_type".into(), "ro_execs".into());
//! config.insert("exempt_write_domain".into(), "rpm_t".into());
//!
//! let check = create_check(&policy, "no_exec_write", &config)?;
//! for finding in check.run() {
//!     println!("{}", finding);
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PolicyError, Result};
use crate::policy::Policy;

mod assert;
mod emptyattr;
pub(crate) mod options;
mod readonly;

pub use assert::{AssertRbac, AssertTe};
pub use emptyattr::EmptyTypeAttr;
pub use readonly::ReadOnlyTypes;

/// Option map of a single check.
pub type CheckConfig = BTreeMap<String, String>;

pub const CHECK_TYPE_KEY: &str = "check_type";
pub const CHECK_DESC_KEY: &str = "desc";
pub const CHECK_DISABLE_KEY: &str = "disable";

/// Options every check accepts.
pub const GLOBAL_CONFIG_KEYS: [&str; 3] = [CHECK_TYPE_KEY, CHECK_DESC_KEY, CHECK_DISABLE_KEY];

// =============================================================================
// FINDINGS
// =============================================================================

/// One failed item reported by a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "item", rename_all = "snake_case")]
pub enum Finding {
    /// A rule that violates the check, rendered in policy syntax.
    Rule(String),
    /// A type that violates the check.
    Type(String),
    /// Something the check expected and did not find.
    Missing(String),
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::Rule(s) | Finding::Type(s) | Finding::Missing(s) => f.write_str(s),
        }
    }
}

// =============================================================================
// CHECKER MODULES
// =============================================================================

/// Name and global options shared by every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckBase {
    pub name: String,
    pub desc: Option<String>,
    /// Reason the check is disabled; runners skip disabled checks.
    pub disable: Option<String>,
}

pub trait CheckerModule: fmt::Debug {
    /// Registry key of the module.
    fn check_type(&self) -> &'static str;

    fn base(&self) -> &CheckBase;

    fn name(&self) -> &str {
        &self.base().name
    }

    fn desc(&self) -> Option<&str> {
        self.base().desc.as_deref()
    }

    fn disable(&self) -> Option<&str> {
        self.base().disable.as_deref()
    }

    /// Run the check. An empty result means the check passed.
    fn run(&self) -> Vec<Finding>;
}

type BuildFn =
    for<'p> fn(&'p Policy, CheckBase, &CheckConfig) -> Result<Box<dyn CheckerModule + 'p>>;

/// Registry entry: module-specific options and constructor.
#[derive(Clone, Copy)]
pub struct CheckerEntry {
    pub options: &'static [&'static str],
    build: BuildFn,
}

impl fmt::Debug for CheckerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckerEntry")
            .field("options", &self.options)
            .finish()
    }
}

static REGISTRY: Lazy<BTreeMap<&'static str, CheckerEntry>> = Lazy::new(|| {
    let mut registry = BTreeMap::new();
    registry.insert(
        assert::ASSERT_TE,
        CheckerEntry {
            options: assert::ASSERT_TE_OPTIONS,
            build: assert::build_assert_te,
        },
    );
    registry.insert(
        assert::ASSERT_RBAC,
        CheckerEntry {
            options: assert::ASSERT_RBAC_OPTIONS,
            build: assert::build_assert_rbac,
        },
    );
    registry.insert(
        emptyattr::EMPTY_TYPEATTR,
        CheckerEntry {
            options: emptyattr::OPTIONS,
            build: emptyattr::build,
        },
    );
    registry.insert(
        readonly::RO_EXECS,
        CheckerEntry {
            options: readonly::RO_EXECS_OPTIONS,
            build: readonly::build_ro_execs,
        },
    );
    registry.insert(
        readonly::RO_KMODS,
        CheckerEntry {
            options: readonly::RO_KMODS_OPTIONS,
            build: readonly::build_ro_kmods,
        },
    );
    registry
});

/// All checker modules by `check_type`.
pub fn registry() -> &'static BTreeMap<&'static str, CheckerEntry> {
    &REGISTRY
}

/// Instantiate the check `name` from its option map.
pub fn create_check<'p>(
    policy: &'p Policy,
    name: &str,
    config: &CheckConfig,
) -> Result<Box<dyn CheckerModule + 'p>> {
    let check_type = options::get(config, CHECK_TYPE_KEY).unwrap_or_default();
    let entry = registry()
        .get(check_type)
        .ok_or_else(|| PolicyError::InvalidCheckerModule {
            check: name.to_string(),
            check_type: check_type.to_string(),
        })?;

    if let Some(option) = config
        .keys()
        .find(|k| !GLOBAL_CONFIG_KEYS.contains(&k.as_str()) && !entry.options.contains(&k.as_str()))
    {
        return Err(PolicyError::InvalidCheckOption {
            check: name.to_string(),
            option: option.clone(),
        });
    }

    let base = CheckBase {
        name: name.to_string(),
        desc: options::get(config, CHECK_DESC_KEY).map(str::to_string),
        disable: options::get(config, CHECK_DISABLE_KEY).map(str::to_string),
    };
    debug!("Creating check {} of type {}", name, check_type);
    (entry.build)(policy, base, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyBuilder;

    fn config(pairs: &[(&str, &str)]) -> CheckConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn policy() -> Policy {
        let mut b = PolicyBuilder::new("checker");
        b.attribute("empty_attr").unwrap();
        b.build()
    }

    #[test]
    fn test_registry_contents() {
        let names: Vec<_> = registry().keys().copied().collect();
        assert_eq!(
            names,
            vec!["assert_rbac", "assert_te", "empty_typeattr", "ro_execs", "ro_kmods"]
        );
    }

    #[test]
    fn test_unknown_module() {
        let p = policy();
        let err = create_check(&p, "c1", &config(&[("check_type", "no_such_check")])).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidCheckerModule { .. }));

        let err = create_check(&p, "c1", &config(&[])).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidCheckerModule { .. }));
    }

    #[test]
    fn test_unknown_option() {
        let p = policy();
        let err = create_check(
            &p,
            "c1",
            &config(&[("check_type", "empty_typeattr"), ("attr", "empty_attr"), ("bogus", "x")]),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "c1: Invalid option: bogus");
    }

    #[test]
    fn test_global_options() {
        let p = policy();
        let check = create_check(
            &p,
            "c1",
            &config(&[
                ("check_type", "empty_typeattr"),
                ("attr", "empty_attr"),
                ("desc", "attribute must stay empty"),
                ("disable", "pending review"),
            ]),
        )
        .unwrap();
        assert_eq!(check.name(), "c1");
        assert_eq!(check.check_type(), "empty_typeattr");
        assert_eq!(check.desc(), Some("attribute must stay empty"));
        assert_eq!(check.disable(), Some("pending review"));
        assert!(check.run().is_empty());
    }

    #[test]
    fn test_finding_serialization() {
        let finding = Finding::Type("user_t".to_string());
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "type", "item": "user_t"}));
        assert_eq!(finding.to_string(), "user_t");
    }
}
