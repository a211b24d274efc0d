//! Read-only file checks: files that can be executed (or loaded as kernel
//! modules) must not be writable by any non-exempt domain.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{ClassId, Policy, TeRule, TeRuletype, TypeId};

use super::options;
use super::{CheckBase, CheckConfig, CheckerModule, Finding};

pub(super) const RO_EXECS: &str = "ro_execs";
pub(super) const RO_KMODS: &str = "ro_kmods";

const EXEMPT_EXEC_OPT: &str = "exempt_exec_domain";
const EXEMPT_LOAD_OPT: &str = "exempt_load_domain";
const EXEMPT_WRITE_OPT: &str = "exempt_write_domain";
const EXEMPT_FILE_OPT: &str = "exempt_file";

pub(super) const RO_EXECS_OPTIONS: &[&str] = &[EXEMPT_EXEC_OPT, EXEMPT_WRITE_OPT, EXEMPT_FILE_OPT];
pub(super) const RO_KMODS_OPTIONS: &[&str] = &[EXEMPT_LOAD_OPT, EXEMPT_WRITE_OPT, EXEMPT_FILE_OPT];

const WRITE_CLASS: &str = "file";
const WRITE_PERMS: &[&str] = &["write", "append"];

/// What makes a file type "in use".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UseKind {
    /// `allow domain file_t:file { execute execute_no_trans };`
    Exec,
    /// `allow domain file_t:system module_load;`
    KernelModule,
}

impl UseKind {
    fn class(self) -> &'static str {
        match self {
            UseKind::Exec => "file",
            UseKind::KernelModule => "system",
        }
    }

    fn perms(self) -> &'static [&'static str] {
        match self {
            UseKind::Exec => &["execute", "execute_no_trans"],
            UseKind::KernelModule => &["module_load"],
        }
    }

    fn exempt_option(self) -> &'static str {
        match self {
            UseKind::Exec => EXEMPT_EXEC_OPT,
            UseKind::KernelModule => EXEMPT_LOAD_OPT,
        }
    }
}

/// Fails for every used file type that a non-exempt domain can write.
#[derive(Debug, Clone)]
pub struct ReadOnlyTypes<'p> {
    policy: &'p Policy,
    base: CheckBase,
    kind: UseKind,
    exempt_use_domain: BTreeSet<TypeId>,
    exempt_write_domain: BTreeSet<TypeId>,
    exempt_file: BTreeSet<TypeId>,
}

impl<'p> ReadOnlyTypes<'p> {
    fn new(policy: &'p Policy, base: CheckBase, config: &CheckConfig, kind: UseKind) -> Result<Self> {
        let exempt_use_domain = options::type_set(policy, &base, config, kind.exempt_option(), false)?;
        let exempt_write_domain = options::type_set(policy, &base, config, EXEMPT_WRITE_OPT, false)?;
        let exempt_file = options::type_set(policy, &base, config, EXEMPT_FILE_OPT, false)?;
        Ok(Self {
            policy,
            base,
            kind,
            exempt_use_domain,
            exempt_write_domain,
            exempt_file,
        })
    }

    /// Allow rules on `class` granting any of `perms`. A class missing from
    /// the policy selects nothing.
    fn allow_rules<'a>(
        &'a self,
        class: &str,
        perms: &'static [&'static str],
    ) -> impl Iterator<Item = &'p TeRule> + 'a {
        let class: Option<ClassId> = self.policy.lookup_class(class).ok().map(|c| c.id);
        self.policy.terules().filter(move |rule| {
            rule.ruletype == TeRuletype::Allow
                && Some(rule.tclass) == class
                && rule
                    .perms()
                    .map_or(false, |p| perms.iter().any(|perm| p.contains(*perm)))
        })
    }

    /// Non-exempt file types used by non-exempt domains.
    fn used_types(&self) -> BTreeSet<TypeId> {
        let mut used = BTreeSet::new();
        for rule in self.allow_rules(self.kind.class(), self.kind.perms()) {
            let sources: BTreeSet<TypeId> = rule
                .source
                .expand(self.policy)
                .iter()
                .filter(|t| !self.exempt_use_domain.contains(t))
                .copied()
                .collect();
            let mut targets: BTreeSet<TypeId> = rule
                .target
                .expand(self.policy)
                .iter()
                .filter(|t| !self.exempt_file.contains(t))
                .copied()
                .collect();
            if self.kind == UseKind::KernelModule {
                // self rules do not name a module file
                targets.retain(|t| !sources.contains(t));
            }
            if sources.is_empty() || targets.is_empty() {
                continue;
            }
            debug!("Used types from {}: {:?}", self.kind.class(), targets);
            used.extend(targets);
        }
        used
    }
}

impl CheckerModule for ReadOnlyTypes<'_> {
    fn check_type(&self) -> &'static str {
        match self.kind {
            UseKind::Exec => RO_EXECS,
            UseKind::KernelModule => RO_KMODS,
        }
    }

    fn base(&self) -> &CheckBase {
        &self.base
    }

    fn run(&self) -> Vec<Finding> {
        info!("Checking {} types are read-only.", self.check_type());
        let used = self.used_types();

        let mut writable = BTreeSet::new();
        for rule in self.allow_rules(WRITE_CLASS, WRITE_PERMS) {
            let writers = rule
                .source
                .expand(self.policy)
                .iter()
                .any(|t| !self.exempt_write_domain.contains(t));
            if !writers {
                continue;
            }
            for target in rule.target.expand(self.policy) {
                if used.contains(target) && writable.insert(*target) {
                    info!("F   * {} writable by {}", self.policy.type_(*target).name, rule.source.name(self.policy));
                }
            }
        }

        let mut failures: Vec<String> = writable
            .into_iter()
            .map(|t| self.policy.type_(t).name.clone())
            .collect();
        failures.sort();
        for name in used.iter().map(|t| &self.policy.type_(*t).name) {
            if !failures.contains(name) {
                debug!("P   * {}", name);
            }
        }
        failures.into_iter().map(Finding::Type).collect()
    }
}

pub(super) fn build_ro_execs<'p>(
    policy: &'p Policy,
    base: CheckBase,
    config: &CheckConfig,
) -> Result<Box<dyn CheckerModule + 'p>> {
    Ok(Box::new(ReadOnlyTypes::new(policy, base, config, UseKind::Exec)?))
}

pub(super) fn build_ro_kmods<'p>(
    policy: &'p Policy,
    base: CheckBase,
    config: &CheckConfig,
) -> Result<Box<dyn CheckerModule + 'p>> {
    Ok(Box::new(ReadOnlyTypes::new(
        policy,
        base,
        config,
        UseKind::KernelModule,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::create_check;
    use crate::policy::PolicyBuilder;

    fn config(pairs: &[(&str, &str)]) -> CheckConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn policy() -> Policy {
        let mut b = PolicyBuilder::new("readonly");
        b.class(
            "file",
            &["read", "write", "append", "execute", "execute_no_trans"],
            None,
        )
        .unwrap();
        b.class("system", &["module_load", "reboot"], None).unwrap();
        b.attribute("domain").unwrap();
        b.type_("init_t", &["domain"]).unwrap();
        b.type_("rpm_t", &["domain"]).unwrap();
        b.type_("bin_t", &[]).unwrap();
        b.type_("sbin_t", &[]).unwrap();
        b.type_("tmp_t", &[]).unwrap();
        b.type_("modules_t", &[]).unwrap();
        b.allow("domain", "bin_t", "file", &["execute"]).unwrap();
        b.allow("init_t", "sbin_t", "file", &["execute_no_trans"]).unwrap();
        b.allow("init_t", "tmp_t", "file", &["read", "write"]).unwrap();
        b.allow("rpm_t", "bin_t", "file", &["write"]).unwrap();
        b.allow("init_t", "sbin_t", "file", &["append"]).unwrap();
        b.allow("init_t", "modules_t", "system", &["module_load"]).unwrap();
        b.allow("init_t", "init_t", "system", &["module_load"]).unwrap();
        b.allow("rpm_t", "modules_t", "file", &["write"]).unwrap();
        b.build()
    }

    // =========================================================================
    // ro_execs
    // =========================================================================

    #[test]
    fn test_writable_executables() {
        let p = policy();
        let check = create_check(&p, "execs", &config(&[("check_type", "ro_execs")])).unwrap();
        assert_eq!(
            check.run(),
            vec![
                Finding::Type("bin_t".to_string()),
                Finding::Type("sbin_t".to_string())
            ]
        );
    }

    #[test]
    fn test_exemptions() {
        let p = policy();
        let check = create_check(
            &p,
            "execs",
            &config(&[
                ("check_type", "ro_execs"),
                ("exempt_write_domain", "rpm_t"),
                ("exempt_file", "sbin_t"),
            ]),
        )
        .unwrap();
        assert!(check.run().is_empty());

        let check = create_check(
            &p,
            "execs",
            &config(&[("check_type", "ro_execs"), ("exempt_exec_domain", "init_t")]),
        )
        .unwrap();
        assert_eq!(check.run(), vec![Finding::Type("bin_t".to_string())]);
    }

    // =========================================================================
    // ro_kmods
    // =========================================================================

    #[test]
    fn test_writable_kernel_modules() {
        let p = policy();
        let check = create_check(&p, "kmods", &config(&[("check_type", "ro_kmods")])).unwrap();
        assert_eq!(check.check_type(), "ro_kmods");
        assert_eq!(check.run(), vec![Finding::Type("modules_t".to_string())]);

        let check = create_check(
            &p,
            "kmods",
            &config(&[("check_type", "ro_kmods"), ("exempt_load_domain", "init_t")]),
        )
        .unwrap();
        assert!(check.run().is_empty());
    }
}
