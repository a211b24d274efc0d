//! Rule assertions: every matching allow rule must be expected or exempt,
//! and every expected source/target must appear in some matching rule.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{
    Policy, PolicyDisplay, RbacRuletype, RbacTarget, RoleId, TeRuletype, TypeId,
};
use crate::query::{RbacRuleQuery, TeRuleQuery};

use super::options::{self, invalid_value};
use super::{CheckBase, CheckConfig, CheckerModule, Finding};

pub(super) const ASSERT_TE: &str = "assert_te";
pub(super) const ASSERT_RBAC: &str = "assert_rbac";

const SOURCE_OPT: &str = "source";
const TARGET_OPT: &str = "target";
const CLASS_OPT: &str = "tclass";
const PERMS_OPT: &str = "perms";
const EXEMPT_SRC_OPT: &str = "exempt_source";
const EXEMPT_TGT_OPT: &str = "exempt_target";
const EXPECT_SRC_OPT: &str = "expect_source";
const EXPECT_TGT_OPT: &str = "expect_target";

pub(super) const ASSERT_TE_OPTIONS: &[&str] = &[
    SOURCE_OPT,
    TARGET_OPT,
    CLASS_OPT,
    PERMS_OPT,
    EXEMPT_SRC_OPT,
    EXEMPT_TGT_OPT,
    EXPECT_SRC_OPT,
    EXPECT_TGT_OPT,
];

pub(super) const ASSERT_RBAC_OPTIONS: &[&str] = &[
    SOURCE_OPT,
    TARGET_OPT,
    EXEMPT_SRC_OPT,
    EXEMPT_TGT_OPT,
    EXPECT_SRC_OPT,
    EXPECT_TGT_OPT,
];

/// Expected and exempt endpoints of an assertion.
#[derive(Debug, Clone)]
struct Endpoints<T> {
    exempt_source: BTreeSet<T>,
    exempt_target: BTreeSet<T>,
    expect_source: BTreeSet<T>,
    expect_target: BTreeSet<T>,
}

impl<T: Ord + Copy> Endpoints<T> {
    fn log_overlap(&self, base: &CheckBase, name: impl Fn(T) -> String) {
        for (kind, exempt, expect) in [
            ("source", &self.exempt_source, &self.expect_source),
            ("target", &self.exempt_target, &self.expect_target),
        ] {
            let overlap: Vec<String> = exempt.intersection(expect).map(|t| name(*t)).collect();
            if !overlap.is_empty() {
                info!(
                    "{}: Overlap in expect_{} and exempt_{}: {}",
                    base.name,
                    kind,
                    kind,
                    overlap.join(", ")
                );
            }
        }
    }

    /// A rule fails when both its sources and its targets reach beyond the
    /// expected and exempt sets.
    fn violates(&self, sources: &BTreeSet<T>, targets: &BTreeSet<T>) -> bool {
        let outside = |items: &BTreeSet<T>, expect: &BTreeSet<T>, exempt: &BTreeSet<T>| {
            items.iter().any(|i| !expect.contains(i) && !exempt.contains(i))
        };
        outside(sources, &self.expect_source, &self.exempt_source)
            && outside(targets, &self.expect_target, &self.exempt_target)
    }

    /// Walk the matching rules, then report expected endpoints never seen.
    fn evaluate<R>(
        &self,
        rules: impl Iterator<Item = R>,
        expand: impl Fn(&R) -> (BTreeSet<T>, BTreeSet<T>),
        render: impl Fn(&R) -> String,
        name: impl Fn(T) -> String,
    ) -> Vec<Finding> {
        let mut unseen_sources = self.expect_source.clone();
        let mut unseen_targets = self.expect_target.clone();
        let mut failures = Vec::new();

        for rule in rules {
            let (sources, targets) = expand(&rule);
            unseen_sources.retain(|s| !sources.contains(s));
            unseen_targets.retain(|t| !targets.contains(t));

            let text = render(&rule);
            if self.violates(&sources, &targets) {
                info!("F   * {}", text);
                failures.push(Finding::Rule(text));
            } else {
                debug!("P   * {}", text);
            }
        }

        for (kind, unseen) in [("source", unseen_sources), ("target", unseen_targets)] {
            for item in unseen {
                let failure = format!("Expected rule with {} \"{}\" not found.", kind, name(item));
                info!("F   * {}", failure);
                failures.push(Finding::Missing(failure));
            }
        }

        debug!("{} failure(s)", failures.len());
        failures
    }
}

// =============================================================================
// TYPE ENFORCEMENT
// =============================================================================

/// Assert on TE allow rules selected by source, target, class and perms.
#[derive(Debug, Clone)]
pub struct AssertTe<'p> {
    policy: &'p Policy,
    base: CheckBase,
    query: TeRuleQuery<'p>,
    endpoints: Endpoints<TypeId>,
}

impl<'p> AssertTe<'p> {
    pub fn new(policy: &'p Policy, base: CheckBase, config: &CheckConfig) -> Result<Self> {
        let source = options::type_or_attr(policy, &base, config, SOURCE_OPT)?;
        let target = options::type_or_attr(policy, &base, config, TARGET_OPT)?;
        let tclass = options::class_set(policy, &base, config, CLASS_OPT)?;
        let classes: Vec<_> = tclass.iter().copied().collect();
        let perms = options::perm_set(policy, &base, config, PERMS_OPT, &classes)?;

        if source.is_none() && target.is_none() && tclass.is_empty() && perms.is_empty() {
            return Err(invalid_value(
                &base.name,
                "options",
                "At least one of source, target, tclass, or perms options must be set.",
            ));
        }

        let mut query = TeRuleQuery::new(policy).with_ruletypes([TeRuletype::Allow]);
        if let Some(source) = source {
            query = query.with_source(source.name(policy))?;
        }
        if let Some(target) = target {
            query = query.with_target(target.name(policy))?;
        }
        if !tclass.is_empty() {
            query = query.with_tclass(tclass.iter().map(|c| policy.class(*c).name.as_str()))?;
        }
        if !perms.is_empty() {
            query = query.with_perms(&perms)?;
        }

        let endpoints = Endpoints {
            exempt_source: options::type_set(policy, &base, config, EXEMPT_SRC_OPT, false)?,
            exempt_target: options::type_set(policy, &base, config, EXEMPT_TGT_OPT, false)?,
            expect_source: options::type_set(policy, &base, config, EXPECT_SRC_OPT, true)?,
            expect_target: options::type_set(policy, &base, config, EXPECT_TGT_OPT, true)?,
        };
        endpoints.log_overlap(&base, |t| policy.type_(t).name.clone());

        Ok(Self {
            policy,
            base,
            query,
            endpoints,
        })
    }
}

impl CheckerModule for AssertTe<'_> {
    fn check_type(&self) -> &'static str {
        ASSERT_TE
    }

    fn base(&self) -> &CheckBase {
        &self.base
    }

    fn run(&self) -> Vec<Finding> {
        info!("Checking TE allow rule assertion.");
        let policy = self.policy;
        self.endpoints.evaluate(
            self.query.results(),
            |rule| {
                (
                    rule.source.expand(policy).iter().copied().collect(),
                    rule.target.expand(policy).iter().copied().collect(),
                )
            },
            |rule| rule.display(policy).to_string(),
            |t| policy.type_(t).name.clone(),
        )
    }
}

pub(super) fn build_assert_te<'p>(
    policy: &'p Policy,
    base: CheckBase,
    config: &CheckConfig,
) -> Result<Box<dyn CheckerModule + 'p>> {
    Ok(Box::new(AssertTe::new(policy, base, config)?))
}

// =============================================================================
// RBAC
// =============================================================================

/// Assert on role allow rules.
#[derive(Debug, Clone)]
pub struct AssertRbac<'p> {
    policy: &'p Policy,
    base: CheckBase,
    query: RbacRuleQuery<'p>,
    endpoints: Endpoints<RoleId>,
}

impl<'p> AssertRbac<'p> {
    pub fn new(policy: &'p Policy, base: CheckBase, config: &CheckConfig) -> Result<Self> {
        let source = options::role(policy, &base, config, SOURCE_OPT)?;
        let target = options::role(policy, &base, config, TARGET_OPT)?;
        if source.is_none() && target.is_none() {
            return Err(invalid_value(
                &base.name,
                "options",
                "At least one of source or target options must be set.",
            ));
        }

        let mut query = RbacRuleQuery::new(policy).with_ruletypes([RbacRuletype::Allow]);
        if let Some(source) = source {
            query = query.with_source(&policy.role(source).name)?;
        }
        if let Some(target) = target {
            query = query.with_target(&policy.role(target).name)?;
        }

        let endpoints = Endpoints {
            exempt_source: options::role_set(policy, &base, config, EXEMPT_SRC_OPT, false)?,
            exempt_target: options::role_set(policy, &base, config, EXEMPT_TGT_OPT, false)?,
            expect_source: options::role_set(policy, &base, config, EXPECT_SRC_OPT, true)?,
            expect_target: options::role_set(policy, &base, config, EXPECT_TGT_OPT, true)?,
        };
        endpoints.log_overlap(&base, |r| policy.role(r).name.clone());

        Ok(Self {
            policy,
            base,
            query,
            endpoints,
        })
    }
}

impl CheckerModule for AssertRbac<'_> {
    fn check_type(&self) -> &'static str {
        ASSERT_RBAC
    }

    fn base(&self) -> &CheckBase {
        &self.base
    }

    fn run(&self) -> Vec<Finding> {
        info!("Checking RBAC allow rule assertion.");
        let policy = self.policy;
        self.endpoints.evaluate(
            self.query.results(),
            |rule| {
                let sources = policy.role(rule.source).expand().iter().copied().collect();
                let targets = match rule.target {
                    RbacTarget::Role(r) => policy.role(r).expand().iter().copied().collect(),
                    RbacTarget::Type(_) => BTreeSet::new(),
                };
                (sources, targets)
            },
            |rule| rule.display(policy).to_string(),
            |r| policy.role(r).name.clone(),
        )
    }
}

pub(super) fn build_assert_rbac<'p>(
    policy: &'p Policy,
    base: CheckBase,
    config: &CheckConfig,
) -> Result<Box<dyn CheckerModule + 'p>> {
    Ok(Box::new(AssertRbac::new(policy, base, config)?))
}
