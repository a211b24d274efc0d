use std::collections::BTreeSet;

use regex::Regex;
use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{ClassId, Policy, RbacRule, RbacRuletype, RbacTarget, RoleId, TypeOrAttr};

use super::criteria::{match_object_class, resolve_set};
use super::matching::{match_indirect_regex, match_regex, Criterion};

/// Target criterion: role allows target roles, role transitions target types.
#[derive(Debug, Clone)]
enum TargetCriterion {
    Role(RoleId),
    Type(TypeOrAttr),
    Regex(Regex),
}

/// Query RBAC rules (role allow and role_transition).
#[derive(Debug, Clone)]
pub struct RbacRuleQuery<'p> {
    policy: &'p Policy,
    ruletypes: BTreeSet<RbacRuletype>,
    source: Option<Criterion<RoleId>>,
    source_indirect: bool,
    target: Option<TargetCriterion>,
    target_indirect: bool,
    tclass: Option<Criterion<BTreeSet<ClassId>>>,
    default: Option<Criterion<RoleId>>,
}

impl<'p> RbacRuleQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            ruletypes: BTreeSet::new(),
            source: None,
            source_indirect: true,
            target: None,
            target_indirect: true,
            tclass: None,
            default: None,
        }
    }

    pub fn with_ruletypes(mut self, ruletypes: impl IntoIterator<Item = RbacRuletype>) -> Self {
        self.ruletypes = ruletypes.into_iter().collect();
        self
    }

    pub fn with_source(mut self, name: &str) -> Result<Self> {
        self.source = Some(Criterion::Exact(self.policy.lookup_role(name)?.id));
        Ok(self)
    }

    pub fn with_source_regex(mut self, pattern: &str) -> Result<Self> {
        self.source = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_source_indirect(mut self, indirect: bool) -> Self {
        self.source_indirect = indirect;
        self
    }

    /// Target role, or failing that a target type or attribute.
    pub fn with_target(mut self, name: &str) -> Result<Self> {
        let target = match self.policy.lookup_role(name) {
            Ok(role) => TargetCriterion::Role(role.id),
            Err(_) => TargetCriterion::Type(self.policy.lookup_type_or_attr(name)?),
        };
        self.target = Some(target);
        Ok(self)
    }

    pub fn with_target_regex(mut self, pattern: &str) -> Result<Self> {
        self.target = Some(TargetCriterion::Regex(Regex::new(pattern)?));
        Ok(self)
    }

    pub fn with_target_indirect(mut self, indirect: bool) -> Self {
        self.target_indirect = indirect;
        self
    }

    pub fn with_tclass<I, S>(mut self, classes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let classes = resolve_set(classes, |c| self.policy.lookup_class(c).map(|c| c.id))?;
        self.tclass = Some(Criterion::Exact(classes));
        Ok(self)
    }

    pub fn with_tclass_regex(mut self, pattern: &str) -> Result<Self> {
        self.tclass = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    /// Default role of a role_transition.
    pub fn with_default(mut self, name: &str) -> Result<Self> {
        self.default = Some(Criterion::Exact(self.policy.lookup_role(name)?.id));
        Ok(self)
    }

    pub fn with_default_regex(mut self, pattern: &str) -> Result<Self> {
        self.default = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p RbacRule> + '_ {
        info!("Generating RBAC rule results from {}", self.policy);
        debug!("Ruletypes: {:?}", self.ruletypes);
        debug!(
            "Source: {:?}, indirect: {}; target: {:?}, indirect: {}",
            self.source, self.source_indirect, self.target, self.target_indirect
        );
        debug!("Class: {:?}, default: {:?}", self.tclass, self.default);
        self.policy.rbacrules().filter(move |r| self.matches(r))
    }

    fn matches(&self, rule: &RbacRule) -> bool {
        if !self.ruletypes.is_empty() && !self.ruletypes.contains(&rule.ruletype) {
            return false;
        }
        if let Some(source) = &self.source {
            if !match_indirect_regex(self.policy, &rule.source, source, self.source_indirect) {
                return false;
            }
        }
        if let Some(target) = &self.target {
            if !self.match_target(&rule.target, target) {
                return false;
            }
        }
        if let Some(tclass) = &self.tclass {
            match rule.tclass() {
                Ok(class) if match_object_class(self.policy, class, tclass) => {}
                _ => return false,
            }
        }
        if let Some(default) = &self.default {
            match rule.default() {
                Ok(role) if match_regex(self.policy, &role, default) => {}
                _ => return false,
            }
        }
        true
    }

    fn match_target(&self, obj: &RbacTarget, criterion: &TargetCriterion) -> bool {
        match (obj, criterion) {
            (RbacTarget::Role(role), TargetCriterion::Role(c)) => role == c,
            (RbacTarget::Type(t), TargetCriterion::Type(c)) => {
                match_indirect_regex(self.policy, t, &Criterion::Exact(*c), self.target_indirect)
            }
            (RbacTarget::Role(role), TargetCriterion::Regex(r)) => {
                r.is_match(&self.policy.role(*role).name)
            }
            (RbacTarget::Type(t), TargetCriterion::Regex(r)) => match_indirect_regex(
                self.policy,
                t,
                &Criterion::Regex(r.clone()),
                self.target_indirect,
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyBuilder;

    fn policy() -> Policy {
        let mut b = PolicyBuilder::new("rbac");
        b.class("process", &["transition"], None).unwrap();
        b.attribute("exec_type").unwrap();
        b.type_("httpd_exec_t", &["exec_type"]).unwrap();
        b.type_("sshd_exec_t", &["exec_type"]).unwrap();
        b.role("system_r", &[]).unwrap();
        b.role("staff_r", &[]).unwrap();
        b.role("sysadm_r", &[]).unwrap();
        b.role_allow("staff_r", "sysadm_r").unwrap();
        b.role_transition("staff_r", "exec_type", "process", "system_r")
            .unwrap();
        b.role_transition("sysadm_r", "sshd_exec_t", "process", "system_r")
            .unwrap();
        b.build()
    }

    #[test]
    fn test_target_role_or_type() {
        let p = policy();
        let q = RbacRuleQuery::new(&p).with_target("sysadm_r").unwrap();
        assert_eq!(q.results().count(), 1);

        let q = RbacRuleQuery::new(&p).with_target("sshd_exec_t").unwrap();
        assert_eq!(q.results().count(), 2);

        let q = RbacRuleQuery::new(&p)
            .with_target("sshd_exec_t")
            .unwrap()
            .with_target_indirect(false);
        assert_eq!(q.results().count(), 1);

        assert!(RbacRuleQuery::new(&p).with_target("nothing").is_err());
    }

    #[test]
    fn test_default_and_class_skip_role_allow() {
        let p = policy();
        let q = RbacRuleQuery::new(&p).with_default("system_r").unwrap();
        assert_eq!(q.results().count(), 2);

        let q = RbacRuleQuery::new(&p).with_tclass(["process"]).unwrap();
        assert!(q
            .results()
            .all(|r| r.ruletype == RbacRuletype::RoleTransition));

        let q = RbacRuleQuery::new(&p)
            .with_source("staff_r")
            .unwrap()
            .with_ruletypes([RbacRuletype::Allow]);
        assert_eq!(q.results().count(), 1);
    }

    #[test]
    fn test_target_regex() {
        let p = policy();
        let q = RbacRuleQuery::new(&p).with_target_regex("^sys").unwrap();
        assert_eq!(q.results().count(), 1);
        let q = RbacRuleQuery::new(&p).with_target_regex("^httpd").unwrap();
        assert_eq!(q.results().count(), 1);
    }
}
