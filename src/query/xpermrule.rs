use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::{PolicyError, Result};
use crate::policy::{ClassId, Policy, TypeOrAttr, XpermRule, XpermRuletype};

use super::criteria::{match_object_class, resolve_set};
use super::matching::{match_indirect_regex, Criterion};

/// Query extended permission rules.
#[derive(Debug, Clone)]
pub struct XpermRuleQuery<'p> {
    policy: &'p Policy,
    ruletypes: BTreeSet<XpermRuletype>,
    source: Option<Criterion<TypeOrAttr>>,
    source_indirect: bool,
    target: Option<Criterion<TypeOrAttr>>,
    target_indirect: bool,
    tclass: Option<Criterion<BTreeSet<ClassId>>>,
    xperms: Option<BTreeSet<u16>>,
    xperms_equal: bool,
}

impl<'p> XpermRuleQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            ruletypes: BTreeSet::new(),
            source: None,
            source_indirect: true,
            target: None,
            target_indirect: true,
            tclass: None,
            xperms: None,
            xperms_equal: false,
        }
    }

    pub fn with_ruletypes(mut self, ruletypes: impl IntoIterator<Item = XpermRuletype>) -> Self {
        self.ruletypes = ruletypes.into_iter().collect();
        self
    }

    pub fn with_source(mut self, name: &str) -> Result<Self> {
        self.source = Some(Criterion::Exact(self.policy.lookup_type_or_attr(name)?));
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

    pub fn with_target(mut self, name: &str) -> Result<Self> {
        self.target = Some(Criterion::Exact(self.policy.lookup_type_or_attr(name)?));
        Ok(self)
    }

    pub fn with_target_regex(mut self, pattern: &str) -> Result<Self> {
        self.target = Some(Criterion::regex(pattern)?);
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

    /// Extended permissions as inclusive `(low, high)` ranges; a single
    /// permission is `(x, x)`.
    pub fn with_xperms(mut self, ranges: impl IntoIterator<Item = (u16, u16)>) -> Result<Self> {
        let mut xperms = BTreeSet::new();
        for (low, high) in ranges {
            if low > high {
                return Err(PolicyError::InvalidValue(format!(
                    "{:#06x}-{:#06x} is not a valid xperm range",
                    low, high
                )));
            }
            xperms.extend(low..=high);
        }
        self.xperms = Some(xperms);
        Ok(self)
    }

    pub fn with_xperms_equal(mut self, equal: bool) -> Self {
        self.xperms_equal = equal;
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p XpermRule> + '_ {
        info!("Generating extended permission rule results from {}", self.policy);
        debug!("Ruletypes: {:?}", self.ruletypes);
        debug!(
            "Source: {:?}, indirect: {}; target: {:?}, indirect: {}",
            self.source, self.source_indirect, self.target, self.target_indirect
        );
        debug!(
            "Class: {:?}, xperms: {:?} (equal: {})",
            self.tclass, self.xperms, self.xperms_equal
        );
        self.policy.xpermrules().filter(move |r| self.matches(r))
    }

    fn matches(&self, rule: &XpermRule) -> bool {
        if !self.ruletypes.is_empty() && !self.ruletypes.contains(&rule.ruletype) {
            return false;
        }
        if let Some(source) = &self.source {
            if !match_indirect_regex(self.policy, &rule.source, source, self.source_indirect) {
                return false;
            }
        }
        if let Some(target) = &self.target {
            if !match_indirect_regex(self.policy, &rule.target, target, self.target_indirect) {
                return false;
            }
        }
        if let Some(tclass) = &self.tclass {
            if !match_object_class(self.policy, rule.tclass, tclass) {
                return false;
            }
        }
        if let Some(xperms) = &self.xperms {
            let matched = if self.xperms_equal {
                &rule.perms == xperms
            } else {
                !rule.perms.is_disjoint(xperms)
            };
            if !matched {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyBuilder;

    fn policy() -> Policy {
        let mut b = PolicyBuilder::new("xperms");
        b.class("tcp_socket", &["ioctl"], None).unwrap();
        b.class("chr_file", &["ioctl"], None).unwrap();
        b.attribute("domain").unwrap();
        b.type_("app_t", &["domain"]).unwrap();
        b.type_("dev_t", &[]).unwrap();
        b.xperm_rule(
            XpermRuletype::Allowxperm,
            "domain",
            "dev_t",
            "chr_file",
            "ioctl",
            &[0x8900, 0x8901, 0x8902],
        )
        .unwrap();
        b.xperm_rule(
            XpermRuletype::Dontauditxperm,
            "app_t",
            "app_t",
            "tcp_socket",
            "ioctl",
            &[0x5401],
        )
        .unwrap();
        b.build()
    }

    #[test]
    fn test_xperm_ranges() {
        let p = policy();
        let q = XpermRuleQuery::new(&p).with_xperms([(0x8902, 0x8910)]).unwrap();
        assert_eq!(q.results().count(), 1);

        let q = XpermRuleQuery::new(&p)
            .with_xperms([(0x8900, 0x8902)])
            .unwrap()
            .with_xperms_equal(true);
        assert_eq!(q.results().count(), 1);

        let q = XpermRuleQuery::new(&p)
            .with_xperms([(0x8900, 0x8901)])
            .unwrap()
            .with_xperms_equal(true);
        assert_eq!(q.results().count(), 0);

        assert!(matches!(
            XpermRuleQuery::new(&p).with_xperms([(2, 1)]),
            Err(PolicyError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_source_and_ruletype() {
        let p = policy();
        let q = XpermRuleQuery::new(&p).with_source("app_t").unwrap();
        assert_eq!(q.results().count(), 2);

        let q = XpermRuleQuery::new(&p)
            .with_source("app_t")
            .unwrap()
            .with_ruletypes([XpermRuletype::Allowxperm]);
        assert_eq!(q.results().count(), 1);

        let q = XpermRuleQuery::new(&p).with_tclass_regex("socket").unwrap();
        assert_eq!(q.results().count(), 1);
    }
}
