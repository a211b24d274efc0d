use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{ClassId, MlsRule, MlsRuletype, Policy, Range, TypeOrAttr};

use super::criteria::{match_object_class, resolve_set};
use super::matching::{match_indirect_regex, Criterion, RangeMatch};

/// Query MLS (range_transition) rules.
#[derive(Debug, Clone)]
pub struct MlsRuleQuery<'p> {
    policy: &'p Policy,
    ruletypes: BTreeSet<MlsRuletype>,
    source: Option<Criterion<TypeOrAttr>>,
    source_indirect: bool,
    target: Option<Criterion<TypeOrAttr>>,
    target_indirect: bool,
    tclass: Option<Criterion<BTreeSet<ClassId>>>,
    default: Option<(Range, RangeMatch)>,
}

impl<'p> MlsRuleQuery<'p> {
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

    pub fn with_ruletypes(mut self, ruletypes: impl IntoIterator<Item = MlsRuletype>) -> Self {
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

    /// Default range of the transition, compared with `mode`.
    pub fn with_default(mut self, range: &str, mode: RangeMatch) -> Result<Self> {
        self.default = Some((self.policy.lookup_range(range)?, mode));
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p MlsRule> + '_ {
        info!("Generating MLS rule results from {}", self.policy);
        debug!("Ruletypes: {:?}", self.ruletypes);
        debug!(
            "Source: {:?}, indirect: {}; target: {:?}, indirect: {}",
            self.source, self.source_indirect, self.target, self.target_indirect
        );
        debug!("Class: {:?}, default: {:?}", self.tclass, self.default);
        self.policy.mlsrules().filter(move |r| self.matches(r))
    }

    fn matches(&self, rule: &MlsRule) -> bool {
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
        if let Some((range, mode)) = &self.default {
            if !mode.matches(&rule.default, range) {
                return false;
            }
        }
        true
    }
}
