use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{BoolId, ClassId, Conditional, Policy, TeRule, TeRuletype, TypeId, TypeOrAttr};

use super::criteria::{exact_classes, match_object_class, resolve_set, string_set};
use super::matching::{
    match_indirect_regex, match_regex, match_regex_or_set, validate_perms_any, Criterion,
};

/// Query type enforcement rules.
///
/// Source and target criteria are indirect by default: an attribute in the
/// rule or the criterion is compared through its member types, so
/// `with_source("user_t")` also finds rules written against `domain`.
#[derive(Debug, Clone)]
pub struct TeRuleQuery<'p> {
    policy: &'p Policy,
    ruletypes: BTreeSet<TeRuletype>,
    source: Option<Criterion<TypeOrAttr>>,
    source_indirect: bool,
    target: Option<Criterion<TypeOrAttr>>,
    target_indirect: bool,
    tclass: Option<Criterion<BTreeSet<ClassId>>>,
    perms: Option<BTreeSet<String>>,
    perms_equal: bool,
    perms_subset: bool,
    default: Option<Criterion<TypeId>>,
    boolean: Option<Criterion<BTreeSet<BoolId>>>,
    boolean_equal: bool,
    filename: Option<String>,
}

impl<'p> TeRuleQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            ruletypes: BTreeSet::new(),
            source: None,
            source_indirect: true,
            target: None,
            target_indirect: true,
            tclass: None,
            perms: None,
            perms_equal: false,
            perms_subset: false,
            default: None,
            boolean: None,
            boolean_equal: false,
            filename: None,
        }
    }

    pub fn with_ruletypes(mut self, ruletypes: impl IntoIterator<Item = TeRuletype>) -> Self {
        self.ruletypes = ruletypes.into_iter().collect();
        self
    }

    /// Source type or attribute.
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

    /// Target type or attribute.
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

    /// Rule object class is any of the given classes.
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

    /// Permissions must be valid for the classes already set with
    /// [`with_tclass`](Self::with_tclass), or for some class in the policy.
    pub fn with_perms<I, S>(mut self, perms: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let perms = string_set(perms);
        validate_perms_any(
            self.policy,
            perms.iter().map(String::as_str),
            &exact_classes(&self.tclass),
        )?;
        self.perms = Some(perms);
        Ok(self)
    }

    /// Rule permissions must equal the criterion.
    pub fn with_perms_equal(mut self, equal: bool) -> Self {
        self.perms_equal = equal;
        self
    }

    /// Rule permissions must include every criterion permission.
    pub fn with_perms_subset(mut self, subset: bool) -> Self {
        self.perms_subset = subset;
        self
    }

    /// Default type of type_transition/type_member/type_change rules.
    pub fn with_default(mut self, name: &str) -> Result<Self> {
        self.default = Some(Criterion::Exact(self.policy.lookup_type(name)?.id));
        Ok(self)
    }

    pub fn with_default_regex(mut self, pattern: &str) -> Result<Self> {
        self.default = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    /// Booleans in the rule's conditional expression.
    pub fn with_boolean<I, S>(mut self, booleans: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let bools = resolve_set(booleans, |b| self.policy.lookup_boolean(b).map(|b| b.id))?;
        self.boolean = Some(Criterion::Exact(bools));
        Ok(self)
    }

    pub fn with_boolean_regex(mut self, pattern: &str) -> Result<Self> {
        self.boolean = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_boolean_equal(mut self, equal: bool) -> Self {
        self.boolean_equal = equal;
        self
    }

    /// File name of a name-based type_transition.
    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p TeRule> + '_ {
        info!("Generating TE rule results from {}", self.policy);
        debug!("Ruletypes: {:?}", self.ruletypes);
        debug!(
            "Source: {:?}, indirect: {}; target: {:?}, indirect: {}",
            self.source, self.source_indirect, self.target, self.target_indirect
        );
        debug!(
            "Class: {:?}, perms: {:?} (equal: {}, subset: {})",
            self.tclass, self.perms, self.perms_equal, self.perms_subset
        );
        debug!(
            "Default: {:?}, boolean: {:?} (equal: {}), filename: {:?}",
            self.default, self.boolean, self.boolean_equal, self.filename
        );
        self.policy.terules().filter(move |r| self.matches(r))
    }

    fn matches(&self, rule: &TeRule) -> bool {
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
        if let Some(perms) = &self.perms {
            match rule.perms() {
                Ok(rule_perms) if self.match_perms(rule_perms, perms) => {}
                _ => return false,
            }
        }
        if let Some(default) = &self.default {
            match rule.default() {
                Ok(d) if match_regex(self.policy, &d, default) => {}
                _ => return false,
            }
        }
        if let Some(boolean) = &self.boolean {
            let Conditional::Conditional { expr, .. } = rule.conditional else {
                return false;
            };
            let bools = self.policy.conditional_expr(expr).booleans();
            if !match_regex_or_set(self.policy, &bools, boolean, self.boolean_equal) {
                return false;
            }
        }
        if let Some(filename) = &self.filename {
            match rule.filename() {
                Ok(Some(name)) if name == filename => {}
                _ => return false,
            }
        }
        true
    }

    fn match_perms(&self, rule_perms: &BTreeSet<String>, criteria: &BTreeSet<String>) -> bool {
        if self.perms_equal {
            rule_perms == criteria
        } else if self.perms_subset {
            criteria.is_subset(rule_perms)
        } else {
            !rule_perms.is_disjoint(criteria)
        }
    }
}
