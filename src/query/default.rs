use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{ClassId, DefaultRangeValue, DefaultRule, DefaultRuletype, DefaultValue, Policy};

use super::criteria::{match_object_class, resolve_set};
use super::matching::Criterion;

/// Query default_user/default_role/default_type/default_range statements.
#[derive(Debug, Clone)]
pub struct DefaultQuery<'p> {
    policy: &'p Policy,
    ruletypes: BTreeSet<DefaultRuletype>,
    tclass: Option<Criterion<BTreeSet<ClassId>>>,
    default: Option<DefaultValue>,
    default_range: Option<DefaultRangeValue>,
}

impl<'p> DefaultQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            ruletypes: BTreeSet::new(),
            tclass: None,
            default: None,
            default_range: None,
        }
    }

    pub fn with_ruletypes(mut self, ruletypes: impl IntoIterator<Item = DefaultRuletype>) -> Self {
        self.ruletypes = ruletypes.into_iter().collect();
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

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Only default_range statements carry a range setting.
    pub fn with_default_range(mut self, range: DefaultRangeValue) -> Self {
        self.default_range = Some(range);
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p DefaultRule> + '_ {
        info!("Generating default_* results from {}", self.policy);
        debug!(
            "Ruletypes: {:?}, class: {:?}, default: {:?}, range: {:?}",
            self.ruletypes, self.tclass, self.default, self.default_range
        );
        self.policy.defaults().filter(move |d| {
            (self.ruletypes.is_empty() || self.ruletypes.contains(&d.ruletype))
                && self
                    .tclass
                    .as_ref()
                    .map_or(true, |c| match_object_class(self.policy, d.tclass, c))
                && self.default.map_or(true, |v| d.default == v)
                && self
                    .default_range
                    .map_or(true, |r| d.default_range == Some(r))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyBuilder;

    #[test]
    fn test_default_statements() {
        let mut b = PolicyBuilder::new("defaults");
        b.class("file", &["read"], None).unwrap();
        b.class("dir", &["search"], None).unwrap();
        b.default_rule(DefaultRuletype::DefaultUser, "file", DefaultValue::Source, None)
            .unwrap();
        b.default_rule(
            DefaultRuletype::DefaultRange,
            "file",
            DefaultValue::Target,
            Some(DefaultRangeValue::Low),
        )
        .unwrap();
        b.default_rule(DefaultRuletype::DefaultRange, "dir", DefaultValue::Glblub, None)
            .unwrap();
        let p = b.build();

        let q = DefaultQuery::new(&p).with_tclass(["file"]).unwrap();
        assert_eq!(q.results().count(), 2);

        let q = DefaultQuery::new(&p).with_ruletypes([DefaultRuletype::DefaultRange]);
        assert_eq!(q.results().count(), 2);

        let q = DefaultQuery::new(&p).with_default_range(DefaultRangeValue::Low);
        assert_eq!(q.results().count(), 1);

        let q = DefaultQuery::new(&p).with_default(DefaultValue::Glblub);
        let found: Vec<_> = q.results().collect();
        assert_eq!(found.len(), 1);
        assert_eq!(p.class(found[0].tclass).name, "dir");
    }
}
