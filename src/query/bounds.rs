use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{Bounds, BoundsRuletype, Policy, TypeId};

use super::matching::{match_regex, Criterion};

/// Query typebounds statements.
#[derive(Debug, Clone)]
pub struct BoundsQuery<'p> {
    policy: &'p Policy,
    ruletypes: BTreeSet<BoundsRuletype>,
    parent: Option<Criterion<TypeId>>,
    child: Option<Criterion<TypeId>>,
}

impl<'p> BoundsQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            ruletypes: BTreeSet::new(),
            parent: None,
            child: None,
        }
    }

    pub fn with_ruletypes(mut self, ruletypes: impl IntoIterator<Item = BoundsRuletype>) -> Self {
        self.ruletypes = ruletypes.into_iter().collect();
        self
    }

    pub fn with_parent(mut self, name: &str) -> Result<Self> {
        self.parent = Some(Criterion::Exact(self.policy.lookup_type(name)?.id));
        Ok(self)
    }

    pub fn with_parent_regex(mut self, pattern: &str) -> Result<Self> {
        self.parent = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_child(mut self, name: &str) -> Result<Self> {
        self.child = Some(Criterion::Exact(self.policy.lookup_type(name)?.id));
        Ok(self)
    }

    pub fn with_child_regex(mut self, pattern: &str) -> Result<Self> {
        self.child = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Bounds> + '_ {
        info!("Generating bounds results from {}", self.policy);
        debug!(
            "Ruletypes: {:?}, parent: {:?}, child: {:?}",
            self.ruletypes, self.parent, self.child
        );
        self.policy.bounds().filter(move |b| {
            (self.ruletypes.is_empty() || self.ruletypes.contains(&b.ruletype))
                && self
                    .parent
                    .as_ref()
                    .map_or(true, |c| match_regex(self.policy, &b.parent, c))
                && self
                    .child
                    .as_ref()
                    .map_or(true, |c| match_regex(self.policy, &b.child, c))
        })
    }
}
