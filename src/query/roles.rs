use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{Policy, Role, RoleId, TypeId};

use super::criteria::resolve_set;
use super::matching::{match_regex, match_regex_or_set, Criterion};

/// Query roles by name and authorized types.
#[derive(Debug, Clone)]
pub struct RoleQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<RoleId>>,
    types: Option<Criterion<BTreeSet<TypeId>>>,
    types_equal: bool,
}

impl<'p> RoleQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            name: None,
            types: None,
            types_equal: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = Some(Criterion::Exact(self.policy.lookup_role(name)?.id));
        Ok(self)
    }

    pub fn with_name_regex(mut self, pattern: &str) -> Result<Self> {
        self.name = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_types<I, S>(mut self, types: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let types = resolve_set(types, |t| self.policy.lookup_type(t).map(|t| t.id))?;
        self.types = Some(Criterion::Exact(types));
        Ok(self)
    }

    pub fn with_types_regex(mut self, pattern: &str) -> Result<Self> {
        self.types = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_types_equal(mut self, equal: bool) -> Self {
        self.types_equal = equal;
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Role> + '_ {
        info!("Generating role results from {}", self.policy);
        debug!(
            "Name: {:?}, types: {:?} (equal: {})",
            self.name, self.types, self.types_equal
        );
        self.policy.roles().filter(move |r| self.matches(r))
    }

    fn matches(&self, role: &Role) -> bool {
        if let Some(name) = &self.name {
            if !match_regex(self.policy, &role.id, name) {
                return false;
            }
        }
        if let Some(types) = &self.types {
            if !match_regex_or_set(self.policy, &role.types, types, self.types_equal) {
                return false;
            }
        }
        true
    }
}
