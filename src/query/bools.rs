use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{BoolId, Boolean, Policy};

use super::matching::{match_regex, Criterion};

/// Query conditional booleans by name and default state.
#[derive(Debug, Clone)]
pub struct BoolQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<BoolId>>,
    default: Option<bool>,
}

impl<'p> BoolQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            name: None,
            default: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = Some(Criterion::Exact(self.policy.lookup_boolean(name)?.id));
        Ok(self)
    }

    pub fn with_name_regex(mut self, pattern: &str) -> Result<Self> {
        self.name = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_default(mut self, state: bool) -> Self {
        self.default = Some(state);
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Boolean> + '_ {
        info!("Generating Boolean results from {}", self.policy);
        debug!("Name: {:?}, default: {:?}", self.name, self.default);
        self.policy.bools().filter(move |b| {
            self.name
                .as_ref()
                .map_or(true, |name| match_regex(self.policy, &b.id, name))
                && self.default.map_or(true, |state| b.state == state)
        })
    }
}
