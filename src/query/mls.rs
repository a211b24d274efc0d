use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{Category, CategoryId, Level, Policy, Sensitivity, SensitivityId};

use super::matching::{match_in_set, match_regex, Criterion, LevelMatch};

/// Query MLS categories by name and alias.
#[derive(Debug, Clone)]
pub struct CategoryQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<CategoryId>>,
    alias: Option<Criterion<String>>,
}

impl<'p> CategoryQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            name: None,
            alias: None,
        }
    }

    /// Category name or alias.
    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = Some(Criterion::Exact(self.policy.lookup_category(name)?.id));
        Ok(self)
    }

    pub fn with_name_regex(mut self, pattern: &str) -> Result<Self> {
        self.name = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(Criterion::Exact(alias.to_string()));
        self
    }

    pub fn with_alias_regex(mut self, pattern: &str) -> Result<Self> {
        self.alias = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Category> + '_ {
        info!("Generating category results from {}", self.policy);
        debug!("Name: {:?}, alias: {:?}", self.name, self.alias);
        self.policy.categories().filter(move |c| {
            self.name
                .as_ref()
                .map_or(true, |name| match_regex(self.policy, &c.id, name))
                && self
                    .alias
                    .as_ref()
                    .map_or(true, |alias| match_in_set(self.policy, &c.aliases, alias))
        })
    }
}

/// Query MLS sensitivities by name, alias and dominance.
#[derive(Debug, Clone)]
pub struct SensitivityQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<SensitivityId>>,
    alias: Option<Criterion<String>>,
    sens: Option<(SensitivityId, LevelMatch)>,
}

impl<'p> SensitivityQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            name: None,
            alias: None,
            sens: None,
        }
    }

    /// Sensitivity name or alias.
    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = Some(Criterion::Exact(self.policy.lookup_sensitivity(name)?.id));
        Ok(self)
    }

    pub fn with_name_regex(mut self, pattern: &str) -> Result<Self> {
        self.name = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(Criterion::Exact(alias.to_string()));
        self
    }

    pub fn with_alias_regex(mut self, pattern: &str) -> Result<Self> {
        self.alias = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    /// Compare sensitivities by dominance order: with [`LevelMatch::Dom`]
    /// the given sensitivity must dominate the result.
    pub fn with_sens(mut self, name: &str, mode: LevelMatch) -> Result<Self> {
        self.sens = Some((self.policy.lookup_sensitivity(name)?.id, mode));
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Sensitivity> + '_ {
        info!("Generating sensitivity results from {}", self.policy);
        debug!(
            "Name: {:?}, alias: {:?}, sens: {:?}",
            self.name, self.alias, self.sens
        );
        self.policy.sensitivities().filter(move |s| self.matches(s))
    }

    fn matches(&self, sens: &Sensitivity) -> bool {
        if let Some(name) = &self.name {
            if !match_regex(self.policy, &sens.id, name) {
                return false;
            }
        }
        if let Some(alias) = &self.alias {
            if !match_in_set(self.policy, &sens.aliases, alias) {
                return false;
            }
        }
        if let Some((crit, mode)) = self.sens {
            let obj = Level::new(sens.id, []);
            if !mode.matches(&obj, &Level::new(crit, [])) {
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
        let mut b = PolicyBuilder::new("mls");
        b.mls(true);
        b.sensitivity("s0", &["low"]).unwrap();
        b.sensitivity("s1", &[]).unwrap();
        b.sensitivity("s2", &["high"]).unwrap();
        b.category("c0", &["red"]).unwrap();
        b.category("c1", &[]).unwrap();
        b.build()
    }

    #[test]
    fn test_category_alias() {
        let p = policy();
        let q = CategoryQuery::new(&p).with_alias("red");
        let found: Vec<_> = q.results().map(|c| c.name.as_str()).collect();
        assert_eq!(found, vec!["c0"]);

        let q = CategoryQuery::new(&p).with_name("red").unwrap();
        assert_eq!(q.results().count(), 1);
    }

    #[test]
    fn test_sensitivity_dominance() {
        let p = policy();
        let q = SensitivityQuery::new(&p).with_sens("s1", LevelMatch::Dom).unwrap();
        let found: Vec<_> = q.results().map(|s| s.name.as_str()).collect();
        assert_eq!(found, vec!["s0", "s1"]);

        let q = SensitivityQuery::new(&p).with_sens("s1", LevelMatch::Domby).unwrap();
        let found: Vec<_> = q.results().map(|s| s.name.as_str()).collect();
        assert_eq!(found, vec!["s1", "s2"]);

        let q = SensitivityQuery::new(&p).with_alias_regex("^h").unwrap();
        assert_eq!(q.results().count(), 1);
    }
}
