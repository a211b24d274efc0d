use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{Level, Policy, Range, RoleId, User, UserId};

use super::criteria::resolve_set;
use super::matching::{match_regex, match_regex_or_set, Criterion, LevelMatch, RangeMatch};

/// Query users by name, roles and MLS attributes.
#[derive(Debug, Clone)]
pub struct UserQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<UserId>>,
    roles: Option<Criterion<BTreeSet<RoleId>>>,
    roles_equal: bool,
    level: Option<(Level, LevelMatch)>,
    range: Option<(Range, RangeMatch)>,
}

impl<'p> UserQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            name: None,
            roles: None,
            roles_equal: false,
            level: None,
            range: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = Some(Criterion::Exact(self.policy.lookup_user(name)?.id));
        Ok(self)
    }

    pub fn with_name_regex(mut self, pattern: &str) -> Result<Self> {
        self.name = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let roles = resolve_set(roles, |r| self.policy.lookup_role(r).map(|r| r.id))?;
        self.roles = Some(Criterion::Exact(roles));
        Ok(self)
    }

    pub fn with_roles_regex(mut self, pattern: &str) -> Result<Self> {
        self.roles = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_roles_equal(mut self, equal: bool) -> Self {
        self.roles_equal = equal;
        self
    }

    /// Match the user's default level.
    pub fn with_level(mut self, level: &str, mode: LevelMatch) -> Result<Self> {
        self.level = Some((self.policy.lookup_level(level)?, mode));
        Ok(self)
    }

    /// Match the user's authorized range.
    pub fn with_range(mut self, range: &str, mode: RangeMatch) -> Result<Self> {
        self.range = Some((self.policy.lookup_range(range)?, mode));
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p User> + '_ {
        info!("Generating user results from {}", self.policy);
        debug!(
            "Name: {:?}, roles: {:?} (equal: {}), level: {:?}, range: {:?}",
            self.name, self.roles, self.roles_equal, self.level, self.range
        );
        self.policy.users().filter(move |u| self.matches(u))
    }

    fn matches(&self, user: &User) -> bool {
        if let Some(name) = &self.name {
            if !match_regex(self.policy, &user.id, name) {
                return false;
            }
        }
        if let Some(roles) = &self.roles {
            if !match_regex_or_set(self.policy, &user.roles, roles, self.roles_equal) {
                return false;
            }
        }
        if let Some((level, mode)) = &self.level {
            match &user.level {
                Some(obj) if mode.matches(obj, level) => {}
                _ => return false,
            }
        }
        if let Some((range, mode)) = &self.range {
            match &user.range {
                Some(obj) if mode.matches(obj, range) => {}
                _ => return false,
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
        let mut b = PolicyBuilder::new("users");
        b.mls(true);
        b.sensitivity("s0", &[]).unwrap();
        b.sensitivity("s1", &[]).unwrap();
        b.category("c0", &[]).unwrap();
        b.category("c1", &[]).unwrap();
        b.level_decl("s0:c0.c1").unwrap();
        b.level_decl("s1:c0.c1").unwrap();
        b.role("user_r", &[]).unwrap();
        b.role("staff_r", &[]).unwrap();
        b.user("user_u", &["user_r"], Some("s0"), Some("s0")).unwrap();
        b.user("staff_u", &["user_r", "staff_r"], Some("s0"), Some("s0 - s1:c0.c1"))
            .unwrap();
        b.build()
    }

    fn names<'a>(iter: impl Iterator<Item = &'a User>) -> Vec<&'a str> {
        iter.map(|u| u.name.as_str()).collect()
    }

    #[test]
    fn test_roles() {
        let p = policy();
        let q = UserQuery::new(&p).with_roles(["user_r"]).unwrap();
        assert_eq!(names(q.results()), vec!["user_u", "staff_u"]);

        let q = UserQuery::new(&p)
            .with_roles(["user_r"])
            .unwrap()
            .with_roles_equal(true);
        assert_eq!(names(q.results()), vec!["user_u"]);
    }

    #[test]
    fn test_range_modes() {
        let p = policy();
        let q = UserQuery::new(&p).with_range("s0", RangeMatch::Exact).unwrap();
        assert_eq!(names(q.results()), vec!["user_u"]);

        let q = UserQuery::new(&p)
            .with_range("s1", RangeMatch::Subset { proper: false })
            .unwrap();
        assert_eq!(names(q.results()), vec!["staff_u"]);

        let q = UserQuery::new(&p)
            .with_range("s0 - s1", RangeMatch::Overlap)
            .unwrap();
        assert_eq!(names(q.results()), vec!["user_u", "staff_u"]);
    }

    #[test]
    fn test_level_dominance() {
        let p = policy();
        let q = UserQuery::new(&p).with_level("s1", LevelMatch::Dom).unwrap();
        assert_eq!(q.results().count(), 2);

        let q = UserQuery::new(&p).with_level("s1", LevelMatch::Domby).unwrap();
        assert_eq!(q.results().count(), 0);
    }
}
