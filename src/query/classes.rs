use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{ClassId, Common, CommonId, ObjClass, Policy};

use super::criteria::string_set;
use super::matching::{match_regex, match_regex_or_set, Criterion};

/// Query common permission sets by name and permissions.
#[derive(Debug, Clone)]
pub struct CommonQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<CommonId>>,
    perms: Option<Criterion<BTreeSet<String>>>,
    perms_equal: bool,
}

impl<'p> CommonQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            name: None,
            perms: None,
            perms_equal: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = Some(Criterion::Exact(self.policy.lookup_common(name)?.id));
        Ok(self)
    }

    pub fn with_name_regex(mut self, pattern: &str) -> Result<Self> {
        self.name = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_perms<I, S>(mut self, perms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.perms = Some(Criterion::Exact(string_set(perms)));
        self
    }

    pub fn with_perms_regex(mut self, pattern: &str) -> Result<Self> {
        self.perms = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_perms_equal(mut self, equal: bool) -> Self {
        self.perms_equal = equal;
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Common> + '_ {
        info!("Generating common results from {}", self.policy);
        debug!(
            "Name: {:?}, perms: {:?} (equal: {})",
            self.name, self.perms, self.perms_equal
        );
        self.policy.commons().filter(move |c| {
            self.name
                .as_ref()
                .map_or(true, |name| match_regex(self.policy, &c.id, name))
                && self.perms.as_ref().map_or(true, |perms| {
                    match_regex_or_set(self.policy, &c.perms, perms, self.perms_equal)
                })
        })
    }
}

/// Query object classes by name, inherited common and permissions.
#[derive(Debug, Clone)]
pub struct ObjClassQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<ClassId>>,
    common: Option<Criterion<CommonId>>,
    perms: Option<Criterion<BTreeSet<String>>>,
    perms_equal: bool,
    perms_indirect: bool,
}

impl<'p> ObjClassQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            name: None,
            common: None,
            perms: None,
            perms_equal: false,
            perms_indirect: true,
        }
    }

    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = Some(Criterion::Exact(self.policy.lookup_class(name)?.id));
        Ok(self)
    }

    pub fn with_name_regex(mut self, pattern: &str) -> Result<Self> {
        self.name = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_common(mut self, name: &str) -> Result<Self> {
        self.common = Some(Criterion::Exact(self.policy.lookup_common(name)?.id));
        Ok(self)
    }

    pub fn with_common_regex(mut self, pattern: &str) -> Result<Self> {
        self.common = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_perms<I, S>(mut self, perms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.perms = Some(Criterion::Exact(string_set(perms)));
        self
    }

    pub fn with_perms_regex(mut self, pattern: &str) -> Result<Self> {
        self.perms = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_perms_equal(mut self, equal: bool) -> Self {
        self.perms_equal = equal;
        self
    }

    /// Include permissions inherited from the common (default on).
    pub fn with_perms_indirect(mut self, indirect: bool) -> Self {
        self.perms_indirect = indirect;
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p ObjClass> + '_ {
        info!("Generating object class results from {}", self.policy);
        debug!(
            "Name: {:?}, common: {:?}, perms: {:?} (equal: {}, indirect: {})",
            self.name, self.common, self.perms, self.perms_equal, self.perms_indirect
        );
        self.policy.classes().filter(move |c| self.matches(c))
    }

    fn matches(&self, class: &ObjClass) -> bool {
        if let Some(name) = &self.name {
            if !match_regex(self.policy, &class.id, name) {
                return false;
            }
        }
        if let Some(common) = &self.common {
            match class.common {
                Some(c) if match_regex(self.policy, &c, common) => {}
                _ => return false,
            }
        }
        if let Some(perms) = &self.perms {
            let matched = if self.perms_indirect {
                let all = class.all_perms(self.policy);
                match_regex_or_set(self.policy, &all, perms, self.perms_equal)
            } else {
                match_regex_or_set(self.policy, &class.perms, perms, self.perms_equal)
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
        let mut b = PolicyBuilder::new("classes");
        b.common("file", &["read", "write", "ioctl"]).unwrap();
        b.common("socket", &["bind", "connect"]).unwrap();
        b.class("file", &["execute_no_trans", "entrypoint"], Some("file")).unwrap();
        b.class("dir", &["search"], Some("file")).unwrap();
        b.class("tcp_socket", &["name_bind"], Some("socket")).unwrap();
        b.class("process", &["transition"], None).unwrap();
        b.build()
    }

    fn names<'a>(iter: impl Iterator<Item = &'a ObjClass>) -> Vec<&'a str> {
        iter.map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_common_query() {
        let p = policy();
        let q = CommonQuery::new(&p).with_perms(["bind"]);
        let found: Vec<_> = q.results().map(|c| c.name.as_str()).collect();
        assert_eq!(found, vec!["socket"]);
    }

    #[test]
    fn test_class_by_common() {
        let p = policy();
        let q = ObjClassQuery::new(&p).with_common("file").unwrap();
        assert_eq!(names(q.results()), vec!["file", "dir"]);

        let q = ObjClassQuery::new(&p).with_common_regex("sock").unwrap();
        assert_eq!(names(q.results()), vec!["tcp_socket"]);
    }

    #[test]
    fn test_class_perms_indirect() {
        let p = policy();
        let q = ObjClassQuery::new(&p).with_perms(["read"]);
        assert_eq!(names(q.results()), vec!["file", "dir"]);

        let q = ObjClassQuery::new(&p)
            .with_perms(["read"])
            .with_perms_indirect(false);
        assert_eq!(q.results().count(), 0);

        let q = ObjClassQuery::new(&p)
            .with_perms(["search"])
            .with_perms_indirect(false)
            .with_perms_equal(true);
        assert_eq!(names(q.results()), vec!["dir"]);
    }
}
