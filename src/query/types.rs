use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{AttrId, Policy, Type, TypeAttribute, TypeId};

use super::criteria::resolve_set;
use super::matching::{match_in_set, match_regex, match_regex_or_set, Criterion};

/// Query types by name, alias, attributes and permissive flag.
#[derive(Debug, Clone)]
pub struct TypeQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<TypeId>>,
    alias: Option<Criterion<String>>,
    attrs: Option<Criterion<BTreeSet<AttrId>>>,
    attrs_equal: bool,
    permissive: Option<bool>,
}

impl<'p> TypeQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            name: None,
            alias: None,
            attrs: None,
            attrs_equal: false,
            permissive: None,
        }
    }

    /// Type name or alias.
    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = Some(Criterion::Exact(self.policy.lookup_type(name)?.id));
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

    pub fn with_attrs<I, S>(mut self, attrs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let attrs = resolve_set(attrs, |a| self.policy.lookup_typeattr(a).map(|a| a.id))?;
        self.attrs = Some(Criterion::Exact(attrs));
        Ok(self)
    }

    pub fn with_attrs_regex(mut self, pattern: &str) -> Result<Self> {
        self.attrs = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    /// Require the type's attribute set to equal the criterion instead of
    /// intersecting it.
    pub fn with_attrs_equal(mut self, equal: bool) -> Self {
        self.attrs_equal = equal;
        self
    }

    pub fn with_permissive(mut self, permissive: bool) -> Self {
        self.permissive = Some(permissive);
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Type> + '_ {
        info!("Generating type results from {}", self.policy);
        debug!(
            "Name: {:?}, alias: {:?}, attrs: {:?} (equal: {}), permissive: {:?}",
            self.name, self.alias, self.attrs, self.attrs_equal, self.permissive
        );
        self.policy.types().filter(move |t| self.matches(t))
    }

    fn matches(&self, t: &Type) -> bool {
        if let Some(name) = &self.name {
            if !match_regex(self.policy, &t.id, name) {
                return false;
            }
        }
        if let Some(alias) = &self.alias {
            if !match_in_set(self.policy, &t.aliases, alias) {
                return false;
            }
        }
        if let Some(attrs) = &self.attrs {
            if !match_regex_or_set(self.policy, &t.attrs, attrs, self.attrs_equal) {
                return false;
            }
        }
        self.permissive.map_or(true, |p| t.permissive == p)
    }
}

/// Query type attributes by name and member types.
#[derive(Debug, Clone)]
pub struct TypeAttributeQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<AttrId>>,
    types: Option<Criterion<BTreeSet<TypeId>>>,
    types_equal: bool,
}

impl<'p> TypeAttributeQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            name: None,
            types: None,
            types_equal: false,
        }
    }

    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = Some(Criterion::Exact(self.policy.lookup_typeattr(name)?.id));
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

    pub fn results(&self) -> impl Iterator<Item = &'p TypeAttribute> + '_ {
        info!("Generating type attribute results from {}", self.policy);
        debug!(
            "Name: {:?}, types: {:?} (equal: {})",
            self.name, self.types, self.types_equal
        );
        self.policy.attributes().filter(move |a| self.matches(a))
    }

    fn matches(&self, attr: &TypeAttribute) -> bool {
        if let Some(name) = &self.name {
            if !match_regex(self.policy, &attr.id, name) {
                return false;
            }
        }
        if let Some(types) = &self.types {
            let members: BTreeSet<TypeId> = attr.types.iter().copied().collect();
            if !match_regex_or_set(self.policy, &members, types, self.types_equal) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyError;
    use crate::policy::PolicyBuilder;

    fn policy() -> Policy {
        let mut b = PolicyBuilder::new("types");
        b.attribute("domain").unwrap();
        b.attribute("file_type").unwrap();
        b.type_("init_t", &["domain"]).unwrap();
        b.type_("user_t", &["domain"]).unwrap();
        b.type_("etc_t", &["file_type"]).unwrap();
        b.type_("both_t", &["domain", "file_type"]).unwrap();
        b.type_alias("init_t", "initrc_t").unwrap();
        b.permissive("user_t").unwrap();
        b.build()
    }

    fn names<'a>(iter: impl Iterator<Item = &'a Type>) -> Vec<&'a str> {
        iter.map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_unfiltered_returns_all() {
        let p = policy();
        assert_eq!(TypeQuery::new(&p).results().count(), 4);
        assert_eq!(TypeAttributeQuery::new(&p).results().count(), 2);
    }

    #[test]
    fn test_name_and_alias() {
        let p = policy();
        let q = TypeQuery::new(&p).with_name("initrc_t").unwrap();
        assert_eq!(names(q.results()), vec!["init_t"]);

        let q = TypeQuery::new(&p).with_name_regex("^(user|etc)").unwrap();
        assert_eq!(names(q.results()), vec!["user_t", "etc_t"]);

        let q = TypeQuery::new(&p).with_alias("initrc_t");
        assert_eq!(names(q.results()), vec!["init_t"]);

        assert!(matches!(
            TypeQuery::new(&p).with_name("domain"),
            Err(PolicyError::InvalidType(_))
        ));
        assert!(matches!(
            TypeQuery::new(&p).with_name_regex("("),
            Err(PolicyError::Regex(_))
        ));
    }

    #[test]
    fn test_attrs_any_and_equal() {
        let p = policy();
        let q = TypeQuery::new(&p).with_attrs(["file_type"]).unwrap();
        assert_eq!(names(q.results()), vec!["etc_t", "both_t"]);

        let q = TypeQuery::new(&p)
            .with_attrs(["file_type"])
            .unwrap()
            .with_attrs_equal(true);
        assert_eq!(names(q.results()), vec!["etc_t"]);

        let q = TypeQuery::new(&p).with_attrs_regex("^dom").unwrap();
        assert_eq!(names(q.results()), vec!["init_t", "user_t", "both_t"]);
    }

    #[test]
    fn test_permissive() {
        let p = policy();
        let q = TypeQuery::new(&p).with_permissive(true);
        assert_eq!(names(q.results()), vec!["user_t"]);
    }

    #[test]
    fn test_attribute_members() {
        let p = policy();
        let q = TypeAttributeQuery::new(&p).with_types(["both_t"]).unwrap();
        assert_eq!(q.results().count(), 2);

        let q = TypeAttributeQuery::new(&p)
            .with_types(["etc_t", "both_t"])
            .unwrap()
            .with_types_equal(true);
        let found: Vec<_> = q.results().map(|a| a.name.as_str()).collect();
        assert_eq!(found, vec!["file_type"]);
    }
}
