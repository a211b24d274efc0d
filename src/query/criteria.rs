//! Criteria shared by several queries: name resolution, object class sets
//! and the context fields of labeling statements.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::policy::{ClassId, Context, Policy, Range, RoleId, TypeId, UserId};

use super::matching::{match_regex, Criterion, RangeMatch};

// =============================================================================
// CONSTRUCTION
// =============================================================================

/// Resolve each name into a set, failing on the first miss.
pub(crate) fn resolve_set<T, I, S, F>(names: I, mut lookup: F) -> Result<BTreeSet<T>>
where
    T: Ord,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: FnMut(&str) -> Result<T>,
{
    names.into_iter().map(|n| lookup(n.as_ref())).collect()
}

/// Owned string set from borrowed names.
pub(crate) fn string_set<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().map(|n| n.as_ref().to_string()).collect()
}

// =============================================================================
// OBJECT CLASS
// =============================================================================

/// The class is one of the criterion's classes, or its name matches.
pub(crate) fn match_object_class(
    policy: &Policy,
    class: ClassId,
    criterion: &Criterion<BTreeSet<ClassId>>,
) -> bool {
    match criterion {
        Criterion::Exact(classes) => classes.contains(&class),
        Criterion::Regex(r) => r.is_match(&policy.class(class).name),
    }
}

/// Classes an exact class criterion names; empty for a pattern or no criterion.
pub(crate) fn exact_classes(criterion: &Option<Criterion<BTreeSet<ClassId>>>) -> Vec<ClassId> {
    match criterion {
        Some(Criterion::Exact(classes)) => classes.iter().copied().collect(),
        _ => Vec::new(),
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// User, role, type and range criteria on a security context.
#[derive(Debug, Clone, Default)]
pub struct ContextCriteria {
    pub(crate) user: Option<Criterion<UserId>>,
    pub(crate) role: Option<Criterion<RoleId>>,
    pub(crate) type_: Option<Criterion<TypeId>>,
    pub(crate) range: Option<Range>,
    pub(crate) range_match: RangeMatch,
}

impl ContextCriteria {
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.role.is_none() && self.type_.is_none() && self.range.is_none()
    }

    pub fn matches(&self, policy: &Policy, context: &Context) -> bool {
        if let Some(user) = &self.user {
            if !match_regex(policy, &context.user, user) {
                return false;
            }
        }
        if let Some(role) = &self.role {
            if !match_regex(policy, &context.role, role) {
                return false;
            }
        }
        if let Some(type_) = &self.type_ {
            if !match_regex(policy, &context.type_, type_) {
                return false;
            }
        }
        if let Some(range) = &self.range {
            match &context.range {
                Some(obj) if self.range_match.matches(obj, range) => {}
                _ => return false,
            }
        }
        true
    }

    /// Objects without a context only match when no context criteria are set.
    pub fn matches_optional(&self, policy: &Policy, context: Option<&Context>) -> bool {
        match context {
            Some(context) => self.matches(policy, context),
            None => self.is_empty(),
        }
    }
}

/// Context criteria setters for queries over labeling statements.
pub trait ContextQuery: Sized {
    fn policy(&self) -> &Policy;

    fn context_criteria(&mut self) -> &mut ContextCriteria;

    fn with_user(mut self, name: &str) -> Result<Self> {
        let user = self.policy().lookup_user(name)?.id;
        self.context_criteria().user = Some(Criterion::Exact(user));
        Ok(self)
    }

    fn with_user_regex(mut self, pattern: &str) -> Result<Self> {
        self.context_criteria().user = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    fn with_role(mut self, name: &str) -> Result<Self> {
        let role = self.policy().lookup_role(name)?.id;
        self.context_criteria().role = Some(Criterion::Exact(role));
        Ok(self)
    }

    fn with_role_regex(mut self, pattern: &str) -> Result<Self> {
        self.context_criteria().role = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    fn with_type(mut self, name: &str) -> Result<Self> {
        let type_ = self.policy().lookup_type(name)?.id;
        self.context_criteria().type_ = Some(Criterion::Exact(type_));
        Ok(self)
    }

    fn with_type_regex(mut self, pattern: &str) -> Result<Self> {
        self.context_criteria().type_ = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    /// Match the context's MLS range, e.g. `s0 - s1:c0.c3`.
    fn with_range(mut self, range: &str, mode: RangeMatch) -> Result<Self> {
        let range = self.policy().lookup_range(range)?;
        let criteria = self.context_criteria();
        criteria.range = Some(range);
        criteria.range_match = mode;
        Ok(self)
    }
}

/// Implements [`ContextQuery`] for a query with `policy` and `context` fields.
macro_rules! impl_context_query {
    ($($query:ident),* $(,)?) => {
        $(impl<'p> $crate::query::criteria::ContextQuery for $query<'p> {
            fn policy(&self) -> &$crate::policy::Policy {
                self.policy
            }

            fn context_criteria(&mut self) -> &mut $crate::query::criteria::ContextCriteria {
                &mut self.context
            }
        })*
    };
}

pub(crate) use impl_context_query;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyBuilder;

    fn policy() -> Policy {
        let mut b = PolicyBuilder::new("criteria");
        b.mls(true);
        b.sensitivity("s0", &[]).unwrap();
        b.sensitivity("s1", &[]).unwrap();
        b.category("c0", &[]).unwrap();
        b.category("c1", &[]).unwrap();
        b.level_decl("s0:c0.c1").unwrap();
        b.level_decl("s1:c0.c1").unwrap();
        b.class("file", &["read"], None).unwrap();
        b.class("dir", &["search"], None).unwrap();
        b.type_("port_t", &[]).unwrap();
        b.role("object_r", &["port_t"]).unwrap();
        b.user("system_u", &["object_r"], Some("s0"), Some("s0 - s1:c0.c1")).unwrap();
        b.build()
    }

    #[test]
    fn test_context_criteria() {
        let p = policy();
        let ctx = p.lookup_context("system_u:object_r:port_t:s0 - s1").unwrap();

        let mut criteria = ContextCriteria::default();
        assert!(criteria.is_empty());
        assert!(criteria.matches(&p, &ctx));
        assert!(criteria.matches_optional(&p, None));

        criteria.type_ = Some(Criterion::regex("^port").unwrap());
        assert!(criteria.matches(&p, &ctx));
        assert!(!criteria.matches_optional(&p, None));

        criteria.range = Some(p.lookup_range("s0").unwrap());
        assert!(!criteria.matches(&p, &ctx));
        criteria.range_match = RangeMatch::Subset { proper: false };
        assert!(criteria.matches(&p, &ctx));
    }

    #[test]
    fn test_object_class_criterion() {
        let p = policy();
        let file = p.lookup_class("file").unwrap().id;
        let dir = p.lookup_class("dir").unwrap().id;

        let exact = Criterion::Exact(BTreeSet::from([file]));
        assert!(match_object_class(&p, file, &exact));
        assert!(!match_object_class(&p, dir, &exact));
        assert_eq!(exact_classes(&Some(exact)), vec![file]);

        let regex = Criterion::regex("^d").unwrap();
        assert!(match_object_class(&p, dir, &regex));
        assert!(exact_classes(&Some(regex)).is_empty());
    }
}
