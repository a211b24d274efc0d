use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::Result;
use crate::policy::{ClassId, Constraint, ConstraintRuletype, Policy, RoleId, TypeOrAttr, UserId};

use super::criteria::{exact_classes, match_object_class, resolve_set, string_set};
use super::matching::{match_in_set, match_set, validate_perms_any, Criterion};

/// Query constraints and validatetrans statements.
///
/// User, role and type criteria match the names appearing in the
/// constraint expression. With `type_indirect` (the default) attributes on
/// either side are expanded to their member types first.
#[derive(Debug, Clone)]
pub struct ConstraintQuery<'p> {
    policy: &'p Policy,
    ruletypes: BTreeSet<ConstraintRuletype>,
    tclass: Option<Criterion<BTreeSet<ClassId>>>,
    perms: Option<BTreeSet<String>>,
    perms_equal: bool,
    user: Option<Criterion<UserId>>,
    role: Option<Criterion<RoleId>>,
    type_: Option<Criterion<TypeOrAttr>>,
    type_indirect: bool,
}

impl<'p> ConstraintQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            ruletypes: BTreeSet::new(),
            tclass: None,
            perms: None,
            perms_equal: false,
            user: None,
            role: None,
            type_: None,
            type_indirect: true,
        }
    }

    pub fn with_ruletypes(
        mut self,
        ruletypes: impl IntoIterator<Item = ConstraintRuletype>,
    ) -> Self {
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

    /// Validatetrans statements have no permissions and never match.
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

    pub fn with_perms_equal(mut self, equal: bool) -> Self {
        self.perms_equal = equal;
        self
    }

    pub fn with_user(mut self, name: &str) -> Result<Self> {
        self.user = Some(Criterion::Exact(self.policy.lookup_user(name)?.id));
        Ok(self)
    }

    pub fn with_user_regex(mut self, pattern: &str) -> Result<Self> {
        self.user = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_role(mut self, name: &str) -> Result<Self> {
        self.role = Some(Criterion::Exact(self.policy.lookup_role(name)?.id));
        Ok(self)
    }

    pub fn with_role_regex(mut self, pattern: &str) -> Result<Self> {
        self.role = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_type(mut self, name: &str) -> Result<Self> {
        self.type_ = Some(Criterion::Exact(self.policy.lookup_type_or_attr(name)?));
        Ok(self)
    }

    pub fn with_type_regex(mut self, pattern: &str) -> Result<Self> {
        self.type_ = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_type_indirect(mut self, indirect: bool) -> Self {
        self.type_indirect = indirect;
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Constraint> + '_ {
        info!("Generating constraint results from {}", self.policy);
        debug!("Ruletypes: {:?}", self.ruletypes);
        debug!(
            "Class: {:?}, perms: {:?} (equal: {})",
            self.tclass, self.perms, self.perms_equal
        );
        debug!(
            "User: {:?}, role: {:?}, type: {:?} (indirect: {})",
            self.user, self.role, self.type_, self.type_indirect
        );
        self.policy.all_constraints().filter(move |c| self.matches(c))
    }

    fn matches(&self, constraint: &Constraint) -> bool {
        if !self.ruletypes.is_empty() && !self.ruletypes.contains(&constraint.ruletype) {
            return false;
        }
        if let Some(tclass) = &self.tclass {
            if !match_object_class(self.policy, constraint.tclass, tclass) {
                return false;
            }
        }
        if let Some(perms) = &self.perms {
            match constraint.perms() {
                Ok(obj) if match_set(obj, perms, self.perms_equal) => {}
                _ => return false,
            }
        }
        let expr = &constraint.expression;
        if let Some(user) = &self.user {
            if !match_in_set(self.policy, &expr.users(), user) {
                return false;
            }
        }
        if let Some(role) = &self.role {
            if !match_in_set(self.policy, &expr.roles(), role) {
                return false;
            }
        }
        if let Some(type_) = &self.type_ {
            let matched = if self.type_indirect {
                let types = expr.expanded_types(self.policy);
                match type_ {
                    Criterion::Exact(c) => c.expand(self.policy).iter().any(|t| types.contains(t)),
                    Criterion::Regex(r) => types
                        .iter()
                        .any(|t| r.is_match(&self.policy.type_(*t).name)),
                }
            } else {
                match_in_set(self.policy, &expr.types(), type_)
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
        let mut b = PolicyBuilder::new("constraints");
        b.class("process", &["transition", "dyntransition"], None).unwrap();
        b.class("file", &["create", "relabelto"], None).unwrap();
        b.attribute("domain").unwrap();
        b.type_("init_t", &["domain"]).unwrap();
        b.type_("file_t", &[]).unwrap();
        b.role("system_r", &[]).unwrap();
        b.role("object_r", &[]).unwrap();
        b.user("system_u", &["system_r"], None, None).unwrap();
        b.constrain(
            ConstraintRuletype::Constrain,
            "process",
            &["transition"],
            "u1 == u2 or t1 == domain",
        )
        .unwrap();
        b.constrain(
            ConstraintRuletype::Constrain,
            "file",
            &["create", "relabelto"],
            "r1 == object_r or u1 == system_u",
        )
        .unwrap();
        b.validatetrans(ConstraintRuletype::Validatetrans, "file", "t3 == file_t")
            .unwrap();
        b.build()
    }

    #[test]
    fn test_ruletypes_and_perms() {
        let p = policy();
        assert_eq!(ConstraintQuery::new(&p).results().count(), 3);

        let q = ConstraintQuery::new(&p).with_ruletypes([ConstraintRuletype::Validatetrans]);
        assert_eq!(q.results().count(), 1);

        let q = ConstraintQuery::new(&p)
            .with_tclass(["file"])
            .unwrap()
            .with_perms(["create"])
            .unwrap();
        assert_eq!(q.results().count(), 1);

        let q = ConstraintQuery::new(&p)
            .with_perms(["create"])
            .unwrap()
            .with_perms_equal(true);
        assert_eq!(q.results().count(), 0);
    }

    #[test]
    fn test_expression_names() {
        let p = policy();
        let q = ConstraintQuery::new(&p).with_user("system_u").unwrap();
        assert_eq!(q.results().count(), 1);

        let q = ConstraintQuery::new(&p).with_role_regex("^object").unwrap();
        assert_eq!(q.results().count(), 1);

        let q = ConstraintQuery::new(&p).with_type("init_t").unwrap();
        assert_eq!(q.results().count(), 1);

        let q = ConstraintQuery::new(&p)
            .with_type("init_t")
            .unwrap()
            .with_type_indirect(false);
        assert_eq!(q.results().count(), 0);

        let q = ConstraintQuery::new(&p).with_type_regex("^file").unwrap();
        assert_eq!(q.results().count(), 1);
    }
}
