//! Shared matching primitives used by every query.
//!
//! A criterion is either an exact symbol ([`Criterion::Exact`]) or a
//! regular expression applied to the symbol's name ([`Criterion::Regex`]).
//! Regular expressions are unanchored searches, so `"_t$"` matches every
//! name ending in `_t`.
//!
//! Range matching works on anything with ordered `low`/`high` endpoints
//! ([`Span`]): MLS ranges (partially ordered by dominance) and numeric
//! port/pkey/address ranges.

use std::collections::BTreeSet;

use regex::Regex;

use crate::error::{PolicyError, Result};
use crate::policy::{
    AttrId, BoolId, CategoryId, ClassId, CommonId, Level, NumRange, Policy, Range, RoleId,
    SensitivityId, TypeId, TypeOrAttr, UserId,
};

// =============================================================================
// CRITERIA
// =============================================================================

/// Exact value or name pattern.
#[derive(Debug, Clone)]
pub enum Criterion<T> {
    Exact(T),
    Regex(Regex),
}

impl<T> Criterion<T> {
    /// Compile a name pattern.
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Criterion::Regex(Regex::new(pattern)?))
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Criterion::Regex(_))
    }
}

/// Anything with a name in the context of a policy.
pub trait Named {
    fn name_in<'a>(&'a self, policy: &'a Policy) -> &'a str;
}

impl Named for String {
    fn name_in<'a>(&'a self, _policy: &'a Policy) -> &'a str {
        self
    }
}

macro_rules! impl_named {
    ($($id:ty => $getter:ident),* $(,)?) => {
        $(impl Named for $id {
            fn name_in<'a>(&'a self, policy: &'a Policy) -> &'a str {
                &policy.$getter(*self).name
            }
        })*
    };
}

impl_named!(
    TypeId => type_,
    AttrId => attribute,
    RoleId => role,
    UserId => user,
    ClassId => class,
    CommonId => common,
    BoolId => boolean,
    CategoryId => category,
    SensitivityId => sensitivity,
);

impl Named for TypeOrAttr {
    fn name_in<'a>(&'a self, policy: &'a Policy) -> &'a str {
        self.name(policy)
    }
}

/// Symbols that expand into member symbols (attributes into types).
pub trait Expandable: Named + PartialEq {
    type Member: Named + PartialEq;

    fn members<'a>(&'a self, policy: &'a Policy) -> &'a [Self::Member];
}

impl Expandable for TypeOrAttr {
    type Member = TypeId;

    fn members<'a>(&'a self, policy: &'a Policy) -> &'a [TypeId] {
        self.expand(policy)
    }
}

impl Expandable for RoleId {
    type Member = RoleId;

    fn members<'a>(&'a self, _policy: &'a Policy) -> &'a [RoleId] {
        std::slice::from_ref(self)
    }
}

// =============================================================================
// PRIMITIVES
// =============================================================================

/// Equality on the exact value, or a pattern search on the name.
pub fn match_regex<T: Named + PartialEq>(policy: &Policy, obj: &T, criterion: &Criterion<T>) -> bool {
    match criterion {
        Criterion::Exact(c) => obj == c,
        Criterion::Regex(r) => r.is_match(obj.name_in(policy)),
    }
}

/// Set equality when `equal`, otherwise non-empty intersection.
pub fn match_set<T: Ord>(obj: &BTreeSet<T>, criteria: &BTreeSet<T>, equal: bool) -> bool {
    if equal {
        obj == criteria
    } else {
        !obj.is_disjoint(criteria)
    }
}

/// The criterion is a member of the collection.
pub fn match_in_set<'a, T, I>(policy: &Policy, obj: I, criterion: &Criterion<T>) -> bool
where
    T: Named + PartialEq + 'a,
    I: IntoIterator<Item = &'a T>,
{
    match criterion {
        Criterion::Exact(c) => obj.into_iter().any(|o| o == c),
        Criterion::Regex(r) => obj.into_iter().any(|o| r.is_match(o.name_in(policy))),
    }
}

/// With `indirect`, compare expanded members: for an exact criterion the
/// member sets of object and criterion must intersect, for a pattern any
/// member name must match. Without `indirect`, defer to [`match_regex`].
pub fn match_indirect_regex<T: Expandable>(
    policy: &Policy,
    obj: &T,
    criterion: &Criterion<T>,
    indirect: bool,
) -> bool {
    if !indirect {
        return match_regex(policy, obj, criterion);
    }
    let members = obj.members(policy);
    match criterion {
        Criterion::Exact(c) => {
            let wanted = c.members(policy);
            members.iter().any(|m| wanted.contains(m))
        }
        Criterion::Regex(r) => members.iter().any(|m| r.is_match(m.name_in(policy))),
    }
}

/// A pattern matches any member by name (overriding `equal`); a set
/// criterion is compared with [`match_set`].
pub fn match_regex_or_set<T: Named + Ord>(
    policy: &Policy,
    obj: &BTreeSet<T>,
    criterion: &Criterion<BTreeSet<T>>,
    equal: bool,
) -> bool {
    match criterion {
        Criterion::Exact(c) => match_set(obj, c, equal),
        Criterion::Regex(r) => obj.iter().any(|o| r.is_match(o.name_in(policy))),
    }
}

// =============================================================================
// RANGES AND LEVELS
// =============================================================================

/// Anything with `low`/`high` endpoints.
pub trait Span {
    type Endpoint: PartialOrd;

    fn low(&self) -> &Self::Endpoint;
    fn high(&self) -> &Self::Endpoint;
}

impl Span for Range {
    type Endpoint = Level;

    fn low(&self) -> &Level {
        &self.low
    }

    fn high(&self) -> &Level {
        &self.high
    }
}

impl<T: PartialOrd> Span for NumRange<T> {
    type Endpoint = T;

    fn low(&self) -> &T {
        &self.low
    }

    fn high(&self) -> &T {
        &self.high
    }
}

/// How a range criterion is compared with an object's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeMatch {
    /// Endpoints equal.
    #[default]
    Exact,
    /// The ranges intersect.
    Overlap,
    /// The criterion lies within the object's range.
    Subset { proper: bool },
    /// The criterion covers the object's range.
    Superset { proper: bool },
}

impl RangeMatch {
    /// Only one mode applies; overlap wins over subset, subset over superset.
    pub fn from_flags(subset: bool, overlap: bool, superset: bool, proper: bool) -> Self {
        if overlap {
            RangeMatch::Overlap
        } else if subset {
            RangeMatch::Subset { proper }
        } else if superset {
            RangeMatch::Superset { proper }
        } else {
            RangeMatch::Exact
        }
    }

    pub fn matches<S: Span>(self, obj: &S, criteria: &S) -> bool {
        let (ol, oh) = (obj.low(), obj.high());
        let (cl, ch) = (criteria.low(), criteria.high());
        match self {
            RangeMatch::Overlap => {
                (ol <= cl && cl <= oh) || (ol <= ch && ch <= oh) || (cl <= ol && oh <= ch)
            }
            RangeMatch::Subset { proper: true } => {
                (ol < cl && ch <= oh) || (ol <= cl && ch < oh)
            }
            RangeMatch::Subset { proper: false } => ol <= cl && ch <= oh,
            RangeMatch::Superset { proper: true } => {
                (cl < ol && oh <= ch) || (cl <= ol && oh < ch)
            }
            RangeMatch::Superset { proper: false } => cl <= ol && oh <= ch,
            RangeMatch::Exact => cl == ol && oh == ch,
        }
    }
}

/// Flag-based form of [`RangeMatch::matches`].
pub fn match_range<S: Span>(
    obj: &S,
    criteria: &S,
    subset: bool,
    overlap: bool,
    superset: bool,
    proper: bool,
) -> bool {
    RangeMatch::from_flags(subset, overlap, superset, proper).matches(obj, criteria)
}

/// How a level criterion is compared with an object's level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelMatch {
    #[default]
    Exact,
    /// The criterion dominates the object.
    Dom,
    /// The criterion is dominated by the object.
    Domby,
    /// Neither dominates.
    Incomp,
}

impl LevelMatch {
    pub fn from_flags(dom: bool, domby: bool, incomp: bool) -> Self {
        if dom {
            LevelMatch::Dom
        } else if domby {
            LevelMatch::Domby
        } else if incomp {
            LevelMatch::Incomp
        } else {
            LevelMatch::Exact
        }
    }

    pub fn matches(self, obj: &Level, criteria: &Level) -> bool {
        match self {
            LevelMatch::Dom => criteria.dominates(obj),
            LevelMatch::Domby => obj.dominates(criteria),
            LevelMatch::Incomp => criteria.incomparable(obj),
            LevelMatch::Exact => criteria == obj,
        }
    }
}

/// Flag-based form of [`LevelMatch::matches`].
pub fn match_level(obj: &Level, criteria: &Level, dom: bool, domby: bool, incomp: bool) -> bool {
    LevelMatch::from_flags(dom, domby, incomp).matches(obj, criteria)
}

// =============================================================================
// PERMISSION VALIDATION
// =============================================================================

/// Each permission must be valid (declared or inherited from the common)
/// for at least one of `classes`, or for some class in the policy when
/// `classes` is empty.
pub fn validate_perms_any<'a>(
    policy: &Policy,
    perms: impl IntoIterator<Item = &'a str>,
    classes: &[ClassId],
) -> Result<()> {
    let mut invalid: BTreeSet<&str> = perms.into_iter().collect();
    if invalid.is_empty() {
        return Err(PolicyError::InvalidValue(
            "No permissions specified.".to_string(),
        ));
    }

    let candidates: Vec<ClassId> = if classes.is_empty() {
        policy.classes().map(|c| c.id).collect()
    } else {
        classes.to_vec()
    };

    for class in &candidates {
        let class = policy.class(*class);
        invalid.retain(|p| !class.has_perm(policy, p));
        if invalid.is_empty() {
            return Ok(());
        }
    }

    let classes = if classes.is_empty() {
        "any class".to_string()
    } else {
        classes
            .iter()
            .map(|c| policy.class(*c).name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    Err(PolicyError::InvalidPermission {
        perms: invalid.into_iter().collect::<Vec<_>>().join(", "),
        classes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyBuilder;

    fn policy() -> Policy {
        let mut b = PolicyBuilder::new("matching");
        b.mls(true);
        b.sensitivity("s0", &[]).unwrap();
        b.sensitivity("s1", &[]).unwrap();
        b.sensitivity("s2", &[]).unwrap();
        for c in 0..4 {
            b.category(&format!("c{}", c), &[]).unwrap();
        }
        b.common("file", &["read", "write"]).unwrap();
        b.class("file", &["execute"], Some("file")).unwrap();
        b.class("process", &["transition"], None).unwrap();
        b.attribute("domain").unwrap();
        b.attribute("exec_type").unwrap();
        b.type_("a_t", &["domain"]).unwrap();
        b.type_("b_t", &["domain", "exec_type"]).unwrap();
        b.type_("c_t", &["exec_type"]).unwrap();
        b.build()
    }

    fn toa(p: &Policy, name: &str) -> TypeOrAttr {
        p.lookup_type_or_attr(name).unwrap()
    }

    #[test]
    fn test_match_regex_exact_and_pattern() {
        let p = policy();
        let a = toa(&p, "a_t");
        assert!(match_regex(&p, &a, &Criterion::Exact(a)));
        assert!(!match_regex(&p, &a, &Criterion::Exact(toa(&p, "b_t"))));
        assert!(match_regex(&p, &a, &Criterion::regex("^a_").unwrap()));
        // unanchored search
        assert!(match_regex(&p, &a, &Criterion::regex("_t").unwrap()));
        assert!(!match_regex(&p, &a, &Criterion::regex("^b").unwrap()));
    }

    #[test]
    fn test_match_set() {
        let obj: BTreeSet<String> = ["read", "write"].iter().map(|s| s.to_string()).collect();
        let some: BTreeSet<String> = ["write", "ioctl"].iter().map(|s| s.to_string()).collect();
        assert!(match_set(&obj, &some, false));
        assert!(!match_set(&obj, &some, true));
        assert!(match_set(&obj, &obj.clone(), true));
    }

    #[test]
    fn test_match_indirect_expands_both_sides() {
        let p = policy();
        let domain = toa(&p, "domain");
        let exec = toa(&p, "exec_type");
        let c = toa(&p, "c_t");

        // domain and exec_type share b_t
        assert!(match_indirect_regex(&p, &domain, &Criterion::Exact(exec), true));
        assert!(!match_indirect_regex(&p, &domain, &Criterion::Exact(exec), false));
        assert!(!match_indirect_regex(&p, &domain, &Criterion::Exact(c), true));
        assert!(match_indirect_regex(&p, &exec, &Criterion::Exact(c), true));
        assert!(match_indirect_regex(&p, &domain, &Criterion::regex("^b_t$").unwrap(), true));
        assert!(!match_indirect_regex(&p, &domain, &Criterion::regex("^b_t$").unwrap(), false));
    }

    #[test]
    fn test_match_regex_or_set() {
        let p = policy();
        let obj: BTreeSet<String> = ["read", "write"].iter().map(|s| s.to_string()).collect();
        let crit: BTreeSet<String> = ["read"].iter().map(|s| s.to_string()).collect();
        assert!(match_regex_or_set(&p, &obj, &Criterion::Exact(crit.clone()), false));
        assert!(!match_regex_or_set(&p, &obj, &Criterion::Exact(crit), true));
        assert!(match_regex_or_set(&p, &obj, &Criterion::regex("^wr").unwrap(), true));
    }

    #[test]
    fn test_match_in_set() {
        let p = policy();
        let roles: Vec<String> = vec!["object_r".into(), "system_r".into()];
        assert!(match_in_set(&p, &roles, &Criterion::Exact("system_r".to_string())));
        assert!(match_in_set(&p, &roles, &Criterion::regex("^obj").unwrap()));
        assert!(!match_in_set(&p, &roles, &Criterion::regex("^user").unwrap()));
    }

    #[test]
    fn test_match_range_numeric() {
        let obj = NumRange::new(100u16, 200).unwrap();
        let inner = NumRange::new(120u16, 150).unwrap();
        let outer = NumRange::new(50u16, 250).unwrap();
        let edge = NumRange::new(100u16, 150).unwrap();
        let apart = NumRange::new(300u16, 400).unwrap();

        // all flags false is endpoint equality
        assert!(match_range(&obj, &obj.clone(), false, false, false, false));
        assert!(!match_range(&obj, &inner, false, false, false, false));

        assert!(match_range(&obj, &inner, true, false, false, false));
        assert!(match_range(&obj, &edge, true, false, false, true));
        assert!(!match_range(&obj, &obj.clone(), true, false, false, true));
        assert!(match_range(&obj, &outer, false, false, true, false));
        assert!(!match_range(&obj, &inner, false, false, true, false));
        assert!(match_range(&obj, &outer, false, true, false, false));
        assert!(!match_range(&obj, &apart, false, true, false, false));
    }

    #[test]
    fn test_range_flag_tie_break() {
        assert_eq!(RangeMatch::from_flags(true, true, true, false), RangeMatch::Overlap);
        assert_eq!(
            RangeMatch::from_flags(true, false, true, true),
            RangeMatch::Subset { proper: true }
        );
        assert_eq!(
            RangeMatch::from_flags(false, false, true, false),
            RangeMatch::Superset { proper: false }
        );
    }

    #[test]
    fn test_match_range_mls() {
        let p = policy();
        let obj = p.lookup_range("s0 - s2:c0.c3").unwrap();
        let inner = p.lookup_range("s1:c1 - s1:c0.c2").unwrap();
        let other = p.lookup_range("s0:c0 - s0:c0").unwrap();
        assert!(match_range(&obj, &inner, true, false, false, false));
        assert!(match_range(&obj, &inner, false, true, false, false));
        assert!(!match_range(&other, &inner, false, true, false, false));
    }

    #[test]
    fn test_match_level() {
        let p = policy();
        let low = p.lookup_level("s0:c0").unwrap();
        let high = p.lookup_level("s1:c0,c1").unwrap();
        let side = p.lookup_level("s1:c2").unwrap();

        assert!(match_level(&low, &high, true, false, false));
        assert!(!match_level(&high, &low, true, false, false));
        assert!(match_level(&high, &low, false, true, false));
        assert!(match_level(&low, &side, false, false, true));
        assert!(match_level(&low, &low.clone(), false, false, false));
    }

    #[test]
    fn test_validate_perms_any() {
        let p = policy();
        let file = p.lookup_class("file").unwrap().id;
        let process = p.lookup_class("process").unwrap().id;

        assert!(validate_perms_any(&p, ["read", "execute"], &[file]).is_ok());
        assert!(validate_perms_any(&p, ["read", "transition"], &[file, process]).is_ok());
        assert!(validate_perms_any(&p, ["transition"], &[]).is_ok());
        assert!(matches!(
            validate_perms_any(&p, ["transition"], &[file]),
            Err(PolicyError::InvalidPermission { .. })
        ));
        assert!(matches!(
            validate_perms_any(&p, ["bogus"], &[]),
            Err(PolicyError::InvalidPermission { .. })
        ));
        assert!(matches!(
            validate_perms_any(&p, std::iter::empty::<&str>(), &[]),
            Err(PolicyError::InvalidValue(_))
        ));
    }
}
