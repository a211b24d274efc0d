//! Differences between two policies.
//!
//! [`PolicyDifference`] compares a left (old) and a right (new) policy
//! component by component. Symbols are matched by name and rules by their
//! expanded key, since numeric ids are private to each policy. Every
//! component reports:
//!
//! - `added`: present only in the right policy
//! - `removed`: present only in the left policy
//! - `modified`: present in both, with a component-specific change record
//!
//! Results are computed on first request and cached for the lifetime of the
//! difference object.
//!
//! ```ignore
//! let diff = PolicyDifference::new(&old, &new);
//! for name in &diff.types().added {
//!     println!("+ type {}", name);
//! }
//! for rule in &diff.terules(TeRuletype::Allow).modified {
//!     if let TeRuleChange::Perms(perms) = &rule.change {
//!         println!("* {} +{:?} -{:?}", rule.rule, perms.added, perms.removed);
//!     }
//! }
//! ```

use std::collections::BTreeSet;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::info;

use crate::policy::{Policy, RbacRuletype, TeRuletype};

mod rules;
mod symbols;

pub use rules::{ModifiedRbacRule, ModifiedTeRule, RbacRuleDiff, TeRuleChange, TeRuleDiff};
pub use symbols::{
    ModifiedAttribute, ModifiedBoolean, ModifiedClass, ModifiedCommon, ModifiedProperty,
    ModifiedRole, ModifiedType, ModifiedUser, ValueChange,
};

// =============================================================================
// Shared result records
// =============================================================================

/// Set comparison of names or rendered items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub matched: BTreeSet<String>,
}

impl SetDiff {
    pub fn new<L, R, S>(left: L, right: R) -> Self
    where
        L: IntoIterator<Item = S>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let left: BTreeSet<String> = left.into_iter().map(Into::into).collect();
        let right: BTreeSet<String> = right.into_iter().map(Into::into).collect();
        Self {
            added: right.difference(&left).cloned().collect(),
            removed: left.difference(&right).cloned().collect(),
            matched: left.intersection(&right).cloned().collect(),
        }
    }

    pub fn is_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Added, removed and modified items of one component, each list sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Differences<M> {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<M>,
}

impl<M> Default for Differences<M> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            modified: Vec::new(),
        }
    }
}

impl<M> Differences<M> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Split `left`/`right` names into added and removed; the matched names
    /// are handed to `modified`, which returns a record when they differ.
    pub(crate) fn by_name<'a, F>(
        left: impl IntoIterator<Item = &'a str>,
        right: impl IntoIterator<Item = &'a str>,
        mut modified: F,
    ) -> Self
    where
        F: FnMut(&str) -> Option<M>,
    {
        let names = SetDiff::new(left, right);
        Self {
            modified: names.matched.iter().filter_map(|n| modified(n.as_str())).collect(),
            added: names.added.into_iter().collect(),
            removed: names.removed.into_iter().collect(),
        }
    }
}

// =============================================================================
// PolicyDifference
// =============================================================================

/// Lazily computed differences from `left` to `right`.
pub struct PolicyDifference<'p> {
    left: &'p Policy,
    right: &'p Policy,
    properties: OnceCell<Vec<ModifiedProperty>>,
    types: OnceCell<Differences<ModifiedType>>,
    attributes: OnceCell<Differences<ModifiedAttribute>>,
    roles: OnceCell<Differences<ModifiedRole>>,
    users: OnceCell<Differences<ModifiedUser>>,
    booleans: OnceCell<Differences<ModifiedBoolean>>,
    commons: OnceCell<Differences<ModifiedCommon>>,
    classes: OnceCell<Differences<ModifiedClass>>,
    terules: OnceCell<Vec<(TeRuletype, TeRuleDiff)>>,
    rbacrules: OnceCell<Vec<(RbacRuletype, RbacRuleDiff)>>,
}

impl<'p> PolicyDifference<'p> {
    pub fn new(left: &'p Policy, right: &'p Policy) -> Self {
        info!(
            "Policy difference from {} to {}",
            left.name(),
            right.name()
        );
        Self {
            left,
            right,
            properties: OnceCell::new(),
            types: OnceCell::new(),
            attributes: OnceCell::new(),
            roles: OnceCell::new(),
            users: OnceCell::new(),
            booleans: OnceCell::new(),
            commons: OnceCell::new(),
            classes: OnceCell::new(),
            terules: OnceCell::new(),
            rbacrules: OnceCell::new(),
        }
    }

    pub fn left(&self) -> &'p Policy {
        self.left
    }

    pub fn right(&self) -> &'p Policy {
        self.right
    }

    /// MLS and version changes.
    pub fn properties(&self) -> &[ModifiedProperty] {
        self.properties
            .get_or_init(|| symbols::diff_properties(self.left, self.right))
    }

    pub fn types(&self) -> &Differences<ModifiedType> {
        self.types
            .get_or_init(|| symbols::diff_types(self.left, self.right))
    }

    pub fn attributes(&self) -> &Differences<ModifiedAttribute> {
        self.attributes
            .get_or_init(|| symbols::diff_attributes(self.left, self.right))
    }

    pub fn roles(&self) -> &Differences<ModifiedRole> {
        self.roles
            .get_or_init(|| symbols::diff_roles(self.left, self.right))
    }

    pub fn users(&self) -> &Differences<ModifiedUser> {
        self.users
            .get_or_init(|| symbols::diff_users(self.left, self.right))
    }

    pub fn booleans(&self) -> &Differences<ModifiedBoolean> {
        self.booleans
            .get_or_init(|| symbols::diff_booleans(self.left, self.right))
    }

    pub fn commons(&self) -> &Differences<ModifiedCommon> {
        self.commons
            .get_or_init(|| symbols::diff_commons(self.left, self.right))
    }

    pub fn classes(&self) -> &Differences<ModifiedClass> {
        self.classes
            .get_or_init(|| symbols::diff_classes(self.left, self.right))
    }

    /// TE rule differences of one rule type. Rules are compared after
    /// expanding attributes to their member types.
    pub fn terules(&self, ruletype: TeRuletype) -> &TeRuleDiff {
        let all = self
            .terules
            .get_or_init(|| rules::diff_terules(self.left, self.right));
        match all.iter().find(|(rt, _)| *rt == ruletype) {
            Some((_, diff)) => diff,
            None => &EMPTY_TERULE_DIFF,
        }
    }

    /// RBAC rule differences of one rule type.
    pub fn rbacrules(&self, ruletype: RbacRuletype) -> &RbacRuleDiff {
        let all = self
            .rbacrules
            .get_or_init(|| rules::diff_rbacrules(self.left, self.right));
        match all.iter().find(|(rt, _)| *rt == ruletype) {
            Some((_, diff)) => diff,
            None => &EMPTY_RBACRULE_DIFF,
        }
    }

    /// True when no component reports a change.
    pub fn is_empty(&self) -> bool {
        self.properties().is_empty()
            && self.types().is_empty()
            && self.attributes().is_empty()
            && self.roles().is_empty()
            && self.users().is_empty()
            && self.booleans().is_empty()
            && self.commons().is_empty()
            && self.classes().is_empty()
            && rules::TE_RULETYPES
                .iter()
                .all(|rt| self.terules(*rt).is_empty())
            && rules::RBAC_RULETYPES
                .iter()
                .all(|rt| self.rbacrules(*rt).is_empty())
    }
}

static EMPTY_TERULE_DIFF: TeRuleDiff = Differences {
    added: Vec::new(),
    removed: Vec::new(),
    modified: Vec::new(),
};

static EMPTY_RBACRULE_DIFF: RbacRuleDiff = Differences {
    added: Vec::new(),
    removed: Vec::new(),
    modified: Vec::new(),
};
