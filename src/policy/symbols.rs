//! Policy symbols: types, attributes, roles, users, classes, commons,
//! booleans, and MLS sensitivities/categories.
//!
//! Symbols are stored in declaration order inside [`Policy`](super::Policy)
//! and referenced everywhere else by compact numeric ids.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::mls::{Level, Range};
use super::Policy;

// =============================================================================
// IDS
// =============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub(crate) u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u32)
            }
        }
    };
}

define_id!(
    /// Index of a type in the policy.
    TypeId
);
define_id!(
    /// Index of a type attribute in the policy.
    AttrId
);
define_id!(
    /// Index of a role in the policy.
    RoleId
);
define_id!(
    /// Index of a user in the policy.
    UserId
);
define_id!(
    /// Index of an object class in the policy.
    ClassId
);
define_id!(
    /// Index of a common permission set in the policy.
    CommonId
);
define_id!(
    /// Index of a conditional boolean in the policy.
    BoolId
);
define_id!(
    /// Index of an MLS category. Ordering follows declaration order.
    CategoryId
);
define_id!(
    /// Index of an MLS sensitivity. Ordering follows the dominance statement.
    SensitivityId
);

/// Either a type or a type attribute; the source/target of a TE rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypeOrAttr {
    Type(TypeId),
    Attr(AttrId),
}

impl TypeOrAttr {
    pub fn name<'p>(&self, policy: &'p Policy) -> &'p str {
        match self {
            TypeOrAttr::Type(id) => &policy.type_(*id).name,
            TypeOrAttr::Attr(id) => &policy.attribute(*id).name,
        }
    }

    /// Member types: the type itself, or every type carrying the attribute.
    pub fn expand<'a>(&'a self, policy: &'a Policy) -> &'a [TypeId] {
        match self {
            TypeOrAttr::Type(id) => std::slice::from_ref(id),
            TypeOrAttr::Attr(id) => &policy.attribute(*id).types,
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, TypeOrAttr::Attr(_))
    }
}

impl From<TypeId> for TypeOrAttr {
    fn from(id: TypeId) -> Self {
        TypeOrAttr::Type(id)
    }
}

impl From<AttrId> for TypeOrAttr {
    fn from(id: AttrId) -> Self {
        TypeOrAttr::Attr(id)
    }
}

// =============================================================================
// TYPE ENFORCEMENT SYMBOLS
// =============================================================================

/// A policy type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub id: TypeId,
    pub name: String,
    pub aliases: Vec<String>,
    pub attrs: BTreeSet<AttrId>,
    pub permissive: bool,
}

impl Type {
    pub fn attr_names<'a>(&'a self, policy: &'a Policy) -> impl Iterator<Item = &'a str> + 'a {
        self.attrs
            .iter()
            .map(move |a| policy.attribute(*a).name.as_str())
    }
}

/// A type attribute. `types` is sorted by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAttribute {
    pub id: AttrId,
    pub name: String,
    pub types: Vec<TypeId>,
}

// =============================================================================
// RBAC SYMBOLS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub types: BTreeSet<TypeId>,
}

impl Role {
    /// Roles expand to themselves.
    pub fn expand(&self) -> &[RoleId] {
        std::slice::from_ref(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub roles: BTreeSet<RoleId>,
    /// Default MLS level (MLS policies only).
    pub level: Option<Level>,
    /// Authorized MLS range (MLS policies only).
    pub range: Option<Range>,
}

// =============================================================================
// CLASSES AND PERMISSIONS
// =============================================================================

/// A common permission set shared by several classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Common {
    pub id: CommonId,
    pub name: String,
    pub perms: BTreeSet<String>,
}

/// An object class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjClass {
    pub id: ClassId,
    pub name: String,
    /// Permissions declared directly on the class.
    pub perms: BTreeSet<String>,
    pub common: Option<CommonId>,
}

impl ObjClass {
    /// Declared permissions plus those inherited from the common.
    pub fn all_perms(&self, policy: &Policy) -> BTreeSet<String> {
        let mut perms = self.perms.clone();
        if let Some(common) = self.common {
            perms.extend(policy.common(common).perms.iter().cloned());
        }
        perms
    }

    pub fn has_perm(&self, policy: &Policy, perm: &str) -> bool {
        self.perms.contains(perm)
            || self
                .common
                .is_some_and(|c| policy.common(c).perms.contains(perm))
    }
}

// =============================================================================
// BOOLEANS AND MLS SYMBOLS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boolean {
    pub id: BoolId,
    pub name: String,
    /// Default state.
    pub state: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensitivity {
    pub id: SensitivityId,
    pub name: String,
    pub aliases: Vec<String>,
    /// Categories the `level` declaration associates with this sensitivity.
    pub categories: BTreeSet<CategoryId>,
}

/// Symbol kinds that have a plain name inside a policy.
pub trait PolicySymbol {
    fn symbol_name(&self) -> &str;
}

macro_rules! impl_symbol {
    ($($ty:ty),*) => {
        $(impl PolicySymbol for $ty {
            fn symbol_name(&self) -> &str {
                &self.name
            }
        })*
    };
}

impl_symbol!(Type, TypeAttribute, Role, User, Common, ObjClass, Boolean, Category, Sensitivity);

/// Writes `{ a b c }` for several names, `a` for one.
pub(crate) fn fmt_name_set<'a>(
    f: &mut fmt::Formatter<'_>,
    names: impl IntoIterator<Item = &'a str>,
) -> fmt::Result {
    let names: Vec<&str> = names.into_iter().collect();
    if names.len() == 1 {
        write!(f, "{}", names[0])
    } else {
        write!(f, "{{ {} }}", names.join(" "))
    }
}
