//! In-memory SELinux policy store.
//!
//! [`Policy`] is the read-only view every query and analysis consumes: it
//! enumerates policy objects in declaration order and resolves names into
//! symbols, raising the matching `Invalid*` error on a miss. Policies are
//! assembled with [`PolicyBuilder`]; once built they are immutable and can
//! be shared freely between queries and analyses.
//!
//! # Example
//!
//! ```ignore
//! use seflow::policy::PolicyBuilder;
//!
//! let mut b = PolicyBuilder::new("example");
//! b.class("file", &["read", "write"], None)?;
//! b.type_("user_t", &[])?;
//! b.type_("home_t", &[])?;
//! b.allow("user_t", "home_t", "file", &["read"])?;
//! let policy = b.build();
//!
//! for rule in policy.terules() {
//!     println!("{}", rule.display(&policy));
//! }
//! ```

pub mod boolexpr;
pub mod builder;
pub mod constraint;
pub mod context;
pub mod mls;
pub mod ocontext;
pub mod rules;
pub mod symbols;

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{PolicyError, Result};

pub use boolexpr::{CondNode, CondOp, ConditionalExpr};
pub use builder::PolicyBuilder;
pub use constraint::{
    Constraint, ConstraintExpr, ConstraintNames, ConstraintNode, ConstraintOp,
    ConstraintRuletype, Operand,
};
pub use context::Context;
pub use mls::{Level, Range};
pub use ocontext::{
    Devicetreecon, FileType, FsUse, FsUseRuletype, Genfscon, Ibendportcon, Ibpkeycon,
    InitialSid, Iomemcon, Ioportcon, IpNetwork, IpVersion, Netifcon, Nodecon, NumRange,
    Pcidevicecon, Pirqcon, Portcon, PortconProtocol,
};
pub use rules::{
    Bounds, BoundsRuletype, CondId, Conditional, DefaultRangeValue, DefaultRule,
    DefaultRuletype, DefaultValue, MlsRule, MlsRuletype, RbacRule, RbacRuletype, RbacTarget,
    TePayload, TeRule, TeRuletype, XpermRule, XpermRuletype,
};
pub use symbols::{
    AttrId, BoolId, Boolean, Category, CategoryId, ClassId, Common, CommonId, ObjClass,
    PolicySymbol, Role, RoleId, Sensitivity, SensitivityId, Type, TypeAttribute, TypeId,
    TypeOrAttr, User, UserId,
};

// =============================================================================
// RENDERING
// =============================================================================

/// Policy objects that render as policy-language text.
///
/// Rendering needs the policy to turn ids back into names, so instead of
/// `Display` the object hands out a [`Displayed`] adapter bound to a policy.
pub trait PolicyDisplay {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result;

    fn display<'a>(&'a self, policy: &'a Policy) -> Displayed<'a, Self>
    where
        Self: Sized,
    {
        Displayed { item: self, policy }
    }
}

/// `Display` adapter returned by [`PolicyDisplay::display`].
pub struct Displayed<'a, T> {
    item: &'a T,
    policy: &'a Policy,
}

impl<T: PolicyDisplay> fmt::Display for Displayed<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.item.fmt_with(self.policy, f)
    }
}

// =============================================================================
// POLICY
// =============================================================================

/// A loaded policy.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub(crate) name: String,
    pub(crate) version: u32,
    pub(crate) mls: bool,

    pub(crate) types: Vec<Type>,
    pub(crate) attributes: Vec<TypeAttribute>,
    pub(crate) roles: Vec<Role>,
    pub(crate) users: Vec<User>,
    pub(crate) commons: Vec<Common>,
    pub(crate) classes: Vec<ObjClass>,
    pub(crate) bools: Vec<Boolean>,
    pub(crate) categories: Vec<Category>,
    pub(crate) sensitivities: Vec<Sensitivity>,
    pub(crate) polcaps: Vec<String>,
    pub(crate) cond_exprs: Vec<ConditionalExpr>,

    pub(crate) terules: Vec<TeRule>,
    pub(crate) mlsrules: Vec<MlsRule>,
    pub(crate) rbacrules: Vec<RbacRule>,
    pub(crate) xpermrules: Vec<XpermRule>,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) defaults: Vec<DefaultRule>,
    pub(crate) bounds: Vec<Bounds>,

    pub(crate) initialsids: Vec<InitialSid>,
    pub(crate) portcons: Vec<Portcon>,
    pub(crate) netifcons: Vec<Netifcon>,
    pub(crate) nodecons: Vec<Nodecon>,
    pub(crate) fs_uses: Vec<FsUse>,
    pub(crate) genfscons: Vec<Genfscon>,
    pub(crate) ibpkeycons: Vec<Ibpkeycon>,
    pub(crate) ibendportcons: Vec<Ibendportcon>,
    pub(crate) pcidevicecons: Vec<Pcidevicecon>,
    pub(crate) pirqcons: Vec<Pirqcon>,
    pub(crate) ioportcons: Vec<Ioportcon>,
    pub(crate) iomemcons: Vec<Iomemcon>,
    pub(crate) devicetreecons: Vec<Devicetreecon>,

    // Name indices. Types, aliases and attributes share one namespace.
    pub(crate) type_index: FxHashMap<String, TypeOrAttr>,
    pub(crate) role_index: FxHashMap<String, RoleId>,
    pub(crate) user_index: FxHashMap<String, UserId>,
    pub(crate) class_index: FxHashMap<String, ClassId>,
    pub(crate) common_index: FxHashMap<String, CommonId>,
    pub(crate) bool_index: FxHashMap<String, BoolId>,
    pub(crate) category_index: FxHashMap<String, CategoryId>,
    pub(crate) sensitivity_index: FxHashMap<String, SensitivityId>,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Policy {
    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// MLS enabled.
    pub fn mls(&self) -> bool {
        self.mls
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    // -------------------------------------------------------------------------
    // Access by id
    // -------------------------------------------------------------------------

    pub fn type_(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub fn attribute(&self, id: AttrId) -> &TypeAttribute {
        &self.attributes[id.index()]
    }

    pub fn role(&self, id: RoleId) -> &Role {
        &self.roles[id.index()]
    }

    pub fn user(&self, id: UserId) -> &User {
        &self.users[id.index()]
    }

    pub fn class(&self, id: ClassId) -> &ObjClass {
        &self.classes[id.index()]
    }

    pub fn common(&self, id: CommonId) -> &Common {
        &self.commons[id.index()]
    }

    pub fn boolean(&self, id: BoolId) -> &Boolean {
        &self.bools[id.index()]
    }

    pub fn category(&self, id: CategoryId) -> &Category {
        &self.categories[id.index()]
    }

    pub fn sensitivity(&self, id: SensitivityId) -> &Sensitivity {
        &self.sensitivities[id.index()]
    }

    pub fn conditional_expr(&self, id: CondId) -> &ConditionalExpr {
        &self.cond_exprs[id.0 as usize]
    }

    // -------------------------------------------------------------------------
    // Enumerators
    // -------------------------------------------------------------------------

    pub fn types(&self) -> impl Iterator<Item = &Type> + '_ {
        self.types.iter()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &TypeAttribute> + '_ {
        self.attributes.iter()
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> + '_ {
        self.roles.iter()
    }

    pub fn users(&self) -> impl Iterator<Item = &User> + '_ {
        self.users.iter()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ObjClass> + '_ {
        self.classes.iter()
    }

    pub fn commons(&self) -> impl Iterator<Item = &Common> + '_ {
        self.commons.iter()
    }

    pub fn bools(&self) -> impl Iterator<Item = &Boolean> + '_ {
        self.bools.iter()
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> + '_ {
        self.categories.iter()
    }

    pub fn sensitivities(&self) -> impl Iterator<Item = &Sensitivity> + '_ {
        self.sensitivities.iter()
    }

    pub fn polcaps(&self) -> impl Iterator<Item = &str> + '_ {
        self.polcaps.iter().map(String::as_str)
    }

    pub fn terules(&self) -> impl Iterator<Item = &TeRule> + '_ {
        self.terules.iter()
    }

    pub fn mlsrules(&self) -> impl Iterator<Item = &MlsRule> + '_ {
        self.mlsrules.iter()
    }

    pub fn rbacrules(&self) -> impl Iterator<Item = &RbacRule> + '_ {
        self.rbacrules.iter()
    }

    pub fn xpermrules(&self) -> impl Iterator<Item = &XpermRule> + '_ {
        self.xpermrules.iter()
    }

    /// constrain and mlsconstrain statements.
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> + '_ {
        self.constraints
            .iter()
            .filter(|c| !c.ruletype.is_validatetrans())
    }

    /// validatetrans and mlsvalidatetrans statements.
    pub fn validatetrans(&self) -> impl Iterator<Item = &Constraint> + '_ {
        self.constraints
            .iter()
            .filter(|c| c.ruletype.is_validatetrans())
    }

    /// Every constraint-like statement in declaration order.
    pub fn all_constraints(&self) -> impl Iterator<Item = &Constraint> + '_ {
        self.constraints.iter()
    }

    pub fn defaults(&self) -> impl Iterator<Item = &DefaultRule> + '_ {
        self.defaults.iter()
    }

    pub fn bounds(&self) -> impl Iterator<Item = &Bounds> + '_ {
        self.bounds.iter()
    }

    pub fn initialsids(&self) -> impl Iterator<Item = &InitialSid> + '_ {
        self.initialsids.iter()
    }

    pub fn portcons(&self) -> impl Iterator<Item = &Portcon> + '_ {
        self.portcons.iter()
    }

    pub fn netifcons(&self) -> impl Iterator<Item = &Netifcon> + '_ {
        self.netifcons.iter()
    }

    pub fn nodecons(&self) -> impl Iterator<Item = &Nodecon> + '_ {
        self.nodecons.iter()
    }

    pub fn fs_uses(&self) -> impl Iterator<Item = &FsUse> + '_ {
        self.fs_uses.iter()
    }

    pub fn genfscons(&self) -> impl Iterator<Item = &Genfscon> + '_ {
        self.genfscons.iter()
    }

    pub fn ibpkeycons(&self) -> impl Iterator<Item = &Ibpkeycon> + '_ {
        self.ibpkeycons.iter()
    }

    pub fn ibendportcons(&self) -> impl Iterator<Item = &Ibendportcon> + '_ {
        self.ibendportcons.iter()
    }

    pub fn pcidevicecons(&self) -> impl Iterator<Item = &Pcidevicecon> + '_ {
        self.pcidevicecons.iter()
    }

    pub fn pirqcons(&self) -> impl Iterator<Item = &Pirqcon> + '_ {
        self.pirqcons.iter()
    }

    pub fn ioportcons(&self) -> impl Iterator<Item = &Ioportcon> + '_ {
        self.ioportcons.iter()
    }

    pub fn iomemcons(&self) -> impl Iterator<Item = &Iomemcon> + '_ {
        self.iomemcons.iter()
    }

    pub fn devicetreecons(&self) -> impl Iterator<Item = &Devicetreecon> + '_ {
        self.devicetreecons.iter()
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// Resolve a type name or alias. Attributes are rejected.
    pub fn lookup_type(&self, name: &str) -> Result<&Type> {
        match self.type_index.get(name) {
            Some(TypeOrAttr::Type(id)) => Ok(self.type_(*id)),
            _ => Err(PolicyError::InvalidType(name.to_string())),
        }
    }

    /// Resolve an attribute name. Types are rejected.
    pub fn lookup_typeattr(&self, name: &str) -> Result<&TypeAttribute> {
        match self.type_index.get(name) {
            Some(TypeOrAttr::Attr(id)) => Ok(self.attribute(*id)),
            _ => Err(PolicyError::InvalidType(name.to_string())),
        }
    }

    pub fn lookup_type_or_attr(&self, name: &str) -> Result<TypeOrAttr> {
        self.type_index
            .get(name)
            .copied()
            .ok_or_else(|| PolicyError::InvalidType(name.to_string()))
    }

    pub fn lookup_role(&self, name: &str) -> Result<&Role> {
        self.role_index
            .get(name)
            .map(|id| self.role(*id))
            .ok_or_else(|| PolicyError::InvalidRole(name.to_string()))
    }

    pub fn lookup_user(&self, name: &str) -> Result<&User> {
        self.user_index
            .get(name)
            .map(|id| self.user(*id))
            .ok_or_else(|| PolicyError::InvalidUser(name.to_string()))
    }

    pub fn lookup_class(&self, name: &str) -> Result<&ObjClass> {
        self.class_index
            .get(name)
            .map(|id| self.class(*id))
            .ok_or_else(|| PolicyError::InvalidClass(name.to_string()))
    }

    pub fn lookup_common(&self, name: &str) -> Result<&Common> {
        self.common_index
            .get(name)
            .map(|id| self.common(*id))
            .ok_or_else(|| PolicyError::InvalidCommon(name.to_string()))
    }

    pub fn lookup_boolean(&self, name: &str) -> Result<&Boolean> {
        self.bool_index
            .get(name)
            .map(|id| self.boolean(*id))
            .ok_or_else(|| PolicyError::InvalidBoolean(name.to_string()))
    }

    /// Resolve a category name or alias.
    pub fn lookup_category(&self, name: &str) -> Result<&Category> {
        self.category_index
            .get(name)
            .map(|id| self.category(*id))
            .ok_or_else(|| PolicyError::InvalidCategory(name.to_string()))
    }

    /// Resolve a sensitivity name or alias.
    pub fn lookup_sensitivity(&self, name: &str) -> Result<&Sensitivity> {
        self.sensitivity_index
            .get(name)
            .map(|id| self.sensitivity(*id))
            .ok_or_else(|| PolicyError::InvalidSensitivity(name.to_string()))
    }

    /// Parse `s0:c0,c2.c5` into a level.
    pub fn lookup_level(&self, text: &str) -> Result<Level> {
        mls::parse_level(self, text)
    }

    /// Parse `s0 - s1:c0.c3` into a range.
    pub fn lookup_range(&self, text: &str) -> Result<Range> {
        mls::parse_range(self, text)
    }

    pub fn lookup_initialsid(&self, name: &str) -> Result<&InitialSid> {
        self.initialsids
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| PolicyError::InvalidInitialSid(name.to_string()))
    }

    pub fn lookup_polcap(&self, name: &str) -> Result<&str> {
        self.polcaps
            .iter()
            .find(|p| p.as_str() == name)
            .map(String::as_str)
            .ok_or_else(|| PolicyError::InvalidPolicyCapability(name.to_string()))
    }

    /// Parse `user:role:type[:range]`.
    pub fn lookup_context(&self, text: &str) -> Result<Context> {
        context::parse_context(self, text)
    }
}
