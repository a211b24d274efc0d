//! Name-based construction of a [`Policy`].
//!
//! Every adder resolves the names it is given against what has been declared
//! so far and fails with the matching `Invalid*` error on unknown references,
//! so declarations must precede their uses, as in the policy language.

use std::collections::BTreeSet;
use std::net::Ipv6Addr;

use tracing::debug;

use super::boolexpr::parse_conditional;
use super::constraint::{parse_constraint_expr, Constraint, ConstraintRuletype};
use super::context::{parse_context, Context};
use super::mls::{parse_level, parse_range};
use super::ocontext::{
    Devicetreecon, FileType, FsUse, FsUseRuletype, Genfscon, Ibendportcon, Ibpkeycon,
    InitialSid, Iomemcon, Ioportcon, IpNetwork, Netifcon, Nodecon, NumRange, Pcidevicecon,
    Pirqcon, Portcon, PortconProtocol,
};
use super::rules::{
    Bounds, BoundsRuletype, CondId, Conditional, DefaultRangeValue, DefaultRule,
    DefaultRuletype, DefaultValue, MlsRule, MlsRuletype, RbacRule, RbacRuletype, RbacTarget,
    TePayload, TeRule, TeRuletype, XpermRule, XpermRuletype,
};
use super::symbols::{
    AttrId, BoolId, Boolean, Category, CategoryId, ClassId, Common, CommonId, ObjClass, Role,
    RoleId, Sensitivity, SensitivityId, Type, TypeAttribute, TypeId, TypeOrAttr, User, UserId,
};
use super::Policy;
use crate::error::{PolicyError, Result};

/// Incrementally declares symbols, rules and labeling statements.
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    policy: Policy,
    condition: Option<(CondId, bool)>,
}

fn duplicate(kind: &str, name: &str) -> PolicyError {
    PolicyError::InvalidValue(format!("duplicate {} declaration: {}", kind, name))
}

impl PolicyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            policy: Policy {
                name: name.into(),
                version: 33,
                ..Policy::default()
            },
            condition: None,
        }
    }

    pub fn mls(&mut self, enabled: bool) -> &mut Self {
        self.policy.mls = enabled;
        self
    }

    pub fn version(&mut self, version: u32) -> &mut Self {
        self.policy.version = version;
        self
    }

    /// Finish construction.
    pub fn build(self) -> Policy {
        let p = &self.policy;
        debug!(
            policy = %p.name,
            types = p.types.len(),
            attributes = p.attributes.len(),
            classes = p.classes.len(),
            terules = p.terules.len(),
            "policy built"
        );
        self.policy
    }

    // =========================================================================
    // Classes
    // =========================================================================

    pub fn common(&mut self, name: &str, perms: &[&str]) -> Result<&mut Self> {
        if self.policy.common_index.contains_key(name) {
            return Err(duplicate("common", name));
        }
        let id = CommonId::from_index(self.policy.commons.len());
        self.policy.commons.push(Common {
            id,
            name: name.to_string(),
            perms: perms.iter().map(|p| p.to_string()).collect(),
        });
        self.policy.common_index.insert(name.to_string(), id);
        Ok(self)
    }

    pub fn class(&mut self, name: &str, perms: &[&str], common: Option<&str>) -> Result<&mut Self> {
        if self.policy.class_index.contains_key(name) {
            return Err(duplicate("class", name));
        }
        let common = match common {
            Some(c) => Some(self.policy.lookup_common(c)?.id),
            None => None,
        };
        let id = ClassId::from_index(self.policy.classes.len());
        self.policy.classes.push(ObjClass {
            id,
            name: name.to_string(),
            perms: perms.iter().map(|p| p.to_string()).collect(),
            common,
        });
        self.policy.class_index.insert(name.to_string(), id);
        Ok(self)
    }

    // =========================================================================
    // Types and attributes
    // =========================================================================

    pub fn attribute(&mut self, name: &str) -> Result<&mut Self> {
        if self.policy.type_index.contains_key(name) {
            return Err(duplicate("attribute", name));
        }
        let id = AttrId::from_index(self.policy.attributes.len());
        self.policy.attributes.push(TypeAttribute {
            id,
            name: name.to_string(),
            types: Vec::new(),
        });
        self.policy
            .type_index
            .insert(name.to_string(), TypeOrAttr::Attr(id));
        Ok(self)
    }

    /// Declare a type and associate it with existing attributes.
    pub fn type_(&mut self, name: &str, attrs: &[&str]) -> Result<&mut Self> {
        if self.policy.type_index.contains_key(name) {
            return Err(duplicate("type", name));
        }
        let id = TypeId::from_index(self.policy.types.len());
        self.policy.types.push(Type {
            id,
            name: name.to_string(),
            aliases: Vec::new(),
            attrs: BTreeSet::new(),
            permissive: false,
        });
        self.policy
            .type_index
            .insert(name.to_string(), TypeOrAttr::Type(id));

        for attr in attrs {
            self.type_attribute(name, attr)?;
        }
        Ok(self)
    }

    pub fn type_attribute(&mut self, type_: &str, attr: &str) -> Result<&mut Self> {
        let tid = self.policy.lookup_type(type_)?.id;
        let aid = self.policy.lookup_typeattr(attr)?.id;

        self.policy.types[tid.index()].attrs.insert(aid);
        let members = &mut self.policy.attributes[aid.index()].types;
        if let Err(pos) = members.binary_search(&tid) {
            members.insert(pos, tid);
        }
        Ok(self)
    }

    pub fn type_alias(&mut self, type_: &str, alias: &str) -> Result<&mut Self> {
        let tid = self.policy.lookup_type(type_)?.id;
        if self.policy.type_index.contains_key(alias) {
            return Err(duplicate("alias", alias));
        }
        self.policy.types[tid.index()].aliases.push(alias.to_string());
        self.policy
            .type_index
            .insert(alias.to_string(), TypeOrAttr::Type(tid));
        Ok(self)
    }

    pub fn permissive(&mut self, type_: &str) -> Result<&mut Self> {
        let tid = self.policy.lookup_type(type_)?.id;
        self.policy.types[tid.index()].permissive = true;
        Ok(self)
    }

    // =========================================================================
    // Roles, users, booleans
    // =========================================================================

    /// Declare a role, or add types to an existing one. Attributes expand.
    pub fn role(&mut self, name: &str, types: &[&str]) -> Result<&mut Self> {
        let mut members = BTreeSet::new();
        for t in types {
            let toa = self.policy.lookup_type_or_attr(t)?;
            members.extend(toa.expand(&self.policy).iter().copied());
        }

        match self.policy.role_index.get(name) {
            Some(id) => {
                self.policy.roles[id.index()].types.extend(members);
            }
            None => {
                let id = RoleId::from_index(self.policy.roles.len());
                self.policy.roles.push(Role {
                    id,
                    name: name.to_string(),
                    types: members,
                });
                self.policy.role_index.insert(name.to_string(), id);
            }
        }
        Ok(self)
    }

    pub fn user(
        &mut self,
        name: &str,
        roles: &[&str],
        level: Option<&str>,
        range: Option<&str>,
    ) -> Result<&mut Self> {
        if self.policy.user_index.contains_key(name) {
            return Err(duplicate("user", name));
        }
        let roles = roles
            .iter()
            .map(|r| self.policy.lookup_role(r).map(|r| r.id))
            .collect::<Result<BTreeSet<_>>>()?;
        let level = level.map(|l| parse_level(&self.policy, l)).transpose()?;
        let range = range.map(|r| parse_range(&self.policy, r)).transpose()?;

        let id = UserId::from_index(self.policy.users.len());
        self.policy.users.push(User {
            id,
            name: name.to_string(),
            roles,
            level,
            range,
        });
        self.policy.user_index.insert(name.to_string(), id);
        Ok(self)
    }

    pub fn boolean(&mut self, name: &str, state: bool) -> Result<&mut Self> {
        if self.policy.bool_index.contains_key(name) {
            return Err(duplicate("bool", name));
        }
        let id = BoolId::from_index(self.policy.bools.len());
        self.policy.bools.push(Boolean {
            id,
            name: name.to_string(),
            state,
        });
        self.policy.bool_index.insert(name.to_string(), id);
        Ok(self)
    }

    pub fn polcap(&mut self, name: &str) -> Result<&mut Self> {
        if self.policy.polcaps.iter().any(|p| p == name) {
            return Err(duplicate("policycap", name));
        }
        self.policy.polcaps.push(name.to_string());
        Ok(self)
    }

    // =========================================================================
    // MLS symbols
    // =========================================================================

    /// Declare a sensitivity. Declaration order is the dominance order.
    pub fn sensitivity(&mut self, name: &str, aliases: &[&str]) -> Result<&mut Self> {
        if self.policy.sensitivity_index.contains_key(name) {
            return Err(duplicate("sensitivity", name));
        }
        let id = SensitivityId::from_index(self.policy.sensitivities.len());
        self.policy.sensitivities.push(Sensitivity {
            id,
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            categories: BTreeSet::new(),
        });
        self.policy.sensitivity_index.insert(name.to_string(), id);
        for alias in aliases {
            self.policy.sensitivity_index.insert(alias.to_string(), id);
        }
        Ok(self)
    }

    /// Declare a category. Declaration order is the category value order.
    pub fn category(&mut self, name: &str, aliases: &[&str]) -> Result<&mut Self> {
        if self.policy.category_index.contains_key(name) {
            return Err(duplicate("category", name));
        }
        let id = CategoryId::from_index(self.policy.categories.len());
        self.policy.categories.push(Category {
            id,
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        });
        self.policy.category_index.insert(name.to_string(), id);
        for alias in aliases {
            self.policy.category_index.insert(alias.to_string(), id);
        }
        Ok(self)
    }

    /// `level s0:c0.c1023;` associates categories with a sensitivity.
    pub fn level_decl(&mut self, text: &str) -> Result<&mut Self> {
        let level = parse_level(&self.policy, text)?;
        self.policy.sensitivities[level.sensitivity.index()]
            .categories
            .extend(level.categories);
        Ok(self)
    }

    // =========================================================================
    // Conditional blocks
    // =========================================================================

    /// Subsequent TE rules go into `if (expr)` (branch true) or its else-branch.
    pub fn begin_conditional(&mut self, expr: &str, branch: bool) -> Result<&mut Self> {
        let parsed = parse_conditional(&self.policy, expr)?;
        let existing = self.policy.cond_exprs.iter().position(|e| *e == parsed);
        let id = match existing {
            Some(index) => CondId(index as u32),
            None => {
                self.policy.cond_exprs.push(parsed);
                CondId((self.policy.cond_exprs.len() - 1) as u32)
            }
        };
        self.condition = Some((id, branch));
        Ok(self)
    }

    pub fn end_conditional(&mut self) -> &mut Self {
        self.condition = None;
        self
    }

    fn current_conditional(&self) -> Conditional {
        match self.condition {
            Some((expr, branch)) => Conditional::Conditional { expr, branch },
            None => Conditional::Unconditional,
        }
    }

    // =========================================================================
    // Type enforcement rules
    // =========================================================================

    fn validate_perms(&self, class: ClassId, perms: &[&str]) -> Result<BTreeSet<String>> {
        if perms.is_empty() {
            return Err(PolicyError::InvalidValue(
                "rule permission set is empty".to_string(),
            ));
        }
        let obj_class = self.policy.class(class);
        let invalid: Vec<&str> = perms
            .iter()
            .copied()
            .filter(|p| !obj_class.has_perm(&self.policy, p))
            .collect();
        if !invalid.is_empty() {
            return Err(PolicyError::InvalidPermission {
                perms: invalid.join(", "),
                classes: obj_class.name.clone(),
            });
        }
        Ok(perms.iter().map(|p| p.to_string()).collect())
    }

    /// allow/auditallow/dontaudit/neverallow.
    pub fn te_rule(
        &mut self,
        ruletype: TeRuletype,
        source: &str,
        target: &str,
        tclass: &str,
        perms: &[&str],
    ) -> Result<&mut Self> {
        if !ruletype.is_av() {
            return Err(PolicyError::InvalidRuleUse {
                ruletype: ruletype.to_string(),
                attribute: "a permission set",
            });
        }
        let source = self.policy.lookup_type_or_attr(source)?;
        let target = self.policy.lookup_type_or_attr(target)?;
        let tclass = self.policy.lookup_class(tclass)?.id;
        let perms = self.validate_perms(tclass, perms)?;

        self.policy.terules.push(TeRule {
            ruletype,
            source,
            target,
            tclass,
            payload: TePayload::Perms(perms),
            conditional: self.current_conditional(),
        });
        Ok(self)
    }

    pub fn allow(&mut self, source: &str, target: &str, tclass: &str, perms: &[&str]) -> Result<&mut Self> {
        self.te_rule(TeRuletype::Allow, source, target, tclass, perms)
    }

    /// type_transition/type_member/type_change.
    pub fn type_rule(
        &mut self,
        ruletype: TeRuletype,
        source: &str,
        target: &str,
        tclass: &str,
        default: &str,
        filename: Option<&str>,
    ) -> Result<&mut Self> {
        if ruletype.is_av() || (filename.is_some() && ruletype != TeRuletype::TypeTransition) {
            return Err(PolicyError::InvalidRuleUse {
                ruletype: ruletype.to_string(),
                attribute: "a default type",
            });
        }
        let source = self.policy.lookup_type_or_attr(source)?;
        let target = self.policy.lookup_type_or_attr(target)?;
        let tclass = self.policy.lookup_class(tclass)?.id;
        let default = self.policy.lookup_type(default)?.id;

        self.policy.terules.push(TeRule {
            ruletype,
            source,
            target,
            tclass,
            payload: TePayload::Default {
                default,
                filename: filename.map(str::to_string),
            },
            conditional: self.current_conditional(),
        });
        Ok(self)
    }

    pub fn type_transition(
        &mut self,
        source: &str,
        target: &str,
        tclass: &str,
        default: &str,
        filename: Option<&str>,
    ) -> Result<&mut Self> {
        self.type_rule(TeRuletype::TypeTransition, source, target, tclass, default, filename)
    }

    pub fn xperm_rule(
        &mut self,
        ruletype: XpermRuletype,
        source: &str,
        target: &str,
        tclass: &str,
        xperm_type: &str,
        perms: &[u16],
    ) -> Result<&mut Self> {
        let source = self.policy.lookup_type_or_attr(source)?;
        let target = self.policy.lookup_type_or_attr(target)?;
        let tclass = self.policy.lookup_class(tclass)?.id;
        if perms.is_empty() {
            return Err(PolicyError::InvalidValue(
                "extended permission set is empty".to_string(),
            ));
        }
        self.policy.xpermrules.push(XpermRule {
            ruletype,
            source,
            target,
            tclass,
            xperm_type: xperm_type.to_string(),
            perms: perms.iter().copied().collect(),
        });
        Ok(self)
    }

    // =========================================================================
    // MLS and RBAC rules
    // =========================================================================

    pub fn range_transition(
        &mut self,
        source: &str,
        target: &str,
        tclass: &str,
        range: &str,
    ) -> Result<&mut Self> {
        let source = self.policy.lookup_type_or_attr(source)?;
        let target = self.policy.lookup_type_or_attr(target)?;
        let tclass = self.policy.lookup_class(tclass)?.id;
        let default = parse_range(&self.policy, range)?;
        self.policy.mlsrules.push(MlsRule {
            ruletype: MlsRuletype::RangeTransition,
            source,
            target,
            tclass,
            default,
        });
        Ok(self)
    }

    pub fn role_allow(&mut self, source: &str, target: &str) -> Result<&mut Self> {
        let source = self.policy.lookup_role(source)?.id;
        let target = self.policy.lookup_role(target)?.id;
        self.policy.rbacrules.push(RbacRule {
            ruletype: RbacRuletype::Allow,
            source,
            target: RbacTarget::Role(target),
            tclass: None,
            default: None,
        });
        Ok(self)
    }

    pub fn role_transition(
        &mut self,
        source: &str,
        target: &str,
        tclass: &str,
        default: &str,
    ) -> Result<&mut Self> {
        let source = self.policy.lookup_role(source)?.id;
        let target = self.policy.lookup_type_or_attr(target)?;
        let tclass = self.policy.lookup_class(tclass)?.id;
        let default = self.policy.lookup_role(default)?.id;
        self.policy.rbacrules.push(RbacRule {
            ruletype: RbacRuletype::RoleTransition,
            source,
            target: RbacTarget::Type(target),
            tclass: Some(tclass),
            default: Some(default),
        });
        Ok(self)
    }

    // =========================================================================
    // Constraints, defaults, bounds
    // =========================================================================

    /// constrain/mlsconstrain with an infix expression.
    pub fn constrain(
        &mut self,
        ruletype: ConstraintRuletype,
        tclass: &str,
        perms: &[&str],
        expr: &str,
    ) -> Result<&mut Self> {
        if ruletype.is_validatetrans() {
            return Err(PolicyError::InvalidRuleUse {
                ruletype: ruletype.to_string(),
                attribute: "permissions",
            });
        }
        let class = self.policy.lookup_class(tclass)?.id;
        let perms = self.validate_perms(class, perms)?;
        let expression = parse_constraint_expr(&self.policy, expr)?;
        self.policy.constraints.push(Constraint {
            ruletype,
            tclass: class,
            perms: Some(perms),
            expression,
        });
        Ok(self)
    }

    /// validatetrans/mlsvalidatetrans with an infix expression.
    pub fn validatetrans(
        &mut self,
        ruletype: ConstraintRuletype,
        tclass: &str,
        expr: &str,
    ) -> Result<&mut Self> {
        if !ruletype.is_validatetrans() {
            return Err(PolicyError::InvalidValue(format!(
                "{} is not a validatetrans rule type",
                ruletype
            )));
        }
        let class = self.policy.lookup_class(tclass)?.id;
        let expression = parse_constraint_expr(&self.policy, expr)?;
        self.policy.constraints.push(Constraint {
            ruletype,
            tclass: class,
            perms: None,
            expression,
        });
        Ok(self)
    }

    pub fn default_rule(
        &mut self,
        ruletype: DefaultRuletype,
        tclass: &str,
        default: DefaultValue,
        default_range: Option<DefaultRangeValue>,
    ) -> Result<&mut Self> {
        if default_range.is_some() != (ruletype == DefaultRuletype::DefaultRange && default != DefaultValue::Glblub) {
            return Err(PolicyError::InvalidValue(format!(
                "{} {} does not take a range default setting as given",
                ruletype, default
            )));
        }
        let tclass = self.policy.lookup_class(tclass)?.id;
        self.policy.defaults.push(DefaultRule {
            ruletype,
            tclass,
            default,
            default_range,
        });
        Ok(self)
    }

    pub fn typebounds(&mut self, parent: &str, child: &str) -> Result<&mut Self> {
        let parent = self.policy.lookup_type(parent)?.id;
        let child = self.policy.lookup_type(child)?.id;
        self.policy.bounds.push(Bounds {
            ruletype: BoundsRuletype::Typebounds,
            parent,
            child,
        });
        Ok(self)
    }

    // =========================================================================
    // Labeling statements
    // =========================================================================

    fn context(&self, text: &str) -> Result<Context> {
        parse_context(&self.policy, text)
    }

    pub fn initialsid(&mut self, name: &str, context: Option<&str>) -> Result<&mut Self> {
        if self.policy.initialsids.iter().any(|s| s.name == name) {
            return Err(duplicate("sid", name));
        }
        let context = context.map(|c| self.context(c)).transpose()?;
        self.policy.initialsids.push(InitialSid {
            name: name.to_string(),
            context,
        });
        Ok(self)
    }

    pub fn portcon(
        &mut self,
        protocol: PortconProtocol,
        low: u16,
        high: u16,
        context: &str,
    ) -> Result<&mut Self> {
        let ports = NumRange::new(low, high)?;
        let context = self.context(context)?;
        self.policy.portcons.push(Portcon {
            protocol,
            ports,
            context,
        });
        Ok(self)
    }

    pub fn netifcon(&mut self, netif: &str, context: &str, packet: &str) -> Result<&mut Self> {
        let context = self.context(context)?;
        let packet = self.context(packet)?;
        self.policy.netifcons.push(Netifcon {
            netif: netif.to_string(),
            context,
            packet,
        });
        Ok(self)
    }

    /// `network` in CIDR notation, e.g. `10.0.0.0/8`.
    pub fn nodecon(&mut self, network: &str, context: &str) -> Result<&mut Self> {
        let network: IpNetwork = network.parse()?;
        let context = self.context(context)?;
        self.policy.nodecons.push(Nodecon { network, context });
        Ok(self)
    }

    pub fn fs_use(&mut self, ruletype: FsUseRuletype, fs: &str, context: &str) -> Result<&mut Self> {
        let context = self.context(context)?;
        self.policy.fs_uses.push(FsUse {
            ruletype,
            fs: fs.to_string(),
            context,
        });
        Ok(self)
    }

    pub fn genfscon(
        &mut self,
        fs: &str,
        path: &str,
        filetype: Option<FileType>,
        context: &str,
    ) -> Result<&mut Self> {
        let context = self.context(context)?;
        self.policy.genfscons.push(Genfscon {
            fs: fs.to_string(),
            path: path.to_string(),
            filetype,
            context,
        });
        Ok(self)
    }

    pub fn ibpkeycon(
        &mut self,
        subnet_prefix: &str,
        low: u16,
        high: u16,
        context: &str,
    ) -> Result<&mut Self> {
        let subnet_prefix: Ipv6Addr = subnet_prefix.parse().map_err(|_| {
            PolicyError::InvalidValue(format!("{} is not a valid subnet prefix", subnet_prefix))
        })?;
        let pkeys = NumRange::new(low, high)?;
        let context = self.context(context)?;
        self.policy.ibpkeycons.push(Ibpkeycon {
            subnet_prefix,
            pkeys,
            context,
        });
        Ok(self)
    }

    pub fn ibendportcon(&mut self, name: &str, port: u8, context: &str) -> Result<&mut Self> {
        if port == 0 {
            return Err(PolicyError::InvalidValue(
                "endport must be 1-255".to_string(),
            ));
        }
        let context = self.context(context)?;
        self.policy.ibendportcons.push(Ibendportcon {
            name: name.to_string(),
            port,
            context,
        });
        Ok(self)
    }

    pub fn pcidevicecon(&mut self, device: u32, context: &str) -> Result<&mut Self> {
        let context = self.context(context)?;
        self.policy
            .pcidevicecons
            .push(Pcidevicecon { device, context });
        Ok(self)
    }

    pub fn pirqcon(&mut self, irq: u32, context: &str) -> Result<&mut Self> {
        let context = self.context(context)?;
        self.policy.pirqcons.push(Pirqcon { irq, context });
        Ok(self)
    }

    pub fn ioportcon(&mut self, low: u32, high: u32, context: &str) -> Result<&mut Self> {
        let ports = NumRange::new(low, high)?;
        let context = self.context(context)?;
        self.policy.ioportcons.push(Ioportcon { ports, context });
        Ok(self)
    }

    pub fn iomemcon(&mut self, low: u64, high: u64, context: &str) -> Result<&mut Self> {
        let addr = NumRange::new(low, high)?;
        let context = self.context(context)?;
        self.policy.iomemcons.push(Iomemcon { addr, context });
        Ok(self)
    }

    pub fn devicetreecon(&mut self, path: &str, context: &str) -> Result<&mut Self> {
        let context = self.context(context)?;
        self.policy.devicetreecons.push(Devicetreecon {
            path: path.to_string(),
            context,
        });
        Ok(self)
    }
}
