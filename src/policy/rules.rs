//! Policy rules: type enforcement, MLS, RBAC, extended permission,
//! `default_*` and bounds statements.
//!
//! Rule payload accessors return [`PolicyError::InvalidRuleUse`] when the
//! rule kind does not carry the requested attribute, and
//! [`PolicyError::RuleNotConditional`] when asking an unconditional rule for
//! its expression. Queries treat both as "does not match".

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::mls::Range;
use super::symbols::{fmt_name_set, ClassId, RoleId, TypeId, TypeOrAttr};
use super::{Policy, PolicyDisplay};
use crate::error::{PolicyError, Result};

// =============================================================================
// CONDITIONALS
// =============================================================================

/// Index of a conditional expression in the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CondId(pub(crate) u32);

/// Whether a rule sits inside a conditional block, and which branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conditional {
    Unconditional,
    /// `branch` is true for the if-branch, false for the else-branch.
    Conditional { expr: CondId, branch: bool },
}

fn fmt_conditional(cond: &Conditional, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Conditional::Conditional { expr, branch } = cond {
        let branch = if *branch { "True" } else { "False" };
        write!(
            f,
            " [ {} ]:{}",
            policy.conditional_expr(*expr).display(policy),
            branch
        )?;
    }
    Ok(())
}

// =============================================================================
// TYPE ENFORCEMENT RULES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeRuletype {
    Allow,
    Auditallow,
    Dontaudit,
    Neverallow,
    TypeTransition,
    TypeMember,
    TypeChange,
}

impl TeRuletype {
    /// Access vector rules carry a permission set; the rest carry a default type.
    pub fn is_av(self) -> bool {
        matches!(
            self,
            Self::Allow | Self::Auditallow | Self::Dontaudit | Self::Neverallow
        )
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(match text {
            "allow" => Self::Allow,
            "auditallow" => Self::Auditallow,
            "dontaudit" => Self::Dontaudit,
            "neverallow" => Self::Neverallow,
            "type_transition" => Self::TypeTransition,
            "type_member" => Self::TypeMember,
            "type_change" => Self::TypeChange,
            _ => {
                return Err(PolicyError::InvalidValue(format!(
                    "{} is not a valid TE rule type",
                    text
                )))
            }
        })
    }
}

impl fmt::Display for TeRuletype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::Auditallow => "auditallow",
            Self::Dontaudit => "dontaudit",
            Self::Neverallow => "neverallow",
            Self::TypeTransition => "type_transition",
            Self::TypeMember => "type_member",
            Self::TypeChange => "type_change",
        })
    }
}

/// Kind-specific part of a TE rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TePayload {
    Perms(BTreeSet<String>),
    Default {
        default: TypeId,
        filename: Option<String>,
    },
}

/// A type enforcement rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TeRule {
    pub ruletype: TeRuletype,
    pub source: TypeOrAttr,
    pub target: TypeOrAttr,
    pub tclass: ClassId,
    pub payload: TePayload,
    pub conditional: Conditional,
}

impl TeRule {
    pub fn perms(&self) -> Result<&BTreeSet<String>> {
        match &self.payload {
            TePayload::Perms(perms) => Ok(perms),
            TePayload::Default { .. } => Err(self.invalid_use("a permission set")),
        }
    }

    pub fn default(&self) -> Result<TypeId> {
        match &self.payload {
            TePayload::Default { default, .. } => Ok(*default),
            TePayload::Perms(_) => Err(self.invalid_use("a default type")),
        }
    }

    /// File name of a name-based type_transition, `Ok(None)` when absent.
    pub fn filename(&self) -> Result<Option<&str>> {
        match &self.payload {
            TePayload::Default { filename, .. } if self.ruletype == TeRuletype::TypeTransition => {
                Ok(filename.as_deref())
            }
            _ => Err(self.invalid_use("file names")),
        }
    }

    pub fn conditional(&self) -> Result<CondId> {
        match self.conditional {
            Conditional::Conditional { expr, .. } => Ok(expr),
            Conditional::Unconditional => Err(PolicyError::RuleNotConditional),
        }
    }

    pub fn conditional_block(&self) -> Result<bool> {
        match self.conditional {
            Conditional::Conditional { branch, .. } => Ok(branch),
            Conditional::Unconditional => Err(PolicyError::RuleNotConditional),
        }
    }

    fn invalid_use(&self, attribute: &'static str) -> PolicyError {
        PolicyError::InvalidRuleUse {
            ruletype: self.ruletype.to_string(),
            attribute,
        }
    }
}

impl PolicyDisplay for TeRule {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{} ",
            self.ruletype,
            self.source.name(policy),
            self.target.name(policy),
            policy.class(self.tclass).name
        )?;
        match &self.payload {
            TePayload::Perms(perms) => {
                fmt_name_set(f, perms.iter().map(String::as_str))?;
                f.write_str(";")?;
            }
            TePayload::Default { default, filename } => {
                f.write_str(&policy.type_(*default).name)?;
                match filename {
                    Some(name) => write!(f, " \"{}\";", name)?,
                    None => f.write_str(";")?,
                }
            }
        }
        fmt_conditional(&self.conditional, policy, f)
    }
}

// =============================================================================
// EXTENDED PERMISSION RULES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XpermRuletype {
    Allowxperm,
    Auditallowxperm,
    Dontauditxperm,
    Neverallowxperm,
}

impl fmt::Display for XpermRuletype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allowxperm => "allowxperm",
            Self::Auditallowxperm => "auditallowxperm",
            Self::Dontauditxperm => "dontauditxperm",
            Self::Neverallowxperm => "neverallowxperm",
        })
    }
}

/// An extended permission (ioctl) rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XpermRule {
    pub ruletype: XpermRuletype,
    pub source: TypeOrAttr,
    pub target: TypeOrAttr,
    pub tclass: ClassId,
    /// Extended permission kind, e.g. `ioctl`.
    pub xperm_type: String,
    pub perms: BTreeSet<u16>,
}

impl PolicyDisplay for XpermRule {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{} {} ",
            self.ruletype,
            self.source.name(policy),
            self.target.name(policy),
            policy.class(self.tclass).name,
            self.xperm_type
        )?;

        let values: Vec<u16> = self.perms.iter().copied().collect();
        let mut groups = Vec::new();
        let mut i = 0;
        while i < values.len() {
            let mut j = i;
            while j + 1 < values.len() && values[j + 1] == values[j] + 1 {
                j += 1;
            }
            if j > i {
                groups.push(format!("{:#06x}-{:#06x}", values[i], values[j]));
            } else {
                groups.push(format!("{:#06x}", values[i]));
            }
            i = j + 1;
        }
        fmt_name_set(f, groups.iter().map(String::as_str))?;
        f.write_str(";")
    }
}

// =============================================================================
// MLS RULES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MlsRuletype {
    RangeTransition,
}

impl fmt::Display for MlsRuletype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("range_transition")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MlsRule {
    pub ruletype: MlsRuletype,
    pub source: TypeOrAttr,
    pub target: TypeOrAttr,
    pub tclass: ClassId,
    pub default: Range,
}

impl PolicyDisplay for MlsRule {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{} {};",
            self.ruletype,
            self.source.name(policy),
            self.target.name(policy),
            policy.class(self.tclass).name,
            self.default.display(policy)
        )
    }
}

// =============================================================================
// RBAC RULES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RbacRuletype {
    Allow,
    RoleTransition,
}

impl fmt::Display for RbacRuletype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::RoleTransition => "role_transition",
        })
    }
}

/// Target of an RBAC rule: a role for role allows, a type for transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RbacTarget {
    Role(RoleId),
    Type(TypeOrAttr),
}

impl RbacTarget {
    pub fn name<'p>(&self, policy: &'p Policy) -> &'p str {
        match self {
            RbacTarget::Role(r) => &policy.role(*r).name,
            RbacTarget::Type(t) => t.name(policy),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RbacRule {
    pub ruletype: RbacRuletype,
    pub source: RoleId,
    pub target: RbacTarget,
    pub(crate) tclass: Option<ClassId>,
    pub(crate) default: Option<RoleId>,
}

impl RbacRule {
    pub fn tclass(&self) -> Result<ClassId> {
        self.tclass.ok_or_else(|| PolicyError::InvalidRuleUse {
            ruletype: self.ruletype.to_string(),
            attribute: "an object class",
        })
    }

    pub fn default(&self) -> Result<RoleId> {
        self.default.ok_or_else(|| PolicyError::InvalidRuleUse {
            ruletype: self.ruletype.to_string(),
            attribute: "a default role",
        })
    }
}

impl PolicyDisplay for RbacRule {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.ruletype,
            policy.role(self.source).name,
            self.target.name(policy)
        )?;
        if let (Some(tclass), Some(default)) = (self.tclass, self.default) {
            write!(
                f,
                ":{} {}",
                policy.class(tclass).name,
                policy.role(default).name
            )?;
        }
        f.write_str(";")
    }
}

// =============================================================================
// DEFAULT_* STATEMENTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultRuletype {
    DefaultUser,
    DefaultRole,
    DefaultType,
    DefaultRange,
}

impl fmt::Display for DefaultRuletype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DefaultUser => "default_user",
            Self::DefaultRole => "default_role",
            Self::DefaultType => "default_type",
            Self::DefaultRange => "default_range",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultValue {
    Source,
    Target,
    Glblub,
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::Target => "target",
            Self::Glblub => "glblub",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultRangeValue {
    Low,
    High,
    LowHigh,
}

impl fmt::Display for DefaultRangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::High => "high",
            Self::LowHigh => "low_high",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefaultRule {
    pub ruletype: DefaultRuletype,
    pub tclass: ClassId,
    pub default: DefaultValue,
    /// Only for `default_range` with source/target defaults.
    pub default_range: Option<DefaultRangeValue>,
}

impl PolicyDisplay for DefaultRule {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.ruletype,
            policy.class(self.tclass).name,
            self.default
        )?;
        if let Some(range) = self.default_range {
            write!(f, " {}", range)?;
        }
        f.write_str(";")
    }
}

// =============================================================================
// BOUNDS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundsRuletype {
    Typebounds,
}

impl fmt::Display for BoundsRuletype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("typebounds")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub ruletype: BoundsRuletype,
    pub parent: TypeId,
    pub child: TypeId,
}

impl PolicyDisplay for Bounds {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {};",
            self.ruletype,
            policy.type_(self.parent).name,
            policy.type_(self.child).name
        )
    }
}
