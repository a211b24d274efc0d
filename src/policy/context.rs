//! Security contexts used by labeling statements.

use std::fmt;

use super::mls::{parse_range, Range};
use super::symbols::{RoleId, TypeId, UserId};
use super::{Policy, PolicyDisplay};
use crate::error::{PolicyError, Result};

/// `user:role:type[:range]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Context {
    pub user: UserId,
    pub role: RoleId,
    pub type_: TypeId,
    pub range: Option<Range>,
}

impl PolicyDisplay for Context {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            policy.user(self.user).name,
            policy.role(self.role).name,
            policy.type_(self.type_).name
        )?;
        if let Some(range) = &self.range {
            write!(f, ":{}", range.display(policy))?;
        }
        Ok(())
    }
}

/// Parse a context string. The range part is required iff the policy is MLS.
pub(crate) fn parse_context(policy: &Policy, text: &str) -> Result<Context> {
    let mut parts = text.splitn(4, ':');
    let (Some(user), Some(role), Some(type_)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(PolicyError::InvalidValue(format!(
            "{} is not a valid context",
            text
        )));
    };

    let user = policy.lookup_user(user)?.id;
    let role = policy.lookup_role(role)?.id;
    let type_ = policy.lookup_type(type_)?.id;

    let range = match parts.next() {
        Some(range) => Some(parse_range(policy, range)?),
        None if policy.mls() => {
            return Err(PolicyError::InvalidValue(format!(
                "{} is missing the MLS range",
                text
            )))
        }
        None => None,
    };

    Ok(Context {
        user,
        role,
        type_,
        range,
    })
}
