//! Parsing of string-valued check options.
//!
//! Every option arrives as a string. Single-value options hold one symbol
//! name; set options hold whitespace-separated names. Strict sets reject
//! unknown names, lenient sets log and drop them.

use std::collections::BTreeSet;

use tracing::info;

use crate::error::{PolicyError, Result};
use crate::policy::{ClassId, Policy, RoleId, TypeId, TypeOrAttr};
use crate::query::matching::validate_perms_any;

use super::{CheckBase, CheckConfig};

pub(crate) fn invalid_value(check: &str, option: &str, message: impl ToString) -> PolicyError {
    PolicyError::InvalidCheckValue {
        check: check.to_string(),
        option: option.to_string(),
        message: message.to_string(),
    }
}

/// Trimmed option value; empty strings count as unset.
pub(crate) fn get<'c>(config: &'c CheckConfig, option: &str) -> Option<&'c str> {
    config
        .get(option)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// `true`, `yes`, `1` (any case) are true; anything else is false.
pub(crate) fn bool_value(value: Option<&str>) -> bool {
    matches!(
        value.map(str::to_ascii_lowercase).as_deref(),
        Some("true" | "yes" | "1")
    )
}

/// Single type or attribute.
pub(crate) fn type_or_attr(
    policy: &Policy,
    base: &CheckBase,
    config: &CheckConfig,
    option: &str,
) -> Result<Option<TypeOrAttr>> {
    get(config, option)
        .map(|name| {
            policy
                .lookup_type_or_attr(name)
                .map_err(|e| invalid_value(&base.name, option, e))
        })
        .transpose()
}

/// Single role.
pub(crate) fn role(
    policy: &Policy,
    base: &CheckBase,
    config: &CheckConfig,
    option: &str,
) -> Result<Option<RoleId>> {
    get(config, option)
        .map(|name| {
            policy
                .lookup_role(name)
                .map(|r| r.id)
                .map_err(|e| invalid_value(&base.name, option, e))
        })
        .transpose()
}

/// Resolve each whitespace-separated name with `lookup`, which returns the
/// expanded members.
fn name_set<T, F>(
    base: &CheckBase,
    config: &CheckConfig,
    option: &str,
    strict: bool,
    mut lookup: F,
) -> Result<BTreeSet<T>>
where
    T: Ord,
    F: FnMut(&str) -> Result<Vec<T>>,
{
    let mut set = BTreeSet::new();
    let Some(value) = get(config, option) else {
        return Ok(set);
    };
    for item in value.split_whitespace() {
        match lookup(item) {
            Ok(members) => set.extend(members),
            Err(e) if strict => {
                return Err(invalid_value(
                    &base.name,
                    option,
                    format!("Invalid {} item: {}", option, e),
                ))
            }
            Err(e) => info!("{}: Invalid {} item: {}", base.name, option, e),
        }
    }
    Ok(set)
}

/// Types and attributes, expanded to member types.
pub(crate) fn type_set(
    policy: &Policy,
    base: &CheckBase,
    config: &CheckConfig,
    option: &str,
    strict: bool,
) -> Result<BTreeSet<TypeId>> {
    name_set(base, config, option, strict, |name| {
        Ok(policy.lookup_type_or_attr(name)?.expand(policy).to_vec())
    })
}

/// Roles, expanded.
pub(crate) fn role_set(
    policy: &Policy,
    base: &CheckBase,
    config: &CheckConfig,
    option: &str,
    strict: bool,
) -> Result<BTreeSet<RoleId>> {
    name_set(base, config, option, strict, |name| {
        Ok(policy.lookup_role(name)?.expand().to_vec())
    })
}

/// Object classes; always strict.
pub(crate) fn class_set(
    policy: &Policy,
    base: &CheckBase,
    config: &CheckConfig,
    option: &str,
) -> Result<BTreeSet<ClassId>> {
    name_set(base, config, option, true, |name| {
        Ok(vec![policy.lookup_class(name)?.id])
    })
}

/// Permissions, validated against `classes` (or any class when empty).
pub(crate) fn perm_set(
    policy: &Policy,
    base: &CheckBase,
    config: &CheckConfig,
    option: &str,
    classes: &[ClassId],
) -> Result<BTreeSet<String>> {
    let perms: BTreeSet<String> = get(config, option)
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    if !perms.is_empty() {
        validate_perms_any(policy, perms.iter().map(String::as_str), classes)
            .map_err(|e| invalid_value(&base.name, option, e))?;
    }
    Ok(perms)
}
