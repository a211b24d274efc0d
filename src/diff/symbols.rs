//! Symbol differences: properties, types, attributes, roles, users,
//! booleans, commons and classes.

use serde::Serialize;
use tracing::{debug, info};

use super::{Differences, SetDiff};
use crate::policy::{Policy, PolicyDisplay};

/// Old and new value of a changed scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueChange {
    pub added: String,
    pub removed: String,
}

impl ValueChange {
    pub(super) fn compare(left: String, right: String) -> Option<Self> {
        (left != right).then_some(Self {
            added: right,
            removed: left,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedProperty {
    pub property: &'static str,
    pub change: ValueChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedType {
    pub name: String,
    pub attributes: SetDiff,
    pub aliases: SetDiff,
    /// Right policy's permissive flag, when it differs from the left.
    pub permissive: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedAttribute {
    pub name: String,
    pub types: SetDiff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedRole {
    pub name: String,
    pub types: SetDiff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedUser {
    pub name: String,
    pub roles: SetDiff,
    pub level: Option<ValueChange>,
    pub range: Option<ValueChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedBoolean {
    pub name: String,
    pub added_state: bool,
    pub removed_state: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedCommon {
    pub name: String,
    pub perms: SetDiff,
}

/// Class permission change, inherited common permissions included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedClass {
    pub name: String,
    pub perms: SetDiff,
}

const MLS_DISABLED: &str = "None (MLS Disabled)";

pub(super) fn diff_properties(left: &Policy, right: &Policy) -> Vec<ModifiedProperty> {
    let mut modified = Vec::new();
    if let Some(change) = ValueChange::compare(left.mls().to_string(), right.mls().to_string()) {
        modified.push(ModifiedProperty {
            property: "MLS",
            change,
        });
    }
    if let Some(change) =
        ValueChange::compare(left.version().to_string(), right.version().to_string())
    {
        modified.push(ModifiedProperty {
            property: "version",
            change,
        });
    }
    debug!("{} modified properties", modified.len());
    modified
}

pub(super) fn diff_types(left: &Policy, right: &Policy) -> Differences<ModifiedType> {
    info!("Generating type differences");
    Differences::by_name(
        left.types().map(|t| t.name.as_str()),
        right.types().map(|t| t.name.as_str()),
        |name| {
            let l = left.lookup_type(name).ok()?;
            let r = right.lookup_type(name).ok()?;
            let attributes = SetDiff::new(l.attr_names(left), r.attr_names(right));
            let aliases = SetDiff::new(
                l.aliases.iter().map(String::as_str),
                r.aliases.iter().map(String::as_str),
            );
            let permissive = (l.permissive != r.permissive).then_some(r.permissive);
            if !attributes.is_changed() && !aliases.is_changed() && permissive.is_none() {
                return None;
            }
            Some(ModifiedType {
                name: name.to_string(),
                attributes,
                aliases,
                permissive,
            })
        },
    )
}

pub(super) fn diff_attributes(left: &Policy, right: &Policy) -> Differences<ModifiedAttribute> {
    info!("Generating type attribute differences");
    Differences::by_name(
        left.attributes().map(|a| a.name.as_str()),
        right.attributes().map(|a| a.name.as_str()),
        |name| {
            let l = left.lookup_typeattr(name).ok()?;
            let r = right.lookup_typeattr(name).ok()?;
            let types = SetDiff::new(
                l.types.iter().map(|t| left.type_(*t).name.as_str()),
                r.types.iter().map(|t| right.type_(*t).name.as_str()),
            );
            types.is_changed().then(|| ModifiedAttribute {
                name: name.to_string(),
                types,
            })
        },
    )
}

pub(super) fn diff_roles(left: &Policy, right: &Policy) -> Differences<ModifiedRole> {
    info!("Generating role differences");
    Differences::by_name(
        left.roles().map(|r| r.name.as_str()),
        right.roles().map(|r| r.name.as_str()),
        |name| {
            let l = left.lookup_role(name).ok()?;
            let r = right.lookup_role(name).ok()?;
            let types = SetDiff::new(
                l.types.iter().map(|t| left.type_(*t).name.as_str()),
                r.types.iter().map(|t| right.type_(*t).name.as_str()),
            );
            types.is_changed().then(|| ModifiedRole {
                name: name.to_string(),
                types,
            })
        },
    )
}

pub(super) fn diff_users(left: &Policy, right: &Policy) -> Differences<ModifiedUser> {
    info!("Generating user differences");
    Differences::by_name(
        left.users().map(|u| u.name.as_str()),
        right.users().map(|u| u.name.as_str()),
        |name| {
            let l = left.lookup_user(name).ok()?;
            let r = right.lookup_user(name).ok()?;
            let roles = SetDiff::new(
                l.roles.iter().map(|id| left.role(*id).name.as_str()),
                r.roles.iter().map(|id| right.role(*id).name.as_str()),
            );
            let level = ValueChange::compare(
                mls_text(l.level.as_ref().map(|v| v.display(left).to_string())),
                mls_text(r.level.as_ref().map(|v| v.display(right).to_string())),
            );
            let range = ValueChange::compare(
                mls_text(l.range.as_ref().map(|v| v.display(left).to_string())),
                mls_text(r.range.as_ref().map(|v| v.display(right).to_string())),
            );
            if !roles.is_changed() && level.is_none() && range.is_none() {
                return None;
            }
            Some(ModifiedUser {
                name: name.to_string(),
                roles,
                level,
                range,
            })
        },
    )
}

fn mls_text(value: Option<String>) -> String {
    value.unwrap_or_else(|| MLS_DISABLED.to_string())
}

pub(super) fn diff_booleans(left: &Policy, right: &Policy) -> Differences<ModifiedBoolean> {
    info!("Generating Boolean differences");
    Differences::by_name(
        left.bools().map(|b| b.name.as_str()),
        right.bools().map(|b| b.name.as_str()),
        |name| {
            let l = left.lookup_boolean(name).ok()?;
            let r = right.lookup_boolean(name).ok()?;
            (l.state != r.state).then(|| ModifiedBoolean {
                name: name.to_string(),
                added_state: r.state,
                removed_state: l.state,
            })
        },
    )
}

pub(super) fn diff_commons(left: &Policy, right: &Policy) -> Differences<ModifiedCommon> {
    info!("Generating common differences");
    Differences::by_name(
        left.commons().map(|c| c.name.as_str()),
        right.commons().map(|c| c.name.as_str()),
        |name| {
            let l = left.lookup_common(name).ok()?;
            let r = right.lookup_common(name).ok()?;
            let perms = SetDiff::new(
                l.perms.iter().map(String::as_str),
                r.perms.iter().map(String::as_str),
            );
            perms.is_changed().then(|| ModifiedCommon {
                name: name.to_string(),
                perms,
            })
        },
    )
}

pub(super) fn diff_classes(left: &Policy, right: &Policy) -> Differences<ModifiedClass> {
    info!("Generating class differences");
    Differences::by_name(
        left.classes().map(|c| c.name.as_str()),
        right.classes().map(|c| c.name.as_str()),
        |name| {
            let l = left.lookup_class(name).ok()?;
            let r = right.lookup_class(name).ok()?;
            let perms = SetDiff::new(l.all_perms(left), r.all_perms(right));
            perms.is_changed().then(|| ModifiedClass {
                name: name.to_string(),
                perms,
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyBuilder;

    fn left() -> Policy {
        let mut b = PolicyBuilder::new("left");
        b.common("file_common", &["read", "write"]).unwrap();
        b.class("file", &["execute"], Some("file_common")).unwrap();
        b.class("dir", &["search"], None).unwrap();
        b.attribute("domain").unwrap();
        b.attribute("old_attr").unwrap();
        b.type_("init_t", &["domain"]).unwrap();
        b.type_("old_t", &[]).unwrap();
        b.type_("kept_t", &[]).unwrap();
        b.type_alias("kept_t", "kept_alias_t").unwrap();
        b.role("system_r", &["init_t"]).unwrap();
        b.user("system_u", &["system_r"], None, None).unwrap();
        b.boolean("secure_mode", false).unwrap();
        b.boolean("legacy", true).unwrap();
        b.build()
    }

    fn right() -> Policy {
        let mut b = PolicyBuilder::new("right");
        b.version(31);
        b.common("file_common", &["read", "write", "append"]).unwrap();
        b.class("file", &["execute"], Some("file_common")).unwrap();
        b.class("dir", &["search"], None).unwrap();
        b.attribute("domain").unwrap();
        b.type_("init_t", &["domain"]).unwrap();
        b.type_("new_t", &["domain"]).unwrap();
        b.type_("kept_t", &["domain"]).unwrap();
        b.permissive("kept_t").unwrap();
        b.role("system_r", &["init_t", "new_t"]).unwrap();
        b.role("staff_r", &[]).unwrap();
        b.user("system_u", &["system_r", "staff_r"], None, None).unwrap();
        b.boolean("secure_mode", true).unwrap();
        b.build()
    }

    #[test]
    fn test_properties() {
        let (l, r) = (left(), right());
        let props = diff_properties(&l, &r);
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].property, "version");
        assert_eq!(props[0].change.removed, "33");
        assert_eq!(props[0].change.added, "31");
        assert!(diff_properties(&l, &l).is_empty());
    }

    #[test]
    fn test_types() {
        let (l, r) = (left(), right());
        let diff = diff_types(&l, &r);
        assert_eq!(diff.added, vec!["new_t"]);
        assert_eq!(diff.removed, vec!["old_t"]);
        assert_eq!(diff.modified.len(), 1);

        let kept = &diff.modified[0];
        assert_eq!(kept.name, "kept_t");
        assert_eq!(kept.attributes.added.iter().collect::<Vec<_>>(), vec!["domain"]);
        assert_eq!(kept.aliases.removed.iter().collect::<Vec<_>>(), vec!["kept_alias_t"]);
        assert_eq!(kept.permissive, Some(true));
    }

    #[test]
    fn test_attributes_and_roles() {
        let (l, r) = (left(), right());
        let attrs = diff_attributes(&l, &r);
        assert!(attrs.added.is_empty());
        assert_eq!(attrs.removed, vec!["old_attr"]);
        assert_eq!(attrs.modified.len(), 1);
        assert_eq!(
            attrs.modified[0].types.added.iter().collect::<Vec<_>>(),
            vec!["kept_t", "new_t"]
        );

        let roles = diff_roles(&l, &r);
        assert_eq!(roles.added, vec!["staff_r"]);
        assert_eq!(roles.modified[0].name, "system_r");
        assert_eq!(
            roles.modified[0].types.added.iter().collect::<Vec<_>>(),
            vec!["new_t"]
        );
    }

    #[test]
    fn test_users_and_booleans() {
        let (l, r) = (left(), right());
        let users = diff_users(&l, &r);
        assert_eq!(users.modified.len(), 1);
        assert_eq!(
            users.modified[0].roles.added.iter().collect::<Vec<_>>(),
            vec!["staff_r"]
        );
        assert_eq!(users.modified[0].level, None);

        let bools = diff_booleans(&l, &r);
        assert_eq!(bools.removed, vec!["legacy"]);
        assert_eq!(
            bools.modified,
            vec![ModifiedBoolean {
                name: "secure_mode".to_string(),
                added_state: true,
                removed_state: false,
            }]
        );
    }

    #[test]
    fn test_classes_include_common_perms() {
        let (l, r) = (left(), right());
        let commons = diff_commons(&l, &r);
        assert_eq!(commons.modified[0].name, "file_common");

        let classes = diff_classes(&l, &r);
        assert_eq!(classes.modified.len(), 1);
        assert_eq!(classes.modified[0].name, "file");
        assert_eq!(
            classes.modified[0].perms.added.iter().collect::<Vec<_>>(),
            vec!["append"]
        );
        assert_eq!(classes.modified[0].perms.matched.len(), 3);
    }

    #[test]
    fn test_identical_policies() {
        let l = left();
        assert!(diff_types(&l, &l).is_empty());
        assert!(diff_users(&l, &l).is_empty());
        assert!(diff_classes(&l, &l).is_empty());
    }
}
