//! TE and RBAC rule differences.
//!
//! Rules are expanded before comparison: a rule written against an
//! attribute becomes one rule per member type pair, and permission sets of
//! rules that expand to the same key are merged. Two rules match when their
//! source, target, class, file name and conditional block agree; a matched
//! access vector rule is modified when its permissions differ, a matched
//! type or role rule when its default differs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::Serialize;
use tracing::{debug, info};

use super::symbols::ValueChange;
use super::{Differences, SetDiff};
use crate::policy::{
    Conditional, Policy, PolicyDisplay, RbacRuletype, RbacTarget, TePayload, TeRuletype,
};

pub(super) const TE_RULETYPES: [TeRuletype; 7] = [
    TeRuletype::Allow,
    TeRuletype::Auditallow,
    TeRuletype::Dontaudit,
    TeRuletype::Neverallow,
    TeRuletype::TypeTransition,
    TeRuletype::TypeMember,
    TeRuletype::TypeChange,
];

pub(super) const RBAC_RULETYPES: [RbacRuletype; 2] =
    [RbacRuletype::Allow, RbacRuletype::RoleTransition];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "change", rename_all = "snake_case")]
pub enum TeRuleChange {
    /// Access vector rules.
    Perms(SetDiff),
    /// type_transition, type_member and type_change rules.
    Default(ValueChange),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedTeRule {
    /// The rule without its permissions or default, e.g. `allow a_t b_t:file`.
    pub rule: String,
    pub change: TeRuleChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedRbacRule {
    /// The role_transition without its default role.
    pub rule: String,
    pub default: ValueChange,
}

/// Added and removed rules are rendered in policy syntax.
pub type TeRuleDiff = Differences<ModifiedTeRule>;

/// Role allows are only ever added or removed.
pub type RbacRuleDiff = Differences<ModifiedRbacRule>;

// =============================================================================
// Expansion
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TeKey {
    source: String,
    target: String,
    tclass: String,
    filename: Option<String>,
    /// Rendered ` [ expr ]:True` suffix.
    conditional: Option<String>,
}

#[derive(Debug, Clone)]
enum TeValue {
    Perms(BTreeSet<String>),
    Default(String),
}

type ExpandedTe = BTreeMap<TeRuletype, BTreeMap<TeKey, TeValue>>;

fn conditional_suffix(policy: &Policy, conditional: &Conditional) -> Option<String> {
    match conditional {
        Conditional::Unconditional => None,
        Conditional::Conditional { expr, branch } => Some(format!(
            " [ {} ]:{}",
            policy.conditional_expr(*expr).display(policy),
            if *branch { "True" } else { "False" }
        )),
    }
}

fn expand_terules(policy: &Policy) -> ExpandedTe {
    let mut expanded = ExpandedTe::new();
    for rule in policy.terules() {
        let conditional = conditional_suffix(policy, &rule.conditional);
        let tclass = &policy.class(rule.tclass).name;
        let (filename, value) = match &rule.payload {
            TePayload::Perms(perms) => (None, TeValue::Perms(perms.clone())),
            TePayload::Default { default, filename } => (
                filename.clone(),
                TeValue::Default(policy.type_(*default).name.clone()),
            ),
        };

        let rules = expanded.entry(rule.ruletype).or_default();
        for s in rule.source.expand(policy) {
            for t in rule.target.expand(policy) {
                let key = TeKey {
                    source: policy.type_(*s).name.clone(),
                    target: policy.type_(*t).name.clone(),
                    tclass: tclass.clone(),
                    filename: filename.clone(),
                    conditional: conditional.clone(),
                };
                match &value {
                    TeValue::Perms(perms) => match rules
                        .entry(key)
                        .or_insert_with(|| TeValue::Perms(BTreeSet::new()))
                    {
                        TeValue::Perms(existing) => existing.extend(perms.iter().cloned()),
                        other => *other = value.clone(),
                    },
                    TeValue::Default(_) => {
                        rules.insert(key, value.clone());
                    }
                }
            }
        }
    }
    debug!(
        "Expanded {} TE rules of {} into {} keyed rules",
        policy.terules().count(),
        policy.name(),
        expanded.values().map(BTreeMap::len).sum::<usize>()
    );
    expanded
}

fn te_header(ruletype: TeRuletype, key: &TeKey) -> String {
    let mut text = format!("{} {} {}:{}", ruletype, key.source, key.target, key.tclass);
    if let Some(name) = &key.filename {
        let _ = write!(text, " \"{}\"", name);
    }
    text
}

fn render_te(ruletype: TeRuletype, key: &TeKey, value: &TeValue) -> String {
    let mut text = format!("{} {} {}:{} ", ruletype, key.source, key.target, key.tclass);
    match value {
        TeValue::Perms(perms) => text.push_str(&name_set(perms)),
        TeValue::Default(default) => text.push_str(default),
    }
    if let Some(name) = &key.filename {
        let _ = write!(text, " \"{}\"", name);
    }
    text.push(';');
    if let Some(cond) = &key.conditional {
        text.push_str(cond);
    }
    text
}

fn name_set(names: &BTreeSet<String>) -> String {
    if names.len() == 1 {
        names.iter().map(String::as_str).collect()
    } else {
        let joined: Vec<&str> = names.iter().map(String::as_str).collect();
        format!("{{ {} }}", joined.join(" "))
    }
}

/// Walk two keyed rule maps in key order.
fn diff_keyed<K, V, M>(
    left: &BTreeMap<K, V>,
    right: &BTreeMap<K, V>,
    render: impl Fn(&K, &V) -> String,
    modified: impl Fn(&K, &V, &V) -> Option<M>,
) -> Differences<M>
where
    K: Ord,
{
    let mut diff = Differences::default();
    for (key, lv) in left {
        match right.get(key) {
            Some(rv) => diff.modified.extend(modified(key, lv, rv)),
            None => diff.removed.push(render(key, lv)),
        }
    }
    for (key, rv) in right {
        if !left.contains_key(key) {
            diff.added.push(render(key, rv));
        }
    }
    diff.added.sort();
    diff.removed.sort();
    diff
}

pub(super) fn diff_terules(left: &Policy, right: &Policy) -> Vec<(TeRuletype, TeRuleDiff)> {
    info!("Generating TE rule differences");
    let left_rules = expand_terules(left);
    let right_rules = expand_terules(right);
    let empty = BTreeMap::new();

    TE_RULETYPES
        .iter()
        .map(|&ruletype| {
            let l = left_rules.get(&ruletype).unwrap_or(&empty);
            let r = right_rules.get(&ruletype).unwrap_or(&empty);
            let diff = diff_keyed(
                l,
                r,
                |key, value| render_te(ruletype, key, value),
                |key, lv, rv| {
                    let change = match (lv, rv) {
                        (TeValue::Perms(lp), TeValue::Perms(rp)) => {
                            let perms = SetDiff::new(lp.iter().cloned(), rp.iter().cloned());
                            perms.is_changed().then_some(TeRuleChange::Perms(perms))?
                        }
                        (TeValue::Default(ld), TeValue::Default(rd)) => TeRuleChange::Default(
                            ValueChange::compare(ld.clone(), rd.clone())?,
                        ),
                        _ => return None,
                    };
                    let mut rule = te_header(ruletype, key);
                    if let Some(cond) = &key.conditional {
                        rule.push_str(cond);
                    }
                    Some(ModifiedTeRule { rule, change })
                },
            );
            debug!(
                "{}: {} added, {} removed, {} modified",
                ruletype,
                diff.added.len(),
                diff.removed.len(),
                diff.modified.len()
            );
            (ruletype, diff)
        })
        .collect()
}

// =============================================================================
// RBAC rules
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RbacKey {
    source: String,
    target: String,
    tclass: Option<String>,
}

/// Ruletype to key to default role (empty for role allows).
type ExpandedRbac = BTreeMap<RbacRuletype, BTreeMap<RbacKey, String>>;

fn expand_rbacrules(policy: &Policy) -> ExpandedRbac {
    let mut expanded = ExpandedRbac::new();
    for rule in policy.rbacrules() {
        let source = policy.role(rule.source).name.clone();
        let tclass = rule.tclass().ok().map(|c| policy.class(c).name.clone());
        let default = rule
            .default()
            .map(|r| policy.role(r).name.clone())
            .unwrap_or_default();
        let targets: Vec<String> = match &rule.target {
            RbacTarget::Role(role) => vec![policy.role(*role).name.clone()],
            RbacTarget::Type(toa) => toa
                .expand(policy)
                .iter()
                .map(|t| policy.type_(*t).name.clone())
                .collect(),
        };

        let rules = expanded.entry(rule.ruletype).or_default();
        for target in targets {
            rules.insert(
                RbacKey {
                    source: source.clone(),
                    target,
                    tclass: tclass.clone(),
                },
                default.clone(),
            );
        }
    }
    expanded
}

fn rbac_header(ruletype: RbacRuletype, key: &RbacKey) -> String {
    match &key.tclass {
        Some(tclass) => format!("{} {} {}:{}", ruletype, key.source, key.target, tclass),
        None => format!("{} {} {}", ruletype, key.source, key.target),
    }
}

pub(super) fn diff_rbacrules(left: &Policy, right: &Policy) -> Vec<(RbacRuletype, RbacRuleDiff)> {
    info!("Generating RBAC rule differences");
    let left_rules = expand_rbacrules(left);
    let right_rules = expand_rbacrules(right);
    let empty = BTreeMap::new();

    RBAC_RULETYPES
        .iter()
        .map(|&ruletype| {
            let l = left_rules.get(&ruletype).unwrap_or(&empty);
            let r = right_rules.get(&ruletype).unwrap_or(&empty);
            let diff = diff_keyed(
                l,
                r,
                |key, default| {
                    if default.is_empty() {
                        format!("{};", rbac_header(ruletype, key))
                    } else {
                        format!("{} {};", rbac_header(ruletype, key), default)
                    }
                },
                |key, ld, rd| {
                    Some(ModifiedRbacRule {
                        rule: rbac_header(ruletype, key),
                        default: ValueChange::compare(ld.clone(), rd.clone())?,
                    })
                },
            );
            (ruletype, diff)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyBuilder;

    fn base(name: &str) -> PolicyBuilder {
        let mut b = PolicyBuilder::new(name);
        b.class("file", &["read", "write", "getattr"], None).unwrap();
        b.class("process", &["transition"], None).unwrap();
        b.attribute("domain").unwrap();
        b.type_("a_t", &["domain"]).unwrap();
        b.type_("b_t", &["domain"]).unwrap();
        b.type_("etc_t", &[]).unwrap();
        b.type_("exec_t", &[]).unwrap();
        b.boolean("secure_mode", false).unwrap();
        b.role("system_r", &["a_t", "b_t"]).unwrap();
        b.role("staff_r", &["a_t"]).unwrap();
        b
    }

    fn te(diffs: &[(TeRuletype, TeRuleDiff)], ruletype: TeRuletype) -> &TeRuleDiff {
        &diffs.iter().find(|(rt, _)| *rt == ruletype).unwrap().1
    }

    // =========================================================================
    // TE rules
    // =========================================================================

    #[test]
    fn test_attribute_rule_matches_expanded_rules() {
        let mut l = base("left");
        l.allow("domain", "etc_t", "file", &["read"]).unwrap();
        let l = l.build();

        let mut r = base("right");
        r.allow("a_t", "etc_t", "file", &["read"]).unwrap();
        r.allow("b_t", "etc_t", "file", &["read"]).unwrap();
        let r = r.build();

        let diffs = diff_terules(&l, &r);
        assert!(diffs.iter().all(|(_, d)| d.is_empty()));
    }

    #[test]
    fn test_added_removed_and_modified_allows() {
        let mut l = base("left");
        l.allow("a_t", "etc_t", "file", &["read"]).unwrap();
        l.allow("b_t", "etc_t", "file", &["read", "getattr"]).unwrap();
        let l = l.build();

        let mut r = base("right");
        r.allow("a_t", "etc_t", "file", &["read", "write"]).unwrap();
        r.allow("a_t", "exec_t", "file", &["read"]).unwrap();
        let r = r.build();

        let diffs = diff_terules(&l, &r);
        let allows = te(&diffs, TeRuletype::Allow);
        assert_eq!(allows.added, vec!["allow a_t exec_t:file read;"]);
        assert_eq!(allows.removed, vec!["allow b_t etc_t:file { getattr read };"]);
        assert_eq!(allows.modified.len(), 1);
        assert_eq!(allows.modified[0].rule, "allow a_t etc_t:file");
        match &allows.modified[0].change {
            TeRuleChange::Perms(perms) => {
                assert_eq!(perms.added.iter().collect::<Vec<_>>(), vec!["write"]);
                assert!(perms.removed.is_empty());
                assert_eq!(perms.matched.iter().collect::<Vec<_>>(), vec!["read"]);
            }
            other => panic!("expected a permission change, got {:?}", other),
        }
    }

    #[test]
    fn test_conditional_block_is_part_of_the_key() {
        let mut l = base("left");
        l.begin_conditional("secure_mode", true).unwrap();
        l.allow("a_t", "etc_t", "file", &["write"]).unwrap();
        l.end_conditional();
        let l = l.build();

        let mut r = base("right");
        r.allow("a_t", "etc_t", "file", &["write"]).unwrap();
        let r = r.build();

        let diffs = diff_terules(&l, &r);
        let allows = te(&diffs, TeRuletype::Allow);
        assert_eq!(allows.added, vec!["allow a_t etc_t:file write;"]);
        assert_eq!(
            allows.removed,
            vec!["allow a_t etc_t:file write; [ secure_mode ]:True"]
        );
    }

    #[test]
    fn test_type_transition_default_change() {
        let mut l = base("left");
        l.type_transition("a_t", "exec_t", "process", "b_t", None)
            .unwrap();
        let l = l.build();

        let mut r = base("right");
        r.type_transition("a_t", "exec_t", "process", "a_t", None)
            .unwrap();
        let r = r.build();

        let diffs = diff_terules(&l, &r);
        let transitions = te(&diffs, TeRuletype::TypeTransition);
        assert!(transitions.added.is_empty());
        assert_eq!(
            transitions.modified,
            vec![ModifiedTeRule {
                rule: "type_transition a_t exec_t:process".to_string(),
                change: TeRuleChange::Default(ValueChange {
                    added: "a_t".to_string(),
                    removed: "b_t".to_string(),
                }),
            }]
        );
        assert!(te(&diffs, TeRuletype::Allow).is_empty());
    }

    // =========================================================================
    // RBAC rules
    // =========================================================================

    #[test]
    fn test_role_allow_and_transition() {
        let mut l = base("left");
        l.role_allow("system_r", "staff_r").unwrap();
        l.role_transition("system_r", "domain", "process", "system_r")
            .unwrap();
        let l = l.build();

        let mut r = base("right");
        r.role_allow("staff_r", "system_r").unwrap();
        r.role_transition("system_r", "a_t", "process", "staff_r")
            .unwrap();
        let r = r.build();

        let diffs = diff_rbacrules(&l, &r);
        let allows = &diffs[0].1;
        assert_eq!(diffs[0].0, RbacRuletype::Allow);
        assert_eq!(allows.added, vec!["allow staff_r system_r;"]);
        assert_eq!(allows.removed, vec!["allow system_r staff_r;"]);
        assert!(allows.modified.is_empty());

        let transitions = &diffs[1].1;
        assert_eq!(
            transitions.removed,
            vec!["role_transition system_r b_t:process system_r;"]
        );
        assert_eq!(transitions.modified.len(), 1);
        assert_eq!(transitions.modified[0].rule, "role_transition system_r a_t:process");
        assert_eq!(transitions.modified[0].default.added, "staff_r");
    }
}
