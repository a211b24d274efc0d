//! Policy difference tests: the sample policy against an edited copy.

use seflow::diff::TeRuleChange;
use seflow::policy::{RbacRuletype, TeRuletype};
use seflow::PolicyDifference;

use crate::common::{sample_builder, sample_policy};

#[test]
fn test_identical_policies_have_no_differences() {
    let left = sample_policy();
    let right = sample_policy();
    let diff = PolicyDifference::new(&left, &right);
    assert!(diff.is_empty());
}

#[test]
fn test_edited_policy() {
    let left = sample_policy();

    let mut b = sample_builder();
    b.type_("tmp_t", &[]).unwrap();
    b.permissive("passwd_t").unwrap();
    b.allow("user_t", "tmp_t", "file", &["write"]).unwrap();
    b.allow("user_t", "etc_t", "file", &["append"]).unwrap();
    b.role("user_r", &["user_t"]).unwrap();
    let right = b.build();

    let diff = PolicyDifference::new(&left, &right);
    assert!(!diff.is_empty());

    assert_eq!(diff.types().added, vec!["tmp_t"]);
    assert!(diff.types().removed.is_empty());
    assert_eq!(diff.types().modified.len(), 1);
    assert_eq!(diff.types().modified[0].name, "passwd_t");
    assert_eq!(diff.types().modified[0].permissive, Some(true));
    assert_eq!(diff.roles().added, vec!["user_r"]);

    let allows = diff.terules(TeRuletype::Allow);
    assert_eq!(allows.added, vec!["allow user_t tmp_t:file write;"]);
    assert!(allows.removed.is_empty());
    // the domain attribute rule expands to user_t, so the new rule merges into it
    assert_eq!(allows.modified.len(), 1);
    assert_eq!(allows.modified[0].rule, "allow user_t etc_t:file");
    match &allows.modified[0].change {
        TeRuleChange::Perms(perms) => {
            assert_eq!(perms.added.iter().collect::<Vec<_>>(), vec!["append"]);
        }
        other => panic!("expected a permission change, got {:?}", other),
    }

    assert!(diff.terules(TeRuletype::TypeTransition).is_empty());
    assert!(diff.rbacrules(RbacRuletype::Allow).is_empty());
    assert!(diff.properties().is_empty());
}

#[test]
fn test_difference_serializes() {
    let left = sample_policy();
    let mut b = sample_builder();
    b.boolean("secure_mode", true).unwrap();
    let right = b.build();

    let diff = PolicyDifference::new(&left, &right);
    let json = serde_json::to_value(diff.booleans()).unwrap();
    assert_eq!(json["added"][0], "secure_mode");
    assert_eq!(json["modified"].as_array().unwrap().len(), 0);

    let allows = serde_json::to_value(diff.terules(TeRuletype::Allow)).unwrap();
    assert_eq!(allows["added"].as_array().unwrap().len(), 0);
}
