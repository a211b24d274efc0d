//! Permission map integration tests.
//!
//! Tests loading the fixture map, saving it back out and weighing rules of
//! the sample policy.

use seflow::{FlowDirection, PermissionMap, PolicyError};

use crate::common::{perm_map_path, sample_policy};

// =============================================================================
// Loading and saving
// =============================================================================

#[test]
fn test_load_fixture() {
    let map = PermissionMap::load(perm_map_path()).unwrap();

    let classes: Vec<&str> = map.classes().collect();
    assert_eq!(classes, vec!["file", "process"]);
    assert_eq!(map.perms("file").unwrap().count(), 7);

    let write = map.mapping("file", "write").unwrap();
    assert_eq!(write.direction, FlowDirection::Write);
    assert_eq!(write.weight, 10);
    assert!(write.enabled);

    let setexec = map.mapping("process", "setexec").unwrap();
    assert_eq!(setexec.direction, FlowDirection::None);
}

#[test]
fn test_load_missing_file() {
    let err = PermissionMap::load(perm_map_path().with_file_name("no_such_map")).unwrap_err();
    assert!(matches!(err, PolicyError::Io { .. }));
}

#[test]
fn test_save_and_reload() {
    let mut map = PermissionMap::load(perm_map_path()).unwrap();
    map.set_weight("file", "read", 7).unwrap();
    map.set_direction("process", "sigchld", FlowDirection::Both)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("perm_map");
    map.save(&path).unwrap();

    let reloaded = PermissionMap::load(&path).unwrap();
    assert_eq!(reloaded, map);
    assert_eq!(reloaded.mapping("file", "read").unwrap().weight, 7);
}

// =============================================================================
// Rule weights
// =============================================================================

#[test]
fn test_rule_weights_against_policy() {
    let policy = sample_policy();
    let mut map = PermissionMap::load(perm_map_path()).unwrap();
    map.map_policy(&policy);

    let rule = policy
        .terules()
        .find(|r| r.target.name(&policy) == "etc_t")
        .unwrap();
    let weight = map.rule_weight(&policy, rule).unwrap();
    assert_eq!(weight.read, 10);
    assert_eq!(weight.write, 0);

    map.exclude_permission("file", "read").unwrap();
    let weight = map.rule_weight(&policy, rule).unwrap();
    assert_eq!(weight.read, 1);

    map.exclude_class("file").unwrap();
    let weight = map.rule_weight(&policy, rule).unwrap();
    assert_eq!((weight.read, weight.write), (0, 0));
}

#[test]
fn test_invalid_edits() {
    let mut map = PermissionMap::load(perm_map_path()).unwrap();
    assert!(matches!(
        map.set_weight("file", "read", 0),
        Err(PolicyError::InvalidValue(_))
    ));
    assert!(matches!(
        map.exclude_class("socket"),
        Err(PolicyError::UnmappedClass(_))
    ));
    assert!(matches!(
        map.include_permission("file", "ioctl"),
        Err(PolicyError::UnmappedPermission { .. })
    ));
}
