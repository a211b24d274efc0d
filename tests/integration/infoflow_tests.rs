//! Information flow integration tests.
//!
//! Runs the analysis over the sample policy with the fixture permission map.

use seflow::{InfoFlowAnalysis, PermissionMap, Policy, PolicyError};

use crate::common::{perm_map_path, sample_policy};

fn analysis(policy: &Policy) -> InfoFlowAnalysis<'_> {
    InfoFlowAnalysis::new(policy, PermissionMap::load(perm_map_path()).unwrap())
}

fn names(policy: &Policy, path: &[seflow::InfoFlowStep<'_>]) -> Vec<(String, String)> {
    path.iter()
        .map(|step| {
            (
                policy.type_(step.source).name.clone(),
                policy.type_(step.target).name.clone(),
            )
        })
        .collect()
}

// =============================================================================
// Paths
// =============================================================================

#[test]
fn test_shortest_path_through_transition() {
    let policy = sample_policy();
    let mut ifa = analysis(&policy).with_min_weight(5).unwrap();

    let path = ifa.shortest_path("user_t", "shadow_t").unwrap().unwrap();
    assert_eq!(
        names(&policy, &path),
        vec![
            ("user_t".to_string(), "passwd_t".to_string()),
            ("passwd_t".to_string(), "shadow_t".to_string()),
        ]
    );
    assert_eq!(path[0].weight, 5);
    assert_eq!(path[1].weight, 10);
    assert_eq!(path[1].rules.len(), 1);
}

#[test]
fn test_min_weight_and_exclusions_cut_paths() {
    let policy = sample_policy();
    let mut ifa = analysis(&policy).with_min_weight(10).unwrap();
    assert!(ifa.shortest_path("user_t", "shadow_t").unwrap().is_none());

    ifa.set_min_weight(1).unwrap();
    assert!(ifa.shortest_path("user_t", "shadow_t").unwrap().is_some());

    ifa.set_exclude(["passwd_t"]).unwrap();
    assert!(ifa.shortest_path("user_t", "shadow_t").unwrap().is_none());
    assert_eq!(ifa.all_paths("user_t", "shadow_t", 5).unwrap().count(), 0);
}

#[test]
fn test_all_paths() {
    let policy = sample_policy();
    let mut ifa = analysis(&policy);

    let paths: Vec<_> = ifa.all_paths("user_t", "shadow_t", 3).unwrap().collect();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].len(), 2);

    assert_eq!(ifa.all_shortest_paths("user_t", "shadow_t").unwrap().count(), 1);

    assert!(matches!(
        ifa.all_paths("user_t", "shadow_t", 0),
        Err(PolicyError::InvalidValue(_))
    ));
}

// =============================================================================
// Direct flows
// =============================================================================

#[test]
fn test_flows_in_and_out() {
    let policy = sample_policy();
    let mut ifa = analysis(&policy).with_min_weight(10).unwrap();

    let out: Vec<String> = ifa
        .flows_out("user_t")
        .unwrap()
        .map(|step| policy.type_(step.target).name.clone())
        .collect();
    assert_eq!(out, vec!["user_home_t".to_string()]);

    let mut sources: Vec<String> = ifa
        .flows_in("shadow_t")
        .unwrap()
        .map(|step| policy.type_(step.source).name.clone())
        .collect();
    sources.sort();
    assert_eq!(sources, vec!["passwd_t".to_string()]);

    let step = ifa.flows_out("passwd_t").unwrap().next().unwrap();
    let json = step.to_json(&policy);
    assert_eq!(json["source"], "passwd_t");
    assert_eq!(json["target"], "shadow_t");
    assert_eq!(json["rules"][0], "allow passwd_t shadow_t:file { read write };");
}

#[test]
fn test_unknown_types_and_stats() {
    let policy = sample_policy();
    let mut ifa = analysis(&policy);
    assert!(matches!(
        ifa.shortest_path("nobody_t", "shadow_t"),
        Err(PolicyError::InvalidType(_))
    ));
    assert!(matches!(
        ifa.set_exclude(["domain"]),
        Err(PolicyError::InvalidType(_))
    ));

    let stats = ifa.stats().unwrap();
    assert!(stats.nodes > 0);
    assert!(stats.edges >= stats.nodes / 2);
}
