//! Domain transition integration tests.

use seflow::{DomainTransition, DomainTransitionAnalysis, Policy, PolicyError};

use crate::common::sample_policy;

fn endpoints(policy: &Policy, step: &DomainTransition<'_>) -> (String, String) {
    (
        policy.type_(step.source).name.clone(),
        policy.type_(step.target).name.clone(),
    )
}

fn pair(source: &str, target: &str) -> (String, String) {
    (source.to_string(), target.to_string())
}

// =============================================================================
// Forward analysis
// =============================================================================

#[test]
fn test_transitions_out() {
    let policy = sample_policy();
    let mut dta = DomainTransitionAnalysis::new(&policy);

    let steps: Vec<_> = dta.transitions_out("init_t").unwrap().collect();
    assert_eq!(steps.len(), 1);
    let step = &steps[0];
    assert_eq!(endpoints(&policy, step), pair("init_t", "sshd_t"));
    assert_eq!(step.transition.len(), 1);
    assert_eq!(step.entrypoints.len(), 1);
    assert_eq!(policy.type_(step.entrypoints[0].name).name, "sshd_exec_t");
    assert_eq!(step.entrypoints[0].type_transition.len(), 1);
    assert!(step.setexec.is_empty());
    assert!(step.dyntransition.is_empty());

    let json = step.to_json(&policy);
    assert_eq!(json["entrypoints"][0]["name"], "sshd_exec_t");
    assert_eq!(
        json["entrypoints"][0]["type_transition"][0],
        "type_transition init_t sshd_exec_t:process sshd_t;"
    );
}

#[test]
fn test_dynamic_transition() {
    let policy = sample_policy();
    let mut dta = DomainTransitionAnalysis::new(&policy);

    let steps: Vec<_> = dta.transitions_out("sshd_t").unwrap().collect();
    assert_eq!(steps.len(), 1);
    assert_eq!(endpoints(&policy, &steps[0]), pair("sshd_t", "user_t"));
    assert_eq!(steps[0].dyntransition.len(), 1);
    assert_eq!(steps[0].setcurrent.len(), 1);
    assert!(steps[0].transition.is_empty());
}

#[test]
fn test_paths() {
    let policy = sample_policy();
    let mut dta = DomainTransitionAnalysis::new(&policy);

    let path = dta.shortest_path("init_t", "passwd_t").unwrap().unwrap();
    let hops: Vec<_> = path.iter().map(|s| endpoints(&policy, s)).collect();
    assert_eq!(
        hops,
        vec![
            pair("init_t", "sshd_t"),
            pair("sshd_t", "user_t"),
            pair("user_t", "passwd_t"),
        ]
    );

    assert_eq!(dta.all_paths("init_t", "passwd_t", 2).unwrap().count(), 0);
    assert_eq!(dta.all_paths("init_t", "passwd_t", 3).unwrap().count(), 1);
    assert_eq!(dta.all_shortest_paths("init_t", "passwd_t").unwrap().count(), 1);

    assert!(dta.shortest_path("passwd_t", "init_t").unwrap().is_none());
    assert!(matches!(
        dta.all_paths("init_t", "passwd_t", 0),
        Err(PolicyError::InvalidValue(_))
    ));
}

#[test]
fn test_exclusions() {
    let policy = sample_policy();
    let mut dta = DomainTransitionAnalysis::new(&policy)
        .with_exclude(["user_t"])
        .unwrap();
    assert!(dta.shortest_path("init_t", "passwd_t").unwrap().is_none());

    dta.set_exclude(Vec::<String>::new()).unwrap();
    assert!(dta.shortest_path("init_t", "passwd_t").unwrap().is_some());

    assert!(matches!(
        dta.set_exclude(["exec_type"]),
        Err(PolicyError::InvalidType(_))
    ));
}

// =============================================================================
// Reverse analysis
// =============================================================================

#[test]
fn test_reverse_reports_real_direction() {
    let policy = sample_policy();
    let mut dta = DomainTransitionAnalysis::new(&policy).with_reverse(true);

    let path = dta.shortest_path("passwd_t", "sshd_t").unwrap().unwrap();
    let hops: Vec<_> = path.iter().map(|s| endpoints(&policy, s)).collect();
    assert_eq!(hops, vec![pair("user_t", "passwd_t"), pair("sshd_t", "user_t")]);

    let sources: Vec<_> = dta
        .transitions_out("user_t")
        .unwrap()
        .map(|s| endpoints(&policy, &s))
        .collect();
    assert_eq!(sources, vec![pair("sshd_t", "user_t")]);

    let stats = dta.stats();
    assert_eq!(stats.edges, 3);
}
