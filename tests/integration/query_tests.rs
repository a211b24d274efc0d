//! Query integration tests over the sample policy.

use seflow::policy::{PolicyDisplay, TeRuletype};
use seflow::query::{TeRuleQuery, TypeAttributeQuery, TypeQuery};
use seflow::PolicyError;

use crate::common::sample_policy;

// =============================================================================
// TE rules
// =============================================================================

#[test]
fn test_terule_indirect_source() {
    let policy = sample_policy();

    // passwd_t gets etc_t read through the domain attribute
    let query = TeRuleQuery::new(&policy)
        .with_source("passwd_t")
        .unwrap()
        .with_tclass(["file"])
        .unwrap();
    let rules: Vec<String> = query
        .results()
        .map(|r| r.display(&policy).to_string())
        .collect();
    assert_eq!(
        rules,
        vec![
            "allow passwd_t shadow_t:file { read write };",
            "allow domain etc_t:file { getattr read };",
            "allow passwd_t passwd_exec_t:file entrypoint;",
        ]
    );

    let direct = query.clone().with_source_indirect(false);
    assert_eq!(direct.results().count(), 2);
}

#[test]
fn test_terule_perms_and_ruletypes() {
    let policy = sample_policy();

    let writers: Vec<String> = TeRuleQuery::new(&policy)
        .with_ruletypes([TeRuletype::Allow])
        .with_tclass(["file"])
        .unwrap()
        .with_perms(["write"])
        .unwrap()
        .results()
        .map(|r| r.source.name(&policy).to_string())
        .collect();
    assert_eq!(writers, vec!["user_t", "passwd_t"]);

    let transitions = TeRuleQuery::new(&policy)
        .with_ruletypes([TeRuletype::TypeTransition])
        .with_default("passwd_t")
        .unwrap();
    assert_eq!(transitions.results().count(), 1);

    assert!(matches!(
        TeRuleQuery::new(&policy)
            .with_tclass(["process"])
            .unwrap()
            .with_perms(["read"]),
        Err(PolicyError::InvalidPermission { .. })
    ));
}

// =============================================================================
// Types and attributes
// =============================================================================

#[test]
fn test_type_and_attribute_queries() {
    let policy = sample_policy();

    let execs: Vec<&str> = TypeQuery::new(&policy)
        .with_attrs(["exec_type"])
        .unwrap()
        .results()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(execs, vec!["sshd_exec_t", "passwd_exec_t"]);

    let domains = TypeAttributeQuery::new(&policy)
        .with_types(["user_t"])
        .unwrap();
    let names: Vec<&str> = domains.results().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["domain"]);

    assert_eq!(
        TypeQuery::new(&policy)
            .with_name_regex("_t$")
            .unwrap()
            .results()
            .count(),
        policy.types().count()
    );
    assert!(TypeQuery::new(&policy).with_name_regex("(").is_err());
}
