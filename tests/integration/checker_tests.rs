//! Checker integration tests: checks configured through TOML and run against
//! the sample policy.

use seflow::checker::registry;
use seflow::{AnalysisConfig, Finding, PolicyError};

use crate::common::sample_policy;

const CHECKS: &str = r#"
[checks.shadow_writers]
check_type = "assert_te"
desc = "Only passwd may write shadow"
target = "shadow_t"
tclass = "file"
perms = "write append"
expect_source = "passwd_t"

[checks.no_exec_types]
check_type = "empty_typeattr"
attr = "exec_type"

[checks.execs_read_only]
check_type = "ro_execs"

[checks.legacy_attr]
check_type = "empty_typeattr"
attr = "legacy_domain"
missing_ok = true
disable = "kept for older policies"
"#;

#[test]
fn test_configured_checks() {
    let policy = sample_policy();
    let config = AnalysisConfig::from_toml(CHECKS).unwrap();
    let checks = config.create_checks(&policy).unwrap();
    assert_eq!(checks.len(), 4);

    for check in &checks {
        let findings = check.run();
        match check.name() {
            "shadow_writers" => {
                assert_eq!(check.desc(), Some("Only passwd may write shadow"));
                assert!(findings.is_empty());
            }
            "no_exec_types" => assert_eq!(
                findings,
                vec![
                    Finding::Type("passwd_exec_t".to_string()),
                    Finding::Type("sshd_exec_t".to_string()),
                ]
            ),
            "execs_read_only" => assert!(findings.is_empty()),
            "legacy_attr" => {
                assert_eq!(check.disable(), Some("kept for older policies"));
                assert!(findings.is_empty());
            }
            other => panic!("unexpected check {}", other),
        }
    }
}

#[test]
fn test_assert_te_reports_unexpected_writer() {
    let policy = sample_policy();
    let config = AnalysisConfig::from_toml(
        r#"
[checks.home]
check_type = "assert_te"
target = "user_home_t"
perms = "write"
expect_source = "passwd_t"
"#,
    )
    .unwrap();
    let checks = config.create_checks(&policy).unwrap();
    let findings = checks[0].run();
    assert_eq!(
        findings,
        vec![
            Finding::Rule("allow user_t user_home_t:file { read write };".to_string()),
            Finding::Missing("Expected rule with source \"passwd_t\" not found.".to_string()),
        ]
    );

    let json = serde_json::to_value(&findings).unwrap();
    assert_eq!(json[1]["kind"], "missing");
}

#[test]
fn test_configuration_errors() {
    let policy = sample_policy();

    let unknown = AnalysisConfig::from_toml("[checks.x]\ncheck_type = \"nope\"\n").unwrap();
    assert!(matches!(
        unknown.create_checks(&policy),
        Err(PolicyError::InvalidCheckerModule { .. })
    ));

    let bad_value =
        AnalysisConfig::from_toml("[checks.x]\ncheck_type = \"assert_te\"\nexpect_source = \"ghost_t\"\nsource = \"user_t\"\n")
            .unwrap();
    assert!(matches!(
        bad_value.create_checks(&policy),
        Err(PolicyError::InvalidCheckValue { .. })
    ));

    let bad_type = AnalysisConfig::from_toml("[checks.x]\ncheck_type = \"ro_execs\"\nexempt_file = 3.5\n").unwrap();
    assert!(matches!(
        bad_type.create_checks(&policy),
        Err(PolicyError::InvalidCheckValue { .. })
    ));

    assert_eq!(registry().len(), 5);
}
