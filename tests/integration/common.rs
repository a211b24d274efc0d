//! Shared policy and fixture helpers.

use std::path::PathBuf;

use seflow::policy::{Policy, PolicyBuilder};

/// Get the path to test fixtures.
pub fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub fn perm_map_path() -> PathBuf {
    fixtures_path().join("perm_map")
}

/// Small login-flavored policy:
///
/// - init_t runs sshd_t through sshd_exec_t (type_transition),
/// - sshd_t switches to user_t at runtime (dyntransition + setcurrent),
/// - user_t runs passwd_t through passwd_exec_t (type_transition),
/// - passwd_t reads and writes shadow_t, user_t owns user_home_t.
pub fn sample_policy() -> Policy {
    sample_builder().build()
}

/// Builder holding the declarations and rules of [`sample_policy`].
pub fn sample_builder() -> PolicyBuilder {
    let mut b = PolicyBuilder::new("sample");
    b.class(
        "file",
        &[
            "read",
            "write",
            "append",
            "getattr",
            "execute",
            "execute_no_trans",
            "entrypoint",
        ],
        None,
    )
    .unwrap();
    b.class(
        "process",
        &["transition", "dyntransition", "setexec", "setcurrent", "sigchld"],
        None,
    )
    .unwrap();

    b.attribute("domain").unwrap();
    b.attribute("exec_type").unwrap();
    for domain in ["init_t", "sshd_t", "user_t", "passwd_t"] {
        b.type_(domain, &["domain"]).unwrap();
    }
    for exec in ["sshd_exec_t", "passwd_exec_t"] {
        b.type_(exec, &["exec_type"]).unwrap();
    }
    for file in ["shadow_t", "etc_t", "user_home_t"] {
        b.type_(file, &[]).unwrap();
    }

    b.allow("user_t", "user_home_t", "file", &["read", "write"]).unwrap();
    b.allow("passwd_t", "shadow_t", "file", &["read", "write"]).unwrap();
    b.allow("domain", "etc_t", "file", &["read", "getattr"]).unwrap();

    b.allow("init_t", "sshd_t", "process", &["transition"]).unwrap();
    b.allow("init_t", "sshd_exec_t", "file", &["execute"]).unwrap();
    b.allow("sshd_t", "sshd_exec_t", "file", &["entrypoint"]).unwrap();
    b.type_transition("init_t", "sshd_exec_t", "process", "sshd_t", None)
        .unwrap();

    b.allow("sshd_t", "user_t", "process", &["dyntransition"]).unwrap();
    b.allow("sshd_t", "sshd_t", "process", &["setcurrent"]).unwrap();

    b.allow("user_t", "passwd_t", "process", &["transition"]).unwrap();
    b.allow("user_t", "passwd_exec_t", "file", &["execute"]).unwrap();
    b.allow("passwd_t", "passwd_exec_t", "file", &["entrypoint"]).unwrap();
    b.type_transition("user_t", "passwd_exec_t", "process", "passwd_t", None)
        .unwrap();

    b
}
