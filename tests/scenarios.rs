use anyhow::Result;
use authz_tests::{PolicyFixture, SECRET, shipped_policy_path};
use platform_authz::{
    AuthzError, PolicyConfig, RequestDescriptor, Role, RoleHierarchy, UNKNOWN_ROLE_LEVEL,
};

const BASE_POLICY: &str = r#"
default_role = "READER"
admin_role = "ADMIN"

[roles_hierarchy]
PUBLIC = 0
READER = 10
EDITOR = 20
ADMIN = 30
SUPERADMIN = 40

[endpoints.documents.insert]
path = "/api/documents"
method = "POST"
required_role = "ADMIN"

[endpoints.documents.find]
path = "/api/documents/find"
method = "GET"
required_role = "READER"
"#;

#[test]
fn anonymous_caller_reads_unlisted_endpoint() {
    let fixture = PolicyFixture::new(BASE_POLICY);
    let gate = fixture.gatekeeper();

    let request = RequestDescriptor::new("/api/documents", "GET");
    let role = gate.resolve_role(&request);
    assert_eq!(role, Role::Reader);
    assert!(gate.enforcer().check(&role, "/api/documents", "GET"));
}

#[test]
fn admin_rule_denies_reader_and_admits_admin() {
    let fixture = PolicyFixture::new(BASE_POLICY);
    let gate = fixture.gatekeeper();

    let denied = gate.enforce(&Role::Reader, "/api/documents", "POST");
    let err = denied.expect_err("reader must be denied");
    assert_eq!(
        err,
        AuthzError::Denied {
            required: Role::Admin
        }
    );
    assert_eq!(err.status_code(), 403);
    assert!(err.to_string().contains("ADMIN"));

    assert!(gate.enforce(&Role::Admin, "/api/documents", "POST").is_ok());
}

#[test]
fn bearer_secret_selects_admin_or_default() {
    let fixture = PolicyFixture::new(BASE_POLICY);
    let gate = fixture.gatekeeper();

    let good = RequestDescriptor::new("/api/documents", "POST").with_bearer(SECRET);
    assert_eq!(gate.resolve_role(&good), Role::Admin);
    assert_eq!(gate.authorize(&good), Ok(Role::Admin));

    let bad = RequestDescriptor::new("/api/documents", "POST").with_bearer("not-the-key");
    assert_eq!(gate.resolve_role(&bad), Role::Reader);
    assert!(gate.authorize(&bad).is_err());

    let basic = RequestDescriptor::new("/api/documents", "POST")
        .with_auth_header(format!("Basic {SECRET}"));
    assert_eq!(gate.resolve_role(&basic), Role::Reader);
}

#[test]
fn missing_or_corrupt_source_yields_builtin_policy() {
    let fixture = PolicyFixture::new(BASE_POLICY);
    let store = fixture.store();
    assert_eq!(store.snapshot().rule_count(), 2);

    fixture.remove();
    let after_delete = store.reload();
    assert_eq!(*after_delete, PolicyConfig::builtin());
    assert_eq!(after_delete.default_role(), &Role::Reader);
    assert_eq!(after_delete.admin_role(), &Role::Admin);
    assert_eq!(after_delete.hierarchy(), &RoleHierarchy::default());
    assert_eq!(after_delete.rule_count(), 0);

    fixture.write("[endpoints\npath = ");
    assert_eq!(*store.reload(), PolicyConfig::builtin());
}

#[test]
fn method_matching_ignores_case() {
    let fixture = PolicyFixture::new(BASE_POLICY);
    let store = fixture.store();
    assert_eq!(store.required_role_for("/api/documents", "post"), Role::Admin);
    assert_eq!(
        store.required_role_for("/api/documents/find", "get"),
        Role::Reader
    );
}

#[test]
fn unmatched_endpoints_require_default_role() {
    let fixture = PolicyFixture::new(&BASE_POLICY.replace(
        "default_role = \"READER\"",
        "default_role = \"EDITOR\"",
    ));
    let store = fixture.store();
    for (path, method) in [
        ("/api/unknown", "GET"),
        ("/api/documents", "PATCH"),
        ("/api/documents/", "POST"),
    ] {
        assert_eq!(store.required_role_for(path, method), Role::Editor);
    }
}

#[test]
fn reload_twice_is_idempotent() {
    let fixture = PolicyFixture::new(BASE_POLICY);
    let store = fixture.store();
    let first = store.reload();
    let second = store.reload();
    assert_eq!(first, second);
}

#[test]
fn hierarchy_changes_apply_after_reload() {
    let fixture = PolicyFixture::new(BASE_POLICY);
    let gate = fixture.gatekeeper();
    assert!(!gate.enforcer().check(&Role::Editor, "/api/documents", "POST"));

    fixture.write(&BASE_POLICY.replace("EDITOR = 20", "EDITOR = 35"));
    gate.policy().reload();
    assert!(gate.enforcer().check(&Role::Editor, "/api/documents", "POST"));
}

#[test]
fn unknown_roles_never_fail() {
    let fixture = PolicyFixture::new(&format!(
        "{BASE_POLICY}\n[endpoints.reports.export]\npath = \"/api/reports\"\nmethod = \"GET\"\nrequired_role = \"AUDITOR\"\n"
    ));
    let gate = fixture.gatekeeper();
    let auditor = Role::parse("AUDITOR");
    let snapshot = gate.policy().snapshot();
    assert_eq!(snapshot.hierarchy().level_of(&auditor), UNKNOWN_ROLE_LEVEL);
    // AUDITOR ranks as level 0, so anyone meets it.
    assert!(gate.enforcer().check(&Role::Public, "/api/reports", "GET"));
    assert!(!gate.enforcer().check(&auditor, "/api/documents/find", "GET"));
}

#[test]
fn fixed_threshold_ignores_policy_table() {
    let fixture = PolicyFixture::new(BASE_POLICY);
    let gate = fixture.gatekeeper();
    assert!(gate.require_at_least(&Role::Admin, &Role::Admin).is_ok());
    assert_eq!(
        gate.require_at_least(&Role::Editor, &Role::Admin),
        Err(AuthzError::Denied {
            required: Role::Admin
        })
    );
    assert!(gate.require_admin(&Role::Superadmin).is_ok());
}

#[test]
fn shipped_policy_is_valid() -> Result<()> {
    let policy = PolicyConfig::from_path(shipped_policy_path())?;
    assert_eq!(policy.default_role(), &Role::Reader);
    assert_eq!(policy.admin_role(), &Role::Admin);
    assert_eq!(
        policy.required_role_for("/api/collections", "DELETE"),
        &Role::Superadmin
    );
    for rule in policy.rules() {
        assert!(
            policy.hierarchy().contains(&rule.required_role),
            "{}.{} references an unranked role",
            rule.category,
            rule.name
        );
    }
    Ok(())
}

#[test]
fn one_malformed_rule_keeps_the_rest_enforced() {
    let fixture = PolicyFixture::new(&format!(
        "{BASE_POLICY}
[endpoints.collections.drop]
path = \"/api/collections\"
method = \"DELETE\"
required_role = \"SUPERADMIN\"

[endpoints.misc.typo]
path = \"/api/misc\"
"
    ));
    let gate = fixture.gatekeeper();
    assert_eq!(gate.policy().snapshot().rule_count(), 3);

    let anonymous = RequestDescriptor::new("/api/collections", "DELETE");
    assert_eq!(
        gate.authorize(&anonymous),
        Err(AuthzError::Denied {
            required: Role::Superadmin
        })
    );
    let admin = RequestDescriptor::new("/api/documents", "POST").with_bearer(SECRET);
    assert_eq!(gate.authorize(&admin), Ok(Role::Admin));
}
