//! Integration tests for the experiment pipeline
//!
//! These tests write small datasets shaped like the real exports (mixed
//! delimiters, divergent header labels) into a temp directory and run the
//! pipeline offline against them, both through the library and the CLI.

use std::fs;
use std::path::Path;
use std::process::Command;

use abtest_metrics::config::ExperimentConfig;
use abtest_metrics::loader::{loader_for, LocalLoader};
use abtest_metrics::models::{ActiveUser, Group, GroupAssignment, PaymentEvent};
use abtest_metrics::pipeline::run_with_loader;
use abtest_metrics::{assemble, consolidate, reconcile, MetricsError};

const GROUPS: &str = "id;grp\n1489;B\n1627;A\n1768;B\n1783;B\n1794;A\n";
const GROUP_ADD: &str = "id,grp\n5694584,B\n5694830,B\n1627,A\n";
const ACTIVE: &str = "student_id\n1627\n1768\n1783\n5694584\n8888\n";
const CHECKS: &str = "student_id;rev\n1627;990.0\n1768;290.0\n1768;690.0\n1489;1900.0\n";

const CONFIG: &str = r#"
[loader]
offline = true

[sources.groups]
name = "groups"
fallback_path = "groups.csv"
delimiter = ";"

[sources.groups_supplemental]
name = "group_add"
fallback_path = "group_add.csv"
delimiter = ","

[sources.active]
name = "active_studs"
fallback_path = "active_studs.csv"
delimiter = ","

[sources.payments]
name = "checks"
fallback_path = "checks.csv"
delimiter = ";"
"#;

fn write_fixture(dir: &Path) {
    fs::write(dir.join("groups.csv"), GROUPS).expect("write groups");
    fs::write(dir.join("group_add.csv"), GROUP_ADD).expect("write group_add");
    fs::write(dir.join("active_studs.csv"), ACTIVE).expect("write active");
    fs::write(dir.join("checks.csv"), CHECKS).expect("write checks");
    fs::write(dir.join("experiment.toml"), CONFIG).expect("write config");
}

#[test]
fn test_offline_run_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    let config = ExperimentConfig::from_file(&dir.path().join("experiment.toml")).unwrap();
    let loader = loader_for(&config.loader).unwrap();
    let report = run_with_loader(loader.as_ref(), &config).unwrap();

    // 5 primary + 3 supplemental, one exact duplicate (1627, A)
    assert_eq!(report.counts.reconciled_assignments, 7);
    // 1768 has two payments; 8888 has no group
    assert_eq!(report.counts.records, 6);
    assert_eq!(report.counts.unassigned_active_users, 1);
    assert!(report.ambiguous_identities.is_empty());

    let a = report.group(Group::A).unwrap();
    assert_eq!(a.user_count, 1);
    assert_eq!(a.converted_1_count, 1);
    assert_eq!(a.conversion_rate, Some(1.0));
    assert!((a.arpau.unwrap() - 990.0).abs() < 1e-9);

    let b = report.group(Group::B).unwrap();
    assert_eq!(b.user_count, 3);
    assert_eq!(b.paying_user_count, 1);
    assert_eq!(b.converted_0_count, 2);
    assert!((b.total_revenue - 980.0).abs() < 1e-9);
    assert!((b.conversion_rate.unwrap() - 1.0 / 3.0).abs() < 1e-9);
    assert!((b.arppu.unwrap() - 980.0).abs() < 1e-9);

    // 1489 paid but was not active
    assert!((report.total_revenue() - 1970.0).abs() < 1e-9);
}

#[test]
fn test_reshaped_supplemental_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    fs::write(dir.path().join("group_add.csv"), "id,grp,cohort\n5694584,B,2\n").unwrap();

    let config = ExperimentConfig::from_file(&dir.path().join("experiment.toml")).unwrap();
    let err = run_with_loader(&LocalLoader, &config).unwrap_err();
    assert_eq!(
        err,
        MetricsError::SchemaMismatch {
            table: "group_add".into(),
            expected: 2,
            found: 3,
        }
    );
}

#[test]
fn test_join_completeness_without_payments() {
    let groups: Vec<GroupAssignment> = (0..20)
        .filter(|i| i % 3 != 0)
        .map(|i| GroupAssignment::new(i.to_string(), if i % 2 == 0 { Group::A } else { Group::B }))
        .collect();
    let active: Vec<ActiveUser> = (0..25).map(|i| ActiveUser::new(i.to_string())).collect();

    let records = assemble(&reconcile(&groups, &[]), &active, &[]);
    assert_eq!(records.len(), active.len());
    assert!(records.iter().all(|r| r.revenue == 0.0 && r.converted == 0));
}

#[test]
fn test_revenue_conservation() {
    let groups: Vec<GroupAssignment> = (0..30)
        .map(|i| GroupAssignment::new(i.to_string(), if i % 2 == 0 { Group::A } else { Group::B }))
        .collect();
    let active: Vec<ActiveUser> = (0..30)
        .filter(|i| i % 4 != 1)
        .map(|i| ActiveUser::new(i.to_string()))
        .collect();
    let payments: Vec<PaymentEvent> = (0..60)
        .filter(|i| i % 5 != 0)
        .map(|i| PaymentEvent::new((i % 30).to_string(), 10.0 * (i + 1) as f64))
        .collect();

    let expected: f64 = payments
        .iter()
        .filter(|p| active.iter().any(|a| a.user_id == p.user_id))
        .filter_map(|p| p.revenue)
        .sum();

    let records = assemble(&reconcile(&groups, &[]), &active, &payments);
    for record in &records {
        assert_eq!(record.converted == 1, record.revenue > 0.0);
    }

    let metrics = consolidate(&records).unwrap();
    let total: f64 = metrics.iter().map(|m| m.total_revenue).sum();
    assert!((total - expected).abs() < 1e-6);

    for m in &metrics {
        let rate = m.conversion_rate.unwrap();
        assert!((0.0..=1.0).contains(&rate));
        assert_eq!(m.converted_0_count + m.converted_1_count, m.user_count);
    }
}

#[test]
fn test_cli_json_output() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    let output = Command::new(env!("CARGO_BIN_EXE_abtest-metrics"))
        .arg("--config")
        .arg(dir.path().join("experiment.toml"))
        .args(["--offline", "--format", "json"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run abtest-metrics");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let metrics = json["metrics"].as_array().unwrap();
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0]["group"], "A");
    assert_eq!(metrics[1]["paying_user_count"], 1);
    assert!(json["uplift"].is_object());
}

#[test]
fn test_cli_strict_mode_fails_on_missing_group() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    fs::write(dir.path().join("active_studs.csv"), "student_id\n1768\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_abtest-metrics"))
        .arg("--config")
        .arg(dir.path().join("experiment.toml"))
        .arg("--strict")
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run abtest-metrics");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("group A has no active users"));
}
