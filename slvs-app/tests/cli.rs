use std::io::Write;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

fn slvs_app() -> Command {
    let mut cmd = Command::cargo_bin("slvs-app").expect("找不到 slvs-app 可执行文件");
    cmd.env_remove("SLVS_CONFIG");
    cmd
}

#[test]
fn prints_text_report() {
    slvs_app()
        .arg(fixture("slot_sketch.slvs"))
        .assert()
        .success()
        .stdout(predicate::str::contains("entities: 13"))
        .stdout(predicate::str::contains("constraints: 4"))
        .stdout(predicate::str::contains("group: 2"))
        .stdout(predicate::str::contains("  line-2d: 1"))
        .stdout(predicate::str::contains("entity list:").not());
}

#[test]
fn prints_json_report_with_entities() {
    let output = slvs_app()
        .arg(fixture("slot_sketch.slvs"))
        .args(["--format", "json", "--entities"])
        .output()
        .expect("运行 slvs-app 失败");
    assert!(output.status.success());

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("输出应为 JSON");
    assert_eq!(report["entities"], serde_json::json!(13));
    assert_eq!(report["constraint_kinds"]["diameter"], serde_json::json!(1));

    let rows = report["entity_list"].as_array().expect("实体列表");
    let radius = rows
        .iter()
        .find(|row| row["id"] == "00050040")
        .expect("未找到半径实体");
    assert_eq!(radius["params"], serde_json::json!([7.5]));
}

#[test]
fn config_file_selects_json_output() {
    let mut config = tempfile::NamedTempFile::new().expect("创建临时配置失败");
    writeln!(config, "[logging]\nlevel = \"warn\"\n\n[report]\nformat = \"json\"").unwrap();

    slvs_app()
        .arg(fixture("slot_sketch.slvs"))
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{"))
        .stdout(predicate::str::contains("\"group\": 2"));
}

#[test]
fn env_config_is_discovered_and_flags_override_it() {
    let mut config = tempfile::NamedTempFile::new().expect("创建临时配置失败");
    writeln!(config, "[report]\nformat = \"json\"").unwrap();

    slvs_app()
        .env("SLVS_CONFIG", config.path())
        .arg(fixture("slot_sketch.slvs"))
        .args(["--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("file: "));
}

#[test]
fn missing_file_fails_with_context() {
    slvs_app()
        .arg(fixture("missing.slvs"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("加载草图"))
        .stderr(predicate::str::contains("missing.slvs"));
}

#[test]
fn unsupported_constraint_fails_the_load() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("unknown_constraint.slvs");
    std::fs::write(
        &path,
        "Entity.h.v=00010001\nEntity.type=2000\nAddEntity\n\n\
         Constraint.h.v=00000001\nConstraint.type=999\nAddConstraint\n",
    )
    .expect("写入临时草图失败");

    slvs_app()
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported type 999"));
}

#[test]
fn invalid_config_warns_on_stderr_and_falls_back() {
    let mut config = tempfile::NamedTempFile::new().expect("创建临时配置失败");
    writeln!(config, "[report\nformat = ").unwrap();

    slvs_app()
        .arg(fixture("slot_sketch.slvs"))
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("file: "))
        .stderr(predicate::str::contains("加载指定配置失败，使用默认配置"));
}
