
use std::path::PathBuf;

use golden::assert_golden;
use slvs_core::sketch::{ConstraintKind, EntityKind};
use slvs_io::{SketchLoader, SlvsFacade};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

#[test]
fn load_reference_workplane_matches_golden() {
    let sketch = SlvsFacade::new()
        .load(&fixture("reference_workplane.slvs"))
        .expect("读取参考工作平面失败");
    assert_golden("reference_workplane", &sketch);
}

#[test]
fn load_sketch_with_crlf_and_latin1_header() {
    let sketch = SlvsFacade::new()
        .load(&fixture("slot_sketch.slvs"))
        .expect("读取草图失败");

    assert_eq!(sketch.entities.len(), 13);
    assert_eq!(sketch.constraints.len(), 4);

    let ids: Vec<&str> = sketch.entities.iter().map(|entity| entity.id.as_str()).collect();
    assert_eq!(ids.first(), Some(&"00010000"));
    assert_eq!(ids.last(), Some(&"80020002"));
    // 行尾的 `\r` 不应残留在值中
    assert!(ids.iter().all(|id| !id.ends_with('\r')));

    let kinds: Vec<ConstraintKind> = sketch.constraints.iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ConstraintKind::Horizontal,
            ConstraintKind::PtPtDistance,
            ConstraintKind::Diameter,
            ConstraintKind::WhereDragged,
        ]
    );

    let stats = sketch.stats;
    assert_eq!(stats.lines, 234);
    assert_eq!(stats.blank, 29);
    assert_eq!(stats.assignments, 173);
    assert_eq!(stats.ignored, 13);
    assert_eq!(stats.unknown, 2);
    assert_eq!(stats.empty_snapshots, 0);
}

#[test]
fn load_sketch_exposes_entity_fields() {
    let sketch = SlvsFacade::new()
        .load(&fixture("slot_sketch.slvs"))
        .expect("读取草图失败");

    let circle = sketch
        .entities
        .iter()
        .find(|entity| entity.id == "00050000")
        .expect("未找到圆实体");
    assert_eq!(circle.kind, EntityKind::Circle);
    assert_eq!(circle.reference("point[0]"), Some("00050001"));
    assert_eq!(circle.reference("distance"), Some("00050040"));
    assert_eq!(circle.reference("workplane"), Some("80020000"));

    let radius = sketch
        .entities
        .iter()
        .find(|entity| entity.id == "00050040")
        .expect("未找到半径实体");
    assert!((radius.act_distance() - 7.5).abs() < 1e-9);

    let point = sketch
        .entities
        .iter()
        .find(|entity| entity.id == "00040002")
        .expect("未找到端点");
    assert_eq!(point.kind, EntityKind::PointIn2d);
    assert!((point.act_point().x() - 40.0).abs() < 1e-9);
    assert!((point.act_point().y() - 5.0).abs() < 1e-9);

    let distance = &sketch.constraints[1];
    assert!((distance.value() - 30.0).abs() < 1e-9);
    assert!(!distance.inverse());
    assert_eq!(distance.reference("ptB"), Some("00040002"));
}

#[test]
fn load_drops_invalid_bytes_from_temp_file() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("broken.slvs");
    let mut bytes = b"Entity.h.v=0001\xff0000\nEntity.type=2000\nAddEntity\n".to_vec();
    bytes.extend_from_slice(b"\xfe\xfd\n");
    std::fs::write(&path, &bytes).expect("写入临时文件失败");

    let sketch = SlvsFacade::new().load(&path).expect("非法字节不应导致失败");
    assert_eq!(sketch.entities.len(), 1);
    assert_eq!(sketch.entities[0].id, "00010000");
    assert_eq!(sketch.stats.unknown, 0);
    assert_eq!(sketch.stats.blank, 1);
}
