use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;
use slvs_core::system::{Handle, SketchSystem};
use slvs_engine::pipeline::LoadedSketch;

/// 一次加载的汇总信息，可渲染为文本或序列化为 JSON。
#[derive(Debug, Serialize)]
pub struct LoadReport {
    pub file: String,
    pub entities: usize,
    pub constraints: usize,
    pub group: u32,
    pub entity_kinds: BTreeMap<&'static str, usize>,
    pub constraint_kinds: BTreeMap<&'static str, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_list: Option<Vec<EntityRow>>,
}

#[derive(Debug, Serialize)]
pub struct EntityRow {
    pub handle: u32,
    pub id: String,
    pub kind: &'static str,
    pub group: u32,
    pub params: Vec<f64>,
}

impl LoadReport {
    pub fn new(file: &Path, loaded: &LoadedSketch<SketchSystem>, show_entities: bool) -> Self {
        let system = &loaded.system;

        let mut entity_kinds = BTreeMap::new();
        for stored in system.entities() {
            *entity_kinds.entry(stored.entity.name()).or_insert(0) += 1;
        }
        let mut constraint_kinds = BTreeMap::new();
        for stored in system.constraints() {
            *constraint_kinds.entry(stored.constraint.name()).or_insert(0) += 1;
        }

        let entity_list = show_entities.then(|| {
            let ids: HashMap<Handle, &str> = loaded
                .entities
                .iter()
                .map(|(id, handle)| (*handle, id.as_str()))
                .collect();
            system
                .entities()
                .map(|stored| EntityRow {
                    handle: stored.handle.get(),
                    id: ids.get(&stored.handle).copied().unwrap_or_default().to_string(),
                    kind: stored.entity.name(),
                    group: stored.group,
                    params: stored.entity.params(),
                })
                .collect()
        });

        Self {
            file: file.display().to_string(),
            entities: system.entity_count(),
            constraints: system.constraint_count(),
            group: loaded.group,
            entity_kinds,
            constraint_kinds,
            entity_list,
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "file: {}", self.file);
        let _ = writeln!(out, "entities: {}", self.entities);
        let _ = writeln!(out, "constraints: {}", self.constraints);
        let _ = writeln!(out, "group: {}", self.group);

        let _ = writeln!(out, "entity kinds:");
        for (kind, count) in &self.entity_kinds {
            let _ = writeln!(out, "  {kind}: {count}");
        }
        let _ = writeln!(out, "constraint kinds:");
        for (kind, count) in &self.constraint_kinds {
            let _ = writeln!(out, "  {kind}: {count}");
        }

        if let Some(rows) = &self.entity_list {
            let _ = writeln!(out, "entity list:");
            for row in rows {
                let params = row
                    .params
                    .iter()
                    .map(|value| value.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(
                    out,
                    "  #{} {} {} group={} [{}]",
                    row.handle, row.id, row.kind, row.group, params
                );
            }
        }

        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use slvs_engine::pipeline::load_sketch;

    use super::*;

    const SKETCH: &str = "\
Entity.h.v=00010000
Entity.type=10000
Entity.point[0].v=00010001
Entity.normal.v=00010020
AddEntity

Entity.h.v=00010001
Entity.type=2000
Entity.actPoint.x=1.5
AddEntity

Entity.h.v=00010020
Entity.type=3000
Entity.actNormal.w=1.0
AddEntity

Constraint.h.v=00000001
Constraint.type=200
Constraint.ptA.v=00010001
Constraint.workplane.v=00010000
AddConstraint
";

    #[test]
    fn counts_kinds_and_lists_entities_in_handle_order() {
        let loaded = load_sketch(SKETCH).expect("加载示例草图失败");
        let report = LoadReport::new(Path::new("demo.slvs"), &loaded, true);

        assert_eq!(report.entities, 3);
        assert_eq!(report.constraints, 1);
        assert_eq!(report.group, 1);
        assert_eq!(report.entity_kinds.get("workplane"), Some(&1));
        assert_eq!(report.constraint_kinds.get("where-dragged"), Some(&1));

        let rows = report.entity_list.as_ref().expect("实体列表");
        let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["00010001", "00010020", "00010000"]);
        assert_eq!(rows[0].params, vec![1.5, 0.0, 0.0]);

        let text = report.render_text();
        assert!(text.starts_with("file: demo.slvs\nentities: 3\nconstraints: 1\ngroup: 1"));
        assert!(text.contains("  #1 00010001 point-3d group=0 [1.5, 0, 0]"));
    }

    #[test]
    fn entity_list_is_omitted_from_json_unless_requested() {
        let loaded = load_sketch(SKETCH).expect("加载示例草图失败");
        let report = LoadReport::new(Path::new("demo.slvs"), &loaded, false);
        let json = serde_json::to_value(&report).expect("序列化报告失败");
        assert!(json.get("entity_list").is_none());
        assert_eq!(json["entity_kinds"]["normal-3d"], serde_json::json!(1));
        assert!(!report.render_text().contains("entity list:"));
    }
}
