use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use slvs_core::record::Record;
use slvs_core::sketch::{ConstraintDefinition, EntityDefinition};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait SketchLoader {
    fn load(&self, path: &Path) -> Result<ParsedSketch, IoError>;
}

/// `.slvs` 文件读取入口。按字节读取后做 UTF-8 解码，非法字节直接丢弃，
/// 解析本身不会失败。
#[derive(Debug, Default, Clone, Copy)]
pub struct SlvsFacade;

impl SlvsFacade {
    pub fn new() -> Self {
        Self
    }
}

impl SketchLoader for SlvsFacade {
    fn load(&self, path: &Path) -> Result<ParsedSketch, IoError> {
        let bytes = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let content = decode_dropping_invalid(&bytes);
        let sketch = parse_str(&content);
        debug!(
            path = %path.display(),
            entities = sketch.entities.len(),
            constraints = sketch.constraints.len(),
            "已读取草图文件"
        );
        Ok(sketch)
    }
}

/// 解析过程中各类行的计数。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    pub lines: usize,
    pub blank: usize,
    pub assignments: usize,
    pub ignored: usize,
    pub unknown: usize,
    /// `AddEntity`/`AddConstraint` 时草稿记录里没有对应子树，未产生定义。
    pub empty_snapshots: usize,
}

/// 一次解析的结果：按文件顺序排列的实体与约束定义。
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSketch {
    pub entities: Vec<EntityDefinition>,
    pub constraints: Vec<ConstraintDefinition>,
    pub stats: ParseStats,
}

/// 按 UTF-8 解码，跳过非法字节而不是替换成 U+FFFD。
pub fn decode_dropping_invalid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

pub fn parse_str(source: &str) -> ParsedSketch {
    SlvsParser::new(source).parse()
}

const VERSION_MARKER: &str = "SolveSpaceREVa";

const IGNORED_DIRECTIVES: &[&str] = &[
    "AddGroup",
    "AddParam",
    "AddRequest",
    "AddStyle",
    "AddSurface",
    "AddCurve",
];

const MESH_PREFIXES: &[&str] = &[
    "Triangle ",
    "Surface ",
    "SCtrl ",
    "TrimBy ",
    "Curve ",
    "CCtrl ",
    "CurvePt ",
];

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Blank,
    Assignment { key: &'a str, value: &'a str },
    AddEntity,
    AddConstraint,
    Ignored,
    Unknown,
}

impl<'a> Line<'a> {
    fn classify(raw: &'a str) -> Self {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.is_empty() {
            return Line::Blank;
        }
        if let Some((key, value)) = line.split_once('=') {
            return Line::Assignment { key, value };
        }
        match line {
            "AddEntity" => Line::AddEntity,
            "AddConstraint" => Line::AddConstraint,
            _ if IGNORED_DIRECTIVES.contains(&line)
                || line.ends_with(VERSION_MARKER)
                || MESH_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) =>
            {
                Line::Ignored
            }
            _ => Line::Unknown,
        }
    }
}

struct SlvsParser<'a> {
    lines: std::str::Lines<'a>,
    scratch: Record,
    sketch: ParsedSketch,
}

impl<'a> SlvsParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            scratch: Record::new(),
            sketch: ParsedSketch::default(),
        }
    }

    fn parse(mut self) -> ParsedSketch {
        while let Some(raw) = self.lines.next() {
            self.sketch.stats.lines += 1;
            match Line::classify(raw) {
                Line::Blank => self.sketch.stats.blank += 1,
                Line::Assignment { key, value } => {
                    self.sketch.stats.assignments += 1;
                    self.scratch.insert_path(key.split('.'), value);
                }
                Line::AddEntity => {
                    if let Some(record) = self.snapshot("Entity") {
                        self.sketch
                            .entities
                            .push(EntityDefinition::from_record(record));
                    }
                }
                Line::AddConstraint => {
                    if let Some(record) = self.snapshot("Constraint") {
                        self.sketch
                            .constraints
                            .push(ConstraintDefinition::from_record(record));
                    }
                }
                Line::Ignored => self.sketch.stats.ignored += 1,
                Line::Unknown => self.sketch.stats.unknown += 1,
            }
        }
        self.sketch
    }

    /// 取出指定子树并清空草稿记录。
    fn snapshot(&mut self, key: &str) -> Option<Record> {
        let record = self.scratch.take_subtree(key);
        self.scratch.clear();
        if record.is_none() {
            self.sketch.stats.empty_snapshots += 1;
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slvs_core::sketch::{ConstraintKind, EntityKind};

    #[test]
    fn invalid_bytes_are_dropped_when_decoding() {
        assert_eq!(decode_dropping_invalid(b"0001\xff0000"), "00010000");
        assert_eq!(decode_dropping_invalid(b"\xfe\xfd"), "");
        assert_eq!(
            decode_dropping_invalid(b"\xb1\xb2\xb3SolveSpaceREVa"),
            "SolveSpaceREVa"
        );
        assert_eq!(decode_dropping_invalid("\u{b1}ok".as_bytes()), "\u{b1}ok");
    }

    #[test]
    fn classifies_lines() {
        assert_eq!(Line::classify(""), Line::Blank);
        assert_eq!(Line::classify("\r"), Line::Blank);
        assert_eq!(
            Line::classify("Entity.h.v=00010000\r"),
            Line::Assignment {
                key: "Entity.h.v",
                value: "00010000"
            }
        );
        assert_eq!(
            Line::classify("Group.name=a=b"),
            Line::Assignment {
                key: "Group.name",
                value: "a=b"
            }
        );
        assert_eq!(Line::classify("AddEntity"), Line::AddEntity);
        assert_eq!(Line::classify("AddConstraint\r"), Line::AddConstraint);
        assert_eq!(Line::classify("AddParam"), Line::Ignored);
        assert_eq!(Line::classify("\u{b1}\u{b2}\u{b3}SolveSpaceREVa"), Line::Ignored);
        assert_eq!(Line::classify("Triangle 00000000 ..."), Line::Ignored);
        assert_eq!(Line::classify("CurvePt 1 0 0 0"), Line::Ignored);
        assert_eq!(Line::classify("}"), Line::Unknown);
        assert_eq!(Line::classify("Triangle"), Line::Unknown);
    }

    #[test]
    fn groups_assignments_into_definitions() {
        let source = "\
Entity.h.v=00010001
Entity.type=2000
Entity.actPoint.x=1.5
AddEntity

Constraint.h.v=00000001
Constraint.type=30
Constraint.valA=1.0
AddConstraint
";
        let sketch = parse_str(source);
        assert_eq!(sketch.entities.len(), 1);
        assert_eq!(sketch.constraints.len(), 1);

        let entity = &sketch.entities[0];
        assert_eq!(entity.id, "00010001");
        assert_eq!(entity.kind, EntityKind::PointIn3d);
        assert!((entity.act_point().x() - 1.5).abs() < 1e-9);

        let constraint = &sketch.constraints[0];
        assert_eq!(constraint.kind, ConstraintKind::PtPtDistance);
        assert!((constraint.value() - 1.0).abs() < 1e-9);

        assert_eq!(sketch.stats.lines, 9);
        assert_eq!(sketch.stats.assignments, 6);
        assert_eq!(sketch.stats.blank, 1);
    }

    #[test]
    fn directive_clears_unrelated_scratch_state() {
        let source = "\
Param.h.v.=00010010
Param.val=3.0
Entity.h.v=00010000
Entity.type=10000
AddEntity
Entity.type=2000
AddConstraint
Entity.h.v=00020000
AddEntity
";
        let sketch = parse_str(source);
        assert_eq!(sketch.entities.len(), 2);
        assert_eq!(sketch.entities[0].id, "00010000");
        // `AddConstraint` 清空了前面的 `Entity.type`
        assert_eq!(sketch.entities[1].id, "00020000");
        assert_eq!(sketch.entities[1].kind, EntityKind::Other(0));
        assert!(sketch.entities[0].record.get("Param").is_none());
        assert!(sketch.constraints.is_empty());
        assert_eq!(sketch.stats.empty_snapshots, 1);
    }

    #[test]
    fn ignored_directives_keep_scratch_state() {
        let source = "\
Entity.h.v=00030000
AddParam
Triangle 1 2 3
Entity.type=11000
AddEntity
";
        let sketch = parse_str(source);
        assert_eq!(sketch.entities.len(), 1);
        assert_eq!(sketch.entities[0].kind, EntityKind::LineSegment);
        assert_eq!(sketch.stats.ignored, 2);
    }

    #[test]
    fn unknown_lines_are_counted_not_fatal() {
        let sketch = parse_str("garbage\n}\nAddEntity\n");
        assert!(sketch.entities.is_empty());
        assert_eq!(sketch.stats.unknown, 2);
        assert_eq!(sketch.stats.empty_snapshots, 1);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("missing.slvs");
        let err = SlvsFacade::new().load(&path).unwrap_err();
        assert!(matches!(err, IoError::ReadError { .. }));
        assert!(err.to_string().contains("missing.slvs"));
    }
}
