pub mod geometry {
    use glam::{DQuat, DVec2, DVec3};
    use serde::{Deserialize, Serialize};

    /// 工作平面内的二维点 (u, v)，内部以 `glam::DVec2` 表示。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(u: f64, v: f64) -> Self {
            Self(DVec2::new(u, v))
        }

        #[inline]
        pub fn u(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn v(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 三维点。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 法向四元数，分量按求解器的 (w, x, y, z) 顺序对外暴露。不做归一化，
    /// 原样交给求解器。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Quaternion(pub DQuat);

    impl Quaternion {
        #[inline]
        pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
            Self(DQuat::from_xyzw(x, y, z, w))
        }

        #[inline]
        pub fn w(self) -> f64 {
            self.0.w
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn components(self) -> [f64; 4] {
            [self.w(), self.x(), self.y(), self.z()]
        }
    }
}

pub mod record {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    /// 记录树中的节点：叶子保存原始字符串，中间节点为嵌套映射。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum RecordValue {
        Scalar(String),
        Nested(Record),
    }

    impl RecordValue {
        #[inline]
        pub fn as_scalar(&self) -> Option<&str> {
            match self {
                RecordValue::Scalar(value) => Some(value),
                RecordValue::Nested(_) => None,
            }
        }

        #[inline]
        pub fn as_record(&self) -> Option<&Record> {
            match self {
                RecordValue::Nested(record) => Some(record),
                RecordValue::Scalar(_) => None,
            }
        }
    }

    /// 由 `a.b.c=value` 赋值行逐步累积出的嵌套记录。
    ///
    /// 键按字典序保存，便于序列化输出稳定。
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Record {
        fields: BTreeMap<String, RecordValue>,
    }

    impl Record {
        #[inline]
        pub fn new() -> Self {
            Self::default()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.fields.is_empty()
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.fields.len()
        }

        #[inline]
        pub fn clear(&mut self) {
            self.fields.clear();
        }

        /// 按路径写入标量。中间段不存在时创建映射；若中间段此前是标量，
        /// 则被替换为映射。空路径不产生任何效果。
        pub fn insert_path<'a, I>(&mut self, path: I, value: impl Into<String>)
        where
            I: IntoIterator<Item = &'a str>,
        {
            let mut segments = path.into_iter().peekable();
            let mut current = self;
            while let Some(segment) = segments.next() {
                if segments.peek().is_none() {
                    current
                        .fields
                        .insert(segment.to_string(), RecordValue::Scalar(value.into()));
                    return;
                }
                let slot = current
                    .fields
                    .entry(segment.to_string())
                    .or_insert_with(|| RecordValue::Nested(Record::new()));
                if let RecordValue::Scalar(_) = slot {
                    *slot = RecordValue::Nested(Record::new());
                }
                let RecordValue::Nested(next) = slot else {
                    return;
                };
                current = next;
            }
        }

        #[inline]
        pub fn get(&self, key: &str) -> Option<&RecordValue> {
            self.fields.get(key)
        }

        pub fn get_path<'a, I>(&self, path: I) -> Option<&RecordValue>
        where
            I: IntoIterator<Item = &'a str>,
        {
            let mut segments = path.into_iter();
            let first = segments.next()?;
            let mut value = self.fields.get(first)?;
            for segment in segments {
                value = value.as_record()?.fields.get(segment)?;
            }
            Some(value)
        }

        /// 读取路径上的标量；路径缺失或指向映射时返回 `None`。
        #[inline]
        pub fn scalar(&self, path: &[&str]) -> Option<&str> {
            self.get_path(path.iter().copied())
                .and_then(RecordValue::as_scalar)
        }

        #[inline]
        pub fn subtree(&self, key: &str) -> Option<&Record> {
            self.fields.get(key).and_then(RecordValue::as_record)
        }

        /// 取走指定键下的子树，键不存在或不是映射时返回 `None`。
        pub fn take_subtree(&mut self, key: &str) -> Option<Record> {
            match self.fields.remove(key)? {
                RecordValue::Nested(record) => Some(record),
                scalar @ RecordValue::Scalar(_) => {
                    self.fields.insert(key.to_string(), scalar);
                    None
                }
            }
        }

        #[inline]
        pub fn keys(&self) -> impl Iterator<Item = &str> {
            self.fields.keys().map(String::as_str)
        }
    }

}

pub mod sketch {
    use serde::{Deserialize, Serialize};

    use crate::geometry::{Point3, Quaternion};
    use crate::record::Record;

    /// 草图文件中出现的实体类型码。仅列出加载器能够构造的类型，其余
    /// 一律落入 `Other` 并在构造阶段报错。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(from = "i64", into = "i64")]
    pub enum EntityKind {
        PointIn3d,
        PointIn2d,
        PointCopy,
        NormalIn3d,
        NormalIn2d,
        NormalCopy,
        Distance,
        Workplane,
        LineSegment,
        Cubic,
        Circle,
        ArcOfCircle,
        Other(i64),
    }

    impl EntityKind {
        pub fn from_code(code: i64) -> Self {
            match code {
                2000 => EntityKind::PointIn3d,
                2001 => EntityKind::PointIn2d,
                2012 => EntityKind::PointCopy,
                3000 => EntityKind::NormalIn3d,
                3001 => EntityKind::NormalIn2d,
                3010 => EntityKind::NormalCopy,
                4000 => EntityKind::Distance,
                10000 => EntityKind::Workplane,
                11000 => EntityKind::LineSegment,
                12000 => EntityKind::Cubic,
                13000 => EntityKind::Circle,
                14000 => EntityKind::ArcOfCircle,
                other => EntityKind::Other(other),
            }
        }

        pub fn code(self) -> i64 {
            match self {
                EntityKind::PointIn3d => 2000,
                EntityKind::PointIn2d => 2001,
                EntityKind::PointCopy => 2012,
                EntityKind::NormalIn3d => 3000,
                EntityKind::NormalIn2d => 3001,
                EntityKind::NormalCopy => 3010,
                EntityKind::Distance => 4000,
                EntityKind::Workplane => 10000,
                EntityKind::LineSegment => 11000,
                EntityKind::Cubic => 12000,
                EntityKind::Circle => 13000,
                EntityKind::ArcOfCircle => 14000,
                EntityKind::Other(code) => code,
            }
        }

        pub fn name(self) -> &'static str {
            match self {
                EntityKind::PointIn3d => "point-in-3d",
                EntityKind::PointIn2d => "point-in-2d",
                EntityKind::PointCopy => "point-copy",
                EntityKind::NormalIn3d => "normal-in-3d",
                EntityKind::NormalIn2d => "normal-in-2d",
                EntityKind::NormalCopy => "normal-copy",
                EntityKind::Distance => "distance",
                EntityKind::Workplane => "workplane",
                EntityKind::LineSegment => "line-segment",
                EntityKind::Cubic => "cubic",
                EntityKind::Circle => "circle",
                EntityKind::ArcOfCircle => "arc-of-circle",
                EntityKind::Other(_) => "unknown",
            }
        }
    }

    impl From<i64> for EntityKind {
        fn from(code: i64) -> Self {
            Self::from_code(code)
        }
    }

    impl From<EntityKind> for i64 {
        fn from(kind: EntityKind) -> Self {
            kind.code()
        }
    }

    /// 约束类型码。除 `Unknown` 外的变体均为文件格式中有定义的类型，
    /// 其中一部分加载器尚未实现，见 [`ConstraintKind::is_implemented`]。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(from = "i64", into = "i64")]
    pub enum ConstraintKind {
        PointsCoincident,
        PtPtDistance,
        PtPlaneDistance,
        PtLineDistance,
        PtFaceDistance,
        ProjPtDistance,
        PtInPlane,
        PtOnLine,
        PtOnFace,
        EqualLengthLines,
        LengthRatio,
        EqLenPtLineD,
        EqPtLnDistances,
        EqualAngle,
        EqualLineArcLen,
        LengthDifference,
        Symmetric,
        SymmetricHoriz,
        SymmetricVert,
        SymmetricLine,
        AtMidpoint,
        Horizontal,
        Vertical,
        Diameter,
        PtOnCircle,
        SameOrientation,
        Angle,
        Parallel,
        Perpendicular,
        ArcLineTangent,
        CubicLineTangent,
        CurveCurveTangent,
        EqualRadius,
        WhereDragged,
        ArcArcLenRatio,
        ArcLineLenRatio,
        ArcArcDifference,
        ArcLineDifference,
        Comment,
        Unknown(i64),
    }

    impl ConstraintKind {
        pub fn from_code(code: i64) -> Self {
            match code {
                20 => ConstraintKind::PointsCoincident,
                30 => ConstraintKind::PtPtDistance,
                31 => ConstraintKind::PtPlaneDistance,
                32 => ConstraintKind::PtLineDistance,
                33 => ConstraintKind::PtFaceDistance,
                34 => ConstraintKind::ProjPtDistance,
                41 => ConstraintKind::PtInPlane,
                42 => ConstraintKind::PtOnLine,
                43 => ConstraintKind::PtOnFace,
                50 => ConstraintKind::EqualLengthLines,
                51 => ConstraintKind::LengthRatio,
                52 => ConstraintKind::EqLenPtLineD,
                53 => ConstraintKind::EqPtLnDistances,
                54 => ConstraintKind::EqualAngle,
                55 => ConstraintKind::EqualLineArcLen,
                56 => ConstraintKind::LengthDifference,
                60 => ConstraintKind::Symmetric,
                61 => ConstraintKind::SymmetricHoriz,
                62 => ConstraintKind::SymmetricVert,
                63 => ConstraintKind::SymmetricLine,
                70 => ConstraintKind::AtMidpoint,
                80 => ConstraintKind::Horizontal,
                81 => ConstraintKind::Vertical,
                90 => ConstraintKind::Diameter,
                100 => ConstraintKind::PtOnCircle,
                110 => ConstraintKind::SameOrientation,
                120 => ConstraintKind::Angle,
                121 => ConstraintKind::Parallel,
                122 => ConstraintKind::Perpendicular,
                123 => ConstraintKind::ArcLineTangent,
                124 => ConstraintKind::CubicLineTangent,
                125 => ConstraintKind::CurveCurveTangent,
                130 => ConstraintKind::EqualRadius,
                200 => ConstraintKind::WhereDragged,
                210 => ConstraintKind::ArcArcLenRatio,
                211 => ConstraintKind::ArcLineLenRatio,
                212 => ConstraintKind::ArcArcDifference,
                213 => ConstraintKind::ArcLineDifference,
                1000 => ConstraintKind::Comment,
                other => ConstraintKind::Unknown(other),
            }
        }

        pub fn code(self) -> i64 {
            match self {
                ConstraintKind::PointsCoincident => 20,
                ConstraintKind::PtPtDistance => 30,
                ConstraintKind::PtPlaneDistance => 31,
                ConstraintKind::PtLineDistance => 32,
                ConstraintKind::PtFaceDistance => 33,
                ConstraintKind::ProjPtDistance => 34,
                ConstraintKind::PtInPlane => 41,
                ConstraintKind::PtOnLine => 42,
                ConstraintKind::PtOnFace => 43,
                ConstraintKind::EqualLengthLines => 50,
                ConstraintKind::LengthRatio => 51,
                ConstraintKind::EqLenPtLineD => 52,
                ConstraintKind::EqPtLnDistances => 53,
                ConstraintKind::EqualAngle => 54,
                ConstraintKind::EqualLineArcLen => 55,
                ConstraintKind::LengthDifference => 56,
                ConstraintKind::Symmetric => 60,
                ConstraintKind::SymmetricHoriz => 61,
                ConstraintKind::SymmetricVert => 62,
                ConstraintKind::SymmetricLine => 63,
                ConstraintKind::AtMidpoint => 70,
                ConstraintKind::Horizontal => 80,
                ConstraintKind::Vertical => 81,
                ConstraintKind::Diameter => 90,
                ConstraintKind::PtOnCircle => 100,
                ConstraintKind::SameOrientation => 110,
                ConstraintKind::Angle => 120,
                ConstraintKind::Parallel => 121,
                ConstraintKind::Perpendicular => 122,
                ConstraintKind::ArcLineTangent => 123,
                ConstraintKind::CubicLineTangent => 124,
                ConstraintKind::CurveCurveTangent => 125,
                ConstraintKind::EqualRadius => 130,
                ConstraintKind::WhereDragged => 200,
                ConstraintKind::ArcArcLenRatio => 210,
                ConstraintKind::ArcLineLenRatio => 211,
                ConstraintKind::ArcArcDifference => 212,
                ConstraintKind::ArcLineDifference => 213,
                ConstraintKind::Comment => 1000,
                ConstraintKind::Unknown(code) => code,
            }
        }

        pub fn name(self) -> &'static str {
            match self {
                ConstraintKind::PointsCoincident => "points-coincident",
                ConstraintKind::PtPtDistance => "pt-pt-distance",
                ConstraintKind::PtPlaneDistance => "pt-plane-distance",
                ConstraintKind::PtLineDistance => "pt-line-distance",
                ConstraintKind::PtFaceDistance => "pt-face-distance",
                ConstraintKind::ProjPtDistance => "proj-pt-distance",
                ConstraintKind::PtInPlane => "pt-in-plane",
                ConstraintKind::PtOnLine => "pt-on-line",
                ConstraintKind::PtOnFace => "pt-on-face",
                ConstraintKind::EqualLengthLines => "equal-length-lines",
                ConstraintKind::LengthRatio => "length-ratio",
                ConstraintKind::EqLenPtLineD => "eq-len-pt-line-d",
                ConstraintKind::EqPtLnDistances => "eq-pt-ln-distances",
                ConstraintKind::EqualAngle => "equal-angle",
                ConstraintKind::EqualLineArcLen => "equal-line-arc-len",
                ConstraintKind::LengthDifference => "length-difference",
                ConstraintKind::Symmetric => "symmetric",
                ConstraintKind::SymmetricHoriz => "symmetric-horiz",
                ConstraintKind::SymmetricVert => "symmetric-vert",
                ConstraintKind::SymmetricLine => "symmetric-line",
                ConstraintKind::AtMidpoint => "at-midpoint",
                ConstraintKind::Horizontal => "horizontal",
                ConstraintKind::Vertical => "vertical",
                ConstraintKind::Diameter => "diameter",
                ConstraintKind::PtOnCircle => "pt-on-circle",
                ConstraintKind::SameOrientation => "same-orientation",
                ConstraintKind::Angle => "angle",
                ConstraintKind::Parallel => "parallel",
                ConstraintKind::Perpendicular => "perpendicular",
                ConstraintKind::ArcLineTangent => "arc-line-tangent",
                ConstraintKind::CubicLineTangent => "cubic-line-tangent",
                ConstraintKind::CurveCurveTangent => "curve-curve-tangent",
                ConstraintKind::EqualRadius => "equal-radius",
                ConstraintKind::WhereDragged => "where-dragged",
                ConstraintKind::ArcArcLenRatio => "arc-arc-len-ratio",
                ConstraintKind::ArcLineLenRatio => "arc-line-len-ratio",
                ConstraintKind::ArcArcDifference => "arc-arc-difference",
                ConstraintKind::ArcLineDifference => "arc-line-difference",
                ConstraintKind::Comment => "comment",
                ConstraintKind::Unknown(_) => "unknown",
            }
        }

        /// 加载器能否把该类型交给求解器。
        pub fn is_implemented(self) -> bool {
            matches!(
                self,
                ConstraintKind::PointsCoincident
                    | ConstraintKind::PtPtDistance
                    | ConstraintKind::PtPlaneDistance
                    | ConstraintKind::PtLineDistance
                    | ConstraintKind::PtOnLine
                    | ConstraintKind::EqualLengthLines
                    | ConstraintKind::AtMidpoint
                    | ConstraintKind::Horizontal
                    | ConstraintKind::Vertical
                    | ConstraintKind::Diameter
                    | ConstraintKind::Angle
                    | ConstraintKind::Parallel
                    | ConstraintKind::Perpendicular
                    | ConstraintKind::EqualRadius
                    | ConstraintKind::WhereDragged
            )
        }
    }

    impl From<i64> for ConstraintKind {
        fn from(code: i64) -> Self {
            Self::from_code(code)
        }
    }

    impl From<ConstraintKind> for i64 {
        fn from(kind: ConstraintKind) -> Self {
            kind.code()
        }
    }

    /// 从 `AddEntity` 之前累积的 `Entity.*` 子树冻结出的实体定义。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct EntityDefinition {
        pub id: String,
        pub kind: EntityKind,
        pub record: Record,
    }

    impl EntityDefinition {
        /// 缺失的 `h.v` 视为空标识符，缺失或无法解析的 `type` 视为 0。
        pub fn from_record(record: Record) -> Self {
            let id = record.scalar(&["h", "v"]).unwrap_or_default().to_string();
            let kind = EntityKind::from_code(type_code(&record));
            Self { id, kind, record }
        }

        /// 引用字段（如 `point[0]`、`workplane`）中的标识符，空值视为缺失。
        #[inline]
        pub fn reference(&self, field: &str) -> Option<&str> {
            reference(&self.record, field)
        }

        /// `actPoint`，缺失分量按 0.0 处理。二维点仅使用 x/y。
        pub fn act_point(&self) -> Point3 {
            let point = self.record.subtree("actPoint");
            Point3::new(
                component(point, "x"),
                component(point, "y"),
                component(point, "z"),
            )
        }

        /// `actNormal`，缺失分量按 0.0 处理。文件中的 `vx, vy, vz, w` 依次作为
        /// 求解器的 `qw, qx, qy, qz`，参考平面 `w=1` 对应 (0, 0, 0, 1)。
        pub fn act_normal(&self) -> Quaternion {
            let normal = self.record.subtree("actNormal");
            Quaternion::new(
                component(normal, "vx"),
                component(normal, "vy"),
                component(normal, "vz"),
                component(normal, "w"),
            )
        }

        #[inline]
        pub fn act_distance(&self) -> f64 {
            number(self.record.scalar(&["actDistance"]))
        }
    }

    /// 从 `AddConstraint` 之前累积的 `Constraint.*` 子树冻结出的约束定义。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ConstraintDefinition {
        pub id: String,
        pub kind: ConstraintKind,
        pub record: Record,
    }

    impl ConstraintDefinition {
        pub fn from_record(record: Record) -> Self {
            let id = record.scalar(&["h", "v"]).unwrap_or_default().to_string();
            let kind = ConstraintKind::from_code(type_code(&record));
            Self { id, kind, record }
        }

        #[inline]
        pub fn reference(&self, field: &str) -> Option<&str> {
            reference(&self.record, field)
        }

        /// `valA`，缺失、为空或无法解析时为 0.0。
        #[inline]
        pub fn value(&self) -> f64 {
            number(self.record.scalar(&["valA"]))
        }

        /// `other` 标志，非零整数为真，其余（含缺失）为假。
        pub fn inverse(&self) -> bool {
            self.record
                .scalar(&["other"])
                .and_then(|raw| raw.trim().parse::<i64>().ok())
                .is_some_and(|flag| flag != 0)
        }
    }

    fn type_code(record: &Record) -> i64 {
        record
            .scalar(&["type"])
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(0)
    }

    fn reference<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
        record
            .scalar(&[field, "v"])
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn component(record: Option<&Record>, key: &str) -> f64 {
        number(record.and_then(|record| record.scalar(&[key])))
    }

    fn number(raw: Option<&str>) -> f64 {
        raw.and_then(|raw| raw.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }

}

pub mod system {
    use std::fmt;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    use crate::geometry::{Point2, Point3, Quaternion};

    /// 求解器分配的实体句柄。0 保留给“无”，有效句柄从 1 开始。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct Handle(u32);

    impl Handle {
        #[inline]
        pub fn new(raw: u32) -> Self {
            Self(raw)
        }

        #[inline]
        pub fn get(self) -> u32 {
            self.0
        }
    }

    impl fmt::Display for Handle {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "#{}", self.0)
        }
    }

    /// 实体或约束所在的参考平面。`FreeIn3d` 表示不依附任何工作平面。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub enum WorkplaneRef {
        #[default]
        FreeIn3d,
        Plane(Handle),
    }

    impl WorkplaneRef {
        #[inline]
        pub fn handle(self) -> Option<Handle> {
            match self {
                WorkplaneRef::FreeIn3d => None,
                WorkplaneRef::Plane(handle) => Some(handle),
            }
        }

        #[inline]
        pub fn is_free(self) -> bool {
            matches!(self, WorkplaneRef::FreeIn3d)
        }
    }

    impl From<Option<Handle>> for WorkplaneRef {
        fn from(value: Option<Handle>) -> Self {
            value.map_or(WorkplaneRef::FreeIn3d, WorkplaneRef::Plane)
        }
    }

    /// 交给求解器的实体构造请求，操作数均为已解析的句柄。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum SolverEntity {
        Point3d {
            position: Point3,
        },
        Point2d {
            position: Point2,
            workplane: Handle,
        },
        Normal3d {
            orientation: Quaternion,
        },
        Normal2d {
            workplane: WorkplaneRef,
        },
        Distance {
            value: f64,
            workplane: WorkplaneRef,
        },
        Workplane {
            origin: Handle,
            normal: Handle,
        },
        Line3d {
            start: Handle,
            end: Handle,
        },
        Line2d {
            start: Handle,
            end: Handle,
            workplane: Handle,
        },
        Circle {
            normal: Handle,
            center: Handle,
            radius: Handle,
            workplane: WorkplaneRef,
        },
        Arc {
            normal: Handle,
            center: Handle,
            start: Handle,
            end: Handle,
            workplane: Handle,
        },
        Cubic {
            points: [Handle; 4],
            workplane: Handle,
        },
    }

    impl SolverEntity {
        pub fn name(&self) -> &'static str {
            match self {
                SolverEntity::Point3d { .. } => "point-3d",
                SolverEntity::Point2d { .. } => "point-2d",
                SolverEntity::Normal3d { .. } => "normal-3d",
                SolverEntity::Normal2d { .. } => "normal-2d",
                SolverEntity::Distance { .. } => "distance",
                SolverEntity::Workplane { .. } => "workplane",
                SolverEntity::Line3d { .. } => "line-3d",
                SolverEntity::Line2d { .. } => "line-2d",
                SolverEntity::Circle { .. } => "circle",
                SolverEntity::Arc { .. } => "arc",
                SolverEntity::Cubic { .. } => "cubic",
            }
        }

        #[inline]
        pub fn is_point(&self) -> bool {
            matches!(
                self,
                SolverEntity::Point3d { .. } | SolverEntity::Point2d { .. }
            )
        }

        #[inline]
        pub fn is_normal(&self) -> bool {
            matches!(
                self,
                SolverEntity::Normal3d { .. } | SolverEntity::Normal2d { .. }
            )
        }

        #[inline]
        pub fn is_workplane(&self) -> bool {
            matches!(self, SolverEntity::Workplane { .. })
        }

        #[inline]
        pub fn is_line(&self) -> bool {
            matches!(self, SolverEntity::Line3d { .. } | SolverEntity::Line2d { .. })
        }

        #[inline]
        pub fn is_circular(&self) -> bool {
            matches!(self, SolverEntity::Circle { .. } | SolverEntity::Arc { .. })
        }

        /// 实体依附的工作平面。
        pub fn workplane(&self) -> WorkplaneRef {
            match self {
                SolverEntity::Point2d { workplane, .. }
                | SolverEntity::Line2d { workplane, .. }
                | SolverEntity::Arc { workplane, .. }
                | SolverEntity::Cubic { workplane, .. } => WorkplaneRef::Plane(*workplane),
                SolverEntity::Normal2d { workplane }
                | SolverEntity::Distance { workplane, .. }
                | SolverEntity::Circle { workplane, .. } => *workplane,
                SolverEntity::Point3d { .. }
                | SolverEntity::Normal3d { .. }
                | SolverEntity::Workplane { .. }
                | SolverEntity::Line3d { .. } => WorkplaneRef::FreeIn3d,
            }
        }

        /// 实体自身的数值参数：点为坐标，法向为 (w, x, y, z)，距离为长度。
        pub fn params(&self) -> Vec<f64> {
            match self {
                SolverEntity::Point3d { position } => {
                    vec![position.x(), position.y(), position.z()]
                }
                SolverEntity::Point2d { position, .. } => vec![position.u(), position.v()],
                SolverEntity::Normal3d { orientation } => orientation.components().to_vec(),
                SolverEntity::Distance { value, .. } => vec![*value],
                _ => Vec::new(),
            }
        }
    }

    /// 交给求解器的约束构造请求。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub enum SolverConstraint {
        PointsCoincident {
            a: Handle,
            b: Handle,
            workplane: WorkplaneRef,
        },
        PtPtDistance {
            a: Handle,
            b: Handle,
            value: f64,
            workplane: WorkplaneRef,
        },
        PtPlaneDistance {
            point: Handle,
            plane: Handle,
            value: f64,
            workplane: WorkplaneRef,
        },
        PtLineDistance {
            point: Handle,
            line: Handle,
            value: f64,
            workplane: WorkplaneRef,
        },
        PtOnLine {
            point: Handle,
            line: Handle,
            workplane: WorkplaneRef,
        },
        EqualLengthLines {
            a: Handle,
            b: Handle,
            workplane: WorkplaneRef,
        },
        AtMidpoint {
            point: Handle,
            line: Handle,
            workplane: WorkplaneRef,
        },
        Horizontal {
            line: Handle,
            workplane: WorkplaneRef,
        },
        Vertical {
            line: Handle,
            workplane: WorkplaneRef,
        },
        Diameter {
            circle: Handle,
            value: f64,
            workplane: WorkplaneRef,
        },
        Angle {
            a: Handle,
            b: Handle,
            value: f64,
            workplane: WorkplaneRef,
            inverse: bool,
        },
        Parallel {
            a: Handle,
            b: Handle,
            workplane: WorkplaneRef,
        },
        Perpendicular {
            a: Handle,
            b: Handle,
            workplane: WorkplaneRef,
            inverse: bool,
        },
        EqualRadius {
            a: Handle,
            b: Handle,
            workplane: WorkplaneRef,
        },
        WhereDragged {
            point: Handle,
            workplane: WorkplaneRef,
        },
    }

    impl SolverConstraint {
        pub fn name(&self) -> &'static str {
            match self {
                SolverConstraint::PointsCoincident { .. } => "points-coincident",
                SolverConstraint::PtPtDistance { .. } => "pt-pt-distance",
                SolverConstraint::PtPlaneDistance { .. } => "pt-plane-distance",
                SolverConstraint::PtLineDistance { .. } => "pt-line-distance",
                SolverConstraint::PtOnLine { .. } => "pt-on-line",
                SolverConstraint::EqualLengthLines { .. } => "equal-length-lines",
                SolverConstraint::AtMidpoint { .. } => "at-midpoint",
                SolverConstraint::Horizontal { .. } => "horizontal",
                SolverConstraint::Vertical { .. } => "vertical",
                SolverConstraint::Diameter { .. } => "diameter",
                SolverConstraint::Angle { .. } => "angle",
                SolverConstraint::Parallel { .. } => "parallel",
                SolverConstraint::Perpendicular { .. } => "perpendicular",
                SolverConstraint::EqualRadius { .. } => "equal-radius",
                SolverConstraint::WhereDragged { .. } => "where-dragged",
            }
        }

        pub fn workplane(&self) -> WorkplaneRef {
            match self {
                SolverConstraint::PointsCoincident { workplane, .. }
                | SolverConstraint::PtPtDistance { workplane, .. }
                | SolverConstraint::PtPlaneDistance { workplane, .. }
                | SolverConstraint::PtLineDistance { workplane, .. }
                | SolverConstraint::PtOnLine { workplane, .. }
                | SolverConstraint::EqualLengthLines { workplane, .. }
                | SolverConstraint::AtMidpoint { workplane, .. }
                | SolverConstraint::Horizontal { workplane, .. }
                | SolverConstraint::Vertical { workplane, .. }
                | SolverConstraint::Diameter { workplane, .. }
                | SolverConstraint::Angle { workplane, .. }
                | SolverConstraint::Parallel { workplane, .. }
                | SolverConstraint::Perpendicular { workplane, .. }
                | SolverConstraint::EqualRadius { workplane, .. }
                | SolverConstraint::WhereDragged { workplane, .. } => *workplane,
            }
        }

        /// 约束直接引用的实体句柄（不含工作平面）。
        pub fn operands(&self) -> Vec<Handle> {
            match self {
                SolverConstraint::PointsCoincident { a, b, .. }
                | SolverConstraint::PtPtDistance { a, b, .. }
                | SolverConstraint::EqualLengthLines { a, b, .. }
                | SolverConstraint::Angle { a, b, .. }
                | SolverConstraint::Parallel { a, b, .. }
                | SolverConstraint::Perpendicular { a, b, .. }
                | SolverConstraint::EqualRadius { a, b, .. } => vec![*a, *b],
                SolverConstraint::PtPlaneDistance { point, plane, .. } => vec![*point, *plane],
                SolverConstraint::PtLineDistance { point, line, .. }
                | SolverConstraint::PtOnLine { point, line, .. }
                | SolverConstraint::AtMidpoint { point, line, .. } => vec![*point, *line],
                SolverConstraint::Horizontal { line, .. }
                | SolverConstraint::Vertical { line, .. } => vec![*line],
                SolverConstraint::Diameter { circle, .. } => vec![*circle],
                SolverConstraint::WhereDragged { point, .. } => vec![*point],
            }
        }
    }

    #[derive(Debug, Error)]
    pub enum SolverError {
        #[error("handle {0} does not refer to an entity")]
        UnknownHandle(Handle),
        #[error("invalid {operation}: {message}")]
        InvalidConfiguration {
            operation: &'static str,
            message: String,
        },
        #[error("unsupported {operation}: {message}")]
        Unsupported {
            operation: &'static str,
            message: String,
        },
    }

    impl SolverError {
        fn invalid(operation: &'static str, message: impl Into<String>) -> Self {
            Self::InvalidConfiguration {
                operation,
                message: message.into(),
            }
        }

        fn unsupported(operation: &'static str, message: impl Into<String>) -> Self {
            Self::Unsupported {
                operation,
                message: message.into(),
            }
        }
    }

    /// 几何求解器边界。加载器只通过这三个操作与求解器交互。
    pub trait SolverAdapter {
        fn add_entity(&mut self, entity: SolverEntity) -> Result<Handle, SolverError>;
        fn add_constraint(&mut self, constraint: SolverConstraint) -> Result<(), SolverError>;
        fn set_group(&mut self, group: u32);
    }

    impl<S: SolverAdapter + ?Sized> SolverAdapter for &mut S {
        fn add_entity(&mut self, entity: SolverEntity) -> Result<Handle, SolverError> {
            (**self).add_entity(entity)
        }

        fn add_constraint(&mut self, constraint: SolverConstraint) -> Result<(), SolverError> {
            (**self).add_constraint(constraint)
        }

        fn set_group(&mut self, group: u32) {
            (**self).set_group(group)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct StoredEntity {
        pub handle: Handle,
        pub group: u32,
        pub entity: SolverEntity,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct StoredConstraint {
        pub group: u32,
        pub constraint: SolverConstraint,
    }

    /// 内存中的求解系统：按构造顺序保存实体与约束，并在写入时做结构校验。
    /// 不负责数值求解。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct SketchSystem {
        entities: Vec<StoredEntity>,
        constraints: Vec<StoredConstraint>,
        group: u32,
    }

    impl SketchSystem {
        pub fn new() -> Self {
            Self::default()
        }

        #[inline]
        pub fn group(&self) -> u32 {
            self.group
        }

        #[inline]
        pub fn entity(&self, handle: Handle) -> Option<&SolverEntity> {
            self.stored(handle).map(|stored| &stored.entity)
        }

        #[inline]
        pub fn entity_group(&self, handle: Handle) -> Option<u32> {
            self.stored(handle).map(|stored| stored.group)
        }

        /// 读取点、法向或距离实体的参数；句柄无效时返回 `None`。
        #[inline]
        pub fn params(&self, handle: Handle) -> Option<Vec<f64>> {
            self.entity(handle).map(SolverEntity::params)
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = &StoredEntity> {
            self.entities.iter()
        }

        #[inline]
        pub fn constraints(&self) -> impl Iterator<Item = &StoredConstraint> {
            self.constraints.iter()
        }

        #[inline]
        pub fn entity_count(&self) -> usize {
            self.entities.len()
        }

        #[inline]
        pub fn constraint_count(&self) -> usize {
            self.constraints.len()
        }

        fn stored(&self, handle: Handle) -> Option<&StoredEntity> {
            let index = handle.get().checked_sub(1)? as usize;
            self.entities.get(index)
        }

        fn lookup(&self, handle: Handle) -> Result<&SolverEntity, SolverError> {
            self.entity(handle)
                .ok_or(SolverError::UnknownHandle(handle))
        }

        fn expect_kind(
            &self,
            operation: &'static str,
            handle: Handle,
            expected: &str,
            check: fn(&SolverEntity) -> bool,
        ) -> Result<(), SolverError> {
            let entity = self.lookup(handle)?;
            if check(entity) {
                Ok(())
            } else {
                Err(SolverError::invalid(
                    operation,
                    format!("{handle} is a {}, expected {expected}", entity.name()),
                ))
            }
        }

        fn expect_workplane(
            &self,
            operation: &'static str,
            workplane: WorkplaneRef,
        ) -> Result<(), SolverError> {
            match workplane {
                WorkplaneRef::FreeIn3d => Ok(()),
                WorkplaneRef::Plane(handle) => {
                    self.expect_kind(operation, handle, "workplane", SolverEntity::is_workplane)
                }
            }
        }

        fn require_plane(
            operation: &'static str,
            workplane: WorkplaneRef,
        ) -> Result<(), SolverError> {
            if workplane.is_free() {
                Err(SolverError::invalid(
                    operation,
                    "requires a workplane, got free-in-3d",
                ))
            } else {
                Ok(())
            }
        }

        fn validate_entity(&self, entity: &SolverEntity) -> Result<(), SolverError> {
            let operation = entity.name();
            match entity {
                SolverEntity::Point3d { .. } | SolverEntity::Normal3d { .. } => {}
                SolverEntity::Point2d { workplane, .. } => {
                    self.expect_workplane(operation, WorkplaneRef::Plane(*workplane))?;
                }
                SolverEntity::Normal2d { workplane } | SolverEntity::Distance { workplane, .. } => {
                    self.expect_workplane(operation, *workplane)?;
                }
                SolverEntity::Workplane { origin, normal } => {
                    self.expect_kind(operation, *origin, "point", SolverEntity::is_point)?;
                    self.expect_kind(operation, *normal, "normal", SolverEntity::is_normal)?;
                }
                SolverEntity::Line3d { start, end } => {
                    self.expect_kind(operation, *start, "point", SolverEntity::is_point)?;
                    self.expect_kind(operation, *end, "point", SolverEntity::is_point)?;
                }
                SolverEntity::Line2d {
                    start,
                    end,
                    workplane,
                } => {
                    self.expect_kind(operation, *start, "point", SolverEntity::is_point)?;
                    self.expect_kind(operation, *end, "point", SolverEntity::is_point)?;
                    self.expect_workplane(operation, WorkplaneRef::Plane(*workplane))?;
                }
                SolverEntity::Circle {
                    normal,
                    center,
                    radius,
                    workplane,
                } => {
                    if workplane.is_free() {
                        return Err(SolverError::unsupported(
                            operation,
                            "circles must lie in a workplane",
                        ));
                    }
                    self.expect_kind(operation, *normal, "normal", SolverEntity::is_normal)?;
                    self.expect_kind(operation, *center, "point", SolverEntity::is_point)?;
                    self.expect_kind(operation, *radius, "distance", |entity| {
                        matches!(entity, SolverEntity::Distance { .. })
                    })?;
                    self.expect_workplane(operation, *workplane)?;
                }
                SolverEntity::Arc {
                    normal,
                    center,
                    start,
                    end,
                    workplane,
                } => {
                    self.expect_kind(operation, *normal, "normal", SolverEntity::is_normal)?;
                    for point in [center, start, end] {
                        self.expect_kind(operation, *point, "point", SolverEntity::is_point)?;
                    }
                    self.expect_workplane(operation, WorkplaneRef::Plane(*workplane))?;
                }
                SolverEntity::Cubic { points, workplane } => {
                    for point in points {
                        self.expect_kind(operation, *point, "point", SolverEntity::is_point)?;
                    }
                    self.expect_workplane(operation, WorkplaneRef::Plane(*workplane))?;
                }
            }
            Ok(())
        }

        fn validate_constraint(&self, constraint: &SolverConstraint) -> Result<(), SolverError> {
            let operation = constraint.name();
            for operand in constraint.operands() {
                self.lookup(operand)?;
            }
            let workplane = constraint.workplane();
            self.expect_workplane(operation, workplane)?;

            match constraint {
                SolverConstraint::Horizontal { line, .. }
                | SolverConstraint::Vertical { line, .. } => {
                    Self::require_plane(operation, workplane)?;
                    self.expect_kind(operation, *line, "line", SolverEntity::is_line)?;
                }
                SolverConstraint::Angle { .. } | SolverConstraint::Parallel { .. } => {
                    Self::require_plane(operation, workplane)?;
                }
                SolverConstraint::PtPlaneDistance { plane, .. } => {
                    if !workplane.is_free() {
                        return Err(SolverError::unsupported(
                            operation,
                            "the point cannot be projected onto another workplane",
                        ));
                    }
                    self.expect_kind(operation, *plane, "workplane", SolverEntity::is_workplane)?;
                }
                SolverConstraint::Diameter { circle, .. } => {
                    self.expect_kind(operation, *circle, "circle or arc", SolverEntity::is_circular)?;
                }
                // 3D 下的垂直约束直接放行，不要求工作平面。
                SolverConstraint::Perpendicular { .. } => {}
                _ => {}
            }
            Ok(())
        }
    }

    impl SolverAdapter for SketchSystem {
        fn add_entity(&mut self, entity: SolverEntity) -> Result<Handle, SolverError> {
            self.validate_entity(&entity)?;
            let raw = u32::try_from(self.entities.len() + 1).map_err(|_| {
                SolverError::unsupported(entity.name(), "entity handle space exhausted")
            })?;
            let handle = Handle::new(raw);
            self.entities.push(StoredEntity {
                handle,
                group: self.group,
                entity,
            });
            Ok(handle)
        }

        fn add_constraint(&mut self, constraint: SolverConstraint) -> Result<(), SolverError> {
            self.validate_constraint(&constraint)?;
            self.constraints.push(StoredConstraint {
                group: self.group,
                constraint,
            });
            Ok(())
        }

        fn set_group(&mut self, group: u32) {
            self.group = group;
        }
    }

}
