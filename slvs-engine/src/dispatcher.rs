use slvs_core::sketch::{ConstraintDefinition, ConstraintKind};
use slvs_core::system::{Handle, SolverAdapter, SolverConstraint, WorkplaneRef};
use tracing::debug;

use crate::errors::EngineError;
use crate::repository::EntityRepository;

/// 把约束定义中的实体标识符解析为句柄，并调用求解器对应的构造操作。
/// 只在实体图构造完成之后使用。
pub struct ConstraintDispatcher<'r> {
    repository: &'r EntityRepository,
}

impl<'r> ConstraintDispatcher<'r> {
    pub fn new(repository: &'r EntityRepository) -> Self {
        Self { repository }
    }

    /// 按文件顺序构造全部约束，返回成功构造的数量。
    pub fn construct_all<S: SolverAdapter + ?Sized>(
        &self,
        solver: &mut S,
        definitions: &[ConstraintDefinition],
    ) -> Result<usize, EngineError> {
        for definition in definitions {
            self.construct(solver, definition)?;
        }
        Ok(definitions.len())
    }

    pub fn construct<S: SolverAdapter + ?Sized>(
        &self,
        solver: &mut S,
        definition: &ConstraintDefinition,
    ) -> Result<(), EngineError> {
        let constraint = self.resolve(definition)?;
        let name = constraint.name();
        solver.add_constraint(constraint)?;
        debug!(id = %definition.id, kind = name, "约束已构造");
        Ok(())
    }

    fn resolve(&self, definition: &ConstraintDefinition) -> Result<SolverConstraint, EngineError> {
        let value = definition.value();
        let constraint = match definition.kind {
            ConstraintKind::PointsCoincident => SolverConstraint::PointsCoincident {
                a: self.operand(definition, "ptA")?,
                b: self.operand(definition, "ptB")?,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::PtPtDistance => SolverConstraint::PtPtDistance {
                a: self.operand(definition, "ptA")?,
                b: self.operand(definition, "ptB")?,
                value,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::PtPlaneDistance => SolverConstraint::PtPlaneDistance {
                point: self.operand(definition, "ptA")?,
                plane: self.operand(definition, "entityA")?,
                value,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::PtLineDistance => SolverConstraint::PtLineDistance {
                point: self.operand(definition, "ptA")?,
                line: self.operand(definition, "entityA")?,
                value,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::PtOnLine => SolverConstraint::PtOnLine {
                point: self.operand(definition, "ptA")?,
                line: self.operand(definition, "entityA")?,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::EqualLengthLines => SolverConstraint::EqualLengthLines {
                a: self.operand(definition, "entityA")?,
                b: self.operand(definition, "entityB")?,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::AtMidpoint => SolverConstraint::AtMidpoint {
                point: self.operand(definition, "ptA")?,
                line: self.operand(definition, "entityA")?,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::Horizontal => SolverConstraint::Horizontal {
                line: self.operand(definition, "entityA")?,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::Vertical => SolverConstraint::Vertical {
                line: self.operand(definition, "entityA")?,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::Diameter => SolverConstraint::Diameter {
                circle: self.operand(definition, "entityA")?,
                value,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::Angle => SolverConstraint::Angle {
                a: self.operand(definition, "entityA")?,
                b: self.operand(definition, "entityB")?,
                value,
                workplane: self.workplane(definition)?,
                inverse: definition.inverse(),
            },
            ConstraintKind::Parallel => SolverConstraint::Parallel {
                a: self.operand(definition, "entityA")?,
                b: self.operand(definition, "entityB")?,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::Perpendicular => SolverConstraint::Perpendicular {
                a: self.operand(definition, "entityA")?,
                b: self.operand(definition, "entityB")?,
                workplane: self.workplane(definition)?,
                inverse: definition.inverse(),
            },
            ConstraintKind::EqualRadius => SolverConstraint::EqualRadius {
                a: self.operand(definition, "entityA")?,
                b: self.operand(definition, "entityB")?,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::WhereDragged => SolverConstraint::WhereDragged {
                point: self.operand(definition, "ptA")?,
                workplane: self.workplane(definition)?,
            },
            ConstraintKind::Unknown(code) => {
                return Err(EngineError::UnsupportedConstraint {
                    id: definition.id.clone(),
                    code,
                });
            }
            kind => {
                return Err(EngineError::ConstraintNotImplemented {
                    id: definition.id.clone(),
                    kind: kind.name(),
                });
            }
        };
        Ok(constraint)
    }

    fn operand(
        &self,
        definition: &ConstraintDefinition,
        field: &'static str,
    ) -> Result<Handle, EngineError> {
        let id = definition
            .reference(field)
            .ok_or_else(|| EngineError::MissingField {
                record: definition.id.clone(),
                field,
            })?;
        self.repository.get(id)
    }

    /// 缺失或为空的工作平面表示在三维空间中自由。
    fn workplane(&self, definition: &ConstraintDefinition) -> Result<WorkplaneRef, EngineError> {
        definition
            .reference("workplane")
            .map(|id| self.repository.get(id))
            .transpose()
            .map(WorkplaneRef::from)
    }
}
