use std::collections::{HashMap, HashSet};

use slvs_core::geometry::Point2;
use slvs_core::sketch::{EntityDefinition, EntityKind};
use slvs_core::system::{Handle, SolverAdapter, SolverEntity, WorkplaneRef};
use tracing::{debug, trace};

use crate::errors::EngineError;
use crate::repository::EntityRepository;

/// 递归构造实体图。
///
/// 引用的实体总是先于引用者构造，与它们在文件中的先后顺序无关。每个标识符
/// 最多调用一次求解器；构造中的标识符若被再次请求，视为循环引用。
pub struct EntityGraphBuilder<'d, S> {
    definitions: &'d [EntityDefinition],
    index: HashMap<&'d str, &'d EntityDefinition>,
    in_progress: HashSet<&'d str>,
    repository: EntityRepository,
    solver: S,
}

impl<'d, S: SolverAdapter> EntityGraphBuilder<'d, S> {
    pub fn new(definitions: &'d [EntityDefinition], solver: S) -> Self {
        let mut index = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            // 同一标识符出现多次时以第一次为准
            index.entry(definition.id.as_str()).or_insert(definition);
        }
        Self {
            definitions,
            index,
            in_progress: HashSet::new(),
            repository: EntityRepository::new(),
            solver,
        }
    }

    /// 按文件顺序构造全部实体。
    pub fn construct_all(&mut self) -> Result<(), EngineError> {
        for definition in self.definitions {
            self.construct(&definition.id)?;
        }
        debug!(entities = self.repository.len(), "实体图构造完成");
        Ok(())
    }

    pub fn construct(&mut self, id: &str) -> Result<Handle, EngineError> {
        if let Some(handle) = self.repository.lookup(id) {
            trace!(id, %handle, "命中缓存");
            return Ok(handle);
        }

        let definition = self.definition(id)?;
        let key = definition.id.as_str();
        if !self.in_progress.insert(key) {
            return Err(EngineError::CyclicReference(key.to_string()));
        }
        let entity = self.resolve(definition);
        self.in_progress.remove(key);
        let entity = entity?;

        let name = entity.name();
        let handle = self
            .repository
            .get_or_create(&mut self.solver, key, entity)?;
        debug!(id = key, kind = name, %handle, "实体已构造");
        Ok(handle)
    }

    #[inline]
    pub fn repository(&self) -> &EntityRepository {
        &self.repository
    }

    #[inline]
    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn into_parts(self) -> (S, EntityRepository) {
        (self.solver, self.repository)
    }

    fn definition(&self, id: &str) -> Result<&'d EntityDefinition, EngineError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| EngineError::DefinitionNotFound(id.to_string()))
    }

    /// 先递归构造引用，再生成交给求解器的实体描述。
    fn resolve(&mut self, definition: &'d EntityDefinition) -> Result<SolverEntity, EngineError> {
        match definition.kind {
            EntityKind::PointIn3d | EntityKind::PointCopy => Ok(SolverEntity::Point3d {
                position: definition.act_point(),
            }),
            EntityKind::PointIn2d => {
                let workplane = self.required(definition, "workplane")?;
                let point = definition.act_point();
                Ok(SolverEntity::Point2d {
                    position: Point2::new(point.x(), point.y()),
                    workplane,
                })
            }
            EntityKind::NormalIn3d | EntityKind::NormalCopy => Ok(SolverEntity::Normal3d {
                orientation: definition.act_normal(),
            }),
            EntityKind::NormalIn2d => Ok(SolverEntity::Normal2d {
                workplane: self.optional(definition, "workplane")?,
            }),
            EntityKind::Distance => Ok(SolverEntity::Distance {
                value: definition.act_distance(),
                workplane: self.optional(definition, "workplane")?,
            }),
            EntityKind::Workplane => {
                let origin = self.required(definition, "point[0]")?;
                let normal = self.required(definition, "normal")?;
                Ok(SolverEntity::Workplane { origin, normal })
            }
            EntityKind::LineSegment => {
                let start = self.required(definition, "point[0]")?;
                let end = self.required(definition, "point[1]")?;
                Ok(match self.optional(definition, "workplane")? {
                    WorkplaneRef::Plane(workplane) => SolverEntity::Line2d {
                        start,
                        end,
                        workplane,
                    },
                    WorkplaneRef::FreeIn3d => SolverEntity::Line3d { start, end },
                })
            }
            EntityKind::Circle => {
                let center = self.required(definition, "point[0]")?;
                let normal = self.required(definition, "normal")?;
                let radius = self.required(definition, "distance")?;
                let workplane = self.optional(definition, "workplane")?;
                Ok(SolverEntity::Circle {
                    normal,
                    center,
                    radius,
                    workplane,
                })
            }
            EntityKind::ArcOfCircle => {
                let normal = self.required(definition, "normal")?;
                let center = self.required(definition, "point[0]")?;
                let start = self.required(definition, "point[1]")?;
                let end = self.required(definition, "point[2]")?;
                let workplane = self.required(definition, "workplane")?;
                Ok(SolverEntity::Arc {
                    normal,
                    center,
                    start,
                    end,
                    workplane,
                })
            }
            EntityKind::Cubic => {
                let points = [
                    self.required(definition, "point[0]")?,
                    self.required(definition, "point[1]")?,
                    self.required(definition, "point[2]")?,
                    self.required(definition, "point[3]")?,
                ];
                let workplane = self.required(definition, "workplane")?;
                Ok(SolverEntity::Cubic { points, workplane })
            }
            EntityKind::Other(code) => Err(EngineError::UnsupportedEntity {
                id: definition.id.clone(),
                code,
            }),
        }
    }

    fn required(
        &mut self,
        definition: &EntityDefinition,
        field: &'static str,
    ) -> Result<Handle, EngineError> {
        let id = definition
            .reference(field)
            .ok_or_else(|| EngineError::MissingField {
                record: definition.id.clone(),
                field,
            })?;
        self.construct(id)
    }

    fn optional(
        &mut self,
        definition: &EntityDefinition,
        field: &'static str,
    ) -> Result<WorkplaneRef, EngineError> {
        match definition.reference(field) {
            Some(id) => Ok(WorkplaneRef::Plane(self.construct(id)?)),
            None => Ok(WorkplaneRef::FreeIn3d),
        }
    }
}
