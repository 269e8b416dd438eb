pub mod builder;
pub mod dispatcher;

pub mod errors {
    use slvs_core::system::SolverError;
    use slvs_io::IoError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("entity {0} has not been constructed")]
        EntityNotFound(String),
        #[error("no entity definition with id {0}")]
        DefinitionNotFound(String),
        #[error("{record} is missing required field {field}")]
        MissingField { record: String, field: &'static str },
        #[error("entity {id} has unsupported type {code}")]
        UnsupportedEntity { id: String, code: i64 },
        #[error("constraint {id} has unsupported type {code}")]
        UnsupportedConstraint { id: String, code: i64 },
        #[error("constraint {id}: {kind} is not implemented")]
        ConstraintNotImplemented { id: String, kind: &'static str },
        #[error("entity {0} references itself through its dependencies")]
        CyclicReference(String),
        #[error(transparent)]
        Solver(#[from] SolverError),
        #[error(transparent)]
        Io(#[from] IoError),
    }
}

pub mod repository {
    use std::collections::HashMap;

    use slvs_core::system::{Handle, SolverAdapter, SolverEntity};
    use tracing::debug;

    use crate::errors::EngineError;

    /// 标识符到求解器句柄的映射，同时维护当前分组号。
    ///
    /// 每个标识符在一次加载中最多对应一个句柄；重复创建直接返回缓存的句柄，
    /// 不会再次调用求解器。
    #[derive(Debug, Default, Clone)]
    pub struct EntityRepository {
        handles: HashMap<String, Handle>,
        group: u32,
    }

    impl EntityRepository {
        pub fn new() -> Self {
            Self::default()
        }

        #[inline]
        pub fn lookup(&self, id: &str) -> Option<Handle> {
            self.handles.get(id).copied()
        }

        /// 查找已构造的实体，不存在时返回 `EntityNotFound`。
        pub fn get(&self, id: &str) -> Result<Handle, EngineError> {
            self.lookup(id)
                .ok_or_else(|| EngineError::EntityNotFound(id.to_string()))
        }

        /// 返回缓存句柄，或调用求解器创建实体后缓存。创建工作平面后分组号加一，
        /// 并同步给求解器。
        pub fn get_or_create<S: SolverAdapter + ?Sized>(
            &mut self,
            solver: &mut S,
            id: &str,
            entity: SolverEntity,
        ) -> Result<Handle, EngineError> {
            if let Some(handle) = self.lookup(id) {
                return Ok(handle);
            }
            let is_workplane = entity.is_workplane();
            let handle = solver.add_entity(entity)?;
            self.handles.insert(id.to_string(), handle);
            if is_workplane {
                self.group += 1;
                solver.set_group(self.group);
                debug!(id, group = self.group, "工作平面已创建，切换分组");
            }
            Ok(handle)
        }

        #[inline]
        pub fn group(&self) -> u32 {
            self.group
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.handles.len()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.handles.is_empty()
        }

        #[inline]
        pub fn handles(&self) -> &HashMap<String, Handle> {
            &self.handles
        }

        pub fn into_handles(self) -> HashMap<String, Handle> {
            self.handles
        }
    }

}

pub mod pipeline {
    use std::collections::HashMap;
    use std::path::Path;

    use slvs_core::system::{Handle, SketchSystem, SolverAdapter};
    use slvs_io::{ParsedSketch, SketchLoader, SlvsFacade, parse_str};
    use tracing::info;

    use crate::builder::EntityGraphBuilder;
    use crate::dispatcher::ConstraintDispatcher;
    use crate::errors::EngineError;

    /// 一次完整加载的结果：求解器实例、标识符到句柄的映射以及最终分组号。
    #[derive(Debug)]
    pub struct LoadedSketch<S> {
        pub system: S,
        pub entities: HashMap<String, Handle>,
        pub group: u32,
        pub constraints: usize,
    }

    impl<S> LoadedSketch<S> {
        #[inline]
        pub fn handle(&self, id: &str) -> Option<Handle> {
            self.entities.get(id).copied()
        }

        pub fn into_parts(self) -> (S, HashMap<String, Handle>) {
            (self.system, self.entities)
        }
    }

    /// 把文件内容加载进内置的 [`SketchSystem`]。
    pub fn load_sketch(content: &str) -> Result<LoadedSketch<SketchSystem>, EngineError> {
        load_sketch_with(content, SketchSystem::new())
    }

    pub fn load_sketch_with<S: SolverAdapter>(
        content: &str,
        solver: S,
    ) -> Result<LoadedSketch<S>, EngineError> {
        let parsed = parse_str(content);
        build_sketch(&parsed, solver)
    }

    /// 读取 `.slvs` 文件并加载。
    pub fn load_path(path: &Path) -> Result<LoadedSketch<SketchSystem>, EngineError> {
        let parsed = SlvsFacade::new().load(path)?;
        build_sketch(&parsed, SketchSystem::new())
    }

    /// 先按文件顺序构造全部实体，再按文件顺序分派约束。任一步失败即整体失败。
    pub fn build_sketch<S: SolverAdapter>(
        parsed: &ParsedSketch,
        solver: S,
    ) -> Result<LoadedSketch<S>, EngineError> {
        let mut builder = EntityGraphBuilder::new(&parsed.entities, solver);
        builder.construct_all()?;
        let (mut solver, repository) = builder.into_parts();

        let constraints =
            ConstraintDispatcher::new(&repository).construct_all(&mut solver, &parsed.constraints)?;

        info!(
            entities = repository.len(),
            constraints,
            group = repository.group(),
            "草图加载完成"
        );

        Ok(LoadedSketch {
            system: solver,
            group: repository.group(),
            entities: repository.into_handles(),
            constraints,
        })
    }

}

#[cfg(test)]
pub(crate) mod testing {
    use slvs_core::system::{
        Handle, SketchSystem, SolverAdapter, SolverConstraint, SolverEntity, SolverError,
    };

    /// 包装 `SketchSystem` 并记录调用次数的测试适配器。
    #[derive(Debug, Default)]
    pub struct RecordingSolver {
        pub system: SketchSystem,
        pub entity_calls: usize,
        pub constraint_calls: usize,
        pub groups: Vec<u32>,
        pub constraints: Vec<SolverConstraint>,
    }

    impl SolverAdapter for RecordingSolver {
        fn add_entity(&mut self, entity: SolverEntity) -> Result<Handle, SolverError> {
            self.entity_calls += 1;
            self.system.add_entity(entity)
        }

        fn add_constraint(&mut self, constraint: SolverConstraint) -> Result<(), SolverError> {
            self.constraint_calls += 1;
            self.constraints.push(constraint.clone());
            self.system.add_constraint(constraint)
        }

        fn set_group(&mut self, group: u32) {
            self.groups.push(group);
            self.system.set_group(group);
        }
    }
}
