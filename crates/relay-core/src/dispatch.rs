//! 派发路由：把恢复目标解析为处理单元，并在池线程上重新进入。
//!
//! # 模块定位（Why）
//! - 挂起周期的三种恢复目标（默认路径 / 显式路径 / 显式作用域+路径）在这里
//!   统一解析；解析失败不得破坏周期状态；
//! - 重新进入对处理单元而言等同一次全新的顶层激活，唯一的区别是保留属性
//!   键下暴露的是**原始**请求的路径六元组。

use std::borrow::Cow;
use std::sync::Arc;

use relay_transport::Request;

use crate::error::Result;
use crate::runtime::{WorkExecutor, WorkUnit};
use crate::scope::Scope;

/// 保留请求属性键：派发后仍指向原始（派发前）请求的值。
///
/// 键名是外部兼容面的一部分，跨版本保持稳定。
pub mod reserved {
    /// 原始请求 URI。
    pub const ASYNC_REQUEST_URI: &str = "async.request_uri";
    /// 原始上下文路径。
    pub const ASYNC_CONTEXT_PATH: &str = "async.context_path";
    /// 原始路由映射。
    pub const ASYNC_MAPPING: &str = "async.mapping";
    /// 原始路径尾缀。
    pub const ASYNC_PATH_INFO: &str = "async.path_info";
    /// 原始处理单元路径。
    pub const ASYNC_SERVLET_PATH: &str = "async.servlet_path";
    /// 原始查询串。
    pub const ASYNC_QUERY_STRING: &str = "async.query_string";
}

/// 原始请求路径六元组的不可变快照。
///
/// # 设计背景（Why）
/// - 快照在容器开始异步处理（周期创建）时一次性摘取；无论之后发生多少次
///   派发、请求对被替换多少次，保留属性始终回放这份快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginSnapshot {
    request_uri: String,
    context_path: String,
    mapping: String,
    path_info: Option<String>,
    unit_path: String,
    query_string: Option<String>,
}

impl OriginSnapshot {
    /// 从原始请求摘取快照。
    pub fn capture(request: &Arc<dyn Request>) -> Self {
        Self {
            request_uri: request.uri(),
            context_path: request.context_path(),
            mapping: request.mapping(),
            path_info: request.path_info(),
            unit_path: request.unit_path(),
            query_string: request.query_string(),
        }
    }

    /// 把快照写入目标请求的保留属性键。
    pub fn apply_to(&self, request: &Arc<dyn Request>) {
        request.set_attribute(reserved::ASYNC_REQUEST_URI, self.request_uri.clone());
        request.set_attribute(reserved::ASYNC_CONTEXT_PATH, self.context_path.clone());
        request.set_attribute(reserved::ASYNC_MAPPING, self.mapping.clone());
        if let Some(path_info) = &self.path_info {
            request.set_attribute(reserved::ASYNC_PATH_INFO, path_info.clone());
        }
        request.set_attribute(reserved::ASYNC_SERVLET_PATH, self.unit_path.clone());
        if let Some(query) = &self.query_string {
            request.set_attribute(reserved::ASYNC_QUERY_STRING, query.clone());
        }
    }

    /// 原始请求 URI（派发默认路径的兜底来源）。
    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }
}

/// 恢复目标的三种形态。
#[derive(Clone)]
pub enum DispatchTarget {
    /// 挂起时记录的默认路径。
    Default,
    /// 相对本作用域的显式路径。
    Path(String),
    /// 显式作用域 + 路径。
    Scoped {
        /// 目标作用域。
        scope: Scope,
        /// 相对该作用域的路径。
        path: String,
    },
}

/// 可被派发重入的处理单元契约。
///
/// # 契约说明（What）
/// - `handle` 在池线程上同步执行，对单元而言这是一次新的顶层激活；
/// - 单元可以再次调用协调器的 `suspend` 开启新纪元，也可以 `complete`；
///   若两者都不做，`handle` 正常返回即视为本周期处理完毕，协调器走
///   正常完成遍历并归还连接；
/// - 返回 `Err` 会把周期推入错误迁移（`on_error` 遍历 + 默认处置）。
pub trait ProcessingUnit: Send + Sync + 'static {
    /// 处理一次（重新）进入。
    fn handle(&self, activation: &crate::coordinator::AsyncCoordinator) -> Result<()>;
}

/// 解析完成、待重入的派发计划。
pub struct ResolvedDispatch {
    unit: Arc<dyn ProcessingUnit>,
    path: String,
}

impl ResolvedDispatch {
    /// 目标处理单元。
    pub fn unit(&self) -> &Arc<dyn ProcessingUnit> {
        &self.unit
    }

    /// 解析后的目标路径。
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// 派发路由器：解析恢复目标并把重入动作放上池线程。
///
/// # 并发契约
/// - `resolve` 纯查找，不改动周期状态，失败时调用方可保持挂起继续等待；
/// - `reenter` 仅负责线程交接；新周期的状态推进由协调器在重入闭包内完成。
#[derive(Clone)]
pub struct DispatchRouter {
    executor: Arc<dyn WorkExecutor>,
}

impl DispatchRouter {
    /// 以执行器构造路由器。
    pub fn new(executor: Arc<dyn WorkExecutor>) -> Self {
        Self { executor }
    }

    /// 解析恢复目标。
    ///
    /// # 参数说明
    /// - `origin_scope`：周期诞生的作用域，`Default`/`Path` 形态在其中解析；
    /// - `default_path`：挂起时记录的默认路径；
    /// - 解析失败返回 `dispatch.target_not_found`（或作用域状态类错误），
    ///   周期状态由调用方保持不变。
    pub fn resolve(
        &self,
        origin_scope: &Scope,
        default_path: &str,
        target: &DispatchTarget,
    ) -> Result<ResolvedDispatch> {
        let (scope, path) = match target {
            DispatchTarget::Default => (origin_scope.clone(), default_path.to_owned()),
            DispatchTarget::Path(path) => (origin_scope.clone(), path.clone()),
            DispatchTarget::Scoped { scope, path } => (scope.clone(), path.clone()),
        };
        let unit = scope.resolve_unit(&path)?;
        Ok(ResolvedDispatch { unit, path })
    }

    /// 把重入闭包提交到池线程。
    pub fn reenter(&self, name: Cow<'static, str>, work: WorkUnit) {
        self.executor.execute(name, work);
    }
}
