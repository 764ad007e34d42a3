//! 宿主作用域：处理单元与监听器工厂的注册域，带显式“注册 → 冻结 → 关闭”生命周期。
//!
//! # 模块定位（Why）
//! - 容器级监听器与处理单元只允许在作用域激活**之前**注册——激活后注册表
//!   冻结为只读，消除运行期注册与解析之间的竞态；
//! - 派发路由按 (作用域, 路径) 解析处理单元，本模块即解析的数据底座。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dispatch::ProcessingUnit;
use crate::error::{CoreError, Result, codes};
use crate::listener::{AsyncListener, CapabilityDescriptor, ListenerFactory, ListenerFactoryRegistry};

/// 作用域生命周期阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopePhase {
    /// 注册窗口开放：允许注册处理单元、工厂与作用域监听器。
    Registering,
    /// 已激活：注册表冻结，解析与实例化可用。
    Active,
    /// 已关闭：任何操作不再合法。
    Closed,
}

/// 作用域生命周期回调，默认全部空操作。
///
/// # 契约说明（What）
/// - `on_scope_activated` 在 `activate` 内、冻结完成后同步触发；
/// - `on_scope_closed` 在 `close` 内触发，此时解析已不可用；
/// - 回调按注册顺序执行，自身不得再调用注册类方法（会得到 `scope.frozen`）。
pub trait ScopeLifecycleListener: Send + Sync + 'static {
    /// 作用域激活完成。
    fn on_scope_activated(&self, scope: &Scope) {
        let _ = scope;
    }

    /// 作用域即将关闭。
    fn on_scope_closed(&self, scope: &Scope) {
        let _ = scope;
    }
}

struct ScopeState {
    phase: ScopePhase,
    units: HashMap<String, Arc<dyn ProcessingUnit>>,
    factories: ListenerFactoryRegistry,
    lifecycle: Vec<Arc<dyn ScopeLifecycleListener>>,
}

/// 宿主作用域句柄（克隆共享同一底层状态）。
///
/// # 并发契约
/// - 注册窗口通常在单线程启动序列内使用；激活后所有读路径（解析、实例化）
///   仅持锁做只读查找，无写竞争。
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    name: String,
    state: Mutex<ScopeState>,
}

impl Scope {
    /// 以名称创建处于注册窗口的作用域。
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name: name.into(),
                state: Mutex::new(ScopeState {
                    phase: ScopePhase::Registering,
                    units: HashMap::new(),
                    factories: ListenerFactoryRegistry::new(),
                    lifecycle: Vec::new(),
                }),
            }),
        }
    }

    /// 作用域名称。
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 当前生命周期阶段。
    pub fn phase(&self) -> ScopePhase {
        self.inner.state.lock().phase
    }

    fn ensure_registering(state: &ScopeState, operation: &'static str) -> Result<()> {
        match state.phase {
            ScopePhase::Registering => Ok(()),
            ScopePhase::Active => Err(CoreError::new(
                codes::SCOPE_FROZEN,
                format!("`{operation}` rejected: scope already activated"),
            )),
            ScopePhase::Closed => Err(CoreError::new(
                codes::SCOPE_CLOSED,
                format!("`{operation}` rejected: scope closed"),
            )),
        }
    }

    /// 在路径上注册处理单元。仅注册窗口内合法。
    pub fn register_unit(
        &self,
        path: impl Into<String>,
        unit: Arc<dyn ProcessingUnit>,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        Self::ensure_registering(&state, "register_unit")?;
        state.units.insert(path.into(), unit);
        Ok(())
    }

    /// 注册某能力的监听器工厂。仅注册窗口内合法。
    pub fn register_listener_factory(
        &self,
        descriptor: CapabilityDescriptor,
        factory: Arc<dyn ListenerFactory>,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        Self::ensure_registering(&state, "register_listener_factory")?;
        state.factories.register(descriptor, factory);
        Ok(())
    }

    /// 追加作用域生命周期监听器。仅注册窗口内合法。
    pub fn add_lifecycle_listener(
        &self,
        listener: Arc<dyn ScopeLifecycleListener>,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        Self::ensure_registering(&state, "add_lifecycle_listener")?;
        state.lifecycle.push(listener);
        Ok(())
    }

    /// 冻结注册表并激活作用域，随后按注册顺序触发 `on_scope_activated`。
    pub fn activate(&self) -> Result<()> {
        let listeners = {
            let mut state = self.inner.state.lock();
            Self::ensure_registering(&state, "activate")?;
            state.phase = ScopePhase::Active;
            state.lifecycle.clone()
        };
        for listener in listeners {
            listener.on_scope_activated(self);
        }
        Ok(())
    }

    /// 关闭作用域并触发 `on_scope_closed`。重复关闭返回 `scope.closed`。
    pub fn close(&self) -> Result<()> {
        let listeners = {
            let mut state = self.inner.state.lock();
            if state.phase == ScopePhase::Closed {
                return Err(CoreError::new(
                    codes::SCOPE_CLOSED,
                    "`close` rejected: scope already closed",
                ));
            }
            state.phase = ScopePhase::Closed;
            state.lifecycle.clone()
        };
        for listener in listeners {
            listener.on_scope_closed(self);
        }
        Ok(())
    }

    /// 按路径解析处理单元。仅激活后合法；未命中返回 `dispatch.target_not_found`。
    pub fn resolve_unit(&self, path: &str) -> Result<Arc<dyn ProcessingUnit>> {
        let state = self.inner.state.lock();
        match state.phase {
            ScopePhase::Active => {}
            ScopePhase::Registering => {
                return Err(CoreError::new(
                    codes::SCOPE_FROZEN,
                    "`resolve_unit` rejected: scope not yet activated",
                ));
            }
            ScopePhase::Closed => {
                return Err(CoreError::new(
                    codes::SCOPE_CLOSED,
                    "`resolve_unit` rejected: scope closed",
                ));
            }
        }
        state
            .units
            .get(path)
            .cloned()
            .ok_or_else(|| CoreError::dispatch_target_not_found(path))
    }

    /// 按能力描述符制造容器托管监听器实例（不注册）。
    ///
    /// 工厂的 `create` 在锁外执行：工厂可以安全地回调同一作用域
    /// （例如委托到另一个能力）而不会在互斥量上自锁。
    pub fn create_listener(
        &self,
        descriptor: &CapabilityDescriptor,
    ) -> Result<Arc<dyn AsyncListener>> {
        let factory = {
            let state = self.inner.state.lock();
            state.factories.lookup(descriptor)?
        };
        Ok(factory.create())
    }
}
