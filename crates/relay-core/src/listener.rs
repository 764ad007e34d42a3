//! 生命周期监听器契约与有序注册表。
//!
//! # 模块定位（Why）
//! - 挂起周期的四类生命周期事件（开始挂起/完成/超时/出错）以回调形式投递；
//!   回调次序、绑定的交换对、快照语义都在这里固化；
//! - 监听器实例化走“能力描述符 → 工厂”的显式注册路径，不依赖任何
//!   反射式类实例化。

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use relay_transport::ExchangePair;

use crate::coordinator::AsyncCoordinator;
use crate::error::{CoreError, Result, codes};

/// 一次通知遍历的类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// 挂起纪元开始（`suspend` 内同步触发）。
    StartAsync,
    /// 正常完成。
    Complete,
    /// 定时器到点。
    Timeout,
    /// 不可恢复故障。
    Error,
}

/// 投递给监听器的事件载荷。
///
/// # 契约说明（What）
/// - `coordinator`：当前周期的协调器句柄，监听器可在回调内直接调用
///   `complete`/`dispatch` 救活超时或错误周期（立即生效，遍历继续）；
/// - `pair`：**该监听器注册时刻**绑定的交换对，而非周期当前对；
/// - `cause`：超时/错误遍历携带的故障原因，其余遍历为 `None`。
#[derive(Clone)]
pub struct AsyncEvent {
    coordinator: AsyncCoordinator,
    pair: ExchangePair,
    cause: Option<Arc<CoreError>>,
}

impl AsyncEvent {
    pub(crate) fn new(
        coordinator: AsyncCoordinator,
        pair: ExchangePair,
        cause: Option<Arc<CoreError>>,
    ) -> Self {
        Self {
            coordinator,
            pair,
            cause,
        }
    }

    /// 周期协调器句柄。
    pub fn coordinator(&self) -> &AsyncCoordinator {
        &self.coordinator
    }

    /// 注册时刻绑定的交换对。
    pub fn pair(&self) -> &ExchangePair {
        &self.pair
    }

    /// 故障原因（仅超时/错误遍历携带）。
    pub fn cause(&self) -> Option<&Arc<CoreError>> {
        self.cause.as_ref()
    }
}

/// 异步生命周期监听器：四个回调对应四类遍历，默认全部空操作。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 以“能力集”的方式建模：实现者只覆写关心的回调，未覆写的能力自动退
///   化为空操作，效果等同按接口拆分出的能力变体；
/// - 回调返回 [`Result`]：I/O 类故障以值的形式交还通知遍历聚合，
///   不会沿陌生调用栈展开（回调执行线程与注册线程通常不同）。
///
/// ## 并发契约
/// - 回调在驱动迁移的线程上同步执行（超时遍历在定时器线程、完成遍历在
///   调用 `complete` 的线程）；回调不得无限阻塞，否则会占死该线程名额；
/// - 单个监听器的故障不会阻断同遍历中后续监听器的通知。
pub trait AsyncListener: Send + Sync + 'static {
    /// 新挂起纪元开始。每纪元对每个已注册监听器恰好触发一次。
    fn on_start_async(&self, event: &AsyncEvent) -> Result<()> {
        let _ = event;
        Ok(())
    }

    /// 周期正常完成。
    fn on_complete(&self, event: &AsyncEvent) -> Result<()> {
        let _ = event;
        Ok(())
    }

    /// 挂起超时。回调内调用 `complete`/`dispatch` 即视为“超时已处理”。
    fn on_timeout(&self, event: &AsyncEvent) -> Result<()> {
        let _ = event;
        Ok(())
    }

    /// 不可恢复故障。处理方式与超时对称。
    fn on_error(&self, event: &AsyncEvent) -> Result<()> {
        let _ = event;
        Ok(())
    }
}

/// 监听器与其注册时刻交换对的绑定。
#[derive(Clone)]
pub struct ListenerBinding {
    listener: Arc<dyn AsyncListener>,
    pair: ExchangePair,
}

impl ListenerBinding {
    pub(crate) fn new(listener: Arc<dyn AsyncListener>, pair: ExchangePair) -> Self {
        Self { listener, pair }
    }

    /// 绑定的监听器。
    pub fn listener(&self) -> &Arc<dyn AsyncListener> {
        &self.listener
    }

    /// 注册时刻的交换对。
    pub fn pair(&self) -> &ExchangePair {
        &self.pair
    }
}

/// 按注册顺序保存绑定的追加型注册表。
///
/// # 契约说明（What）
/// - 只增不删：单个绑定从不被单独移除，终态迁移时整体清空；
/// - 绑定跨派发/再挂起纪元持续存活（监听器按顶层异步序列注册一次，
///   `on_start_async` 却按纪元重复触发）；
/// - `snapshot` 在遍历开始的瞬间取定：遍历期间新增的绑定不参与本遍历，
///   只会出现在下一纪元的 `on_start_async` 中。
#[derive(Default)]
pub struct ListenerRegistry {
    bindings: Vec<ListenerBinding>,
}

impl ListenerRegistry {
    /// 创建空注册表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个绑定。调用方（协调器）负责先校验生命周期状态。
    pub fn push(&mut self, binding: ListenerBinding) {
        self.bindings.push(binding);
    }

    /// 当前绑定数量。
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// 是否没有任何绑定。
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// 取定一份用于通知遍历的固定快照。
    pub fn snapshot(&self) -> Vec<ListenerBinding> {
        self.bindings.clone()
    }

    /// 终态迁移时整体清空。
    pub fn clear(&mut self) {
        self.bindings.clear();
    }
}

/// 一次通知遍历的聚合结果：逐监听器隔离的故障集合。
///
/// # 设计背景（Why）
/// - 通知契约要求“单个监听器的故障不得阻断同遍历后续监听器”，故障在遍历
///   结束后一次性上报；本结构即聚合载体，经观测通道对外可见。
#[derive(Debug)]
pub struct NotifyReport {
    kind: PassKind,
    notified: usize,
    faults: Vec<CoreError>,
}

impl NotifyReport {
    pub(crate) fn new(kind: PassKind) -> Self {
        Self {
            kind,
            notified: 0,
            faults: Vec::new(),
        }
    }

    pub(crate) fn record_success(&mut self) {
        self.notified += 1;
    }

    pub(crate) fn record_fault(&mut self, fault: CoreError) {
        self.notified += 1;
        self.faults.push(fault);
    }

    /// 遍历类别。
    pub fn kind(&self) -> PassKind {
        self.kind
    }

    /// 实际通知的监听器数量。
    pub fn notified(&self) -> usize {
        self.notified
    }

    /// 被隔离聚合的监听器故障。
    pub fn faults(&self) -> &[CoreError] {
        &self.faults
    }
}

/// 监听器能力描述符：工厂注册与查找的键。
///
/// # 设计背景（Why）
/// - 容器托管监听器不以类型反射实例化；能力以稳定名称标识，宿主在
///   作用域激活前注册工厂，业务运行期按名索取实例。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapabilityDescriptor(Cow<'static, str>);

impl CapabilityDescriptor {
    /// 以稳定名称构造描述符。
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// 描述符名称。
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// 容器托管监听器的工厂契约。
pub trait ListenerFactory: Send + Sync + 'static {
    /// 制造一个新的监听器实例（不注册）。
    fn create(&self) -> Arc<dyn AsyncListener>;
}

/// 能力描述符到工厂的映射表，宿主作用域持有。
#[derive(Default)]
pub struct ListenerFactoryRegistry {
    factories: HashMap<CapabilityDescriptor, Arc<dyn ListenerFactory>>,
}

impl ListenerFactoryRegistry {
    /// 创建空映射表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册（或覆盖）某能力的工厂。
    pub fn register(&mut self, descriptor: CapabilityDescriptor, factory: Arc<dyn ListenerFactory>) {
        self.factories.insert(descriptor, factory);
    }

    /// 按描述符查找工厂。实例化由调用方在自身锁域之外完成，
    /// 避免用户代码在注册表持锁期间回调作用域。
    ///
    /// # 错误语义
    /// - 未注册的能力返回 `listener.unsupported_capability`。
    pub fn lookup(&self, descriptor: &CapabilityDescriptor) -> Result<Arc<dyn ListenerFactory>> {
        self.factories
            .get(descriptor)
            .cloned()
            .ok_or_else(|| {
                CoreError::new(
                    codes::LISTENER_UNSUPPORTED_CAPABILITY,
                    format!("no listener factory for capability `{}`", descriptor.name()),
                )
            })
    }
}
