#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "relay-core: 同步请求/响应容器的异步生命周期协调内核。"]
#![doc = ""]
#![doc = "== 定位 =="]
#![doc = "本 crate 解决一个聚焦的问题：工作线程在 `suspend` 后立即归还线程池，"]
#![doc = "请求周期随后由显式 `complete`、恢复目标 `dispatch`、后台工作单元、"]
#![doc = "超时定时器或不可恢复故障之一推进，并发触发源之间恰好一个赢得迁移认领。"]
#![doc = "同时提供挂起期间安全消费入站字节的边沿去重就绪协议。"]
#![doc = ""]
#![doc = "== 契约测试 =="]
#![doc = "状态机的公开行为（迁移合法性、通知遍历次序、连接恰好归还一次）由"]
#![doc = "`tests/` 下的契约测试与属性测试固化；对迁移规则的任何改动必须同步更新。"]

pub mod config;
pub mod coordinator;
pub mod cycle;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod observability;
pub mod readiness;
pub mod runtime;
pub mod scope;
/// 测试桩命名空间，集中暴露官方维护的记录型桩实现，供契约测试与示例复用。
pub mod test_stubs;
pub mod time;

pub use config::{AsyncSettings, SettingsHandle};
pub use coordinator::{AsyncCoordinator, CoordinatorBuilder};
pub use cycle::{AsyncPhase, CycleId, CycleSnapshot};
pub use dispatch::{
    DispatchRouter, DispatchTarget, OriginSnapshot, ProcessingUnit, ResolvedDispatch, reserved,
};
pub use error::{CoreError, Result, codes};
pub use listener::{
    AsyncEvent, AsyncListener, CapabilityDescriptor, ListenerBinding, ListenerFactory,
    ListenerFactoryRegistry, ListenerRegistry, NotifyReport, PassKind,
};
pub use observability::{CoordinatorEvent, LifecycleObserver, NoopLifecycleObserver};
pub use readiness::{ReadListener, ReadinessChannel, ReadinessState};
pub use runtime::{DetachedThreadExecutor, WorkExecutor, WorkUnit};
pub use scope::{Scope, ScopeLifecycleListener, ScopePhase};
pub use time::{Clock, MockClock, Sleep, SystemClock, TimerHandle, TimerService};
