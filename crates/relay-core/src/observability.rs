//! 协调器观测钩子：契约层只定义事件与接收口，不绑定任何遥测实现。
//!
//! # 模块定位（Why）
//! - 状态机的迁移、定时器触发与监听器故障都是运维关心的结构化事实；
//!   内核以事件值的形式推给注入的观察者，由宿主桥接到自家日志/指标体系；
//! - 核心 crate 保持零遥测依赖，观测后端的选择权完全留给宿主。

use relay_transport::ReleaseDecision;

use crate::cycle::AsyncPhase;
use crate::listener::PassKind;

/// 协调器生命周期的结构化观测事件。
///
/// # 契约说明（What）
/// - 事件在迁移发生的线程上同步投递，观察者实现必须轻量且不得阻塞；
/// - `cycle` 为周期标识数值，跨事件关联用；
/// - 枚举为 `non_exhaustive` 语义演进预留：观察者应容忍未知事件。
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoordinatorEvent {
    /// 新挂起纪元建立。
    Suspended {
        /// 周期标识。
        cycle: u64,
        /// 纪元序号。
        epoch: u64,
        /// 本纪元武装的超时毫秒数（`<= 0` 表示禁用）。
        timeout_ms: i64,
    },
    /// 超时定时器赢得迁移认领。
    TimerClaimed {
        /// 周期标识。
        cycle: u64,
        /// 触发的纪元序号。
        epoch: u64,
    },
    /// 一次通知遍历结束。
    PassCompleted {
        /// 周期标识。
        cycle: u64,
        /// 遍历类别。
        kind: PassKind,
        /// 通知的监听器数量。
        notified: usize,
        /// 被隔离的监听器故障数量。
        faults: usize,
    },
    /// 单个监听器在遍历中抛出的故障（逐条投递，便于定位）。
    ListenerFault {
        /// 周期标识。
        cycle: u64,
        /// 故障发生的遍历类别。
        kind: PassKind,
        /// 故障的稳定错误码。
        code: &'static str,
    },
    /// 周期向派发目标重新进入。
    Dispatched {
        /// 周期标识。
        cycle: u64,
        /// 解析后的目标路径。
        path: String,
    },
    /// 周期抵达终态。
    Terminal {
        /// 周期标识。
        cycle: u64,
        /// 终态前的最后一个阶段（`Completing`/`TimedOut`/`Errored`）。
        phase: AsyncPhase,
    },
    /// 底层连接归还传输层。
    ConnectionReleased {
        /// 周期标识。
        cycle: u64,
        /// 传输侧给出的复用/关闭决策。
        decision: ReleaseDecision,
    },
}

/// 观测事件的接收口。
pub trait LifecycleObserver: Send + Sync + 'static {
    /// 接收一条事件。实现不得阻塞、不得回调协调器的迁移操作。
    fn on_event(&self, event: &CoordinatorEvent);
}

/// 丢弃所有事件的缺省观察者。
#[derive(Debug, Clone, Default)]
pub struct NoopLifecycleObserver;

impl LifecycleObserver for NoopLifecycleObserver {
    fn on_event(&self, _event: &CoordinatorEvent) {}
}
