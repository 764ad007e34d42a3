use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// 请求周期在异步协调内核中的生命周期状态。
///
/// # 状态机概览（What）
/// ```text
/// Active ──suspend──▶ Suspended ──complete──▶ Completing ──▶ Done
///    ▲                    │ dispatch                          ▲
///    │                    ├────────▶ Dispatching ──▶ Active   │
///    │                    │ timer                             │
///    └──(新周期)          ├────────▶ TimedOut ──未处理────────┤
///                         │ error            └─监听器救活─▶ (Completing/Dispatching)
///                         └────────▶ Errored ──未处理────────▶ Done
/// ```
///
/// # 并发约束
/// - 所有状态迁移由协调器内部的单一互斥量仲裁：并发触发源（定时器线程、
///   应用线程、工作单元线程）中恰好一个赢得迁移，败者观察到
///   `lifecycle.illegal_state` 或空操作，二者不会同时推进。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncPhase {
    /// 普通同步处理中，尚未挂起。
    Active,
    /// 工作线程已归还线程池，定时器已按配置武装。
    Suspended,
    /// 已认领派发迁移，等待处理单元在池线程上重新进入。
    Dispatching,
    /// 已认领完成迁移，`on_complete` 通知遍历进行中。
    Completing,
    /// 定时器赢得迁移，`on_timeout` 通知遍历进行中；监听器可在此窗口救活周期。
    TimedOut,
    /// 不可恢复故障赢得迁移，`on_error` 通知遍历进行中。
    Errored,
    /// 终态：连接已归还，任何后续操作均不合法。
    Done,
}

impl AsyncPhase {
    /// 是否处于不再派发监听器回调的终态。
    pub fn is_terminal(self) -> bool {
        matches!(self, AsyncPhase::Done)
    }
}

impl fmt::Display for AsyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 请求周期的进程内唯一标识，用于日志与观测关联。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleId(u64);

impl CycleId {
    /// 分配下一个周期标识。计数器进程级单调递增，不跨进程稳定。
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// 数值形式，供观测事件携带。
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cycle-{}", self.0)
    }
}

/// 某一时刻请求周期的只读快照，供测试与观测断言使用。
///
/// # 契约说明（What）
/// - 快照在协调器锁内一次性拷贝，字段间相互一致；
/// - `epoch` 表示挂起纪元序号：每次 `suspend` 递增，重入挂起开启新纪元；
/// - `timeout_ms <= 0` 表示定时器禁用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSnapshot {
    /// 周期标识。
    pub id: CycleId,
    /// 当前生命周期状态。
    pub phase: AsyncPhase,
    /// 当前挂起纪元（首次挂起前为 0）。
    pub epoch: u64,
    /// 当前配置的超时毫秒数。
    pub timeout_ms: i64,
    /// 当前持有的交换对是否仍是最初的那一对。
    pub original_exchange: bool,
}
