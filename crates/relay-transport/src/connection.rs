use std::borrow::Cow;

/// 连接归还后的处置决策，由传输实现结合协议与自身状态给出。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseDecision {
    /// 连接可复用，回到传输层的空闲池等待下一个请求。
    Reuse,
    /// 连接必须关闭（协议要求、发生过错误或对端已断开）。
    Close,
}

/// 底层连接的归还契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 挂起期间连接的所有权逻辑上停留在生命周期内核：工作线程已归还线程池，
///   只有终态转换（complete/超时/错误的默认处置）有资格把连接交还传输层；
/// - 该契约把“交还”动作显式化，使状态机可以保证连接恰好被归还一次——
///   这是并发仲裁（定时器线程 vs. 应用线程）要守住的资源不变量。
///
/// ## 契约说明（What）
/// - `release`：冲刷并归还连接，返回复用/关闭决策；实现内部应幂等防御，
///   但内核承诺在单个请求周期内至多调用一次归还类方法；
/// - `abort`：超时/错误默认处置的归还口，传输实现可据此跳过冲刷直接关闭。
///
/// ## 风险提示（Trade-offs）
/// - 决策值目前仅用于观测与测试断言；连接池的实际管理完全在传输侧完成。
pub trait Connection: Send + Sync + 'static {
    /// 可用于日志与追踪的连接标识。
    fn id(&self) -> Cow<'_, str>;

    /// 正常完成后的冲刷与归还。
    fn release(&self) -> ReleaseDecision;

    /// 超时/错误终态下的归还。
    fn abort(&self) -> ReleaseDecision;
}
