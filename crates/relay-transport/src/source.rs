use bytes::BufMut;

use crate::Result;

/// 非阻塞探测的三态结果。
///
/// # 契约说明（What）
/// - `Ready`：至少有一个字节可立即读取（或有写容量，写侧对称）；
/// - `NotReady`：当前没有可用数据，调用方应登记兴趣并等待就绪边沿；
/// - `Exhausted`：输入已（正常）耗尽，之后不会再有 `Ready`。
///
/// # 与就绪通道的关系
/// - `relay-core` 的就绪通道依据该探测值驱动“边沿去重”协议：消费方必须在
///   读到 `NotReady` 之后重新探测，才会获得下一次就绪通知。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceProbe {
    /// 可立即读取。
    Ready,
    /// 暂无数据。
    NotReady,
    /// 输入已耗尽（吸收态）。
    Exhausted,
}

/// 单次非阻塞读取的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// 成功读入 `usize` 个字节。
    Read(usize),
    /// 当前会阻塞，未读入任何字节。
    WouldBlock,
    /// 输入已耗尽。
    Exhausted,
}

/// 面向字节的非阻塞输入源契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 挂起的请求体读取不能占用工作线程等待数据；内核需要一个“探测 + 非阻塞读”
///   的最小接口，把阻塞等待替换为由传输驱动推送的就绪边沿；
/// - 探测与读取分离，使“消费方必须先观察到 NotReady 再等待通知”的防漏唤醒
///   协议可以在内核侧统一实现，而无需信任具体传输的回调时序。
///
/// ## 契约说明（What）
/// - `probe` 非阻塞返回当前三态；实现不得在其中做任何 I/O 等待；
/// - `read` 以尽力而为方式填充 `buf`，绝不阻塞；返回 `WouldBlock` 时
///   调用方应回到探测循环；
/// - 输入一旦返回 `Exhausted`，两个方法必须稳定维持该结果。
///
/// ## 并发约束
/// - 同一时刻只允许一个消费方线程调用 `read`（由就绪通道的单回调注册规则保证）；
///   `probe` 可被并发调用。
pub trait ByteSource: Send + Sync + 'static {
    /// 非阻塞探测当前可读性。
    fn probe(&self) -> Result<SourceProbe>;

    /// 非阻塞读取，尽力填充缓冲区。
    fn read(&self, buf: &mut dyn BufMut) -> Result<ReadOutcome>;
}
