use core::fmt;

/// 传输层故障的粗粒度分类。
///
/// # 契约说明（What）
/// - `Io`：读写底层字节流时的不可恢复失败（对端重置、内核缓冲异常等）；
/// - `Closed`：连接已被对端或本端关闭，后续操作不再合法；
/// - `Protocol`：传输实现内部的协议级违例（例如在响应已提交后再次写头部）。
///
/// # 使用指引（How）
/// - 内核侧只依据分类决定生命周期走向（全部归入错误转换），不解析具体报文语义；
/// - 实现方若需更细的诊断信息，应放入 [`TransportError::message`] 而非扩展枚举。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// 底层 I/O 失败。
    Io,
    /// 连接已经关闭。
    Closed,
    /// 传输实现内部协议违例。
    Protocol,
}

/// 传输协作方向内核上报的结构化错误。
///
/// # 设计背景（Why）
/// - 非阻塞模式下故障发生时，发起请求的线程早已归还线程池；错误只能以值的形式
///   穿过回调边界，而不能沿调用栈展开。因此这里选择自包含的 `kind + message`
///   结构，保证 `Send + Sync + 'static`，可安全跨线程投递给监听器。
///
/// # 契约说明（What）
/// - `kind`：稳定分类，供内核与观测侧做机读处置；
/// - `message`：面向排障人员的描述，不应包含敏感信息。
#[derive(Debug, Clone)]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    /// 构造传输错误。
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 返回错误分类。
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// 返回排障描述。
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error ({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}
