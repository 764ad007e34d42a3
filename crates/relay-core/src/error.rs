use core::fmt;
use std::borrow::Cow;

use relay_transport::TransportError;

/// `CoreError` 是内核对外暴露的统一错误形态：稳定错误码 + 排障消息 + 可选根因。
///
/// # 设计背景（Why）
/// - 生命周期违例（在错误状态上调用 `dispatch`/`complete` 等）是**可恢复的调用方错误**，
///   不是进程级故障；挂起的请求又横跨多个线程，异常展开在这里失去意义。
///   因此所有故障一律以值返回，错误码承载稳定语义，供日志、指标与测试做机读断言。
///
/// # 契约说明（What）
/// - `code`：`&'static str`，遵循 `<域>.<语义>` 命名（见 [`codes`]），跨版本保持稳定；
/// - `message`：面向排障人员的自然语言描述，不参与程序判定；
/// - `cause`：可选的底层根因（例如传输层错误），用于错误链路展示。
///
/// # 风险提示（Trade-offs）
/// - 采用开放的字符串码而非封闭枚举，换取下游扩展空间；代价是拼写错误只能靠
///   统一引用 [`codes`] 常量来防御。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

/// 内核稳定错误码清单，`<域>.<语义>` 命名，新增须同步更新契约测试。
pub mod codes {
    /// 操作对当前生命周期状态不合法（非 `SUSPENDED` 时调用 `dispatch`/`complete`/`add_listener` 等）。
    pub const LIFECYCLE_ILLEGAL_STATE: &str = "lifecycle.illegal_state";
    /// 挂起周期因超时进入终态（默认处置路径使用）。
    pub const LIFECYCLE_TIMEOUT: &str = "lifecycle.timeout";
    /// 路径/作用域无法解析到已注册的处理单元。
    pub const DISPATCH_TARGET_NOT_FOUND: &str = "dispatch.target_not_found";
    /// 监听器工厂不认识所请求的能力描述符。
    pub const LISTENER_UNSUPPORTED_CAPABILITY: &str = "listener.unsupported_capability";
    /// 就绪通道的回调已被注册，拒绝二次注册。
    pub const IO_ALREADY_REGISTERED: &str = "io.already_registered";
    /// 传输协作方上报的 I/O 故障。
    pub const IO_TRANSPORT: &str = "io.transport";
    /// 作用域已激活冻结，注册类操作被拒绝。
    pub const SCOPE_FROZEN: &str = "scope.frozen";
    /// 作用域已关闭，任何操作不再合法。
    pub const SCOPE_CLOSED: &str = "scope.closed";
}

impl CoreError {
    /// 构造核心错误。`code` 必须取自 [`codes`] 或遵循相同命名约定。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 附带底层根因并返回新错误。
    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 生命周期违例的便捷构造：记录当前状态与被拒绝的操作名。
    pub fn illegal_lifecycle(operation: &'static str, phase: impl fmt::Debug) -> Self {
        Self::new(
            codes::LIFECYCLE_ILLEGAL_STATE,
            format!("operation `{operation}` rejected in phase {phase:?}"),
        )
    }

    /// 派发目标解析失败的便捷构造。
    pub fn dispatch_target_not_found(path: &str) -> Self {
        Self::new(
            codes::DISPATCH_TARGET_NOT_FOUND,
            format!("no processing unit registered for path `{path}`"),
        )
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 排障描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 底层根因（若有）。
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (cause: {cause})")?;
        }
        Ok(())
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<TransportError> for CoreError {
    fn from(error: TransportError) -> Self {
        Self::new(codes::IO_TRANSPORT, error.message().to_owned()).with_cause(error)
    }
}

/// 内核统一的 `Result` 别名，错误默认为 [`CoreError`]。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use relay_transport::TransportErrorKind;

    #[test]
    fn transport_error_converts_with_cause_chain() {
        let err: CoreError =
            TransportError::new(TransportErrorKind::Io, "peer reset").into();
        assert_eq!(err.code(), codes::IO_TRANSPORT);
        assert!(err.cause().is_some(), "传输根因必须保留在错误链上");
    }

    #[test]
    fn illegal_lifecycle_mentions_operation_and_phase() {
        #[derive(Debug)]
        struct PhaseStub;
        let err = CoreError::illegal_lifecycle("complete", PhaseStub);
        assert_eq!(err.code(), codes::LIFECYCLE_ILLEGAL_STATE);
        assert!(err.message().contains("complete"));
    }
}
