use core::fmt;
use std::sync::Arc;

use crate::Result;

/// 请求侧边界契约：内核只读取路径元数据与读写请求属性，不触碰报文体。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 挂起/恢复机制要求在派发到新处理单元时，仍能向业务暴露“原始请求”的路径六元组
///   （URI、上下文路径、映射、路径尾缀、单元路径、查询串）；
/// - 这些值由传输实现在解析入站报文时填充，内核仅做快照与转存，因此契约面刻意收敛为
///   只读访问器加一个通用属性袋。
///
/// ## 契约说明（What）
/// - 所有访问器返回解析时刻的值；在一次请求周期内必须保持稳定；
/// - `attribute`/`set_attribute` 是属性袋的读写口，内核用它写入保留键
///   （`async.request_uri` 等），业务代码也可自由使用其他键；
/// - 实现必须线程安全：挂起的请求可能被定时器线程、工作单元线程并发触达。
///
/// ## 风险提示（Trade-offs）
/// - 属性值统一为 `String`，牺牲了类型精度换取对象安全与跨线程简单性；
///   需要结构化数据的调用方应自行序列化。
pub trait Request: Send + Sync + 'static {
    /// 入站请求的完整 URI（不含协议与主机）。
    fn uri(&self) -> String;

    /// 宿主作用域的上下文路径前缀。
    fn context_path(&self) -> String;

    /// 命中的路由映射模式（如 `/orders/*`）。
    fn mapping(&self) -> String;

    /// 映射之后剩余的路径尾缀；无则为 `None`。
    fn path_info(&self) -> Option<String>;

    /// 命中的处理单元路径。
    fn unit_path(&self) -> String;

    /// 原始查询串；无则为 `None`。
    fn query_string(&self) -> Option<String>;

    /// 读取请求属性。
    fn attribute(&self, key: &str) -> Option<String>;

    /// 写入请求属性（覆盖旧值）。
    fn set_attribute(&self, key: &str, value: String);
}

/// 响应侧边界契约：内核只在默认处置与终止清理时触达响应。
///
/// # 契约说明（What）
/// - `send_error`：写出一个错误类终态响应（默认处置使用服务不可用一类的状态码）；
///   若响应已提交，实现应返回 [`crate::TransportErrorKind::Protocol`] 类错误；
/// - `flush`：将已缓冲的响应字节推向对端，`complete()` 归还连接前由传输驱动调用。
///
/// # 并发约束
/// - 与 [`Request`] 相同，实现必须可被多线程并发持有；内核保证同一时刻只有一个
///   线程会实际调用写出方法（由生命周期状态机仲裁）。
pub trait Response: Send + Sync + 'static {
    /// 写出错误终态响应。
    fn send_error(&self, status: u16, message: &str) -> Result<()>;

    /// 冲刷缓冲的响应数据。
    fn flush(&self) -> Result<()>;
}

/// 一次请求周期当前生效的请求/响应对。
///
/// # 设计背景（Why）
/// - 重入挂起（dispatch 后再次 suspend）允许业务替换包装后的请求/响应；
///   内核需要按值传递“当前对”，同时保持各监听器绑定时刻的对不变。
///   以 `Arc` 对的形式聚合正好满足两点：克隆廉价、跨线程共享安全。
#[derive(Clone)]
pub struct ExchangePair {
    request: Arc<dyn Request>,
    response: Arc<dyn Response>,
}

impl ExchangePair {
    /// 以给定请求/响应构造交换对。
    pub fn new(request: Arc<dyn Request>, response: Arc<dyn Response>) -> Self {
        Self { request, response }
    }

    /// 当前请求。
    pub fn request(&self) -> &Arc<dyn Request> {
        &self.request
    }

    /// 当前响应。
    pub fn response(&self) -> &Arc<dyn Response> {
        &self.response
    }

    /// 判断两对是否指向同一底层对象（用于原始对识别）。
    pub fn same_identity(&self, other: &ExchangePair) -> bool {
        Arc::ptr_eq(&self.request, &other.request) && Arc::ptr_eq(&self.response, &other.response)
    }
}

impl fmt::Debug for ExchangePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangePair")
            .field("uri", &self.request.uri())
            .finish_non_exhaustive()
    }
}
