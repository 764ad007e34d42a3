#![deny(unsafe_code)]
#![doc = "relay-transport: 传输协作方契约统一抽象层。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：异步生命周期内核（relay-core）不直接操纵套接字、缓冲区与解析器，它只消费一组边界契约；本 crate 即该边界的单一事实来源。"]
#![doc = "- **What**：定义请求/响应交换对（`Exchange`）、连接归还决策（`Connection`）与非阻塞字节源探测（`ByteSource`）三类 trait，以及配套的结构化错误。"]
#![doc = "- **How**：所有接口以对象安全形式暴露（`Arc<dyn ...>`），传输实现方只需依赖本 crate 即可与内核解耦；协议细节（HTTP 解析、连接池）完全留在实现侧。"]

/// `Result` 是传输契约内部使用的统一返回别名。
///
/// # 设计背景（Why）
/// - `relay-core` 依赖本 crate 暴露的接口，若在此引入 `relay-core` 的错误类型会形成依赖环；
/// - 通过本地别名配合 [`TransportError`]，上层可在桥接处 `map_err` 为内核标准错误。
pub type Result<T, E = TransportError> = core::result::Result<T, E>;

pub mod connection;
pub mod error;
pub mod exchange;
pub mod source;

pub use connection::{Connection, ReleaseDecision};
pub use error::{TransportError, TransportErrorKind};
pub use exchange::{ExchangePair, Request, Response};
pub use source::{ByteSource, ReadOutcome, SourceProbe};
