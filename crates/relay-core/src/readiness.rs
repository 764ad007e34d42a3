//! 就绪通道：非阻塞输入的边沿去重通知协议。
//!
//! # 模块定位（Why）
//! - 挂起的请求不允许任何线程阻塞在读上；数据到达由传输驱动以“就绪边沿”
//!   推入本通道，通道再按契约决定是否打扰消费方；
//! - 协议的核心是防重复唤醒：消费方必须先读到“不就绪”并重新查询，
//!   才有资格收到下一次通知——本模块是该规则的唯一实现点。
//!
//! # 契约速览（What）
//! - 回调注册至多一次（`io.already_registered`）；
//! - 注册时数据已可读的，补发恰好一次 `on_data_available`；
//! - `on_all_data_read` 恰好一次，之后不再有任何数据通知；
//! - `on_error` 至多一次且为吸收态。

use std::sync::Arc;

use parking_lot::Mutex;
use relay_transport::{ByteSource, SourceProbe, TransportError};

use crate::error::{CoreError, Result, codes};

/// 输入方向的就绪三态。`Terminated` 为吸收态（输入耗尽或已出错）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    /// 暂无数据可读。
    NotReady,
    /// 至少一个字节可立即读取。
    Ready,
    /// 不再产生任何就绪事件。
    Terminated,
}

/// 非阻塞读事件的接收契约。
///
/// # 并发契约
/// - 回调在推动边沿的线程（传输驱动线程或注册线程）上同步执行；
/// - 同一时刻至多一个回调在途：通道内部以互斥量串行化投递决策；
/// - `on_data_available` 应循环读取直到 [`ReadinessChannel::is_ready`]
///   返回 `false`，否则将错过后续通知（这是契约而非缺陷）。
pub trait ReadListener: Send + Sync + 'static {
    /// 有数据可读。每个就绪边沿至多触发一次。
    fn on_data_available(&self) -> Result<()>;

    /// 输入已全部读完。恰好触发一次。
    fn on_all_data_read(&self) -> Result<()>;

    /// 读取过程中出错。至多触发一次，之后通道静默。
    fn on_error(&self, error: &CoreError);
}

struct ChannelState {
    listener: Option<Arc<dyn ReadListener>>,
    /// 兴趣位：真表示下一个就绪边沿需要通知消费方。
    /// 注册时置真（首次数据不得错过），投递后清零，
    /// 仅在消费方重新查询读到“不就绪”时再次置真。
    interest: bool,
    readiness: ReadinessState,
    all_read_fired: bool,
    errored: bool,
}

/// 投递决策：在锁内计算、锁外执行，避免回调重入互斥量。
enum Delivery {
    None,
    Data(Arc<dyn ReadListener>),
    AllRead(Arc<dyn ReadListener>),
    Fault(Arc<dyn ReadListener>, CoreError),
}

/// 输入侧就绪通道。输出容量侧契约对称，由传输实现自建对应通道。
#[derive(Clone)]
pub struct ReadinessChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    source: Arc<dyn ByteSource>,
    state: Mutex<ChannelState>,
}

impl ReadinessChannel {
    /// 以字节源构造通道。
    pub fn new(source: Arc<dyn ByteSource>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                source,
                state: Mutex::new(ChannelState {
                    listener: None,
                    interest: false,
                    readiness: ReadinessState::NotReady,
                    all_read_fired: false,
                    errored: false,
                }),
            }),
        }
    }

    /// 底层字节源（消费方读数据用）。
    pub fn source(&self) -> &Arc<dyn ByteSource> {
        &self.inner.source
    }

    /// 当前就绪状态（观测与测试用，非消费协议的一部分）。
    pub fn state(&self) -> ReadinessState {
        self.inner.state.lock().readiness
    }

    /// 注册读回调。每个流至多一次。
    ///
    /// # 边界语义（What）
    /// - 二次注册返回 `io.already_registered`，旧回调保持唯一所有权，
    ///   防止两个消费方竞争同一字节流；
    /// - 若注册时数据已可读（就绪早于注册），在本调用内补发恰好一次
    ///   `on_data_available`；输入已耗尽则补发 `on_all_data_read`。
    pub fn register(&self, listener: Arc<dyn ReadListener>) -> Result<()> {
        let delivery = {
            let mut state = self.inner.state.lock();
            if state.listener.is_some() {
                return Err(CoreError::new(
                    codes::IO_ALREADY_REGISTERED,
                    "read callback already registered for this stream",
                ));
            }
            state.listener = Some(Arc::clone(&listener));
            state.interest = true;
            self.probe_locked(&mut state)
        };
        self.deliver(delivery);
        Ok(())
    }

    /// 消费方的就绪查询：`true` 表示可以立即非阻塞读取。
    ///
    /// # 协议作用（Why）
    /// - 返回 `false` 的同时把兴趣位重新武装——这一步是“之后的数据到达
    ///   会再次通知我”的唯一授权动作；不查询就没有下一次通知。
    pub fn is_ready(&self) -> bool {
        let (ready, delivery) = {
            let mut state = self.inner.state.lock();
            if state.errored || state.readiness == ReadinessState::Terminated {
                return false;
            }
            match self.inner.source.probe() {
                Ok(SourceProbe::Ready) => {
                    state.readiness = ReadinessState::Ready;
                    (true, Delivery::None)
                }
                Ok(SourceProbe::NotReady) => {
                    state.readiness = ReadinessState::NotReady;
                    state.interest = true;
                    (false, Delivery::None)
                }
                Ok(SourceProbe::Exhausted) => (false, Self::claim_all_read(&mut state)),
                Err(error) => (false, Self::claim_fault(&mut state, error.into())),
            }
        };
        self.deliver(delivery);
        ready
    }

    /// 传输驱动推入一个“不就绪 → 就绪”边沿。
    ///
    /// # 去重语义
    /// - 兴趣位未武装（消费方尚未重新查询）时边沿被静默吸收，
    ///   不产生重复唤醒；就绪状态仍然更新，供后续查询观察。
    pub fn on_readiness_edge(&self) {
        let delivery = {
            let mut state = self.inner.state.lock();
            if state.errored || state.readiness == ReadinessState::Terminated {
                return;
            }
            state.readiness = ReadinessState::Ready;
            match (&state.listener, state.interest) {
                (Some(listener), true) => {
                    let listener = Arc::clone(listener);
                    state.interest = false;
                    Delivery::Data(listener)
                }
                _ => Delivery::None,
            }
        };
        self.deliver(delivery);
    }

    /// 传输驱动宣告输入正常耗尽。
    pub fn on_input_exhausted(&self) {
        let delivery = {
            let mut state = self.inner.state.lock();
            Self::claim_all_read(&mut state)
        };
        self.deliver(delivery);
    }

    /// 传输驱动上报读取故障。吸收态：之后任何通知都不再投递。
    pub fn on_source_error(&self, error: TransportError) {
        let delivery = {
            let mut state = self.inner.state.lock();
            Self::claim_fault(&mut state, error.into())
        };
        self.deliver(delivery);
    }

    /// 锁内做一次探测并给出注册补发决策。
    fn probe_locked(&self, state: &mut ChannelState) -> Delivery {
        match self.inner.source.probe() {
            Ok(SourceProbe::Ready) => {
                state.readiness = ReadinessState::Ready;
                match (&state.listener, state.interest) {
                    (Some(listener), true) => {
                        let listener = Arc::clone(listener);
                        state.interest = false;
                        Delivery::Data(listener)
                    }
                    _ => Delivery::None,
                }
            }
            Ok(SourceProbe::NotReady) => {
                state.readiness = ReadinessState::NotReady;
                Delivery::None
            }
            Ok(SourceProbe::Exhausted) => Self::claim_all_read(state),
            Err(error) => Self::claim_fault(state, error.into()),
        }
    }

    /// 认领唯一一次 `on_all_data_read` 投递并进入吸收态。
    fn claim_all_read(state: &mut ChannelState) -> Delivery {
        if state.errored || state.all_read_fired {
            state.readiness = ReadinessState::Terminated;
            return Delivery::None;
        }
        state.readiness = ReadinessState::Terminated;
        match &state.listener {
            Some(listener) => {
                state.all_read_fired = true;
                Delivery::AllRead(Arc::clone(listener))
            }
            None => Delivery::None,
        }
    }

    /// 认领唯一一次 `on_error` 投递并进入吸收态。
    fn claim_fault(state: &mut ChannelState, error: CoreError) -> Delivery {
        if state.errored {
            return Delivery::None;
        }
        state.errored = true;
        state.readiness = ReadinessState::Terminated;
        match &state.listener {
            Some(listener) => Delivery::Fault(Arc::clone(listener), error),
            None => Delivery::None,
        }
    }

    /// 锁外执行投递；数据类回调的故障折叠进错误通知。
    fn deliver(&self, delivery: Delivery) {
        match delivery {
            Delivery::None => {}
            Delivery::Data(listener) => {
                if let Err(fault) = listener.on_data_available() {
                    self.absorb_callback_fault(listener, fault);
                }
            }
            Delivery::AllRead(listener) => {
                if let Err(fault) = listener.on_all_data_read() {
                    self.absorb_callback_fault(listener, fault);
                }
            }
            Delivery::Fault(listener, error) => listener.on_error(&error),
        }
    }

    /// 回调自身出错：转入吸收态并补发唯一一次 `on_error`。
    fn absorb_callback_fault(&self, listener: Arc<dyn ReadListener>, fault: CoreError) {
        let fire = {
            let mut state = self.inner.state.lock();
            if state.errored {
                false
            } else {
                state.errored = true;
                state.readiness = ReadinessState::Terminated;
                true
            }
        };
        if fire {
            listener.on_error(&fault);
        }
    }
}
