//! 异步生命周期协调器：单请求周期的挂起/恢复状态机。
//!
//! # 教案级导览
//!
//! - **核心目标（Why）**：工作线程在 `suspend` 后立即归还线程池，请求周期
//!   此后由外部触发源之一推进：显式 `complete`、显式 `dispatch`、后台工作
//!   单元自行完成、定时器到点、或不可恢复故障。多个触发源可能并发抵达，
//!   协调器必须保证**恰好一个**赢得迁移认领。
//! - **仲裁手法（How）**：所有迁移经由单个每周期互斥量认领：进入临界区、
//!   校验当前状态（定时器还要校验纪元号）、改写状态、取定监听器快照，
//!   然后在锁外执行通知遍历。败者在临界区内观察到状态不符，得到
//!   `lifecycle.illegal_state` 或退化为空操作，绝不会出现双遍历或双归还。
//! - **超时救活（What）**：`on_timeout`/`on_error` 遍历期间，监听器可在
//!   触发线程上调用 `complete`/`dispatch` 救活周期（立即生效、遍历继续执
//!   行剩余监听器）——这是有意的设计决定；非遍历线程在此窗口内的调用
//!   仍被拒绝，保证"定时器 vs. 迟到的 complete"竞态恰好产生一种遍历。

use std::borrow::Cow;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use relay_transport::{Connection, ExchangePair};

use crate::config::AsyncSettings;
use crate::cycle::{AsyncPhase, CycleId, CycleSnapshot};
use crate::dispatch::{DispatchRouter, DispatchTarget, OriginSnapshot, ResolvedDispatch};
use crate::error::{CoreError, Result, codes};
use crate::listener::{
    AsyncEvent, AsyncListener, CapabilityDescriptor, ListenerBinding, ListenerRegistry,
    NotifyReport, PassKind,
};
use crate::observability::{CoordinatorEvent, LifecycleObserver, NoopLifecycleObserver};
use crate::runtime::{DetachedThreadExecutor, WorkExecutor};
use crate::scope::Scope;
use crate::time::{Clock, SystemClock, TimerHandle, TimerService};

/// 默认处置使用的状态码：服务不可用一类的终态响应。
const DEFAULT_DISPOSITION_STATUS: u16 = 503;

/// 单个请求周期的协调器句柄（克隆共享同一周期）。
///
/// # 生命周期（What）
/// - 容器在开始异步可用的处理时创建本句柄，初始状态 `Active`；
/// - 业务通过 `suspend` 挂起、`complete`/`dispatch` 恢复，周期最终抵达
///   `Done` 并把连接交还传输协作方；
/// - `Done` 之后所有操作返回 `lifecycle.illegal_state`。
#[derive(Clone)]
pub struct AsyncCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    id: CycleId,
    scope: Scope,
    connection: Arc<dyn Connection>,
    origin: ExchangePair,
    origin_snapshot: OriginSnapshot,
    timers: TimerService,
    router: DispatchRouter,
    executor: Arc<dyn WorkExecutor>,
    observer: Arc<dyn LifecycleObserver>,
    state: Mutex<CycleState>,
}

struct CycleState {
    phase: AsyncPhase,
    /// 挂起纪元序号：每次 `suspend` 递增；定时器回调携带武装时的纪元，
    /// 触发时若对不上即判定为过期定时器，空操作退出。
    epoch: u64,
    timeout_ms: i64,
    pair: ExchangePair,
    registry: ListenerRegistry,
    timer: Option<TimerHandle>,
    default_path: String,
    connection_released: bool,
    /// 超时/错误遍历的执行线程：该线程（且仅该线程）可在遍历窗口内
    /// 调用 `complete`/`dispatch` 救活周期。
    pass_owner: Option<ThreadId>,
}

/// 协调器构造器：注入时钟、执行器、观察者与默认配置。
pub struct CoordinatorBuilder {
    scope: Scope,
    pair: ExchangePair,
    connection: Arc<dyn Connection>,
    clock: Arc<dyn Clock>,
    executor: Arc<dyn WorkExecutor>,
    observer: Arc<dyn LifecycleObserver>,
    settings: AsyncSettings,
}

impl CoordinatorBuilder {
    /// 注入时间源（默认 [`SystemClock`]）。
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 注入工作单元执行器（默认 [`DetachedThreadExecutor`]）。
    pub fn executor(mut self, executor: Arc<dyn WorkExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// 注入观测接收口（默认丢弃）。
    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// 覆盖默认配置（决定新周期的初始超时）。
    pub fn settings(mut self, settings: AsyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 完成构造。周期从 `Active` 开始，原始路径六元组在此一次性摘取。
    pub fn build(self) -> AsyncCoordinator {
        let origin_snapshot = OriginSnapshot::capture(self.pair.request());
        let default_path = origin_snapshot.request_uri().to_owned();
        AsyncCoordinator {
            inner: Arc::new(CoordinatorInner {
                id: CycleId::next(),
                scope: self.scope,
                connection: self.connection,
                origin: self.pair.clone(),
                origin_snapshot,
                timers: TimerService::new(self.clock),
                router: DispatchRouter::new(Arc::clone(&self.executor)),
                executor: self.executor,
                observer: self.observer,
                state: Mutex::new(CycleState {
                    phase: AsyncPhase::Active,
                    epoch: 0,
                    timeout_ms: self.settings.default_timeout_ms,
                    pair: self.pair,
                    registry: ListenerRegistry::new(),
                    timer: None,
                    default_path,
                    connection_released: false,
                    pass_owner: None,
                }),
            }),
        }
    }
}

impl AsyncCoordinator {
    /// 开始构造一个新周期的协调器。
    pub fn builder(
        scope: Scope,
        pair: ExchangePair,
        connection: Arc<dyn Connection>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            scope,
            pair,
            connection,
            clock: Arc::new(SystemClock),
            executor: Arc::new(DetachedThreadExecutor),
            observer: Arc::new(NoopLifecycleObserver),
            settings: AsyncSettings::default(),
        }
    }

    /// 周期标识。
    pub fn id(&self) -> CycleId {
        self.inner.id
    }

    /// 周期诞生的作用域。
    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    /// 当前生效的交换对（重入挂起可能替换过）。
    pub fn exchange(&self) -> ExchangePair {
        self.inner.state.lock().pair.clone()
    }

    /// 当前持有的是否仍是最初的请求/响应对。
    pub fn has_original_exchange(&self) -> bool {
        let state = self.inner.state.lock();
        state.pair.same_identity(&self.inner.origin)
    }

    /// 取一份字段间一致的周期快照。
    pub fn snapshot(&self) -> CycleSnapshot {
        let state = self.inner.state.lock();
        CycleSnapshot {
            id: self.inner.id,
            phase: state.phase,
            epoch: state.epoch,
            timeout_ms: state.timeout_ms,
            original_exchange: state.pair.same_identity(&self.inner.origin),
        }
    }

    /// 设置超时毫秒数（`<= 0` 禁用）。只影响之后武装的挂起纪元。
    pub fn set_timeout(&self, timeout_ms: i64) {
        self.inner.state.lock().timeout_ms = timeout_ms;
    }

    /// 当前配置的超时毫秒数。
    pub fn timeout(&self) -> i64 {
        self.inner.state.lock().timeout_ms
    }

    /// 注册生命周期监听器，绑定给定交换对（缺省为周期当前对）。
    ///
    /// # 边界语义（What）
    /// - 仅 `Suspended` 状态合法：监听器必须在业务逻辑拿到流之前就位，
    ///   否则读取可能跑在监听器安装之前（这正是容器侧的防竞态规则）；
    /// - 绑定跨纪元存活，终态时整体清空。
    pub fn add_listener(
        &self,
        listener: Arc<dyn AsyncListener>,
        pair: Option<ExchangePair>,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.phase != AsyncPhase::Suspended {
            return Err(CoreError::illegal_lifecycle("add_listener", state.phase));
        }
        let bound = pair.unwrap_or_else(|| state.pair.clone());
        state.registry.push(ListenerBinding::new(listener, bound));
        Ok(())
    }

    /// 经由作用域的工厂制造容器托管监听器实例（不注册）。
    pub fn create_listener(
        &self,
        descriptor: &CapabilityDescriptor,
    ) -> Result<Arc<dyn AsyncListener>> {
        self.inner.scope.create_listener(descriptor)
    }

    /// 挂起当前周期，开启新的挂起纪元。
    ///
    /// # 执行逻辑（How）
    /// 1. 认领 `Active → Suspended` 迁移，纪元号递增；
    /// 2. 若提供了覆盖交换对则替换当前对；默认派发路径在此刻记录；
    /// 3. 按当前超时值武装单发定时器（`<= 0` 不武装）；
    /// 4. 释放锁后对每个已注册监听器按注册序触发 `on_start_async`。
    ///
    /// # 边界语义（What）
    /// - 仅 `Active` 合法；派发重入后的新周期再次调用即构成重入挂起：
    ///   既有监听器持续有效并再次收到 `on_start_async`，定时器重新武装；
    /// - 调用返回即表示工作线程可以归还线程池，没有任何线程在等待完成。
    pub fn suspend(&self, override_pair: Option<ExchangePair>) -> Result<()> {
        let (snapshot, epoch, timeout_ms) = {
            let mut state = self.inner.state.lock();
            if state.phase != AsyncPhase::Active {
                return Err(CoreError::illegal_lifecycle("suspend", state.phase));
            }
            if let Some(pair) = override_pair {
                state.pair = pair;
            }
            state.phase = AsyncPhase::Suspended;
            state.epoch += 1;
            state.default_path = state.pair.request().uri();
            if let Some(stale) = state.timer.take() {
                stale.cancel();
            }
            let timeout_ms = state.timeout_ms;
            if AsyncSettings::timer_enabled(timeout_ms) {
                let armed_epoch = state.epoch;
                let coordinator = self.clone();
                state.timer = Some(self.inner.timers.arm(
                    Duration::from_millis(timeout_ms as u64),
                    move || coordinator.on_timer_fired(armed_epoch),
                ));
            }
            (state.registry.snapshot(), state.epoch, timeout_ms)
        };
        self.observe(CoordinatorEvent::Suspended {
            cycle: self.inner.id.value(),
            epoch,
            timeout_ms,
        });
        let report = self.notify_pass(PassKind::StartAsync, snapshot, None);
        self.report_pass(&report);
        Ok(())
    }

    /// 正常完成当前挂起纪元。
    ///
    /// # 边界语义（What）
    /// - `Suspended` 合法；超时/错误遍历窗口内仅遍历线程合法（救活路径）；
    /// - 撤销定时器、按注册序触发 `on_complete`、清空注册表、归还连接——
    ///   连接在整个周期内恰好归还一次；
    /// - 其余状态返回 `lifecycle.illegal_state`，同纪元第二次调用亦然。
    pub fn complete(&self) -> Result<()> {
        let snapshot = {
            let mut state = self.inner.state.lock();
            Self::ensure_resumable(&state, "complete")?;
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            state.phase = AsyncPhase::Completing;
            state.registry.snapshot()
        };
        self.finish_completion(snapshot);
        Ok(())
    }

    /// 把周期派发到恢复目标并在池线程上重新进入。
    ///
    /// # 执行逻辑（How）
    /// 1. 在认领临界区内解析目标；解析失败原样返回错误，周期状态不变；
    /// 2. 认领 `Suspended → Dispatching`（或遍历窗口内的救活），撤销定时器；
    /// 3. 把重入闭包交给执行器：新线程上状态转回 `Active`（新周期），
    ///    写入保留属性后调用处理单元；
    /// 4. 单元返回且未再次挂起、未显式完成的，按正常完成收尾；返回
    ///    `Err` 的走错误迁移。
    pub fn dispatch(&self, target: DispatchTarget) -> Result<()> {
        let resolved = {
            let mut state = self.inner.state.lock();
            Self::ensure_resumable(&state, "dispatch")?;
            let resolved =
                self.inner
                    .router
                    .resolve(&self.inner.scope, &state.default_path, &target)?;
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            state.phase = AsyncPhase::Dispatching;
            resolved
        };
        self.observe(CoordinatorEvent::Dispatched {
            cycle: self.inner.id.value(),
            path: resolved.path().to_owned(),
        });
        let coordinator = self.clone();
        self.inner.router.reenter(
            Cow::Borrowed("relay-dispatch"),
            Box::new(move || coordinator.run_dispatched(resolved)),
        );
        Ok(())
    }

    /// 把后台工作单元交给执行器，在挂起线程之外运行。
    ///
    /// # 边界语义（What）
    /// - 仅 `Suspended` 合法；本调用不改变周期状态；
    /// - 工作单元应在自己的线程上最终调用同一协调器的
    ///   `complete`/`dispatch` 结束周期（通过捕获句柄克隆）。
    pub fn start(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
        {
            let state = self.inner.state.lock();
            if state.phase != AsyncPhase::Suspended {
                return Err(CoreError::illegal_lifecycle("start", state.phase));
            }
        }
        self.inner
            .executor
            .execute(Cow::Borrowed("relay-work-unit"), Box::new(task));
        Ok(())
    }

    /// 向挂起中的周期注入不可恢复故障（传输驱动/就绪通道的错误汇入口）。
    ///
    /// # 边界语义（What）
    /// - 仅 `Suspended` 合法；认领后触发 `on_error` 遍历，遍历内未被救活
    ///   的周期走默认处置并抵达 `Done`。
    pub fn raise_error(&self, error: CoreError) -> Result<()> {
        let snapshot = {
            let mut state = self.inner.state.lock();
            if state.phase != AsyncPhase::Suspended {
                return Err(CoreError::illegal_lifecycle("raise_error", state.phase));
            }
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            state.phase = AsyncPhase::Errored;
            state.pass_owner = Some(thread::current().id());
            state.registry.snapshot()
        };
        let cause = Arc::new(error);
        let report = self.notify_pass(PassKind::Error, snapshot, Some(cause));
        self.report_pass(&report);
        self.apply_default_disposition_if(AsyncPhase::Errored, "async cycle failed");
        Ok(())
    }

    /// 定时器回调：携带武装时纪元参与迁移认领。
    fn on_timer_fired(&self, armed_epoch: u64) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            // 竞态败者（已完成/已派发/已进入新纪元的过期定时器）：空操作。
            if state.phase != AsyncPhase::Suspended || state.epoch != armed_epoch {
                return;
            }
            state.timer = None;
            state.phase = AsyncPhase::TimedOut;
            state.pass_owner = Some(thread::current().id());
            state.registry.snapshot()
        };
        self.observe(CoordinatorEvent::TimerClaimed {
            cycle: self.inner.id.value(),
            epoch: armed_epoch,
        });
        let cause = Arc::new(CoreError::new(
            codes::LIFECYCLE_TIMEOUT,
            "suspended cycle timed out",
        ));
        let report = self.notify_pass(PassKind::Timeout, snapshot, Some(cause));
        self.report_pass(&report);
        self.apply_default_disposition_if(AsyncPhase::TimedOut, "async cycle timed out");
    }

    /// 派发重入的池线程入口。
    pub(crate) fn run_dispatched(&self, resolved: ResolvedDispatch) {
        {
            let mut state = self.inner.state.lock();
            state.phase = AsyncPhase::Active;
            state.pass_owner = None;
            // 处理单元看到请求前，保留属性必须已回放原始路径六元组。
            self.inner.origin_snapshot.apply_to(state.pair.request());
        }
        let unit = Arc::clone(resolved.unit());
        match unit.handle(self) {
            Ok(()) => {
                let snapshot = {
                    let mut state = self.inner.state.lock();
                    // 单元内部已再次挂起或显式完成的，这里不再收尾。
                    if state.phase != AsyncPhase::Active {
                        return;
                    }
                    state.phase = AsyncPhase::Completing;
                    if let Some(timer) = state.timer.take() {
                        timer.cancel();
                    }
                    state.registry.snapshot()
                };
                self.finish_completion(snapshot);
            }
            Err(error) => self.fail_after_dispatch(error),
        }
    }

    /// 派发执行失败：从 `Active`（或单元遗留的 `Suspended`）进入错误迁移。
    fn fail_after_dispatch(&self, error: CoreError) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            match state.phase {
                AsyncPhase::Active | AsyncPhase::Suspended => {}
                // 单元已把周期推进到其他阶段，错误只能交给观测侧。
                _ => {
                    self.observe(CoordinatorEvent::ListenerFault {
                        cycle: self.inner.id.value(),
                        kind: PassKind::Error,
                        code: error.code(),
                    });
                    return;
                }
            }
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            state.phase = AsyncPhase::Errored;
            state.pass_owner = Some(thread::current().id());
            state.registry.snapshot()
        };
        let cause = Arc::new(error);
        let report = self.notify_pass(PassKind::Error, snapshot, Some(cause));
        self.report_pass(&report);
        self.apply_default_disposition_if(AsyncPhase::Errored, "dispatched unit failed");
    }

    /// `complete`/`dispatch` 的状态认领前置校验。
    fn ensure_resumable(state: &CycleState, operation: &'static str) -> Result<()> {
        match state.phase {
            AsyncPhase::Suspended => Ok(()),
            AsyncPhase::TimedOut | AsyncPhase::Errored
                if state.pass_owner == Some(thread::current().id()) =>
            {
                Ok(())
            }
            phase => Err(CoreError::illegal_lifecycle(operation, phase)),
        }
    }

    /// 完成遍历 + 终态清理 + 连接归还（恰好一次）。
    fn finish_completion(&self, snapshot: Vec<ListenerBinding>) {
        let report = self.notify_pass(PassKind::Complete, snapshot, None);
        self.report_pass(&report);
        let release = {
            let mut state = self.inner.state.lock();
            state.phase = AsyncPhase::Done;
            state.registry.clear();
            let release = !state.connection_released;
            state.connection_released = true;
            release
        };
        self.observe(CoordinatorEvent::Terminal {
            cycle: self.inner.id.value(),
            phase: AsyncPhase::Completing,
        });
        if release {
            let decision = self.inner.connection.release();
            self.observe(CoordinatorEvent::ConnectionReleased {
                cycle: self.inner.id.value(),
                decision,
            });
        }
    }

    /// 超时/错误遍历的后处理：未被救活的周期应用默认处置。
    ///
    /// # 执行逻辑（How）
    /// - 重新进入临界区：若状态仍停留在 `expected`（没有监听器救活），
    ///   认领终态、清空注册表、宣布连接归还资格；
    /// - 锁外写出服务不可用类响应并 `abort` 连接。写出失败已无路可退，
    ///   静默吞掉（连接随即关闭）。
    fn apply_default_disposition_if(&self, expected: AsyncPhase, message: &str) {
        let cleanup = {
            let mut state = self.inner.state.lock();
            state.pass_owner = None;
            if state.phase != expected {
                None
            } else {
                state.phase = AsyncPhase::Done;
                state.registry.clear();
                let release = !state.connection_released;
                state.connection_released = true;
                Some((state.pair.response().clone(), release))
            }
        };
        if let Some((response, release)) = cleanup {
            self.observe(CoordinatorEvent::Terminal {
                cycle: self.inner.id.value(),
                phase: expected,
            });
            let _ = response.send_error(DEFAULT_DISPOSITION_STATUS, message);
            if release {
                let decision = self.inner.connection.abort();
                self.observe(CoordinatorEvent::ConnectionReleased {
                    cycle: self.inner.id.value(),
                    decision,
                });
            }
        }
    }

    /// 在固定快照上执行一次通知遍历；监听器故障逐个隔离并聚合。
    fn notify_pass(
        &self,
        kind: PassKind,
        snapshot: Vec<ListenerBinding>,
        cause: Option<Arc<CoreError>>,
    ) -> NotifyReport {
        let mut report = NotifyReport::new(kind);
        for binding in snapshot {
            let event = AsyncEvent::new(self.clone(), binding.pair().clone(), cause.clone());
            let outcome = match kind {
                PassKind::StartAsync => binding.listener().on_start_async(&event),
                PassKind::Complete => binding.listener().on_complete(&event),
                PassKind::Timeout => binding.listener().on_timeout(&event),
                PassKind::Error => binding.listener().on_error(&event),
            };
            match outcome {
                Ok(()) => report.record_success(),
                Err(fault) => {
                    self.observe(CoordinatorEvent::ListenerFault {
                        cycle: self.inner.id.value(),
                        kind,
                        code: fault.code(),
                    });
                    report.record_fault(fault);
                }
            }
        }
        report
    }

    fn report_pass(&self, report: &NotifyReport) {
        self.observe(CoordinatorEvent::PassCompleted {
            cycle: self.inner.id.value(),
            kind: report.kind(),
            notified: report.notified(),
            faults: report.faults().len(),
        });
    }

    fn observe(&self, event: CoordinatorEvent) {
        self.inner.observer.on_event(&event);
    }
}
