use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// `Sleep` 为时钟接口返回的统一延迟 Future 类型。
///
/// # 契约说明（What）
/// - Future 完成表示指定持续时间已经过去；
/// - 必须 `Send + 'static`：超时定时器线程会把它搬运到独立线程上驱动；
/// - 返回 `Poll::Pending` 后，状态变化时必须唤醒登记的 waker，
///   否则定时器线程将永久滞留。
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// 可注入的时钟契约：统一“取当前单调时间”与“等待指定时长”。
///
/// # 设计背景（Why）
/// - 超时武装、默认处置与竞态仲裁都依赖时间来源；生产代码不关心来源是
///   系统时钟还是测试中的虚拟时钟，只依赖本 trait；
/// - 实现必须保证 `now` 单调不减，`sleep` 完成前至少经过给定时长
///   （虚拟时钟以"虚拟时长"度量）。
pub trait Clock: Send + Sync + 'static {
    /// 当前单调时间点。
    fn now(&self) -> Instant;

    /// 在指定时长后完成的睡眠 Future。
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// 基于标准库线程睡眠的系统时钟。
///
/// # 设计取舍（Trade-offs）
/// - 每次 `sleep` 启动一个辅助线程执行阻塞睡眠，避免绑定任何异步运行时；
/// - 挂起超时属于低频控制面事件，线程开销可接受；高频场景可注入
///   自定义 [`Clock`]（例如定时轮）替换。
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(ThreadSleep::new(duration))
    }
}

/// 线程驱动的睡眠 Future：构造时启动后台线程阻塞睡眠，醒来置完成位并唤醒 waker。
struct ThreadSleep {
    state: Arc<ThreadSleepState>,
}

impl ThreadSleep {
    fn new(duration: Duration) -> Self {
        Self {
            state: ThreadSleepState::spawn(duration),
        }
    }
}

impl Future for ThreadSleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.state.is_completed() {
            return Poll::Ready(());
        }
        self.state.register_waker(cx.waker());
        // 登记与完成可能交错，登记后必须复查完成位。
        if self.state.is_completed() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

struct ThreadSleepState {
    completed: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl ThreadSleepState {
    fn spawn(duration: Duration) -> Arc<Self> {
        let state = Arc::new(Self {
            completed: AtomicBool::new(false),
            waker: Mutex::new(None),
        });
        let thread_state = Arc::clone(&state);
        thread::spawn(move || {
            thread::sleep(duration);
            thread_state.finish();
        });
        state
    }

    fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    fn register_waker(&self, waker: &Waker) {
        let mut slot = self.waker.lock();
        *slot = Some(waker.clone());
    }

    fn finish(&self) {
        self.completed.store(true, Ordering::Release);
        let maybe_waker = self.waker.lock().take();
        if let Some(waker) = maybe_waker {
            waker.wake();
        }
    }
}

/// 虚拟时钟：手动推进时间并按登记顺序确定性地唤醒到期睡眠。
///
/// # 设计动机（Why）
/// - “超时 100ms 后两个监听器按注册序收到 on_timeout”“setTimeout(0)
///   永不过期”这类断言必须不依赖真实时间抖动；
/// - 虚拟时钟把时间推进变成显式测试操作，唤醒序列完全可复现。
///
/// # 契约说明（What）
/// - `advance` 增加虚拟偏移并立即唤醒所有到期睡眠，多次调用偏移单调累加；
/// - `sleep` 返回的 Future 未到期前保持 `Pending`，到期后随唤醒转为 `Ready`；
/// - `now` 返回构造基准加当前偏移。
#[derive(Clone)]
pub struct MockClock {
    inner: Arc<MockClockInner>,
}

struct MockClockInner {
    state: Mutex<MockClockState>,
}

struct MockClockState {
    origin: Instant,
    elapsed: Duration,
    sleepers: Vec<Arc<MockSleepState>>,
}

impl MockClock {
    /// 以当前系统时间为基准创建虚拟时钟。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockClockInner {
                state: Mutex::new(MockClockState {
                    origin: Instant::now(),
                    elapsed: Duration::ZERO,
                    sleepers: Vec::new(),
                }),
            }),
        }
    }

    /// 推进虚拟时间，唤醒所有到期的睡眠 Future。
    ///
    /// # 并发说明
    /// - waker 调用在锁外执行，避免与被唤醒线程的 `poll` 回调互锁。
    pub fn advance(&self, delta: Duration) {
        if delta.is_zero() {
            return;
        }
        let mut to_wake = Vec::new();
        {
            let mut guard = self.inner.state.lock();
            guard.elapsed = guard.elapsed.saturating_add(delta);
            let elapsed = guard.elapsed;
            guard.sleepers.retain(|entry| {
                if elapsed >= entry.deadline {
                    entry.completed.store(true, Ordering::Release);
                    if let Some(waker) = entry.waker.lock().take() {
                        to_wake.push(waker);
                    }
                    false
                } else {
                    true
                }
            });
        }
        for waker in to_wake {
            waker.wake();
        }
    }

    /// 自基准起累积的虚拟时间。
    pub fn elapsed(&self) -> Duration {
        self.inner.state.lock().elapsed
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        let guard = self.inner.state.lock();
        guard.origin + guard.elapsed
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        let state = {
            let mut guard = self.inner.state.lock();
            let deadline = guard.elapsed.saturating_add(duration);
            let state = Arc::new(MockSleepState {
                deadline,
                completed: AtomicBool::new(false),
                waker: Mutex::new(None),
            });
            guard.sleepers.push(Arc::clone(&state));
            state
        };
        Box::pin(MockSleep { state })
    }
}

struct MockSleepState {
    deadline: Duration,
    completed: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

struct MockSleep {
    state: Arc<MockSleepState>,
}

impl Future for MockSleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.state.completed.load(Ordering::Acquire) {
            return Poll::Ready(());
        }
        {
            let mut slot = self.state.waker.lock();
            let replace = match slot.as_ref() {
                Some(existing) => !existing.will_wake(cx.waker()),
                None => true,
            };
            if replace {
                *slot = Some(cx.waker().clone());
            }
        }
        if self.state.completed.load(Ordering::Acquire) {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
