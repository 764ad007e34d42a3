use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::time::Clock;

/// 已武装定时器的控制句柄，`cancel` 撤销尚未触发的回调。
///
/// # 并发契约（What）
/// - `cancel` 与定时器到点触发可以并发发生：句柄只做尽力而为的抑制，
///   真正的仲裁在协调器的状态认领处完成（纪元 + 状态双重校验）；
/// - 取消一个已触发的定时器是合法空操作，反之亦然。
#[derive(Debug, Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// 撤销定时器。已在途的触发可能仍然执行回调，由调用方的状态机拦截。
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// 是否已被撤销（观测与测试用）。
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 基于注入时钟的单发定时器服务。
///
/// # 设计背景（Why）
/// - 每个挂起纪元需要武装一只一次性超时定时器，并在 `complete`/`dispatch`
///   认领成功后撤销；
/// - 以 [`Clock::sleep`] 为唯一时间原语：生产环境走线程睡眠，测试环境由
///   [`crate::time::MockClock::advance`] 确定性驱动，服务本身无需分辨两者。
///
/// # 执行逻辑（How）
/// - `arm` 启动一个命名线程，在其上以 `futures::executor::block_on` 驱动
///   睡眠 Future；醒来后若句柄未被撤销则执行回调；
/// - 回调在定时器线程上同步执行，超时通知遍历因此占用触发线程。
///
/// # 风险提示（Trade-offs）
/// - 线程每纪元一只，挂起周期的时间尺度下开销可忽略；若未来需要海量并发
///   定时器，可在不改契约的情况下替换为定时轮实现。
#[derive(Clone)]
pub struct TimerService {
    clock: Arc<dyn Clock>,
}

impl TimerService {
    /// 以给定时钟构造定时器服务。
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// 注入的时钟。
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 武装一只单发定时器：`delay` 后在定时器线程上执行 `callback`。
    pub fn arm(&self, delay: Duration, callback: impl FnOnce() + Send + 'static) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let sleep = self.clock.sleep(delay);
        // 线程起不来意味着宿主资源已耗尽，与标准库 `thread::spawn` 一致直接暴露。
        thread::Builder::new()
            .name("relay-timer".to_owned())
            .spawn(move || {
                futures::executor::block_on(sleep);
                if !flag.load(Ordering::SeqCst) {
                    callback();
                }
            })
            .expect("failed to spawn timer thread");
        TimerHandle { cancelled }
    }
}
