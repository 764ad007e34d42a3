//! 时间抽象模块：可注入时钟 + 挂起超时定时器。
//!
//! # 模块定位（Why）
//! - 挂起周期的超时语义必须在 CI 中完全确定地复现；直接依赖系统时钟会让
//!   “1ms 超时 vs. 立即 complete”这类竞态测试变成碰运气；
//! - 通过 [`Clock`] trait 注入时间源，生产环境使用 [`SystemClock`]，
//!   测试使用手动推进的 [`MockClock`]。
//!
//! # 结构概览（What）
//! - [`clock::Clock`]：`now`/`sleep` 两原语的时钟契约；
//! - [`clock::SystemClock`]：线程睡眠支撑的默认实现；
//! - [`clock::MockClock`]：手动推进、确定性唤醒的虚拟时钟；
//! - [`timer::TimerService`]：基于任意 `Clock` 的单发可取消定时器，
//!   协调器用它武装每个挂起纪元的超时。

pub mod clock;
pub mod timer;

pub use clock::{Clock, MockClock, Sleep, SystemClock};
pub use timer::{TimerHandle, TimerService};
