//! 工作单元执行契约：承载 `start(task)` 与派发重入的线程来源。
//!
//! # 模块定位（Why）
//! - 挂起语义的核心收益是“原工作线程立即归还线程池”；后续的派发重入与
//!   后台工作单元都必须在**另一个**线程上运行；
//! - 内核不自带线程池策略，只定义提交契约，宿主容器可注入共享主池、
//!   独立异步池或测试用的内联执行器。

use std::borrow::Cow;
use std::thread;

/// 一次性的工作单元：在独立线程上执行的闭包。
pub type WorkUnit = Box<dyn FnOnce() + Send + 'static>;

/// 工作单元执行器契约。
///
/// # 契约说明（What）
/// - `execute` 把 `work` 提交到调用线程以外的执行环境并立即返回，
///   **不得**在调用线程上同步阻塞等待其完成；
/// - `name` 仅用于线程命名与观测，不参与调度决策；
/// - 实现必须线程安全：挂起周期的多个触发源会并发提交。
///
/// # 风险提示（Trade-offs）
/// - 测试替身（如内联执行器）刻意违反“另一个线程”约束换取确定性，
///   只能用于单线程可控的测试场景。
pub trait WorkExecutor: Send + Sync + 'static {
    /// 提交一个命名工作单元。
    fn execute(&self, name: Cow<'static, str>, work: WorkUnit);
}

/// 默认执行器：每个工作单元一只分离线程。
///
/// # 设计取舍（Trade-offs）
/// - 与共享主池方案相比，独立线程避免了“归还一个名额又占走一个名额”的
///   空转问题，语义上也最贴近“脱离容器线程池执行”；
/// - 高吞吐宿主应注入真实线程池实现替换本默认值。
#[derive(Debug, Clone, Default)]
pub struct DetachedThreadExecutor;

impl WorkExecutor for DetachedThreadExecutor {
    fn execute(&self, name: Cow<'static, str>, work: WorkUnit) {
        // 线程起不来意味着宿主资源已耗尽，与标准库 `thread::spawn` 一致直接暴露。
        thread::Builder::new()
            .name(name.into_owned())
            .spawn(work)
            .expect("failed to spawn detached work thread");
    }
}
