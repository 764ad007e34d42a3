//! 生命周期状态机性质验证
//!
//! # 教案级注释概览
//!
//! - **核心目标（Why）**：以影子模型对协调器的迁移规则做性质验证——任意
//!   随机操作序列下，(1) 每个操作的接受/拒绝结果与模型一致；(2) 连接
//!   至多归还一次且仅在终态归还；(3) 完成遍历至多发生一次、且与默认
//!   处置互斥。单元测试覆盖典型路径，这里补齐组合爆炸空间。
//! - **设计手法（How）**：Proptest 生成操作序列，同步执行器把派发重入压回
//!   当前线程、定时器全程禁用，使执行完全确定；影子模型只追踪三元状态
//!   （活跃/挂起/终态），逐操作与真实协调器对账。
//! - **边界（What)**：不覆盖定时器竞态（`lifecycle.rs` 以真实线程验证），
//!   不覆盖就绪协议（`readiness.rs`）。

use std::sync::Arc;

use proptest::prelude::*;

use relay_core::test_stubs::lifecycle::{ImmediateExecutor, RecordingListener, RecordingObserver};
use relay_core::test_stubs::transport::{StubConnection, StubRequest, StubResponse};
use relay_core::{
    AsyncCoordinator, AsyncPhase, AsyncSettings, CoordinatorEvent, DispatchTarget, PassKind,
    ProcessingUnit, Scope,
};
use relay_transport::ExchangePair;

/// 影子模型的粗粒度状态。派发到 `/loop` 的单元立即再挂起，
/// 因此 `DispatchLoop` 被接受后模型回到挂起态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelPhase {
    Active,
    Suspended,
    Done,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Suspend,
    Complete,
    DispatchLoop,
    DispatchMissing,
    AddListener,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Suspend),
        Just(Op::Complete),
        Just(Op::DispatchLoop),
        Just(Op::DispatchMissing),
        Just(Op::AddListener),
    ]
}

/// 重入后立即再次挂起，维持状态机活性。
struct Resuspender;

impl ProcessingUnit for Resuspender {
    fn handle(&self, activation: &AsyncCoordinator) -> relay_core::Result<()> {
        activation.suspend(None)
    }
}

struct Fixture {
    coordinator: AsyncCoordinator,
    connection: Arc<StubConnection>,
    response: Arc<StubResponse>,
    observer: Arc<RecordingObserver>,
}

fn fixture() -> Fixture {
    let scope = Scope::new("model");
    scope
        .register_unit("/loop", Arc::new(Resuspender))
        .unwrap();
    scope.activate().unwrap();

    let request = StubRequest::with_uri("/model");
    let response = StubResponse::new();
    let pair = ExchangePair::new(request, response.clone());
    let connection = StubConnection::new();
    let observer = RecordingObserver::new();
    let coordinator = AsyncCoordinator::builder(scope, pair, connection.clone())
        .executor(Arc::new(ImmediateExecutor))
        .settings(AsyncSettings::with_default_timeout_ms(0))
        .observer(observer.clone())
        .build();
    Fixture {
        coordinator,
        connection,
        response,
        observer,
    }
}

/// 模型预言：本操作是否应被接受，接受后模型迁往何处。
fn model_step(phase: ModelPhase, op: Op) -> (bool, ModelPhase) {
    match (phase, op) {
        (ModelPhase::Active, Op::Suspend) => (true, ModelPhase::Suspended),
        (ModelPhase::Suspended, Op::Complete) => (true, ModelPhase::Done),
        (ModelPhase::Suspended, Op::DispatchLoop) => (true, ModelPhase::Suspended),
        (ModelPhase::Suspended, Op::AddListener) => (true, ModelPhase::Suspended),
        // 目标缺失：解析失败报错，周期保持原状。
        (phase, Op::DispatchMissing) => (false, phase),
        (phase, _) => (false, phase),
    }
}

fn apply(fixture: &Fixture, op: Op) -> bool {
    match op {
        Op::Suspend => fixture.coordinator.suspend(None).is_ok(),
        Op::Complete => fixture.coordinator.complete().is_ok(),
        Op::DispatchLoop => fixture
            .coordinator
            .dispatch(DispatchTarget::Path("/loop".to_owned()))
            .is_ok(),
        Op::DispatchMissing => fixture
            .coordinator
            .dispatch(DispatchTarget::Path("/missing".to_owned()))
            .is_ok(),
        Op::AddListener => fixture
            .coordinator
            .add_listener(RecordingListener::named("model"), None)
            .is_ok(),
    }
}

fn expected_phase(model: ModelPhase) -> AsyncPhase {
    match model {
        ModelPhase::Active => AsyncPhase::Active,
        ModelPhase::Suspended => AsyncPhase::Suspended,
        ModelPhase::Done => AsyncPhase::Done,
    }
}

proptest! {
    /// 性质一：任意操作序列下，真实协调器与影子模型逐步一致。
    #[test]
    fn coordinator_agrees_with_shadow_model(ops in proptest::collection::vec(op_strategy(), 0..40)) {
        let fixture = fixture();
        let mut model = ModelPhase::Active;

        for (index, op) in ops.iter().enumerate() {
            let (expect_ok, next) = model_step(model, *op);
            let accepted = apply(&fixture, *op);
            prop_assert_eq!(
                accepted, expect_ok,
                "操作 {:?}（序号 {}）在模型状态 {:?} 下的判定不一致", op, index, model
            );
            model = next;
            prop_assert_eq!(fixture.coordinator.snapshot().phase, expected_phase(model));
        }

        // 性质二：连接归还与终态严格绑定，且全程至多一次。
        let expected_releases = usize::from(model == ModelPhase::Done);
        prop_assert_eq!(fixture.connection.release_count(), expected_releases);
        prop_assert_eq!(fixture.connection.abort_count(), 0);
        prop_assert!(fixture.response.sent_errors().is_empty());
    }

    /// 性质三：完成遍历至多一次，且定时器禁用时不存在超时遍历。
    #[test]
    fn terminal_passes_are_unique(ops in proptest::collection::vec(op_strategy(), 0..40)) {
        let fixture = fixture();
        for op in &ops {
            let _ = apply(&fixture, *op);
        }

        let events = fixture.observer.events();
        let complete_passes = events
            .iter()
            .filter(|event| matches!(
                event,
                CoordinatorEvent::PassCompleted { kind: PassKind::Complete, .. }
            ))
            .count();
        let timeout_passes = events
            .iter()
            .filter(|event| matches!(
                event,
                CoordinatorEvent::PassCompleted { kind: PassKind::Timeout, .. }
            ))
            .count();
        prop_assert!(complete_passes <= 1, "完成遍历出现了 {} 次", complete_passes);
        prop_assert_eq!(timeout_passes, 0);
    }
}
