//! 挂起/完成/超时生命周期的契约测试。
//!
//! # 教案级导览
//!
//! - **核心目标（Why）**：固化状态机对外承诺的三条硬性质——迁移合法性
//!   （非 `Suspended` 时 `complete`/`add_listener` 必须被拒绝）、通知遍历
//!   次序（注册序 + 绑定对）、连接恰好归还一次（正常完成与默认处置互斥）。
//! - **时间控制（How）**：凡涉及定时器的场景一律注入 `MockClock`，
//!   由测试显式 `advance` 推动到点；跨线程回调经 `mpsc` 通道同步，
//!   不依赖真实时钟的调度巧合。
//! - **边界（What）**：仅覆盖单周期生命周期；派发重入与就绪协议分别在
//!   `dispatch.rs` 与 `readiness.rs` 固化。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use relay_core::test_stubs::lifecycle::{RecordingListener, RecordingObserver};
use relay_core::test_stubs::transport::{StubConnection, StubRequest, StubResponse};
use relay_core::{
    AsyncCoordinator, AsyncEvent, AsyncListener, AsyncPhase, AsyncSettings, CoordinatorEvent,
    CoreError, MockClock, PassKind, Scope, codes,
};
use relay_transport::ExchangePair;

fn make_pair() -> (Arc<StubRequest>, Arc<StubResponse>, ExchangePair) {
    let request = StubRequest::with_uri("/orders/42");
    let response = StubResponse::new();
    let pair = ExchangePair::new(request.clone(), response.clone());
    (request, response, pair)
}

fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            Instant::now() < deadline,
            "条件在截止时间内未达成"
        );
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn immediate_complete_preempts_armed_timer() {
    let clock = MockClock::new();
    let (_request, response, pair) = make_pair();
    let connection = StubConnection::new();
    let listener = RecordingListener::named("solo");
    let coordinator = AsyncCoordinator::builder(Scope::new("app"), pair, connection.clone())
        .clock(Arc::new(clock.clone()))
        .settings(AsyncSettings::with_default_timeout_ms(5))
        .build();

    coordinator.suspend(None).unwrap();
    coordinator.add_listener(listener.clone(), None).unwrap();
    coordinator.complete().unwrap();

    // 被撤销的定时器即便醒来也只能空操作。
    clock.advance(Duration::from_millis(20));
    thread::sleep(Duration::from_millis(50));

    assert_eq!(coordinator.snapshot().phase, AsyncPhase::Done);
    assert_eq!(listener.passes(), vec![PassKind::Complete]);
    assert_eq!(connection.release_count(), 1);
    assert_eq!(connection.abort_count(), 0);
    assert!(response.sent_errors().is_empty());
}

#[test]
fn complete_twice_is_rejected() {
    let (_request, _response, pair) = make_pair();
    let coordinator =
        AsyncCoordinator::builder(Scope::new("app"), pair, StubConnection::new())
            .settings(AsyncSettings::with_default_timeout_ms(0))
            .build();

    coordinator.suspend(None).unwrap();
    coordinator.complete().unwrap();

    let err = coordinator.complete().unwrap_err();
    assert_eq!(err.code(), codes::LIFECYCLE_ILLEGAL_STATE);
}

#[test]
fn lifecycle_operations_outside_suspension_are_rejected() {
    let (_request, _response, pair) = make_pair();
    let coordinator =
        AsyncCoordinator::builder(Scope::new("app"), pair, StubConnection::new())
            .settings(AsyncSettings::with_default_timeout_ms(0))
            .build();

    // 尚未挂起：恢复类与注册类操作全部非法。
    let listener = RecordingListener::named("early");
    assert_eq!(
        coordinator
            .add_listener(listener, None)
            .unwrap_err()
            .code(),
        codes::LIFECYCLE_ILLEGAL_STATE
    );
    assert_eq!(
        coordinator.complete().unwrap_err().code(),
        codes::LIFECYCLE_ILLEGAL_STATE
    );
    assert_eq!(
        coordinator.start(|| {}).unwrap_err().code(),
        codes::LIFECYCLE_ILLEGAL_STATE
    );

    coordinator.suspend(None).unwrap();
    // 已挂起：重复挂起同样非法。
    assert_eq!(
        coordinator.suspend(None).unwrap_err().code(),
        codes::LIFECYCLE_ILLEGAL_STATE
    );
    coordinator.complete().unwrap();
}

/// 断言事件携带的交换对与期望对指向同一底层对象。
struct PairProbe {
    expected: ExchangePair,
    matched: AtomicBool,
}

impl AsyncListener for PairProbe {
    fn on_complete(&self, event: &AsyncEvent) -> relay_core::Result<()> {
        self.matched
            .store(event.pair().same_identity(&self.expected), Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn completion_pass_follows_registration_order_and_bound_pairs() {
    let (tx, rx) = mpsc::channel();
    let first = RecordingListener::with_channel("first", tx.clone());
    let second = RecordingListener::with_channel("second", tx);

    let (_request, _response, pair) = make_pair();
    let (_other_request, _other_response, other_pair) = make_pair();
    let probe = Arc::new(PairProbe {
        expected: other_pair.clone(),
        matched: AtomicBool::new(false),
    });

    let coordinator =
        AsyncCoordinator::builder(Scope::new("app"), pair, StubConnection::new())
            .settings(AsyncSettings::with_default_timeout_ms(0))
            .build();
    coordinator.suspend(None).unwrap();
    coordinator.add_listener(first, None).unwrap();
    coordinator.add_listener(second, None).unwrap();
    coordinator
        .add_listener(probe.clone(), Some(other_pair))
        .unwrap();
    coordinator.complete().unwrap();

    // 完成遍历在调用线程同步执行，通道中应已有按注册序的两条记录。
    assert_eq!(rx.try_recv().unwrap(), ("first", PassKind::Complete));
    assert_eq!(rx.try_recv().unwrap(), ("second", PassKind::Complete));
    assert!(
        probe.matched.load(Ordering::SeqCst),
        "事件必须携带注册时刻绑定的交换对"
    );
}

#[test]
fn non_positive_timeout_disables_the_timer() {
    let clock = MockClock::new();
    let (_request, response, pair) = make_pair();
    let connection = StubConnection::new();
    let coordinator = AsyncCoordinator::builder(Scope::new("app"), pair, connection.clone())
        .clock(Arc::new(clock.clone()))
        .settings(AsyncSettings::with_default_timeout_ms(-1))
        .build();

    coordinator.suspend(None).unwrap();
    clock.advance(Duration::from_secs(3600));
    thread::sleep(Duration::from_millis(20));

    assert_eq!(coordinator.snapshot().phase, AsyncPhase::Suspended);
    assert!(response.sent_errors().is_empty());
    assert_eq!(connection.total_count(), 0);
    coordinator.complete().unwrap();
}

#[test]
fn unhandled_timeout_notifies_in_order_then_applies_default_disposition() {
    let clock = MockClock::new();
    let (tx, rx) = mpsc::channel();
    let first = RecordingListener::with_channel("first", tx.clone());
    let second = RecordingListener::with_channel("second", tx);

    let (_request, response, pair) = make_pair();
    let connection = StubConnection::new();
    let coordinator = AsyncCoordinator::builder(Scope::new("app"), pair, connection.clone())
        .clock(Arc::new(clock.clone()))
        .settings(AsyncSettings::with_default_timeout_ms(5))
        .build();

    coordinator.suspend(None).unwrap();
    coordinator.add_listener(first, None).unwrap();
    coordinator.add_listener(second, None).unwrap();

    clock.advance(Duration::from_millis(5));

    let timeout = Duration::from_secs(2);
    assert_eq!(rx.recv_timeout(timeout).unwrap(), ("first", PassKind::Timeout));
    assert_eq!(rx.recv_timeout(timeout).unwrap(), ("second", PassKind::Timeout));

    wait_for(|| coordinator.snapshot().phase == AsyncPhase::Done);
    wait_for(|| connection.total_count() == 1);
    assert_eq!(connection.abort_count(), 1);
    assert_eq!(connection.release_count(), 0);
    let errors = response.sent_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, 503);
}

/// 在超时遍历内救活周期的监听器。
struct RescueListener;

impl AsyncListener for RescueListener {
    fn on_timeout(&self, event: &AsyncEvent) -> relay_core::Result<()> {
        event.coordinator().complete()
    }
}

#[test]
fn listener_handling_timeout_suppresses_default_disposition() {
    let clock = MockClock::new();
    let (_request, response, pair) = make_pair();
    let connection = StubConnection::new();
    let witness = RecordingListener::named("witness");
    let coordinator = AsyncCoordinator::builder(Scope::new("app"), pair, connection.clone())
        .clock(Arc::new(clock.clone()))
        .settings(AsyncSettings::with_default_timeout_ms(5))
        .build();

    coordinator.suspend(None).unwrap();
    coordinator
        .add_listener(Arc::new(RescueListener), None)
        .unwrap();
    coordinator.add_listener(witness.clone(), None).unwrap();

    clock.advance(Duration::from_millis(5));
    wait_for(|| coordinator.snapshot().phase == AsyncPhase::Done);
    wait_for(|| connection.total_count() == 1);

    // 救活立即生效（完成遍历先到），但超时遍历仍通知剩余监听器。
    assert_eq!(witness.passes(), vec![PassKind::Complete, PassKind::Timeout]);
    assert_eq!(connection.release_count(), 1);
    assert_eq!(connection.abort_count(), 0);
    assert!(response.sent_errors().is_empty());
}

#[test]
fn background_work_unit_completes_the_cycle() {
    let (tx, rx) = mpsc::channel();
    let listener = RecordingListener::with_channel("bg", tx);
    let (_request, _response, pair) = make_pair();
    let connection = StubConnection::new();
    let coordinator =
        AsyncCoordinator::builder(Scope::new("app"), pair, connection.clone()).build();

    coordinator.suspend(None).unwrap();
    coordinator.add_listener(listener, None).unwrap();

    let worker = coordinator.clone();
    coordinator
        .start(move || {
            thread::sleep(Duration::from_millis(10));
            worker.complete().unwrap();
        })
        .unwrap();

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).unwrap(),
        ("bg", PassKind::Complete)
    );
    wait_for(|| connection.release_count() == 1);
    assert_eq!(connection.abort_count(), 0);
}

#[test]
fn timer_and_complete_race_produces_exactly_one_terminal_pass() {
    for _ in 0..50 {
        let (_request, response, pair) = make_pair();
        let connection = StubConnection::new();
        let listener = RecordingListener::named("racer");
        let coordinator =
            AsyncCoordinator::builder(Scope::new("app"), pair, connection.clone())
                .settings(AsyncSettings::with_default_timeout_ms(1))
                .build();

        coordinator.suspend(None).unwrap();
        // 定时器可能已赢得认领，注册失败属于合法交错。
        let _ = coordinator.add_listener(listener.clone(), None);

        let contender = coordinator.clone();
        let join = thread::spawn(move || {
            let _ = contender.complete();
        });
        join.join().unwrap();

        wait_for(|| coordinator.snapshot().phase == AsyncPhase::Done);
        wait_for(|| connection.total_count() == 1);
        // 给败方留出跑完空操作的时间，再断言归还没有翻倍。
        thread::sleep(Duration::from_millis(3));
        assert_eq!(connection.total_count(), 1);

        let terminals = listener
            .passes()
            .iter()
            .filter(|kind| matches!(kind, PassKind::Complete | PassKind::Timeout))
            .count();
        assert!(terminals <= 1, "终态遍历不得多于一次");

        let errors = response.sent_errors();
        if connection.abort_count() == 1 {
            assert_eq!(errors.len(), 1, "默认处置应写出恰好一个错误响应");
        } else {
            assert!(errors.is_empty(), "正常完成不得写出默认处置响应");
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("simulated downstream failure")]
struct DownstreamFailure;

struct FaultyListener;

impl AsyncListener for FaultyListener {
    fn on_complete(&self, _event: &AsyncEvent) -> relay_core::Result<()> {
        Err(CoreError::new(codes::IO_TRANSPORT, "flush failed").with_cause(DownstreamFailure))
    }
}

#[test]
fn listener_fault_is_isolated_and_surfaced_to_the_observer() {
    let observer = RecordingObserver::new();
    let survivor = RecordingListener::named("survivor");
    let (_request, _response, pair) = make_pair();
    let coordinator =
        AsyncCoordinator::builder(Scope::new("app"), pair, StubConnection::new())
            .settings(AsyncSettings::with_default_timeout_ms(0))
            .observer(observer.clone())
            .build();

    coordinator.suspend(None).unwrap();
    coordinator
        .add_listener(Arc::new(FaultyListener), None)
        .unwrap();
    coordinator.add_listener(survivor.clone(), None).unwrap();
    coordinator.complete().unwrap();

    // 故障监听器不得阻断同遍历的后续监听器。
    assert_eq!(survivor.passes(), vec![PassKind::Complete]);

    let events = observer.events();
    assert!(events.iter().any(|event| matches!(
        event,
        CoordinatorEvent::ListenerFault { kind: PassKind::Complete, code, .. }
            if *code == codes::IO_TRANSPORT
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        CoordinatorEvent::PassCompleted { kind: PassKind::Complete, notified: 2, faults: 1, .. }
    )));
}

#[test]
fn unhandled_error_behaves_like_an_unhandled_timeout() {
    let (_request, response, pair) = make_pair();
    let connection = StubConnection::new();
    let listener = RecordingListener::named("witness");
    let coordinator = AsyncCoordinator::builder(Scope::new("app"), pair, connection.clone())
        .settings(AsyncSettings::with_default_timeout_ms(0))
        .build();

    coordinator.suspend(None).unwrap();
    coordinator.add_listener(listener.clone(), None).unwrap();
    coordinator
        .raise_error(CoreError::new(codes::IO_TRANSPORT, "read side collapsed"))
        .unwrap();

    assert_eq!(listener.passes(), vec![PassKind::Error]);
    assert_eq!(coordinator.snapshot().phase, AsyncPhase::Done);
    assert_eq!(connection.abort_count(), 1);
    assert_eq!(connection.release_count(), 0);
    let errors = response.sent_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, 503);

    // 终态后故障注入不再合法。
    let err = coordinator
        .raise_error(CoreError::new(codes::IO_TRANSPORT, "late"))
        .unwrap_err();
    assert_eq!(err.code(), codes::LIFECYCLE_ILLEGAL_STATE);
}

#[test]
fn suspend_with_override_pair_loses_original_identity() {
    let (_request, _response, pair) = make_pair();
    let (_wrapped_request, _wrapped_response, wrapped_pair) = make_pair();
    let coordinator =
        AsyncCoordinator::builder(Scope::new("app"), pair, StubConnection::new())
            .settings(AsyncSettings::with_default_timeout_ms(0))
            .build();

    assert!(coordinator.has_original_exchange());
    coordinator.suspend(Some(wrapped_pair.clone())).unwrap();
    assert!(!coordinator.has_original_exchange());
    assert!(coordinator.exchange().same_identity(&wrapped_pair));
    assert_eq!(coordinator.snapshot().epoch, 1);
    coordinator.complete().unwrap();
}
