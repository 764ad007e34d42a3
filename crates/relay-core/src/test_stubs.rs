//! 边界契约的测试桩集合，供契约测试与属性测试复用。
//!
//! # 设计定位（Why）
//! - 协调器的每条路径都依赖传输侧契约（请求、响应、连接、字节源）；
//!   各测试文件自行定义桩类型会在契约演进时漏改，统一出口把编译错误
//!   集中到一处。
//! - 桩对象以记录为主：写入的错误响应、连接归还次数、监听器收到的遍历
//!   次序都可在测试末尾取出断言。
//!
//! # 使用方式（How）
//! - `use relay_core::test_stubs::transport::*;` 取传输桩，
//!   `use relay_core::test_stubs::lifecycle::*;` 取监听器/执行器桩；
//! - 所有桩类型线程安全，按 `Arc` 注入后可在定时器线程与工作线程间共享。

pub mod transport {
    //! 传输边界契约的记录型桩实现。

    use std::borrow::Cow;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::BufMut;
    use parking_lot::Mutex;
    use relay_transport::{
        ByteSource, Connection, ReadOutcome, ReleaseDecision, Request, Response,
        Result as TransportResult, SourceProbe, TransportError, TransportErrorKind,
    };

    /// 可变路径元数据的请求桩：测试通过 setter 模拟派发包装改写路径，
    /// 再断言保留属性仍回放原始值。
    #[derive(Debug)]
    pub struct StubRequest {
        paths: Mutex<StubPaths>,
        attributes: Mutex<HashMap<String, String>>,
    }

    #[derive(Debug, Clone)]
    struct StubPaths {
        uri: String,
        context_path: String,
        mapping: String,
        path_info: Option<String>,
        unit_path: String,
        query_string: Option<String>,
    }

    impl StubRequest {
        /// 以给定 URI 构造，其余路径元数据取可辨识的固定值。
        pub fn with_uri(uri: impl Into<String>) -> Arc<Self> {
            let uri = uri.into();
            Arc::new(Self {
                paths: Mutex::new(StubPaths {
                    unit_path: uri.clone(),
                    uri,
                    context_path: "/app".to_owned(),
                    mapping: "/orders/*".to_owned(),
                    path_info: Some("/42".to_owned()),
                    query_string: Some("page=1".to_owned()),
                }),
                attributes: Mutex::new(HashMap::new()),
            })
        }

        /// 改写当前 URI（模拟派发目标包装）。
        pub fn set_uri(&self, uri: impl Into<String>) {
            self.paths.lock().uri = uri.into();
        }

        /// 改写查询串。
        pub fn set_query_string(&self, query: Option<String>) {
            self.paths.lock().query_string = query;
        }
    }

    impl Request for StubRequest {
        fn uri(&self) -> String {
            self.paths.lock().uri.clone()
        }

        fn context_path(&self) -> String {
            self.paths.lock().context_path.clone()
        }

        fn mapping(&self) -> String {
            self.paths.lock().mapping.clone()
        }

        fn path_info(&self) -> Option<String> {
            self.paths.lock().path_info.clone()
        }

        fn unit_path(&self) -> String {
            self.paths.lock().unit_path.clone()
        }

        fn query_string(&self) -> Option<String> {
            self.paths.lock().query_string.clone()
        }

        fn attribute(&self, key: &str) -> Option<String> {
            self.attributes.lock().get(key).cloned()
        }

        fn set_attribute(&self, key: &str, value: String) {
            self.attributes.lock().insert(key.to_owned(), value);
        }
    }

    /// 记录型响应桩：保留每次 `send_error` 的状态码与消息。
    #[derive(Debug, Default)]
    pub struct StubResponse {
        errors: Mutex<Vec<(u16, String)>>,
        flushes: AtomicUsize,
    }

    impl StubResponse {
        /// 构造空响应桩。
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// 已写出的错误响应（状态码 + 消息）。
        pub fn sent_errors(&self) -> Vec<(u16, String)> {
            self.errors.lock().clone()
        }

        /// `flush` 被调用的次数。
        pub fn flush_count(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }
    }

    impl Response for StubResponse {
        fn send_error(&self, status: u16, message: &str) -> TransportResult<()> {
            self.errors.lock().push((status, message.to_owned()));
            Ok(())
        }

        fn flush(&self) -> TransportResult<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// 计数型连接桩：归还与中止各自计数，用于断言“恰好一次”。
    #[derive(Debug, Default)]
    pub struct StubConnection {
        releases: AtomicUsize,
        aborts: AtomicUsize,
    }

    impl StubConnection {
        /// 构造空连接桩。
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// `release` 被调用的次数。
        pub fn release_count(&self) -> usize {
            self.releases.load(Ordering::SeqCst)
        }

        /// `abort` 被调用的次数。
        pub fn abort_count(&self) -> usize {
            self.aborts.load(Ordering::SeqCst)
        }

        /// 归还 + 中止的总次数（周期不变式：恰好为 1）。
        pub fn total_count(&self) -> usize {
            self.release_count() + self.abort_count()
        }
    }

    impl Connection for StubConnection {
        fn id(&self) -> Cow<'_, str> {
            Cow::Borrowed("stub-conn-1")
        }

        fn release(&self) -> ReleaseDecision {
            self.releases.fetch_add(1, Ordering::SeqCst);
            ReleaseDecision::Reuse
        }

        fn abort(&self) -> ReleaseDecision {
            self.aborts.fetch_add(1, Ordering::SeqCst);
            ReleaseDecision::Close
        }
    }

    /// 剧本化字节源：测试按步骤推进可读数据、终止与故障。
    #[derive(Debug, Default)]
    pub struct ScriptedSource {
        state: Mutex<ScriptState>,
    }

    #[derive(Debug, Default)]
    struct ScriptState {
        pending: Vec<u8>,
        exhausted: bool,
        failure: Option<String>,
    }

    impl ScriptedSource {
        /// 构造初始无数据的字节源。
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// 注入一段可读数据（随后 `probe` 返回就绪）。
        pub fn push(&self, bytes: &[u8]) {
            self.state.lock().pending.extend_from_slice(bytes);
        }

        /// 标记输入正常终止。
        pub fn finish(&self) {
            self.state.lock().exhausted = true;
        }

        /// 注入一次 I/O 故障（此后 `probe`/`read` 返回该错误）。
        pub fn fail(&self, message: impl Into<String>) {
            self.state.lock().failure = Some(message.into());
        }
    }

    impl ByteSource for ScriptedSource {
        fn probe(&self) -> TransportResult<SourceProbe> {
            let state = self.state.lock();
            if let Some(message) = &state.failure {
                return Err(TransportError::new(TransportErrorKind::Io, message.clone()));
            }
            if !state.pending.is_empty() {
                Ok(SourceProbe::Ready)
            } else if state.exhausted {
                Ok(SourceProbe::Exhausted)
            } else {
                Ok(SourceProbe::NotReady)
            }
        }

        fn read(&self, buf: &mut dyn BufMut) -> TransportResult<ReadOutcome> {
            let mut state = self.state.lock();
            if let Some(message) = &state.failure {
                return Err(TransportError::new(TransportErrorKind::Io, message.clone()));
            }
            if !state.pending.is_empty() {
                let drained: Vec<u8> = state.pending.drain(..).collect();
                buf.put_slice(&drained);
                return Ok(ReadOutcome::Read(drained.len()));
            }
            if state.exhausted {
                Ok(ReadOutcome::Exhausted)
            } else {
                Ok(ReadOutcome::WouldBlock)
            }
        }
    }
}

pub mod lifecycle {
    //! 生命周期契约的记录型桩：监听器、观察者与同步执行器。

    use std::borrow::Cow;
    use std::sync::Arc;
    use std::sync::mpsc::Sender;

    use parking_lot::Mutex;

    use crate::error::Result;
    use crate::listener::{AsyncEvent, AsyncListener, PassKind};
    use crate::observability::{CoordinatorEvent, LifecycleObserver};
    use crate::runtime::{WorkExecutor, WorkUnit};

    /// 记录收到的遍历类别序列的监听器；可选地把每次回调推入通道，
    /// 供跨线程测试同步等待。
    #[derive(Default)]
    pub struct RecordingListener {
        name: &'static str,
        passes: Mutex<Vec<PassKind>>,
        notify: Mutex<Option<Sender<(&'static str, PassKind)>>>,
    }

    impl RecordingListener {
        /// 以可辨识名称构造。
        pub fn named(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                ..Self::default()
            })
        }

        /// 附加一个跨线程通知通道。
        pub fn with_channel(name: &'static str, sender: Sender<(&'static str, PassKind)>) -> Arc<Self> {
            Arc::new(Self {
                name,
                passes: Mutex::new(Vec::new()),
                notify: Mutex::new(Some(sender)),
            })
        }

        /// 桩名称。
        pub fn name(&self) -> &'static str {
            self.name
        }

        /// 按触发顺序返回收到的遍历类别。
        pub fn passes(&self) -> Vec<PassKind> {
            self.passes.lock().clone()
        }

        fn record(&self, kind: PassKind) {
            self.passes.lock().push(kind);
            if let Some(sender) = self.notify.lock().as_ref() {
                let _ = sender.send((self.name, kind));
            }
        }
    }

    impl AsyncListener for RecordingListener {
        fn on_start_async(&self, _event: &AsyncEvent) -> Result<()> {
            self.record(PassKind::StartAsync);
            Ok(())
        }

        fn on_complete(&self, _event: &AsyncEvent) -> Result<()> {
            self.record(PassKind::Complete);
            Ok(())
        }

        fn on_timeout(&self, _event: &AsyncEvent) -> Result<()> {
            self.record(PassKind::Timeout);
            Ok(())
        }

        fn on_error(&self, _event: &AsyncEvent) -> Result<()> {
            self.record(PassKind::Error);
            Ok(())
        }
    }

    /// 记录全部观测事件的观察者。
    #[derive(Default)]
    pub struct RecordingObserver {
        events: Mutex<Vec<CoordinatorEvent>>,
    }

    impl RecordingObserver {
        /// 构造空观察者。
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// 按发生顺序返回事件副本。
        pub fn events(&self) -> Vec<CoordinatorEvent> {
            self.events.lock().clone()
        }
    }

    impl LifecycleObserver for RecordingObserver {
        fn on_event(&self, event: &CoordinatorEvent) {
            self.events.lock().push(event.clone());
        }
    }

    /// 在调用线程上同步执行工作单元的执行器。
    ///
    /// # 使用场景（Why）
    /// - 派发重入与后台工作缺省跑在分离线程上，时序断言因此需要跨线程
    ///   同步；本桩把执行压回调用线程，测试在调用返回后即可直接断言。
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ImmediateExecutor;

    impl WorkExecutor for ImmediateExecutor {
        fn execute(&self, _name: Cow<'static, str>, work: WorkUnit) {
            work();
        }
    }
}
