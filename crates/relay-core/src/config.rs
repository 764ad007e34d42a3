//! 异步生命周期内核的运行时配置。
//!
//! # 模块定位（Why）
//! - 默认挂起超时是宿主可调的治理参数；配置以序列化友好的结构承载，
//!   并通过可热替换的句柄下发，避免重建协调器工厂；
//! - 单个周期仍可用 `set_timeout` 覆盖默认值，配置只决定新周期的初值。

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// 异步处理的可配置参数集。
///
/// # 契约说明（What）
/// - `default_timeout_ms`：新周期的默认挂起超时（毫秒）；`<= 0` 表示默认
///   禁用定时器，语义与 `set_timeout` 一致；
/// - 结构整体可序列化，宿主可直接嵌入自己的配置文件格式。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AsyncSettings {
    /// 新周期的默认挂起超时毫秒数。
    pub default_timeout_ms: i64,
}

impl AsyncSettings {
    /// 以显式超时构造配置。
    pub fn with_default_timeout_ms(default_timeout_ms: i64) -> Self {
        Self { default_timeout_ms }
    }

    /// 判断给定超时值是否武装定时器。
    pub fn timer_enabled(timeout_ms: i64) -> bool {
        timeout_ms > 0
    }
}

impl Default for AsyncSettings {
    fn default() -> Self {
        // 与常见容器一致的保守默认：30 秒。
        Self {
            default_timeout_ms: 30_000,
        }
    }
}

/// 配置的热替换句柄：读方拿快照，写方整体替换。
///
/// # 执行逻辑（How）
/// - 内部以 `Arc<AsyncSettings>` 保存当前版本；`snapshot` 克隆 `Arc`，
///   读方持有的快照不受后续替换影响；
/// - 替换是整体原子的，不存在字段级撕裂。
#[derive(Clone)]
pub struct SettingsHandle {
    current: Arc<Mutex<Arc<AsyncSettings>>>,
}

impl SettingsHandle {
    /// 以初始配置创建句柄。
    pub fn new(initial: AsyncSettings) -> Self {
        Self {
            current: Arc::new(Mutex::new(Arc::new(initial))),
        }
    }

    /// 获取当前配置快照。
    pub fn snapshot(&self) -> Arc<AsyncSettings> {
        Arc::clone(&self.current.lock())
    }

    /// 整体替换配置。
    pub fn replace(&self, settings: AsyncSettings) {
        *self.current.lock() = Arc::new(settings);
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(AsyncSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_roundtrip_through_json() {
        let settings = AsyncSettings::with_default_timeout_ms(1500);
        let text = serde_json::to_string(&settings).unwrap();
        let back: AsyncSettings = serde_json::from_str(&text).unwrap();
        assert_eq!(settings, back);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_str::<AsyncSettings>(
            r#"{"default_timeout_ms":10,"bogus":true}"#,
        );
        assert!(err.is_err(), "未知字段必须被拒绝，防止配置拼写错误静默生效");
    }

    #[test]
    fn replace_does_not_disturb_existing_snapshots() {
        let handle = SettingsHandle::new(AsyncSettings::with_default_timeout_ms(100));
        let old = handle.snapshot();
        handle.replace(AsyncSettings::with_default_timeout_ms(200));
        assert_eq!(old.default_timeout_ms, 100);
        assert_eq!(handle.snapshot().default_timeout_ms, 200);
    }

    #[test]
    fn non_positive_timeout_disables_timer() {
        assert!(!AsyncSettings::timer_enabled(0));
        assert!(!AsyncSettings::timer_enabled(-5));
        assert!(AsyncSettings::timer_enabled(1));
    }
}
