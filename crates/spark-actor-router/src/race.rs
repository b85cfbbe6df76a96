//! 单次赋值的竞速结果槽。
//!
//! # 教案级说明（Why）
//! - 分散收集中多个交换可能同时完成，结果必须且只能被写入一次；
//! - 以 `OnceLock` 承担“首个写者胜出”的原子判定，以 Tokio `Notify` 唤醒等待者，
//!   避免“锁 + 标志位”组合带来的推理负担。
//!
//! # 契约（What）
//! - [`RaceCell::try_resolve`] 返回本次写入是否胜出，败者的值被直接丢弃；
//! - 解析后 [`RaceCell::get`] 与 [`RaceCell::resolved`] 每次返回同一个值。

use std::{fmt, pin::pin, sync::OnceLock};

use tokio::sync::Notify;

/// 首个写者胜出的结果槽。
pub struct RaceCell<T> {
    slot: OnceLock<T>,
    resolved: Notify,
}

impl<T> RaceCell<T> {
    pub fn new() -> Self {
        Self {
            slot: OnceLock::new(),
            resolved: Notify::new(),
        }
    }

    /// 尝试写入结果，返回是否由本次调用完成解析。
    pub fn try_resolve(&self, value: T) -> bool {
        if self.slot.set(value).is_ok() {
            self.resolved.notify_waiters();
            true
        } else {
            false
        }
    }

    /// 已解析的值。
    pub fn get(&self) -> Option<&T> {
        self.slot.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.get().is_some()
    }

    /// 等待解析完成。
    ///
    /// 先登记通知再检查槽位，解析发生在两者之间时也不会丢失唤醒。
    pub async fn resolved(&self) -> &T {
        loop {
            let mut notified = pin!(self.resolved.notified());
            notified.as_mut().enable();
            if let Some(value) = self.slot.get() {
                return value;
            }
            notified.await;
        }
    }
}

impl<T> Default for RaceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for RaceCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaceCell")
            .field("value", &self.slot.get())
            .finish()
    }
}
