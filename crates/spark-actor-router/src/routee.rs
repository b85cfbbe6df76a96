//! 目标句柄（routee）能力契约。
//!
//! # 教案级说明（Why）
//! - 路由层不拥有 Actor：邮箱执行、监督重启与生命周期全部由宿主运行时负责；
//! - 本模块只声明路由决策所需的最小能力集合（路径、存活判定、单向投递、带超时的请求/响应），
//!   宿主实现该 trait 后即可挂入任意路由策略。
//!
//! # 契约（What）
//! - `path` 必须在句柄生命周期内保持稳定，它是哈希环坐标与负载缓存的键；
//! - 注册表只保存宿主交给它的句柄引用，从不创建或销毁句柄。

use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use futures::future::BoxFuture;

use crate::{error::ExchangeError, message::Message};

/// 宿主提供的目标句柄能力。
///
/// # 教案式说明
/// - **意图 (Why)**：以对象安全 trait 表达外部 `ActorRef`，路由核心不假设任何具体表示；
/// - **契约 (What)**：
///   - `tell` 为即发即忘投递，不返回结果；
///   - `ask` 返回 `'static` Future，超时由调用方给出，实现应尽力遵守；
///     分散收集仍会在外层再套一层计时器，因此忽略超时的实现不会拖住调用方；
/// - **线程安全**：实现必须满足 `Send + Sync + 'static`，以便在 `Arc` 中跨线程共享。
pub trait Routee: Send + Sync + 'static {
    /// 稳定路径，例如 `/user/room-service/worker-3`。
    fn path(&self) -> &str;

    /// 目标是否已终止。
    fn is_terminated(&self) -> bool;

    /// 单向投递消息。
    fn tell(&self, message: Message, sender: Option<&RouteeRef>);

    /// 发起一次请求/响应交换。
    fn ask(
        &self,
        message: Message,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<Message, ExchangeError>>;
}

/// 共享的目标句柄。
pub type RouteeRef = Arc<dyn Routee>;

impl fmt::Debug for dyn Routee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routee")
            .field("path", &self.path())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// 消息中携带的发送者查找引用。
///
/// # 教案式说明
/// - **意图 (Why)**：消息不得延长发送者的生命周期，因此仅保存路径与 `Weak` 句柄；
/// - **契约 (What)**：`path` 始终可读（用于哈希键提取），`upgrade` 在发送者已释放时返回 `None`。
#[derive(Clone)]
pub struct SenderRef {
    path: Arc<str>,
    handle: Weak<dyn Routee>,
}

impl SenderRef {
    /// 从共享句柄生成查找引用。
    pub fn from_routee(routee: &RouteeRef) -> Self {
        Self {
            path: Arc::from(routee.path()),
            handle: Arc::downgrade(routee),
        }
    }

    /// 发送者路径。
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 尝试取回仍然存活的发送者句柄。
    pub fn upgrade(&self) -> Option<RouteeRef> {
        self.handle.upgrade()
    }
}

impl fmt::Debug for SenderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderRef")
            .field("path", &self.path)
            .field("alive", &(self.handle.strong_count() > 0))
            .finish()
    }
}

impl From<&RouteeRef> for SenderRef {
    fn from(routee: &RouteeRef) -> Self {
        SenderRef::from_routee(routee)
    }
}

/// 按路径判断两个句柄是否指向同一目标。
pub(crate) fn same_path(left: &RouteeRef, right: &RouteeRef) -> bool {
    left.path() == right.path()
}
