//! 高级路由策略。
//!
//! 每个策略实现 [`RoutingStrategy`](crate::registry::RoutingStrategy)，由
//! [`Router`](crate::registry::Router) 组合使用；策略专属的查询与操作以
//! `impl Router<具体策略>` 的固有方法提供。

pub mod consistent_hash;
#[cfg(feature = "runtime-tokio")]
pub mod scatter_gather;
pub mod smallest_mailbox;

pub use consistent_hash::{ConsistentHashOptions, ConsistentHashStrategy, HashRingStatus, ring_hash};
#[cfg(feature = "runtime-tokio")]
pub use scatter_gather::{ScatterGatherOptions, ScatterGatherStats, ScatterGatherStrategy};
pub use smallest_mailbox::{
    LoadStats, MailboxProbe, MailboxRoutingStats, SmallestMailboxOptions, SmallestMailboxStrategy,
};
