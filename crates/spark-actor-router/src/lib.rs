#![deny(unsafe_code)]

//! # spark-actor-router
//!
//! ## 定位与职责（Why）
//! - Actor 运行时的消息路由决策层：给定一组目标（routee），逐条消息决定投递给谁；
//! - 提供三种非平凡策略：一致性哈希（会话/实体亲和）、最小邮箱（负载感知）、
//!   分散收集（竞速与汇总）；轮询、随机、广播只作为配置标签出现。
//!
//! ## 架构嵌入（Where）
//! - `message` 定义消息的身份、排序与路由提示契约；
//! - `routee` 声明宿主需要实现的目标句柄能力，路由层从不拥有 Actor；
//! - `registry` 承载成员集合、路由簿记与 [`RoutingStrategy`] 组合点；
//! - `strategy` 下为各具体策略，`race` 为分散收集使用的单次赋值结果槽；
//! - `config` 与 `error` 分别集中定义只读配置与 `thiserror` 风格的错误。
//!
//! ## Feature 策略（Trade-offs）
//! - 默认开启 `runtime-tokio`：分散收集依赖 Tokio 的任务、计时器与通知原语；
//! - 关闭后仍可使用同步的一致性哈希与最小邮箱策略。
//!
//! ## 可观测性
//! - 全部日志通过 `tracing` 宏输出，库本身从不安装订阅者。

pub mod config;
pub mod error;
pub mod message;
#[cfg(feature = "runtime-tokio")]
pub mod race;
pub mod registry;
pub mod routee;
pub mod strategy;

pub use config::{DispatcherId, RouterConfig, RouterConfigBuilder, RouterKind, SupervisorStrategyRef};
pub use error::{ConfigError, ExchangeError, MessageError, RegistryError, ScatterGatherError};
pub use message::{Message, MessageBuilder};
#[cfg(feature = "runtime-tokio")]
pub use race::RaceCell;
pub use registry::{RouteResult, RouteeChange, RouteeRegistry, Router, RouterStats, RoutingStrategy};
pub use routee::{Routee, RouteeRef, SenderRef};
pub use strategy::{
    ConsistentHashOptions, ConsistentHashStrategy, HashRingStatus, LoadStats, MailboxProbe,
    MailboxRoutingStats, SmallestMailboxOptions, SmallestMailboxStrategy,
};
#[cfg(feature = "runtime-tokio")]
pub use strategy::{ScatterGatherOptions, ScatterGatherStats, ScatterGatherStrategy};
