//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为路由决策层对外暴露的错误语义提供集中定义，按“构造期致命 / 单次调用可恢复 / 整体操作失败”三档归类；
//! - 路由失败（没有可用 routee）不属于错误：它由 [`RouteResult`](crate::registry::RouteResult) 的失败分支表达，
//!   调用方不会在路由入口处收到 `Err`。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，并保持 `Clone + Eq`，方便在统计与测试中直接比较；
//! - 变体携带结构化上下文（路径、阈值、超时），错误文本保持稳定的英文描述。

use std::time::Duration;

use thiserror::Error;

/// 路由器配置在构建阶段的校验失败。
///
/// # 教案式说明
/// - **意图 (Why)**：基数约束 `1 ≤ min ≤ initial ≤ max` 只能在构造时暴露，绝不能延迟到运行期；
/// - **契约 (What)**：由 [`RouterConfigBuilder::build`](crate::config::RouterConfigBuilder::build)
///   与 [`RouterConfig::from_toml_str`](crate::config::RouterConfig::from_toml_str) 返回，出现即意味着配置对象未被创建。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    /// `min_routees` 为 0。
    #[error("min_routees must be at least 1")]
    MinRouteesZero,

    /// `min_routees` 大于 `max_routees`。
    #[error("min_routees ({min}) must not exceed max_routees ({max})")]
    MinExceedsMax { min: usize, max: usize },

    /// `initial_routees` 落在 `[min, max]` 区间之外。
    #[error("initial_routees ({initial}) must lie within [{min}, {max}]")]
    InitialOutOfRange {
        initial: usize,
        min: usize,
        max: usize,
    },

    /// 声明式配置文档无法解码。
    #[error("router configuration document is malformed: {detail}")]
    Parse { detail: String },
}

/// 消息构建阶段的校验失败。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum MessageError {
    /// 某个校验谓词拒绝了刚构建的消息。
    ///
    /// - `validator`：注册校验器时给出的名称；
    /// - `message_id`：被拒绝消息的 ID，便于排障。
    #[error("message `{message_id}` rejected by validator `{validator}`")]
    ValidationFailed {
        validator: String,
        message_id: String,
    },
}

/// routee 注册表的变更失败。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum RegistryError {
    /// 同一路径的 routee 已经注册。
    ///
    /// - **契约 (What)**：注册表以 `path` 作为身份，重复添加被拒绝且不会触发变更回调；
    /// - **风险 (Trade-offs)**：若宿主在重启 Actor 后复用路径，需先移除旧句柄再添加新句柄。
    #[error("routee `{path}` is already registered")]
    DuplicateRoutee { path: String },
}

/// 单个目标上的请求/响应交换失败。
///
/// 这类错误在分散收集中只影响对应目标，不会中止兄弟交换。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ExchangeError {
    /// 交换在给定超时内未完成。
    #[error("exchange with `{path}` timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },

    /// 目标显式返回失败。
    #[error("exchange with `{path}` failed: {detail}")]
    Failed { path: String, detail: String },

    /// 目标已终止，无法处理请求。
    #[error("routee `{path}` is terminated")]
    Terminated { path: String },
}

impl ExchangeError {
    /// 出错目标的路径。
    pub fn path(&self) -> &str {
        match self {
            ExchangeError::Timeout { path, .. }
            | ExchangeError::Failed { path, .. }
            | ExchangeError::Terminated { path } => path,
        }
    }
}

/// 分散收集整体操作的失败。
///
/// # 教案式说明
/// - **意图 (Why)**：与 [`ExchangeError`] 区分，表达“整场竞速没有产出结果”；
/// - **契约 (What)**：竞速模式只会以成功值或以下三种之一完成，绝不会出现部分结果。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ScatterGatherError {
    /// 调用时没有任何存活的目标。
    #[error("no live routees available for scatter-gather")]
    NoRoutees,

    /// 所有目标都失败，且没有任何一次成功。
    #[error("all {attempted} routees failed to respond")]
    AllFailed { attempted: usize },

    /// 整体超时先于任何成功到达。
    #[error("scatter-gather timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}
