//! 路由器配置：一次构建、校验后只读。
//!
//! # 教案级说明（Why）
//! - 基数约束 `1 ≤ min ≤ initial ≤ max` 必须在构建时暴露，运行期不会再出现配置错误；
//! - 监督策略与调度器对路由层是不透明的外部引用，这里只保存标识；
//! - 自动伸缩字段仅作为配置承载，执行伸缩的控制回路属于宿主。
//!
//! # 入口（What）
//! - [`RouterConfig::builder`]：链式设置并在 [`RouterConfigBuilder::build`] 处统一校验；
//! - [`RouterConfig::from_toml_str`]：声明式文档同样经由构建器校验，无法绕过约束。

use std::{borrow::Cow, fmt};

use serde::Deserialize;

use crate::error::ConfigError;

/// 默认监督策略标识。
pub const ONE_FOR_ONE: &str = "one-for-one";

/// 默认调度器标识。
pub const DEFAULT_DISPATCHER: &str = "default";

/// 路由策略种类。
///
/// 轮询、随机、广播只作为配置标签存在，本 crate 不提供其实现。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouterKind {
    RoundRobin,
    Random,
    ConsistentHash,
    Broadcast,
    ScatterGather,
    SmallestMailbox,
    Custom,
}

/// 不透明的监督策略引用。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SupervisorStrategyRef(Cow<'static, str>);

impl SupervisorStrategyRef {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// “一对一”策略：只重启失败的子 Actor。
    pub const fn one_for_one() -> Self {
        Self(Cow::Borrowed(ONE_FOR_ONE))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SupervisorStrategyRef {
    fn default() -> Self {
        Self::one_for_one()
    }
}

/// 不透明的调度器标识。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DispatcherId(Cow<'static, str>);

impl DispatcherId {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DispatcherId {
    fn default() -> Self {
        Self(Cow::Borrowed(DEFAULT_DISPATCHER))
    }
}

/// 不可变的路由器配置。
///
/// # 教案式说明
/// - **契约 (What)**：只能通过构建器或 [`RouterConfig::new`] 获得，后者使用保证合法的默认值；
///   字段只读，构建后不会再变化；
/// - **默认值**：initial 1、min 1、max 10、`one-for-one`、`default` 调度器、
///   自动伸缩关闭、扩容阈值 100（积压消息数）、缩容阈值 300（空闲秒数）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterConfig {
    kind: RouterKind,
    initial_routees: usize,
    min_routees: usize,
    max_routees: usize,
    supervisor_strategy: SupervisorStrategyRef,
    dispatcher: DispatcherId,
    auto_scaling: bool,
    scale_up_threshold: u32,
    scale_down_threshold: u32,
}

impl RouterConfig {
    /// 默认配置。
    pub fn new(kind: RouterKind) -> Self {
        let builder = RouterConfigBuilder::new(kind);
        RouterConfig {
            kind,
            initial_routees: builder.initial_routees,
            min_routees: builder.min_routees,
            max_routees: builder.max_routees,
            supervisor_strategy: builder.supervisor_strategy,
            dispatcher: builder.dispatcher,
            auto_scaling: builder.auto_scaling,
            scale_up_threshold: builder.scale_up_threshold,
            scale_down_threshold: builder.scale_down_threshold,
        }
    }

    /// 创建校验型构建器。
    pub fn builder(kind: RouterKind) -> RouterConfigBuilder {
        RouterConfigBuilder::new(kind)
    }

    /// 从 TOML 文档解析配置。
    ///
    /// 文档键使用 kebab-case，除 `kind` 外均可省略；未知键被拒绝。
    ///
    /// ```toml
    /// kind = "consistent-hash"
    /// min-routees = 2
    /// initial-routees = 4
    /// max-routees = 16
    /// auto-scaling = true
    /// ```
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let document: RouterConfigDocument =
            toml::from_str(document).map_err(|err| ConfigError::Parse {
                detail: err.message().to_owned(),
            })?;
        document.into_builder().build()
    }

    pub fn kind(&self) -> RouterKind {
        self.kind
    }

    pub fn initial_routees(&self) -> usize {
        self.initial_routees
    }

    pub fn min_routees(&self) -> usize {
        self.min_routees
    }

    pub fn max_routees(&self) -> usize {
        self.max_routees
    }

    pub fn supervisor_strategy(&self) -> &SupervisorStrategyRef {
        &self.supervisor_strategy
    }

    pub fn dispatcher(&self) -> &DispatcherId {
        &self.dispatcher
    }

    pub fn auto_scaling(&self) -> bool {
        self.auto_scaling
    }

    pub fn scale_up_threshold(&self) -> u32 {
        self.scale_up_threshold
    }

    pub fn scale_down_threshold(&self) -> u32 {
        self.scale_down_threshold
    }
}

impl fmt::Display for RouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RouterConfig{{type={:?}, routees={}-{}-{}, autoScaling={}}}",
            self.kind, self.min_routees, self.initial_routees, self.max_routees, self.auto_scaling
        )
    }
}

/// [`RouterConfig`] 的校验型构建器。
///
/// 基数字段原样保存并在 `build` 时校验；阈值字段在设置时钳制到至少 1。
#[derive(Clone, Debug)]
pub struct RouterConfigBuilder {
    kind: RouterKind,
    initial_routees: usize,
    min_routees: usize,
    max_routees: usize,
    supervisor_strategy: SupervisorStrategyRef,
    dispatcher: DispatcherId,
    auto_scaling: bool,
    scale_up_threshold: u32,
    scale_down_threshold: u32,
}

impl RouterConfigBuilder {
    fn new(kind: RouterKind) -> Self {
        Self {
            kind,
            initial_routees: 1,
            min_routees: 1,
            max_routees: 10,
            supervisor_strategy: SupervisorStrategyRef::one_for_one(),
            dispatcher: DispatcherId::default(),
            auto_scaling: false,
            scale_up_threshold: 100,
            scale_down_threshold: 300,
        }
    }

    pub fn with_initial_routees(mut self, initial: usize) -> Self {
        self.initial_routees = initial;
        self
    }

    pub fn with_min_routees(mut self, min: usize) -> Self {
        self.min_routees = min;
        self
    }

    pub fn with_max_routees(mut self, max: usize) -> Self {
        self.max_routees = max;
        self
    }

    pub fn with_supervisor_strategy(mut self, strategy: SupervisorStrategyRef) -> Self {
        self.supervisor_strategy = strategy;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: DispatcherId) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_auto_scaling(mut self, enabled: bool) -> Self {
        self.auto_scaling = enabled;
        self
    }

    /// 扩容阈值（积压消息数），至少为 1。
    pub fn with_scale_up_threshold(mut self, threshold: u32) -> Self {
        self.scale_up_threshold = threshold.max(1);
        self
    }

    /// 缩容阈值（空闲秒数），至少为 1。
    pub fn with_scale_down_threshold(mut self, threshold: u32) -> Self {
        self.scale_down_threshold = threshold.max(1);
        self
    }

    /// 校验基数约束并冻结配置。
    ///
    /// # 契约说明（What）
    /// - 依次检查 `min ≥ 1`、`min ≤ max`、`min ≤ initial ≤ max`，返回首个违例；
    /// - 成功时返回的 [`RouterConfig`] 不再可变。
    pub fn build(self) -> Result<RouterConfig, ConfigError> {
        let RouterConfigBuilder {
            kind,
            initial_routees,
            min_routees,
            max_routees,
            supervisor_strategy,
            dispatcher,
            auto_scaling,
            scale_up_threshold,
            scale_down_threshold,
        } = self;

        if min_routees == 0 {
            return Err(ConfigError::MinRouteesZero);
        }
        if min_routees > max_routees {
            return Err(ConfigError::MinExceedsMax {
                min: min_routees,
                max: max_routees,
            });
        }
        if initial_routees < min_routees || initial_routees > max_routees {
            return Err(ConfigError::InitialOutOfRange {
                initial: initial_routees,
                min: min_routees,
                max: max_routees,
            });
        }

        Ok(RouterConfig {
            kind,
            initial_routees,
            min_routees,
            max_routees,
            supervisor_strategy,
            dispatcher,
            auto_scaling,
            scale_up_threshold,
            scale_down_threshold,
        })
    }
}

/// TOML 文档的原始形态，只用于喂给构建器。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RouterConfigDocument {
    kind: RouterKind,
    initial_routees: Option<usize>,
    min_routees: Option<usize>,
    max_routees: Option<usize>,
    supervisor_strategy: Option<String>,
    dispatcher: Option<String>,
    auto_scaling: Option<bool>,
    scale_up_threshold: Option<u32>,
    scale_down_threshold: Option<u32>,
}

impl RouterConfigDocument {
    fn into_builder(self) -> RouterConfigBuilder {
        let mut builder = RouterConfig::builder(self.kind);
        if let Some(initial) = self.initial_routees {
            builder = builder.with_initial_routees(initial);
        }
        if let Some(min) = self.min_routees {
            builder = builder.with_min_routees(min);
        }
        if let Some(max) = self.max_routees {
            builder = builder.with_max_routees(max);
        }
        if let Some(strategy) = self.supervisor_strategy {
            builder = builder.with_supervisor_strategy(SupervisorStrategyRef::new(strategy));
        }
        if let Some(dispatcher) = self.dispatcher {
            builder = builder.with_dispatcher(DispatcherId::new(dispatcher));
        }
        if let Some(enabled) = self.auto_scaling {
            builder = builder.with_auto_scaling(enabled);
        }
        if let Some(threshold) = self.scale_up_threshold {
            builder = builder.with_scale_up_threshold(threshold);
        }
        if let Some(threshold) = self.scale_down_threshold {
            builder = builder.with_scale_down_threshold(threshold);
        }
        builder
    }
}
