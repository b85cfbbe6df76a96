//! routee 注册表与路由器模板。
//!
//! # 教案级说明（Why）
//! - 所有策略共享同一套簿记：成员集合、成功/失败计数、成员变更回调；
//! - [`Router`] 组合一个 [`RoutingStrategy`] 而非继承，策略只负责“从快照中选谁”，
//!   其余簿记由模板方法 [`Router::route`] 统一完成。
//!
//! # 并发模型（How）
//! - 成员集合使用 `ArcSwap<Vec<RouteeRef>>` 持有：读路径 `load` 即得不可变快照，写路径整表替换；
//! - 写者之间由 `parking_lot::Mutex` 串行化，成员变更回调在同一临界区内执行，
//!   因此派生结构（哈希环、负载缓存）与成员集合按相同顺序更新；
//! - 计数器各自为独立原子量，不需要更大的锁。

use std::{
    borrow::Cow,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::{
    config::{RouterConfig, RouterKind},
    error::RegistryError,
    message::Message,
    routee::{RouteeRef, same_path},
};

/// 没有任何 routee 时的失败原因。
pub const NO_ROUTEES_AVAILABLE: &str = "no routees available";

/// 所有 routee 均已终止时的失败原因。
pub const NO_LIVE_ROUTEES: &str = "no live routees available";

/// 一次路由决策的结果。
///
/// # 教案式说明
/// - **契约 (What)**：成功分支必然持有非空、有序的目标列表；失败分支只携带人类可读原因。
///   两者互斥，调用方不会拿到“部分填充”的结果；
/// - **构造 (How)**：[`RouteResult::routed`] 对空列表自动降级为失败；直接构造的空
///   `Routed` 在 [`is_success`](RouteResult::is_success) 与 [`failure_reason`](RouteResult::failure_reason)
///   中同样按失败处理。
#[derive(Clone, Debug)]
pub enum RouteResult {
    /// 路由成功，目标按策略给出的顺序排列。
    Routed(Vec<RouteeRef>),
    /// 没有可用目标。
    Unroutable(Cow<'static, str>),
}

impl RouteResult {
    /// 以目标列表构造结果，空列表视为失败。
    pub fn routed(targets: Vec<RouteeRef>) -> Self {
        if targets.is_empty() {
            RouteResult::Unroutable(Cow::Borrowed(NO_ROUTEES_AVAILABLE))
        } else {
            RouteResult::Routed(targets)
        }
    }

    /// 单目标成功结果。
    pub fn single(target: RouteeRef) -> Self {
        RouteResult::Routed(vec![target])
    }

    /// 失败结果。
    pub fn unroutable(reason: impl Into<Cow<'static, str>>) -> Self {
        RouteResult::Unroutable(reason.into())
    }

    /// 至少有一个目标才算成功。
    pub fn is_success(&self) -> bool {
        matches!(self, RouteResult::Routed(targets) if !targets.is_empty())
    }

    /// 目标列表，失败时为空切片。
    pub fn targets(&self) -> &[RouteeRef] {
        match self {
            RouteResult::Routed(targets) => targets,
            RouteResult::Unroutable(_) => &[],
        }
    }

    /// 首个目标。
    pub fn first_target(&self) -> Option<&RouteeRef> {
        self.targets().first()
    }

    pub fn target_count(&self) -> usize {
        self.targets().len()
    }

    /// 失败原因，成功时为 `None`。
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            RouteResult::Routed(targets) if targets.is_empty() => Some(NO_ROUTEES_AVAILABLE),
            RouteResult::Routed(_) => None,
            RouteResult::Unroutable(reason) => Some(reason),
        }
    }

    /// 取出目标列表。
    pub fn into_targets(self) -> Vec<RouteeRef> {
        match self {
            RouteResult::Routed(targets) => targets,
            RouteResult::Unroutable(_) => Vec::new(),
        }
    }
}

impl fmt::Display for RouteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteResult::Routed(targets) if !targets.is_empty() => {
                write!(f, "RouteResult{{success=true, targets={}}}", targets.len())
            }
            RouteResult::Routed(_) => {
                write!(f, "RouteResult{{success=false, reason={NO_ROUTEES_AVAILABLE}}}")
            }
            RouteResult::Unroutable(reason) => {
                write!(f, "RouteResult{{success=false, reason={reason}}}")
            }
        }
    }
}

/// 成员变更事件，交给策略的变更回调。
#[derive(Clone, Copy, Debug)]
pub enum RouteeChange<'a> {
    /// 新增的 routee。
    Added(&'a RouteeRef),
    /// 被移除的 routee。
    Removed(&'a RouteeRef),
}

impl<'a> RouteeChange<'a> {
    /// 变更涉及的 routee。
    pub fn routee(&self) -> &'a RouteeRef {
        match self {
            RouteeChange::Added(routee) | RouteeChange::Removed(routee) => routee,
        }
    }
}

/// 路由策略的唯一能力：从成员快照中挑选目标。
///
/// # 教案式说明
/// - **意图 (Why)**：以组合替代继承，[`Router`] 持有策略实例并在模板方法中调用它；
/// - **契约 (What)**：
///   - `select_routees` 接收非空快照，必须是纯决策，不得修改 [`Router`] 的计数器；
///   - `on_routees_changed` 在注册表写锁内被调用，`routees` 为变更后的完整快照；
///     默认实现为空，需要派生结构的策略（哈希环、负载缓存）覆盖它。
pub trait RoutingStrategy: Send + Sync + 'static {
    /// 策略对应的配置种类。
    fn kind(&self) -> RouterKind;

    /// 从快照中选择目标。
    fn select_routees(
        &self,
        routees: &[RouteeRef],
        message: &Message,
        sender: Option<&RouteeRef>,
    ) -> RouteResult;

    /// 成员变更回调。
    fn on_routees_changed(&self, change: RouteeChange<'_>, routees: &[RouteeRef]) {
        let _ = (change, routees);
    }
}

/// 线程安全的成员集合。
///
/// 读者通过 [`snapshot`](Self::snapshot) 拿到隔离的不可变快照，写者整表替换。
pub struct RouteeRegistry {
    routees: ArcSwap<Vec<RouteeRef>>,
    write_lock: Mutex<()>,
}

impl RouteeRegistry {
    pub fn new() -> Self {
        Self {
            routees: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// 当前成员快照，与之后的增删互不影响。
    pub fn snapshot(&self) -> Arc<Vec<RouteeRef>> {
        self.routees.load_full()
    }

    pub fn len(&self) -> usize {
        self.routees.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routees.load().is_empty()
    }

    /// 按路径查找成员。
    pub fn find(&self, path: &str) -> Option<RouteeRef> {
        self.routees
            .load()
            .iter()
            .find(|routee| routee.path() == path)
            .cloned()
    }

    /// 添加成员，按路径拒绝重复；成功后在写锁内执行 `on_change`。
    pub fn insert<F>(&self, routee: RouteeRef, on_change: F) -> Result<(), RegistryError>
    where
        F: FnOnce(RouteeChange<'_>, &[RouteeRef]),
    {
        let _writer = self.write_lock.lock();
        let current = self.routees.load_full();
        if current.iter().any(|existing| same_path(existing, &routee)) {
            return Err(RegistryError::DuplicateRoutee {
                path: routee.path().to_owned(),
            });
        }

        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Arc::clone(&routee));
        let next = Arc::new(next);
        self.routees.store(Arc::clone(&next));

        on_change(RouteeChange::Added(&routee), &next);
        Ok(())
    }

    /// 按路径移除成员，返回被移除的句柄；成功后在写锁内执行 `on_change`。
    pub fn remove<F>(&self, path: &str, on_change: F) -> Option<RouteeRef>
    where
        F: FnOnce(RouteeChange<'_>, &[RouteeRef]),
    {
        let _writer = self.write_lock.lock();
        let current = self.routees.load_full();
        let position = current.iter().position(|routee| routee.path() == path)?;

        let mut next = Vec::clone(&current);
        let removed = next.remove(position);
        let next = Arc::new(next);
        self.routees.store(Arc::clone(&next));

        on_change(RouteeChange::Removed(&removed), &next);
        Some(removed)
    }
}

impl Default for RouteeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RouteeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteeRegistry")
            .field("routees", &self.routees.load_full())
            .finish()
    }
}

/// 组合注册表与策略的路由器。
///
/// # 教案式说明
/// - **意图 (Why)**：对宿主暴露统一入口（增删 routee、快照、路由），策略专属能力以
///   `impl Router<具体策略>` 的固有方法形式提供；
/// - **契约 (What)**：
///   - 每次 [`route`](Self::route) 恰好递增成功或失败计数之一；
///   - 空注册表返回 [`RouteResult::Unroutable`]，不会升级为 panic 或错误；
///   - 配置在构造时传入，此后只读。
pub struct Router<S> {
    name: Arc<str>,
    config: RouterConfig,
    registry: RouteeRegistry,
    strategy: S,
    routed: AtomicU64,
    failed: AtomicU64,
}

impl<S> Router<S>
where
    S: RoutingStrategy,
{
    /// 以名称、配置与策略构造路由器。
    pub fn new(name: impl Into<Arc<str>>, config: RouterConfig, strategy: S) -> Self {
        let name = name.into();
        if config.kind() != strategy.kind() {
            warn!(
                router = %name,
                configured = ?config.kind(),
                strategy = ?strategy.kind(),
                "router kind differs from the supplied strategy"
            );
        }
        info!(router = %name, kind = ?strategy.kind(), config = %config, "router created");

        Self {
            name,
            config,
            registry: RouteeRegistry::new(),
            strategy,
            routed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// 组合的策略实例。
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// 注册 routee，重复路径返回 [`RegistryError::DuplicateRoutee`]。
    pub fn add_routee(&self, routee: RouteeRef) -> Result<(), RegistryError> {
        let path = routee.path().to_owned();
        self.registry.insert(routee, |change, snapshot| {
            self.strategy.on_routees_changed(change, snapshot);
        })?;
        debug!(router = %self.name, path = %path, routees = self.registry.len(), "routee added");
        Ok(())
    }

    /// 移除 routee，返回是否确实移除。
    pub fn remove_routee(&self, routee: &RouteeRef) -> bool {
        self.remove_routee_by_path(routee.path()).is_some()
    }

    /// 按路径移除 routee。
    pub fn remove_routee_by_path(&self, path: &str) -> Option<RouteeRef> {
        let removed = self.registry.remove(path, |change, snapshot| {
            self.strategy.on_routees_changed(change, snapshot);
        })?;
        debug!(router = %self.name, path = %path, routees = self.registry.len(), "routee removed");
        Some(removed)
    }

    /// 成员快照。
    pub fn routees(&self) -> Arc<Vec<RouteeRef>> {
        self.registry.snapshot()
    }

    /// 未终止的成员，保持快照顺序。
    pub fn live_routees(&self) -> Vec<RouteeRef> {
        live_routees(&self.registry.snapshot())
    }

    pub fn routee_count(&self) -> usize {
        self.registry.len()
    }

    pub fn has_routees(&self) -> bool {
        !self.registry.is_empty()
    }

    /// 模板方法：委托策略选择目标，再完成成功/失败簿记。
    pub fn route(&self, message: &Message, sender: Option<&RouteeRef>) -> RouteResult {
        let routees = self.registry.snapshot();
        let result = if routees.is_empty() {
            RouteResult::unroutable(NO_ROUTEES_AVAILABLE)
        } else {
            self.strategy.select_routees(&routees, message, sender)
        };

        if result.is_success() {
            self.record_route_success();
        } else {
            self.record_route_failure();
        }
        trace!(router = %self.name, message = %message.id(), result = %result, "message routed");
        result
    }

    /// 记录一次成功路由。
    pub fn record_route_success(&self) {
        self.routed.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录一次失败路由。
    pub fn record_route_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_success_count(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    pub fn route_failure_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// 路由统计快照。
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            name: Arc::clone(&self.name),
            routees: self.registry.len(),
            routed: self.route_success_count(),
            failed: self.route_failure_count(),
        }
    }
}

impl<S> fmt::Debug for Router<S>
where
    S: RoutingStrategy,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("name", &self.name)
            .field("kind", &self.strategy.kind())
            .field("routees", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// 路由器簿记快照。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterStats {
    pub name: Arc<str>,
    pub routees: usize,
    pub routed: u64,
    pub failed: u64,
}

impl RouterStats {
    /// 处理过的消息总数。
    pub fn messages(&self) -> u64 {
        self.routed + self.failed
    }
}

impl fmt::Display for RouterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Router[{}] - Routees: {}, Messages: {}, Failures: {}",
            self.name,
            self.routees,
            self.messages(),
            self.failed
        )
    }
}

/// 过滤出未终止的成员。
pub(crate) fn live_routees(routees: &[RouteeRef]) -> Vec<RouteeRef> {
    routees
        .iter()
        .filter(|routee| !routee.is_terminated())
        .cloned()
        .collect()
}
