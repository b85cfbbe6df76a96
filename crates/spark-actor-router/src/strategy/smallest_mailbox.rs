//! 最小邮箱策略：把消息导向积压最少的存活目标。
//!
//! # 教案级说明（Why）
//! - 每次路由都询问全部目标的邮箱深度代价过高，因此深度采样按路径缓存，在 TTL 内复用；
//! - 采样只是“建议值”：过期、缺失或探测失败都不会阻止路由，最多让选择略有偏差。
//!
//! # 契约（What）
//! - 深度由宿主实现的 [`MailboxProbe`] 提供，返回 `None` 时回退为负载阈值并记录 `warn!`；
//! - 扫描遇到深度 0 立即停止；并列最小值取快照顺序中的第一个；
//! - 最小深度超过阈值时只发出告警并计数，仍然路由到该目标。

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tracing::{debug, trace, warn};

use crate::{
    config::{RouterConfig, RouterKind},
    message::Message,
    registry::{NO_LIVE_ROUTEES, RouteResult, RouteeChange, Router, RoutingStrategy},
    routee::RouteeRef,
};

/// 默认采样有效期。
pub const DEFAULT_SAMPLE_TTL: Duration = Duration::from_millis(100);

/// 默认负载告警阈值（邮箱深度）。
pub const DEFAULT_LOAD_BALANCE_THRESHOLD: usize = 10;

/// 清理时保留的采样年龄上限为 TTL 的倍数。
const CLEANUP_TTL_FACTOR: u32 = 5;

/// 负载差距不超过该值即视为均衡。
const BALANCED_SPREAD: usize = 5;

/// 宿主提供的邮箱深度探测能力。
///
/// 路由层无法直接访问邮箱，深度只能由宿主运行时回答；无法回答时返回 `None`。
pub trait MailboxProbe: Send + Sync + 'static {
    fn mailbox_depth(&self, routee: &RouteeRef) -> Option<usize>;
}

impl<F> MailboxProbe for F
where
    F: Fn(&RouteeRef) -> Option<usize> + Send + Sync + 'static,
{
    fn mailbox_depth(&self, routee: &RouteeRef) -> Option<usize> {
        self(routee)
    }
}

/// 最小邮箱参数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmallestMailboxOptions {
    /// 缓存采样的有效期，严格小于该时长的采样才会被复用。
    pub sample_ttl: Duration,
    /// 最小深度超过该值时发出高负载告警。
    pub load_balance_threshold: usize,
}

impl Default for SmallestMailboxOptions {
    fn default() -> Self {
        Self {
            sample_ttl: DEFAULT_SAMPLE_TTL,
            load_balance_threshold: DEFAULT_LOAD_BALANCE_THRESHOLD,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct LoadSample {
    depth: usize,
    sampled_at: Instant,
}

/// 聚合负载统计。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoadStats {
    pub min: usize,
    pub max: usize,
    pub routee_count: usize,
    pub average: f64,
}

impl LoadStats {
    /// 最大与最小负载之差。
    pub fn spread(&self) -> usize {
        self.max - self.min
    }

    pub fn is_balanced(&self) -> bool {
        self.spread() <= BALANCED_SPREAD
    }

    fn from_depths<I>(depths: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut stats = LoadStats {
            min: usize::MAX,
            max: 0,
            routee_count: 0,
            average: 0.0,
        };
        let mut total = 0usize;
        for depth in depths {
            stats.min = stats.min.min(depth);
            stats.max = stats.max.max(depth);
            stats.routee_count += 1;
            total = total.saturating_add(depth);
        }
        if stats.routee_count == 0 {
            stats.min = 0;
        } else {
            stats.average = total as f64 / stats.routee_count as f64;
        }
        stats
    }
}

impl fmt::Display for LoadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LoadStats{{min={}, max={}, avg={:.1}, spread={}, balanced={}, routees={}}}",
            self.min,
            self.max,
            self.average,
            self.spread(),
            self.is_balanced(),
            self.routee_count
        )
    }
}

/// 选择与缓存计数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MailboxRoutingStats {
    pub selections: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_size: usize,
    pub overloaded_selections: u64,
}

impl MailboxRoutingStats {
    /// 缓存命中率，尚无采样时为 0。
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

impl fmt::Display for MailboxRoutingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RoutingStats{{selections={}, cacheHits={}, cacheMisses={}, hitRate={:.1}%, cacheSize={}}}",
            self.selections,
            self.cache_hits,
            self.cache_misses,
            self.hit_rate() * 100.0,
            self.cache_size
        )
    }
}

/// 最小邮箱路由策略。
///
/// # 教案式说明
/// - **并发 (How)**：采样缓存为 `DashMap<path, LoadSample>`，并发路由可同时命中或刷新；
///   同一路径的并发刷新只是重复采样，不影响正确性；
/// - **生命周期**：成员移除时在注册表写锁内删除其缓存条目；
///   陈旧条目通过 [`cleanup_cache`](Self::cleanup_cache) 显式清理。
pub struct SmallestMailboxStrategy {
    options: SmallestMailboxOptions,
    probe: Box<dyn MailboxProbe>,
    cache: DashMap<String, LoadSample>,
    selections: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    overloaded: AtomicU64,
}

impl SmallestMailboxStrategy {
    pub fn new(options: SmallestMailboxOptions, probe: impl MailboxProbe) -> Self {
        Self {
            options,
            probe: Box::new(probe),
            cache: DashMap::new(),
            selections: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            overloaded: AtomicU64::new(0),
        }
    }

    /// 使用默认参数。
    pub fn with_probe(probe: impl MailboxProbe) -> Self {
        Self::new(SmallestMailboxOptions::default(), probe)
    }

    pub fn options(&self) -> SmallestMailboxOptions {
        self.options
    }

    /// 取得目标的邮箱深度：TTL 内复用缓存，否则探测并刷新缓存。
    fn mailbox_depth(&self, routee: &RouteeRef) -> usize {
        let path = routee.path();
        let now = Instant::now();
        let cached = self.cache.get(path).and_then(|sample| {
            (now.saturating_duration_since(sample.sampled_at) < self.options.sample_ttl)
                .then_some(sample.depth)
        });
        if let Some(depth) = cached {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return depth;
        }

        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        let depth = match self.probe.mailbox_depth(routee) {
            Some(depth) => depth,
            None => {
                warn!(
                    path = %path,
                    fallback = self.options.load_balance_threshold,
                    "mailbox probe failed, using load threshold"
                );
                self.options.load_balance_threshold
            }
        };
        self.cache.insert(
            path.to_owned(),
            LoadSample {
                depth,
                sampled_at: now,
            },
        );
        depth
    }

    /// 存活目标的当前负载分布（可能来自缓存）。
    pub fn load_distribution(&self, routees: &[RouteeRef]) -> BTreeMap<String, usize> {
        routees
            .iter()
            .filter(|routee| !routee.is_terminated())
            .map(|routee| (routee.path().to_owned(), self.mailbox_depth(routee)))
            .collect()
    }

    /// 存活目标的聚合负载。
    pub fn load_stats(&self, routees: &[RouteeRef]) -> LoadStats {
        LoadStats::from_depths(self.load_distribution(routees).into_values())
    }

    pub fn routing_stats(&self) -> MailboxRoutingStats {
        MailboxRoutingStats {
            selections: self.selections.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_size: self.cache.len(),
            overloaded_selections: self.overloaded.load(Ordering::Relaxed),
        }
    }

    /// 清除年龄超过 5 倍 TTL 的采样，返回清除条数。
    pub fn cleanup_cache(&self) -> usize {
        let now = Instant::now();
        let expiry = self.options.sample_ttl * CLEANUP_TTL_FACTOR;
        let before = self.cache.len();
        self.cache
            .retain(|_, sample| now.saturating_duration_since(sample.sampled_at) <= expiry);
        let purged = before.saturating_sub(self.cache.len());
        debug!(purged, remaining = self.cache.len(), "mailbox cache cleaned");
        purged
    }

    /// 缓存条目数。
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

impl fmt::Debug for SmallestMailboxStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmallestMailboxStrategy")
            .field("options", &self.options)
            .field("cache_size", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl RoutingStrategy for SmallestMailboxStrategy {
    fn kind(&self) -> RouterKind {
        RouterKind::SmallestMailbox
    }

    fn select_routees(
        &self,
        routees: &[RouteeRef],
        _message: &Message,
        _sender: Option<&RouteeRef>,
    ) -> RouteResult {
        let mut selected: Option<(&RouteeRef, usize)> = None;
        for routee in routees.iter().filter(|routee| !routee.is_terminated()) {
            let depth = self.mailbox_depth(routee);
            if selected.is_none_or(|(_, smallest)| depth < smallest) {
                selected = Some((routee, depth));
                if depth == 0 {
                    break;
                }
            }
        }

        let Some((target, depth)) = selected else {
            return RouteResult::unroutable(NO_LIVE_ROUTEES);
        };

        self.selections.fetch_add(1, Ordering::Relaxed);
        if depth > self.options.load_balance_threshold {
            self.overloaded.fetch_add(1, Ordering::Relaxed);
            warn!(
                path = %target.path(),
                depth,
                threshold = self.options.load_balance_threshold,
                "all routees above load threshold, routing to least loaded"
            );
        }
        trace!(path = %target.path(), depth, "smallest mailbox selected");
        RouteResult::single(Arc::clone(target))
    }

    fn on_routees_changed(&self, change: RouteeChange<'_>, _routees: &[RouteeRef]) {
        if let RouteeChange::Removed(routee) = change {
            self.cache.remove(routee.path());
        }
    }
}

impl Router<SmallestMailboxStrategy> {
    /// 以默认参数创建最小邮箱路由器。
    pub fn with_smallest_mailbox(
        name: impl Into<Arc<str>>,
        config: RouterConfig,
        probe: impl MailboxProbe,
    ) -> Self {
        Router::new(name, config, SmallestMailboxStrategy::with_probe(probe))
    }

    /// 当前成员的负载分布。
    pub fn load_distribution(&self) -> BTreeMap<String, usize> {
        self.strategy().load_distribution(&self.routees())
    }

    pub fn load_stats(&self) -> LoadStats {
        self.strategy().load_stats(&self.routees())
    }

    pub fn routing_stats(&self) -> MailboxRoutingStats {
        self.strategy().routing_stats()
    }

    pub fn cleanup_cache(&self) -> usize {
        self.strategy().cleanup_cache()
    }
}
