//! 分散收集策略：向所有存活目标扇出同一请求，再归约为一个结果。
//!
//! # 教案级说明（Why）
//! - 冗余请求用更多资源换取更低的尾延迟：竞速模式只关心最快的成功响应；
//! - 汇总模式用于需要全部观点的场景，单个目标失败只会让结果少一项。
//!
//! # 契约（What）
//! - 通用的 [`route`](crate::registry::Router::route) 入口只返回全部存活目标，不做扇出；
//! - 每个交换都被 Tokio 计时器包裹，忽略超时的目标也无法拖住调用方；
//! - 竞速结果经由 [`RaceCell`] 单次解析为成功、全部失败或整体超时之一，
//!   调用方按解析结果恰好递增一次对应计数器。
//!
//! # 运行时（How）
//! - 竞速模式中每个交换在 `JoinSet` 管理的 Tokio 任务上执行，解析后或调用方放弃时仍在进行的交换被中止，
//!   其迟到结果丢弃；
//! - 汇总模式在调用方任务内以 `join_all` 并发驱动。

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::join_all;
use tokio::{task::JoinSet, time::Instant};
use tracing::{debug, trace};

use crate::{
    config::{RouterConfig, RouterKind},
    error::{ExchangeError, ScatterGatherError},
    message::Message,
    race::RaceCell,
    registry::{NO_LIVE_ROUTEES, RouteResult, Router, RoutingStrategy, live_routees},
    routee::RouteeRef,
};

/// 默认整体超时。
pub const DEFAULT_SCATTER_TIMEOUT: Duration = Duration::from_secs(5);

/// 分散收集参数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScatterGatherOptions {
    pub default_timeout: Duration,
}

impl Default for ScatterGatherOptions {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_SCATTER_TIMEOUT,
        }
    }
}

#[derive(Debug, Default)]
struct RaceCounters {
    total_requests: AtomicU64,
    successful: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
}

/// 竞速统计快照。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScatterGatherStats {
    pub total_requests: u64,
    pub successful: u64,
    pub timeouts: u64,
    pub errors: u64,
    pub routee_count: usize,
}

impl ScatterGatherStats {
    fn rate(&self, count: u64) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            count as f64 / self.total_requests as f64
        }
    }

    pub fn success_rate(&self) -> f64 {
        self.rate(self.successful)
    }

    pub fn timeout_rate(&self) -> f64 {
        self.rate(self.timeouts)
    }

    pub fn error_rate(&self) -> f64 {
        self.rate(self.errors)
    }
}

impl fmt::Display for ScatterGatherStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ScatterGatherStats{{total={}, success={}({:.1}%), timeout={}({:.1}%), error={}({:.1}%), routees={}}}",
            self.total_requests,
            self.successful,
            self.success_rate() * 100.0,
            self.timeouts,
            self.timeout_rate() * 100.0,
            self.errors,
            self.error_rate() * 100.0,
            self.routee_count
        )
    }
}

/// 分散收集路由策略。
#[derive(Debug, Default)]
pub struct ScatterGatherStrategy {
    options: ScatterGatherOptions,
    counters: Arc<RaceCounters>,
}

impl ScatterGatherStrategy {
    pub fn new(options: ScatterGatherOptions) -> Self {
        Self {
            options,
            counters: Arc::new(RaceCounters::default()),
        }
    }

    pub fn options(&self) -> ScatterGatherOptions {
        self.options
    }

    /// 默认整体超时。
    pub fn default_timeout(&self) -> Duration {
        self.options.default_timeout
    }
}

impl RoutingStrategy for ScatterGatherStrategy {
    fn kind(&self) -> RouterKind {
        RouterKind::ScatterGather
    }

    fn select_routees(
        &self,
        routees: &[RouteeRef],
        _message: &Message,
        _sender: Option<&RouteeRef>,
    ) -> RouteResult {
        let live = live_routees(routees);
        if live.is_empty() {
            RouteResult::unroutable(NO_LIVE_ROUTEES)
        } else {
            RouteResult::Routed(live)
        }
    }
}

/// 以计时器包裹单次交换。
async fn bounded_ask(
    routee: &RouteeRef,
    message: Message,
    timeout: Duration,
) -> Result<Message, ExchangeError> {
    let exchange = routee.ask(message, timeout);
    match tokio::time::timeout(timeout, exchange).await {
        Ok(outcome) => outcome,
        Err(_) => Err(ExchangeError::Timeout {
            path: routee.path().to_owned(),
            timeout,
        }),
    }
}

type RaceOutcome = Result<Message, ScatterGatherError>;

impl Router<ScatterGatherStrategy> {
    /// 以默认超时创建分散收集路由器。
    pub fn with_scatter_gather(name: impl Into<Arc<str>>, config: RouterConfig) -> Self {
        Router::new(name, config, ScatterGatherStrategy::default())
    }

    /// 竞速模式：返回最先成功的响应。
    ///
    /// # 契约说明（What）
    /// - 没有存活目标时立即返回 [`ScatterGatherError::NoRoutees`]，不计入统计；
    /// - 所有交换与整体计时器共享同一截止时刻，截止前没有成功即返回 [`ScatterGatherError::Timeout`]；
    /// - 截止前全部交换都已失败（包括目标自身报告的超时）返回 [`ScatterGatherError::AllFailed`]；
    /// - 解析后 `total_requests` 与对应结果计数器一起递增；调用方中途丢弃 future 时两者都不递增，
    ///   仍在进行的交换随 [`JoinSet`] 一并中止；
    /// - `sender` 仅用于日志关联，请求本身由消息携带发送者信息；
    /// - 必须在 Tokio 运行时内调用，交换任务派发到当前运行时。
    pub async fn scatter_gather(
        &self,
        message: &Message,
        sender: Option<&RouteeRef>,
        timeout: Duration,
    ) -> Result<Message, ScatterGatherError> {
        let routees = self.live_routees();
        if routees.is_empty() {
            return Err(ScatterGatherError::NoRoutees);
        }

        let attempted = routees.len();
        debug!(
            router = %self.name(),
            message = %message.id(),
            origin = sender.map(|origin| origin.path()),
            attempted,
            ?timeout,
            "scatter-gather race started"
        );

        let deadline = Instant::now() + timeout;
        let cell: Arc<RaceCell<RaceOutcome>> = Arc::new(RaceCell::new());
        let remaining = Arc::new(AtomicUsize::new(attempted));
        let mut exchanges = JoinSet::new();
        for routee in routees {
            let cell = Arc::clone(&cell);
            let remaining = Arc::clone(&remaining);
            let message = message.clone();
            exchanges.spawn(async move {
                let deadline_reached =
                    match tokio::time::timeout_at(deadline, routee.ask(message, timeout)).await {
                        Ok(Ok(response)) => {
                            if cell.try_resolve(Ok(response)) {
                                debug!(path = %routee.path(), "scatter-gather race won");
                            }
                            false
                        }
                        Ok(Err(error)) => {
                            debug!(path = %routee.path(), %error, "scatter-gather exchange failed");
                            false
                        }
                        Err(_) => {
                            debug!(path = %routee.path(), "scatter-gather exchange hit the deadline");
                            true
                        }
                    };
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    // 自身计时器到期即整体截止时刻已到。
                    let verdict = if deadline_reached {
                        ScatterGatherError::Timeout { timeout }
                    } else {
                        ScatterGatherError::AllFailed { attempted }
                    };
                    cell.try_resolve(Err(verdict));
                }
            });
        }

        if tokio::time::timeout_at(deadline, cell.resolved()).await.is_err() {
            cell.try_resolve(Err(ScatterGatherError::Timeout { timeout }));
        }
        exchanges.abort_all();

        let outcome = cell.resolved().await.clone();
        let counters = &self.strategy().counters;
        let counter = match &outcome {
            Ok(_) => &counters.successful,
            Err(ScatterGatherError::Timeout { .. }) => &counters.timeouts,
            Err(_) => &counters.errors,
        };
        counters.total_requests.fetch_add(1, Ordering::Relaxed);
        counter.fetch_add(1, Ordering::Relaxed);
        trace!(router = %self.name(), success = outcome.is_ok(), "scatter-gather race resolved");
        outcome
    }

    /// 以配置的默认超时执行竞速模式。
    pub async fn scatter_gather_default(
        &self,
        message: &Message,
        sender: Option<&RouteeRef>,
    ) -> Result<Message, ScatterGatherError> {
        let timeout = self.strategy().default_timeout();
        self.scatter_gather(message, sender, timeout).await
    }

    /// 汇总模式：等待全部交换结束，只返回成功的响应。
    ///
    /// 响应顺序与成员快照顺序一致；没有存活目标时返回空列表。
    pub async fn scatter_gather_all(
        &self,
        message: &Message,
        sender: Option<&RouteeRef>,
        timeout: Duration,
    ) -> Vec<Message> {
        let routees = self.live_routees();
        if routees.is_empty() {
            return Vec::new();
        }
        debug!(
            router = %self.name(),
            message = %message.id(),
            origin = sender.map(|origin| origin.path()),
            attempted = routees.len(),
            "scatter-gather all started"
        );

        let outcomes = join_all(
            routees
                .iter()
                .map(|routee| bounded_ask(routee, message.clone(), timeout)),
        )
        .await;

        outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                Ok(response) => Some(response),
                Err(error) => {
                    debug!(path = %error.path(), %error, "scatter-gather exchange excluded");
                    None
                }
            })
            .collect()
    }

    /// 竞速统计快照。
    pub fn scatter_stats(&self) -> ScatterGatherStats {
        let counters = &self.strategy().counters;
        ScatterGatherStats {
            total_requests: counters.total_requests.load(Ordering::Relaxed),
            successful: counters.successful.load(Ordering::Relaxed),
            timeouts: counters.timeouts.load(Ordering::Relaxed),
            errors: counters.errors.load(Ordering::Relaxed),
            routee_count: self.routee_count(),
        }
    }

    /// 清零竞速统计。
    pub fn reset_stats(&self) {
        let counters = &self.strategy().counters;
        counters.total_requests.store(0, Ordering::Relaxed);
        counters.successful.store(0, Ordering::Relaxed);
        counters.timeouts.store(0, Ordering::Relaxed);
        counters.errors.store(0, Ordering::Relaxed);
        debug!(router = %self.name(), "scatter-gather stats reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_are_zero_without_requests() {
        let stats = ScatterGatherStats {
            total_requests: 0,
            successful: 0,
            timeouts: 0,
            errors: 0,
            routee_count: 3,
        };
        assert_eq!(stats.success_rate(), 0.0);
        assert_eq!(stats.error_rate(), 0.0);
    }

    #[test]
    fn stats_render_percentages() {
        let stats = ScatterGatherStats {
            total_requests: 4,
            successful: 2,
            timeouts: 1,
            errors: 1,
            routee_count: 5,
        };
        assert_eq!(stats.success_rate(), 0.5);
        assert_eq!(
            stats.to_string(),
            "ScatterGatherStats{total=4, success=2(50.0%), timeout=1(25.0%), error=1(25.0%), routees=5}"
        );
    }
}
