//! 分散收集：竞速单次解析、全部失败、整体超时与汇总隔离。

mod support;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use spark_actor_router::{
    Message, RouteeRef, Router, RouterConfig, RouterKind, ScatterGatherError,
    ScatterGatherOptions, ScatterGatherStrategy,
};
use support::{Reply, TestRoutee};

fn scatter_router(routees: &[RouteeRef]) -> Router<ScatterGatherStrategy> {
    let router = Router::new(
        "fanout",
        RouterConfig::new(RouterKind::ScatterGather),
        ScatterGatherStrategy::new(ScatterGatherOptions {
            default_timeout: Duration::from_millis(500),
        }),
    );
    for routee in routees {
        router.add_routee(RouteeRef::clone(routee)).expect("路径唯一");
    }
    router
}

fn responder(response: &Message) -> &str {
    response
        .payload::<String>()
        .map(String::as_str)
        .unwrap_or_default()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fastest_success_wins_exactly_once() {
    let routees: Vec<RouteeRef> = (1..=5)
        .map(|idx| {
            let delay = if idx == 3 { 10 } else { 50 };
            TestRoutee::new(
                &format!("/user/replica-{idx}"),
                Duration::from_millis(delay),
                Reply::Echo,
            )
            .shared()
        })
        .collect();
    let router = scatter_router(&routees);
    let request = Message::builder().payload("query").as_request().build().expect("build");

    let response = router
        .scatter_gather(&request, None, Duration::from_secs(2))
        .await
        .expect("至少一个目标成功");

    assert_eq!(responder(&response), "/user/replica-3");
    assert_eq!(response.correlation_id(), Some(request.id()));

    let stats = router.scatter_stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.errors + stats.timeouts, 0);
    assert_eq!(stats.routee_count, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_failure_resolves_to_aggregate_error() {
    let routees: Vec<RouteeRef> = (0..4)
        .map(|idx| {
            TestRoutee::new(
                &format!("/user/broken-{idx}"),
                Duration::from_millis(5 * idx),
                Reply::Fail,
            )
            .shared()
        })
        .collect();
    let router = scatter_router(&routees);

    let outcome = router
        .scatter_gather(&Message::with_payload("query"), None, Duration::from_secs(2))
        .await;

    assert_eq!(outcome, Err(ScatterGatherError::AllFailed { attempted: 4 }));
    let stats = router.scatter_stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.successful, 0);
    assert_eq!(stats.error_rate(), 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overall_timer_resolves_when_nothing_succeeds_in_time() {
    let routees = vec![
        TestRoutee::new("/user/stuck", Duration::ZERO, Reply::Hang).shared(),
        TestRoutee::new("/user/slow", Duration::from_secs(5), Reply::Echo).shared(),
    ];
    let router = scatter_router(&routees);
    let timeout = Duration::from_millis(50);

    let outcome = router
        .scatter_gather(&Message::with_payload("query"), None, timeout)
        .await;

    assert_eq!(outcome, Err(ScatterGatherError::Timeout { timeout }));
    assert_eq!(router.scatter_stats().timeouts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn early_failures_do_not_end_the_race() {
    let routees = vec![
        TestRoutee::new("/user/flaky-1", Duration::from_millis(1), Reply::Fail).shared(),
        TestRoutee::new("/user/flaky-3", Duration::from_millis(3), Reply::Fail).shared(),
        TestRoutee::new("/user/flaky-5", Duration::from_millis(5), Reply::Fail).shared(),
        TestRoutee::new("/user/steady", Duration::from_millis(30), Reply::Echo).shared(),
    ];
    let router = scatter_router(&routees);

    let response = router
        .scatter_gather(&Message::with_payload("query"), None, Duration::from_secs(2))
        .await
        .expect("稳定目标最终应答");

    assert_eq!(responder(&response), "/user/steady");
    let stats = router.scatter_stats();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.timeouts, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn routee_reported_timeouts_count_as_failures() {
    let routees = vec![
        TestRoutee::new("/user/broken", Duration::from_millis(1), Reply::Fail).shared(),
        TestRoutee::new("/user/impatient", Duration::from_millis(5), Reply::TimedOut).shared(),
    ];
    let router = scatter_router(&routees);
    let started = Instant::now();

    let outcome = router
        .scatter_gather(&Message::with_payload("query"), None, Duration::from_secs(2))
        .await;

    assert_eq!(outcome, Err(ScatterGatherError::AllFailed { attempted: 2 }));
    assert!(started.elapsed() < Duration::from_secs(1), "无需等待整体截止");
    let stats = router.scatter_stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.timeouts, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abandoned_race_counts_nothing_and_stops_exchanges() {
    let stuck = TestRoutee::new("/user/stuck", Duration::ZERO, Reply::Hang);
    let router = scatter_router(&[stuck.shared()]);
    assert_eq!(Arc::strong_count(&stuck), 2);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        router.scatter_gather(&Message::with_payload("query"), None, Duration::from_secs(2)),
    )
    .await;
    assert!(abandoned.is_err(), "外层计时器先到");

    let stats = router.scatter_stats();
    assert_eq!(stats.total_requests, 0);
    assert_eq!(stats.successful + stats.timeouts + stats.errors, 0);

    let released = Instant::now() + Duration::from_secs(1);
    while Arc::strong_count(&stuck) > 2 && Instant::now() < released {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(Arc::strong_count(&stuck), 2, "交换任务已被中止并释放目标");
    assert_eq!(stuck.asks(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn race_without_live_routees_is_rejected_up_front() {
    let stopped = TestRoutee::echo("/user/stopped");
    stopped.terminate();
    let router = scatter_router(&[stopped.shared()]);

    let outcome = router
        .scatter_gather_default(&Message::with_payload("query"), None)
        .await;

    assert_eq!(outcome, Err(ScatterGatherError::NoRoutees));
    assert_eq!(stopped.asks(), 0);
    assert_eq!(router.scatter_stats().total_requests, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn gather_all_isolates_individual_failures() {
    let routees = vec![
        TestRoutee::new("/user/a", Duration::from_millis(5), Reply::Echo).shared(),
        TestRoutee::new("/user/b", Duration::from_millis(15), Reply::Echo).shared(),
        TestRoutee::new("/user/c", Duration::from_millis(1), Reply::Fail).shared(),
        TestRoutee::new("/user/d", Duration::from_millis(10), Reply::Echo).shared(),
    ];
    let router = scatter_router(&routees);

    let responses = router
        .scatter_gather_all(&Message::with_payload("census"), None, Duration::from_secs(1))
        .await;

    let paths: Vec<_> = responses.iter().map(responder).collect();
    assert_eq!(paths, ["/user/a", "/user/b", "/user/d"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn gather_all_excludes_exchanges_that_time_out() {
    let routees = vec![
        TestRoutee::new("/user/quick", Duration::from_millis(1), Reply::Echo).shared(),
        TestRoutee::new("/user/stuck", Duration::ZERO, Reply::Hang).shared(),
    ];
    let router = scatter_router(&routees);

    let responses = router
        .scatter_gather_all(&Message::with_payload("census"), None, Duration::from_millis(50))
        .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responder(&responses[0]), "/user/quick");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn gather_all_with_no_routees_is_empty() {
    let router = scatter_router(&[]);
    let responses = router
        .scatter_gather_all(&Message::with_payload("census"), None, Duration::from_millis(50))
        .await;
    assert!(responses.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn plain_routing_returns_every_live_routee_and_stats_reset() {
    let stopped = TestRoutee::echo("/user/stopped");
    stopped.terminate();
    let routees = vec![
        TestRoutee::echo("/user/a").shared(),
        stopped.shared(),
        TestRoutee::echo("/user/b").shared(),
    ];
    let router = scatter_router(&routees);

    let result = router.route(&Message::with_payload("query"), None);
    let paths: Vec<_> = result.targets().iter().map(|r| r.path()).collect();
    assert_eq!(paths, ["/user/a", "/user/b"]);

    router
        .scatter_gather(&Message::with_payload("query"), None, Duration::from_secs(1))
        .await
        .expect("存活目标会应答");
    assert_eq!(router.scatter_stats().total_requests, 1);

    router.reset_stats();
    let stats = router.scatter_stats();
    assert_eq!(stats.total_requests, 0);
    assert_eq!(stats.successful, 0);
    assert_eq!(stats.success_rate(), 0.0);
}
