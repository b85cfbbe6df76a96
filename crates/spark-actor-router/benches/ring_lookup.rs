use criterion::{BatchSize, Criterion, black_box};
use futures::{FutureExt, future::BoxFuture};
use spark_actor_router::{
    ExchangeError, Message, Routee, RouteeRef, Router, RouterConfig, RouterKind,
    SmallestMailboxOptions, SmallestMailboxStrategy,
};
use std::{env, sync::Arc, time::Duration};

/// 哈希环查找与最小邮箱选择的微基准。
///
/// # 设计背景（Why）
/// - 路由决策位于每条消息的热路径上，环查找与缓存命中路径的回归需要尽早暴露；
/// - 基准只测决策本身，`Bench` 目标不做任何投递。
///
/// # 逻辑解析（How）
/// - 32 个目标、默认 150 个虚拟节点，轮换 1024 个亲和键；
/// - 最小邮箱使用 60 秒 TTL，稳态下全部命中缓存。
struct Bench(String);

impl Routee for Bench {
    fn path(&self) -> &str {
        &self.0
    }

    fn is_terminated(&self) -> bool {
        false
    }

    fn tell(&self, _message: Message, _sender: Option<&RouteeRef>) {}

    fn ask(
        &self,
        message: Message,
        _timeout: Duration,
    ) -> BoxFuture<'static, Result<Message, ExchangeError>> {
        futures::future::ready(Ok(message)).boxed()
    }
}

fn routees(count: usize) -> Vec<RouteeRef> {
    (0..count)
        .map(|idx| Arc::new(Bench(format!("/user/bench-{idx}"))) as RouteeRef)
        .collect()
}

fn bench_ring_lookup(c: &mut Criterion) {
    let router =
        Router::with_consistent_hash("bench-hash", RouterConfig::new(RouterKind::ConsistentHash));
    for routee in routees(32) {
        let _ = router.add_routee(routee);
    }
    let messages: Vec<Message> = (0..1024)
        .filter_map(|idx| {
            Message::builder()
                .hash_key(format!("player-{idx}"))
                .build()
                .ok()
        })
        .collect();

    let mut cursor = 0usize;
    c.bench_function("consistent_hash_route", |b| {
        b.iter(|| {
            cursor = (cursor + 1) % messages.len();
            black_box(router.route(&messages[cursor], None))
        });
    });

    c.bench_function("consistent_hash_rebuild", |b| {
        b.iter_batched(
            || Router::with_consistent_hash("rebuild", RouterConfig::new(RouterKind::ConsistentHash)),
            |router| {
                for routee in routees(8) {
                    let _ = router.add_routee(routee);
                }
                black_box(router.ring_size())
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_smallest_mailbox(c: &mut Criterion) {
    let router = Router::new(
        "bench-mailbox",
        RouterConfig::new(RouterKind::SmallestMailbox),
        SmallestMailboxStrategy::new(
            SmallestMailboxOptions {
                sample_ttl: Duration::from_secs(60),
                load_balance_threshold: 10,
            },
            |routee: &RouteeRef| Some(routee.path().len() % 7 + 1),
        ),
    );
    for routee in routees(32) {
        let _ = router.add_routee(routee);
    }
    let message = Message::with_payload(0u64);

    c.bench_function("smallest_mailbox_cached_route", |b| {
        b.iter(|| black_box(router.route(&message, None)));
    });
}

fn main() {
    let mut quick_mode = false;
    for arg in env::args().skip(1) {
        if arg == "--quick" {
            quick_mode = true;
        }
    }

    let mut criterion = Criterion::default();
    if quick_mode {
        criterion = criterion
            .sample_size(10)
            .warm_up_time(Duration::from_millis(100))
            .measurement_time(Duration::from_millis(250));
    }

    bench_ring_lookup(&mut criterion);
    bench_smallest_mailbox(&mut criterion);
    criterion.final_summary();
}
