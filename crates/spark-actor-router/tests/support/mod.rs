//! 集成测试共享的脚本化 routee 与负载看板。

#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture};
use spark_actor_router::{ExchangeError, Message, Routee, RouteeRef};

/// 脚本化的应答行为。
#[derive(Clone, Copy, Debug)]
pub enum Reply {
    /// 延迟后以自身路径作为负载应答。
    Echo,
    /// 延迟后返回失败。
    Fail,
    /// 延迟后报告自身的交换超时。
    TimedOut,
    /// 永不应答。
    Hang,
}

/// 可脚本化的测试目标。
pub struct TestRoutee {
    path: String,
    delay: Duration,
    reply: Reply,
    terminated: AtomicBool,
    asks: AtomicUsize,
    tells: AtomicUsize,
}

impl TestRoutee {
    pub fn new(path: &str, delay: Duration, reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            path: path.to_owned(),
            delay,
            reply,
            terminated: AtomicBool::new(false),
            asks: AtomicUsize::new(0),
            tells: AtomicUsize::new(0),
        })
    }

    /// 立即应答的目标。
    pub fn echo(path: &str) -> Arc<Self> {
        Self::new(path, Duration::ZERO, Reply::Echo)
    }

    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    pub fn asks(&self) -> usize {
        self.asks.load(Ordering::SeqCst)
    }

    pub fn tells(&self) -> usize {
        self.tells.load(Ordering::SeqCst)
    }

    pub fn shared(self: &Arc<Self>) -> RouteeRef {
        Arc::clone(self) as RouteeRef
    }
}

impl Routee for TestRoutee {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn tell(&self, _message: Message, _sender: Option<&RouteeRef>) {
        self.tells.fetch_add(1, Ordering::SeqCst);
    }

    fn ask(
        &self,
        message: Message,
        _timeout: Duration,
    ) -> BoxFuture<'static, Result<Message, ExchangeError>> {
        self.asks.fetch_add(1, Ordering::SeqCst);
        let path = self.path.clone();
        let delay = self.delay;
        let reply = self.reply;
        async move {
            if let Reply::Hang = reply {
                futures::future::pending::<()>().await;
            }
            tokio::time::sleep(delay).await;
            match reply {
                Reply::Fail => Err(ExchangeError::Failed {
                    path,
                    detail: "scripted failure".to_owned(),
                }),
                Reply::TimedOut => Err(ExchangeError::Timeout {
                    path,
                    timeout: delay,
                }),
                _ => Message::builder()
                    .payload(path.clone())
                    .correlation_id(message.id())
                    .as_response()
                    .build()
                    .map_err(|err| ExchangeError::Failed {
                        path,
                        detail: err.to_string(),
                    }),
            }
        }
        .boxed()
    }
}

/// 由测试直接设置邮箱深度的探测看板。
#[derive(Clone, Default)]
pub struct DepthBoard {
    depths: Arc<DashMap<String, usize>>,
    probes: Arc<AtomicUsize>,
}

impl DepthBoard {
    pub fn set(&self, path: &str, depth: usize) {
        self.depths.insert(path.to_owned(), depth);
    }

    /// 累计探测次数。
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// 生成交给策略的探测闭包；未登记的路径视为探测失败。
    pub fn probe(&self) -> impl Fn(&RouteeRef) -> Option<usize> + Send + Sync + 'static {
        let board = self.clone();
        move |routee: &RouteeRef| {
            board.probes.fetch_add(1, Ordering::SeqCst);
            board.depths.get(routee.path()).map(|depth| *depth)
        }
    }
}
