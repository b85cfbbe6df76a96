//! 一致性哈希策略：同一亲和键总是落到同一目标。
//!
//! # 教案级说明（Why）
//! - 会话、实体等有状态工作负载需要稳定的归属；成员增减时只应迁移约 `1/N` 的键；
//! - 每个物理目标占据若干虚拟节点坐标，改善环上分布的均匀性。
//!
//! # 算法（How）
//! - 坐标：SHA-256 摘要的前 8 字节按大端解释为 `u64`；虚拟节点键为 `"<path>#<i>"`；
//! - 查找：取不小于消息哈希的最小坐标，越过最大坐标时回绕到环首；
//! - 环整体以 `ArcSwap<HashRing>` 持有，写者复制后整体替换，读者永远看到完整的环。

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::{
    config::{RouterConfig, RouterKind},
    message::{HASH_KEY_HINT, Message},
    registry::{RouteResult, RouteeChange, Router, RoutingStrategy},
    routee::RouteeRef,
};

/// 默认虚拟节点数。
pub const DEFAULT_VIRTUAL_NODES: usize = 150;

const EMPTY_RING: &str = "hash ring is empty";

/// 一致性哈希参数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsistentHashOptions {
    /// 每个物理目标占据的环坐标数，至少为 1。
    pub virtual_nodes: usize,
}

impl Default for ConsistentHashOptions {
    fn default() -> Self {
        Self {
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
        }
    }
}

/// 计算字符串在环上的坐标。
pub fn ring_hash(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// 环的不可变快照。
#[derive(Clone, Default)]
struct HashRing {
    entries: BTreeMap<u64, RouteeRef>,
    coordinates: HashMap<String, Vec<u64>>,
}

impl HashRing {
    fn locate(&self, hash: u64) -> Option<&RouteeRef> {
        self.entries
            .range(hash..)
            .next()
            .or_else(|| self.entries.iter().next())
            .map(|(_, routee)| routee)
    }

    fn insert(&mut self, routee: &RouteeRef, virtual_nodes: usize) {
        let path = routee.path();
        self.remove(path);

        let coordinates: Vec<u64> = (0..virtual_nodes)
            .map(|index| ring_hash(&format!("{path}#{index}")))
            .collect();
        for coordinate in &coordinates {
            self.entries.insert(*coordinate, Arc::clone(routee));
        }
        self.coordinates.insert(path.to_owned(), coordinates);
    }

    fn remove(&mut self, path: &str) -> usize {
        let Some(coordinates) = self.coordinates.remove(path) else {
            return 0;
        };
        let mut removed = 0;
        for coordinate in coordinates {
            // 坐标碰撞时后加入者接管该位置，不能误删。
            if self
                .entries
                .get(&coordinate)
                .is_some_and(|owner| owner.path() == path)
            {
                self.entries.remove(&coordinate);
                removed += 1;
            }
        }
        removed
    }

    fn owned_by(&self, path: &str) -> usize {
        self.entries
            .values()
            .filter(|routee| routee.path() == path)
            .count()
    }
}

/// 一致性哈希环状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashRingStatus {
    pub total_virtual_nodes: usize,
    pub physical_nodes: usize,
    pub virtual_nodes_per_routee: usize,
    pub routee_count: usize,
}

impl HashRingStatus {
    /// 每个物理节点实际占据的平均坐标数。
    pub fn average_virtual_nodes_per_physical(&self) -> f64 {
        if self.physical_nodes == 0 {
            0.0
        } else {
            self.total_virtual_nodes as f64 / self.physical_nodes as f64
        }
    }
}

impl fmt::Display for HashRingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HashRingStatus{{totalVirtual={}, physical={}, virtualPerPhysical={:.1}}}",
            self.total_virtual_nodes,
            self.physical_nodes,
            self.average_virtual_nodes_per_physical()
        )
    }
}

/// 一致性哈希路由策略。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - 亲和键提取顺序：路由提示 `hashKey` → 非空消息 ID → 消息发送者路径 → 调用方发送者路径 → 消息类型；
///   - 空环返回 [`RouteResult::Unroutable`]；
///   - 只做归属决策，不过滤已终止目标，存活性由宿主的成员维护负责；
/// - **并发 (How)**：环变更由内部互斥锁串行化，查找只读取当前快照，不会看到半更新的环。
pub struct ConsistentHashStrategy {
    options: ConsistentHashOptions,
    ring: ArcSwap<HashRing>,
    ring_writer: Mutex<()>,
}

impl ConsistentHashStrategy {
    pub fn new(options: ConsistentHashOptions) -> Self {
        Self {
            options: ConsistentHashOptions {
                virtual_nodes: options.virtual_nodes.max(1),
            },
            ring: ArcSwap::from_pointee(HashRing::default()),
            ring_writer: Mutex::new(()),
        }
    }

    pub fn options(&self) -> ConsistentHashOptions {
        self.options
    }

    /// 每个物理目标的虚拟节点数。
    pub fn virtual_node_count(&self) -> usize {
        self.options.virtual_nodes
    }

    /// 环上的坐标总数。
    pub fn ring_size(&self) -> usize {
        self.ring.load().entries.len()
    }

    /// 计算消息的亲和键。
    pub fn hash_key<'m>(&self, message: &'m Message, sender: Option<&'m RouteeRef>) -> &'m str {
        if let Some(key) = message.routing_hint(HASH_KEY_HINT) {
            return key;
        }
        if !message.id().is_empty() {
            return message.id();
        }
        if let Some(origin) = message.sender() {
            return origin.path();
        }
        if let Some(origin) = sender {
            return origin.path();
        }
        message.message_type()
    }

    /// 纯查询：预测消息会被路由到的目标，不触碰任何计数器。
    pub fn predict_target(&self, message: &Message, sender: Option<&RouteeRef>) -> Option<RouteeRef> {
        let hash = ring_hash(self.hash_key(message, sender));
        self.ring.load().locate(hash).cloned()
    }

    /// 按原始哈希值查找目标。
    pub fn target_for_hash(&self, hash: u64) -> Option<RouteeRef> {
        self.ring.load().locate(hash).cloned()
    }

    fn mutate_ring<F>(&self, mutate: F)
    where
        F: FnOnce(&mut HashRing),
    {
        let _writer = self.ring_writer.lock();
        let mut next = HashRing::clone(&self.ring.load());
        mutate(&mut next);
        self.ring.store(Arc::new(next));
    }
}

impl Default for ConsistentHashStrategy {
    fn default() -> Self {
        Self::new(ConsistentHashOptions::default())
    }
}

impl fmt::Debug for ConsistentHashStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.ring.load();
        f.debug_struct("ConsistentHashStrategy")
            .field("virtual_nodes", &self.options.virtual_nodes)
            .field("ring_size", &ring.entries.len())
            .field("physical_nodes", &ring.coordinates.len())
            .finish()
    }
}

impl RoutingStrategy for ConsistentHashStrategy {
    fn kind(&self) -> RouterKind {
        RouterKind::ConsistentHash
    }

    fn select_routees(
        &self,
        _routees: &[RouteeRef],
        message: &Message,
        sender: Option<&RouteeRef>,
    ) -> RouteResult {
        let key = self.hash_key(message, sender);
        let hash = ring_hash(key);
        match self.ring.load().locate(hash) {
            Some(target) => {
                trace!(key = %key, hash, target = %target.path(), "hash ring lookup");
                RouteResult::single(Arc::clone(target))
            }
            None => RouteResult::unroutable(EMPTY_RING),
        }
    }

    fn on_routees_changed(&self, change: RouteeChange<'_>, _routees: &[RouteeRef]) {
        let virtual_nodes = self.options.virtual_nodes;
        match change {
            RouteeChange::Added(routee) => {
                self.mutate_ring(|ring| ring.insert(routee, virtual_nodes));
                debug!(
                    path = %routee.path(),
                    virtual_nodes,
                    ring_size = self.ring_size(),
                    "routee placed on hash ring"
                );
            }
            RouteeChange::Removed(routee) => {
                let mut removed = 0;
                self.mutate_ring(|ring| removed = ring.remove(routee.path()));
                debug!(
                    path = %routee.path(),
                    removed,
                    ring_size = self.ring_size(),
                    "routee removed from hash ring"
                );
            }
        }
    }
}

impl Router<ConsistentHashStrategy> {
    /// 以默认虚拟节点数创建一致性哈希路由器。
    pub fn with_consistent_hash(name: impl Into<Arc<str>>, config: RouterConfig) -> Self {
        Router::new(name, config, ConsistentHashStrategy::default())
    }

    /// 预测消息的目标，不影响路由计数。
    ///
    /// `sender` 与 [`route`](Router::route) 的同名参数含义一致，传入相同的值即得到相同的目标。
    pub fn predict_target(&self, message: &Message, sender: Option<&RouteeRef>) -> Option<RouteeRef> {
        self.strategy().predict_target(message, sender)
    }

    /// 环状态摘要。
    pub fn ring_status(&self) -> HashRingStatus {
        let ring = self.strategy().ring.load();
        HashRingStatus {
            total_virtual_nodes: ring.entries.len(),
            physical_nodes: ring.coordinates.len(),
            virtual_nodes_per_routee: self.strategy().virtual_node_count(),
            routee_count: self.routee_count(),
        }
    }

    /// 每个成员实际占据的坐标数，按路径排序。
    pub fn node_distribution(&self) -> BTreeMap<String, usize> {
        let ring = self.strategy().ring.load();
        self.routees()
            .iter()
            .map(|routee| (routee.path().to_owned(), ring.owned_by(routee.path())))
            .collect()
    }

    pub fn ring_size(&self) -> usize {
        self.strategy().ring_size()
    }

    pub fn virtual_node_count(&self) -> usize {
        self.strategy().virtual_node_count()
    }
}
