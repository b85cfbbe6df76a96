//! 路由消息契约：身份、排序与路由提示。
//!
//! # 教案级说明（Why）
//! - 每个被路由的工作单元都携带同一组属性：唯一 ID、可选发送者、优先级、创建时间、
//!   有序的路由提示映射与消息类型标签；
//! - 消息一经构建即冻结，路由器与外部调度器可以放心地跨线程克隆共享。
//!
//! # 排序契约（What）
//! - 自然序为“优先级升序（数值越小越紧急），同优先级按时间戳升序”；
//! - 最后以 ID 作为决胜键，使 [`Ord`] 成为与 [`Eq`] 一致的全序，可直接放入 `BinaryHeap`（配合 `Reverse`）。

use std::{
    any::{Any, type_name},
    borrow::Cow,
    cmp::Ordering,
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering as AtomicOrdering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{
    error::MessageError,
    routee::{RouteeRef, SenderRef},
};

/// 未显式设置时的消息超时。
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// 路由提示中携带一致性哈希键的条目名。
pub const HASH_KEY_HINT: &str = "hashKey";

/// `routing_info` 中路由键条目的名称。
pub const ROUTING_KEY_INFO: &str = "routingKey";

/// 消息分类标签名。
pub const CATEGORY_TAG: &str = "messageCategory";

static MESSAGE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

type Payload = Arc<dyn Any + Send + Sync>;
type Validator = Box<dyn Fn(&Message) -> bool + Send + Sync>;

/// 不可变的路由消息。
///
/// 克隆仅增加引用计数；载荷以 `Arc<dyn Any>` 保存，读取时按类型向下转型。
#[derive(Clone)]
pub struct Message {
    id: Arc<str>,
    payload: Option<Payload>,
    sender: Option<SenderRef>,
    reply_to: Option<SenderRef>,
    correlation_id: Option<Arc<str>>,
    priority: i32,
    timeout: Duration,
    timestamp: SystemTime,
    routing_hints: Arc<BTreeMap<String, String>>,
    tags: Arc<BTreeMap<String, String>>,
    message_type: Arc<str>,
    persistent: bool,
    routing_key: Option<Arc<str>>,
}

impl Message {
    /// 创建消息构建器。
    pub fn builder() -> MessageBuilder {
        MessageBuilder::new()
    }

    /// 以默认属性包装一个载荷。
    pub fn with_payload<T>(payload: T) -> Message
    where
        T: Any + Send + Sync,
    {
        MessageBuilder::new().payload(payload).freeze()
    }

    /// 消息 ID。
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 按类型读取载荷，类型不符或无载荷时返回 `None`。
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref()?.downcast_ref::<T>()
    }

    /// 是否携带载荷。
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// 发送者查找引用。
    pub fn sender(&self) -> Option<&SenderRef> {
        self.sender.as_ref()
    }

    /// 应答目标查找引用。
    pub fn reply_to(&self) -> Option<&SenderRef> {
        self.reply_to.as_ref()
    }

    /// 关联 ID。
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// 优先级，数值越小越紧急。
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// 消息超时。
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 创建时间戳。
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// 路由提示映射（有序）。
    pub fn routing_hints(&self) -> &BTreeMap<String, String> {
        &self.routing_hints
    }

    /// 读取单个路由提示。
    pub fn routing_hint(&self, key: &str) -> Option<&str> {
        self.routing_hints.get(key).map(String::as_str)
    }

    /// 标签映射（有序）。
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// 读取单个标签。
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// 消息类型标签；未显式设置时为载荷类型的短名，既无载荷也未设置时为空串。
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// 是否要求宿主持久化。
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// 路由键。
    pub fn routing_key(&self) -> Option<&str> {
        self.routing_key.as_deref()
    }

    /// 合并后的路由信息视图。
    ///
    /// - **契约 (What)**：依次写入 `routingKey`、标签与路由提示，后写覆盖先写，
    ///   因此同名条目以路由提示为准。
    pub fn routing_info(&self) -> BTreeMap<String, String> {
        let mut info = BTreeMap::new();
        if let Some(routing_key) = &self.routing_key {
            info.insert(ROUTING_KEY_INFO.to_owned(), routing_key.to_string());
        }
        for (key, value) in self.tags.iter().chain(self.routing_hints.iter()) {
            info.insert(key.clone(), value.clone());
        }
        info
    }

    /// 消息年龄；时钟回拨时返回零。
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or(Duration::ZERO)
    }

    /// 是否已超过 `timestamp + timeout`。
    pub fn is_expired(&self) -> bool {
        match self.timestamp.checked_add(self.timeout) {
            Some(deadline) => SystemTime::now() > deadline,
            None => false,
        }
    }

    /// ID 非空且未过期。
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.is_expired()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Message {}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Message {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("type", &self.message_type)
            .field("priority", &self.priority)
            .field("sender", &self.sender)
            .field("routing_hints", &self.routing_hints)
            .field("has_payload", &self.payload.is_some())
            .finish_non_exhaustive()
    }
}

/// [`Message`] 的构建器。
///
/// # 教案式说明
/// - **意图 (Why)**：消息字段较多且大多可选，构建器集中处理默认值（ID、时间戳、消息类型）与校验；
/// - **契约 (What)**：
///   - 未设置 ID 时生成 `msg-<unix毫秒>-<序号>`；未设置时间戳时取当前时间；
///   - 未设置消息类型时取载荷类型短名；
///   - [`build`](Self::build) 依注册顺序执行校验器，首个失败者以 [`MessageError::ValidationFailed`] 返回。
#[derive(Default)]
pub struct MessageBuilder {
    id: Option<String>,
    payload: Option<Payload>,
    payload_type: Option<&'static str>,
    sender: Option<SenderRef>,
    reply_to: Option<SenderRef>,
    correlation_id: Option<String>,
    priority: i32,
    timeout: Option<Duration>,
    timestamp: Option<SystemTime>,
    routing_hints: BTreeMap<String, String>,
    tags: BTreeMap<String, String>,
    message_type: Option<String>,
    persistent: bool,
    routing_key: Option<String>,
    validators: Vec<(Cow<'static, str>, Validator)>,
}

impl MessageBuilder {
    /// 创建空构建器。
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定消息 ID。
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// 设置载荷，同时记录其类型短名作为默认消息类型。
    pub fn payload<T>(mut self, payload: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.payload = Some(Arc::new(payload));
        self.payload_type = Some(short_type_name::<T>());
        self
    }

    /// 设置发送者，仅保存查找引用。
    pub fn sender(mut self, sender: &RouteeRef) -> Self {
        self.sender = Some(SenderRef::from_routee(sender));
        self
    }

    /// 设置应答目标。
    pub fn reply_to(mut self, reply_to: &RouteeRef) -> Self {
        self.reply_to = Some(SenderRef::from_routee(reply_to));
        self
    }

    /// 设置关联 ID。
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// 设置优先级，数值越小越紧急。
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// 设置超时。
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 覆盖创建时间戳。
    pub fn timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// 追加一条路由提示。
    pub fn routing_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.routing_hints.insert(key.into(), value.into());
        self
    }

    /// 追加一致性哈希键，等价于 `routing_hint("hashKey", key)`。
    pub fn hash_key(self, key: impl Into<String>) -> Self {
        self.routing_hint(HASH_KEY_HINT, key)
    }

    /// 追加一条标签。
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// 显式设置消息类型。
    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    /// 标记持久化需求。
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// 设置路由键。
    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    /// 注册命名校验器。
    pub fn validator<F>(mut self, name: impl Into<Cow<'static, str>>, predicate: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.validators.push((name.into(), Box::new(predicate)));
        self
    }

    /// 要求消息必须携带载荷。
    pub fn require_payload(self) -> Self {
        self.validator("payload-required", Message::has_payload)
    }

    pub fn as_request(self) -> Self {
        self.tag(CATEGORY_TAG, "REQUEST")
    }

    pub fn as_response(self) -> Self {
        self.tag(CATEGORY_TAG, "RESPONSE")
    }

    pub fn as_event(self) -> Self {
        self.tag(CATEGORY_TAG, "EVENT")
    }

    pub fn as_command(self) -> Self {
        self.tag(CATEGORY_TAG, "COMMAND")
    }

    pub fn as_system(self) -> Self {
        self.tag(CATEGORY_TAG, "SYSTEM")
    }

    /// 重要消息预设：优先级 1 并打上 `importance=HIGH`。
    pub fn important(self) -> Self {
        self.priority(1).tag("importance", "HIGH")
    }

    /// 紧急消息预设：优先级 0 并打上 `urgency=HIGH`。
    pub fn urgent(self) -> Self {
        self.priority(0).tag("urgency", "HIGH")
    }

    /// 5 秒短超时。
    pub fn short_timeout(self) -> Self {
        self.timeout(Duration::from_secs(5))
    }

    /// 5 分钟长超时。
    pub fn long_timeout(self) -> Self {
        self.timeout(Duration::from_secs(300))
    }

    /// 冻结消息并执行校验。
    pub fn build(mut self) -> Result<Message, MessageError> {
        let validators = std::mem::take(&mut self.validators);
        let message = self.freeze();
        for (name, predicate) in &validators {
            if !predicate(&message) {
                return Err(MessageError::ValidationFailed {
                    validator: name.to_string(),
                    message_id: message.id.to_string(),
                });
            }
        }
        Ok(message)
    }

    fn freeze(self) -> Message {
        let id = self.id.unwrap_or_else(generate_message_id);
        let message_type = self
            .message_type
            .or_else(|| self.payload_type.map(str::to_owned))
            .unwrap_or_default();

        Message {
            id: Arc::from(id),
            payload: self.payload,
            sender: self.sender,
            reply_to: self.reply_to,
            correlation_id: self.correlation_id.map(Arc::from),
            priority: self.priority,
            timeout: self.timeout.unwrap_or(DEFAULT_MESSAGE_TIMEOUT),
            timestamp: self.timestamp.unwrap_or_else(SystemTime::now),
            routing_hints: Arc::new(self.routing_hints),
            tags: Arc::new(self.tags),
            message_type: Arc::from(message_type),
            persistent: self.persistent,
            routing_key: self.routing_key.map(Arc::from),
        }
    }
}

fn generate_message_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let sequence = MESSAGE_SEQUENCE.fetch_add(1, AtomicOrdering::Relaxed) + 1;
    format!("msg-{millis}-{sequence}")
}

/// 去掉模块路径与泛型参数后的类型名，例如 `alloc::string::String` → `String`。
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head)
}
