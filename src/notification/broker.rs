//! 检测完成事件的发布/订阅
//!
//! 每个订阅者拥有独立的有界队列。发布时对每个队列做一次非阻塞推送：
//! 队列已满则丢弃该订阅者的这一份事件，队列已关闭则移除该订阅者。
//! 发布方永远不会因为某个订阅者消费缓慢而阻塞。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// 默认订阅队列容量
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 16;

/// 订阅者ID
pub type SubscriberId = u64;

/// 一轮检测完成事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepEvent {
    /// 事件序号，由 [`Notifier::next_event`] 递增分配
    pub sequence: u64,
    /// 完成时间
    pub completed_at: DateTime<Utc>,
    /// 本轮检测的站点数
    pub checked: usize,
}

/// 单次发布的投递统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// 成功投递的订阅者数
    pub delivered: usize,
    /// 因队列已满被丢弃的份数
    pub dropped: usize,
    /// 因队列已关闭被移除的订阅者数
    pub pruned: usize,
}

/// 订阅状态，只能从 `Active` 变为 `Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// 仍在接收事件
    Active,
    /// 已退订或发布端已释放
    Closed,
}

/// 订阅句柄
///
/// 持有接收端。句柄被丢弃后，下一次发布会发现队列已关闭并移除登记。
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<SweepEvent>,
}

impl Subscription {
    /// 订阅者ID
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// 等待下一条事件；退订且队列取空后返回 `None`
    pub async fn recv(&mut self) -> Option<SweepEvent> {
        self.receiver.recv().await
    }

    /// 非阻塞地取出一条已到达的事件
    pub fn try_recv(&mut self) -> Option<SweepEvent> {
        self.receiver.try_recv().ok()
    }

    /// 当前订阅状态
    pub fn state(&self) -> SubscriberState {
        if self.receiver.is_closed() {
            SubscriberState::Closed
        } else {
            SubscriberState::Active
        }
    }
}

/// 事件广播器
#[derive(Debug)]
pub struct Notifier {
    /// 每个订阅队列的容量
    capacity: usize,
    /// 最后分配的订阅者ID
    last_subscriber: AtomicU64,
    /// 最后分配的事件序号
    last_sequence: AtomicU64,
    /// 已登记的发送端
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<SweepEvent>>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl Notifier {
    /// 创建广播器
    ///
    /// # 参数
    /// * `capacity` - 每个订阅队列的容量，为 0 时按 1 处理
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            last_subscriber: AtomicU64::new(0),
            last_sequence: AtomicU64::new(0),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// 订阅队列容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<SweepEvent>>> {
        // 临界区内没有可能 panic 的操作，中毒后的数据仍然一致
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 新建订阅，立即返回
    pub fn subscribe(&self) -> Subscription {
        let id = self.last_subscriber.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.subscribers().insert(id, sender);

        debug!("新增订阅者: {}", id);
        Subscription { id, receiver }
    }

    /// 退订，重复调用无副作用
    ///
    /// 已经进入队列的事件仍可被读出，之后 `recv` 返回 `None`。
    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.unsubscribe_id(subscription.id());
    }

    /// 按ID退订
    pub fn unsubscribe_id(&self, id: SubscriberId) {
        if self.subscribers().remove(&id).is_some() {
            debug!("订阅者已退订: {}", id);
        }
    }

    /// 当前登记的订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// 构造下一个检测完成事件
    pub fn next_event(&self, checked: usize) -> SweepEvent {
        SweepEvent {
            sequence: self.last_sequence.fetch_add(1, Ordering::Relaxed) + 1,
            completed_at: Utc::now(),
            checked,
        }
    }

    /// 向所有订阅者发布事件，不阻塞
    ///
    /// # 参数
    /// * `event` - 检测完成事件
    ///
    /// # 返回
    /// * `PublishReport` - 投递、丢弃和移除的数量
    pub fn publish(&self, event: SweepEvent) -> PublishReport {
        let mut report = PublishReport::default();
        let mut subscribers = self.subscribers();

        subscribers.retain(|id, sender| match sender.try_send(event.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!("订阅者 {} 队列已满，丢弃事件 #{}", id, event.sequence);
                report.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("订阅者 {} 已断开，移除登记", id);
                report.pruned += 1;
                false
            }
        });
        drop(subscribers);

        debug!(
            "发布事件 #{}: 投递 {}, 丢弃 {}, 移除 {}",
            event.sequence, report.delivered, report.dropped, report.pruned
        );
        report
    }
}
