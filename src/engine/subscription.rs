//! 过滤变更订阅
//!
//! 渲染层通过订阅获知"某次 apply_filter 已完成"，随后重新读取分组。
//! 回调在传播全部完成之后才触发，读到的一定是完整更新后的状态。

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 过滤变更通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEvent {
    /// 发生变化的维度
    pub dimension: String,
    /// 变更后的 generation
    pub generation: u64,
    /// 变更后的存活记录数
    pub live_count: usize,
    /// 进入该维度选中集合的记录数
    pub entered: usize,
    /// 离开该维度选中集合的记录数
    pub exited: usize,
}

/// 订阅 ID
pub type SubscriptionId = u64;

/// 订阅回调类型
pub type FilterCallback = Box<dyn Fn(&FilterEvent) + Send + Sync>;

/// 订阅管理器
pub struct SubscriptionManager {
    subscribers: RwLock<Vec<(SubscriptionId, Arc<FilterCallback>)>>,
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 订阅过滤变更
    pub fn subscribe(&self, callback: FilterCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    /// 取消订阅
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// 通知全部订阅者
    pub fn notify(&self, event: &FilterEvent) {
        // 先复制回调列表再释放锁，回调内可以安全地再订阅/取消订阅
        let callbacks: Vec<Arc<FilterCallback>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        for callback in callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
