//! 队列中的事件条目
//!
//! 按 (时间, 插入序号) 排序；同一时刻先调度者先执行。

use super::event::{Event, EventId};
use super::time::SimTime;
use std::cmp::Ordering;
use std::fmt;

pub struct ScheduledEvent {
    pub(crate) at: SimTime,
    pub(crate) id: EventId,
    pub(crate) ev: Box<dyn Event>,
}

impl ScheduledEvent {
    fn key(&self) -> (SimTime, EventId) {
        (self.at, self.id)
    }
}

impl fmt::Debug for ScheduledEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledEvent")
            .field("at", &self.at)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// BinaryHeap 是 max-heap，反转后即为按 key 的最小堆。
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key()).reverse()
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ScheduledEvent {}
