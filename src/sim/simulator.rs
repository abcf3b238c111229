//! 仿真器
//!
//! 定义事件驱动仿真器，维护当前时间与事件队列。
//!
//! 取消采用“墓碑”方式：被取消的事件仍留在堆中，只从 `pending` 集合里移除，
//! 运行循环弹出时发现不在 `pending` 中就直接跳过。

use super::event::{Event, EventId};
use super::scheduled_event::ScheduledEvent;
use super::time::SimTime;
use super::world::World;
use std::collections::{BinaryHeap, HashSet};
use thiserror::Error;
use tracing::{debug, error, info, trace};

/// 调度错误。出现即表示仿真逻辑有缺陷，运行循环会立即中止。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("cannot schedule event at {at:?}: clock is already at {now:?}")]
    ScheduleInPast { at: SimTime, now: SimTime },
}

/// 事件驱动仿真器：维护当前时间与事件队列。
#[derive(Default)]
pub struct Simulator {
    now: SimTime,
    next_seq: u64,
    q: BinaryHeap<ScheduledEvent>,
    pending: HashSet<EventId>,
    fault: Option<SimError>,
    executed: u64,
    skipped: u64,
}

impl Simulator {
    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 调度事件在指定时间执行。
    ///
    /// `at < now` 时事件不会入队：错误被记录下来，下一次运行循环检查时中止仿真。
    #[tracing::instrument(level = "trace", skip(self, ev), fields(event_type = std::any::type_name::<E>(), schedule_at = ?at))]
    pub fn schedule<E: Event>(&mut self, at: SimTime, ev: E) -> EventId {
        let id = EventId(self.next_seq);
        self.next_seq = self.next_seq.wrapping_add(1);

        if at < self.now {
            let err = SimError::ScheduleInPast { at, now: self.now };
            error!(%err, "调度到过去的时间");
            self.fault.get_or_insert(err);
            return id;
        }

        trace!(now = ?self.now, seq = id.0, "调度事件");
        self.q.push(ScheduledEvent {
            at,
            id,
            ev: Box::new(ev),
        });
        self.pending.insert(id);
        id
    }

    /// 相对当前时间调度
    pub fn schedule_in<E: Event>(&mut self, delay: SimTime, ev: E) -> EventId {
        let at = self.now.saturating_add(delay);
        self.schedule(at, ev)
    }

    /// 取消尚未执行的事件；事件已执行或已取消时返回 false。
    pub fn cancel(&mut self, id: EventId) -> bool {
        let removed = self.pending.remove(&id);
        if removed {
            trace!(seq = id.0, "事件已取消");
        }
        removed
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.pending.contains(&id)
    }

    /// 尚未执行且未取消的事件数
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// 已执行的事件数
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// 因取消而被跳过的事件数
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn check_fault(&self) -> Result<(), SimError> {
        match &self.fault {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// 弹出并执行一个事件；墓碑事件只计数不执行。
    fn step(&mut self, world: &mut dyn World) {
        let Some(item) = self.q.pop() else {
            return;
        };
        if !self.pending.remove(&item.id) {
            self.skipped += 1;
            trace!(seq = item.id.0, at = ?item.at, "跳过已取消事件");
            return;
        }
        debug_assert!(item.at >= self.now, "clock must not go backwards");
        self.now = item.at;
        self.executed += 1;
        item.ev.execute(self, world);
        world.on_tick(self);
    }

    /// 运行直到事件队列为空或到达 `until`；结束后时钟停在 `until`。
    #[tracing::instrument(skip(self, world), fields(until = ?until))]
    pub fn run_until(&mut self, until: SimTime, world: &mut dyn World) -> Result<(), SimError> {
        info!(now = ?self.now, queue_size = self.q.len(), "▶️  开始运行仿真");
        self.check_fault()?;
        while let Some(top) = self.q.peek() {
            if top.at > until {
                break;
            }
            self.step(world);
            self.check_fault()?;
        }
        self.now = self.now.max(until);
        info!(
            executed = self.executed,
            skipped = self.skipped,
            final_time = ?self.now,
            "✅ 仿真完成"
        );
        Ok(())
    }

    /// 运行所有事件直到队列为空。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) -> Result<(), SimError> {
        info!("▶️  开始运行仿真");
        debug!(now = ?self.now, queue_size = self.q.len(), "初始状态");
        self.check_fault()?;
        while !self.q.is_empty() {
            self.step(world);
            self.check_fault()?;
        }
        info!(
            total_events = self.executed,
            final_time = ?self.now,
            "✅ 仿真完成"
        );
        Ok(())
    }
}
