//! DropTail（尾丢弃）队列
//!
//! 当队列容量不足时，直接丢弃新到达的 packet。

use std::collections::VecDeque;

use crate::net::Packet;

use super::PacketQueue;

/// 队列容量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueLimit {
    Packets(usize),
    Bytes(u64),
}

#[derive(Debug)]
pub struct DropTailQueue {
    limit: QueueLimit,
    cur_bytes: u64,
    q: VecDeque<Packet>,
}

impl DropTailQueue {
    pub fn new(limit: QueueLimit) -> Self {
        Self {
            limit,
            cur_bytes: 0,
            q: VecDeque::new(),
        }
    }

    pub fn limit(&self) -> QueueLimit {
        self.limit
    }

    fn has_room_for(&self, size_bytes: u64) -> bool {
        match self.limit {
            QueueLimit::Packets(max) => self.q.len() < max,
            QueueLimit::Bytes(max) => self.cur_bytes.saturating_add(size_bytes) <= max,
        }
    }
}

impl PacketQueue for DropTailQueue {
    fn enqueue(&mut self, pkt: Packet) -> Result<(), Packet> {
        let sz = u64::from(pkt.size_bytes);
        if !self.has_room_for(sz) {
            return Err(pkt);
        }
        self.cur_bytes = self.cur_bytes.saturating_add(sz);
        self.q.push_back(pkt);
        Ok(())
    }

    fn dequeue(&mut self) -> Option<Packet> {
        let pkt = self.q.pop_front()?;
        self.cur_bytes = self.cur_bytes.saturating_sub(u64::from(pkt.size_bytes));
        Some(pkt)
    }

    fn len(&self) -> usize {
        self.q.len()
    }

    fn bytes(&self) -> u64 {
        self.cur_bytes
    }
}
