//! 链路类型
//!
//! 一条点对点链路由两条单向链路组成，每条单向链路对应发送端的一个设备：
//! 自带 DropTail 出队列、串行化速率与传播时延。

use serde::{Deserialize, Serialize};

use super::addr::LinkBlock;
use super::id::{LinkId, NodeId};
use super::rate::DataRate;
use crate::queue::{DropTailQueue, PacketQueue, QueueLimit};
use crate::sim::SimTime;

/// 链路参数（两个方向相同）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkProfile {
    pub data_rate: DataRate,
    /// 单向传播时延（微秒）
    pub delay_us: u64,
    /// 每个设备的出队列容量（包）
    #[serde(default = "default_queue_pkts")]
    pub queue_pkts: u64,
}

fn default_queue_pkts() -> u64 {
    100
}

impl LinkProfile {
    pub fn new(data_rate: DataRate, delay: SimTime) -> Self {
        Self {
            data_rate,
            delay_us: delay.0 / 1_000,
            queue_pkts: default_queue_pkts(),
        }
    }

    pub fn delay(&self) -> SimTime {
        SimTime::from_micros(self.delay_us)
    }
}

/// 单向链路
#[derive(Debug)]
pub struct Link {
    pub id: LinkId,
    pub from: NodeId,
    pub to: NodeId,
    pub latency: SimTime,
    pub rate: DataRate,
    /// 正在串行化一个数据包
    pub busy: bool,
    pub queue: Box<dyn PacketQueue>,
    pub tx_pkts: u64,
    pub tx_bytes: u64,
}

impl Link {
    pub fn new(id: LinkId, from: NodeId, to: NodeId, profile: &LinkProfile) -> Self {
        Self {
            id,
            from,
            to,
            latency: profile.delay(),
            rate: profile.data_rate,
            busy: false,
            queue: Box::new(DropTailQueue::new(QueueLimit::Packets(
                usize::try_from(profile.queue_pkts).unwrap_or(usize::MAX),
            ))),
            tx_pkts: 0,
            tx_bytes: 0,
        }
    }

    /// 计算传输指定字节数所需的时间
    pub(crate) fn tx_time(&self, bytes: u32) -> SimTime {
        self.rate.time_for_bytes(bytes)
    }
}

/// 一条点对点链路（两个方向 + 地址块）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct P2pLink {
    pub a: NodeId,
    pub b: NodeId,
    /// a -> b 方向（a 端设备）
    pub a_to_b: LinkId,
    /// b -> a 方向（b 端设备）
    pub b_to_a: LinkId,
    pub block: LinkBlock,
    pub profile: LinkProfile,
}
