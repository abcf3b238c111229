//! 接收应用：在 `node:port` 上监听，统计收到的字节

use serde::Serialize;

use crate::net::{Network, NodeId};
use crate::sim::SimTime;

#[derive(Debug, Clone, Serialize)]
pub struct PacketSink {
    pub id: usize,
    #[serde(skip)]
    pub node: NodeId,
    pub port: u16,
    #[serde(skip)]
    pub start: SimTime,
    #[serde(skip)]
    pub stop: SimTime,
    pub rx_bytes: u64,
    pub rx_chunks: u64,
}

impl PacketSink {
    /// 在 `node` 上安装接收应用，返回其编号
    pub fn install(net: &mut Network, node: NodeId, port: u16, start: SimTime, stop: SimTime) -> usize {
        let id = net.sinks.len();
        net.sinks.push(PacketSink {
            id,
            node,
            port,
            start,
            stop,
            rx_bytes: 0,
            rx_chunks: 0,
        });
        id
    }

    /// 处于 [start, stop) 内即在监听
    pub fn is_listening(&self, now: SimTime) -> bool {
        self.start <= now && now < self.stop
    }

    pub(crate) fn on_receive(&mut self, bytes: u32) {
        self.rx_bytes += u64::from(bytes);
        self.rx_chunks += 1;
    }
}
