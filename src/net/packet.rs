//! 数据包类型
//!
//! 定义网络数据包及其相关操作。数据包按目的节点逐跳路由，不预先携带路径。

use std::net::Ipv4Addr;

use super::id::NodeId;
use super::transport::Transport;

/// 网络数据包
#[derive(Debug, Clone)]
pub struct Packet {
    pub id: u64,
    pub flow_id: u64,
    /// 线上大小（含 IP/TCP 头）
    pub size_bytes: u32,
    pub src: NodeId,
    pub dst: NodeId,
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub transport: Transport,
    pub hops_taken: u32,
}

impl Packet {
    /// 构造一个尚未离开源节点的数据包（地址未知时为 0.0.0.0）
    pub fn new(id: u64, flow_id: u64, size_bytes: u32, src: NodeId, dst: NodeId) -> Self {
        Self {
            id,
            flow_id,
            size_bytes,
            src,
            dst,
            src_addr: Ipv4Addr::UNSPECIFIED,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            transport: Transport::None,
            hops_taken: 0,
        }
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// 是否已到达目的节点
    pub fn arrived_at(&self, node: NodeId) -> bool {
        self.dst == node
    }
}
