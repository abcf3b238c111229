//! 网络拓扑管理
//!
//! 持有节点/链路 arena、地址表、路由表、TCP 栈、接收应用与 trace 管线，
//! 负责数据包的入队、串行化、传播与交付。

use std::collections::HashMap;
use std::net::Ipv4Addr;

use super::addr::LinkBlock;
use super::deliver_packet::DeliverPacket;
use super::id::{LinkId, NodeId};
use super::link::{Link, LinkProfile, P2pLink};
use super::link_ready::LinkReady;
use super::node::{Node, NodeKind};
use super::packet::Packet;
use super::routing::RoutingTable;
use super::stats::Stats;
use super::transport::Transport;
use crate::app::PacketSink;
use crate::proto::tcp::TcpStack;
use crate::sim::{SimTime, Simulator};
use crate::trace::{Hook, Subject, Tracer};
use tracing::{debug, trace, warn};

/// 网络拓扑
#[derive(Default)]
pub struct Network {
    nodes: Vec<Node>,
    links: Vec<Link>,
    edges: HashMap<(NodeId, NodeId), LinkId>,
    addr_map: HashMap<Ipv4Addr, NodeId>,
    routes: RoutingTable,
    next_pkt_id: u64,
    pub stats: Stats,
    pub tcp: TcpStack,
    pub sinks: Vec<PacketSink>,
    pub tracer: Tracer,
}

impl Network {
    pub fn with_tracer(tracer: Tracer) -> Self {
        Self {
            tracer,
            ..Self::default()
        }
    }

    /// 添加节点
    pub fn add_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, name, kind));
        self.routes.mark_dirty();
        id
    }

    /// 连接两个节点（创建单向链路）
    pub fn connect(&mut self, from: NodeId, to: NodeId, profile: &LinkProfile) -> LinkId {
        let id = LinkId(self.links.len());
        self.links.push(Link::new(id, from, to, profile));
        self.edges.insert((from, to), id);
        self.nodes[from.0].links.push(id);
        self.routes.mark_dirty();
        id
    }

    /// 创建点对点链路：两个方向各一个设备，两端分配地址块中的地址
    pub fn connect_p2p(
        &mut self,
        a: NodeId,
        b: NodeId,
        profile: &LinkProfile,
        block: LinkBlock,
    ) -> P2pLink {
        let a_to_b = self.connect(a, b, profile);
        let b_to_a = self.connect(b, a, profile);
        self.assign_address(a, block.a);
        self.assign_address(b, block.b);
        debug!(?a, ?b, net = %block.net, "创建点对点链路");
        P2pLink {
            a,
            b,
            a_to_b,
            b_to_a,
            block,
            profile: *profile,
        }
    }

    pub fn assign_address(&mut self, node: NodeId, addr: Ipv4Addr) {
        self.nodes[node.0].addrs.push(addr);
        self.addr_map.insert(addr, node);
    }

    /// 地址 -> 节点
    pub fn resolve(&self, addr: Ipv4Addr) -> Option<NodeId> {
        self.addr_map.get(&addr).copied()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link_between(&self, from: NodeId, to: NodeId) -> Option<LinkId> {
        self.edges.get(&(from, to)).copied()
    }

    /// 按当前拓扑（重新）计算路由表
    pub fn populate_routes(&mut self) -> &RoutingTable {
        if self.routes.is_dirty() {
            let n = self.nodes.len();
            let mut adj = vec![Vec::new(); n];
            let mut rev_adj = vec![Vec::new(); n];
            for l in &self.links {
                adj[l.from.0].push(l.to);
                rev_adj[l.to.0].push(l.from);
            }
            self.routes.ensure_built(&adj, &rev_adj);
        }
        &self.routes
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// 创建数据包，源/目的地址取两端节点的首个接口地址
    pub fn make_packet(&mut self, flow_id: u64, size_bytes: u32, src: NodeId, dst: NodeId) -> Packet {
        let id = self.next_pkt_id;
        self.next_pkt_id = self.next_pkt_id.wrapping_add(1);
        let mut pkt = Packet::new(id, flow_id, size_bytes, src, dst);
        if let Some(a) = self.nodes[src.0].primary_addr() {
            pkt.src_addr = a;
        }
        if let Some(a) = self.nodes[dst.0].primary_addr() {
            pkt.dst_addr = a;
        }
        pkt
    }

    /// 将数据包交付给节点处理：到达目的地则上交传输层，否则继续转发
    #[tracing::instrument(level = "trace", skip(self, sim, pkt), fields(pkt_id = pkt.id, to = ?to))]
    pub fn deliver(&mut self, to: NodeId, mut pkt: Packet, sim: &mut Simulator) {
        pkt.hops_taken = pkt.hops_taken.saturating_add(1);
        if pkt.arrived_at(to) {
            self.on_delivered(to, pkt, sim);
        } else {
            trace!(node = %self.nodes[to.0].name, "未到达目的地，继续转发");
            self.forward_from(to, pkt, sim);
        }
    }

    /// 从指定节点转发数据包：查下一跳，进入对应设备的出队列
    #[tracing::instrument(level = "trace", skip(self, sim, pkt), fields(pkt_id = pkt.id, from = ?from))]
    pub fn forward_from(&mut self, from: NodeId, pkt: Packet, sim: &mut Simulator) {
        let Some(to) = self.populate_routes().next_hop(from, pkt.dst) else {
            warn!(?from, dst = ?pkt.dst, "没有可用路由，丢弃数据包");
            self.stats.unroutable_pkts += 1;
            return;
        };
        let Some(link_id) = self.link_between(from, to) else {
            warn!(?from, ?to, "路由指向不存在的链路，丢弃数据包");
            self.stats.unroutable_pkts += 1;
            return;
        };

        let link = &mut self.links[link_id.0];
        let size = pkt.size_bytes;
        if let Err(dropped) = link.queue.enqueue(pkt) {
            debug!(
                pkt_id = dropped.id,
                link = %link_id,
                q_bytes = link.queue.bytes(),
                "🗑️  出队列已满，丢包"
            );
            self.stats.dropped_pkts += 1;
            self.stats.dropped_bytes += u64::from(size);
            return;
        }
        if !link.busy {
            self.start_tx(link_id, sim);
        }
    }

    /// 设备空闲时取队首开始串行化：触发 PhyTxBegin，调度链路就绪与到达事件
    fn start_tx(&mut self, link_id: LinkId, sim: &mut Simulator) {
        let now = sim.now();
        let link = &mut self.links[link_id.0];
        let Some(pkt) = link.queue.dequeue() else {
            link.busy = false;
            return;
        };
        link.busy = true;
        link.tx_pkts += 1;
        link.tx_bytes += u64::from(pkt.size_bytes);

        let depart = now.saturating_add(link.tx_time(pkt.size_bytes));
        let arrive = depart.saturating_add(link.latency);
        let to = link.to;
        let bytes = pkt.size_bytes;
        trace!(link = %link_id, ?depart, ?arrive, "开始发送");

        self.tracer
            .fire(now, Subject::Device(link_id), Hook::PhyTxBegin { bytes });
        sim.schedule(depart, LinkReady { link_id });
        sim.schedule(arrive, DeliverPacket { to, pkt });
    }

    /// 链路完成一次串行化
    pub(crate) fn on_link_ready(&mut self, link_id: LinkId, sim: &mut Simulator) {
        self.links[link_id.0].busy = false;
        self.start_tx(link_id, sim);
    }

    /// 数据包送达目的地：更新统计并交给传输层
    fn on_delivered(&mut self, at: NodeId, pkt: Packet, sim: &mut Simulator) {
        self.stats.delivered_pkts += 1;
        self.stats.delivered_bytes += u64::from(pkt.size_bytes);
        trace!(pkt_id = pkt.id, flow_id = pkt.flow_id, ?at, "✅ 数据包送达目的地");

        if let Transport::Tcp(seg) = pkt.transport {
            // 规避同时借用 `self` 与 `self.tcp`
            let mut tcp = std::mem::take(&mut self.tcp);
            tcp.on_tcp_segment(pkt.flow_id, at, seg, pkt.src_addr, sim, self);
            self.tcp = tcp;
        }
    }

    /// 把按序到达的字节交给 `node:port` 上正在监听的接收应用；无人监听时返回 false
    pub(crate) fn deliver_to_app(
        &mut self,
        node: NodeId,
        port: u16,
        bytes: u32,
        from: Ipv4Addr,
        now: SimTime,
    ) -> bool {
        let Some(sink) = self
            .sinks
            .iter_mut()
            .find(|s| s.node == node && s.port == port && s.is_listening(now))
        else {
            return false;
        };
        sink.on_receive(bytes);
        let subject = Subject::Sink(sink.id);
        self.tracer
            .fire(now, subject, Hook::PacketRx { bytes, from });
        true
    }

    /// 该地址/端口上是否有应用在监听
    pub(crate) fn is_listening(&self, node: NodeId, port: u16, now: SimTime) -> bool {
        self.sinks
            .iter()
            .any(|s| s.node == node && s.port == port && s.is_listening(now))
    }
}
