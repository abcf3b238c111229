//! Dumbbell 拓扑构建
//!
//! N 个网关各自经一条接入链路连到同一个路由器，路由器再经一条链路连到服务器：
//!
//! ```text
//!   gw0 ──┐
//!   gw1 ──┼── router ──── server
//!   ...   │
//!   gwN-1─┘
//! ```
//!
//! 每条链路有独立的 {带宽, 时延} 和地址块；构建完成后路由表已填充。

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::net::{AddressError, AddressPlan, LinkProfile, Network, NodeId, NodeKind, P2pLink};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("gateway count must be > 0")]
    NoGateways,
    #[error("address assignment failed")]
    Address(#[from] AddressError),
    #[error("topology is not a tree: {0}")]
    NotATree(String),
}

/// Dumbbell 拓扑配置选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumbbellOpts {
    pub gateways: usize,
    /// 网关 <-> 路由器
    pub access: LinkProfile,
    /// 路由器 <-> 服务器
    pub core: LinkProfile,
    #[serde(default)]
    pub addresses: AddressPlan,
}

/// 构建结果：节点与链路在 `Network` 的 arena 中，这里只记录下标。
#[derive(Debug, Clone)]
pub struct Dumbbell {
    pub gateways: Vec<NodeId>,
    pub router: NodeId,
    pub server: NodeId,
    /// 第 i 条为 gw_i <-> router，`a` 端为网关
    pub access_links: Vec<P2pLink>,
    /// router <-> server，`a` 端为路由器
    pub core_link: P2pLink,
}

impl Dumbbell {
    /// 服务器地址（服务器链路上的 `b` 端）
    pub fn server_addr(&self) -> std::net::Ipv4Addr {
        self.core_link.block.b
    }

    pub fn gateway_addr(&self, i: usize) -> Option<std::net::Ipv4Addr> {
        self.access_links.get(i).map(|l| l.block.a)
    }

    /// 检查树形约束：边数 = 节点数 - 1，且任意两节点间恰有一条路径
    pub fn verify_tree(&self, net: &mut Network) -> Result<(), TopologyError> {
        let nodes = net.nodes().len();
        let p2p = self.access_links.len() + 1;
        if p2p + 1 != nodes {
            return Err(TopologyError::NotATree(format!(
                "{nodes} nodes but {p2p} point-to-point links"
            )));
        }
        let routes = net.populate_routes();
        if let Some((from, dst)) = routes.ambiguous().first() {
            return Err(TopologyError::NotATree(format!(
                "multiple shortest paths from {from} to {dst}"
            )));
        }
        for a in 0..nodes {
            for b in 0..nodes {
                if a != b && routes.path(NodeId(a), NodeId(b)).is_none() {
                    return Err(TopologyError::NotATree(format!(
                        "n{b} unreachable from n{a}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// 构建 dumbbell 拓扑
pub fn build_dumbbell(net: &mut Network, opts: &DumbbellOpts) -> Result<Dumbbell, TopologyError> {
    if opts.gateways == 0 {
        return Err(TopologyError::NoGateways);
    }
    opts.addresses.validate(opts.gateways)?;

    let gateways = (0..opts.gateways)
        .map(|i| net.add_node(format!("gw{i}"), NodeKind::Gateway))
        .collect::<Vec<_>>();
    let router = net.add_node("router0", NodeKind::Router);
    let server = net.add_node("server0", NodeKind::Server);

    let mut access_links = Vec::with_capacity(gateways.len());
    for (i, &gw) in gateways.iter().enumerate() {
        let block = opts.addresses.access.block(i)?;
        access_links.push(net.connect_p2p(gw, router, &opts.access, block));
    }
    let block = opts.addresses.core.block(0)?;
    let core_link = net.connect_p2p(router, server, &opts.core, block);

    net.populate_routes();
    let topo = Dumbbell {
        gateways,
        router,
        server,
        access_links,
        core_link,
    };
    topo.verify_tree(net)?;

    info!(
        gateways = opts.gateways,
        access = %opts.access.data_rate,
        core = %opts.core.data_rate,
        server = %topo.server_addr(),
        "🏗️  dumbbell 拓扑已构建"
    );
    Ok(topo)
}
