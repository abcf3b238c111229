//! 网络模拟模块
//!
//! 此模块包含网络模拟的核心组件：节点、链路、地址、数据包、路由与网络拓扑。

mod addr;
mod deliver_packet;
mod id;
mod link;
mod link_ready;
mod net_world;
mod network;
mod node;
mod packet;
mod rate;
mod routing;
mod stats;
mod transport;

pub use addr::{AddressError, AddressPlan, AddressPool, LinkBlock};
pub use deliver_packet::DeliverPacket;
pub use id::{LinkId, NodeId};
pub use link::{Link, LinkProfile, P2pLink};
pub use link_ready::LinkReady;
pub use net_world::NetWorld;
pub use network::Network;
pub use node::{Node, NodeKind};
pub use packet::Packet;
pub use rate::{DataRate, RateError};
pub use routing::RoutingTable;
pub use stats::Stats;
pub use transport::{TcpSegment, Transport};
