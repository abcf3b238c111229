//! 数据包交付事件

use super::id::NodeId;
use super::net_world::NetWorld;
use super::packet::Packet;
use crate::sim::{Event, Simulator, World, world_mut};

/// 事件：数据包经过传播时延后到达某个节点。
#[derive(Debug)]
pub struct DeliverPacket {
    pub to: NodeId,
    pub pkt: Packet,
}

impl Event for DeliverPacket {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let DeliverPacket { to, pkt } = *self;
        world_mut::<NetWorld>(world).net.deliver(to, pkt, sim);
    }
}
