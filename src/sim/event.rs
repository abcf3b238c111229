//! 事件 trait
//!
//! 定义仿真事件接口。

use super::simulator::Simulator;
use super::world::World;

/// 事件：可被调度执行。使用 `self: Box<Self>` 以支持 move/所有权转移。
pub trait Event: Send + 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);
}

/// 已调度事件的句柄，可用于取消。
///
/// 数值即插入序号，在一个 `Simulator` 内单调递增、不复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u64);
