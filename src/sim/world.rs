//! 世界 trait
//!
//! 定义仿真世界接口。

use super::simulator::Simulator;
use std::any::Any;

/// 仿真世界：由业务层实现（例如网络拓扑、应用、trace 等）。
pub trait World: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// 每个事件执行完后回调一次
    fn on_tick(&mut self, _sim: &mut Simulator) {}
}

/// 把 `&mut dyn World` 还原成具体类型。事件与世界类型不匹配属于装配错误。
pub fn world_mut<W: World>(world: &mut dyn World) -> &mut W {
    world
        .as_any_mut()
        .downcast_mut::<W>()
        .unwrap_or_else(|| panic!("world must be {}", std::any::type_name::<W>()))
}
