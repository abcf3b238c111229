//! 仿真核心模块
//!
//! 此模块包含事件驱动仿真的核心组件：仿真时间、事件、世界、仿真器与随机变量。

mod event;
mod random;
mod scheduled_event;
mod simulator;
mod time;
mod world;

pub use event::{Event, EventId};
pub use random::{DistError, Sampler, TimeDist, stream_seed};
pub use scheduled_event::ScheduledEvent;
pub use simulator::{SimError, Simulator};
pub use time::SimTime;
pub use world::{World, world_mut};
