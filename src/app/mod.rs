//! 应用层：ON/OFF 流量源与服务器端接收应用

mod onoff;
mod sink;

use thiserror::Error;

use crate::sim::{DistError, SimTime};

pub use onoff::{
    OnOffAction, OnOffConfig, OnOffEvent, OnOffSource, PhaseChange, SourceState, SourceStats,
};
pub use sink::PacketSink;

/// 安装应用时的配置错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AppError {
    #[error("invalid on/off time distribution")]
    Dist(#[from] DistError),
    #[error("packet size must be > 0")]
    ZeroPacketSize,
    #[error("stop time {stop:?} precedes start time {start:?}")]
    InvalidWindow { start: SimTime, stop: SimTime },
    #[error("remote address {0} is not assigned to any node")]
    UnknownRemote(std::net::Ipv4Addr),
}
