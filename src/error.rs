//! 顶层错误类型

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::app::AppError;
use crate::net::{AddressError, RateError};
use crate::proto::tcp::SocketError;
use crate::scenario::ConfigError;
use crate::sim::{DistError, SimError};
use crate::topo::dumbbell::TopologyError;
use crate::trace::TraceError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid distribution: {0}")]
    Dist(#[from] DistError),
    #[error("invalid data rate: {0}")]
    Rate(#[from] RateError),
    #[error("address plan: {0}")]
    Address(#[from] AddressError),
    #[error("topology: {0}")]
    Topology(#[from] TopologyError),
    #[error("application: {0}")]
    App(#[from] AppError),
    #[error("socket: {0}")]
    Socket(#[from] SocketError),
    #[error("scheduler: {0}")]
    Sim(#[from] SimError),
    #[error("trace: {0}")]
    Trace(#[from] TraceError),
    #[error("failed to read config {}", path.display())]
    ReadConfig { path: PathBuf, source: io::Error },
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
