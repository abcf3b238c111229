//! Trace 管线
//!
//! 订阅传输层/链路层的状态变化钩子，在同一个事件执行过程中同步格式化并追加一行记录。
//! 每个 (指标, 流编号) 对应一个只追加的输出流；`rx` 为所有流共享的单一输出流。
//!
//! 输出格式（空白分隔，一行一条）：
//! - `cwnd-<i>`：`<time> <old_cwnd> <new_cwnd>`
//! - `rtt-<i>`：`<time> <rtt_seconds>`，首行为 `0.0 <initial_rtt>`
//! - `tx-<i>` / `phytx-<i>`：`<time> <packet_size_bytes>`
//! - `rx`：`<source_address> <time> <packet_size_bytes>`

mod observer;
mod stream;
mod tracer;

use std::fmt;
use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;

use crate::net::LinkId;
use crate::proto::tcp::TcpConnId;
use crate::sim::SimTime;

pub use observer::Observer;
pub use stream::{FileStreams, MemoryStreams, OutputStream, StreamFactory, StreamId};
pub use tracer::Tracer;

/// 可被观测的对象
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// TCP 端点（cwnd / RTT）
    Socket(TcpConnId),
    /// ON/OFF 源（应用层发送）
    Source(usize),
    /// 单向链路的发送端设备（物理层开始发送）
    Device(LinkId),
    /// 服务器上的接收应用
    Sink(usize),
}

/// 指标种类，同时决定输出流的名字
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Cwnd,
    Rtt,
    Tx,
    PhyTx,
    Rx,
}

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Metric::Cwnd => "cwnd",
            Metric::Rtt => "rtt",
            Metric::Tx => "tx",
            Metric::PhyTx => "phytx",
            Metric::Rx => "rx",
        }
    }

    /// `rx` 全部流共用一个文件，其它指标每个流一个文件。
    pub fn stream_name(self, flow_index: usize) -> String {
        match self {
            Metric::Rx => self.name().to_string(),
            m => format!("{}-{}", m.name(), flow_index),
        }
    }

    /// 该指标能否挂到给定的观测对象上
    pub fn accepts(self, subject: Subject) -> bool {
        matches!(
            (self, subject),
            (Metric::Cwnd | Metric::Rtt, Subject::Socket(_))
                | (Metric::Tx, Subject::Source(_))
                | (Metric::PhyTx, Subject::Device(_))
                | (Metric::Rx, Subject::Sink(_))
        )
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 钩子触发时携带的值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hook {
    CwndChange { old: u64, new: u64 },
    RttUpdate { old: SimTime, new: SimTime },
    PacketTx { bytes: u32 },
    PhyTxBegin { bytes: u32 },
    PacketRx { bytes: u32, from: Ipv4Addr },
}

impl Hook {
    pub fn metric(&self) -> Metric {
        match self {
            Hook::CwndChange { .. } => Metric::Cwnd,
            Hook::RttUpdate { .. } => Metric::Rtt,
            Hook::PacketTx { .. } => Metric::Tx,
            Hook::PhyTxBegin { .. } => Metric::PhyTx,
            Hook::PacketRx { .. } => Metric::Rx,
        }
    }
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("no output stream factory configured")]
    NoSink,
    #[error("cannot attach {metric} observer after the run has started")]
    LateAttach { metric: Metric },
    #[error("metric {metric} cannot observe {subject:?}")]
    SubjectMismatch { metric: Metric, subject: Subject },
    #[error("failed to open output stream {name:?}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write output stream {name:?}")]
    Write {
        name: String,
        #[source]
        source: io::Error,
    },
}
