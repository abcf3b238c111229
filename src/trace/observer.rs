//! 每个指标一种观测者
//!
//! 观测者持有自己的输出流下标与流编号。RTT 观测者额外带一个“首次观测”标志，
//! 该标志按流独立，不同流之间互不影响。

use std::io;

use tracing::trace;

use super::stream::{OutputStream, StreamId};
use super::{Hook, Metric};
use crate::sim::SimTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observer {
    Cwnd { stream: StreamId, flow: usize },
    Rtt { stream: StreamId, flow: usize, baseline_written: bool },
    Tx { stream: StreamId, flow: usize },
    PhyTx { stream: StreamId, flow: usize },
    Rx { stream: StreamId, flow: usize },
}

impl Observer {
    pub fn new(metric: Metric, stream: StreamId, flow: usize) -> Self {
        match metric {
            Metric::Cwnd => Observer::Cwnd { stream, flow },
            Metric::Rtt => Observer::Rtt {
                stream,
                flow,
                baseline_written: false,
            },
            Metric::Tx => Observer::Tx { stream, flow },
            Metric::PhyTx => Observer::PhyTx { stream, flow },
            Metric::Rx => Observer::Rx { stream, flow },
        }
    }

    pub fn metric(&self) -> Metric {
        match self {
            Observer::Cwnd { .. } => Metric::Cwnd,
            Observer::Rtt { .. } => Metric::Rtt,
            Observer::Tx { .. } => Metric::Tx,
            Observer::PhyTx { .. } => Metric::PhyTx,
            Observer::Rx { .. } => Metric::Rx,
        }
    }

    pub fn stream(&self) -> StreamId {
        match self {
            Observer::Cwnd { stream, .. }
            | Observer::Rtt { stream, .. }
            | Observer::Tx { stream, .. }
            | Observer::PhyTx { stream, .. }
            | Observer::Rx { stream, .. } => *stream,
        }
    }

    pub fn flow(&self) -> usize {
        match self {
            Observer::Cwnd { flow, .. }
            | Observer::Rtt { flow, .. }
            | Observer::Tx { flow, .. }
            | Observer::PhyTx { flow, .. }
            | Observer::Rx { flow, .. } => *flow,
        }
    }

    /// 把一次钩子触发格式化成记录行追加到 `out`；指标不匹配时什么也不做。
    pub fn record(&mut self, now: SimTime, hook: &Hook, out: &mut OutputStream) -> io::Result<()> {
        trace!(flow = self.flow(), stream = out.name(), ?hook, "写 trace 记录");
        match (self, *hook) {
            (Observer::Cwnd { .. }, Hook::CwndChange { old, new }) => {
                out.append(format_args!("{now} {old} {new}"))
            }
            (
                Observer::Rtt {
                    baseline_written, ..
                },
                Hook::RttUpdate { old, new },
            ) => {
                if !*baseline_written {
                    out.append(format_args!("0.0 {}", old.as_secs_f64()))?;
                    *baseline_written = true;
                }
                out.append(format_args!("{now} {}", new.as_secs_f64()))
            }
            (Observer::Tx { .. }, Hook::PacketTx { bytes })
            | (Observer::PhyTx { .. }, Hook::PhyTxBegin { bytes }) => {
                out.append(format_args!("{now} {bytes}"))
            }
            (Observer::Rx { .. }, Hook::PacketRx { bytes, from }) => {
                out.append(format_args!("{from} {now} {bytes}"))
            }
            _ => Ok(()),
        }
    }
}
