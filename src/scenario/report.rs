//! 运行结果汇总

use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::app::SourceStats;
use crate::net::Stats;

#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub index: usize,
    pub gateway: Ipv4Addr,
    pub source: SourceStats,
    pub cwnd_bytes: u64,
    pub ssthresh_bytes: u64,
    pub last_rtt_s: f64,
    pub bytes_acked: u64,
    pub segments_sent: u64,
    pub retransmits: u64,
    pub timeouts: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub name: String,
    pub records: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub final_time_s: f64,
    pub events_executed: u64,
    pub events_skipped: u64,
    pub network: Stats,
    pub sink_rx_bytes: u64,
    pub flows: Vec<FlowReport>,
    pub streams: Vec<StreamReport>,
}

impl RunReport {
    pub fn total_tx_bytes(&self) -> u64 {
        self.flows.iter().map(|f| f.source.bytes_sent).sum()
    }

    pub fn total_tx_packets(&self) -> u64 {
        self.flows.iter().map(|f| f.source.packets_sent).sum()
    }

    pub fn stream(&self, name: &str) -> Option<&StreamReport> {
        self.streams.iter().find(|s| s.name == name)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "done @ {:.3}s, events executed={} skipped={}",
            self.final_time_s, self.events_executed, self.events_skipped
        )?;
        writeln!(
            f,
            "network: delivered={} pkts / {} bytes, dropped={} pkts, unroutable={}, refused={}",
            self.network.delivered_pkts,
            self.network.delivered_bytes,
            self.network.dropped_pkts,
            self.network.unroutable_pkts,
            self.network.refused_segments
        )?;
        writeln!(f, "sink rx: {} bytes", self.sink_rx_bytes)?;
        for flow in &self.flows {
            writeln!(
                f,
                "flow {:>2} {:<12} tx={} pkts / {} bytes refused={} on/off={}/{} cwnd={} rtt={:.6}s retx={} rto={}",
                flow.index,
                flow.gateway,
                flow.source.packets_sent,
                flow.source.bytes_sent,
                flow.source.packets_refused,
                flow.source.active_periods,
                flow.source.idle_periods,
                flow.cwnd_bytes,
                flow.last_rtt_s,
                flow.retransmits,
                flow.timeouts
            )?;
        }
        write!(f, "trace streams: {}", self.streams.len())
    }
}
