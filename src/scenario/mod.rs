//! 实验驱动
//!
//! 按配置搭建哑铃拓扑，在服务器上安装接收应用、在每个网关上安装一个 ON/OFF 源，
//! 为每条流注册 cwnd/rtt/tx/phytx 观测者与共享的 rx 观测者，然后运行到停止时间。

mod config;
mod report;

use std::net::{Ipv4Addr, SocketAddrV4};

use tracing::{error, info};

use crate::app::{OnOffSource, PacketSink};
use crate::error::Result;
use crate::net::{LinkId, NetWorld, Network, NodeId};
use crate::proto::tcp::TcpConnId;
use crate::sim::{SimTime, Simulator, stream_seed};
use crate::topo::dumbbell::{Dumbbell, build_dumbbell};
use crate::trace::{Metric, StreamFactory, Subject, Tracer};

pub use config::{ConfigError, ScenarioConfig, TraceSelection};
pub use report::{FlowReport, RunReport, StreamReport};

/// 一条流：网关 i 上的源 → 服务器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flow {
    pub index: usize,
    pub gateway: NodeId,
    pub source: usize,
    pub socket: TcpConnId,
    /// 网关 → 路由器方向的设备
    pub device: LinkId,
}

pub struct Scenario {
    cfg: ScenarioConfig,
    sim: Simulator,
    world: NetWorld,
    topo: Dumbbell,
    flows: Vec<Flow>,
    sink: usize,
    stop_at: SimTime,
}

impl Scenario {
    /// 搭建完整实验并封闭观测者注册。任何配置问题都在第一个事件执行之前返回。
    pub fn build(cfg: ScenarioConfig, streams: Box<dyn StreamFactory>) -> Result<Self> {
        cfg.validate()?;

        let mut world = NetWorld::new(Network::with_tracer(Tracer::new(streams)));
        let mut sim = Simulator::default();
        let topo = build_dumbbell(&mut world.net, &cfg.topology())?;

        let stop_at = SimTime::from_secs_f64(cfg.stop_s());
        let sink = PacketSink::install(
            &mut world.net,
            topo.server,
            cfg.sink_port,
            SimTime::from_secs_f64(cfg.sink_start_s),
            stop_at,
        );

        let remote = SocketAddrV4::new(topo.server_addr(), cfg.sink_port);
        let client_start = SimTime::from_secs_f64(cfg.client_start_s);
        let client_stop = SimTime::from_secs_f64(cfg.client_stop_s());
        let tcp = cfg.tcp();

        let mut flows = Vec::with_capacity(topo.gateways.len());
        for (index, &gateway) in topo.gateways.iter().enumerate() {
            let source = OnOffSource::install(
                &mut world,
                &mut sim,
                gateway,
                &cfg.source,
                tcp.clone(),
                remote,
                client_start,
                client_stop,
                stream_seed(cfg.seed, index as u64),
            )?;
            flows.push(Flow {
                index,
                gateway,
                source,
                socket: world.sources[source].socket,
                device: topo.access_links[index].a_to_b,
            });
        }

        let tracer = &mut world.net.tracer;
        let sel = cfg.traces;
        for flow in &flows {
            if sel.cwnd {
                tracer.attach(Subject::Socket(flow.socket), Metric::Cwnd, flow.index)?;
            }
            if sel.rtt {
                tracer.attach(Subject::Socket(flow.socket), Metric::Rtt, flow.index)?;
            }
            if sel.tx {
                tracer.attach(Subject::Source(flow.source), Metric::Tx, flow.index)?;
            }
            if sel.phytx {
                tracer.attach(Subject::Device(flow.device), Metric::PhyTx, flow.index)?;
            }
        }
        if sel.rx {
            tracer.attach(Subject::Sink(sink), Metric::Rx, 0)?;
        }
        tracer.seal();

        info!(
            gateways = flows.len(),
            server = %topo.server_addr(),
            stop_s = cfg.stop_s(),
            seed = cfg.seed,
            "🏗️ 实验已搭建"
        );
        Ok(Self {
            cfg,
            sim,
            world,
            topo,
            flows,
            sink,
            stop_at,
        })
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.cfg
    }

    pub fn topology(&self) -> &Dumbbell {
        &self.topo
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    pub fn sim(&self) -> &Simulator {
        &self.sim
    }

    pub fn world(&self) -> &NetWorld {
        &self.world
    }

    pub fn stop_at(&self) -> SimTime {
        self.stop_at
    }

    /// 运行到停止时间，关闭全部输出流并汇总结果。
    ///
    /// 调度错误会中止运行；此时仍会尽量把已写出的 trace 落盘。
    pub fn run(&mut self) -> Result<RunReport> {
        info!(until = %self.stop_at, "🚀 开始仿真");

        if let Err(err) = self.sim.run_until(self.stop_at, &mut self.world) {
            error!(%err, now = %self.sim.now(), "仿真中止");
            if let Err(close_err) = self.world.net.tracer.close() {
                error!(%close_err, "中止后关闭 trace 失败");
            }
            return Err(err.into());
        }

        let streams = self.world.net.tracer.close()?;
        let report = self.report(streams);
        info!(
            events = report.events_executed,
            tx_bytes = report.total_tx_bytes(),
            delivered = report.network.delivered_pkts,
            dropped = report.network.dropped_pkts,
            "✅ 仿真完成"
        );
        Ok(report)
    }

    fn report(&self, streams: Vec<(String, u64)>) -> RunReport {
        let net = &self.world.net;
        let flows = self
            .flows
            .iter()
            .map(|flow| {
                let src = &self.world.sources[flow.source];
                let conn = net.tcp.get(flow.socket);
                FlowReport {
                    index: flow.index,
                    gateway: self.topo.gateway_addr(flow.index).unwrap_or(Ipv4Addr::UNSPECIFIED),
                    source: src.stats.clone(),
                    cwnd_bytes: conn.map_or(0, |c| c.cwnd_bytes()),
                    ssthresh_bytes: conn.map_or(0, |c| c.ssthresh_bytes()),
                    last_rtt_s: conn.map_or(0.0, |c| c.last_rtt().as_secs_f64()),
                    bytes_acked: conn.map_or(0, |c| c.bytes_acked()),
                    segments_sent: conn.map_or(0, |c| c.segments_sent),
                    retransmits: conn.map_or(0, |c| c.retransmits),
                    timeouts: conn.map_or(0, |c| c.timeouts),
                }
            })
            .collect();

        RunReport {
            final_time_s: self.sim.now().as_secs_f64(),
            events_executed: self.sim.executed(),
            events_skipped: self.sim.skipped(),
            network: net.stats.clone(),
            sink_rx_bytes: net.sinks.get(self.sink).map_or(0, |s| s.rx_bytes),
            flows,
            streams: streams
                .into_iter()
                .map(|(name, records)| StreamReport { name, records })
                .collect(),
        }
    }
}
