//! TCP（简化版）协议实现
//!
//! 目标：支持 ON/OFF 源驱动的 dumbbell 实验所需的最小功能：
//! - 应用写入有界发送缓冲区，按 MSS 切段、受 cwnd 限制发送
//! - Reno 风格拥塞控制（慢启动 + AIMD），3 dupACK 快速重传 + NewReno 部分确认
//! - RFC 6298 RTT 估计（Karn 规则：重传段不采样），单一 RTO 定时器，指数退避，超时后 go-back-N
//! - 接收端乱序缓存 + 累计 ACK
//!
//! 注意：这是仿真用途的“极简 TCP”，不实现握手/窗口通告/选择确认等，
//! connect 之后即视为连接已建立。
//!
//! 每次 cwnd 变化与每个 RTT 样本都会同步触发 trace 钩子。

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};

use thiserror::Error;
use tracing::{debug, trace};

use crate::net::{NetWorld, Network, NodeId, TcpSegment, Transport};
use crate::sim::{Event, EventId, SimTime, Simulator, World, world_mut};
use crate::trace::{Hook, Subject};

/// 一个 TCP 连接的唯一标识（复用 `flow_id` 的语义）。
pub type TcpConnId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketError {
    #[error("unknown socket {0}")]
    UnknownSocket(TcpConnId),
    #[error("socket {0} is not connected")]
    NotConnected(TcpConnId),
    #[error("no node owns address {0}")]
    Unreachable(Ipv4Addr),
    #[error("send buffer full: {requested} bytes requested, {available} available")]
    BufferFull { requested: u32, available: u64 },
}

#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// MSS（数据段载荷大小，字节）
    pub mss: u32,
    /// IP + TCP 头大小（字节），数据段线上大小 = 载荷 + 头
    pub header_bytes: u32,
    /// ACK 包大小（字节）
    pub ack_bytes: u32,
    /// 初始 cwnd（字节）
    pub init_cwnd_bytes: u64,
    /// 初始 ssthresh（字节）
    pub init_ssthresh_bytes: u64,
    /// 初始 RTO
    pub init_rto: SimTime,
    pub min_rto: SimTime,
    /// 最大 RTO（用于退避上限）
    pub max_rto: SimTime,
    /// 发送缓冲区（字节）：已写入但未被确认的数据不得超过它
    pub snd_buf_bytes: u64,
    pub dupack_threshold: u32,
}

pub const IP_HEADER_BYTES: u32 = 20;
pub const TCP_HEADER_BYTES: u32 = 20;

impl TcpConfig {
    /// MSS = MTU - IP 头 - TCP 头
    pub fn for_mtu(mtu: u32) -> Self {
        let header = IP_HEADER_BYTES + TCP_HEADER_BYTES;
        let mss = mtu.saturating_sub(header).max(1);
        Self {
            mss,
            header_bytes: header,
            ack_bytes: header,
            init_cwnd_bytes: u64::from(mss).saturating_mul(10),
            init_ssthresh_bytes: u64::from(u32::MAX),
            ..Self::default()
        }
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        let mss = 1460;
        Self {
            mss,
            header_bytes: IP_HEADER_BYTES + TCP_HEADER_BYTES,
            ack_bytes: IP_HEADER_BYTES + TCP_HEADER_BYTES,
            init_cwnd_bytes: (mss as u64).saturating_mul(10),
            init_ssthresh_bytes: u64::from(u32::MAX),
            init_rto: SimTime::from_secs(1),
            min_rto: SimTime::from_millis(200),
            max_rto: SimTime::from_secs(60),
            snd_buf_bytes: 128 * 1024,
            dupack_threshold: 3,
        }
    }
}

/// RFC 6298 RTT 估计器
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: Option<SimTime>,
    rttvar: SimTime,
    rto: SimTime,
    min_rto: SimTime,
    max_rto: SimTime,
}

impl RttEstimator {
    const GRANULARITY: SimTime = SimTime(1_000_000);

    pub fn new(cfg: &TcpConfig) -> Self {
        Self {
            srtt: None,
            rttvar: SimTime::ZERO,
            rto: cfg.init_rto,
            min_rto: cfg.min_rto,
            max_rto: cfg.max_rto,
        }
    }

    pub fn update(&mut self, sample: SimTime) {
        match self.srtt {
            None => {
                self.srtt = Some(sample);
                self.rttvar = SimTime(sample.0 / 2);
            }
            Some(srtt) => {
                let err = srtt.0.abs_diff(sample.0);
                self.rttvar = SimTime((3 * self.rttvar.0 + err) / 4);
                self.srtt = Some(SimTime((7 * srtt.0 + sample.0) / 8));
            }
        }
        let srtt = self.srtt.unwrap_or(sample);
        let var = self.rttvar.0.saturating_mul(4).max(Self::GRANULARITY.0);
        self.rto = SimTime(srtt.0.saturating_add(var)).max(self.min_rto).min(self.max_rto);
    }

    pub fn backoff(&mut self) {
        self.rto = SimTime(self.rto.0.saturating_mul(2)).min(self.max_rto);
    }

    pub fn rto(&self) -> SimTime {
        self.rto
    }

    pub fn srtt(&self) -> Option<SimTime> {
        self.srtt
    }
}

#[derive(Debug, Clone)]
struct SentSeg {
    len: u32,
    sent_at: SimTime,
    retrans: bool,
}

#[derive(Debug, Clone)]
pub struct TcpConn {
    pub id: TcpConnId,
    pub local: NodeId,
    pub remote: Option<NodeId>,
    pub remote_port: u16,
    pub cfg: TcpConfig,

    // sender
    app_bytes: u64,
    next_seq: u64,
    high_tx: u64,
    last_acked: u64,
    cwnd_bytes: u64,
    ssthresh_bytes: u64,
    dup_acks: u32,
    in_recovery: bool,
    recover: u64,
    inflight: BTreeMap<u64, SentSeg>, // seq -> segment
    rtt: RttEstimator,
    last_rtt: SimTime,
    rto_timer: Option<EventId>,

    // receiver
    rcv_nxt: u64,
    ooo: BTreeMap<u64, u32>,

    // stats
    pub segments_sent: u64,
    pub retransmits: u64,
    pub timeouts: u64,
}

impl TcpConn {
    pub fn new(id: TcpConnId, local: NodeId, cfg: TcpConfig) -> Self {
        let cwnd = cfg.init_cwnd_bytes.max(cfg.mss as u64);
        let ssthresh = cfg.init_ssthresh_bytes.max(cfg.mss as u64);
        Self {
            id,
            local,
            remote: None,
            remote_port: 0,
            rtt: RttEstimator::new(&cfg),
            cfg,
            app_bytes: 0,
            next_seq: 0,
            high_tx: 0,
            last_acked: 0,
            cwnd_bytes: cwnd,
            ssthresh_bytes: ssthresh,
            dup_acks: 0,
            in_recovery: false,
            recover: 0,
            inflight: BTreeMap::new(),
            last_rtt: SimTime::ZERO,
            rto_timer: None,
            rcv_nxt: 0,
            ooo: BTreeMap::new(),
            segments_sent: 0,
            retransmits: 0,
            timeouts: 0,
        }
    }

    pub fn cwnd_bytes(&self) -> u64 {
        self.cwnd_bytes
    }

    pub fn ssthresh_bytes(&self) -> u64 {
        self.ssthresh_bytes
    }

    /// 最近一次 RTT 样本（尚无样本时为 0）
    pub fn last_rtt(&self) -> SimTime {
        self.last_rtt
    }

    pub fn rto(&self) -> SimTime {
        self.rtt.rto()
    }

    /// 应用累计写入的字节数
    pub fn bytes_written(&self) -> u64 {
        self.app_bytes
    }

    pub fn bytes_acked(&self) -> u64 {
        self.last_acked
    }

    /// 接收端按序收到的字节数
    pub fn bytes_received(&self) -> u64 {
        self.rcv_nxt
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.next_seq.saturating_sub(self.last_acked)
    }

    /// 发送缓冲区剩余空间
    pub fn send_buffer_available(&self) -> u64 {
        let used = self.app_bytes.saturating_sub(self.last_acked);
        self.cfg.snd_buf_bytes.saturating_sub(used)
    }

    pub fn is_connected(&self) -> bool {
        self.remote.is_some()
    }

    fn set_cwnd(&mut self, new: u64, now: SimTime, net: &mut Network) {
        let new = new.max(self.cfg.mss as u64);
        let old = self.cwnd_bytes;
        if old == new {
            return;
        }
        self.cwnd_bytes = new;
        trace!(conn_id = self.id, old, new, "cwnd 变化");
        net.tracer
            .fire(now, Subject::Socket(self.id), Hook::CwndChange { old, new });
    }

    fn on_rtt_sample(&mut self, sample: SimTime, now: SimTime, net: &mut Network) {
        let old = self.last_rtt;
        self.last_rtt = sample;
        self.rtt.update(sample);
        net.tracer.fire(
            now,
            Subject::Socket(self.id),
            Hook::RttUpdate { old, new: sample },
        );
    }

    fn restart_rto(&mut self, sim: &mut Simulator) {
        self.cancel_rto(sim);
        let id = sim.schedule_in(self.rtt.rto(), TcpRto { conn_id: self.id });
        self.rto_timer = Some(id);
    }

    fn cancel_rto(&mut self, sim: &mut Simulator) {
        if let Some(t) = self.rto_timer.take() {
            sim.cancel(t);
        }
    }

    /// 发出一个数据段
    fn transmit(&mut self, seq: u64, len: u32, sim: &mut Simulator, net: &mut Network) {
        let Some(remote) = self.remote else {
            return;
        };
        let now = sim.now();
        let retrans = seq < self.high_tx;
        self.inflight.insert(
            seq,
            SentSeg {
                len,
                sent_at: now,
                retrans,
            },
        );
        self.segments_sent += 1;
        if retrans {
            self.retransmits += 1;
        }
        self.high_tx = self.high_tx.max(seq.saturating_add(len as u64));

        let pkt = net
            .make_packet(self.id, len + self.cfg.header_bytes, self.local, remote)
            .with_transport(Transport::Tcp(TcpSegment::Data { seq, len }));
        trace!(conn_id = self.id, seq, len, retrans, "发送数据段");
        net.forward_from(self.local, pkt, sim);

        if self.rto_timer.is_none() {
            self.restart_rto(sim);
        }
    }

    /// 重传最早未确认段
    fn retransmit_head(&mut self, sim: &mut Simulator, net: &mut Network) {
        let seq = self.last_acked;
        let len = match self.inflight.get(&seq) {
            Some(s) => s.len,
            None => (self.cfg.mss as u64).min(self.high_tx.saturating_sub(seq)) as u32,
        };
        if len > 0 {
            self.transmit(seq, len, sim, net);
        }
    }

    /// 在 cwnd 与待发数据允许的范围内尽量发送
    fn send_data_if_possible(&mut self, sim: &mut Simulator, net: &mut Network) {
        if self.remote.is_none() {
            return;
        }
        while self.next_seq < self.app_bytes {
            let len = (self.cfg.mss as u64).min(self.app_bytes - self.next_seq);
            if self.bytes_in_flight().saturating_add(len) > self.cwnd_bytes {
                break;
            }
            let seq = self.next_seq;
            self.next_seq += len;
            self.transmit(seq, len as u32, sim, net);
        }
    }

    fn on_ack(&mut self, ack: u64, sim: &mut Simulator, net: &mut Network) {
        let now = sim.now();
        let mss = self.cfg.mss as u64;

        if ack > self.last_acked && ack <= self.high_tx {
            let newly_acked = ack - self.last_acked;
            self.last_acked = ack;
            self.dup_acks = 0;
            if self.next_seq < ack {
                self.next_seq = ack;
            }

            // 移除已确认段，取最后一个非重传段做 RTT 样本
            let mut sample = None;
            while let Some((&s, seg)) = self.inflight.first_key_value() {
                if s.saturating_add(seg.len as u64) > ack {
                    break;
                }
                if !seg.retrans {
                    sample = Some(now.saturating_sub(seg.sent_at));
                }
                self.inflight.remove(&s);
            }
            if let Some(rtt) = sample {
                self.on_rtt_sample(rtt, now, net);
            }

            if self.in_recovery {
                if ack >= self.recover {
                    self.in_recovery = false;
                    self.set_cwnd(self.ssthresh_bytes, now, net);
                } else {
                    // 部分确认：继续重传下一个缺口，收缩窗口
                    self.retransmit_head(sim, net);
                    let deflated = self.cwnd_bytes.saturating_sub(newly_acked).saturating_add(mss);
                    self.set_cwnd(deflated, now, net);
                }
            } else if self.cwnd_bytes < self.ssthresh_bytes {
                self.set_cwnd(self.cwnd_bytes.saturating_add(newly_acked), now, net);
            } else {
                // AIMD：每个 ACK 让 cwnd 以 mss^2/cwnd 增长（至少 +1）
                let inc = (mss.saturating_mul(mss) / self.cwnd_bytes).max(1);
                self.set_cwnd(self.cwnd_bytes.saturating_add(inc), now, net);
            }

            if self.bytes_in_flight() > 0 {
                self.restart_rto(sim);
            } else {
                self.cancel_rto(sim);
            }
            self.send_data_if_possible(sim, net);
        } else if ack == self.last_acked && self.bytes_in_flight() > 0 {
            self.dup_acks = self.dup_acks.saturating_add(1);
            let dup = self.dup_acks;
            let thresh = self.cfg.dupack_threshold;
            if dup == thresh && !self.in_recovery {
                debug!(conn_id = self.id, seq = self.last_acked, "快速重传");
                self.ssthresh_bytes = (self.bytes_in_flight() / 2).max(2 * mss);
                self.in_recovery = true;
                self.recover = self.high_tx;
                self.retransmit_head(sim, net);
                self.set_cwnd(self.ssthresh_bytes.saturating_add(3 * mss), now, net);
            } else if dup > thresh && self.in_recovery {
                // 快速恢复：每个额外 dupACK 增加 cwnd 一个 MSS
                self.set_cwnd(self.cwnd_bytes.saturating_add(mss), now, net);
                self.send_data_if_possible(sim, net);
            }
        }
    }

    fn on_timeout(&mut self, sim: &mut Simulator, net: &mut Network) {
        self.rto_timer = None;
        if self.bytes_in_flight() == 0 {
            return;
        }
        let now = sim.now();
        let mss = self.cfg.mss as u64;
        self.timeouts += 1;
        debug!(conn_id = self.id, seq = self.last_acked, rto = ?self.rtt.rto(), "⏰ RTO 超时");

        // 超时：回到慢启动，从最早未确认处重新发送
        self.ssthresh_bytes = (self.bytes_in_flight() / 2).max(2 * mss);
        self.in_recovery = false;
        self.dup_acks = 0;
        self.rtt.backoff();
        self.inflight.clear();
        self.next_seq = self.last_acked;
        self.set_cwnd(mss, now, net);
        self.send_data_if_possible(sim, net);
        if self.rto_timer.is_none() && self.bytes_in_flight() > 0 {
            self.restart_rto(sim);
        }
    }

    /// 接收端处理数据段，返回需要回送的累计 ACK 与按序交付的字节数
    fn on_data(&mut self, seq: u64, len: u32) -> (u64, u64) {
        let before = self.rcv_nxt;
        let end = seq.saturating_add(len as u64);
        if seq <= self.rcv_nxt && end > self.rcv_nxt {
            self.rcv_nxt = end;
            while let Some((&s, &l)) = self.ooo.first_key_value() {
                if s > self.rcv_nxt {
                    break;
                }
                self.rcv_nxt = self.rcv_nxt.max(s.saturating_add(l as u64));
                self.ooo.remove(&s);
            }
        } else if seq > self.rcv_nxt {
            self.ooo.entry(seq).or_insert(len);
        }
        (self.rcv_nxt, self.rcv_nxt - before)
    }
}

#[derive(Debug, Default)]
pub struct TcpStack {
    conns: BTreeMap<TcpConnId, TcpConn>,
    next_id: TcpConnId,
}

impl TcpStack {
    /// 在 `node` 上创建一个未连接的端点
    pub fn bind(&mut self, node: NodeId, cfg: TcpConfig) -> TcpConnId {
        let id = self.next_id;
        self.next_id += 1;
        self.conns.insert(id, TcpConn::new(id, node, cfg));
        id
    }

    pub fn get(&self, id: TcpConnId) -> Option<&TcpConn> {
        self.conns.get(&id)
    }

    pub fn get_mut(&mut self, id: TcpConnId) -> Option<&mut TcpConn> {
        self.conns.get_mut(&id)
    }

    pub fn conns(&self) -> impl Iterator<Item = &TcpConn> {
        self.conns.values()
    }

    /// 连接到远端 `ip:port`（不握手，立即视为已建立）
    pub fn connect(
        &mut self,
        id: TcpConnId,
        remote: SocketAddrV4,
        net: &Network,
    ) -> Result<(), SocketError> {
        let node = net
            .resolve(*remote.ip())
            .ok_or(SocketError::Unreachable(*remote.ip()))?;
        let conn = self.conns.get_mut(&id).ok_or(SocketError::UnknownSocket(id))?;
        conn.remote = Some(node);
        conn.remote_port = remote.port();
        debug!(conn_id = id, local = ?conn.local, remote = %remote, "TCP 连接建立");
        Ok(())
    }

    /// 应用写入 `bytes` 字节；缓冲区放不下时整体拒绝
    pub fn send(
        &mut self,
        id: TcpConnId,
        bytes: u32,
        sim: &mut Simulator,
        net: &mut Network,
    ) -> Result<u32, SocketError> {
        let conn = self.conns.get_mut(&id).ok_or(SocketError::UnknownSocket(id))?;
        if !conn.is_connected() {
            return Err(SocketError::NotConnected(id));
        }
        let available = conn.send_buffer_available();
        if u64::from(bytes) > available {
            return Err(SocketError::BufferFull {
                requested: bytes,
                available,
            });
        }
        conn.app_bytes += u64::from(bytes);
        conn.send_data_if_possible(sim, net);
        Ok(bytes)
    }

    pub fn on_tcp_segment(
        &mut self,
        conn_id: TcpConnId,
        at: NodeId,
        seg: TcpSegment,
        from: Ipv4Addr,
        sim: &mut Simulator,
        net: &mut Network,
    ) {
        let Some(conn) = self.conns.get_mut(&conn_id) else {
            return;
        };
        match seg {
            TcpSegment::Data { seq, len } => {
                if Some(at) != conn.remote {
                    return;
                }
                let now = sim.now();
                if !net.is_listening(at, conn.remote_port, now) {
                    trace!(conn_id, port = conn.remote_port, "无应用监听，丢弃数据段");
                    net.stats.refused_segments += 1;
                    return;
                }
                let (ack, delivered) = conn.on_data(seq, len);
                if delivered > 0 {
                    let chunk = u32::try_from(delivered).unwrap_or(u32::MAX);
                    net.deliver_to_app(at, conn.remote_port, chunk, from, now);
                }
                let pkt = net
                    .make_packet(conn_id, conn.cfg.ack_bytes, at, conn.local)
                    .with_transport(Transport::Tcp(TcpSegment::Ack { ack }));
                net.forward_from(at, pkt, sim);
            }
            TcpSegment::Ack { ack } => {
                if at != conn.local {
                    return;
                }
                conn.on_ack(ack, sim, net);
            }
        }
    }

    pub(crate) fn on_rto(&mut self, conn_id: TcpConnId, sim: &mut Simulator, net: &mut Network) {
        if let Some(conn) = self.conns.get_mut(&conn_id) {
            conn.on_timeout(sim, net);
        }
    }
}

/// TCP RTO 定时器到期
#[derive(Debug)]
pub struct TcpRto {
    pub conn_id: TcpConnId,
}

impl Event for TcpRto {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let TcpRto { conn_id } = *self;
        let w = world_mut::<NetWorld>(world);
        // 规避同时借用 `w.net` 与 `w.net.tcp`
        let mut tcp = std::mem::take(&mut w.net.tcp);
        tcp.on_rto(conn_id, sim, &mut w.net);
        w.net.tcp = tcp;
    }
}

impl Network {
    /// 在 `node` 上创建 TCP 端点
    pub fn bind_socket(&mut self, node: NodeId, cfg: TcpConfig) -> TcpConnId {
        self.tcp.bind(node, cfg)
    }

    pub fn connect_socket(&mut self, id: TcpConnId, remote: SocketAddrV4) -> Result<(), SocketError> {
        let mut tcp = std::mem::take(&mut self.tcp);
        let r = tcp.connect(id, remote, self);
        self.tcp = tcp;
        r
    }

    /// 应用向端点写入数据
    pub fn socket_send(
        &mut self,
        id: TcpConnId,
        bytes: u32,
        sim: &mut Simulator,
    ) -> Result<u32, SocketError> {
        let mut tcp = std::mem::take(&mut self.tcp);
        let r = tcp.send(id, bytes, sim, self);
        self.tcp = tcp;
        r
    }
}
