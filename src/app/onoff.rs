//! ON/OFF 流量源
//!
//! 状态机：`IDLE_WAIT -> ACTIVE -> IDLE_WAIT -> ... -> STOPPED`。
//!
//! - 启动事件在 start 时刻连接端点并进入 ACTIVE；
//! - ACTIVE 期间按数据速率逐个调度发包事件（每个包一个事件），ACTIVE 时长从 on 分布采样；
//! - ACTIVE 结束时从 off 分布采样空闲时长，进入 IDLE_WAIT，并在 now + idle 调度下一次 ACTIVE；
//! - 停止事件无论处于哪个阶段都进入 STOPPED，并取消所有自身挂起的事件。
//!
//! 两个 ACTIVE 之间保留“残余比特”：上一段 ACTIVE 里已累积、但不足一个包的发送进度，
//! 下一段 ACTIVE 的第一个包相应提前。

use std::net::SocketAddrV4;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::AppError;
use crate::net::{DataRate, NetWorld, Network, NodeId};
use crate::proto::tcp::{SocketError, TcpConfig, TcpConnId};
use crate::sim::{Event, EventId, Sampler, SimTime, Simulator, TimeDist, World, world_mut};
use crate::trace::{Hook, Subject};

/// ON/OFF 源参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnOffConfig {
    /// 每个应用层包的大小（字节）
    pub packet_size: u32,
    /// ACTIVE 期间的发送速率
    pub data_rate: DataRate,
    pub on_time: TimeDist,
    pub off_time: TimeDist,
    /// 总发送字节上限；达到后源停止
    pub max_bytes: Option<u64>,
}

impl Default for OnOffConfig {
    fn default() -> Self {
        Self {
            packet_size: 5096,
            data_rate: DataRate::from_mbps(8),
            on_time: TimeDist::Constant { secs: 1.0 },
            off_time: TimeDist::Exponential { mean: 1.0 },
            max_bytes: None,
        }
    }
}

impl OnOffConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.packet_size == 0 {
            return Err(AppError::ZeroPacketSize);
        }
        self.on_time.validate()?;
        self.off_time.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    IdleWait,
    Active,
    Stopped,
}

/// 一次状态迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub at: SimTime,
    pub state: SourceState,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    /// 发送缓冲区已满而被拒绝的包
    pub packets_refused: u64,
    pub active_periods: u64,
    pub idle_periods: u64,
}

#[derive(Debug)]
pub struct OnOffSource {
    pub id: usize,
    pub node: NodeId,
    pub socket: TcpConnId,
    pub remote: SocketAddrV4,
    packet_size: u32,
    rate: DataRate,
    on: Sampler,
    off: Sampler,
    max_bytes: Option<u64>,
    start_at: SimTime,
    stop_at: SimTime,

    state: SourceState,
    next_transition: Option<SimTime>,
    residual_bits: u64,
    last_start: SimTime,
    pending_send: Option<EventId>,
    pending_phase: Option<EventId>,

    pub stats: SourceStats,
    history: Vec<PhaseChange>,
}

impl OnOffSource {
    /// 在 `node` 上安装一个源：创建端点，调度启动与停止事件，返回源编号。
    ///
    /// `seed` 决定该源独立的随机流。
    #[allow(clippy::too_many_arguments)]
    pub fn install(
        world: &mut NetWorld,
        sim: &mut Simulator,
        node: NodeId,
        cfg: &OnOffConfig,
        tcp: TcpConfig,
        remote: SocketAddrV4,
        start_at: SimTime,
        stop_at: SimTime,
        seed: u64,
    ) -> Result<usize, AppError> {
        cfg.validate()?;
        if stop_at < start_at {
            return Err(AppError::InvalidWindow {
                start: start_at,
                stop: stop_at,
            });
        }
        if world.net.resolve(*remote.ip()).is_none() {
            return Err(AppError::UnknownRemote(*remote.ip()));
        }
        let on = Sampler::new(cfg.on_time, seed)?;
        let off = Sampler::new(cfg.off_time, seed ^ 0x5DEE_CE66_D1CE_F00D)?;

        let id = world.sources.len();
        let socket = world.net.bind_socket(node, tcp);
        world.sources.push(OnOffSource {
            id,
            node,
            socket,
            remote,
            packet_size: cfg.packet_size,
            rate: cfg.data_rate,
            on,
            off,
            max_bytes: cfg.max_bytes,
            start_at,
            stop_at,
            state: SourceState::IdleWait,
            next_transition: Some(start_at),
            residual_bits: 0,
            last_start: start_at,
            pending_send: None,
            pending_phase: None,
            stats: SourceStats::default(),
            history: Vec::new(),
        });

        let phase = sim.schedule(
            start_at,
            OnOffEvent {
                app: id,
                action: OnOffAction::Start,
            },
        );
        world.sources[id].pending_phase = Some(phase);
        sim.schedule(
            stop_at,
            OnOffEvent {
                app: id,
                action: OnOffAction::Stop,
            },
        );
        debug!(app = id, ?node, socket, %remote, ?start_at, ?stop_at, "安装 ON/OFF 源");
        Ok(id)
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn next_transition(&self) -> Option<SimTime> {
        self.next_transition
    }

    pub fn history(&self) -> &[PhaseChange] {
        &self.history
    }

    pub fn start_at(&self) -> SimTime {
        self.start_at
    }

    pub fn stop_at(&self) -> SimTime {
        self.stop_at
    }

    fn enter(&mut self, state: SourceState, at: SimTime) {
        self.state = state;
        self.history.push(PhaseChange { at, state });
    }

    fn packet_bits(&self) -> u64 {
        u64::from(self.packet_size) * 8
    }

    fn schedule_action(&mut self, sim: &mut Simulator, delay: SimTime, action: OnOffAction) -> EventId {
        sim.schedule_in(delay, OnOffEvent { app: self.id, action })
    }

    fn cancel_pending(&mut self, sim: &mut Simulator) {
        if let Some(e) = self.pending_send.take() {
            sim.cancel(e);
        }
        if let Some(e) = self.pending_phase.take() {
            sim.cancel(e);
        }
    }

    fn handle(&mut self, action: OnOffAction, sim: &mut Simulator, net: &mut Network) {
        if self.state == SourceState::Stopped {
            return;
        }
        match action {
            OnOffAction::Start => {
                self.pending_phase = None;
                if let Err(err) = net.connect_socket(self.socket, self.remote) {
                    warn!(app = self.id, %err, "连接失败，源停止");
                    self.stop(sim);
                    return;
                }
                self.start_sending(sim);
            }
            OnOffAction::StartSending => {
                self.pending_phase = None;
                self.start_sending(sim);
            }
            OnOffAction::SendPacket => {
                self.pending_send = None;
                self.send_packet(sim, net);
            }
            OnOffAction::StopSending => {
                self.pending_phase = None;
                self.stop_sending(sim);
            }
            OnOffAction::Stop => self.stop(sim),
        }
    }

    fn start_sending(&mut self, sim: &mut Simulator) {
        let now = sim.now();
        self.enter(SourceState::Active, now);
        self.stats.active_periods += 1;
        self.last_start = now;
        self.schedule_next_tx(sim);
        if self.state != SourceState::Active {
            return;
        }
        let on = self.on.sample();
        self.next_transition = Some(now.saturating_add(on));
        self.pending_phase = Some(self.schedule_action(sim, on, OnOffAction::StopSending));
        trace!(app = self.id, ?on, "进入 ACTIVE");
    }

    fn stop_sending(&mut self, sim: &mut Simulator) {
        let now = sim.now();
        if let Some(e) = self.pending_send.take() {
            sim.cancel(e);
        }
        let accrued = self.rate.bits_in(now.saturating_sub(self.last_start));
        self.residual_bits = self
            .residual_bits
            .saturating_add(accrued)
            .min(self.packet_bits());

        self.enter(SourceState::IdleWait, now);
        self.stats.idle_periods += 1;
        let off = self.off.sample();
        self.next_transition = Some(now.saturating_add(off));
        self.pending_phase = Some(self.schedule_action(sim, off, OnOffAction::StartSending));
        trace!(app = self.id, ?off, residual_bits = self.residual_bits, "进入 IDLE_WAIT");
    }

    fn stop(&mut self, sim: &mut Simulator) {
        self.cancel_pending(sim);
        self.next_transition = None;
        self.enter(SourceState::Stopped, sim.now());
        info!(
            app = self.id,
            packets = self.stats.packets_sent,
            bytes = self.stats.bytes_sent,
            "ON/OFF 源停止"
        );
    }

    fn schedule_next_tx(&mut self, sim: &mut Simulator) {
        if let Some(max) = self.max_bytes {
            if self.stats.bytes_sent >= max {
                debug!(app = self.id, max, "达到 max_bytes");
                self.stop(sim);
                return;
            }
        }
        let bits = self.packet_bits().saturating_sub(self.residual_bits);
        let gap = self.rate.time_for_bits(bits);
        self.pending_send = Some(self.schedule_action(sim, gap, OnOffAction::SendPacket));
    }

    fn send_packet(&mut self, sim: &mut Simulator, net: &mut Network) {
        let now = sim.now();
        let size = match self.max_bytes {
            Some(max) => {
                let left = max.saturating_sub(self.stats.bytes_sent);
                self.packet_size.min(u32::try_from(left).unwrap_or(u32::MAX))
            }
            None => self.packet_size,
        };
        match net.socket_send(self.socket, size, sim) {
            Ok(sent) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += u64::from(sent);
                net.tracer
                    .fire(now, Subject::Source(self.id), Hook::PacketTx { bytes: sent });
            }
            Err(SocketError::BufferFull { available, .. }) => {
                self.stats.packets_refused += 1;
                trace!(app = self.id, available, "发送缓冲区已满，丢弃应用包");
            }
            Err(err) => warn!(app = self.id, %err, "发送失败"),
        }
        self.residual_bits = 0;
        self.last_start = now;
        self.schedule_next_tx(sim);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnOffAction {
    Start,
    StartSending,
    SendPacket,
    StopSending,
    Stop,
}

/// 事件：驱动第 `app` 个 ON/OFF 源
#[derive(Debug)]
pub struct OnOffEvent {
    pub app: usize,
    pub action: OnOffAction,
}

impl Event for OnOffEvent {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let OnOffEvent { app, action } = *self;
        let NetWorld { net, sources } = world_mut::<NetWorld>(world);
        let Some(src) = sources.get_mut(app) else {
            warn!(app, "未知的 ON/OFF 源");
            return;
        };
        src.handle(action, sim, net);
    }
}
