//! 实验配置
//!
//! 所有字段都有默认值，默认即原始实验：10 个网关、360 s、8Mbps/2ms 接入、10Mbps/5ms 服务器链路，
//! 每个网关一个 ON/OFF 源（5096 字节包、8 Mb/s、ON 恒为 1 s、OFF ~ Exp(均值 1 s)）。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::OnOffConfig;
use crate::error::Error;
use crate::net::{AddressPlan, DataRate, LinkProfile};
use crate::proto::tcp::{IP_HEADER_BYTES, TCP_HEADER_BYTES, TcpConfig};
use crate::sim::SimTime;
use crate::topo::dumbbell::DumbbellOpts;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be a finite, non-negative number of seconds, got {value}")]
    BadTime { field: &'static str, value: f64 },
    #[error("{earlier} ({a} s) must not be after {later} ({b} s)")]
    Order {
        earlier: &'static str,
        later: &'static str,
        a: f64,
        b: f64,
    },
    #[error("mtu {0} leaves no room for TCP payload")]
    Mtu(u32),
    #[error("send buffer must hold at least one packet ({needed} bytes), got {got}")]
    SendBuffer { needed: u64, got: u64 },
}

/// 需要输出的 trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSelection {
    pub cwnd: bool,
    pub rtt: bool,
    pub tx: bool,
    pub phytx: bool,
    pub rx: bool,
}

impl Default for TraceSelection {
    fn default() -> Self {
        Self {
            cwnd: true,
            rtt: true,
            tx: true,
            phytx: true,
            rx: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub gateways: usize,
    pub access: LinkProfile,
    pub core: LinkProfile,
    pub addresses: AddressPlan,
    pub mtu: u32,
    pub snd_buf_bytes: u64,
    pub source: OnOffConfig,
    pub sink_port: u16,
    /// 实验时长（秒）；源在此刻停止
    pub sim_time_s: f64,
    pub sink_start_s: f64,
    pub client_start_s: f64,
    /// 源停止时间，缺省为 `sim_time_s`
    pub client_stop_s: Option<f64>,
    /// 仿真停止时间，缺省为 `sim_time_s + 5`
    pub stop_s: Option<f64>,
    pub seed: u64,
    pub traces: TraceSelection,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            gateways: 10,
            access: LinkProfile::new(DataRate::from_mbps(8), SimTime::from_millis(2)),
            core: LinkProfile::new(DataRate::from_mbps(10), SimTime::from_millis(5)),
            addresses: AddressPlan::default(),
            mtu: 1500,
            snd_buf_bytes: 128 * 1024,
            source: OnOffConfig::default(),
            sink_port: 8080,
            sim_time_s: 360.0,
            sink_start_s: 0.1,
            client_start_s: 1.0,
            client_stop_s: None,
            stop_s: None,
            seed: 1,
            traces: TraceSelection::default(),
        }
    }
}

fn check_time(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::BadTime { field, value })
    }
}

fn check_order(earlier: &'static str, a: f64, later: &'static str, b: f64) -> Result<(), ConfigError> {
    if a <= b {
        Ok(())
    } else {
        Err(ConfigError::Order { earlier, later, a, b })
    }
}

impl ScenarioConfig {
    /// 从 JSON 文件读取，未出现的字段取默认值
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = fs::read_to_string(path).map_err(|source| Error::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn client_stop_s(&self) -> f64 {
        self.client_stop_s.unwrap_or(self.sim_time_s)
    }

    pub fn stop_s(&self) -> f64 {
        self.stop_s.unwrap_or(self.sim_time_s + 5.0)
    }

    /// 在任何事件执行前检查配置（拓扑与分布参数的检查在构建/安装时进行）
    pub fn validate(&self) -> Result<(), Error> {
        let sim_time = check_time("sim_time_s", self.sim_time_s)?;
        let sink_start = check_time("sink_start_s", self.sink_start_s)?;
        let client_start = check_time("client_start_s", self.client_start_s)?;
        let client_stop = check_time("client_stop_s", self.client_stop_s())?;
        let stop = check_time("stop_s", self.stop_s())?;
        check_order("client_start_s", client_start, "client_stop_s", client_stop)?;
        check_order("sink_start_s", sink_start, "stop_s", stop)?;
        check_order("sim_time_s", sim_time, "stop_s", stop)?;

        if self.mtu <= IP_HEADER_BYTES + TCP_HEADER_BYTES {
            return Err(ConfigError::Mtu(self.mtu).into());
        }
        let needed = u64::from(self.source.packet_size);
        if self.snd_buf_bytes < needed {
            return Err(ConfigError::SendBuffer {
                needed,
                got: self.snd_buf_bytes,
            }
            .into());
        }
        self.source.validate()?;
        Ok(())
    }

    pub fn tcp(&self) -> TcpConfig {
        TcpConfig {
            snd_buf_bytes: self.snd_buf_bytes,
            ..TcpConfig::for_mtu(self.mtu)
        }
    }

    pub fn topology(&self) -> DumbbellOpts {
        DumbbellOpts {
            gateways: self.gateways,
            access: self.access,
            core: self.core,
            addresses: self.addresses,
        }
    }
}
