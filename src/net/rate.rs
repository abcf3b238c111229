//! 数据速率
//!
//! 接受与实验脚本一致的写法：`8Mbps`、`10Mb/s`、`1Gbps`、`500kbps`、`1200bps`。
//! 以 `B` 结尾的单位（如 `1MBps`、`1MB/s`）按字节计。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::sim::SimTime;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    #[error("cannot parse data rate {0:?}")]
    Parse(String),
    #[error("data rate must be > 0")]
    Zero,
}

/// 比特率（bit/s）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataRate(u64);

impl DataRate {
    pub fn from_bps(bps: u64) -> Self {
        DataRate(bps)
    }

    pub fn from_mbps(mbps: u64) -> Self {
        DataRate(mbps.saturating_mul(1_000_000))
    }

    pub fn bps(self) -> u64 {
        self.0
    }

    /// 以该速率发送 `bits` 比特所需时间，向上取整到纳秒。
    pub fn time_for_bits(self, bits: u64) -> SimTime {
        if self.0 == 0 {
            return SimTime(u64::MAX / 4);
        }
        let nanos = ((bits as u128) * 1_000_000_000u128 + (self.0 as u128 - 1)) / self.0 as u128;
        SimTime(nanos.min(u64::MAX as u128) as u64)
    }

    pub fn time_for_bytes(self, bytes: u32) -> SimTime {
        self.time_for_bits(u64::from(bytes).saturating_mul(8))
    }

    /// `dt` 时间内以该速率能发送的比特数（向下取整）
    pub fn bits_in(self, dt: SimTime) -> u64 {
        ((self.0 as u128 * dt.0 as u128) / 1_000_000_000u128).min(u64::MAX as u128) as u64
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bps = self.0;
        if bps != 0 && bps % 1_000_000_000 == 0 {
            write!(f, "{}Gbps", bps / 1_000_000_000)
        } else if bps != 0 && bps % 1_000_000 == 0 {
            write!(f, "{}Mbps", bps / 1_000_000)
        } else if bps != 0 && bps % 1_000 == 0 {
            write!(f, "{}kbps", bps / 1_000)
        } else {
            write!(f, "{bps}bps")
        }
    }
}

impl FromStr for DataRate {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || RateError::Parse(s.to_string());
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(parse_err)?;
        let (num, unit) = s.split_at(split);
        let value: f64 = num.parse().map_err(|_| parse_err())?;

        let (scale, unit) = match unit.chars().next() {
            Some('k' | 'K') => (1e3, &unit[1..]),
            Some('M') => (1e6, &unit[1..]),
            Some('G') => (1e9, &unit[1..]),
            _ => (1.0, unit),
        };
        let per_unit = match unit {
            "bps" | "b/s" => 1.0,
            "Bps" | "B/s" => 8.0,
            _ => return Err(parse_err()),
        };

        let bps = (value * scale * per_unit).round();
        if !bps.is_finite() || bps < 1.0 {
            return Err(RateError::Zero);
        }
        Ok(DataRate(bps as u64))
    }
}

impl Serialize for DataRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
