//! 随机变量
//!
//! 用于 ON/OFF 源的时长分布。每个源持有独立的 PRNG 流，
//! 种子由全局种子与源编号混合得到，保证固定种子下结果可复现。

use std::fmt;
use std::str::FromStr;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp, Uniform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::SimTime;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistError {
    #[error("constant duration must be finite and > 0, got {0}")]
    BadConstant(f64),
    #[error("exponential mean must be finite and > 0, got {0}")]
    BadMean(f64),
    #[error("uniform range must satisfy 0 <= min < max, got [{min}, {max})")]
    BadRange { min: f64, max: f64 },
    #[error("cannot parse distribution {0:?} (expected constant:S, exp:MEAN or uniform:MIN:MAX)")]
    Parse(String),
}

/// 时长分布（单位：秒）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeDist {
    Constant { secs: f64 },
    Exponential { mean: f64 },
    Uniform { min: f64, max: f64 },
}

impl TimeDist {
    /// 退化分布（零/负均值、空区间、非有限值）在安装时即拒绝。
    pub fn validate(&self) -> Result<(), DistError> {
        match *self {
            TimeDist::Constant { secs } if !(secs.is_finite() && secs > 0.0) => {
                Err(DistError::BadConstant(secs))
            }
            TimeDist::Exponential { mean } if !(mean.is_finite() && mean > 0.0) => {
                Err(DistError::BadMean(mean))
            }
            TimeDist::Uniform { min, max }
                if !(min.is_finite() && max.is_finite() && min >= 0.0 && min < max) =>
            {
                Err(DistError::BadRange { min, max })
            }
            _ => Ok(()),
        }
    }

    pub fn mean_secs(&self) -> f64 {
        match *self {
            TimeDist::Constant { secs } => secs,
            TimeDist::Exponential { mean } => mean,
            TimeDist::Uniform { min, max } => (min + max) / 2.0,
        }
    }
}

impl fmt::Display for TimeDist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeDist::Constant { secs } => write!(f, "constant:{secs}"),
            TimeDist::Exponential { mean } => write!(f, "exp:{mean}"),
            TimeDist::Uniform { min, max } => write!(f, "uniform:{min}:{max}"),
        }
    }
}

impl FromStr for TimeDist {
    type Err = DistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || DistError::Parse(s.to_string());
        let mut parts = s.trim().split(':');
        let kind = parts.next().ok_or_else(parse_err)?;
        let nums = parts
            .map(|p| p.trim().parse::<f64>().map_err(|_| parse_err()))
            .collect::<Result<Vec<_>, _>>()?;
        let dist = match (kind, nums.as_slice()) {
            ("constant" | "const", [secs]) => TimeDist::Constant { secs: *secs },
            ("exp" | "exponential", [mean]) => TimeDist::Exponential { mean: *mean },
            ("uniform", [min, max]) => TimeDist::Uniform {
                min: *min,
                max: *max,
            },
            _ => return Err(parse_err()),
        };
        dist.validate()?;
        Ok(dist)
    }
}

#[derive(Debug, Clone)]
enum Prepared {
    Constant(f64),
    Exp(Exp<f64>),
    Uniform(Uniform<f64>),
}

/// 绑定了独立 PRNG 流的采样器
#[derive(Debug, Clone)]
pub struct Sampler {
    dist: TimeDist,
    prepared: Prepared,
    rng: StdRng,
}

impl Sampler {
    pub fn new(dist: TimeDist, seed: u64) -> Result<Self, DistError> {
        dist.validate()?;
        let prepared = match dist {
            TimeDist::Constant { secs } => Prepared::Constant(secs),
            TimeDist::Exponential { mean } => {
                Prepared::Exp(Exp::new(1.0 / mean).map_err(|_| DistError::BadMean(mean))?)
            }
            TimeDist::Uniform { min, max } => Prepared::Uniform(Uniform::new(min, max)),
        };
        Ok(Self {
            dist,
            prepared,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn dist(&self) -> TimeDist {
        self.dist
    }

    pub fn sample_secs(&mut self) -> f64 {
        match &self.prepared {
            Prepared::Constant(secs) => *secs,
            Prepared::Exp(exp) => exp.sample(&mut self.rng),
            Prepared::Uniform(u) => u.sample(&mut self.rng),
        }
    }

    pub fn sample(&mut self) -> SimTime {
        SimTime::from_secs_f64(self.sample_secs())
    }
}

/// 为第 `index` 个流派生种子（splitmix64），不同流之间互不相关。
pub fn stream_seed(base: u64, index: u64) -> u64 {
    let mut z = base ^ index.wrapping_add(1).wrapping_mul(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
