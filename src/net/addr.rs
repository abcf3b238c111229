//! 点对点链路地址分配
//!
//! 每条点对点链路从地址池中领取一个独立的地址块，两端分别取块内前两个主机地址。
//! 默认方案与实验脚本一致：第 i 条接入链路为 `10.1.i.0/30`，服务器链路为 `10.2.1.0/30`。

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("link prefix /{link_prefix} leaves no room for two host addresses")]
    BlockTooSmall { link_prefix: u8 },
    #[error("stride /{stride} must lie between pool /{pool} and link /{link}")]
    BadStride { pool: u8, stride: u8, link: u8 },
    #[error("address pool {pool} has no block #{index} (stride /{stride})")]
    PoolExhausted { pool: Ipv4Net, index: usize, stride: u8 },
    #[error("address pools {access} and {core} overlap")]
    Overlap { access: Ipv4Net, core: Ipv4Net },
}

/// 一个地址池：按 `stride` 前缀切块，每块取首个 `/link_prefix` 子网分配给一条链路。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPool {
    pub pool: Ipv4Net,
    pub stride: u8,
    pub link_prefix: u8,
}

impl AddressPool {
    pub fn validate(&self) -> Result<(), AddressError> {
        if self.link_prefix > 30 {
            return Err(AddressError::BlockTooSmall {
                link_prefix: self.link_prefix,
            });
        }
        if self.stride < self.pool.prefix_len() || self.stride > self.link_prefix {
            return Err(AddressError::BadStride {
                pool: self.pool.prefix_len(),
                stride: self.stride,
                link: self.link_prefix,
            });
        }
        Ok(())
    }

    /// 池中可分配的块数
    pub fn capacity(&self) -> usize {
        let bits = u32::from(self.stride.saturating_sub(self.pool.prefix_len()));
        1usize.checked_shl(bits).unwrap_or(usize::MAX)
    }

    /// 第 `index` 条链路的地址块
    pub fn block(&self, index: usize) -> Result<LinkBlock, AddressError> {
        self.validate()?;
        let exhausted = || AddressError::PoolExhausted {
            pool: self.pool,
            index,
            stride: self.stride,
        };
        let stride_net = self
            .pool
            .trunc()
            .subnets(self.stride)
            .map_err(|_| exhausted())?
            .nth(index)
            .ok_or_else(exhausted)?;
        let net = Ipv4Net::new(stride_net.network(), self.link_prefix).map_err(|_| exhausted())?;
        let mut hosts = net.hosts();
        let (Some(a), Some(b)) = (hosts.next(), hosts.next()) else {
            return Err(AddressError::BlockTooSmall {
                link_prefix: self.link_prefix,
            });
        };
        Ok(LinkBlock { net, a, b })
    }
}

/// 分配给一条点对点链路的地址块：`a` 给第一个端点，`b` 给第二个端点。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkBlock {
    pub net: Ipv4Net,
    pub a: Ipv4Addr,
    pub b: Ipv4Addr,
}

/// dumbbell 的地址方案：接入链路池 + 服务器链路池
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPlan {
    pub access: AddressPool,
    pub core: AddressPool,
}

impl Default for AddressPlan {
    fn default() -> Self {
        Self {
            access: AddressPool {
                pool: Ipv4Net::new(Ipv4Addr::new(10, 1, 0, 0), 16).unwrap_or_default(),
                stride: 24,
                link_prefix: 30,
            },
            core: AddressPool {
                pool: Ipv4Net::new(Ipv4Addr::new(10, 2, 1, 0), 24).unwrap_or_default(),
                stride: 24,
                link_prefix: 30,
            },
        }
    }
}

impl AddressPlan {
    /// 检查方案能容纳 `gateways` 条接入链路，且两个池互不重叠。
    pub fn validate(&self, gateways: usize) -> Result<(), AddressError> {
        self.access.validate()?;
        self.core.validate()?;
        if gateways > self.access.capacity() {
            return Err(AddressError::PoolExhausted {
                pool: self.access.pool,
                index: gateways.saturating_sub(1),
                stride: self.access.stride,
            });
        }
        let (a, c) = (self.access.pool.trunc(), self.core.pool.trunc());
        if a.contains(&c) || c.contains(&a) {
            return Err(AddressError::Overlap { access: a, core: c });
        }
        Ok(())
    }
}
