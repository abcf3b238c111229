//! 节点类型
//!
//! 节点记录存放在 `Network` 的 arena 中：名字、角色、出向链路与接口地址。
//! 所有角色的转发逻辑相同（按路由表查下一跳），角色只用于拓扑描述与日志。

use std::net::Ipv4Addr;

use serde::Serialize;

use super::id::{LinkId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Gateway,
    Router,
    Server,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// 以该节点为发送端的单向链路
    pub links: Vec<LinkId>,
    /// 接口地址（每条相连的点对点链路一个）
    pub addrs: Vec<Ipv4Addr>,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            links: Vec::new(),
            addrs: Vec::new(),
        }
    }

    /// 第一个接口地址，作为该节点发出数据包的源地址
    pub fn primary_addr(&self) -> Option<Ipv4Addr> {
        self.addrs.first().copied()
    }
}
