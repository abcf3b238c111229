//! 统计信息
//!
//! 定义网络仿真统计数据结构。

use serde::Serialize;

/// 网络统计信息
#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    pub delivered_pkts: u64,
    pub delivered_bytes: u64,
    /// DropTail 丢包
    pub dropped_pkts: u64,
    pub dropped_bytes: u64,
    /// 没有路由可达的包
    pub unroutable_pkts: u64,
    /// 目的端无监听应用而被丢弃的数据段
    pub refused_segments: u64,
}
