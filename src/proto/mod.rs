//! 传输层/协议模块
//!
//! 包含一个简化的 TCP 实现（用于仿真实验），对外暴露 cwnd / RTT 钩子。

pub mod tcp;
