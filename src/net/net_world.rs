//! 网络世界实现
//!
//! 持有网络（含传输层与 trace）以及所有 ON/OFF 源。

use super::network::Network;
use crate::app::OnOffSource;
use crate::sim::World;
use std::any::Any;

#[derive(Default)]
pub struct NetWorld {
    pub net: Network,
    pub sources: Vec<OnOffSource>,
}

impl NetWorld {
    pub fn new(net: Network) -> Self {
        Self {
            net,
            sources: Vec::new(),
        }
    }
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
