pub mod app;
pub mod error;
pub mod net;
pub mod proto;
pub mod queue;
pub mod scenario;
pub mod sim;
pub mod topo;
pub mod trace;

pub use error::{Error, Result};

#[cfg(test)]
mod test;
