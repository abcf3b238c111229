//! Transport-layer tags carried by packets.

/// Packet transport metadata.
///
/// `Packet` is a network-layer carrier; the tag lets the TCP stack pick up its
/// segments on delivery without the network knowing protocol details.
#[derive(Debug, Clone, Default)]
pub enum Transport {
    #[default]
    None,
    Tcp(TcpSegment),
}

/// TCP segment (minimal fields for simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpSegment {
    /// Data segment: `seq` is byte sequence number, `len` is payload bytes.
    Data { seq: u64, len: u32 },
    /// Cumulative ACK: `ack` is the next expected byte.
    Ack { ack: u64 },
}
