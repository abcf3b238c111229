use crate::app::PacketSink;
use crate::net::{AddressPlan, DataRate, LinkProfile, NetWorld, Network, NodeId, NodeKind};
use crate::proto::tcp::{RttEstimator, SocketError, TcpConfig, TcpConnId};
use crate::sim::{SimTime, Simulator};
use crate::trace::{MemoryStreams, Metric, Subject, Tracer};
use std::net::{Ipv4Addr, SocketAddrV4};

const PORT: u16 = 8080;

struct Pair {
    sim: Simulator,
    world: NetWorld,
    client: NodeId,
    server: NodeId,
    server_addr: Ipv4Addr,
    mem: MemoryStreams,
}

/// gw0 <-> server0，10Mb/s、1ms
fn pair(queue_pkts: u64) -> Pair {
    let mem = MemoryStreams::new();
    let mut world = NetWorld::new(Network::with_tracer(Tracer::new(Box::new(mem.clone()))));
    let client = world.net.add_node("gw0", NodeKind::Gateway);
    let server = world.net.add_node("server0", NodeKind::Server);
    let mut profile = LinkProfile::new(DataRate::from_mbps(10), SimTime::from_millis(1));
    profile.queue_pkts = queue_pkts;
    let block = AddressPlan::default().access.block(0).expect("block");
    world.net.connect_p2p(client, server, &profile, block);
    Pair {
        sim: Simulator::default(),
        world,
        client,
        server,
        server_addr: block.b,
        mem,
    }
}

impl Pair {
    fn listen(&mut self, start: SimTime) -> usize {
        PacketSink::install(&mut self.world.net, self.server, PORT, start, SimTime::MAX)
    }

    fn connect(&mut self, cfg: TcpConfig) -> TcpConnId {
        let id = self.world.net.bind_socket(self.client, cfg);
        self.world
            .net
            .connect_socket(id, SocketAddrV4::new(self.server_addr, PORT))
            .expect("connect");
        id
    }

    fn send(&mut self, id: TcpConnId, bytes: u32) -> Result<u32, SocketError> {
        self.world.net.socket_send(id, bytes, &mut self.sim)
    }
}

#[test]
fn mss_is_derived_from_mtu() {
    let cfg = TcpConfig::for_mtu(1500);
    assert_eq!(cfg.mss, 1460);
    assert_eq!(cfg.init_cwnd_bytes, 14_600);
    assert_eq!(TcpConfig::for_mtu(576).mss, 536);
}

#[test]
fn rtt_estimator_follows_rfc6298() {
    let cfg = TcpConfig::default();
    let mut est = RttEstimator::new(&cfg);
    assert_eq!(est.rto(), SimTime::from_secs(1));
    assert_eq!(est.srtt(), None);

    est.update(SimTime::from_millis(100));
    assert_eq!(est.srtt(), Some(SimTime::from_millis(100)));
    // srtt + 4 * rttvar = 100 + 4 * 50
    assert_eq!(est.rto(), SimTime::from_millis(300));

    est.backoff();
    assert_eq!(est.rto(), SimTime::from_millis(600));

    let mut tiny = RttEstimator::new(&cfg);
    tiny.update(SimTime::from_millis(1));
    assert_eq!(tiny.rto(), cfg.min_rto);

    let mut big = RttEstimator::new(&cfg);
    for _ in 0..10 {
        big.backoff();
    }
    assert_eq!(big.rto(), cfg.max_rto);
}

#[test]
fn tcp_transfers_all_bytes_in_order_to_the_listening_sink() {
    let mut p = pair(100);
    let sink = p.listen(SimTime::ZERO);
    let id = p.connect(TcpConfig::for_mtu(1500));

    assert_eq!(p.send(id, 100_000), Ok(100_000));
    p.sim.run(&mut p.world).expect("run");

    let conn = p.world.net.tcp.get(id).expect("conn");
    assert_eq!(conn.bytes_acked(), 100_000);
    assert_eq!(conn.bytes_in_flight(), 0);
    assert_eq!(conn.timeouts, 0);
    assert_eq!(conn.retransmits, 0);
    assert!(conn.cwnd_bytes() > 14_600, "slow start should grow cwnd");
    assert!(conn.last_rtt() > SimTime::from_millis(2));
    assert_eq!(p.world.net.sinks[sink].rx_bytes, 100_000);
    assert_eq!(p.world.net.stats.dropped_pkts, 0);
}

#[test]
fn tcp_recovers_from_queue_drops() {
    let mut p = pair(4);
    let sink = p.listen(SimTime::ZERO);
    let cfg = TcpConfig {
        snd_buf_bytes: 1_000_000,
        ..TcpConfig::for_mtu(1500)
    };
    let id = p.connect(cfg);

    assert_eq!(p.send(id, 300_000), Ok(300_000));
    p.sim.run(&mut p.world).expect("run");

    assert!(p.world.net.stats.dropped_pkts > 0, "expected at least one drop");
    let conn = p.world.net.tcp.get(id).expect("conn");
    assert!(conn.retransmits > 0);
    assert_eq!(conn.bytes_acked(), 300_000);
    assert_eq!(p.world.net.sinks[sink].rx_bytes, 300_000);
}

#[test]
fn socket_write_errors() {
    let mut p = pair(100);
    p.listen(SimTime::ZERO);

    let unconnected = p.world.net.bind_socket(p.client, TcpConfig::default());
    assert_eq!(
        p.send(unconnected, 10),
        Err(SocketError::NotConnected(unconnected))
    );
    assert_eq!(p.send(999, 10), Err(SocketError::UnknownSocket(999)));

    let nowhere = Ipv4Addr::new(192, 0, 2, 1);
    assert_eq!(
        p.world
            .net
            .connect_socket(unconnected, SocketAddrV4::new(nowhere, PORT)),
        Err(SocketError::Unreachable(nowhere))
    );

    let small = TcpConfig {
        snd_buf_bytes: 4_000,
        ..TcpConfig::for_mtu(1500)
    };
    let id = p.connect(small);
    assert_eq!(p.send(id, 3_000), Ok(3_000));
    assert_eq!(
        p.send(id, 2_000),
        Err(SocketError::BufferFull {
            requested: 2_000,
            available: 1_000
        })
    );
    assert_eq!(p.send(id, 1_000), Ok(1_000));
}

#[test]
fn segments_to_a_port_without_listener_are_refused() {
    let mut p = pair(100);
    let id = p.connect(TcpConfig::for_mtu(1500));

    p.send(id, 10_000).expect("send");
    p.sim
        .run_until(SimTime::from_millis(500), &mut p.world)
        .expect("run_until");

    // 10000 B = 6 个满 MSS 段 + 1 个尾段
    assert_eq!(p.world.net.stats.refused_segments, 7);
    let conn = p.world.net.tcp.get(id).expect("conn");
    assert_eq!(conn.bytes_acked(), 0);
    assert_eq!(conn.bytes_in_flight(), 10_000);
}

#[test]
fn sender_retries_after_rto_once_the_sink_starts_listening() {
    let mut p = pair(100);
    let sink = p.listen(SimTime::from_millis(500));
    let id = p.connect(TcpConfig::for_mtu(1500));

    p.send(id, 1_000).expect("send");
    p.sim.run(&mut p.world).expect("run");

    assert_eq!(p.world.net.stats.refused_segments, 1);
    let conn = p.world.net.tcp.get(id).expect("conn");
    assert_eq!(conn.timeouts, 1);
    assert_eq!(conn.bytes_acked(), 1_000);
    assert_eq!(p.world.net.sinks[sink].rx_bytes, 1_000);
}

#[test]
fn cwnd_and_rtt_changes_reach_the_tracer() {
    let mut p = pair(100);
    p.listen(SimTime::ZERO);
    let id = p.connect(TcpConfig::for_mtu(1500));
    {
        let tracer = &mut p.world.net.tracer;
        tracer.attach(Subject::Socket(id), Metric::Cwnd, 0).expect("attach cwnd");
        tracer.attach(Subject::Socket(id), Metric::Rtt, 0).expect("attach rtt");
        tracer.seal();
    }

    p.send(id, 50_000).expect("send");
    p.sim.run(&mut p.world).expect("run");
    let summary = p.world.net.tracer.close().expect("close");
    assert_eq!(summary.len(), 2);

    let cwnd = p.mem.lines("cwnd-0");
    assert!(!cwnd.is_empty());
    let first: Vec<&str> = cwnd[0].split_whitespace().collect();
    assert_eq!(first.len(), 3);
    assert_eq!(first[1], "14600");
    let new: u64 = first[2].parse().expect("cwnd");
    assert!(new > 14_600);

    let rtt = p.mem.lines("rtt-0");
    assert_eq!(rtt[0], "0.0 0");
    assert!(rtt.len() > 1);
    let sample: f64 = rtt[1]
        .split_whitespace()
        .nth(1)
        .expect("rtt column")
        .parse()
        .expect("rtt value");
    assert!(sample > 0.002 && sample < 0.01, "rtt sample {sample}");
    assert_eq!(
        rtt.iter().filter(|l| l.starts_with("0.0 ")).count(),
        1,
        "baseline is written once"
    );
}
