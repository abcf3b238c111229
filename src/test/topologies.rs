use crate::net::{AddressError, DataRate, DeliverPacket, LinkProfile, NetWorld, NodeKind};
use crate::sim::{SimTime, Simulator};
use crate::topo::dumbbell::{DumbbellOpts, TopologyError, build_dumbbell};
use std::collections::HashSet;
use std::net::Ipv4Addr;

fn opts(gateways: usize) -> DumbbellOpts {
    DumbbellOpts {
        gateways,
        access: LinkProfile::new(DataRate::from_mbps(8), SimTime::from_millis(2)),
        core: LinkProfile::new(DataRate::from_mbps(10), SimTime::from_millis(5)),
        addresses: Default::default(),
    }
}

#[test]
fn dumbbell_has_expected_nodes_links_and_addresses() {
    let mut world = NetWorld::default();
    let topo = build_dumbbell(&mut world.net, &opts(10)).expect("build");
    let net = &world.net;

    assert_eq!(topo.gateways.len(), 10);
    assert_eq!(net.nodes().len(), 12);
    // 11 条点对点链路，每条两个方向
    assert_eq!(net.links().len(), 22);
    assert_eq!(net.node(topo.router).kind, NodeKind::Router);
    assert_eq!(net.node(topo.server).kind, NodeKind::Server);
    assert_eq!(net.node(topo.gateways[4]).name, "gw4");

    for (i, link) in topo.access_links.iter().enumerate() {
        assert_eq!(link.a, topo.gateways[i]);
        assert_eq!(link.b, topo.router);
        assert_eq!(net.link(link.a_to_b).from, topo.gateways[i]);
        assert_eq!(net.link(link.a_to_b).to, topo.router);
        assert_eq!(
            topo.gateway_addr(i),
            Some(Ipv4Addr::new(10, 1, i as u8, 1))
        );
    }
    assert_eq!(topo.server_addr(), Ipv4Addr::new(10, 2, 1, 2));
    assert_eq!(net.resolve(topo.server_addr()), Some(topo.server));

    let all: Vec<Ipv4Addr> = net.nodes().iter().flat_map(|n| n.addrs.iter().copied()).collect();
    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(all.len(), 22);
    assert_eq!(unique.len(), all.len(), "addresses must be unique");
    assert_eq!(net.node(topo.router).addrs.len(), 11);
}

#[test]
fn every_gateway_reaches_the_server_through_the_router() {
    let mut world = NetWorld::default();
    let topo = build_dumbbell(&mut world.net, &opts(10)).expect("build");
    let routes = world.net.populate_routes();

    for &gw in &topo.gateways {
        assert_eq!(
            routes.path(gw, topo.server),
            Some(vec![gw, topo.router, topo.server])
        );
        assert_eq!(
            routes.path(topo.server, gw),
            Some(vec![topo.server, topo.router, gw])
        );
    }
    assert!(routes.ambiguous().is_empty());
    topo.verify_tree(&mut world.net).expect("tree");
}

#[test]
fn dumbbell_delivers_a_packet_end_to_end_with_link_timing() {
    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    let topo = build_dumbbell(&mut world.net, &opts(4)).expect("build");

    let gw = topo.gateways[3];
    let pkt = world.net.make_packet(1, 100, gw, topo.server);
    assert_eq!(pkt.src_addr, Ipv4Addr::new(10, 1, 3, 1));
    assert_eq!(pkt.dst_addr, topo.server_addr());

    sim.schedule(SimTime::ZERO, DeliverPacket { to: gw, pkt });
    sim.run(&mut world).expect("run");

    assert_eq!(world.net.stats.dropped_pkts, 0);
    assert_eq!(world.net.stats.delivered_pkts, 1);
    // 100 B @ 8Mb/s = 100us，+2ms；100 B @ 10Mb/s = 80us，+5ms
    assert_eq!(sim.now(), SimTime(7_180_000));
    assert_eq!(world.net.link(topo.access_links[3].a_to_b).tx_pkts, 1);
    assert_eq!(world.net.link(topo.core_link.a_to_b).tx_pkts, 1);
}

#[test]
fn dumbbell_rejects_bad_sizes() {
    let mut world = NetWorld::default();
    assert_eq!(
        build_dumbbell(&mut world.net, &opts(0)).err(),
        Some(TopologyError::NoGateways)
    );
    assert!(matches!(
        build_dumbbell(&mut world.net, &opts(300)),
        Err(TopologyError::Address(AddressError::PoolExhausted { .. }))
    ));
}

#[test]
fn queue_overflow_on_the_access_link_is_counted_as_drops() {
    let mut sim = Simulator::default();
    let mut world = NetWorld::default();
    let mut o = opts(1);
    o.access.queue_pkts = 2;
    let topo = build_dumbbell(&mut world.net, &o).expect("build");

    let gw = topo.gateways[0];
    for i in 0..6 {
        let pkt = world.net.make_packet(i, 1000, gw, topo.server);
        world.net.forward_from(gw, pkt, &mut sim);
    }
    // 1 个正在发送 + 2 个排队，其余尾丢弃
    assert_eq!(world.net.stats.dropped_pkts, 3);
    assert_eq!(world.net.stats.dropped_bytes, 3000);

    sim.run(&mut world).expect("run");
    assert_eq!(world.net.stats.delivered_pkts, 3);
}
