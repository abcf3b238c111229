use crate::net::LinkId;
use crate::sim::SimTime;
use crate::trace::{Hook, MemoryStreams, Metric, StreamFactory, Subject, TraceError, Tracer};
use std::io::{self, Write};
use std::net::Ipv4Addr;

fn tracer() -> (Tracer, MemoryStreams) {
    let mem = MemoryStreams::new();
    (Tracer::new(Box::new(mem.clone())), mem)
}

#[test]
fn stream_names_follow_metric_and_flow_index() {
    assert_eq!(Metric::Cwnd.stream_name(3), "cwnd-3");
    assert_eq!(Metric::Rtt.stream_name(0), "rtt-0");
    assert_eq!(Metric::Tx.stream_name(9), "tx-9");
    assert_eq!(Metric::PhyTx.stream_name(1), "phytx-1");
    assert_eq!(Metric::Rx.stream_name(7), "rx");
}

#[test]
fn cwnd_tx_and_phytx_lines_are_formatted() {
    let (mut t, mem) = tracer();
    t.attach(Subject::Socket(4), Metric::Cwnd, 2).expect("cwnd");
    t.attach(Subject::Source(2), Metric::Tx, 2).expect("tx");
    t.attach(Subject::Device(LinkId(5)), Metric::PhyTx, 2).expect("phytx");
    t.seal();

    let now = SimTime::from_millis(1_500);
    t.fire(now, Subject::Socket(4), Hook::CwndChange { old: 14_600, new: 16_060 });
    t.fire(now, Subject::Source(2), Hook::PacketTx { bytes: 5096 });
    t.fire(SimTime::from_secs(2), Subject::Device(LinkId(5)), Hook::PhyTxBegin { bytes: 1500 });
    t.close().expect("close");

    assert_eq!(mem.lines("cwnd-2"), vec!["1.5 14600 16060"]);
    assert_eq!(mem.lines("tx-2"), vec!["1.5 5096"]);
    assert_eq!(mem.lines("phytx-2"), vec!["2 1500"]);
}

#[test]
fn rtt_stream_starts_with_a_single_baseline_line() {
    let (mut t, mem) = tracer();
    t.attach(Subject::Socket(0), Metric::Rtt, 0).expect("rtt");
    t.seal();

    t.fire(
        SimTime::from_millis(1_500),
        Subject::Socket(0),
        Hook::RttUpdate {
            old: SimTime::ZERO,
            new: SimTime::from_millis(3),
        },
    );
    t.fire(
        SimTime::from_secs(2),
        Subject::Socket(0),
        Hook::RttUpdate {
            old: SimTime::from_millis(3),
            new: SimTime::from_millis(4),
        },
    );
    let summary = t.close().expect("close");

    assert_eq!(mem.lines("rtt-0"), vec!["0.0 0", "1.5 0.003", "2 0.004"]);
    assert_eq!(summary, vec![("rtt-0".to_string(), 3)]);
}

#[test]
fn rx_stream_is_shared_and_prefixed_with_the_source_address() {
    let (mut t, mem) = tracer();
    let a = t.attach(Subject::Sink(0), Metric::Rx, 0).expect("rx");
    let b = t.attach(Subject::Sink(1), Metric::Rx, 1).expect("rx");
    assert_eq!(a, b, "rx is a single stream");
    t.seal();

    t.fire(
        SimTime::from_secs(2),
        Subject::Sink(0),
        Hook::PacketRx {
            bytes: 1460,
            from: Ipv4Addr::new(10, 1, 0, 1),
        },
    );
    t.fire(
        SimTime::from_millis(2_250),
        Subject::Sink(1),
        Hook::PacketRx {
            bytes: 536,
            from: Ipv4Addr::new(10, 1, 3, 1),
        },
    );
    t.close().expect("close");

    assert_eq!(mem.names(), vec!["rx"]);
    assert_eq!(
        mem.lines("rx"),
        vec!["10.1.0.1 2 1460", "10.1.3.1 2.25 536"]
    );
}

#[test]
fn unobserved_subjects_and_foreign_hooks_write_nothing() {
    let (mut t, mem) = tracer();
    t.attach(Subject::Socket(0), Metric::Cwnd, 0).expect("cwnd");
    t.seal();
    assert!(t.is_observed(Subject::Socket(0)));
    assert!(!t.is_observed(Subject::Socket(1)));

    t.fire(SimTime::ZERO, Subject::Socket(1), Hook::CwndChange { old: 1, new: 2 });
    // 同一对象上的其它指标
    t.fire(
        SimTime::ZERO,
        Subject::Socket(0),
        Hook::RttUpdate {
            old: SimTime::ZERO,
            new: SimTime::ZERO,
        },
    );
    t.close().expect("close");
    assert!(mem.lines("cwnd-0").is_empty());
}

#[test]
fn attach_is_rejected_after_seal_or_for_the_wrong_subject() {
    let (mut t, _mem) = tracer();
    assert!(matches!(
        t.attach(Subject::Source(0), Metric::Cwnd, 0),
        Err(TraceError::SubjectMismatch {
            metric: Metric::Cwnd,
            ..
        })
    ));
    assert!(matches!(
        t.attach(Subject::Sink(0), Metric::PhyTx, 0),
        Err(TraceError::SubjectMismatch { .. })
    ));

    t.seal();
    assert!(t.is_sealed());
    assert!(matches!(
        t.attach(Subject::Socket(0), Metric::Cwnd, 0),
        Err(TraceError::LateAttach {
            metric: Metric::Cwnd
        })
    ));

    let mut bare = Tracer::default();
    assert!(matches!(
        bare.attach(Subject::Socket(0), Metric::Cwnd, 0),
        Err(TraceError::NoSink)
    ));
}

struct Broken;

impl Write for Broken {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct BrokenStreams;

impl StreamFactory for BrokenStreams {
    fn open(&mut self, _name: &str) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(Broken))
    }
}

struct NoOpen;

impl StreamFactory for NoOpen {
    fn open(&mut self, _name: &str) -> io::Result<Box<dyn Write + Send>> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    }
}

#[test]
fn write_failures_surface_when_streams_are_closed() {
    let mut t = Tracer::new(Box::new(BrokenStreams));
    t.attach(Subject::Source(0), Metric::Tx, 0).expect("attach");
    t.seal();
    t.fire(SimTime::ZERO, Subject::Source(0), Hook::PacketTx { bytes: 1 });

    match t.close() {
        Err(TraceError::Write { name, .. }) => assert_eq!(name, "tx-0"),
        other => panic!("expected write error, got {other:?}"),
    }
}

#[test]
fn open_failures_are_reported_at_attach() {
    let mut t = Tracer::new(Box::new(NoOpen));
    match t.attach(Subject::Source(0), Metric::Tx, 0) {
        Err(TraceError::Open { name, source }) => {
            assert_eq!(name, "tx-0");
            assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
        }
        other => panic!("expected open error, got {other:?}"),
    }
}
