use crate::net::{NodeId, Packet};
use crate::queue::{DropTailQueue, PacketQueue, QueueLimit};

fn pkt(id: u64, size_bytes: u32) -> Packet {
    Packet::new(id, 0, size_bytes, NodeId(0), NodeId(1))
}

#[test]
fn droptail_packet_limit_drops_arrivals_beyond_capacity() {
    let mut q = DropTailQueue::new(QueueLimit::Packets(2));
    assert_eq!(q.limit(), QueueLimit::Packets(2));
    assert!(q.is_empty());

    assert!(q.enqueue(pkt(1, 1500)).is_ok());
    assert!(q.enqueue(pkt(2, 40)).is_ok());
    let dropped = q.enqueue(pkt(3, 40)).expect_err("should drop");
    assert_eq!(dropped.id, 3);
    assert_eq!(q.len(), 2);
    assert_eq!(q.bytes(), 1540);

    assert_eq!(q.dequeue().expect("pkt").id, 1);
    assert!(q.enqueue(pkt(4, 40)).is_ok(), "room again after dequeue");
    assert_eq!(q.dequeue().expect("pkt").id, 2);
    assert_eq!(q.dequeue().expect("pkt").id, 4);
    assert!(q.dequeue().is_none());
    assert_eq!(q.bytes(), 0);
}

#[test]
fn droptail_byte_limit_enforces_capacity_and_preserves_order() {
    let mut q = DropTailQueue::new(QueueLimit::Bytes(100));

    assert!(q.enqueue(pkt(1, 60)).is_ok());
    let dropped = q.enqueue(pkt(2, 50)).expect_err("should drop");
    assert_eq!(dropped.id, 2);
    assert!(q.enqueue(pkt(3, 40)).is_ok());
    assert_eq!(q.bytes(), 100);

    assert_eq!(q.dequeue().expect("pkt").id, 1);
    assert_eq!(q.dequeue().expect("pkt").id, 3);
    assert!(q.dequeue().is_none());
}

#[test]
fn droptail_zero_packet_limit_drops_everything() {
    let mut q = DropTailQueue::new(QueueLimit::Packets(0));
    assert!(q.enqueue(pkt(1, 1)).is_err());
    assert!(q.is_empty());
}
