use crate::net::{NodeId, RoutingTable};

fn build_rev_adj(adj: &[Vec<NodeId>]) -> Vec<Vec<NodeId>> {
    let mut rev = vec![Vec::new(); adj.len()];
    for (from, nbrs) in adj.iter().enumerate() {
        for &to in nbrs {
            rev[to.0].push(NodeId(from));
        }
    }
    rev
}

/// 长度为 n 的双向链
fn chain(n: usize) -> Vec<Vec<NodeId>> {
    (0..n)
        .map(|i| {
            let mut v = Vec::new();
            if i > 0 {
                v.push(NodeId(i - 1));
            }
            if i + 1 < n {
                v.push(NodeId(i + 1));
            }
            v
        })
        .collect()
}

#[test]
fn routing_table_next_hops_follow_shortest_paths_on_a_chain() {
    let adj = chain(4);
    let mut rt = RoutingTable::new();
    rt.ensure_built(&adj, &build_rev_adj(&adj));

    assert_eq!(rt.next_hop(NodeId(0), NodeId(3)), Some(NodeId(1)));
    assert_eq!(rt.next_hop(NodeId(3), NodeId(0)), Some(NodeId(2)));
    assert_eq!(rt.next_hop(NodeId(2), NodeId(3)), Some(NodeId(3)));
    assert_eq!(rt.next_hop(NodeId(1), NodeId(1)), None);
    assert_eq!(
        rt.path(NodeId(0), NodeId(3)),
        Some(vec![NodeId(0), NodeId(1), NodeId(2), NodeId(3)])
    );
    assert!(rt.ambiguous().is_empty());
}

#[test]
fn routing_table_reports_equal_cost_alternatives() {
    // Diamond:
    // 0 -> 1 -> 3
    //  \-> 2 ->/
    let adj = vec![
        vec![NodeId(1), NodeId(2)],
        vec![NodeId(3)],
        vec![NodeId(3)],
        vec![],
    ];
    let mut rt = RoutingTable::new();
    rt.ensure_built(&adj, &build_rev_adj(&adj));

    assert_eq!(rt.next_hop(NodeId(0), NodeId(3)), Some(NodeId(1)));
    assert_eq!(rt.ambiguous(), &[(NodeId(0), NodeId(3))]);
    assert!(rt.next_hop(NodeId(3), NodeId(0)).is_none());
    assert!(rt.path(NodeId(3), NodeId(0)).is_none());
}

#[test]
fn routing_table_requires_mark_dirty_to_rebuild() {
    let mut adj = vec![vec![], vec![]];
    let mut rt = RoutingTable::new();
    assert!(rt.is_dirty());
    rt.ensure_built(&adj, &build_rev_adj(&adj));
    assert!(!rt.is_dirty());
    assert!(rt.next_hop(NodeId(0), NodeId(1)).is_none());

    adj[0].push(NodeId(1));
    rt.ensure_built(&adj, &build_rev_adj(&adj));
    assert!(rt.next_hop(NodeId(0), NodeId(1)).is_none(), "stale until marked dirty");

    rt.mark_dirty();
    rt.ensure_built(&adj, &build_rev_adj(&adj));
    assert_eq!(rt.next_hop(NodeId(0), NodeId(1)), Some(NodeId(1)));
}
