//! 路由表
//!
//! 按最短跳数预计算每个 (from, dst) 的下一跳：对每个 dst 在反向图上做 BFS，
//! 得到距离后为每个 from 选出满足 dist[next] = dist[from] - 1 的邻居。
//! dumbbell 为树形拓扑，因此每个 (from, dst) 至多一个候选；若出现多个候选说明拓扑有环，
//! 由 `ambiguous()` 报告。

use std::collections::{HashMap, VecDeque};

use super::id::NodeId;

#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    dirty: bool,
    next_hop: HashMap<(NodeId, NodeId), NodeId>,
    /// 存在多个等长下一跳的 (from, dst)
    ambiguous: Vec<(NodeId, NodeId)>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            dirty: true,
            ..Self::default()
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 确保路由表基于当前拓扑是最新的。
    ///
    /// `adj[from]` 为从 `from` 出发的所有出边邻居；
    /// `rev_adj[to]` 为所有能到达 `to` 的前驱节点集合。
    pub fn ensure_built(&mut self, adj: &[Vec<NodeId>], rev_adj: &[Vec<NodeId>]) {
        if !self.dirty {
            return;
        }

        let n = adj.len();
        self.next_hop.clear();
        self.ambiguous.clear();

        let mut dist: Vec<u32> = vec![u32::MAX; n];
        let mut q: VecDeque<NodeId> = VecDeque::new();

        for dst_idx in 0..n {
            dist.fill(u32::MAX);
            q.clear();

            let dst = NodeId(dst_idx);
            dist[dst_idx] = 0;
            q.push_back(dst);

            while let Some(v) = q.pop_front() {
                let dv = dist[v.0];
                for &pred in &rev_adj[v.0] {
                    if dist[pred.0] == u32::MAX {
                        dist[pred.0] = dv.saturating_add(1);
                        q.push_back(pred);
                    }
                }
            }

            for from_idx in 0..n {
                let from = NodeId(from_idx);
                let df = dist[from_idx];
                if from == dst || df == u32::MAX {
                    continue;
                }
                let mut cands = adj[from_idx].iter().filter(|nh| dist[nh.0] == df - 1);
                if let Some(&first) = cands.next() {
                    if cands.next().is_some() {
                        self.ambiguous.push((from, dst));
                    }
                    self.next_hop.insert((from, dst), first);
                }
            }
        }

        self.dirty = false;
    }

    pub fn next_hop(&self, from: NodeId, dst: NodeId) -> Option<NodeId> {
        self.next_hop.get(&(from, dst)).copied()
    }

    pub fn ambiguous(&self) -> &[(NodeId, NodeId)] {
        &self.ambiguous
    }

    /// 从 `src` 沿下一跳走到 `dst` 的完整节点序列；不可达时返回 None。
    pub fn path(&self, src: NodeId, dst: NodeId) -> Option<Vec<NodeId>> {
        let mut path = vec![src];
        let mut at = src;
        while at != dst {
            at = self.next_hop(at, dst)?;
            if path.contains(&at) {
                return None;
            }
            path.push(at);
        }
        Some(path)
    }
}
