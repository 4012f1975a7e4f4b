//! Topology of a scenario: subgrids, islands, canonical edges and cycles.
//!
//! All functions work on bus row indices. Branches or converters whose bus
//! references cannot be resolved, and self-loops, are skipped here; the
//! verifier reports them separately.

use std::collections::{HashMap, VecDeque};

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;

use crate::{BusId, Scenario};

/// Orientation of a branch relative to its canonical edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchEdge {
    /// Index into [`EdgeSet::edges`]
    pub edge: usize,
    /// `true` if the branch source is the edge's first (larger) bus index
    pub forward: bool,
}

/// Unique unordered bus pairs connected by at least one branch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeSet {
    /// `(e_src, e_dst)` with `e_src > e_dst`, in order of first appearance
    pub edges: Vec<(usize, usize)>,
    /// Per branch row; `None` for self-loops and unresolved references
    pub branch_edge: Vec<Option<BranchEdge>>,
}

impl EdgeSet {
    /// Branch rows mapped to each edge, in branch order.
    pub fn parallel_groups(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.edges.len()];
        for (branch, mapping) in self.branch_edge.iter().enumerate() {
            if let Some(be) = mapping {
                groups[be.edge].push(branch);
            }
        }
        groups
    }
}

fn resolve(map: &HashMap<BusId, usize>, id: BusId) -> Option<usize> {
    map.get(&id).copied()
}

/// Canonical edge list of the branch graph.
pub fn edge_set(scenario: &Scenario) -> EdgeSet {
    let map = scenario.bus_index_map();
    let mut lookup: HashMap<(usize, usize), usize> = HashMap::new();
    let mut edges = Vec::new();
    let mut branch_edge = Vec::with_capacity(scenario.branches.len());

    for branch in &scenario.branches {
        let (Some(src), Some(dst)) = (resolve(&map, branch.src), resolve(&map, branch.dst)) else {
            branch_edge.push(None);
            continue;
        };
        if src == dst {
            branch_edge.push(None);
            continue;
        }
        let key = (src.max(dst), src.min(dst));
        let edge = *lookup.entry(key).or_insert_with(|| {
            edges.push(key);
            edges.len() - 1
        });
        branch_edge.push(Some(BranchEdge {
            edge,
            forward: src == key.0,
        }));
    }

    EdgeSet { edges, branch_edge }
}

/// Graph with one node per bus row (weight = row index) and one edge per
/// resolvable branch (weight = branch row). Converters are added when
/// `with_converters` is set.
pub fn bus_graph(scenario: &Scenario, with_converters: bool) -> UnGraph<usize, usize> {
    let map = scenario.bus_index_map();
    let mut graph = UnGraph::with_capacity(scenario.buses.len(), scenario.branches.len());
    for idx in 0..scenario.buses.len() {
        graph.add_node(idx);
    }
    for (row, branch) in scenario.branches.iter().enumerate() {
        if let (Some(s), Some(d)) = (resolve(&map, branch.src), resolve(&map, branch.dst)) {
            graph.add_edge(NodeIndex::new(s), NodeIndex::new(d), row);
        }
    }
    if with_converters {
        for (row, cvt) in scenario.converters.iter().enumerate() {
            if let (Some(s), Some(d)) = (resolve(&map, cvt.src), resolve(&map, cvt.dst)) {
                graph.add_edge(NodeIndex::new(s), NodeIndex::new(d), row);
            }
        }
    }
    graph
}

/// Connected components by breadth-first search. Members are sorted and
/// components are ordered by their lowest bus index.
fn components(graph: &UnGraph<usize, usize>) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.node_count()];
    let mut result = Vec::new();
    for start in graph.node_indices() {
        if visited[start.index()] {
            continue;
        }
        visited[start.index()] = true;
        let mut queue = VecDeque::from([start]);
        let mut members = Vec::new();
        while let Some(node) = queue.pop_front() {
            members.push(graph[node]);
            for neighbor in graph.neighbors(node) {
                if !visited[neighbor.index()] {
                    visited[neighbor.index()] = true;
                    queue.push_back(neighbor);
                }
            }
        }
        members.sort_unstable();
        result.push(members);
    }
    result
}

/// Components connected by branches only.
pub fn subgrids(scenario: &Scenario) -> Vec<Vec<usize>> {
    components(&bus_graph(scenario, false))
}

/// Components connected by branches and converters.
pub fn islands(scenario: &Scenario) -> Vec<Vec<usize>> {
    components(&bus_graph(scenario, true))
}

/// Component index of every bus.
pub fn membership(components: &[Vec<usize>], num_buses: usize) -> Vec<usize> {
    let mut owner = vec![0; num_buses];
    for (c, members) in components.iter().enumerate() {
        for &bus in members {
            owner[bus] = c;
        }
    }
    owner
}

/// Phase anchor per subgrid: its first reference bus, else its lowest bus index.
pub fn subgrid_roots(scenario: &Scenario, subgrids: &[Vec<usize>]) -> Vec<usize> {
    subgrids
        .iter()
        .filter_map(|members| {
            members
                .iter()
                .copied()
                .find(|&b| scenario.buses[b].is_ref)
                .or_else(|| members.first().copied())
        })
        .collect()
}

/// Indices (into [`subgrids`]) of subgrids whose edge set contains a cycle.
/// Parallel branches share one edge and do not form a cycle.
pub fn cyclic_subgrids(scenario: &Scenario) -> Vec<usize> {
    let edges = edge_set(scenario).edges;
    let grids = subgrids(scenario);
    let owner = membership(&grids, scenario.buses.len());

    let mut sets = UnionFind::<usize>::new(scenario.buses.len());
    let mut cyclic: Vec<usize> = edges
        .iter()
        .filter(|&&(i, j)| !sets.union(i, j))
        .map(|&(i, _)| owner[i])
        .collect();
    cyclic.sort_unstable();
    cyclic.dedup();
    cyclic
}

pub fn has_acyclic_subgrids(scenario: &Scenario) -> bool {
    cyclic_subgrids(scenario).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Branch, Bus, Converter};

    fn ring(n: usize) -> Scenario {
        let mut scenario = Scenario::new("ring");
        scenario.buses = (0..n).map(Bus::new).collect();
        scenario.branches = (0..n).map(|k| Branch::new(k, k, (k + 1) % n)).collect();
        scenario
    }

    #[test]
    fn test_edges_are_canonical_and_deduplicated() {
        let mut scenario = ring(3);
        // parallel to branch 0, reversed
        scenario.branches.push(Branch::new(3, 1, 0));

        let set = edge_set(&scenario);
        assert_eq!(set.edges, vec![(1, 0), (2, 1), (2, 0)]);
        assert!(set.edges.iter().all(|&(s, d)| s > d));
        assert_eq!(set.branch_edge[0], Some(BranchEdge { edge: 0, forward: false }));
        assert_eq!(set.branch_edge[3], Some(BranchEdge { edge: 0, forward: true }));
        assert_eq!(set.parallel_groups()[0], vec![0, 3]);
    }

    #[test]
    fn test_self_loop_and_unknown_bus_are_skipped() {
        let mut scenario = ring(2);
        scenario.branches = vec![Branch::new(0, 0, 0), Branch::new(1, 0, 9)];
        let set = edge_set(&scenario);
        assert!(set.edges.is_empty());
        assert_eq!(set.branch_edge, vec![None, None]);
    }

    #[test]
    fn test_subgrids_and_islands() {
        let mut scenario = Scenario::new("split");
        scenario.buses = (0..4).map(Bus::new).collect();
        scenario.branches = vec![Branch::new(0, 0, 1), Branch::new(1, 2, 3)];
        scenario.converters = vec![Converter::new(0, 1, 2, 50.0)];

        assert_eq!(subgrids(&scenario), vec![vec![0, 1], vec![2, 3]]);
        assert_eq!(islands(&scenario), vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn test_roots_prefer_reference_bus() {
        let mut scenario = ring(3);
        scenario.buses[2].is_ref = true;
        let grids = subgrids(&scenario);
        assert_eq!(subgrid_roots(&scenario, &grids), vec![2]);

        scenario.buses[2].is_ref = false;
        assert_eq!(subgrid_roots(&scenario, &grids), vec![0]);
    }

    #[test]
    fn test_cycle_detection_ignores_parallel_branches() {
        let mut radial = ring(3);
        radial.branches.pop();
        radial.branches.push(Branch::new(5, 1, 0));
        assert!(has_acyclic_subgrids(&radial));

        let meshed = ring(3);
        assert_eq!(cyclic_subgrids(&meshed), vec![0]);
    }
}
