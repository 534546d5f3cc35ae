//! DiGraph — directed weighted graph with per-vertex attributes
//!
//! A thin layer over a petgraph [`Graph`] that addresses vertices and edges
//! by dense `usize` indices. Every vertex carries a stable `name`, which
//! survives subgraph extraction and is used to merge graphs that share an
//! identity space (the up and down guidance graphs).

use crate::hierarchy::NodeId;
use petgraph::algo::dijkstra;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::{Direction, Graph};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// A guidance state: one voxel as seen by one hierarchy region
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    /// Stable identity, equal to the vertex index in the full guidance graph
    pub name: usize,
    pub voxel: usize,
    /// Owning region, `None` for axons drawn without a hierarchy
    pub hierarchy: Option<NodeId>,
    pub landscape: f64,
}

impl Vertex {
    pub fn at_voxel(name: usize, voxel: usize) -> Self {
        Self {
            name,
            voxel,
            hierarchy: None,
            landscape: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
}

/// Directed multigraph with vertex attributes and weighted edges
#[derive(Debug, Clone, Default)]
pub struct DiGraph {
    graph: Graph<Vertex, f64>,
}

impl DiGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, vertex: Vertex) -> usize {
        self.graph.add_node(vertex).index()
    }

    pub fn add_edge(&mut self, source: usize, target: usize, weight: f64) -> usize {
        assert!(
            source < self.n_vertices() && target < self.n_vertices(),
            "edge ({}, {}) out of range for {} vertices",
            source,
            target,
            self.n_vertices()
        );
        self.graph
            .add_edge(NodeIndex::new(source), NodeIndex::new(target), weight)
            .index()
    }

    pub fn n_vertices(&self) -> usize {
        self.graph.node_count()
    }

    pub fn n_edges(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn vertex(&self, v: usize) -> &Vertex {
        &self.graph[NodeIndex::new(v)]
    }

    /// Vertices in index order
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> + '_ {
        self.graph.raw_nodes().iter().map(|node| &node.weight)
    }

    pub fn edge(&self, e: usize) -> Edge {
        let edge = &self.graph.raw_edges()[e];
        Edge {
            source: edge.source().index(),
            target: edge.target().index(),
            weight: edge.weight,
        }
    }

    /// Edges in index order
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        (0..self.n_edges()).map(|e| self.edge(e))
    }

    pub fn in_degree(&self, v: usize) -> usize {
        self.graph
            .edges_directed(NodeIndex::new(v), Direction::Incoming)
            .count()
    }

    pub fn out_degree(&self, v: usize) -> usize {
        self.graph
            .edges_directed(NodeIndex::new(v), Direction::Outgoing)
            .count()
    }

    /// Targets of the edges leaving `v`, newest edge first
    pub fn successors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.graph.neighbors(NodeIndex::new(v)).map(|n| n.index())
    }

    /// Vertices without incoming edges
    pub fn roots(&self) -> Vec<usize> {
        self.externals(Direction::Incoming)
    }

    /// Vertices without outgoing edges
    pub fn sinks(&self) -> Vec<usize> {
        self.externals(Direction::Outgoing)
    }

    fn externals(&self, direction: Direction) -> Vec<usize> {
        let mut found: Vec<usize> = self.graph.externals(direction).map(|n| n.index()).collect();
        found.sort_unstable();
        found
    }

    /// Index of the vertex with the given name
    pub fn find_name(&self, name: usize) -> Option<usize> {
        self.vertices().position(|v| v.name == name)
    }

    /// All vertices reachable from any of `sources` by following edges
    /// forward, the sources included, in ascending index order
    pub fn reachable_from(&self, sources: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let mut sources = sources.into_iter().map(NodeIndex::new);
        let Some(first) = sources.next() else {
            return Vec::new();
        };
        let mut seen = vec![false; self.n_vertices()];
        let mut dfs = Dfs::new(&self.graph, first);
        loop {
            while let Some(v) = dfs.next(&self.graph) {
                seen[v.index()] = true;
            }
            let Some(next) = sources.find(|s| !seen[s.index()]) else {
                break;
            };
            dfs.move_to(next);
        }
        (0..self.n_vertices()).filter(|&v| seen[v]).collect()
    }

    /// Subgraph on the given vertices with every edge among them
    ///
    /// Vertices keep their relative order and their attributes; edges keep
    /// their relative order.
    pub fn induced_subgraph(&self, vertices: &[usize]) -> DiGraph {
        let keep: HashSet<usize> = vertices.iter().copied().collect();
        DiGraph {
            graph: self.graph.filter_map(
                |n, vertex| keep.contains(&n.index()).then(|| vertex.clone()),
                |_, &weight| Some(weight),
            ),
        }
    }

    /// Subgraph made of the given edges and the vertices they touch
    pub fn subgraph_edges(&self, edge_ids: &[usize]) -> DiGraph {
        let selected: HashSet<usize> = edge_ids.iter().copied().collect();
        let touched: HashSet<usize> = selected
            .iter()
            .flat_map(|&e| {
                let edge = self.edge(e);
                [edge.source, edge.target]
            })
            .collect();
        DiGraph {
            graph: self.graph.filter_map(
                |n, vertex| touched.contains(&n.index()).then(|| vertex.clone()),
                |e: EdgeIndex, &weight| selected.contains(&e.index()).then_some(weight),
            ),
        }
    }

    /// Merge two graphs over a shared name space
    ///
    /// Vertices with the same name become one vertex (attributes from the
    /// first graph win) and the result is ordered by name. An edge present
    /// in both graphs between the same pair of names is kept once, with the
    /// weight it has in `self`.
    pub fn union_by_name(&self, other: &DiGraph) -> DiGraph {
        let mut by_name: BTreeMap<usize, &Vertex> = BTreeMap::new();
        for v in other.vertices().chain(self.vertices()) {
            by_name.insert(v.name, v);
        }

        let mut graph = DiGraph::new();
        let mut index = HashMap::with_capacity(by_name.len());
        for (&name, &vertex) in &by_name {
            index.insert(name, graph.add_vertex(vertex.clone()));
        }

        let mut present: HashSet<(usize, usize)> = HashSet::new();
        for g in [self, other] {
            for edge in g.edges() {
                let key = (g.vertex(edge.source).name, g.vertex(edge.target).name);
                if present.insert(key) {
                    graph.add_edge(index[&key.0], index[&key.1], edge.weight);
                }
            }
        }
        graph
    }

    /// Shortest-path tree from `source`
    ///
    /// Uses the edge weights, or unit weights when `weighted` is false.
    /// Among equally cheap routes the tree takes the one with the fewest
    /// edges, then the one through the lowest edge ids.
    pub fn shortest_paths(&self, source: usize, weighted: bool) -> ShortestPaths {
        let start = NodeIndex::new(source);
        let costs = dijkstra(&self.graph, start, None, |e| {
            if weighted {
                *e.weight()
            } else {
                1.0
            }
        });
        let mut dist = vec![f64::INFINITY; self.n_vertices()];
        for (node, cost) in costs {
            dist[node.index()] = cost;
        }

        // walk the edges that lie on some cheapest route, breadth first
        let mut pred: Vec<Option<usize>> = vec![None; self.n_vertices()];
        let mut settled = vec![false; self.n_vertices()];
        settled[source] = true;
        let mut queue = VecDeque::from([start]);
        while let Some(u) = queue.pop_front() {
            let mut out: Vec<_> = self.graph.edges(u).collect();
            out.sort_by_key(|e| e.id());
            for e in out {
                let t = e.target().index();
                let step = if weighted { *e.weight() } else { 1.0 };
                let tight = (dist[u.index()] + step - dist[t]).abs()
                    <= 1e-10 * dist[t].abs().max(1.0);
                if !settled[t] && tight {
                    settled[t] = true;
                    pred[t] = Some(e.id().index());
                    queue.push_back(e.target());
                }
            }
        }

        ShortestPaths { source, dist, pred }
    }

    /// Contract vertices sharing a voxel into one vertex per voxel
    ///
    /// Self-loops and parallel edges are dropped. Vertices are the distinct
    /// voxels in ascending order, each named by its voxel.
    pub fn contract_voxels(&self) -> DiGraph {
        let mut voxels: Vec<usize> = self.vertices().map(|v| v.voxel).collect();
        voxels.sort_unstable();
        voxels.dedup();

        let mut graph = DiGraph::new();
        let mut index = HashMap::with_capacity(voxels.len());
        for &voxel in &voxels {
            index.insert(voxel, graph.add_vertex(Vertex::at_voxel(voxel, voxel)));
        }

        let mut present = HashSet::new();
        for edge in self.edges() {
            let s = index[&self.vertex(edge.source).voxel];
            let t = index[&self.vertex(edge.target).voxel];
            if s != t && present.insert((s, t)) {
                graph.add_edge(s, t, edge.weight);
            }
        }
        graph
    }
}

/// Result of [`DiGraph::shortest_paths`]
#[derive(Debug, Clone)]
pub struct ShortestPaths {
    source: usize,
    dist: Vec<f64>,
    pred: Vec<Option<usize>>,
}

impl ShortestPaths {
    /// Distance to `target`, infinite when unreachable
    pub fn distance(&self, target: usize) -> f64 {
        self.dist[target]
    }

    /// Edge ids from the source to `target`; empty when unreachable or
    /// when `target` is the source
    pub fn edge_path(&self, graph: &DiGraph, target: usize) -> Vec<usize> {
        if !self.dist[target].is_finite() {
            return Vec::new();
        }
        let mut path = Vec::new();
        let mut current = target;
        while let Some(e) = self.pred[current] {
            path.push(e);
            current = graph.edge(e).source;
        }
        path.reverse();
        path
    }

    /// Vertices from the source to `target`; empty when unreachable
    pub fn vertex_path(&self, graph: &DiGraph, target: usize) -> Vec<usize> {
        if !self.dist[target].is_finite() {
            return Vec::new();
        }
        let mut path = vec![self.source];
        path.extend(
            self.edge_path(graph, target)
                .into_iter()
                .map(|e| graph.edge(e).target),
        );
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0 -> 1 -> 3, 0 -> 2 -> 3 with the path through 2 cheaper
    fn diamond() -> DiGraph {
        let mut g = DiGraph::new();
        for i in 0..4 {
            g.add_vertex(Vertex::at_voxel(i, i));
        }
        g.add_edge(0, 1, 1.0);
        g.add_edge(1, 3, 1.0);
        g.add_edge(0, 2, 0.2);
        g.add_edge(2, 3, 0.2);
        g
    }

    #[test]
    fn test_degrees_and_reachability() {
        let g = diamond();
        assert_eq!(g.roots(), vec![0]);
        assert_eq!(g.sinks(), vec![3]);
        assert_eq!(g.reachable_from([1]), vec![1, 3]);
        assert_eq!(g.reachable_from([1, 2]), vec![1, 2, 3]);
        let mut next: Vec<usize> = g.successors(0).collect();
        next.sort_unstable();
        assert_eq!(next, vec![1, 2]);
    }

    #[test]
    fn test_weighted_and_hop_paths() {
        let g = diamond();
        let weighted = g.shortest_paths(0, true);
        assert_eq!(weighted.vertex_path(&g, 3), vec![0, 2, 3]);
        assert_eq!(weighted.edge_path(&g, 3), vec![2, 3]);
        assert!((weighted.distance(3) - 0.4).abs() < 1e-12);
        assert_eq!(weighted.vertex_path(&g, 0), vec![0]);

        let hops = g.shortest_paths(3, false);
        assert!(hops.vertex_path(&g, 0).is_empty());
        assert!(hops.distance(0).is_infinite());
    }

    #[test]
    fn test_zero_weight_cycle_and_ties() {
        let mut g = DiGraph::new();
        for i in 0..4 {
            g.add_vertex(Vertex::at_voxel(i, i));
        }
        g.add_edge(0, 1, 0.0);
        g.add_edge(1, 2, 0.0);
        g.add_edge(2, 1, 0.0);
        g.add_edge(1, 3, 1.0);
        let paths = g.shortest_paths(0, true);
        assert_eq!(paths.vertex_path(&g, 2), vec![0, 1, 2]);
        assert_eq!(paths.edge_path(&g, 3), vec![0, 3]);

        // two routes of cost 1 to vertex 1: the single edge wins
        let mut g = DiGraph::new();
        for i in 0..3 {
            g.add_vertex(Vertex::at_voxel(i, i));
        }
        g.add_edge(0, 2, 0.5);
        g.add_edge(2, 1, 0.5);
        g.add_edge(0, 1, 1.0);
        assert_eq!(g.shortest_paths(0, true).edge_path(&g, 1), vec![2]);
    }

    #[test]
    fn test_subgraphs_keep_names() {
        let g = diamond();
        let induced = g.induced_subgraph(&[3, 1]);
        assert_eq!(induced.n_vertices(), 2);
        assert_eq!(induced.vertex(0).name, 1);
        assert_eq!(induced.n_edges(), 1);

        let by_edges = g.subgraph_edges(&[3, 2, 3]);
        assert_eq!(by_edges.n_vertices(), 3);
        assert_eq!(by_edges.n_edges(), 2);
        let names: Vec<usize> = by_edges.vertices().map(|v| v.name).collect();
        assert_eq!(names, vec![0, 2, 3]);
    }

    #[test]
    fn test_union_merges_by_name() {
        let g = diamond();
        let a = g.induced_subgraph(&[0, 1, 3]);
        let b = g.induced_subgraph(&[0, 1, 2, 3]);
        let union = a.union_by_name(&b);
        assert_eq!(union.n_vertices(), 4);
        assert_eq!(union.n_edges(), 4);
        let names: Vec<usize> = union.vertices().map(|v| v.name).collect();
        assert_eq!(names, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_contract_voxels() {
        let mut g = DiGraph::new();
        // two states of voxel 5 linked by a transition, then voxel 7
        g.add_vertex(Vertex::at_voxel(0, 5));
        g.add_vertex(Vertex::at_voxel(1, 5));
        g.add_vertex(Vertex::at_voxel(2, 7));
        g.add_edge(0, 1, 100.0);
        g.add_edge(0, 2, 0.5);
        g.add_edge(1, 2, 0.5);
        let contracted = g.contract_voxels();
        assert_eq!(contracted.n_vertices(), 2);
        assert_eq!(contracted.n_edges(), 1);
        assert_eq!(contracted.vertex(1).voxel, 7);
    }
}
