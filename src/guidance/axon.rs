//! Axon — an extracted out-tree of guidance states
//!
//! Vertex-level queries work on the tree as extracted. Voxel-level queries
//! (tips, voxel paths, branches) work on the voxel tree, where all states
//! of one voxel are contracted into a single vertex.

use super::graph::DiGraph;
use crate::hierarchy::{Hierarchy, NodeId};
use crate::volume::Volume;
use nalgebra::Vector3;
use rstar::{PointDistance, RTree};
use std::cell::OnceCell;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// A tree-shaped walk through the guidance graph from one source to one
/// or more targets
#[derive(Debug, Clone)]
pub struct Axon {
    tree: DiGraph,
    volume: Arc<Volume>,
    hierarchy: Option<Arc<Hierarchy>>,
    voxel_tree: OnceCell<DiGraph>,
}

impl Axon {
    /// Wrap an extracted tree
    ///
    /// # Panics
    ///
    /// When the tree does not have exactly one vertex without incoming
    /// edges.
    pub fn new(tree: DiGraph, volume: Arc<Volume>, hierarchy: Option<Arc<Hierarchy>>) -> Self {
        let axon = Self {
            tree,
            volume,
            hierarchy,
            voxel_tree: OnceCell::new(),
        };
        axon.source();
        axon
    }

    pub fn tree(&self) -> &DiGraph {
        &self.tree
    }

    pub fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    pub fn hierarchy(&self) -> Option<&Arc<Hierarchy>> {
        self.hierarchy.as_ref()
    }

    pub fn n_vertices(&self) -> usize {
        self.tree.n_vertices()
    }

    /// The unique vertex without incoming edges
    pub fn source(&self) -> usize {
        let roots = self.tree.roots();
        assert_eq!(
            roots.len(),
            1,
            "exactly one source vertex expected, found {}",
            roots.len()
        );
        roots[0]
    }

    pub fn source_voxel(&self) -> usize {
        self.voxel_index(self.source())
    }

    pub fn voxel_index(&self, vertex: usize) -> usize {
        self.tree.vertex(vertex).voxel
    }

    /// Region of a vertex, `None` for axons drawn without a hierarchy
    pub fn hierarchy_of(&self, vertex: usize) -> Option<NodeId> {
        self.tree.vertex(vertex).hierarchy
    }

    /// Vertices in the finest regions, those with at least one voxel leaf
    pub fn targets(&self) -> Vec<usize> {
        let Some(hierarchy) = &self.hierarchy else {
            return Vec::new();
        };
        (0..self.tree.n_vertices())
            .filter(|&v| {
                self.hierarchy_of(v)
                    .is_some_and(|node| hierarchy.is_just_not_leaf(node))
            })
            .collect()
    }

    /// Distinct voxels anywhere in the tree, ascending
    pub fn reached_voxels(&self) -> Vec<usize> {
        let voxels: BTreeSet<usize> = self.tree.vertices().map(|v| v.voxel).collect();
        voxels.into_iter().collect()
    }

    /// Distinct voxel-to-voxel steps of the tree, ascending
    ///
    /// State transitions inside one voxel are not steps.
    pub fn voxel_edges(&self) -> Vec<(usize, usize)> {
        let steps: BTreeSet<(usize, usize)> = self
            .tree
            .edges()
            .map(|e| (self.voxel_index(e.source), self.voxel_index(e.target)))
            .filter(|(s, t)| s != t)
            .collect();
        steps.into_iter().collect()
    }

    /// The tree with all states of one voxel contracted
    pub fn voxel_tree(&self) -> &DiGraph {
        self.voxel_tree.get_or_init(|| self.tree.contract_voxels())
    }

    /// Voxels where the axon ends
    pub fn tips(&self) -> Vec<usize> {
        let tree = self.voxel_tree();
        tree.sinks().into_iter().map(|v| tree.vertex(v).voxel).collect()
    }

    /// Hop-shortest voxel paths from the source voxel to every tip
    pub fn voxel_paths(&self) -> Vec<Vec<usize>> {
        let tree = self.voxel_tree();
        let Some(start) = tree.find_name(self.source_voxel()) else {
            return Vec::new();
        };
        let paths = tree.shortest_paths(start, false);
        tree.sinks()
            .into_iter()
            .map(|tip| {
                paths
                    .vertex_path(tree, tip)
                    .into_iter()
                    .map(|v| tree.vertex(v).voxel)
                    .collect()
            })
            .collect()
    }

    /// Voxel paths cut into disjoint branches
    ///
    /// Paths are taken longest first and walked back from their tip until
    /// a voxel already covered by an earlier branch, which is included.
    /// The first branch runs from its tip all the way to the source.
    pub fn branch_paths(&self) -> Vec<Vec<usize>> {
        let mut paths = self.voxel_paths();
        paths.sort_by_key(|p| std::cmp::Reverse(p.len()));

        let mut visited: HashSet<usize> = HashSet::new();
        let mut branches = Vec::with_capacity(paths.len());
        for path in paths {
            let mut branch = Vec::new();
            for &voxel in path.iter().rev() {
                branch.push(voxel);
                if visited.contains(&voxel) {
                    break;
                }
            }
            visited.extend(branch.iter().copied());
            branches.push(branch);
        }
        branches
    }

    /// Cheapest vertex paths from the source to every target
    pub fn paths(&self) -> Vec<Vec<usize>> {
        let shortest = self.tree.shortest_paths(self.source(), true);
        self.targets()
            .into_iter()
            .map(|t| shortest.vertex_path(&self.tree, t))
            .collect()
    }

    /// Cheapest edge paths from the source to every target
    pub fn edge_paths(&self) -> Vec<Vec<usize>> {
        let shortest = self.tree.shortest_paths(self.source(), true);
        self.targets()
            .into_iter()
            .map(|t| shortest.edge_path(&self.tree, t))
            .collect()
    }

    /// Jaccard index of the reached voxel sets, 0 when both are empty
    pub fn overlap(&self, other: &Axon) -> f64 {
        let a: HashSet<usize> = self.reached_voxels().into_iter().collect();
        let b: HashSet<usize> = other.reached_voxels().into_iter().collect();
        let union = a.union(&b).count();
        if union == 0 {
            return 0.0;
        }
        a.intersection(&b).count() as f64 / union as f64
    }

    /// Symmetric mean nearest-neighbour distance between reached voxels
    pub fn average_minimum_distance(&self, other: &Axon) -> f64 {
        average_minimum_distance(
            &self.positions(&self.reached_voxels()),
            &other.positions(&other.reached_voxels()),
        )
    }

    /// Symmetric mean nearest-neighbour distance between tips
    pub fn average_minimum_distance_tips(&self, other: &Axon) -> f64 {
        average_minimum_distance(
            &self.positions(&self.tips()),
            &other.positions(&other.tips()),
        )
    }

    fn positions(&self, voxels: &[usize]) -> Vec<Vector3<f64>> {
        voxels
            .iter()
            .map(|&v| self.volume.voxel_position(v))
            .collect()
    }
}

/// Mean over both directions of the mean distance to the nearest point of
/// the other set; NaN when either set is empty
fn average_minimum_distance(a: &[Vector3<f64>], b: &[Vector3<f64>]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::NAN;
    }
    let nearest = |from: &[Vector3<f64>], to: &[Vector3<f64>]| {
        let tree = RTree::bulk_load(to.iter().map(|q| [q.x, q.y, q.z]).collect::<Vec<_>>());
        from.iter()
            .filter_map(|p| {
                let query = [p.x, p.y, p.z];
                tree.nearest_neighbor(&query)
                    .map(|q| q.distance_2(&query).sqrt())
            })
            .sum::<f64>()
            / from.len() as f64
    };
    (nearest(a, b) + nearest(b, a)) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guidance::graph::Vertex;
    use nalgebra::DMatrix;

    fn line_volume() -> Arc<Volume> {
        let n = 6;
        let expression = DMatrix::from_fn(n, 2, |i, j| (i + j) as f64);
        let indices = (0..n as i64).map(|x| [x, 0, 0]).collect();
        Arc::new(Volume::new("x", expression, indices, None).unwrap())
    }

    /// States over voxels: 0 -> 1 -> 2 (with a second state at 2) -> 3,
    /// and a side branch 1 -> 4
    fn axon() -> Axon {
        let mut tree = DiGraph::new();
        for (name, voxel) in [(0, 0), (1, 1), (2, 2), (3, 2), (4, 3), (5, 4)] {
            tree.add_vertex(Vertex::at_voxel(name, voxel));
        }
        tree.add_edge(0, 1, 0.5);
        tree.add_edge(1, 2, 0.5);
        tree.add_edge(2, 3, 100.0);
        tree.add_edge(3, 4, 0.5);
        tree.add_edge(1, 5, 0.5);
        Axon::new(tree, line_volume(), None)
    }

    #[test]
    fn test_source_and_voxels() {
        let a = axon();
        assert_eq!(a.source(), 0);
        assert_eq!(a.source_voxel(), 0);
        assert_eq!(a.reached_voxels(), vec![0, 1, 2, 3, 4]);
        assert_eq!(a.voxel_edges(), vec![(0, 1), (1, 2), (1, 4), (2, 3)]);
        assert!(a.targets().is_empty());
        assert_eq!(a.hierarchy_of(2), None);
    }

    #[test]
    fn test_tips_and_paths() {
        let a = axon();
        assert_eq!(a.voxel_tree().n_vertices(), 5);
        assert_eq!(a.tips(), vec![3, 4]);
        assert_eq!(a.voxel_paths(), vec![vec![0, 1, 2, 3], vec![0, 1, 4]]);
        assert_eq!(a.branch_paths(), vec![vec![3, 2, 1, 0], vec![4, 1]]);
    }

    #[test]
    fn test_overlap_and_distance() {
        let a = axon();
        assert_eq!(a.overlap(&a), 1.0);
        assert_eq!(a.average_minimum_distance(&a), 0.0);
        assert_eq!(a.average_minimum_distance_tips(&a), 0.0);

        let mut tree = DiGraph::new();
        tree.add_vertex(Vertex::at_voxel(0, 5));
        tree.add_vertex(Vertex::at_voxel(1, 4));
        tree.add_edge(0, 1, 1.0);
        let b = Axon::new(tree, line_volume(), None);
        // {4} shared out of {0..5}
        assert!((a.overlap(&b) - 1.0 / 6.0).abs() < 1e-12);
        // tips {3, 4} vs {4}: (0.5 + 0) / 2
        assert!((a.average_minimum_distance_tips(&b) - 0.25).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "exactly one source vertex expected, found 2")]
    fn test_forest_is_rejected() {
        let mut tree = DiGraph::new();
        tree.add_vertex(Vertex::at_voxel(0, 0));
        tree.add_vertex(Vertex::at_voxel(1, 1));
        Axon::new(tree, line_volume(), None);
    }
}
