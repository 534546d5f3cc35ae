//! VoxelGraph — undirected voxel adjacency stored as mutual arcs

use log::warn;

/// An undirected graph on the voxels of a volume
///
/// Each undirected pair `(a, b)` is stored as two directed edges. The first
/// half of [`VoxelGraph::edges`] holds the pairs in insertion order, the
/// second half holds the same pairs reversed, so edge `i` and edge
/// `i + n_pairs` are mirror images.
#[derive(Debug, Clone)]
pub struct VoxelGraph {
    n_vertices: usize,
    edges: Vec<(usize, usize)>,
    neighbors: Vec<Vec<usize>>,
}

impl VoxelGraph {
    /// Build from a voxel count and unordered voxel pairs
    pub fn new(n_vertices: usize, pairs: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let pairs: Vec<(usize, usize)> = pairs.into_iter().collect();
        for &(a, b) in &pairs {
            assert!(
                a < n_vertices && b < n_vertices,
                "edge ({}, {}) out of range for {} voxels",
                a,
                b,
                n_vertices
            );
        }
        if pairs.is_empty() && n_vertices > 1 {
            warn!("Voxel graph over {} voxels has no edges", n_vertices);
        }

        let mut edges = Vec::with_capacity(pairs.len() * 2);
        edges.extend(pairs.iter().copied());
        edges.extend(pairs.iter().map(|&(a, b)| (b, a)));

        let mut neighbors = vec![Vec::new(); n_vertices];
        for &(src, tar) in &edges {
            neighbors[src].push(tar);
        }

        Self {
            n_vertices,
            edges,
            neighbors,
        }
    }

    /// Number of directed edges (twice the number of voxel pairs)
    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn n_vertices(&self) -> usize {
        self.n_vertices
    }

    /// Directed source-target pairs of voxel indices
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Voxels adjacent to `voxel`
    pub fn neighbors(&self, voxel: usize) -> &[usize] {
        &self.neighbors[voxel]
    }

    /// Difference of a voxel signal along every directed edge
    ///
    /// Returns `signal[target] - signal[source]` in the order of
    /// [`VoxelGraph::edges`].
    pub fn gradient(&self, vertex_signal: &[f64]) -> Vec<f64> {
        assert_eq!(
            vertex_signal.len(),
            self.n_vertices,
            "signal must have one value per voxel"
        );
        self.edges
            .iter()
            .map(|&(src, tar)| vertex_signal[tar] - vertex_signal[src])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutual_storage() {
        let graph = VoxelGraph::new(3, vec![(0, 1), (1, 2)]);
        assert_eq!(graph.n_edges(), 4);
        assert_eq!(graph.edges(), &[(0, 1), (1, 2), (1, 0), (2, 1)]);
        assert_eq!(graph.neighbors(1), &[2, 0]);
    }

    #[test]
    fn test_gradient_follows_edge_order() {
        let graph = VoxelGraph::new(3, vec![(0, 1), (1, 2)]);
        let gradient = graph.gradient(&[0.0, 1.0, 3.0]);
        assert_eq!(gradient, vec![1.0, 2.0, -1.0, -2.0]);
    }

    #[test]
    fn test_empty_graph() {
        let graph = VoxelGraph::new(2, Vec::new());
        assert_eq!(graph.n_edges(), 0);
        assert!(graph.gradient(&[1.0, 2.0]).is_empty());
    }
}
