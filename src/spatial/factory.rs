//! Voxel graph factories — edge generators over voxel grid positions

use super::graph::VoxelGraph;
use crate::volume::Volume;
use log::info;
use nalgebra::Vector3;
use rstar::primitives::GeomWithData;
use rstar::{PointDistance, RTree};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Strategy producing unordered voxel pairs from grid positions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EdgeGenerator {
    /// Gabriel graph: a pair is kept when the ball having the pair as its
    /// diameter holds no other voxel. A pair is still accepted when the
    /// nearest other voxel to the midpoint lies at `tolerance × radius` or
    /// further. `max_distance` optionally bounds the candidate pairs.
    Gabriel {
        tolerance: f64,
        max_distance: Option<f64>,
    },
    /// Face-adjacent grid neighbours (6-neighbourhood)
    Lattice,
}

impl Default for EdgeGenerator {
    fn default() -> Self {
        EdgeGenerator::Gabriel {
            tolerance: 0.999,
            max_distance: None,
        }
    }
}

impl EdgeGenerator {
    /// Generate unordered `(a, b)` pairs with `a < b`
    pub fn edges(&self, voxel_indices: &[[i64; 3]]) -> Vec<(usize, usize)> {
        match self {
            EdgeGenerator::Gabriel {
                tolerance,
                max_distance,
            } => {
                let points: Vec<Vector3<f64>> = voxel_indices
                    .iter()
                    .map(|p| Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64))
                    .collect();
                gabriel_edges(&points, *tolerance, *max_distance)
            }
            EdgeGenerator::Lattice => lattice_edges(voxel_indices),
        }
    }
}

/// Edges of the Gabriel graph among the points
///
/// Every candidate pair (all pairs, or those within `max_distance`) is
/// tested against the point nearest to its midpoint, the two endpoints
/// excluded. The pair is kept unless that point lies closer than
/// `tolerance` times half the pair's length. Coincident points are never
/// linked.
pub fn gabriel_edges(
    points: &[Vector3<f64>],
    tolerance: f64,
    max_distance: Option<f64>,
) -> Vec<(usize, usize)> {
    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new([p.x, p.y, p.z], i))
            .collect::<Vec<_>>(),
    );

    let mut pairs = Vec::new();
    for (a, pa) in points.iter().enumerate() {
        let candidates: Vec<usize> = match max_distance {
            Some(d) => tree
                .locate_within_distance([pa.x, pa.y, pa.z], d * d)
                .map(|c| c.data)
                .filter(|&b| b > a)
                .collect(),
            None => (a + 1..points.len()).collect(),
        };
        for b in candidates {
            let radius = (points[b] - pa).norm() / 2.0;
            if radius == 0.0 {
                continue;
            }
            let mid = (pa + points[b]) / 2.0;
            let query = [mid.x, mid.y, mid.z];
            let blocked = tree
                .nearest_neighbor_iter(&query)
                .find(|c| c.data != a && c.data != b)
                .is_some_and(|c| c.distance_2(&query).sqrt() < tolerance * radius);
            if !blocked {
                pairs.push((a, b));
            }
        }
    }
    pairs.sort_unstable();
    pairs
}

/// Pairs of voxels whose grid indices differ by one along a single axis
pub fn lattice_edges(voxel_indices: &[[i64; 3]]) -> Vec<(usize, usize)> {
    let lookup: HashMap<[i64; 3], usize> = voxel_indices
        .iter()
        .enumerate()
        .map(|(i, &p)| (p, i))
        .collect();

    let mut pairs = Vec::new();
    for (a, p) in voxel_indices.iter().enumerate() {
        for axis in 0..3 {
            let mut q = *p;
            q[axis] += 1;
            if let Some(&b) = lookup.get(&q) {
                pairs.push((a.min(b), a.max(b)));
            }
        }
    }
    pairs.sort_unstable();
    pairs
}

/// Build a voxel graph over all voxels of a volume
pub fn voxel_graph_from_volume(volume: &Volume, generator: &EdgeGenerator) -> VoxelGraph {
    let pairs = generator.edges(&volume.voxel_indices);
    info!(
        "Voxel graph: {} voxels, {} undirected edges ({:?})",
        volume.n_voxels(),
        pairs.len(),
        generator
    );
    VoxelGraph::new(volume.n_voxels(), pairs)
}
