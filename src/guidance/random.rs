//! Null-model axons grown at random on the voxel graph

use super::axon::Axon;
use super::graph::{DiGraph, Vertex};
use crate::spatial::VoxelGraph;
use crate::volume::Volume;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Grow a random tree of up to `n_steps` voxels from `source_voxel`
///
/// At every step a voxel is drawn uniformly from the fringe and its
/// unvisited neighbours join the fringe; a voxel's parent is the last
/// visited voxel that offered it. Growth stops early when the fringe runs
/// dry. The source is always part of the tree.
pub fn draw_random_axon<R: Rng + ?Sized>(
    voxel_graph: &VoxelGraph,
    volume: Arc<Volume>,
    source_voxel: usize,
    n_steps: usize,
    rng: &mut R,
) -> Axon {
    let mut fringe = BTreeSet::from([source_voxel]);
    let mut visited = BTreeSet::new();
    let mut previous: BTreeMap<usize, usize> = BTreeMap::new();

    for _ in 0..n_steps.max(1) {
        if fringe.is_empty() {
            break;
        }
        let pick = rng.gen_range(0..fringe.len());
        let Some(voxel) = fringe.iter().nth(pick).copied() else {
            break;
        };
        fringe.remove(&voxel);
        visited.insert(voxel);

        for &neighbor in voxel_graph.neighbors(voxel) {
            if !visited.contains(&neighbor) {
                previous.insert(neighbor, voxel);
                fringe.insert(neighbor);
            }
        }
    }

    let mut tree = DiGraph::new();
    let mut index = HashMap::with_capacity(visited.len());
    for &voxel in &visited {
        index.insert(voxel, tree.add_vertex(Vertex::at_voxel(voxel, voxel)));
    }
    for &voxel in &visited {
        if voxel == source_voxel {
            continue;
        }
        if let Some(parent) = previous.get(&voxel) {
            tree.add_edge(index[parent], index[&voxel], 1.0);
        }
    }
    Axon::new(tree, volume, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{voxel_graph_from_volume, EdgeGenerator};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_axon_is_a_tree() {
        let volume = Arc::new(Volume::synthetic([4, 4, 1], 2, 0));
        let graph = voxel_graph_from_volume(&volume, &EdgeGenerator::Lattice);
        let mut rng = StdRng::seed_from_u64(17);
        for n_steps in [0, 1, 5, 16, 40] {
            let axon = draw_random_axon(&graph, volume.clone(), 5, n_steps, &mut rng);
            let expected = n_steps.clamp(1, 16);
            assert_eq!(axon.reached_voxels().len(), expected);
            assert_eq!(axon.tree().n_edges(), expected - 1);
            assert_eq!(axon.source_voxel(), 5);
            assert!(axon.targets().is_empty());
        }
    }

    #[test]
    fn test_random_axon_follows_graph_edges() {
        let volume = Arc::new(Volume::synthetic([3, 3, 1], 2, 0));
        let graph = voxel_graph_from_volume(&volume, &EdgeGenerator::Lattice);
        let mut rng = StdRng::seed_from_u64(4);
        let axon = draw_random_axon(&graph, volume, 0, 6, &mut rng);
        for (a, b) in axon.voxel_edges() {
            assert!(graph.neighbors(a).contains(&b));
        }
    }
}
