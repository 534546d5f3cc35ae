//! Construction of the up and down guidance graphs
//!
//! Every region of the hierarchy contributes one vertex per voxel it
//! contains. Within a region, vertices are linked along the spatial edges
//! that climb the region's landscape. Regions are then stitched together
//! by transition edges between the two states of a shared voxel: towards
//! the parent region in the up graph, towards the child region in the
//! down graph.

use super::graph::{DiGraph, Vertex};
use super::landscape::{EdgeMask, LandscapeMethod, WeightMethod};
use crate::error::{AtlasError, Result};
use crate::hierarchy::{Hierarchy, NodeId};
use crate::spatial::VoxelGraph;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Settings of the guidance graph factory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    pub landscape: LandscapeMethod,
    pub weight: WeightMethod,
    pub edge_mask: EdgeMask,
    /// Maximum out-degree inside a region, unbounded when `None`
    pub branching: Option<usize>,
    /// Weight of the edges between two states of one voxel
    pub transition_weight: f64,
    /// Whether the root is a region of its own
    pub include_root: bool,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            landscape: LandscapeMethod::default(),
            weight: WeightMethod::default(),
            edge_mask: EdgeMask::default(),
            branching: None,
            transition_weight: 100.0,
            include_root: false,
        }
    }
}

impl GuidanceConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.transition_weight.is_finite() && self.transition_weight >= 0.0) {
            return Err(AtlasError::Config(format!(
                "transition weight must be finite and non-negative, got {}",
                self.transition_weight
            )));
        }
        if self.branching == Some(0) {
            return Err(AtlasError::Config("branching cap must be at least 1".into()));
        }
        Ok(())
    }

    /// Hierarchy nodes that become guidance regions, in breadth-first order
    pub fn regions(&self, hierarchy: &Hierarchy) -> Vec<NodeId> {
        hierarchy
            .interior(hierarchy.root())
            .into_iter()
            .filter(|&n| self.include_root || n != hierarchy.root())
            .collect()
    }
}

/// Build the up and down guidance graphs of a hierarchy
///
/// Vertex `i` of both graphs is the same state, named `i`. The two graphs
/// share all intra-region edges and differ only in the direction of their
/// transition edges.
pub fn make_guidance_graphs(
    hierarchy: &Hierarchy,
    voxel_graph: &VoxelGraph,
    config: &GuidanceConfig,
) -> Result<(DiGraph, DiGraph)> {
    config.validate()?;
    let n_voxels = hierarchy.volume().n_voxels();
    if voxel_graph.n_vertices() != n_voxels {
        return Err(AtlasError::InconsistentVolume(format!(
            "voxel graph has {} vertices, volume has {} voxels",
            voxel_graph.n_vertices(),
            n_voxels
        )));
    }

    let regions = config.regions(hierarchy);
    if regions.is_empty() {
        return Err(AtlasError::EmptyLandscape);
    }

    let mut up = DiGraph::new();
    for (i, &node) in regions.iter().enumerate() {
        let landscape = config.landscape.landscape(hierarchy, node);
        let gradient = voxel_graph.gradient(&landscape);
        let weights = config.weight.weights(&gradient);
        let mask = config.edge_mask.mask(&gradient);

        let mut edges: Vec<(usize, usize, f64)> = voxel_graph
            .edges()
            .iter()
            .zip(weights.iter().zip(&mask))
            .filter(|(_, (_, &keep))| keep)
            .map(|(&(s, t), (&w, _))| (s, t, w))
            .collect();

        if let (Some(cap), true) = (config.branching, i > 0) {
            edges = limit_branching(edges, n_voxels, cap);
        }

        let mut voxels = hierarchy.voxels(node);
        voxels.sort_unstable();
        let offset = up.n_vertices();
        let local: HashMap<usize, usize> = voxels
            .iter()
            .enumerate()
            .map(|(k, &voxel)| (voxel, offset + k))
            .collect();

        for &voxel in &voxels {
            let name = up.n_vertices();
            up.add_vertex(Vertex {
                name,
                voxel,
                hierarchy: Some(node),
                landscape: landscape[voxel],
            });
        }
        let before = up.n_edges();
        for (s, t, w) in edges {
            if let (Some(&a), Some(&b)) = (local.get(&s), local.get(&t)) {
                up.add_edge(a, b, w);
            }
        }
        debug!(
            "Region {}: {} vertices, {} edges",
            node,
            voxels.len(),
            up.n_edges() - before
        );
    }

    let mut down = up.clone();
    let region_set: HashSet<NodeId> = regions.iter().copied().collect();
    let region_vertices = vertices_by_region(&up);
    let mut n_transitions = 0;
    for &node in &regions {
        let Some(parent) = hierarchy.parent(node).filter(|p| region_set.contains(p)) else {
            continue;
        };
        let pairs = transition_pairs(&up, &region_vertices, node, parent)?;
        for &(child_vertex, parent_vertex) in &pairs {
            up.add_edge(child_vertex, parent_vertex, config.transition_weight);
            down.add_edge(parent_vertex, child_vertex, config.transition_weight);
        }
        n_transitions += pairs.len();
    }

    info!(
        "Guidance graphs: {} regions, {} vertices, {} up edges, {} down edges, {} transitions",
        regions.len(),
        up.n_vertices(),
        up.n_edges(),
        down.n_edges(),
        n_transitions
    );
    Ok((up, down))
}

/// Keep at most `cap` outgoing edges per voxel, the cheapest ones
///
/// Ties keep the earlier edge.
fn limit_branching(
    edges: Vec<(usize, usize, f64)>,
    n_voxels: usize,
    cap: usize,
) -> Vec<(usize, usize, f64)> {
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n_voxels];
    for (id, &(s, _, _)) in edges.iter().enumerate() {
        outgoing[s].push(id);
    }

    let mut keep = vec![true; edges.len()];
    for ids in outgoing.iter_mut().filter(|ids| ids.len() > cap) {
        ids.sort_by(|&a, &b| edges[a].2.total_cmp(&edges[b].2));
        for &id in &ids[cap..] {
            keep[id] = false;
        }
    }

    edges
        .into_iter()
        .zip(keep)
        .filter_map(|(edge, k)| k.then_some(edge))
        .collect()
}

pub(crate) fn vertices_by_region(graph: &DiGraph) -> HashMap<NodeId, Vec<usize>> {
    let mut index: HashMap<NodeId, Vec<usize>> = HashMap::new();
    for (v, vertex) in graph.vertices().enumerate() {
        if let Some(node) = vertex.hierarchy {
            index.entry(node).or_default().push(v);
        }
    }
    index
}

/// Pair every vertex of `child` with the vertex of `parent` at the same voxel
fn transition_pairs(
    graph: &DiGraph,
    region_vertices: &HashMap<NodeId, Vec<usize>>,
    child: NodeId,
    parent: NodeId,
) -> Result<Vec<(usize, usize)>> {
    let empty = Vec::new();
    let child_vertices = region_vertices.get(&child).unwrap_or(&empty);
    let parent_by_voxel: HashMap<usize, usize> = region_vertices
        .get(&parent)
        .unwrap_or(&empty)
        .iter()
        .map(|&v| (graph.vertex(v).voxel, v))
        .collect();

    child_vertices
        .iter()
        .map(|&v| {
            let voxel = graph.vertex(v).voxel;
            match parent_by_voxel.get(&voxel) {
                Some(&p) => Ok((v, p)),
                None => Err(AtlasError::RegionMismatch {
                    child: child.index(),
                    parent: parent.index(),
                    detail: format!("voxel {} is missing from the parent region", voxel),
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{make_hierarchy, SplitMethod};
    use crate::spatial::{voxel_graph_from_volume, EdgeGenerator};
    use crate::volume::Volume;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn setup() -> (Hierarchy, VoxelGraph) {
        let volume = Arc::new(Volume::synthetic([4, 4, 2], 5, 13));
        let mut rng = StdRng::seed_from_u64(2);
        let hierarchy = make_hierarchy(volume.clone(), Some(3), SplitMethod::Pca, &mut rng).unwrap();
        let voxel_graph = voxel_graph_from_volume(&volume, &EdgeGenerator::Lattice);
        (hierarchy, voxel_graph)
    }

    #[test]
    fn test_one_vertex_per_region_voxel() {
        let (h, vg) = setup();
        let config = GuidanceConfig::default();
        let (up, down) = make_guidance_graphs(&h, &vg, &config).unwrap();
        let expected: usize = config.regions(&h).iter().map(|&n| h.voxels(n).len()).sum();
        assert_eq!(up.n_vertices(), expected);
        assert_eq!(down.n_vertices(), expected);
        assert_eq!(up.n_edges(), down.n_edges());

        let mut seen = HashSet::new();
        for (i, v) in up.vertices().enumerate() {
            assert_eq!(v.name, i);
            assert!(seen.insert((v.hierarchy, v.voxel)));
            assert_eq!(down.vertex(i), v);
        }
        assert!(!config.regions(&h).contains(&h.root()));
    }

    #[test]
    fn test_transitions_stay_in_voxel() {
        let (h, vg) = setup();
        let config = GuidanceConfig::default();
        let (up, down) = make_guidance_graphs(&h, &vg, &config).unwrap();
        let mut n_up = 0;
        for e in up.edges() {
            let (s, t) = (up.vertex(e.source), up.vertex(e.target));
            if s.hierarchy != t.hierarchy {
                n_up += 1;
                assert_eq!(s.voxel, t.voxel);
                assert_eq!(e.weight, 100.0);
                assert_eq!(h.parent(s.hierarchy.unwrap()), t.hierarchy);
            }
        }
        let mut n_down = 0;
        for e in down.edges() {
            let (s, t) = (down.vertex(e.source), down.vertex(e.target));
            if s.hierarchy != t.hierarchy {
                n_down += 1;
                assert_eq!(s.voxel, t.voxel);
                assert_eq!(h.parent(t.hierarchy.unwrap()), s.hierarchy);
            }
        }
        assert!(n_up > 0);
        assert_eq!(n_up, n_down);
    }

    #[test]
    fn test_region_edges_follow_the_mask() {
        let (h, vg) = setup();
        let config = GuidanceConfig::default();
        let (up, _) = make_guidance_graphs(&h, &vg, &config).unwrap();
        for e in up.edges() {
            let (s, t) = (up.vertex(e.source), up.vertex(e.target));
            if s.hierarchy == t.hierarchy {
                assert!(t.landscape - s.landscape > 0.1);
                assert!((0.0..=1.0).contains(&e.weight));
            }
        }
    }

    #[test]
    fn test_branching_cap() {
        let edges = vec![(0, 1, 0.5), (0, 2, 0.1), (0, 3, 0.5), (1, 2, 0.9)];
        let kept = limit_branching(edges, 4, 2);
        assert_eq!(kept, vec![(0, 1, 0.5), (0, 2, 0.1), (1, 2, 0.9)]);

        let (h, vg) = setup();
        let config = GuidanceConfig {
            branching: Some(1),
            edge_mask: EdgeMask::Threshold { threshold: 0.0 },
            ..GuidanceConfig::default()
        };
        let (up, _) = make_guidance_graphs(&h, &vg, &config).unwrap();
        let regions = config.regions(&h);
        for v in 0..up.n_vertices() {
            let node = up.vertex(v).hierarchy;
            if node == Some(regions[0]) {
                continue;
            }
            let intra = up
                .successors(v)
                .filter(|&t| up.vertex(t).hierarchy == node)
                .count();
            assert!(intra <= 1);
        }
    }

    #[test]
    fn test_flat_hierarchy_has_no_regions() {
        let volume = Arc::new(Volume::synthetic([2, 2, 1], 3, 1));
        let h = Hierarchy::with_voxel_leaves(volume.clone());
        let vg = voxel_graph_from_volume(&volume, &EdgeGenerator::Lattice);
        assert!(matches!(
            make_guidance_graphs(&h, &vg, &GuidanceConfig::default()),
            Err(AtlasError::EmptyLandscape)
        ));
        let with_root = GuidanceConfig {
            include_root: true,
            ..GuidanceConfig::default()
        };
        let (up, _) = make_guidance_graphs(&h, &vg, &with_root).unwrap();
        assert_eq!(up.n_vertices(), 4);
    }

    #[test]
    fn test_transition_needs_voxel_in_parent() {
        let mut graph = DiGraph::new();
        for (voxel, node) in [(0, 1), (1, 1), (2, 2)] {
            let name = graph.n_vertices();
            graph.add_vertex(Vertex {
                name,
                voxel,
                hierarchy: Some(NodeId(node)),
                landscape: 0.0,
            });
        }
        let regions = vertices_by_region(&graph);
        let err = transition_pairs(&graph, &regions, NodeId(2), NodeId(1)).unwrap_err();
        assert!(matches!(
            err,
            AtlasError::RegionMismatch {
                child: 2,
                parent: 1,
                ..
            }
        ));
        assert!(err
            .to_string()
            .contains("voxel 2 is missing from the parent region"));

        // a child voxel the parent holds pairs up
        graph.add_vertex(Vertex {
            name: 3,
            voxel: 1,
            hierarchy: Some(NodeId(3)),
            landscape: 0.0,
        });
        let regions = vertices_by_region(&graph);
        assert_eq!(
            transition_pairs(&graph, &regions, NodeId(3), NodeId(1)).unwrap(),
            vec![(3, 1)]
        );
    }

    #[test]
    fn test_mismatched_voxel_graph() {
        let (h, _) = setup();
        let vg = VoxelGraph::new(3, vec![(0, 1)]);
        assert!(make_guidance_graphs(&h, &vg, &GuidanceConfig::default()).is_err());
    }
}
