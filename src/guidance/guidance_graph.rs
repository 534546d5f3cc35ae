//! GuidanceGraph — the up and down graphs with lookups by region and voxel

use super::axon::Axon;
use super::factory::{make_guidance_graphs, vertices_by_region, GuidanceConfig};
use super::find_axon::find_axon_tree;
use super::graph::DiGraph;
use crate::error::{AtlasError, Result};
use crate::hierarchy::{Hierarchy, NodeId};
use crate::spatial::VoxelGraph;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;

/// Guidance states of one hierarchy
///
/// A vertex is the combination of a hierarchy region and a voxel of that
/// region. Vertex indices are shared by the up and the down graph.
#[derive(Debug, Clone)]
pub struct GuidanceGraph {
    hierarchy: Arc<Hierarchy>,
    up: DiGraph,
    down: DiGraph,
    regions: HashMap<NodeId, Vec<usize>>,
    states: HashMap<(NodeId, usize), usize>,
}

impl GuidanceGraph {
    pub fn create(
        hierarchy: Arc<Hierarchy>,
        voxel_graph: &VoxelGraph,
        config: &GuidanceConfig,
    ) -> Result<Self> {
        let (up, down) = make_guidance_graphs(&hierarchy, voxel_graph, config)?;
        let regions = vertices_by_region(&up);
        let states = up
            .vertices()
            .enumerate()
            .filter_map(|(i, v)| v.hierarchy.map(|node| ((node, v.voxel), i)))
            .collect();
        Ok(Self {
            hierarchy,
            up,
            down,
            regions,
            states,
        })
    }

    pub fn hierarchy(&self) -> &Arc<Hierarchy> {
        &self.hierarchy
    }

    pub fn up_graph(&self) -> &DiGraph {
        &self.up
    }

    pub fn down_graph(&self) -> &DiGraph {
        &self.down
    }

    pub fn n_vertices(&self) -> usize {
        self.up.n_vertices()
    }

    /// The vertex of `voxel` in the region `node`
    pub fn get_vertex(&self, node: NodeId, voxel: usize) -> Result<usize> {
        self.states
            .get(&(node, voxel))
            .copied()
            .ok_or_else(|| AtlasError::VertexLookup {
                what: format!("vertex for voxel {} in region {}", voxel, node),
                found: 0,
            })
    }

    /// The vertex of an axon vertex in this graph
    pub fn get_vertex_from_axon(&self, axon: &Axon, axon_vertex: usize) -> Result<usize> {
        let node = axon.hierarchy_of(axon_vertex).ok_or_else(|| AtlasError::VertexLookup {
            what: format!("region of axon vertex {}", axon_vertex),
            found: 0,
        })?;
        self.get_vertex(node, axon.voxel_index(axon_vertex))
    }

    /// Vertices of the given voxels in the finest regions, ascending
    pub fn get_leaf_vertices(&self, voxels: &[usize]) -> Vec<usize> {
        let wanted: std::collections::HashSet<usize> = voxels.iter().copied().collect();
        (0..self.up.n_vertices())
            .filter(|&v| {
                let vertex = self.up.vertex(v);
                wanted.contains(&vertex.voxel)
                    && vertex
                        .hierarchy
                        .is_some_and(|node| self.hierarchy.is_just_not_leaf(node))
            })
            .collect()
    }

    /// The vertex of a voxel in the finest region holding it
    pub fn leaf_vertex(&self, voxel: usize) -> Result<usize> {
        let leaf = self
            .hierarchy
            .get_leaf(voxel)
            .ok_or_else(|| AtlasError::VertexLookup {
                what: format!("leaf of voxel {}", voxel),
                found: 0,
            })?;
        self.hierarchy
            .ancestors(leaf)
            .into_iter()
            .find_map(|node| self.states.get(&(node, voxel)).copied())
            .ok_or_else(|| AtlasError::VertexLookup {
                what: format!("region holding voxel {}", voxel),
                found: 0,
            })
    }

    /// The vertex of `voxel` without incoming up edges
    pub fn get_source_vertex(&self, voxel: usize) -> Result<usize> {
        let found: Vec<usize> = (0..self.up.n_vertices())
            .filter(|&v| self.up.vertex(v).voxel == voxel && self.up.in_degree(v) == 0)
            .collect();
        match found.as_slice() {
            &[v] => Ok(v),
            other => Err(AtlasError::VertexLookup {
                what: format!("source vertex for voxel {}", voxel),
                found: other.len(),
            }),
        }
    }

    /// All vertices in the finest regions
    pub fn sources(&self) -> Vec<usize> {
        let mut sources: Vec<usize> = self
            .regions
            .iter()
            .filter(|(&node, _)| self.hierarchy.is_just_not_leaf(node))
            .flat_map(|(_, vertices)| vertices.iter().copied())
            .collect();
        sources.sort_unstable();
        sources
    }

    /// Vertices of a region, ascending by voxel
    pub fn region_vertices(&self, node: NodeId) -> &[usize] {
        self.regions.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn region_voxels(&self, node: NodeId) -> Vec<usize> {
        self.region_vertices(node)
            .iter()
            .map(|&v| self.up.vertex(v).voxel)
            .collect()
    }

    /// Landscape values of a region's vertices
    pub fn landscape(&self, node: NodeId) -> Vec<f64> {
        self.region_vertices(node)
            .iter()
            .map(|&v| self.up.vertex(v).landscape)
            .collect()
    }

    pub fn voxel_index(&self, vertex: usize) -> usize {
        self.up.vertex(vertex).voxel
    }

    pub fn hierarchy_of(&self, vertex: usize) -> Option<NodeId> {
        self.up.vertex(vertex).hierarchy
    }

    /// The axon grown from a vertex, normally one of [`Self::sources`]
    pub fn find_axon(&self, source: usize) -> Result<Axon> {
        let tree = find_axon_tree(&self.up, &self.down, source)?;
        Ok(Axon::new(
            tree,
            self.hierarchy.volume().clone(),
            Some(self.hierarchy.clone()),
        ))
    }
}

/// Grow one axon from the leaf vertex of every source voxel
pub fn sample_axons(guidance: &GuidanceGraph, source_voxels: &[usize]) -> Result<Vec<Axon>> {
    let axons = source_voxels
        .iter()
        .map(|&voxel| guidance.find_axon(guidance.leaf_vertex(voxel)?))
        .collect::<Result<Vec<_>>>()?;
    info!(
        "Sampled {} axons reaching {} voxels in total",
        axons.len(),
        axons.iter().map(|a| a.reached_voxels().len()).sum::<usize>()
    );
    Ok(axons)
}
